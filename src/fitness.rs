use crate::settings::FitnessSettings;
use crate::specimen::Specimen;

/// Per-component inputs to the fitness functions, each roughly in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitnessInputs {
    pub mate: f32,
    pub movement: f32,
    pub energy: f32,
    pub age: f32,
}

impl FitnessInputs {
    pub fn of(specimen: &Specimen, step: u64, mate_wait: u64) -> FitnessInputs {
        let age = specimen.age(step) as f32;
        let lifespan = specimen.genome().lifespan().max(1) as f32;
        // Most matings a specimen could manage over its lifespan.
        let possible_mates = (lifespan / mate_wait.max(1) as f32).max(1.0);
        let max_travel = age * specimen.genome().max_speed();
        FitnessInputs {
            mate: specimen.num_mates() as f32 / possible_mates,
            movement: if max_travel > 0.0 {
                (specimen.distance_moved / max_travel).min(1.0)
            } else {
                0.0
            },
            energy: if specimen.max_energy() > 0.0 {
                specimen.food_energy / specimen.max_energy()
            } else {
                0.0
            },
            age: (age / lifespan).min(1.0),
        }
    }
}

/// Weighted mean of the cheap components, without complexity.
pub fn heuristic_fitness(weights: &FitnessSettings, inputs: &FitnessInputs) -> f32 {
    let total = weights.mate + weights.movement + weights.energy + weights.age;
    if total <= 0.0 {
        return 0.0;
    }
    (weights.mate * inputs.mate
        + weights.movement * inputs.movement
        + weights.energy * inputs.energy
        + weights.age * inputs.age)
        / total
}

pub fn complete_fitness(weights: &FitnessSettings, heuristic: f32, complexity: f32) -> f32 {
    weights.heuristic * heuristic + weights.complexity * complexity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heuristic_is_a_weighted_mean() {
        let weights = FitnessSettings {
            mate: 1.0,
            movement: 1.0,
            energy: 0.0,
            age: 2.0,
            ..FitnessSettings::default()
        };
        let inputs = FitnessInputs {
            mate: 1.0,
            movement: 0.0,
            energy: 5.0,
            age: 0.5,
        };
        assert_eq!(heuristic_fitness(&weights, &inputs), 0.5);
    }

    #[test]
    fn zero_weights_give_zero() {
        let weights = FitnessSettings {
            mate: 0.0,
            movement: 0.0,
            energy: 0.0,
            age: 0.0,
            ..FitnessSettings::default()
        };
        assert_eq!(heuristic_fitness(&weights, &FitnessInputs::default()), 0.0);
    }

    #[test]
    fn complexity_enters_complete_fitness_only() {
        let weights = FitnessSettings {
            heuristic: 1.0,
            complexity: 2.0,
            ..FitnessSettings::default()
        };
        assert_eq!(complete_fitness(&weights, 0.25, 0.5), 1.25);
    }
}
