use std::fmt;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::genome::Genome;

/// Sequential agent number, unique for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpecimenId(pub u64);

impl fmt::Display for SpecimenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeState {
    Alive,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    Age,
    Energy,
    Fight,
    Edge,
    Smite,
}

/// What the physics host reports about a specimen between steps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vitals {
    pub energy: f32,
    pub max_energy: f32,
    /// Position in the x/z ground plane.
    pub position: Point2<f32>,
    /// Distance covered since the previous report.
    pub distance_moved: f32,
    /// Food energy eaten since the previous report.
    pub food_energy: f32,
    pub killed_in_fight: bool,
    pub crossed_edge: bool,
}

#[derive(Debug, Clone)]
pub struct Specimen {
    pub(crate) id: SpecimenId,
    pub(crate) genome: Genome,
    pub(crate) domain: usize,
    pub(crate) state: LifeState,
    pub(crate) birth_step: u64,
    pub(crate) death_step: Option<u64>,
    pub(crate) parents: Option<(SpecimenId, SpecimenId)>,
    pub(crate) energy: f32,
    pub(crate) max_energy: f32,
    pub(crate) position: Point2<f32>,
    pub(crate) distance_moved: f32,
    pub(crate) food_energy: f32,
    pub(crate) num_mates: u32,
    pub(crate) last_mate_step: Option<u64>,
    pub(crate) killed_in_fight: bool,
    pub(crate) crossed_edge: bool,
    pub(crate) heuristic_fitness: f32,
}

impl Specimen {
    pub(crate) fn new(
        id: SpecimenId,
        genome: Genome,
        domain: usize,
        birth_step: u64,
        position: Point2<f32>,
        energy: f32,
        max_energy: f32,
    ) -> Specimen {
        Specimen {
            id,
            genome,
            domain,
            state: LifeState::Alive,
            birth_step,
            death_step: None,
            parents: None,
            energy,
            max_energy,
            position,
            distance_moved: 0.0,
            food_energy: 0.0,
            num_mates: 0,
            last_mate_step: None,
            killed_in_fight: false,
            crossed_edge: false,
            heuristic_fitness: 0.0,
        }
    }

    pub fn id(&self) -> SpecimenId {
        self.id
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn domain(&self) -> usize {
        self.domain
    }

    pub fn state(&self) -> LifeState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state == LifeState::Alive
    }

    pub fn birth_step(&self) -> u64 {
        self.birth_step
    }

    pub fn death_step(&self) -> Option<u64> {
        self.death_step
    }

    pub fn parents(&self) -> Option<(SpecimenId, SpecimenId)> {
        self.parents
    }

    pub fn age(&self, step: u64) -> u64 {
        self.death_step.unwrap_or(step).saturating_sub(self.birth_step)
    }

    pub fn energy(&self) -> f32 {
        self.energy
    }

    pub fn max_energy(&self) -> f32 {
        self.max_energy
    }

    pub fn position(&self) -> Point2<f32> {
        self.position
    }

    pub fn num_mates(&self) -> u32 {
        self.num_mates
    }

    pub fn heuristic_fitness(&self) -> f32 {
        self.heuristic_fitness
    }

    pub(crate) fn apply(&mut self, vitals: &Vitals) {
        self.energy = vitals.energy;
        self.max_energy = vitals.max_energy;
        self.position = vitals.position;
        self.distance_moved += vitals.distance_moved.max(0.0);
        self.food_energy += vitals.food_energy.max(0.0);
        self.killed_in_fight |= vitals.killed_in_fight;
        self.crossed_edge |= vitals.crossed_edge;
    }

    /// Whether `wait` steps have passed since the last mating.
    pub(crate) fn mate_wait_elapsed(&self, step: u64, wait: u64) -> bool {
        self.last_mate_step
            .is_none_or(|last| step.saturating_sub(last) >= wait)
    }

    pub(crate) fn energy_fraction(&self) -> f32 {
        if self.max_energy <= 0.0 {
            return 0.0;
        }
        self.energy / self.max_energy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::GeneLayout;
    use crate::settings::GenomeSettings;
    use std::sync::Arc;

    fn specimen() -> Specimen {
        let layout = Arc::new(GeneLayout::new(&GenomeSettings::default()));
        Specimen::new(
            SpecimenId(1),
            Genome::seeded(&layout),
            0,
            10,
            Point2::new(1.0, 2.0),
            50.0,
            100.0,
        )
    }

    #[test]
    fn vitals_accumulate_movement_and_food() {
        let mut specimen = specimen();
        let vitals = Vitals {
            energy: 40.0,
            max_energy: 80.0,
            position: Point2::new(3.0, 4.0),
            distance_moved: 2.5,
            food_energy: 1.0,
            killed_in_fight: false,
            crossed_edge: false,
        };
        specimen.apply(&vitals);
        specimen.apply(&vitals);
        assert_eq!(specimen.energy(), 40.0);
        assert_eq!(specimen.distance_moved, 5.0);
        assert_eq!(specimen.food_energy, 2.0);
        assert_eq!(specimen.energy_fraction(), 0.5);
        assert_eq!(specimen.position(), Point2::new(3.0, 4.0));
    }

    #[test]
    fn age_freezes_at_death() {
        let mut specimen = specimen();
        assert_eq!(specimen.age(25), 15);
        specimen.death_step = Some(20);
        assert_eq!(specimen.age(99), 10);
    }

    #[test]
    fn mate_wait() {
        let mut specimen = specimen();
        assert!(specimen.mate_wait_elapsed(11, 25));
        specimen.last_mate_step = Some(11);
        assert!(!specimen.mate_wait_elapsed(30, 25));
        assert!(specimen.mate_wait_elapsed(36, 25));
    }
}
