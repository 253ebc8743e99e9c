use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("could not read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{name} range is inverted ({min} > {max})")]
    InvertedRange { name: &'static str, min: f32, max: f32 },
    #[error("{name} must lie in [0, 1], got {value}")]
    NotAFraction { name: &'static str, value: f32 },
    #[error("{name} must be non-zero")]
    Zero { name: &'static str },
    #[error("{name} must be finite and non-negative, got {value}")]
    Negative { name: &'static str, value: f32 },
    #[error("at least one domain is required")]
    NoDomains,
    #[error("domain {index}: expected min <= init <= max agents, got {min}/{init}/{max}")]
    DomainPopulation {
        index: usize,
        min: usize,
        init: usize,
        max: usize,
    },
    #[error("domain {index}: seed count {seed_count} exceeds initial population {init}")]
    DomainSeedCount {
        index: usize,
        seed_count: usize,
        init: usize,
    },
    #[error("domain {index}: {name} must be finite and non-negative, got {value}")]
    DomainGeometry {
        index: usize,
        name: &'static str,
        value: f32,
    },
    #[error("lockstep replay is enabled but no log path was given")]
    MissingLockstepLog,
}

/// Closed interval a gene decodes into.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub min: f32,
    pub max: f32,
}

impl Span {
    pub const UNIT: Span = Span { min: 0.0, max: 1.0 };

    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Affine map of a [0, 1] value into the span.
    #[inline]
    pub fn lerp(&self, t: f32) -> f32 {
        self.min + t * (self.max - self.min)
    }

    pub fn contains(&self, value: f32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    fn validate(&self, name: &'static str) -> Result<(), SettingsError> {
        if self.min > self.max {
            return Err(SettingsError::InvertedRange {
                name,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GenomeSettings {
    /// Decode gene bytes through the Gray-code table.
    pub gray_coding: bool,
    /// Per-bit flip probability.
    pub mutation_rate: Span,
    pub crossover_points: Span,
    /// Lifespan in steps.
    pub lifespan: Span,
    pub strength: Span,
    pub size: Span,
    pub max_speed: Span,
    /// Fraction of a parent's energy handed to a child.
    pub mate_energy: Span,
    /// Bit-on probability range used when randomizing without an explicit one.
    pub bit_probability: Span,
    pub vision_neurons: Span,
    /// Number of internal neuron groups; `max` sizes the layout.
    pub neuron_groups: Span,
    /// Excitatory and inhibitory neurons per internal group.
    pub neurons_per_group: Span,
    pub max_bias: f32,
    pub learning_rate: Span,
    /// Template fractions used by `Genome::seeded`.
    pub seed: SeedTemplate,
}

impl Default for GenomeSettings {
    fn default() -> Self {
        Self {
            gray_coding: true,
            mutation_rate: Span::new(0.01, 0.1),
            crossover_points: Span::new(2.0, 8.0),
            lifespan: Span::new(1000.0, 2000.0),
            strength: Span::new(0.5, 2.0),
            size: Span::new(0.75, 1.5),
            max_speed: Span::new(0.5, 1.5),
            mate_energy: Span::new(0.2, 0.8),
            bit_probability: Span::new(0.1, 0.9),
            vision_neurons: Span::new(1.0, 8.0),
            neuron_groups: Span::new(1.0, 5.0),
            neurons_per_group: Span::new(1.0, 16.0),
            max_bias: 1.0,
            learning_rate: Span::new(0.0, 0.1),
            seed: SeedTemplate::default(),
        }
    }
}

impl GenomeSettings {
    fn validate(&self) -> Result<(), SettingsError> {
        self.mutation_rate.validate("genome.mutation_rate")?;
        self.crossover_points.validate("genome.crossover_points")?;
        self.lifespan.validate("genome.lifespan")?;
        self.strength.validate("genome.strength")?;
        self.size.validate("genome.size")?;
        self.max_speed.validate("genome.max_speed")?;
        self.mate_energy.validate("genome.mate_energy")?;
        self.bit_probability.validate("genome.bit_probability")?;
        self.vision_neurons.validate("genome.vision_neurons")?;
        self.neuron_groups.validate("genome.neuron_groups")?;
        self.neurons_per_group.validate("genome.neurons_per_group")?;
        self.learning_rate.validate("genome.learning_rate")?;
        fraction("genome.mutation_rate.max", self.mutation_rate.max)?;
        fraction("genome.mutation_rate.min", self.mutation_rate.min)?;
        fraction("genome.bit_probability.min", self.bit_probability.min)?;
        fraction("genome.bit_probability.max", self.bit_probability.max)?;
        if self.neuron_groups.max < 1.0 {
            return Err(SettingsError::Zero {
                name: "genome.neuron_groups.max",
            });
        }
        self.seed.validate()
    }
}

/// Fractions of each physical gene's range written by the seed template.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedTemplate {
    pub mutation_rate: f32,
    pub crossover_points: f32,
    pub lifespan: f32,
    pub strength: f32,
    pub size: f32,
    pub max_speed: f32,
    pub mate_energy: f32,
    pub vision_neurons: f32,
    pub neuron_groups: f32,
    pub neurons_per_group: f32,
}

impl Default for SeedTemplate {
    fn default() -> Self {
        Self {
            mutation_rate: 0.5,
            crossover_points: 0.5,
            lifespan: 0.5,
            strength: 0.5,
            size: 0.5,
            max_speed: 0.5,
            mate_energy: 0.5,
            vision_neurons: 0.5,
            neuron_groups: 0.0,
            neurons_per_group: 0.5,
        }
    }
}

impl SeedTemplate {
    fn validate(&self) -> Result<(), SettingsError> {
        fraction("genome.seed.mutation_rate", self.mutation_rate)?;
        fraction("genome.seed.crossover_points", self.crossover_points)?;
        fraction("genome.seed.lifespan", self.lifespan)?;
        fraction("genome.seed.strength", self.strength)?;
        fraction("genome.seed.size", self.size)?;
        fraction("genome.seed.max_speed", self.max_speed)?;
        fraction("genome.seed.mate_energy", self.mate_energy)?;
        fraction("genome.seed.vision_neurons", self.vision_neurons)?;
        fraction("genome.seed.neuron_groups", self.neuron_groups)?;
        fraction("genome.seed.neurons_per_group", self.neurons_per_group)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainSettings {
    /// Center and extent as fractions of the world size.
    pub center_x: f32,
    pub center_z: f32,
    pub size_x: f32,
    pub size_z: f32,
    pub min_agents: usize,
    pub init_agents: usize,
    pub max_agents: usize,
    /// How many of the initial agents start from the seed template.
    pub seed_count: usize,
    pub seed_mutation_probability: f32,
}

impl Default for DomainSettings {
    fn default() -> Self {
        Self {
            center_x: 0.5,
            center_z: 0.5,
            size_x: 1.0,
            size_z: 1.0,
            min_agents: 15,
            init_agents: 30,
            max_agents: 50,
            seed_count: 0,
            seed_mutation_probability: 0.0,
        }
    }
}

/// Weights of the fitness components.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FitnessSettings {
    pub mate: f32,
    pub movement: f32,
    pub energy: f32,
    pub age: f32,
    /// Weight of the heuristic part inside complete fitness.
    pub heuristic: f32,
    /// Weight of the externally supplied complexity inside complete fitness.
    pub complexity: f32,
}

impl Default for FitnessSettings {
    fn default() -> Self {
        Self {
            mate: 10.0,
            movement: 1.0,
            energy: 2.0,
            age: 1.0,
            heuristic: 1.0,
            complexity: 0.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MateSettings {
    /// Fraction of max energy both partners need before mating.
    pub energy_threshold: f32,
    /// Steps between two matings of the same specimen.
    pub wait: u64,
    pub min_genetic_distance: f32,
    pub max_genetic_distance: f32,
    pub inbreeding_falloff: f32,
    pub outbreeding_falloff: f32,
    pub hard_cutoff: bool,
    /// Births since the last creation before mate probability applies.
    pub misc_agents: u64,
}

impl Default for MateSettings {
    fn default() -> Self {
        Self {
            energy_threshold: 0.3,
            wait: 25,
            min_genetic_distance: 0.0,
            max_genetic_distance: 1.0,
            inbreeding_falloff: 1.0,
            outbreeding_falloff: 1.0,
            hard_cutoff: false,
            misc_agents: 0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CreationSettings {
    pub tournament_pool_size: usize,
    /// Probability that a creation ignores the population and randomizes.
    pub random_probability: f32,
    /// Fall back to the domain's fittest ledger before randomizing.
    pub use_fittest_ledger: bool,
    /// Paced creations allowed inside one window.
    pub max_per_window: usize,
    /// Lower bound of the pacing window, in steps.
    pub min_window: u64,
    /// Create paced agents while a domain is below its initial population.
    pub replenish_to_init: bool,
}

impl Default for CreationSettings {
    fn default() -> Self {
        Self {
            tournament_pool_size: 5,
            random_probability: 0.0,
            use_fittest_ledger: true,
            max_per_window: 1,
            min_window: 10,
            replenish_to_init: false,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmiteMode {
    Random,
    #[default]
    LeastFit,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SmiteSettings {
    pub mode: SmiteMode,
    /// Least-fit pool size as a fraction of the domain population.
    pub fraction: f32,
    /// Minimum fraction of its lifespan a specimen must have lived to enter the pool.
    pub age_fraction: f32,
    pub refresh_interval: u64,
}

impl Default for SmiteSettings {
    fn default() -> Self {
        Self {
            mode: SmiteMode::LeastFit,
            fraction: 0.1,
            age_fraction: 0.25,
            refresh_interval: 10,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    pub fittest: usize,
    pub recent: usize,
    pub domain: usize,
    /// Steps between clears of the recent ledger.
    pub recent_epoch: u64,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            fittest: 10,
            recent: 10,
            domain: 5,
            recent_epoch: 1000,
        }
    }
}

/// What gets handed to external recorders. Zero frequencies disable a recorder.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    pub best_so_far_frequency: u64,
    pub best_recent_frequency: u64,
    pub record_all_brains: bool,
    pub record_seed_brains: bool,
    pub gene_separation_frequency: u64,
    /// Per-gene mean and spread over the living population.
    pub gene_stats_frequency: u64,
    pub food_patch_stats_frequency: u64,
    /// Distance from a food patch's edge that still counts as near it.
    pub food_patch_near_distance: f32,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            best_so_far_frequency: 0,
            best_recent_frequency: 0,
            record_all_brains: false,
            record_seed_brains: false,
            gene_separation_frequency: 0,
            gene_stats_frequency: 0,
            food_patch_stats_frequency: 0,
            food_patch_near_distance: 5.0,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LockstepSettings {
    pub enabled: bool,
    pub log_path: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    pub lifespan_window: usize,
    pub life_fraction_window: usize,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            lifespan_window: 1000,
            life_fraction_window: 1000,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Deterministic seed for the run's random stream.
    pub seed: u64,
    pub world_size: f32,
    /// Crossing the world bounds is lethal.
    pub lethal_edges: bool,
    /// Energy at or below which a specimen starves.
    pub min_energy: f32,
    /// Energy a created specimen starts with.
    pub max_energy: f32,
    pub genome: GenomeSettings,
    pub domains: Vec<DomainSettings>,
    pub fitness: FitnessSettings,
    pub mating: MateSettings,
    pub creation: CreationSettings,
    pub smite: SmiteSettings,
    pub ledger: LedgerSettings,
    pub recording: RecordingSettings,
    pub lockstep: LockstepSettings,
    pub stats: StatsSettings,
}

impl Default for Settings {
    fn default() -> Settings {
        Settings {
            seed: 42,
            world_size: 100.0,
            lethal_edges: false,
            min_energy: 0.0,
            max_energy: 100.0,
            genome: GenomeSettings::default(),
            domains: vec![DomainSettings::default()],
            fitness: FitnessSettings::default(),
            mating: MateSettings::default(),
            creation: CreationSettings::default(),
            smite: SmiteSettings::default(),
            ledger: LedgerSettings::default(),
            recording: RecordingSettings::default(),
            lockstep: LockstepSettings::default(),
            stats: StatsSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_json_str(json: &str) -> Result<Settings, SettingsError> {
        let settings: Settings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Settings, SettingsError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Settings::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        self.genome.validate()?;
        if self.domains.is_empty() {
            return Err(SettingsError::NoDomains);
        }
        for (index, domain) in self.domains.iter().enumerate() {
            if domain.min_agents > domain.init_agents || domain.init_agents > domain.max_agents {
                return Err(SettingsError::DomainPopulation {
                    index,
                    min: domain.min_agents,
                    init: domain.init_agents,
                    max: domain.max_agents,
                });
            }
            if domain.seed_count > domain.init_agents {
                return Err(SettingsError::DomainSeedCount {
                    index,
                    seed_count: domain.seed_count,
                    init: domain.init_agents,
                });
            }
            fraction("domain.seed_mutation_probability", domain.seed_mutation_probability)?;
            for (name, value) in [
                ("center_x", domain.center_x),
                ("center_z", domain.center_z),
                ("size_x", domain.size_x),
                ("size_z", domain.size_z),
            ] {
                if !value.is_finite() || value < 0.0 {
                    return Err(SettingsError::DomainGeometry { index, name, value });
                }
            }
        }
        if self.ledger.fittest == 0 {
            return Err(SettingsError::Zero { name: "ledger.fittest" });
        }
        if self.ledger.recent == 0 {
            return Err(SettingsError::Zero { name: "ledger.recent" });
        }
        if self.ledger.domain == 0 {
            return Err(SettingsError::Zero { name: "ledger.domain" });
        }
        if self.stats.lifespan_window == 0 {
            return Err(SettingsError::Zero { name: "stats.lifespan_window" });
        }
        if self.stats.life_fraction_window == 0 {
            return Err(SettingsError::Zero {
                name: "stats.life_fraction_window",
            });
        }
        fraction("mating.energy_threshold", self.mating.energy_threshold)?;
        fraction("mating.min_genetic_distance", self.mating.min_genetic_distance)?;
        fraction("mating.max_genetic_distance", self.mating.max_genetic_distance)?;
        Span::new(self.mating.min_genetic_distance, self.mating.max_genetic_distance)
            .validate("mating genetic distance")?;
        fraction("creation.random_probability", self.creation.random_probability)?;
        fraction("smite.fraction", self.smite.fraction)?;
        fraction("smite.age_fraction", self.smite.age_fraction)?;
        let near = self.recording.food_patch_near_distance;
        if !near.is_finite() || near < 0.0 {
            return Err(SettingsError::Negative {
                name: "recording.food_patch_near_distance",
                value: near,
            });
        }
        if self.lockstep.enabled && self.lockstep.log_path.is_none() {
            return Err(SettingsError::MissingLockstepLog);
        }
        Ok(())
    }
}

fn fraction(name: &'static str, value: f32) -> Result<(), SettingsError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SettingsError::NotAFraction { name, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Settings::default().validate().expect("defaults should be valid");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{
            "seed": 7,
            "domains": [
                { "min_agents": 2, "init_agents": 4, "max_agents": 8 },
                { "center_x": 0.75, "size_x": 0.5 }
            ],
            "smite": { "mode": "random" }
        }"#;
        let settings = Settings::from_json_str(json).expect("settings should parse");
        assert_eq!(settings.seed, 7);
        assert_eq!(settings.domains.len(), 2);
        assert_eq!(settings.domains[0].max_agents, 8);
        assert_eq!(settings.domains[1].init_agents, 30);
        assert_eq!(settings.smite.mode, SmiteMode::Random);
        assert!(settings.genome.gray_coding);
    }

    #[test]
    fn inverted_domain_population_is_rejected() {
        let mut settings = Settings::default();
        settings.domains[0].min_agents = 40;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::DomainPopulation { index: 0, .. })
        ));
    }

    #[test]
    fn bad_domain_geometry_is_rejected() {
        let mut settings = Settings::default();
        settings.domains[0].size_x = -0.5;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::DomainGeometry { index: 0, name: "size_x", .. })
        ));

        let mut settings = Settings::default();
        settings.domains[0].center_z = f32::NAN;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::DomainGeometry { name: "center_z", .. })
        ));
    }

    #[test]
    fn zero_ledger_capacity_is_rejected() {
        let mut settings = Settings::default();
        settings.ledger.domain = 0;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Zero { name: "ledger.domain" })
        ));
    }

    #[test]
    fn lockstep_requires_a_log() {
        let mut settings = Settings::default();
        settings.lockstep.enabled = true;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::MissingLockstepLog)
        ));
    }
}
