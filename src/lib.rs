mod census;
mod domain;
mod events;
mod fitness;
mod genome;
mod ledger;
mod lockstep;
mod population;
mod rules;
mod selection;
mod settings;
mod specimen;
mod stats;

pub use census::{DomainOccupancy, FoodPatchOccupancy, GeneStat, GeneStats};
pub use domain::{Domain, Patch, RectPatch};
pub use events::{
    BirthsDeathsLog, CreationOrigin, EventBuffer, EventSink, LedgerKind, LifecycleEvent,
    LockstepRecorder, NullSink,
};
pub use fitness::{FitnessInputs, complete_fitness, heuristic_fitness};
pub use genome::{Gene, GeneLayout, Genome, GenomeError, PhysicalGene, SynapseType};
pub use ledger::{Candidate, FitRecord, FitnessLedger, LeastFitPool, RankedFitness};
pub use lockstep::{LockstepCursor, LockstepError, LockstepRecord};
pub use population::{
    ComplexityProvider, DeathRecord, DomainStatus, GeneSeparation, PopulationCounters,
    PopulationError, PopulationManager, PopulationStatus, StepInput, StepReport,
};
pub use rules::{LifecycleRules, LiveRules, Quota, ReplayRules, StepQuota};
pub use selection::tournament;
pub use settings::*;
pub use specimen::{DeathCause, LifeState, Specimen, SpecimenId, Vitals};
pub use stats::{Stat, StatRecent, StatSummary};

/// Linearly maps `value` from one range onto another.
#[inline]
pub fn map_range(value: f32, from_min: f32, from_max: f32, to_min: f32, to_max: f32) -> f32 {
    assert!(from_min <= from_max, "from_min: {}, from_max: {}", from_min, from_max);
    assert!(to_min <= to_max, "to_min: {}, to_max: {}", to_min, to_max);
    if from_max == from_min {
        return to_min;
    }
    let value = value.clamp(from_min, from_max);
    (value - from_min) / (from_max - from_min) * (to_max - to_min) + to_min
}
