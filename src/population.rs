//! The per-step population state machine.
//!
//! `PopulationManager::step` runs six phases in order: domain reassignment,
//! death evaluation, birth evaluation, creation, fitness recording and
//! smiting. The host reports vitals and encounters between steps; the manager
//! owns every specimen, domain and ledger.

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use nalgebra::{Point2, center};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::census::{FoodPatchOccupancy, GeneStats};
use crate::domain::Domain;
use crate::events::{CreationOrigin, EventSink, LedgerKind, LifecycleEvent, NullSink};
use crate::fitness::{FitnessInputs, complete_fitness, heuristic_fitness};
use crate::genome::{GeneLayout, Genome};
use crate::ledger::{Candidate, FitnessLedger, LeastFitPool};
use crate::lockstep::{LockstepCursor, LockstepError};
use crate::rules::{LifecycleRules, LiveRules, Quota, ReplayRules};
use crate::selection::tournament;
use crate::settings::{Settings, SettingsError, SmiteMode};
use crate::specimen::{DeathCause, LifeState, Specimen, SpecimenId, Vitals};
use crate::stats::{Stat, StatRecent, StatSummary};

#[derive(Debug, Error)]
pub enum PopulationError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error("unknown specimen {0}")]
    UnknownSpecimen(SpecimenId),
    #[error("event sink failed: {0}")]
    Sink(#[from] io::Error),
    #[error(transparent)]
    Lockstep(#[from] LockstepError),
}

/// Supplies the externally computed complexity of a specimen's brain.
pub trait ComplexityProvider {
    fn complexity_of(&self, id: SpecimenId) -> Option<f32>;
}

/// What the host observed since the previous step.
#[derive(Debug, Clone, Default)]
pub struct StepInput {
    /// Pairs of specimens close enough to mate, in the order they met.
    pub encounters: Vec<(SpecimenId, SpecimenId)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DeathRecord {
    pub id: SpecimenId,
    pub domain: usize,
    pub cause: DeathCause,
    pub heuristic_fitness: f32,
    pub age: u64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepReport {
    pub step: u64,
    pub births: Vec<SpecimenId>,
    pub creations: Vec<(SpecimenId, CreationOrigin)>,
    pub deaths: Vec<DeathRecord>,
}

impl StepReport {
    /// Births plus creations, the inflow a lockstep log counts as births.
    pub fn inflow(&self) -> usize {
        self.births.len() + self.creations.len()
    }

    pub fn deaths_by(&self, cause: DeathCause) -> impl Iterator<Item = &DeathRecord> {
        self.deaths.iter().filter(move |d| d.cause == cause)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PopulationCounters {
    pub born: u64,
    pub forced_births: u64,
    pub created_seed: u64,
    pub created_random: u64,
    pub created_tournament: u64,
    pub created_fittest_pair: u64,
    pub created_fittest_single: u64,
    pub died_age: u64,
    pub died_energy: u64,
    pub died_fight: u64,
    pub died_edge: u64,
    pub died_smite: u64,
    /// Matings refused because the step's birth quota was already met.
    pub birth_denials: u64,
    pub energy_denials: u64,
    pub wait_denials: u64,
    /// Matings refused by the genetic-distance draw.
    pub genetic_denials: u64,
}

impl PopulationCounters {
    fn created(&mut self, origin: CreationOrigin) {
        match origin {
            CreationOrigin::Seed => self.created_seed += 1,
            CreationOrigin::Random => self.created_random += 1,
            CreationOrigin::Tournament => self.created_tournament += 1,
            CreationOrigin::FittestPair => self.created_fittest_pair += 1,
            CreationOrigin::FittestSingle => self.created_fittest_single += 1,
        }
    }

    fn died(&mut self, cause: DeathCause) {
        match cause {
            DeathCause::Age => self.died_age += 1,
            DeathCause::Energy => self.died_energy += 1,
            DeathCause::Fight => self.died_fight += 1,
            DeathCause::Edge => self.died_edge += 1,
            DeathCause::Smite => self.died_smite += 1,
        }
    }

    pub fn total_created(&self) -> u64 {
        self.created_seed
            + self.created_random
            + self.created_tournament
            + self.created_fittest_pair
            + self.created_fittest_single
    }

    pub fn total_died(&self) -> u64 {
        self.died_age + self.died_energy + self.died_fight + self.died_edge + self.died_smite
    }
}

/// Pairwise genetic distance over the living population.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeneSeparation {
    pub step: u64,
    pub min: f32,
    pub max: f32,
    pub mean: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainStatus {
    pub index: usize,
    pub agents: usize,
    pub created: u64,
    pub born: u64,
    pub died: u64,
    pub smited: u64,
    pub max_gap_create: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PopulationStatus {
    pub step: u64,
    pub living: usize,
    pub rules: &'static str,
    pub domains: Vec<DomainStatus>,
    pub counters: PopulationCounters,
    pub lifespan: StatSummary,
    pub recent_lifespan: StatSummary,
    pub recent_life_fraction: StatSummary,
    /// Neuron groups of every specimen ever added.
    pub neuron_groups: StatSummary,
    pub current_neuron_groups: StatSummary,
    pub current_neurons: StatSummary,
    pub gene_separation: Option<GeneSeparation>,
    pub gene_stats: Option<GeneStats>,
    pub food_patches: Option<FoodPatchOccupancy>,
}

pub struct PopulationManager {
    settings: Settings,
    layout: Arc<GeneLayout>,
    rng: ChaCha12Rng,
    step: u64,
    specimens: BTreeMap<SpecimenId, Specimen>,
    /// Specimens that died this step, awaiting fitness recording.
    dying: Vec<Specimen>,
    next_id: u64,
    initial_population: u64,
    domains: Vec<Domain>,
    fittest: FitnessLedger,
    recent_fittest: FitnessLedger,
    counters: PopulationCounters,
    lifespan: Stat,
    recent_lifespan: StatRecent,
    recent_life_fraction: StatRecent,
    neuron_groups: Stat,
    gene_separation: Option<GeneSeparation>,
    gene_stats: Option<GeneStats>,
    food_patches: Option<FoodPatchOccupancy>,
    rules: Box<dyn LifecycleRules>,
    sink: Box<dyn EventSink>,
    complexity: Option<Box<dyn ComplexityProvider>>,
}

impl PopulationManager {
    pub fn new(settings: Settings) -> Result<Self, PopulationError> {
        settings.validate()?;
        let layout = Arc::new(GeneLayout::new(&settings.genome));
        let domains = settings
            .domains
            .iter()
            .enumerate()
            .map(|(index, domain)| {
                Domain::new(index, domain, settings.world_size, settings.ledger.domain)
            })
            .collect();
        let rules: Box<dyn LifecycleRules> = if settings.lockstep.enabled {
            let path = settings
                .lockstep
                .log_path
                .as_ref()
                .ok_or(SettingsError::MissingLockstepLog)?;
            info!(path = %path.display(), "lockstep replay engaged");
            Box::new(ReplayRules::new(LockstepCursor::open(path)?))
        } else {
            Box::new(LiveRules)
        };
        Ok(PopulationManager {
            layout,
            rng: ChaCha12Rng::seed_from_u64(settings.seed),
            step: 0,
            specimens: BTreeMap::new(),
            dying: Vec::new(),
            next_id: 1,
            initial_population: 0,
            domains,
            fittest: FitnessLedger::new(settings.ledger.fittest),
            recent_fittest: FitnessLedger::new(settings.ledger.recent),
            counters: PopulationCounters::default(),
            lifespan: Stat::new(),
            recent_lifespan: StatRecent::new(settings.stats.lifespan_window),
            recent_life_fraction: StatRecent::new(settings.stats.life_fraction_window),
            neuron_groups: Stat::new(),
            gene_separation: None,
            gene_stats: None,
            food_patches: None,
            rules,
            sink: Box::new(NullSink),
            complexity: None,
            settings,
        })
    }

    pub fn with_rules(mut self, rules: Box<dyn LifecycleRules>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_event_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_complexity(mut self, provider: impl ComplexityProvider + 'static) -> Self {
        self.complexity = Some(Box::new(provider));
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn layout(&self) -> &Arc<GeneLayout> {
        &self.layout
    }

    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn specimen(&self, id: SpecimenId) -> Option<&Specimen> {
        self.specimens.get(&id)
    }

    pub fn living(&self) -> impl Iterator<Item = &Specimen> {
        self.specimens.values()
    }

    pub fn num_living(&self) -> usize {
        self.specimens.len()
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn domain(&self, index: usize) -> Option<&Domain> {
        self.domains.get(index)
    }

    /// For attaching food and brick patches.
    pub fn domain_mut(&mut self, index: usize) -> Option<&mut Domain> {
        self.domains.get_mut(index)
    }

    pub fn fittest(&self) -> &FitnessLedger {
        &self.fittest
    }

    pub fn recent_fittest(&self) -> &FitnessLedger {
        &self.recent_fittest
    }

    pub fn counters(&self) -> &PopulationCounters {
        &self.counters
    }

    pub fn rules_name(&self) -> &'static str {
        self.rules.name()
    }

    pub fn update_vitals(&mut self, id: SpecimenId, vitals: &Vitals) -> Result<(), PopulationError> {
        self.specimens
            .get_mut(&id)
            .ok_or(PopulationError::UnknownSpecimen(id))?
            .apply(vitals);
        Ok(())
    }

    /// Creates each domain's initial population.
    pub fn seed_initial(&mut self) -> Result<Vec<SpecimenId>, PopulationError> {
        let mut created = Vec::new();
        for index in 0..self.domains.len() {
            let domain = &self.domains[index];
            let (init, seeds, mutation) = (
                domain.init_agents,
                domain.seed_count,
                domain.seed_mutation_probability,
            );
            for k in 0..init {
                let (genome, origin) = if k < seeds {
                    let mut genome = Genome::seeded(&self.layout);
                    if self.rng.random::<f32>() < mutation {
                        genome.mutate(&mut self.rng);
                    }
                    (genome, CreationOrigin::Seed)
                } else {
                    (
                        Genome::random(&self.layout, &mut self.rng, None),
                        CreationOrigin::Random,
                    )
                };
                let position = self.random_position(index);
                let id = self.spawn(genome, index, position, self.settings.max_energy);
                self.domains[index].num_created += 1;
                self.counters.created(origin);
                self.emit(LifecycleEvent::Creation {
                    step: self.step,
                    id,
                    domain: index,
                    origin,
                })?;
                created.push(id);
            }
        }
        self.initial_population = created.len() as u64;
        info!(
            agents = created.len(),
            domains = self.domains.len(),
            "initial population created"
        );
        Ok(created)
    }

    /// Advances one step.
    pub fn step(&mut self, input: &StepInput) -> Result<StepReport, PopulationError> {
        self.step += 1;
        let step = self.step;
        let quota = self.rules.begin_step(step)?;
        let mut report = StepReport {
            step,
            ..StepReport::default()
        };

        self.reassign_domains()?;
        self.refresh_heuristics();
        self.evaluate_deaths(quota.deaths, &mut report)?;
        self.evaluate_births(quota.births, input, &mut report)?;
        if self.rules.population_control() {
            self.replenish(&mut report)?;
        }
        self.record_fitness();
        self.emit_snapshots()?;
        if self.rules.population_control() {
            self.smite(&mut report)?;
            self.record_fitness();
        }

        let recording = &self.settings.recording;
        if due(recording.gene_separation_frequency, step) {
            self.gene_separation = self.gene_separation();
        }
        if due(recording.gene_stats_frequency, step) {
            self.gene_stats = Some(GeneStats::collect(
                step,
                &self.layout,
                self.specimens.values().map(|s| &s.genome),
            ));
        }
        if due(recording.food_patch_stats_frequency, step) {
            self.food_patches = Some(FoodPatchOccupancy::collect(
                step,
                &self.domains,
                self.specimens.values(),
                recording.food_patch_near_distance,
            ));
        }
        self.debug_assert_counts();
        debug!(
            step,
            living = self.specimens.len(),
            births = report.births.len(),
            creations = report.creations.len(),
            deaths = report.deaths.len(),
            "step complete"
        );
        Ok(report)
    }

    /// Flushes the event sink.
    pub fn finish(&mut self) -> Result<(), PopulationError> {
        self.sink.flush()?;
        Ok(())
    }

    /// Domain holding `position`, checking `current` first.
    pub fn which_domain(&self, position: Point2<f32>, current: usize) -> usize {
        if self.domains[current].contains(position) {
            return current;
        }
        self.domains
            .iter()
            .position(|domain| domain.contains(position))
            .unwrap_or(current)
    }

    /// Moves a specimen between domains.
    pub fn switch_domain(&mut self, id: SpecimenId, new: usize) -> Result<(), PopulationError> {
        let specimen = self
            .specimens
            .get_mut(&id)
            .ok_or(PopulationError::UnknownSpecimen(id))?;
        let old = specimen.domain;
        if old == new {
            return Ok(());
        }
        specimen.domain = new;
        self.domains[old].remove_agent();
        self.domains[new].add_agent();
        Ok(())
    }

    /// Tournament over living specimens, restricted to `domain` when given.
    pub fn pick_parents_using_tournament(
        &mut self,
        domain: Option<usize>,
    ) -> Option<(SpecimenId, SpecimenId)> {
        let (ids, fitness): (Vec<SpecimenId>, Vec<f32>) = self
            .specimens
            .values()
            .filter(|s| domain.is_none_or(|d| s.domain == d))
            .map(|s| (s.id, s.heuristic_fitness))
            .unzip();
        let pool = self.settings.creation.tournament_pool_size;
        tournament(&fitness, pool, &mut self.rng).map(|(a, b)| (ids[a], ids[b]))
    }

    /// Whether the host should record this specimen's brain anatomy.
    pub fn should_record_brain(&self, id: SpecimenId) -> bool {
        let recording = &self.settings.recording;
        recording.record_all_brains
            || (recording.record_seed_brains && id.0 <= self.initial_population)
            || recording.best_so_far_frequency > 0
            || recording.best_recent_frequency > 0
    }

    /// Minimum, maximum and mean pairwise distance over the living population.
    pub fn gene_separation(&self) -> Option<GeneSeparation> {
        let genomes: Vec<&Genome> = self.specimens.values().map(|s| &s.genome).collect();
        let n = genomes.len();
        if n < 2 {
            return None;
        }
        let (min, max, sum, pairs) = (0..n)
            .into_par_iter()
            .map(|i| {
                genomes[i + 1..]
                    .iter()
                    .map(|other| genomes[i].hamming(other) as u64)
                    .fold((u64::MAX, 0u64, 0u64, 0u64), |(lo, hi, sum, count), d| {
                        (lo.min(d), hi.max(d), sum + d, count + 1)
                    })
            })
            .reduce(
                || (u64::MAX, 0, 0, 0),
                |a, b| (a.0.min(b.0), a.1.max(b.1), a.2 + b.2, a.3 + b.3),
            );
        let bits = (self.layout.num_bytes() * 8) as f64;
        Some(GeneSeparation {
            step: self.step,
            min: (min as f64 / bits) as f32,
            max: (max as f64 / bits) as f32,
            mean: (sum as f64 / pairs as f64 / bits) as f32,
        })
    }

    pub fn last_gene_separation(&self) -> Option<GeneSeparation> {
        self.gene_separation
    }

    pub fn last_gene_stats(&self) -> Option<&GeneStats> {
        self.gene_stats.as_ref()
    }

    pub fn last_food_patch_occupancy(&self) -> Option<&FoodPatchOccupancy> {
        self.food_patches.as_ref()
    }

    pub fn status(&mut self) -> PopulationStatus {
        let mut current_neuron_groups = Stat::new();
        let mut current_neurons = Stat::new();
        for specimen in self.specimens.values() {
            current_neuron_groups.add(specimen.genome.neuron_groups() as f32);
            current_neurons.add(specimen.genome.neuron_count() as f32);
        }
        PopulationStatus {
            step: self.step,
            living: self.specimens.len(),
            rules: self.rules.name(),
            domains: self
                .domains
                .iter()
                .map(|d| DomainStatus {
                    index: d.index,
                    agents: d.num_agents,
                    created: d.num_created,
                    born: d.num_born,
                    died: d.num_died,
                    smited: d.num_smited,
                    max_gap_create: d.max_gap_create,
                })
                .collect(),
            counters: self.counters.clone(),
            lifespan: self.lifespan.summary(),
            recent_lifespan: self.recent_lifespan.summary(),
            recent_life_fraction: self.recent_life_fraction.summary(),
            neuron_groups: self.neuron_groups.summary(),
            current_neuron_groups: current_neuron_groups.summary(),
            current_neurons: current_neurons.summary(),
            gene_separation: self.gene_separation,
            gene_stats: self.gene_stats.clone(),
            food_patches: self.food_patches.clone(),
        }
    }

    fn emit(&mut self, event: LifecycleEvent) -> Result<(), PopulationError> {
        self.sink.record(&event)?;
        Ok(())
    }

    fn random_position(&mut self, domain: usize) -> Point2<f32> {
        let (start, end) = (self.domains[domain].start, self.domains[domain].end);
        Point2::new(
            self.rng.random_range(start.x..=end.x),
            self.rng.random_range(start.y..=end.y),
        )
    }

    fn spawn(&mut self, genome: Genome, domain: usize, position: Point2<f32>, energy: f32) -> SpecimenId {
        let id = SpecimenId(self.next_id);
        self.next_id += 1;
        self.neuron_groups.add(genome.neuron_groups() as f32);
        let specimen = Specimen::new(
            id,
            genome,
            domain,
            self.step,
            position,
            energy.min(self.settings.max_energy),
            self.settings.max_energy,
        );
        self.specimens.insert(id, specimen);
        self.domains[domain].add_agent();
        id
    }

    fn reassign_domains(&mut self) -> Result<(), PopulationError> {
        let moves: Vec<(SpecimenId, usize)> = self
            .specimens
            .values()
            .filter_map(|s| {
                let new = self.which_domain(s.position, s.domain);
                (new != s.domain).then_some((s.id, new))
            })
            .collect();
        for (id, new) in moves {
            self.switch_domain(id, new)?;
        }
        Ok(())
    }

    fn refresh_heuristics(&mut self) {
        let (step, wait) = (self.step, self.settings.mating.wait);
        for specimen in self.specimens.values_mut() {
            let inputs = FitnessInputs::of(specimen, step, wait);
            specimen.heuristic_fitness = heuristic_fitness(&self.settings.fitness, &inputs);
        }
    }

    fn death_cause(&self, specimen: &Specimen) -> Option<DeathCause> {
        if specimen.age(self.step) >= specimen.genome.lifespan() {
            Some(DeathCause::Age)
        } else if specimen.energy <= self.settings.min_energy {
            Some(DeathCause::Energy)
        } else if specimen.killed_in_fight {
            Some(DeathCause::Fight)
        } else if specimen.crossed_edge && self.settings.lethal_edges {
            Some(DeathCause::Edge)
        } else {
            None
        }
    }

    fn kill(
        &mut self,
        id: SpecimenId,
        cause: DeathCause,
        report: &mut StepReport,
    ) -> Result<(), PopulationError> {
        let mut specimen = self
            .specimens
            .remove(&id)
            .ok_or(PopulationError::UnknownSpecimen(id))?;
        let step = self.step;
        specimen.state = LifeState::Dead;
        specimen.death_step = Some(step);

        let domain = &mut self.domains[specimen.domain];
        domain.remove_agent();
        domain.num_died += 1;
        if cause == DeathCause::Smite {
            domain.num_smited += 1;
        }
        domain.note_gap(step);
        self.counters.died(cause);

        let age = specimen.age(step);
        let lifespan = specimen.genome.lifespan().max(1);
        self.lifespan.add(age as f32);
        self.recent_lifespan.add(age as f32);
        self.recent_life_fraction.add(age as f32 / lifespan as f32);

        report.deaths.push(DeathRecord {
            id,
            domain: specimen.domain,
            cause,
            heuristic_fitness: specimen.heuristic_fitness,
            age,
        });
        self.emit(LifecycleEvent::Death {
            step,
            id,
            domain: specimen.domain,
            cause,
        })?;
        self.dying.push(specimen);
        Ok(())
    }

    fn evaluate_deaths(&mut self, quota: Quota, report: &mut StepReport) -> Result<(), PopulationError> {
        let candidates: Vec<(SpecimenId, DeathCause)> = self
            .specimens
            .values()
            .filter_map(|s| self.death_cause(s).map(|cause| (s.id, cause)))
            .collect();
        let required = match quota {
            Quota::Live => {
                for (id, cause) in candidates {
                    self.kill(id, cause, report)?;
                }
                return Ok(());
            }
            Quota::Exactly(required) => required,
        };

        for &(id, cause) in candidates.iter().take(required) {
            self.kill(id, cause, report)?;
        }
        let shortfall = required.saturating_sub(candidates.len());
        if shortfall == 0 {
            return Ok(());
        }
        for id in self.choose_victims(None, shortfall) {
            self.kill(id, DeathCause::Smite, report)?;
        }
        let missing = required.saturating_sub(report.deaths.len());
        if missing > 0 {
            warn!(step = self.step, missing, "not enough specimens to replay deaths");
        }
        Ok(())
    }

    /// Up to `count` victims by the smite mode, from `domain` or everywhere.
    fn choose_victims(&mut self, domain: Option<usize>, count: usize) -> Vec<SpecimenId> {
        let mut ids: Vec<SpecimenId> = self
            .specimens
            .values()
            .filter(|s| domain.is_none_or(|d| s.domain == d))
            .map(|s| s.id)
            .collect();
        match self.settings.smite.mode {
            SmiteMode::LeastFit => {
                let mut pool = LeastFitPool::new();
                let step = self.step;
                pool.refresh(
                    step,
                    ids.iter().map(|id| self.candidate(&self.specimens[id])),
                    count,
                );
                pool.candidates().map(|c| c.id).collect()
            }
            SmiteMode::Random => {
                let mut victims = Vec::with_capacity(count);
                while victims.len() < count && !ids.is_empty() {
                    let pick = self.rng.random_range(0..ids.len());
                    victims.push(ids.swap_remove(pick));
                }
                victims
            }
        }
    }

    fn candidate(&self, specimen: &Specimen) -> Candidate {
        Candidate {
            id: specimen.id,
            heuristic_fitness: specimen.heuristic_fitness,
            age: specimen.age(self.step),
        }
    }

    fn evaluate_births(
        &mut self,
        quota: Quota,
        input: &StepInput,
        report: &mut StepReport,
    ) -> Result<(), PopulationError> {
        let mating = self.settings.mating.clone();
        for &(first, second) in &input.encounters {
            if first == second {
                continue;
            }
            let (Some(a), Some(b)) = (self.specimens.get(&first), self.specimens.get(&second))
            else {
                continue;
            };
            if let Quota::Exactly(required) = quota {
                if report.inflow() >= required {
                    self.counters.birth_denials += 1;
                    continue;
                }
            }
            if a.energy_fraction() < mating.energy_threshold
                || b.energy_fraction() < mating.energy_threshold
            {
                self.counters.energy_denials += 1;
                continue;
            }
            if !a.mate_wait_elapsed(self.step, mating.wait)
                || !b.mate_wait_elapsed(self.step, mating.wait)
            {
                self.counters.wait_denials += 1;
                continue;
            }
            let unrestricted = self.domains[a.domain].num_born_since_created < mating.misc_agents;
            if !unrestricted {
                let probability = a.genome.mate_probability(&b.genome, &mating);
                if self.rng.random::<f32>() >= probability {
                    self.counters.genetic_denials += 1;
                    continue;
                }
            }
            self.give_birth(first, second, report)?;
        }

        let Quota::Exactly(required) = quota else {
            return Ok(());
        };
        while report.inflow() < required {
            match self.pick_parents_using_tournament(None) {
                Some((first, second)) => {
                    self.give_birth(first, second, report)?;
                    self.counters.forced_births += 1;
                }
                None => {
                    let domain = self.sparsest_domain();
                    self.create(domain, CreationOrigin::Random, report)?;
                }
            }
        }
        Ok(())
    }

    fn give_birth(
        &mut self,
        first: SpecimenId,
        second: SpecimenId,
        report: &mut StepReport,
    ) -> Result<SpecimenId, PopulationError> {
        let step = self.step;
        let (genome, energy, position, home) = {
            let a = self
                .specimens
                .get(&first)
                .ok_or(PopulationError::UnknownSpecimen(first))?;
            let b = self
                .specimens
                .get(&second)
                .ok_or(PopulationError::UnknownSpecimen(second))?;
            let genome = Genome::crossover(&a.genome, &b.genome, true, &mut self.rng);
            (
                genome,
                (a.energy * a.genome.mate_energy(), b.energy * b.genome.mate_energy()),
                center(&a.position, &b.position),
                a.domain,
            )
        };
        for (id, contribution) in [(first, energy.0), (second, energy.1)] {
            if let Some(parent) = self.specimens.get_mut(&id) {
                parent.energy -= contribution;
                parent.num_mates += 1;
                parent.last_mate_step = Some(step);
            }
        }

        let domain = self.which_domain(position, home);
        let child = self.spawn(genome, domain, position, energy.0 + energy.1);
        if let Some(specimen) = self.specimens.get_mut(&child) {
            specimen.parents = Some((first, second));
        }
        self.domains[domain].note_birth();
        self.counters.born += 1;
        report.births.push(child);
        self.emit(LifecycleEvent::Birth {
            step,
            child,
            parents: (first, second),
            domain,
        })?;
        Ok(child)
    }

    fn sparsest_domain(&self) -> usize {
        self.domains
            .iter()
            .min_by_key(|d| d.num_agents)
            .map_or(0, |d| d.index)
    }

    /// Refills domains below their floor and paces creations below the initial size.
    fn replenish(&mut self, report: &mut StepReport) -> Result<(), PopulationError> {
        let creation = self.settings.creation.clone();
        for index in 0..self.domains.len() {
            while self.domains[index].is_below_min() {
                let origin = self.creation_origin(index);
                self.create(index, origin, report)?;
            }
            let domain = &mut self.domains[index];
            if creation.replenish_to_init && domain.num_agents < domain.init_agents {
                let window = creation.min_window.max(domain.max_gap_create);
                if domain.creations_within(self.step, window) < creation.max_per_window {
                    let origin = self.creation_origin(index);
                    self.create(index, origin, report)?;
                }
            }
        }
        Ok(())
    }

    fn creation_origin(&mut self, domain: usize) -> CreationOrigin {
        let creation = &self.settings.creation;
        if self.rng.random::<f32>() < creation.random_probability {
            return CreationOrigin::Random;
        }
        let living = self.domains[domain].num_agents;
        if living >= 2 {
            return CreationOrigin::Tournament;
        }
        if creation.use_fittest_ledger {
            match self.domains[domain].fittest.len() {
                0 => {}
                1 => return CreationOrigin::FittestSingle,
                _ => return CreationOrigin::FittestPair,
            }
        }
        CreationOrigin::Random
    }

    fn create(
        &mut self,
        domain: usize,
        origin: CreationOrigin,
        report: &mut StepReport,
    ) -> Result<SpecimenId, PopulationError> {
        let (genome, origin) = match origin {
            CreationOrigin::Tournament => match self.pick_parents_using_tournament(Some(domain)) {
                Some((a, b)) => (
                    Genome::crossover(
                        &self.specimens[&a].genome,
                        &self.specimens[&b].genome,
                        true,
                        &mut self.rng,
                    ),
                    origin,
                ),
                None => (self.random_genome(), CreationOrigin::Random),
            },
            CreationOrigin::FittestPair => match self.domains[domain].next_fit_pair() {
                Some((i, j)) => {
                    let ledger = &self.domains[domain].fittest;
                    match (ledger.get(i), ledger.get(j)) {
                        (Some(a), Some(b)) => (
                            Genome::crossover(&a.genome, &b.genome, true, &mut self.rng),
                            origin,
                        ),
                        _ => (self.random_genome(), CreationOrigin::Random),
                    }
                }
                None => (self.random_genome(), CreationOrigin::Random),
            },
            CreationOrigin::FittestSingle => match self.domains[domain].fittest.best() {
                Some(best) => {
                    let mut genome = best.genome.clone();
                    genome.mutate(&mut self.rng);
                    (genome, origin)
                }
                None => (self.random_genome(), CreationOrigin::Random),
            },
            CreationOrigin::Seed => {
                let mut genome = Genome::seeded(&self.layout);
                genome.mutate(&mut self.rng);
                (genome, origin)
            }
            CreationOrigin::Random => (self.random_genome(), origin),
        };

        let position = self.random_position(domain);
        let id = self.spawn(genome, domain, position, self.settings.max_energy);
        let history = self.settings.creation.max_per_window;
        self.domains[domain].note_creation(self.step, history);
        self.counters.created(origin);
        report.creations.push((id, origin));
        debug!(step = self.step, %id, domain, ?origin, "specimen created");
        self.emit(LifecycleEvent::Creation {
            step: self.step,
            id,
            domain,
            origin,
        })?;
        Ok(id)
    }

    fn random_genome(&mut self) -> Genome {
        Genome::random(&self.layout, &mut self.rng, None)
    }

    /// Records complete fitness of everything that died since the last call.
    fn record_fitness(&mut self) {
        let weights = &self.settings.fitness;
        for specimen in self.dying.drain(..) {
            let complexity = self
                .complexity
                .as_ref()
                .and_then(|provider| provider.complexity_of(specimen.id))
                .unwrap_or(0.0);
            let fitness = complete_fitness(weights, specimen.heuristic_fitness, complexity);
            self.fittest
                .record(specimen.id, fitness, complexity, &specimen.genome);
            self.recent_fittest
                .record(specimen.id, fitness, complexity, &specimen.genome);
            self.domains[specimen.domain]
                .fittest
                .record(specimen.id, fitness, complexity, &specimen.genome);
        }
    }

    fn emit_snapshots(&mut self) -> Result<(), PopulationError> {
        let step = self.step;
        let recording = &self.settings.recording;
        if due(recording.best_so_far_frequency, step) {
            let ranked = self.fittest.top(self.fittest.capacity());
            self.sink
                .fitness_snapshot(step, LedgerKind::BestSoFar, &ranked)?;
            for domain in &self.domains {
                let ranked = domain.fittest.top(domain.fittest.capacity());
                self.sink
                    .fitness_snapshot(step, LedgerKind::Domain(domain.index), &ranked)?;
            }
        }
        if due(recording.best_recent_frequency, step) {
            let ranked = self.recent_fittest.top(self.recent_fittest.capacity());
            self.sink
                .fitness_snapshot(step, LedgerKind::BestRecent, &ranked)?;
        }
        let epoch = self.settings.ledger.recent_epoch;
        if due(epoch, step) {
            debug!(step, "recent fitness ledger cleared");
            self.recent_fittest.clear();
        }
        Ok(())
    }

    fn smite(&mut self, report: &mut StepReport) -> Result<(), PopulationError> {
        for index in 0..self.domains.len() {
            let excess = self.domains[index].excess();
            if excess == 0 {
                continue;
            }
            let victims = match self.settings.smite.mode {
                SmiteMode::LeastFit => self.least_fit_victims(index, excess),
                SmiteMode::Random => self.choose_victims(Some(index), excess),
            };
            for id in victims {
                self.kill(id, DeathCause::Smite, report)?;
            }
            debug!(step = self.step, domain = index, excess, "domain smited");
        }
        Ok(())
    }

    fn least_fit_victims(&mut self, index: usize, excess: usize) -> Vec<SpecimenId> {
        let step = self.step;
        let smite = &self.settings.smite;
        let domain = &self.domains[index];
        let stale = domain
            .least_fit
            .refreshed_at()
            .is_none_or(|at| step.saturating_sub(at) >= smite.refresh_interval);
        if stale || domain.least_fit.is_empty() {
            let max_len = (smite.fraction * domain.num_agents as f32).ceil() as usize;
            let candidates: Vec<Candidate> = self
                .specimens
                .values()
                .filter(|s| s.domain == index)
                .filter(|s| {
                    s.age(step) as f32 >= smite.age_fraction * s.genome.lifespan() as f32
                })
                .map(|s| self.candidate(s))
                .collect();
            self.domains[index]
                .least_fit
                .refresh(step, candidates, max_len);
        }

        let mut victims = Vec::with_capacity(excess);
        while victims.len() < excess {
            let Some(candidate) = self.domains[index].least_fit.pop_victim() else {
                break;
            };
            let eligible = self
                .specimens
                .get(&candidate.id)
                .is_some_and(|s| s.domain == index)
                && !victims.contains(&candidate.id);
            if eligible {
                victims.push(candidate.id);
            }
        }
        if victims.len() < excess {
            // Pool ran dry; the rest come from the whole domain, least fit first.
            let mut others: Vec<Candidate> = self
                .specimens
                .values()
                .filter(|s| s.domain == index && !victims.contains(&s.id))
                .map(|s| self.candidate(s))
                .collect();
            others.sort_by(|a, b| {
                a.heuristic_fitness
                    .total_cmp(&b.heuristic_fitness)
                    .then(b.age.cmp(&a.age))
            });
            victims.extend(others.iter().take(excess - victims.len()).map(|c| c.id));
        }
        victims
    }

    fn debug_assert_counts(&self) {
        if cfg!(debug_assertions) {
            for domain in &self.domains {
                let assigned = self
                    .specimens
                    .values()
                    .filter(|s| s.domain == domain.index)
                    .count();
                debug_assert_eq!(
                    domain.num_agents, assigned,
                    "domain {} count out of sync",
                    domain.index
                );
            }
        }
    }
}

fn due(frequency: u64, step: u64) -> bool {
    frequency > 0 && step % frequency == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::DomainSettings;

    fn manager(settings: Settings) -> PopulationManager {
        let mut manager = PopulationManager::new(settings).unwrap();
        manager.seed_initial().unwrap();
        manager
    }

    #[test]
    fn seeding_fills_every_domain() {
        let mut settings = Settings::default();
        settings.domains[0].seed_count = 4;
        let manager = manager(settings);
        assert_eq!(manager.num_living(), 30);
        assert_eq!(manager.counters().created_seed, 4);
        assert_eq!(manager.counters().created_random, 26);
        assert_eq!(manager.domain(0).unwrap().num_created(), 30);
    }

    #[test]
    fn identical_seeds_have_no_separation() {
        let mut settings = Settings::default();
        settings.domains[0].seed_count = settings.domains[0].init_agents;
        let manager = manager(settings);
        let separation = manager.gene_separation().unwrap();
        assert_eq!((separation.min, separation.max, separation.mean), (0.0, 0.0, 0.0));
    }

    #[test]
    fn separation_is_bounded() {
        let manager = manager(Settings::default());
        let separation = manager.gene_separation().unwrap();
        assert!(0.0 <= separation.min);
        assert!(separation.min <= separation.mean);
        assert!(separation.mean <= separation.max);
        assert!(separation.max <= 1.0);
    }

    #[test]
    fn tournament_parents_are_distinct_and_local() {
        let mut settings = Settings::default();
        let half = DomainSettings {
            center_x: 0.25,
            size_x: 0.5,
            ..DomainSettings::default()
        };
        settings.domains = vec![
            half.clone(),
            DomainSettings {
                center_x: 0.75,
                ..half
            },
        ];
        let mut manager = manager(settings);
        for _ in 0..20 {
            let (a, b) = manager.pick_parents_using_tournament(Some(1)).unwrap();
            assert_ne!(a, b);
            assert_eq!(manager.specimen(a).unwrap().domain(), 1);
            assert_eq!(manager.specimen(b).unwrap().domain(), 1);
        }
    }

    #[test]
    fn brain_recording_choices() {
        let mut settings = Settings::default();
        settings.recording.record_seed_brains = true;
        let manager = manager(settings);
        assert!(manager.should_record_brain(SpecimenId(30)));
        assert!(!manager.should_record_brain(SpecimenId(31)));

        let mut settings = Settings::default();
        settings.recording.best_recent_frequency = 100;
        let manager = PopulationManager::new(settings).unwrap();
        assert!(manager.should_record_brain(SpecimenId(1_000)));
    }

    #[test]
    fn unknown_specimens_are_reported() {
        let mut manager = manager(Settings::default());
        let vitals = Vitals {
            energy: 1.0,
            max_energy: 1.0,
            position: Point2::origin(),
            distance_moved: 0.0,
            food_energy: 0.0,
            killed_in_fight: false,
            crossed_edge: false,
        };
        assert!(matches!(
            manager.update_vitals(SpecimenId(999), &vitals),
            Err(PopulationError::UnknownSpecimen(SpecimenId(999)))
        ));
    }

    #[test]
    fn edges_kill_only_when_lethal() {
        for lethal in [false, true] {
            let mut settings = Settings::default();
            settings.lethal_edges = lethal;
            let mut manager = manager(settings);
            let specimen = manager.living().next().unwrap();
            let id = specimen.id();
            let vitals = Vitals {
                energy: specimen.energy(),
                max_energy: specimen.max_energy(),
                position: specimen.position(),
                distance_moved: 0.0,
                food_energy: 0.0,
                killed_in_fight: false,
                crossed_edge: true,
            };
            manager.update_vitals(id, &vitals).unwrap();
            let report = manager.step(&StepInput::default()).unwrap();
            assert_eq!(report.deaths_by(DeathCause::Edge).count(), usize::from(lethal));
            assert_eq!(manager.counters().died_edge, u64::from(lethal));
        }
    }

    #[test]
    fn recent_ledger_clears_each_epoch() {
        let mut settings = Settings::default();
        settings.genome.lifespan = crate::settings::Span::new(2.0, 3.0);
        settings.ledger.recent_epoch = 5;
        let mut manager = manager(settings);
        for _ in 0..4 {
            manager.step(&StepInput::default()).unwrap();
        }
        assert!(!manager.recent_fittest().is_empty());
        manager.step(&StepInput::default()).unwrap();
        assert!(manager.recent_fittest().is_empty());
        assert!(!manager.fittest().is_empty());
    }

    #[test]
    fn census_stats_follow_their_frequencies() {
        let mut settings = Settings::default();
        settings.domains[0].seed_count = settings.domains[0].init_agents;
        settings.recording.gene_stats_frequency = 2;
        settings.recording.food_patch_stats_frequency = 2;
        let mut manager = manager(settings);
        let world = manager.settings().world_size;
        manager.domain_mut(0).unwrap().add_food_patch(Box::new(
            crate::domain::RectPatch::new(Point2::new(world / 2.0, world / 2.0), world, world),
        ));

        manager.step(&StepInput::default()).unwrap();
        assert!(manager.last_gene_stats().is_none());
        assert!(manager.last_food_patch_occupancy().is_none());

        manager.step(&StepInput::default()).unwrap();
        let genes = manager.last_gene_stats().unwrap();
        assert_eq!(genes.step, 2);
        assert_eq!(genes.samples, 30);
        assert_eq!(genes.genes.len(), manager.layout().num_bytes());
        let occupancy = manager.last_food_patch_occupancy().unwrap();
        assert_eq!(occupancy.domains[0].in_patch, vec![30]);
        assert_eq!(occupancy.domains[0].not_in_or_near_any, 0);

        let status = manager.status();
        assert_eq!(status.neuron_groups.samples, 30);
        assert_eq!(status.current_neuron_groups.stddev, 0.0);
        assert!(status.current_neurons.mean >= status.current_neuron_groups.mean);
        assert!(status.gene_stats.is_some());
    }

    #[test]
    fn status_serializes() {
        let mut manager = manager(Settings::default());
        manager.step(&StepInput::default()).unwrap();
        let status = manager.status();
        assert_eq!(status.step, 1);
        assert_eq!(status.rules, "live");
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"counters\""));
    }
}
