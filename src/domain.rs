use std::collections::VecDeque;

use nalgebra::Point2;

use crate::ledger::{FitnessLedger, LeastFitPool};
use crate::settings::DomainSettings;

/// A food or brick region supplied by the world host.
pub trait Patch: Send + Sync {
    fn point_is_inside(&self, x: f32, z: f32, tolerance: f32) -> bool;
}

/// Axis-aligned rectangular patch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RectPatch {
    pub center: Point2<f32>,
    pub size_x: f32,
    pub size_z: f32,
}

impl RectPatch {
    pub fn new(center: Point2<f32>, size_x: f32, size_z: f32) -> Self {
        Self {
            center,
            size_x,
            size_z,
        }
    }
}

impl Patch for RectPatch {
    fn point_is_inside(&self, x: f32, z: f32, tolerance: f32) -> bool {
        (x - self.center.x).abs() <= self.size_x / 2.0 + tolerance
            && (z - self.center.y).abs() <= self.size_z / 2.0 + tolerance
    }
}

/// A spatial partition of the world with its own population bounds.
pub struct Domain {
    pub(crate) index: usize,
    pub(crate) start: Point2<f32>,
    pub(crate) end: Point2<f32>,
    pub(crate) min_agents: usize,
    pub(crate) init_agents: usize,
    pub(crate) max_agents: usize,
    pub(crate) seed_count: usize,
    pub(crate) seed_mutation_probability: f32,
    food_patches: Vec<Box<dyn Patch>>,
    brick_patches: Vec<Box<dyn Patch>>,
    pub(crate) num_agents: usize,
    pub(crate) num_created: u64,
    pub(crate) num_born: u64,
    pub(crate) num_born_since_created: u64,
    pub(crate) num_died: u64,
    pub(crate) num_smited: u64,
    pub(crate) last_create: u64,
    pub(crate) max_gap_create: u64,
    recent_creations: VecDeque<u64>,
    pub(crate) fittest: FitnessLedger,
    pub(crate) least_fit: LeastFitPool,
    ifit: usize,
    jfit: usize,
}

impl Domain {
    pub fn new(
        index: usize,
        settings: &DomainSettings,
        world_size: f32,
        ledger_capacity: usize,
    ) -> Domain {
        let half_x = settings.size_x * world_size / 2.0;
        let half_z = settings.size_z * world_size / 2.0;
        let center_x = settings.center_x * world_size;
        let center_z = settings.center_z * world_size;
        Domain {
            index,
            start: Point2::new(center_x - half_x, center_z - half_z),
            end: Point2::new(center_x + half_x, center_z + half_z),
            min_agents: settings.min_agents,
            init_agents: settings.init_agents,
            max_agents: settings.max_agents,
            seed_count: settings.seed_count,
            seed_mutation_probability: settings.seed_mutation_probability,
            food_patches: Vec::new(),
            brick_patches: Vec::new(),
            num_agents: 0,
            num_created: 0,
            num_born: 0,
            num_born_since_created: 0,
            num_died: 0,
            num_smited: 0,
            last_create: 0,
            max_gap_create: 0,
            recent_creations: VecDeque::new(),
            fittest: FitnessLedger::new(ledger_capacity),
            least_fit: LeastFitPool::new(),
            ifit: 0,
            jfit: 1,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Point-in-bounds test on the x/z plane.
    pub fn contains(&self, position: Point2<f32>) -> bool {
        position.x >= self.start.x
            && position.x <= self.end.x
            && position.y >= self.start.y
            && position.y <= self.end.y
    }

    pub fn start(&self) -> Point2<f32> {
        self.start
    }

    pub fn end(&self) -> Point2<f32> {
        self.end
    }

    pub fn add_food_patch(&mut self, patch: Box<dyn Patch>) {
        self.food_patches.push(patch);
    }

    pub fn add_brick_patch(&mut self, patch: Box<dyn Patch>) {
        self.brick_patches.push(patch);
    }

    /// First food patch containing the point. Patches are assumed not to overlap.
    pub fn which_food_patch(&self, x: f32, z: f32) -> Option<(usize, &dyn Patch)> {
        first_patch(&self.food_patches, x, z)
    }

    /// Whether the point lies within `distance` of any food patch.
    pub fn is_near_food_patch(&self, x: f32, z: f32, distance: f32) -> bool {
        self.food_patches
            .iter()
            .any(|patch| patch.point_is_inside(x, z, distance))
    }

    pub fn which_brick_patch(&self, x: f32, z: f32) -> Option<(usize, &dyn Patch)> {
        first_patch(&self.brick_patches, x, z)
    }

    pub fn num_food_patches(&self) -> usize {
        self.food_patches.len()
    }

    pub fn num_agents(&self) -> usize {
        self.num_agents
    }

    pub fn min_agents(&self) -> usize {
        self.min_agents
    }

    pub fn init_agents(&self) -> usize {
        self.init_agents
    }

    pub fn max_agents(&self) -> usize {
        self.max_agents
    }

    pub fn num_created(&self) -> u64 {
        self.num_created
    }

    pub fn num_born(&self) -> u64 {
        self.num_born
    }

    pub fn num_died(&self) -> u64 {
        self.num_died
    }

    pub fn num_smited(&self) -> u64 {
        self.num_smited
    }

    pub fn max_gap_create(&self) -> u64 {
        self.max_gap_create
    }

    pub fn is_below_min(&self) -> bool {
        self.num_agents < self.min_agents
    }

    /// Agents above the ceiling.
    pub fn excess(&self) -> usize {
        self.num_agents.saturating_sub(self.max_agents)
    }

    pub fn fittest(&self) -> &FitnessLedger {
        &self.fittest
    }

    pub fn least_fit(&self) -> &LeastFitPool {
        &self.least_fit
    }

    pub(crate) fn add_agent(&mut self) {
        self.num_agents += 1;
    }

    pub(crate) fn remove_agent(&mut self) {
        assert!(
            self.num_agents > 0,
            "domain {} agent count would become negative",
            self.index
        );
        self.num_agents -= 1;
    }

    /// Folds the currently open creation gap into the maximum.
    pub(crate) fn note_gap(&mut self, step: u64) {
        self.max_gap_create = self.max_gap_create.max(step.saturating_sub(self.last_create));
    }

    /// Records a creation, keeping at most `history` recent creation steps.
    /// Window counts are only compared against `history`, so older steps can go.
    pub(crate) fn note_creation(&mut self, step: u64, history: usize) {
        self.note_gap(step);
        self.last_create = step;
        self.num_created += 1;
        self.num_born_since_created = 0;
        self.recent_creations.push_back(step);
        while self.recent_creations.len() > history {
            self.recent_creations.pop_front();
        }
    }

    pub(crate) fn note_birth(&mut self) {
        self.num_born += 1;
        self.num_born_since_created += 1;
    }

    /// Creations in the `window` steps up to and including `step`.
    pub(crate) fn creations_within(&mut self, step: u64, window: u64) -> usize {
        while self
            .recent_creations
            .front()
            .is_some_and(|&created| created + window <= step)
        {
            self.recent_creations.pop_front();
        }
        self.recent_creations.len()
    }

    /// Next pair of ledger ranks, cycling (0,1), (0,2), ..., (1,2), ...
    pub(crate) fn next_fit_pair(&mut self) -> Option<(usize, usize)> {
        let len = self.fittest.len();
        if len < 2 {
            return None;
        }
        if self.ifit + 1 >= len || self.jfit >= len {
            self.ifit = 0;
            self.jfit = 1;
        }
        let pair = (self.ifit, self.jfit);
        self.jfit += 1;
        if self.jfit >= len {
            self.ifit += 1;
            self.jfit = self.ifit + 1;
        }
        Some(pair)
    }
}

fn first_patch(patches: &[Box<dyn Patch>], x: f32, z: f32) -> Option<(usize, &dyn Patch)> {
    patches
        .iter()
        .enumerate()
        .find(|(_, patch)| patch.point_is_inside(x, z, 0.0))
        .map(|(i, patch)| (i, patch.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Domain {
        let settings = DomainSettings {
            center_x: 0.25,
            size_x: 0.5,
            ..DomainSettings::default()
        };
        Domain::new(0, &settings, 100.0, 4)
    }

    #[test]
    fn bounds_follow_world_fractions() {
        let domain = domain();
        assert!(domain.contains(Point2::new(0.0, 0.0)));
        assert!(domain.contains(Point2::new(50.0, 100.0)));
        assert!(!domain.contains(Point2::new(50.1, 10.0)));
        assert!(!domain.contains(Point2::new(10.0, -0.1)));
    }

    #[test]
    fn first_matching_patch_wins() {
        let mut domain = domain();
        domain.add_food_patch(Box::new(RectPatch::new(Point2::new(10.0, 10.0), 4.0, 4.0)));
        domain.add_food_patch(Box::new(RectPatch::new(Point2::new(11.0, 11.0), 4.0, 4.0)));
        domain.add_brick_patch(Box::new(RectPatch::new(Point2::new(30.0, 30.0), 2.0, 2.0)));
        assert_eq!(domain.which_food_patch(11.5, 11.5).map(|(i, _)| i), Some(0));
        assert_eq!(domain.which_food_patch(12.5, 12.5).map(|(i, _)| i), Some(1));
        assert!(domain.which_food_patch(40.0, 40.0).is_none());
        assert_eq!(domain.which_brick_patch(30.5, 29.5).map(|(i, _)| i), Some(0));
    }

    #[test]
    #[should_panic(expected = "negative")]
    fn removing_from_an_empty_domain_is_fatal() {
        domain().remove_agent();
    }

    #[test]
    fn creation_gaps_and_window() {
        let mut domain = domain();
        domain.note_creation(5, 4);
        domain.note_creation(7, 4);
        domain.note_gap(20);
        assert_eq!(domain.max_gap_create(), 13);
        assert_eq!(domain.creations_within(10, 4), 1);
        assert_eq!(domain.creations_within(30, 4), 0);
        assert_eq!(domain.num_created(), 2);
    }

    #[test]
    fn creation_history_stays_bounded() {
        let mut domain = domain();
        for step in 0..1_000 {
            domain.note_creation(step, 2);
        }
        assert_eq!(domain.recent_creations.len(), 2);
        assert_eq!(domain.creations_within(999, 10), 2);
        assert_eq!(domain.creations_within(1_008, 10), 1);
        assert_eq!(domain.num_created(), 1_000);
    }

    #[test]
    fn fit_pairs_cycle_through_the_ledger() {
        use crate::genome::{GeneLayout, Genome};
        use crate::settings::GenomeSettings;
        use crate::specimen::SpecimenId;
        use std::sync::Arc;

        let mut domain = domain();
        assert_eq!(domain.next_fit_pair(), None);
        let genome = Genome::seeded(&Arc::new(GeneLayout::new(&GenomeSettings::default())));
        for id in 0..3 {
            domain.fittest.record(SpecimenId(id), id as f32, 0.0, &genome);
        }
        let pairs: Vec<_> = (0..4).filter_map(|_| domain.next_fit_pair()).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (1, 2), (0, 1)]);
    }
}
