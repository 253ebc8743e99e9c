//! Bounded fitness records.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::genome::Genome;
use crate::specimen::SpecimenId;

/// A fit specimen's genome, kept after the specimen itself is gone.
#[derive(Debug, Clone)]
pub struct FitRecord {
    pub agent_id: SpecimenId,
    pub fitness: f32,
    pub complexity: f32,
    pub genome: Genome,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedFitness {
    pub rank: usize,
    pub agent_id: SpecimenId,
    pub fitness: f32,
    pub complexity: f32,
}

/// Records sorted by descending fitness, never longer than `capacity`.
#[derive(Debug, Clone)]
pub struct FitnessLedger {
    capacity: usize,
    records: Vec<FitRecord>,
}

impl FitnessLedger {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "fitness ledger capacity must be non-zero");
        FitnessLedger {
            capacity,
            records: Vec::with_capacity(capacity),
        }
    }

    /// Returns whether the record was kept. The genome is cloned only when it is.
    pub fn record(
        &mut self,
        agent_id: SpecimenId,
        fitness: f32,
        complexity: f32,
        genome: &Genome,
    ) -> bool {
        if self.records.len() >= self.capacity {
            match self.records.last() {
                Some(lowest) if fitness > lowest.fitness => {
                    self.records.pop();
                }
                _ => return false,
            }
        }
        // Equal fitness goes after existing entries.
        let position = self.records.partition_point(|r| r.fitness >= fitness);
        self.records.insert(
            position,
            FitRecord {
                agent_id,
                fitness,
                complexity,
                genome: genome.clone(),
            },
        );
        true
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FitRecord> {
        self.records.get(index)
    }

    pub fn best(&self) -> Option<&FitRecord> {
        self.records.first()
    }

    pub fn entries(&self) -> &[FitRecord] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn top(&self, k: usize) -> Vec<RankedFitness> {
        self.records
            .iter()
            .take(k)
            .enumerate()
            .map(|(rank, r)| RankedFitness {
                rank,
                agent_id: r.agent_id,
                fitness: r.fitness,
                complexity: r.complexity,
            })
            .collect()
    }
}

/// Candidate handed to `LeastFitPool::refresh`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: SpecimenId,
    pub heuristic_fitness: f32,
    pub age: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HeapEntry {
    fitness: OrderedFloat<f32>,
    // Younger ranks higher so the oldest survives among equals.
    age: Reverse<u64>,
    id: SpecimenId,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.fitness
            .cmp(&other.fitness)
            .then(self.age.cmp(&other.age))
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The least fit specimens of a domain at the last refresh, worst first.
#[derive(Debug, Clone, Default)]
pub struct LeastFitPool {
    victims: Vec<Candidate>,
    refreshed_at: Option<u64>,
}

impl LeastFitPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the pool from the current population, keeping at most `max_len`.
    pub fn refresh(
        &mut self,
        step: u64,
        candidates: impl IntoIterator<Item = Candidate>,
        max_len: usize,
    ) {
        self.refreshed_at = Some(step);
        self.victims.clear();
        if max_len == 0 {
            return;
        }
        let mut heap = BinaryHeap::with_capacity(max_len + 1);
        let mut lookup = Vec::new();
        for candidate in candidates {
            heap.push((
                HeapEntry {
                    fitness: OrderedFloat(candidate.heuristic_fitness),
                    age: Reverse(candidate.age),
                    id: candidate.id,
                },
                lookup.len(),
            ));
            lookup.push(candidate);
            if heap.len() > max_len {
                heap.pop();
            }
        }
        // Ascending order puts the least fit first.
        self.victims = heap
            .into_sorted_vec()
            .into_iter()
            .map(|(_, index)| lookup[index])
            .collect();
        self.victims.reverse();
    }

    /// Removes and returns the least fit remaining candidate.
    pub fn pop_victim(&mut self) -> Option<Candidate> {
        self.victims.pop()
    }

    pub fn len(&self) -> usize {
        self.victims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.victims.is_empty()
    }

    pub fn refreshed_at(&self) -> Option<u64> {
        self.refreshed_at
    }

    /// Remaining candidates, least fit first.
    pub fn candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.victims.iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::GeneLayout;
    use crate::settings::GenomeSettings;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha12Rng;
    use std::sync::Arc;

    fn genome() -> Genome {
        let layout = Arc::new(GeneLayout::new(&GenomeSettings::default()));
        Genome::seeded(&layout)
    }

    #[test]
    fn ledger_stays_sorted_and_bounded() {
        let genome = genome();
        let mut rng = ChaCha12Rng::seed_from_u64(17);
        let mut ledger = FitnessLedger::new(5);
        let mut discarded_max = f32::MIN;
        for id in 0..200 {
            let fitness = rng.random_range(0.0..100.0);
            let lowest_before = ledger.entries().last().map(|r| r.fitness);
            let full = ledger.len() == ledger.capacity();
            let kept = ledger.record(SpecimenId(id), fitness, 0.0, &genome);
            if !kept {
                assert!(full);
                assert!(fitness <= lowest_before.unwrap());
                discarded_max = discarded_max.max(fitness);
            }
            assert!(ledger.len() <= 5);
            assert!(
                ledger
                    .entries()
                    .windows(2)
                    .all(|w| w[0].fitness >= w[1].fitness)
            );
        }
        let lowest = ledger.entries().last().unwrap().fitness;
        assert!(lowest >= discarded_max);
    }

    #[test]
    fn ties_prefer_the_earlier_record() {
        let genome = genome();
        let mut ledger = FitnessLedger::new(2);
        assert!(ledger.record(SpecimenId(1), 5.0, 0.0, &genome));
        assert!(ledger.record(SpecimenId(2), 5.0, 0.0, &genome));
        assert!(!ledger.record(SpecimenId(3), 5.0, 0.0, &genome));
        let ids: Vec<_> = ledger.entries().iter().map(|r| r.agent_id).collect();
        assert_eq!(ids, vec![SpecimenId(1), SpecimenId(2)]);

        assert!(ledger.record(SpecimenId(4), 6.0, 1.5, &genome));
        let top = ledger.top(5);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].agent_id, SpecimenId(4));
        assert_eq!(top[0].complexity, 1.5);
        assert_eq!(top[1].agent_id, SpecimenId(1));
    }

    #[test]
    #[should_panic(expected = "capacity must be non-zero")]
    fn zero_capacity_is_fatal() {
        FitnessLedger::new(0);
    }

    #[test]
    fn least_fit_pool_keeps_the_worst() {
        let mut pool = LeastFitPool::new();
        let candidates = [
            (1, 0.9, 10),
            (2, 0.1, 10),
            (3, 0.5, 10),
            (4, 0.1, 30),
            (5, 0.7, 10),
        ]
        .map(|(id, heuristic_fitness, age)| Candidate {
            id: SpecimenId(id),
            heuristic_fitness,
            age,
        });
        pool.refresh(4, candidates, 3);
        assert_eq!(pool.refreshed_at(), Some(4));
        let order: Vec<_> = pool.candidates().map(|c| c.id).collect();
        // Equal fitness: the older specimen goes first.
        assert_eq!(order, vec![SpecimenId(4), SpecimenId(2), SpecimenId(3)]);
        assert_eq!(pool.pop_victim().map(|c| c.id), Some(SpecimenId(4)));
        assert_eq!(pool.pop_victim().map(|c| c.id), Some(SpecimenId(2)));
        assert_eq!(pool.len(), 1);
    }
}
