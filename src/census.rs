//! Periodic population-wide measurements: per-gene spread and food-patch
//! occupancy.

use serde::Serialize;

use crate::domain::Domain;
use crate::genome::{Gene, GeneLayout, Genome};
use crate::specimen::Specimen;
use crate::stats::Stat;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeneStat {
    pub gene: Gene,
    pub mean: f32,
    pub stddev: f32,
}

/// Decoded gene values over the living population, one entry per gene in byte order.
#[derive(Debug, Clone, Serialize)]
pub struct GeneStats {
    pub step: u64,
    pub samples: u64,
    pub genes: Vec<GeneStat>,
}

impl GeneStats {
    pub fn collect<'a>(
        step: u64,
        layout: &GeneLayout,
        genomes: impl IntoIterator<Item = &'a Genome>,
    ) -> GeneStats {
        let genes = layout.genes();
        let mut stats = vec![Stat::new(); genes.len()];
        for genome in genomes {
            for (stat, &gene) in stats.iter_mut().zip(&genes) {
                stat.add(genome.decode(gene));
            }
        }
        GeneStats {
            step,
            samples: stats.first().map_or(0, Stat::samples),
            genes: genes
                .into_iter()
                .zip(&stats)
                .map(|(gene, stat)| GeneStat {
                    gene,
                    mean: stat.mean(),
                    stddev: stat.stddev(),
                })
                .collect(),
        }
    }

    pub fn get(&self, gene: Gene) -> Option<&GeneStat> {
        self.genes.iter().find(|stat| stat.gene == gene)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainOccupancy {
    pub domain: usize,
    /// Specimens inside each food patch, by patch index.
    pub in_patch: Vec<u64>,
    pub not_in_or_near_any: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodPatchOccupancy {
    pub step: u64,
    pub domains: Vec<DomainOccupancy>,
}

impl FoodPatchOccupancy {
    pub fn collect<'a>(
        step: u64,
        domains: &[Domain],
        specimens: impl IntoIterator<Item = &'a Specimen>,
        near_distance: f32,
    ) -> FoodPatchOccupancy {
        let mut occupancy: Vec<DomainOccupancy> = domains
            .iter()
            .map(|domain| DomainOccupancy {
                domain: domain.index(),
                in_patch: vec![0; domain.num_food_patches()],
                not_in_or_near_any: 0,
            })
            .collect();
        for specimen in specimens {
            let (Some(domain), Some(counts)) = (
                domains.get(specimen.domain()),
                occupancy.get_mut(specimen.domain()),
            ) else {
                continue;
            };
            let position = specimen.position();
            if let Some((patch, _)) = domain.which_food_patch(position.x, position.y) {
                counts.in_patch[patch] += 1;
            } else if !domain.is_near_food_patch(position.x, position.y, near_distance) {
                counts.not_in_or_near_any += 1;
            }
        }
        FoodPatchOccupancy {
            step,
            domains: occupancy,
        }
    }
}
