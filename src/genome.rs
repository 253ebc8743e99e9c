use std::fmt;
use std::iter;
use std::sync::Arc;

use bit_vec::BitVec;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use once_cell::sync::Lazy;
use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use variant_count::VariantCount;

use crate::settings::{GenomeSettings, MateSettings, Span};

static GRAY_OF_BINARY: Lazy<[u8; 256]> = Lazy::new(|| {
    let mut table = [0u8; 256];
    for (binary, gray) in table.iter_mut().enumerate() {
        let binary = binary as u8;
        *gray = binary ^ (binary >> 1);
    }
    table
});

static BINARY_OF_GRAY: Lazy<[u8; 256]> = Lazy::new(|| {
    let mut table = [0u8; 256];
    for (binary, &gray) in GRAY_OF_BINARY.iter().enumerate() {
        table[gray as usize] = binary as u8;
    }
    table
});

/// Genes that exist exactly once per genome, stored first in the byte array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, VariantCount, Serialize)]
pub enum PhysicalGene {
    MutationRate = 0,
    CrossoverPoints,
    Lifespan,
    Id,
    Strength,
    Size,
    MaxSpeed,
    MateEnergy,
    RedNeurons,
    GreenNeurons,
    BlueNeurons,
    NeuronGroups,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, VariantCount, Serialize)]
pub enum SynapseType {
    ExcitatoryToExcitatory = 0,
    ExcitatoryToInhibitory,
    InhibitoryToInhibitory,
    InhibitoryToExcitatory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Gene {
    Physical(PhysicalGene),
    ExcitatoryNeurons(usize),
    InhibitoryNeurons(usize),
    Bias(usize),
    BiasLearningRate(usize),
    ConnectionDensity(SynapseType, usize, usize),
    TopologicalDistortion(SynapseType, usize, usize),
    LearningRate(SynapseType, usize, usize),
}

impl Gene {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Gene::Physical(
                PhysicalGene::CrossoverPoints
                    | PhysicalGene::Lifespan
                    | PhysicalGene::RedNeurons
                    | PhysicalGene::GreenNeurons
                    | PhysicalGene::BlueNeurons
                    | PhysicalGene::NeuronGroups
            ) | Gene::ExcitatoryNeurons(_)
                | Gene::InhibitoryNeurons(_)
        )
    }
}

impl From<PhysicalGene> for Gene {
    fn from(gene: PhysicalGene) -> Self {
        Gene::Physical(gene)
    }
}

const GROUP_GENES: usize = 4;
const SYNAPSE_GENES: usize = 3;
const PAIR_GENES: usize = SynapseType::VARIANT_COUNT * SYNAPSE_GENES;

/// Byte offsets and decode ranges shared by every genome of a run.
#[derive(Debug, Clone)]
pub struct GeneLayout {
    gray_coding: bool,
    num_groups: usize,
    group_base: usize,
    pair_base: usize,
    num_bytes: usize,
    physical: [Span; PhysicalGene::VARIANT_COUNT],
    physical_seed: [f32; PhysicalGene::VARIANT_COUNT],
    neurons_per_group: Span,
    neurons_seed: f32,
    bias: Span,
    learning_rate: Span,
    bit_probability: Span,
}

impl GeneLayout {
    pub fn new(settings: &GenomeSettings) -> GeneLayout {
        let num_groups = settings.neuron_groups.max.round().max(1.0) as usize;
        let group_base = PhysicalGene::VARIANT_COUNT;
        let pair_base = group_base + GROUP_GENES * num_groups;
        let num_bytes = pair_base + PAIR_GENES * num_groups * num_groups;

        let mut physical = [Span::UNIT; PhysicalGene::VARIANT_COUNT];
        let mut physical_seed = [0.5; PhysicalGene::VARIANT_COUNT];
        let seed = &settings.seed;
        for index in 0..PhysicalGene::VARIANT_COUNT {
            let Some(gene) = PhysicalGene::from_usize(index) else {
                continue;
            };
            let (span, fraction) = match gene {
                PhysicalGene::MutationRate => (settings.mutation_rate, seed.mutation_rate),
                PhysicalGene::CrossoverPoints => {
                    (settings.crossover_points, seed.crossover_points)
                }
                PhysicalGene::Lifespan => (settings.lifespan, seed.lifespan),
                PhysicalGene::Id => (Span::UNIT, 0.5),
                PhysicalGene::Strength => (settings.strength, seed.strength),
                PhysicalGene::Size => (settings.size, seed.size),
                PhysicalGene::MaxSpeed => (settings.max_speed, seed.max_speed),
                PhysicalGene::MateEnergy => (settings.mate_energy, seed.mate_energy),
                PhysicalGene::RedNeurons
                | PhysicalGene::GreenNeurons
                | PhysicalGene::BlueNeurons => (settings.vision_neurons, seed.vision_neurons),
                PhysicalGene::NeuronGroups => (settings.neuron_groups, seed.neuron_groups),
            };
            physical[index] = span;
            physical_seed[index] = fraction;
        }

        GeneLayout {
            gray_coding: settings.gray_coding,
            num_groups,
            group_base,
            pair_base,
            num_bytes,
            physical,
            physical_seed,
            neurons_per_group: settings.neurons_per_group,
            neurons_seed: seed.neurons_per_group,
            bias: Span::new(-settings.max_bias, settings.max_bias),
            learning_rate: settings.learning_rate,
            bit_probability: settings.bit_probability,
        }
    }

    pub fn num_bytes(&self) -> usize {
        self.num_bytes
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn gray_coding(&self) -> bool {
        self.gray_coding
    }

    pub fn offset(&self, gene: Gene) -> usize {
        let group = |g: usize, k: usize| {
            assert!(g < self.num_groups, "neuron group {g} out of range");
            self.group_base + GROUP_GENES * g + k
        };
        let pair = |syn: SynapseType, i: usize, j: usize, k: usize| {
            assert!(
                i < self.num_groups && j < self.num_groups,
                "neuron group pair ({i}, {j}) out of range"
            );
            self.pair_base
                + PAIR_GENES * (i * self.num_groups + j)
                + SYNAPSE_GENES * syn as usize
                + k
        };
        match gene {
            Gene::Physical(p) => p as usize,
            Gene::ExcitatoryNeurons(g) => group(g, 0),
            Gene::InhibitoryNeurons(g) => group(g, 1),
            Gene::Bias(g) => group(g, 2),
            Gene::BiasLearningRate(g) => group(g, 3),
            Gene::ConnectionDensity(syn, i, j) => pair(syn, i, j, 0),
            Gene::TopologicalDistortion(syn, i, j) => pair(syn, i, j, 1),
            Gene::LearningRate(syn, i, j) => pair(syn, i, j, 2),
        }
    }

    pub fn range(&self, gene: Gene) -> Span {
        match gene {
            Gene::Physical(p) => self.physical[p as usize],
            Gene::ExcitatoryNeurons(_) | Gene::InhibitoryNeurons(_) => self.neurons_per_group,
            Gene::Bias(_) => self.bias,
            Gene::BiasLearningRate(_) | Gene::LearningRate(..) => self.learning_rate,
            Gene::ConnectionDensity(..) | Gene::TopologicalDistortion(..) => Span::UNIT,
        }
    }

    /// Fraction of the gene's range written by the seed template.
    fn template_fraction(&self, gene: Gene) -> f32 {
        match gene {
            Gene::Physical(p) => self.physical_seed[p as usize],
            Gene::ExcitatoryNeurons(_) | Gene::InhibitoryNeurons(_) => self.neurons_seed,
            Gene::Bias(_) | Gene::BiasLearningRate(_) | Gene::LearningRate(..) => 0.5,
            Gene::ConnectionDensity(..) => 1.0,
            Gene::TopologicalDistortion(..) => 0.0,
        }
    }

    /// Every gene of the layout, in byte order.
    pub fn genes(&self) -> Vec<Gene> {
        let mut genes = Vec::with_capacity(self.num_bytes);
        genes.extend(
            (0..PhysicalGene::VARIANT_COUNT)
                .filter_map(PhysicalGene::from_usize)
                .map(Gene::Physical),
        );
        for g in 0..self.num_groups {
            genes.extend([
                Gene::ExcitatoryNeurons(g),
                Gene::InhibitoryNeurons(g),
                Gene::Bias(g),
                Gene::BiasLearningRate(g),
            ]);
        }
        for i in 0..self.num_groups {
            for j in 0..self.num_groups {
                for syn in (0..SynapseType::VARIANT_COUNT).filter_map(SynapseType::from_usize) {
                    genes.extend([
                        Gene::ConnectionDensity(syn, i, j),
                        Gene::TopologicalDistortion(syn, i, j),
                        Gene::LearningRate(syn, i, j),
                    ]);
                }
            }
        }
        genes
    }

    /// Maps a stored byte to [0, 1].
    #[inline]
    pub fn gene_value(&self, byte: u8) -> f32 {
        let binary = if self.gray_coding {
            BINARY_OF_GRAY[byte as usize]
        } else {
            byte
        };
        binary as f32 / 255.0
    }

    /// Inverse of `gene_value`, up to byte resolution.
    #[inline]
    pub fn encode(&self, fraction: f32) -> u8 {
        let binary = (fraction.clamp(0.0, 1.0) * 255.0).round() as u8;
        if self.gray_coding {
            GRAY_OF_BINARY[binary as usize]
        } else {
            binary
        }
    }
}

#[derive(Debug, Error)]
pub enum GenomeError {
    #[error("genome has {actual} bytes but the layout requires {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

#[derive(Clone)]
pub struct Genome {
    layout: Arc<GeneLayout>,
    bytes: Box<[u8]>,
}

impl PartialEq for Genome {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for Genome {}

impl fmt::Debug for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Genome")
            .field("num_bytes", &self.bytes.len())
            .field("lifespan", &self.lifespan())
            .field("mutation_rate", &self.mutation_rate())
            .finish()
    }
}

impl Genome {
    /// Randomizes every bit. Without an explicit probability one is drawn from
    /// the layout's bit-probability range.
    pub fn random<R: Rng + ?Sized>(
        layout: &Arc<GeneLayout>,
        rng: &mut R,
        bit_probability: Option<f32>,
    ) -> Genome {
        let probability = bit_probability
            .unwrap_or_else(|| layout.bit_probability.lerp(rng.random::<f32>()))
            .clamp(0.0, 1.0) as f64;
        let bits = BitVec::from_fn(layout.num_bytes() * 8, |_| rng.random_bool(probability));
        Genome {
            layout: Arc::clone(layout),
            bytes: bits.to_bytes().into_boxed_slice(),
        }
    }

    /// Genome written from the layout's seed template.
    pub fn seeded(layout: &Arc<GeneLayout>) -> Genome {
        let mut bytes = vec![0u8; layout.num_bytes()];
        for gene in layout.genes() {
            bytes[layout.offset(gene)] = layout.encode(layout.template_fraction(gene));
        }
        Genome {
            layout: Arc::clone(layout),
            bytes: bytes.into_boxed_slice(),
        }
    }

    pub fn from_bytes(layout: &Arc<GeneLayout>, bytes: Vec<u8>) -> Result<Genome, GenomeError> {
        if bytes.len() != layout.num_bytes() {
            return Err(GenomeError::LengthMismatch {
                expected: layout.num_bytes(),
                actual: bytes.len(),
            });
        }
        Ok(Genome {
            layout: Arc::clone(layout),
            bytes: bytes.into_boxed_slice(),
        })
    }

    pub fn layout(&self) -> &Arc<GeneLayout> {
        &self.layout
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn decode(&self, gene: impl Into<Gene>) -> f32 {
        let gene = gene.into();
        let span = self.layout.range(gene);
        let value = span.lerp(self.layout.gene_value(self.bytes[self.layout.offset(gene)]));
        if gene.is_integer() {
            value.round().clamp(span.min, span.max)
        } else {
            value
        }
    }

    pub fn decode_count(&self, gene: impl Into<Gene>) -> u32 {
        let gene = gene.into();
        debug_assert!(gene.is_integer(), "{gene:?} is not a count");
        self.decode(gene).max(0.0) as u32
    }

    pub fn mutation_rate(&self) -> f32 {
        self.decode(PhysicalGene::MutationRate)
    }

    pub fn crossover_points(&self) -> u32 {
        self.decode_count(PhysicalGene::CrossoverPoints)
    }

    pub fn lifespan(&self) -> u64 {
        self.decode_count(PhysicalGene::Lifespan) as u64
    }

    pub fn strength(&self) -> f32 {
        self.decode(PhysicalGene::Strength)
    }

    pub fn size(&self) -> f32 {
        self.decode(PhysicalGene::Size)
    }

    pub fn max_speed(&self) -> f32 {
        self.decode(PhysicalGene::MaxSpeed)
    }

    pub fn mate_energy(&self) -> f32 {
        self.decode(PhysicalGene::MateEnergy)
    }

    pub fn neuron_groups(&self) -> u32 {
        self.decode_count(PhysicalGene::NeuronGroups)
    }

    /// Vision neurons plus the neurons of every expressed internal group.
    pub fn neuron_count(&self) -> u32 {
        let vision = self.decode_count(PhysicalGene::RedNeurons)
            + self.decode_count(PhysicalGene::GreenNeurons)
            + self.decode_count(PhysicalGene::BlueNeurons);
        let groups = (self.neuron_groups() as usize).min(self.layout.num_groups);
        (0..groups).fold(vision, |total, g| {
            total
                + self.decode_count(Gene::ExcitatoryNeurons(g))
                + self.decode_count(Gene::InhibitoryNeurons(g))
        })
    }

    /// Flips each bit with the genome's own mutation rate. Returns the number of flips.
    pub fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let rate = self.mutation_rate();
        let mut bits = BitVec::from_bytes(&self.bytes);
        let mut flips = 0;
        for i in 0..bits.len() {
            if rng.random::<f32>() < rate {
                let bit = bits[i];
                bits.set(i, !bit);
                flips += 1;
            }
        }
        if flips > 0 {
            self.bytes = bits.to_bytes().into_boxed_slice();
        }
        flips
    }

    pub fn crossover<R: Rng + ?Sized>(
        first: &Genome,
        second: &Genome,
        mutate: bool,
        rng: &mut R,
    ) -> Genome {
        assert_eq!(
            first.len(),
            second.len(),
            "crossover operands differ in length"
        );
        let span = first.layout.range(PhysicalGene::CrossoverPoints.into());
        let mean = (first.crossover_points() + second.crossover_points()) as f32 / 2.0;
        let count = mean.round().clamp(span.min, span.max) as usize;
        let points = crossover_points(first.len(), count, rng);

        let mut bytes = Vec::with_capacity(first.len());
        let mut from_first = rng.random_bool(0.5);
        let mut start = 0;
        for end in points.into_iter().chain(iter::once(first.len())) {
            let source = if from_first { first } else { second };
            bytes.extend_from_slice(&source.bytes[start..end]);
            start = end;
            from_first = !from_first;
        }

        let mut child = Genome {
            layout: Arc::clone(&first.layout),
            bytes: bytes.into_boxed_slice(),
        };
        if mutate {
            child.mutate(rng);
        }
        child
    }

    /// Number of differing bits.
    pub fn hamming(&self, other: &Genome) -> u32 {
        assert_eq!(
            self.len(),
            other.len(),
            "distance operands differ in length"
        );
        self.bytes
            .iter()
            .zip(other.bytes.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Fraction of differing bits, in [0, 1].
    pub fn distance(&self, other: &Genome) -> f32 {
        if self.is_empty() {
            return 0.0;
        }
        self.hamming(other) as f32 / (self.len() * 8) as f32
    }

    pub fn mate_probability(&self, other: &Genome, mating: &MateSettings) -> f32 {
        let distance = self.distance(other);
        let mut probability = 1.0;
        if distance < mating.min_genetic_distance {
            probability *= if mating.hard_cutoff {
                0.0
            } else {
                (distance / mating.min_genetic_distance).powf(mating.inbreeding_falloff)
            };
        }
        if distance > mating.max_genetic_distance {
            probability *= if mating.hard_cutoff {
                0.0
            } else {
                ((1.0 - distance) / (1.0 - mating.max_genetic_distance))
                    .powf(mating.outbreeding_falloff)
            };
        }
        probability.clamp(0.0, 1.0)
    }
}

/// Sorted cut positions in `[0, len]`; repeats give empty segments.
fn crossover_points<R: Rng + ?Sized>(len: usize, count: usize, rng: &mut R) -> Vec<usize> {
    let mut points: Vec<usize> = (0..count).map(|_| rng.random_range(0..=len)).collect();
    points.sort_unstable();
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn layout() -> Arc<GeneLayout> {
        Arc::new(GeneLayout::new(&GenomeSettings::default()))
    }

    #[test]
    fn gray_tables_are_inverse() {
        for byte in 0..=255u8 {
            assert_eq!(BINARY_OF_GRAY[GRAY_OF_BINARY[byte as usize] as usize], byte);
            if byte < 255 {
                let step = GRAY_OF_BINARY[byte as usize] ^ GRAY_OF_BINARY[byte as usize + 1];
                assert_eq!(step.count_ones(), 1, "gray codes {byte} and {} differ by more than one bit", byte + 1);
            }
        }
    }

    #[test]
    fn layout_offsets_cover_every_byte_once() {
        let layout = layout();
        let mut seen = vec![false; layout.num_bytes()];
        for gene in layout.genes() {
            let offset = layout.offset(gene);
            assert!(!seen[offset], "{gene:?} shares byte {offset}");
            seen[offset] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn decode_stays_in_range() {
        let layout = layout();
        let mut rng = ChaCha12Rng::seed_from_u64(1);
        for probability in [None, Some(0.0), Some(1.0), Some(0.5)] {
            for _ in 0..20 {
                let genome = Genome::random(&layout, &mut rng, probability);
                for gene in layout.genes() {
                    let value = genome.decode(gene);
                    assert!(
                        layout.range(gene).contains(value),
                        "{gene:?} decoded to {value}"
                    );
                    if gene.is_integer() {
                        assert_eq!(value, value.round());
                    }
                }
            }
        }
    }

    #[test]
    fn binary_decoding_without_gray() {
        let settings = GenomeSettings {
            gray_coding: false,
            ..GenomeSettings::default()
        };
        let layout = Arc::new(GeneLayout::new(&settings));
        let mut bytes = vec![0u8; layout.num_bytes()];
        bytes[layout.offset(PhysicalGene::Strength.into())] = 255;
        let genome = Genome::from_bytes(&layout, bytes).unwrap();
        assert_eq!(genome.strength(), settings.strength.max);
        assert_eq!(genome.size(), settings.size.min);
    }

    #[test]
    fn seeded_genome_follows_template() {
        let settings = GenomeSettings::default();
        let layout = Arc::new(GeneLayout::new(&settings));
        let genome = Genome::seeded(&layout);
        assert_eq!(genome.decode(Gene::Bias(0)).abs() < 0.01, true);
        assert_eq!(
            genome.decode(Gene::ConnectionDensity(SynapseType::ExcitatoryToExcitatory, 0, 0)),
            1.0
        );
        assert_eq!(
            genome.decode(Gene::TopologicalDistortion(SynapseType::InhibitoryToExcitatory, 1, 2)),
            0.0
        );
        assert_eq!(genome.neuron_groups(), settings.neuron_groups.min as u32);
        let lifespan_mid = settings.lifespan.lerp(0.5);
        assert!((genome.lifespan() as f32 - lifespan_mid).abs() <= 5.0);
    }

    #[test]
    fn neuron_count_covers_vision_and_expressed_groups() {
        let layout = layout();
        let genome = Genome::from_bytes(&layout, vec![0; layout.num_bytes()]).unwrap();
        assert_eq!(genome.neuron_groups(), 1);
        assert_eq!(genome.neuron_count(), 3 + 2);
    }

    #[test]
    fn from_bytes_rejects_wrong_length() {
        let layout = layout();
        let result = Genome::from_bytes(&layout, vec![0; 3]);
        assert!(matches!(
            result,
            Err(GenomeError::LengthMismatch { actual: 3, .. })
        ));
    }

    #[test]
    fn crossover_sources_each_byte_from_a_parent() {
        let layout = layout();
        let mut rng = ChaCha12Rng::seed_from_u64(7);
        for _ in 0..50 {
            let a = Genome::random(&layout, &mut rng, Some(0.0));
            let b = Genome::random(&layout, &mut rng, Some(1.0));
            let child = Genome::crossover(&a, &b, false, &mut rng);
            assert_eq!(child.len(), a.len());
            for i in 0..child.len() {
                let byte = child.as_bytes()[i];
                assert!(byte == a.as_bytes()[i] || byte == b.as_bytes()[i]);
            }
        }
    }

    #[test]
    fn crossover_points_are_sorted_and_bounded() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        for _ in 0..100 {
            let points = crossover_points(4, 6, &mut rng);
            assert_eq!(points.len(), 6);
            assert!(points.windows(2).all(|w| w[0] <= w[1]));
            assert!(points.iter().all(|&p| p <= 4));
        }
    }

    #[test]
    #[should_panic(expected = "differ in length")]
    fn crossover_rejects_mismatched_lengths() {
        let big = layout();
        let small = Arc::new(GeneLayout::new(&GenomeSettings {
            neuron_groups: Span::new(1.0, 1.0),
            ..GenomeSettings::default()
        }));
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let a = Genome::random(&big, &mut rng, None);
        let b = Genome::random(&small, &mut rng, None);
        Genome::crossover(&a, &b, false, &mut rng);
    }

    #[test]
    fn distance_properties() {
        let layout = layout();
        let mut rng = ChaCha12Rng::seed_from_u64(11);
        let a = Genome::random(&layout, &mut rng, None);
        let b = Genome::random(&layout, &mut rng, None);
        assert_eq!(a.distance(&a), 0.0);
        assert_eq!(a.distance(&b), b.distance(&a));
        assert!((0.0..=1.0).contains(&a.distance(&b)));

        let mut near = a.as_bytes().to_vec();
        near[0] ^= 0b0000_0001;
        let mut far = near.clone();
        far[1] ^= 0b1111_0000;
        let near = Genome::from_bytes(&layout, near).unwrap();
        let far = Genome::from_bytes(&layout, far).unwrap();
        assert!(a.distance(&near) < a.distance(&far));

        let zeros = Genome::random(&layout, &mut rng, Some(0.0));
        let ones = Genome::random(&layout, &mut rng, Some(1.0));
        assert_eq!(zeros.distance(&ones), 1.0);
    }

    #[test]
    fn mutation_rate_gene_controls_flips() {
        let mut settings = GenomeSettings {
            mutation_rate: Span::new(0.0, 0.0),
            ..GenomeSettings::default()
        };
        let layout = Arc::new(GeneLayout::new(&settings));
        let mut rng = ChaCha12Rng::seed_from_u64(5);
        let mut genome = Genome::random(&layout, &mut rng, None);
        let before = genome.clone();
        assert_eq!(genome.mutate(&mut rng), 0);
        assert_eq!(genome, before);

        settings.mutation_rate = Span::new(1.0, 1.0);
        let layout = Arc::new(GeneLayout::new(&settings));
        let mut genome = Genome::random(&layout, &mut rng, Some(0.0));
        assert_eq!(genome.mutate(&mut rng), layout.num_bytes() * 8);
        assert!(genome.as_bytes().iter().all(|&b| b == 0xff));
    }

    #[test]
    fn mate_probability_penalizes_inbreeding() {
        let layout = layout();
        let mut rng = ChaCha12Rng::seed_from_u64(9);
        let a = Genome::random(&layout, &mut rng, None);
        let mut mating = MateSettings {
            min_genetic_distance: 0.2,
            ..MateSettings::default()
        };
        assert_eq!(a.mate_probability(&a, &mating), 0.0);

        let mut close = a.as_bytes().to_vec();
        close[0] ^= 0xff;
        let close = Genome::from_bytes(&layout, close).unwrap();
        let soft = a.mate_probability(&close, &mating);
        assert!(soft > 0.0 && soft < 1.0);

        mating.hard_cutoff = true;
        assert_eq!(a.mate_probability(&close, &mating), 0.0);
    }

    #[test]
    fn mate_probability_is_monotone_in_outbreeding() {
        let layout = layout();
        let mut rng = ChaCha12Rng::seed_from_u64(13);
        let zeros = Genome::random(&layout, &mut rng, Some(0.0));
        let mating = MateSettings {
            max_genetic_distance: 0.5,
            ..MateSettings::default()
        };
        let mut previous = 1.0;
        for flipped in (0..zeros.len()).step_by(16) {
            let mut bytes = vec![0u8; zeros.len()];
            bytes[..flipped].fill(0xff);
            let other = Genome::from_bytes(&layout, bytes).unwrap();
            let probability = zeros.mate_probability(&other, &mating);
            assert!(probability <= previous);
            previous = probability;
        }
    }
}
