use crate::{HashProjections, ImageFeatureSet};
use itertools::Itertools;
use log::*;

/// The cascade hashing index of one image.
///
/// Every descriptor sits in exactly one primary bucket, the one keyed by its primary code.
/// Its secondary codes are kept alongside so candidates can be ranked by Hamming distance
/// before any exact distance is computed.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageIndex {
    primary_bits: usize,
    secondary_tables: usize,
    primary_codes: Vec<u32>,
    secondary_codes: Vec<u64>,
    buckets: Vec<Vec<usize>>,
}

impl ImageIndex {
    /// Hashes every descriptor of `features`.
    ///
    /// The result only depends on the features and the projections.
    pub fn build(features: &ImageFeatureSet, projections: &HashProjections) -> Self {
        let primary_bits = projections.primary_bits();
        let secondary_tables = projections.secondary_tables();
        let mut buckets = vec![vec![]; 1 << primary_bits];
        let mut primary_codes = Vec::with_capacity(features.len());
        let mut secondary_codes = Vec::with_capacity(features.len() * secondary_tables);
        let mut centered = Vec::with_capacity(features.dimension());
        for (ix, descriptor) in features.descriptors().enumerate() {
            let code = projections.encode(descriptor, &mut centered, &mut secondary_codes);
            buckets[code as usize].push(ix);
            primary_codes.push(code);
        }
        let index = Self {
            primary_bits,
            secondary_tables,
            primary_codes,
            secondary_codes,
            buckets,
        };
        trace!(
            "indexed {} descriptors into {} of {} buckets",
            index.len(),
            index.occupied_buckets(),
            index.buckets.len()
        );
        index
    }

    pub fn len(&self) -> usize {
        self.primary_codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary_codes.is_empty()
    }

    pub fn primary_bits(&self) -> usize {
        self.primary_bits
    }

    pub fn primary_code(&self, ix: usize) -> u32 {
        self.primary_codes[ix]
    }

    pub fn secondary_codes(&self, ix: usize) -> &[u64] {
        &self.secondary_codes[ix * self.secondary_tables..(ix + 1) * self.secondary_tables]
    }

    /// The descriptor indices whose primary code is `code`.
    pub fn bucket(&self, code: u32) -> &[usize] {
        &self.buckets[code as usize]
    }

    pub fn buckets(&self) -> impl Iterator<Item = &[usize]> + '_ {
        self.buckets.iter().map(Vec::as_slice)
    }

    pub fn occupied_buckets(&self) -> usize {
        self.buckets.iter().filter(|bucket| !bucket.is_empty()).count()
    }

    /// Cumulative Hamming distance over all secondary tables between `codes` and descriptor `ix`.
    pub fn secondary_distance(&self, codes: &[u64], ix: usize) -> u32 {
        codes
            .iter()
            .zip(self.secondary_codes(ix))
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Gathers the candidates for a query with primary code `code` into `out`.
    ///
    /// The bucket of `code` is taken first. While fewer than `min_candidates` were found,
    /// the buckets at Hamming distance 1, 2, ... up to `probe_radius` are added, one whole
    /// ring at a time. Buckets are disjoint, so no candidate appears twice.
    pub fn candidates(
        &self,
        code: u32,
        probe_radius: usize,
        min_candidates: usize,
        out: &mut Vec<usize>,
    ) {
        out.clear();
        out.extend_from_slice(self.bucket(code));
        for radius in 1..=probe_radius.min(self.primary_bits) {
            if out.len() >= min_candidates {
                break;
            }
            for flips in (0..self.primary_bits).combinations(radius) {
                let neighbor = flips.into_iter().fold(code, |c, bit| c ^ (1 << bit));
                out.extend_from_slice(self.bucket(neighbor));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FeaturePosition, MatcherSettings};
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    fn random_features(rng: &mut Pcg64, count: usize, dimension: usize) -> ImageFeatureSet {
        let descriptors = (0..count * dimension)
            .map(|_| rng.gen_range(0.0f32..1.0))
            .collect();
        let positions = (0..count)
            .map(|i| FeaturePosition::new(i as f32, 0.0))
            .collect();
        ImageFeatureSet::new(dimension, descriptors, positions).unwrap()
    }

    fn settings() -> MatcherSettings {
        MatcherSettings {
            primary_bits: 6,
            ..Default::default()
        }
    }

    #[test]
    fn every_descriptor_is_indexed_once() {
        let mut rng = Pcg64::seed_from_u64(0);
        let features = random_features(&mut rng, 500, 32);
        let projections = HashProjections::generate(32, &settings()).centered_on(vec![0.5; 32]);
        let index = ImageIndex::build(&features, &projections);
        assert_eq!(index.len(), features.len());
        assert_eq!(index.buckets().map(<[usize]>::len).sum::<usize>(), 500);
        let mut seen: Vec<usize> = index.buckets().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..500).collect::<Vec<_>>());
        for ix in 0..500 {
            assert!(index.bucket(index.primary_code(ix)).contains(&ix));
            assert_eq!(index.secondary_codes(ix).len(), 2);
        }
    }

    #[test]
    fn construction_is_deterministic() {
        let mut rng = Pcg64::seed_from_u64(1);
        let features = random_features(&mut rng, 100, 16);
        let projections = HashProjections::generate(16, &settings());
        assert_eq!(
            ImageIndex::build(&features, &projections),
            ImageIndex::build(&features, &projections)
        );
    }

    #[test]
    fn secondary_distance_to_self_is_zero() {
        let mut rng = Pcg64::seed_from_u64(2);
        let features = random_features(&mut rng, 10, 16);
        let index = ImageIndex::build(&features, &HashProjections::generate(16, &settings()));
        for ix in 0..10 {
            assert_eq!(index.secondary_distance(index.secondary_codes(ix), ix), 0);
        }
    }

    #[test]
    fn probing_visits_neighboring_buckets() {
        let mut rng = Pcg64::seed_from_u64(3);
        let features = random_features(&mut rng, 200, 16);
        let projections = HashProjections::generate(16, &settings()).centered_on(vec![0.5; 16]);
        let index = ImageIndex::build(&features, &projections);
        let code = index.primary_code(0);
        let own = index.bucket(code).len();
        let mut out = vec![];

        // A large enough bucket stops the search.
        index.candidates(code, 1, 1, &mut out);
        assert_eq!(out, index.bucket(code));

        index.candidates(code, 1, own + 1, &mut out);
        let ring: usize = (0..6).map(|bit| index.bucket(code ^ (1 << bit)).len()).sum();
        assert_eq!(out.len(), own + ring);
        for &ix in &out[own..] {
            assert_eq!((index.primary_code(ix) ^ code).count_ones(), 1);
        }

        // Without a probe radius only the primary bucket is used.
        index.candidates(code, 0, usize::MAX, &mut out);
        assert_eq!(out.len(), own);

        // Asking for every descriptor probes every ring.
        index.candidates(code, 6, usize::MAX, &mut out);
        assert_eq!(out.len(), 200);
    }
}
