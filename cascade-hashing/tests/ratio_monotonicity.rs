use cascade_hashing::{
    CascadeMatcher, FeaturePosition, HashProjections, ImageFeatureSet, ImageIndex,
    MatcherSettings,
};
use quickcheck_macros::quickcheck;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::collections::HashSet;

const DIMENSION: usize = 16;

fn random_features(rng: &mut impl Rng, count: usize) -> ImageFeatureSet {
    let descriptors = (0..count * DIMENSION)
        .map(|_| rng.gen_range(-1.0f32..1.0))
        .collect();
    let positions = (0..count)
        .map(|ix| FeaturePosition::new(ix as f32, 0.0))
        .collect();
    ImageFeatureSet::new(DIMENSION, descriptors, positions).unwrap()
}

/// The ratio only decides which candidates are accepted, never which are examined.
#[quickcheck]
fn lower_ratio_keeps_a_subset(seed: u64, low: u8, high: u8) -> bool {
    let (low, high) = (low.min(high), low.max(high));
    let ratio = |r: u8| (r as f32 + 1.0) / 256.0;

    let mut rng = Pcg64::seed_from_u64(seed);
    let features_i = random_features(&mut rng, 40);
    let features_j = random_features(&mut rng, 60);
    let settings = MatcherSettings {
        primary_bits: 4,
        seed,
        ..Default::default()
    };
    let projections = HashProjections::generate(DIMENSION, &settings);
    let index_i = ImageIndex::build(&features_i, &projections);
    let index_j = ImageIndex::build(&features_j, &projections);

    let matches = |distance_ratio: f32| {
        CascadeMatcher::new(&MatcherSettings {
            distance_ratio,
            ..settings
        })
        .match_pair(&features_i, &index_i, &features_j, &index_j)
        .iter()
        .map(|m| m.indices())
        .collect::<HashSet<_>>()
    };
    matches(ratio(low)).is_subset(&matches(ratio(high)))
}
