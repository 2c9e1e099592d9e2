use crate::{ImageFeatureSet, ImageIndex, MatcherSettings};
use derive_more::Constructor;
use float_ord::FloatOrd;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// A putative match between feature `i` of the first image and feature `j` of the second.
#[derive(Debug, Clone, Copy, PartialEq, Constructor)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Correspondence {
    pub i: usize,
    pub j: usize,
    /// The euclidean distance between the two descriptors.
    pub distance: f32,
}

impl Correspondence {
    pub fn indices(&self) -> (usize, usize) {
        (self.i, self.j)
    }
}

/// Euclidean distance between two descriptors.
pub fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Lowe's ratio test: the nearest neighbor must be clearly better than the second nearest.
pub fn passes_ratio_test(nearest: f32, second_nearest: f32, distance_ratio: f32) -> bool {
    nearest < distance_ratio * second_nearest
}

/// Approximate nearest neighbor search of one image's descriptors in another image.
///
/// For every query descriptor the candidates come from the primary bucket of its code
/// (and neighboring buckets if that is too small), are ranked by secondary Hamming
/// distance, and only the best `top_k` of them are compared exactly.
#[derive(Debug, Clone, Copy)]
pub struct CascadeMatcher {
    distance_ratio: f32,
    top_k: usize,
    probe_radius: usize,
    min_bucket_candidates: usize,
}

impl CascadeMatcher {
    pub fn new(settings: &MatcherSettings) -> Self {
        Self {
            distance_ratio: settings.distance_ratio,
            top_k: settings.top_k,
            probe_radius: settings.probe_radius,
            min_bucket_candidates: settings.min_bucket_candidates,
        }
    }

    /// Matches every descriptor of image I against image J.
    ///
    /// Both indices must have been built with the same projections. The output is ordered
    /// by `i` and depends only on the inputs.
    pub fn match_pair(
        &self,
        features_i: &ImageFeatureSet,
        index_i: &ImageIndex,
        features_j: &ImageFeatureSet,
        index_j: &ImageIndex,
    ) -> Vec<Correspondence> {
        let mut matches = vec![];
        // The ratio test needs at least two ranked candidates.
        if index_j.len() < 2 || self.top_k < 2 {
            return matches;
        }
        let mut candidates = vec![];
        let mut ranked: Vec<(u32, usize)> = vec![];
        let mut exact: Vec<(FloatOrd<f32>, usize)> = vec![];
        for i in 0..index_i.len() {
            index_j.candidates(
                index_i.primary_code(i),
                self.probe_radius,
                self.min_bucket_candidates,
                &mut candidates,
            );
            if candidates.len() < 2 {
                continue;
            }

            let codes = index_i.secondary_codes(i);
            ranked.clear();
            ranked.extend(
                candidates
                    .iter()
                    .map(|&j| (index_j.secondary_distance(codes, j), j)),
            );
            if ranked.len() > self.top_k {
                ranked.select_nth_unstable(self.top_k - 1);
                ranked.truncate(self.top_k);
            }

            let query = features_i.descriptor(i);
            exact.clear();
            exact.extend(
                ranked
                    .iter()
                    .map(|&(_, j)| (FloatOrd(euclidean(query, features_j.descriptor(j))), j)),
            );
            exact.sort_unstable();

            let (FloatOrd(nearest), j) = exact[0];
            let FloatOrd(second_nearest) = exact[1].0;
            if passes_ratio_test(nearest, second_nearest, self.distance_ratio) {
                matches.push(Correspondence::new(i, j, nearest));
            }
        }
        matches
    }
}

/// Exact nearest neighbor matching with the same ratio test as [`CascadeMatcher`].
///
/// Quadratic in the number of descriptors. This is the reference the cascade
/// search approximates.
pub fn linear_match_pair(
    features_i: &ImageFeatureSet,
    features_j: &ImageFeatureSet,
    distance_ratio: f32,
) -> Vec<Correspondence> {
    features_i
        .descriptors()
        .enumerate()
        .filter_map(|(i, query)| {
            let mut best = (FloatOrd(f32::INFINITY), usize::MAX);
            let mut second = FloatOrd(f32::INFINITY);
            for (j, train) in features_j.descriptors().enumerate() {
                let distance = FloatOrd(euclidean(query, train));
                if distance < best.0 {
                    second = best.0;
                    best = (distance, j);
                } else if distance < second {
                    second = distance;
                }
            }
            let (FloatOrd(nearest), j) = best;
            (features_j.len() >= 2 && passes_ratio_test(nearest, second.0, distance_ratio))
                .then(|| Correspondence::new(i, j, nearest))
        })
        .collect()
}
