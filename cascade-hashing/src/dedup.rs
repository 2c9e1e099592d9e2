use crate::{Correspondence, FeaturePosition};
use log::*;
use std::collections::HashSet;

/// Removes correspondences repeating the `(i, j)` of an earlier one.
///
/// The list ends up sorted by `(i, j)`. The sort is stable, so of several
/// correspondences with equal indices the first one is kept.
pub fn dedup_indices(matches: &mut Vec<Correspondence>) {
    matches.sort_by_key(Correspondence::indices);
    matches.dedup_by_key(|m| m.indices());
}

/// Removes correspondences whose two endpoint positions equal those of an earlier one.
///
/// Distinct features detected at the same coordinate (for instance at several scales)
/// are redundant for geometric estimation. Traversal follows `(i, j)` order, and the
/// first correspondence at a position pair survives.
pub fn dedup_positions(
    matches: &mut Vec<Correspondence>,
    positions_i: &[FeaturePosition],
    positions_j: &[FeaturePosition],
) {
    matches.sort_by_key(Correspondence::indices);
    let mut seen = HashSet::with_capacity(matches.len());
    matches.retain(|m| seen.insert(position_key(positions_i[m.i], positions_j[m.j])));
}

/// Runs [`dedup_indices`] then [`dedup_positions`].
pub fn deduplicate(
    matches: &mut Vec<Correspondence>,
    positions_i: &[FeaturePosition],
    positions_j: &[FeaturePosition],
) {
    let raw = matches.len();
    dedup_indices(matches);
    let unique = matches.len();
    dedup_positions(matches, positions_i, positions_j);
    debug!(
        "deduplicated {} matches to {} by index and {} by position",
        raw,
        unique,
        matches.len()
    );
}

/// Exact equality key of a position pair. `-0.0` and `0.0` compare equal, so both map to `0.0`.
fn position_key(a: FeaturePosition, b: FeaturePosition) -> [u32; 4] {
    [a.x, a.y, b.x, b.y].map(|v| (v + 0.0).to_bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(i: usize, j: usize) -> Correspondence {
        Correspondence::new(i, j, (i * 10 + j) as f32)
    }

    #[test]
    fn index_duplicates_keep_the_first() {
        let mut matches = vec![
            m(3, 1),
            m(0, 2),
            Correspondence::new(3, 1, -1.0),
            m(0, 2),
            m(1, 1),
        ];
        dedup_indices(&mut matches);
        assert_eq!(matches, vec![m(0, 2), m(1, 1), m(3, 1)]);
    }

    #[test]
    fn position_duplicates_keep_the_first_in_index_order() {
        let positions_i = [
            FeaturePosition::new(1.0, 1.0),
            FeaturePosition::new(1.0, 1.0),
            FeaturePosition::new(0.0, 0.0),
            FeaturePosition::new(-0.0, 0.0),
        ];
        let positions_j = [FeaturePosition::new(5.0, 5.0), FeaturePosition::new(5.0, 5.0)];
        let mut matches = vec![m(1, 1), m(0, 0), m(2, 0), m(3, 1), m(1, 0)];
        dedup_positions(&mut matches, &positions_i, &positions_j);
        // (0, 0), (1, 0) and (1, 1) share positions, as do (2, 0) and (3, 1).
        assert_eq!(matches, vec![m(0, 0), m(2, 0)]);
    }

    #[test]
    fn same_position_in_one_image_only_is_kept() {
        let positions_i = [FeaturePosition::new(1.0, 1.0), FeaturePosition::new(1.0, 1.0)];
        let positions_j = [FeaturePosition::new(2.0, 2.0), FeaturePosition::new(3.0, 3.0)];
        let mut matches = vec![m(0, 0), m(1, 1)];
        deduplicate(&mut matches, &positions_i, &positions_j);
        assert_eq!(matches.len(), 2);
    }

    #[test]
    fn result_is_independent_of_input_order() {
        let positions_i: Vec<_> = (0..6)
            .map(|i| FeaturePosition::new((i / 2) as f32, 0.0))
            .collect();
        let positions_j: Vec<_> = (0..6)
            .map(|j| FeaturePosition::new(0.0, (j / 3) as f32))
            .collect();
        let mut forward: Vec<_> = (0..6).flat_map(|i| (0..6).map(move |j| m(i, j))).collect();
        let mut reversed = forward.clone();
        reversed.reverse();
        deduplicate(&mut forward, &positions_i, &positions_j);
        deduplicate(&mut reversed, &positions_i, &positions_j);
        assert_eq!(forward, reversed);
        assert_eq!(forward.len(), 6);
    }
}
