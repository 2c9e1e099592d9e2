use crate::{Correspondence, Pair};
use log::*;
use parking_lot::Mutex;
use std::collections::{btree_map, BTreeMap};
use std::sync::atomic::{AtomicUsize, Ordering};

/// The deduplicated correspondences of every image pair with at least one match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairwiseMatches(BTreeMap<Pair, Vec<Correspondence>>);

impl PairwiseMatches {
    pub fn get(&self, pair: Pair) -> Option<&[Correspondence]> {
        self.0.get(&pair).map(Vec::as_slice)
    }

    pub fn contains(&self, pair: Pair) -> bool {
        self.0.contains_key(&pair)
    }

    /// The number of pairs with matches.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn pairs(&self) -> impl Iterator<Item = Pair> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Pair, &[Correspondence])> + '_ {
        self.0.iter().map(|(&pair, matches)| (pair, matches.as_slice()))
    }

    pub fn total_correspondences(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }
}

impl IntoIterator for PairwiseMatches {
    type Item = (Pair, Vec<Correspondence>);
    type IntoIter = btree_map::IntoIter<Pair, Vec<Correspondence>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Collects the results of concurrently matched pairs.
///
/// Each insertion takes the lock once. Pairs without correspondences are counted
/// toward progress but never inserted.
pub struct ResultAggregator {
    matches: Mutex<BTreeMap<Pair, Vec<Correspondence>>>,
    completed: AtomicUsize,
    total: usize,
}

impl ResultAggregator {
    /// `total` is the number of pairs expected, used for progress reports.
    pub fn new(total: usize) -> Self {
        Self {
            matches: Mutex::new(BTreeMap::new()),
            completed: AtomicUsize::new(0),
            total,
        }
    }

    /// Records the result of `pair`. Returns whether it was inserted.
    pub fn merge(&self, pair: Pair, correspondences: Vec<Correspondence>) -> bool {
        let inserted = if correspondences.is_empty() {
            false
        } else {
            self.matches.lock().insert(pair, correspondences);
            true
        };
        let completed = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        let step = (self.total / 10).max(1);
        if completed % step == 0 || completed == self.total {
            info!("matched {} of {} pairs", completed, self.total);
        }
        inserted
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn into_matches(self) -> PairwiseMatches {
        PairwiseMatches(self.matches.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn empty_results_are_skipped() {
        let aggregator = ResultAggregator::new(2);
        assert!(!aggregator.merge(Pair::new(0, 1), vec![]));
        assert!(aggregator.merge(Pair::new(0, 2), vec![Correspondence::new(0, 0, 0.1)]));
        assert_eq!(aggregator.completed(), 2);
        let matches = aggregator.into_matches();
        assert_eq!(matches.len(), 1);
        assert!(!matches.contains(Pair::new(0, 1)));
        assert_eq!(matches.get(Pair::new(2, 0)).map(<[_]>::len), Some(1));
        assert_eq!(matches.total_correspondences(), 1);
    }

    #[test]
    fn concurrent_merges() {
        let aggregator = ResultAggregator::new(64);
        thread::scope(|scope| {
            for worker in 0..4 {
                let aggregator = &aggregator;
                scope.spawn(move || {
                    for second in 1..=16 {
                        let pair = Pair::new(0, worker * 16 + second);
                        aggregator.merge(pair, vec![Correspondence::new(worker, second, 0.0)]);
                    }
                });
            }
        });
        assert_eq!(aggregator.completed(), 64);
        let matches = aggregator.into_matches();
        assert_eq!(matches.len(), 64);
        assert_eq!(matches.total_correspondences(), 64);
    }
}
