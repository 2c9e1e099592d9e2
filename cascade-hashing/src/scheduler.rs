use crate::{ImageId, Result};
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// An unordered pair of images, stored with the lower id first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct Pair(ImageId, ImageId);

impl Pair {
    /// Creates a new pair, canonicalizing the order of the pair.
    pub fn new(a: ImageId, b: ImageId) -> Self {
        Self(std::cmp::min(a, b), std::cmp::max(a, b))
    }

    pub fn first(&self) -> ImageId {
        self.0
    }

    pub fn second(&self) -> ImageId {
        self.1
    }
}

pub type PairSet = BTreeSet<Pair>;

/// Every pair of distinct images among `0..count`.
pub fn exhaustive_pairs(count: usize) -> PairSet {
    (0..count)
        .flat_map(|a| (a + 1..count).map(move |b| Pair::new(a, b)))
        .collect()
}

/// Every image among `0..count` paired with its `overlap` successors.
pub fn contiguous_pairs(count: usize, overlap: usize) -> PairSet {
    (0..count)
        .flat_map(|a| {
            let end = count.min(a.saturating_add(overlap).saturating_add(1));
            (a + 1..end).map(move |b| Pair::new(a, b))
        })
        .collect()
}

/// All the pairs sharing a first image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairGroup {
    pub first: ImageId,
    pub seconds: Vec<ImageId>,
}

impl PairGroup {
    pub fn pairs(&self) -> impl Iterator<Item = Pair> + '_ {
        self.seconds.iter().map(move |&second| Pair::new(self.first, second))
    }
}

/// Groups the pairs by their first image.
///
/// Matching all pairs of an image together keeps its features and index hot.
pub fn schedule(pairs: &PairSet) -> Vec<PairGroup> {
    let mut groups: BTreeMap<ImageId, Vec<ImageId>> = BTreeMap::new();
    for pair in pairs {
        groups.entry(pair.first()).or_default().push(pair.second());
    }
    groups
        .into_iter()
        .map(|(first, seconds)| PairGroup { first, seconds })
        .collect()
}

/// Runs per-image and per-pair work on a fixed-size worker pool.
///
/// Without the `rayon` feature all work runs on the calling thread.
pub struct PairScheduler {
    #[cfg(feature = "rayon")]
    pool: rayon::ThreadPool,
}

impl PairScheduler {
    /// Creates a pool of `threads` workers, or one per logical core if `threads` is `0`.
    pub fn new(threads: usize) -> Result<Self> {
        #[cfg(feature = "rayon")]
        {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|ix| format!("cascade-match-{}", ix))
                .build()?;
            Ok(Self { pool })
        }
        #[cfg(not(feature = "rayon"))]
        {
            let _ = threads;
            Ok(Self {})
        }
    }

    pub fn threads(&self) -> usize {
        #[cfg(feature = "rayon")]
        {
            self.pool.current_num_threads()
        }
        #[cfg(not(feature = "rayon"))]
        {
            1
        }
    }

    /// Computes `op` for every item, returning the results in item order.
    pub fn map<T, R, F>(&self, items: &[T], op: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        #[cfg(feature = "rayon")]
        {
            self.pool.install(|| items.par_iter().map(op).collect())
        }
        #[cfg(not(feature = "rayon"))]
        {
            items.iter().map(op).collect()
        }
    }

    /// Calls `op` once for every pair of every group.
    ///
    /// Groups, and pairs within a group, run concurrently in no particular order.
    pub fn dispatch<F>(&self, groups: &[PairGroup], op: F)
    where
        F: Fn(Pair) + Sync + Send,
    {
        #[cfg(feature = "rayon")]
        {
            self.pool.install(|| {
                groups.par_iter().for_each(|group| {
                    group
                        .seconds
                        .par_iter()
                        .for_each(|&second| op(Pair::new(group.first, second)))
                })
            })
        }
        #[cfg(not(feature = "rayon"))]
        {
            groups.iter().flat_map(PairGroup::pairs).for_each(op)
        }
    }
}
