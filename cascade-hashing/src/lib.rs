//! # Cascade hashing
//!
//! Approximate nearest neighbor matching of local feature descriptors across an image
//! collection, following Cheng et al., "Fast and Accurate Image Matching with Cascade
//! Hashing for 3D Reconstruction" (CVPR 2014).
//!
//! Every descriptor is hashed twice with random projections shared by the whole run:
//!
//! * a short primary code selects the bucket of the image's [`ImageIndex`] it lives in
//! * longer secondary codes rank the descriptors of a bucket by Hamming distance
//!
//! To match image I against image J, each descriptor of I only looks at the bucket of J
//! keyed by its primary code (plus neighboring buckets when that one is nearly empty), keeps
//! the `top_k` candidates with the smallest secondary Hamming distance, and computes exact
//! distances only for those. A match is accepted by Lowe's ratio test, and the matches of
//! every pair are deduplicated by index and by position before being collected.
//!
//! ```
//! use cascade_hashing::{
//!     exhaustive_pairs, CascadeHashing, FeaturePosition, ImageFeatureSet, MatcherSettings,
//! };
//!
//! // Three images holding the same eight features at the same positions.
//! let loader = |_image: usize| {
//!     let rows: Vec<[f32; 2]> = (0..8).map(|i| [i as f32, (i * i) as f32]).collect();
//!     let positions = (0..8).map(|i| FeaturePosition::new(i as f32, 0.0)).collect();
//!     ImageFeatureSet::from_rows(2, &rows, positions)
//! };
//! // A single primary bit and the default probing compares every candidate.
//! let matcher = CascadeHashing::new(MatcherSettings {
//!     primary_bits: 1,
//!     ..Default::default()
//! });
//! let matches = matcher.run(&loader, 0..3, &exhaustive_pairs(3)).unwrap();
//! assert_eq!(matches.len(), 3);
//! assert_eq!(matches.total_correspondences(), 3 * 8);
//! ```

mod aggregate;
pub mod dedup;
mod error;
mod features;
mod hashing;
mod index;
mod matcher;
mod scheduler;
mod settings;

pub use aggregate::*;
pub use error::*;
pub use features::*;
pub use hashing::*;
pub use index::*;
pub use matcher::*;
pub use scheduler::*;
pub use settings::*;

use log::*;
use std::collections::BTreeMap;

/// The features of a collection together with the cascade hashing index of every image.
///
/// Immutable once built, so any number of workers may read it at once.
#[derive(Debug, Clone)]
pub struct IndexedCollection {
    store: DescriptorStore,
    projections: HashProjections,
    indices: BTreeMap<ImageId, ImageIndex>,
}

impl IndexedCollection {
    pub fn store(&self) -> &DescriptorStore {
        &self.store
    }

    pub fn projections(&self) -> &HashProjections {
        &self.projections
    }

    pub fn index(&self, image: ImageId) -> Option<&ImageIndex> {
        self.indices.get(&image)
    }

    /// The features and index of an image.
    pub fn image(&self, image: ImageId) -> Option<(&ImageFeatureSet, &ImageIndex)> {
        Some((self.store.get(image)?, self.indices.get(&image)?))
    }
}

/// Matches image collections with cascade hashing.
#[derive(Debug, Copy, Clone, Default)]
pub struct CascadeHashing {
    pub settings: MatcherSettings,
}

impl CascadeHashing {
    pub fn new(settings: MatcherSettings) -> Self {
        Self { settings }
    }

    /// This convenience constructor is provided for the very common case
    /// that only the distance ratio needs to be modified.
    pub fn with_distance_ratio(distance_ratio: f32) -> Self {
        Self::new(MatcherSettings::with_distance_ratio(distance_ratio))
    }

    /// Loads the features of every image. Fails if any image fails.
    pub fn load<L: RegionLoader>(
        &self,
        loader: &L,
        images: impl IntoIterator<Item = ImageId>,
    ) -> Result<DescriptorStore> {
        DescriptorStore::load_all(loader, images)
    }

    /// Hashes every image of the store.
    ///
    /// The projections are generated from the settings' seed and centered on the
    /// mean descriptor of the store. Images are indexed in parallel.
    pub fn index(&self, store: DescriptorStore) -> Result<IndexedCollection> {
        self.settings.validate()?;
        let scheduler = PairScheduler::new(self.settings.threads)?;
        Ok(self.index_with(store, &scheduler))
    }

    fn index_with(&self, store: DescriptorStore, scheduler: &PairScheduler) -> IndexedCollection {
        let dimension = store.dimension().unwrap_or(0);
        let projections = HashProjections::generate(dimension, &self.settings)
            .centered_on(store.mean_descriptor());
        let images: Vec<(ImageId, &ImageFeatureSet)> = store.iter().collect();
        let built = scheduler.map(&images, |&(image, features)| {
            (image, ImageIndex::build(features, &projections))
        });
        let indices: BTreeMap<ImageId, ImageIndex> = built.into_iter().collect();
        info!(
            "built cascade hashing indices of {} images with {} threads",
            indices.len(),
            scheduler.threads()
        );
        IndexedCollection {
            store,
            projections,
            indices,
        }
    }

    /// Matches every pair of `pairs` within `collection`.
    ///
    /// Pairs without any surviving correspondence are left out of the result. The result does
    /// not depend on the number of threads.
    pub fn match_pairs(
        &self,
        collection: &IndexedCollection,
        pairs: &PairSet,
    ) -> Result<PairwiseMatches> {
        self.settings.validate()?;
        let scheduler = PairScheduler::new(self.settings.threads)?;
        self.match_pairs_with(collection, pairs, &scheduler)
    }

    fn match_pairs_with(
        &self,
        collection: &IndexedCollection,
        pairs: &PairSet,
        scheduler: &PairScheduler,
    ) -> Result<PairwiseMatches> {
        for pair in pairs {
            if pair.first() == pair.second() {
                return Err(Error::SelfPair(pair.first()));
            }
            for image in [pair.first(), pair.second()] {
                if collection.image(image).is_none() {
                    return Err(Error::UnknownImage(image));
                }
            }
        }

        let groups = schedule(pairs);
        info!(
            "matching {} pairs in {} groups with {} threads",
            pairs.len(),
            groups.len(),
            scheduler.threads()
        );
        let matcher = CascadeMatcher::new(&self.settings);
        let aggregator = ResultAggregator::new(pairs.len());
        scheduler.dispatch(&groups, |pair| {
            // Both images were checked above.
            if let (Some((features_i, index_i)), Some((features_j, index_j))) = (
                collection.image(pair.first()),
                collection.image(pair.second()),
            ) {
                let mut matches = matcher.match_pair(features_i, index_i, features_j, index_j);
                debug!(
                    "pair ({}, {}) has {} putative matches",
                    pair.first(),
                    pair.second(),
                    matches.len()
                );
                dedup::deduplicate(&mut matches, features_i.positions(), features_j.positions());
                aggregator.merge(pair, matches);
            }
        });
        let matches = aggregator.into_matches();
        info!(
            "found {} matches in {} of {} pairs",
            matches.total_correspondences(),
            matches.len(),
            pairs.len()
        );
        Ok(matches)
    }

    /// Loads, indexes and matches a collection in one go, sharing one worker pool.
    ///
    /// Nothing is indexed or matched if any image fails to load.
    pub fn run<L: RegionLoader>(
        &self,
        loader: &L,
        images: impl IntoIterator<Item = ImageId>,
        pairs: &PairSet,
    ) -> Result<PairwiseMatches> {
        self.settings.validate()?;
        let scheduler = PairScheduler::new(self.settings.threads)?;
        let store = self.load(loader, images)?;
        let collection = self.index_with(store, &scheduler);
        self.match_pairs_with(&collection, pairs, &scheduler)
    }
}
