use crate::{Error, LoadFailure, Result};
use derive_more::Constructor;
use log::*;
use std::collections::BTreeMap;

#[cfg(feature = "serde-serialize")]
use serde::{Deserialize, Serialize};

/// Identifies an image within a collection.
pub type ImageId = usize;

/// The position of a feature in its image.
///
/// Only used to remove geometrically redundant matches, never for matching distance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Constructor)]
#[cfg_attr(feature = "serde-serialize", derive(Serialize, Deserialize))]
pub struct FeaturePosition {
    pub x: f32,
    pub y: f32,
}

/// The descriptors and positions of every feature of one image.
///
/// Descriptors are stored contiguously, one row of `dimension` values per feature.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFeatureSet {
    dimension: usize,
    descriptors: Vec<f32>,
    positions: Vec<FeaturePosition>,
}

impl ImageFeatureSet {
    /// Creates a feature set from row-major descriptor values.
    ///
    /// Fails if `descriptors` does not hold exactly one row of `dimension` values per position.
    pub fn new(
        dimension: usize,
        descriptors: Vec<f32>,
        positions: Vec<FeaturePosition>,
    ) -> Result<Self> {
        if dimension == 0 || descriptors.len() != dimension * positions.len() {
            return Err(Error::Malformed {
                dimension,
                values: descriptors.len(),
                positions: positions.len(),
            });
        }
        Ok(Self {
            dimension,
            descriptors,
            positions,
        })
    }

    /// Creates a feature set from one slice per descriptor.
    pub fn from_rows<R: AsRef<[f32]>>(
        dimension: usize,
        rows: &[R],
        positions: Vec<FeaturePosition>,
    ) -> Result<Self> {
        let mut descriptors = Vec::with_capacity(dimension * rows.len());
        for row in rows {
            let row = row.as_ref();
            if row.len() != dimension {
                return Err(Error::Malformed {
                    dimension,
                    values: row.len(),
                    positions: 1,
                });
            }
            descriptors.extend_from_slice(row);
        }
        Self::new(dimension, descriptors, positions)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn descriptor(&self, ix: usize) -> &[f32] {
        &self.descriptors[ix * self.dimension..(ix + 1) * self.dimension]
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.descriptors.chunks_exact(self.dimension)
    }

    pub fn position(&self, ix: usize) -> FeaturePosition {
        self.positions[ix]
    }

    pub fn positions(&self) -> &[FeaturePosition] {
        &self.positions
    }
}

/// Produces the features of an image.
///
/// Implemented once per descriptor type or storage format; the matcher only depends on this.
pub trait RegionLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    fn load(&self, image: ImageId) -> std::result::Result<ImageFeatureSet, Self::Error>;
}

impl<F, E> RegionLoader for F
where
    F: Fn(ImageId) -> std::result::Result<ImageFeatureSet, E>,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn load(&self, image: ImageId) -> std::result::Result<ImageFeatureSet, E> {
        self(image)
    }
}

/// Owns the features of every image in a run.
///
/// All images share one descriptor dimension. The store is filled once and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct DescriptorStore {
    dimension: Option<usize>,
    images: BTreeMap<ImageId, ImageFeatureSet>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every image, reporting all failures at once.
    ///
    /// A failure for one image does not stop the others from loading, but any failure
    /// fails the whole store since a partial store must not be matched.
    pub fn load_all<L: RegionLoader>(
        loader: &L,
        images: impl IntoIterator<Item = ImageId>,
    ) -> Result<Self> {
        let mut store = Self::new();
        let mut failures = vec![];
        for image in images {
            if let Err(e) = store.load(image, loader) {
                match e {
                    Error::Load(mut image_failures) => failures.append(&mut image_failures),
                    other => failures.push(LoadFailure {
                        image,
                        source: Box::new(other),
                    }),
                }
            }
        }
        if failures.is_empty() {
            info!(
                "loaded {} features from {} images",
                store.total_features(),
                store.len()
            );
            Ok(store)
        } else {
            Err(Error::Load(failures))
        }
    }

    /// Loads a single image through `loader`.
    pub fn load<L: RegionLoader>(&mut self, image: ImageId, loader: &L) -> Result<()> {
        match loader.load(image) {
            Ok(features) => {
                trace!("image {} loaded with {} features", image, features.len());
                self.insert(image, features)
            }
            Err(e) => {
                error!("unable to load features of image {}: {}", image, e);
                Err(Error::Load(vec![LoadFailure {
                    image,
                    source: Box::new(e),
                }]))
            }
        }
    }

    /// Adds the features of an image, replacing any previous features of that image.
    pub fn insert(&mut self, image: ImageId, features: ImageFeatureSet) -> Result<()> {
        match self.dimension {
            Some(expected) if expected != features.dimension() => {
                return Err(Error::DimensionMismatch {
                    image,
                    expected,
                    found: features.dimension(),
                })
            }
            _ => self.dimension = Some(features.dimension()),
        }
        self.images.insert(image, features);
        Ok(())
    }

    /// The descriptor dimension shared by every image, or `None` if the store is empty.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn get(&self, image: ImageId) -> Option<&ImageFeatureSet> {
        self.images.get(&image)
    }

    pub fn contains(&self, image: ImageId) -> bool {
        self.images.contains_key(&image)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> impl Iterator<Item = ImageId> + '_ {
        self.images.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ImageId, &ImageFeatureSet)> + '_ {
        self.images.iter().map(|(&image, features)| (image, features))
    }

    pub fn total_features(&self) -> usize {
        self.images.values().map(ImageFeatureSet::len).sum()
    }

    /// The mean of all descriptors of all images.
    ///
    /// Returns zeros if there are no descriptors.
    pub fn mean_descriptor(&self) -> Vec<f32> {
        let dimension = self.dimension.unwrap_or(0);
        let mut sum = vec![0f64; dimension];
        let mut count = 0usize;
        for descriptor in self.images.values().flat_map(ImageFeatureSet::descriptors) {
            for (s, &v) in sum.iter_mut().zip(descriptor) {
                *s += v as f64;
            }
            count += 1;
        }
        if count == 0 {
            return vec![0.0; dimension];
        }
        sum.into_iter().map(|s| (s / count as f64) as f32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Missing;

    impl fmt::Display for Missing {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "missing")
        }
    }

    impl std::error::Error for Missing {}

    fn two_features(value: f32) -> ImageFeatureSet {
        ImageFeatureSet::from_rows(
            2,
            &[[value, 0.0], [0.0, value]],
            vec![FeaturePosition::new(0.0, 0.0), FeaturePosition::new(1.0, 1.0)],
        )
        .unwrap()
    }

    #[test]
    fn rejects_mismatched_positions() {
        let result = ImageFeatureSet::new(2, vec![0.0; 6], vec![FeaturePosition::default(); 2]);
        assert!(matches!(
            result,
            Err(Error::Malformed {
                dimension: 2,
                values: 6,
                positions: 2
            })
        ));
        assert!(ImageFeatureSet::from_rows(3, &[vec![0.0; 2]], vec![FeaturePosition::default()])
            .is_err());
    }

    #[test]
    fn descriptor_rows() {
        let features = two_features(3.0);
        assert_eq!(features.len(), 2);
        assert_eq!(features.descriptor(1), &[0.0, 3.0]);
        assert_eq!(features.descriptors().count(), 2);
        assert_eq!(features.position(1), FeaturePosition::new(1.0, 1.0));
    }

    #[test]
    fn load_reports_every_failed_image() {
        let loader = |image: ImageId| {
            if image % 2 == 0 {
                Ok(two_features(image as f32))
            } else {
                Err(Missing)
            }
        };
        match DescriptorStore::load_all(&loader, 0..5) {
            Err(Error::Load(failures)) => {
                let failed: Vec<ImageId> = failures.iter().map(|f| f.image).collect();
                assert_eq!(failed, vec![1, 3]);
            }
            other => panic!("expected a load failure, got {:?}", other),
        }
    }

    #[test]
    fn dimension_mismatch_fails_the_load() {
        let loader = |image: ImageId| {
            if image == 0 {
                Ok(two_features(1.0))
            } else {
                ImageFeatureSet::new(3, vec![0.0; 3], vec![FeaturePosition::default()])
            }
        };
        match DescriptorStore::load_all(&loader, 0..2) {
            Err(Error::Load(failures)) => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].image, 1);
            }
            other => panic!("expected a load failure, got {:?}", other),
        }
    }

    #[test]
    fn mean_of_all_descriptors() {
        let loader = |image: ImageId| Ok::<_, Missing>(two_features(2.0 * image as f32));
        let store = DescriptorStore::load_all(&loader, 0..3).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.total_features(), 6);
        // Each image contributes (v, 0) and (0, v) for v in {0, 2, 4}.
        assert_eq!(store.mean_descriptor(), vec![1.0, 1.0]);
        assert_eq!(DescriptorStore::new().mean_descriptor(), Vec::<f32>::new());
    }
}
