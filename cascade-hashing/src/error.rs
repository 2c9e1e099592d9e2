use crate::ImageId;
use thiserror::Error;

/// A loader failure for a single image.
#[derive(Debug, Error)]
#[error("image {image}: {source}")]
pub struct LoadFailure {
    /// The image whose regions could not be loaded.
    pub image: ImageId,
    /// The error reported by the region loader.
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

#[derive(Debug, Error)]
pub enum Error {
    /// One or more images failed to load. Matching never starts on a partial store.
    #[error("failed to load features for {} image(s)", .0.len())]
    Load(Vec<LoadFailure>),
    #[error("image {image} has descriptors of dimension {found}, expected {expected}")]
    DimensionMismatch {
        image: ImageId,
        expected: usize,
        found: usize,
    },
    #[error(
        "malformed feature set: {values} descriptor values for {positions} positions of dimension {dimension}"
    )]
    Malformed {
        dimension: usize,
        values: usize,
        positions: usize,
    },
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("pair ({0}, {0}) matches an image against itself")]
    SelfPair(ImageId),
    #[error("image {0} is part of a pair but was never loaded")]
    UnknownImage(ImageId),
    #[cfg(feature = "rayon")]
    #[error("unable to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
