use cascade_hashing::{FeaturePosition, ImageFeatureSet, ImageId, RegionLoader};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no image with id {0}")]
    UnknownImage(ImageId),
    #[error("unable to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{}:{line}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{} features but {} descriptors", .features, .descriptors)]
    CountMismatch { features: usize, descriptors: usize },
    #[error(transparent)]
    Features(#[from] cascade_hashing::Error),
}

/// Loads regions from text files in a directory.
///
/// Image `id` reads `<stem>.feat`, holding one `x y [scale orientation]` line per feature,
/// and `<stem>.desc`, holding one whitespace separated descriptor per line in the same order.
/// Blank lines are skipped.
pub struct TextRegionLoader {
    dir: PathBuf,
    stems: Vec<String>,
    dimension: usize,
}

impl TextRegionLoader {
    pub fn new(dir: impl Into<PathBuf>, stems: Vec<String>, dimension: usize) -> Self {
        Self {
            dir: dir.into(),
            stems,
            dimension,
        }
    }

    pub fn stems(&self) -> &[String] {
        &self.stems
    }

    fn path(&self, stem: &str, extension: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, extension))
    }
}

impl RegionLoader for TextRegionLoader {
    type Error = LoadError;

    fn load(&self, image: ImageId) -> Result<ImageFeatureSet, LoadError> {
        let stem = self.stems.get(image).ok_or(LoadError::UnknownImage(image))?;

        let feat = self.path(stem, "feat");
        let positions = read_rows::<f32>(&feat)?
            .into_iter()
            .map(|(line, row)| match row[..] {
                [x, y, ..] => Ok(FeaturePosition::new(x, y)),
                _ => Err(parse_error(&feat, line, "expected at least x and y")),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let desc = self.path(stem, "desc");
        let descriptors = read_rows::<f32>(&desc)?;
        let ragged = descriptors
            .iter()
            .find(|(_, row)| row.len() != self.dimension);
        if let Some((line, row)) = ragged {
            return Err(parse_error(
                &desc,
                *line,
                format!("expected {} values, found {}", self.dimension, row.len()),
            ));
        }
        if descriptors.len() != positions.len() {
            return Err(LoadError::CountMismatch {
                features: positions.len(),
                descriptors: descriptors.len(),
            });
        }

        let rows: Vec<Vec<f32>> = descriptors.into_iter().map(|(_, row)| row).collect();
        Ok(ImageFeatureSet::from_rows(self.dimension, &rows, positions)?)
    }
}

fn parse_error(path: &Path, line: usize, message: impl Into<String>) -> LoadError {
    LoadError::Parse {
        path: path.to_owned(),
        line,
        message: message.into(),
    }
}

/// The non-blank lines of a file split into values, with their line numbers.
fn read_rows<T>(path: &Path) -> Result<Vec<(usize, Vec<T>)>, LoadError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_owned(),
        source,
    })?;
    text.lines()
        .enumerate()
        .map(|(ix, line)| (ix + 1, line))
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line, text)| {
            let row = text
                .split_whitespace()
                .map(|value| {
                    value
                        .parse()
                        .map_err(|e| parse_error(path, line, format!("{:?}: {}", value, e)))
                })
                .collect::<Result<Vec<T>, _>>()?;
            Ok((line, row))
        })
        .collect()
}
