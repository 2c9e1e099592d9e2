use crate::{MatcherSettings, MAX_PRIMARY_BITS, MAX_SECONDARY_BITS};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// The projection directions shared by every image of a run.
///
/// A code bit is set when the centered descriptor lies on the positive side of its
/// direction. The primary directions produce the bucket key, and the secondary directions
/// are split into `secondary_tables` codes of `secondary_bits` bits each.
#[derive(Debug, Clone, PartialEq)]
pub struct HashProjections {
    dimension: usize,
    primary_bits: usize,
    secondary_tables: usize,
    secondary_bits: usize,
    center: Vec<f32>,
    primary: Vec<f32>,
    secondary: Vec<f32>,
}

impl HashProjections {
    /// Generates projections from the seed in `settings`.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`HashProjections::generate_with`].
    pub fn generate(dimension: usize, settings: &MatcherSettings) -> Self {
        Self::generate_with(dimension, settings, &mut Pcg64::seed_from_u64(settings.seed))
    }

    /// Generates projections with entries drawn uniformly from `[-1, 1)`.
    ///
    /// # Panics
    ///
    /// Panics if `settings.primary_bits` exceeds [`MAX_PRIMARY_BITS`] or
    /// `settings.secondary_bits` exceeds [`MAX_SECONDARY_BITS`], since the codes would not fit
    /// their words. [`MatcherSettings::validate`] rejects such settings.
    pub fn generate_with(
        dimension: usize,
        settings: &MatcherSettings,
        rng: &mut impl Rng,
    ) -> Self {
        assert!(
            settings.primary_bits <= MAX_PRIMARY_BITS,
            "primary codes are limited to {} bits",
            MAX_PRIMARY_BITS
        );
        assert!(
            settings.secondary_bits <= MAX_SECONDARY_BITS,
            "secondary codes are limited to {} bits",
            MAX_SECONDARY_BITS
        );
        let mut directions = |rows: usize| -> Vec<f32> {
            (0..rows * dimension)
                .map(|_| rng.gen_range(-1.0f32..1.0))
                .collect()
        };
        let primary = directions(settings.primary_bits);
        let secondary = directions(settings.secondary_code_bits());
        Self {
            dimension,
            primary_bits: settings.primary_bits,
            secondary_tables: settings.secondary_tables,
            secondary_bits: settings.secondary_bits,
            center: vec![0.0; dimension],
            primary,
            secondary,
        }
    }

    /// Sets the point descriptors are centered on before projecting.
    ///
    /// Descriptors such as SIFT are non-negative, so without centering most of them fall on
    /// the same side of every direction. The collection mean is the usual choice.
    ///
    /// # Panics
    ///
    /// Panics if `center` does not have the descriptor dimension.
    pub fn centered_on(mut self, center: Vec<f32>) -> Self {
        assert_eq!(
            center.len(),
            self.dimension,
            "center must have the descriptor dimension"
        );
        self.center = center;
        self
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn primary_bits(&self) -> usize {
        self.primary_bits
    }

    pub fn secondary_tables(&self) -> usize {
        self.secondary_tables
    }

    pub fn secondary_bits(&self) -> usize {
        self.secondary_bits
    }

    /// Computes the primary code of a descriptor and appends its secondary codes to `secondary`.
    ///
    /// `centered` is scratch space reused across calls.
    pub fn encode(
        &self,
        descriptor: &[f32],
        centered: &mut Vec<f32>,
        secondary: &mut Vec<u64>,
    ) -> u32 {
        debug_assert_eq!(descriptor.len(), self.dimension);
        centered.clear();
        centered.extend(descriptor.iter().zip(&self.center).map(|(&v, &c)| v - c));

        let primary = self.sign_bits(&self.primary, centered) as u32;
        for table in self
            .secondary
            .chunks_exact(self.secondary_bits * self.dimension.max(1))
            .take(self.secondary_tables)
        {
            secondary.push(self.sign_bits(table, centered));
        }
        primary
    }

    /// Packs the signs of the projections onto `directions` into bits, first direction lowest.
    fn sign_bits(&self, directions: &[f32], centered: &[f32]) -> u64 {
        if self.dimension == 0 {
            return 0;
        }
        directions
            .chunks_exact(self.dimension)
            .enumerate()
            .fold(0u64, |code, (bit, direction)| {
                let dot: f32 = direction.iter().zip(centered).map(|(a, b)| a * b).sum();
                if dot > 0.0 {
                    code | (1 << bit)
                } else {
                    code
                }
            })
    }
}
