//! Categorical discretizer: continuous latent item → ordinal category 1..=5.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{SimError, SimResult};

/// Cumulative probabilities at which the category boundaries sit.
pub const CUT_PROBABILITIES: [f64; 4] = [0.4, 0.7, 0.9, 0.97];

#[derive(Debug, Clone, Copy)]
pub struct Discretizer {
    cuts: [f64; 4],
}

impl Discretizer {
    /// Cut points at the standard-normal quantiles of [`CUT_PROBABILITIES`].
    pub fn standard() -> SimResult<Self> {
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| SimError::Other(anyhow::anyhow!("standard normal: {e}")))?;
        let mut cuts = [0.0; 4];
        for (cut, &p) in cuts.iter_mut().zip(CUT_PROBABILITIES.iter()) {
            *cut = normal.inverse_cdf(p);
        }
        Ok(Self { cuts })
    }

    pub fn cut_points(&self) -> [f64; 4] {
        self.cuts
    }

    /// Category 1 below the first cut, 5 at or above the last.
    pub fn category(&self, value: f64) -> u8 {
        1 + self.cuts.iter().filter(|&&c| value >= c).count() as u8
    }
}
