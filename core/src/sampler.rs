//! Correlated-data sampler: multivariate normal draws with a prescribed
//! mean vector, SD vector and correlation matrix.

use nalgebra::{DMatrix, DVector};

use crate::{
    config::ReferenceParams,
    error::{SimError, SimResult},
    linalg::psd_factor,
    rng::DatasetRng,
};

pub struct CorrelatedSampler {
    means:  DVector<f64>,
    /// `F` with `F Fᵀ = D R D`, where D = diag(sds) and R the correlation.
    factor: DMatrix<f64>,
}

impl CorrelatedSampler {
    /// Build from reference parameters. Fails with `InvalidCovariance`
    /// when the correlation matrix is not positive semi-definite.
    pub fn new(reference: &ReferenceParams) -> SimResult<Self> {
        Self::from_moments(&reference.mean_vector(), &reference.sd_vector(), &reference.correlation)
    }

    pub fn from_moments(means: &[f64], sds: &[f64], correlation: &DMatrix<f64>) -> SimResult<Self> {
        let p = means.len();
        if sds.len() != p || correlation.shape() != (p, p) {
            return Err(SimError::invalid_config(
                "sampler dimensions",
                format!("means={p} sds={} corr={:?}", sds.len(), correlation.shape()),
            ));
        }
        let root = psd_factor(correlation)
            .map_err(|min_eigenvalue| SimError::InvalidCovariance { min_eigenvalue })?;
        let scale = DMatrix::from_diagonal(&DVector::from_column_slice(sds));
        Ok(Self {
            means:  DVector::from_column_slice(means),
            factor: scale * root,
        })
    }

    pub fn dimension(&self) -> usize {
        self.means.len()
    }

    /// Draw `n` rows of jointly normal values; one row per subject.
    pub fn draw(&self, n: usize, rng: &mut DatasetRng) -> DMatrix<f64> {
        let p = self.dimension();
        let z = DMatrix::from_fn(n, p, |_, _| rng.normal());
        let mut out = z * self.factor.transpose();
        for j in 0..p {
            out.column_mut(j).add_scalar_mut(self.means[j]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RngBank, StreamSlot};

    #[test]
    fn rejects_indefinite_correlation() {
        let corr = DMatrix::from_row_slice(3, 3, &[
            1.0, 0.9, -0.9,
            0.9, 1.0, 0.9,
            -0.9, 0.9, 1.0,
        ]);
        let err = CorrelatedSampler::from_moments(&[0.0; 3], &[1.0; 3], &corr);
        assert!(matches!(err, Err(SimError::InvalidCovariance { .. })));
    }

    #[test]
    fn draws_honour_means_and_sds() {
        let corr = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.5, 1.0]);
        let sampler = CorrelatedSampler::from_moments(&[10.0, -3.0], &[2.0, 0.5], &corr).unwrap();
        let mut rng = RngBank::new(99).for_dataset(StreamSlot::Sampler, 1);
        let draws = sampler.draw(20_000, &mut rng);
        let (means, sds) = crate::linalg::column_moments(&draws);
        assert!((means[0] - 10.0).abs() < 0.05, "mean0={}", means[0]);
        assert!((means[1] + 3.0).abs() < 0.02, "mean1={}", means[1]);
        assert!((sds[0] - 2.0).abs() < 0.05, "sd0={}", sds[0]);
        assert!((sds[1] - 0.5).abs() < 0.02, "sd1={}", sds[1]);
    }
}
