//! Multiple-imputation pooling (Rubin's rules).
//!
//! A single replicate (complete-case analysis, or M = 1) pools trivially:
//! no between-replicate variance and the complete-data degrees of freedom.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

use crate::{
    error::{SimError, SimResult},
    estimate::{Estimate, Estimator, PointEstimate},
    strategy::AnalysisData,
};

/// Above this the t reference is indistinguishable from the normal.
const NORMAL_DF_THRESHOLD: f64 = 1e7;

pub const CONFIDENCE_LEVEL: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PooledEstimate {
    pub estimate: f64,
    /// Mean within-replicate variance Ū.
    pub within:   f64,
    /// Between-replicate variance B.
    pub between:  f64,
    /// Ū + (1 + 1/M)·B.
    pub total:    f64,
    pub df:       f64,
    /// Relative increase in variance due to nonresponse.
    pub riv:      f64,
    /// Fraction of missing information.
    pub lambda:   f64,
    pub m:        usize,
}

impl PooledEstimate {
    pub fn std_error(&self) -> f64 {
        self.total.sqrt()
    }

    pub fn interval(&self, level: f64) -> SimResult<(f64, f64)> {
        let t = t_quantile(0.5 + level / 2.0, self.df)?;
        let half = t * self.std_error();
        Ok((self.estimate - half, self.estimate + half))
    }

    pub fn to_estimate(&self) -> SimResult<Estimate> {
        let (lower, upper) = self.interval(CONFIDENCE_LEVEL)?;
        Ok(Estimate {
            estimate: self.estimate,
            se: self.std_error(),
            lower,
            upper,
            df: self.df,
        })
    }
}

/// Combine per-replicate estimates.
///
/// With `small_sample` the Barnard–Rubin adjustment bounds the degrees of
/// freedom by the observed-data degrees of freedom.
pub fn pool(estimates: &[PointEstimate], small_sample: bool) -> SimResult<PooledEstimate> {
    let m = estimates.len();
    if m == 0 {
        return Err(SimError::EstimationFailure {
            estimator: "pool",
            reason: "no replicate estimates".into(),
        });
    }
    let mf = m as f64;
    let estimate = estimates.iter().map(|e| e.estimate).sum::<f64>() / mf;
    let within = estimates.iter().map(|e| e.variance).sum::<f64>() / mf;
    let complete_df = estimates.iter().map(|e| e.df).fold(f64::INFINITY, f64::min);

    if m == 1 {
        return Ok(PooledEstimate {
            estimate,
            within,
            between: 0.0,
            total: within,
            df: complete_df,
            riv: 0.0,
            lambda: 0.0,
            m,
        });
    }

    let between = estimates
        .iter()
        .map(|e| (e.estimate - estimate).powi(2))
        .sum::<f64>()
        / (mf - 1.0);
    let inflated = (1.0 + 1.0 / mf) * between;
    let total = within + inflated;
    let riv = if within > 0.0 { inflated / within } else { f64::INFINITY };
    let lambda = if total > 0.0 { inflated / total } else { 0.0 };

    let rubin_df = if lambda > 0.0 {
        (mf - 1.0) / (lambda * lambda)
    } else {
        f64::INFINITY
    };
    let df = if small_sample && complete_df.is_finite() {
        let observed_df = (complete_df + 1.0) / (complete_df + 3.0) * complete_df * (1.0 - lambda);
        if rubin_df.is_finite() {
            1.0 / (1.0 / rubin_df + 1.0 / observed_df)
        } else {
            observed_df
        }
    } else {
        rubin_df
    };

    Ok(PooledEstimate { estimate, within, between, total, df, riv, lambda, m })
}

/// Quantile `p` of Student's t with `df` degrees of freedom.
pub fn t_quantile(p: f64, df: f64) -> SimResult<f64> {
    let fail = |e: statrs::StatsError| SimError::EstimationFailure {
        estimator: "pool",
        reason: e.to_string(),
    };
    if !df.is_finite() || df > NORMAL_DF_THRESHOLD {
        return Ok(Normal::new(0.0, 1.0).map_err(fail)?.inverse_cdf(p));
    }
    Ok(StudentsT::new(0.0, 1.0, df).map_err(fail)?.inverse_cdf(p))
}

/// Run `estimator` on every replicate and pool the results.
pub fn analyse(replicates: &[AnalysisData], estimator: Estimator, small_sample: bool) -> SimResult<Estimate> {
    let per_replicate = replicates
        .iter()
        .map(|r| estimator.estimate(r))
        .collect::<SimResult<Vec<_>>>()?;
    let pooled = pool(&per_replicate, small_sample)?;
    log::debug!(
        "{} pooled over {} replicates: est={:.4} riv={:.3} lambda={:.3} df={:.1}",
        estimator.name(), pooled.m, pooled.estimate, pooled.riv, pooled.lambda, pooled.df
    );
    pooled.to_estimate()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pe(estimate: f64, variance: f64) -> PointEstimate {
        PointEstimate { estimate, variance, df: 100.0 }
    }

    #[test]
    fn single_replicate_keeps_complete_data_df() {
        let pooled = pool(&[pe(1.0, 0.04)], false).unwrap();
        assert_eq!(pooled.total, 0.04);
        assert_eq!(pooled.df, 100.0);
        assert_eq!(pooled.lambda, 0.0);
    }

    #[test]
    fn identical_replicates_have_infinite_rubin_df() {
        let pooled = pool(&[pe(1.0, 0.04); 5], false).unwrap();
        assert_eq!(pooled.between, 0.0);
        assert!(pooled.df.is_infinite());
        let (lo, hi) = pooled.interval(0.95).unwrap();
        assert!((hi - lo - 2.0 * 1.959964 * 0.2).abs() < 1e-5);
    }

    #[test]
    fn barnard_rubin_df_never_exceeds_complete_df() {
        let reps = [pe(1.0, 0.04), pe(1.3, 0.05), pe(0.8, 0.03)];
        let adjusted = pool(&reps, true).unwrap();
        let plain = pool(&reps, false).unwrap();
        assert!(adjusted.df < 100.0);
        assert!(adjusted.df <= plain.df);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(pool(&[], false).is_err());
    }
}
