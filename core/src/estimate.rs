//! Target estimators and the per-dataset estimate record.
//!
//! Every estimator works on the subjects whose wave-4 score is defined in a
//! replicate and returns a complete-data point estimate, its sampling
//! variance and its complete-data degrees of freedom.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::{
    distribution::{ContinuousCDF, Continuous, Normal},
    statistics::{Data, OrderStatistics, Statistics},
};

use crate::{
    error::{SimError, SimResult},
    linalg::OlsFit,
    strategy::AnalysisData,
    types::SimNo,
};

/// Two-sided level used by the Hall–Sheather bandwidth.
const BANDWIDTH_ALPHA: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    /// Slope of the wave-4 score on x.
    Regression,
    Mean,
    Median,
}

impl Estimator {
    pub const ALL: [Estimator; 3] = [Self::Regression, Self::Mean, Self::Median];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Regression => "regression",
            Self::Mean       => "mean",
            Self::Median     => "median",
        }
    }

    pub fn estimate(&self, data: &AnalysisData) -> SimResult<PointEstimate> {
        let (y, x) = complete_pairs(data);
        match self {
            Self::Regression => regression_slope(&y, &x),
            Self::Mean       => mean(&y),
            Self::Median     => median(&y),
        }
    }
}

/// One estimator applied to one completed replicate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointEstimate {
    pub estimate: f64,
    /// Squared standard error.
    pub variance: f64,
    /// Complete-data degrees of freedom.
    pub df:       f64,
}

/// (y, x) for subjects whose outcome is defined and whose covariate is finite.
pub fn complete_pairs(data: &AnalysisData) -> (Vec<f64>, Vec<f64>) {
    data.y
        .iter()
        .zip(&data.x)
        .filter_map(|(y, &x)| y.filter(|v| v.is_finite() && x.is_finite()).map(|v| (v, x)))
        .unzip()
}

fn failure(estimator: &'static str, reason: impl Into<String>) -> SimError {
    SimError::EstimationFailure { estimator, reason: reason.into() }
}

/// OLS slope of `y ~ 1 + x`.
pub fn regression_slope(y: &[f64], x: &[f64]) -> SimResult<PointEstimate> {
    let n = y.len();
    if n < 3 {
        return Err(failure("regression", format!("{n} complete pairs")));
    }
    let design = DMatrix::from_fn(n, 2, |i, j| if j == 0 { 1.0 } else { x[i] });
    let fit = OlsFit::fit(&design, &DVector::from_column_slice(y), 0.0)
        .ok_or_else(|| failure("regression", "singular design"))?;
    let se = fit.std_error(1);
    if !se.is_finite() {
        return Err(failure("regression", "non-finite standard error"));
    }
    Ok(PointEstimate { estimate: fit.beta[1], variance: se * se, df: fit.df as f64 })
}

pub fn mean(y: &[f64]) -> SimResult<PointEstimate> {
    let n = y.len();
    if n < 2 {
        return Err(failure("mean", format!("{n} observations")));
    }
    Ok(PointEstimate {
        estimate: y.mean(),
        variance: y.variance() / n as f64,
        df:       (n - 1) as f64,
    })
}

/// Sample median with a sparsity-based standard error.
///
/// The sparsity 1/f(median) is estimated by the difference quotient of
/// sample quantiles at 0.5 ± h, h the Hall–Sheather bandwidth. When ties
/// make the difference zero the bandwidth is doubled until it is not.
pub fn median(y: &[f64]) -> SimResult<PointEstimate> {
    let n = y.len();
    if n < 2 {
        return Err(failure("median", format!("{n} observations")));
    }
    let mut data = Data::new(y.to_vec());
    let estimate = data.median();

    let mut h = hall_sheather_bandwidth(n, 0.5)?;
    let sparsity = loop {
        let lo = (0.5 - h).max(0.0);
        let hi = (0.5 + h).min(1.0);
        let s = (data.quantile(hi) - data.quantile(lo)) / (hi - lo);
        if s > 0.0 {
            break s;
        }
        if hi >= 1.0 && lo <= 0.0 {
            return Err(failure("median", "zero sparsity: all outcomes tied"));
        }
        h *= 2.0;
    };
    let se = sparsity * (0.25 / n as f64).sqrt();
    Ok(PointEstimate { estimate, variance: se * se, df: (n - 1) as f64 })
}

/// Hall–Sheather (1988) bandwidth for quantile `tau` at sample size `n`.
pub fn hall_sheather_bandwidth(n: usize, tau: f64) -> SimResult<f64> {
    let std = Normal::new(0.0, 1.0).map_err(|e| failure("median", e.to_string()))?;
    let z = std.inverse_cdf(1.0 - BANDWIDTH_ALPHA / 2.0);
    let q = std.inverse_cdf(tau);
    let density = std.pdf(q);
    let ratio = 1.5 * density * density / (2.0 * q * q + 1.0);
    Ok((n as f64).powf(-1.0 / 3.0) * z.powf(2.0 / 3.0) * ratio.powf(1.0 / 3.0))
}

// ── Records ─────────────────────────────────────────────────────────

/// Completion code written with every estimate record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionCode {
    Ok = 0,
    ImputationFailed = 1,
    EstimationFailed = 2,
}

impl CompletionCode {
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::ImputationFailed),
            2 => Some(Self::EstimationFailed),
            _ => None,
        }
    }
}

/// Final inference for one estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    pub estimate: f64,
    pub se:       f64,
    pub lower:    f64,
    pub upper:    f64,
    pub df:       f64,
}

impl Estimate {
    pub fn missing() -> Self {
        Self {
            estimate: f64::NAN,
            se:       f64::NAN,
            lower:    f64::NAN,
            upper:    f64::NAN,
            df:       f64::NAN,
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.estimate, self.se, self.lower, self.upper].iter().all(|v| v.is_finite())
    }
}

/// One row per simulated dataset. Never mutated after it is appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateRecord {
    pub simno:      SimNo,
    pub code:       CompletionCode,
    pub regression: Estimate,
    pub mean:       Estimate,
    pub median:     Estimate,
}

impl EstimateRecord {
    pub fn failed(simno: SimNo, code: CompletionCode) -> Self {
        Self {
            simno,
            code,
            regression: Estimate::missing(),
            mean:       Estimate::missing(),
            median:     Estimate::missing(),
        }
    }

    pub fn get(&self, estimator: Estimator) -> &Estimate {
        match estimator {
            Estimator::Regression => &self.regression,
            Estimator::Mean       => &self.mean,
            Estimator::Median     => &self.median,
        }
    }
}
