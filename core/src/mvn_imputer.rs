//! Joint multivariate-normal imputation by data augmentation.
//!
//! Each iteration draws (μ, Σ⁻¹) from their posterior given the current
//! completed data (P-step), then redraws every missing cell from its
//! conditional normal given the row's observed cells (I-step).
//! Replicates are taken after `burnin` iterations and every `between`
//! iterations after that.

use nalgebra::{Cholesky, DMatrix, DVector};

use crate::{
    config::ImputationSettings,
    error::{SimError, SimResult},
    frame::{ImputedReplicateSet, WorkingFrame},
    imputer::{round_ordinal_targets, ImputationMechanism},
    linalg::{column_moments, covariance, spd_inverse},
    rng::DatasetRng,
};

const MODEL: &str = "joint model";

/// Row index plus the column indices it is missing and observing.
struct RowPattern {
    row: usize,
    missing: Vec<usize>,
    observed: Vec<usize>,
}

pub struct JointMvn {
    burnin:  usize,
    between: usize,
    ridge:   f64,
}

impl JointMvn {
    pub fn new(burnin: usize, between: usize, ridge: f64) -> Self {
        Self {
            burnin:  burnin.max(1),
            between: between.max(1),
            ridge,
        }
    }

    pub fn from_settings(settings: &ImputationSettings) -> Self {
        Self::new(settings.mvn_burnin, settings.mvn_between, settings.ridge)
    }

    /// Row-major data with missing cells set to their column's observed mean.
    fn initial_fill(frame: &WorkingFrame) -> SimResult<DMatrix<f64>> {
        let (n, p) = (frame.nrows(), frame.ncols());
        let mut y = DMatrix::<f64>::zeros(n, p);
        for (j, var) in frame.variables.iter().enumerate() {
            let observed: Vec<f64> = var.observed().collect();
            if observed.is_empty() {
                return Err(SimError::imputation(&var.name, "no observed values"));
            }
            let mean = observed.iter().sum::<f64>() / observed.len() as f64;
            for (i, v) in var.values.iter().enumerate() {
                y[(i, j)] = v.unwrap_or(mean);
            }
        }
        Ok(y)
    }

    fn row_patterns(frame: &WorkingFrame) -> Vec<RowPattern> {
        (0..frame.nrows())
            .filter_map(|row| {
                let (missing, observed): (Vec<usize>, Vec<usize>) =
                    (0..frame.ncols()).partition(|&j| frame.variables[j].values[row].is_none());
                (!missing.is_empty()).then_some(RowPattern { row, missing, observed })
            })
            .collect()
    }

    /// P-step: μ ~ N(ȳ, Σ/n) and Σ⁻¹ ~ Wishart(n − 1, ((n − 1)S)⁻¹),
    /// the latter by Bartlett decomposition.
    fn draw_parameters(&self, y: &DMatrix<f64>, rng: &mut DatasetRng) -> SimResult<(DVector<f64>, DMatrix<f64>)> {
        let (n, p) = y.shape();
        if n <= p + 1 {
            return Err(SimError::imputation(MODEL, format!("{n} rows cannot support {p} variables")));
        }
        let mut s = covariance(y);
        for i in 0..p {
            s[(i, i)] += self.ridge * s[(i, i)].max(1e-12);
        }
        let df = (n - 1) as f64;
        let scale = spd_inverse(&(s * df))
            .ok_or_else(|| SimError::imputation(MODEL, "covariance is not positive definite"))?;
        let l_scale = Cholesky::new(scale)
            .ok_or_else(|| SimError::imputation(MODEL, "Wishart scale is not positive definite"))?
            .l();

        let mut bartlett = DMatrix::<f64>::zeros(p, p);
        for i in 0..p {
            bartlett[(i, i)] = rng.chi_squared(df - i as f64).sqrt();
            for j in 0..i {
                bartlett[(i, j)] = rng.normal();
            }
        }
        let lb = l_scale * bartlett;
        let precision = &lb * lb.transpose();

        let sigma = spd_inverse(&precision)
            .ok_or_else(|| SimError::imputation(MODEL, "drawn precision is singular"))?;
        let l_mean = Cholesky::new(sigma / n as f64)
            .ok_or_else(|| SimError::imputation(MODEL, "drawn covariance is not positive definite"))?
            .l();
        let (means, _) = column_moments(y);
        let z = DVector::from_fn(p, |_, _| rng.normal());
        let mu = DVector::from_vec(means) + l_mean * z;

        if mu.iter().chain(precision.iter()).any(|v| !v.is_finite()) {
            return Err(SimError::imputation(MODEL, "non-finite parameter draw"));
        }
        Ok((mu, precision))
    }

    /// I-step: y_m | y_o ~ N(μ_m − Λ_mm⁻¹ Λ_mo (y_o − μ_o), Λ_mm⁻¹).
    fn impute_rows(
        y: &mut DMatrix<f64>,
        patterns: &[RowPattern],
        mu: &DVector<f64>,
        precision: &DMatrix<f64>,
        rng: &mut DatasetRng,
    ) -> SimResult<()> {
        for pat in patterns {
            let (mis, obs) = (&pat.missing, &pat.observed);
            let k = mis.len();
            let lmm = DMatrix::from_fn(k, k, |a, b| precision[(mis[a], mis[b])]);
            let lmo = DMatrix::from_fn(k, obs.len(), |a, b| precision[(mis[a], obs[b])]);
            let d = DVector::from_fn(obs.len(), |a, _| y[(pat.row, obs[a])] - mu[obs[a]]);

            let chol = Cholesky::new(lmm)
                .ok_or_else(|| SimError::imputation(MODEL, "conditional precision is singular"))?;
            let shift = chol.solve(&(lmo * d));
            let z = DVector::from_fn(k, |_, _| rng.normal());
            let noise = chol
                .l()
                .tr_solve_lower_triangular(&z)
                .ok_or_else(|| SimError::imputation(MODEL, "triangular solve failed"))?;

            for a in 0..k {
                y[(pat.row, mis[a])] = mu[mis[a]] - shift[a] + noise[a];
            }
        }
        Ok(())
    }

    fn snapshot(frame: &WorkingFrame, y: &DMatrix<f64>) -> WorkingFrame {
        let filled: Vec<Vec<f64>> = y.column_iter().map(|c| c.iter().copied().collect()).collect();
        let mut completed = frame.completed_with(&filled);
        round_ordinal_targets(frame, &mut completed);
        completed
    }
}

impl ImputationMechanism for JointMvn {
    fn name(&self) -> &'static str {
        "mvn"
    }

    fn impute(&self, frame: &WorkingFrame, m: usize, rng: &mut DatasetRng) -> SimResult<ImputedReplicateSet> {
        if frame.is_complete() {
            return Ok(ImputedReplicateSet { replicates: vec![frame.clone(); m] });
        }
        let patterns = Self::row_patterns(frame);
        let mut y = Self::initial_fill(frame)?;
        let total = self.burnin + self.between * m.saturating_sub(1);
        let mut replicates = Vec::with_capacity(m);

        for iter in 1..=total {
            let (mu, precision) = self.draw_parameters(&y, rng)?;
            Self::impute_rows(&mut y, &patterns, &mu, &precision, rng)?;
            if iter >= self.burnin && (iter - self.burnin) % self.between == 0 {
                replicates.push(Self::snapshot(frame, &y));
            }
        }
        log::debug!(
            "mvn: {} rows incomplete, {} variables, {total} iterations, {} replicates",
            patterns.len(),
            frame.ncols(),
            replicates.len()
        );
        Ok(ImputedReplicateSet { replicates })
    }
}
