//! Fully-conditional specification (chained equations).
//!
//! Each replicate is an independent chain. A chain starts from random
//! draws of each target's observed values, then makes `iterations` passes
//! over the incomplete targets in column order. Every visit fits a linear
//! model of the target on its predictor set (rows where the target is
//! observed), draws the model parameters from their posterior, and refills
//! the target's missing cells:
//!   - ordinal targets by predictive mean matching,
//!   - continuous targets by a normal regression draw.
//! The loop is sequential; each visit depends on the previous one.

use nalgebra::{DMatrix, DVector};

use crate::{
    config::ImputationSettings,
    error::{SimError, SimResult},
    frame::{ImputedReplicateSet, VarKind, WorkingFrame},
    imputer::ImputationMechanism,
    linalg::OlsFit,
    rng::DatasetRng,
};

pub struct ChainedEquations {
    iterations: usize,
    donors:     usize,
    ridge:      f64,
}

/// Posterior draw of one conditional model.
struct ParameterDraw {
    beta_hat:  DVector<f64>,
    beta_star: DVector<f64>,
    sigma_star: f64,
}

impl ChainedEquations {
    pub fn new(iterations: usize, donors: usize, ridge: f64) -> Self {
        Self {
            iterations: iterations.max(1),
            donors:     donors.max(1),
            ridge,
        }
    }

    pub fn from_settings(settings: &ImputationSettings) -> Self {
        Self::new(settings.fcs_iterations, settings.pmm_donors, settings.ridge)
    }

    /// Column-major working copy; missing cells get a random observed value.
    fn initial_fill(frame: &WorkingFrame, rng: &mut DatasetRng) -> SimResult<Vec<Vec<f64>>> {
        frame
            .variables
            .iter()
            .map(|var| {
                let observed: Vec<f64> = var.observed().collect();
                if observed.is_empty() {
                    return Err(SimError::imputation(&var.name, "no observed values"));
                }
                Ok(var
                    .values
                    .iter()
                    .map(|v| v.unwrap_or_else(|| observed[rng.next_below(observed.len())]))
                    .collect())
            })
            .collect()
    }

    /// Design matrix `[1, predictors…]` over `rows`.
    fn design(current: &[Vec<f64>], predictors: &[usize], rows: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(rows.len(), predictors.len() + 1, |i, j| {
            if j == 0 { 1.0 } else { current[predictors[j - 1]][rows[i]] }
        })
    }

    /// Bayesian linear-regression draw:
    /// σ*² = σ̂² · df / χ²_df, β* = β̂ + σ* · L z with L Lᵀ = (XᵀX)⁻¹.
    fn draw_parameters(
        &self,
        name: &str,
        x_obs: &DMatrix<f64>,
        y_obs: &DVector<f64>,
        rng: &mut DatasetRng,
    ) -> SimResult<ParameterDraw> {
        let fit = OlsFit::fit(x_obs, y_obs, self.ridge).ok_or_else(|| {
            SimError::imputation(
                name,
                format!("singular conditional model ({} rows, {} terms)", x_obs.nrows(), x_obs.ncols()),
            )
        })?;
        let chi = rng.chi_squared(fit.df as f64);
        let sigma_star = (fit.sigma2 * fit.df as f64 / chi).sqrt();
        if !sigma_star.is_finite() {
            return Err(SimError::imputation(name, "non-finite residual variance draw"));
        }
        let z = DVector::from_fn(fit.beta.len(), |_, _| rng.normal());
        let beta_star = &fit.beta + &fit.xtx_inv_factor * z * sigma_star;
        Ok(ParameterDraw { beta_hat: fit.beta, beta_star, sigma_star })
    }

    /// Predictive mean matching: each missing row takes the observed value
    /// of a donor drawn from the `donors` observed rows whose predictions
    /// are closest to its own.
    fn match_donors(
        &self,
        yhat_obs: &DVector<f64>,
        y_obs: &DVector<f64>,
        yhat_mis: &DVector<f64>,
        rng: &mut DatasetRng,
    ) -> Vec<f64> {
        let pool = self.donors.min(yhat_obs.len());
        let mut order: Vec<usize> = (0..yhat_obs.len()).collect();
        yhat_mis
            .iter()
            .map(|&target| {
                let dist = |i: &usize| (yhat_obs[*i] - target).abs();
                if pool < order.len() {
                    order.select_nth_unstable_by(pool - 1, |a, b| dist(a).total_cmp(&dist(b)));
                }
                let donor = order[rng.next_below(pool)];
                y_obs[donor]
            })
            .collect()
    }

    fn visit(
        &self,
        frame: &WorkingFrame,
        target: usize,
        current: &mut [Vec<f64>],
        rng: &mut DatasetRng,
    ) -> SimResult<()> {
        let var = &frame.variables[target];
        let (mis_rows, obs_rows): (Vec<usize>, Vec<usize>) =
            (0..frame.nrows()).partition(|&i| var.values[i].is_none());
        let predictors = frame.predictors_for(target);

        let x_obs = Self::design(current, &predictors, &obs_rows);
        let x_mis = Self::design(current, &predictors, &mis_rows);
        let y_obs = DVector::from_fn(obs_rows.len(), |i, _| current[target][obs_rows[i]]);

        let draw = self.draw_parameters(&var.name, &x_obs, &y_obs, rng)?;
        let yhat_mis = &x_mis * &draw.beta_star;

        let imputed: Vec<f64> = match var.kind {
            VarKind::Ordinal => {
                let yhat_obs = &x_obs * &draw.beta_hat;
                self.match_donors(&yhat_obs, &y_obs, &yhat_mis, rng)
            }
            VarKind::Continuous => yhat_mis
                .iter()
                .map(|&mean| mean + draw.sigma_star * rng.normal())
                .collect(),
        };
        for (&row, value) in mis_rows.iter().zip(imputed) {
            current[target][row] = value;
        }
        Ok(())
    }

    fn run_chain(&self, frame: &WorkingFrame, targets: &[usize], rng: &mut DatasetRng) -> SimResult<WorkingFrame> {
        let mut current = Self::initial_fill(frame, rng)?;
        for _ in 0..self.iterations {
            for &target in targets {
                self.visit(frame, target, &mut current, rng)?;
            }
        }
        Ok(frame.completed_with(&current))
    }
}

impl ImputationMechanism for ChainedEquations {
    fn name(&self) -> &'static str {
        "fcs"
    }

    fn impute(&self, frame: &WorkingFrame, m: usize, rng: &mut DatasetRng) -> SimResult<ImputedReplicateSet> {
        let targets = frame.incomplete_targets();
        if targets.is_empty() {
            return Ok(ImputedReplicateSet { replicates: vec![frame.clone(); m] });
        }
        let replicates = (0..m)
            .map(|_| self.run_chain(frame, &targets, rng))
            .collect::<SimResult<Vec<_>>>()?;
        log::debug!(
            "fcs: {} targets, {} iterations, {} replicates",
            targets.len(),
            self.iterations,
            replicates.len()
        );
        Ok(ImputedReplicateSet { replicates })
    }
}
