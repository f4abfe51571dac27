//! Run configuration and reference-derived sampling parameters.
//!
//! Both objects are immutable once built and scoped to a single run.
//! Integer and string codes from the driver are validated here, at entry.

use std::ops::RangeInclusive;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    error::{SimError, SimResult},
    layout::item_at,
    missingness::{MissingnessCoefficients, Scenario},
    scoring::CompletenessRule,
    strategy::StrategyKind,
    types::{SimNo, DEFAULT_SAMPLE_SIZE, N_ITEMS, N_LATENT, WAVES},
};

/// Imputation mechanism requested for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Complete-case analysis; no imputation.
    Cc,
    /// Joint multivariate-normal data augmentation.
    Mvn,
    /// Fully-conditional specification (chained equations).
    Fcs,
}

impl Method {
    pub fn from_code(code: &str) -> SimResult<Self> {
        match code.to_ascii_lowercase().as_str() {
            "cc"  => Ok(Self::Cc),
            "mvn" => Ok(Self::Mvn),
            "fcs" => Ok(Self::Fcs),
            other => Err(SimError::invalid_config("method", other)),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Cc  => "cc",
            Self::Mvn => "mvn",
            Self::Fcs => "fcs",
        }
    }
}

/// Tuning knobs shared by both imputation mechanisms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImputationSettings {
    /// Completed replicates per dataset.
    pub m: usize,
    /// Passes over the variable list per chained-equations chain.
    pub fcs_iterations: usize,
    /// Data-augmentation iterations before the first joint-model replicate.
    pub mvn_burnin: usize,
    /// Data-augmentation iterations between successive joint-model replicates.
    pub mvn_between: usize,
    /// Donor pool size for predictive mean matching.
    pub pmm_donors: usize,
    /// Ridge added to normal equations and covariance diagonals.
    pub ridge: f64,
    /// Principal components retained by the component-reduction strategy.
    pub n_components: usize,
    /// Use the Barnard–Rubin small-sample degrees of freedom when pooling.
    pub small_sample_df: bool,
}

impl Default for ImputationSettings {
    fn default() -> Self {
        Self {
            m:               40,
            fcs_iterations:  10,
            mvn_burnin:      100,
            mvn_between:     20,
            pmm_donors:      5,
            ridge:           1e-5,
            n_components:    7,
            small_sample_df: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub seed:             u64,
    pub sample_size:      usize,
    pub simno_start:      SimNo,
    pub simno_end:        SimNo,
    pub scenario:         Scenario,
    pub strategy:         StrategyKind,
    pub method:           Method,
    pub rule:             CompletenessRule,
    pub imputation:       ImputationSettings,
    /// Overrides the scenario's built-in coefficients when set.
    pub missingness:      Option<MissingnessCoefficients>,
    pub persist_datasets: bool,
}

impl RunConfig {
    /// Build a configuration from the driver's integer and string codes.
    pub fn from_codes(
        seed: u64,
        scenario: u8,
        strategy: u8,
        method: &str,
        rule: u8,
        simno_start: SimNo,
        simno_end: SimNo,
    ) -> SimResult<Self> {
        let config = Self {
            seed,
            sample_size: DEFAULT_SAMPLE_SIZE,
            simno_start,
            simno_end,
            scenario: Scenario::from_code(scenario)?,
            strategy: StrategyKind::from_code(strategy)?,
            method: Method::from_code(method)?,
            rule: CompletenessRule::from_code(rule)?,
            imputation: ImputationSettings::default(),
            missingness: None,
            persist_datasets: false,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> SimResult<()> {
        if self.simno_start == 0 || self.simno_end < self.simno_start {
            return Err(SimError::invalid_config(
                "simno range",
                format!("{}..={}", self.simno_start, self.simno_end),
            ));
        }
        if self.sample_size < 10 {
            return Err(SimError::invalid_config("sample_size", self.sample_size));
        }
        match (self.strategy, self.method) {
            (StrategyKind::CompleteCase, Method::Cc) => {}
            (StrategyKind::CompleteCase, m) => {
                return Err(SimError::invalid_config("method", format!("{} with strategy 0", m.code())));
            }
            (s, Method::Cc) => {
                return Err(SimError::invalid_config("method", format!("cc with strategy {}", s.code())));
            }
            _ => {}
        }
        let s = &self.imputation;
        if s.m == 0 {
            return Err(SimError::invalid_config("m", s.m));
        }
        if s.fcs_iterations == 0 {
            return Err(SimError::invalid_config("fcs_iterations", s.fcs_iterations));
        }
        if s.pmm_donors == 0 {
            return Err(SimError::invalid_config("pmm_donors", s.pmm_donors));
        }
        if s.n_components == 0 || s.n_components > N_ITEMS {
            return Err(SimError::invalid_config("n_components", s.n_components));
        }
        Ok(())
    }

    pub fn simnos(&self) -> RangeInclusive<SimNo> {
        self.simno_start..=self.simno_end
    }

    pub fn replicate_count(&self) -> usize {
        (self.simno_end - self.simno_start + 1) as usize
    }

    pub fn missingness_coefficients(&self) -> MissingnessCoefficients {
        self.missingness.unwrap_or_else(|| self.scenario.coefficients())
    }

    /// Small, fast configuration for unit tests.
    pub fn default_test() -> Self {
        Self {
            seed:             1,
            sample_size:      200,
            simno_start:      1,
            simno_end:        2,
            scenario:         Scenario::Baseline,
            strategy:         StrategyKind::CompleteCase,
            method:           Method::Cc,
            rule:             CompletenessRule::AnyAvailable,
            imputation:       ImputationSettings {
                m:              3,
                fcs_iterations: 2,
                mvn_burnin:     5,
                mvn_between:    2,
                ..ImputationSettings::default()
            },
            missingness:      None,
            persist_datasets: false,
        }
    }
}

// ── Reference parameters ───────────────────────────────────────────

/// On-disk form of the reference parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceFile {
    pub correlation:  Vec<Vec<f64>>,
    pub anchor_means: [f64; 2],
    pub anchor_sds:   [f64; 2],
}

/// Sampling parameters derived once from real reference data.
#[derive(Debug, Clone)]
pub struct ReferenceParams {
    pub correlation:  DMatrix<f64>,
    pub anchor_means: [f64; 2],
    pub anchor_sds:   [f64; 2],
}

impl ReferenceParams {
    pub fn new(correlation: DMatrix<f64>, anchor_means: [f64; 2], anchor_sds: [f64; 2]) -> SimResult<Self> {
        let params = Self { correlation, anchor_means, anchor_sds };
        params.validate()?;
        Ok(params)
    }

    /// Load from a JSON file holding a [`ReferenceFile`].
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: ReferenceFile = serde_json::from_str(&content)?;
        Ok(Self::from_file(file)?)
    }

    pub fn from_file(file: ReferenceFile) -> SimResult<Self> {
        let n = file.correlation.len();
        if file.correlation.iter().any(|row| row.len() != n) {
            return Err(SimError::invalid_config("correlation", "ragged rows"));
        }
        let correlation = DMatrix::from_fn(n, n, |i, j| file.correlation[i][j]);
        Self::new(correlation, file.anchor_means, file.anchor_sds)
    }

    pub fn to_file(&self) -> ReferenceFile {
        let n = self.correlation.nrows();
        ReferenceFile {
            correlation:  (0..n).map(|i| (0..n).map(|j| self.correlation[(i, j)]).collect()).collect(),
            anchor_means: self.anchor_means,
            anchor_sds:   self.anchor_sds,
        }
    }

    /// Estimate parameters from reference observations: each row holds the
    /// 90 item values followed by the two anchor variables. Rows with any
    /// non-finite value are skipped.
    pub fn from_observations(rows: &[Vec<f64>]) -> SimResult<Self> {
        let complete: Vec<&Vec<f64>> = rows
            .iter()
            .filter(|r| r.len() == N_LATENT && r.iter().all(|v| v.is_finite()))
            .collect();
        if complete.len() < 3 {
            return Err(SimError::invalid_config("reference rows", complete.len()));
        }
        let data = DMatrix::from_fn(complete.len(), N_LATENT, |i, j| complete[i][j]);
        let correlation = crate::linalg::correlation(&data);
        let (means, sds) = crate::linalg::column_moments(&data);
        Self::new(
            correlation,
            [means[N_ITEMS], means[N_ITEMS + 1]],
            [sds[N_ITEMS], sds[N_ITEMS + 1]],
        )
    }

    /// A documented synthetic reference structure.
    ///
    /// Items load 0.7 on their wave factor and 0.4 on a factor shared by the
    /// same question across waves. Wave factors follow an AR(1) pattern with
    /// ρ = 0.7. The anchors load 0.25 (x) and 0.15 (z) on every wave factor.
    /// Unit diagonal makes this a valid correlation matrix by construction.
    pub fn synthetic() -> Self {
        const RHO: f64 = 0.7;
        const WAVE_LOADING: f64 = 0.7;
        const CODE_LOADING: f64 = 0.4;
        const X_LOADING: f64 = 0.25;
        const Z_LOADING: f64 = 0.15;
        const CODES: usize = 23;

        let mut wave_loadings = DMatrix::<f64>::zeros(N_LATENT, WAVES);
        let mut code_loadings = DMatrix::<f64>::zeros(N_LATENT, CODES);
        for col in 0..N_ITEMS {
            let item = item_at(col);
            wave_loadings[(col, item.wave as usize - 1)] = WAVE_LOADING;
            code_loadings[(col, item.code() as usize - 1)] = CODE_LOADING;
        }
        for w in 0..WAVES {
            wave_loadings[(N_ITEMS, w)] = X_LOADING;
            wave_loadings[(N_ITEMS + 1, w)] = Z_LOADING;
        }
        let phi = DMatrix::from_fn(WAVES, WAVES, |i, j| RHO.powi((i as i32 - j as i32).abs()));

        let mut correlation = &wave_loadings * phi * wave_loadings.transpose()
            + &code_loadings * code_loadings.transpose();
        for i in 0..N_LATENT {
            correlation[(i, i)] = 1.0;
        }
        Self {
            correlation,
            anchor_means: [50.0, 5.0],
            anchor_sds:   [10.0, 2.0],
        }
    }

    /// Mean vector: zeros for the items, anchor means for the covariates.
    pub fn mean_vector(&self) -> Vec<f64> {
        let mut means = vec![0.0; N_LATENT];
        means[N_ITEMS] = self.anchor_means[0];
        means[N_ITEMS + 1] = self.anchor_means[1];
        means
    }

    /// SD vector: ones for the items, anchor sds for the covariates.
    pub fn sd_vector(&self) -> Vec<f64> {
        let mut sds = vec![1.0; N_LATENT];
        sds[N_ITEMS] = self.anchor_sds[0];
        sds[N_ITEMS + 1] = self.anchor_sds[1];
        sds
    }

    fn validate(&self) -> SimResult<()> {
        let c = &self.correlation;
        if c.nrows() != N_LATENT || c.ncols() != N_LATENT {
            return Err(SimError::invalid_config(
                "correlation",
                format!("{}x{} (expected {N_LATENT}x{N_LATENT})", c.nrows(), c.ncols()),
            ));
        }
        for i in 0..N_LATENT {
            if (c[(i, i)] - 1.0).abs() > 1e-6 {
                return Err(SimError::invalid_config("correlation diagonal", c[(i, i)]));
            }
            for j in 0..i {
                if (c[(i, j)] - c[(j, i)]).abs() > 1e-8 || !c[(i, j)].is_finite() {
                    return Err(SimError::invalid_config("correlation symmetry", format!("({i},{j})")));
                }
            }
        }
        if self.anchor_sds.iter().any(|&s| !(s > 0.0 && s.is_finite())) {
            return Err(SimError::invalid_config("anchor_sds", format!("{:?}", self.anchor_sds)));
        }
        Ok(())
    }
}
