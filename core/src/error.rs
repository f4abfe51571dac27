use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Correlation matrix is not positive semi-definite (min eigenvalue {min_eigenvalue:.3e})")]
    InvalidCovariance { min_eigenvalue: f64 },

    #[error("Imputation model failed for '{variable}': {reason}")]
    ImputationModelFailure { variable: String, reason: String },

    #[error("Estimator '{estimator}' failed: {reason}")]
    EstimationFailure { estimator: &'static str, reason: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: &'static str, value: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn imputation(variable: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ImputationModelFailure {
            variable: variable.into(),
            reason:   reason.into(),
        }
    }

    pub fn invalid_config(field: &'static str, value: impl ToString) -> Self {
        Self::InvalidConfig { field, value: value.to_string() }
    }
}

pub type SimResult<T> = Result<T, SimError>;
