//! Imputation mechanism trait and registry.
//!
//! RULE: Every mechanism implements ImputationMechanism.
//! A mechanism receives a frame, never a dataset, and must leave
//! observed cells untouched. All randomness comes from the dataset's
//! imputation stream.

use crate::{
    config::{ImputationSettings, Method},
    error::SimResult,
    fcs_imputer::ChainedEquations,
    frame::{ImputedReplicateSet, VarKind, WorkingFrame},
    mvn_imputer::JointMvn,
    rng::DatasetRng,
    types::MAX_CATEGORY,
};

/// The contract every imputation mechanism must fulfill.
pub trait ImputationMechanism: Send + Sync {
    /// Stable name, used in logs.
    fn name(&self) -> &'static str;

    /// Produce `m` completed replicates of `frame`.
    ///
    /// Model failure (singular fits, empty targets, too few rows) is
    /// returned as `SimError::ImputationModelFailure`.
    fn impute(
        &self,
        frame: &WorkingFrame,
        m: usize,
        rng: &mut DatasetRng,
    ) -> SimResult<ImputedReplicateSet>;
}

/// Mechanism for `method`, or `None` for complete-case analysis.
pub fn mechanism_for(method: Method, settings: &ImputationSettings) -> Option<Box<dyn ImputationMechanism>> {
    match method {
        Method::Cc  => None,
        Method::Mvn => Some(Box::new(JointMvn::from_settings(settings))),
        Method::Fcs => Some(Box::new(ChainedEquations::from_settings(settings))),
    }
}

/// Snap a continuous draw onto the nearest ordinal category.
pub fn round_to_category(value: f64) -> f64 {
    value.round().clamp(1.0, MAX_CATEGORY as f64)
}

/// Snap every imputed ordinal cell in `completed` onto a category.
pub(crate) fn round_ordinal_targets(original: &WorkingFrame, completed: &mut WorkingFrame) {
    for (orig, var) in original.variables.iter().zip(completed.variables.iter_mut()) {
        if var.kind != VarKind::Ordinal {
            continue;
        }
        for (o, v) in orig.values.iter().zip(var.values.iter_mut()) {
            if o.is_none() {
                *v = v.map(round_to_category);
            }
        }
    }
}
