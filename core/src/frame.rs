//! Working variable sets handed to the imputation mechanisms.
//!
//! A frame is column-oriented: each variable holds one value per subject,
//! `None` where missing. Targets are imputed; auxiliaries only predict.

use std::collections::BTreeMap;

use crate::types::SubjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    /// Ordinal item; imputed by predictive mean matching, values stay in 1..=5.
    Ordinal,
    /// Continuous score, component or covariate; imputed by regression draws.
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarRole {
    Target,
    Auxiliary,
}

#[derive(Debug, Clone)]
pub struct Variable {
    pub name:   String,
    pub kind:   VarKind,
    pub role:   VarRole,
    pub values: Vec<Option<f64>>,
}

impl Variable {
    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }

    pub fn observed(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().flatten().copied()
    }
}

#[derive(Debug, Clone)]
pub struct WorkingFrame {
    pub subject_ids: Vec<SubjectId>,
    pub variables:   Vec<Variable>,
    /// Per-target predictor sets; targets absent here use every other variable.
    predictor_overrides: BTreeMap<usize, Vec<usize>>,
}

impl WorkingFrame {
    pub fn new(subject_ids: Vec<SubjectId>) -> Self {
        Self {
            subject_ids,
            variables: Vec::new(),
            predictor_overrides: BTreeMap::new(),
        }
    }

    pub fn nrows(&self) -> usize {
        self.subject_ids.len()
    }

    pub fn ncols(&self) -> usize {
        self.variables.len()
    }

    /// Append a variable and return its column index.
    pub fn push(
        &mut self,
        name: impl Into<String>,
        kind: VarKind,
        role: VarRole,
        values: Vec<Option<f64>>,
    ) -> usize {
        assert_eq!(values.len(), self.nrows(), "column length must match subject count");
        self.variables.push(Variable { name: name.into(), kind, role, values });
        self.variables.len() - 1
    }

    pub fn push_auxiliary(&mut self, name: impl Into<String>, values: &[f64]) -> usize {
        let values = values.iter().map(|&v| Some(v)).collect();
        self.push(name, VarKind::Continuous, VarRole::Auxiliary, values)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.index_of(name).map(|i| self.variables[i].values.as_slice())
    }

    /// Targets that actually have something to impute, in column order.
    pub fn incomplete_targets(&self) -> Vec<usize> {
        self.variables
            .iter()
            .enumerate()
            .filter(|(_, v)| v.role == VarRole::Target && v.missing_count() > 0)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn missing_count(&self) -> usize {
        self.variables.iter().map(Variable::missing_count).sum()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_count() == 0
    }

    pub fn set_predictors(&mut self, target: usize, predictors: Vec<usize>) {
        self.predictor_overrides.insert(target, predictors);
    }

    pub fn predictors_for(&self, target: usize) -> Vec<usize> {
        match self.predictor_overrides.get(&target) {
            Some(p) => p.iter().copied().filter(|&j| j != target).collect(),
            None => (0..self.ncols()).filter(|&j| j != target).collect(),
        }
    }

    /// Copy of this frame with every missing cell replaced from `filled`
    /// (column-major, one inner vector per variable).
    pub fn completed_with(&self, filled: &[Vec<f64>]) -> Self {
        let mut out = self.clone();
        for (var, col) in out.variables.iter_mut().zip(filled) {
            for (v, &f) in var.values.iter_mut().zip(col) {
                if v.is_none() {
                    *v = Some(f);
                }
            }
        }
        out
    }
}

/// M completed copies of one frame, differing only in imputed cells.
#[derive(Debug, Clone)]
pub struct ImputedReplicateSet {
    pub replicates: Vec<WorkingFrame>,
}

impl ImputedReplicateSet {
    pub fn len(&self) -> usize {
        self.replicates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicates.is_empty()
    }

    /// True when every replicate reproduces the observed cells of `original`
    /// and has no missing cells left.
    pub fn preserves_observed(&self, original: &WorkingFrame) -> bool {
        self.replicates.iter().all(|rep| {
            rep.is_complete()
                && rep.variables.iter().zip(&original.variables).all(|(r, o)| {
                    r.values
                        .iter()
                        .zip(&o.values)
                        .all(|(rv, ov)| ov.is_none() || rv == ov)
                })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_frame() -> WorkingFrame {
        let mut f = WorkingFrame::new(vec![1, 2, 3]);
        f.push("a", VarKind::Ordinal, VarRole::Target, vec![Some(1.0), None, Some(3.0)]);
        f.push_auxiliary("x", &[0.1, 0.2, 0.3]);
        f
    }

    #[test]
    fn default_predictors_exclude_target() {
        let f = small_frame();
        assert_eq!(f.predictors_for(0), vec![1]);
        assert_eq!(f.incomplete_targets(), vec![0]);
    }

    #[test]
    fn completion_keeps_observed_cells() {
        let f = small_frame();
        let done = f.completed_with(&[vec![9.0, 2.0, 9.0], vec![0.0, 0.0, 0.0]]);
        assert_eq!(done.variables[0].values, vec![Some(1.0), Some(2.0), Some(3.0)]);
        let set = ImputedReplicateSet { replicates: vec![done] };
        assert!(set.preserves_observed(&f));
    }
}
