//! Imputation strategies.
//!
//! RULE: Every strategy implements ImputationStrategy and follows the same
//! contract: prepare a working frame (auxiliaries plus strategy-specific
//! targets) → impute it with the run's mechanism → recompute the wave-4
//! outcome score on each completed replicate.
//!
//! The replicate set lives only inside `ImputationStrategy::run`; callers
//! receive per-replicate analysis vectors and nothing else.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    cohort::Dataset,
    config::{ImputationSettings, Method},
    error::{SimError, SimResult},
    fcs_imputer::ChainedEquations,
    frame::{VarKind, VarRole, WorkingFrame},
    imputer::{mechanism_for, ImputationMechanism},
    layout::{all_items, item_at, relabel_items, wave_range, ItemId},
    linalg::principal_component_scores,
    rng::DatasetRng,
    scoring::{CompletenessRule, ScaleScoreCalculator},
    types::WAVES,
};

const OUTCOME_WAVE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// No imputation; analyse the wave-4 score where it is defined.
    CompleteCase = 0,
    /// All 90 items imputed jointly with x, z.
    ItemLevel = 1,
    /// Four wave scores imputed in place of the items.
    ScoreLevel = 2,
    /// Wave-4 items imputed with wave 1–3 scores as auxiliaries.
    Wave4Items = 3,
    /// Items imputed one at a time from the wave scores, x and z.
    PassiveItems = 4,
    /// Wave-4 items imputed with principal components of waves 1–3.
    PrincipalComponents = 5,
}

impl StrategyKind {
    pub fn from_code(code: u8) -> SimResult<Self> {
        match code {
            0 => Ok(Self::CompleteCase),
            1 => Ok(Self::ItemLevel),
            2 => Ok(Self::ScoreLevel),
            3 => Ok(Self::Wave4Items),
            4 => Ok(Self::PassiveItems),
            5 => Ok(Self::PrincipalComponents),
            other => Err(SimError::invalid_config("strategy", other)),
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn build(&self) -> Box<dyn ImputationStrategy> {
        match self {
            Self::CompleteCase        => Box::new(CompleteCase),
            Self::ItemLevel           => Box::new(ItemLevel),
            Self::ScoreLevel          => Box::new(ScoreLevel),
            Self::Wave4Items          => Box::new(Wave4Items),
            Self::PassiveItems        => Box::new(PassiveItems),
            Self::PrincipalComponents => Box::new(PrincipalComponents),
        }
    }
}

/// Everything a strategy needs besides the dataset.
pub struct StrategyContext<'a> {
    pub calculator: &'a ScaleScoreCalculator,
    pub settings:   &'a ImputationSettings,
    pub method:     Method,
}

impl StrategyContext<'_> {
    /// Scoring under full completeness, used on completed replicates.
    fn complete_calculator(&self) -> ScaleScoreCalculator {
        self.calculator.with_rule(CompletenessRule::AllItems)
    }
}

/// Outcome and covariate of one analysable replicate.
#[derive(Debug, Clone)]
pub struct AnalysisData {
    /// Wave-4 score per subject; `None` where undefined.
    pub y: Vec<Option<f64>>,
    pub x: Vec<f64>,
}

/// The contract every imputation strategy must fulfill.
pub trait ImputationStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Register the working variable set for `dataset`.
    fn prepare(
        &self,
        dataset: &Dataset,
        ctx: &StrategyContext<'_>,
        rng: &mut DatasetRng,
    ) -> SimResult<WorkingFrame>;

    /// Wave-4 outcome score of each subject in a (completed) frame.
    fn outcome(&self, frame: &WorkingFrame, ctx: &StrategyContext<'_>) -> SimResult<Vec<Option<f64>>>;

    /// Prepare → impute → recompute score. Returns one entry per replicate,
    /// or a single entry when no mechanism is configured.
    fn run(
        &self,
        dataset: &Dataset,
        ctx: &StrategyContext<'_>,
        rng: &mut DatasetRng,
    ) -> SimResult<Vec<AnalysisData>> {
        let frame = self.prepare(dataset, ctx, rng)?;
        let replicates = match mechanism_for(ctx.method, ctx.settings) {
            None => vec![frame],
            Some(mechanism) => mechanism.impute(&frame, ctx.settings.m, rng)?.replicates,
        };
        replicates
            .iter()
            .map(|rep| {
                Ok(AnalysisData {
                    y: self.outcome(rep, ctx)?,
                    x: column_values(rep, "x")?,
                })
            })
            .collect()
    }
}

// ── Frame helpers ───────────────────────────────────────────────────

fn score_name(wave: usize) -> String {
    format!("score_w{wave}")
}

fn base_frame(dataset: &Dataset) -> WorkingFrame {
    let mut frame = WorkingFrame::new(dataset.subjects.iter().map(|s| s.id).collect());
    frame.push_auxiliary("x", &dataset.x());
    frame.push_auxiliary("z", &dataset.z());
    frame
}

/// Push item columns as ordinal targets, named by `labels`.
fn push_items(frame: &mut WorkingFrame, dataset: &Dataset, columns: &[usize], labels: &[String]) -> Vec<usize> {
    columns
        .iter()
        .zip(labels)
        .map(|(&col, label)| frame.push(label.clone(), VarKind::Ordinal, VarRole::Target, dataset.item_column(col)))
        .collect()
}

/// Push wave scores (computed under the run's rule) as continuous targets.
fn push_scores(frame: &mut WorkingFrame, dataset: &Dataset, calc: &ScaleScoreCalculator, waves: &[usize]) -> Vec<usize> {
    waves
        .iter()
        .map(|&w| frame.push(score_name(w), VarKind::Continuous, VarRole::Target, calc.wave_scores(dataset, w)))
        .collect()
}

fn column_values(frame: &WorkingFrame, name: &str) -> SimResult<Vec<f64>> {
    let col = frame
        .column(name)
        .ok_or_else(|| SimError::Other(anyhow::anyhow!("frame has no column '{name}'")))?;
    Ok(col.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Score wave 4 from item columns named `labels`.
fn wave4_from_items(frame: &WorkingFrame, labels: &[String], calc: &ScaleScoreCalculator) -> SimResult<Vec<Option<f64>>> {
    let cols = labels
        .iter()
        .map(|l| {
            frame
                .column(l)
                .ok_or_else(|| SimError::Other(anyhow::anyhow!("frame has no item column '{l}'")))
        })
        .collect::<SimResult<Vec<_>>>()?;
    Ok((0..frame.nrows())
        .map(|i| {
            let items: Vec<Option<f64>> = cols.iter().map(|c| c[i]).collect();
            calc.score(OUTCOME_WAVE, &items)
        })
        .collect())
}

fn wave_items(wave: usize) -> Vec<ItemId> {
    wave_range(wave).map(item_at).collect()
}

fn labels(items: &[ItemId]) -> Vec<String> {
    items.iter().map(ItemId::label).collect()
}

fn columns_of(wave: usize) -> Vec<usize> {
    wave_range(wave).collect()
}

// ── 0: complete case ────────────────────────────────────────────────

pub struct CompleteCase;

impl ImputationStrategy for CompleteCase {
    fn kind(&self) -> StrategyKind {
        StrategyKind::CompleteCase
    }

    fn prepare(&self, dataset: &Dataset, ctx: &StrategyContext<'_>, _rng: &mut DatasetRng) -> SimResult<WorkingFrame> {
        let mut frame = base_frame(dataset);
        push_scores(&mut frame, dataset, ctx.calculator, &[OUTCOME_WAVE]);
        Ok(frame)
    }

    fn outcome(&self, frame: &WorkingFrame, _ctx: &StrategyContext<'_>) -> SimResult<Vec<Option<f64>>> {
        frame
            .column(&score_name(OUTCOME_WAVE))
            .map(<[Option<f64>]>::to_vec)
            .ok_or_else(|| SimError::Other(anyhow::anyhow!("complete-case frame lacks the outcome score")))
    }
}

// ── 1: all items ────────────────────────────────────────────────────

pub struct ItemLevel;

impl ImputationStrategy for ItemLevel {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ItemLevel
    }

    fn prepare(&self, dataset: &Dataset, _ctx: &StrategyContext<'_>, _rng: &mut DatasetRng) -> SimResult<WorkingFrame> {
        let mut frame = base_frame(dataset);
        let items = all_items();
        let columns: Vec<usize> = (0..items.len()).collect();
        push_items(&mut frame, dataset, &columns, &labels(&items));
        Ok(frame)
    }

    fn outcome(&self, frame: &WorkingFrame, ctx: &StrategyContext<'_>) -> SimResult<Vec<Option<f64>>> {
        wave4_from_items(frame, &labels(&wave_items(OUTCOME_WAVE)), &ctx.complete_calculator())
    }
}

// ── 2: scores only ──────────────────────────────────────────────────

pub struct ScoreLevel;

impl ImputationStrategy for ScoreLevel {
    fn kind(&self) -> StrategyKind {
        StrategyKind::ScoreLevel
    }

    fn prepare(&self, dataset: &Dataset, ctx: &StrategyContext<'_>, _rng: &mut DatasetRng) -> SimResult<WorkingFrame> {
        let mut frame = base_frame(dataset);
        let waves: Vec<usize> = (1..=WAVES).collect();
        push_scores(&mut frame, dataset, ctx.calculator, &waves);
        Ok(frame)
    }

    fn outcome(&self, frame: &WorkingFrame, _ctx: &StrategyContext<'_>) -> SimResult<Vec<Option<f64>>> {
        frame
            .column(&score_name(OUTCOME_WAVE))
            .map(<[Option<f64>]>::to_vec)
            .ok_or_else(|| SimError::Other(anyhow::anyhow!("score frame lacks the wave-4 score")))
    }
}

// ── 3: wave-4 items with earlier scores ─────────────────────────────

pub struct Wave4Items;

impl ImputationStrategy for Wave4Items {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Wave4Items
    }

    fn prepare(&self, dataset: &Dataset, ctx: &StrategyContext<'_>, _rng: &mut DatasetRng) -> SimResult<WorkingFrame> {
        let mut frame = base_frame(dataset);
        push_scores(&mut frame, dataset, ctx.calculator, &[1, 2, 3]);
        let items = wave_items(OUTCOME_WAVE);
        push_items(&mut frame, dataset, &columns_of(OUTCOME_WAVE), &labels(&items));
        Ok(frame)
    }

    fn outcome(&self, frame: &WorkingFrame, ctx: &StrategyContext<'_>) -> SimResult<Vec<Option<f64>>> {
        wave4_from_items(frame, &labels(&wave_items(OUTCOME_WAVE)), &ctx.complete_calculator())
    }
}

// ── 4: passive item-by-item ─────────────────────────────────────────

/// Items are relabelled so late-introduced questions keep distinct
/// identities. Each item is predicted by the four wave scores, x, z and
/// every item of the other waves; its same-wave siblings never enter its
/// model. Scores are predicted by the other scores plus x and z.
pub struct PassiveItems;

impl PassiveItems {
    fn relabelled_wave(wave: usize) -> Vec<String> {
        relabel_items(&wave_items(wave))
    }

    /// The wave-4 score the joint model produced directly, before it is
    /// replaced by the score recomputed from completed items.
    pub fn model_score(frame: &WorkingFrame) -> Option<Vec<Option<f64>>> {
        frame.column(&score_name(OUTCOME_WAVE)).map(<[Option<f64>]>::to_vec)
    }
}

impl ImputationStrategy for PassiveItems {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PassiveItems
    }

    fn prepare(&self, dataset: &Dataset, ctx: &StrategyContext<'_>, _rng: &mut DatasetRng) -> SimResult<WorkingFrame> {
        let mut frame = base_frame(dataset);
        let (x, z) = (0, 1);
        let waves: Vec<usize> = (1..=WAVES).collect();
        let scores = push_scores(&mut frame, dataset, ctx.calculator, &waves);

        let items = all_items();
        let columns: Vec<usize> = (0..items.len()).collect();
        let item_cols = push_items(&mut frame, dataset, &columns, &relabel_items(&items));

        let mut base = scores.clone();
        base.extend([x, z]);
        for (column, &col) in item_cols.iter().enumerate() {
            let siblings = wave_range(item_at(column).wave as usize);
            let mut predictors = base.clone();
            predictors.extend(
                item_cols
                    .iter()
                    .enumerate()
                    .filter(|(other, _)| !siblings.contains(other))
                    .map(|(_, &c)| c),
            );
            frame.set_predictors(col, predictors);
        }
        for &col in &scores {
            frame.set_predictors(col, base.iter().copied().filter(|&p| p != col).collect());
        }
        Ok(frame)
    }

    fn outcome(&self, frame: &WorkingFrame, ctx: &StrategyContext<'_>) -> SimResult<Vec<Option<f64>>> {
        wave4_from_items(frame, &Self::relabelled_wave(OUTCOME_WAVE), &ctx.complete_calculator())
    }
}

// ── 5: principal-component auxiliaries ──────────────────────────────

pub struct PrincipalComponents;

impl PrincipalComponents {
    /// Replace non-finite component scores with the nearest finite value
    /// from an adjacent row. Rows are in subject-id order.
    pub fn backfill_adjacent(scores: &mut DMatrix<f64>) -> SimResult<()> {
        let n = scores.nrows();
        for c in 0..scores.ncols() {
            for i in 0..n {
                if scores[(i, c)].is_finite() {
                    continue;
                }
                let donor = (1..n)
                    .flat_map(|d| [i.checked_sub(d), (i + d < n).then_some(i + d)])
                    .flatten()
                    .find(|&j| scores[(j, c)].is_finite())
                    .ok_or_else(|| SimError::imputation(format!("pc{}", c + 1), "no finite component scores"))?;
                scores[(i, c)] = scores[(donor, c)];
            }
        }
        Ok(())
    }

    /// One chained-equations pass over all items, then component scores of
    /// the completed wave 1–3 items.
    fn component_scores(
        &self,
        dataset: &Dataset,
        ctx: &StrategyContext<'_>,
        rng: &mut DatasetRng,
    ) -> SimResult<DMatrix<f64>> {
        let item_frame = ItemLevel.prepare(dataset, ctx, rng)?;
        let once = ChainedEquations::from_settings(ctx.settings).impute(&item_frame, 1, rng)?;
        let completed = once
            .replicates
            .first()
            .ok_or_else(|| SimError::imputation("auxiliary pass", "no replicate produced"))?;

        let early: Vec<String> = (1..OUTCOME_WAVE).flat_map(|w| labels(&wave_items(w))).collect();
        let cols = early
            .iter()
            .map(|l| column_values(completed, l))
            .collect::<SimResult<Vec<_>>>()?;
        let data = DMatrix::from_fn(completed.nrows(), cols.len(), |i, j| cols[j][i]);

        let mut scores = principal_component_scores(&data, ctx.settings.n_components)
            .ok_or_else(|| SimError::imputation("principal components", "decomposition failed"))?;
        Self::backfill_adjacent(&mut scores)?;
        Ok(scores)
    }
}

impl ImputationStrategy for PrincipalComponents {
    fn kind(&self) -> StrategyKind {
        StrategyKind::PrincipalComponents
    }

    fn prepare(&self, dataset: &Dataset, ctx: &StrategyContext<'_>, rng: &mut DatasetRng) -> SimResult<WorkingFrame> {
        let scores = self.component_scores(dataset, ctx, rng)?;
        let mut frame = base_frame(dataset);
        for (c, col) in scores.column_iter().enumerate() {
            let values: Vec<f64> = col.iter().copied().collect();
            frame.push_auxiliary(format!("pc{}", c + 1), &values);
        }
        let items = wave_items(OUTCOME_WAVE);
        push_items(&mut frame, dataset, &columns_of(OUTCOME_WAVE), &labels(&items));
        Ok(frame)
    }

    fn outcome(&self, frame: &WorkingFrame, ctx: &StrategyContext<'_>) -> SimResult<Vec<Option<f64>>> {
        wave4_from_items(frame, &labels(&wave_items(OUTCOME_WAVE)), &ctx.complete_calculator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_codes_round_trip() {
        for code in 0..=5 {
            let kind = StrategyKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
            assert_eq!(kind.build().kind(), kind);
        }
        assert!(StrategyKind::from_code(6).is_err());
    }

    #[test]
    fn backfill_uses_nearest_finite_neighbour() {
        let mut scores = DMatrix::from_row_slice(4, 1, &[f64::NAN, 2.0, f64::NAN, 4.0]);
        PrincipalComponents::backfill_adjacent(&mut scores).unwrap();
        assert_eq!(scores.as_slice(), &[2.0, 2.0, 2.0, 4.0]);
    }

    #[test]
    fn backfill_fails_without_any_finite_score() {
        let mut scores = DMatrix::from_element(3, 1, f64::NAN);
        assert!(PrincipalComponents::backfill_adjacent(&mut scores).is_err());
    }
}
