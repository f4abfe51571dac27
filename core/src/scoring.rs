//! Wave-level scale scores from reverse-scored items.

use serde::{Deserialize, Serialize};

use crate::{
    cohort::Dataset,
    error::{SimError, SimResult},
    layout::items_in_wave,
    types::{MAX_CATEGORY, WAVES},
};

/// How many missing items a score tolerates before it becomes undefined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletenessRule {
    /// Mean of whatever items are present; undefined only when none are.
    AnyAvailable = 0,
    /// Defined only when every item is present.
    AllItems = 1,
    /// Defined when at most half the items (rounded down) are missing.
    HalfRule = 2,
}

impl CompletenessRule {
    pub fn from_code(code: u8) -> SimResult<Self> {
        match code {
            0 => Ok(Self::AnyAvailable),
            1 => Ok(Self::AllItems),
            2 => Ok(Self::HalfRule),
            other => Err(SimError::invalid_config("rule", other)),
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Largest tolerated count of missing items at `wave`.
    pub fn max_missing(&self, wave: usize) -> usize {
        let n = items_in_wave(wave);
        match self {
            Self::AnyAvailable => n - 1,
            Self::AllItems     => 0,
            Self::HalfRule     => n / 2,
        }
    }
}

/// Category → score table. Category 1 is the first entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverseScoring {
    pub table: [f64; MAX_CATEGORY as usize],
}

impl Default for ReverseScoring {
    fn default() -> Self {
        Self { table: [100.0, 75.0, 50.0, 25.0, 0.0] }
    }
}

impl ReverseScoring {
    /// Score for a category value. Values between categories interpolate
    /// linearly; values outside 1..=5 clamp.
    pub fn apply(&self, value: f64) -> f64 {
        let v = value.clamp(1.0, MAX_CATEGORY as f64);
        let lo = v.floor() as usize;
        let hi = v.ceil() as usize;
        let frac = v - lo as f64;
        self.table[lo - 1] * (1.0 - frac) + self.table[hi - 1] * frac
    }
}

#[derive(Debug, Clone)]
pub struct ScaleScoreCalculator {
    rule:    CompletenessRule,
    reverse: [ReverseScoring; WAVES],
}

impl ScaleScoreCalculator {
    pub fn new(rule: CompletenessRule) -> Self {
        Self { rule, reverse: [ReverseScoring::default(); WAVES] }
    }

    /// Replace the reverse-score table of one wave's scale.
    pub fn with_reverse_scoring(mut self, wave: usize, scoring: ReverseScoring) -> Self {
        self.reverse[wave - 1] = scoring;
        self
    }

    pub fn rule(&self) -> CompletenessRule {
        self.rule
    }

    /// Same reverse-score tables under a different completeness rule.
    pub fn with_rule(&self, rule: CompletenessRule) -> Self {
        Self { rule, reverse: self.reverse }
    }

    /// Score one subject's items at `wave`, or `None` when the completeness
    /// rule fails.
    pub fn score(&self, wave: usize, items: &[Option<f64>]) -> Option<f64> {
        let missing = items.iter().filter(|v| v.is_none()).count();
        if missing > self.rule.max_missing(wave) || missing == items.len() {
            return None;
        }
        let scoring = &self.reverse[wave - 1];
        let (sum, n) = items
            .iter()
            .flatten()
            .fold((0.0, 0usize), |(sum, n), &v| (sum + scoring.apply(v), n + 1));
        Some(sum / n as f64)
    }

    /// Scores for every subject of `dataset` at `wave`.
    pub fn wave_scores(&self, dataset: &Dataset, wave: usize) -> Vec<Option<f64>> {
        dataset
            .subjects
            .iter()
            .map(|s| {
                let items: Vec<Option<f64>> =
                    s.wave_items(wave).iter().map(|v| v.map(f64::from)).collect();
                self.score(wave, &items)
            })
            .collect()
    }
}
