//! Two-stage logistic missingness: whole waves first, then single items.

use serde::{Deserialize, Serialize};

use crate::{
    cohort::{Dataset, WaveMissingness},
    error::{SimError, SimResult},
    layout::wave_range,
    linalg::column_moments,
    rng::DatasetRng,
    types::WAVES,
};

/// Logistic coefficients of one missingness scenario. Both covariates share
/// the stage's slope.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MissingnessCoefficients {
    pub case_intercept: f64,
    pub case_slope:     f64,
    pub item_intercept: f64,
    pub item_slope:     f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    Baseline = 1,
    Inflated = 2,
    Extreme = 3,
}

impl Scenario {
    pub fn from_code(code: u8) -> SimResult<Self> {
        match code {
            1 => Ok(Self::Baseline),
            2 => Ok(Self::Inflated),
            3 => Ok(Self::Extreme),
            other => Err(SimError::invalid_config("scenario", other)),
        }
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Inflated => "inflated",
            Self::Extreme  => "extreme",
        }
    }

    /// Built-in coefficients. Extreme sits below baseline on every
    /// coefficient, inflated above it on the intercepts.
    pub fn coefficients(&self) -> MissingnessCoefficients {
        match self {
            Self::Baseline => MissingnessCoefficients {
                case_intercept: -2.2,
                case_slope:     0.15,
                item_intercept: -3.2,
                item_slope:     0.15,
            },
            Self::Inflated => MissingnessCoefficients {
                case_intercept: -1.2,
                case_slope:     0.15,
                item_intercept: -2.2,
                item_slope:     0.15,
            },
            Self::Extreme => MissingnessCoefficients {
                case_intercept: -3.0,
                case_slope:     0.10,
                item_intercept: -4.0,
                item_slope:     0.10,
            },
        }
    }
}

pub fn sigmoid(v: f64) -> f64 {
    1.0 / (1.0 + (-v).exp())
}

/// Per-subject case and item missingness probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MissingnessProbabilities {
    pub case: f64,
    pub item: f64,
}

pub struct MissingnessInjector {
    coefficients: MissingnessCoefficients,
}

impl MissingnessInjector {
    pub fn new(coefficients: MissingnessCoefficients) -> Self {
        Self { coefficients }
    }

    /// `x` and `z` are divided by their sample SD before entering the
    /// linear predictors.
    pub fn probabilities(&self, dataset: &Dataset) -> Vec<MissingnessProbabilities> {
        let data = nalgebra::DMatrix::from_fn(dataset.len(), 2, |i, j| {
            let s = &dataset.subjects[i];
            if j == 0 { s.x } else { s.z }
        });
        let (_, sds) = column_moments(&data);
        let c = self.coefficients;
        dataset
            .subjects
            .iter()
            .map(|s| {
                let xs = s.x / sds[0];
                let zs = s.z / sds[1];
                MissingnessProbabilities {
                    case: sigmoid(c.case_intercept + c.case_slope * xs + c.case_slope * zs),
                    item: sigmoid(c.item_intercept + c.item_slope * xs + c.item_slope * zs),
                }
            })
            .collect()
    }

    /// Mask items in place. Covariates and identifiers are left untouched.
    pub fn inject(&self, dataset: &mut Dataset, rng: &mut DatasetRng) {
        let probs = self.probabilities(dataset);
        for wave in 1..=WAVES {
            let range = wave_range(wave);
            for (subject, p) in dataset.subjects.iter_mut().zip(&probs) {
                let mask = if rng.next_f64() < p.case {
                    WaveMissingness::whole_wave(wave)
                } else {
                    WaveMissingness {
                        case_missing: false,
                        item_missing: range.clone().map(|_| rng.chance(p.item)).collect(),
                    }
                };
                for (offset, &missing) in mask.item_missing.iter().enumerate() {
                    if missing {
                        subject.items[range.start + offset] = None;
                    }
                }
                subject.waves[wave - 1] = mask;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sigmoid_is_centred_and_bounded() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(40.0) <= 1.0);
        assert!(sigmoid(-40.0) >= 0.0);
    }

    #[test]
    fn scenario_codes_round_trip() {
        for code in 1..=3 {
            assert_eq!(Scenario::from_code(code).unwrap().code(), code);
        }
        assert!(Scenario::from_code(0).is_err());
    }

    #[test]
    fn extreme_coefficients_are_more_negative() {
        let b = Scenario::Baseline.coefficients();
        let e = Scenario::Extreme.coefficients();
        assert!(e.case_intercept < b.case_intercept && e.case_slope <= b.case_slope);
        assert!(e.item_intercept < b.item_intercept && e.item_slope <= b.item_slope);
    }
}
