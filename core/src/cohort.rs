//! Simulated cohort: subjects, their ordinal items and missingness state.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    discretize::Discretizer,
    layout::{items_in_wave, wave_range},
    types::{SimNo, SubjectId, N_ITEMS, N_LATENT, WAVES},
};

/// Missingness state of one subject at one wave.
///
/// Invariant: when `case_missing` is set, every item flag is set too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveMissingness {
    pub case_missing: bool,
    pub item_missing: Vec<bool>,
}

impl WaveMissingness {
    pub fn observed(wave: usize) -> Self {
        Self {
            case_missing: false,
            item_missing: vec![false; items_in_wave(wave)],
        }
    }

    pub fn whole_wave(wave: usize) -> Self {
        Self {
            case_missing: true,
            item_missing: vec![true; items_in_wave(wave)],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    /// 90 ordinal items in wave order; `None` once masked.
    pub items: Vec<Option<u8>>,
    pub x: f64,
    pub z: f64,
    pub waves: Vec<WaveMissingness>,
}

impl Subject {
    pub fn wave_items(&self, wave: usize) -> &[Option<u8>] {
        &self.items[wave_range(wave)]
    }

    pub fn missing_in_wave(&self, wave: usize) -> usize {
        self.wave_items(wave).iter().filter(|v| v.is_none()).count()
    }
}

/// One simulated dataset, keyed by its replicate index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub simno: SimNo,
    pub subjects: Vec<Subject>,
}

impl Dataset {
    /// Discretize the first 90 latent columns; the last two become `x`, `z`.
    pub fn from_latent(simno: SimNo, latent: &DMatrix<f64>, discretizer: &Discretizer) -> Self {
        assert_eq!(latent.ncols(), N_LATENT, "latent draw must have {N_LATENT} columns");
        let subjects = latent
            .row_iter()
            .enumerate()
            .map(|(i, row)| Subject {
                id:    (i + 1) as SubjectId,
                items: (0..N_ITEMS).map(|j| Some(discretizer.category(row[j]))).collect(),
                x:     row[N_ITEMS],
                z:     row[N_ITEMS + 1],
                waves: (1..=WAVES).map(WaveMissingness::observed).collect(),
            })
            .collect();
        Self { simno, subjects }
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    pub fn x(&self) -> Vec<f64> {
        self.subjects.iter().map(|s| s.x).collect()
    }

    pub fn z(&self) -> Vec<f64> {
        self.subjects.iter().map(|s| s.z).collect()
    }

    /// Item column as reals, `None` where missing.
    pub fn item_column(&self, column: usize) -> Vec<Option<f64>> {
        self.subjects
            .iter()
            .map(|s| s.items[column].map(f64::from))
            .collect()
    }

    /// Fraction of (subject, wave) cells that are case-missing.
    pub fn case_missing_rate(&self) -> f64 {
        let cells = self.len() * WAVES;
        if cells == 0 {
            return 0.0;
        }
        let missing: usize = self
            .subjects
            .iter()
            .map(|s| s.waves.iter().filter(|w| w.case_missing).count())
            .sum();
        missing as f64 / cells as f64
    }

    /// Fraction of items missing among waves that were not case-missing.
    pub fn item_missing_rate(&self) -> f64 {
        let (mut missing, mut total) = (0usize, 0usize);
        for s in &self.subjects {
            for w in s.waves.iter().filter(|w| !w.case_missing) {
                total += w.item_missing.len();
                missing += w.item_missing.iter().filter(|&&m| m).count();
            }
        }
        if total == 0 { 0.0 } else { missing as f64 / total as f64 }
    }

    /// Every item is in 1..=5 or missing, and masks agree with item values.
    pub fn is_consistent(&self) -> bool {
        self.subjects.iter().all(|s| {
            s.items.iter().all(|v| v.map_or(true, |c| (1..=5).contains(&c)))
                && s.waves.iter().enumerate().all(|(w, mask)| {
                    let items = s.wave_items(w + 1);
                    (!mask.case_missing || mask.item_missing.iter().all(|&m| m))
                        && mask
                            .item_missing
                            .iter()
                            .zip(items)
                            .all(|(&m, v)| m == v.is_none())
                })
        })
    }
}
