//! Questionnaire item layout across waves.
//!
//! Each wave administers one scale. Wave 1 carries 21 items; from wave 2
//! onward two further items (codes 22 and 23) are collected. The 90 item
//! columns are laid out wave by wave, so the wave-w block starts at
//! `wave_offset(w)`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{ITEMS_PER_WAVE, N_ITEMS, WAVES};

/// One questionnaire item, identified by its wave (1-based) and its
/// position within that wave's scale (1-based, equal to the instrument code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    pub wave: u8,
    pub position: u8,
}

impl ItemId {
    /// Instrument item code; stable across waves for the same question.
    pub fn code(&self) -> u8 {
        self.position
    }

    pub fn label(&self) -> String {
        format!("w{}_q{:02}", self.wave, self.position)
    }
}

/// Column offset of the first item of `wave` (1-based) in the item vector.
pub fn wave_offset(wave: usize) -> usize {
    ITEMS_PER_WAVE[..wave - 1].iter().sum()
}

/// Number of items administered at `wave` (1-based).
pub fn items_in_wave(wave: usize) -> usize {
    ITEMS_PER_WAVE[wave - 1]
}

/// Column range of the items of `wave` in the item vector.
pub fn wave_range(wave: usize) -> std::ops::Range<usize> {
    let start = wave_offset(wave);
    start..start + items_in_wave(wave)
}

/// Map an item column (0..90) to its identity.
pub fn item_at(column: usize) -> ItemId {
    assert!(column < N_ITEMS, "item column {column} out of range");
    let mut wave = 1;
    while column >= wave_offset(wave) + items_in_wave(wave) {
        wave += 1;
    }
    ItemId {
        wave: wave as u8,
        position: (column - wave_offset(wave) + 1) as u8,
    }
}

/// All 90 items in column order.
pub fn all_items() -> Vec<ItemId> {
    (0..N_ITEMS).map(item_at).collect()
}

/// Waves at which the instrument code `code` is administered.
pub fn occasions(code: u8) -> Vec<u8> {
    (1..=WAVES)
        .filter(|&w| (code as usize) <= items_in_wave(w))
        .map(|w| w as u8)
        .collect()
}

/// Labels used by the passive item-level strategy.
///
/// Items measured at every wave keep their code-based label. Items whose set
/// of measurement occasions differs from the full set get a distinct label
/// namespace, so a later-introduced question never shares an identity with
/// an unrelated baseline item.
pub fn relabel_items(items: &[ItemId]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            if occasions(item.code()).len() == WAVES {
                item.label()
            } else {
                format!("w{}_n{:02}", item.wave, item.position)
            }
        })
        .collect()
}

/// True when no two labels collide.
pub fn labels_unique(labels: &[String]) -> bool {
    let mut seen = HashSet::with_capacity(labels.len());
    labels.iter().all(|l| seen.insert(l.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wave_blocks_partition_the_item_vector() {
        assert_eq!(wave_range(1), 0..21);
        assert_eq!(wave_range(2), 21..44);
        assert_eq!(wave_range(3), 44..67);
        assert_eq!(wave_range(4), 67..90);
    }

    #[test]
    fn item_lookup_matches_offsets() {
        assert_eq!(item_at(0), ItemId { wave: 1, position: 1 });
        assert_eq!(item_at(20), ItemId { wave: 1, position: 21 });
        assert_eq!(item_at(21), ItemId { wave: 2, position: 1 });
        assert_eq!(item_at(89), ItemId { wave: 4, position: 23 });
    }

    #[test]
    fn late_items_are_not_measured_at_baseline() {
        assert_eq!(occasions(1), vec![1, 2, 3, 4]);
        assert_eq!(occasions(22), vec![2, 3, 4]);
    }
}
