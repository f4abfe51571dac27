//! Shared primitive types and fixed study dimensions.

/// Index of one simulated dataset within a run (1-based, like the study's `simno`).
pub type SimNo = u64;

/// Stable identifier of a simulated subject within one dataset.
pub type SubjectId = u32;

/// The canonical run identifier.
pub type RunId = String;

/// Number of measurement occasions.
pub const WAVES: usize = 4;

/// Items administered at each wave. Wave 1 collects two fewer items.
pub const ITEMS_PER_WAVE: [usize; WAVES] = [21, 23, 23, 23];

/// Total questionnaire items across all waves.
pub const N_ITEMS: usize = 90;

/// Latent variables drawn per subject: every item plus the two covariates.
pub const N_LATENT: usize = N_ITEMS + 2;

/// Default cohort size per simulated dataset.
pub const DEFAULT_SAMPLE_SIZE: usize = 1000;

/// Ordinal response categories run 1..=MAX_CATEGORY.
pub const MAX_CATEGORY: u8 = 5;
