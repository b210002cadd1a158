//! Constants used throughout the LIMS core crate.

/// Prefix of patient medical record numbers (`PAT-YYYYMMDD-NNNN`).
pub const MRN_PREFIX: &str = "PAT";

/// Prefix of order numbers (`ORD-YYYYMMDD-NNNN`).
pub const ORDER_NO_PREFIX: &str = "ORD";

/// Prefix of sample barcodes (`SAM-YYYYMMDD-NNNN`).
pub const BARCODE_PREFIX: &str = "SAM";

/// Lab name printed on reports when none is configured.
pub const DEFAULT_LAB_NAME: &str = "LIMS";

/// Maximum stored length of a result value.
pub const MAX_RESULT_VALUE_LEN: usize = 255;

/// Maximum stored length of a result unit.
pub const MAX_UNIT_LEN: usize = 50;

/// Prefix written into result notes when a result is sent back to draft.
pub const RESULT_REJECTION_NOTE_PREFIX: &str = "Rejected: ";

/// Attempts made for an operation whose write lost a compare-and-swap.
pub const MAX_CONFLICT_RETRIES: usize = 3;
