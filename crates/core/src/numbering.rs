//! Human-facing record numbers.
//!
//! MRNs, order numbers and sample barcodes share one shape, `PREFIX-YYYYMMDD-NNNN`, with a
//! sequence that restarts every day. The sequence itself is allocated by the store inside
//! the inserting transaction.

use chrono::NaiveDate;

/// Formats a daily record number, e.g. `ORD-20240131-0007`.
///
/// Sequences past 9999 keep all their digits rather than wrapping.
pub fn daily_number(prefix: &str, day: NaiveDate, sequence: u32) -> String {
    format!("{prefix}-{}-{sequence:04}", day.format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_sequence_to_four_digits() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        assert_eq!(daily_number("ORD", day, 7), "ORD-20240131-0007");
        assert_eq!(daily_number("SAM", day, 12345), "SAM-20240131-12345");
    }
}
