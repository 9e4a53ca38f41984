//! Engine-wide constants.
//!
//! All point arithmetic is integer fixed-point: CO₂ quantities are carried
//! in grams, rule coefficients in milli-points, and ledger amounts in whole
//! points. Division rounds half-up (see [`rules::round_half_up`](crate::rules::round_half_up)).

/// Fixed-point scale for rule coefficients: 1 point = 1,000 milli-points.
///
/// A `per_kg` rule paying 10 points per kilogram stores a coefficient of
/// `10_000` milli-points.
pub const MILLIPOINTS_PER_POINT: u64 = 1_000;

/// CO₂ quantities are measured in grams; 1 kg = 1,000 g.
pub const GRAMS_PER_KG: u64 = 1_000;

/// Combined divisor for `per_kg` awards:
/// `grams × millipoints / PER_KG_DIVISOR = points`.
pub const PER_KG_DIVISOR: u64 = MILLIPOINTS_PER_POINT * GRAMS_PER_KG;

/// How many times a `Conflict` from the underlying store is retried
/// internally before being surfaced to the caller.
pub const CONFLICT_MAX_RETRIES: u32 = 3;

/// Base backoff between conflict retries, in milliseconds.
///
/// Attempt `n` sleeps `CONFLICT_BACKOFF_BASE_MS << n` plus jitter.
pub const CONFLICT_BACKOFF_BASE_MS: u64 = 10;

/// Upper bound (exclusive) of the random jitter added to each backoff, in
/// milliseconds.
pub const CONFLICT_BACKOFF_JITTER_MS: u64 = 10;

/// Default page size for ledger history and catalog listings.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Hard cap on a single history/listing page.
pub const MAX_PAGE_SIZE: usize = 500;

/// Default number of rows in a ranking snapshot.
pub const DEFAULT_RANKING_LIMIT: usize = 100;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_kg_divisor_combines_scales() {
        assert_eq!(PER_KG_DIVISOR, 1_000_000);
        assert_eq!(PER_KG_DIVISOR, MILLIPOINTS_PER_POINT * GRAMS_PER_KG);
    }

    #[test]
    fn page_limits_are_sane() {
        assert!(DEFAULT_PAGE_SIZE <= MAX_PAGE_SIZE);
        assert!(DEFAULT_RANKING_LIMIT <= MAX_PAGE_SIZE);
    }

    #[test]
    fn retry_policy_is_bounded() {
        assert!(CONFLICT_MAX_RETRIES >= 1);
        assert!(CONFLICT_MAX_RETRIES <= 10);
    }
}
