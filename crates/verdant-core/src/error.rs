//! Error types for the Verdant engine.
//!
//! Business-rule failures (`NotFound`, `InsufficientBalance`, `OutOfStock`)
//! are expected outcomes returned to the caller and never retried here.
//! `Conflict` is transient contention, retried a bounded number of times by
//! the engine before surfacing. `InvariantViolation` is a bug or data
//! corruption signal: it always aborts the operation and is never masked.
use thiserror::Error;

use crate::types::{CompanyId, LedgerEntryId, RedemptionId, RewardId, RuleId, UserId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleError {
    #[error("rule not found: {0}")] NotFound(RuleId),
    #[error("rule already retired: {0}")] AlreadyRetired(RuleId),
    #[error("zero coefficient on rule {name:?}")] ZeroCoefficient { name: String },
    #[error("effective range is empty: from {from} until {until}")] EmptyEffectiveRange { from: String, until: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u64, need: u64 },
    #[error("idempotency key reused with a different payload: {key}")] DuplicateRequest { key: String },
    #[error("entry not found: {0}")] EntryNotFound(LedgerEntryId),
    #[error("zero-amount entry for user {0}")] ZeroAmount(UserId),
    #[error("storage conflict")] Conflict,
    #[error("ledger invariant violated: {0}")] InvariantViolation(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("reward not found: {0}")] NotFound(RewardId),
    #[error("reward inactive: {0}")] Inactive(RewardId),
    #[error("out of stock: available {available}, requested {requested}")] OutOfStock { available: u32, requested: u32 },
    #[error("zero quantity for reward {0}")] ZeroQuantity(RewardId),
    #[error("storage conflict")] Conflict,
    #[error("stock invariant violated: {0}")] InvariantViolation(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RedemptionError {
    #[error("reward not found or inactive: {0}")] NotFound(RewardId),
    #[error("unknown user: {0}")] UnknownUser(UserId),
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u64, need: u64 },
    #[error("out of stock: reward {0}")] OutOfStock(RewardId),
    #[error("concurrent request in flight for key {key}")] Conflict { key: String },
    #[error("idempotency key reused with a different payload: {key}")] DuplicateRequest { key: String },
    #[error("redemption not found: {0}")] RedemptionNotFound(RedemptionId),
    #[error("redemption invariant violated: {0}")] InvariantViolation(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("unknown user: {0}")] UnknownUser(UserId),
    #[error("user already registered: {0}")] AlreadyRegistered(UserId),
    #[error("user {user} belongs to company {actual}, not {claimed}")] CompanyMismatch { user: UserId, actual: CompanyId, claimed: CompanyId },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RankingError {
    #[error("no snapshot for company {company}, period {period}")] NoSnapshot { company: CompanyId, period: String },
    #[error("invalid period: {0}")] InvalidPeriod(String),
}

#[derive(Error, Debug)]
pub enum VerdantError {
    #[error(transparent)] Rule(#[from] RuleError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Catalog(#[from] CatalogError),
    #[error(transparent)] Redemption(#[from] RedemptionError),
    #[error(transparent)] Directory(#[from] DirectoryError),
    #[error(transparent)] Ranking(#[from] RankingError),
    #[error("storage: {0}")] Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_display() {
        let errors: Vec<LedgerError> = vec![
            LedgerError::InsufficientBalance { have: 100, need: 400 },
            LedgerError::DuplicateRequest { key: "abc".into() },
            LedgerError::EntryNotFound(LedgerEntryId(7)),
            LedgerError::ZeroAmount(UserId(1)),
            LedgerError::Conflict,
            LedgerError::InvariantViolation("counter drift".into()),
        ];
        for e in &errors {
            assert!(!format!("{e}").is_empty());
        }
    }

    #[test]
    fn insufficient_balance_carries_amounts() {
        let e = LedgerError::InsufficientBalance { have: 100, need: 400 };
        assert_eq!(format!("{e}"), "insufficient balance: have 100, need 400");
    }

    #[test]
    fn out_of_stock_carries_counts() {
        let e = CatalogError::OutOfStock { available: 0, requested: 1 };
        assert_eq!(format!("{e}"), "out of stock: available 0, requested 1");
    }

    #[test]
    fn top_level_error_is_transparent() {
        let e: VerdantError = LedgerError::Conflict.into();
        assert_eq!(format!("{e}"), "storage conflict");
        let e: VerdantError = RedemptionError::OutOfStock(RewardId(3)).into();
        assert_eq!(format!("{e}"), "out of stock: reward 3");
    }

    #[test]
    fn error_eq() {
        assert_eq!(LedgerError::Conflict, LedgerError::Conflict);
        assert_ne!(
            LedgerError::InsufficientBalance { have: 0, need: 1 },
            LedgerError::InsufficientBalance { have: 0, need: 2 },
        );
    }
}
