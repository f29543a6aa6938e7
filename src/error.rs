//! Error types for the portfolio-accounting core.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::AccountRef;

/// Failures raised by ledgers, accounts and the copy-portfolio engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortfolioError {
    /// A balance or holding check failed before any mutation.
    #[error("insufficient funds for {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: AccountRef,
        required: Decimal,
        available: Decimal,
    },

    /// A held or traded asset has no entry in the price oracle.
    #[error("no price for asset {asset}")]
    MissingPrice { asset: String },

    /// A follower index that was never handed out by `join_follower`.
    #[error("unknown follower index {index} (portfolio has {followers} followers)")]
    UnknownFollowerIndex { index: usize, followers: usize },

    /// Quantities and deposits must not be negative.
    #[error("invalid amount {amount}: must not be negative")]
    InvalidAmount { amount: Decimal },

    /// A follower holds proportionally less base currency than the leader.
    #[error(
        "allocation drift on follower {follower}: base fraction {follower_fraction} below leader's {leader_fraction}"
    )]
    AllocationDrift {
        follower: usize,
        leader_fraction: Decimal,
        follower_fraction: Decimal,
    },
}

impl PortfolioError {
    /// Whether the error indicates broken data or caller logic rather than
    /// a trade that simply cannot be afforded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingPrice { .. }
                | Self::UnknownFollowerIndex { .. }
                | Self::AllocationDrift { .. }
        )
    }
}

/// Result type for core portfolio operations.
pub type Result<T> = std::result::Result<T, PortfolioError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fatal_classification() {
        let funds = PortfolioError::InsufficientFunds {
            account: AccountRef::Leader,
            required: dec!(10),
            available: dec!(5),
        };
        assert!(!funds.is_fatal());

        let price = PortfolioError::MissingPrice { asset: "btc".to_string() };
        assert!(price.is_fatal());

        let idx = PortfolioError::UnknownFollowerIndex { index: 3, followers: 1 };
        assert!(idx.is_fatal());
        assert!(idx.to_string().contains("index 3"));
    }

    #[test]
    fn test_display_names_account() {
        let err = PortfolioError::InsufficientFunds {
            account: AccountRef::Follower(2),
            required: dec!(500.5),
            available: dec!(100),
        };
        assert_eq!(
            err.to_string(),
            "insufficient funds for follower 2: required 500.5, available 100"
        );
    }
}
