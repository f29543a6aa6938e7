//! Portfolio configuration.

use anyhow::{bail, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// How a follower pays the leader's share of a realized gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfitSharePolicy {
    /// The whole share is deducted from the follower's base balance
    FromBase,
    /// The share is taken from base and every held asset in proportion to
    /// their weight in the follower's total value
    ProRata,
}

impl ProfitSharePolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "from_base" | "base" => Some(Self::FromBase),
            "pro_rata" | "prorata" => Some(Self::ProRata),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProfitSharePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FromBase => write!(f, "from_base"),
            Self::ProRata => write!(f, "pro_rata"),
        }
    }
}

/// Fee and profit-sharing parameters for a copy portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioConfig {
    /// Cost inflation on buys and fee drag on sells, within [1, 2)
    pub fee_multiplier: Decimal,

    /// Fraction of a follower's positive realized gain paid to the leader
    pub profit_share_rate: Decimal,

    /// Decimal places of a tradable follower quantity
    pub quantity_scale: u32,

    /// Where the profit share is taken from
    pub profit_share_policy: ProfitSharePolicy,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            fee_multiplier: dec!(1.001),   // 0.1% fee
            profit_share_rate: dec!(0.2), // 80F/20L split
            quantity_scale: 8,
            profit_share_policy: ProfitSharePolicy::FromBase,
        }
    }
}

impl PortfolioConfig {
    /// Reject parameters that would break the accounting.
    pub fn validate(&self) -> Result<()> {
        if self.fee_multiplier < Decimal::ONE || self.fee_multiplier >= dec!(2) {
            bail!(
                "fee_multiplier must be within [1, 2), got {}",
                self.fee_multiplier
            );
        }
        if self.profit_share_rate < Decimal::ZERO || self.profit_share_rate > Decimal::ONE {
            bail!(
                "profit_share_rate must be within [0, 1], got {}",
                self.profit_share_rate
            );
        }
        if self.quantity_scale > 28 {
            bail!("quantity_scale must be <= 28, got {}", self.quantity_scale);
        }
        Ok(())
    }

    /// Fee rate implied by the multiplier (e.g. 0.001 for 1.001).
    pub fn fee_rate(&self) -> Decimal {
        self.fee_multiplier - Decimal::ONE
    }
}
