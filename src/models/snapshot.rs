//! Read-only portfolio snapshots for reporting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::error::Result;
use crate::market::PriceOracle;

use super::account::{AccountRef, TraderAccount};

/// One asset position inside an account snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingSnapshot {
    pub asset: String,
    pub quantity: Decimal,
    /// Market value at snapshot prices
    pub value: Decimal,
    /// Percentage of the account's total value
    pub pct: Decimal,
    pub cost_basis: Decimal,
    /// Weighted purchase price of the units held
    pub average_price: Decimal,
    /// Gain if everything were sold at the snapshot price
    pub unrealized_pnl: Decimal,
    /// FIFO lots still open
    pub open_lots: usize,
}

/// Balances of a single account at snapshot prices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountSnapshot {
    pub account: AccountRef,
    pub base_balance: Decimal,
    /// Percentage of total value held in base currency
    pub base_pct: Decimal,
    pub total_value: Decimal,
    pub holdings: Vec<HoldingSnapshot>,
    pub fees_paid: Decimal,
    pub realized_pnl: Decimal,
}

impl AccountSnapshot {
    /// Capture `account`, listing assets in `assets` order first and any
    /// other held asset after them.
    pub fn capture<P: PriceOracle + ?Sized>(
        account_ref: AccountRef,
        account: &TraderAccount,
        assets: &[String],
        prices: &P,
    ) -> Result<Self> {
        let total_value = account.total_value(prices)?;
        let pct_of = |value: Decimal| {
            if total_value.is_zero() {
                Decimal::ZERO
            } else {
                value / total_value * dec!(100)
            }
        };

        let extra = account
            .ledgers()
            .filter(|(asset, ledger)| !ledger.is_empty() && !assets.iter().any(|a| a == asset))
            .map(|(asset, _)| asset.to_string());
        let ordered: Vec<String> = assets.iter().cloned().chain(extra).collect();

        let mut holdings = Vec::with_capacity(ordered.len());
        for asset in ordered {
            let mut holding = HoldingSnapshot {
                asset,
                quantity: Decimal::ZERO,
                value: Decimal::ZERO,
                pct: Decimal::ZERO,
                cost_basis: Decimal::ZERO,
                average_price: Decimal::ZERO,
                unrealized_pnl: Decimal::ZERO,
                open_lots: 0,
            };
            if let Some(ledger) = account.ledger(&holding.asset).filter(|l| !l.is_empty()) {
                let price = prices.require_price(&holding.asset)?;
                holding.quantity = ledger.total_quantity();
                holding.value = holding.quantity * price;
                holding.pct = pct_of(holding.value);
                holding.cost_basis = ledger.cost_basis();
                holding.average_price = ledger.average_price();
                holding.unrealized_pnl = ledger.unrealized_pnl(price);
                holding.open_lots = ledger.lots().count();
            }
            holdings.push(holding);
        }

        Ok(Self {
            account: account_ref,
            base_balance: account.base_balance,
            base_pct: pct_of(account.base_balance),
            total_value,
            holdings,
            fees_paid: account.fees_paid,
            realized_pnl: account.realized_pnl,
        })
    }

    #[cfg(test)]
    pub fn holding(&self, asset: &str) -> Option<&HoldingSnapshot> {
        self.holdings.iter().find(|h| h.asset == asset)
    }
}

/// Snapshot of the leader and every follower.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioSnapshot {
    pub taken_at: DateTime<Utc>,
    pub leader: AccountSnapshot,
    pub followers: Vec<AccountSnapshot>,
    /// Profit share collected by the leader so far
    pub profit_share_earned: Decimal,
}

impl PortfolioSnapshot {
    pub fn accounts(&self) -> impl Iterator<Item = &AccountSnapshot> {
        std::iter::once(&self.leader).chain(self.followers.iter())
    }
}

impl std::fmt::Display for AccountSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let title = match self.account {
            AccountRef::Leader => "Leader".to_string(),
            AccountRef::Follower(i) => format!("Follower {}", i),
        };
        writeln!(f, "{}:", title)?;
        write!(
            f,
            "Base: {:>14.2} (%P: {:>8.4})",
            self.base_balance, self.base_pct
        )?;
        for h in &self.holdings {
            write!(
                f,
                "  {}: {:>14.8} (%P: {:>8.4})",
                h.asset.to_uppercase(),
                h.quantity,
                h.pct
            )?;
        }
        writeln!(f)
    }
}

impl std::fmt::Display for PortfolioSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for account in self.accounts() {
            write!(f, "{}", account)?;
        }
        if self.profit_share_earned > Decimal::ZERO {
            writeln!(f, "Profit share earned: {:.8}", self.profit_share_earned)?;
        }
        Ok(())
    }
}
