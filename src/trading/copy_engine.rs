//! Copy-portfolio engine: mirrors leader trades into follower accounts.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PortfolioError, Result};
use crate::market::PriceOracle;
use crate::models::{AccountRef, AccountSnapshot, PortfolioSnapshot, TraderAccount};

use super::{PortfolioConfig, ProfitSharePolicy};

/// Slack allowed when comparing base fractions; absorbs the rounding of
/// 28-digit decimal division.
const ALLOCATION_TOLERANCE: Decimal = dec!(0.000000000001);

/// A follower trade produced by a leader trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FollowerFill {
    pub follower: usize,
    pub quantity: Decimal,
    /// Total cost for buys, net proceeds for sells
    pub amount: Decimal,
    /// FIFO gain realized by a sell (zero for buys)
    pub realized_gain: Decimal,
    /// Share of the gain paid to the leader
    pub profit_share: Decimal,
}

/// Result of a leader buy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuyOutcome {
    pub asset: String,
    pub quantity: Decimal,
    pub total_cost: Decimal,
    /// Fraction of the leader's total value moved from base into the asset
    pub fraction: Decimal,
    pub fills: Vec<FollowerFill>,
}

/// Result of a leader sell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SellOutcome {
    pub asset: String,
    pub quantity: Decimal,
    /// Fraction of the leader's position in the asset that was closed
    pub fraction: Decimal,
    pub leader_gain: Decimal,
    /// Profit share collected from all followers for this sell
    pub leader_profit: Decimal,
    pub fills: Vec<FollowerFill>,
}

/// One leader and an append-only list of followers.
///
/// Every operation validates all affected accounts before mutating any of
/// them, so a failed call leaves the portfolio unchanged.
#[derive(Debug, Clone)]
pub struct CopyPortfolio {
    config: PortfolioConfig,
    leader: TraderAccount,
    followers: Vec<TraderAccount>,
    profit_share_earned: Decimal,
}

impl CopyPortfolio {
    pub fn new(config: PortfolioConfig) -> Self {
        Self {
            config,
            leader: TraderAccount::new(),
            followers: Vec::new(),
            profit_share_earned: Decimal::ZERO,
        }
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    pub fn leader(&self) -> &TraderAccount {
        &self.leader
    }

    pub fn followers(&self) -> &[TraderAccount] {
        &self.followers
    }

    #[cfg(test)]
    pub fn follower(&self, index: usize) -> Result<&TraderAccount> {
        self.followers
            .get(index)
            .ok_or(PortfolioError::UnknownFollowerIndex {
                index,
                followers: self.followers.len(),
            })
    }

    /// Total profit share the leader has collected.
    pub fn profit_share_earned(&self) -> Decimal {
        self.profit_share_earned
    }

    /// Add a new empty follower and return its index.
    pub fn join_follower(&mut self) -> usize {
        self.followers.push(TraderAccount::new());
        let index = self.followers.len() - 1;
        info!(follower = index, "Follower joined");
        index
    }

    /// Credit base currency to the leader or a follower.
    pub fn deposit_base(&mut self, target: AccountRef, amount: Decimal) -> Result<()> {
        ensure_non_negative(amount)?;
        let followers = self.followers.len();
        let account = match target {
            AccountRef::Leader => &mut self.leader,
            AccountRef::Follower(index) => self
                .followers
                .get_mut(index)
                .ok_or(PortfolioError::UnknownFollowerIndex { index, followers })?,
        };
        account.deposit(amount);
        debug!(account = %target, amount = %amount, "Deposited base");
        Ok(())
    }

    /// Leader buys `quantity` of `asset`; every follower buys the same
    /// fraction of its own total value.
    pub fn leader_buy<P: PriceOracle + ?Sized>(
        &mut self,
        asset: &str,
        quantity: Decimal,
        prices: &P,
    ) -> Result<BuyOutcome> {
        ensure_non_negative(quantity)?;
        if quantity.is_zero() {
            return Ok(BuyOutcome {
                asset: asset.to_string(),
                quantity,
                total_cost: Decimal::ZERO,
                fraction: Decimal::ZERO,
                fills: Vec::new(),
            });
        }

        let price = prices.require_price(asset)?;
        let subtotal = quantity * price;
        let total_cost = subtotal * self.config.fee_multiplier;

        if self.leader.base_balance < total_cost {
            return Err(PortfolioError::InsufficientFunds {
                account: AccountRef::Leader,
                required: total_cost,
                available: self.leader.base_balance,
            });
        }

        let leader_value = self.leader.total_value(prices)?;
        let fraction = if leader_value.is_zero() {
            Decimal::ZERO
        } else {
            subtotal / leader_value
        };

        // Plan every follower before touching any account.
        let fills = self.plan_follower_buys(price, fraction, prices)?;

        self.leader.buy(asset, quantity, total_cost, prices)?;
        for fill in &fills {
            self.followers[fill.follower].buy(asset, fill.quantity, fill.amount, prices)?;
            debug!(
                follower = fill.follower,
                asset = %asset,
                quantity = %fill.quantity,
                cost = %fill.amount,
                "Follower copied buy"
            );
        }

        info!(
            asset = %asset,
            quantity = %quantity,
            price = %price,
            cost = %total_cost,
            fraction = %fraction,
            followers = fills.len(),
            "Leader buy"
        );

        Ok(BuyOutcome {
            asset: asset.to_string(),
            quantity,
            total_cost,
            fraction,
            fills,
        })
    }

    fn plan_follower_buys<P: PriceOracle + ?Sized>(
        &self,
        price: Decimal,
        fraction: Decimal,
        prices: &P,
    ) -> Result<Vec<FollowerFill>> {
        let mut fills = Vec::new();
        if price.is_zero() || fraction.is_zero() {
            return Ok(fills);
        }

        for (index, follower) in self.followers.iter().enumerate() {
            let subtotal = follower.total_value(prices)? * fraction;
            let quantity = (subtotal / price)
                .round_dp_with_strategy(self.config.quantity_scale, RoundingStrategy::ToZero);
            if quantity.is_zero() {
                continue;
            }

            let cost = quantity * price * self.config.fee_multiplier;
            if follower.base_balance < cost {
                return Err(PortfolioError::InsufficientFunds {
                    account: AccountRef::Follower(index),
                    required: cost,
                    available: follower.base_balance,
                });
            }

            fills.push(FollowerFill {
                follower: index,
                quantity,
                amount: cost,
                realized_gain: Decimal::ZERO,
                profit_share: Decimal::ZERO,
            });
        }

        Ok(fills)
    }

    /// Leader sells `quantity` of `asset`; every follower holding the asset
    /// sells the same fraction of its position and pays the leader a share
    /// of any positive realized gain.
    pub fn leader_sell<P: PriceOracle + ?Sized>(
        &mut self,
        asset: &str,
        quantity: Decimal,
        prices: &P,
    ) -> Result<SellOutcome> {
        ensure_non_negative(quantity)?;
        if quantity.is_zero() {
            return Ok(SellOutcome {
                asset: asset.to_string(),
                quantity,
                fraction: Decimal::ZERO,
                leader_gain: Decimal::ZERO,
                leader_profit: Decimal::ZERO,
                fills: Vec::new(),
            });
        }

        let held = self.leader.holding(asset);
        if quantity > held {
            return Err(PortfolioError::InsufficientFunds {
                account: AccountRef::Leader,
                required: quantity,
                available: held,
            });
        }

        let price = prices.require_price(asset)?;
        if self.config.profit_share_policy == ProfitSharePolicy::ProRata {
            // Pro-rata collection values every holding; fail before mutating.
            for follower in &self.followers {
                follower.total_value(prices)?;
            }
        }

        let fraction = quantity / held;
        let fee_multiplier = self.config.fee_multiplier;
        let leader_gain = self.leader.sell(asset, quantity, fee_multiplier, prices)?;

        let mut fills = Vec::new();
        let mut leader_profit = Decimal::ZERO;

        for (index, follower) in self.followers.iter_mut().enumerate() {
            let holding = follower.holding(asset);
            if holding.is_zero() {
                continue;
            }

            let sell_quantity = (holding * fraction).min(holding);
            if sell_quantity.is_zero() {
                continue;
            }

            let base_before = follower.base_balance;
            let gain = follower.sell(asset, sell_quantity, fee_multiplier, prices)?;
            let net_proceeds = follower.base_balance - base_before;

            // Losses stay with the follower.
            let share = if gain > Decimal::ZERO {
                gain * self.config.profit_share_rate
            } else {
                Decimal::ZERO
            };
            if share > Decimal::ZERO {
                collect_share(follower, share, self.config.profit_share_policy, prices)?;
            }
            leader_profit += share;

            debug!(
                follower = index,
                asset = %asset,
                quantity = %sell_quantity,
                gain = %gain,
                share = %share,
                "Follower copied sell"
            );

            fills.push(FollowerFill {
                follower: index,
                quantity: sell_quantity,
                amount: net_proceeds,
                realized_gain: gain,
                profit_share: share,
            });
        }

        self.profit_share_earned += leader_profit;

        info!(
            asset = %asset,
            quantity = %quantity,
            price = %price,
            fraction = %fraction,
            gain = %leader_gain,
            shared_profit = %leader_profit,
            "Leader sell"
        );

        Ok(SellOutcome {
            asset: asset.to_string(),
            quantity,
            fraction,
            leader_gain,
            leader_profit,
            fills,
        })
    }

    /// Base-currency fraction of total value for the leader and each follower.
    pub fn base_fractions<P: PriceOracle + ?Sized>(
        &self,
        prices: &P,
    ) -> Result<(Decimal, Vec<Decimal>)> {
        let leader = self.leader.base_fraction(prices)?;
        let followers = self
            .followers
            .iter()
            .map(|f| f.base_fraction(prices))
            .collect::<Result<Vec<_>>>()?;
        Ok((leader, followers))
    }

    /// Check that no follower holds proportionally less base currency than
    /// the leader.
    pub fn check_allocation<P: PriceOracle + ?Sized>(&self, prices: &P) -> Result<()> {
        let (leader_fraction, followers) = self.base_fractions(prices)?;
        for (follower, follower_fraction) in followers.into_iter().enumerate() {
            if follower_fraction + ALLOCATION_TOLERANCE < leader_fraction {
                return Err(PortfolioError::AllocationDrift {
                    follower,
                    leader_fraction,
                    follower_fraction,
                });
            }
        }
        Ok(())
    }

    /// Read-only view of every account at `prices`, listing `assets` first.
    pub fn snapshot<P: PriceOracle + ?Sized>(
        &self,
        assets: &[String],
        prices: &P,
        taken_at: DateTime<Utc>,
    ) -> Result<PortfolioSnapshot> {
        let leader = AccountSnapshot::capture(AccountRef::Leader, &self.leader, assets, prices)?;
        let followers = self
            .followers
            .iter()
            .enumerate()
            .map(|(i, f)| AccountSnapshot::capture(AccountRef::Follower(i), f, assets, prices))
            .collect::<Result<Vec<_>>>()?;

        Ok(PortfolioSnapshot {
            taken_at,
            leader,
            followers,
            profit_share_earned: self.profit_share_earned,
        })
    }
}

impl Default for CopyPortfolio {
    fn default() -> Self {
        Self::new(PortfolioConfig::default())
    }
}

fn ensure_non_negative(amount: Decimal) -> Result<()> {
    if amount < Decimal::ZERO {
        return Err(PortfolioError::InvalidAmount { amount });
    }
    Ok(())
}

/// Deduct `share` from `follower` according to `policy`.
fn collect_share<P: PriceOracle + ?Sized>(
    follower: &mut TraderAccount,
    share: Decimal,
    policy: ProfitSharePolicy,
    prices: &P,
) -> Result<()> {
    match policy {
        ProfitSharePolicy::FromBase => {
            follower.base_balance -= share;
        }
        ProfitSharePolicy::ProRata => {
            let total = follower.total_value(prices)?;
            if total.is_zero() {
                follower.base_balance -= share;
                return Ok(());
            }

            let held: Vec<(String, Decimal)> = follower
                .ledgers()
                .filter(|(_, ledger)| !ledger.is_empty())
                .map(|(asset, ledger)| (asset.to_string(), ledger.total_quantity()))
                .collect();

            follower.base_balance -= share * follower.base_balance / total;
            for (asset, quantity) in held {
                // value_share / price simplifies to share * quantity / total
                let units = (share * quantity / total).min(quantity);
                if let Some(ledger) = follower.ledger_mut(&asset) {
                    ledger.withdraw(units);
                }
            }
        }
    }
    Ok(())
}
