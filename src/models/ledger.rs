//! Per-asset position made of FIFO cost-basis lots.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::lot::Lot;

/// Holdings of one asset for one trader.
///
/// `total_quantity` always equals the sum of the lot quantities. Lots are
/// kept oldest first, so the front of the queue is the next lot to be sold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLedger {
    total_quantity: Decimal,
    lots: VecDeque<Lot>,
}

impl AssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units currently held.
    pub fn total_quantity(&self) -> Decimal {
        self.total_quantity
    }

    /// Open lots, oldest first.
    pub fn lots(&self) -> impl Iterator<Item = &Lot> {
        self.lots.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.total_quantity.is_zero()
    }

    /// Record a purchase of `quantity` units at `price`.
    pub fn buy(&mut self, price: Decimal, quantity: Decimal) {
        if quantity.is_zero() {
            return;
        }
        self.lots.push_back(Lot::new(price, quantity));
        self.total_quantity += quantity;
    }

    /// Sell `quantity` units at `current_price`, consuming lots oldest first.
    ///
    /// Returns the realized gain, which is negative when the consumed lots
    /// were bought above `current_price`. The caller must ensure
    /// `quantity <= total_quantity()`.
    pub fn sell(&mut self, quantity: Decimal, current_price: Decimal) -> Decimal {
        debug_assert!(quantity <= self.total_quantity, "sell exceeds holdings");
        self.consume(quantity, Some(current_price))
    }

    /// Remove `quantity` units oldest first without realizing any gain.
    ///
    /// Used when units leave the account as a transfer rather than a sale.
    pub fn withdraw(&mut self, quantity: Decimal) {
        debug_assert!(quantity <= self.total_quantity, "withdraw exceeds holdings");
        self.consume(quantity, None);
    }

    fn consume(&mut self, quantity: Decimal, price: Option<Decimal>) -> Decimal {
        let mut remaining = quantity;
        let mut gain = Decimal::ZERO;

        while remaining > Decimal::ZERO {
            let Some(lot) = self.lots.front_mut() else {
                break;
            };

            if remaining <= lot.quantity {
                if let Some(price) = price {
                    gain += lot.gain_at(remaining, price);
                }
                lot.quantity -= remaining;
                if lot.quantity.is_zero() {
                    self.lots.pop_front();
                }
                remaining = Decimal::ZERO;
            } else {
                if let Some(price) = price {
                    gain += lot.gain_at(lot.quantity, price);
                }
                remaining -= lot.quantity;
                self.lots.pop_front();
            }
        }

        self.total_quantity -= quantity - remaining;
        gain
    }

    /// Cost basis of the units still held.
    pub fn cost_basis(&self) -> Decimal {
        self.lots.iter().map(Lot::cost).sum()
    }

    /// Weighted average purchase price of the units still held.
    pub fn average_price(&self) -> Decimal {
        if self.total_quantity.is_zero() {
            return Decimal::ZERO;
        }
        self.cost_basis() / self.total_quantity
    }

    /// Gain that would be realized by selling everything at `price`.
    pub fn unrealized_pnl(&self, price: Decimal) -> Decimal {
        self.total_quantity * price - self.cost_basis()
    }
}
