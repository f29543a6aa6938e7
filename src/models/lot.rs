//! Purchase lot used for FIFO cost-basis accounting.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single purchase of an asset at a fixed unit price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lot {
    /// Price per unit in base currency at the time of purchase
    pub unit_price: Decimal,

    /// Units still held from this purchase
    pub quantity: Decimal,
}

impl Lot {
    pub fn new(unit_price: Decimal, quantity: Decimal) -> Self {
        Self { unit_price, quantity }
    }

    /// Cost basis of the remaining units.
    pub fn cost(&self) -> Decimal {
        self.quantity * self.unit_price
    }

    /// Gain from selling `quantity` units of this lot at `price`.
    pub fn gain_at(&self, quantity: Decimal, price: Decimal) -> Decimal {
        quantity * (price - self.unit_price)
    }
}
