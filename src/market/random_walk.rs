//! Seeded random-walk price generator for simulations.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::PriceBook;

/// Random-walk parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomWalkConfig {
    /// Largest move per step in basis points, in either direction
    pub max_step_bps: u32,

    /// Decimal places kept after each step
    pub price_scale: u32,
}

impl Default for RandomWalkConfig {
    fn default() -> Self {
        Self {
            max_step_bps: 5, // multiplier in [0.9995, 1.0005)
            price_scale: 4,
        }
    }
}

/// Moves every quoted price by a small random multiplier each step.
pub struct RandomWalk {
    config: RandomWalkConfig,
    rng: StdRng,
}

impl RandomWalk {
    pub fn new(config: RandomWalkConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Next price for a single quote.
    pub fn step_price(&mut self, price: Decimal) -> Decimal {
        let span = self.config.max_step_bps as i64;
        let bps = 10_000 - span + self.rng.gen_range(0..(2 * span).max(1));
        (price * Decimal::from(bps) / Decimal::from(10_000))
            .round_dp_with_strategy(self.config.price_scale, RoundingStrategy::ToZero)
    }

    /// Advance every quote in `book`, returning the new `(asset, price)` pairs.
    pub fn step(&mut self, book: &PriceBook) -> Vec<(String, Decimal)> {
        book.iter()
            .map(|(asset, price)| (asset.to_string(), self.step_price(price)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_step_stays_within_band() {
        let mut walk = RandomWalk::new(RandomWalkConfig::default(), 42);
        let mut price = dec!(10000);

        for _ in 0..1000 {
            let next = walk.step_price(price);
            assert!(next >= price * dec!(0.9995) - dec!(0.0001));
            assert!(next < price * dec!(1.0005));
            assert!(next.scale() <= 4);
            price = next;
        }
    }

    #[test]
    fn test_same_seed_same_path() {
        let book = PriceBook::from_pairs([("btc", dec!(10000)), ("eth", dec!(250))]);
        let mut a = RandomWalk::new(RandomWalkConfig::default(), 9);
        let mut b = RandomWalk::new(RandomWalkConfig::default(), 9);

        assert_eq!(a.step(&book), b.step(&book));
    }
}
