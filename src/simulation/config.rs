//! Simulation configuration.

use std::path::Path;

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::market::{PriceBook, RandomWalkConfig};
use crate::trading::PortfolioConfig;

/// Starting quote for an asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetQuote {
    pub asset: String,
    pub price: Decimal,
}

/// A follower that joins part-way through a random run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowerJoin {
    /// Point in the run, as a percentage of the iterations
    pub at_percent: u32,

    /// Deposit range in base currency (min inclusive, max exclusive)
    pub min_deposit: u64,
    pub max_deposit: u64,
}

/// Everything needed to set up and drive a simulated copy portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fees and profit sharing
    pub portfolio: PortfolioConfig,

    /// Number of random iterations
    pub iterations: usize,

    /// RNG seed; a fresh one is drawn when absent
    pub seed: Option<u64>,

    /// Leader's opening base deposit
    pub leader_deposit: Decimal,

    /// Opening base deposits of the followers present from the start
    pub follower_deposits: Vec<Decimal>,

    /// Opening quotes, in report column order
    pub initial_prices: Vec<AssetQuote>,

    /// Assets the random leader trades
    pub traded_assets: Vec<String>,

    /// Followers joining during the run
    pub joins: Vec<FollowerJoin>,

    /// Price path parameters
    pub random_walk: RandomWalkConfig,

    /// Abort on the first allocation drift instead of logging it
    pub strict: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            portfolio: PortfolioConfig::default(),
            iterations: 500,
            seed: None,
            leader_deposit: dec!(10000),
            follower_deposits: vec![dec!(1000)],
            initial_prices: vec![
                AssetQuote { asset: "btc".to_string(), price: dec!(10000) },
                AssetQuote { asset: "eth".to_string(), price: dec!(250) },
            ],
            traded_assets: vec!["btc".to_string()],
            joins: vec![
                FollowerJoin { at_percent: 25, min_deposit: 10, max_deposit: 10010 },
                FollowerJoin { at_percent: 50, min_deposit: 10, max_deposit: 1010 },
                FollowerJoin { at_percent: 75, min_deposit: 10, max_deposit: 110 },
            ],
            random_walk: RandomWalkConfig::default(),
            strict: false,
        }
    }
}

impl SimulationConfig {
    /// Load a configuration from a JSON file. Missing fields use defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.portfolio.validate()?;

        // A full 100% step would allow zero or negative prices
        if self.random_walk.max_step_bps >= 10_000 {
            bail!(
                "random_walk.max_step_bps must be below 10000, got {}",
                self.random_walk.max_step_bps
            );
        }

        for quote in &self.initial_prices {
            if quote.price <= Decimal::ZERO {
                bail!("initial price of {} must be positive", quote.asset);
            }
        }
        for asset in &self.traded_assets {
            if !self.initial_prices.iter().any(|q| &q.asset == asset) {
                bail!("traded asset {} has no initial price", asset);
            }
        }
        for join in &self.joins {
            if join.at_percent > 100 {
                bail!("follower join at {}% is outside the run", join.at_percent);
            }
            if join.min_deposit >= join.max_deposit {
                bail!(
                    "follower join deposit range {}..{} is empty",
                    join.min_deposit,
                    join.max_deposit
                );
            }
        }
        if self.leader_deposit < Decimal::ZERO
            || self.follower_deposits.iter().any(|d| *d < Decimal::ZERO)
        {
            bail!("deposits must not be negative");
        }
        Ok(())
    }

    /// Opening price book.
    pub fn price_book(&self) -> PriceBook {
        PriceBook::from_pairs(
            self.initial_prices
                .iter()
                .map(|q| (q.asset.clone(), q.price)),
        )
    }

    /// Iteration at which `join` takes effect.
    pub fn join_iteration(&self, join: &FollowerJoin) -> usize {
        self.iterations * join.at_percent as usize / 100
    }
}
