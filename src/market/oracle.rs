//! Price oracle: the read-only source of unit prices used by the core.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{PortfolioError, Result};

/// Source of current unit prices, quoted in base currency.
pub trait PriceOracle {
    /// Current price of `asset`, or `None` if the asset is not quoted.
    fn price(&self, asset: &str) -> Option<Decimal>;

    /// Current price of `asset`, failing with `MissingPrice` when absent.
    fn require_price(&self, asset: &str) -> Result<Decimal> {
        self.price(asset).ok_or_else(|| PortfolioError::MissingPrice {
            asset: asset.to_string(),
        })
    }
}

impl PriceOracle for HashMap<String, Decimal> {
    fn price(&self, asset: &str) -> Option<Decimal> {
        self.get(asset).copied()
    }
}

impl PriceOracle for BTreeMap<String, Decimal> {
    fn price(&self, asset: &str) -> Option<Decimal> {
        self.get(asset).copied()
    }
}

/// Mutable price table owned by the driver.
///
/// Assets keep the order in which they were first quoted; reports use that
/// order for their columns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceBook {
    prices: BTreeMap<String, Decimal>,
    order: Vec<String>,
}

impl PriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a book from `(asset, price)` pairs, keeping their order.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, Decimal)>,
        S: Into<String>,
    {
        let mut book = Self::new();
        for (asset, price) in pairs {
            book.set(asset, price);
        }
        book
    }

    /// Quote `asset` at `price`, replacing any previous quote.
    pub fn set(&mut self, asset: impl Into<String>, price: Decimal) {
        let asset = asset.into();
        if !self.prices.contains_key(&asset) {
            self.order.push(asset.clone());
        }
        self.prices.insert(asset, price);
    }

    /// Quoted assets in first-quoted order.
    pub fn assets(&self) -> &[String] {
        &self.order
    }

    /// Iterate `(asset, price)` in first-quoted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.order
            .iter()
            .filter_map(|a| self.prices.get(a).map(|p| (a.as_str(), *p)))
    }
}

impl PriceOracle for PriceBook {
    fn price(&self, asset: &str) -> Option<Decimal> {
        self.prices.get(asset).copied()
    }
}

impl std::fmt::Display for PriceBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (asset, price) in self.iter() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}: {:.2}", asset.to_uppercase(), price)?;
            first = false;
        }
        Ok(())
    }
}
