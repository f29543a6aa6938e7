//! Trader account: base-currency balance plus per-asset ledgers.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::market::PriceOracle;

use super::ledger::AssetLedger;

/// Identifies an account inside a copy portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountRef {
    Leader,
    Follower(usize),
}

impl std::fmt::Display for AccountRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountRef::Leader => write!(f, "leader"),
            AccountRef::Follower(i) => write!(f, "follower {}", i),
        }
    }
}

/// A trader's holdings.
///
/// The base balance is not guarded here: buys deduct whatever cost they are
/// given, so funds must be checked before calling [`TraderAccount::buy`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraderAccount {
    /// Base-currency balance
    pub base_balance: Decimal,

    /// Asset ledgers keyed by asset id
    ledgers: BTreeMap<String, AssetLedger>,

    /// Trading fees paid on buys and sells
    pub fees_paid: Decimal,

    /// Sum of FIFO gains realized by sells
    pub realized_pnl: Decimal,
}

impl TraderAccount {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an account holding only base currency.
    #[cfg(test)]
    pub fn with_balance(base_balance: Decimal) -> Self {
        Self {
            base_balance,
            ..Self::default()
        }
    }

    /// Credit base currency.
    pub fn deposit(&mut self, amount: Decimal) {
        self.base_balance += amount;
    }

    /// Ledger for `asset`, if the asset was ever bought.
    pub fn ledger(&self, asset: &str) -> Option<&AssetLedger> {
        self.ledgers.get(asset)
    }

    pub(crate) fn ledger_mut(&mut self, asset: &str) -> Option<&mut AssetLedger> {
        self.ledgers.get_mut(asset)
    }

    /// All ledgers, ordered by asset id.
    pub fn ledgers(&self) -> impl Iterator<Item = (&str, &AssetLedger)> {
        self.ledgers.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Units of `asset` held (zero if never bought).
    pub fn holding(&self, asset: &str) -> Decimal {
        self.ledgers
            .get(asset)
            .map(AssetLedger::total_quantity)
            .unwrap_or(Decimal::ZERO)
    }

    /// Total portfolio value in base currency.
    ///
    /// Fails with `MissingPrice` if any non-empty ledger has no quote.
    pub fn total_value<P: PriceOracle + ?Sized>(&self, prices: &P) -> Result<Decimal> {
        let mut total = self.base_balance;
        for (asset, ledger) in &self.ledgers {
            if ledger.is_empty() {
                continue;
            }
            total += ledger.total_quantity() * prices.require_price(asset)?;
        }
        Ok(total)
    }

    /// Fraction of total value held in base currency.
    ///
    /// An account with no value at all counts as fully in base.
    pub fn base_fraction<P: PriceOracle + ?Sized>(&self, prices: &P) -> Result<Decimal> {
        let total = self.total_value(prices)?;
        if total.is_zero() {
            return Ok(Decimal::ONE);
        }
        Ok(self.base_balance / total)
    }

    /// Buy `quantity` units of `asset`, paying `total_cost` from base.
    ///
    /// The lot is recorded at the oracle's current price; whatever
    /// `total_cost` exceeds `quantity * price` by is booked as fees.
    pub fn buy<P: PriceOracle + ?Sized>(
        &mut self,
        asset: &str,
        quantity: Decimal,
        total_cost: Decimal,
        prices: &P,
    ) -> Result<()> {
        if quantity.is_zero() {
            return Ok(());
        }

        let price = prices.require_price(asset)?;
        self.base_balance -= total_cost;
        self.fees_paid += total_cost - quantity * price;
        self.ledgers
            .entry(asset.to_string())
            .or_insert_with(AssetLedger::new)
            .buy(price, quantity);
        Ok(())
    }

    /// Sell `quantity` units of `asset` at the oracle's current price.
    ///
    /// Net proceeds, after withholding `proceeds * (fee_multiplier - 1)`,
    /// are credited to base. Returns the FIFO realized gain. The caller must
    /// ensure `quantity <= holding(asset)`.
    pub fn sell<P: PriceOracle + ?Sized>(
        &mut self,
        asset: &str,
        quantity: Decimal,
        fee_multiplier: Decimal,
        prices: &P,
    ) -> Result<Decimal> {
        if quantity.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let price = prices.require_price(asset)?;
        let gain = match self.ledgers.get_mut(asset) {
            Some(ledger) => ledger.sell(quantity, price),
            None => return Ok(Decimal::ZERO),
        };

        let proceeds = quantity * price;
        let fee = proceeds * (fee_multiplier - Decimal::ONE);
        self.base_balance += proceeds - fee;
        self.fees_paid += fee;
        self.realized_pnl += gain;
        Ok(gain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PortfolioError;
    use crate::market::PriceBook;
    use rust_decimal_macros::dec;

    fn prices() -> PriceBook {
        PriceBook::from_pairs([("btc", dec!(10000)), ("eth", dec!(250))])
    }

    #[test]
    fn test_total_value() {
        let prices = prices();
        let mut account = TraderAccount::with_balance(dec!(10000));
        account.buy("btc", dec!(0.5), dec!(5005), &prices).unwrap();
        account.buy("eth", dec!(4), dec!(1001), &prices).unwrap();

        // 3994 base + 5000 btc + 1000 eth
        assert_eq!(account.base_balance, dec!(3994));
        assert_eq!(account.total_value(&prices).unwrap(), dec!(9994));
        assert_eq!(account.fees_paid, dec!(6));
    }

    #[test]
    fn test_total_value_missing_price() {
        let prices = prices();
        let mut account = TraderAccount::with_balance(dec!(1000));
        account.buy("btc", dec!(0.01), dec!(100.1), &prices).unwrap();

        let only_eth = PriceBook::from_pairs([("eth", dec!(250))]);
        assert_eq!(
            account.total_value(&only_eth),
            Err(PortfolioError::MissingPrice { asset: "btc".to_string() })
        );
    }

    #[test]
    fn test_sold_out_asset_needs_no_price() {
        let prices = prices();
        let mut account = TraderAccount::with_balance(dec!(1000));
        account.buy("btc", dec!(0.01), dec!(100), &prices).unwrap();
        account.sell("btc", dec!(0.01), Decimal::ONE, &prices).unwrap();

        let empty = PriceBook::new();
        assert_eq!(account.total_value(&empty).unwrap(), dec!(1000));
    }

    #[test]
    fn test_sell_applies_fee() {
        let mut prices = prices();
        let mut account = TraderAccount::with_balance(dec!(1000));
        account.buy("btc", dec!(0.05), dec!(500.5), &prices).unwrap();

        prices.set("btc", dec!(12000));
        let gain = account.sell("btc", dec!(0.03), dec!(1.001), &prices).unwrap();

        // proceeds 360, fee 0.36
        assert_eq!(gain, dec!(60));
        assert_eq!(account.base_balance, dec!(499.5) + dec!(359.64));
        assert_eq!(account.holding("btc"), dec!(0.02));
        assert_eq!(account.realized_pnl, dec!(60));
        assert_eq!(account.fees_paid, dec!(0.5) + dec!(0.36));
    }

    #[test]
    fn test_zero_quantity_buy_is_noop() {
        let prices = prices();
        let mut account = TraderAccount::with_balance(dec!(100));
        account.buy("btc", Decimal::ZERO, dec!(50), &prices).unwrap();
        assert_eq!(account.base_balance, dec!(100));
        assert!(account.ledger("btc").is_none());
    }

    #[test]
    fn test_deposits_are_additive() {
        let mut split = TraderAccount::new();
        split.deposit(dec!(120.5));
        split.deposit(dec!(79.5));

        let mut single = TraderAccount::new();
        single.deposit(dec!(200));

        assert_eq!(split, single);
    }

    #[test]
    fn test_base_fraction_of_empty_account() {
        let account = TraderAccount::new();
        assert_eq!(account.base_fraction(&prices()).unwrap(), Decimal::ONE);
    }
}
