//! Data models for lots, asset ledgers, trader accounts and snapshots.

mod account;
mod ledger;
mod lot;
mod snapshot;

pub use account::{AccountRef, TraderAccount};
pub use snapshot::{AccountSnapshot, PortfolioSnapshot};
