//! Trading logic: portfolio configuration and the copy-portfolio engine.

mod config;
mod copy_engine;

pub use config::{PortfolioConfig, ProfitSharePolicy};
pub use copy_engine::CopyPortfolio;
