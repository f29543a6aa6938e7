//! Market data: the price oracle seen by the core and the random walk that
//! drives simulated prices.

mod oracle;
mod random_walk;

pub use oracle::{PriceBook, PriceOracle};
pub use random_walk::{RandomWalk, RandomWalkConfig};
