//! Scenario generators: lazy sequences of driver actions.

use std::collections::VecDeque;
use std::path::Path;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::market::{PriceBook, PriceOracle, RandomWalk};
use crate::models::AccountRef;
use crate::trading::CopyPortfolio;

use super::SimulationConfig;

/// One driver call against the portfolio or the price book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Deposit {
        account: AccountRef,
        amount: Decimal,
    },
    JoinFollower {
        #[serde(default)]
        deposit: Decimal,
    },
    LeaderBuy {
        asset: String,
        quantity: Decimal,
    },
    LeaderSell {
        asset: String,
        quantity: Decimal,
    },
    SetPrice {
        asset: String,
        price: Decimal,
    },
    /// End of an iteration: the runner checks allocations and reports
    Checkpoint {
        #[serde(default)]
        label: Option<String>,
    },
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Deposit { account, amount } => write!(f, "deposit {:.2} to {}", amount, account),
            Action::JoinFollower { deposit } => write!(f, "follower joins with {:.2}", deposit),
            Action::LeaderBuy { asset, quantity } => {
                write!(f, "leader buys {:.8} {}", quantity, asset.to_uppercase())
            }
            Action::LeaderSell { asset, quantity } => {
                write!(f, "leader sells {:.8} {}", quantity, asset.to_uppercase())
            }
            Action::SetPrice { asset, price } => {
                write!(f, "{} price moves to {:.2}", asset.to_uppercase(), price)
            }
            Action::Checkpoint { label: Some(label) } => write!(f, "checkpoint: {}", label),
            Action::Checkpoint { label: None } => write!(f, "checkpoint"),
        }
    }
}

/// Produces the next action given a read-only view of the current state.
///
/// Returning `None` ends the run.
pub trait Scenario {
    fn next_action(&mut self, portfolio: &CopyPortfolio, prices: &PriceBook) -> Option<Action>;
}

/// A fixed list of actions.
#[derive(Debug, Clone, Default)]
pub struct ScriptedScenario {
    actions: VecDeque<Action>,
}

impl ScriptedScenario {
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            actions: actions.into_iter().collect(),
        }
    }

    /// Parse a JSON array of actions.
    pub fn from_json(raw: &str) -> Result<Self> {
        let actions: Vec<Action> =
            serde_json::from_str(raw).context("Failed to parse scenario script")?;
        Ok(Self::new(actions))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario {}", path.display()))?;
        Self::from_json(&raw)
    }

    /// Walkthrough of a single trade cycle followed by extreme price moves.
    pub fn demo() -> Self {
        let checkpoint = |label: &str| Action::Checkpoint {
            label: Some(label.to_string()),
        };
        let set = |asset: &str, price: Decimal| Action::SetPrice {
            asset: asset.to_string(),
            price,
        };

        Self::new([
            Action::LeaderBuy { asset: "btc".to_string(), quantity: dec!(0.5) },
            checkpoint("leader bought 0.5 BTC"),
            Action::JoinFollower { deposit: dec!(100) },
            set("btc", dec!(12000)),
            checkpoint("follower joined, BTC at 12000"),
            Action::LeaderSell { asset: "btc".to_string(), quantity: dec!(0.3) },
            checkpoint("leader sold 0.3 BTC"),
            Action::LeaderBuy { asset: "eth".to_string(), quantity: dec!(20) },
            checkpoint("leader bought 20 ETH"),
            set("btc", dec!(100000)),
            set("eth", dec!(1)),
            checkpoint("BTC 100000, ETH 1"),
            set("btc", dec!(1)),
            set("eth", dec!(100000)),
            checkpoint("BTC 1, ETH 100000"),
        ])
    }

    pub fn remaining(&self) -> usize {
        self.actions.len()
    }
}

impl Scenario for ScriptedScenario {
    fn next_action(&mut self, _portfolio: &CopyPortfolio, _prices: &PriceBook) -> Option<Action> {
        self.actions.pop_front()
    }
}

/// Coin-flip leader that buys or sells a random share of what it can each
/// iteration while prices follow a random walk.
pub struct RandomScenario {
    config: SimulationConfig,
    rng: StdRng,
    walk: RandomWalk,
    iteration: usize,
    pending: VecDeque<Action>,
}

impl RandomScenario {
    pub fn new(config: SimulationConfig, seed: u64) -> Self {
        let walk = RandomWalk::new(config.random_walk.clone(), seed.wrapping_add(1));
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
            walk,
            iteration: 0,
            pending: VecDeque::new(),
        }
    }

    fn flip_coin(&mut self) -> bool {
        self.rng.gen_range(0..10_000) > 5_000
    }

    /// Random share (0..=99 percent) of `amount`, truncated to 8 places.
    fn random_share(&mut self, amount: Decimal) -> Decimal {
        let pct = Decimal::from(self.rng.gen_range(0..100u32));
        (amount * pct / dec!(100)).round_dp_with_strategy(8, RoundingStrategy::ToZero)
    }

    fn plan_iteration(&mut self, portfolio: &CopyPortfolio, prices: &PriceBook) {
        if let Some(trade) = self.plan_trade(portfolio, prices) {
            self.pending.push_back(trade);
        }

        for (asset, price) in self.walk.step(prices) {
            self.pending.push_back(Action::SetPrice { asset, price });
        }

        let joins: Vec<_> = self
            .config
            .joins
            .iter()
            .filter(|j| self.config.join_iteration(j) == self.iteration)
            .cloned()
            .collect();
        for join in joins {
            let deposit = Decimal::from(self.rng.gen_range(join.min_deposit..join.max_deposit));
            self.pending.push_back(Action::JoinFollower { deposit });
        }

        self.pending.push_back(Action::Checkpoint {
            label: Some(format!("iteration {}", self.iteration)),
        });
        self.iteration += 1;
    }

    fn plan_trade(&mut self, portfolio: &CopyPortfolio, prices: &PriceBook) -> Option<Action> {
        if self.config.traded_assets.is_empty() {
            return None;
        }
        let buy = self.flip_coin();
        let idx = self.rng.gen_range(0..self.config.traded_assets.len());
        let asset = self.config.traded_assets[idx].clone();

        if buy {
            let price = prices.price(&asset)?;
            if price.is_zero() {
                return None;
            }
            let fee = portfolio.config().fee_multiplier;
            let affordable = portfolio.leader().base_balance / price / fee;
            let quantity = self.random_share(affordable);
            Some(Action::LeaderBuy { asset, quantity })
        } else {
            let held = portfolio.leader().holding(&asset);
            if held.is_zero() {
                return None;
            }
            let quantity = self.random_share(held);
            Some(Action::LeaderSell { asset, quantity })
        }
    }
}

impl Scenario for RandomScenario {
    fn next_action(&mut self, portfolio: &CopyPortfolio, prices: &PriceBook) -> Option<Action> {
        if self.pending.is_empty() {
            if self.iteration >= self.config.iterations {
                return None;
            }
            self.plan_iteration(portfolio, prices);
        }
        self.pending.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<S: Scenario>(scenario: &mut S, portfolio: &CopyPortfolio, prices: &PriceBook) -> Vec<Action> {
        std::iter::from_fn(|| scenario.next_action(portfolio, prices)).collect()
    }

    #[test]
    fn test_script_from_json() {
        let raw = r#"[
            {"action": "deposit", "account": "leader", "amount": "500"},
            {"action": "deposit", "account": {"follower": 0}, "amount": "50"},
            {"action": "join_follower"},
            {"action": "leader_buy", "asset": "btc", "quantity": "0.01"},
            {"action": "checkpoint"}
        ]"#;
        let mut script = ScriptedScenario::from_json(raw).unwrap();
        assert_eq!(script.remaining(), 5);

        let actions = drain(&mut script, &CopyPortfolio::default(), &PriceBook::new());
        assert_eq!(
            actions[1],
            Action::Deposit { account: AccountRef::Follower(0), amount: dec!(50) }
        );
        assert_eq!(actions[2], Action::JoinFollower { deposit: Decimal::ZERO });
        assert_eq!(actions[4], Action::Checkpoint { label: None });
    }

    #[test]
    fn test_random_scenario_is_reproducible() {
        let config = SimulationConfig {
            iterations: 20,
            ..Default::default()
        };
        let prices = config.price_book();
        let mut portfolio = CopyPortfolio::default();
        portfolio.deposit_base(AccountRef::Leader, dec!(10000)).unwrap();

        let a = drain(&mut RandomScenario::new(config.clone(), 11), &portfolio, &prices);
        let b = drain(&mut RandomScenario::new(config, 11), &portfolio, &prices);
        assert_eq!(a, b);

        let checkpoints = a.iter().filter(|x| matches!(x, Action::Checkpoint { .. })).count();
        assert_eq!(checkpoints, 20);
    }

    #[test]
    fn test_random_scenario_schedules_joins() {
        let config = SimulationConfig {
            iterations: 8,
            ..Default::default()
        };
        let prices = config.price_book();
        let portfolio = CopyPortfolio::default();

        let actions = drain(&mut RandomScenario::new(config, 5), &portfolio, &prices);
        let deposits: Vec<Decimal> = actions
            .iter()
            .filter_map(|a| match a {
                Action::JoinFollower { deposit } => Some(*deposit),
                _ => None,
            })
            .collect();

        assert_eq!(deposits.len(), 3);
        assert!(deposits[0] >= dec!(10) && deposits[0] < dec!(10010));
        assert!(deposits[2] >= dec!(10) && deposits[2] < dec!(110));
    }

    #[test]
    fn test_random_buys_stay_affordable() {
        let config = SimulationConfig::default();
        let prices = config.price_book();
        let mut portfolio = CopyPortfolio::default();
        portfolio.deposit_base(AccountRef::Leader, dec!(10000)).unwrap();

        let mut scenario = RandomScenario::new(config, 99);
        for action in drain(&mut scenario, &portfolio, &prices) {
            if let Action::LeaderBuy { quantity, .. } = action {
                assert!(quantity * dec!(10000) * dec!(1.001) <= dec!(10000));
            }
        }
    }
}
