//! Simulation runner: drives a copy portfolio from a scenario.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::PortfolioError;
use crate::market::PriceBook;
use crate::models::{AccountRef, PortfolioSnapshot};
use crate::trading::CopyPortfolio;

use super::{Action, Scenario, SimulationConfig};

/// Callback invoked at every checkpoint with its label and a fresh snapshot.
pub type CheckpointObserver = Box<dyn FnMut(Option<&str>, &PortfolioSnapshot)>;

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub seed: Option<u64>,

    /// Actions pulled from the scenario
    pub actions: usize,
    pub buys: usize,
    pub sells: usize,
    pub deposits: usize,
    pub joins: usize,
    pub price_moves: usize,
    pub checkpoints: usize,

    /// Actions refused without aborting the run
    pub rejected: usize,

    /// Checkpoints at which a follower held less base than the leader
    pub allocation_breaches: usize,

    pub profit_share_earned: Decimal,
    pub final_snapshot: PortfolioSnapshot,
}

impl std::fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n{:=^60}", " SIMULATION RESULTS ")?;
        writeln!(f)?;
        writeln!(
            f,
            "Run: {} to {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.finished_at.format("%H:%M:%S")
        )?;
        match self.seed {
            Some(seed) => writeln!(f, "Seed:        {}", seed)?,
            None => writeln!(f, "Seed:        scripted")?,
        }
        writeln!(f)?;
        writeln!(f, "--- Actions ---")?;
        writeln!(f, "Total:       {} ({} rejected)", self.actions, self.rejected)?;
        writeln!(f, "Buys:        {}", self.buys)?;
        writeln!(f, "Sells:       {}", self.sells)?;
        writeln!(f, "Deposits:    {}", self.deposits)?;
        writeln!(f, "Joins:       {}", self.joins)?;
        writeln!(f, "Price moves: {}", self.price_moves)?;
        writeln!(f)?;
        writeln!(f, "--- Allocation ---")?;
        writeln!(f, "Checkpoints: {}", self.checkpoints)?;
        writeln!(f, "Breaches:    {}", self.allocation_breaches)?;
        writeln!(f)?;
        writeln!(f, "--- Profit Share ---")?;
        writeln!(f, "Earned:      {:.8}", self.profit_share_earned)?;
        writeln!(f)?;
        writeln!(f, "--- Final Portfolio ---")?;
        write!(f, "{}", self.final_snapshot)?;
        writeln!(f, "{:=^60}", "")?;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    actions: usize,
    buys: usize,
    sells: usize,
    deposits: usize,
    joins: usize,
    price_moves: usize,
    checkpoints: usize,
    rejected: usize,
    allocation_breaches: usize,
}

/// Owns the portfolio and the price book for the length of a run.
pub struct Simulator {
    portfolio: CopyPortfolio,
    prices: PriceBook,
    strict: bool,
    seed: Option<u64>,
    observer: Option<CheckpointObserver>,
}

impl Simulator {
    pub fn new(portfolio: CopyPortfolio, prices: PriceBook) -> Self {
        Self {
            portfolio,
            prices,
            strict: false,
            seed: None,
            observer: None,
        }
    }

    /// Set up the leader, the opening followers and the price book.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;

        let mut portfolio = CopyPortfolio::new(config.portfolio.clone());
        portfolio
            .deposit_base(AccountRef::Leader, config.leader_deposit)
            .context("Failed to fund leader")?;
        for deposit in &config.follower_deposits {
            let index = portfolio.join_follower();
            portfolio
                .deposit_base(AccountRef::Follower(index), *deposit)
                .with_context(|| format!("Failed to fund follower {}", index))?;
        }

        let mut simulator = Self::new(portfolio, config.price_book());
        simulator.strict = config.strict;
        simulator.seed = config.seed;
        Ok(simulator)
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn on_checkpoint(mut self, observer: CheckpointObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    #[cfg(test)]
    pub fn portfolio(&self) -> &CopyPortfolio {
        &self.portfolio
    }

    /// Pull actions until the scenario is exhausted.
    ///
    /// Caller errors (insufficient funds, negative amounts) are logged and
    /// counted; missing prices and unknown followers abort the run, as does
    /// allocation drift in strict mode.
    pub fn run<S: Scenario + ?Sized>(&mut self, scenario: &mut S) -> Result<SimulationReport> {
        let started_at = Utc::now();
        let mut counters = Counters::default();

        info!(
            followers = self.portfolio.followers().len(),
            strict = self.strict,
            prices = %self.prices,
            "Starting simulation"
        );

        while let Some(action) = scenario.next_action(&self.portfolio, &self.prices) {
            counters.actions += 1;

            if let Action::Checkpoint { label } = &action {
                counters.checkpoints += 1;
                self.checkpoint(label.as_deref(), &mut counters)?;
                continue;
            }

            match self.apply(&action) {
                Ok(()) => match action {
                    Action::Deposit { .. } => counters.deposits += 1,
                    Action::JoinFollower { .. } => counters.joins += 1,
                    Action::LeaderBuy { .. } => counters.buys += 1,
                    Action::LeaderSell { .. } => counters.sells += 1,
                    Action::SetPrice { .. } => counters.price_moves += 1,
                    Action::Checkpoint { .. } => {}
                },
                Err(e) if e.is_fatal() => {
                    return Err(e).with_context(|| {
                        format!("Action {} ({}) failed", counters.actions, action)
                    });
                }
                Err(e) => {
                    warn!(action = %action, error = %e, "Action rejected");
                    counters.rejected += 1;
                }
            }
        }

        let final_snapshot = self
            .portfolio
            .snapshot(self.prices.assets(), &self.prices, Utc::now())
            .context("Failed to capture final snapshot")?;

        info!(
            actions = counters.actions,
            rejected = counters.rejected,
            breaches = counters.allocation_breaches,
            profit_share = %self.portfolio.profit_share_earned(),
            "Simulation finished"
        );

        Ok(SimulationReport {
            started_at,
            finished_at: Utc::now(),
            seed: self.seed,
            actions: counters.actions,
            buys: counters.buys,
            sells: counters.sells,
            deposits: counters.deposits,
            joins: counters.joins,
            price_moves: counters.price_moves,
            checkpoints: counters.checkpoints,
            rejected: counters.rejected,
            allocation_breaches: counters.allocation_breaches,
            profit_share_earned: self.portfolio.profit_share_earned(),
            final_snapshot,
        })
    }

    fn apply(&mut self, action: &Action) -> std::result::Result<(), PortfolioError> {
        match action {
            Action::Deposit { account, amount } => self.portfolio.deposit_base(*account, *amount),
            Action::JoinFollower { deposit } => {
                if *deposit < Decimal::ZERO {
                    return Err(PortfolioError::InvalidAmount { amount: *deposit });
                }
                let index = self.portfolio.join_follower();
                self.portfolio
                    .deposit_base(AccountRef::Follower(index), *deposit)
            }
            Action::LeaderBuy { asset, quantity } => self
                .portfolio
                .leader_buy(asset, *quantity, &self.prices)
                .map(|_| ()),
            Action::LeaderSell { asset, quantity } => self
                .portfolio
                .leader_sell(asset, *quantity, &self.prices)
                .map(|_| ()),
            Action::SetPrice { asset, price } => {
                if *price < Decimal::ZERO {
                    return Err(PortfolioError::InvalidAmount { amount: *price });
                }
                debug!(asset = %asset, price = %price, "Price update");
                self.prices.set(asset.clone(), *price);
                Ok(())
            }
            Action::Checkpoint { .. } => Ok(()),
        }
    }

    fn checkpoint(&mut self, label: Option<&str>, counters: &mut Counters) -> Result<()> {
        match self.portfolio.check_allocation(&self.prices) {
            Ok(()) => {}
            Err(e @ PortfolioError::AllocationDrift { .. }) => {
                if self.strict {
                    bail!("{} at checkpoint {}", e, counters.checkpoints);
                }
                warn!(checkpoint = counters.checkpoints, error = %e, "Allocation drift");
                counters.allocation_breaches += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Allocation check failed at checkpoint {}", counters.checkpoints)
                })
            }
        }

        if let Some(observer) = self.observer.as_mut() {
            let snapshot = self
                .portfolio
                .snapshot(self.prices.assets(), &self.prices, Utc::now())
                .context("Failed to capture snapshot")?;
            observer(label, &snapshot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{RandomScenario, ScriptedScenario};
    use crate::trading::ProfitSharePolicy;
    use rust_decimal_macros::dec;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn buy(asset: &str, quantity: Decimal) -> Action {
        Action::LeaderBuy { asset: asset.to_string(), quantity }
    }

    #[test]
    fn test_scripted_buy_mirrors_into_follower() {
        let mut sim = Simulator::from_config(&SimulationConfig::default()).unwrap();
        let mut script = ScriptedScenario::new([buy("btc", dec!(0.5)), Action::Checkpoint { label: None }]);

        let report = sim.run(&mut script).unwrap();
        assert_eq!(report.buys, 1);
        assert_eq!(report.allocation_breaches, 0);

        let portfolio = sim.portfolio();
        assert_eq!(portfolio.leader().base_balance, dec!(4995));
        assert_eq!(portfolio.followers()[0].holding("btc"), dec!(0.05));
        assert_eq!(portfolio.followers()[0].base_balance, dec!(499.5));
        assert_eq!(report.final_snapshot.followers.len(), 1);
    }

    #[test]
    fn test_caller_errors_are_skipped() {
        let mut sim = Simulator::from_config(&SimulationConfig::default()).unwrap();
        let mut script = ScriptedScenario::new([
            Action::LeaderSell { asset: "btc".to_string(), quantity: dec!(1) },
            Action::Deposit { account: AccountRef::Leader, amount: dec!(-5) },
            Action::JoinFollower { deposit: dec!(-1) },
            buy("btc", dec!(100)),
            Action::Deposit { account: AccountRef::Leader, amount: dec!(5) },
        ]);

        let report = sim.run(&mut script).unwrap();
        assert_eq!(report.rejected, 4);
        assert_eq!(report.deposits, 1);
        assert_eq!(sim.portfolio().followers().len(), 1);
        assert_eq!(sim.portfolio().leader().base_balance, dec!(10005));
    }

    #[test]
    fn test_fatal_errors_abort() {
        let mut sim = Simulator::from_config(&SimulationConfig::default()).unwrap();
        let mut script = ScriptedScenario::new([Action::Deposit {
            account: AccountRef::Follower(7),
            amount: dec!(1),
        }]);
        assert!(sim.run(&mut script).is_err());

        let mut sim = Simulator::from_config(&SimulationConfig::default()).unwrap();
        let mut script = ScriptedScenario::new([buy("sol", dec!(1))]);
        let err = sim.run(&mut script).unwrap_err();
        assert!(format!("{:#}", err).contains("no price for asset sol"));
    }

    #[test]
    fn test_demo_walkthrough() {
        let config = SimulationConfig {
            follower_deposits: Vec::new(),
            ..Default::default()
        };
        let labels = Rc::new(RefCell::new(Vec::new()));
        let seen = Rc::clone(&labels);

        let mut sim = Simulator::from_config(&config)
            .unwrap()
            .strict(true)
            .on_checkpoint(Box::new(move |label: Option<&str>, snapshot: &PortfolioSnapshot| {
                seen.borrow_mut()
                    .push((label.map(str::to_string), snapshot.followers.len()));
            }));

        let report = sim.run(&mut ScriptedScenario::demo()).unwrap();
        assert_eq!(report.checkpoints, 6);
        assert_eq!(report.joins, 1);
        assert_eq!(report.rejected, 0);
        assert_eq!(report.allocation_breaches, 0);
        assert_eq!(sim.portfolio().leader().base_balance, dec!(3586.4));

        let labels = labels.borrow();
        assert_eq!(labels.len(), 6);
        assert_eq!(labels[0], (Some("leader bought 0.5 BTC".to_string()), 0));
        assert_eq!(labels[5].1, 1);
    }

    #[test]
    fn test_random_pro_rata_run_keeps_allocation() {
        let mut config = SimulationConfig {
            iterations: 200,
            seed: Some(7),
            strict: true,
            ..Default::default()
        };
        config.portfolio.profit_share_policy = ProfitSharePolicy::ProRata;

        let mut sim = Simulator::from_config(&config).unwrap();
        let mut scenario = RandomScenario::new(config.clone(), 7);
        let report = sim.run(&mut scenario).unwrap();

        assert_eq!(report.checkpoints, 200);
        assert_eq!(report.joins, 3);
        assert_eq!(report.allocation_breaches, 0);
        assert_eq!(report.seed, Some(7));
        assert_eq!(sim.portfolio().followers().len(), 4);
        assert!(sim.portfolio().leader().base_balance >= Decimal::ZERO);
    }

    #[test]
    fn test_report_renders() {
        let mut sim = Simulator::from_config(&SimulationConfig::default()).unwrap();
        let report = sim
            .run(&mut ScriptedScenario::new([buy("btc", dec!(0.1))]))
            .unwrap();
        let text = report.to_string();
        assert!(text.contains("SIMULATION RESULTS"));
        assert!(text.contains("Follower 0:"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["buys"], 1);
    }
}
