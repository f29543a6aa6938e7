//! Scenario-driven simulation of a copy portfolio.

mod config;
mod runner;
mod scenario;

pub use config::SimulationConfig;
pub use runner::{CheckpointObserver, SimulationReport, Simulator};
pub use scenario::{Action, RandomScenario, Scenario, ScriptedScenario};
