//! Copy-Portfolio Simulator
//!
//! A leader trades between a base currency and a set of assets; followers
//! mirror every trade in proportion to their own portfolio value and pay
//! the leader a share of their realized gains.

mod error;
mod market;
mod models;
mod simulation;
mod trading;

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use rust_decimal_macros::dec;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::models::PortfolioSnapshot;
use crate::simulation::{
    CheckpointObserver, RandomScenario, ScriptedScenario, SimulationConfig, SimulationReport,
    Simulator,
};
use crate::trading::ProfitSharePolicy;

/// Copy-portfolio simulator CLI.
#[derive(Parser)]
#[command(name = "copysim")]
#[command(about = "Simulate leader/follower copy portfolios", long_about = None)]
struct Cli {
    /// JSON configuration file (missing fields use defaults)
    #[arg(short, long, env = "COPYSIM_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "COPYSIM_LOG", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the seeded random-walk simulation
    Simulate {
        /// Number of iterations
        #[arg(short, long)]
        iterations: Option<usize>,

        /// RNG seed (random when omitted)
        #[arg(short, long, env = "COPYSIM_SEED")]
        seed: Option<u64>,

        /// Profit-share policy (from_base, pro_rata)
        #[arg(short, long)]
        policy: Option<String>,

        /// Abort on the first allocation drift
        #[arg(long)]
        strict: bool,

        /// Print a snapshot at every checkpoint
        #[arg(long)]
        snapshots: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a scripted list of actions from a JSON file
    Replay {
        /// Script file
        script: PathBuf,

        /// Abort on the first allocation drift
        #[arg(long)]
        strict: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Walk through a single trade cycle and extreme price moves
    Demo,

    /// Show the effective configuration
    Config,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    let log_level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match &cli.config {
        Some(path) => SimulationConfig::load(path)?,
        None => SimulationConfig::default(),
    };

    match cli.command {
        Commands::Simulate {
            iterations,
            seed,
            policy,
            strict,
            snapshots,
            json,
        } => {
            if let Some(iterations) = iterations {
                config.iterations = iterations;
            }
            if let Some(policy) = policy {
                config.portfolio.profit_share_policy = ProfitSharePolicy::from_str(&policy)
                    .ok_or_else(|| anyhow!("Unknown profit-share policy: {}", policy))?;
            }
            let seed = seed.or(config.seed).unwrap_or_else(rand::random);
            config.seed = Some(seed);

            info!(
                iterations = config.iterations,
                seed = seed,
                policy = %config.portfolio.profit_share_policy,
                "Starting random simulation"
            );

            let mut simulator = Simulator::from_config(&config)?.strict(config.strict || strict);
            if snapshots {
                simulator = simulator.on_checkpoint(print_checkpoint());
            }
            let report = simulator.run(&mut RandomScenario::new(config, seed))?;
            print_report(&report, json)?;
        }

        Commands::Replay {
            script,
            strict,
            json,
        } => {
            config.seed = None;

            let mut scenario = ScriptedScenario::load(&script)?;
            info!(
                script = %script.display(),
                actions = scenario.remaining(),
                "Replaying scenario"
            );
            let mut simulator = Simulator::from_config(&config)?.strict(config.strict || strict);
            if !json {
                simulator = simulator.on_checkpoint(print_checkpoint());
            }
            let report = simulator.run(&mut scenario)?;
            print_report(&report, json)?;
        }

        Commands::Demo => {
            config.follower_deposits.clear();
            config.seed = None;

            println!("\n=== Copy-Portfolio Demo ===");
            println!("Leader deposit: {}", config.leader_deposit);
            println!("Fee: {}%", config.portfolio.fee_rate() * dec!(100));
            println!(
                "Profit share: {}% ({})",
                config.portfolio.profit_share_rate * dec!(100),
                config.portfolio.profit_share_policy
            );

            let report = Simulator::from_config(&config)?
                .on_checkpoint(print_checkpoint())
                .run(&mut ScriptedScenario::demo())?;
            println!("{}", report);
        }

        Commands::Config => {
            config.validate()?;
            let portfolio = &config.portfolio;

            println!("\n=== Portfolio Configuration ===\n");
            println!("  Fee Multiplier:       {}", portfolio.fee_multiplier);
            println!("  Profit Share Rate:    {}%", portfolio.profit_share_rate * dec!(100));
            println!("  Profit Share Policy:  {}", portfolio.profit_share_policy);
            println!("  Quantity Scale:       {}", portfolio.quantity_scale);

            println!("\n=== Simulation Configuration ===\n");
            println!("  Iterations:           {}", config.iterations);
            println!(
                "  Seed:                 {}",
                config.seed.map_or_else(|| "random".to_string(), |s| s.to_string())
            );
            println!("  Leader Deposit:       {}", config.leader_deposit);
            println!("  Follower Deposits:    {:?}", config.follower_deposits);
            println!("  Initial Prices:       {}", config.price_book());
            println!("  Traded Assets:        {}", config.traded_assets.join(", "));
            println!("  Strict:               {}", config.strict);

            println!("\nFollower Joins:");
            for join in &config.joins {
                println!(
                    "  at {:>3}% (iteration {:>5}): deposit {}..{}",
                    join.at_percent,
                    config.join_iteration(join),
                    join.min_deposit,
                    join.max_deposit
                );
            }

            println!("\nRandom Walk:");
            println!("  Max Step:             {} bps", config.random_walk.max_step_bps);
            println!("  Price Scale:          {}", config.random_walk.price_scale);
        }
    }

    Ok(())
}

/// Observer that prints every checkpoint snapshot to stdout.
fn print_checkpoint() -> CheckpointObserver {
    Box::new(|label: Option<&str>, snapshot: &PortfolioSnapshot| {
        println!("\n--- {} ---", label.unwrap_or("checkpoint"));
        print!("{}", snapshot);
    })
}

fn print_report(report: &SimulationReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report);
    }
    Ok(())
}
