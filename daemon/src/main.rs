//! fedvote daemon: command-line entry point.

mod simulate;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use fedvote_messages::ElectionKey;
use fedvote_node::{init_logging, NodeConfig};
use fedvote_utils::format_millis;

use crate::simulate::SimulationParams;

#[derive(Parser)]
#[command(name = "fedvote-daemon", about = "Federated leader fault-recovery elections")]
struct Cli {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "FEDVOTE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "FEDVOTE_LOG_FORMAT")]
    log_format: Option<String>,

    /// Milliseconds a round may stall before it is faulted.
    #[arg(long, env = "FEDVOTE_ROUND_TIMEOUT_MS")]
    round_timeout_ms: Option<u64>,

    /// Keep Prometheus metrics for every election service.
    #[arg(long, env = "FEDVOTE_ENABLE_METRICS")]
    enable_metrics: bool,

    /// Path to a TOML configuration file. File settings are the base;
    /// CLI flags and env vars override them.
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run one election across an in-process federation.
    Simulate {
        #[arg(long, default_value_t = 5)]
        leaders: u8,

        #[arg(long, default_value_t = 3)]
        candidates: u8,

        /// RNG seed for delivery order, loss and duplication.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Probability that any single delivery is lost.
        #[arg(long, default_value_t = 0.0)]
        drop_rate: f64,

        /// Probability that any single delivery happens twice.
        #[arg(long, default_value_t = 0.05)]
        duplicate_rate: f64,

        #[arg(long, default_value_t = 1)]
        height: u32,

        #[arg(long, default_value_t = 0)]
        minute: u8,

        /// Slot whose leader is missing.
        #[arg(long, default_value_t = 0)]
        slot: u32,

        #[arg(long, default_value_t = 500_000)]
        max_steps: usize,

        /// Round deadlines the simulation may fire before giving up.
        #[arg(long, default_value_t = 100)]
        max_timeouts: usize,

        /// Print per-node statistics.
        #[arg(long)]
        stats: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => {
            let path = path.to_str().context("config path is not valid UTF-8")?;
            NodeConfig::from_toml_file(path).with_context(|| format!("loading {path}"))?
        }
        None => NodeConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.log_format = format;
    }
    if let Some(timeout) = cli.round_timeout_ms {
        config.round_timeout_ms = timeout;
    }
    if cli.enable_metrics {
        config.enable_metrics = true;
    }
    config.validate()?;

    init_logging(config.parsed_log_format()?, &config.log_level)?;

    match cli.command {
        Command::Config => {
            print!("{}", config.to_toml_string()?);
        }
        Command::Simulate {
            leaders,
            candidates,
            seed,
            drop_rate,
            duplicate_rate,
            height,
            minute,
            slot,
            max_steps,
            max_timeouts,
            stats,
        } => {
            let params = SimulationParams {
                leaders,
                candidates,
                seed,
                drop_rate,
                duplicate_rate,
                key: ElectionKey {
                    height,
                    minute,
                    slot,
                },
                max_steps,
                max_timeouts,
            };
            tracing::info!(
                leaders,
                candidates,
                seed,
                drop_rate,
                key = %params.key,
                "starting simulation"
            );
            let outcome = simulate::run(&params, &config)?;

            println!("election {}", params.key);
            println!("faulted leader  {}", outcome.faulted);
            match outcome.winner() {
                Some(winner) => println!("replacement     {}", winner),
                None => println!("replacement     none"),
            }
            println!(
                "committed       {}/{} nodes",
                outcome.committed(),
                outcome.members.len()
            );
            println!(
                "steps={} delivered={} dropped={} timeouts={}",
                outcome.steps, outcome.delivered, outcome.dropped, outcome.timeouts
            );
            if let Some(broadcasts) = outcome.broadcasts() {
                println!("broadcast envelopes={}", broadcasts);
            }
            if let Some(report) = &outcome.report {
                println!();
                println!(
                    "round {} | {} | leader {} -> slot {} | candidate {} -> slot {}",
                    report.round,
                    format_millis(report.latency_ms),
                    report.swap.faulted.short(),
                    report.swap.faulted_index,
                    report.swap.candidate.short(),
                    report.swap.candidate_index
                );
                print!("{}", report.grid);
            }
            if stats {
                for member in &outcome.members {
                    println!();
                    let role = if member.leader { "leader" } else { "candidate" };
                    println!("[{} {}]", role, member.identity.short());
                    print!("{}", member.stats);
                    if let Some(metrics) = &member.metrics {
                        print!("{}", metrics.encode()?);
                    }
                }
            }
            if outcome.committed() == 0 {
                tracing::warn!(steps = outcome.steps, "no node committed");
            }
        }
    }

    Ok(())
}
