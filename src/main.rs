use std::path::PathBuf;
use std::process;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;

use shardwatch::chaos::{select, FaultInjector, SelectionPolicy, TargetScope, TerminationMode};
use shardwatch::cluster::snapshot::load_topology;
use shardwatch::config::Settings;
use shardwatch::{trace, Role, RunSnapshot, ShardId, ShardLogValidator};

#[derive(Parser, Debug)]
#[command(name = "shardwatch", about = "Cluster chaos injection and log validation")]
struct Cli {
    /// TOML settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate node logs after a chaos run. Exits 1 when validation fails.
    Validate {
        /// JSON run file: topology, operations, killed nodes, primary-killed shards.
        #[arg(long)]
        run: PathBuf,
        /// Print the full report as JSON instead of the summary.
        #[arg(long)]
        json: bool,
    },
    /// Pick chaos targets from a topology.
    Select {
        #[arg(long)]
        topology: PathBuf,
        #[arg(long, conflicts_with_all = ["shard", "primary_of"])]
        role: Option<CliRole>,
        #[arg(long, conflicts_with = "primary_of")]
        shard: Option<ShardId>,
        #[arg(long)]
        primary_of: Option<ShardId>,
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Node ids that must not be picked; repeatable.
        #[arg(long)]
        exclude: Vec<String>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Terminate one node process.
    Inject {
        #[arg(long)]
        topology: PathBuf,
        #[arg(long)]
        node: String,
        #[arg(long)]
        mode: Option<CliMode>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliRole {
    Primary,
    Replica,
}

impl From<CliRole> for Role {
    fn from(role: CliRole) -> Self {
        match role {
            CliRole::Primary => Role::Primary,
            CliRole::Replica => Role::Replica,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliMode {
    Abrupt,
    Graceful,
}

impl From<CliMode> for TerminationMode {
    fn from(mode: CliMode) -> Self {
        match mode {
            CliMode::Abrupt => TerminationMode::Abrupt,
            CliMode::Graceful => TerminationMode::Graceful,
        }
    }
}

fn main() {
    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            eprintln!("FATAL: {:#}", e);
            process::exit(2);
        }
    }
}

/// Returns whether the command succeeded.
fn run() -> anyhow::Result<bool> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load configuration")?;
    trace::init(&settings.logging);

    match cli.command {
        Command::Validate { run, json } => {
            let snapshot = RunSnapshot::load(&run)?;
            let validator = ShardLogValidator::new(settings.validation);
            let result = validator.validate_affected_shards(
                &snapshot.topology,
                &snapshot.operations,
                &snapshot.killed_nodes,
                &snapshot.shards_with_primary_killed,
            )?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result);
                for finding in result.findings() {
                    println!(
                        "  [{}] node={} shard={} {}",
                        finding.severity(),
                        finding.node_id(),
                        finding
                            .shard_id()
                            .map_or_else(|| "-".to_string(), |s| s.to_string()),
                        finding.message()
                    );
                    if !finding.log_line().is_empty() {
                        println!("      {}", finding.log_line());
                    }
                }
            }
            Ok(result.success())
        }
        Command::Select {
            topology,
            role,
            shard,
            primary_of,
            count,
            exclude,
            seed,
        } => {
            let nodes = load_topology(&topology)?;
            let scope = match (role, shard, primary_of) {
                (Some(role), _, _) => TargetScope::Role(role.into()),
                (_, Some(shard), _) => TargetScope::Shard(shard),
                (_, _, Some(shard)) => TargetScope::PrimaryOf(shard),
                _ => TargetScope::Any,
            };
            let policy = SelectionPolicy::new(scope)
                .with_count(count)
                .excluding(exclude);
            let mut rng = match seed.or(settings.chaos.seed) {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };

            for node in select(&nodes, &policy, &mut rng)? {
                println!("{}\t{}\t{}", node.node_id, node.address(), node.role);
            }
            Ok(true)
        }
        Command::Inject {
            topology,
            node,
            mode,
        } => {
            let nodes = load_topology(&topology)?;
            let Some(target) = nodes.iter().find(|n| n.node_id == node) else {
                bail!("node {} is not in {}", node, topology.display());
            };
            let mode = mode.map_or(settings.chaos.mode, TerminationMode::from);

            let record = FaultInjector::new().inject(target, mode)?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(true)
        }
    }
}
