use anyhow::{anyhow, Result};
use arbiter_compute::{merkle, stubs::MemoryGame, DeadlineConfig, State};
use clap::{ArgAction, Parser, Subcommand};
use ethers::types::H256;
use std::time::Duration;
use tracing::Level;

mod demo;

/// Arguments for the `arbiter` binary.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Verbosity level (0-4)
    #[arg(long, short, help = "Verbosity level (0-4)", action = ArgAction::Count, env = "VERBOSITY", global = true)]
    v: u8,

    #[command(flatten)]
    deadlines: DeadlineArgs,

    #[command(subcommand)]
    command: Command,
}

/// The fixed costs of the deadline policy.
#[derive(clap::Args, Debug)]
struct DeadlineArgs {
    /// Seconds it takes to start the machine.
    #[arg(
        long,
        help = "Seconds it takes to start the machine.",
        env = "ARBITER_START_COST",
        default_value_t = DeadlineConfig::default().start_cost,
        global = true
    )]
    start_cost: u64,

    /// Seconds granted to providers to upload their drives.
    #[arg(
        long,
        help = "Seconds granted to providers to upload their drives.",
        env = "ARBITER_MAX_UPLOAD_TIME",
        default_value_t = DeadlineConfig::default().max_upload_time,
        global = true
    )]
    max_upload_time: u64,

    /// Picoseconds it takes to run a single step.
    #[arg(
        long,
        help = "Picoseconds it takes to run a single step.",
        env = "ARBITER_PICOSECONDS_PER_STEP",
        default_value_t = DeadlineConfig::default().picoseconds_per_step,
        global = true
    )]
    picoseconds_per_step: u64,

    /// Points per partition round of the verification game.
    #[arg(
        long,
        help = "Points per partition round of the verification game.",
        env = "ARBITER_PARTITION_SIZE",
        default_value_t = DeadlineConfig::default().partition_size,
        global = true
    )]
    partition_size: u64,
}

impl From<&DeadlineArgs> for DeadlineConfig {
    fn from(args: &DeadlineArgs) -> Self {
        Self {
            start_cost: args.start_cost,
            max_upload_time: args.max_upload_time,
            picoseconds_per_step: args.picoseconds_per_step,
            partition_size: args.partition_size,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints the hash of an all-zero region of 2^log2-size bytes.
    Pristine {
        #[arg(long)]
        log2_size: u8,
    },
    /// Prints the drive hash of a 32-byte literal.
    Literal {
        #[arg(long)]
        value: H256,
    },
    /// Prints the maximum number of seconds an instance may stay in a state. Challenge
    /// durations use the in-memory game estimate.
    Deadline {
        #[arg(long)]
        state: State,
        #[arg(long)]
        final_time: u64,
        #[arg(long)]
        round_duration: u64,
    },
    /// Runs a negotiation end to end against in-memory collaborators.
    Demo {
        #[arg(long, value_enum, default_value_t = demo::Outcome::Consensus)]
        outcome: demo::Outcome,

        /// Milliseconds between two keeper passes.
        #[arg(long, env = "ARBITER_POLL_INTERVAL_MS", default_value_t = 10)]
        poll_interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse the command arguments
    let Args {
        v,
        deadlines,
        command,
    } = Args::parse();

    // Initialize the tracing subscriber
    init_tracing_subscriber(v)?;

    let deadlines = DeadlineConfig::from(&deadlines);
    tracing::debug!(target: "arbiter-cli", "Deadline policy: {:?}", deadlines);

    match command {
        Command::Pristine { log2_size } => {
            println!("{:?}", merkle::pristine_hash(log2_size)?);
        }
        Command::Literal { value } => {
            println!("{:?}", merkle::literal_root(&value));
        }
        Command::Deadline {
            state,
            final_time,
            round_duration,
        } => {
            let duration =
                deadlines.max_duration(state, final_time, round_duration, &MemoryGame::default());
            println!("{}", duration);
        }
        Command::Demo {
            outcome,
            poll_interval_ms,
        } => {
            tracing::info!(target: "arbiter-cli", "Running demo negotiation, expected outcome: {:?}", outcome);
            let (view, result) =
                demo::run(outcome, deadlines, Duration::from_millis(poll_interval_ms)).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "instance": view,
                    "result": result,
                }))?
            );
        }
    }

    Ok(())
}

/// Initializes the tracing subscriber
///
/// # Arguments
/// * `verbosity_level` - The verbosity level (0-4)
///
/// # Returns
/// * `Result<()>` - Ok if successful, Err otherwise.
fn init_tracing_subscriber(verbosity_level: u8) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(match verbosity_level {
            0 => Level::ERROR,
            1 => Level::WARN,
            2 => Level::INFO,
            3 => Level::DEBUG,
            _ => Level::TRACE,
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber).map_err(|e| anyhow!(e))
}
