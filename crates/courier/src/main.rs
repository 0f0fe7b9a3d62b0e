// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier operator CLI.
//!
//! Inspects and repairs the event queue in the configured database.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod dead_letters;
mod queue;
mod status;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use courier_config::CourierConfig;
use courier_core::{CourierError, EventType, PluginAdapter};
use courier_storage::SqliteStorage;

/// Courier - ticket-to-chat event pipeline.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show queue depths, oldest entry age and dedup hits.
    Status {
        /// Also print the Prometheus text exposition of the queue gauges.
        #[arg(long)]
        prometheus: bool,
    },
    /// Inspect or replay dead-lettered events.
    DeadLetters {
        #[command(subcommand)]
        action: DeadLetterCommands,
    },
    /// Return expired leases to the queue and prune expired dedup records.
    Recover,
    /// Inject an event into the queue. Deduplication applies.
    Enqueue {
        /// Event type, e.g. `message_created`.
        #[arg(long = "type", value_parser = parse_event_type)]
        event_type: EventType,
        /// External ticket id.
        #[arg(long)]
        ticket: String,
        /// Event payload as JSON.
        #[arg(long)]
        payload: String,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[derive(Subcommand, Debug)]
enum DeadLetterCommands {
    /// List the most recent dead letters.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Move a dead letter back onto the queue with a fresh retry budget.
    Replay {
        /// Dead-letter id as shown by `list`.
        id: i64,
    },
}

fn parse_event_type(s: &str) -> Result<EventType, String> {
    s.parse().map_err(|_| {
        let known: Vec<String> = EventType::ALL.iter().map(ToString::to_string).collect();
        format!("unknown event type '{s}' (expected one of: {})", known.join(", "))
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match courier_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    };
    init_tracing(&config.service.log_level);

    if let Err(e) = run(cli.command, config).await {
        eprintln!("courier: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: CourierConfig) -> Result<(), CourierError> {
    if let Commands::Config = command {
        let rendered = toml::to_string_pretty(&config)
            .map_err(|e| CourierError::Internal(format!("failed to render config: {e}")))?;
        print!("{rendered}");
        return Ok(());
    }

    let storage =
        Arc::new(SqliteStorage::open(config.storage.clone(), config.queue.clone()).await?);
    let result = match command {
        Commands::Status { prometheus } => status::run_status(storage.as_ref(), prometheus).await,
        Commands::DeadLetters { action } => match action {
            DeadLetterCommands::List { limit } => {
                dead_letters::run_list(storage.as_ref(), limit).await
            }
            DeadLetterCommands::Replay { id } => dead_letters::run_replay(storage.as_ref(), id).await,
        },
        Commands::Recover => queue::run_recover(&config, storage.clone()).await,
        Commands::Enqueue {
            event_type,
            ticket,
            payload,
        } => queue::run_enqueue(storage.as_ref(), event_type, &ticket, &payload).await,
        Commands::Config => Ok(()),
    };

    storage.shutdown().await?;
    result
}

/// Initialize tracing with an env filter. `RUST_LOG` takes precedence.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
