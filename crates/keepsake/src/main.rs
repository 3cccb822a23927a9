// SPDX-FileCopyrightText: 2026 Keepsake Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keepsake - relationship memory assistant.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod chat;
mod memories;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use keepsake_config::KeepsakeConfig;
use keepsake_core::KeepsakeError;

/// Keepsake - remembers what matters about the people in your life.
#[derive(Parser, Debug)]
#[command(name = "keepsake", version, about, long_about = None)]
struct Cli {
    /// Configuration file to use instead of the XDG lookup.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one conversational turn: route, retrieve, reply, extract.
    Chat {
        #[arg(long)]
        owner: String,
        /// Name of the person the conversation is about.
        #[arg(long)]
        subject: Option<String>,
        #[arg(long, default_value = "")]
        profile_summary: String,
        #[arg(long, default_value = "")]
        preferences: String,
        /// Text file of auxiliary context, one entry per non-blank line.
        #[arg(long)]
        corpus: Option<PathBuf>,
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
        message: String,
    },
    /// Store a memory through the dedup and conflict pipeline.
    Ingest {
        #[arg(long)]
        owner: String,
        /// When it happened (RFC 3339). Defaults to now.
        #[arg(long, value_parser = parse_timestamp)]
        happened_at: Option<DateTime<Utc>>,
        #[arg(long, default_value = "chat")]
        source: String,
        #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
        sentiment: i32,
        /// Conversation fingerprint for exact-match dedup.
        #[arg(long)]
        fingerprint: Option<String>,
        content: String,
    },
    /// List an owner's memories, newest first, including outdated ones.
    Timeline {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Show active memories similar to a piece of text.
    Similar {
        #[arg(long)]
        owner: String,
        content: String,
    },
    /// Embed stored memories that have no embedding yet.
    Backfill {
        #[arg(long, default_value_t = keepsake_memory::backfill::DEFAULT_BACKFILL_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Print the effective configuration as TOML.
    Config,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

fn load_config(path: Option<&PathBuf>) -> KeepsakeConfig {
    let loaded = match path {
        Some(path) => keepsake_config::load_and_validate_path(path),
        None => keepsake_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            keepsake_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

/// Initialize the global tracing subscriber. `RUST_LOG` wins over config.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("keepsake={log_level},keepsake_memory={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands, config: KeepsakeConfig) -> Result<(), KeepsakeError> {
    match command {
        Commands::Chat {
            owner,
            subject,
            profile_summary,
            preferences,
            corpus,
            json,
            message,
        } => {
            let subject = keepsake_memory::SubjectProfile {
                name: subject.unwrap_or_else(|| config.persona.subject_name.clone()),
                profile_summary,
                preferences,
            };
            let args = chat::ChatArgs {
                owner,
                subject,
                corpus,
                json,
                message,
            };
            chat::run_chat(&config, args).await
        }
        Commands::Ingest {
            owner,
            happened_at,
            source,
            sentiment,
            fingerprint,
            content,
        } => {
            let mut new = keepsake_memory::NewMemory::text(content)
                .source_type(source)
                .sentiment(sentiment);
            if let Some(happened_at) = happened_at {
                new = new.happened_at(happened_at);
            }
            if let Some(fingerprint) = fingerprint {
                new = new.fingerprint(fingerprint);
            }
            memories::run_ingest(&config, &owner, new).await
        }
        Commands::Timeline { owner, limit, json } => {
            memories::run_timeline(&config, &owner, limit, json).await
        }
        Commands::Similar { owner, content } => {
            memories::run_similar(&config, &owner, &content).await
        }
        Commands::Backfill { batch_size } => memories::run_backfill(&config, batch_size).await,
        Commands::Config => {
            let mut shown = config;
            if shown.llm.api_key.is_some() {
                shown.llm.api_key = Some("********".to_string());
            }
            let rendered = toml::to_string_pretty(&shown)
                .map_err(|e| KeepsakeError::Internal(format!("failed to render config: {e}")))?;
            print!("{rendered}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());
    init_tracing(&config.general.log_level);
    keepsake_memory::metrics::register_metrics();

    let Some(command) = cli.command else {
        println!("keepsake: use --help for available commands");
        return;
    };

    if let Err(e) = run(command, config).await {
        eprintln!("keepsake: {e}");
        std::process::exit(1);
    }
}
