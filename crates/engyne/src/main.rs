// SPDX-FileCopyrightText: 2026 Engyne Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engyne - slot supervisor and lead dispatch control plane.
//!
//! One binary: `serve` runs the control plane, `worker` is what the
//! supervisor spawns per slot, `preview` and `check-config` are offline
//! operator tools.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod preview;
mod serve;
mod shutdown;
mod worker;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use engyne_config::{ConfigError, EngyneConfig};
use engyne_worker::{EXIT_ERROR, EXIT_OK, EXIT_USAGE};

/// Engyne - slot supervisor and lead dispatch control plane.
#[derive(Parser, Debug)]
#[command(name = "engyne", version, about, long_about = None)]
struct Cli {
    /// Explicit config file instead of the XDG lookup.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the supervisor, dispatcher, and HTTP API.
    Serve,
    /// Run one slot worker (spawned by the supervisor).
    Worker {
        slots_root: PathBuf,
        slot_id: String,
        run_id: String,
    },
    /// Score a slot's recent leads against a draft policy file.
    Preview {
        #[arg(long)]
        slot: String,
        /// Draft policy in slot_config.toml format.
        #[arg(long)]
        policy: PathBuf,
        #[arg(long, default_value_t = 50)]
        sample: usize,
    },
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

fn load(path: Option<&PathBuf>) -> Result<EngyneConfig, Vec<ConfigError>> {
    match path {
        Some(path) => engyne_config::load_and_validate_path(path),
        None => engyne_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            engyne_config::render_errors(&errors);
            std::process::exit(EXIT_USAGE);
        }
    };

    let code = match cli.command {
        Commands::Serve => match serve::run_serve(config, cli.config.as_deref()).await {
            Ok(()) => EXIT_OK,
            Err(e) => {
                eprintln!("error: {e}");
                EXIT_ERROR
            }
        },
        Commands::Worker {
            slots_root,
            slot_id,
            run_id,
        } => worker::run_worker(config, slots_root, &slot_id, run_id).await,
        Commands::Preview {
            slot,
            policy,
            sample,
        } => match preview::run_preview(&config, &slot, &policy, sample) {
            Ok(report) => {
                println!("{report}");
                EXIT_OK
            }
            Err(e) => {
                eprintln!("error: {e}");
                EXIT_ERROR
            }
        },
        Commands::CheckConfig => {
            eprintln!(
                "engyne: config ok (node_id={}, slots_root={}, runtime_root={})",
                config.node.node_id, config.paths.slots_root, config.paths.runtime_root
            );
            EXIT_OK
        }
    };
    std::process::exit(code);
}

/// Initializes the tracing subscriber with the given log level.
pub(crate) fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("engyne={log_level},warn")));

    // A second init (tests) is harmless.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
