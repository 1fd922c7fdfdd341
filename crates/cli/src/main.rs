use std::{
    path::{Path, PathBuf},
    process,
};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod seed;
mod serve;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Archrender - token-metered architectural rendering service", long_about = None)]
struct Opts {
    /// Directory holding the `.env` file to load (default: current directory)
    #[arg(long = "env-dir", global = true, default_value = ".")]
    env_dir: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// Start the HTTP API server
    Serve(serve::ServeCommand),
    /// Load token packages and coupons from a catalog file
    Seed(seed::SeedCommand),
}

#[tokio::main]
async fn main() {
    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            process::exit(e.exit_code());
        }
    };

    load_env_file(&opts.env_dir);
    init_tracing();

    if let Err(e) = handle_command(opts).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Load environment variables from a `.env` file in `dir`
fn load_env_file(dir: &Path) {
    let env_file_path = dir.join(".env");

    match dotenvy::from_path(&env_file_path) {
        Ok(_) => {
            eprintln!("✓ Loaded environment from {}", env_file_path.display());
        }
        Err(e) if e.not_found() => {}
        Err(e) => {
            eprintln!(
                "Warning: Failed to load .env file at {}: {}",
                env_file_path.display(),
                e
            );
        }
    }
}

/// `RUST_LOG` wins; otherwise `info`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn handle_command(opts: Opts) -> Result<(), String> {
    match opts.command {
        Command::Serve(cmd) => cmd.execute().await.map_err(|e| e.to_string()),
        Command::Seed(cmd) => cmd.execute().map_err(|e| e.to_string()),
    }
}
