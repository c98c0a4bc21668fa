//! BlockWarden CLI
//!
//! Operational tool for envelope-framed engine blobs and session traces.

use std::path::Path;

use clap::{Parser, Subcommand};

use bw_engine::envelope;

mod fetch;
mod simulate;

use fetch::{run_fetch, FetchOptions};
use simulate::{run_simulate, SimulateOptions};

#[derive(Parser)]
#[command(name = "bw-cli")]
#[command(about = "BlockWarden engine blob and session tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a pre-built engine blob via a CDN config document
    Fetch {
        /// URL of the CDN config JSON
        #[arg(short, long)]
        config_url: String,

        /// Output blob file
        #[arg(short, long, default_value = "engine.bin")]
        output: String,
    },

    /// Validate an envelope-framed engine blob
    Inspect {
        /// Blob file to inspect
        #[arg(short, long)]
        input: String,
    },

    /// Replay a host-event trace through a session with the stub engine
    Simulate {
        /// Trace file (JSON)
        #[arg(short, long)]
        trace: String,

        /// Print each request's verdict
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Fetch { config_url, output } => run_fetch(FetchOptions { config_url, output }),
        Commands::Inspect { input } => cmd_inspect(&input),
        Commands::Simulate { trace, verbose } => run_simulate(SimulateOptions {
            trace_path: trace,
            verbose,
        }),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_inspect(input: &str) -> Result<(), String> {
    let blob = fetch::read_blob(Path::new(input))?;

    let payload = envelope::open(&blob).map_err(|e| format!("Invalid blob: {}", e))?;

    println!("Blob '{}' is valid", input);
    println!("  Magic:       BWE1");
    println!("  Version:     {}", envelope::ENVELOPE_VERSION);
    println!("  Total size:  {} bytes ({:.1} KB)", blob.len(), blob.len() as f64 / 1024.0);
    println!("  Payload:     {} bytes", payload.len());

    Ok(())
}
