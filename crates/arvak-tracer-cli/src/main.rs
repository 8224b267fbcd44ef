//! Arvak Tracer Command-Line Interface
//!
//! Replays a trace program through the layering scheduler and prints the
//! resulting per-layer metrics.
//!
//! ```text
//! arvak-trace run --input teleport.yaml --separator '\t' --no-zeros
//! arvak-trace run --input program.json --format json --output report.json
//! ```

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use clap::{Parser, Subcommand};
use console::style;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::run::RunOptions;
use commands::{run, version};

/// Arvak tracer - schedule quantum operations into time layers
#[derive(Parser)]
#[command(name = "arvak-trace")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a trace program and print layer metrics
    Run {
        /// Program file (JSON or YAML)
        #[arg(short, long)]
        input: String,

        /// Tracer configuration file (JSON or YAML)
        #[arg(short, long)]
        config: Option<String>,

        /// Preferred layer duration (overrides config and environment)
        #[arg(long)]
        preferred_duration: Option<u64>,

        /// Column separator of the metrics table
        #[arg(short, long, default_value = ",")]
        separator: String,

        /// Leave missing counts empty instead of printing 0
        #[arg(long)]
        no_zeros: bool,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,

        /// Fail if the program does not release every qubit it allocates
        #[arg(long)]
        check_leaks: bool,
    },

    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Execute command
    let result = match cli.command {
        Commands::Run {
            input,
            config,
            preferred_duration,
            separator,
            no_zeros,
            format,
            output,
            check_leaks,
        } => run::execute(&RunOptions {
            input: &input,
            config: config.as_deref(),
            preferred_duration,
            separator: &separator,
            print_zero_metrics: !no_zeros,
            format: &format,
            output: output.as_deref(),
            check_leaks,
        }),

        Commands::Version => {
            version::execute();
            Ok(())
        }
    };

    // Handle errors
    if let Err(e) = result {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
