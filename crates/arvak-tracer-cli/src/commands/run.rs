//! Run command implementation.
//!
//! `arvak-trace run --input <program> [--config <file>] [--preferred-duration N] [--format table|json]`

use anyhow::{Context, Result};
use console::style;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use arvak_tracer::{LayerReport, ReplayStats, TraceProgram, Tracer, TracerConfig};

/// Options of the run command.
#[derive(Debug, Clone)]
pub struct RunOptions<'a> {
    pub input: &'a str,
    pub config: Option<&'a str>,
    pub preferred_duration: Option<u64>,
    pub separator: &'a str,
    pub print_zero_metrics: bool,
    pub format: &'a str,
    pub output: Option<&'a str>,
    pub check_leaks: bool,
}

/// Output format of the metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Table,
    Json,
}

fn parse_format(format: &str) -> Result<Format> {
    match format.to_lowercase().as_str() {
        "table" | "csv" => Ok(Format::Table),
        "json" => Ok(Format::Json),
        other => anyhow::bail!("Unknown format: '{other}'. Available: table, json"),
    }
}

/// Turn `\t` and `\n` escapes typed on the command line into the characters.
fn unescape_separator(separator: &str) -> String {
    separator.replace("\\t", "\t").replace("\\n", "\n")
}

/// Resolve the session configuration.
///
/// An explicit `--config` file wins over the configuration embedded in the
/// program. Environment overrides apply on top, and `--preferred-duration`
/// on top of everything.
fn resolve_config(
    program: &TraceProgram,
    config_path: Option<&str>,
    preferred_duration: Option<u64>,
) -> Result<TracerConfig> {
    let config = match config_path {
        Some(path) => TracerConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {path}"))?,
        None => program.config.clone().unwrap_or_default(),
    };
    let mut config = config.merge_env()?;

    if let Some(duration) = preferred_duration {
        config.preferred_layer_duration = duration;
    }
    Ok(config)
}

/// Execute the run command.
pub fn execute(options: &RunOptions<'_>) -> Result<()> {
    let format = parse_format(options.format)?;

    let path = Path::new(options.input);
    if !path.exists() {
        anyhow::bail!("File not found: {}", options.input);
    }
    let program = TraceProgram::from_file(path)
        .with_context(|| format!("Failed to load program: {}", options.input))?;
    info!("Loaded {} instruction(s) from {}", program.len(), options.input);

    let config = resolve_config(&program, options.config, options.preferred_duration)?;
    let mut tracer = Tracer::new(config);
    let stats = program
        .run(&mut tracer, options.check_leaks)
        .context("Trace failed")?;

    let rendered = match format {
        Format::Table => tracer
            .metrics()
            .render_table(&unescape_separator(options.separator), options.print_zero_metrics),
        Format::Json => {
            let mut json = tracer.report().to_json(true)?;
            json.push('\n');
            json
        }
    };

    if let Some(output_path) = options.output {
        fs::write(output_path, &rendered)
            .with_context(|| format!("Failed to write {output_path}"))?;
        eprintln!(
            "{} Metrics written to {}",
            style("OK").green().bold(),
            output_path
        );
    } else {
        print!("{rendered}");
    }

    let pending = tracer.pending_zero_duration_ops();
    if pending > 0 {
        warn!("{} zero-duration operation(s) never placed", pending);
        eprintln!(
            "{} {} zero-duration operation(s) were never followed by a real operation and are not counted",
            style("Warning:").yellow().bold(),
            pending
        );
    }

    print_summary(&tracer.report(), &stats);
    Ok(())
}

fn print_summary(report: &LayerReport, stats: &ReplayStats) {
    eprintln!();
    eprintln!("{}", style("Trace Summary").bold().underlined());
    eprintln!(
        "  Program:     {} instructions, {} qubits",
        stats.instructions, stats.qubits
    );
    eprintln!(
        "  Traced:      {} ops, {} measurements, {} barriers, {} conditionals",
        stats.operations, stats.measurements, stats.barriers, stats.conditionals
    );
    eprintln!(
        "  Layers:      {} ({} barrier), total duration {}",
        report.layers.len(),
        report.num_barriers(),
        report.total_duration()
    );
}
