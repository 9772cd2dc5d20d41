//! spicerun command-line interface.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use spicerun_core::{interpret_completion, simulate, RunOrchestrator, SimulatorConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spicerun")]
#[command(about = "Run a SPICE netlist through LTspice or ngspice and show the plotted traces", long_about = None)]
#[command(version)]
struct Cli {
    /// Netlist file, or `-` for stdin
    #[arg(value_name = "NETLIST")]
    netlist: PathBuf,

    /// Simulator executable (overrides config and environment)
    #[arg(short, long, value_name = "PATH")]
    simulator: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// File stem for the netlist, log and result files
    #[arg(short, long)]
    label: Option<String>,

    /// Stop the simulator after this many seconds
    #[arg(short, long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Parent directory for run workspaces
    #[arg(long, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,

    /// Treat the input as a model reply and extract the netlist from it
    #[arg(long)]
    reply: bool,

    /// Leave the run workspace on disk
    #[arg(long)]
    keep: bool,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(path: &Path) -> Result<String> {
    if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read netlist from stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read netlist: {}", path.display()))
}

fn load_config(cli: &Cli) -> Result<SimulatorConfig> {
    let mut config = match &cli.config {
        Some(path) => SimulatorConfig::load(path)?,
        None => SimulatorConfig::from_env()?,
    };
    if let Some(exe) = &cli.simulator {
        config.executable = Some(exe.clone());
    }
    if let Some(label) = &cli.label {
        config.run_label = label.clone();
    }
    if let Some(secs) = cli.timeout {
        config.timeout_secs = Some(secs);
    }
    if let Some(dir) = &cli.scratch_dir {
        config.scratch_root = Some(dir.clone());
    }
    Ok(config)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    tracing::info!(?config, "Resolved configuration");
    let simulator = config.executable.clone().context(
        "No simulator configured. Pass --simulator or set SPICERUN_SIMULATOR / LTSPICE_PATH",
    )?;

    let input = read_input(&cli.netlist)?;
    let netlist = if cli.reply {
        let generated = interpret_completion(&input)?;
        if let Some(summary) = &generated.summary {
            println!("{}\n", summary);
        }
        generated.netlist
    } else {
        input
    };

    let mut orchestrator = RunOrchestrator::from_config(&config);
    let outcome = simulate(&mut orchestrator, &netlist, &simulator, &config.run_label)?;

    println!("{}", outcome.run.message);
    for diagnostic in &outcome.diagnostics {
        eprintln!("warning: {}", diagnostic);
    }

    if let Some(table) = &outcome.table {
        println!(
            "\n{} traces, {} points along '{}'",
            table.len(),
            table.samples_count(),
            table.axis_name()
        );
        for (name, samples) in outcome.selected_traces() {
            let (min, max) = samples
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                });
            println!("  {:<20} {:>8} samples  [{:e}, {:e}]", name, samples.len(), min, max);
        }
    }

    if cli.keep {
        println!(
            "\nWorkspace kept at {}",
            outcome.run.workspace.path().display()
        );
    } else {
        orchestrator.cleanup(&outcome.run.workspace);
    }

    Ok(if outcome.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
