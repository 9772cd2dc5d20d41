//! # spicerun - Batch SPICE Simulation Core
//!
//! Runs a netlist through an external SPICE simulator (LTspice, ngspice) in
//! batch mode, decodes the resulting raw waveform container, and works out
//! which traces the netlist's `.plot` directives asked for.
//!
//! ## Supported Formats
//!
//! - LTspice raw (UTF-16LE header, f32/f64 binary, fastaccess layout)
//! - SPICE3/ngspice raw (binary and ASCII)
//!
//! ## Features
//!
//! - Per-run scratch workspaces with explicit cleanup
//! - Timeout and cancellation for runaway simulators
//! - Memory-mapped decoding with truncation diagnostics instead of failures
//! - Tiered, case-insensitive plot directive resolution
//! - Structured logging via `tracing`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spicerun_core::{simulate, RunOrchestrator};
//! use std::path::Path;
//!
//! let netlist = "* divider\nV1 1 0 5\nR1 1 2 1k\nR2 2 0 1k\n.op\n.plot V(2)\n.end\n";
//! let mut orchestrator = RunOrchestrator::new();
//! let outcome = simulate(&mut orchestrator, netlist, Path::new("/usr/bin/ngspice"), "circuit")?;
//!
//! println!("{}", outcome.run.message);
//! for (name, samples) in outcome.selected_traces() {
//!     println!("{}: {} points", name, samples.len());
//! }
//! orchestrator.cleanup(&outcome.run.workspace);
//! # Ok::<(), spicerun_core::RunError>(())
//! ```
//!
//! ## Decoding Only
//!
//! ```rust,no_run
//! use spicerun_core::{decode, extract, resolve};
//!
//! let decoded = decode("circuit.raw")?;
//! let directives = extract(".plot tran V(out)");
//! let resolution = resolve(&directives, decoded.table.trace_names());
//! for name in resolution.selection.iter() {
//!     println!("{}", name);
//! }
//! # Ok::<(), spicerun_core::DecodeError>(())
//! ```
//!
//! ## Enabling Logging
//!
//! This library uses `tracing` for structured logging. To see log output,
//! initialize a tracing subscriber in your application:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```

mod config;
mod decoder;
mod directives;
mod generation;
mod pipeline;
mod raw_parser;
mod reader;
mod resolver;
mod runner;
mod types;
mod writer;

pub use types::{
    AnalysisType, DecodeError, Diagnostic, RawContainer, RawFlags, Result, VarType, Variable,
    VectorData, WaveformTable, TIME_AXIS,
};

pub use config::{
    ConfigError, SimulatorConfig, DEFAULT_RUN_LABEL, ENV_LTSPICE_PATH, ENV_SCRATCH_DIR,
    ENV_SIMULATOR, ENV_TIMEOUT_SECS,
};
pub use decoder::{decode, decode_container, Decoded};
pub use directives::{extract, has_analysis_command, split_canonical, PlotDirective};
pub use generation::{interpret_completion, GeneratedNetlist, GenerationError, MODEL_EXPIRED_PREFIX};
pub use pipeline::{simulate, SimulationOutcome};
pub use raw_parser::{parse_raw, read_raw};
pub use reader::{decode_text, TextEncoding};
pub use resolver::{resolve, MatchTier, Resolution, ResolvedSelection, SignalMatch};
pub use runner::{
    cleanup_workspace, CancelHandle, RunError, RunFailure, RunOptions, RunOrchestrator, RunResult,
    SimulationRun, Workspace, WORKSPACE_PREFIX,
};
pub use writer::{write_raw, WriteOptions};
