//! Netlist → run → decode → resolve

use crate::decoder::decode;
use crate::directives::{extract, has_analysis_command, PlotDirective};
use crate::resolver::{resolve, ResolvedSelection, SignalMatch};
use crate::runner::{RunError, RunOrchestrator, RunResult};
use crate::types::{Diagnostic, WaveformTable};
use std::path::Path;
use tracing::{info, instrument, warn};

/// Everything one simulation produced
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub run: RunResult,
    pub directives: Vec<PlotDirective>,
    /// Decoded results; `None` when the run failed or decoding failed
    pub table: Option<WaveformTable>,
    pub selection: ResolvedSelection,
    pub matches: Vec<SignalMatch>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SimulationOutcome {
    pub fn success(&self) -> bool {
        self.run.success && self.table.is_some()
    }

    /// Selected traces with their samples, in selection order
    pub fn selected_traces(&self) -> impl Iterator<Item = (&str, &[f64])> {
        let table = self.table.as_ref();
        self.selection
            .iter()
            .filter_map(move |name| table?.get(name).map(|samples| (name, samples)))
    }
}

/// Run `netlist` through the simulator and resolve its plot directives.
///
/// A failed run or an undecodable result container is reported through the
/// returned outcome, not as an error.
///
/// # Errors
/// Only what [`RunOrchestrator::start_run`] refuses to attempt.
#[instrument(skip_all, fields(run_label = %run_label))]
pub fn simulate(
    orchestrator: &mut RunOrchestrator,
    netlist: &str,
    simulator: &Path,
    run_label: &str,
) -> Result<SimulationOutcome, RunError> {
    let directives = extract(netlist);
    let mut diagnostics = Vec::new();
    if !has_analysis_command(netlist) {
        warn!("Netlist has no analysis command");
        diagnostics.push(Diagnostic::NoAnalysisCommand);
    }

    let run = orchestrator.start_run(netlist, simulator, run_label)?;

    let mut outcome = SimulationOutcome {
        run,
        directives,
        table: None,
        selection: ResolvedSelection::default(),
        matches: Vec::new(),
        diagnostics,
    };

    let Some(result_path) = outcome.run.result_path.clone() else {
        return Ok(outcome);
    };

    match decode(&result_path) {
        Ok(decoded) => {
            let resolution = resolve(&outcome.directives, decoded.table.trace_names());
            outcome.diagnostics.extend(decoded.diagnostics);
            outcome.diagnostics.extend(resolution.diagnostics);
            outcome.selection = resolution.selection;
            outcome.matches = resolution.matches;
            outcome.table = Some(decoded.table);
        }
        Err(e) => {
            warn!(error = %e, "Could not decode result container");
            outcome.diagnostics.push(Diagnostic::DecodeFailed {
                reason: e.to_string(),
            });
        }
    }

    info!(
        selected = outcome.selection.len(),
        diagnostics = outcome.diagnostics.len(),
        "Simulation processed"
    );
    Ok(outcome)
}
