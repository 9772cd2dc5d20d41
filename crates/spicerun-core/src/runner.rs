//! Simulator process orchestration
//!
//! Each run gets a fresh scratch workspace. The netlist is written there, the
//! simulator is started in batch mode with the workspace as its working
//! directory, and the run only counts as successful if the process exits
//! cleanly *and* leaves a result container behind.
//!
//! [`RunOrchestrator::start_run`] blocks. The child is supervised on a
//! private current-thread tokio runtime, so it must not be called from
//! inside another runtime.

use crate::config::SimulatorConfig;
use crate::reader::decode_text;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Prefix of every workspace directory name
pub const WORKSPACE_PREFIX: &str = "spicerun_";

/// Batch-mode flag passed before the netlist path
const BATCH_FLAG: &str = "-b";

const NO_DETAILS: &str = "No specific error message captured. Check netlist syntax.";

/// Errors that prevent a run from being attempted
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to prepare workspace at {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Why a run that was attempted did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunFailure {
    /// The simulator could not be started or waited on
    LaunchFailed,
    /// Non-zero exit; `None` when terminated by a signal
    NonZeroExit(Option<i32>),
    /// Clean exit, but no result container was written
    MissingResult,
    TimedOut,
    Cancelled,
}

/// Scratch directory owned by one run.
///
/// Removing it is explicit: see [`RunOrchestrator::cleanup`] and
/// [`cleanup_workspace`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    fn allocate(root: &Path) -> io::Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)?;
        Ok(Self { path: dir.keep() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }
}

/// File layout of one run inside its workspace
#[derive(Debug, Clone)]
pub struct SimulationRun {
    pub netlist_path: PathBuf,
    pub result_path: PathBuf,
    pub log_path: PathBuf,
    pub workspace: Workspace,
}

impl SimulationRun {
    fn new(workspace: Workspace, run_label: &str) -> Self {
        let file = |ext: &str| workspace.path().join(format!("{}.{}", run_label, ext));
        Self {
            netlist_path: file("net"),
            result_path: file("raw"),
            log_path: file("log"),
            workspace,
        }
    }
}

/// Outcome of [`RunOrchestrator::start_run`]
#[derive(Debug, Clone)]
pub struct RunResult {
    pub success: bool,
    /// Human-readable summary, or the best available failure details
    pub message: String,
    /// Result container; only set on success
    pub result_path: Option<PathBuf>,
    pub log_path: Option<PathBuf>,
    pub workspace: Workspace,
    pub exit_code: Option<i32>,
    pub failure: Option<RunFailure>,
}

/// Shared token that stops a running simulator when cancelled.
///
/// Clones share state; cancelling from any thread interrupts the run in
/// progress, and every later run on the same handle stops immediately.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Process-wait behavior
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Kill the simulator after this long; `None` waits indefinitely
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelHandle>,
}

enum ProcessOutcome {
    LaunchFailed(io::Error),
    Interrupted(RunFailure),
    Finished { status: ExitStatus, stderr: String },
}

/// Drives the external simulator and owns the current workspace.
///
/// One run at a time: starting a run removes the workspace of the previous
/// one. Use separate orchestrators for concurrent sessions.
#[derive(Debug)]
pub struct RunOrchestrator {
    scratch_root: PathBuf,
    options: RunOptions,
    current: Option<Workspace>,
}

impl Default for RunOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl RunOrchestrator {
    /// Orchestrator allocating workspaces in the system temp directory
    pub fn new() -> Self {
        Self {
            scratch_root: std::env::temp_dir(),
            options: RunOptions::default(),
            current: None,
        }
    }

    pub fn from_config(config: &SimulatorConfig) -> Self {
        let mut orchestrator = Self::new();
        if let Some(root) = &config.scratch_root {
            orchestrator.scratch_root = root.clone();
        }
        orchestrator.options.timeout = config.timeout();
        orchestrator
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn with_cancel_handle(mut self, cancel: CancelHandle) -> Self {
        self.options.cancel = Some(cancel);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Workspace of the most recent run, if not yet cleaned up
    pub fn current_workspace(&self) -> Option<&Workspace> {
        self.current.as_ref()
    }

    /// Run the simulator on `netlist`.
    ///
    /// # Errors
    /// * [`RunError::Configuration`] if `simulator` is not an executable file
    ///   or `run_label` is not a plain file stem; nothing is spawned
    /// * [`RunError::Workspace`] if the workspace or netlist cannot be written
    ///
    /// A simulator that fails, or exits cleanly without a result container,
    /// yields `Ok` with `success == false`.
    #[instrument(skip(self, netlist, simulator), fields(simulator = %simulator.display()))]
    pub fn start_run(
        &mut self,
        netlist: &str,
        simulator: &Path,
        run_label: &str,
    ) -> Result<RunResult, RunError> {
        let simulator = validate_executable(simulator)?;
        validate_label(run_label)?;

        if let Some(previous) = self.current.take() {
            debug!(path = %previous.path().display(), "Cleaning up previous workspace");
            cleanup_workspace(&previous);
        }

        let workspace =
            Workspace::allocate(&self.scratch_root).map_err(|source| RunError::Workspace {
                path: self.scratch_root.clone(),
                source,
            })?;
        let run = SimulationRun::new(workspace.clone(), run_label);

        if let Err(source) = fs::write(&run.netlist_path, netlist) {
            cleanup_workspace(&workspace);
            return Err(RunError::Workspace {
                path: run.netlist_path,
                source,
            });
        }
        self.current = Some(workspace);

        info!(
            netlist = %run.netlist_path.display(),
            workspace = %run.workspace.path().display(),
            "Running simulator"
        );
        let outcome = execute(&simulator, &run, &self.options);
        let result = finish(run, outcome);

        info!(
            success = result.success,
            exit_code = ?result.exit_code,
            failure = ?result.failure,
            "Simulator finished"
        );
        Ok(result)
    }

    /// Remove a workspace. Idempotent; errors are logged, never returned.
    pub fn cleanup(&mut self, workspace: &Workspace) {
        cleanup_workspace(workspace);
        if self.current.as_ref() == Some(workspace) {
            self.current = None;
        }
    }
}

/// Recursively remove a workspace directory, logging instead of failing.
pub fn cleanup_workspace(workspace: &Workspace) {
    match fs::remove_dir_all(workspace.path()) {
        Ok(()) => info!(path = %workspace.path().display(), "Removed workspace"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %workspace.path().display(), "Workspace already removed");
        }
        Err(e) => {
            warn!(path = %workspace.path().display(), error = %e, "Failed to remove workspace");
        }
    }
}

/// Check that `path` is an executable file and make it absolute.
fn validate_executable(path: &Path) -> Result<PathBuf, RunError> {
    let metadata = fs::metadata(path).map_err(|e| {
        RunError::Configuration(format!(
            "simulator executable not found at '{}': {}",
            path.display(),
            e
        ))
    })?;
    if !metadata.is_file() {
        return Err(RunError::Configuration(format!(
            "simulator path '{}' is not a file",
            path.display()
        )));
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(RunError::Configuration(format!(
                "simulator '{}' is not executable",
                path.display()
            )));
        }
    }
    fs::canonicalize(path).map_err(|e| {
        RunError::Configuration(format!("cannot resolve '{}': {}", path.display(), e))
    })
}

fn validate_label(label: &str) -> Result<(), RunError> {
    let plain = !label.is_empty()
        && label != "."
        && label != ".."
        && !label.contains(['/', '\\'])
        && !label.chars().any(char::is_control);
    if plain {
        Ok(())
    } else {
        Err(RunError::Configuration(format!(
            "run label '{}' must be a plain file name",
            label
        )))
    }
}

fn execute(simulator: &Path, run: &SimulationRun, options: &RunOptions) -> ProcessOutcome {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => return ProcessOutcome::LaunchFailed(e),
    };
    runtime.block_on(supervise(simulator, run, options))
}

/// Spawn the simulator and wait for it, racing the timeout and the cancel
/// handle. An interrupted child is killed when its wait future is dropped.
async fn supervise(simulator: &Path, run: &SimulationRun, options: &RunOptions) -> ProcessOutcome {
    let mut command = Command::new(simulator);
    command
        .arg(BATCH_FLAG)
        .arg(&run.netlist_path)
        .current_dir(run.workspace.path())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return ProcessOutcome::LaunchFailed(e),
    };
    let pid = child.id();

    let wait = async {
        let output = child.wait_with_output();
        match options.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| RunFailure::TimedOut),
            None => Ok(output.await),
        }
    };
    let cancelled = async {
        match &options.cancel {
            Some(handle) => handle.0.cancelled().await,
            None => std::future::pending().await,
        }
    };

    let waited = tokio::select! {
        biased;
        () = cancelled => Err(RunFailure::Cancelled),
        waited = wait => waited,
    };

    match waited {
        Ok(Ok(output)) => {
            let stdout = decode_text(&output.stdout);
            if !stdout.trim().is_empty() {
                debug!(stdout = %stdout.trim(), "Simulator output");
            }
            ProcessOutcome::Finished {
                status: output.status,
                stderr: decode_text(&output.stderr),
            }
        }
        Ok(Err(e)) => ProcessOutcome::LaunchFailed(e),
        Err(failure) => {
            warn!(pid = ?pid, ?failure, "Stopped simulator");
            ProcessOutcome::Interrupted(failure)
        }
    }
}

fn read_log(path: &Path) -> Option<String> {
    match fs::read(path) {
        Ok(bytes) => Some(decode_text(&bytes)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read log file");
            None
        }
    }
}

/// Compose the run result from the process outcome and the workspace state
fn finish(run: SimulationRun, outcome: ProcessOutcome) -> RunResult {
    let log_path = run.log_path.is_file().then(|| run.log_path.clone());

    let (exit_code, failure, message) = match outcome {
        ProcessOutcome::LaunchFailed(e) => (
            None,
            RunFailure::LaunchFailed,
            format!("Failed to run simulator: {}", e),
        ),
        ProcessOutcome::Interrupted(failure) => {
            let message = match failure {
                RunFailure::Cancelled => "Simulation cancelled.".to_string(),
                _ => "Simulation timed out and was stopped.".to_string(),
            };
            (None, failure, message)
        }
        ProcessOutcome::Finished { status, stderr } => {
            let code = status.code();
            let result_exists = run.result_path.is_file();

            if status.success() && result_exists {
                let mut message = format!(
                    "Simulation completed successfully.\nResult file: {}",
                    run.result_path.display()
                );
                if let Some(log) = &log_path {
                    message.push_str(&format!("\nLog file: {}", log.display()));
                }
                return RunResult {
                    success: true,
                    message,
                    result_path: Some(run.result_path),
                    log_path,
                    workspace: run.workspace,
                    exit_code: code,
                    failure: None,
                };
            }

            let (failure, headline) = if status.success() {
                (
                    RunFailure::MissingResult,
                    format!(
                        "Simulation exited cleanly but produced no result file ({}).",
                        run.result_path.display()
                    ),
                )
            } else {
                let code_text = code.map_or("terminated by signal".to_string(), |c| c.to_string());
                (
                    RunFailure::NonZeroExit(code),
                    format!("Simulation failed (exit code: {}).", code_text),
                )
            };

            let details = Some(stderr.trim().to_string())
                .filter(|s| !s.is_empty())
                .or_else(|| {
                    log_path
                        .as_deref()
                        .and_then(read_log)
                        .map(|log| log.trim().to_string())
                        .filter(|s| !s.is_empty())
                })
                .unwrap_or_else(|| NO_DETAILS.to_string());

            (code, failure, format!("{}\nDetails:\n{}", headline, details))
        }
    };

    RunResult {
        success: false,
        message,
        result_path: None,
        log_path,
        workspace: run.workspace,
        exit_code,
        failure: Some(failure),
    }
}
