//! Build-and-execute runner.
//!
//! Writes a synthesized program to the scratch location, compiles it together
//! with the engine's source, runs the result with no arguments and no stdin,
//! and captures what it printed. Nothing here returns `Err`: every failure is a
//! [`RunOutcome`] variant so the caller can report it and move on.

use std::fs;
use std::io::{self, Read};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::diagnostics::{DriverError, Result};
use crate::synth::SynthesizedProgram;

pub const SOURCE_FILE_NAME: &str = "case.c";
pub const BINARY_STEM: &str = "case";

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to wait for pipe readers once the child itself is gone.
const READER_GRACE: Duration = Duration::from_secs(1);

// =============================================================================
// BUILD COMMAND
// =============================================================================

/// External compiler invocation. Arguments may contain the placeholders
/// `{source}`, `{engine}` and `{output}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for BuildCommand {
    fn default() -> Self {
        Self {
            program: "cc".to_string(),
            args: ["-O2", "-o", "{output}", "{source}", "{engine}", "-lm"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl BuildCommand {
    pub fn render_args(&self, source: &Path, engine: &Path, output: &Path) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{source}", &source.display().to_string())
                    .replace("{engine}", &engine.display().to_string())
                    .replace("{output}", &output.display().to_string())
            })
            .collect()
    }

    pub fn display(&self, source: &Path, engine: &Path, output: &Path) -> String {
        std::iter::once(self.program.clone())
            .chain(self.render_args(source, engine, output))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// =============================================================================
// SCRATCH LOCATION
// =============================================================================

/// Owner of the scratch directory. Only one [`ScratchSession`] can be live at
/// a time because opening one borrows the owner mutably.
#[derive(Debug)]
pub struct Scratch {
    dir: PathBuf,
}

impl Scratch {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| DriverError::io(dir, e))?;
        let dir = fs::canonicalize(dir).map_err(|e| DriverError::io(dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session(&mut self) -> ScratchSession<'_> {
        ScratchSession {
            source_path: self.dir.join(SOURCE_FILE_NAME),
            binary_path: self
                .dir
                .join(format!("{BINARY_STEM}{}", std::env::consts::EXE_SUFFIX)),
            _owner: PhantomData,
        }
    }
}

/// The fixed source and binary paths for one case. Both files are removed
/// when the session is dropped, whatever the outcome.
#[derive(Debug)]
pub struct ScratchSession<'a> {
    source_path: PathBuf,
    binary_path: PathBuf,
    _owner: PhantomData<&'a mut Scratch>,
}

impl ScratchSession<'_> {
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

impl Drop for ScratchSession<'_> {
    fn drop(&mut self) {
        for path in [&self.source_path, &self.binary_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => debug!(path = %path.display(), error = %e, "scratch cleanup failed"),
            }
        }
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// What the episode binary did. `exit_code` is -1 when the process was
/// killed or never produced a status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub raw_stdout: String,
    pub raw_stderr: String,
    pub exit_code: i32,
    pub succeeded: bool,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
#[error("build failed: `{command}` {}", describe_build(.exit_code))]
#[diagnostic(code(seqdrive::runner::build))]
pub struct BuildFailure {
    pub command: String,
    pub exit_code: i32,
    /// Compiler stderr followed by stdout, or the reason it never ran.
    pub diagnostics: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeFailureKind {
    NonZeroExit,
    Timeout,
    Launch,
    /// The child was spawned but could not be waited on.
    WaitFailed,
    /// Exited cleanly without printing a parseable report line.
    MissingReport,
}

impl RuntimeFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeFailureKind::NonZeroExit => "non-zero exit",
            RuntimeFailureKind::Timeout => "timeout",
            RuntimeFailureKind::Launch => "launch error",
            RuntimeFailureKind::WaitFailed => "wait failed",
            RuntimeFailureKind::MissingReport => "missing report line",
        }
    }
}

impl std::fmt::Display for RuntimeFailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, Diagnostic, PartialEq, Eq)]
#[error("episode binary failed ({kind}): {detail}")]
#[diagnostic(code(seqdrive::runner::runtime))]
pub struct RuntimeFailure {
    pub kind: RuntimeFailureKind,
    pub detail: String,
    /// Whatever was captured before the failure.
    pub result: ExecutionResult,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Executed(ExecutionResult),
    BuildFailure(BuildFailure),
    RuntimeFailure(RuntimeFailure),
}

fn describe_build(exit_code: &i32) -> String {
    if *exit_code < 0 {
        "did not run".to_string()
    } else {
        format!("exited with status {exit_code}")
    }
}

// =============================================================================
// RUNNER
// =============================================================================

#[derive(Debug, Clone)]
pub struct Runner {
    build: BuildCommand,
    engine_source: PathBuf,
    build_timeout: Duration,
    run_timeout: Duration,
}

impl Runner {
    pub fn new(
        build: BuildCommand,
        engine_source: impl Into<PathBuf>,
        build_timeout: Duration,
        run_timeout: Duration,
    ) -> Self {
        Self {
            build,
            engine_source: engine_source.into(),
            build_timeout,
            run_timeout,
        }
    }

    /// Overwrites the session's source file, builds it, and runs the binary.
    pub fn build_and_run(
        &self,
        session: &ScratchSession<'_>,
        program: &SynthesizedProgram,
    ) -> RunOutcome {
        let source = session.source_path();
        let binary = session.binary_path();
        let command = self.build.display(source, &self.engine_source, binary);

        if let Err(e) = fs::write(source, &program.source) {
            return RunOutcome::BuildFailure(BuildFailure {
                command,
                exit_code: -1,
                diagnostics: format!("cannot write {}: {e}", source.display()),
            });
        }
        // A binary left over from an earlier case must never be executed.
        let _ = fs::remove_file(binary);

        if let Err(outcome) = self.build(source, binary, command) {
            return outcome;
        }
        self.execute(binary, program.episode)
    }

    /// Compiles the episode program. A compiler that overruns its deadline is
    /// a runtime timeout, like a hanging binary; everything else that goes
    /// wrong is a [`BuildFailure`].
    fn build(&self, source: &Path, binary: &Path, command: String) -> Result<(), RunOutcome> {
        debug!(%command, "building episode program");
        let mut cmd = Command::new(&self.build.program);
        cmd.args(self.build.render_args(source, &self.engine_source, binary));

        let build_failure = |exit_code, diagnostics| {
            RunOutcome::BuildFailure(BuildFailure {
                command: command.clone(),
                exit_code,
                diagnostics,
            })
        };

        let captured = match run_captured(&mut cmd, self.build_timeout) {
            Ok(captured) => captured,
            Err(CaptureError::Spawn(e)) => {
                return Err(build_failure(
                    -1,
                    format!("cannot start compiler `{}`: {e}", self.build.program),
                ))
            }
            Err(CaptureError::Wait(e)) => {
                return Err(build_failure(
                    -1,
                    format!("waiting for compiler `{}` failed: {e}", self.build.program),
                ))
            }
        };

        if captured.timed_out {
            let timeout_ms = duration_ms(self.build_timeout);
            warn!(%command, timeout_ms, "compiler timed out");
            return Err(RunOutcome::RuntimeFailure(RuntimeFailure {
                kind: RuntimeFailureKind::Timeout,
                detail: format!("compile stage: `{command}` did not finish within {timeout_ms}ms"),
                result: ExecutionResult {
                    exit_code: captured.exit_code(),
                    succeeded: false,
                    elapsed_ms: duration_ms(captured.elapsed),
                    raw_stdout: captured.stdout,
                    raw_stderr: captured.stderr,
                },
            }));
        }
        if !captured.success() {
            return Err(build_failure(
                captured.exit_code(),
                join_streams(&captured.stderr, &captured.stdout),
            ));
        }
        if !binary.is_file() {
            return Err(build_failure(
                captured.exit_code(),
                format!(
                    "compiler reported success but {} does not exist",
                    binary.display()
                ),
            ));
        }
        Ok(())
    }

    fn execute(&self, binary: &Path, episode: u64) -> RunOutcome {
        debug!(episode, binary = %binary.display(), "running episode binary");
        let mut cmd = Command::new(binary);

        let captured = match run_captured(&mut cmd, self.run_timeout) {
            Ok(captured) => captured,
            Err(err) => {
                let (kind, detail) = match err {
                    CaptureError::Spawn(e) => (
                        RuntimeFailureKind::Launch,
                        format!("cannot start {}: {e}", binary.display()),
                    ),
                    CaptureError::Wait(e) => (
                        RuntimeFailureKind::WaitFailed,
                        format!("waiting for {} failed: {e}", binary.display()),
                    ),
                };
                return RunOutcome::RuntimeFailure(RuntimeFailure {
                    kind,
                    detail,
                    result: ExecutionResult {
                        exit_code: -1,
                        ..ExecutionResult::default()
                    },
                });
            }
        };

        let result = ExecutionResult {
            exit_code: captured.exit_code(),
            succeeded: !captured.timed_out && captured.success(),
            elapsed_ms: duration_ms(captured.elapsed),
            raw_stdout: captured.stdout,
            raw_stderr: captured.stderr,
        };

        if captured.timed_out {
            warn!(episode, timeout_ms = duration_ms(self.run_timeout), "episode binary timed out");
            return RunOutcome::RuntimeFailure(RuntimeFailure {
                kind: RuntimeFailureKind::Timeout,
                detail: format!("no exit within {}ms", duration_ms(self.run_timeout)),
                result,
            });
        }
        if !result.succeeded {
            let detail = match captured.status.and_then(|s| s.code()) {
                Some(code) => format!("exit status {code}"),
                None => "terminated by signal".to_string(),
            };
            return RunOutcome::RuntimeFailure(RuntimeFailure {
                kind: RuntimeFailureKind::NonZeroExit,
                detail,
                result,
            });
        }
        RunOutcome::Executed(result)
    }
}

// =============================================================================
// PROCESS CAPTURE
// =============================================================================

struct Captured {
    status: Option<ExitStatus>,
    timed_out: bool,
    elapsed: Duration,
    stdout: String,
    stderr: String,
}

impl Captured {
    fn success(&self) -> bool {
        self.status.is_some_and(|s| s.success())
    }

    fn exit_code(&self) -> i32 {
        self.status.and_then(|s| s.code()).unwrap_or(-1)
    }
}

#[derive(Debug)]
enum CaptureError {
    /// The process never started.
    Spawn(io::Error),
    /// It started, but polling its status failed. The child has been killed.
    Wait(io::Error),
}

/// Spawns `cmd` with null stdin and piped output, and waits at most `timeout`.
/// On expiry the child's whole process group is killed and the child reaped.
fn run_captured(cmd: &mut Command, timeout: Duration) -> Result<Captured, CaptureError> {
    let started_at = Instant::now();
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    // Own process group, so a timeout also reaches grandchildren (cc1, ld, ...)
    // that would otherwise keep the pipes open.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    let mut child = cmd.spawn().map_err(CaptureError::Spawn)?;

    let stdout = spawn_reader(child.stdout.take());
    let stderr = spawn_reader(child.stderr.take());
    let (status, timed_out) = wait_for_child(&mut child, timeout).map_err(CaptureError::Wait)?;

    Ok(Captured {
        status,
        timed_out,
        elapsed: started_at.elapsed(),
        stdout: String::from_utf8_lossy(&stdout.recv_timeout(READER_GRACE).unwrap_or_default())
            .into_owned(),
        stderr: String::from_utf8_lossy(&stderr.recv_timeout(READER_GRACE).unwrap_or_default())
            .into_owned(),
    })
}

fn spawn_reader<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

fn wait_for_child(child: &mut Child, timeout: Duration) -> io::Result<(Option<ExitStatus>, bool)> {
    let started_at = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok((Some(status), false)),
            Ok(None) => {}
            Err(e) => {
                kill_process_tree(child);
                let _ = child.wait();
                return Err(e);
            }
        }
        if started_at.elapsed() >= timeout {
            kill_process_tree(child);
            let status = child.wait().ok();
            return Ok((status, true));
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kills the child and, on unix, every process in its group.
fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Ok(pgid) = i32::try_from(child.id()) {
            if let Err(e) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                debug!(pgid, error = %e, "killpg failed");
            }
        }
    }
    let _ = child.kill();
}

fn join_streams(stderr: &str, stdout: &str) -> String {
    match (stderr.trim().is_empty(), stdout.trim().is_empty()) {
        (false, false) => format!("{}\n{}", stderr.trim_end(), stdout.trim_end()),
        (false, true) => stderr.trim_end().to_string(),
        (true, false) => stdout.trim_end().to_string(),
        (true, true) => String::new(),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
