//! Executable lookup and cancellable child process execution.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, warn};

use super::error::AdapterError;
use crate::cancel::CancelSignal;

/// A resolved program plus the arguments that precede the adapter's own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(char::is_whitespace) {
                line.push_str(&format!("{arg:?}"));
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

/// One entry of an adapter's executable preference order.
#[derive(Debug, Clone)]
pub enum Candidate {
    /// A file under the project root, executed directly.
    Local(&'static str),
    /// A script under the project root, run through an interpreter.
    Interpreted {
        interpreter: &'static str,
        script: &'static str,
    },
    /// A command resolved from `PATH`, always accepted.
    Fallback {
        program: &'static str,
        args: &'static [&'static str],
    },
}

/// Picks the first candidate that exists under `root`.
///
/// An explicit `override_bin` wins over the candidate list.
pub fn resolve_executable(
    root: &Path,
    override_bin: Option<&Path>,
    candidates: &[Candidate],
) -> Option<Invocation> {
    if let Some(bin) = override_bin {
        return Some(Invocation::new(bin));
    }

    for candidate in candidates {
        match candidate {
            Candidate::Local(rel) => {
                let path = root.join(platform_bin(rel));
                if path.is_file() {
                    return Some(Invocation::new(path));
                }
            }
            Candidate::Interpreted { interpreter, script } => {
                let path = root.join(script);
                if path.is_file() {
                    return Some(
                        Invocation::new(*interpreter).arg(path.to_string_lossy().into_owned()),
                    );
                }
            }
            Candidate::Fallback { program, args } => {
                return Some(Invocation::new(platform_bin(program)).args(args.iter().copied()));
            }
        }
    }
    None
}

#[cfg(windows)]
fn platform_bin(name: &str) -> String {
    if name.ends_with(".cmd") || name.ends_with(".exe") || name.ends_with(".bat") {
        name.to_string()
    } else {
        format!("{name}.cmd")
    }
}

#[cfg(not(windows))]
fn platform_bin(name: &str) -> String {
    name.to_string()
}

/// Captured output of a finished process.
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

impl ProcessOutput {
    /// stdout followed by stderr.
    pub fn combined(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// How a spawned process ended.
#[derive(Debug)]
pub enum ProcessOutcome {
    Completed(ProcessOutput),
    Cancelled,
}

/// Spawns `invocation` in `cwd` and waits for exit or cancellation,
/// whichever comes first.
///
/// On cancellation the child is sent a kill request and the call returns
/// at once without waiting for it; its late output is discarded.
pub async fn run_process(
    invocation: &Invocation,
    cwd: &Path,
    cancel: &CancelSignal,
) -> Result<ProcessOutcome, AdapterError> {
    if cancel.is_cancelled() {
        return Ok(ProcessOutcome::Cancelled);
    }

    debug!(command = %invocation.display(), cwd = %cwd.display(), "spawning");
    let started = Instant::now();

    let mut child = Command::new(&invocation.program)
        .args(&invocation.args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| AdapterError::Spawn {
            program: invocation.program.display().to_string(),
            source,
        })?;

    let stdout = child.stdout.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    });
    let stderr = child.stderr.take().map(|mut pipe| {
        tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf).await;
            buf
        })
    });

    let readers: Vec<AbortHandle> = [&stdout, &stderr]
        .into_iter()
        .flatten()
        .map(|reader| reader.abort_handle())
        .collect();

    // Output is only complete once every pipe closes, which a grandchild
    // holding them can delay past the child's exit.
    let finished = async {
        let status = child.wait().await;
        (status, collect(stdout).await, collect(stderr).await)
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "failed to terminate cancelled process");
            }
            for reader in readers {
                reader.abort();
            }
            Ok(ProcessOutcome::Cancelled)
        }
        (status, stdout, stderr) = finished => {
            let status = status.map_err(|source| AdapterError::Spawn {
                program: invocation.program.display().to_string(),
                source,
            })?;
            Ok(ProcessOutcome::Completed(ProcessOutput {
                stdout,
                stderr,
                exit_code: status.code(),
                duration_ms: started.elapsed().as_millis() as u64,
            }))
        }
    }
}

async fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    match reader {
        Some(handle) => match handle.await {
            Ok(buf) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => String::new(),
        },
        None => String::new(),
    }
}
