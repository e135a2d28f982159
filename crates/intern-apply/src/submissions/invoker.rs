use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::domain::SubmissionRequest;
use crate::config::WorkerConfig;

/// Outcome of one worker run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResult {
    Success { payload: String },
    Failure(WorkerFailure),
}

/// Why a worker run did not succeed.
///
/// Every variant surfaces to callers as a plain failure message; the
/// variants exist so logs and tests can tell a broken install apart from a
/// worker that ran and gave up.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkerFailure {
    #[error("failed to launch automation worker: {message}")]
    Launch { message: String },
    #[error("{message}")]
    Reported {
        exit_code: Option<i32>,
        message: String,
    },
    #[error("automation worker timed out after {}s", .after.as_secs())]
    TimedOut { after: Duration },
    #[error("automation worker was cancelled")]
    Cancelled,
}

impl WorkerFailure {
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Launch errors, timeouts and cancellations never got a verdict from the
    /// worker itself.
    pub fn is_launch_equivalent(&self) -> bool {
        !matches!(self, WorkerFailure::Reported { .. })
    }
}

/// Capability that performs one automated submission.
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    async fn invoke(&self, request: &SubmissionRequest, cancel: &CancellationToken)
        -> WorkerResult;
}

/// Runs the external worker program as a child process.
#[derive(Debug, Clone)]
pub struct ProcessWorker {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessWorker {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone(), config.timeout)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, argument: String) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(argument)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    async fn run(&self, argument: String, cancel: &CancellationToken) -> WorkerResult {
        let mut child = match self.command(argument).spawn() {
            Ok(child) => child,
            Err(err) => {
                return WorkerResult::Failure(WorkerFailure::Launch {
                    message: format!("{}: {err}", self.program),
                })
            }
        };

        // Both pipes are drained while we wait so a chatty worker cannot
        // stall on a full pipe buffer.
        let mut stdout = child.stdout.take().map(spawn_drain);
        let mut stderr = child.stderr.take().map(spawn_drain);

        // The deadline covers the drain too: a grandchild that inherited
        // stdout keeps the pipe open after the worker itself exits.
        let outcome = {
            let finished = async {
                let status = child.wait().await;
                let out = collect(stdout.as_mut()).await;
                let err = collect(stderr.as_mut()).await;
                (status, out, err)
            };
            tokio::select! {
                finished = tokio::time::timeout(self.timeout, finished) => {
                    finished.map_err(|_| WorkerFailure::TimedOut { after: self.timeout })
                }
                _ = cancel.cancelled() => Err(WorkerFailure::Cancelled),
            }
        };

        let (status, stdout_bytes, stderr_bytes) = match outcome {
            Ok(finished) => finished,
            Err(failure) => {
                terminate(&mut child).await;
                abort_drains(stdout, stderr);
                return WorkerResult::Failure(failure);
            }
        };

        match status {
            Ok(status) => classify(status, &stdout_bytes, &stderr_bytes),
            Err(err) => {
                abort_drains(stdout, stderr);
                WorkerResult::Failure(WorkerFailure::Launch {
                    message: format!("lost track of {}: {err}", self.program),
                })
            }
        }
    }
}

#[async_trait]
impl AutomationBackend for ProcessWorker {
    async fn invoke(
        &self,
        request: &SubmissionRequest,
        cancel: &CancellationToken,
    ) -> WorkerResult {
        let argument = match request.to_worker_argument() {
            Ok(argument) => argument,
            Err(err) => {
                return WorkerResult::Failure(WorkerFailure::Launch {
                    message: format!("could not encode submission: {err}"),
                })
            }
        };

        let started = Instant::now();
        let result = self.run(argument, cancel).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            WorkerResult::Success { payload } => {
                info!(program = %self.program, elapsed_ms, payload_len = payload.len(), "automation worker succeeded");
            }
            WorkerResult::Failure(failure) => {
                warn!(program = %self.program, elapsed_ms, launch_equivalent = failure.is_launch_equivalent(), error = %failure, "automation worker failed");
            }
        }

        result
    }
}

fn classify(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> WorkerResult {
    if status.success() {
        WorkerResult::Success {
            payload: String::from_utf8_lossy(stdout).trim().to_string(),
        }
    } else {
        WorkerResult::Failure(WorkerFailure::Reported {
            exit_code: status.code(),
            message: String::from_utf8_lossy(stderr).trim().to_string(),
        })
    }
}

fn spawn_drain<R>(mut pipe: R) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buffer = Vec::new();
        // A read error only truncates the captured text.
        let _ = pipe.read_to_end(&mut buffer).await;
        buffer
    })
}

async fn collect(handle: Option<&mut JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

fn abort_drains(stdout: Option<JoinHandle<Vec<u8>>>, stderr: Option<JoinHandle<Vec<u8>>>) {
    for handle in [stdout, stderr].into_iter().flatten() {
        handle.abort();
    }
}

/// Kills the child and waits for it so no zombie is left behind. A child
/// that already exited is left alone.
async fn terminate(child: &mut Child) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }
    if let Err(err) = child.kill().await {
        warn!(error = %err, "failed to kill automation worker");
    }
}
