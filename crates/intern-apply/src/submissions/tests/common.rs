use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::submissions::domain::SubmissionRequest;
use crate::submissions::invoker::{AutomationBackend, ProcessWorker, WorkerResult};
use crate::submissions::ledger::{
    CsvLedger, LedgerError, LedgerRecord, ResultLedger, SchemaPolicy,
};
use crate::submissions::service::ApplicationDesk;

/// In-process backend returning a fixed result and counting launches.
pub(super) struct ScriptedBackend {
    result: WorkerResult,
    launches: AtomicUsize,
    seen: Mutex<Vec<SubmissionRequest>>,
}

impl ScriptedBackend {
    pub(super) fn new(result: WorkerResult) -> Self {
        Self {
            result,
            launches: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn succeeding(payload: &str) -> Self {
        Self::new(WorkerResult::Success {
            payload: payload.to_string(),
        })
    }

    pub(super) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub(super) fn seen(&self) -> Vec<SubmissionRequest> {
        self.seen.lock().expect("lock").clone()
    }
}

#[async_trait]
impl AutomationBackend for ScriptedBackend {
    async fn invoke(
        &self,
        request: &SubmissionRequest,
        _cancel: &CancellationToken,
    ) -> WorkerResult {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().expect("lock").push(request.clone());
        self.result.clone()
    }
}

/// Ledger whose storage is always offline.
pub(super) struct UnavailableLedger;

impl ResultLedger for UnavailableLedger {
    fn append(&self, _record: LedgerRecord) -> Result<(), LedgerError> {
        Err(LedgerError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }

    fn read_all(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        Err(LedgerError::Io(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "read-only filesystem",
        )))
    }
}

/// Ledger whose calls hold the calling thread for `delay`, like a slow fsync.
pub(super) struct SlowLedger {
    pub(super) delay: Duration,
}

impl ResultLedger for SlowLedger {
    fn append(&self, _record: LedgerRecord) -> Result<(), LedgerError> {
        std::thread::sleep(self.delay);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        std::thread::sleep(self.delay);
        Ok(Vec::new())
    }
}

/// Ledger that panics mid-call.
pub(super) struct PanickingLedger;

impl ResultLedger for PanickingLedger {
    fn append(&self, _record: LedgerRecord) -> Result<(), LedgerError> {
        panic!("disk vanished");
    }

    fn read_all(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        panic!("disk vanished");
    }
}

pub(super) fn request() -> SubmissionRequest {
    SubmissionRequest::new(json!({ "name": "A" }), "Dear...")
}

pub(super) fn application(title: &str, company: &str) -> LedgerRecord {
    LedgerRecord::new()
        .with("title", title)
        .with("company", company)
        .with("url", format!("/internship/detail/{}", company.to_lowercase()))
}

pub(super) fn temp_ledger(policy: SchemaPolicy) -> (TempDir, Arc<CsvLedger>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let ledger = Arc::new(CsvLedger::new(
        dir.path().join("successful_applications.csv"),
        policy,
    ));
    (dir, ledger)
}

pub(super) fn build_desk(
    backend: ScriptedBackend,
) -> (
    ApplicationDesk<ScriptedBackend, CsvLedger>,
    Arc<ScriptedBackend>,
    Arc<CsvLedger>,
    TempDir,
) {
    let backend = Arc::new(backend);
    let (dir, ledger) = temp_ledger(SchemaPolicy::Strict);
    let desk = ApplicationDesk::new(backend.clone(), ledger.clone());
    (desk, backend, ledger, dir)
}

/// Worker built from an `sh -c` script; the submission arrives as `$1`.
#[cfg(unix)]
pub(super) fn shell_worker(script: &str, timeout: Duration) -> ProcessWorker {
    ProcessWorker::new(
        "sh",
        vec!["-c".to_string(), script.to_string(), "stub-worker".to_string()],
        timeout,
    )
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
