use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::domain::{SubmissionRequest, ValidationError};
use super::invoker::{AutomationBackend, WorkerFailure, WorkerResult};
use super::ledger::{LedgerError, LedgerRecord, ResultLedger};

/// Successful automation run as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub result_payload: String,
}

/// Service composing the automation backend and the result ledger.
///
/// Automation and recording are separate operations: a worker success does
/// not write to the ledger by itself. [`ApplicationDesk::submit_and_record`]
/// is the one place the two are tied together.
pub struct ApplicationDesk<B, L> {
    backend: Arc<B>,
    ledger: Arc<L>,
}

impl<B, L> Clone for ApplicationDesk<B, L> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            ledger: self.ledger.clone(),
        }
    }
}

impl<B, L> ApplicationDesk<B, L>
where
    B: AutomationBackend + 'static,
    L: ResultLedger + 'static,
{
    pub fn new(backend: Arc<B>, ledger: Arc<L>) -> Self {
        Self { backend, ledger }
    }

    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// Validate the request and run the worker once. Never touches the ledger.
    pub async fn submit_for_automation(
        &self,
        request: SubmissionRequest,
        cancel: &CancellationToken,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        request.validate()?;

        match self.backend.invoke(&request, cancel).await {
            WorkerResult::Success { payload } => Ok(SubmissionReceipt {
                result_payload: payload,
            }),
            WorkerResult::Failure(failure) => Err(SubmissionError::Worker(failure)),
        }
    }

    /// Append caller-supplied application data, regardless of any worker run.
    pub async fn record_application(&self, record: LedgerRecord) -> Result<(), LedgerError> {
        let columns = record.len();
        let ledger = self.ledger.clone();
        with_ledger(move || ledger.append(record))
            .await
            .map_err(|err| {
                warn!(error = %err, "failed to record application");
                err
            })?;
        info!(columns, "application recorded");
        Ok(())
    }

    pub async fn list_applications(&self) -> Result<Vec<LedgerRecord>, LedgerError> {
        let ledger = self.ledger.clone();
        with_ledger(move || ledger.read_all()).await
    }

    /// Run the worker and append `record` only when it reports success.
    pub async fn submit_and_record(
        &self,
        request: SubmissionRequest,
        record: LedgerRecord,
        cancel: &CancellationToken,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        if record.is_empty() {
            return Err(SubmissionError::Ledger(
                super::ledger::RecordError::Empty.into(),
            ));
        }
        let receipt = self.submit_for_automation(request, cancel).await?;
        self.record_application(record).await?;
        Ok(receipt)
    }
}

/// Ledger access locks and syncs the file, so it runs on the blocking pool.
async fn with_ledger<T, F>(work: F) -> Result<T, LedgerError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, LedgerError> + Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}

/// Error raised by the submission desk.
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Worker(WorkerFailure),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
