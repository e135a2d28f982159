//! Application submission core: the automation worker contract, the ledger
//! of submitted applications, and the desk that ties them to HTTP.

pub mod domain;
pub mod invoker;
pub mod ledger;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{SubmissionRequest, ValidationError};
pub use invoker::{AutomationBackend, ProcessWorker, WorkerFailure, WorkerResult};
pub use ledger::{
    CsvLedger, LedgerError, LedgerRecord, RecordError, ResultLedger, SchemaPolicy,
};
pub use router::{submission_router, SubmissionState};
pub use service::{ApplicationDesk, SubmissionError, SubmissionReceipt};
