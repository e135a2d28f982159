use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use intern_apply::accounts::{FileAccountStore, SessionStore};
use intern_apply::config::AppConfig;
use intern_apply::error::AppError;
use intern_apply::submissions::{ApplicationDesk, CsvLedger, ProcessWorker};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type Desk = ApplicationDesk<ProcessWorker, CsvLedger>;

/// Long-lived services shared by every request.
pub(crate) struct Components {
    pub(crate) desk: Desk,
    pub(crate) accounts: Arc<FileAccountStore>,
    pub(crate) sessions: Arc<SessionStore>,
}

impl Components {
    /// Builds the serving components. The ledger is cut back to its header
    /// here, before any request can reach it.
    pub(crate) fn for_serving(config: &AppConfig) -> Result<Self, AppError> {
        let ledger = open_ledger(config);
        ledger.reset_keeping_schema()?;

        let worker = Arc::new(ProcessWorker::from_config(&config.worker));
        info!(
            program = worker.program(),
            timeout_secs = config.worker.timeout.as_secs(),
            "automation worker configured"
        );

        let accounts = Arc::new(FileAccountStore::open(
            &config.accounts.path,
            config.accounts.bcrypt_cost,
        )?);
        let sessions = Arc::new(SessionStore::new(config.accounts.session_ttl));

        Ok(Self {
            desk: ApplicationDesk::new(worker, ledger),
            accounts,
            sessions,
        })
    }
}

pub(crate) fn open_ledger(config: &AppConfig) -> Arc<CsvLedger> {
    Arc::new(CsvLedger::new(
        &config.ledger.path,
        config.ledger.schema_policy,
    ))
}
