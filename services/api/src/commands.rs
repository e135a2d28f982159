use chrono::{DateTime, Local};
use clap::Args;
use intern_apply::config::AppConfig;
use intern_apply::error::AppError;
use intern_apply::submissions::{
    ApplicationDesk, LedgerRecord, ProcessWorker, SubmissionError, SubmissionRequest,
};
use intern_apply::telemetry;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::infra::open_ledger;

#[derive(Args, Debug)]
pub(crate) struct ApplyArgs {
    /// Applicant profile: a JSON document or a plain category such as "Web Development"
    #[arg(long)]
    pub(crate) profile: String,
    /// Read the cover letter from this file
    #[arg(long, conflicts_with = "cover")]
    pub(crate) cover_file: Option<PathBuf>,
    /// Cover letter text
    #[arg(long)]
    pub(crate) cover: Option<String>,
    /// Print the outcome as JSON
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct LedgerListArgs {
    /// Print one JSON object per row
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Debug, Serialize)]
struct ApplyOutcome {
    success: bool,
    started_at: DateTime<Local>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

fn parse_profile(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Runs the automation worker once from the command line. The ledger is
/// not written.
pub(crate) async fn run_apply(args: ApplyArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let cover_letter = match (args.cover_file, args.cover) {
        (Some(path), _) => tokio::fs::read_to_string(path).await?,
        (None, Some(text)) => text,
        (None, None) => String::new(),
    };
    let request = SubmissionRequest::new(parse_profile(&args.profile), cover_letter);

    let desk = ApplicationDesk::new(
        Arc::new(ProcessWorker::from_config(&config.worker)),
        open_ledger(&config),
    );

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let started_at = Local::now();
    let outcome = match desk.submit_for_automation(request, &cancel).await {
        Ok(receipt) => ApplyOutcome {
            success: true,
            started_at,
            result: Some(receipt.result_payload),
            message: None,
        },
        Err(err) => ApplyOutcome {
            success: false,
            started_at,
            result: None,
            message: Some(match &err {
                SubmissionError::Worker(failure) => failure.message(),
                other => other.to_string(),
            }),
        },
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outcome)
                .map_err(|err| AppError::Command(err.to_string()))?
        );
    } else if outcome.success {
        println!("Applications submitted ({})", started_at.format("%Y-%m-%d %H:%M"));
        if let Some(result) = &outcome.result {
            println!("{result}");
        }
    }

    match outcome.message {
        Some(message) if !outcome.success => {
            Err(AppError::Command(format!("failed to apply: {message}")))
        }
        _ => Ok(()),
    }
}

pub(crate) fn run_ledger_list(args: LedgerListArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    let ledger = open_ledger(&config);
    let rows = intern_apply::submissions::ResultLedger::read_all(ledger.as_ref())?;

    if args.json {
        for row in &rows {
            println!(
                "{}",
                serde_json::to_string(row).map_err(|err| AppError::Command(err.to_string()))?
            );
        }
        return Ok(());
    }

    println!(
        "{} submitted application(s) in {}",
        rows.len(),
        ledger.path().display()
    );
    for row in &rows {
        println!("- {}", render_row(row));
    }
    Ok(())
}

fn render_row(row: &LedgerRecord) -> String {
    row.columns()
        .map(|column| format!("{column}: {}", row.get(column).unwrap_or_default()))
        .collect::<Vec<_>>()
        .join(" | ")
}
