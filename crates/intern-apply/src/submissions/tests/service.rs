use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::common::*;
use crate::submissions::domain::{SubmissionRequest, ValidationError};
use crate::submissions::invoker::{WorkerFailure, WorkerResult};
use crate::submissions::ledger::{LedgerError, ResultLedger};
use crate::submissions::service::{ApplicationDesk, SubmissionError, SubmissionReceipt};

#[tokio::test]
async fn success_returns_payload_without_touching_the_ledger() {
    let (desk, backend, ledger, _dir) = build_desk(ScriptedBackend::succeeding("applied:acme-corp"));

    let receipt = desk
        .submit_for_automation(request(), &CancellationToken::new())
        .await
        .expect("automation succeeds");

    assert_eq!(
        receipt,
        SubmissionReceipt {
            result_payload: "applied:acme-corp".to_string()
        }
    );
    assert_eq!(backend.launches(), 1);
    assert_eq!(backend.seen(), vec![request()]);
    assert!(matches!(ledger.read_all(), Err(LedgerError::NotFound)));
}

#[tokio::test]
async fn worker_failure_surfaces_message() {
    let (desk, _backend, ledger, _dir) = build_desk(ScriptedBackend::new(WorkerResult::Failure(
        WorkerFailure::Reported {
            exit_code: Some(1),
            message: "site unreachable".to_string(),
        },
    )));

    match desk
        .submit_for_automation(request(), &CancellationToken::new())
        .await
    {
        Err(SubmissionError::Worker(failure)) => {
            assert_eq!(failure.message(), "site unreachable");
        }
        other => panic!("expected worker failure, got {other:?}"),
    }
    assert!(matches!(ledger.read_all(), Err(LedgerError::NotFound)));
}

#[tokio::test]
async fn invalid_requests_never_launch_the_worker() {
    let (desk, backend, _ledger, _dir) = build_desk(ScriptedBackend::succeeding("unused"));
    let invalid = [
        (
            SubmissionRequest::new(json!(""), "Dear..."),
            ValidationError::MissingProfile,
        ),
        (
            SubmissionRequest::new(json!({}), "Dear..."),
            ValidationError::MissingProfile,
        ),
        (
            SubmissionRequest::new(json!({ "name": "A" }), ""),
            ValidationError::MissingCoverLetter,
        ),
    ];

    for (submission, expected) in invalid {
        match desk
            .submit_for_automation(submission, &CancellationToken::new())
            .await
        {
            Err(SubmissionError::Validation(err)) => assert_eq!(err, expected),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    assert_eq!(backend.launches(), 0);
}

#[tokio::test]
async fn record_then_list_round_trips() {
    let (desk, _backend, _ledger, _dir) = build_desk(ScriptedBackend::succeeding("unused"));

    assert!(matches!(
        desk.list_applications().await,
        Err(LedgerError::NotFound)
    ));

    desk.record_application(application("Web Development", "Acme"))
        .await
        .expect("record succeeds");
    desk.record_application(application("Design", "Globex"))
        .await
        .expect("record succeeds");

    let rows = desk.list_applications().await.expect("list succeeds");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows.last(), Some(&application("Design", "Globex")));
}

#[tokio::test]
async fn recording_does_not_depend_on_automation() {
    let (desk, backend, _ledger, _dir) = build_desk(ScriptedBackend::succeeding("unused"));

    desk.record_application(application("Design", "Globex"))
        .await
        .expect("record succeeds");

    assert_eq!(backend.launches(), 0);
}

#[tokio::test]
async fn submit_and_record_appends_only_on_success() {
    let (desk, _backend, ledger, _dir) = build_desk(ScriptedBackend::succeeding("applied:globex"));

    let receipt = desk
        .submit_and_record(
            request(),
            application("Design", "Globex"),
            &CancellationToken::new(),
        )
        .await
        .expect("composed call succeeds");

    assert_eq!(receipt.result_payload, "applied:globex");
    assert_eq!(
        ledger.read_all().expect("ledger written"),
        vec![application("Design", "Globex")]
    );
}

#[tokio::test]
async fn submit_and_record_leaves_ledger_alone_on_failure() {
    let (desk, _backend, ledger, _dir) = build_desk(ScriptedBackend::new(WorkerResult::Failure(
        WorkerFailure::TimedOut {
            after: std::time::Duration::from_secs(1),
        },
    )));

    let result = desk
        .submit_and_record(
            request(),
            application("Design", "Globex"),
            &CancellationToken::new(),
        )
        .await;

    assert!(matches!(result, Err(SubmissionError::Worker(_))));
    assert!(matches!(ledger.read_all(), Err(LedgerError::NotFound)));
}

#[tokio::test]
async fn ledger_failures_are_reported_not_raised() {
    let desk = ApplicationDesk::new(
        Arc::new(ScriptedBackend::succeeding("unused")),
        Arc::new(UnavailableLedger),
    );

    assert!(matches!(
        desk.record_application(application("Design", "Globex")).await,
        Err(LedgerError::Io(_))
    ));
    assert!(matches!(desk.list_applications().await, Err(LedgerError::Io(_))));
}

#[tokio::test]
async fn ledger_calls_leave_the_runtime_free() {
    let desk = ApplicationDesk::new(
        Arc::new(ScriptedBackend::succeeding("unused")),
        Arc::new(SlowLedger {
            delay: Duration::from_millis(400),
        }),
    );
    let recording = {
        let desk = desk.clone();
        tokio::spawn(async move {
            desk.record_application(application("Design", "Globex"))
                .await
        })
    };

    let started = Instant::now();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let waited = started.elapsed();

    assert!(
        waited < Duration::from_millis(300),
        "timer on the request runtime was held for {waited:?}"
    );
    recording
        .await
        .expect("task joins")
        .expect("record succeeds");
}

#[tokio::test]
async fn panicking_ledger_surfaces_as_an_error() {
    let desk = ApplicationDesk::new(
        Arc::new(ScriptedBackend::succeeding("unused")),
        Arc::new(PanickingLedger),
    );

    assert!(matches!(
        desk.record_application(application("Design", "Globex")).await,
        Err(LedgerError::Join(_))
    ));
    assert!(matches!(
        desk.list_applications().await,
        Err(LedgerError::Join(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn end_to_end_with_a_stub_worker_process() {
    let (_dir, ledger) = temp_ledger(crate::submissions::SchemaPolicy::Strict);
    let worker = Arc::new(shell_worker(
        "printf 'applied:acme-corp\\n'",
        std::time::Duration::from_secs(20),
    ));
    let desk = ApplicationDesk::new(worker, ledger.clone());

    let receipt = desk
        .submit_for_automation(request(), &CancellationToken::new())
        .await
        .expect("stub worker succeeds");
    assert_eq!(receipt.result_payload, "applied:acme-corp");
    assert!(matches!(ledger.read_all(), Err(LedgerError::NotFound)));

    let failing = ApplicationDesk::new(
        Arc::new(shell_worker(
            "echo 'site unreachable' >&2; exit 1",
            std::time::Duration::from_secs(20),
        )),
        ledger,
    );
    match failing
        .submit_for_automation(request(), &CancellationToken::new())
        .await
    {
        Err(SubmissionError::Worker(failure)) => {
            assert_eq!(failure.message(), "site unreachable")
        }
        other => panic!("expected worker failure, got {other:?}"),
    }
}
