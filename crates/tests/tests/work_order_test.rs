//! End-to-end work-order tests
//!
//! Drives `TcfClient` against a simulated worker through build, submission,
//! polling and response acceptance.
//!
//! ## Authors
//!
//! The Veracruz Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE.md` file in the Veracruz root directory for
//! information on licensing and copyright.

mod common;

use attestation_verifier::AttestationPolicy;
use common::mock_worker::{MockListener, SimulatedWorker, SubmitMode};
use std::{sync::Arc, time::Duration};
use tcf_client::{
    jrpc::Method, ClientConfig, DataItem, JrpcErrorCode, TcfClient, TransportChannel,
    WorkOrderError, WorkOrderStatus,
};
use tcf_utils::{SignatureStatus, SigningKey};
use tests::{init_logger, ReportAuthority};
use tokio::sync::watch;

fn config(authority: &ReportAuthority) -> ClientConfig {
    ClientConfig {
        requester_id: "requester-1".to_string(),
        poll_interval_ms: 200,
        max_wait_ms: 10_000,
        attestation: AttestationPolicy {
            report_signing_ca_pem: Some(authority.ca_pem().to_string()),
            ..AttestationPolicy::default()
        },
        ..ClientConfig::default()
    }
}

fn client(config: ClientConfig, listener: &Arc<MockListener>) -> TcfClient {
    let channel: Arc<dyn TransportChannel> = listener.clone();
    TcfClient::with_jrpc_registry(config, channel, Arc::new(SigningKey::generate().unwrap()))
}

fn attested_listener(authority: &ReportAuthority) -> MockListener {
    MockListener::new(SimulatedWorker::attested(authority, "OK"))
}

fn work_order_error(err: &anyhow::Error) -> &WorkOrderError {
    err.downcast_ref::<WorkOrderError>()
        .unwrap_or_else(|| panic!("expected a WorkOrderError, got {:?}", err))
}

#[tokio::test(start_paused = true)]
async fn pending_once_then_result_is_decrypted() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let listener = Arc::new(attested_listener(&authority).with_progress(vec![JrpcErrorCode::Pending]));
    let client = client(config(&authority), &listener);
    let worker_id = listener.worker().worker_id().to_string();

    let mut pending = client
        .build_and_submit_work_order(&worker_id, "echo", vec![DataItem::new(0, "hello")])
        .await
        .unwrap();
    assert_eq!(pending.status(), WorkOrderStatus::Pending);

    let result = client.poll_work_order_result(&mut pending).await.unwrap();
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.item(0).unwrap().data, b"hello");
    assert_eq!(result.worker_id, worker_id);
    assert_eq!(listener.calls(Method::WorkOrderSubmit), 1);
    assert_eq!(listener.calls(Method::WorkOrderGetResult), 2);
    assert_eq!(pending.status(), WorkOrderStatus::Completed);
    assert!(!pending.machine().holds_session_key());
}

#[tokio::test(start_paused = true)]
async fn wrong_signing_key_is_rejected_before_decryption() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let listener = Arc::new(
        attested_listener(&authority)
            .with_submit_mode(SubmitMode::Synchronous)
            .with_impostor(SigningKey::generate().unwrap()),
    );
    let client = client(config(&authority), &listener);
    let worker_id = listener.worker().worker_id().to_string();

    let mut pending = client
        .build_and_submit_work_order(&worker_id, "echo", vec![DataItem::new(0, "hello")])
        .await
        .unwrap();
    let err = client.poll_work_order_result(&mut pending).await.unwrap_err();
    // The garbled payload would fail decryption; the signature check comes first.
    assert!(matches!(
        work_order_error(&err),
        WorkOrderError::InvalidSignature(SignatureStatus::Failed)
    ));
    assert!(!pending.machine().holds_session_key());
    assert_eq!(listener.calls(Method::WorkOrderGetResult), 0);
}

#[tokio::test(start_paused = true)]
async fn slow_worker_times_out() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let listener = Arc::new(
        attested_listener(&authority).with_progress(vec![JrpcErrorCode::Processing; 1000]),
    );
    let config = ClientConfig {
        poll_interval_ms: 200,
        max_wait_ms: 1000,
        ..config(&authority)
    };
    let client = client(config, &listener);
    let worker_id = listener.worker().worker_id().to_string();

    let mut pending = client
        .build_and_submit_work_order(&worker_id, "echo", vec![DataItem::new(0, "hello")])
        .await
        .unwrap();
    let err = client.poll_work_order_result(&mut pending).await.unwrap_err();
    match work_order_error(&err) {
        WorkOrderError::Timeout {
            work_order_id,
            waited_ms,
        } => {
            assert_eq!(work_order_id, pending.work_order_id());
            assert!(*waited_ms >= 1000);
        }
        other => panic!("unexpected {:?}", other),
    }
    let polls = listener.calls(Method::WorkOrderGetResult);
    assert!(polls >= 5 && polls <= 6, "{} polls", polls);
    assert_eq!(pending.status(), WorkOrderStatus::Processing);
    assert!(pending.machine().holds_session_key());
}

#[tokio::test(start_paused = true)]
async fn statuses_never_move_backwards() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let listener = Arc::new(attested_listener(&authority).with_progress(vec![
        JrpcErrorCode::Processing,
        JrpcErrorCode::Scheduled,
        JrpcErrorCode::Pending,
    ]));
    let client = client(config(&authority), &listener);
    let worker_id = listener.worker().worker_id().to_string();

    let mut pending = client
        .build_and_submit_work_order(&worker_id, "echo", vec![DataItem::new(0, "x")])
        .await
        .unwrap();
    client.poll_work_order_result(&mut pending).await.unwrap();
    assert_eq!(
        pending.machine().history(),
        &[
            WorkOrderStatus::Submitted,
            WorkOrderStatus::Pending,
            WorkOrderStatus::Processing,
            WorkOrderStatus::Completed
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn synchronous_results_need_no_polling() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let listener = Arc::new(attested_listener(&authority).with_submit_mode(SubmitMode::Synchronous));
    let client = client(config(&authority), &listener);
    let worker_id = listener.worker().worker_id().to_string();

    let mut pending = client
        .build_and_submit_work_order(
            &worker_id,
            "echo",
            vec![DataItem::new(1, "second"), DataItem::plain(0, "first")],
        )
        .await
        .unwrap();
    assert_eq!(pending.status(), WorkOrderStatus::Completed);
    let result = client.poll_work_order_result(&mut pending).await.unwrap();
    assert_eq!(result.item(0).unwrap().data, b"first");
    assert_eq!(result.item(1).unwrap().data, b"second");
    assert_eq!(listener.calls(Method::WorkOrderGetResult), 0);
}

#[tokio::test(start_paused = true)]
async fn refused_submission_is_a_typed_rejection() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let listener = Arc::new(
        attested_listener(&authority).with_submit_mode(SubmitMode::Reject(JrpcErrorCode::Busy)),
    );
    let client = client(config(&authority), &listener);
    let worker_id = listener.worker().worker_id().to_string();

    let err = client
        .build_and_submit_work_order(&worker_id, "echo", vec![DataItem::new(0, "x")])
        .await
        .err()
        .unwrap();
    assert!(matches!(
        work_order_error(&err),
        WorkOrderError::Rejected {
            code: JrpcErrorCode::Busy,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn cancelled_polling_releases_the_session() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let listener = Arc::new(
        attested_listener(&authority).with_progress(vec![JrpcErrorCode::Pending; 1000]),
    );
    let client = client(config(&authority), &listener);
    let worker_id = listener.worker().worker_id().to_string();
    let mut pending = client
        .build_and_submit_work_order(&worker_id, "echo", vec![DataItem::new(0, "x")])
        .await
        .unwrap();

    let (cancel_tx, mut cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        let _ = cancel_tx.send(true);
    });
    let err = client
        .poll_work_order_result_or_cancelled(&mut pending, &mut cancel_rx)
        .await
        .unwrap_err();
    assert!(matches!(work_order_error(&err), WorkOrderError::Cancelled(_)));
    assert!(!pending.machine().holds_session_key());
}

#[tokio::test(start_paused = true)]
async fn concurrent_work_orders_use_independent_sessions() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let listener = Arc::new(attested_listener(&authority).with_progress(vec![JrpcErrorCode::Pending]));
    let client = client(config(&authority), &listener);
    let worker_id = listener.worker().worker_id().to_string();

    let mut first = client
        .build_and_submit_work_order(&worker_id, "echo", vec![DataItem::new(0, "one")])
        .await
        .unwrap();
    let mut second = client
        .build_and_submit_work_order(&worker_id, "echo", vec![DataItem::new(0, "two")])
        .await
        .unwrap();
    assert_ne!(first.work_order_id(), second.work_order_id());
    assert_ne!(
        first.machine().params().encrypted_session_key,
        second.machine().params().encrypted_session_key
    );

    let (first, second) = tokio::join!(
        client.poll_work_order_result(&mut first),
        client.poll_work_order_result(&mut second)
    );
    assert_eq!(first.unwrap().item(0).unwrap().data, b"one");
    assert_eq!(second.unwrap().item(0).unwrap().data, b"two");
}

#[tokio::test(start_paused = true)]
async fn unattested_workers_are_refused_when_attestation_is_required() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let listener = Arc::new(MockListener::new(SimulatedWorker::new()));
    let worker_id = listener.worker().worker_id().to_string();

    let strict = client(config(&authority), &listener);
    assert!(strict
        .build_and_submit_work_order(&worker_id, "echo", vec![DataItem::new(0, "x")])
        .await
        .is_err());
    assert_eq!(listener.calls(Method::WorkOrderSubmit), 0);

    let relaxed = client(
        ClientConfig {
            require_attestation: false,
            ..config(&authority)
        },
        &listener,
    );
    let mut pending = relaxed
        .build_and_submit_work_order(&worker_id, "echo", vec![DataItem::new(0, "x")])
        .await
        .unwrap();
    assert_eq!(relaxed.poll_work_order_result(&mut pending).await.unwrap().items[0].data, b"x");
}

#[tokio::test]
async fn fetched_encryption_key_is_checked() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let listener = Arc::new(attested_listener(&authority));
    let client = client(config(&authority), &listener);
    let worker = listener.worker().details().clone();

    let refreshed = client.fetch_encryption_key(&worker).await.unwrap();
    assert_eq!(refreshed.encryption_key, worker.encryption_key);

    let mut forged = worker.clone();
    forged.verification_key = SigningKey::generate().unwrap().verifying_key();
    let err = client.fetch_encryption_key(&forged).await.unwrap_err();
    assert!(matches!(
        work_order_error(&err),
        WorkOrderError::InvalidSignature(SignatureStatus::Failed)
    ));
}
