//! Attestation gating tests
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

use attestation_verifier::{
    AttestationError, AttestationEvidence, AttestationPolicy, AttestationVerifier, EvidenceState,
    QuoteStatus, QuoteStatusSet,
};
use common::mock_worker::{MockListener, SimulatedWorker};
use std::{iter::FromIterator, sync::Arc};
use tcf_client::{ClientConfig, TcfClient, TransportChannel};
use tcf_utils::SigningKey;
use tests::{init_logger, ReportAuthority, TEST_BASENAME, TEST_MR_ENCLAVE};

fn verifier(authority: &ReportAuthority, statuses: Vec<QuoteStatus>) -> AttestationVerifier {
    AttestationVerifier::new(AttestationPolicy {
        acceptable_quote_statuses: QuoteStatusSet::from_iter(statuses),
        report_signing_ca_pem: Some(authority.ca_pem().to_string()),
        ..AttestationPolicy::default()
    })
}

fn client(authority: &ReportAuthority, worker: SimulatedWorker, policy: AttestationPolicy) -> (TcfClient, String) {
    let worker_id = worker.worker_id().to_string();
    let channel: Arc<dyn TransportChannel> = Arc::new(MockListener::new(worker));
    let config = ClientConfig {
        requester_id: "requester-1".to_string(),
        attestation: AttestationPolicy {
            report_signing_ca_pem: Some(authority.ca_pem().to_string()),
            ..policy
        },
        ..ClientConfig::default()
    };
    let client = TcfClient::with_jrpc_registry(config, channel, Arc::new(SigningKey::generate().unwrap()));
    (client, worker_id)
}

#[test]
fn group_out_of_date_is_trusted_only_when_allow_listed() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let evidence = authority
        .issue("GROUP_OUT_OF_DATE", TEST_MR_ENCLAVE, &[0u8; 64])
        .unwrap();

    let result = verifier(&authority, vec![]).verify(&evidence);
    assert!(!result.trusted);
    assert_eq!(result.state, EvidenceState::QuoteRejected);

    let result = verifier(&authority, vec![QuoteStatus::GroupOutOfDate]).verify(&evidence);
    assert!(result.trusted);
    assert_eq!(result.state, EvidenceState::Trusted);
    assert_eq!(result.enclave_measurement.as_bytes(), &TEST_MR_ENCLAVE);
    assert_eq!(result.enclave_basename, TEST_BASENAME.to_vec());
}

#[test]
fn evidence_from_an_untrusted_authority_is_rejected() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let rogue = ReportAuthority::new().unwrap();
    let evidence = rogue.issue("OK", TEST_MR_ENCLAVE, &[0u8; 64]).unwrap();
    let result = verifier(&authority, vec![QuoteStatus::Ok]).verify(&evidence);
    assert!(!result.trusted);
    assert_eq!(result.state, EvidenceState::SignatureRejected);
}

#[tokio::test]
async fn rejection_names_the_quote_status() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let worker = SimulatedWorker::attested(&authority, "GROUP_OUT_OF_DATE");
    let (client, worker_id) = client(&authority, worker, AttestationPolicy::default());

    let err = client.verify_worker_attestation(&worker_id).await.unwrap_err();
    match err.downcast_ref::<AttestationError>() {
        Some(AttestationError::QuoteRejected { status, .. }) => {
            assert_eq!(status, &QuoteStatus::GroupOutOfDate)
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(err
        .to_string()
        .contains("quote status GROUP_OUT_OF_DATE not in acceptable set [OK]"));
}

#[tokio::test]
async fn trusted_worker_reports_its_enclave_identity() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let worker = SimulatedWorker::attested(&authority, "OK");
    let policy = AttestationPolicy {
        expected_mr_enclave: Some(hex::encode(TEST_MR_ENCLAVE)),
        ..AttestationPolicy::default()
    };
    let (client, worker_id) = client(&authority, worker, policy);

    let (worker, result) = client.verify_worker_attestation(&worker_id).await.unwrap();
    assert!(result.trusted);
    assert_eq!(result.report_data, worker.key_binding());
}

#[tokio::test]
async fn pinned_measurement_must_match() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let worker = SimulatedWorker::attested(&authority, "OK");
    let policy = AttestationPolicy {
        expected_mr_enclave: Some(hex::encode([0u8; 32])),
        ..AttestationPolicy::default()
    };
    let (client, worker_id) = client(&authority, worker, policy);

    let err = client.verify_worker_attestation(&worker_id).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AttestationError>(),
        Some(AttestationError::MismatchError {
            variable: "mrEnclave",
            ..
        })
    ));
}

#[tokio::test]
async fn evidence_must_commit_to_the_registered_keys() {
    init_logger();
    let authority = ReportAuthority::new().unwrap();
    let mut worker = SimulatedWorker::attested(&authority, "OK");
    // Evidence lifted from another enclave.
    let other = SimulatedWorker::attested(&authority, "OK");
    worker.details_mut().proof_data = other.details().proof_data.clone();
    let (client, worker_id) = client(&authority, worker, AttestationPolicy::default());

    let err = client.verify_worker_attestation(&worker_id).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AttestationError>(),
        Some(AttestationError::MismatchError {
            variable: "reportData",
            ..
        })
    ));
}

#[tokio::test]
async fn rsa_signed_evidence_admits_the_worker() {
    init_logger();
    let authority = ReportAuthority::rsa().unwrap();
    let worker = SimulatedWorker::attested(&authority, "OK");
    let (client, worker_id) = client(&authority, worker, AttestationPolicy::default());

    let (worker, result) = client.verify_worker_attestation(&worker_id).await.unwrap();
    assert!(result.trusted);
    assert_eq!(result.state, EvidenceState::Trusted);
    assert_eq!(result.report_data, worker.key_binding());
}

#[test]
fn rsa_signed_evidence_with_an_altered_report_is_rejected() {
    init_logger();
    let authority = ReportAuthority::rsa().unwrap();
    let genuine = authority.issue("OK", TEST_MR_ENCLAVE, &[0u8; 64]).unwrap();
    let altered_report = String::from_utf8(genuine.verification_report().to_vec())
        .unwrap()
        .replace("\"version\":4", "\"version\":5");
    assert_ne!(altered_report.as_bytes(), genuine.verification_report());
    let altered = AttestationEvidence::new(
        altered_report.into_bytes(),
        genuine.report_signature().to_vec(),
        genuine.report_signing_certificate().to_vec(),
        QuoteStatus::Ok,
    );

    let verifier = verifier(&authority, vec![QuoteStatus::Ok]);
    assert!(verifier.verify(&genuine).trusted);
    let result = verifier.verify(&altered);
    assert!(!result.trusted);
    assert_eq!(result.state, EvidenceState::SignatureRejected);
}
