use std::sync::Arc;

use uuid::Uuid;

use ridepool_auth::domain::keys;
use ridepool_auth::domain::repository::EphemeralStore;
use ridepool_auth::domain::types::{OtcPolicy, OtcVerification, SecurityEventType};
use ridepool_auth::error::AuthServiceError;
use ridepool_domain::channel::Channel;

use crate::helpers::{MockAuditLog, MockStore, otc_manager, phone};

/// A six-digit code guaranteed to differ from `code`.
fn wrong(code: &str) -> String {
    if code == "000000" { "111111" } else { "000000" }.to_owned()
}

#[tokio::test]
async fn should_verify_issued_code_once() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());

    let issued = otc.issue(&phone()).await.unwrap();
    assert_eq!(issued.code.len(), 6);

    let first = otc.verify(&phone(), &issued.code).await.unwrap();
    assert_eq!(first, OtcVerification::Verified);

    let second = otc.verify(&phone(), &issued.code).await;
    assert!(
        matches!(second, Err(AuthServiceError::OtcAlreadyUsed)),
        "expected OtcAlreadyUsed, got {second:?}"
    );
}

#[tokio::test]
async fn should_refuse_code_whose_consumption_was_already_claimed() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());
    let issued = otc.issue(&phone()).await.unwrap();
    let raw = store.raw(&keys::otc(&phone())).unwrap();
    let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let issue_id: Uuid = record["issue_id"].as_str().unwrap().parse().unwrap();

    // A concurrent verification got there first.
    assert!(store
        .set_nx_ex(&keys::otc_consumed(&phone(), issue_id), "claimed", 300)
        .await
        .unwrap());

    let result = otc.verify(&phone(), &issued.code).await;
    assert!(
        matches!(result, Err(AuthServiceError::OtcAlreadyUsed)),
        "expected OtcAlreadyUsed, got {result:?}"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_verify_exactly_once_under_concurrent_submissions() {
    let store = MockStore::new();
    let otc = Arc::new(otc_manager(&store, &MockAuditLog::default()));
    let code = otc.issue(&phone()).await.unwrap().code;

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let otc = Arc::clone(&otc);
            let code = code.clone();
            tokio::spawn(async move { otc.verify(&phone(), &code).await })
        })
        .collect();
    let mut verified = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(OtcVerification::Verified) => verified += 1,
            Err(AuthServiceError::OtcAlreadyUsed) => {}
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    assert_eq!(verified, 1);
    assert!(!otc.has_valid_code(&phone()).await.unwrap());
}

#[tokio::test]
async fn should_accept_code_reissued_after_a_consumed_one() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());
    let first = otc.issue(&phone()).await.unwrap();
    assert_eq!(
        otc.verify(&phone(), &first.code).await.unwrap(),
        OtcVerification::Verified
    );

    let second = otc.issue(&phone()).await.unwrap();

    assert_eq!(
        otc.verify(&phone(), &second.code).await.unwrap(),
        OtcVerification::Verified
    );
}

#[tokio::test]
async fn should_count_down_attempts_and_discard_code_when_exhausted() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());
    let issued = otc.issue(&phone()).await.unwrap();
    let bad = wrong(&issued.code);

    for expected in [2, 1, 0] {
        let outcome = otc.verify(&phone(), &bad).await.unwrap();
        assert_eq!(
            outcome,
            OtcVerification::Rejected {
                remaining_attempts: expected
            }
        );
    }

    // Even the right code is useless now.
    let after = otc.verify(&phone(), &issued.code).await;
    assert!(
        matches!(after, Err(AuthServiceError::OtcNotFound)),
        "expected OtcNotFound, got {after:?}"
    );
    assert!(store.raw(&keys::otc(&phone())).is_none());
}

#[tokio::test]
async fn should_accept_correct_code_after_a_wrong_one() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());
    let issued = otc.issue(&phone()).await.unwrap();

    let rejected = otc.verify(&phone(), &wrong(&issued.code)).await.unwrap();
    assert_eq!(
        rejected,
        OtcVerification::Rejected {
            remaining_attempts: 2
        }
    );
    assert_eq!(otc.remaining_attempts(&phone()).await.unwrap(), Some(2));

    let accepted = otc.verify(&phone(), &issued.code).await.unwrap();
    assert_eq!(accepted, OtcVerification::Verified);
}

#[tokio::test]
async fn should_reset_attempts_when_code_is_reissued() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());
    let first = otc.issue(&phone()).await.unwrap();
    otc.verify(&phone(), &wrong(&first.code)).await.unwrap();

    let second = otc.issue(&phone()).await.unwrap();

    assert_eq!(otc.remaining_attempts(&phone()).await.unwrap(), Some(3));
    assert_eq!(
        otc.verify(&phone(), &second.code).await.unwrap(),
        OtcVerification::Verified
    );
}

#[tokio::test]
async fn should_report_not_found_once_store_expired_the_code() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());
    let issued = otc.issue(&phone()).await.unwrap();
    assert_eq!(store.ttl_of(&keys::otc(&phone())), Some(300));

    store.expire_now(&keys::otc(&phone()));

    let result = otc.verify(&phone(), &issued.code).await;
    assert!(
        matches!(result, Err(AuthServiceError::OtcNotFound)),
        "expected OtcNotFound, got {result:?}"
    );
    assert!(!otc.has_valid_code(&phone()).await.unwrap());
}

#[tokio::test]
async fn should_reject_code_past_its_expiry_and_delete_it() {
    let store = MockStore::new();
    let mut otc = otc_manager(&store, &MockAuditLog::default());
    otc.policy = OtcPolicy {
        ttl_secs: 0,
        ..OtcPolicy::default()
    };
    let issued = otc.issue(&phone()).await.unwrap();

    let result = otc.verify(&phone(), &issued.code).await;

    assert!(
        matches!(result, Err(AuthServiceError::OtcExpired)),
        "expected OtcExpired, got {result:?}"
    );
    assert!(store.raw(&keys::otc(&phone())).is_none());
}

#[tokio::test]
async fn should_refuse_issuance_beyond_hourly_ceiling() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());

    for _ in 0..5 {
        otc.issue(&phone()).await.unwrap();
    }
    let sixth = otc.issue(&phone()).await;

    assert!(
        matches!(sixth, Err(AuthServiceError::RateLimitExceeded)),
        "expected RateLimitExceeded, got {sixth:?}"
    );
    assert_eq!(store.ttl_of(&keys::otc_issued(&phone())), Some(3600));

    // Refused requests do not count as issued.
    assert!(otc.issue(&phone()).await.is_err());
    assert_eq!(store.raw(&keys::otc_issued(&phone())).as_deref(), Some("5"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_issue_exactly_ceiling_under_concurrent_requests() {
    let store = MockStore::new();
    let otc = Arc::new(otc_manager(&store, &MockAuditLog::default()));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let otc = Arc::clone(&otc);
            tokio::spawn(async move { otc.issue(&phone()).await.is_ok() })
        })
        .collect();
    let mut issued = 0;
    for handle in handles {
        if handle.await.unwrap() {
            issued += 1;
        }
    }

    assert_eq!(issued, 5);
    assert_eq!(store.raw(&keys::otc_issued(&phone())).as_deref(), Some("5"));
}

#[tokio::test]
async fn should_reject_malformed_candidate_without_spending_an_attempt() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());
    otc.issue(&phone()).await.unwrap();

    for candidate in ["12ab56", "12345", "1234567", ""] {
        let result = otc.verify(&phone(), candidate).await;
        assert!(
            matches!(result, Err(AuthServiceError::Validation(_))),
            "expected Validation for {candidate:?}, got {result:?}"
        );
    }
    assert_eq!(otc.remaining_attempts(&phone()).await.unwrap(), Some(3));
}

#[tokio::test]
async fn should_store_only_a_hash_of_the_code() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());
    let issued = otc.issue(&phone()).await.unwrap();

    let raw = store.raw(&keys::otc(&phone())).unwrap();
    let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let object = record.as_object().unwrap();
    assert!(object.values().all(|v| v.as_str() != Some(issued.code.as_str())));
    assert!(object.contains_key("code_hash"));
}

#[tokio::test]
async fn should_keep_channels_apart() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());
    let issued = otc.issue(&phone()).await.unwrap();
    let email = Channel::email("rider@corp.example").unwrap();

    let result = otc.verify(&email, &issued.code).await;

    assert!(
        matches!(result, Err(AuthServiceError::OtcNotFound)),
        "expected OtcNotFound, got {result:?}"
    );
    assert!(otc.has_valid_code(&phone()).await.unwrap());
}

#[tokio::test]
async fn should_surface_store_outage_on_issue() {
    let store = MockStore::new();
    let otc = otc_manager(&store, &MockAuditLog::default());
    store.set_down(true);

    let result = otc.issue(&phone()).await;

    assert!(
        matches!(result, Err(AuthServiceError::StoreUnavailable(_))),
        "expected StoreUnavailable, got {result:?}"
    );
}

#[tokio::test]
async fn should_audit_issuance_and_failures_with_masked_identifier() {
    let store = MockStore::new();
    let audit = MockAuditLog::default();
    let otc = otc_manager(&store, &audit);
    let issued = otc.issue(&phone()).await.unwrap();
    otc.verify(&phone(), &wrong(&issued.code)).await.unwrap();

    assert_eq!(audit.count(SecurityEventType::OtcIssued), 1);
    let failure = audit.last(SecurityEventType::OtcFailure).unwrap();
    assert_eq!(failure.identifier.as_deref(), Some("****4567"));
}
