//! QR token issue, scan, revocation and regeneration.

mod common;

use chrono::Duration;
use common::{Harness, STUDENT, at};
use school_attendance::api::InvalidReason;
use school_attendance::qr::{QrError, QrOptions, QrPayload};
use school_attendance::{CoreEvent, Direction, ErrorKind, Method};

#[tokio::test]
async fn test_scan_records_qr_check_in() {
    let harness = Harness::new(at(7, 15));
    let qr = harness.services.qr();

    let token = qr.generate(STUDENT, QrOptions::default()).await.unwrap();
    let parsed = QrPayload::parse(&token.payload, "STU").unwrap();
    assert_eq!(parsed.student_id, STUDENT);
    assert_eq!(qr.cached(STUDENT).await, Some(token.clone()));

    let validation = qr.validate(&token.payload).await.unwrap();
    assert!(validation.valid);
    assert_eq!(validation.student_id, Some(STUDENT));

    let event = qr.scan(&token.payload, Direction::CheckIn).await.unwrap();
    assert_eq!(event.method, Method::Qr);
}

#[tokio::test]
async fn test_revocation_is_final() {
    let harness = Harness::new(at(7, 15));
    let qr = harness.services.qr();
    let mut events = harness.services.subscribe();

    let token = qr
        .generate(STUDENT, QrOptions::default().expiring_at(at(23, 0)))
        .await
        .unwrap();
    qr.revoke(STUDENT).await.unwrap();
    assert_eq!(events.recv().await.unwrap(), CoreEvent::QrRevoked { student_id: STUDENT });

    let validation = qr.validate(&token.payload).await.unwrap();
    assert!(!validation.valid);
    assert_eq!(validation.reason, Some(InvalidReason::Revoked));

    let err = qr.scan(&token.payload, Direction::CheckIn).await.unwrap_err();
    assert!(matches!(err, QrError::Revoked));
    assert!(qr.cached(STUDENT).await.is_none());
    assert_eq!(harness.backend.attendance_count().await, 0);
}

#[tokio::test]
async fn test_regenerate_replaces_compromised_token() {
    let harness = Harness::new(at(7, 15));
    let qr = harness.services.qr();

    let old = qr.generate(STUDENT, QrOptions::default()).await.unwrap();
    let new = qr.regenerate(STUDENT, "photo shared online").await.unwrap();
    assert_ne!(old.payload, new.payload);
    assert_eq!(qr.cached(STUDENT).await, Some(new.clone()));

    assert!(!qr.validate(&old.payload).await.unwrap().valid);
    qr.scan(&new.payload, Direction::CheckIn).await.unwrap();
}

#[tokio::test]
async fn test_single_use_token_burns_on_scan() {
    let harness = Harness::new(at(7, 15));
    let qr = harness.services.qr();

    let token = qr.generate(STUDENT, QrOptions::single_use()).await.unwrap();
    assert!(token.single_use);
    qr.scan(&token.payload, Direction::CheckIn).await.unwrap();
    assert!(qr.cached(STUDENT).await.is_none());

    harness.clock.set(at(15, 0));
    let err = qr.scan(&token.payload, Direction::CheckOut).await.unwrap_err();
    assert!(matches!(err, QrError::AlreadyUsed));
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_garbage_scan_rejected_without_network() {
    let harness = Harness::new(at(7, 15));
    harness.backend.set_offline(true);
    let qr = harness.services.qr();

    for garbage in ["", "hello", "STU-42", "XYZ-42-abc", "STU-abc-lq2x3k9a", "STU-42-abc-def"] {
        let err = qr.validate(garbage).await.unwrap_err();
        assert!(matches!(err, QrError::InvalidFormat(_)), "{garbage:?} gave {err:?}");
    }
}

#[tokio::test]
async fn test_expired_token_cannot_be_scanned() {
    let harness = Harness::new(at(6, 30));
    let qr = harness.services.qr();
    let token = qr
        .generate(STUDENT, QrOptions::default().expiring_at(at(7, 0)))
        .await
        .unwrap();

    harness.clock.advance(Duration::minutes(45));
    let err = qr.scan(&token.payload, Direction::CheckIn).await.unwrap_err();
    assert!(matches!(err, QrError::Expired));
    assert_eq!(err.kind(), ErrorKind::Expired);
}
