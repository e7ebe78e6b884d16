//! One-time code generation, validation and redemption.

mod common;

use chrono::Duration;
use common::{Harness, STUDENT, at};
use school_attendance::api::InvalidReason;
use school_attendance::otc::{OtcError, OtcPurpose};
use school_attendance::{CoreEvent, Direction, ErrorKind, Method};

#[tokio::test]
async fn test_submit_records_and_evicts_cache() {
    let harness = Harness::new(at(7, 0));
    harness.backend.queue_otc_code("482913").await;
    let otc = harness.services.otc();
    let mut events = harness.services.subscribe();

    let code = otc.generate(STUDENT, Some(OtcPurpose::Attendance), None).await.unwrap();
    assert_eq!(code.formatted(), "482-913");
    assert_eq!(otc.cached(STUDENT).await, Some(code.clone()));

    let event = otc.submit("482 913", Direction::CheckIn).await.unwrap();
    assert_eq!(event.student_id, STUDENT);
    assert_eq!(event.method, Method::Otc);
    assert!(otc.cached(STUDENT).await.is_none(), "redeemed code must leave the cache");

    assert!(matches!(events.recv().await.unwrap(), CoreEvent::AttendanceRecorded(_)));
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::OtcConsumed { student_id: STUDENT }
    );
}

#[tokio::test]
async fn test_code_cannot_be_redeemed_twice() {
    let harness = Harness::new(at(15, 0));
    harness.backend.queue_otc_code("111222").await;
    let otc = harness.services.otc();

    otc.generate(STUDENT, Some(OtcPurpose::CheckOut), None).await.unwrap();
    otc.submit("111222", Direction::CheckOut).await.unwrap();

    let err = otc.submit("111222", Direction::CheckOut).await.unwrap_err();
    assert!(matches!(err, OtcError::AlreadyConsumed), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn test_wrong_code_attempts_kill_the_code() {
    let harness = Harness::new(at(7, 0));
    harness.backend.queue_otc_code("123456").await;
    let otc = harness.services.otc();
    otc.generate(STUDENT, None, None).await.unwrap();

    let mut last = None;
    for _ in 0..5 {
        last = otc.validate("000000", Some(STUDENT)).await.unwrap().reason;
    }
    assert_eq!(last, Some(InvalidReason::TooManyAttempts));

    let err = otc.submit("123456", Direction::CheckIn).await.unwrap_err();
    assert!(matches!(err, OtcError::TooManyAttempts));
    assert_eq!(err.kind(), ErrorKind::TooManyAttempts, "distinct from a wrong code");
    assert_eq!(harness.backend.attendance_count().await, 0);
}

#[tokio::test]
async fn test_malformed_code_rejected_before_network() {
    let harness = Harness::new(at(7, 0));
    harness.backend.set_offline(true);

    let err = harness.services.otc().validate("12-34", None).await.unwrap_err();
    assert!(matches!(err, OtcError::InvalidFormat(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_failed_submit_keeps_cache_for_retry() {
    let harness = Harness::new(at(5, 0));
    harness.backend.queue_otc_code("654321").await;
    let otc = harness.services.otc();
    let code = otc.generate(STUDENT, None, Some(90)).await.unwrap();

    let err = otc.submit("654321", Direction::CheckIn).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation, "check-in window not open yet: {err}");
    assert_eq!(otc.cached(STUDENT).await, Some(code));

    harness.clock.set(at(6, 5));
    otc.submit("654321", Direction::CheckIn).await.unwrap();
}

#[tokio::test]
async fn test_remaining_counts_down_to_expiry() {
    let harness = Harness::new(at(7, 0));
    let otc = harness.services.otc();
    let code = otc.generate(STUDENT, None, Some(5)).await.unwrap();

    harness.clock.advance(Duration::minutes(3));
    let left = otc.remaining(&code);
    assert_eq!(left.minutes, 2);
    assert!(!left.is_expired);

    harness.clock.advance(Duration::minutes(2));
    assert!(otc.remaining(&code).is_expired);
    assert!(otc.cached(STUDENT).await.is_none());
}
