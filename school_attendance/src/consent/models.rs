//! Guardian consent data models and the request state machine.
//!
//! Transition graph:
//!
//! ```text
//! pending ──approve (quorum)──▶ approved ──finalize──▶ finalized
//!    │                             │
//!    ├──reject──▶ rejected ◀──reject┤
//!    └──deadline──▶ expired ◀──deadline
//! ```
//!
//! Expiry is pull-based: [`GuardianLinkRequest::effective_state`] reports
//! `Expired` once the deadline has passed, and every transition applies it
//! first.

use super::errors::{ConsentError, ConsentResult};
use crate::attendance::{StudentId, UserId};
use crate::clock::{self, Remaining};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// Guardian link request ID type
pub type LinkRequestId = i64;

/// Default lifetime of a request (24 hours)
pub const DEFAULT_CONSENT_WINDOW_HOURS: i64 = 24;

/// Lifecycle state of a guardian link request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentState {
    Pending,
    Approved,
    Rejected,
    Expired,
    Finalized,
}

impl ConsentState {
    /// Absorbing states
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConsentState::Rejected | ConsentState::Expired | ConsentState::Finalized
        )
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: ConsentState) -> bool {
        matches!(
            (self, next),
            (
                ConsentState::Pending,
                ConsentState::Approved | ConsentState::Rejected | ConsentState::Expired
            ) | (
                ConsentState::Approved,
                ConsentState::Finalized | ConsentState::Rejected | ConsentState::Expired
            )
        )
    }
}

impl std::fmt::Display for ConsentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsentState::Pending => write!(f, "pending"),
            ConsentState::Approved => write!(f, "approved"),
            ConsentState::Rejected => write!(f, "rejected"),
            ConsentState::Expired => write!(f, "expired"),
            ConsentState::Finalized => write!(f, "finalized"),
        }
    }
}

/// Request to attach a new guardian to a student
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianLinkRequest {
    pub id: LinkRequestId,
    pub student_id: StudentId,
    pub new_guardian_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub total_guardians_required: u32,
    pub approvals: BTreeSet<UserId>,
    pub state: ConsentState,
    #[serde(default)]
    pub rejected_by: Option<UserId>,
    #[serde(default)]
    pub finalized_by: Option<UserId>,
}

impl GuardianLinkRequest {
    /// Create a pending request with no approvals
    pub fn new(
        id: LinkRequestId,
        student_id: StudentId,
        new_guardian_id: UserId,
        created_at: DateTime<Utc>,
        window: Duration,
        total_guardians_required: u32,
    ) -> Self {
        Self {
            id,
            student_id,
            new_guardian_id,
            created_at,
            expires_at: created_at + window,
            total_guardians_required,
            approvals: BTreeSet::new(),
            state: ConsentState::Pending,
            rejected_by: None,
            finalized_by: None,
        }
    }

    /// State as observed at `now`, with the deadline applied
    pub fn effective_state(&self, now: DateTime<Utc>) -> ConsentState {
        match self.state {
            ConsentState::Pending | ConsentState::Approved if now > self.expires_at => {
                ConsentState::Expired
            }
            state => state,
        }
    }

    /// Materialise expiry into `state`; returns whether it changed
    pub fn refresh(&mut self, now: DateTime<Utc>) -> bool {
        let effective = self.effective_state(now);
        if effective == self.state {
            return false;
        }
        self.state = effective;
        true
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Remaining {
        clock::remaining(self.expires_at, now)
    }

    /// Record a guardian's approval
    ///
    /// `guardians` is the student's current guardian set. Approving twice is a
    /// no-op. Reaching the quorum moves the request to `Approved`. Returns
    /// whether the request changed.
    ///
    /// # Errors
    ///
    /// * `ConsentError::NotAGuardian` - Approver is not a current guardian
    /// * `ConsentError::Expired` / `ConsentError::Rejected` - Request is closed
    /// * `ConsentError::InvalidState` - Quorum already met without this guardian, or finalized
    pub fn approve(
        &mut self,
        guardian_id: UserId,
        guardians: &HashSet<UserId>,
        now: DateTime<Utc>,
    ) -> ConsentResult<bool> {
        self.refresh(now);
        match self.state {
            ConsentState::Pending => {}
            ConsentState::Approved if self.approvals.contains(&guardian_id) => return Ok(false),
            state => return Err(self.closed_error("approve", state)),
        }

        if !guardians.contains(&guardian_id) {
            return Err(ConsentError::NotAGuardian {
                guardian_id,
                student_id: self.student_id,
            });
        }

        if !self.approvals.insert(guardian_id) {
            return Ok(false);
        }

        if self.approvals.len() >= self.total_guardians_required as usize {
            self.state = ConsentState::Approved;
        }
        Ok(true)
    }

    /// Reject the request; final for any eligible actor
    pub fn reject(&mut self, actor_id: UserId, eligible: bool, now: DateTime<Utc>) -> ConsentResult<()> {
        self.refresh(now);
        match self.state {
            ConsentState::Pending | ConsentState::Approved => {}
            state => return Err(self.closed_error("reject", state)),
        }

        if !eligible {
            return Err(ConsentError::NotEligible(actor_id));
        }

        self.state = ConsentState::Rejected;
        self.rejected_by = Some(actor_id);
        Ok(())
    }

    /// Teacher finalization; only valid once every guardian approved
    pub fn finalize(
        &mut self,
        teacher_id: UserId,
        is_teacher: bool,
        now: DateTime<Utc>,
    ) -> ConsentResult<()> {
        self.refresh(now);
        match self.state {
            ConsentState::Approved => {}
            ConsentState::Pending => {
                return Err(ConsentError::QuorumNotMet {
                    approvals: self.approvals.len(),
                    required: self.total_guardians_required,
                });
            }
            state => return Err(self.closed_error("finalize", state)),
        }

        if !is_teacher {
            return Err(ConsentError::NotATeacher(teacher_id));
        }

        self.state = ConsentState::Finalized;
        self.finalized_by = Some(teacher_id);
        Ok(())
    }

    fn closed_error(&self, action: &'static str, state: ConsentState) -> ConsentError {
        match state {
            ConsentState::Expired => ConsentError::Expired(self.id),
            ConsentState::Rejected => ConsentError::Rejected(self.id),
            actual => ConsentError::InvalidState { action, actual },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn request(required: u32) -> GuardianLinkRequest {
        GuardianLinkRequest::new(1, 42, 900, t0(), Duration::hours(24), required)
    }

    fn guardians(ids: &[UserId]) -> HashSet<UserId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_new_request_is_pending_without_approvals() {
        let req = request(2);
        assert_eq!(req.state, ConsentState::Pending);
        assert!(req.approvals.is_empty());
        assert_eq!(req.expires_at, t0() + Duration::hours(24));
    }

    #[test]
    fn test_quorum_moves_to_approved() {
        let mut req = request(2);
        let set = guardians(&[10, 11]);

        assert!(req.approve(10, &set, t0()).unwrap());
        assert_eq!(req.state, ConsentState::Pending);

        assert!(req.approve(11, &set, t0()).unwrap());
        assert_eq!(req.state, ConsentState::Approved);
        assert_eq!(req.approvals.len(), 2);
    }

    #[test]
    fn test_duplicate_approval_is_noop() {
        let mut req = request(2);
        let set = guardians(&[10, 11]);
        req.approve(10, &set, t0()).unwrap();
        assert!(!req.approve(10, &set, t0()).unwrap());
        assert_eq!(req.approvals.len(), 1);
        assert_eq!(req.state, ConsentState::Pending);
    }

    #[test]
    fn test_late_duplicate_after_quorum_is_already_satisfied() {
        let mut req = request(1);
        let set = guardians(&[10, 11]);
        req.approve(10, &set, t0()).unwrap();
        assert_eq!(req.state, ConsentState::Approved);
        assert!(!req.approve(10, &set, t0()).unwrap());

        let err = req.approve(11, &set, t0()).unwrap_err();
        assert!(matches!(err, ConsentError::InvalidState { .. }));
    }

    #[test]
    fn test_non_guardian_cannot_approve() {
        let mut req = request(2);
        let err = req.approve(77, &guardians(&[10, 11]), t0()).unwrap_err();
        assert!(matches!(err, ConsentError::NotAGuardian { guardian_id: 77, .. }));
        assert!(req.approvals.is_empty());
    }

    #[test]
    fn test_finalize_requires_quorum() {
        let mut req = request(2);
        req.approve(10, &guardians(&[10, 11]), t0()).unwrap();
        let err = req.finalize(500, true, t0()).unwrap_err();
        assert!(matches!(
            err,
            ConsentError::QuorumNotMet {
                approvals: 1,
                required: 2
            }
        ));
        assert_eq!(req.state, ConsentState::Pending);
    }

    #[test]
    fn test_finalize_requires_teacher() {
        let mut req = request(1);
        req.approve(10, &guardians(&[10]), t0()).unwrap();
        let err = req.finalize(10, false, t0()).unwrap_err();
        assert!(matches!(err, ConsentError::NotATeacher(10)));
        req.finalize(500, true, t0()).unwrap();
        assert_eq!(req.state, ConsentState::Finalized);
        assert_eq!(req.finalized_by, Some(500));
    }

    #[test]
    fn test_reject_from_approved_is_final() {
        let mut req = request(1);
        req.approve(10, &guardians(&[10]), t0()).unwrap();
        req.reject(10, true, t0()).unwrap();
        assert_eq!(req.state, ConsentState::Rejected);

        let err = req.finalize(500, true, t0()).unwrap_err();
        assert!(matches!(err, ConsentError::Rejected(1)));
        let err = req.approve(10, &guardians(&[10]), t0()).unwrap_err();
        assert!(matches!(err, ConsentError::Rejected(1)));
    }

    #[test]
    fn test_expiry_on_read_without_action() {
        let req = request(2);
        let later = t0() + Duration::hours(25);
        assert_eq!(req.effective_state(later), ConsentState::Expired);
        assert_eq!(req.effective_state(t0() + Duration::hours(24)), ConsentState::Pending);
    }

    #[test]
    fn test_expired_request_rejects_transitions_as_expired() {
        let mut req = request(1);
        req.approve(10, &guardians(&[10]), t0()).unwrap();
        let later = t0() + Duration::hours(25);

        let err = req.finalize(500, true, later).unwrap_err();
        assert!(matches!(err, ConsentError::Expired(1)));
        assert_eq!(req.state, ConsentState::Expired);
    }

    #[test]
    fn test_finalized_request_does_not_expire() {
        let mut req = request(1);
        req.approve(10, &guardians(&[10]), t0()).unwrap();
        req.finalize(500, true, t0()).unwrap();
        let later = t0() + Duration::days(30);
        assert_eq!(req.effective_state(later), ConsentState::Finalized);
    }

    #[test]
    fn test_transition_graph() {
        use ConsentState::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Finalized));
        assert!(!Approved.can_transition_to(Pending));
        assert!(!Pending.can_transition_to(Finalized));
        for terminal in [Rejected, Expired, Finalized] {
            for next in [Pending, Approved, Rejected, Expired, Finalized] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }
}
