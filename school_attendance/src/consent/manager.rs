//! Guardian consent manager.
//!
//! Every operation is read-refresh-then-act: the request is re-fetched from
//! the backend, the transition is tried on a local copy so that invalid
//! actions fail with a typed error before any write, and only then is the
//! backend asked to apply it. A stale read surfaces as a rejected or
//! already-satisfied transition; the backend's answer is authoritative.

use super::errors::{ConsentError, ConsentResult};
use super::models::{ConsentState, GuardianLinkRequest, LinkRequestId};
use crate::api::{ApiError, ConsentAction, ConsentBackend, CreateLinkRequest, with_timeout};
use crate::attendance::{StudentId, UserId};
use crate::clock::{Clock, Remaining};
use crate::notify::{CoreEvent, Notifier};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Guardian consent manager
pub struct ConsentManager {
    backend: Arc<dyn ConsentBackend>,
    clock: Arc<dyn Clock>,
    notifier: Notifier,
    request_timeout: Duration,
}

impl ConsentManager {
    pub fn new(
        backend: Arc<dyn ConsentBackend>,
        clock: Arc<dyn Clock>,
        notifier: Notifier,
        request_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            clock,
            notifier,
            request_timeout,
        }
    }

    /// Open a request to attach `new_guardian_id` to a student
    pub async fn create(
        &self,
        student_id: StudentId,
        new_guardian_id: UserId,
    ) -> ConsentResult<GuardianLinkRequest> {
        let request = with_timeout(
            self.request_timeout,
            self.backend.create_link_request(CreateLinkRequest {
                student_id,
                new_guardian_id,
            }),
        )
        .await?;

        log::info!(
            "Guardian link request {} opened for student {} ({} approvals required)",
            request.id,
            student_id,
            request.total_guardians_required
        );
        self.emit(&request);
        Ok(request)
    }

    /// Fetch a request with expiry applied
    pub async fn get(&self, request_id: LinkRequestId) -> ConsentResult<GuardianLinkRequest> {
        let mut request =
            with_timeout(self.request_timeout, self.backend.get_link_request(request_id)).await?;
        request.refresh(self.clock.now());
        Ok(request)
    }

    /// Record a guardian's approval
    ///
    /// The approver is checked against the student's current guardian set.
    /// Approving twice returns the request unchanged.
    ///
    /// # Errors
    ///
    /// * `ConsentError::NotAGuardian` - Approver is not a current guardian
    /// * `ConsentError::Expired` - Deadline passed
    /// * `ConsentError::Rejected` - Request was rejected
    /// * `ConsentError::InvalidState` - Request is past the approval stage
    pub async fn approve(
        &self,
        request_id: LinkRequestId,
        guardian_id: UserId,
    ) -> ConsentResult<GuardianLinkRequest> {
        let current = self.get(request_id).await?;
        let guardians: HashSet<UserId> = with_timeout(
            self.request_timeout,
            self.backend.list_guardians(current.student_id),
        )
        .await?
        .into_iter()
        .collect();

        let mut local = current.clone();
        match local.approve(guardian_id, &guardians, self.clock.now()) {
            Ok(true) => {}
            Ok(false) => {
                log::debug!(
                    "Guardian {} already approved request {}",
                    guardian_id,
                    request_id
                );
                return Ok(current);
            }
            Err(e) => return Err(self.rejected_transition(e, guardian_id, &current)),
        }

        let updated = with_timeout(
            self.request_timeout,
            self.backend.approve_link_request(action(request_id, guardian_id)),
        )
        .await
        .map_err(|e| self.api_error(e, request_id))?;

        log::info!(
            "Guardian {} approved request {} ({}/{}, {})",
            guardian_id,
            request_id,
            updated.approvals.len(),
            updated.total_guardians_required,
            updated.state
        );
        self.emit(&updated);
        Ok(updated)
    }

    /// Reject a request; final
    ///
    /// Eligibility (guardian or teacher of the student) is enforced by the
    /// backend; a refusal surfaces as `ConsentError::NotEligible`.
    pub async fn reject(
        &self,
        request_id: LinkRequestId,
        actor_id: UserId,
    ) -> ConsentResult<GuardianLinkRequest> {
        let current = self.get(request_id).await?;

        let mut local = current.clone();
        local
            .reject(actor_id, true, self.clock.now())
            .map_err(|e| self.rejected_transition(e, actor_id, &current))?;

        let updated = match with_timeout(
            self.request_timeout,
            self.backend.reject_link_request(action(request_id, actor_id)),
        )
        .await
        {
            Ok(updated) => updated,
            Err(ApiError::Forbidden(detail)) => {
                log::warn!(
                    "SECURITY: user {} may not reject request {}: {}",
                    actor_id,
                    request_id,
                    detail
                );
                return Err(ConsentError::NotEligible(actor_id));
            }
            Err(e) => return Err(self.api_error(e, request_id)),
        };

        log::info!("Request {} rejected by user {}", request_id, actor_id);
        self.emit(&updated);
        Ok(updated)
    }

    /// Teacher finalization; attaches the new guardian
    ///
    /// # Errors
    ///
    /// * `ConsentError::QuorumNotMet` - Not every guardian has approved
    /// * `ConsentError::NotATeacher` - Finalizer is not a teacher of the student
    /// * `ConsentError::Expired` / `ConsentError::Rejected` - Request is closed
    pub async fn finalize(
        &self,
        request_id: LinkRequestId,
        teacher_id: UserId,
    ) -> ConsentResult<GuardianLinkRequest> {
        let current = self.get(request_id).await?;

        let mut local = current.clone();
        local
            .finalize(teacher_id, true, self.clock.now())
            .map_err(|e| self.rejected_transition(e, teacher_id, &current))?;

        let updated = match with_timeout(
            self.request_timeout,
            self.backend.finalize_link_request(action(request_id, teacher_id)),
        )
        .await
        {
            Ok(updated) => updated,
            Err(ApiError::Forbidden(detail)) => {
                log::warn!(
                    "SECURITY: user {} may not finalize request {}: {}",
                    teacher_id,
                    request_id,
                    detail
                );
                return Err(ConsentError::NotATeacher(teacher_id));
            }
            Err(e) => return Err(self.api_error(e, request_id)),
        };

        log::info!(
            "Request {} finalized by teacher {}; user {} is now a guardian of student {}",
            request_id,
            teacher_id,
            updated.new_guardian_id,
            updated.student_id
        );
        self.emit(&updated);
        Ok(updated)
    }

    /// All requests of a student, expiry applied
    pub async fn list_for_student(
        &self,
        student_id: StudentId,
    ) -> ConsentResult<Vec<GuardianLinkRequest>> {
        let now = self.clock.now();
        let mut requests = with_timeout(
            self.request_timeout,
            self.backend.list_link_requests(student_id),
        )
        .await?;

        for request in &mut requests {
            request.refresh(now);
        }
        requests.sort_by_key(|r| r.id);
        Ok(requests)
    }

    /// Open requests of a student still waiting on `guardian_id`
    pub async fn pending_for_guardian(
        &self,
        guardian_id: UserId,
        student_id: StudentId,
    ) -> ConsentResult<Vec<GuardianLinkRequest>> {
        Ok(self
            .list_for_student(student_id)
            .await?
            .into_iter()
            .filter(|r| r.state == ConsentState::Pending && !r.approvals.contains(&guardian_id))
            .collect())
    }

    pub fn remaining(&self, request: &GuardianLinkRequest) -> Remaining {
        request.remaining(self.clock.now())
    }

    fn api_error(&self, err: ApiError, request_id: LinkRequestId) -> ConsentError {
        match err {
            ApiError::Expired(_) => ConsentError::Expired(request_id),
            e => e.into(),
        }
    }

    fn rejected_transition(
        &self,
        err: ConsentError,
        actor_id: UserId,
        request: &GuardianLinkRequest,
    ) -> ConsentError {
        match &err {
            ConsentError::NotAGuardian { .. } => log::warn!(
                "SECURITY: user {} tried to approve request {} for student {} without being a guardian",
                actor_id,
                request.id,
                request.student_id
            ),
            _ => log::debug!(
                "User {} cannot act on request {} ({}): {}",
                actor_id,
                request.id,
                request.state,
                err
            ),
        }
        err
    }

    fn emit(&self, request: &GuardianLinkRequest) {
        self.notifier.emit(CoreEvent::ConsentChanged {
            request_id: request.id,
            state: request.state,
        });
    }
}

fn action(request_id: LinkRequestId, actor_id: UserId) -> ConsentAction {
    ConsentAction {
        request_id,
        actor_id,
    }
}
