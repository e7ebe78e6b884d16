//! In-session notification fan-out.
//!
//! The ingestion gateway and the consent manager publish here; UI layers and
//! the stats board subscribe.

use crate::attendance::{AttendanceEvent, StudentId};
use crate::consent::{ConsentState, LinkRequestId};
use tokio::sync::broadcast;

/// Default channel capacity
pub const DEFAULT_NOTIFY_CAPACITY: usize = 256;

/// Event published by the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreEvent {
    /// A new attendance record was created
    AttendanceRecorded(AttendanceEvent),
    /// A one-time code was redeemed
    OtcConsumed { student_id: StudentId },
    /// A student's QR tokens were revoked
    QrRevoked { student_id: StudentId },
    /// A guardian link request changed state or gained an approval
    ConsentChanged {
        request_id: LinkRequestId,
        state: ConsentState,
    },
}

/// Broadcast sender shared by every publisher
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<CoreEvent>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; having no subscribers is fine
    pub fn emit(&self, event: CoreEvent) {
        if self.sender.send(event).is_err() {
            log::trace!("No notification subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFY_CAPACITY)
    }
}
