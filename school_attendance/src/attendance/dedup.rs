//! Client-side duplicate guard.
//!
//! Advisory only: the backend's uniqueness constraint is authoritative, so a
//! key admitted here can still come back as a conflict.

use super::models::{Direction, StudentId};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Uniqueness key of an attendance record
pub type DedupKey = (StudentId, NaiveDate, Direction);

/// Set of keys already recorded in this session
#[derive(Debug, Default)]
pub struct DedupGuard {
    seen: Mutex<HashSet<DedupKey>>,
}

impl DedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a key; returns `false` if it was already admitted
    pub fn admit(&self, student_id: StudentId, day: NaiveDate, direction: Direction) -> bool {
        self.lock().insert((student_id, day, direction))
    }

    /// Forget a key so a failed submission can be retried
    pub fn release(&self, student_id: StudentId, day: NaiveDate, direction: Direction) {
        self.lock().remove(&(student_id, day, direction));
    }

    pub fn contains(&self, student_id: StudentId, day: NaiveDate, direction: Direction) -> bool {
        self.lock().contains(&(student_id, day, direction))
    }

    /// Drop keys of days before `today`; returns how many were dropped
    pub fn reset_day(&self, today: NaiveDate) -> usize {
        let mut seen = self.lock();
        let before = seen.len();
        seen.retain(|(_, day, _)| *day >= today);
        before - seen.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<DedupKey>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
