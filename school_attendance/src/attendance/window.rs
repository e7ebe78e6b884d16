//! Attendance time windows and lateness.
//!
//! Everything here is a pure function of its inputs: no clock, no I/O.
//! Time-of-day comparisons happen in the school's local offset so a school
//! east of UTC does not see its morning window shifted into the previous day.

use super::models::{Direction, Status};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use serde::{Deserialize, Serialize};

/// Daily attendance schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub check_in_start: NaiveTime,
    pub check_in_end: NaiveTime,
    pub check_out_start: NaiveTime,
    pub check_out_end: NaiveTime,
    /// Start of the school day; check-ins after it are late
    pub school_start: NaiveTime,
    /// School-local offset from UTC
    pub utc_offset: FixedOffset,
}

impl Default for Schedule {
    /// Check-in 06:00-10:00, check-out 14:00-20:00, school starts 08:00, UTC
    fn default() -> Self {
        Self {
            check_in_start: hm(6, 0),
            check_in_end: hm(10, 0),
            check_out_start: hm(14, 0),
            check_out_end: hm(20, 0),
            school_start: hm(8, 0),
            utc_offset: Utc.fix(),
        }
    }
}

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN)
}

impl Schedule {
    /// Inclusive window bounds for a direction
    pub fn window(&self, direction: Direction) -> (NaiveTime, NaiveTime) {
        match direction {
            Direction::CheckIn => (self.check_in_start, self.check_in_end),
            Direction::CheckOut => (self.check_out_start, self.check_out_end),
        }
    }

    /// School-local calendar day of an instant
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.utc_offset).date_naive()
    }

    /// School-local time of day of an instant
    pub fn time_of(&self, at: DateTime<Utc>) -> NaiveTime {
        at.with_timezone(&self.utc_offset).time()
    }

    /// Instant at which school starts on `day`
    pub fn school_start_on(&self, day: NaiveDate) -> DateTime<Utc> {
        let local = day.and_time(self.school_start);
        let shift = Duration::seconds(i64::from(self.utc_offset.local_minus_utc()));
        (local - shift).and_utc()
    }

    /// First instant of `day` in school-local time
    pub fn start_of_day(&self, day: NaiveDate) -> DateTime<Utc> {
        let shift = Duration::seconds(i64::from(self.utc_offset.local_minus_utc()));
        (day.and_time(NaiveTime::MIN) - shift).and_utc()
    }
}

/// Result of a window check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowCheck {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl WindowCheck {
    fn open() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn closed(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Whether an attempt at `now` falls inside the window for `direction`
///
/// Both bounds are inclusive: only instants strictly before the start or
/// strictly after the end are refused.
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use school_attendance::attendance::{Direction, Schedule, validate};
///
/// let schedule = Schedule::default();
/// let early = Utc.with_ymd_and_hms(2025, 3, 10, 5, 59, 0).unwrap();
/// assert!(!validate(Direction::CheckIn, early, &schedule).allowed);
/// let open = Utc.with_ymd_and_hms(2025, 3, 10, 6, 0, 0).unwrap();
/// assert!(validate(Direction::CheckIn, open, &schedule).allowed);
/// ```
pub fn validate(direction: Direction, now: DateTime<Utc>, schedule: &Schedule) -> WindowCheck {
    let (start, end) = schedule.window(direction);
    let time = schedule.time_of(now);

    if time < start {
        return WindowCheck::closed(format!(
            "{} window opens at {}",
            label(direction),
            start.format("%H:%M")
        ));
    }
    if time > end {
        return WindowCheck::closed(format!(
            "{} window closed at {}",
            label(direction),
            end.format("%H:%M")
        ));
    }
    WindowCheck::open()
}

fn label(direction: Direction) -> &'static str {
    match direction {
        Direction::CheckIn => "Check-in",
        Direction::CheckOut => "Check-out",
    }
}

/// Whole minutes by which `check_in` is after `school_start`, never negative
pub fn late_minutes(check_in: DateTime<Utc>, school_start: DateTime<Utc>) -> u32 {
    let minutes = (check_in - school_start).num_minutes();
    u32::try_from(minutes.max(0)).unwrap_or(u32::MAX)
}

/// Whether `check_in` is at least one whole minute after `school_start`
pub fn is_late(check_in: DateTime<Utc>, school_start: DateTime<Utc>) -> bool {
    late_minutes(check_in, school_start) > 0
}

/// Status and lateness computed for a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub status: Status,
    pub late_minutes: u32,
}

/// Compute status for an event at `at`; check-outs are never late
pub fn assess(direction: Direction, at: DateTime<Utc>, schedule: &Schedule) -> Assessment {
    match direction {
        Direction::CheckOut => Assessment {
            status: Status::Present,
            late_minutes: 0,
        },
        Direction::CheckIn => {
            let start = schedule.school_start_on(schedule.day_of(at));
            let late_minutes = late_minutes(at, start);
            Assessment {
                status: if late_minutes > 0 {
                    Status::Late
                } else {
                    Status::Present
                },
                late_minutes,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn test_default_windows() {
        let schedule = Schedule::default();
        assert_eq!(schedule.window(Direction::CheckIn), (hm(6, 0), hm(10, 0)));
        assert_eq!(schedule.window(Direction::CheckOut), (hm(14, 0), hm(20, 0)));
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let schedule = Schedule::default();
        assert!(validate(Direction::CheckIn, at(6, 0), &schedule).allowed);
        assert!(validate(Direction::CheckIn, at(10, 0), &schedule).allowed);
        assert!(validate(Direction::CheckOut, at(20, 0), &schedule).allowed);
    }

    #[test]
    fn test_closed_windows_carry_reason() {
        let schedule = Schedule::default();
        let early = validate(Direction::CheckIn, at(5, 59), &schedule);
        assert!(!early.allowed);
        assert_eq!(early.reason.as_deref(), Some("Check-in window opens at 06:00"));

        let late = validate(Direction::CheckOut, at(20, 1), &schedule);
        assert!(!late.allowed);
        assert_eq!(late.reason.as_deref(), Some("Check-out window closed at 20:00"));

        assert!(!validate(Direction::CheckOut, at(12, 0), &schedule).allowed);
    }

    #[test]
    fn test_window_uses_school_offset() {
        let schedule = Schedule {
            utc_offset: FixedOffset::east_opt(3 * 3600).unwrap(),
            ..Schedule::default()
        };
        // 04:30 UTC is 07:30 local
        assert!(validate(Direction::CheckIn, at(4, 30), &schedule).allowed);
        assert!(!validate(Direction::CheckIn, at(8, 30), &schedule).allowed);
    }

    #[test]
    fn test_late_minutes() {
        assert_eq!(late_minutes(at(7, 50), at(7, 45)), 5);
        assert_eq!(late_minutes(at(7, 45), at(7, 45)), 0);
        assert_eq!(late_minutes(at(7, 30), at(7, 45)), 0);
        let seconds_late = at(7, 45) + Duration::seconds(59);
        assert_eq!(late_minutes(seconds_late, at(7, 45)), 0);
        assert!(!is_late(seconds_late, at(7, 45)));
        assert!(is_late(at(7, 46), at(7, 45)));
    }

    #[test]
    fn test_assess_check_in_late() {
        let schedule = Schedule {
            school_start: hm(7, 45),
            ..Schedule::default()
        };
        let assessment = assess(Direction::CheckIn, at(7, 50), &schedule);
        assert_eq!(assessment.status, Status::Late);
        assert_eq!(assessment.late_minutes, 5);
    }

    #[test]
    fn test_check_out_is_never_late() {
        let assessment = assess(Direction::CheckOut, at(19, 0), &Schedule::default());
        assert_eq!(assessment.status, Status::Present);
        assert_eq!(assessment.late_minutes, 0);
    }

    #[test]
    fn test_school_start_on_with_offset() {
        let schedule = Schedule {
            utc_offset: FixedOffset::west_opt(5 * 3600).unwrap(),
            ..Schedule::default()
        };
        let day = NaiveDate::from_ymd_opt(2025, 3, 10).unwrap();
        assert_eq!(schedule.school_start_on(day), at(13, 0));
        assert_eq!(schedule.start_of_day(day), at(5, 0));
    }
}
