//! Dashboard statistics derived from attendance events.
//!
//! The free functions are pure: they depend only on the event list and the
//! `today` / offset arguments. [`StatsBoard`] is the in-session projection the
//! ingestion gateway feeds after each successful capture.

use super::models::{AttendanceEvent, Direction, Method, Status, StudentId};
use chrono::{Days, Duration, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Status counts over check-in records
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    /// `(present + late) / total`, percent, one decimal
    pub percentage: f64,
}

impl Summary {
    fn add(&mut self, status: Status) {
        self.total += 1;
        match status {
            Status::Present => self.present += 1,
            Status::Late => self.late += 1,
            Status::Absent => self.absent += 1,
            Status::Excused => self.excused += 1,
        }
    }

    fn finish(mut self) -> Self {
        self.percentage = percent(self.present + self.late, self.total);
        self
    }
}

/// Per-day bucket of a trend series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayBucket {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub summary: Summary,
}

/// Usage count of one capture method
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodUsage {
    pub method: Method,
    pub count: usize,
    pub percentage: f64,
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = part as f64 / total as f64 * 100.0;
    (raw * 10.0).round() / 10.0
}

fn check_ins(events: &[AttendanceEvent]) -> impl Iterator<Item = &AttendanceEvent> {
    events.iter().filter(|e| e.direction == Direction::CheckIn)
}

/// Status counts over the check-in records of `events`
pub fn summary(events: &[AttendanceEvent]) -> Summary {
    let mut summary = Summary::default();
    for event in check_ins(events) {
        summary.add(event.status);
    }
    summary.finish()
}

/// Consecutive attended days ending today (or yesterday, if today has no
/// check-in yet), stopping at the first missing or non-attended day
pub fn streak(events: &[AttendanceEvent], today: NaiveDate, offset: FixedOffset) -> u32 {
    let by_day: HashMap<NaiveDate, Status> = check_ins(events)
        .map(|e| (e.day(offset), e.status))
        .collect();

    let mut day = if by_day.contains_key(&today) {
        today
    } else {
        today - Duration::days(1)
    };

    let mut count = 0;
    while by_day.get(&day).is_some_and(|status| status.attended()) {
        count += 1;
        day -= Duration::days(1);
    }
    count
}

/// Longest trend a dashboard asks for
pub const MAX_TREND_DAYS: u32 = 366;

/// One bucket per day for the last `days` days, oldest first, today last
///
/// `days` is clamped to [`MAX_TREND_DAYS`].
pub fn trends(
    events: &[AttendanceEvent],
    days: u32,
    today: NaiveDate,
    offset: FixedOffset,
) -> Vec<DayBucket> {
    if days == 0 {
        return Vec::new();
    }
    let days = days.min(MAX_TREND_DAYS);
    let first = today
        .checked_sub_days(Days::new(u64::from(days - 1)))
        .unwrap_or(NaiveDate::MIN);

    let mut buckets: BTreeMap<NaiveDate, Summary> = first
        .iter_days()
        .take(days as usize)
        .map(|date| (date, Summary::default()))
        .collect();

    for event in check_ins(events) {
        if let Some(bucket) = buckets.get_mut(&event.day(offset)) {
            bucket.add(event.status);
        }
    }

    buckets
        .into_iter()
        .map(|(date, summary)| DayBucket {
            date,
            summary: summary.finish(),
        })
        .collect()
}

/// Count and share of every method, in declaration order
pub fn method_breakdown(events: &[AttendanceEvent]) -> Vec<MethodUsage> {
    let mut counts: HashMap<Method, usize> = HashMap::new();
    for event in events {
        *counts.entry(event.method).or_default() += 1;
    }

    Method::ALL
        .iter()
        .map(|&method| {
            let count = counts.get(&method).copied().unwrap_or(0);
            MethodUsage {
                method,
                count,
                percentage: percent(count, events.len()),
            }
        })
        .collect()
}

/// Most frequent capture method; ties go to the earlier method in
/// declaration order
pub fn most_used_method(events: &[AttendanceEvent]) -> Option<MethodUsage> {
    method_breakdown(events)
        .into_iter()
        .filter(|usage| usage.count > 0)
        .fold(None, |best: Option<MethodUsage>, usage| match best {
            Some(b) if b.count >= usage.count => Some(b),
            _ => Some(usage),
        })
}

/// Everything a student dashboard shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub summary: Summary,
    pub streak: u32,
    pub most_used_method: Option<MethodUsage>,
    pub trends: Vec<DayBucket>,
}

impl DashboardSnapshot {
    pub fn build(
        events: &[AttendanceEvent],
        today: NaiveDate,
        offset: FixedOffset,
        trend_days: u32,
    ) -> Self {
        Self {
            summary: summary(events),
            streak: streak(events, today, offset),
            most_used_method: most_used_method(events),
            trends: trends(events, trend_days, today, offset),
        }
    }
}

/// In-session event projection per student
#[derive(Debug, Default)]
pub struct StatsBoard {
    events: RwLock<HashMap<StudentId, Vec<AttendanceEvent>>>,
}

impl StatsBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a freshly recorded event
    pub async fn record(&self, event: AttendanceEvent) {
        let mut events = self.events.write().await;
        let list = events.entry(event.student_id).or_default();
        if !list.iter().any(|e| e.id == event.id) {
            list.push(event);
        }
    }

    /// Replace a student's events with a fetched history
    pub async fn seed(&self, student_id: StudentId, history: Vec<AttendanceEvent>) {
        self.events.write().await.insert(student_id, history);
    }

    pub async fn events(&self, student_id: StudentId) -> Vec<AttendanceEvent> {
        self.events
            .read()
            .await
            .get(&student_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn snapshot(
        &self,
        student_id: StudentId,
        today: NaiveDate,
        offset: FixedOffset,
        trend_days: u32,
    ) -> DashboardSnapshot {
        let events = self.events(student_id).await;
        DashboardSnapshot::build(&events, today, offset, trend_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    fn event(d: u32, direction: Direction, method: Method, status: Status) -> AttendanceEvent {
        AttendanceEvent {
            id: Uuid::new_v4(),
            student_id: 1,
            direction,
            method,
            timestamp: Utc.with_ymd_and_hms(2025, 3, d, 7, 30, 0).unwrap(),
            status,
            late_minutes: 0,
            notes: None,
        }
    }

    fn check_in(d: u32, status: Status) -> AttendanceEvent {
        event(d, Direction::CheckIn, Method::Qr, status)
    }

    #[test]
    fn test_summary_counts_check_ins_only() {
        let events = vec![
            check_in(3, Status::Present),
            check_in(4, Status::Late),
            check_in(5, Status::Absent),
            check_in(6, Status::Excused),
            event(3, Direction::CheckOut, Method::Qr, Status::Present),
        ];
        let s = summary(&events);
        assert_eq!(s.total, 4);
        assert_eq!((s.present, s.late, s.absent, s.excused), (1, 1, 1, 1));
        assert_eq!(s.percentage, 50.0);
    }

    #[test]
    fn test_summary_rounds_to_one_decimal() {
        let events = vec![
            check_in(3, Status::Present),
            check_in(4, Status::Absent),
            check_in(5, Status::Absent),
        ];
        assert_eq!(summary(&events).percentage, 33.3);
        assert_eq!(summary(&[]).percentage, 0.0);
    }

    #[test]
    fn test_streak_counts_back_from_today() {
        let events = vec![
            check_in(7, Status::Absent),
            check_in(8, Status::Present),
            check_in(9, Status::Late),
            check_in(10, Status::Present),
        ];
        assert_eq!(streak(&events, day(10), utc()), 3);
    }

    #[test]
    fn test_streak_starts_yesterday_when_today_missing() {
        let events = vec![check_in(8, Status::Present), check_in(9, Status::Present)];
        assert_eq!(streak(&events, day(10), utc()), 2);
    }

    #[test]
    fn test_streak_broken_by_gap() {
        let events = vec![check_in(7, Status::Present), check_in(9, Status::Present)];
        assert_eq!(streak(&events, day(9), utc()), 1);
        assert_eq!(streak(&[], day(9), utc()), 0);
    }

    #[test]
    fn test_trends_fill_empty_days() {
        let events = vec![check_in(8, Status::Present), check_in(10, Status::Late)];
        let buckets = trends(&events, 3, day(10), utc());
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0].date, day(8));
        assert_eq!(buckets[0].summary.present, 1);
        assert_eq!(buckets[1].summary.total, 0);
        assert_eq!(buckets[2].summary.late, 1);
        assert!(trends(&events, 0, day(10), utc()).is_empty());
    }

    #[test]
    fn test_trends_clamp_oversized_range() {
        let events = vec![check_in(10, Status::Present)];
        let buckets = trends(&events, u32::MAX, day(10), utc());
        assert_eq!(buckets.len(), MAX_TREND_DAYS as usize);
        assert_eq!(buckets.last().map(|b| b.date), Some(day(10)));
        assert_eq!(buckets.last().map(|b| b.summary.total), Some(1));
    }

    #[test]
    fn test_method_breakdown_in_declaration_order() {
        let events = vec![
            event(3, Direction::CheckIn, Method::Otc, Status::Present),
            event(3, Direction::CheckOut, Method::Otc, Status::Present),
            event(4, Direction::CheckIn, Method::Face, Status::Present),
            event(5, Direction::CheckIn, Method::Manual, Status::Present),
        ];
        let breakdown = method_breakdown(&events);
        let methods: Vec<Method> = breakdown.iter().map(|u| u.method).collect();
        assert_eq!(methods, Method::ALL.to_vec());
        assert_eq!(breakdown[3].count, 2);
        assert_eq!(breakdown[3].percentage, 50.0);
        assert_eq!(breakdown[0].count, 0);
    }

    #[test]
    fn test_most_used_method_tie_goes_to_declaration_order() {
        let events = vec![
            event(3, Direction::CheckIn, Method::Manual, Status::Present),
            event(4, Direction::CheckIn, Method::Fingerprint, Status::Present),
        ];
        let top = most_used_method(&events).unwrap();
        assert_eq!(top.method, Method::Fingerprint);
        assert_eq!(top.count, 1);
        assert!(most_used_method(&[]).is_none());
    }

    #[tokio::test]
    async fn test_stats_board_ignores_repeated_event() {
        let board = StatsBoard::new();
        let e = check_in(10, Status::Present);
        board.record(e.clone()).await;
        board.record(e).await;
        assert_eq!(board.events(1).await.len(), 1);

        let snapshot = board.snapshot(1, day(10), utc(), 7).await;
        assert_eq!(snapshot.streak, 1);
        assert_eq!(snapshot.trends.len(), 7);
    }
}
