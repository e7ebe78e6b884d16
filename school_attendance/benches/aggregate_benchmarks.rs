use chrono::{Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use school_attendance::attendance::{
    AttendanceEvent, DashboardSnapshot, Direction, Method, Status, method_breakdown, streak,
    summary, trends,
};
use school_attendance::{Schedule, validate};
use std::hint::black_box;
use uuid::Uuid;

/// Helper to build a history of `days` days, one check-in and one check-out each
fn history(days: usize) -> Vec<AttendanceEvent> {
    let first = Utc.with_ymd_and_hms(2024, 1, 1, 7, 30, 0).unwrap();
    (0..days)
        .flat_map(|d| {
            let morning = first + Duration::days(d as i64);
            let method = Method::ALL[d % Method::ALL.len()];
            let status = match d % 10 {
                0 => Status::Late,
                1 => Status::Absent,
                _ => Status::Present,
            };
            [
                AttendanceEvent {
                    id: Uuid::new_v4(),
                    student_id: 1,
                    direction: Direction::CheckIn,
                    method,
                    timestamp: morning,
                    status,
                    late_minutes: if status == Status::Late { 12 } else { 0 },
                    notes: None,
                },
                AttendanceEvent {
                    id: Uuid::new_v4(),
                    student_id: 1,
                    direction: Direction::CheckOut,
                    method,
                    timestamp: morning + Duration::hours(8),
                    status: Status::Present,
                    late_minutes: 0,
                    notes: None,
                },
            ]
        })
        .collect()
}

fn last_day(events: &[AttendanceEvent]) -> NaiveDate {
    events
        .last()
        .map(|e| e.timestamp.date_naive())
        .unwrap_or_default()
}

/// Benchmark summary over growing histories
fn bench_summary(c: &mut Criterion) {
    let mut group = c.benchmark_group("summary");

    for days in [30, 365, 3650].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_days", days)),
            days,
            |b, &n| {
                let events = history(n);
                b.iter(|| summary(black_box(&events)));
            },
        );
    }

    group.finish();
}

/// Benchmark streak counting on an unbroken tail
fn bench_streak(c: &mut Criterion) {
    let events: Vec<AttendanceEvent> = history(3650)
        .into_iter()
        .map(|mut e| {
            e.status = Status::Present;
            e
        })
        .collect();
    let today = last_day(&events);
    let utc = FixedOffset::east_opt(0).unwrap();

    c.bench_function("streak_3650_days", |b| {
        b.iter(|| streak(black_box(&events), today, utc));
    });
}

/// Benchmark trend bucketing and method breakdown
fn bench_trends(c: &mut Criterion) {
    let events = history(365);
    let today = last_day(&events);
    let utc = FixedOffset::east_opt(0).unwrap();

    c.bench_function("trends_30_of_365_days", |b| {
        b.iter(|| trends(black_box(&events), 30, today, utc));
    });

    c.bench_function("method_breakdown_365_days", |b| {
        b.iter(|| method_breakdown(black_box(&events)));
    });

    c.bench_function("dashboard_snapshot_365_days", |b| {
        b.iter(|| DashboardSnapshot::build(black_box(&events), today, utc, 30));
    });
}

/// Benchmark the window check run on every ingest
fn bench_window_check(c: &mut Criterion) {
    let schedule = Schedule::default();
    let at = Utc.with_ymd_and_hms(2025, 3, 10, 7, 50, 0).unwrap();

    c.bench_function("window_validate", |b| {
        b.iter(|| validate(black_box(Direction::CheckIn), black_box(at), &schedule));
    });
}

criterion_group!(aggregation, bench_summary, bench_streak, bench_trends);

criterion_group!(ingestion, bench_window_check);

criterion_main!(aggregation, ingestion);
