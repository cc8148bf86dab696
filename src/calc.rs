use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::model::{Classroom, PointTransaction};

/// Signed point sums. `negative` is the (non-positive) sum of deductions, so
/// `total == positive + negative` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointTotals {
    pub total: i64,
    pub positive: i64,
    pub negative: i64,
}

impl PointTotals {
    /// Saturates instead of overflowing on out-of-range rows from a backend.
    pub fn apply(&mut self, points: i64) {
        self.total = self.total.saturating_add(points);
        if points >= 0 {
            self.positive = self.positive.saturating_add(points);
        } else {
            self.negative = self.negative.saturating_add(points);
        }
    }

    pub fn revert(&mut self, points: i64) {
        self.total = self.total.saturating_sub(points);
        if points >= 0 {
            self.positive = self.positive.saturating_sub(points);
        } else {
            self.negative = self.negative.saturating_sub(points);
        }
    }
}

pub fn sum_points<'a, I>(transactions: I) -> PointTotals
where
    I: IntoIterator<Item = &'a PointTransaction>,
{
    let mut totals = PointTotals::default();
    for tx in transactions {
        totals.apply(tx.points);
    }
    totals
}

/// Start instants of the local calendar day and week containing `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodBounds {
    pub today_start: DateTime<Utc>,
    pub week_start: DateTime<Utc>,
}

/// Weeks start on Sunday.
pub fn period_bounds<Tz: TimeZone>(now: &DateTime<Tz>) -> PeriodBounds {
    let tz = now.timezone();
    let today = now.date_naive();
    let back = i64::from(today.weekday().num_days_from_sunday());
    let week_first = today - chrono::Duration::days(back);
    PeriodBounds {
        today_start: local_midnight(&tz, today),
        week_start: local_midnight(&tz, week_first),
    }
}

/// First instant of `date` in `tz`. When a DST jump skips midnight, the day
/// starts at the first wall-clock minute that exists.
fn local_midnight<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::default());
    let mut wall = midnight;
    while wall.date() == date {
        if let Some(dt) = tz.from_local_datetime(&wall).earliest() {
            return dt.with_timezone(&Utc);
        }
        wall += chrono::Duration::minutes(1);
    }
    // No valid wall-clock time all day; only a malformed zone gets here.
    midnight.and_utc()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotals {
    pub today: PointTotals,
    pub this_week: PointTotals,
    pub all_time: PointTotals,
}

pub fn period_totals<'a, I>(transactions: I, bounds: &PeriodBounds) -> PeriodTotals
where
    I: IntoIterator<Item = &'a PointTransaction>,
{
    let mut out = PeriodTotals::default();
    for tx in transactions {
        out.all_time.apply(tx.points);
        if tx.created_at >= bounds.week_start {
            out.this_week.apply(tx.points);
        }
        if tx.created_at >= bounds.today_start {
            out.today.apply(tx.points);
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub student_id: String,
    pub name: String,
    pub display: String,
    pub totals: PeriodTotals,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    pub classroom_id: String,
    pub display: String,
    pub totals: PeriodTotals,
    pub students: Vec<StudentSummary>,
}

pub fn classroom_summary(classroom: &Classroom, bounds: &PeriodBounds) -> ClassSummary {
    let mut by_student: HashMap<&str, Vec<&PointTransaction>> = HashMap::new();
    for tx in &classroom.transactions {
        by_student.entry(tx.student_id.as_str()).or_default().push(tx);
    }

    let students = classroom
        .students
        .iter()
        .map(|s| {
            let totals = period_totals(
                by_student.get(s.id.as_str()).into_iter().flatten().copied(),
                bounds,
            );
            StudentSummary {
                student_id: s.id.clone(),
                name: s.name.clone(),
                display: format_points(totals.all_time.total),
                totals,
            }
        })
        .collect();

    let totals = period_totals(&classroom.transactions, bounds);
    ClassSummary {
        classroom_id: classroom.id().to_string(),
        display: format_points(totals.all_time.total),
        totals,
        students,
    }
}

/// Badge text: positive values carry an explicit sign, zero is bare.
pub fn format_points(points: i64) -> String {
    if points > 0 {
        format!("+{points}")
    } else {
        points.to_string()
    }
}

/// One row of the activity feed. A class-wide award collapses into a single
/// entry keyed by its batch id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,
    pub batch_id: Option<String>,
    pub behavior_name: String,
    pub behavior_icon: String,
    pub points: i64,
    pub total_points: i64,
    pub transaction_ids: Vec<String>,
    pub student_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub note: Option<String>,
}

pub fn activity_feed(transactions: &[PointTransaction], limit: usize) -> Vec<ActivityEntry> {
    let mut ordered: Vec<&PointTransaction> = transactions.iter().collect();
    ordered.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });

    let mut out: Vec<ActivityEntry> = Vec::new();
    let mut batch_slot: HashMap<&str, usize> = HashMap::new();
    for tx in ordered {
        if let Some(batch_id) = tx.batch_id.as_deref() {
            if let Some(&i) = batch_slot.get(batch_id) {
                let entry = &mut out[i];
                entry.total_points += tx.points;
                entry.transaction_ids.push(tx.id.clone());
                entry.student_ids.push(tx.student_id.clone());
                continue;
            }
            if out.len() >= limit {
                continue;
            }
            batch_slot.insert(batch_id, out.len());
        } else if out.len() >= limit {
            continue;
        }
        out.push(ActivityEntry {
            id: tx.batch_id.clone().unwrap_or_else(|| tx.id.clone()),
            batch_id: tx.batch_id.clone(),
            behavior_name: tx.behavior_name.clone(),
            behavior_icon: tx.behavior_icon.clone(),
            points: tx.points,
            total_points: tx.points,
            transaction_ids: vec![tx.id.clone()],
            student_ids: vec![tx.student_id.clone()],
            created_at: tx.created_at,
            note: tx.note.clone(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClassroomRow, Student};
    use chrono::FixedOffset;

    fn tx(id: &str, student: &str, points: i64, at: &str, batch: Option<&str>) -> PointTransaction {
        PointTransaction {
            id: id.to_string(),
            classroom_id: "c1".to_string(),
            student_id: student.to_string(),
            behavior_name: if points > 0 { "On Task" } else { "Off Task" }.to_string(),
            behavior_icon: "*".to_string(),
            points,
            created_at: DateTime::parse_from_rfc3339(at)
                .expect("timestamp")
                .with_timezone(&Utc),
            batch_id: batch.map(str::to_string),
            note: None,
        }
    }

    #[test]
    fn totals_split_positive_and_negative() {
        let txs = vec![
            tx("a", "s1", 2, "2026-10-19T10:00:00Z", None),
            tx("b", "s1", -1, "2026-10-19T10:01:00Z", None),
            tx("c", "s2", 1, "2026-10-19T10:02:00Z", None),
        ];
        let t = sum_points(&txs);
        assert_eq!(t, PointTotals { total: 2, positive: 3, negative: -1 });
        assert_eq!(t.total, t.positive + t.negative);
    }

    #[test]
    fn revert_undoes_apply() {
        let mut t = PointTotals::default();
        t.apply(3);
        t.apply(-2);
        t.revert(3);
        assert_eq!(t, PointTotals { total: -2, positive: 0, negative: -2 });
    }

    #[test]
    fn period_bounds_use_local_day_and_sunday_week() {
        // Wednesday 2026-10-21 01:30 at UTC-05:00 is still Wednesday locally.
        let offset = FixedOffset::west_opt(5 * 3600).expect("offset");
        let now = offset
            .with_ymd_and_hms(2026, 10, 21, 1, 30, 0)
            .single()
            .expect("now");
        let b = period_bounds(&now);
        assert_eq!(b.today_start.to_rfc3339(), "2026-10-21T05:00:00+00:00");
        assert_eq!(b.week_start.to_rfc3339(), "2026-10-18T05:00:00+00:00");
    }

    /// UTC-3 until clocks jump from 00:00 to 01:00 local on 2026-11-01, UTC-2 after.
    #[derive(Debug, Clone, Copy)]
    struct SkippedMidnight;

    impl SkippedMidnight {
        fn switch_local() -> chrono::NaiveDateTime {
            NaiveDate::from_ymd_opt(2026, 11, 1)
                .expect("date")
                .and_time(NaiveTime::default())
        }

        fn offset(summer: bool) -> FixedOffset {
            FixedOffset::west_opt(if summer { 2 * 3600 } else { 3 * 3600 }).expect("offset")
        }
    }

    impl TimeZone for SkippedMidnight {
        type Offset = FixedOffset;

        fn from_offset(_offset: &FixedOffset) -> Self {
            SkippedMidnight
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> chrono::LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(12, 0, 0).expect("noon"))
        }

        fn offset_from_local_datetime(
            &self,
            local: &chrono::NaiveDateTime,
        ) -> chrono::LocalResult<FixedOffset> {
            let start = Self::switch_local();
            if *local < start {
                chrono::LocalResult::Single(Self::offset(false))
            } else if *local < start + chrono::Duration::hours(1) {
                chrono::LocalResult::None
            } else {
                chrono::LocalResult::Single(Self::offset(true))
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(12, 0, 0).expect("noon"))
        }

        fn offset_from_utc_datetime(&self, utc: &chrono::NaiveDateTime) -> FixedOffset {
            Self::offset(*utc >= Self::switch_local() + chrono::Duration::hours(3))
        }
    }

    #[test]
    fn skipped_midnight_starts_day_at_first_valid_minute() {
        let now = SkippedMidnight.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2026, 11, 1)
                .expect("date")
                .and_hms_opt(12, 0, 0)
                .expect("time"),
        );
        // Sunday, so the week starts the same instant.
        let b = period_bounds(&now);
        assert_eq!(b.today_start.to_rfc3339(), "2026-11-01T03:00:00+00:00");
        assert_eq!(b.week_start, b.today_start);

        let txs = vec![
            tx("eve", "s1", 3, "2026-11-01T02:30:00Z", None),
            tx("morning", "s1", 1, "2026-11-01T11:00:00Z", None),
        ];
        assert_eq!(period_totals(&txs, &b).today.total, 1);
    }

    #[test]
    fn saturating_totals_do_not_overflow() {
        let mut t = PointTotals::default();
        t.apply(i64::MAX);
        t.apply(i64::MAX);
        assert_eq!(t.total, i64::MAX);
        t.apply(i64::MIN);
        t.apply(i64::MIN);
        assert_eq!(t.negative, i64::MIN);
    }

    #[test]
    fn period_totals_bucket_by_bounds() {
        let offset = FixedOffset::east_opt(0).expect("offset");
        let now = offset
            .with_ymd_and_hms(2026, 10, 21, 12, 0, 0)
            .single()
            .expect("now");
        let bounds = period_bounds(&now);
        let txs = vec![
            tx("old", "s1", 5, "2026-10-10T09:00:00Z", None),
            tx("week", "s1", -2, "2026-10-19T09:00:00Z", None),
            tx("today", "s1", 1, "2026-10-21T08:00:00Z", None),
        ];
        let p = period_totals(&txs, &bounds);
        assert_eq!(p.all_time.total, 4);
        assert_eq!(p.this_week, PointTotals { total: -1, positive: 1, negative: -2 });
        assert_eq!(p.today.total, 1);
    }

    #[test]
    fn format_points_signs_positive_only() {
        assert_eq!(format_points(1), "+1");
        assert_eq!(format_points(0), "0");
        assert_eq!(format_points(-3), "-3");
    }

    #[test]
    fn classroom_summary_covers_students_without_history() {
        let now = Utc::now();
        let mut c = Classroom::new(ClassroomRow {
            id: "c1".to_string(),
            user_id: "u1".to_string(),
            name: "Test Classroom".to_string(),
            created_at: now,
        });
        for (id, name) in [("s1", "Alice"), ("s2", "Bob")] {
            c.students.push(Student {
                id: id.to_string(),
                classroom_id: "c1".to_string(),
                name: name.to_string(),
                created_at: now,
            });
        }
        c.transactions.push(tx("a", "s1", 1, &now.to_rfc3339(), None));
        let summary = classroom_summary(&c, &period_bounds(&now));
        assert_eq!(summary.students.len(), 2);
        assert_eq!(summary.students[0].display, "+1");
        assert_eq!(summary.students[1].display, "0");
        assert_eq!(summary.totals.today.total, 1);
    }

    #[test]
    fn activity_feed_collapses_batches() {
        let txs = vec![
            tx("a", "s1", 1, "2026-10-19T10:00:00Z", None),
            tx("b1", "s1", 2, "2026-10-19T10:05:00Z", Some("batch")),
            tx("b2", "s2", 2, "2026-10-19T10:05:00Z", Some("batch")),
            tx("b3", "s3", 2, "2026-10-19T10:05:00Z", Some("batch")),
            tx("c", "s2", -1, "2026-10-19T10:06:00Z", None),
        ];
        let feed = activity_feed(&txs, 10);
        assert_eq!(feed.len(), 3);
        assert_eq!(feed[0].id, "c");
        assert_eq!(feed[1].id, "batch");
        assert_eq!(feed[1].transaction_ids.len(), 3);
        assert_eq!(feed[1].total_points, 6);
        assert_eq!(feed[2].id, "a");

        let limited = activity_feed(&txs, 2);
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[1].transaction_ids.len(), 3);
    }
}
