use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calc::PointTotals;

/// Fixed-width RFC 3339 with milliseconds, so stored timestamps sort as text.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Row shape of `classrooms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassroomRow {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Row shape of `students`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub classroom_id: String,
    pub name: String,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Row shape of `point_transactions`. Immutable once written; only ever
/// deleted (undo or classroom removal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointTransaction {
    pub id: String,
    pub classroom_id: String,
    pub student_id: String,
    pub behavior_name: String,
    pub behavior_icon: String,
    pub points: i64,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// Cached classroom with its students, live transaction history and the
/// denormalized totals shown in the sidebar.
#[derive(Debug, Clone)]
pub struct Classroom {
    pub row: ClassroomRow,
    pub students: Vec<Student>,
    pub transactions: Vec<PointTransaction>,
    pub totals: PointTotals,
}

impl Classroom {
    pub fn new(row: ClassroomRow) -> Self {
        Self {
            row,
            students: Vec::new(),
            transactions: Vec::new(),
            totals: PointTotals::default(),
        }
    }

    pub fn id(&self) -> &str {
        &self.row.id
    }

    pub fn student(&self, student_id: &str) -> Option<&Student> {
        self.students.iter().find(|s| s.id == student_id)
    }

    pub fn has_student(&self, student_id: &str) -> bool {
        self.student(student_id).is_some()
    }
}

/// What a point award is for: either a catalog behavior or a custom one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardBehavior {
    pub name: String,
    pub icon: String,
    pub points: i64,
}
