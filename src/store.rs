//! Application state store: the single source of truth for classrooms,
//! students and point transactions of the signed-in user.
//!
//! Writes are optimistic. The cache (and its denormalized totals) is updated
//! first; if the backend then rejects the write, the cache is rolled back
//! exactly and the failure is kept as the store's error state until the
//! shell asks for a retry. Nothing is retried automatically.

use chrono::{DateTime, Local, SubsecRound, TimeZone, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, Filter, Query, Table, TableStore, TableStoreExt};
use crate::calc::{self, ActivityEntry, ClassSummary};
use crate::model::{AwardBehavior, Classroom, ClassroomRow, PointTransaction, Student};
use crate::undo::{self, Clock, UndoableAction, UndoWindow};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("sign in first")]
    NotAuthenticated,

    #[error("nothing to undo")]
    UndoUnavailable,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad_params",
            Self::NotFound { .. } => "not_found",
            Self::NotAuthenticated => "not_authenticated",
            Self::UndoUnavailable => "undo_unavailable",
            Self::Backend(_) => "backend_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::NotFound { entity, id } => Some(json!({ "entity": entity, "id": id })),
            Self::Backend(e) => Some(json!({ "backend": e.code(), "retry": true })),
            _ => None,
        }
    }
}

fn not_found(entity: &'static str, id: &str) -> StoreError {
    StoreError::NotFound {
        entity,
        id: id.to_string(),
    }
}

/// Page-level error surfaced to the shell until `retry`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorState {
    pub code: String,
    pub operation: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecordOutcome {
    pub transactions: Vec<PointTransaction>,
    pub batch_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UndoOutcome {
    pub action: UndoableAction,
    pub removed: usize,
    /// The rows were already gone on the backend (deleted elsewhere).
    pub already_removed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoStatus {
    pub available: bool,
    pub action: Option<UndoableAction>,
    pub remaining_ms: Option<i64>,
    pub window_ms: i64,
}

/// Largest magnitude a single award may carry.
pub const MAX_AWARD_POINTS: u64 = 1_000;

pub fn clean_name(raw: &str, what: &str) -> Result<String, StoreError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(StoreError::Validation(format!("{what} name must not be empty")));
    }
    Ok(name.to_string())
}

pub struct AppStore {
    backend: Box<dyn TableStore>,
    clock: Box<dyn Clock>,
    user_id: Option<String>,
    classrooms: Vec<Classroom>,
    active_classroom: Option<String>,
    undo: UndoWindow,
    last_error: Option<ErrorState>,
}

impl AppStore {
    pub fn new(backend: Box<dyn TableStore>, clock: Box<dyn Clock>, undo_window: Duration) -> Self {
        Self {
            backend,
            clock,
            user_id: None,
            classrooms: Vec::new(),
            active_classroom: None,
            undo: UndoWindow::new(undo_window),
            last_error: None,
        }
    }

    pub fn backend_label(&self) -> &'static str {
        self.backend.label()
    }

    pub fn set_access_token(&mut self, token: Option<String>) {
        self.backend.set_access_token(token);
    }

    /// Millisecond precision matches what the backend stores.
    fn now(&self) -> DateTime<Utc> {
        self.clock.now().trunc_subsecs(3)
    }

    fn fail<T>(&mut self, e: BackendError, operation: &str) -> Result<T, StoreError> {
        warn!(operation, error = %e, "backend call failed");
        self.last_error = Some(ErrorState {
            code: e.code().to_string(),
            operation: operation.to_string(),
            message: e.to_string(),
            at: self.clock.now(),
        });
        Err(StoreError::Backend(e))
    }

    fn require_user(&self) -> Result<String, StoreError> {
        self.user_id.clone().ok_or(StoreError::NotAuthenticated)
    }

    pub fn last_error(&self) -> Option<&ErrorState> {
        self.last_error.as_ref()
    }

    /// Replaces the cache with everything the user owns on the backend.
    /// A different user's cache is dropped before fetching, so a failed load
    /// never leaves it visible.
    pub fn load(&mut self, user_id: &str) -> Result<(), StoreError> {
        if self.user_id.as_deref() != Some(user_id) {
            self.unload();
            self.user_id = Some(user_id.to_string());
        }
        match self.fetch_all(user_id) {
            Ok(classrooms) => {
                self.classrooms = classrooms;
                self.last_error = None;
            }
            Err(e) => return self.fail(e, "load"),
        }

        let keep_active = self
            .active_classroom
            .as_deref()
            .is_some_and(|id| self.classrooms.iter().any(|c| c.id() == id));
        if !keep_active {
            self.active_classroom = self.classrooms.first().map(|c| c.id().to_string());
        }

        self.undo.expire();
        match self.fetch_recent_action() {
            Ok(Some(action)) => self.undo.arm(action),
            Ok(None) => {}
            Err(e) => return self.fail(e, "load"),
        }
        info!(
            user_id,
            classrooms = self.classrooms.len(),
            backend = self.backend.label(),
            "store loaded"
        );
        Ok(())
    }

    fn fetch_all(&mut self, user_id: &str) -> Result<Vec<Classroom>, BackendError> {
        let rows: Vec<ClassroomRow> = self.backend.fetch(
            Table::Classrooms,
            &Query::new()
                .filter(Filter::eq("user_id", user_id))
                .order_asc("created_at")
                .order_asc("id"),
        )?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();

        let students: Vec<Student> = self.backend.fetch(
            Table::Students,
            &Query::new()
                .filter(Filter::any_of("classroom_id", ids.iter().copied()))
                .order_asc("created_at")
                .order_asc("id"),
        )?;
        let transactions: Vec<PointTransaction> = self.backend.fetch(
            Table::PointTransactions,
            &Query::new()
                .filter(Filter::any_of("classroom_id", ids.iter().copied()))
                .order_asc("created_at")
                .order_asc("id"),
        )?;

        let mut out: Vec<Classroom> = rows.into_iter().map(Classroom::new).collect();
        for c in &mut out {
            c.students = students
                .iter()
                .filter(|s| s.classroom_id == c.row.id)
                .cloned()
                .collect();
            c.students
                .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            let live: HashSet<&str> = c.students.iter().map(|s| s.id.as_str()).collect();
            // History of removed students stays on the backend but is not shown.
            c.transactions = transactions
                .iter()
                .filter(|t| t.classroom_id == c.row.id && live.contains(t.student_id.as_str()))
                .cloned()
                .collect();
            c.transactions
                .sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
            c.totals = calc::sum_points(&c.transactions);
        }
        Ok(out)
    }

    /// Newest live award (whole batch if batched), looked up on the backend.
    fn fetch_recent_action(&mut self) -> Result<Option<UndoableAction>, BackendError> {
        let live: HashSet<&str> = self
            .classrooms
            .iter()
            .flat_map(|c| c.students.iter().map(|s| s.id.as_str()))
            .collect();
        if live.is_empty() {
            return Ok(None);
        }
        let newest: Vec<PointTransaction> = self.backend.fetch(
            Table::PointTransactions,
            &Query::new()
                .filter(Filter::any_of("student_id", live.iter().copied()))
                .order_desc("created_at")
                .order_desc("id")
                .limit(1),
        )?;
        let Some(first) = newest.into_iter().next() else {
            return Ok(None);
        };
        let group = match first.batch_id.as_deref() {
            Some(batch) => self.backend.fetch(
                Table::PointTransactions,
                &Query::new()
                    .filter(Filter::eq("classroom_id", first.classroom_id.as_str()))
                    .filter(Filter::eq("batch_id", batch)),
            )?,
            None => vec![first],
        };
        Ok(undo::recent_action(
            group.iter().filter(|t| live.contains(t.student_id.as_str())),
        ))
    }

    /// Drops everything cached for the signed-out user.
    pub fn unload(&mut self) {
        self.user_id = None;
        self.classrooms.clear();
        self.active_classroom = None;
        self.undo.expire();
        self.last_error = None;
    }

    /// Manual retry: clears the error state and reloads from the backend.
    pub fn retry(&mut self) -> Result<(), StoreError> {
        let user_id = self.require_user()?;
        self.last_error = None;
        self.load(&user_id)
    }

    pub fn classrooms(&self) -> &[Classroom] {
        &self.classrooms
    }

    pub fn classroom(&self, id: &str) -> Result<&Classroom, StoreError> {
        self.classrooms
            .iter()
            .find(|c| c.id() == id)
            .ok_or_else(|| not_found("classroom", id))
    }

    fn classroom_mut(&mut self, id: &str) -> Result<&mut Classroom, StoreError> {
        self.classrooms
            .iter_mut()
            .find(|c| c.id() == id)
            .ok_or_else(|| not_found("classroom", id))
    }

    pub fn active_classroom_id(&self) -> Option<&str> {
        self.active_classroom.as_deref()
    }

    pub fn select_classroom(&mut self, id: &str) -> Result<&Classroom, StoreError> {
        self.classroom(id)?;
        self.active_classroom = Some(id.to_string());
        self.classroom(id)
    }

    pub fn create_classroom(&mut self, name: &str) -> Result<&Classroom, StoreError> {
        let name = clean_name(name, "classroom")?;
        let user_id = self.require_user()?;
        let row = ClassroomRow {
            id: Uuid::new_v4().to_string(),
            user_id,
            name,
            created_at: self.now(),
        };
        if let Err(e) = self.backend.insert_all(Table::Classrooms, std::slice::from_ref(&row)) {
            return self.fail(e, "create classroom");
        }
        info!(classroom_id = %row.id, "classroom created");
        let id = row.id.clone();
        self.classrooms.push(Classroom::new(row));
        self.active_classroom = Some(id.clone());
        self.classroom(&id)
    }

    pub fn rename_classroom(&mut self, id: &str, name: &str) -> Result<&Classroom, StoreError> {
        let name = clean_name(name, "classroom")?;
        self.classroom(id)?;
        let mut patch = crate::backend::Row::new();
        patch.insert("name".to_string(), json!(name));
        match self.backend.update(Table::Classrooms, &[Filter::eq("id", id)], patch) {
            Ok(0) => return Err(not_found("classroom", id)),
            Ok(_) => {}
            Err(e) => return self.fail(e, "rename classroom"),
        }
        self.classroom_mut(id)?.row.name = name;
        self.classroom(id)
    }

    /// Removes the classroom with its students and history, children first.
    pub fn delete_classroom(&mut self, id: &str) -> Result<(), StoreError> {
        self.classroom(id)?;
        let steps = [
            (Table::PointTransactions, "classroom_id"),
            (Table::Students, "classroom_id"),
            (Table::Classrooms, "id"),
        ];
        for (table, column) in steps {
            if let Err(e) = self.backend.delete(table, &[Filter::eq(column, id)]) {
                return self.fail(e, "delete classroom");
            }
        }
        self.classrooms.retain(|c| c.id() != id);
        if self.active_classroom.as_deref() == Some(id) {
            self.active_classroom = self.classrooms.first().map(|c| c.id().to_string());
        }
        self.undo.expire_if(|a| a.classroom_id == id);
        info!(classroom_id = id, "classroom deleted");
        Ok(())
    }

    pub fn add_student(&mut self, classroom_id: &str, name: &str) -> Result<Student, StoreError> {
        let name = clean_name(name, "student")?;
        self.classroom(classroom_id)?;
        let student = Student {
            id: Uuid::new_v4().to_string(),
            classroom_id: classroom_id.to_string(),
            name,
            created_at: self.now(),
        };
        if let Err(e) = self
            .backend
            .insert_all(Table::Students, std::slice::from_ref(&student))
        {
            return self.fail(e, "add student");
        }
        self.classroom_mut(classroom_id)?.students.push(student.clone());
        debug!(classroom_id, student_id = %student.id, "student added");
        Ok(student)
    }

    pub fn rename_student(
        &mut self,
        classroom_id: &str,
        student_id: &str,
        name: &str,
    ) -> Result<Student, StoreError> {
        let name = clean_name(name, "student")?;
        if !self.classroom(classroom_id)?.has_student(student_id) {
            return Err(not_found("student", student_id));
        }
        let mut patch = crate::backend::Row::new();
        patch.insert("name".to_string(), json!(name));
        let filters = [
            Filter::eq("id", student_id),
            Filter::eq("classroom_id", classroom_id),
        ];
        match self.backend.update(Table::Students, &filters, patch) {
            Ok(0) => return Err(not_found("student", student_id)),
            Ok(_) => {}
            Err(e) => return self.fail(e, "rename student"),
        }
        let c = self.classroom_mut(classroom_id)?;
        let student = c
            .students
            .iter_mut()
            .find(|s| s.id == student_id)
            .ok_or_else(|| not_found("student", student_id))?;
        student.name = name;
        Ok(student.clone())
    }

    /// Deletes the student row. Their transactions stay on the backend but
    /// drop out of every total, feed and undo.
    pub fn remove_student(&mut self, classroom_id: &str, student_id: &str) -> Result<(), StoreError> {
        if !self.classroom(classroom_id)?.has_student(student_id) {
            return Err(not_found("student", student_id));
        }
        let filters = [
            Filter::eq("id", student_id),
            Filter::eq("classroom_id", classroom_id),
        ];
        if let Err(e) = self.backend.delete(Table::Students, &filters) {
            return self.fail(e, "remove student");
        }
        let c = self.classroom_mut(classroom_id)?;
        c.students.retain(|s| s.id != student_id);
        c.transactions.retain(|t| t.student_id != student_id);
        c.totals = calc::sum_points(&c.transactions);
        self.undo.expire_if(|a| a.involves_student(student_id));
        debug!(classroom_id, student_id, "student removed");
        Ok(())
    }

    /// Awards `behavior` to each student. Several students share one batch id
    /// so the award can be undone as a unit.
    pub fn record_transaction(
        &mut self,
        classroom_id: &str,
        student_ids: &[String],
        behavior: &AwardBehavior,
        note: Option<&str>,
    ) -> Result<RecordOutcome, StoreError> {
        let behavior_name = clean_name(&behavior.name, "behavior")?;
        if behavior.points == 0 {
            return Err(StoreError::Validation("points must not be zero".to_string()));
        }
        if behavior.points.unsigned_abs() > MAX_AWARD_POINTS {
            return Err(StoreError::Validation(format!(
                "points must be between -{MAX_AWARD_POINTS} and {MAX_AWARD_POINTS}"
            )));
        }
        let mut targets: Vec<&str> = Vec::with_capacity(student_ids.len());
        for id in student_ids {
            if !targets.contains(&id.as_str()) {
                targets.push(id.as_str());
            }
        }
        if targets.is_empty() {
            return Err(StoreError::Validation("at least one student is required".to_string()));
        }
        {
            let c = self.classroom(classroom_id)?;
            if let Some(missing) = targets.iter().find(|id| !c.has_student(id)) {
                return Err(not_found("student", missing));
            }
        }

        let created_at = self.now();
        let batch_id = (targets.len() > 1).then(|| Uuid::new_v4().to_string());
        let note = note.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        let txs: Vec<PointTransaction> = targets
            .iter()
            .map(|sid| PointTransaction {
                id: Uuid::new_v4().to_string(),
                classroom_id: classroom_id.to_string(),
                student_id: (*sid).to_string(),
                behavior_name: behavior_name.clone(),
                behavior_icon: behavior.icon.clone(),
                points: behavior.points,
                created_at,
                batch_id: batch_id.clone(),
                note: note.clone(),
            })
            .collect();

        {
            let c = self.classroom_mut(classroom_id)?;
            for tx in &txs {
                c.totals.apply(tx.points);
                c.transactions.push(tx.clone());
            }
        }

        if let Err(e) = self.backend.insert_all(Table::PointTransactions, &txs) {
            let ids: HashSet<&str> = txs.iter().map(|t| t.id.as_str()).collect();
            if let Ok(c) = self.classroom_mut(classroom_id) {
                c.transactions.retain(|t| !ids.contains(t.id.as_str()));
                for tx in &txs {
                    c.totals.revert(tx.points);
                }
            }
            return self.fail(e, "record transaction");
        }

        if let Some(action) = UndoableAction::from_transactions(&txs) {
            self.undo.arm(action);
        }
        info!(
            classroom_id,
            students = txs.len(),
            points = behavior.points,
            batch = batch_id.is_some(),
            "points recorded"
        );
        Ok(RecordOutcome {
            transactions: txs,
            batch_id,
        })
    }

    pub fn undo_status(&mut self) -> UndoStatus {
        let now = self.clock.now();
        let remaining_ms = self.undo.remaining_ms(now);
        let action = self.undo.active(now).cloned();
        UndoStatus {
            available: action.is_some(),
            action,
            remaining_ms,
            window_ms: self.undo.window_ms(),
        }
    }

    /// Reverses the current undoable action. `transaction_id`, when given,
    /// must name one of its transactions (or its batch).
    pub fn undo(&mut self, transaction_id: Option<&str>) -> Result<UndoOutcome, StoreError> {
        let now = self.clock.now();
        let Some(action) = self.undo.active(now).cloned() else {
            return Err(StoreError::UndoUnavailable);
        };
        if let Some(id) = transaction_id {
            if !action.covers(id) {
                return Err(StoreError::UndoUnavailable);
            }
        }

        let target = match action.batch_id.as_deref() {
            Some(batch) => Filter::eq("batch_id", batch),
            None => Filter::any_of("id", action.transaction_ids.iter().map(String::as_str)),
        };
        let filters = [Filter::eq("classroom_id", action.classroom_id.as_str()), target];
        let removed = match self.backend.delete(Table::PointTransactions, &filters) {
            Ok(n) => n,
            Err(e) => return self.fail(e, "undo"),
        };

        if let Ok(c) = self.classroom_mut(&action.classroom_id) {
            let mut reverted = Vec::new();
            c.transactions.retain(|t| {
                let hit = match action.batch_id.as_deref() {
                    Some(batch) => t.batch_id.as_deref() == Some(batch),
                    None => action.transaction_ids.contains(&t.id),
                };
                if hit {
                    reverted.push(t.points);
                }
                !hit
            });
            for p in reverted {
                c.totals.revert(p);
            }
        }
        self.undo.expire();

        if removed == 0 {
            warn!(classroom_id = %action.classroom_id, "undo target already removed");
        } else {
            info!(classroom_id = %action.classroom_id, removed, "undo applied");
        }
        Ok(UndoOutcome {
            action,
            removed,
            already_removed: removed == 0,
        })
    }

    pub fn summary(&self, classroom_id: &str) -> Result<ClassSummary, StoreError> {
        self.summary_at(classroom_id, &self.clock.now().with_timezone(&Local))
    }

    /// Today/this-week windows follow the calendar of `now`'s time zone.
    pub fn summary_at<Tz: TimeZone>(
        &self,
        classroom_id: &str,
        now: &DateTime<Tz>,
    ) -> Result<ClassSummary, StoreError> {
        let c = self.classroom(classroom_id)?;
        Ok(calc::classroom_summary(c, &calc::period_bounds(now)))
    }

    pub fn activity(&self, classroom_id: &str, limit: usize) -> Result<Vec<ActivityEntry>, StoreError> {
        let c = self.classroom(classroom_id)?;
        Ok(calc::activity_feed(&c.transactions, limit))
    }
}
