use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::PointTransaction;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The single most recent award (one transaction, or a whole batch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoableAction {
    pub classroom_id: String,
    pub transaction_ids: Vec<String>,
    pub batch_id: Option<String>,
    pub student_ids: Vec<String>,
    pub behavior_name: String,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

impl UndoableAction {
    /// Builds the action for a freshly recorded set of transactions. All of
    /// them come from one award call, so they share behavior and timestamp.
    pub fn from_transactions(txs: &[PointTransaction]) -> Option<Self> {
        let first = txs.first()?;
        Some(Self {
            classroom_id: first.classroom_id.clone(),
            transaction_ids: txs.iter().map(|t| t.id.clone()).collect(),
            batch_id: first.batch_id.clone(),
            student_ids: txs.iter().map(|t| t.student_id.clone()).collect(),
            behavior_name: first.behavior_name.clone(),
            points: first.points,
            created_at: first.created_at,
        })
    }

    pub fn covers(&self, transaction_id: &str) -> bool {
        self.transaction_ids.iter().any(|id| id == transaction_id)
            || self.batch_id.as_deref() == Some(transaction_id)
    }

    pub fn involves_student(&self, student_id: &str) -> bool {
        self.student_ids.iter().any(|id| id == student_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UndoState {
    Active {
        action: UndoableAction,
        expires_at: DateTime<Utc>,
    },
    Expired,
}

/// Deadline-driven undo window. Expiry is checked against the deadline on
/// every read, so nothing has to poll.
#[derive(Debug, Clone)]
pub struct UndoWindow {
    window: chrono::Duration,
    state: UndoState,
}

impl UndoWindow {
    pub fn new(window: std::time::Duration) -> Self {
        let ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX / 1_000_000);
        Self {
            window: chrono::Duration::milliseconds(ms),
            state: UndoState::Expired,
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window.num_milliseconds()
    }

    /// Replaces whatever was undoable before.
    pub fn arm(&mut self, action: UndoableAction) {
        let expires_at = action.created_at + self.window;
        self.state = UndoState::Active { action, expires_at };
    }

    pub fn active(&mut self, now: DateTime<Utc>) -> Option<&UndoableAction> {
        self.tick(now);
        match &self.state {
            UndoState::Active { action, .. } => Some(action),
            UndoState::Expired => None,
        }
    }

    pub fn remaining_ms(&mut self, now: DateTime<Utc>) -> Option<i64> {
        self.tick(now);
        match &self.state {
            UndoState::Active { expires_at, .. } => Some((*expires_at - now).num_milliseconds()),
            UndoState::Expired => None,
        }
    }

    pub fn expire(&mut self) {
        self.state = UndoState::Expired;
    }

    pub fn expire_if<F>(&mut self, pred: F)
    where
        F: FnOnce(&UndoableAction) -> bool,
    {
        if let UndoState::Active { action, .. } = &self.state {
            if pred(action) {
                self.state = UndoState::Expired;
            }
        }
    }

    fn tick(&mut self, now: DateTime<Utc>) {
        if let UndoState::Active { expires_at, .. } = &self.state {
            if now >= *expires_at {
                self.state = UndoState::Expired;
            }
        }
    }
}

/// Re-derives the undoable action from history: the newest transaction and,
/// if it belongs to a batch, every transaction of that batch.
pub fn recent_action<'a, I>(history: I) -> Option<UndoableAction>
where
    I: IntoIterator<Item = &'a PointTransaction>,
{
    let all: Vec<&PointTransaction> = history.into_iter().collect();
    let newest = all
        .iter()
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))?;
    let group: Vec<PointTransaction> = match newest.batch_id.as_deref() {
        Some(batch) => all
            .iter()
            .filter(|t| t.batch_id.as_deref() == Some(batch))
            .map(|t| (*t).clone())
            .collect(),
        None => vec![(*newest).clone()],
    };
    UndoableAction::from_transactions(&group)
}
