//! Remote table store boundary. The app state store only ever talks to the
//! backend through [`TableStore`]: row-level inserts, filtered selects,
//! updates and deletes over three tables.

mod rest;
mod sqlite;

pub(crate) use rest::error_message as rest_error_message;
pub use rest::RestTableStore;
pub use sqlite::SqliteTableStore;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Classrooms,
    Students,
    PointTransactions,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Self::Classrooms => "classrooms",
            Self::Students => "students",
            Self::PointTransactions => "point_transactions",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Classrooms => &["id", "user_id", "name", "created_at"],
            Self::Students => &["id", "classroom_id", "name", "created_at"],
            Self::PointTransactions => &[
                "id",
                "classroom_id",
                "student_id",
                "behavior_name",
                "behavior_icon",
                "points",
                "created_at",
                "batch_id",
                "note",
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, Value),
    In(&'static str, Vec<Value>),
}

impl Filter {
    pub fn eq(column: &'static str, value: impl Into<Value>) -> Self {
        Self::Eq(column, value.into())
    }

    pub fn any_of<I, V>(column: &'static str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::In(column, values.into_iter().map(Into::into).collect())
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::Eq(c, _) | Self::In(c, _) => *c,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    /// Column and ascending flag.
    pub order: Vec<(&'static str, bool)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, f: Filter) -> Self {
        self.filters.push(f);
        self
    }

    pub fn order_asc(mut self, column: &'static str) -> Self {
        self.order.push((column, true));
        self
    }

    pub fn order_desc(mut self, column: &'static str) -> Self {
        self.order.push((column, false));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("backend responded {status}: {message}")]
    Http { status: u16, message: String },

    #[error("backend unreachable: {0}")]
    Transport(String),

    #[error("row encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("unknown column '{column}' on {table}")]
    UnknownColumn { table: &'static str, column: String },

    #[error("refusing unfiltered {0}")]
    Unfiltered(&'static str),
}

impl BackendError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "db_failed",
            Self::Http { .. } => "http_failed",
            Self::Transport(_) => "network_failed",
            Self::Encode(_) => "encode_failed",
            Self::UnknownColumn { .. } => "bad_column",
            Self::Unfiltered(_) => "unfiltered",
        }
    }
}

pub trait TableStore {
    fn label(&self) -> &'static str;

    /// Inserts every row or none of them.
    fn insert(&mut self, table: Table, rows: Vec<Row>) -> Result<(), BackendError>;

    fn select(&mut self, table: Table, query: &Query) -> Result<Vec<Row>, BackendError>;

    fn update(&mut self, table: Table, filters: &[Filter], patch: Row)
        -> Result<usize, BackendError>;

    /// Returns the number of rows removed.
    fn delete(&mut self, table: Table, filters: &[Filter]) -> Result<usize, BackendError>;

    /// Token of the signed-in user, for backends that scope rows per user.
    fn set_access_token(&mut self, _token: Option<String>) {}
}

pub fn to_row<T: Serialize>(value: &T) -> Result<Row, BackendError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(BackendError::Encode(serde::ser::Error::custom(format!(
            "expected an object row, got {other}"
        )))),
    }
}

pub fn from_rows<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, BackendError> {
    rows.into_iter()
        .map(|r| serde_json::from_value(Value::Object(r)).map_err(BackendError::from))
        .collect()
}

/// Typed convenience layer over a [`TableStore`].
pub trait TableStoreExt: TableStore {
    fn insert_all<T: Serialize>(&mut self, table: Table, values: &[T]) -> Result<(), BackendError> {
        let rows = values.iter().map(to_row).collect::<Result<Vec<_>, _>>()?;
        self.insert(table, rows)
    }

    fn fetch<T: DeserializeOwned>(&mut self, table: Table, query: &Query) -> Result<Vec<T>, BackendError> {
        let rows = self.select(table, query)?;
        from_rows(rows)
    }
}

impl<S: TableStore + ?Sized> TableStoreExt for S {}
