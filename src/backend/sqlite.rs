use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::{Number, Value};

use super::{BackendError, Filter, Query, Row, Table, TableStore};

/// Table store over the workspace SQLite file opened by `db::open_db`.
pub struct SqliteTableStore {
    conn: Connection,
}

impl SqliteTableStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

fn check_column(table: Table, column: &str) -> Result<(), BackendError> {
    if table.columns().iter().any(|c| *c == column) {
        Ok(())
    } else {
        Err(BackendError::UnknownColumn {
            table: table.name(),
            column: column.to_string(),
        })
    }
}

fn to_sql(v: &Value) -> SqlValue {
    match v {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

/// Renders `WHERE ...` (or nothing) and appends the bound values.
fn where_clause(
    table: Table,
    filters: &[Filter],
    params: &mut Vec<SqlValue>,
) -> Result<String, BackendError> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let mut parts = Vec::with_capacity(filters.len());
    for f in filters {
        check_column(table, f.column())?;
        match f {
            Filter::Eq(col, v) => {
                if v.is_null() {
                    parts.push(format!("{col} IS NULL"));
                } else {
                    parts.push(format!("{col} = ?"));
                    params.push(to_sql(v));
                }
            }
            Filter::In(col, values) => {
                if values.is_empty() {
                    parts.push("1 = 0".to_string());
                } else {
                    let marks = vec!["?"; values.len()].join(", ");
                    parts.push(format!("{col} IN ({marks})"));
                    params.extend(values.iter().map(to_sql));
                }
            }
        }
    }
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

impl TableStore for SqliteTableStore {
    fn label(&self) -> &'static str {
        "sqlite"
    }

    fn insert(&mut self, table: Table, rows: Vec<Row>) -> Result<(), BackendError> {
        if rows.is_empty() {
            return Ok(());
        }
        let cols = table.columns();
        for row in &rows {
            for key in row.keys() {
                check_column(table, key)?;
            }
        }
        let sql = format!(
            "INSERT INTO {}({}) VALUES({})",
            table.name(),
            cols.join(", "),
            vec!["?"; cols.len()].join(", ")
        );

        let tx = self.conn.unchecked_transaction()?;
        for row in &rows {
            let values = cols
                .iter()
                .map(|c| row.get(*c).map(to_sql).unwrap_or(SqlValue::Null));
            if let Err(e) = tx.execute(&sql, params_from_iter(values)) {
                let _ = tx.rollback();
                return Err(e.into());
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn select(&mut self, table: Table, query: &Query) -> Result<Vec<Row>, BackendError> {
        let cols = table.columns();
        let mut params = Vec::new();
        let mut sql = format!("SELECT {} FROM {}", cols.join(", "), table.name());
        sql.push_str(&where_clause(table, &query.filters, &mut params)?);
        if !query.order.is_empty() {
            let mut keys = Vec::with_capacity(query.order.len());
            for (col, asc) in &query.order {
                check_column(table, col)?;
                keys.push(format!("{col} {}", if *asc { "ASC" } else { "DESC" }));
            }
            sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
        }
        if let Some(n) = query.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(params), |r| {
                let mut row = Row::new();
                for (i, c) in cols.iter().enumerate() {
                    row.insert((*c).to_string(), from_sql(r.get_ref(i)?));
                }
                Ok(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn update(
        &mut self,
        table: Table,
        filters: &[Filter],
        patch: Row,
    ) -> Result<usize, BackendError> {
        if filters.is_empty() {
            return Err(BackendError::Unfiltered("update"));
        }
        if patch.is_empty() {
            return Ok(0);
        }
        let mut params = Vec::new();
        let mut sets = Vec::with_capacity(patch.len());
        for (k, v) in &patch {
            check_column(table, k)?;
            sets.push(format!("{k} = ?"));
            params.push(to_sql(v));
        }
        let sql = format!(
            "UPDATE {} SET {}{}",
            table.name(),
            sets.join(", "),
            where_clause(table, filters, &mut params)?
        );
        Ok(self.conn.execute(&sql, params_from_iter(params))?)
    }

    fn delete(&mut self, table: Table, filters: &[Filter]) -> Result<usize, BackendError> {
        if filters.is_empty() {
            return Err(BackendError::Unfiltered("delete"));
        }
        let mut params = Vec::new();
        let sql = format!(
            "DELETE FROM {}{}",
            table.name(),
            where_clause(table, filters, &mut params)?
        );
        Ok(self.conn.execute(&sql, params_from_iter(params))?)
    }
}
