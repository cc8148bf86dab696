use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "classpoints.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classrooms(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_classrooms_user ON classrooms(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_classroom ON students(classroom_id)",
        [],
    )?;

    // No foreign key on student_id: removing a student keeps their history.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS point_transactions(
            id TEXT PRIMARY KEY,
            classroom_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            behavior_name TEXT NOT NULL,
            behavior_icon TEXT NOT NULL,
            points INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            batch_id TEXT,
            FOREIGN KEY(classroom_id) REFERENCES classrooms(id)
        )",
        [],
    )?;
    // Workspaces created before notes existed lack the column.
    ensure_point_transactions_note(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_point_transactions_classroom ON point_transactions(classroom_id, created_at)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_point_transactions_student ON point_transactions(student_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_point_transactions_batch ON point_transactions(batch_id)",
        [],
    )?;

    Ok(())
}

fn ensure_point_transactions_note(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "point_transactions", "note")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE point_transactions ADD COLUMN note TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent_and_adds_note_column() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute(
            "CREATE TABLE classrooms(id TEXT PRIMARY KEY, user_id TEXT NOT NULL, name TEXT NOT NULL, created_at TEXT NOT NULL)",
            [],
        )
        .expect("legacy classrooms");
        conn.execute(
            "CREATE TABLE point_transactions(
                id TEXT PRIMARY KEY, classroom_id TEXT NOT NULL, student_id TEXT NOT NULL,
                behavior_name TEXT NOT NULL, behavior_icon TEXT NOT NULL, points INTEGER NOT NULL,
                created_at TEXT NOT NULL, batch_id TEXT)",
            [],
        )
        .expect("legacy point_transactions");
        assert!(!table_has_column(&conn, "point_transactions", "note").expect("probe"));

        init_schema(&conn).expect("first init");
        init_schema(&conn).expect("second init");
        assert!(table_has_column(&conn, "point_transactions", "note").expect("probe"));
    }
}
