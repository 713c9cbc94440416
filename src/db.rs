use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS category (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS location (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS txn (
    id INTEGER PRIMARY KEY,
    date TEXT NOT NULL,
    amount INTEGER NOT NULL,
    description TEXT NOT NULL,
    source TEXT NOT NULL,
    balance INTEGER NOT NULL DEFAULT 0,
    pending INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS txn_source_date ON txn (source, date, id);

CREATE TABLE IF NOT EXISTS allocation (
    id INTEGER PRIMARY KEY,
    amount INTEGER NOT NULL,
    txn_id INTEGER NOT NULL,
    category_id INTEGER NOT NULL DEFAULT 1,
    location_id INTEGER NOT NULL DEFAULT 1,
    note TEXT,
    FOREIGN KEY (txn_id) REFERENCES txn(id) ON DELETE CASCADE,
    FOREIGN KEY (category_id) REFERENCES category(id),
    FOREIGN KEY (location_id) REFERENCES location(id)
);

CREATE TABLE IF NOT EXISTS imports (
    id INTEGER PRIMARY KEY,
    source TEXT NOT NULL,
    import_date TEXT DEFAULT (datetime('now')),
    record_count INTEGER NOT NULL,
    inserted INTEGER NOT NULL,
    updated INTEGER NOT NULL,
    unchanged INTEGER NOT NULL,
    deleted INTEGER NOT NULL,
    anomalies INTEGER NOT NULL,
    date_range_start TEXT,
    date_range_end TEXT,
    checksum TEXT
);
";

/// Name of the category and location every new allocation starts with.
pub const UNKNOWN: &str = "Unknown";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    // Row 1 of both tables is the default allocation target.
    conn.execute("INSERT OR IGNORE INTO category (id, name) VALUES (1, ?1)", [UNKNOWN])?;
    conn.execute("INSERT OR IGNORE INTO location (id, name) VALUES (1, ?1)", [UNKNOWN])?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
    let dir = tempfile::tempdir().unwrap();
    let conn = get_connection(&dir.path().join("test.db")).unwrap();
    init_db(&conn).unwrap();
    (dir, conn)
}
