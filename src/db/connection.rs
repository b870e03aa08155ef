// src/db/connection.rs
use rusqlite::Connection;
use std::cell::RefCell;
use std::collections::HashMap;

use crate::errors::OverlayError;

// One lazily opened connection per database path, per thread.
thread_local! {
    static DB_CONNS: RefCell<HashMap<String, Connection>> = RefCell::new(HashMap::new());
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS prefs (
    key        TEXT PRIMARY KEY,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

#[derive(Clone, Debug)]
pub struct Database {
    path: String,
}

impl Database {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Provides a mutable connection to the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, OverlayError>
    where
        F: FnOnce(&mut Connection) -> Result<T, OverlayError>,
    {
        DB_CONNS
            .try_with(|cell| {
                let mut conns = cell.borrow_mut();
                if !conns.contains_key(&self.path) {
                    let conn = Connection::open(&self.path)
                        .map_err(|e| OverlayError::Db(format!("open {} failed: {e}", self.path)))?;
                    conns.insert(self.path.clone(), conn);
                }
                match conns.get_mut(&self.path) {
                    Some(conn) => f(conn),
                    None => Err(OverlayError::Db("connection slot vanished".into())),
                }
            })
            .map_err(|_| OverlayError::Db("thread-local connection unavailable".into()))?
    }

    /// Creates the preferences table if it does not exist.
    pub fn init(&self) -> Result<(), OverlayError> {
        self.with_conn(|conn| {
            conn.execute_batch(SCHEMA)
                .map_err(|e| OverlayError::Db(format!("schema init failed: {e}")))
        })
    }
}
