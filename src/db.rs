//! Record store for questline.
//!
//! A single SQLite table holds JSON record bodies addressed by
//! (collection, key). The engine keeps a full in-memory mirror, so the
//! store only needs get/set/list-all semantics per named collection;
//! each write is all-or-nothing for its record.

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Mutex;

use crate::clock;

/// Thread-safe store wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(path).context("Failed to open database")?;
        Self::from_conn(conn)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_conn(conn)
    }

    fn from_conn(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;
        Ok(db)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            );

            CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection);
            "#,
        )?;

        Ok(())
    }

    /// Fetch one record, None when absent.
    pub fn get<T: DeserializeOwned>(&self, collection: &str, key: &str) -> Result<Option<T>> {
        let conn = self.conn.lock().unwrap();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM records WHERE collection = ?1 AND key = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .ok();

        match body {
            Some(text) => {
                let record = serde_json::from_str(&text)
                    .with_context(|| format!("Corrupt record in {collection}/{key}"))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Insert or overwrite one record.
    pub fn set<T: Serialize>(&self, collection: &str, key: &str, record: &T) -> Result<()> {
        let body = serde_json::to_string(record)
            .with_context(|| format!("Failed to serialize record for {collection}/{key}"))?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO records (collection, key, body, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![collection, key, body, clock::now_stamp()],
        )
        .with_context(|| format!("Failed to write {collection}/{key}"))?;
        Ok(())
    }

    /// All records in a collection.
    pub fn all<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT body FROM records WHERE collection = ?1")?;
        let rows = stmt.query_map(params![collection], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for body in rows {
            let text = body?;
            let record = serde_json::from_str(&text)
                .with_context(|| format!("Corrupt record in {collection}"))?;
            records.push(record);
        }
        Ok(records)
    }

    /// Write several records to one collection in a single transaction.
    pub fn bulk_set<T: Serialize>(&self, collection: &str, records: &[(String, T)]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO records (collection, key, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let now = clock::now_stamp();
            for (key, record) in records {
                let body = serde_json::to_string(record)
                    .with_context(|| format!("Failed to serialize record for {collection}/{key}"))?;
                stmt.execute(params![collection, key, body, now])?;
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to commit bulk write to {collection}"))?;
        Ok(())
    }

    /// Remove one record; removing an absent record is not an error.
    pub fn delete(&self, collection: &str, key: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND key = ?2",
            params![collection, key],
        )
        .with_context(|| format!("Failed to delete {collection}/{key}"))?;
        Ok(())
    }

    /// Remove several records from one collection in a single transaction.
    pub fn bulk_delete(&self, collection: &str, keys: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt =
                tx.prepare("DELETE FROM records WHERE collection = ?1 AND key = ?2")?;
            for key in keys {
                stmt.execute(params![collection, key])?;
            }
        }
        tx.commit()
            .with_context(|| format!("Failed to commit bulk delete from {collection}"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;

    fn sample_task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            title: "write tests".to_string(),
            points: 10,
            due_at: None,
            completed_at: None,
            created_at: "2025-06-11T08:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn set_get_roundtrip_and_overwrite() {
        let db = Database::open_in_memory().unwrap();
        let task = sample_task("t1");
        db.set("tasks", "t1", &task).unwrap();

        let loaded: Task = db.get("tasks", "t1").unwrap().unwrap();
        assert_eq!(loaded.title, "write tests");

        let mut updated = task;
        updated.points = 25;
        db.set("tasks", "t1", &updated).unwrap();
        let loaded: Task = db.get("tasks", "t1").unwrap().unwrap();
        assert_eq!(loaded.points, 25);
    }

    #[test]
    fn get_missing_is_none() {
        let db = Database::open_in_memory().unwrap();
        let loaded: Option<Task> = db.get("tasks", "nope").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn collections_are_isolated() {
        let db = Database::open_in_memory().unwrap();
        db.set("tasks", "x", &sample_task("x")).unwrap();
        let other: Vec<Task> = db.all("events").unwrap();
        assert!(other.is_empty());
        let tasks: Vec<Task> = db.all("tasks").unwrap();
        assert_eq!(tasks.len(), 1);
    }

    #[test]
    fn bulk_set_and_bulk_delete() {
        let db = Database::open_in_memory().unwrap();
        let batch: Vec<(String, Task)> = (0..3)
            .map(|i| {
                let id = format!("t{i}");
                (id.clone(), sample_task(&id))
            })
            .collect();
        db.bulk_set("tasks", &batch).unwrap();
        assert_eq!(db.all::<Task>("tasks").unwrap().len(), 3);

        db.bulk_delete("tasks", &["t0".to_string(), "t2".to_string()])
            .unwrap();
        let rest: Vec<Task> = db.all("tasks").unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "t1");
    }

    #[test]
    fn delete_missing_is_ok() {
        let db = Database::open_in_memory().unwrap();
        db.delete("tasks", "ghost").unwrap();
    }
}
