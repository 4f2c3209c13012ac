//! SQLite persistence layer.
//!
//! RULE: Only store.rs talks to the database.
//! The engine calls store methods: it never executes SQL directly.

use rusqlite::{params, Connection, OptionalExtension};
use crate::{
    error::{SimError, SimResult},
    event::{now_millis, ChangeLogEntry},
    types::Tick,
};

pub struct SimStore {
    conn: Connection,
}

impl SimStore {
    /// Open (or create) the simulation database at `path`.
    pub fn open(path: &str) -> SimResult<Self> {
        let conn = Connection::open(path)?;
        // WAL mode only matters for real files; in-memory ignores it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> SimResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> SimResult<()> {
        self.conn.execute_batch(include_str!("../../migrations/001_foundation.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn insert_run(&self, run_id: &str, seed: u64, version: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO run (run_id, seed, version, started_at) VALUES (?1, ?2, ?3, ?4)",
            params![run_id, seed as i64, version, now_millis()],
        )?;
        Ok(())
    }

    pub fn run_seed(&self, run_id: &str) -> SimResult<u64> {
        let seed: Option<i64> = self
            .conn
            .query_row("SELECT seed FROM run WHERE run_id = ?1", params![run_id], |row| row.get(0))
            .optional()?;
        seed.map(|s| s as u64).ok_or(SimError::RunNotInitialized)
    }

    // ── Change log ─────────────────────────────────────────────

    pub fn append_change(&self, run_id: &str, entry: &ChangeLogEntry) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO change_log (run_id, tick, change_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run_id,
                entry.tick as i64,
                entry.change_type,
                serde_json::to_string(&entry.data)?,
                entry.timestamp,
            ],
        )?;
        Ok(())
    }

    /// Every persisted change with tick > `since`, in insertion order.
    /// Unlike the in-memory ring this history is unbounded.
    pub fn changes_since(&self, run_id: &str, since: Tick) -> SimResult<Vec<ChangeLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT tick, change_type, payload, created_at
             FROM change_log WHERE run_id = ?1 AND tick > ?2
             ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![run_id, since as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(tick, change_type, payload, timestamp)| {
                Ok(ChangeLogEntry {
                    change_type,
                    data: serde_json::from_str(&payload)?,
                    tick,
                    timestamp,
                })
            })
            .collect()
    }

    // ── Snapshot ───────────────────────────────────────────────

    pub fn save_snapshot(&self, run_id: &str, tick: Tick, state_json: &str) -> SimResult<()> {
        self.conn.execute(
            "INSERT INTO snapshot (run_id, tick, state_json) VALUES (?1, ?2, ?3)",
            params![run_id, tick as i64, state_json],
        )?;
        Ok(())
    }

    /// The most recently written snapshot for the run.
    pub fn latest_snapshot(&self, run_id: &str) -> SimResult<Option<(Tick, String)>> {
        let result = self
            .conn
            .query_row(
                "SELECT tick, state_json FROM snapshot
                 WHERE run_id = ?1
                 ORDER BY id DESC LIMIT 1",
                params![run_id],
                |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(result)
    }

    pub fn snapshot_count(&self, run_id: &str) -> SimResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM snapshot WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Reset ──────────────────────────────────────────────────

    /// Wipe every snapshot and change row of the run and write
    /// `fresh_state_json` as its only snapshot, in one transaction.
    /// On error nothing is changed.
    pub fn reset_run(&self, run_id: &str, fresh_state_json: &str) -> SimResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM snapshot WHERE run_id = ?1", params![run_id])?;
        tx.execute("DELETE FROM change_log WHERE run_id = ?1", params![run_id])?;
        tx.execute(
            "INSERT INTO snapshot (run_id, tick, state_json) VALUES (?1, 0, ?2)",
            params![run_id, fresh_state_json],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SimStore {
        let store = SimStore::in_memory().unwrap();
        store.migrate().unwrap();
        store.insert_run("r", 7, "test").unwrap();
        store
    }

    #[test]
    fn changes_round_trip_in_order() {
        let store = store();
        for tick in 1..=3 {
            let entry = ChangeLogEntry {
                change_type: "t".into(),
                data: json!({ "tick": tick }),
                tick,
                timestamp: 0,
            };
            store.append_change("r", &entry).unwrap();
        }
        let since = store.changes_since("r", 1).unwrap();
        assert_eq!(since.len(), 2);
        assert_eq!(since[0].data, json!({ "tick": 2 }));
    }

    #[test]
    fn reset_leaves_one_snapshot() {
        let store = store();
        store.save_snapshot("r", 30, "{\"tick\":30}").unwrap();
        store.save_snapshot("r", 60, "{\"tick\":60}").unwrap();
        store.reset_run("r", "{\"tick\":0}").unwrap();
        assert_eq!(store.snapshot_count("r").unwrap(), 1);
        assert_eq!(store.latest_snapshot("r").unwrap(), Some((0, "{\"tick\":0}".to_string())));
        assert!(store.changes_since("r", 0).unwrap().is_empty());
    }

    #[test]
    fn unknown_run_is_reported() {
        let store = store();
        assert_eq!(store.run_seed("r").unwrap(), 7);
        assert!(matches!(store.run_seed("nope"), Err(SimError::RunNotInitialized)));
    }
}
