//! High-level database interface.
//!
//! A single Mutex-protected connection is enough for a local agent; WAL mode
//! keeps concurrent readers cheap.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use tracing::info;

use warden_core::credentials::Credential;
use warden_core::protection::ProtectionState;

use crate::error::{Result, StorageError};
use crate::models::{NewScanEvent, ScanEventRecord, TransitionRecord};
use crate::schema::run_migrations;

/// Maximum characters kept in a URL preview.
const PREVIEW_LEN: usize = 96;

const SETTING_PROTECTION_STATE: &str = "protection_state";
const SETTING_CREDENTIAL: &str = "credential";

/// Hashes a URL for privacy-preserving persistence.
pub fn hash_url(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Truncates a URL for display, on a char boundary.
pub fn create_preview(url: &str) -> String {
    if url.chars().count() <= PREVIEW_LEN {
        url.to_string()
    } else {
        let truncated: String = url.chars().take(PREVIEW_LEN).collect();
        format!("{truncated}…")
    }
}

/// High-level database interface for Warden.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Opens (or creates) the database in the default app data directory.
    pub fn new() -> Result<Self> {
        let path = Self::default_db_path()?;
        Self::with_path(path)
    }

    /// Opens (or creates) the database at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database at: {:?}", path);
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Creates an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Returns the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "warden", "warden")
            .ok_or_else(|| StorageError::Config("Could not determine app data directory".into()))?;
        Ok(proj_dirs.data_dir().join("warden.db"))
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Config("database connection poisoned".to_string()))
    }

    // === Settings ===

    /// Reads a raw setting value.
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Writes a raw setting value.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// Removes a setting.
    pub fn remove_setting(&self, key: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM settings WHERE key = ?1", [key])?;
        Ok(())
    }

    /// Returns the persisted protection state, defaulting to active.
    pub fn protection_state(&self) -> Result<ProtectionState> {
        match self.get_setting(SETTING_PROTECTION_STATE)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(ProtectionState::Active),
        }
    }

    /// Persists the protection state.
    pub fn set_protection_state(&self, state: ProtectionState) -> Result<()> {
        self.set_setting(SETTING_PROTECTION_STATE, &serde_json::to_string(&state)?)
    }

    /// Returns the persisted scan-service credential, if any.
    pub fn load_credential(&self) -> Result<Option<Credential>> {
        match self.get_setting(SETTING_CREDENTIAL)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Persists the scan-service credential.
    pub fn save_credential(&self, credential: &Credential) -> Result<()> {
        self.set_setting(SETTING_CREDENTIAL, &serde_json::to_string(credential)?)
    }

    /// Removes the persisted credential.
    pub fn clear_credential(&self) -> Result<()> {
        self.remove_setting(SETTING_CREDENTIAL)
    }

    // === Transition journal ===

    /// Appends a pending-download state transition.
    ///
    /// Callers record the transition before attempting the matching host
    /// side effect.
    pub fn record_transition(
        &self,
        download_key: &str,
        url: &str,
        from_state: &str,
        to_state: &str,
        detail: Option<&str>,
    ) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO transitions (download_key, url_hash, from_state, to_state, detail, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                download_key,
                hash_url(url),
                from_state,
                to_state,
                detail,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All recorded transitions for one download, oldest first.
    pub fn transitions_for(&self, download_key: &str) -> Result<Vec<TransitionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, download_key, url_hash, from_state, to_state, detail, created_at
             FROM transitions WHERE download_key = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map([download_key], row_to_transition)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// Download keys whose latest recorded state is not terminal.
    ///
    /// After a restart these are the remnants of flows that never finished;
    /// the janitor collects them.
    pub fn unresolved_keys(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT download_key FROM transitions
             WHERE id IN (SELECT MAX(id) FROM transitions GROUP BY download_key)
               AND to_state NOT LIKE 'terminal%'",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// Drops all journal entries for a download.
    pub fn purge_download(&self, download_key: &str) -> Result<usize> {
        let conn = self.lock()?;
        let purged = conn.execute(
            "DELETE FROM transitions WHERE download_key = ?1",
            [download_key],
        )?;
        Ok(purged)
    }

    // === Scan-event log ===

    /// Appends a scan event for popup display.
    pub fn log_scan_event(&self, event: NewScanEvent) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO scan_events (url_hash, preview, kind, status, threat_level, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                hash_url(&event.url),
                create_preview(&event.url),
                event.kind,
                event.status,
                event.threat_level,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent scan events, newest first.
    pub fn recent_scan_events(&self, limit: i64) -> Result<Vec<ScanEventRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, url_hash, preview, kind, status, threat_level, created_at
             FROM scan_events ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], row_to_scan_event)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Into::into)
    }

    /// Removes every scan event. Returns how many were removed.
    pub fn clear_scan_events(&self) -> Result<usize> {
        let conn = self.lock()?;
        let cleared = conn.execute("DELETE FROM scan_events", [])?;
        Ok(cleared)
    }
}

fn parse_timestamp(raw: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_transition(row: &rusqlite::Row<'_>) -> rusqlite::Result<TransitionRecord> {
    Ok(TransitionRecord {
        id: row.get(0)?,
        download_key: row.get(1)?,
        url_hash: row.get(2)?,
        from_state: row.get(3)?,
        to_state: row.get(4)?,
        detail: row.get(5)?,
        created_at: parse_timestamp(row.get(6)?),
    })
}

fn row_to_scan_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScanEventRecord> {
    Ok(ScanEventRecord {
        id: row.get(0)?,
        url_hash: row.get(1)?,
        preview: row.get(2)?,
        kind: row.get(3)?,
        status: row.get(4)?,
        threat_level: row.get(5)?,
        created_at: parse_timestamp(row.get(6)?),
    })
}
