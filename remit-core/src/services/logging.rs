//! Security event log - privacy-safe audit trail in DuckDB
//!
//! Events live in their own `events.duckdb`, separate from user data. Only
//! event names, ids and non-PII details are ever stored: never passwords,
//! tokens, names, ID numbers or account numbers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::log_migrations::LOG_MIGRATIONS;
use crate::services::MigrationService;

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique ID based on timestamp + counter
fn generate_id() -> u64 {
    let timestamp = Utc::now().timestamp_millis().max(0) as u64;
    // Lower 16 bits: counter (65536 unique IDs per millisecond)
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    (timestamp << 16) | counter
}

/// Detect the current platform
fn detect_platform() -> &'static str {
    if cfg!(target_os = "macos") {
        "macos"
    } else if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "linux") {
        "linux"
    } else {
        "unknown"
    }
}

/// Security-relevant things that happen to accounts and payments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEvent {
    Registered,
    LoginSucceeded,
    LoginFailed,
    AccountLocked,
    LoginRejectedLocked,
    TokenRejected,
    DecryptionFailed,
    PaymentSubmitted,
    PaymentStatusChanged,
    StatusOverride,
    AccountUnlocked,
    UserDeleted,
    KeysRotated,
}

impl SecurityEvent {
    pub const ALL: [SecurityEvent; 13] = [
        SecurityEvent::Registered,
        SecurityEvent::LoginSucceeded,
        SecurityEvent::LoginFailed,
        SecurityEvent::AccountLocked,
        SecurityEvent::LoginRejectedLocked,
        SecurityEvent::TokenRejected,
        SecurityEvent::DecryptionFailed,
        SecurityEvent::PaymentSubmitted,
        SecurityEvent::PaymentStatusChanged,
        SecurityEvent::StatusOverride,
        SecurityEvent::AccountUnlocked,
        SecurityEvent::UserDeleted,
        SecurityEvent::KeysRotated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEvent::Registered => "registered",
            SecurityEvent::LoginSucceeded => "login_succeeded",
            SecurityEvent::LoginFailed => "login_failed",
            SecurityEvent::AccountLocked => "account_locked",
            SecurityEvent::LoginRejectedLocked => "login_rejected_locked",
            SecurityEvent::TokenRejected => "token_rejected",
            SecurityEvent::DecryptionFailed => "decryption_failed",
            SecurityEvent::PaymentSubmitted => "payment_submitted",
            SecurityEvent::PaymentStatusChanged => "payment_status_changed",
            SecurityEvent::StatusOverride => "status_override",
            SecurityEvent::AccountUnlocked => "account_unlocked",
            SecurityEvent::UserDeleted => "user_deleted",
            SecurityEvent::KeysRotated => "keys_rotated",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.as_str() == value)
    }
}

/// A log event to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub event: SecurityEvent,
    /// Account the event concerns
    pub user_id: Option<Uuid>,
    /// Secondary record (payment id, acting admin id, field name)
    pub subject_id: Option<String>,
    /// Short non-PII detail, e.g. `pending->processing`
    pub detail: Option<String>,
}

impl LogEvent {
    pub fn new(event: SecurityEvent) -> Self {
        Self {
            event,
            user_id: None,
            subject_id: None,
            detail: None,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject_id = Some(subject.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// A log entry as stored in the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    /// Unix milliseconds
    pub timestamp: i64,
    pub app_version: String,
    pub platform: String,
    pub event: String,
    pub user_id: Option<String>,
    pub subject_id: Option<String>,
    pub detail: Option<String>,
}

const ENTRY_COLUMNS: &str =
    "id, timestamp, app_version, platform, event, user_id, subject_id, detail";

fn read_entry(row: &duckdb::Row) -> duckdb::Result<LogEntry> {
    Ok(LogEntry {
        id: row.get(0)?,
        timestamp: row.get(1)?,
        app_version: row.get(2)?,
        platform: row.get(3)?,
        event: row.get(4)?,
        user_id: row.get(5)?,
        subject_id: row.get(6)?,
        detail: row.get(7)?,
    })
}

/// Service for security event logging
pub struct LoggingService {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    app_version: String,
    platform: &'static str,
}

impl LoggingService {
    /// Open or create `events.duckdb` in `data_dir` and run pending migrations
    pub fn new(data_dir: &Path, app_version: impl Into<String>) -> Result<Self> {
        let db_path = data_dir.join("events.duckdb");
        let conn = Connection::open(&db_path)?;
        Self::from_connection(conn, Some(db_path), app_version.into())
    }

    /// Event log that disappears with the process (tests)
    pub fn in_memory(app_version: impl Into<String>) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None, app_version.into())
    }

    fn from_connection(
        conn: Connection,
        db_path: Option<PathBuf>,
        app_version: String,
    ) -> Result<Self> {
        MigrationService::new(&conn, LOG_MIGRATIONS).run_pending()?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
            app_version,
            platform: detect_platform(),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Write an event
    pub fn log(&self, event: LogEvent) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            &format!(
                "INSERT INTO sys_security_events ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                ENTRY_COLUMNS
            ),
            duckdb::params![
                generate_id(),
                Utc::now().timestamp_millis(),
                &self.app_version,
                self.platform,
                event.event.as_str(),
                event.user_id.map(|u| u.to_string()),
                &event.subject_id,
                &event.detail,
            ],
        )?;
        Ok(())
    }

    /// Write an event without letting a logging failure reach the caller.
    ///
    /// Mirrors the event to `tracing` as well.
    pub fn record(&self, event: LogEvent) {
        tracing::info!(
            event = event.event.as_str(),
            user_id = ?event.user_id,
            subject_id = ?event.subject_id,
            detail = ?event.detail,
            "security event"
        );
        if let Err(e) = self.log(event) {
            tracing::warn!(error = %e, "failed to write security event");
        }
    }

    /// Most recent entries first
    pub fn recent(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_security_events ORDER BY id DESC LIMIT ?",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map([limit as i64], read_entry)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Entries concerning one account, most recent first
    pub fn for_user(&self, user_id: Uuid, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_security_events WHERE user_id = ? ORDER BY id DESC LIMIT ?",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(duckdb::params![user_id.to_string(), limit as i64], read_entry)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Entries of one kind, most recent first
    pub fn by_event(&self, event: SecurityEvent, limit: usize) -> Result<Vec<LogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sys_security_events WHERE event = ? ORDER BY id DESC LIMIT ?",
            ENTRY_COLUMNS
        ))?;
        let entries = stmt
            .query_map(duckdb::params![event.as_str(), limit as i64], read_entry)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(entries)
    }

    /// Get the total number of entries
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn()?;
        let count: u64 =
            conn.query_row("SELECT COUNT(*) FROM sys_security_events", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Path to the events database (`None` in memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_logging_service_creation() {
        let dir = tempdir().unwrap();
        let service = LoggingService::new(dir.path(), "1.0.0").unwrap();
        assert!(service.db_path().unwrap().exists());
        assert_eq!(service.count().unwrap(), 0);
    }

    #[test]
    fn test_log_event() {
        let service = LoggingService::in_memory("1.0.0").unwrap();
        let user = Uuid::new_v4();
        service
            .log(LogEvent::new(SecurityEvent::LoginFailed).with_user(user))
            .unwrap();

        let entries = service.recent(10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "login_failed");
        assert_eq!(entries[0].user_id, Some(user.to_string()));
        assert_eq!(entries[0].app_version, "1.0.0");
    }

    #[test]
    fn test_recent_is_newest_first() {
        let service = LoggingService::in_memory("1.0.0").unwrap();
        service.record(LogEvent::new(SecurityEvent::Registered));
        service.record(LogEvent::new(SecurityEvent::LoginSucceeded));
        service.record(LogEvent::new(SecurityEvent::KeysRotated).with_detail("3 records"));

        let entries = service.recent(2).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].event, "keys_rotated");
        assert_eq!(entries[0].detail.as_deref(), Some("3 records"));
        assert_eq!(entries[1].event, "login_succeeded");
    }

    #[test]
    fn test_for_user_and_by_event() {
        let service = LoggingService::in_memory("1.0.0").unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        service.record(LogEvent::new(SecurityEvent::LoginFailed).with_user(a));
        service.record(LogEvent::new(SecurityEvent::LoginFailed).with_user(b));
        service.record(LogEvent::new(SecurityEvent::AccountLocked).with_user(a));

        let for_a = service.for_user(a, 10).unwrap();
        assert_eq!(for_a.len(), 2);
        assert_eq!(for_a[0].event, "account_locked");

        let failures = service.by_event(SecurityEvent::LoginFailed, 10).unwrap();
        assert_eq!(failures.len(), 2);
    }

    #[test]
    fn test_event_names_round_trip() {
        for event in SecurityEvent::ALL {
            assert_eq!(SecurityEvent::parse(event.as_str()), Some(event));
        }
        assert_eq!(SecurityEvent::parse("nope"), None);
    }
}
