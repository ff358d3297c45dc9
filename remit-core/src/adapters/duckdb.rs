//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use duckdb::{params, Connection, ToSql};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::PaymentStatus;
use crate::migrations::MIGRATIONS;
use crate::ports::{
    BeneficiaryEnvelopes, FailedLoginUpdate, Repository, StoredPayment, StoredUser,
    UserPiiEnvelopes,
};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const USER_COLUMNS: &str = "user_id, username, email, password_hash, role, login_attempts, \
     lock_until, full_name_enc, id_number_enc, account_number_enc, last_login_at, \
     created_at, updated_at, deleted_at";

const PAYMENT_COLUMNS: &str = "payment_id, user_id, CAST(amount AS VARCHAR), currency, provider, \
     beneficiary_name_enc, beneficiary_account_enc, swift_code_enc, beneficiary_country, \
     reference, status, status_updated_by, created_at, updated_at, deleted_at";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

fn is_constraint_violation(err: &duckdb::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("duplicate key") || msg.contains("constraint")
}

fn fmt_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("invalid timestamp '{}': {}", value, e)))
}

fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(parse_ts).transpose()
}

fn millis_to_ts(ms: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| Error::database(format!("invalid lock timestamp {}", ms)))
}

fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::database(format!("invalid id '{}': {}", value, e)))
}

/// User columns exactly as DuckDB returns them
struct UserRow {
    id: String,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    login_attempts: i32,
    lock_until: Option<i64>,
    full_name_enc: Option<String>,
    id_number_enc: Option<String>,
    account_number_enc: Option<String>,
    last_login_at: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl UserRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            role: row.get(4)?,
            login_attempts: row.get(5)?,
            lock_until: row.get(6)?,
            full_name_enc: row.get(7)?,
            id_number_enc: row.get(8)?,
            account_number_enc: row.get(9)?,
            last_login_at: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
            deleted_at: row.get(13)?,
        })
    }

    fn into_stored(self) -> Result<StoredUser> {
        Ok(StoredUser {
            id: parse_uuid(&self.id)?,
            username: self.username,
            email: self.email,
            password_hash: self.password_hash,
            role: self.role,
            login_attempts: self.login_attempts.max(0) as u32,
            lock_until: self.lock_until.map(millis_to_ts).transpose()?,
            full_name_enc: self.full_name_enc,
            id_number_enc: self.id_number_enc,
            account_number_enc: self.account_number_enc,
            last_login_at: parse_opt_ts(self.last_login_at)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            deleted_at: parse_opt_ts(self.deleted_at)?,
        })
    }
}

/// Payment columns exactly as DuckDB returns them
struct PaymentRow {
    id: String,
    user_id: String,
    amount: String,
    currency: String,
    provider: String,
    beneficiary_name_enc: Option<String>,
    beneficiary_account_enc: Option<String>,
    swift_code_enc: Option<String>,
    beneficiary_country: String,
    reference: Option<String>,
    status: String,
    status_updated_by: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl PaymentRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: row.get(2)?,
            currency: row.get(3)?,
            provider: row.get(4)?,
            beneficiary_name_enc: row.get(5)?,
            beneficiary_account_enc: row.get(6)?,
            swift_code_enc: row.get(7)?,
            beneficiary_country: row.get(8)?,
            reference: row.get(9)?,
            status: row.get(10)?,
            status_updated_by: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
            deleted_at: row.get(14)?,
        })
    }

    fn into_stored(self) -> Result<StoredPayment> {
        Ok(StoredPayment {
            id: parse_uuid(&self.id)?,
            user_id: parse_uuid(&self.user_id)?,
            amount: Decimal::from_str(&self.amount)
                .map_err(|e| Error::database(format!("invalid amount '{}': {}", self.amount, e)))?,
            currency: self.currency,
            provider: self.provider,
            beneficiary_name_enc: self.beneficiary_name_enc,
            beneficiary_account_enc: self.beneficiary_account_enc,
            swift_code_enc: self.swift_code_enc,
            beneficiary_country: self.beneficiary_country,
            reference: self.reference,
            status: self.status,
            status_updated_by: self.status_updated_by.as_deref().map(parse_uuid).transpose()?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            deleted_at: parse_opt_ts(self.deleted_at)?,
        })
    }
}

/// DuckDB repository implementation
///
/// One connection behind a mutex. Each repository method runs a single
/// statement, which DuckDB executes atomically under autocommit.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a database file.
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max_retries = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::database(format!("Failed to open database after {} retries", MAX_RETRIES))
        }))
    }

    /// In-memory database (tests, throwaway tooling)
    pub fn in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Self {
            conn: Mutex::new(Connection::open_in_memory_with_flags(config)?),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| Error::database(format!("Lock poisoned: {}", e)))
    }

    /// Run database migrations
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn, MIGRATIONS).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    fn query_users(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<StoredUser>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, UserRow::read)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(UserRow::into_stored).collect()
    }

    fn query_payments(&self, sql: &str, params: &[&dyn ToSql]) -> Result<Vec<StoredPayment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, PaymentRow::read)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        rows.into_iter().map(PaymentRow::into_stored).collect()
    }

    fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<usize> {
        let conn = self.conn()?;
        Ok(conn.execute(sql, params)?)
    }
}

#[async_trait]
impl Repository for DuckDbRepository {
    // === Users ===

    async fn insert_user(&self, user: &StoredUser) -> Result<()> {
        let conn = self.conn()?;
        let result = conn.execute(
            &format!(
                "INSERT INTO sys_users ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                USER_COLUMNS
            ),
            params![
                user.id.to_string(),
                user.username,
                user.email,
                user.password_hash,
                user.role,
                user.login_attempts,
                user.lock_until.map(|t| t.timestamp_millis()),
                user.full_name_enc,
                user.id_number_enc,
                user.account_number_enc,
                user.last_login_at.map(fmt_ts),
                fmt_ts(user.created_at),
                fmt_ts(user.updated_at),
                user.deleted_at.map(fmt_ts),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(e) if is_constraint_violation(&e) => Err(Error::Conflict(
                "Username or email is already registered".to_string(),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<StoredUser>> {
        let users = self.query_users(
            &format!(
                "SELECT {} FROM sys_users WHERE user_id = ? AND deleted_at IS NULL",
                USER_COLUMNS
            ),
            params![id.to_string()],
        )?;
        Ok(users.into_iter().next())
    }

    async fn find_user_by_login(&self, login: &str) -> Result<Option<StoredUser>> {
        let users = self.query_users(
            &format!(
                "SELECT {} FROM sys_users
                 WHERE (username = ? OR email = ?) AND deleted_at IS NULL
                 LIMIT 1",
                USER_COLUMNS
            ),
            params![login, login],
        )?;
        Ok(users.into_iter().next())
    }

    async fn list_users(&self) -> Result<Vec<StoredUser>> {
        self.query_users(
            &format!(
                "SELECT {} FROM sys_users WHERE deleted_at IS NULL ORDER BY created_at",
                USER_COLUMNS
            ),
            params![],
        )
    }

    async fn update_user_pii(
        &self,
        id: Uuid,
        pii: &UserPiiEnvelopes,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.execute(
            "UPDATE sys_users
             SET full_name_enc = ?, id_number_enc = ?, account_number_enc = ?, updated_at = ?
             WHERE user_id = ? AND deleted_at IS NULL",
            params![
                pii.full_name,
                pii.id_number,
                pii.account_number,
                fmt_ts(now),
                id.to_string()
            ],
        )?;
        Ok(changed > 0)
    }

    async fn rewrap_user_pii(
        &self,
        id: Uuid,
        old: &UserPiiEnvelopes,
        new: &UserPiiEnvelopes,
    ) -> Result<bool> {
        let changed = self.execute(
            "UPDATE sys_users
             SET full_name_enc = ?, id_number_enc = ?, account_number_enc = ?
             WHERE user_id = ? AND deleted_at IS NULL
               AND full_name_enc IS NOT DISTINCT FROM ?
               AND id_number_enc IS NOT DISTINCT FROM ?
               AND account_number_enc IS NOT DISTINCT FROM ?",
            params![
                new.full_name,
                new.id_number,
                new.account_number,
                id.to_string(),
                old.full_name,
                old.id_number,
                old.account_number
            ],
        )?;
        Ok(changed > 0)
    }

    async fn update_password_hash(&self, id: Uuid, hash: &str, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.execute(
            "UPDATE sys_users SET password_hash = ?, updated_at = ?
             WHERE user_id = ? AND deleted_at IS NULL",
            params![hash, fmt_ts(now), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        threshold: u32,
        lock_until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<FailedLoginUpdate>> {
        let conn = self.conn()?;
        // Read-modify-write happens inside one statement; the WHERE clause
        // refuses to count attempts against an account that is locked.
        let mut stmt = conn.prepare(
            "UPDATE sys_users SET
                login_attempts = CASE WHEN login_attempts + 1 >= ? THEN 0 ELSE login_attempts + 1 END,
                lock_until = CASE WHEN login_attempts + 1 >= ? THEN ? ELSE NULL END,
                updated_at = ?
             WHERE user_id = ?
               AND deleted_at IS NULL
               AND (lock_until IS NULL OR lock_until <= ?)
             RETURNING login_attempts, lock_until",
        )?;
        let mut rows = stmt.query(params![
            threshold,
            threshold,
            lock_until.timestamp_millis(),
            fmt_ts(now),
            id.to_string(),
            now.timestamp_millis(),
        ])?;

        match rows.next()? {
            Some(row) => {
                let attempts: i32 = row.get(0)?;
                let locked: Option<i64> = row.get(1)?;
                Ok(Some(FailedLoginUpdate {
                    login_attempts: attempts.max(0) as u32,
                    lock_until: locked.map(millis_to_ts).transpose()?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn reset_login_state(
        &self,
        id: Uuid,
        last_login_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.execute(
            "UPDATE sys_users
             SET login_attempts = 0, lock_until = NULL,
                 last_login_at = COALESCE(?, last_login_at), updated_at = ?
             WHERE user_id = ? AND deleted_at IS NULL",
            params![last_login_at.map(fmt_ts), fmt_ts(now), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    async fn soft_delete_user(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.execute(
            "UPDATE sys_users SET deleted_at = ?, updated_at = ?
             WHERE user_id = ? AND deleted_at IS NULL",
            params![fmt_ts(now), fmt_ts(now), id.to_string()],
        )?;
        Ok(changed > 0)
    }

    // === Payments ===

    async fn insert_payment(&self, payment: &StoredPayment) -> Result<()> {
        self.execute(
            "INSERT INTO sys_payments (payment_id, user_id, amount, currency, provider,
                                       beneficiary_name_enc, beneficiary_account_enc, swift_code_enc,
                                       beneficiary_country, reference, status, status_updated_by,
                                       created_at, updated_at, deleted_at)
             VALUES (?, ?, CAST(? AS DECIMAL(18, 2)), ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                payment.id.to_string(),
                payment.user_id.to_string(),
                payment.amount.to_string(),
                payment.currency,
                payment.provider,
                payment.beneficiary_name_enc,
                payment.beneficiary_account_enc,
                payment.swift_code_enc,
                payment.beneficiary_country,
                payment.reference,
                payment.status,
                payment.status_updated_by.map(|u| u.to_string()),
                fmt_ts(payment.created_at),
                fmt_ts(payment.updated_at),
                payment.deleted_at.map(fmt_ts),
            ],
        )?;
        Ok(())
    }

    async fn find_payment(&self, id: Uuid) -> Result<Option<StoredPayment>> {
        let payments = self.query_payments(
            &format!(
                "SELECT {} FROM sys_payments WHERE payment_id = ? AND deleted_at IS NULL",
                PAYMENT_COLUMNS
            ),
            params![id.to_string()],
        )?;
        Ok(payments.into_iter().next())
    }

    async fn list_payments_for_user(&self, user_id: Uuid) -> Result<Vec<StoredPayment>> {
        self.query_payments(
            &format!(
                "SELECT {} FROM sys_payments
                 WHERE user_id = ? AND deleted_at IS NULL
                 ORDER BY created_at DESC",
                PAYMENT_COLUMNS
            ),
            params![user_id.to_string()],
        )
    }

    async fn list_payments(&self, status: Option<PaymentStatus>) -> Result<Vec<StoredPayment>> {
        match status {
            Some(status) => self.query_payments(
                &format!(
                    "SELECT {} FROM sys_payments
                     WHERE status = ? AND deleted_at IS NULL
                     ORDER BY created_at DESC",
                    PAYMENT_COLUMNS
                ),
                params![status.as_str()],
            ),
            None => self.list_all_payments().await,
        }
    }

    async fn update_payment_status(
        &self,
        id: Uuid,
        from: PaymentStatus,
        to: PaymentStatus,
        actor: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.execute(
            "UPDATE sys_payments SET status = ?, status_updated_by = ?, updated_at = ?
             WHERE payment_id = ? AND status = ? AND deleted_at IS NULL",
            params![
                to.as_str(),
                actor.to_string(),
                fmt_ts(now),
                id.to_string(),
                from.as_str()
            ],
        )?;
        Ok(changed > 0)
    }

    async fn update_beneficiary(
        &self,
        id: Uuid,
        beneficiary: &BeneficiaryEnvelopes,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let changed = self.execute(
            "UPDATE sys_payments
             SET beneficiary_name_enc = ?, beneficiary_account_enc = ?, swift_code_enc = ?,
                 updated_at = ?
             WHERE payment_id = ? AND status = 'pending' AND deleted_at IS NULL",
            params![
                beneficiary.name,
                beneficiary.account,
                beneficiary.swift_code,
                fmt_ts(now),
                id.to_string()
            ],
        )?;
        Ok(changed > 0)
    }

    async fn rewrap_beneficiary(
        &self,
        id: Uuid,
        old: &BeneficiaryEnvelopes,
        new: &BeneficiaryEnvelopes,
    ) -> Result<bool> {
        let changed = self.execute(
            "UPDATE sys_payments
             SET beneficiary_name_enc = ?, beneficiary_account_enc = ?, swift_code_enc = ?
             WHERE payment_id = ? AND deleted_at IS NULL
               AND beneficiary_name_enc IS NOT DISTINCT FROM ?
               AND beneficiary_account_enc IS NOT DISTINCT FROM ?
               AND swift_code_enc IS NOT DISTINCT FROM ?",
            params![
                new.name,
                new.account,
                new.swift_code,
                id.to_string(),
                old.name,
                old.account,
                old.swift_code
            ],
        )?;
        Ok(changed > 0)
    }

    async fn list_all_payments(&self) -> Result<Vec<StoredPayment>> {
        self.query_payments(
            &format!(
                "SELECT {} FROM sys_payments WHERE deleted_at IS NULL ORDER BY created_at DESC",
                PAYMENT_COLUMNS
            ),
            params![],
        )
    }

    async fn soft_delete_payment(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        let changed = self.execute(
            "UPDATE sys_payments SET deleted_at = ?, updated_at = ?
             WHERE payment_id = ? AND deleted_at IS NULL",
            params![fmt_ts(now), fmt_ts(now), id.to_string()],
        )?;
        Ok(changed > 0)
    }
}
