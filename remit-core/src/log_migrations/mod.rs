//! Event log database migrations - embedded SQL files
//!
//! Kept separate from the main schema because the event log lives in its
//! own database file.

/// All event log migrations, embedded at compile time.
/// Format: (filename, sql_content)
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    (
        "001_security_events.sql",
        include_str!("001_security_events.sql"),
    ),
];
