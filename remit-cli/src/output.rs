//! Output formatting utilities

use chrono::{DateTime, TimeZone, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use remit_core::PaymentStatus;

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Format a unix-millisecond timestamp
pub fn format_millis(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(format_time)
        .unwrap_or_else(|| millis.to_string())
}

/// Colored status cell for payment tables
pub fn status_cell(status: PaymentStatus) -> Cell {
    let color = match status {
        PaymentStatus::Completed => Color::Green,
        PaymentStatus::Failed | PaymentStatus::Cancelled => Color::Red,
        PaymentStatus::OnHold => Color::Yellow,
        PaymentStatus::Pending | PaymentStatus::Processing => Color::Cyan,
    };
    Cell::new(status.as_str()).fg(color)
}
