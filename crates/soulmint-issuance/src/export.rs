//! Flat-file export of the audit log, plus the import template.

use soulmint_core::{LogEntry, Timestamp};

pub const CSV_HEADER: &str = "at,action,status,hash,note";

/// Placeholder body showing the expected import shape.
pub const TEMPLATE_BODY: &str = "0x...\n0x...\n";

/// Quote a field, doubling embedded quotes.
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

fn row(entry: &LogEntry) -> String {
    [
        quote(&entry.at.to_iso8601()),
        quote(&entry.action),
        quote(entry.status.as_str()),
        quote(entry.hash.as_ref().map(|h| h.as_str()).unwrap_or("")),
        quote(entry.note.as_deref().unwrap_or("")),
    ]
    .join(",")
}

/// Serialize `entries` as UTF-8 CSV, one row per entry in the given order.
///
/// Callers holding a newest-first snapshot must reverse it first;
/// [`crate::AuditLog::export`] does.
pub fn export_csv(entries: &[LogEntry]) -> Vec<u8> {
    let mut out = String::with_capacity(CSV_HEADER.len() + 1 + entries.len() * 96);
    out.push_str(CSV_HEADER);
    out.push('\n');
    for entry in entries {
        out.push_str(&row(entry));
        out.push('\n');
    }
    out.into_bytes()
}

pub fn export_filename(at: Timestamp) -> String {
    format!("soulmint-logs-{}.csv", at.unix_millis())
}

pub fn template_filename(at: Timestamp) -> String {
    format!("batch-template-{}.txt", at.unix_millis())
}
