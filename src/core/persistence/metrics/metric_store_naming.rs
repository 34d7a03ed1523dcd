//! Identifier helpers shared by the writer and the read side.

use chrono::{DateTime, SecondsFormat, Utc};

pub const VALUES_SUFFIX: &str = "_values";
pub const LABELS_SUFFIX: &str = "_labels";
pub const TIME_LOAD_SUFFIX: &str = "_time_load";

/// Maps an application or pod name onto a safe SQLite identifier.
///
/// Anything outside `[A-Za-z0-9_]` becomes `_`, and a leading digit gets a `p_`
/// prefix so the result is always a valid bare identifier.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();

    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert_str(0, "p_");
    }
    out
}

/// Table names for one pod inside an application store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodTables {
    pub metrics: String,
    pub values: String,
    pub labels: String,
    pub time_load: String,
}

impl PodTables {
    pub fn for_pod(pod: &str) -> Self {
        Self::from_base(sanitize_identifier(pod))
    }

    pub fn from_base(base: String) -> Self {
        Self {
            values: format!("{base}{VALUES_SUFFIX}"),
            labels: format!("{base}{LABELS_SUFFIX}"),
            time_load: format!("{base}{TIME_LOAD_SUFFIX}"),
            metrics: base,
        }
    }
}

/// True for the auxiliary tables that hang off a pod's metrics table.
pub fn is_auxiliary_table(name: &str) -> bool {
    [VALUES_SUFFIX, LABELS_SUFFIX, TIME_LOAD_SUFFIX]
        .iter()
        .any(|suffix| name.ends_with(suffix))
}

/// Fixed-width UTC timestamp, so lexical order in SQLite matches time order.
pub fn format_marker(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}
