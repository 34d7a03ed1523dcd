//! Metrics API DTOs

use serde::Deserialize;
use validator::Validate;

/// Query string shared by every `/metrics` route.
#[derive(Deserialize, Debug, Default, Validate)]
pub struct MetricsQuery {
    /// Operation selector, e.g. `sync_on`, `mname`, `details`.
    #[serde(rename = "type")]
    #[validate(length(max = 32))]
    pub query_type: Option<String>,

    /// Metric name for `type=details`.
    #[validate(length(min = 1, max = 512))]
    pub mname: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricsQueryKind {
    SyncOn,
    SyncOff,
    SyncStatus,
    MetricsDetails,
    MetricNames,
    Details,
    /// No recognised `type`.
    Fetch,
}

impl MetricsQuery {
    pub fn kind(&self) -> MetricsQueryKind {
        match self.query_type.as_deref() {
            Some("sync_on") => MetricsQueryKind::SyncOn,
            Some("sync_off") => MetricsQueryKind::SyncOff,
            Some("sync_status") => MetricsQueryKind::SyncStatus,
            Some("metricsdetails") => MetricsQueryKind::MetricsDetails,
            Some("mname") => MetricsQueryKind::MetricNames,
            Some("details") => MetricsQueryKind::Details,
            _ => MetricsQueryKind::Fetch,
        }
    }
}
