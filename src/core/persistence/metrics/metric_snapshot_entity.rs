use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a single stored value should be read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKind {
    Total,
    CurrentValue,
    Sum,
    Count,
    CumulativeCount,
    UnhandledMetricType,
}

impl MeasureKind {
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Total => "total",
            Self::CurrentValue => "current_value",
            Self::Sum => "sum",
            Self::Count => "count",
            Self::CumulativeCount => "cumulative_count",
            Self::UnhandledMetricType => "unhandled_metric_type",
        }
    }

    pub fn from_code<S: AsRef<str>>(code: S) -> Option<Self> {
        match code.as_ref() {
            "total" => Some(Self::Total),
            "current_value" => Some(Self::CurrentValue),
            "sum" => Some(Self::Sum),
            "count" => Some(Self::Count),
            "cumulative_count" => Some(Self::CumulativeCount),
            "unhandled_metric_type" => Some(Self::UnhandledMetricType),
            _ => None,
        }
    }
}

/// One labelled sample of a metric family.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricValueEntity {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub value: String,
    pub measure: MeasureKind,
}

/// A metric family as scraped from one pod.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetricEntity {
    pub name: String,
    #[serde(default)]
    pub help: String,
    #[serde(rename = "type")]
    pub metric_type: String,
    #[serde(default)]
    pub values: Vec<MetricValueEntity>,
}

/// Everything scraped from one pod in one cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSnapshotEntity {
    #[serde(rename = "currentTime")]
    pub current_time: DateTime<Utc>,
    pub metrics: BTreeMap<String, MetricEntity>,
}

impl MetricSnapshotEntity {
    pub fn new(current_time: DateTime<Utc>) -> Self {
        Self {
            current_time,
            metrics: BTreeMap::new(),
        }
    }

    /// Total number of values across every metric family.
    pub fn value_count(&self) -> usize {
        self.metrics.values().map(|m| m.values.len()).sum()
    }
}
