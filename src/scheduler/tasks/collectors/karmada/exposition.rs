//! Maps a raw `/metrics` payload into a `MetricSnapshotEntity`.
//!
//! Two inputs are accepted:
//! - a JSON document already shaped like the snapshot (decoded as-is)
//! - Prometheus text exposition format, parsed family by family

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::core::persistence::metrics::metric_snapshot_entity::{
    MeasureKind, MetricEntity, MetricSnapshotEntity, MetricValueEntity,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExpositionError {
    #[error("payload is not valid UTF-8")]
    NotUtf8,

    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// JSON payload shape; `currentTime` falls back to the capture time.
#[derive(Deserialize)]
struct JsonSnapshot {
    #[serde(rename = "currentTime", default)]
    current_time: Option<DateTime<Utc>>,
    metrics: BTreeMap<String, MetricEntity>,
}

pub fn parse_payload(
    payload: &[u8],
    now: DateTime<Utc>,
) -> Result<MetricSnapshotEntity, ExpositionError> {
    if let Ok(json) = serde_json::from_slice::<JsonSnapshot>(payload) {
        return Ok(MetricSnapshotEntity {
            current_time: json.current_time.unwrap_or(now),
            metrics: json.metrics,
        });
    }

    let text = std::str::from_utf8(payload).map_err(|_| ExpositionError::NotUtf8)?;
    let mut snapshot = MetricSnapshotEntity::new(now);
    // Families declared by HELP/TYPE alone carry nothing to store.
    for family in parse_families(text)?.into_iter().filter(|f| !f.samples.is_empty()) {
        let metric = family.into_metric();
        snapshot.metrics.insert(metric.name.clone(), metric);
    }
    Ok(snapshot)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FamilyType {
    Counter,
    Gauge,
    Histogram,
    Summary,
    Untyped,
}

impl FamilyType {
    fn from_code(code: &str) -> Option<Self> {
        match code {
            "counter" => Some(Self::Counter),
            "gauge" => Some(Self::Gauge),
            "histogram" => Some(Self::Histogram),
            "summary" => Some(Self::Summary),
            "untyped" => Some(Self::Untyped),
            _ => None,
        }
    }

    fn as_tag(&self) -> &'static str {
        match self {
            Self::Counter => "COUNTER",
            Self::Gauge => "GAUGE",
            Self::Histogram => "HISTOGRAM",
            Self::Summary => "SUMMARY",
            Self::Untyped => "UNTYPED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SampleRole {
    Plain,
    Bucket(f64),
    Sum,
    Count,
}

#[derive(Debug, Clone)]
struct Sample {
    labels: BTreeMap<String, String>,
    value: f64,
    role: SampleRole,
}

#[derive(Debug)]
struct Family {
    name: String,
    help: String,
    kind: FamilyType,
    samples: Vec<Sample>,
}

impl Family {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            help: String::new(),
            kind: FamilyType::Untyped,
            samples: Vec::new(),
        }
    }

    fn into_metric(self) -> MetricEntity {
        let values = match self.kind {
            FamilyType::Counter => plain_values(&self.samples, MeasureKind::Total),
            FamilyType::Gauge => plain_values(&self.samples, MeasureKind::CurrentValue),
            FamilyType::Histogram => histogram_values(&self.samples),
            FamilyType::Summary | FamilyType::Untyped => vec![MetricValueEntity {
                labels: BTreeMap::new(),
                value: String::new(),
                measure: MeasureKind::UnhandledMetricType,
            }],
        };

        MetricEntity {
            name: self.name,
            help: self.help,
            metric_type: self.kind.as_tag().to_string(),
            values,
        }
    }
}

fn plain_values(samples: &[Sample], measure: MeasureKind) -> Vec<MetricValueEntity> {
    samples
        .iter()
        .map(|s| MetricValueEntity {
            labels: s.labels.clone(),
            value: format_fixed(s.value),
            measure,
        })
        .collect()
}

#[derive(Debug)]
struct HistogramSeries {
    labels: BTreeMap<String, String>,
    buckets: Vec<(f64, f64)>,
    sum: f64,
    count: f64,
}

/// Per series: one cumulative count per bucket, then sum, then count.
fn histogram_values(samples: &[Sample]) -> Vec<MetricValueEntity> {
    let mut series: Vec<HistogramSeries> = Vec::new();

    for sample in samples {
        let idx = match series.iter().position(|s| s.labels == sample.labels) {
            Some(idx) => idx,
            None => {
                series.push(HistogramSeries {
                    labels: sample.labels.clone(),
                    buckets: Vec::new(),
                    sum: 0.0,
                    count: 0.0,
                });
                series.len() - 1
            }
        };
        let entry = &mut series[idx];
        match sample.role {
            SampleRole::Bucket(le) => entry.buckets.push((le, sample.value)),
            SampleRole::Sum => entry.sum = sample.value,
            SampleRole::Count => entry.count = sample.value,
            SampleRole::Plain => {}
        }
    }

    let mut values = Vec::new();
    for s in series {
        for (le, cumulative) in &s.buckets {
            let mut labels = s.labels.clone();
            labels.insert("le".to_string(), format_fixed(*le));
            values.push(MetricValueEntity {
                labels,
                value: format_integer(*cumulative),
                measure: MeasureKind::CumulativeCount,
            });
        }
        values.push(MetricValueEntity {
            labels: s.labels.clone(),
            value: format_fixed(s.sum),
            measure: MeasureKind::Sum,
        });
        values.push(MetricValueEntity {
            labels: s.labels,
            value: format_integer(s.count),
            measure: MeasureKind::Count,
        });
    }
    values
}

fn parse_families(text: &str) -> Result<Vec<Family>, ExpositionError> {
    let mut families: Vec<Family> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let malformed = |reason: String| ExpositionError::Malformed {
            line: line_no,
            reason,
        };

        if let Some(comment) = line.strip_prefix('#') {
            let comment = comment.trim_start();
            if let Some(rest) = comment.strip_prefix("HELP") {
                let (name, help) = split_descriptor(rest)
                    .ok_or_else(|| malformed("HELP without metric name".into()))?;
                let idx = family_index(&mut families, &mut index, name);
                families[idx].help = unescape_help(help);
            } else if let Some(rest) = comment.strip_prefix("TYPE") {
                let (name, code) = split_descriptor(rest)
                    .ok_or_else(|| malformed("TYPE without metric name".into()))?;
                let kind = FamilyType::from_code(code.trim())
                    .ok_or_else(|| malformed(format!("unknown metric type '{}'", code.trim())))?;
                let idx = family_index(&mut families, &mut index, name);
                if !families[idx].samples.is_empty() {
                    return Err(malformed(format!("TYPE for '{name}' after its samples")));
                }
                families[idx].kind = kind;
            }
            continue;
        }

        let (name, labels, value) = parse_sample_line(line).map_err(malformed)?;
        let (family_name, role) =
            resolve_family(&families, &index, name, &labels).map_err(malformed)?;
        let labels = match role {
            SampleRole::Bucket(_) => labels.into_iter().filter(|(k, _)| k != "le").collect(),
            _ => labels,
        };

        let idx = family_index(&mut families, &mut index, &family_name);
        families[idx].samples.push(Sample { labels, value, role });
    }

    Ok(families)
}

fn family_index(
    families: &mut Vec<Family>,
    index: &mut HashMap<String, usize>,
    name: &str,
) -> usize {
    if let Some(idx) = index.get(name) {
        return *idx;
    }
    families.push(Family::new(name));
    index.insert(name.to_string(), families.len() - 1);
    families.len() - 1
}

/// Attaches `_bucket`, `_sum` and `_count` samples to their declared family.
fn resolve_family(
    families: &[Family],
    index: &HashMap<String, usize>,
    name: &str,
    labels: &BTreeMap<String, String>,
) -> Result<(String, SampleRole), String> {
    let kind_of = |base: &str| index.get(base).map(|idx| families[*idx].kind);

    if let Some(base) = name.strip_suffix("_bucket") {
        if kind_of(base) == Some(FamilyType::Histogram) {
            let le = labels
                .get("le")
                .ok_or_else(|| format!("bucket of '{base}' without 'le' label"))?;
            let bound = parse_float(le).ok_or_else(|| format!("invalid 'le' value '{le}'"))?;
            return Ok((base.to_string(), SampleRole::Bucket(bound)));
        }
    }
    for (suffix, role) in [("_sum", SampleRole::Sum), ("_count", SampleRole::Count)] {
        if let Some(base) = name.strip_suffix(suffix) {
            if matches!(kind_of(base), Some(FamilyType::Histogram | FamilyType::Summary)) {
                return Ok((base.to_string(), role));
            }
        }
    }
    Ok((name.to_string(), SampleRole::Plain))
}

/// Splits `" name rest of line"` into the metric name and the remainder.
fn split_descriptor(rest: &str) -> Option<(&str, &str)> {
    let rest = rest.trim_start();
    if rest.is_empty() {
        return None;
    }
    match rest.split_once(char::is_whitespace) {
        Some((name, tail)) => Some((name, tail.trim_start())),
        None => Some((rest, "")),
    }
}

fn unescape_help(help: &str) -> String {
    let mut out = String::with_capacity(help.len());
    let mut chars = help.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

type SampleLine<'a> = (&'a str, BTreeMap<String, String>, f64);

fn parse_sample_line(line: &str) -> Result<SampleLine<'_>, String> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if !is_valid_metric_name(name) {
        return Err(format!("invalid metric name '{name}'"));
    }

    let mut rest = &line[name_end..];
    let labels = match rest.strip_prefix('{') {
        Some(body) => {
            let (labels, after) = parse_labels(body)?;
            rest = after;
            labels
        }
        None => BTreeMap::new(),
    };

    let mut fields = rest.split_whitespace();
    let raw_value = fields.next().ok_or_else(|| format!("sample '{name}' has no value"))?;
    let value = parse_float(raw_value).ok_or_else(|| format!("invalid value '{raw_value}'"))?;

    if let Some(ts) = fields.next() {
        ts.parse::<i64>()
            .map_err(|_| format!("invalid timestamp '{ts}'"))?;
    }
    if fields.next().is_some() {
        return Err(format!("unexpected trailing content after sample '{name}'"));
    }

    Ok((name, labels, value))
}

/// Parses the body of `{...}`, returning the labels and the text after `}`.
fn parse_labels(body: &str) -> Result<(BTreeMap<String, String>, &str), String> {
    let mut labels = BTreeMap::new();
    let mut rest = body;

    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }
        if rest.is_empty() {
            return Err("unterminated label set".into());
        }

        let eq = rest.find('=').ok_or("label without '='")?;
        let key = rest[..eq].trim();
        if !is_valid_label_name(key) {
            return Err(format!("invalid label name '{key}'"));
        }
        rest = rest[eq + 1..].trim_start();
        rest = rest
            .strip_prefix('"')
            .ok_or_else(|| format!("label '{key}' value is not quoted"))?;

        let (value, after) = read_quoted(rest)
            .ok_or_else(|| format!("unterminated value for label '{key}'"))?;
        if labels.insert(key.to_string(), value).is_some() {
            return Err(format!("duplicate label '{key}'"));
        }

        rest = after.trim_start();
        if let Some(after_comma) = rest.strip_prefix(',') {
            rest = after_comma;
        } else if !rest.starts_with('}') {
            return Err(format!("expected ',' or '}}' after label '{key}'"));
        }
    }
}

/// Reads an escaped label value up to the closing quote.
fn read_quoted(input: &str) -> Option<(String, &str)> {
    let mut value = String::new();
    let mut chars = input.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Some((value, &input[idx + 1..])),
            '\\' => match chars.next()?.1 {
                'n' => value.push('\n'),
                '"' => value.push('"'),
                '\\' => value.push('\\'),
                other => {
                    value.push('\\');
                    value.push(other);
                }
            },
            _ => value.push(c),
        }
    }
    None
}

fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_float(raw: &str) -> Option<f64> {
    match raw {
        "+Inf" | "Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => raw.parse::<f64>().ok(),
    }
}

fn format_fixed(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        format!("{value:.6}")
    }
}

fn format_integer(value: f64) -> String {
    // Saturating cast: counts are never negative.
    (value.max(0.0) as u64).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()
    }

    const SCRAPE: &str = r#"
# HELP http_requests_total Requests served.
# TYPE http_requests_total counter
http_requests_total{method="GET"} 42
http_requests_total{method="POST"} 3 1700000000000
# HELP workqueue_depth Current depth of workqueue.
# TYPE workqueue_depth gauge
workqueue_depth{name="binding"} 7.5
# HELP scheduling_latency_seconds Scheduling latency.
# TYPE scheduling_latency_seconds histogram
scheduling_latency_seconds_bucket{le="0.005"} 1
scheduling_latency_seconds_bucket{le="0.01"} 4
scheduling_latency_seconds_bucket{le="0.1"} 9
scheduling_latency_seconds_bucket{le="+Inf"} 10
scheduling_latency_seconds_sum 0.42
scheduling_latency_seconds_count 10
# HELP go_gc_duration_seconds GC pauses.
# TYPE go_gc_duration_seconds summary
go_gc_duration_seconds{quantile="0.5"} 0.0001
go_gc_duration_seconds_sum 0.3
go_gc_duration_seconds_count 12
process_start_time_seconds 1.7e9
"#;

    #[test]
    fn counter_sample_is_fixed_point_total() {
        let input = "# TYPE http_requests_total counter\nhttp_requests_total{method=\"GET\"} 42\n";
        let snapshot = parse_payload(input.as_bytes(), now()).unwrap();

        let metric = &snapshot.metrics["http_requests_total"];
        assert_eq!(metric.metric_type, "COUNTER");
        assert_eq!(
            metric.values,
            vec![MetricValueEntity {
                labels: BTreeMap::from([("method".to_string(), "GET".to_string())]),
                value: "42.000000".to_string(),
                measure: MeasureKind::Total,
            }]
        );
        assert_eq!(snapshot.current_time, now());
    }

    #[test]
    fn histogram_yields_buckets_plus_sum_and_count() {
        let snapshot = parse_payload(SCRAPE.as_bytes(), now()).unwrap();
        let metric = &snapshot.metrics["scheduling_latency_seconds"];

        assert_eq!(metric.values.len(), 4 + 2);
        let buckets: Vec<_> = metric
            .values
            .iter()
            .filter(|v| v.measure == MeasureKind::CumulativeCount)
            .collect();
        assert_eq!(buckets.len(), 4);
        assert_eq!(buckets[0].labels["le"], "0.005000");
        assert_eq!(buckets[0].value, "1");
        assert_eq!(buckets[3].labels["le"], "+Inf");
        assert_eq!(buckets[3].value, "10");

        assert_eq!(metric.values[4].measure, MeasureKind::Sum);
        assert_eq!(metric.values[4].value, "0.420000");
        assert_eq!(metric.values[5].measure, MeasureKind::Count);
        assert_eq!(metric.values[5].value, "10");
        assert!(!snapshot.metrics.contains_key("scheduling_latency_seconds_bucket"));
    }

    #[test]
    fn histogram_series_are_kept_apart() {
        let input = "\
# TYPE req_seconds histogram
req_seconds_bucket{code=\"200\",le=\"1\"} 2
req_seconds_bucket{code=\"200\",le=\"+Inf\"} 3
req_seconds_sum{code=\"200\"} 1.5
req_seconds_count{code=\"200\"} 3
req_seconds_bucket{code=\"500\",le=\"1\"} 0
req_seconds_bucket{code=\"500\",le=\"+Inf\"} 1
req_seconds_sum{code=\"500\"} 4
req_seconds_count{code=\"500\"} 1
";
        let snapshot = parse_payload(input.as_bytes(), now()).unwrap();
        let values = &snapshot.metrics["req_seconds"].values;
        assert_eq!(values.len(), 2 * (2 + 2));
        assert!(values[..4].iter().all(|v| v.labels["code"] == "200"));
        assert!(values[4..].iter().all(|v| v.labels["code"] == "500"));
    }

    #[test]
    fn gauge_summary_and_untyped() {
        let snapshot = parse_payload(SCRAPE.as_bytes(), now()).unwrap();

        let gauge = &snapshot.metrics["workqueue_depth"];
        assert_eq!(gauge.values[0].measure, MeasureKind::CurrentValue);
        assert_eq!(gauge.values[0].value, "7.500000");
        assert_eq!(gauge.help, "Current depth of workqueue.");

        let summary = &snapshot.metrics["go_gc_duration_seconds"];
        assert_eq!(summary.metric_type, "SUMMARY");
        assert_eq!(summary.values.len(), 1);
        assert_eq!(summary.values[0].measure, MeasureKind::UnhandledMetricType);
        assert!(summary.values[0].value.is_empty());

        let untyped = &snapshot.metrics["process_start_time_seconds"];
        assert_eq!(untyped.metric_type, "UNTYPED");
        assert_eq!(untyped.values[0].measure, MeasureKind::UnhandledMetricType);

        assert_eq!(snapshot.metrics.len(), 5);
    }

    #[test]
    fn parsing_is_deterministic() {
        let a = parse_payload(SCRAPE.as_bytes(), now()).unwrap();
        let b = parse_payload(SCRAPE.as_bytes(), now()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn json_and_text_inputs_agree() {
        let from_text = parse_payload(SCRAPE.as_bytes(), now()).unwrap();
        let json = serde_json::to_vec(&from_text).unwrap();
        let from_json = parse_payload(&json, now()).unwrap();

        assert_eq!(
            from_text.metrics.keys().collect::<Vec<_>>(),
            from_json.metrics.keys().collect::<Vec<_>>()
        );
        for (name, metric) in &from_text.metrics {
            let mut expected = metric.values.clone();
            let mut actual = from_json.metrics[name].values.clone();
            expected.sort();
            actual.sort();
            assert_eq!(expected, actual, "values differ for {name}");
        }
    }

    #[test]
    fn hand_written_json_is_decoded_directly() {
        let json = r#"{
            "currentTime": "2026-10-19T12:00:00Z",
            "metrics": {
                "http_requests_total": {
                    "name": "http_requests_total",
                    "help": "Requests served.",
                    "type": "COUNTER",
                    "values": [
                        {"labels": {"method": "GET"}, "value": "42.000000", "measure": "total"}
                    ]
                }
            }
        }"#;
        let text = "\
# HELP http_requests_total Requests served.
# TYPE http_requests_total counter
http_requests_total{method=\"GET\"} 42
";

        let from_json = parse_payload(json.as_bytes(), now()).unwrap();
        let from_text = parse_payload(text.as_bytes(), now()).unwrap();
        assert_eq!(from_json.metrics, from_text.metrics);
    }

    #[test]
    fn json_without_capture_time_takes_the_scrape_time() {
        let json = r#"{"metrics": {"up": {"name": "up", "type": "GAUGE",
            "values": [{"value": "1.000000", "measure": "current_value"}]}}}"#;

        let snapshot = parse_payload(json.as_bytes(), now()).unwrap();
        assert_eq!(snapshot.current_time, now());
        assert_eq!(snapshot.metrics["up"].values[0].value, "1.000000");
    }

    #[test]
    fn families_without_samples_are_skipped() {
        let input = "\
# HELP idle_total Never incremented.
# TYPE idle_total counter
# TYPE idle_seconds histogram
# HELP gc_seconds GC pauses.
# TYPE gc_seconds summary
# TYPE up gauge
up 1
";
        let snapshot = parse_payload(input.as_bytes(), now()).unwrap();
        assert_eq!(snapshot.metrics.keys().collect::<Vec<_>>(), vec!["up"]);
    }

    #[test]
    fn label_values_are_unescaped() {
        let input = "# TYPE m gauge\nm{path=\"/a\\\"b\",note=\"x\\ny\"} 1\n";
        let snapshot = parse_payload(input.as_bytes(), now()).unwrap();
        let labels = &snapshot.metrics["m"].values[0].labels;
        assert_eq!(labels["path"], "/a\"b");
        assert_eq!(labels["note"], "x\ny");
    }

    #[test]
    fn malformed_lines_are_reported_with_position() {
        let err = parse_payload(b"# TYPE m gauge\nm{a=\"1\" 2\n", now()).unwrap_err();
        assert!(matches!(err, ExpositionError::Malformed { line: 2, .. }));

        let err = parse_payload(b"m not-a-number\n", now()).unwrap_err();
        assert!(matches!(err, ExpositionError::Malformed { line: 1, .. }));

        let err = parse_payload(b"# TYPE h histogram\nh_bucket 1\n", now()).unwrap_err();
        assert!(matches!(err, ExpositionError::Malformed { line: 2, .. }));

        assert_eq!(parse_payload(&[0xff, 0xfe], now()).unwrap_err(), ExpositionError::NotUtf8);
    }
}
