use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A batch of metrics handed to an exporter in one push.
///
/// Metrics are grouped by the resource that produced them and, below that,
/// by the instrumentation library that recorded them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricBatch {
    #[serde(default)]
    pub resource_metrics: Vec<ResourceMetrics>,
}

impl MetricBatch {
    /// Wrap metrics into a batch with a single, empty resource.
    pub fn from_metrics(metrics: Vec<Metric>) -> Self {
        Self {
            resource_metrics: vec![ResourceMetrics {
                resource: HashMap::new(),
                instrumentation_library_metrics: vec![InstrumentationLibraryMetrics {
                    library: None,
                    metrics,
                }],
            }],
        }
    }

    /// Total number of metrics across all resources and libraries.
    pub fn metric_count(&self) -> usize {
        self.resource_metrics
            .iter()
            .flat_map(|rm| rm.instrumentation_library_metrics.iter())
            .map(|ilm| ilm.metrics.len())
            .sum()
    }

    /// Iterate over every metric in the batch, in order.
    pub fn metrics(&self) -> impl Iterator<Item = &Metric> {
        self.resource_metrics
            .iter()
            .flat_map(|rm| rm.instrumentation_library_metrics.iter())
            .flat_map(|ilm| ilm.metrics.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.metric_count() == 0
    }
}

/// Metrics produced by one resource (host, process, service...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    /// Resource attributes. Carried along but not exported as labels.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub resource: HashMap<String, String>,

    #[serde(default)]
    pub instrumentation_library_metrics: Vec<InstrumentationLibraryMetrics>,
}

/// Metrics recorded by one instrumentation library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentationLibraryMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library: Option<InstrumentationLibrary>,

    #[serde(default)]
    pub metrics: Vec<Metric>,
}

/// Name and version of an instrumentation library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentationLibrary {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A single metric: its descriptor and its datapoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub descriptor: MetricDescriptor,

    /// Datapoint collection. `None` when the producer sent none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MetricData>,
}

impl Metric {
    /// Create a metric with an explicit descriptor and datapoints.
    pub fn new(descriptor: MetricDescriptor, data: MetricData) -> Self {
        Self {
            descriptor,
            data: Some(data),
        }
    }

    /// Non-monotonic integer scalar.
    pub fn int64_gauge(name: impl Into<String>, points: Vec<Int64DataPoint>) -> Self {
        Self::new(
            MetricDescriptor::new(name, MetricType::Int64, Temporality::Instantaneous),
            MetricData::Int64(points),
        )
    }

    /// Non-monotonic floating point scalar.
    pub fn double_gauge(name: impl Into<String>, points: Vec<DoubleDataPoint>) -> Self {
        Self::new(
            MetricDescriptor::new(name, MetricType::Double, Temporality::Instantaneous),
            MetricData::Double(points),
        )
    }

    /// Cumulative monotonic integer counter.
    pub fn int64_counter(name: impl Into<String>, points: Vec<Int64DataPoint>) -> Self {
        Self::new(
            MetricDescriptor::new(name, MetricType::MonotonicInt64, Temporality::Cumulative),
            MetricData::Int64(points),
        )
    }

    /// Cumulative monotonic floating point counter.
    pub fn double_counter(name: impl Into<String>, points: Vec<DoubleDataPoint>) -> Self {
        Self::new(
            MetricDescriptor::new(name, MetricType::MonotonicDouble, Temporality::Cumulative),
            MetricData::Double(points),
        )
    }

    /// Cumulative histogram.
    pub fn histogram(name: impl Into<String>, points: Vec<HistogramDataPoint>) -> Self {
        Self::new(
            MetricDescriptor::new(name, MetricType::Histogram, Temporality::Cumulative),
            MetricData::Histogram(points),
        )
    }

    /// Cumulative summary.
    pub fn summary(name: impl Into<String>, points: Vec<SummaryDataPoint>) -> Self {
        Self::new(
            MetricDescriptor::new(name, MetricType::Summary, Temporality::Cumulative),
            MetricData::Summary(points),
        )
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    /// Number of datapoints, 0 when the collection is missing.
    pub fn point_count(&self) -> usize {
        match &self.data {
            Some(MetricData::Int64(points)) => points.len(),
            Some(MetricData::Double(points)) => points.len(),
            Some(MetricData::Histogram(points)) => points.len(),
            Some(MetricData::Summary(points)) => points.len(),
            None => 0,
        }
    }
}

/// Metric metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit: String,

    #[serde(rename = "type", default)]
    pub metric_type: MetricType,

    #[serde(default)]
    pub temporality: Temporality,
}

impl MetricDescriptor {
    pub fn new(name: impl Into<String>, metric_type: MetricType, temporality: Temporality) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            metric_type,
            temporality,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Declared metric type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    Int64,
    MonotonicInt64,
    Double,
    MonotonicDouble,
    Histogram,
    Summary,
    /// Unknown or unset. Any unrecognised tag decodes to this.
    #[default]
    #[serde(other)]
    Unspecified,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Unspecified => "unspecified",
            MetricType::Int64 => "int64",
            MetricType::MonotonicInt64 => "monotonic_int64",
            MetricType::Double => "double",
            MetricType::MonotonicDouble => "monotonic_double",
            MetricType::Histogram => "histogram",
            MetricType::Summary => "summary",
        }
    }

    /// True for the four scalar types.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            MetricType::Int64
                | MetricType::MonotonicInt64
                | MetricType::Double
                | MetricType::MonotonicDouble
        )
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregation temporality of a metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temporality {
    Instantaneous,
    Delta,
    Cumulative,
    #[default]
    #[serde(other)]
    Unspecified,
}

impl Temporality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Temporality::Unspecified => "unspecified",
            Temporality::Instantaneous => "instantaneous",
            Temporality::Delta => "delta",
            Temporality::Cumulative => "cumulative",
        }
    }
}

impl std::fmt::Display for Temporality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Datapoint collection of a metric, one variant per point shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "points", rename_all = "snake_case")]
pub enum MetricData {
    Int64(Vec<Int64DataPoint>),
    Double(Vec<DoubleDataPoint>),
    Histogram(Vec<HistogramDataPoint>),
    Summary(Vec<SummaryDataPoint>),
}

/// Integer scalar datapoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Int64DataPoint {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub start_time_unix_nano: u64,
    pub time_unix_nano: u64,
    pub value: i64,
}

impl Int64DataPoint {
    pub fn new(value: i64, time_unix_nano: u64) -> Self {
        Self {
            value,
            time_unix_nano,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Floating point scalar datapoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoubleDataPoint {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub start_time_unix_nano: u64,
    pub time_unix_nano: u64,
    pub value: f64,
}

impl DoubleDataPoint {
    pub fn new(value: f64, time_unix_nano: u64) -> Self {
        Self {
            value,
            time_unix_nano,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Histogram datapoint with explicit bucket bounds.
///
/// `explicit_bounds` normally holds one entry fewer than `buckets`; the last
/// bucket is then the unbounded overflow bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramDataPoint {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub start_time_unix_nano: u64,
    pub time_unix_nano: u64,
    pub count: u64,
    pub sum: f64,
    #[serde(default)]
    pub buckets: Vec<HistogramBucket>,
    #[serde(default)]
    pub explicit_bounds: Vec<f64>,
}

impl HistogramDataPoint {
    pub fn new(
        time_unix_nano: u64,
        count: u64,
        sum: f64,
        bucket_counts: &[u64],
        explicit_bounds: &[f64],
    ) -> Self {
        Self {
            time_unix_nano,
            count,
            sum,
            buckets: bucket_counts
                .iter()
                .map(|&count| HistogramBucket { count })
                .collect(),
            explicit_bounds: explicit_bounds.to_vec(),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Observation count of a single histogram bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramBucket {
    pub count: u64,
}

/// Summary datapoint with precomputed quantiles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryDataPoint {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub start_time_unix_nano: u64,
    pub time_unix_nano: u64,
    pub count: u64,
    pub sum: f64,
    #[serde(default)]
    pub percentile_values: Vec<ValueAtPercentile>,
}

impl SummaryDataPoint {
    pub fn new(
        time_unix_nano: u64,
        count: u64,
        sum: f64,
        percentile_values: Vec<ValueAtPercentile>,
    ) -> Self {
        Self {
            time_unix_nano,
            count,
            sum,
            percentile_values,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// One quantile of a summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueAtPercentile {
    pub percentile: f64,
    pub value: f64,
}

impl ValueAtPercentile {
    pub fn new(percentile: f64, value: f64) -> Self {
        Self { percentile, value }
    }
}

/// Get the current timestamp in nanoseconds since Unix epoch.
///
/// Returns 0 if system time is before Unix epoch (should never happen in practice).
pub fn current_timestamp_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
