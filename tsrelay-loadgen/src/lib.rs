//! Random metric batch generator.
//!
//! Builds batches of counters, gauges, histograms and summaries with random
//! labels and values, for driving exporters under load.

use rand::Rng;
use serde::{Deserialize, Serialize};

use tsrelay_common::config::{LoggingConfig, ZenohConfig};
use tsrelay_common::{
    DoubleDataPoint, Format, HistogramDataPoint, Int64DataPoint, Metric, MetricBatch,
    SummaryDataPoint, ValueAtPercentile, current_timestamp_nanos,
};

/// Histogram bounds and summary quantiles used for every generated metric.
pub const BOUNDS: [f64; 3] = [0.01, 0.5, 0.99];

/// Number of distinct label keys/values generated metrics draw from.
const LABEL_POOL: usize = 4;

/// Load generator configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadgenConfig {
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Payload format for published batches.
    #[serde(default)]
    pub serialization: Format,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub load: LoadSettings,
}

/// What to publish and how often.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSettings {
    /// Source name published under `tsrelay/metrics/<source>`.
    #[serde(default = "default_source")]
    pub source: String,

    /// Metrics per batch.
    #[serde(default = "default_items")]
    pub items: usize,

    /// Seconds between batches.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Batches to publish; 0 runs until interrupted.
    #[serde(default)]
    pub rounds: u64,

    /// Exclusive upper bound for generated values.
    #[serde(default = "default_value_bound")]
    pub value_bound: u32,
}

fn default_source() -> String {
    "loadgen".to_string()
}

fn default_items() -> usize {
    100
}

fn default_interval() -> u64 {
    1
}

fn default_value_bound() -> u32 {
    1000
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            source: default_source(),
            items: default_items(),
            interval_secs: default_interval(),
            rounds: 0,
            value_bound: default_value_bound(),
        }
    }
}

/// Kind of metric a generated item becomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratedKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl GeneratedKind {
    const ALL: [GeneratedKind; 4] = [
        GeneratedKind::Counter,
        GeneratedKind::Gauge,
        GeneratedKind::Histogram,
        GeneratedKind::Summary,
    ];

    fn random<R: Rng>(rng: &mut R) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }
}

/// Generates random metric batches.
#[derive(Debug, Clone)]
pub struct BatchGenerator {
    items: usize,
    value_bound: u32,
}

impl BatchGenerator {
    pub fn new(items: usize, value_bound: u32) -> Self {
        Self {
            items,
            value_bound: value_bound.max(1),
        }
    }

    pub fn from_settings(settings: &LoadSettings) -> Self {
        Self::new(settings.items, settings.value_bound)
    }

    /// Build a batch of `items` metrics named `metric0`, `metric1`, ...
    pub fn generate<R: Rng>(&self, rng: &mut R) -> MetricBatch {
        let now = current_timestamp_nanos();
        let metrics = (0..self.items)
            .map(|i| {
                let kind = GeneratedKind::random(rng);
                self.metric(rng, kind, format!("metric{}", i), now)
            })
            .collect();
        MetricBatch::from_metrics(metrics)
    }

    /// Build a single metric of the given kind with one datapoint.
    pub fn metric<R: Rng>(
        &self,
        rng: &mut R,
        kind: GeneratedKind,
        name: String,
        now: u64,
    ) -> Metric {
        let labels = random_labels(rng);
        match kind {
            GeneratedKind::Counter => {
                let value = rng.random_range(0..self.value_bound) as i64;
                let point = labels
                    .into_iter()
                    .fold(Int64DataPoint::new(value, now), |p, (k, v)| p.with_label(k, v));
                Metric::int64_counter(name, vec![point])
            }
            GeneratedKind::Gauge => {
                let value = self.random_value(rng);
                let point = labels
                    .into_iter()
                    .fold(DoubleDataPoint::new(value, now), |p, (k, v)| p.with_label(k, v));
                Metric::double_gauge(name, vec![point])
            }
            GeneratedKind::Histogram => {
                // One bucket per bound plus the overflow bucket.
                let buckets: Vec<u64> = (0..=BOUNDS.len())
                    .map(|_| rng.random_range(0..self.value_bound) as u64)
                    .collect();
                let count = buckets.iter().sum();
                let sum = self.random_value(rng);
                let point = labels.into_iter().fold(
                    HistogramDataPoint::new(now, count, sum, &buckets, &BOUNDS),
                    |p, (k, v)| p.with_label(k, v),
                );
                Metric::histogram(name, vec![point])
            }
            GeneratedKind::Summary => {
                let quantiles = BOUNDS
                    .iter()
                    .map(|&q| ValueAtPercentile::new(q, self.random_value(rng)))
                    .collect();
                let count = rng.random_range(0..self.value_bound) as u64;
                let sum = self.random_value(rng);
                let point = labels.into_iter().fold(
                    SummaryDataPoint::new(now, count, sum, quantiles),
                    |p, (k, v)| p.with_label(k, v),
                );
                Metric::summary(name, vec![point])
            }
        }
    }

    fn random_value<R: Rng>(&self, rng: &mut R) -> f64 {
        rng.random_range(0.0..self.value_bound as f64)
    }
}

/// Between 1 and 4 `labelK=valueK` pairs.
fn random_labels<R: Rng>(rng: &mut R) -> Vec<(String, String)> {
    let count = rng.random_range(1..=LABEL_POOL);
    (0..count)
        .map(|_| {
            let k = rng.random_range(0..LABEL_POOL);
            (format!("label{}", k), format!("value{}", k))
        })
        .collect()
}
