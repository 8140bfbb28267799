//! Per-push aggregation of samples into unique time series.

use std::collections::BTreeMap;

use tracing::debug;
use tsrelay_common::metrics::MetricType;

use crate::labels::LabelSet;

/// One value at a millisecond timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub value: f64,
    pub timestamp_ms: i64,
}

impl Sample {
    pub fn new(value: f64, timestamp_ms: i64) -> Self {
        Self {
            value,
            timestamp_ms,
        }
    }
}

/// A label set and its samples in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    pub labels: LabelSet,
    pub samples: Vec<Sample>,
    /// Type of the metric that created the series.
    pub metric_type: MetricType,
}

/// Time series keyed by label set.
///
/// Lives for a single push. Samples whose label sets are equal always land
/// in the same series, so a request built from the map never carries
/// duplicate label sets. Iteration follows label set order.
#[derive(Debug, Default)]
pub struct TimeSeriesMap {
    series: BTreeMap<LabelSet, TimeSeries>,
}

impl TimeSeriesMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `sample` to the series for `labels`, creating it if absent.
    pub fn add_sample(&mut self, sample: Sample, labels: LabelSet, metric_type: MetricType) {
        match self.series.get_mut(&labels) {
            Some(series) => {
                if series.metric_type != metric_type {
                    debug!(
                        labels = %labels,
                        existing = %series.metric_type,
                        incoming = %metric_type,
                        "Metric type conflict on series, merging sample"
                    );
                }
                series.samples.push(sample);
            }
            None => {
                self.series.insert(
                    labels.clone(),
                    TimeSeries {
                        labels,
                        samples: vec![sample],
                        metric_type,
                    },
                );
            }
        }
    }

    pub fn get(&self, labels: &LabelSet) -> Option<&TimeSeries> {
        self.series.get(labels)
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Total number of samples across all series.
    pub fn sample_count(&self) -> usize {
        self.series.values().map(|s| s.samples.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeSeries> {
        self.series.values()
    }
}

impl IntoIterator for TimeSeriesMap {
    type Item = TimeSeries;
    type IntoIter = std::collections::btree_map::IntoValues<LabelSet, TimeSeries>;

    fn into_iter(self) -> Self::IntoIter {
        self.series.into_values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::NAME_LABEL;

    fn labels(name: &str, instance: &str) -> LabelSet {
        [(NAME_LABEL, name), ("instance", instance)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_identical_labels_merge() {
        let mut map = TimeSeriesMap::new();
        map.add_sample(Sample::new(1.0, 10), labels("up", "a"), MetricType::Int64);
        map.add_sample(Sample::new(2.0, 20), labels("up", "a"), MetricType::Int64);

        assert_eq!(map.len(), 1);
        let series = map.get(&labels("up", "a")).unwrap();
        assert_eq!(
            series.samples,
            vec![Sample::new(1.0, 10), Sample::new(2.0, 20)]
        );
    }

    #[test]
    fn test_distinct_labels_separate() {
        let mut map = TimeSeriesMap::new();
        map.add_sample(Sample::new(1.0, 10), labels("up", "a"), MetricType::Int64);
        map.add_sample(Sample::new(1.0, 10), labels("up", "b"), MetricType::Int64);

        assert_eq!(map.len(), 2);
        assert_eq!(map.sample_count(), 2);
    }

    #[test]
    fn test_type_conflict_keeps_first_type() {
        let mut map = TimeSeriesMap::new();
        map.add_sample(Sample::new(1.0, 10), labels("x", "a"), MetricType::Int64);
        map.add_sample(Sample::new(2.5, 10), labels("x", "a"), MetricType::Double);

        let series = map.get(&labels("x", "a")).unwrap();
        assert_eq!(series.metric_type, MetricType::Int64);
        assert_eq!(series.samples.len(), 2);
    }

    #[test]
    fn test_iteration_is_deterministic() {
        let mut map = TimeSeriesMap::new();
        for instance in ["c", "a", "b"] {
            map.add_sample(Sample::new(0.0, 0), labels("up", instance), MetricType::Double);
        }

        let order: Vec<_> = map
            .into_iter()
            .map(|s| s.labels.get("instance").unwrap().to_string())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }
}
