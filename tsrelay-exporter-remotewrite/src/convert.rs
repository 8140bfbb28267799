//! Conversion of metrics into remote-write samples.

use tsrelay_common::metrics::{
    DoubleDataPoint, HistogramDataPoint, Int64DataPoint, Metric, MetricData, MetricType,
    SummaryDataPoint, Temporality,
};

use crate::error::ExportError;
use crate::labels::{
    BUCKET_SUFFIX, COUNT_SUFFIX, LE_LABEL, NAME_LABEL, POSITIVE_INF, QUANTILE_LABEL, SUM_SUFFIX,
    create_label_set, metric_name,
};
use crate::series::{Sample, TimeSeriesMap};

/// Nanoseconds since epoch to milliseconds, truncating.
pub fn convert_timestamp(nanos: u64) -> i64 {
    (nanos / 1_000_000) as i64
}

/// Shortest decimal form of `value` that round-trips, without exponent.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        POSITIVE_INF.to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

/// Check a metric's type, temporality and datapoint collection.
pub fn validate_metric(metric: &Metric) -> Result<(), ExportError> {
    let descriptor = &metric.descriptor;
    let cumulative_only = match descriptor.metric_type {
        MetricType::Int64 | MetricType::Double => false,
        MetricType::MonotonicInt64
        | MetricType::MonotonicDouble
        | MetricType::Histogram
        | MetricType::Summary => true,
        MetricType::Unspecified => {
            return Err(ExportError::UnsupportedType {
                name: descriptor.name.clone(),
                metric_type: descriptor.metric_type,
            });
        }
    };

    if cumulative_only && descriptor.temporality != Temporality::Cumulative {
        return Err(ExportError::InvalidTemporality {
            name: descriptor.name.clone(),
            metric_type: descriptor.metric_type,
            temporality: descriptor.temporality,
        });
    }

    let matches = matches!(
        (descriptor.metric_type, &metric.data),
        (
            MetricType::Int64 | MetricType::MonotonicInt64,
            Some(MetricData::Int64(_))
        ) | (
            MetricType::Double | MetricType::MonotonicDouble,
            Some(MetricData::Double(_))
        ) | (MetricType::Histogram, Some(MetricData::Histogram(_)))
            | (MetricType::Summary, Some(MetricData::Summary(_)))
    );
    if !matches {
        return Err(ExportError::MissingDataPoints {
            name: descriptor.name.clone(),
        });
    }

    Ok(())
}

/// Validate `metric` and add all of its samples to `series`.
///
/// Nothing is added when validation fails.
pub fn add_metric(
    series: &mut TimeSeriesMap,
    metric: &Metric,
    namespace: &str,
) -> Result<(), ExportError> {
    validate_metric(metric)?;

    let name = metric_name(namespace, &metric.descriptor.name);
    let metric_type = metric.descriptor.metric_type;

    match &metric.data {
        Some(MetricData::Int64(points)) => add_int64_points(series, &name, metric_type, points),
        Some(MetricData::Double(points)) => add_double_points(series, &name, metric_type, points),
        Some(MetricData::Histogram(points)) => {
            add_histogram_points(series, &name, metric_type, points)
        }
        Some(MetricData::Summary(points)) => add_summary_points(series, &name, metric_type, points),
        None => {}
    }

    Ok(())
}

fn add_int64_points(
    series: &mut TimeSeriesMap,
    name: &str,
    metric_type: MetricType,
    points: &[Int64DataPoint],
) {
    for point in points {
        let labels = create_label_set(&point.labels, &[(NAME_LABEL, name)]);
        let sample = Sample::new(point.value as f64, convert_timestamp(point.time_unix_nano));
        series.add_sample(sample, labels, metric_type);
    }
}

fn add_double_points(
    series: &mut TimeSeriesMap,
    name: &str,
    metric_type: MetricType,
    points: &[DoubleDataPoint],
) {
    for point in points {
        let labels = create_label_set(&point.labels, &[(NAME_LABEL, name)]);
        let sample = Sample::new(point.value, convert_timestamp(point.time_unix_nano));
        series.add_sample(sample, labels, metric_type);
    }
}

// Bucket values are the per-bucket counts as received, not cumulative.
// `+Inf` carries the total of every bucket, including a trailing bucket
// that has no explicit bound.
fn add_histogram_points(
    series: &mut TimeSeriesMap,
    name: &str,
    metric_type: MetricType,
    points: &[HistogramDataPoint],
) {
    let sum_name = format!("{}{}", name, SUM_SUFFIX);
    let count_name = format!("{}{}", name, COUNT_SUFFIX);
    let bucket_name = format!("{}{}", name, BUCKET_SUFFIX);

    for point in points {
        let timestamp = convert_timestamp(point.time_unix_nano);

        let labels = create_label_set(&point.labels, &[(NAME_LABEL, sum_name.as_str())]);
        series.add_sample(Sample::new(point.sum, timestamp), labels, metric_type);

        let labels = create_label_set(&point.labels, &[(NAME_LABEL, count_name.as_str())]);
        series.add_sample(Sample::new(point.count as f64, timestamp), labels, metric_type);

        let mut total: u64 = 0;
        for (i, bucket) in point.buckets.iter().enumerate() {
            total = total.saturating_add(bucket.count);

            let Some(bound) = point.explicit_bounds.get(i) else {
                continue;
            };
            let le = format_float(*bound);
            let labels = create_label_set(
                &point.labels,
                &[(NAME_LABEL, bucket_name.as_str()), (LE_LABEL, le.as_str())],
            );
            series.add_sample(Sample::new(bucket.count as f64, timestamp), labels, metric_type);
        }

        let labels = create_label_set(
            &point.labels,
            &[(NAME_LABEL, bucket_name.as_str()), (LE_LABEL, POSITIVE_INF)],
        );
        series.add_sample(Sample::new(total as f64, timestamp), labels, metric_type);
    }
}

fn add_summary_points(
    series: &mut TimeSeriesMap,
    name: &str,
    metric_type: MetricType,
    points: &[SummaryDataPoint],
) {
    let sum_name = format!("{}{}", name, SUM_SUFFIX);
    let count_name = format!("{}{}", name, COUNT_SUFFIX);

    for point in points {
        let timestamp = convert_timestamp(point.time_unix_nano);

        let labels = create_label_set(&point.labels, &[(NAME_LABEL, sum_name.as_str())]);
        series.add_sample(Sample::new(point.sum, timestamp), labels, metric_type);

        let labels = create_label_set(&point.labels, &[(NAME_LABEL, count_name.as_str())]);
        series.add_sample(Sample::new(point.count as f64, timestamp), labels, metric_type);

        for quantile in &point.percentile_values {
            let q = format_float(quantile.percentile);
            let labels = create_label_set(
                &point.labels,
                &[(NAME_LABEL, name), (QUANTILE_LABEL, q.as_str())],
            );
            series.add_sample(Sample::new(quantile.value, timestamp), labels, metric_type);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::LabelSet;
    use crate::series::TimeSeries;
    use tsrelay_common::metrics::{MetricDescriptor, ValueAtPercentile};

    fn lookup<'a>(map: &'a TimeSeriesMap, pairs: &[(&str, &str)]) -> &'a TimeSeries {
        let labels: LabelSet = pairs.iter().copied().collect();
        map.get(&labels)
            .unwrap_or_else(|| panic!("missing series {}", labels))
    }

    fn first_value(map: &TimeSeriesMap, pairs: &[(&str, &str)]) -> f64 {
        lookup(map, pairs).samples[0].value
    }

    #[test]
    fn test_convert_timestamp() {
        assert_eq!(convert_timestamp(1_000_000_000), 1000);
        assert_eq!(convert_timestamp(0), 0);
        assert_eq!(convert_timestamp(1_999_999), 1);
    }

    #[test]
    fn test_format_float() {
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(1.0), "1");
        assert_eq!(format_float(10.0), "10");
        assert_eq!(format_float(0.99), "0.99");
        assert_eq!(format_float(1e21), "1000000000000000000000");
        assert_eq!(format_float(f64::INFINITY), "+Inf");
        assert_eq!(format_float(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_float(f64::NAN), "NaN");
    }

    #[test]
    fn test_scalar_gauge() {
        let metric = Metric::double_gauge(
            "cpu_usage",
            vec![DoubleDataPoint::new(42.5, 5_000_000_000).with_label("instance", "a")],
        );

        let mut map = TimeSeriesMap::new();
        add_metric(&mut map, &metric, "").unwrap();

        assert_eq!(map.len(), 1);
        let series = lookup(&map, &[("__name__", "cpu_usage"), ("instance", "a")]);
        assert_eq!(series.samples, vec![Sample::new(42.5, 5000)]);
    }

    #[test]
    fn test_int_counter_with_namespace() {
        let metric = Metric::int64_counter("requests", vec![Int64DataPoint::new(7, 2_000_000)]);

        let mut map = TimeSeriesMap::new();
        add_metric(&mut map, &metric, "web").unwrap();

        let series = lookup(&map, &[("__name__", "web_requests")]);
        assert_eq!(series.samples, vec![Sample::new(7.0, 2)]);
        assert_eq!(series.metric_type, MetricType::MonotonicInt64);
    }

    #[test]
    fn test_histogram_fan_out() {
        let metric = Metric::histogram(
            "latency",
            vec![HistogramDataPoint::new(
                1_000_000_000,
                10,
                100.0,
                &[2, 3, 5],
                &[0.1, 1.0, 10.0],
            )],
        );

        let mut map = TimeSeriesMap::new();
        add_metric(&mut map, &metric, "").unwrap();

        assert_eq!(map.len(), 6);
        assert_eq!(first_value(&map, &[("__name__", "latency_bucket"), ("le", "0.1")]), 2.0);
        assert_eq!(first_value(&map, &[("__name__", "latency_bucket"), ("le", "1")]), 3.0);
        assert_eq!(first_value(&map, &[("__name__", "latency_bucket"), ("le", "10")]), 5.0);
        assert_eq!(first_value(&map, &[("__name__", "latency_bucket"), ("le", "+Inf")]), 10.0);
        assert_eq!(first_value(&map, &[("__name__", "latency_sum")]), 100.0);
        assert_eq!(first_value(&map, &[("__name__", "latency_count")]), 10.0);
        assert!(map.iter().all(|s| s.samples[0].timestamp_ms == 1000));
    }

    #[test]
    fn test_histogram_overflow_bucket_counts_towards_inf() {
        // Four buckets, three bounds: the last bucket is the implicit overflow.
        let metric = Metric::histogram(
            "size",
            vec![HistogramDataPoint::new(0, 12, 40.0, &[1, 2, 3, 6], &[1.0, 2.0, 5.0])],
        );

        let mut map = TimeSeriesMap::new();
        add_metric(&mut map, &metric, "").unwrap();

        // sum, count, three bounded buckets, +Inf
        assert_eq!(map.len(), 6);
        let inf = lookup(&map, &[("__name__", "size_bucket"), ("le", "+Inf")]);
        assert_eq!(inf.samples[0].value, 12.0);
    }

    #[test]
    fn test_summary_quantiles() {
        let metric = Metric::summary(
            "rpc",
            vec![
                SummaryDataPoint::new(
                    3_000_000,
                    4,
                    8.0,
                    vec![
                        ValueAtPercentile::new(0.5, 1.5),
                        ValueAtPercentile::new(0.99, 3.25),
                    ],
                )
                .with_label("method", "get"),
            ],
        );

        let mut map = TimeSeriesMap::new();
        add_metric(&mut map, &metric, "ns").unwrap();

        assert_eq!(map.len(), 4);
        let q = lookup(
            &map,
            &[("__name__", "ns_rpc"), ("method", "get"), ("quantile", "0.99")],
        );
        assert_eq!(q.samples, vec![Sample::new(3.25, 3)]);
        let count = lookup(&map, &[("__name__", "ns_rpc_count"), ("method", "get")]);
        assert_eq!(count.samples[0].value, 4.0);
    }

    #[test]
    fn test_duplicate_points_merge() {
        let metric = Metric::int64_gauge(
            "queue",
            vec![
                Int64DataPoint::new(1, 1_000_000).with_label("q", "x"),
                Int64DataPoint::new(2, 2_000_000).with_label("q", "x"),
            ],
        );

        let mut map = TimeSeriesMap::new();
        add_metric(&mut map, &metric, "").unwrap();

        assert_eq!(map.len(), 1);
        let series = lookup(&map, &[("__name__", "queue"), ("q", "x")]);
        assert_eq!(
            series.samples,
            vec![Sample::new(1.0, 1), Sample::new(2.0, 2)]
        );
    }

    #[test]
    fn test_validate_unspecified_type() {
        let metric = Metric {
            descriptor: MetricDescriptor::new(
                "m",
                MetricType::Unspecified,
                Temporality::Cumulative,
            ),
            data: Some(MetricData::Int64(vec![])),
        };
        assert!(matches!(
            validate_metric(&metric),
            Err(ExportError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_validate_temporality() {
        let gauge = Metric::new(
            MetricDescriptor::new("g", MetricType::Double, Temporality::Delta),
            MetricData::Double(vec![]),
        );
        assert!(validate_metric(&gauge).is_ok());

        let counter = Metric::new(
            MetricDescriptor::new("c", MetricType::MonotonicInt64, Temporality::Delta),
            MetricData::Int64(vec![]),
        );
        let err = validate_metric(&counter).unwrap_err();
        assert!(matches!(err, ExportError::InvalidTemporality { .. }));
        assert!(
            err.to_string()
                .starts_with("invalid temporality and type combination")
        );

        let histogram = Metric::new(
            MetricDescriptor::new("h", MetricType::Histogram, Temporality::Instantaneous),
            MetricData::Histogram(vec![]),
        );
        assert!(validate_metric(&histogram).is_err());
    }

    #[test]
    fn test_validate_missing_points() {
        let missing = Metric {
            descriptor: MetricDescriptor::new("m", MetricType::Int64, Temporality::Instantaneous),
            data: None,
        };
        assert_eq!(
            validate_metric(&missing).unwrap_err().to_string(),
            "nil data point field in metric m"
        );

        let mismatched = Metric::new(
            MetricDescriptor::new("m", MetricType::Summary, Temporality::Cumulative),
            MetricData::Double(vec![]),
        );
        assert!(matches!(
            validate_metric(&mismatched),
            Err(ExportError::MissingDataPoints { .. })
        ));

        let mut map = TimeSeriesMap::new();
        assert!(add_metric(&mut map, &mismatched, "").is_err());
        assert!(map.is_empty());
    }
}
