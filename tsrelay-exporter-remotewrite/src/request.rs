//! Write request assembly and wire encoding.

use bytes::Bytes;
use prost::Message;

use crate::error::DeliveryError;
use crate::proto;
use crate::series::{TimeSeries, TimeSeriesMap};

/// Collect every series of the map into a write request, in map order.
pub fn build_write_request(series: TimeSeriesMap) -> proto::WriteRequest {
    proto::WriteRequest {
        timeseries: series.into_iter().map(to_proto).collect(),
    }
}

fn to_proto(series: TimeSeries) -> proto::TimeSeries {
    proto::TimeSeries {
        labels: series
            .labels
            .iter()
            .map(|(name, value)| proto::Label {
                name: name.to_string(),
                value: value.to_string(),
            })
            .collect(),
        samples: series
            .samples
            .iter()
            .map(|s| proto::Sample {
                value: s.value,
                timestamp: s.timestamp_ms,
            })
            .collect(),
    }
}

/// Protobuf-encode the request and compress it as a raw snappy block.
pub fn encode_request(request: &proto::WriteRequest) -> Result<Bytes, DeliveryError> {
    let mut buf = Vec::with_capacity(request.encoded_len());
    request.encode(&mut buf)?;

    let compressed = snap::raw::Encoder::new().compress_vec(&buf)?;
    Ok(Bytes::from(compressed))
}

/// Reverse of [`encode_request`].
///
/// Not used on the send path; handy for receivers and tests.
pub fn decode_request(body: &[u8]) -> Result<proto::WriteRequest, DecodeError> {
    let raw = snap::raw::Decoder::new().decompress_vec(body)?;
    Ok(proto::WriteRequest::decode(raw.as_slice())?)
}

/// Failure to decode a remote-write body.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid snappy block: {0}")]
    Snappy(#[from] snap::Error),
    #[error("invalid write request: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{LabelSet, NAME_LABEL};
    use crate::series::Sample;
    use tsrelay_common::metrics::MetricType;

    fn series_map() -> TimeSeriesMap {
        let mut map = TimeSeriesMap::new();
        let b: LabelSet = [(NAME_LABEL, "b_metric"), ("zone", "eu")].into_iter().collect();
        let a: LabelSet = [(NAME_LABEL, "a_metric")].into_iter().collect();
        map.add_sample(Sample::new(2.0, 2000), b, MetricType::Double);
        map.add_sample(Sample::new(1.0, 1000), a.clone(), MetricType::Double);
        map.add_sample(Sample::new(1.5, 1500), a, MetricType::Double);
        map
    }

    #[test]
    fn test_build_write_request() {
        let request = build_write_request(series_map());

        assert_eq!(request.timeseries.len(), 2);
        let first = &request.timeseries[0];
        assert_eq!(first.labels[0].name, "__name__");
        assert_eq!(first.labels[0].value, "a_metric");
        assert_eq!(first.samples.len(), 2);
        assert_eq!(first.samples[1].timestamp, 1500);

        // Labels are name-sorted within a series.
        let second = &request.timeseries[1];
        let names: Vec<_> = second.labels.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["__name__", "zone"]);
    }

    #[test]
    fn test_encode_decode() {
        let request = build_write_request(series_map());
        let body = encode_request(&request).unwrap();

        // Snappy raw blocks start with the varint uncompressed length.
        let uncompressed = snap::raw::decompress_len(&body).unwrap();
        assert_eq!(uncompressed, request.encoded_len());

        assert_eq!(decode_request(&body).unwrap(), request);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_request(b"\xff\xff\xff\xff\xff\xff"),
            Err(DecodeError::Snappy(_))
        ));
    }
}
