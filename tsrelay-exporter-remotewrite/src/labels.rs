//! Label set construction for exported series.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Reserved label carrying the series name.
pub const NAME_LABEL: &str = "__name__";
/// Histogram bucket upper bound label.
pub const LE_LABEL: &str = "le";
/// Summary quantile label.
pub const QUANTILE_LABEL: &str = "quantile";
/// Bound of the overflow histogram bucket.
pub const POSITIVE_INF: &str = "+Inf";

pub const SUM_SUFFIX: &str = "_sum";
pub const COUNT_SUFFIX: &str = "_count";
pub const BUCKET_SUFFIX: &str = "_bucket";

/// A canonical, name-sorted label set.
///
/// Two label sets compare equal exactly when they hold the same name/value
/// pairs, so the set itself serves as the aggregation key for time series.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a label.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The series name, if one was set.
    pub fn name(&self) -> Option<&str> {
        self.get(NAME_LABEL)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Labels in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Canonical string form, `name=value` pairs in name order.
    pub fn signature(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}=\"", k)?;
            write_escaped(f, v)?;
            f.write_str("\"")?;
        }
        f.write_str("}")
    }
}

/// Label value escaping of the Prometheus text format.
fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            c => write!(f, "{}", c)?,
        }
    }
    Ok(())
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Merge a datapoint's labels with override pairs.
///
/// Overrides are applied in order and the last write for a name wins. Label
/// names are passed through without validation.
pub fn create_label_set(native: &HashMap<String, String>, overrides: &[(&str, &str)]) -> LabelSet {
    let mut labels: LabelSet = native.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
    for (name, value) in overrides {
        labels.insert(*name, *value);
    }
    labels
}

/// Exported name for a metric: `<namespace>_<name>`, or `name` when the
/// namespace is empty.
pub fn metric_name(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}_{}", namespace, name)
    }
}
