//! Typed query results: label sets, samples, instant and range series.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label key that carries the metric name of a series.
pub const LABEL_FOR_NAME: &str = "__name__";

/// The key/value tags identifying one series.
///
/// Iteration order is unspecified. [`fmt::Display`] renders the canonical
/// form `name{a="1",b="2"}`: the metric name first, then every other label
/// sorted, with the reserved name key never appearing among the attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(HashMap<String, String>);

impl LabelSet {
    /// Creates an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the metric name, or an empty string if the series has none.
    pub fn name(&self) -> &str {
        self.0.get(LABEL_FOR_NAME).map_or("", String::as_str)
    }

    /// Returns the value of a label.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether the label is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Sets a label, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Number of labels, including the metric name.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set has no labels at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over all labels in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns every label except the metric name, sorted by key.
    pub fn attributes(&self) -> Vec<(&str, &str)> {
        let mut attrs: Vec<_> = self.iter().filter(|(k, _)| *k != LABEL_FOR_NAME).collect();
        attrs.sort_unstable();
        attrs
    }
}

impl From<HashMap<String, String>> for LabelSet {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())?;
        f.write_str("{")?;
        for (i, (key, value)) in self.attributes().into_iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value:?}")?;
        }
        f.write_str("}")
    }
}

/// One observed sample.
///
/// Timestamps carry millisecond precision. The default sample is zero at the
/// Unix epoch, which is what an instant result with an empty `value` decodes to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// The observed value.
    pub value: f64,
    /// When the value was observed.
    pub timestamp: DateTime<Utc>,
}

/// One scalar observation per matched series at a single point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instant {
    /// Labels of the matched series.
    pub labels: LabelSet,
    /// The observation.
    #[serde(flatten)]
    pub sample: Sample,
}

impl Instant {
    /// Returns the metric name of the series.
    pub fn name(&self) -> &str {
        self.labels.name()
    }

    /// Shorthand for `self.sample.value`.
    pub fn value(&self) -> f64 {
        self.sample.value
    }

    /// Shorthand for `self.sample.timestamp`.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.sample.timestamp
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.labels.fmt(f)
    }
}

/// A time series of observations for one matched series.
///
/// Values keep the order the server emitted them in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    /// Labels of the matched series.
    pub labels: LabelSet,
    /// The observations.
    pub values: Vec<Sample>,
}

impl Range {
    /// Returns the metric name of the series.
    pub fn name(&self) -> &str {
        self.labels.name()
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.labels.fmt(f)
    }
}
