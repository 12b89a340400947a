//! Metrics snapshot types.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;
use std::fmt;

/// The metric families scraped from the exporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricFamily {
    /// Salt job executions, keyed by the `fun` label
    SaltJobs,
    /// Salt master statistics, keyed by the `name` label
    SaltMasterStats,
    /// Uyuni summary counters, keyed by the `name` label
    UyuniSummary,
}

impl MetricFamily {
    /// All recognized families.
    pub const ALL: [MetricFamily; 3] = [
        MetricFamily::SaltJobs,
        MetricFamily::SaltMasterStats,
        MetricFamily::UyuniSummary,
    ];

    /// Metric name as it appears in the exposition text.
    pub fn metric_name(&self) -> &'static str {
        match self {
            MetricFamily::SaltJobs => "salt_jobs",
            MetricFamily::SaltMasterStats => "salt_master_stats",
            MetricFamily::UyuniSummary => "uyuni_summary",
        }
    }

    /// Label holding the aggregation key.
    pub fn key_label(&self) -> &'static str {
        match self {
            MetricFamily::SaltJobs => "fun",
            MetricFamily::SaltMasterStats | MetricFamily::UyuniSummary => "name",
        }
    }

    /// Look up a family by exact metric name.
    pub fn from_metric_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.metric_name() == name)
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.metric_name())
    }
}

/// Counter values keyed by name.
///
/// Keys keep the position of their first insertion; re-inserting a key
/// replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Counters {
    entries: Vec<(String, f64)>,
    index: HashMap<String, usize>,
}

impl Counters {
    /// Create an empty set of counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning the one it replaced
    pub fn insert(&mut self, key: impl Into<String>, value: f64) -> Option<f64> {
        let key = key.into();
        match self.index.get(&key) {
            Some(&pos) => Some(std::mem::replace(&mut self.entries[pos].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.index.get(key).map(|&pos| self.entries[pos].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Counters {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut counters = Counters::new();
        for (key, value) in iter {
            counters.insert(key, value);
        }
        counters
    }
}

impl Serialize for Counters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Structured result of one metrics scrape.
///
/// All three families are always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct MetricsSnapshot {
    salt_jobs: Counters,
    salt_master_stats: Counters,
    uyuni_summary: Counters,
}

impl MetricsSnapshot {
    /// Create a snapshot from the three families
    pub fn new(salt_jobs: Counters, salt_master_stats: Counters, uyuni_summary: Counters) -> Self {
        Self {
            salt_jobs,
            salt_master_stats,
            uyuni_summary,
        }
    }

    /// Salt job execution counts keyed by function name
    pub fn salt_jobs(&self) -> &Counters {
        &self.salt_jobs
    }

    /// Salt master statistics keyed by stat name
    pub fn salt_master_stats(&self) -> &Counters {
        &self.salt_master_stats
    }

    /// Uyuni summary counters keyed by metric name
    pub fn uyuni_summary(&self) -> &Counters {
        &self.uyuni_summary
    }

    /// Counters of the given family
    pub fn family(&self, family: MetricFamily) -> &Counters {
        match family {
            MetricFamily::SaltJobs => &self.salt_jobs,
            MetricFamily::SaltMasterStats => &self.salt_master_stats,
            MetricFamily::UyuniSummary => &self.uyuni_summary,
        }
    }

    pub(crate) fn family_mut(&mut self, family: MetricFamily) -> &mut Counters {
        match family {
            MetricFamily::SaltJobs => &mut self.salt_jobs,
            MetricFamily::SaltMasterStats => &mut self.salt_master_stats,
            MetricFamily::UyuniSummary => &mut self.uyuni_summary,
        }
    }

    /// True when no family holds any value
    pub fn is_empty(&self) -> bool {
        MetricFamily::ALL.iter().all(|f| self.family(*f).is_empty())
    }

    /// Render the snapshot back to exposition text.
    ///
    /// Only the key label of each family is written.
    pub fn to_exposition(&self) -> String {
        let mut out = String::new();
        for family in MetricFamily::ALL {
            for (key, value) in self.family(family).iter() {
                out.push_str(&format!(
                    "{}{{{}=\"{}\"}} {}\n",
                    family.metric_name(),
                    family.key_label(),
                    escape_label_value(key),
                    value
                ));
            }
        }
        out
    }
}

fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}
