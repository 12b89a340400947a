//! Builds a [`MetricsSnapshot`] out of a scraped exposition payload.

use crate::exposition::{Line, LineError, tokenize_line};
use crate::snapshot::{MetricFamily, MetricsSnapshot};
use tracing::debug;

/// A payload line that was dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// 1-based line number in the payload
    pub line: usize,
    pub error: LineError,
}

/// Parse a raw payload into a snapshot.
///
/// Never fails: malformed lines and unusable samples are dropped.
pub fn parse(raw: &str) -> MetricsSnapshot {
    parse_with_diagnostics(raw).0
}

/// Parse a raw payload, also reporting every dropped line.
///
/// Samples of unrecognized metric families are skipped without a diagnostic.
/// For recognized families the key label must be present and the value must be
/// a finite, non-negative number. A repeated key keeps the last value.
pub fn parse_with_diagnostics(raw: &str) -> (MetricsSnapshot, Vec<Diagnostic>) {
    let mut snapshot = MetricsSnapshot::default();
    let mut diagnostics = Vec::new();

    for (idx, text) in raw.lines().enumerate() {
        let sample = match tokenize_line(text) {
            Ok(Line::Sample(sample)) => sample,
            Ok(Line::Empty | Line::Comment(_)) => continue,
            Err(error) => {
                diagnostics.push(Diagnostic {
                    line: idx + 1,
                    error,
                });
                continue;
            }
        };

        let Some(family) = MetricFamily::from_metric_name(sample.name) else {
            continue;
        };

        let Some(key) = sample.label(family.key_label()) else {
            diagnostics.push(Diagnostic {
                line: idx + 1,
                error: LineError::MissingLabel(family.key_label()),
            });
            continue;
        };

        if !sample.value.is_finite() || sample.value < 0.0 {
            diagnostics.push(Diagnostic {
                line: idx + 1,
                error: LineError::InvalidValue(sample.value.to_string()),
            });
            continue;
        }

        if let Some(previous) = snapshot.family_mut(family).insert(key, sample.value) {
            debug!(%family, key, previous, value = sample.value, "Duplicate sample replaced");
        }
    }

    (snapshot, diagnostics)
}
