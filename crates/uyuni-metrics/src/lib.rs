//! Scraping and parsing of the Uyuni health exporter metrics.
//!
//! The exporter publishes three metric families in the text exposition format:
//! - `salt_jobs{fun="...",name="..."}`: Salt job executions per function
//! - `salt_master_stats{name="..."}`: Salt master statistics
//! - `uyuni_summary{name="..."}`: Uyuni server counters
//!
//! # Example
//!
//! ```
//! use uyuni_metrics::parse;
//!
//! let snapshot = parse(r#"uyuni_summary{name="uyuni_summary_systems_total"} 42"#);
//! assert_eq!(snapshot.uyuni_summary().get("uyuni_summary_systems_total"), Some(42.0));
//! assert!(snapshot.salt_jobs().is_empty());
//! ```

pub mod exposition;
pub mod fetcher;
pub mod parser;
pub mod snapshot;

pub use exposition::{Line, LineError, Sample, tokenize_line};
pub use fetcher::{HttpFetcher, MetricsSource};
pub use parser::{Diagnostic, parse, parse_with_diagnostics};
pub use snapshot::{Counters, MetricFamily, MetricsSnapshot};
