//! Usage monitoring for AceFlow.

#![warn(missing_docs)]

pub mod monitor;

pub use monitor::{MetricSummary, SessionStats, UsageMonitor, TOOL_DURATION_METRIC};
