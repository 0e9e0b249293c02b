//! Usage monitor.
//!
//! Records tool calls, resource accesses, errors and performance samples
//! into an [`EventStore`] and summarizes them. Recording never fails the
//! caller: store errors are logged and the event is dropped.

use aceflow_config::MonitoringConfig;
use aceflow_core::{EventQuery, SessionId, Time, UsageEvent, UsageEventType};
use aceflow_storage::{EventStore, InMemoryEventStore, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

/// Metric name under which tool durations are sampled.
pub const TOOL_DURATION_METRIC: &str = "tool_duration_ms";

/// Counters of the current session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Events recorded
    pub total_events: u64,
    /// Tool calls recorded
    pub tool_calls: u64,
    /// Resource accesses recorded
    pub resource_accesses: u64,
    /// Errors recorded
    pub errors: u64,
    /// Session start
    pub started_at: Time,
}

impl SessionStats {
    fn new() -> Self {
        Self {
            total_events: 0,
            tool_calls: 0,
            resource_accesses: 0,
            errors: 0,
            started_at: chrono::Utc::now(),
        }
    }
}

/// Aggregate of one performance metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Samples taken
    pub count: u64,
    /// Mean value
    pub avg: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
}

impl MetricSummary {
    fn first(value: f64) -> Self {
        Self {
            count: 1,
            avg: value,
            min: value,
            max: value,
        }
    }

    fn add(&mut self, value: f64) {
        self.count += 1;
        self.avg += (value - self.avg) / self.count as f64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }
}

/// Records and summarizes usage events.
pub struct UsageMonitor {
    session_id: SessionId,
    config: MonitoringConfig,
    store: Box<dyn EventStore>,
    session: SessionStats,
    performance: BTreeMap<String, MetricSummary>,
}

impl UsageMonitor {
    /// Monitor over `store`.
    pub fn new(config: MonitoringConfig, store: Box<dyn EventStore>) -> Self {
        let session_id = SessionId::new();
        info!("Usage monitor started, session {}", session_id);
        Self {
            session_id,
            config,
            store,
            session: SessionStats::new(),
            performance: BTreeMap::new(),
        }
    }

    /// Monitor over an in-memory store.
    pub fn in_memory(config: MonitoringConfig) -> Self {
        Self::new(config, Box::new(InMemoryEventStore::new()))
    }

    /// Monitor over a SQLite database file.
    #[cfg(feature = "sqlite")]
    pub async fn sqlite(config: MonitoringConfig, path: &std::path::Path) -> Result<Self> {
        let store = aceflow_storage::SqliteEventStore::new_from_path(path).await?;
        Ok(Self::new(config, Box::new(store)))
    }

    /// Session id.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Session counters.
    pub fn session_stats(&self) -> &SessionStats {
        &self.session
    }

    /// Replace the monitoring settings.
    pub fn update_config(&mut self, config: MonitoringConfig) {
        self.config = config;
    }

    fn tracking_usage(&self) -> bool {
        self.config.enabled && self.config.usage_tracking
    }

    fn tracking_performance(&self) -> bool {
        self.config.enabled && self.config.performance_tracking
    }

    async fn record(&mut self, event: UsageEvent) -> bool {
        match self.store.save_event(&event).await {
            Ok(()) => {
                self.session.total_events += 1;
                true
            }
            Err(e) => {
                error!("Failed to persist {} event: {}", event.event_type.as_str(), e);
                false
            }
        }
    }

    fn sample(&mut self, metric: &str, value: f64) {
        match self.performance.get_mut(metric) {
            Some(summary) => summary.add(value),
            None => {
                self.performance.insert(metric.to_string(), MetricSummary::first(value));
            }
        }
    }

    /// Record one tool call.
    pub async fn record_tool_call(
        &mut self,
        tool_name: &str,
        user_id: Option<&str>,
        success: bool,
        duration_ms: Option<f64>,
        error_message: Option<&str>,
    ) {
        if !self.tracking_usage() {
            return;
        }
        let mut event = UsageEvent::new(UsageEventType::ToolCall, self.session_id);
        event.tool_name = Some(tool_name.to_string());
        event.user_id = Some(user_id.unwrap_or("anonymous").to_string());
        event.success = success;
        event.duration_ms = duration_ms;
        event.error_message = error_message.map(str::to_string);

        if self.record(event).await {
            self.session.tool_calls += 1;
        }
        if let Some(ms) = duration_ms.filter(|_| self.tracking_performance()) {
            self.sample(TOOL_DURATION_METRIC, ms);
        }
        debug!("Recorded tool call {} (success: {})", tool_name, success);
    }

    /// Record one resource read.
    pub async fn record_resource_access(
        &mut self,
        resource_name: &str,
        user_id: Option<&str>,
        success: bool,
        cache_hit: bool,
    ) {
        if !self.tracking_usage() {
            return;
        }
        let mut event = UsageEvent::new(UsageEventType::ResourceAccess, self.session_id);
        event.resource_name = Some(resource_name.to_string());
        event.user_id = Some(user_id.unwrap_or("anonymous").to_string());
        event.success = success;
        event.metadata = json!({"cache_hit": cache_hit});

        if self.record(event).await {
            self.session.resource_accesses += 1;
        }
    }

    /// Record an error.
    pub async fn record_error(&mut self, message: &str, user_id: Option<&str>, tool_name: Option<&str>) {
        if !self.tracking_usage() {
            return;
        }
        let mut event = UsageEvent::new(UsageEventType::ErrorOccurred, self.session_id);
        event.success = false;
        event.error_message = Some(message.to_string());
        event.user_id = Some(user_id.unwrap_or("anonymous").to_string());
        event.tool_name = tool_name.map(str::to_string);

        if self.record(event).await {
            self.session.errors += 1;
        }
    }

    /// Record a performance sample.
    pub async fn record_performance_metric(&mut self, metric: &str, value: f64) {
        if !self.tracking_performance() {
            return;
        }
        let mut event = UsageEvent::new(UsageEventType::PerformanceMetric, self.session_id);
        event.user_id = Some("system".to_string());
        event.metadata = json!({"metric": metric, "value": value});

        self.record(event).await;
        self.sample(metric, value);
    }

    // === Queries ===

    /// Newest `limit` events.
    pub async fn get_recent_events(&self, limit: usize) -> Result<Vec<UsageEvent>> {
        self.store
            .get_events(&EventQuery {
                limit: Some(limit),
                ..Default::default()
            })
            .await
    }

    /// Events between `start` and `end`, newest first.
    pub async fn get_events_by_timerange(&self, start: Time, end: Time) -> Result<Vec<UsageEvent>> {
        self.store
            .get_events(&EventQuery {
                start: Some(start),
                end: Some(end),
                ..Default::default()
            })
            .await
    }

    /// Newest `limit` events of one user.
    pub async fn get_user_activity(&self, user_id: &str, limit: usize) -> Result<Vec<UsageEvent>> {
        self.store
            .get_events(&EventQuery {
                user_id: Some(user_id.to_string()),
                limit: Some(limit),
                ..Default::default()
            })
            .await
    }

    /// Session counters, last-24h activity and performance aggregates.
    pub async fn get_usage_stats(&self) -> Result<Value> {
        let now = chrono::Utc::now();
        let recent = self
            .store
            .get_events(&EventQuery {
                start: Some(now - chrono::Duration::hours(24)),
                ..Default::default()
            })
            .await?;

        let count = |kind: UsageEventType| recent.iter().filter(|e| e.event_type == kind).count();
        let users: BTreeSet<&str> = recent.iter().filter_map(|e| e.user_id.as_deref()).collect();

        Ok(json!({
            "session": {
                "session_id": self.session_id,
                "duration_seconds": (now - self.session.started_at).num_milliseconds() as f64 / 1000.0,
                "total_events": self.session.total_events,
                "tool_calls": self.session.tool_calls,
                "resource_accesses": self.session.resource_accesses,
                "errors": self.session.errors,
                "started_at": self.session.started_at,
            },
            "recent_24h": {
                "total_events": recent.len(),
                "unique_users": users.len(),
                "tool_calls": count(UsageEventType::ToolCall),
                "resource_accesses": count(UsageEventType::ResourceAccess),
                "errors": count(UsageEventType::ErrorOccurred),
            },
            "performance": self.performance,
            "stored_events": self.store.get_event_count().await?,
        }))
    }

    /// Per-tool call counts and durations over every stored tool call.
    pub async fn get_tool_usage_summary(&self) -> Result<Value> {
        let calls = self
            .store
            .get_events(&EventQuery {
                event_type: Some(UsageEventType::ToolCall),
                ..Default::default()
            })
            .await?;

        #[derive(Default)]
        struct ToolTally {
            calls: u64,
            successes: u64,
            failures: u64,
            duration_ms: f64,
            timed: u64,
        }

        let mut by_tool: BTreeMap<String, ToolTally> = BTreeMap::new();
        for event in &calls {
            let tally = by_tool
                .entry(event.tool_name.clone().unwrap_or_else(|| "unknown".to_string()))
                .or_default();
            tally.calls += 1;
            if event.success {
                tally.successes += 1;
            } else {
                tally.failures += 1;
            }
            if let Some(ms) = event.duration_ms {
                tally.duration_ms += ms;
                tally.timed += 1;
            }
        }

        let successes: u64 = by_tool.values().map(|t| t.successes).sum();
        let total = calls.len() as u64;
        let tools: serde_json::Map<String, Value> = by_tool
            .into_iter()
            .map(|(name, t)| {
                let avg = if t.timed == 0 { 0.0 } else { t.duration_ms / t.timed as f64 };
                (
                    name,
                    json!({
                        "calls": t.calls,
                        "successes": t.successes,
                        "failures": t.failures,
                        "avg_duration_ms": avg,
                    }),
                )
            })
            .collect();

        Ok(json!({
            "summary": {
                "total_calls": total,
                "unique_tools": tools.len(),
                "success_rate": if total == 0 { 0.0 } else { successes as f64 / total as f64 },
            },
            "by_tool": tools,
        }))
    }

    /// Delete events older than the retention period.
    pub async fn cleanup_old_data(&mut self) -> Result<usize> {
        let removed = self.store.cleanup_old_events(self.config.data_retention_days).await?;
        if removed > 0 {
            info!("Removed {} usage events older than {} days", removed, self.config.data_retention_days);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> UsageMonitor {
        UsageMonitor::in_memory(MonitoringConfig::default())
    }

    #[tokio::test]
    async fn test_session_counters() {
        let mut m = monitor();
        m.record_tool_call("aceflow_init", Some("alice"), true, Some(12.0), None).await;
        m.record_tool_call("aceflow_stage", None, false, Some(4.0), Some("boom")).await;
        m.record_resource_access("aceflow://project/state", Some("alice"), true, false).await;
        m.record_error("boom", None, Some("aceflow_stage")).await;

        let stats = m.session_stats();
        assert_eq!(stats.total_events, 4);
        assert_eq!(stats.tool_calls, 2);
        assert_eq!(stats.resource_accesses, 1);
        assert_eq!(stats.errors, 1);

        let usage = m.get_usage_stats().await.unwrap();
        assert_eq!(usage["recent_24h"]["total_events"], 4);
        assert_eq!(usage["recent_24h"]["unique_users"], 2);
        assert_eq!(usage["performance"][TOOL_DURATION_METRIC]["count"], 2);
        assert_eq!(usage["performance"][TOOL_DURATION_METRIC]["max"], 12.0);
        assert_eq!(usage["performance"][TOOL_DURATION_METRIC]["avg"], 8.0);
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let mut m = UsageMonitor::in_memory(MonitoringConfig {
            usage_tracking: false,
            ..Default::default()
        });
        m.record_tool_call("aceflow_init", None, true, None, None).await;
        m.record_error("x", None, None).await;
        assert_eq!(m.session_stats().total_events, 0);
        assert!(m.get_recent_events(10).await.unwrap().is_empty());

        m.record_performance_metric("memory_mb", 10.0).await;
        assert_eq!(m.session_stats().total_events, 1);

        m.update_config(MonitoringConfig {
            enabled: false,
            ..Default::default()
        });
        m.record_performance_metric("memory_mb", 10.0).await;
        assert_eq!(m.session_stats().total_events, 1);
    }

    #[tokio::test]
    async fn test_tool_usage_summary() {
        let mut m = monitor();
        m.record_tool_call("aceflow_init", None, true, Some(10.0), None).await;
        m.record_tool_call("aceflow_init", None, false, Some(30.0), Some("exists")).await;
        m.record_tool_call("aceflow_stage", None, true, None, None).await;

        let summary = m.get_tool_usage_summary().await.unwrap();
        assert_eq!(summary["summary"]["total_calls"], 3);
        assert_eq!(summary["summary"]["unique_tools"], 2);
        assert!((summary["summary"]["success_rate"].as_f64().unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(summary["by_tool"]["aceflow_init"]["failures"], 1);
        assert_eq!(summary["by_tool"]["aceflow_init"]["avg_duration_ms"], 20.0);
        assert_eq!(summary["by_tool"]["aceflow_stage"]["avg_duration_ms"], 0.0);
    }

    #[tokio::test]
    async fn test_queries() {
        let mut m = monitor();
        m.record_tool_call("aceflow_init", Some("alice"), true, None, None).await;
        m.record_tool_call("aceflow_stage", Some("bob"), true, None, None).await;
        m.record_tool_call("aceflow_validate", Some("alice"), true, None, None).await;

        assert_eq!(m.get_recent_events(2).await.unwrap().len(), 2);
        assert_eq!(m.get_user_activity("alice", 10).await.unwrap().len(), 2);

        let now = chrono::Utc::now();
        let window = m
            .get_events_by_timerange(now - chrono::Duration::minutes(1), now + chrono::Duration::minutes(1))
            .await
            .unwrap();
        assert_eq!(window.len(), 3);

        assert_eq!(m.cleanup_old_data().await.unwrap(), 0);
    }
}
