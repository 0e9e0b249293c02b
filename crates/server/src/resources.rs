//! Resource routes.
//!
//! Maps `aceflow://` URIs to resource kinds and guards them with an access
//! level and a per-minute rate limit. Content is produced by the server.

use aceflow_core::Time;
use aceflow_storage::CacheStrategy;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use tracing::{debug, warn};

use crate::error::{Result, ServerError};

/// URI scheme of every resource.
pub const RESOURCE_SCHEME: &str = "aceflow://";

/// User assumed when a read names none.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Who may read a resource, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    /// Anyone
    Public,
    /// Known users
    Authenticated,
    /// Operators
    Admin,
}

impl AccessLevel {
    /// Snake-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Public => "public",
            AccessLevel::Authenticated => "authenticated",
            AccessLevel::Admin => "admin",
        }
    }

    /// Inverse of [`AccessLevel::as_str`].
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "public" => Some(AccessLevel::Public),
            "authenticated" => Some(AccessLevel::Authenticated),
            "admin" => Some(AccessLevel::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kinds of readable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// `aceflow://project/state`
    ProjectState,
    /// `aceflow://workflow/config`
    WorkflowConfig,
    /// `aceflow://stage/guide/{stage}`
    StageGuide,
    /// `aceflow://system/metrics`
    SystemMetrics,
}

impl ResourceKind {
    /// Every kind, in listing order.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::ProjectState,
        ResourceKind::WorkflowConfig,
        ResourceKind::StageGuide,
        ResourceKind::SystemMetrics,
    ];

    /// Resource type name, also the cache key prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::ProjectState => "project_state",
            ResourceKind::WorkflowConfig => "workflow_config",
            ResourceKind::StageGuide => "stage_guide",
            ResourceKind::SystemMetrics => "system_metrics",
        }
    }

    /// Route settings of this kind.
    pub fn route(&self) -> ResourceRoute {
        match self {
            ResourceKind::ProjectState => ResourceRoute {
                kind: *self,
                uri: "aceflow://project/state",
                name: "Project State",
                description: "Current project, workflow position and collaboration summary",
                access: AccessLevel::Authenticated,
                cache: CacheStrategy::MediumTerm,
                rate_limit: 60,
            },
            ResourceKind::WorkflowConfig => ResourceRoute {
                kind: *self,
                uri: "aceflow://workflow/config",
                name: "Workflow Config",
                description: "Workflow definition and active settings",
                access: AccessLevel::Public,
                cache: CacheStrategy::LongTerm,
                rate_limit: 30,
            },
            ResourceKind::StageGuide => ResourceRoute {
                kind: *self,
                uri: "aceflow://stage/guide/{stage}",
                name: "Stage Guide",
                description: "Objectives, steps and best practices of a workflow stage",
                access: AccessLevel::Public,
                cache: CacheStrategy::LongTerm,
                rate_limit: 30,
            },
            ResourceKind::SystemMetrics => ResourceRoute {
                kind: *self,
                uri: "aceflow://system/metrics",
                name: "System Metrics",
                description: "Server status, module health, usage, cache and routing statistics",
                access: AccessLevel::Admin,
                cache: CacheStrategy::ShortTerm,
                rate_limit: 10,
            },
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static settings of one resource route.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRoute {
    /// Kind served
    pub kind: ResourceKind,
    /// URI or URI template
    pub uri: &'static str,
    /// Display name
    pub name: &'static str,
    /// One-line description
    pub description: &'static str,
    /// Minimum access level
    pub access: AccessLevel,
    /// Caching policy of the content
    pub cache: CacheStrategy,
    /// Reads allowed per user per minute
    pub rate_limit: usize,
}

/// Split a resource URI into its kind and resource id.
pub fn parse_uri(uri: &str) -> Result<(ResourceKind, String)> {
    let unknown = || ServerError::UnknownResource(uri.to_string());
    let path = uri.strip_prefix(RESOURCE_SCHEME).ok_or_else(unknown)?;

    match path {
        "project/state" => Ok((ResourceKind::ProjectState, "current".to_string())),
        "workflow/config" => Ok((ResourceKind::WorkflowConfig, "default".to_string())),
        "system/metrics" => Ok((ResourceKind::SystemMetrics, "current".to_string())),
        _ => match path.strip_prefix("stage/guide/") {
            Some(stage) if !stage.is_empty() && !stage.contains('/') => {
                Ok((ResourceKind::StageGuide, stage.to_string()))
            }
            _ => Err(unknown()),
        },
    }
}

/// Resource read counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceStats {
    /// Reads attempted
    pub total_accesses: u64,
    /// Reads that returned content
    pub successful_accesses: u64,
    /// Reads refused or failed
    pub failed_accesses: u64,
    /// Reads served from the cache
    pub cache_hits: u64,
    /// Reads per resource type
    pub resource_distribution: BTreeMap<String, u64>,
}

/// Access control, rate limiting and counters for resource reads.
#[derive(Debug, Default)]
pub struct ResourceRouter {
    permissions: HashMap<String, AccessLevel>,
    windows: HashMap<String, VecDeque<Time>>,
    stats: ResourceStats,
}

impl ResourceRouter {
    /// Router where every user is public.
    pub fn new() -> Self {
        Self::default()
    }

    /// Give `user_id` an access level.
    pub fn grant(&mut self, user_id: impl Into<String>, level: AccessLevel) {
        let user_id = user_id.into();
        debug!("Granted {} access to {}", level, user_id);
        self.permissions.insert(user_id, level);
    }

    /// Access level of a user; unknown users are public.
    pub fn access_level(&self, user_id: &str) -> AccessLevel {
        self.permissions.get(user_id).copied().unwrap_or(AccessLevel::Public)
    }

    /// Admit one read of `route` by `user_id` at `now`.
    ///
    /// A refused read does not consume rate limit budget.
    pub fn admit(&mut self, user_id: &str, route: &ResourceRoute, now: Time) -> Result<()> {
        if self.access_level(user_id) < route.access {
            warn!("{} denied access to {}", user_id, route.kind);
            return Err(ServerError::AccessDenied {
                resource: route.kind.as_str().to_string(),
                required: route.access,
            });
        }

        let window = self.windows.entry(format!("{}:{}", user_id, route.kind)).or_default();
        let horizon = now - chrono::Duration::seconds(60);
        while window.front().is_some_and(|t| *t <= horizon) {
            window.pop_front();
        }
        if window.len() >= route.rate_limit {
            warn!("{} hit the rate limit of {}", user_id, route.kind);
            return Err(ServerError::RateLimited {
                resource: route.kind.as_str().to_string(),
                limit: route.rate_limit,
            });
        }
        window.push_back(now);
        Ok(())
    }

    /// Count one read.
    pub fn record(&mut self, kind: ResourceKind, success: bool, cache_hit: bool) {
        self.stats.total_accesses += 1;
        if success {
            self.stats.successful_accesses += 1;
        } else {
            self.stats.failed_accesses += 1;
        }
        if cache_hit {
            self.stats.cache_hits += 1;
        }
        *self.stats.resource_distribution.entry(kind.as_str().to_string()).or_insert(0) += 1;
    }

    /// Counters so far.
    pub fn stats(&self) -> &ResourceStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uri() {
        assert_eq!(
            parse_uri("aceflow://project/state").unwrap(),
            (ResourceKind::ProjectState, "current".to_string())
        );
        assert_eq!(
            parse_uri("aceflow://stage/guide/testing").unwrap(),
            (ResourceKind::StageGuide, "testing".to_string())
        );
        assert_eq!(parse_uri("aceflow://system/metrics").unwrap().0, ResourceKind::SystemMetrics);

        for bad in ["aceflow://stage/guide/", "aceflow://nope", "file:///etc/passwd", "aceflow://stage/guide/a/b"] {
            assert!(matches!(parse_uri(bad), Err(ServerError::UnknownResource(_))), "{}", bad);
        }
    }

    #[test]
    fn test_access_hierarchy() {
        let mut router = ResourceRouter::new();
        router.grant("alice", AccessLevel::Authenticated);
        router.grant("root", AccessLevel::Admin);
        let now = chrono::Utc::now();

        let state = ResourceKind::ProjectState.route();
        let metrics = ResourceKind::SystemMetrics.route();
        let guide = ResourceKind::StageGuide.route();

        assert!(router.admit(ANONYMOUS_USER, &guide, now).is_ok());
        assert!(matches!(
            router.admit(ANONYMOUS_USER, &state, now),
            Err(ServerError::AccessDenied { required: AccessLevel::Authenticated, .. })
        ));
        assert!(router.admit("alice", &state, now).is_ok());
        assert!(router.admit("alice", &metrics, now).is_err());
        assert!(router.admit("root", &metrics, now).is_ok());
        assert!(router.admit("root", &state, now).is_ok());
    }

    #[test]
    fn test_rate_limit_window() {
        let mut router = ResourceRouter::new();
        router.grant("root", AccessLevel::Admin);
        let route = ResourceKind::SystemMetrics.route();
        let start = chrono::Utc::now();

        for i in 0..route.rate_limit {
            router.admit("root", &route, start + chrono::Duration::seconds(i as i64)).unwrap();
        }
        let err = router.admit("root", &route, start + chrono::Duration::seconds(30)).unwrap_err();
        assert_eq!(err.kind(), "rate_limited");

        // Another user has their own window
        router.grant("ops", AccessLevel::Admin);
        assert!(router.admit("ops", &route, start + chrono::Duration::seconds(30)).is_ok());

        // The first read has left the window
        assert!(router.admit("root", &route, start + chrono::Duration::seconds(61)).is_ok());
    }

    #[test]
    fn test_stats() {
        let mut router = ResourceRouter::new();
        router.record(ResourceKind::StageGuide, true, false);
        router.record(ResourceKind::StageGuide, true, true);
        router.record(ResourceKind::ProjectState, false, false);

        let stats = router.stats();
        assert_eq!(stats.total_accesses, 3);
        assert_eq!(stats.successful_accesses, 2);
        assert_eq!(stats.failed_accesses, 1);
        assert_eq!(stats.cache_hits, 1);
        assert_eq!(stats.resource_distribution["stage_guide"], 2);
    }
}
