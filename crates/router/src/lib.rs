//! Tool routing for AceFlow.
//!
//! Maps a tool call and its parameters to an [`ExecutionPlan`]: which
//! module serves the call, which modules enhance it, and a core-only
//! fallback.

#![warn(missing_docs)]

pub mod plan;
pub mod router;

pub use plan::{ExecutionMode, ExecutionPlan, RouteRecord, RoutingFeatures, RoutingStats};
pub use router::{extract_features, primary_module_for, FunctionRouter, ROUTING_VERSION};
