//! AceFlow MCP server.
//!
//! [`UnifiedServer`] composes configuration, modules, routing, monitoring
//! and resources; [`McpServer`] exposes it over stdio.

#![warn(missing_docs)]

mod error;

pub mod resources;
pub mod server;
pub mod mcp_server;

pub use error::{Result, ServerError};
pub use resources::{parse_uri, AccessLevel, ResourceKind, ResourceRoute, ResourceRouter, ResourceStats, ANONYMOUS_USER};
pub use server::{error_json, ServerOptions, ToolOutcome, UnifiedServer, LOCAL_USER};
pub use mcp_server::{tool_definition, McpError, McpRequest, McpResource, McpResponse, McpServer, McpTool, MCP_VERSION};
