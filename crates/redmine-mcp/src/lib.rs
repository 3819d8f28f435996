//! MCP (Model Context Protocol) server for Redmine.
//!
//! Speaks JSON-RPC 2.0 over newline-delimited stdio, or a REST-style HTTP
//! surface, and forwards tool calls to the Redmine REST API.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use redmine_mcp::{AppContext, LineTransport, McpServer, Registry};
//!
//! let ctx = AppContext::new(Arc::new(Registry::with_defaults()), api, metrics);
//! let mut server = McpServer::new(ctx);
//! server.run(&mut LineTransport::stdio()).await?;
//! ```

pub mod batch;
pub mod context;
pub mod http;
pub mod protocol;
pub mod registry;
pub mod resources;
pub mod server;
pub mod tools;
pub mod transport;

pub use batch::BatchExecutor;
pub use context::AppContext;
pub use http::{router, serve, HttpState};
pub use registry::Registry;
pub use server::{McpServer, SessionState};
pub use transport::{LineTransport, TransportError};
