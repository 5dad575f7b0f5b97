//! # Observability Module
//!
//! Logging and request tracing for the Agora node:
//!
//! - **Structured Logging**: pretty or JSON output filtered by level
//! - **Request Tracing**: request IDs propagated through a span and echoed
//!   in the `x-request-id` response header
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::Router;
//! use agora_node::observability::{init_logging, request_id_layer, LogFormat};
//!
//! init_logging("info", LogFormat::parse("json"));
//!
//! let app: Router<()> = Router::new().layer(request_id_layer());
//! ```

mod logging;
pub mod middleware;

pub use logging::{init_logging, LogFormat};
pub use middleware::{request_id_layer, MiddlewareLayer, RequestId, REQUEST_ID_HEADER};
