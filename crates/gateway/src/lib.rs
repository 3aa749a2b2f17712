//! Gateway: the HTTP surface in front of the command bus.
//!
//! Lifecycle:
//! 1. Bind the listener and print the startup banner
//! 2. Authenticate each `POST /enqueue_task` bearer at the boundary
//! 3. Hand the request to the worker through the bus and wait, bounded
//! 4. Map the outcome onto an HTTP status and a JSON body
//!
//! Task execution and authorization live in `relay-bus`; this crate never
//! calls a task handler. [`GatewayClient`] is the caller side of the same
//! endpoint.

pub mod auth;
pub mod client;
pub mod server;
pub mod state;

pub use {
    client::{ClientError, GatewayClient},
    server::{build_gateway_app, serve_gateway, start_gateway},
    state::GatewayState,
};
