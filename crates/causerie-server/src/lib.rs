//! HTTP/WebSocket front of the Causerie coordination layer.
//!
//! Exposed as a library so integration tests can build the router
//! in-process; the `causerie-server` binary is a thin wrapper over
//! [`api::serve`].

pub mod api;
pub mod config;
pub mod error;
pub mod gateway;
