//! broker_server: REST adapter exposing `broker_core` over the service
//! broker HTTP protocol.

pub mod api;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod static_backend;
