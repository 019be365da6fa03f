//! # Steadfast Gateway
//!
//! HTTP embedding host for the Steadfast SDK: a resilient multi-provider AI
//! gateway with automatic failover, persistent circuit breakers and a
//! read-only observability surface.
//!
//! The binary in `main.rs` loads a TOML configuration, validates it and
//! serves the router built by [`server::create_server`]. The library surface
//! exists so integration tests can drive the router in-process.

pub mod config;
pub mod handlers;
pub mod kv_redis;
pub mod server;

pub use config::Config;
pub use server::{create_server, AppState};
