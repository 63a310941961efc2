//! pglens-core — shared library for the pglens agent.
//!
//! Provides:
//! - `config` — agent configuration and startup errors
//! - `monitor` — log tailing and query/plan record correlation
//! - `patterns` — query classification patterns and their cached store
//! - `store` — durable event queue and distinct-query cache (SQLite)
//! - `dispatch` — HTTP delivery of queued events
//! - `stats` — periodic pg_stat view collection and the runner thread
//! - `sink` — pluggable metric outputs (debug, http, sqlite)

pub mod config;
pub mod dispatch;
pub mod monitor;
pub mod patterns;
pub mod sink;
pub mod stats;
pub mod store;
