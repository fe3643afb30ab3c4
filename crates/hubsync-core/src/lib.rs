//! # hubsync core
//!
//! Runtime-free logic for hubsync: canonical models, GitHub entity shapes,
//! the conversion pipeline, heuristic code-context extraction, and the
//! storage contracts.
//!
//! Nothing here performs I/O or depends on tokio, sqlx or reqwest. The root
//! `hubsync` crate supplies the HTTP client, SQLite store and orchestration.

pub mod code_context;
pub mod convert;
pub mod github;
pub mod models;
pub mod references;
pub mod store;
