//! # hubsync
//!
//! Pulls pull requests, issues, discussions and wiki pages out of GitHub and
//! stores them as canonical content items for downstream indexing.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐   ┌──────────┐
//! │ GitHub REST │──▶│ GitHubAdapter│──▶│  convert   │──▶│  SQLite  │
//! │  + GraphQL  │   │ paginate+join│   │ (core)     │   │  Store   │
//! └─────────────┘   └──────┬───────┘   └───────────┘   └──────────┘
//!                          ▲
//!            ┌─────────────┴────────────┐
//!            │                          │
//!       ┌──────────┐             ┌─────────────┐
//!       │   CLI    │             │  webhooks   │
//!       │ (sync)   │             │ (serve)     │
//!       └──────────┘             └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! hubsync init                      # create database
//! hubsync sources                   # check tokens and cursors
//! hubsync sync all                  # incremental pass over every source
//! hubsync sync acme --full          # ignore cursors, bounded backfill
//! hubsync serve                     # webhook receiver
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`client`] | GitHub REST/GraphQL client |
//! | [`connector_github`] | Repository discovery, pagination, enrichment |
//! | [`webhook`] | Webhook classification and refetch |
//! | [`traits`] | `SourceAdapter` trait and registry |
//! | [`ingest`] | Sync pipeline: fetch, store, commit cursors |
//! | [`sqlite_store`] | SQLite store implementation |
//! | [`server`] | Webhook HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod client;
pub mod config;
pub mod connector_github;
pub mod credentials;
pub mod db;
pub mod error;
pub mod get;
pub mod github_cmd;
pub mod ingest;
pub mod migrate;
pub mod server;
pub mod sources;
pub mod sqlite_store;
pub mod traits;
pub mod webhook;
