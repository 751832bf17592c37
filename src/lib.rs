//! # Worklake
//!
//! Normalizes work-tracking data extracted from third-party tools (Jira,
//! Zentao) into one canonical domain model for cross-tool analytics.
//!
//! Extraction fills raw `_tool_*` tables. Worklake then plans which
//! conversions to run for each selected scope, streams the raw rows through
//! typed transforms, and upserts canonical boards, issues, accounts and link
//! records keyed by deterministic domain ids.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ _tool_* raw │──▶│  Converter  │──▶│ Domain tables │
//! │   tables    │   │ (streaming) │   │  (upserted)   │
//! └─────────────┘   └──────▲──────┘   └──────────────┘
//!                          │
//!        ┌─────────────────┴──────┐
//!        │ Planner + scope config │
//!        │ (which subtasks run)   │
//!        └────────────────────────┘
//! ```
//!
//! Storage-agnostic logic lives in the `worklake-core` crate; this crate
//! adds SQLite storage, configuration, logging, and the built-in data
//! sources.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite scope and domain storage |
//! | [`traits`] | Data-source trait and registry |
//! | [`connector_jira`] | Jira data source |
//! | [`connector_zentao`] | Zentao data source |
//! | [`runner`] | Running one planned task |
//! | [`blueprint`] | Planning across connections |
//! | [`telemetry`] | Tracing setup |

pub mod blueprint;
pub mod config;
pub mod connector_jira;
pub mod connector_zentao;
pub mod db;
pub mod migrate;
pub mod raw;
pub mod runner;
pub mod sqlite_store;
pub mod telemetry;
pub mod traits;

pub use worklake_core::{Error, ErrorKind, Result};
