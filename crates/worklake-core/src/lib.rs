//! # Worklake Core
//!
//! Storage-agnostic logic for Worklake: domain id generation, canonical
//! models, scope config resolution, the streaming converter, and the
//! pipeline planner.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. Storage is reached
//! only through the traits in [`store`], so the same conversion and planning
//! code runs against SQLite in the application crate and against
//! [`store::memory::InMemoryStore`] in tests.

pub mod converter;
pub mod didgen;
pub mod error;
pub mod models;
pub mod plan;
pub mod planner;
pub mod scope;
pub mod store;

pub use error::{Error, ErrorKind, Result, TransformError};
