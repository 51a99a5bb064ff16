//! depgraph-core library.
//!
//! Turns a resolved dependency tree into a versioned, conflict-aware graph
//! and persists it into a relational or property-graph backend.
//!
//! # Conventions
//!
//! - **Errors**: library operations return [`error::ExportError`]; config
//!   file loading uses `anyhow::Result`.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `error!`, `debug!`).

pub mod cleanup;
pub mod config;
pub mod error;
pub mod filter;
pub mod graph;
pub mod model;
pub mod pipeline;
pub mod resolve;
pub mod retry;
pub mod sink;
pub mod version;

pub use error::{ErrorCode, ExportError, Stage};
pub use pipeline::{ExportReport, Exporter};
