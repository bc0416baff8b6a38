//! # Depot Analytics Backend
//!
//! Time-interval analytics and retention engine for a rail depot.
//!
//! Trains stay in the depot between arrival and departure, workers are
//! present around them, and workers carry out activities. Each of these is
//! an interval with a start and an optional end; an interval without an end
//! is still running.
//!
//! ## Features
//!
//! - **Overlap queries**: Records of any interval family that intersect a window
//! - **Aggregation**: Mean activity duration per uniform, helmet usage,
//!   busiest trains, peak periods and exact peak concurrency
//! - **Retention**: Bounded-size FIFO eviction of workers and activity records
//! - **Recency**: Incidents inside a trailing window
//! - **HTTP API**: REST endpoints over the service layer
//!
//! ## Architecture
//!
//! - [`models`]: Domain types and the shared interval abstraction
//! - [`services`]: Pure analytics engines over interval records
//! - [`db`]: Repository traits, store backends and the service layer
//! - [`http`]: Axum-based HTTP server and request handlers

// RepositoryError carries a rich context for debugging
#![allow(clippy::result_large_err)]

pub mod db;
pub mod models;
pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
