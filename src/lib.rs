//! Remote temperature polling library
//!
//! This crate exposes the data acquisition layer of the dashboard widget:
//! caching, retries, normalization, aggregation and the poll scheduler.

pub mod aggregator;
pub mod cache;
pub mod cli;
pub mod config;
pub mod data;
pub mod notify;
pub mod refresh;
pub mod retry;
