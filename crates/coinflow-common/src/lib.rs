//! Coinflow Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared building blocks for the Coinflow workspace:
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//! - **Errors**: the workspace-wide [`CoinflowError`] and [`Result`] alias
//! - **Pagination**: limit/offset parameters and page metadata for read queries

pub mod error;
pub mod logging;
pub mod pagination;

pub use error::{CoinflowError, Result};
