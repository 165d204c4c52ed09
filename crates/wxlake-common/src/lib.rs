//! wxlake Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the wxlake workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the `WxError` taxonomy and its `Result` alias
//! - **Logging**: `tracing` subscriber setup driven by `LogConfig`
//! - **Types**: `Timestamp`, raw `Record`s and the provenance stamp fields
//!
//! # Example
//!
//! ```no_run
//! use wxlake_common::{Result, Timestamp};
//!
//! fn first_partition(start: &str) -> Result<String> {
//!     let ts = Timestamp::parse(start)?;
//!     Ok(ts.date_string())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{ErrorKind, Result, WxError};
pub use types::{Batch, Record, Timestamp};
