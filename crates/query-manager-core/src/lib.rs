//! # query-manager-core
//!
//! Shared foundation for the query-manager workspace: the [`Error`] taxonomy
//! every crate reports through, the [`Result`] alias, and `tracing`-based
//! logging setup.

pub mod error;
pub mod logging;

pub use error::{Error, Result};
pub use logging::setup_logging;
