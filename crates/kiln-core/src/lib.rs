//! # kiln-core
//!
//! Core errors, logging, and configuration for the kiln SDK.
//!
//! This crate provides:
//! - [`KilnError`] - Error types for all SDK operations
//! - [`logging`] - Tracing setup and log management utilities
//! - [`config`] - Engine executable resolution and pool sizing
//!
//! ## Example
//!
//! ```no_run
//! use kiln_core::{EngineConfig, Result};
//!
//! fn main() -> Result<()> {
//!     let config = EngineConfig::default().with_max_concurrency(4);
//!     let engine = config.resolve_engine()?;
//!     println!("engine at {}", engine.display());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;

// Re-export main types for convenience
pub use config::{EngineConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_STDERR_CAPACITY};
pub use error::{KilnError, Result};
pub use logging::{init_logging, LogGuard};
