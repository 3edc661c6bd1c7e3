//! # kiln
//!
//! Client SDK for driving the `kiln-engine` compiler from a host process.
//!
//! The engine runs as a pool of long-lived subprocess workers speaking
//! line-delimited JSON-RPC over stdin/stdout. This crate provides the typed
//! [`Client`] façade; the pool mechanics live in [`kiln_runtime`] and the
//! shared errors/configuration in [`kiln_core`].
//!
//! ## Example
//!
//! ```no_run
//! use kiln::api::{ExecProgramArgs, PingArgs};
//! use kiln::{Client, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> kiln::Result<()> {
//!     let client = Client::new(EngineConfig::default().with_max_concurrency(4))?;
//!     client.start();
//!
//!     client.ping(&PingArgs { value: "hello".into() }).await?;
//!
//!     let result = client
//!         .exec_program(&ExecProgramArgs {
//!             work_dir: ".".into(),
//!             filenames: vec!["main.kiln".into()],
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("{}", result.yaml_result);
//!
//!     client.close().await
//! }
//! ```

pub mod api;
pub mod client;

// Re-export the SDK surface at the crate root for convenience
pub use client::{Client, ENGINE_ERROR_CODE};
pub use kiln_core::{logging, EngineConfig, KilnError, Result};
pub use kiln_runtime::{LimitBuffer, RpcChannel, TaskContext, WorkerPool, WorkerProcess};
