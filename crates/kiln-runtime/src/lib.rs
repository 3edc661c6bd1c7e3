//! Worker-process runtime for the kiln SDK.
//!
//! This crate manages a bounded pool of long-lived `kiln-engine` subprocess
//! workers and dispatches request/response RPC tasks to them with controlled
//! parallelism, transparent crash recovery, and bounded capture of worker
//! stderr.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────┐
//! │        WorkerPool         │
//! │  (permits, slots, close)  │
//! └─────────────┬─────────────┘
//!               │ one task ↔ one worker
//!               ▼
//! ┌───────────────────────────┐
//! │       WorkerProcess       │
//! │  (subprocess + channel)   │
//! └──────┬─────────────┬──────┘
//!        │             │
//!        ▼             ▼
//! ┌────────────┐ ┌────────────┐
//! │ RpcChannel │ │LimitBuffer │
//! │ (stdio rpc)│ │  (stderr)  │
//! └────────────┘ └────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use kiln_runtime::WorkerPool;
//!
//! #[tokio::main]
//! async fn main() -> kiln_core::Result<()> {
//!     let pool = WorkerPool::new(2, "kiln-engine", ["server"]);
//!     pool.start();
//!
//!     let pong: serde_json::Value = pool
//!         .submit(|ctx| async move {
//!             ctx.channel
//!                 .call("Ping", &serde_json::json!({"value": "hello"}))
//!                 .await
//!         })
//!         .await??;
//!     println!("{pong}");
//!
//!     pool.close().await
//! }
//! ```

pub mod limit_buffer;
pub mod pool;
pub mod rpc;
pub mod worker;

// Re-export main types for convenience
pub use limit_buffer::LimitBuffer;
pub use pool::{TaskContext, WorkerPool};
pub use rpc::RpcChannel;
pub use worker::WorkerProcess;
