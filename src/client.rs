//! Typed client façade over the worker pool.
//!
//! [`Client`] exposes one typed method per remote procedure. Every method
//! submits exactly one RPC call to the pool, and on failure enriches the
//! error: the engine's structured error sentinel is unwrapped to its plain
//! message, and whatever the worker wrote to stderr is attached to the
//! error text.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::instrument;

use kiln_core::{EngineConfig, KilnError, Result};
use kiln_runtime::WorkerPool;

use crate::api::*;

/// Sentinel code the engine uses for its own structured failures
/// (the ASCII bytes of "KLN").
///
/// A JSON-RPC error carrying this code is an engine evaluation failure, not a
/// transport artifact; the client unwraps it to a plain message. Any other
/// error shape passes through unchanged.
pub const ENGINE_ERROR_CODE: i64 = 0x4B4C4E;

/// Typed client for the kiln engine.
///
/// Holds a shared reference to one [`WorkerPool`]; clones of the `Arc` may be
/// handed to other components. The client performs no retries — a failed call
/// is reported once, and the pool replaces a dead worker on the next call.
#[derive(Debug)]
pub struct Client {
    pool: Arc<WorkerPool>,
}

impl Client {
    /// Build a client from configuration.
    ///
    /// Resolves the engine executable and sizes the pool; spawns no worker
    /// processes until [`start`](Self::start) or the first call.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let engine = config.resolve_engine()?;
        let pool = WorkerPool::new(
            config.effective_concurrency(),
            engine,
            config.engine_args.clone(),
        )
        .with_stderr_capacity(config.stderr_capacity);
        Ok(Self {
            pool: Arc::new(pool),
        })
    }

    /// Build a client around an existing pool.
    pub fn from_pool(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Warm up the pool (idempotent; see [`WorkerPool::start`]).
    pub fn start(&self) {
        self.pool.start();
    }

    /// Drain in-flight calls and kill every worker.
    pub async fn close(&self) -> Result<()> {
        self.pool.close().await
    }

    /// Health-check one worker round trip.
    pub async fn ping(&self, args: &PingArgs) -> Result<PingResult> {
        self.call("Ping", args).await
    }

    /// List the remote procedures the engine serves.
    pub async fn list_method(&self, args: &ListMethodArgs) -> Result<ListMethodResult> {
        self.call("ListMethod", args).await
    }

    /// Evaluate a program and return its rendered output.
    pub async fn exec_program(&self, args: &ExecProgramArgs) -> Result<ExecProgramResult> {
        self.call("ExecProgram", args).await
    }

    /// Format one source text.
    pub async fn format_code(&self, args: &FormatCodeArgs) -> Result<FormatCodeResult> {
        self.call("FormatCode", args).await
    }

    /// Format files under a path in place.
    pub async fn format_path(&self, args: &FormatPathArgs) -> Result<FormatPathResult> {
        self.call("FormatPath", args).await
    }

    /// Lint files under the given paths.
    pub async fn lint_path(&self, args: &LintPathArgs) -> Result<LintPathResult> {
        self.call("LintPath", args).await
    }

    /// Validate a data document against a schema.
    pub async fn validate_code(&self, args: &ValidateCodeArgs) -> Result<ValidateCodeResult> {
        self.call("ValidateCode", args).await
    }

    /// Apply override specs to a source file.
    pub async fn override_file(&self, args: &OverrideFileArgs) -> Result<OverrideFileResult> {
        self.call("OverrideFile", args).await
    }

    /// Submit one RPC call to the pool and enrich any failure.
    #[instrument(level = "debug", skip(self, args))]
    async fn call<A, R>(&self, method: &'static str, args: &A) -> Result<R>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        self.pool
            .submit(|ctx| async move {
                match ctx.channel.call(method, args).await {
                    Ok(result) => Ok(result),
                    Err(e) => {
                        let diagnostics = ctx.diagnostics.drain_to_string();
                        Err(unwrap_engine_error(e).with_diagnostics(diagnostics))
                    }
                }
            })
            .await?
    }
}

/// Unwrap the engine's structured error sentinel to a plain message.
///
/// Errors carrying any other code (or any other shape) pass through
/// unchanged.
fn unwrap_engine_error(err: KilnError) -> KilnError {
    match err {
        KilnError::Rpc { code, message } if code == ENGINE_ERROR_CODE => KilnError::remote(message),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_code_is_unwrapped() {
        let err = unwrap_engine_error(KilnError::Rpc {
            code: ENGINE_ERROR_CODE,
            message: "undefined schema App".into(),
        });
        assert!(matches!(err, KilnError::Remote { .. }));
        assert_eq!(err.to_string(), "undefined schema App");
    }

    #[test]
    fn test_other_codes_pass_through() {
        let err = unwrap_engine_error(KilnError::Rpc {
            code: -32601,
            message: "method not found".into(),
        });
        assert!(matches!(err, KilnError::Rpc { code: -32601, .. }));
    }

    #[test]
    fn test_transport_errors_pass_through() {
        let err = unwrap_engine_error(KilnError::transport("Ping", "pipe closed"));
        assert!(matches!(err, KilnError::Transport { .. }));
    }

    #[test]
    fn test_client_from_pool_shares_the_pool() {
        let pool = Arc::new(kiln_runtime::WorkerPool::new(
            1,
            "/bin/true",
            Vec::<String>::new(),
        ));
        let client = Client::from_pool(Arc::clone(&pool));
        assert_eq!(client.pool().max_concurrency(), 1);
        assert!(Arc::ptr_eq(client.pool(), &pool));
    }
}
