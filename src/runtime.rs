//! Shared tokio runtime for synchronous callers.
//!
//! The browser's UI thread is not async. It drives the async core through
//! [`block_on`] and hands background work (the liveness probe) to [`spawn`].

use std::sync::OnceLock;

use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;

/// Global tokio runtime, initialized once on first use.
static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// Get (or initialize) the global tokio runtime.
///
/// Worker count defaults to tokio's choice; override with the
/// `KEYSCOPE_RUNTIME_THREADS` environment variable.
pub fn get_runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| {
        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_all();

        if let Some(n) = std::env::var("KEYSCOPE_RUNTIME_THREADS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            builder.worker_threads(n);
        }

        match builder.thread_name("keyscope-rt").build() {
            Ok(rt) => rt,
            // Unrecoverable (e.g. thread limit reached) and OnceLock cannot
            // carry an error out of the initializer.
            Err(e) => panic!("keyscope: failed to create tokio runtime: {e}"),
        }
    })
}

/// Block the calling thread on a future using the global runtime.
///
/// Must not be called from within an async context (tokio panics).
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    get_runtime().block_on(future)
}

/// Spawn a future on the current runtime, or on the global one when the
/// caller is a plain thread.
pub fn spawn<F>(future: F) -> JoinHandle<F::Output>
where
    F: std::future::Future + Send + 'static,
    F::Output: Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) => handle.spawn(future),
        Err(_) => get_runtime().spawn(future),
    }
}

// ── Tests ──────────────────────────────────────────────────────────
