/// Context Worker
///
/// V8 isolates cannot cross threads, so every submission gets a dedicated OS
/// thread that creates its contexts, runs the test runner and drops the
/// contexts before exiting. The async side awaits the response over a
/// oneshot channel and never blocks a runtime thread.
use std::thread;

use tokio::sync::{oneshot, OwnedSemaphorePermit};
use verdict_common::config::EngineConfig;
use verdict_common::types::{ExecuteResponse, Submission};

use crate::error::EngineError;
use crate::runner::run_submission;

/// V8 reserves its own stack budget below the thread's entry point.
const WORKER_STACK_BYTES: usize = 8 * 1024 * 1024;

/// Run `submission` on a fresh context thread and wait for its response.
///
/// The thread owns `permit` and releases it on exit, so the slot stays taken
/// even if the caller stops waiting.
pub async fn run_on_worker(
    submission: Submission,
    config: EngineConfig,
    permit: OwnedSemaphorePermit,
) -> Result<ExecuteResponse, EngineError> {
    let (tx, rx) = oneshot::channel();
    let thread_name = format!("verdict-context-{}", &submission.id.simple().to_string()[..8]);

    thread::Builder::new()
        .name(thread_name)
        .stack_size(WORKER_STACK_BYTES)
        .spawn(move || {
            let response = run_submission(&submission, &config);
            let _ = tx.send(response);
            drop(permit);
        })
        .map_err(|e| EngineError::Worker(format!("failed to spawn context thread: {}", e)))?;

    rx.await
        .map_err(|_| EngineError::Worker("context thread exited without a response".to_string()))
}
