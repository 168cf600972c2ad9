/// Timed Invoker
///
/// Runs one unit of work against an [`ExecutionContext`] under a wall-clock
/// deadline. A watchdog thread sleeps on a channel for the duration of the
/// deadline; if the work has not reported back by then it terminates the
/// isolate's running script, which preempts even a tight `while (true)`.
///
/// After a timeout or a heap-limit termination the pending termination is
/// cancelled, so the context stays usable for the next test case. Output
/// captured by the interrupted work is the caller's to discard.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::context::ExecutionContext;
use crate::error::{ContextError, InvokeError};

#[derive(Debug, Clone, Copy)]
pub struct TimedInvoker {
    timeout: Duration,
}

impl TimedInvoker {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `work` with the deadline armed.
    ///
    /// Timeout and memory exhaustion take precedence over whatever error the
    /// interrupted script reported.
    pub fn run<T, F>(&self, ctx: &mut ExecutionContext, work: F) -> Result<T, InvokeError>
    where
        F: FnOnce(&mut ExecutionContext) -> Result<T, ContextError>,
    {
        let watchdog_handle = ctx.isolate_handle();
        let timed_out = Arc::new(AtomicBool::new(false));
        let watchdog_timed_out = timed_out.clone();
        let timeout = self.timeout;
        let (cancel_tx, cancel_rx) = mpsc::channel::<()>();

        let watchdog = thread::Builder::new()
            .name("verdict-watchdog".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = cancel_rx.recv_timeout(timeout) {
                    watchdog_timed_out.store(true, Ordering::SeqCst);
                    watchdog_handle.terminate_execution();
                }
            })
            .map_err(|e| InvokeError::Execution {
                message: format!("Failed to start watchdog: {}", e),
            })?;

        let result = work(ctx);

        // The watchdog must be gone before the termination state is inspected.
        let _ = cancel_tx.send(());
        let _ = watchdog.join();

        let heap_exhausted = ctx.take_heap_exhausted();
        let timed_out = timed_out.load(Ordering::SeqCst);
        if heap_exhausted || timed_out {
            ctx.isolate_handle().cancel_terminate_execution();
        }

        if heap_exhausted {
            return Err(InvokeError::MemoryLimit {
                limit_mb: ctx.limits().max_heap_bytes / (1024 * 1024),
            });
        }
        if timed_out {
            return Err(InvokeError::Timeout(self.timeout));
        }

        result.map_err(InvokeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextLimits;
    use serde_json::json;
    use std::time::Instant;

    fn make_context() -> ExecutionContext {
        ExecutionContext::create(ContextLimits::default()).unwrap()
    }

    #[test]
    fn test_completes_within_deadline() {
        let mut ctx = make_context();
        let invoker = TimedInvoker::new(Duration::from_secs(5));

        invoker
            .run(&mut ctx, |ctx| ctx.execute("function id(x) { return x; }"))
            .unwrap();
        let value = invoker.run(&mut ctx, |ctx| ctx.invoke("id", &json!([1]))).unwrap();
        assert_eq!(value, Some(json!([1])));
    }

    #[test]
    fn test_infinite_loop_is_preempted() {
        let mut ctx = make_context();
        let invoker = TimedInvoker::new(Duration::from_millis(200));

        let start = Instant::now();
        let err = invoker
            .run(&mut ctx, |ctx| ctx.execute("while (true) {}"))
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Code execution timeout (200ms)");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_context_survives_timeout() {
        let mut ctx = make_context();
        let invoker = TimedInvoker::new(Duration::from_millis(200));

        invoker
            .run(&mut ctx, |ctx| {
                ctx.execute("var kept = 41; function spin() { while (true) {} }")
            })
            .unwrap();

        let err = invoker
            .run(&mut ctx, |ctx| ctx.invoke("spin", &json!([])))
            .unwrap_err();
        assert!(err.is_timeout());
        ctx.discard_captured();

        invoker
            .run(&mut ctx, |ctx| ctx.execute("console.log(kept + 1);"))
            .unwrap();
        assert_eq!(ctx.take_captured().unwrap(), vec!["42".to_string()]);
    }

    #[test]
    fn test_script_error_is_execution_error() {
        let mut ctx = make_context();
        let invoker = TimedInvoker::new(Duration::from_secs(5));

        let err = invoker
            .run(&mut ctx, |ctx| ctx.execute("throw new TypeError('bad input');"))
            .unwrap_err();
        assert_eq!(
            err,
            InvokeError::Execution {
                message: "TypeError: bad input".to_string()
            }
        );
    }

    #[test]
    fn test_heap_exhaustion_is_contained() {
        let mut ctx = ExecutionContext::create(ContextLimits {
            max_heap_bytes: 16 * 1024 * 1024,
        })
        .unwrap();
        let invoker = TimedInvoker::new(Duration::from_secs(30));

        let err = invoker
            .run(&mut ctx, |ctx| {
                ctx.execute(
                    r#"
                    const hoard = [];
                    while (true) { hoard.push(new Array(100000).fill("x")); }
                    "#,
                )
            })
            .unwrap_err();

        assert_eq!(err, InvokeError::MemoryLimit { limit_mb: 16 });
        assert_eq!(err.to_string(), "Memory limit exceeded (16 MB)");
    }

    #[test]
    fn test_context_survives_heap_exhaustion() {
        let mut ctx = ExecutionContext::create(ContextLimits {
            max_heap_bytes: 16 * 1024 * 1024,
        })
        .unwrap();
        let invoker = TimedInvoker::new(Duration::from_secs(30));

        invoker
            .run(&mut ctx, |ctx| {
                ctx.execute(
                    r#"
                    function hoard(n) {
                        const kept = [];
                        while (n > 0) { kept.push(new Array(100000).fill("x")); }
                        return n;
                    }
                    "#,
                )
            })
            .unwrap();

        let err = invoker
            .run(&mut ctx, |ctx| ctx.invoke("hoard", &json!(1)))
            .unwrap_err();
        assert!(matches!(err, InvokeError::MemoryLimit { .. }), "got: {err:?}");
        ctx.discard_captured();

        let value = invoker
            .run(&mut ctx, |ctx| ctx.invoke("hoard", &json!(0)))
            .unwrap();
        assert_eq!(value, Some(json!(0)));
    }
}
