/// Engine - High-Level Entry Point
///
/// **Responsibility:**
/// Validate a request, bound how many contexts exist at once, and hand the
/// submission to a context worker.
///
/// **Architecture:**
/// 1. Validation rejects unusable requests before any sandbox exists
/// 2. A semaphore caps live contexts at `max_concurrent`
/// 3. The worker thread runs the test runner (runner.rs)
///
/// Only input errors surface as `Err`; every other failure, including a
/// crashed worker, comes back as a `success=false` response.
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{error, info};
use verdict_common::config::EngineConfig;
use verdict_common::types::{ExecuteRequest, ExecuteResponse, Submission};

use crate::error::EngineError;
use crate::worker::run_on_worker;

pub const CODE_REQUIRED: &str = "Code is required and must be a string";

#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    permits: Arc<Semaphore>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_concurrent));
        Self { config, permits }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Context slots not held by a running worker.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Turn a request into a submission, or explain why it cannot run.
    pub fn validate(&self, request: ExecuteRequest) -> Result<Submission, EngineError> {
        let code = match request.code {
            Some(code) if !code.is_empty() => code,
            _ => return Err(EngineError::InvalidInput(CODE_REQUIRED.to_string())),
        };

        if code.len() > self.config.max_source_bytes {
            return Err(EngineError::InvalidInput(format!(
                "Source code exceeds maximum size of {} bytes",
                self.config.max_source_bytes
            )));
        }

        Ok(Submission::new(code, request.test_cases))
    }

    /// Validate and run a request.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecuteResponse, EngineError> {
        let submission = self.validate(request)?;
        Ok(self.run(submission).await)
    }

    /// Run an already validated submission.
    pub async fn run(&self, submission: Submission) -> ExecuteResponse {
        let start = Instant::now();
        let submission_id = submission.id;

        info!(
            submission_id = %submission_id,
            test_count = submission.test_cases.len(),
            source_bytes = submission.source.len(),
            "Starting submission"
        );

        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                error!(submission_id = %submission_id, error = %e, "Context pool closed");
                return worker_failed(EngineError::Worker(e.to_string()), start);
            }
        };

        match run_on_worker(submission, self.config.clone(), permit).await {
            Ok(response) => response,
            Err(e) => {
                error!(submission_id = %submission_id, error = %e, "Context worker failed");
                worker_failed(e, start)
            }
        }
    }
}

fn worker_failed(err: EngineError, start: Instant) -> ExecuteResponse {
    ExecuteResponse {
        execution_time: start.elapsed().as_millis() as u64,
        ..ExecuteResponse::rejected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use verdict_common::types::TestCase;

    fn make_engine() -> Engine {
        Engine::new(EngineConfig {
            max_source_bytes: 64,
            ..Default::default()
        })
    }

    #[test]
    fn test_missing_code_rejected() {
        let err = make_engine().validate(ExecuteRequest::default()).unwrap_err();
        assert_eq!(err.to_string(), CODE_REQUIRED);
    }

    #[test]
    fn test_empty_code_rejected() {
        let request = ExecuteRequest {
            code: Some(String::new()),
            test_cases: vec![],
        };
        assert!(matches!(
            make_engine().validate(request),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_oversized_code_rejected() {
        let request = ExecuteRequest {
            code: Some("x".repeat(65)),
            test_cases: vec![],
        };
        let err = make_engine().validate(request).unwrap_err();
        assert!(err.to_string().contains("64 bytes"));
    }

    #[tokio::test]
    async fn test_abandoned_request_keeps_its_slot() {
        let engine = Engine::new(EngineConfig {
            max_concurrent: 1,
            timeout_ms: 300,
            ..Default::default()
        });
        let request = ExecuteRequest {
            code: Some("function spin() { while (true) {} }".to_string()),
            test_cases: vec![TestCase::default(), TestCase::default()],
        };

        let task = tokio::spawn({
            let engine = engine.clone();
            async move { engine.execute(request).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        assert_eq!(engine.available_permits(), 0);

        let deadline = Instant::now() + Duration::from_secs(10);
        while engine.available_permits() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(engine.available_permits(), 1);
    }

    #[test]
    fn test_valid_request_becomes_submission() {
        let request = ExecuteRequest {
            code: Some("console.log(1)".to_string()),
            test_cases: vec![],
        };
        let submission = make_engine().validate(request).unwrap();
        assert_eq!(submission.source, "console.log(1)");
    }
}
