/// Test Runner
///
/// Drives one submission from source text to a finished [`ExecuteResponse`]:
///
/// ```text
/// Idle -> Defining -> (Invoking -> Comparing)* -> Done
/// ```
///
/// **Defining:** the source runs once in a fresh context under the timed
/// invoker. Failure here is fatal: the response carries the error and no
/// test results.
///
/// **Invoking:** with a callable entry point every test case calls it inside
/// the same context, sequentially, each under its own deadline. Without one,
/// each case re-runs the whole source in a fresh context and its last logged
/// line is taken as the result.
///
/// **Comparing:** the last captured line is compared against the expected
/// value; earlier lines become the case's console output.
///
/// Per-case failures never abort the remaining cases.
///
/// Must run on the thread that owns the contexts it creates; see
/// [`crate::worker`].
use std::time::Instant;

use serde_json::json;
use tracing::{debug, info, warn};
use verdict_common::config::EngineConfig;
use verdict_common::types::{DynamicValue, ExecuteResponse, Submission, TestCase, TestResult};

use crate::capture::split_output;
use crate::comparator::Comparator;
use crate::context::{ContextLimits, ExecutionContext};
use crate::detector;
use crate::error::InvokeError;
use crate::invoker::TimedInvoker;

/// What one timed invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationOutcome {
    pub captured_lines: Vec<String>,
    /// JSON form of the entry point's return value; `None` when absent or
    /// when the whole script ran instead of a function
    pub return_value: Option<DynamicValue>,
    pub error: Option<InvokeError>,
}

impl InvocationOutcome {
    fn failed(error: InvokeError) -> Self {
        Self {
            captured_lines: Vec::new(),
            return_value: None,
            error: Some(error),
        }
    }
}

/// Shared per-submission machinery.
struct CaseRunner<'a> {
    submission: &'a Submission,
    invoker: TimedInvoker,
    comparator: Comparator,
    limits: ContextLimits,
    max_input_bytes: usize,
}

/// Execute a submission and judge its test cases.
///
/// ## Arguments
/// * `submission` - Source plus test cases, already validated
/// * `config` - Deadlines, heap cap, input limits and key-order policy
///
/// ## Returns
/// A well-formed response on every path; failures are reported inside it.
pub fn run_submission(submission: &Submission, config: &EngineConfig) -> ExecuteResponse {
    let start = Instant::now();
    let entry = detector::detect(&submission.source);

    match &entry {
        Some(entry) => debug!(
            submission_id = %submission.id,
            entry_point = %entry.name,
            kind = ?entry.kind,
            "Entry point detected"
        ),
        None => debug!(submission_id = %submission.id, "No entry point detected"),
    }

    let runner = CaseRunner {
        submission,
        invoker: TimedInvoker::new(config.timeout()),
        comparator: Comparator::new(config.key_order),
        limits: ContextLimits {
            max_heap_bytes: config.max_heap_bytes(),
        },
        max_input_bytes: config.max_input_bytes,
    };

    let mut ctx = match ExecutionContext::create(runner.limits) {
        Ok(ctx) => ctx,
        Err(e) => {
            warn!(submission_id = %submission.id, error = %e, "Failed to create execution context");
            return ExecuteResponse::definition_failed(
                String::new(),
                e.to_string(),
                elapsed_ms(start),
            );
        }
    };

    let definition = runner.define(&mut ctx);
    let output = definition.captured_lines.join("\n");
    if let Some(error) = definition.error {
        warn!(
            submission_id = %submission.id,
            error = %error,
            execution_ms = elapsed_ms(start),
            "Definition failed"
        );
        return ExecuteResponse::definition_failed(output, error.to_string(), elapsed_ms(start));
    }

    if submission.test_cases.is_empty() {
        return ExecuteResponse {
            success: true,
            output,
            error: None,
            execution_time: elapsed_ms(start),
            test_results: None,
        };
    }

    let entry_name = entry
        .map(|entry| entry.name)
        .filter(|name| ctx.is_callable(name));

    let results: Vec<TestResult> = match entry_name {
        Some(name) => submission
            .test_cases
            .iter()
            .enumerate()
            .map(|(index, case)| runner.run_entry_case(&mut ctx, &name, index + 1, case))
            .collect(),
        None => {
            // Fallback contexts are created one at a time on this thread, so
            // the definition context goes first.
            drop(ctx);
            submission
                .test_cases
                .iter()
                .enumerate()
                .map(|(index, case)| runner.run_fallback_case(index + 1, case))
                .collect()
        }
    };

    let passed = results.iter().filter(|r| r.passed).count();
    info!(
        submission_id = %submission.id,
        passed,
        total = results.len(),
        execution_ms = elapsed_ms(start),
        "Submission judged"
    );

    ExecuteResponse {
        success: true,
        output,
        error: None,
        execution_time: elapsed_ms(start),
        test_results: Some(results),
    }
}

impl<'a> CaseRunner<'a> {
    /// Run the whole source once. Lines logged before a script error are
    /// kept; a timeout discards them.
    fn define(&self, ctx: &mut ExecutionContext) -> InvocationOutcome {
        let source = &self.submission.source;
        match self.invoker.run(ctx, |ctx| ctx.execute(source)) {
            Ok(()) => InvocationOutcome {
                captured_lines: collect_lines(ctx),
                return_value: None,
                error: None,
            },
            Err(error) if error.is_timeout() => {
                ctx.discard_captured();
                InvocationOutcome::failed(error)
            }
            Err(error) => InvocationOutcome {
                captured_lines: collect_lines(ctx),
                return_value: None,
                error: Some(error),
            },
        }
    }

    fn run_entry_case(
        &self,
        ctx: &mut ExecutionContext,
        name: &str,
        test_num: usize,
        case: &TestCase,
    ) -> TestResult {
        let input = normalize_input(case.input.as_ref());

        let input_bytes = serde_json::to_string(&input).map(|s| s.len()).unwrap_or(0);
        if input_bytes > self.max_input_bytes {
            warn!(
                submission_id = %self.submission.id,
                test_num,
                input_bytes,
                "Test input exceeds size limit"
            );
            return self.judge(
                test_num,
                case,
                InvocationOutcome::failed(InvokeError::Execution {
                    message: format!(
                        "Test input exceeds maximum size of {} bytes",
                        self.max_input_bytes
                    ),
                }),
            );
        }

        let outcome = match self.invoker.run(ctx, |ctx| ctx.invoke(name, &input)) {
            Ok(return_value) => InvocationOutcome {
                captured_lines: collect_lines(ctx),
                return_value,
                error: None,
            },
            Err(error) if error.is_timeout() => {
                ctx.discard_captured();
                InvocationOutcome::failed(error)
            }
            Err(error) => InvocationOutcome {
                captured_lines: collect_lines(ctx),
                return_value: None,
                error: Some(error),
            },
        };

        self.judge(test_num, case, outcome)
    }

    fn run_fallback_case(&self, test_num: usize, case: &TestCase) -> TestResult {
        let outcome = match ExecutionContext::create(self.limits) {
            Ok(mut ctx) => self.define(&mut ctx),
            Err(e) => InvocationOutcome::failed(e.into()),
        };
        self.judge(test_num, case, outcome)
    }

    /// Turn an outcome into the case's result.
    fn judge(&self, test_num: usize, case: &TestCase, outcome: InvocationOutcome) -> TestResult {
        if let Some(error) = outcome.error {
            warn!(
                submission_id = %self.submission.id,
                test_num,
                error = %error,
                "Test case failed to run"
            );
            return TestResult {
                passed: false,
                output: String::new(),
                console_output: non_empty(outcome.captured_lines.join("\n")),
                expected_output: case.expected_output.clone(),
                error: Some(error.to_string()),
                id: case.id.clone(),
            };
        }

        let split = split_output(&outcome.captured_lines);
        let passed = self
            .comparator
            .compare(&split.output, case.expected_output.as_ref());

        debug!(
            submission_id = %self.submission.id,
            test_num,
            passed,
            output = %split.output,
            "Test case judged"
        );

        TestResult {
            passed,
            output: split.output,
            console_output: split.console_output.and_then(non_empty),
            expected_output: case.expected_output.clone(),
            error: None,
            id: case.id.clone(),
        }
    }
}

/// Missing input becomes `[]`; strings are tried as JSON first.
pub fn normalize_input(input: Option<&DynamicValue>) -> DynamicValue {
    match input {
        None => json!([]),
        Some(DynamicValue::String(text)) => serde_json::from_str(text)
            .unwrap_or_else(|_| DynamicValue::String(text.clone())),
        Some(other) => other.clone(),
    }
}

fn collect_lines(ctx: &mut ExecutionContext) -> Vec<String> {
    match ctx.take_captured() {
        Ok(lines) => lines,
        Err(e) => {
            warn!(error = %e, "Failed to read captured output");
            Vec::new()
        }
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
