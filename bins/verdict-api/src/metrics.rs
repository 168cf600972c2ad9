// Prometheus metrics for the Verdict API

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, Encoder, Histogram, IntCounterVec, TextEncoder,
};
use verdict_common::types::ExecuteResponse;

lazy_static! {
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "verdict_submissions_total",
        "Submissions handled, by outcome",
        &["outcome"]
    )
    .expect("verdict_submissions_total registers once");
    pub static ref TEST_CASES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "verdict_test_cases_total",
        "Test cases judged, by result",
        &["result"]
    )
    .expect("verdict_test_cases_total registers once");
    pub static ref EXECUTION_TIME_MS: Histogram = register_histogram!(
        "verdict_execution_time_ms",
        "Submission execution time in milliseconds",
        vec![5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0]
    )
    .expect("verdict_execution_time_ms registers once");
}

pub fn record_rejected() {
    SUBMISSIONS_TOTAL.with_label_values(&["rejected"]).inc();
}

pub fn record_response(response: &ExecuteResponse) {
    let outcome = if !response.success {
        "definition_error"
    } else if response.all_passed() {
        "passed"
    } else {
        "failed"
    };
    SUBMISSIONS_TOTAL.with_label_values(&[outcome]).inc();

    if let Some(results) = &response.test_results {
        let passed = response.passed_count() as u64;
        TEST_CASES_TOTAL.with_label_values(&["passed"]).inc_by(passed);
        TEST_CASES_TOTAL
            .with_label_values(&["failed"])
            .inc_by(results.len() as u64 - passed);
    }

    EXECUTION_TIME_MS.observe(response.execution_time as f64);
}

/// Text exposition of every registered metric.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
