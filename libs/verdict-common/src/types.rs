use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JSON-like value moved between parsing, execution and comparison.
///
/// Parsed with `preserve_order`, so object keys keep the order they had on
/// the wire until the comparator decides what to do with it.
pub type DynamicValue = serde_json::Value;

/// Body of `POST /api/execute`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

/// One test case as supplied by the caller.
///
/// `input` may be a JSON-encoded string or a structured value; the runner
/// normalizes it right before invocation. `id` is never interpreted, only
/// echoed back on the matching [`TestResult`].
///
/// A field that is missing stays `None`; an explicit `null` is kept as
/// `Some(Null)` so that an expected `null` is not mistaken for "absent".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub input: Option<DynamicValue>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<DynamicValue>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub id: Option<DynamicValue>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<DynamicValue>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    DynamicValue::deserialize(deserializer).map(Some)
}

impl TestCase {
    pub fn new(input: DynamicValue, expected_output: DynamicValue) -> Self {
        Self {
            input: Some(input),
            expected_output: Some(expected_output),
            id: None,
        }
    }
}

/// A validated unit of work: source plus its test cases.
///
/// Immutable once built. The id exists only to correlate log lines.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: Uuid,
    pub source: String,
    pub test_cases: Vec<TestCase>,
}

impl Submission {
    pub fn new(source: impl Into<String>, test_cases: Vec<TestCase>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            test_cases,
        }
    }
}

/// Outcome of one test case. Built once by the runner, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub passed: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub console_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_output: Option<DynamicValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<DynamicValue>,
}

/// Response of `POST /api/execute`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock milliseconds from submission start to the last test case
    pub execution_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<Vec<TestResult>>,
}

impl ExecuteResponse {
    /// Response for a request rejected before any sandbox was created.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(message.into()),
            execution_time: 0,
            test_results: None,
        }
    }

    /// Response for a submission whose source failed to define.
    pub fn definition_failed(output: String, error: String, execution_time: u64) -> Self {
        Self {
            success: false,
            output,
            error: Some(error),
            execution_time,
            test_results: None,
        }
    }

    pub fn passed_count(&self) -> usize {
        self.test_results
            .as_ref()
            .map(|results| results.iter().filter(|r| r.passed).count())
            .unwrap_or(0)
    }

    pub fn all_passed(&self) -> bool {
        self.success
            && self
                .test_results
                .as_ref()
                .map(|results| results.iter().all(|r| r.passed))
                .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_accepts_camel_case_and_missing_fields() {
        let request: ExecuteRequest = serde_json::from_value(json!({
            "code": "function f(x) { return x; }",
            "testCases": [
                { "input": "[1,2]", "expectedOutput": 3 },
                { "expectedOutput": "ok", "id": "case-2" },
                {}
            ]
        }))
        .unwrap();

        assert_eq!(request.code.as_deref(), Some("function f(x) { return x; }"));
        assert_eq!(request.test_cases.len(), 3);
        assert_eq!(request.test_cases[0].input, Some(json!("[1,2]")));
        assert_eq!(request.test_cases[1].input, None);
        assert_eq!(request.test_cases[1].id, Some(json!("case-2")));
        assert_eq!(request.test_cases[2], TestCase::default());
    }

    #[test]
    fn test_explicit_null_is_not_absent() {
        let case: TestCase =
            serde_json::from_value(json!({ "input": null, "expectedOutput": null })).unwrap();
        assert_eq!(case.input, Some(DynamicValue::Null));
        assert_eq!(case.expected_output, Some(DynamicValue::Null));
        assert_eq!(case.id, None);
    }

    #[test]
    fn test_request_without_code() {
        let request: ExecuteRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.code.is_none());
        assert!(request.test_cases.is_empty());
    }

    #[test]
    fn test_response_omits_absent_fields() {
        let response = ExecuteResponse {
            success: true,
            output: "hi".to_string(),
            error: None,
            execution_time: 12,
            test_results: Some(vec![TestResult {
                passed: true,
                output: "5".to_string(),
                console_output: None,
                expected_output: Some(json!(5)),
                error: None,
                id: None,
            }]),
        };

        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value,
            json!({
                "success": true,
                "output": "hi",
                "executionTime": 12,
                "testResults": [{ "passed": true, "output": "5", "expectedOutput": 5 }]
            })
        );
    }

    #[test]
    fn test_rejected_response_shape() {
        let value = serde_json::to_value(ExecuteResponse::rejected("nope")).unwrap();
        assert_eq!(
            value,
            json!({ "success": false, "output": "", "error": "nope", "executionTime": 0 })
        );
    }

    #[test]
    fn test_all_passed() {
        let mut response = ExecuteResponse {
            success: true,
            output: String::new(),
            error: None,
            execution_time: 1,
            test_results: None,
        };
        assert!(response.all_passed());

        response.test_results = Some(vec![
            TestResult {
                passed: true,
                output: "1".into(),
                console_output: None,
                expected_output: None,
                error: None,
                id: None,
            },
            TestResult {
                passed: false,
                output: "2".into(),
                console_output: None,
                expected_output: None,
                error: None,
                id: None,
            },
        ]);
        assert!(!response.all_passed());
        assert_eq!(response.passed_count(), 1);
    }

    #[test]
    fn test_submission_ids_are_unique() {
        let a = Submission::new("1", vec![]);
        let b = Submission::new("1", vec![]);
        assert_ne!(a.id, b.id);
    }
}
