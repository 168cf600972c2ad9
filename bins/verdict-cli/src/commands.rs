// CLI commands for running Verdict locally
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use verdict_common::config::{EngineConfig, KeyOrder};
use verdict_common::types::{ExecuteRequest, ExecuteResponse, TestCase};
use verdict_engine::{detector, Engine, EngineError};

pub struct RunOptions {
    pub code_path: PathBuf,
    pub tests_path: Option<PathBuf>,
    pub config_path: PathBuf,
    pub timeout_ms: Option<u64>,
    pub key_order: Option<KeyOrder>,
    pub json: bool,
}

/// Run a source file against its test cases.
///
/// ## Returns
/// `true` when the submission succeeded and every test case passed.
pub async fn run_submission(options: &RunOptions) -> Result<bool> {
    let code = fs::read_to_string(&options.code_path)
        .with_context(|| format!("Failed to read {}", options.code_path.display()))?;

    let test_cases = match &options.tests_path {
        Some(path) => load_test_cases(path)?,
        None => Vec::new(),
    };

    let mut config = EngineConfig::load_or_default(&options.config_path)?;
    if let Some(timeout_ms) = options.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(key_order) = options.key_order {
        config.key_order = key_order;
    }
    config.validate()?;

    let engine = Engine::new(config);
    let request = ExecuteRequest {
        code: Some(code),
        test_cases,
    };

    let response = match engine.execute(request).await {
        Ok(response) => response,
        Err(EngineError::InvalidInput(message)) => bail!("{}", message),
        Err(e) => return Err(e.into()),
    };

    if options.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("Failed to serialize response")?
        );
    } else {
        print!("{}", format_summary(&response));
    }

    Ok(response.all_passed())
}

/// Print the detected entry point of a source file.
pub fn detect(code_path: &Path) -> Result<()> {
    let code = fs::read_to_string(code_path)
        .with_context(|| format!("Failed to read {}", code_path.display()))?;

    match detector::detect(&code) {
        Some(entry) => println!("{} ({:?})", entry.name, entry.kind),
        None => println!("(none)"),
    }
    Ok(())
}

/// Test cases file: a JSON array in the request's `testCases` shape.
fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_test_cases(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn parse_test_cases(content: &str) -> Result<Vec<TestCase>> {
    let cases: Vec<TestCase> = serde_json::from_str(content)?;
    Ok(cases)
}

fn format_summary(response: &ExecuteResponse) -> String {
    let mut out = String::new();

    if !response.output.is_empty() {
        out.push_str("Output:\n");
        for line in response.output.lines() {
            out.push_str(&format!("  {}\n", line));
        }
    }

    if let Some(error) = &response.error {
        out.push_str(&format!("✗ Error: {}\n", error));
    }

    if let Some(results) = &response.test_results {
        out.push_str(&format!(
            "Test cases: {}/{} passed\n",
            response.passed_count(),
            results.len()
        ));
        for (index, result) in results.iter().enumerate() {
            let mark = if result.passed { "✓" } else { "✗" };
            let expected = result
                .expected_output
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "undefined".to_string());
            out.push_str(&format!(
                "  {} Test {}: output {} (expected {})\n",
                mark,
                index + 1,
                result.output,
                expected
            ));
            if let Some(console) = &result.console_output {
                for line in console.lines() {
                    out.push_str(&format!("      | {}\n", line));
                }
            }
            if let Some(error) = &result.error {
                out.push_str(&format!("      error: {}\n", error));
            }
        }
    }

    out.push_str(&format!("Execution time: {}ms\n", response.execution_time));
    out
}
