/// Isolated Execution Context
///
/// One V8 isolate per submission, created right before the source first runs
/// and dropped once its last test case completes. The only capability the
/// sandbox sees besides the language itself is `console.log`, backed by a
/// frozen harness object installed at bootstrap.
///
/// **Threading:**
/// A context is `!Send`. It must be created, used and dropped on the same
/// thread, and contexts living on one thread must be dropped in reverse
/// order of creation.
///
/// **Heap:**
/// The isolate is capped at `max_heap_bytes`. When V8 approaches the cap the
/// running script is terminated instead of the process aborting; the timed
/// invoker reports that as a memory-limit error.
use deno_core::{v8, JsRuntime, RuntimeOptions};
use serde::Deserialize;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};
use verdict_common::types::DynamicValue;

use crate::capture::CaptureSink;
use crate::error::ContextError;

/// Global name the harness is installed under. Not writable or configurable
/// from user code.
const HARNESS_GLOBAL: &str = "__verdictHarness";

/// Installed once per context, before user code. Keeps private copies of
/// every builtin it relies on so user code replacing `JSON`, `String` or
/// array prototypes cannot break capture.
const HARNESS_BOOTSTRAP: &str = r#"
(() => {
  const stringify = JSON.stringify;
  const parse = JSON.parse;
  const toText = String;
  const objectToString = Object.prototype.toString;
  const apply = Reflect.apply;
  const defineProperty = Object.defineProperty;
  const freeze = Object.freeze;
  let pending = [];

  const safeText = (value) => {
    try {
      return toText(value);
    } catch (_) {}
    try {
      return apply(objectToString, value, []);
    } catch (_) {}
    return "[unprintable]";
  };

  const render = (value) => {
    if (typeof value === "object" && value !== null) {
      try {
        const json = stringify(value);
        if (json !== undefined) {
          return json;
        }
      } catch (_) {}
    }
    return safeText(value);
  };

  const record = (line) => {
    pending[pending.length] = line;
  };

  const log = (...args) => {
    let line = "";
    for (let i = 0; i < args.length; i++) {
      if (i > 0) {
        line += " ";
      }
      line += render(args[i]);
    }
    record(line);
  };

  const harness = freeze({
    drain() {
      const out = stringify(pending);
      pending = [];
      return out;
    },
    invoke(target, inputJson) {
      const input = parse(inputJson);
      let result;
      try {
        result = target(input);
      } catch (e) {
        return stringify({ ok: false, error: safeText(e) });
      }
      record(render(result));
      let json = null;
      try {
        const encoded = stringify(result);
        if (encoded !== undefined) {
          json = encoded;
        }
      } catch (_) {}
      return stringify({ ok: true, json });
    },
  });

  defineProperty(globalThis, "__verdictHarness", {
    value: harness,
    writable: false,
    enumerable: false,
    configurable: false,
  });
  defineProperty(globalThis, "console", {
    value: freeze({ log }),
    writable: true,
    enumerable: false,
    configurable: true,
  });
  delete globalThis.Deno;
})();
"#;

#[derive(Debug, Clone, Copy)]
pub struct ContextLimits {
    pub max_heap_bytes: usize,
}

impl Default for ContextLimits {
    fn default() -> Self {
        Self {
            max_heap_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Reply of `harness.invoke`
#[derive(Debug, Deserialize)]
struct InvokeEnvelope {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    json: Option<String>,
}

/// Shared with the near-heap-limit callback.
struct HeapLimitState {
    handle: v8::IsolateHandle,
    triggered: AtomicBool,
}

/// Terminates the running script and grants 1MB so the termination can
/// propagate.
extern "C" fn near_heap_limit_callback(
    data: *mut c_void,
    current_heap_limit: usize,
    _initial_heap_limit: usize,
) -> usize {
    // SAFETY: `data` is the `Box<HeapLimitState>` owned by the context that
    // registered this callback. The box is dropped after the runtime, so it
    // is alive for every call V8 can make.
    let state = unsafe { &*(data as *const HeapLimitState) };
    if !state.triggered.swap(true, Ordering::SeqCst) {
        state.handle.terminate_execution();
    }
    current_heap_limit + 1024 * 1024
}

pub struct ExecutionContext {
    // Declared before `heap_state` so the isolate is dropped first.
    runtime: JsRuntime,
    heap_state: Box<HeapLimitState>,
    sink: CaptureSink,
    limits: ContextLimits,
}

impl ExecutionContext {
    /// Build a fresh isolate with the harness installed.
    pub fn create(limits: ContextLimits) -> Result<Self, ContextError> {
        let create_params = v8::CreateParams::default().heap_limits(0, limits.max_heap_bytes);
        let mut runtime = JsRuntime::new(RuntimeOptions {
            create_params: Some(create_params),
            ..Default::default()
        });

        let heap_state = Box::new(HeapLimitState {
            handle: runtime.v8_isolate().thread_safe_handle(),
            triggered: AtomicBool::new(false),
        });
        runtime.v8_isolate().add_near_heap_limit_callback(
            near_heap_limit_callback,
            &*heap_state as *const HeapLimitState as *mut c_void,
        );

        let mut ctx = Self {
            runtime,
            heap_state,
            sink: CaptureSink::new(),
            limits,
        };
        ctx.runtime
            .execute_script("verdict:harness", HARNESS_BOOTSTRAP.to_string())
            .map_err(|e| ContextError::Harness(first_line(&e.to_string())))?;

        Ok(ctx)
    }

    pub fn limits(&self) -> ContextLimits {
        self.limits
    }

    /// Run `source` as a full program. Top-level declarations stay visible to
    /// later `invoke` calls.
    pub fn execute(&mut self, source: &str) -> Result<(), ContextError> {
        self.runtime
            .execute_script("solution.js", source.to_string())
            .map(|_| ())
            .map_err(|e| ContextError::Script(first_line(&e.to_string())))
    }

    /// Whether `name` resolves to a function in the global scope. Any error
    /// while checking counts as "no".
    pub fn is_callable(&mut self, name: &str) -> bool {
        if !is_identifier(name) {
            return false;
        }
        let probe = format!("typeof {} === 'function'", name);
        match self.runtime.execute_script("verdict:probe", probe) {
            Ok(global) => {
                let scope = &mut self.runtime.handle_scope();
                let local = v8::Local::new(scope, global);
                local.is_true()
            }
            Err(_) => false,
        }
    }

    /// Call the global `name` with `input` as its single argument.
    ///
    /// `input` crosses as JSON text and is rebuilt with `JSON.parse`, so keys
    /// such as `__proto__` stay own properties.
    ///
    /// The rendered return value is appended to the capture buffer after any
    /// lines the call logged. Returns the JSON form of the return value, or
    /// `None` for `undefined` and values JSON cannot represent.
    pub fn invoke(
        &mut self,
        name: &str,
        input: &DynamicValue,
    ) -> Result<Option<DynamicValue>, ContextError> {
        if !is_identifier(name) {
            return Err(ContextError::Harness(format!(
                "'{}' is not a valid function name",
                name
            )));
        }
        let encoded = serde_json::to_string(input)
            .and_then(|json| serde_json::to_string(&json))
            .map_err(|e| ContextError::Harness(format!("Failed to encode input: {}", e)))?;
        let call = format!("{}.invoke({}, {})", HARNESS_GLOBAL, name, encoded);

        let reply = self.eval_to_string("verdict:invoke", call)?;
        let envelope: InvokeEnvelope = serde_json::from_str(&reply)
            .map_err(|e| ContextError::Harness(format!("Malformed invoke reply: {}", e)))?;

        if !envelope.ok {
            return Err(ContextError::Script(
                envelope.error.unwrap_or_else(|| "Error".to_string()),
            ));
        }

        Ok(envelope
            .json
            .and_then(|json| serde_json::from_str::<DynamicValue>(&json).ok()))
    }

    /// Move lines buffered on the JS side into the capture sink.
    fn flush(&mut self) -> Result<(), ContextError> {
        let drain = format!("{}.drain()", HARNESS_GLOBAL);
        let reply = self.eval_to_string("verdict:drain", drain)?;
        let lines: Vec<String> = serde_json::from_str(&reply)
            .map_err(|e| ContextError::Harness(format!("Malformed capture buffer: {}", e)))?;
        self.sink.extend(lines);
        Ok(())
    }

    /// Everything logged since the last take, in call order.
    pub fn take_captured(&mut self) -> Result<Vec<String>, ContextError> {
        self.flush()?;
        Ok(self.sink.take())
    }

    /// Drop whatever was logged since the last take.
    pub fn discard_captured(&mut self) {
        if self.flush().is_err() {
            tracing::debug!("Capture buffer could not be drained; discarding sink only");
        }
        self.sink.clear();
    }

    /// Handle for terminating execution from another thread.
    pub fn isolate_handle(&mut self) -> v8::IsolateHandle {
        self.runtime.v8_isolate().thread_safe_handle()
    }

    /// Whether the heap callback fired since the last call; resets the flag.
    pub fn take_heap_exhausted(&self) -> bool {
        self.heap_state.triggered.swap(false, Ordering::SeqCst)
    }

    fn eval_to_string(&mut self, name: &'static str, code: String) -> Result<String, ContextError> {
        let global = self
            .runtime
            .execute_script(name, code)
            .map_err(|e| ContextError::Script(first_line(&e.to_string())))?;
        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, global);
        Ok(local.to_rust_string_lossy(scope))
    }
}

/// First line of a V8 error report, without the `Uncaught ` prefix.
pub(crate) fn first_line(message: &str) -> String {
    let line = message.lines().next().unwrap_or("").trim();
    line.strip_prefix("Uncaught ")
        .unwrap_or(line)
        .to_string()
}

/// Names are interpolated into scripts, so only plain identifiers pass.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_context() -> ExecutionContext {
        ExecutionContext::create(ContextLimits::default()).unwrap()
    }

    #[test]
    fn test_console_log_is_captured_in_order() {
        let mut ctx = make_context();
        ctx.execute(r#"console.log("a", 1, true); console.log([1, 2], {k: "v"}, null, undefined);"#)
            .unwrap();

        assert_eq!(
            ctx.take_captured().unwrap(),
            vec!["a 1 true".to_string(), r#"[1,2] {"k":"v"} null undefined"#.to_string()]
        );
        assert!(ctx.take_captured().unwrap().is_empty());
    }

    #[test]
    fn test_unserializable_values_fall_back() {
        let mut ctx = make_context();
        ctx.execute(
            r#"
            const loop = {}; loop.self = loop;
            console.log(loop);
            console.log(Object.create(null));
            console.log(() => 1);
            "#,
        )
        .unwrap();

        let lines = ctx.take_captured().unwrap();
        assert_eq!(lines[0], "[object Object]");
        assert_eq!(lines[1], "{}");
        assert_eq!(lines[2], "() => 1");
    }

    #[test]
    fn test_declarations_persist_for_invoke() {
        let mut ctx = make_context();
        ctx.execute("function twoSum(nums) { return nums[0] + nums[1]; }")
            .unwrap();

        let value = ctx.invoke("twoSum", &json!([2, 3])).unwrap();
        assert_eq!(value, Some(json!(5)));
        assert_eq!(ctx.take_captured().unwrap(), vec!["5".to_string()]);
    }

    #[test]
    fn test_invoke_passes_arrays_unspread() {
        let mut ctx = make_context();
        ctx.execute("const count = (args) => args.length;").unwrap();

        assert_eq!(ctx.invoke("count", &json!([7, 8, 9])).unwrap(), Some(json!(3)));
    }

    #[test]
    fn test_input_keys_are_own_properties() {
        let mut ctx = make_context();
        ctx.execute(
            r#"function describe(o) { return Object.keys(o).join(",") + "|" + (Object.getPrototypeOf(o) === Object.prototype); }"#,
        )
        .unwrap();

        let value = ctx
            .invoke("describe", &json!({ "__proto__": { "polluted": true }, "a": "line\u{2028}break" }))
            .unwrap();
        assert_eq!(value, Some(json!("__proto__,a|true")));
    }

    #[test]
    fn test_input_survives_replaced_json_parse() {
        let mut ctx = make_context();
        ctx.execute(r#"JSON.parse = () => "hijacked"; const first = (xs) => xs[0];"#)
            .unwrap();

        assert_eq!(ctx.invoke("first", &json!([9, 8])).unwrap(), Some(json!(9)));
    }

    #[test]
    fn test_return_value_is_last_line() {
        let mut ctx = make_context();
        ctx.execute(r#"var solve = function(x) { console.log("debug", x); return [x, x]; };"#)
            .unwrap();

        ctx.invoke("solve", &json!(4)).unwrap();
        assert_eq!(
            ctx.take_captured().unwrap(),
            vec!["debug 4".to_string(), "[4,4]".to_string()]
        );
    }

    #[test]
    fn test_undefined_return() {
        let mut ctx = make_context();
        ctx.execute("function noop() {}").unwrap();

        assert_eq!(ctx.invoke("noop", &json!([])).unwrap(), None);
        assert_eq!(ctx.take_captured().unwrap(), vec!["undefined".to_string()]);
    }

    #[test]
    fn test_thrown_error_is_reported_as_string() {
        let mut ctx = make_context();
        ctx.execute(r#"function boom() { console.log("before"); throw new Error("boom"); }"#)
            .unwrap();

        let err = ctx.invoke("boom", &json!([])).unwrap_err();
        assert_eq!(err.to_string(), "Error: boom");
        assert_eq!(ctx.take_captured().unwrap(), vec!["before".to_string()]);
    }

    #[test]
    fn test_syntax_error_message() {
        let mut ctx = make_context();
        let err = ctx.execute("function broken( {").unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("SyntaxError"), "got: {}", message);
        assert!(!message.contains('\n'));
    }

    #[test]
    fn test_is_callable() {
        let mut ctx = make_context();
        ctx.execute("let value = 3; const fn1 = () => value;").unwrap();

        assert!(ctx.is_callable("fn1"));
        assert!(!ctx.is_callable("value"));
        assert!(!ctx.is_callable("missing"));
        assert!(!ctx.is_callable("fn1; globalThis"));
    }

    #[test]
    fn test_user_code_cannot_break_capture() {
        let mut ctx = make_context();
        ctx.execute(
            r#"
            JSON.stringify = () => "hijacked";
            String = () => "hijacked";
            Array.prototype.push = () => 0;
            __verdictHarness = null;
            console.log({ a: 1 }, 2);
            "#,
        )
        .unwrap();

        assert_eq!(ctx.take_captured().unwrap(), vec![r#"{"a":1} 2"#.to_string()]);
    }

    #[test]
    fn test_first_line() {
        assert_eq!(
            first_line("Uncaught SyntaxError: Unexpected token '}'\n    at solution.js:1:5"),
            "SyntaxError: Unexpected token '}'"
        );
        assert_eq!(first_line("ReferenceError: x"), "ReferenceError: x");
    }
}
