//! Sandboxed snippet executor
//!
//! Each invocation gets a dedicated worker thread and a fresh script engine
//! that is dropped when the worker exits. The record is handed over as a
//! converted copy; nothing the snippet does can reach the caller's value.
//!
//! The engine has no module resolver, `eval` is disabled, and `print` /
//! `debug` go to tracing. Time is bounded by the engine's progress hook and,
//! as a backstop, by the host waiting on the worker. Memory is bounded by
//! capping the number of live variables and the size of each one, so the
//! whole scope fits under [`SandboxLimits`]; call-depth and expression-depth
//! limits bound the stack.

use crate::error::ExecutionError;
use crate::limits::SandboxLimits;
use crossbeam::channel::{self, RecvTimeoutError};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Position, Scope};
use serde_json::Value;
use std::thread;
use std::time::{Duration, Instant};

/// Name the record is bound to inside a snippet
pub const INPUT_VARIABLE: &str = "data";

/// Extra time the host waits beyond the limit before abandoning a worker
const HOST_GRACE: Duration = Duration::from_millis(250);

const WORKER_STACK_BYTES: usize = 16 * 1024 * 1024;
const MAX_CALL_LEVELS: usize = 32;
const MAX_EXPR_DEPTH: usize = 64;
const MAX_FN_EXPR_DEPTH: usize = 32;

/// Executor for untrusted migration snippets
///
/// A snippet is the body of a function from the old record to the new one:
///
/// ```
/// # use tmpl_sandbox::MigrationSandbox;
/// # use serde_json::json;
/// let sandbox = MigrationSandbox::default();
/// let out = sandbox
///     .run("return #{ heading: data.title };", &json!({"title": "Hi"}))
///     .unwrap();
/// assert_eq!(out, json!({"heading": "Hi"}));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MigrationSandbox {
    limits: SandboxLimits,
}

impl MigrationSandbox {
    /// Create executor with limits
    #[inline]
    #[must_use]
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }

    /// Configured limits
    #[inline]
    #[must_use]
    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }

    /// Run `source` against a copy of `data`
    ///
    /// # Errors
    /// Returns the [`ExecutionError`] describing how the snippet misbehaved
    pub fn run(&self, source: &str, data: &Value) -> Result<Value, ExecutionError> {
        let limits = self.limits;
        let source = source.to_owned();
        let input = data.clone();
        let (tx, rx) = channel::bounded(1);

        let worker = thread::Builder::new()
            .name("tmpl-sandbox".to_string())
            .stack_size(WORKER_STACK_BYTES)
            .spawn(move || {
                let outcome = execute(&source, &input, limits);
                // Receiver may have given up already
                let _ = tx.send(outcome);
            })
            .map_err(|e| ExecutionError::isolation(format!("failed to spawn worker: {e}")))?;

        match rx.recv_timeout(limits.timeout() + HOST_GRACE) {
            Ok(outcome) => {
                if worker.join().is_err() {
                    tracing::warn!("sandbox worker panicked after reporting");
                }
                outcome
            }
            Err(RecvTimeoutError::Timeout) => {
                // The worker is detached; its progress hook stops it at the next operation.
                tracing::warn!(limit_ms = limits.timeout_ms, "sandbox worker unresponsive, abandoning");
                Err(ExecutionError::Timeout {
                    limit_ms: limits.timeout_ms,
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                let message = match worker.join() {
                    Err(panic) => panic_message(panic.as_ref()),
                    Ok(()) => "worker exited without a result".to_string(),
                };
                Err(ExecutionError::isolation(message))
            }
        }
    }

    /// Parse `source` without running it
    ///
    /// Returns the parse error message, or `None` when the snippet is well formed.
    #[must_use]
    pub fn validate_syntax(source: &str) -> Option<String> {
        let engine = build_engine(SandboxLimits::default(), Instant::now());
        engine.compile(source).err().map(|e| e.to_string())
    }
}

/// Run `source` against `data` under `limits`
///
/// # Errors
/// Returns the [`ExecutionError`] describing how the snippet misbehaved
#[inline]
pub fn run(source: &str, data: &Value, limits: SandboxLimits) -> Result<Value, ExecutionError> {
    MigrationSandbox::new(limits).run(source, data)
}

/// Parse `source` without running it
#[inline]
#[must_use]
pub fn validate_syntax(source: &str) -> Option<String> {
    MigrationSandbox::validate_syntax(source)
}

fn execute(source: &str, input: &Value, limits: SandboxLimits) -> Result<Value, ExecutionError> {
    let started = Instant::now();
    let engine = build_engine(limits, started);

    let ast = engine
        .compile(source)
        .map_err(|e| ExecutionError::runtime(format!("syntax error: {e}")))?;
    let data = rhai::serde::to_dynamic(input)
        .map_err(|e| ExecutionError::isolation(format!("record could not be copied in: {e}")))?;

    let mut scope = Scope::new();
    scope.push(INPUT_VARIABLE, data);

    let result = engine
        .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
        .map_err(|e| classify(*e, limits))?;

    tracing::debug!(elapsed_ms = started.elapsed().as_millis(), "snippet finished");
    into_record(&result)
}

fn build_engine(limits: SandboxLimits, started: Instant) -> Engine {
    let timeout = limits.timeout();
    let mut engine = Engine::new();

    engine
        .set_module_resolver(DummyModuleResolver::new())
        .set_max_modules(0)
        .set_max_call_levels(MAX_CALL_LEVELS)
        .set_max_expr_depths(MAX_EXPR_DEPTH, MAX_FN_EXPR_DEPTH)
        .set_max_variables(SandboxLimits::MAX_VARIABLES)
        .set_max_string_size(limits.max_string_bytes())
        .set_max_array_size(limits.max_elements())
        .set_max_map_size(limits.max_elements())
        .disable_symbol("eval")
        .on_progress(move |_| (started.elapsed() > timeout).then_some(Dynamic::UNIT))
        .on_print(|text: &str| tracing::debug!(target: "tmpl_sandbox::script", "{text}"))
        .on_debug(|text: &str, _source: Option<&str>, pos: Position| {
            tracing::debug!(target: "tmpl_sandbox::script", %pos, "{text}");
        });

    engine
}

fn classify(err: EvalAltResult, limits: SandboxLimits) -> ExecutionError {
    match err {
        EvalAltResult::ErrorTerminated(..) | EvalAltResult::ErrorTooManyOperations(..) => {
            ExecutionError::Timeout {
                limit_ms: limits.timeout_ms,
            }
        }
        EvalAltResult::ErrorDataTooLarge(what, _) => ExecutionError::MemoryExceeded {
            limit_mb: limits.memory_mb,
            detail: what,
        },
        EvalAltResult::ErrorTooManyVariables(_) => ExecutionError::MemoryExceeded {
            limit_mb: limits.memory_mb,
            detail: format!("more than {} variables", SandboxLimits::MAX_VARIABLES),
        },
        EvalAltResult::ErrorStackOverflow(_) => ExecutionError::MemoryExceeded {
            limit_mb: limits.memory_mb,
            detail: "call stack too deep".to_string(),
        },
        other => ExecutionError::runtime(other.to_string()),
    }
}

fn into_record(result: &Dynamic) -> Result<Value, ExecutionError> {
    if !result.is_map() {
        return Err(ExecutionError::InvalidReturn {
            found: result.type_name().to_string(),
        });
    }

    rhai::serde::from_dynamic::<Value>(result).map_err(|e| ExecutionError::InvalidReturn {
        found: format!("object with unsupported values ({e})"),
    })
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("worker panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("worker panicked: {message}")
    } else {
        "worker panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sandbox() -> MigrationSandbox {
        MigrationSandbox::new(SandboxLimits::default().with_timeout_ms(1_000))
    }

    #[test]
    fn renames_a_field() {
        let out = sandbox()
            .run("return #{ heading: data.title };", &json!({"title": "Hi"}))
            .unwrap();
        assert_eq!(out, json!({"heading": "Hi"}));
    }

    #[test]
    fn trailing_expression_is_the_result() {
        let out = sandbox()
            .run("data.count += 1; data", &json!({"count": 1, "tags": ["a"]}))
            .unwrap();
        assert_eq!(out, json!({"count": 2, "tags": ["a"]}));
    }

    #[test]
    fn caller_value_is_untouched() {
        let input = json!({"title": "original"});
        let out = sandbox()
            .run("data.title = \"changed\"; data", &input)
            .unwrap();
        assert_eq!(out["title"], "changed");
        assert_eq!(input["title"], "original");
    }

    #[test]
    fn non_object_return_is_invalid() {
        let err = sandbox().run("return 42;", &json!({})).unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidReturn { .. }));

        let err = sandbox().run("[data]", &json!({})).unwrap_err();
        assert_eq!(
            err,
            ExecutionError::InvalidReturn {
                found: "array".to_string()
            }
        );
    }

    #[test]
    fn thrown_error_is_runtime_error() {
        let err = sandbox().run(r#"throw "boom";"#, &json!({})).unwrap_err();
        match err {
            ExecutionError::RuntimeError { message } => assert!(message.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn imports_are_not_resolvable() {
        let err = sandbox()
            .run(r#"import "fs" as fs; data"#, &json!({}))
            .unwrap_err();
        assert!(matches!(err, ExecutionError::RuntimeError { .. }));
    }

    #[test]
    fn syntax_check_does_not_run() {
        assert_eq!(validate_syntax("throw \"never runs\";"), None);
        assert_eq!(validate_syntax("return #{ a: 1 };"), None);
        assert!(validate_syntax("return #{ a: ;").is_some());
        assert!(validate_syntax("eval(\"1\")").is_some());
    }

    #[test]
    fn syntax_error_at_run_time_is_runtime_error() {
        let err = sandbox().run("let = ;", &json!({})).unwrap_err();
        match err {
            ExecutionError::RuntimeError { message } => assert!(message.starts_with("syntax error")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
