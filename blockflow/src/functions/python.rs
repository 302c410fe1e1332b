//! Runs generated Python source in a separate interpreter process.
//!
//! Generated code is not trusted, so it never runs inside this process. Each
//! call spawns the configured interpreter with a small runner script, writes
//! `{name, source, context}` as JSON to its stdin and reads one JSON reply
//! from its stdout. Anything the function itself prints is redirected to the
//! child's stderr so it cannot corrupt the reply.

use super::BlockFunction;
use crate::config::InterpreterSettings;
use crate::context::Context;
use crate::errors::{BlockflowError, FunctionError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

const STDERR_PREVIEW_CHARS: usize = 2_000;
const STDOUT_PREVIEW_CHARS: usize = 1_000;

const RUNNER: &str = r#"
import asyncio, contextlib, inspect, json, sys, traceback

def _blockflow_main():
    request = json.loads(sys.stdin.read())
    name = request["name"]
    namespace = {"__name__": "blockflow_" + name}
    try:
        with contextlib.redirect_stdout(sys.stderr):
            exec(compile(request["source"], name + ".py", "exec"), namespace)
            func = namespace.get(name)
            if not callable(func):
                raise NameError("function %r is not defined" % name)
            result = func(request["context"])
            if inspect.iscoroutine(result):
                result = asyncio.run(result)
        if not isinstance(result, dict):
            raise TypeError("Block %s did not return a dictionary" % name)
        reply = {"ok": True, "context": result}
    except BaseException as exc:
        reply = {
            "ok": False,
            "error_type": type(exc).__name__,
            "error": str(exc),
            "traceback": traceback.format_exc(),
        }
    try:
        encoded = json.dumps(reply, default=str)
    except Exception as exc:
        encoded = json.dumps({
            "ok": False,
            "error_type": type(exc).__name__,
            "error": "context is not JSON serializable: %s" % exc,
        })
    sys.stdout.write(encoded)
    sys.stdout.flush()

_blockflow_main()
"#;

#[derive(Debug, Serialize)]
struct RunnerRequest<'a> {
    name: &'a str,
    source: &'a str,
    context: &'a Context,
}

#[derive(Debug, Deserialize)]
struct RunnerReply {
    ok: bool,
    #[serde(default)]
    context: Option<serde_json::Value>,
    #[serde(default)]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    traceback: Option<String>,
}

/// A Python interpreter used to run stored block source.
#[derive(Debug, Clone)]
pub struct PythonInterpreter {
    executable: String,
    timeout: Option<Duration>,
    working_dir: Option<PathBuf>,
}

impl Default for PythonInterpreter {
    fn default() -> Self {
        let settings = InterpreterSettings::default();
        let timeout = settings.timeout().ok().flatten();
        Self {
            executable: settings.python,
            timeout,
            working_dir: settings.working_dir,
        }
    }
}

impl PythonInterpreter {
    /// Creates an interpreter handle for the given executable.
    #[must_use]
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            timeout: None,
            working_dir: None,
        }
    }

    /// Builds an interpreter from configuration.
    ///
    /// # Errors
    ///
    /// Returns a config error when the timeout is not a usable duration.
    pub fn from_settings(settings: &InterpreterSettings) -> Result<Self, BlockflowError> {
        Ok(Self {
            executable: settings.python.clone(),
            timeout: settings.timeout()?,
            working_dir: settings.working_dir.clone(),
        })
    }

    /// Sets a per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the working directory functions run in.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Returns the executable name or path.
    #[must_use]
    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Runs `source` and calls the function called `name` with `context`.
    pub async fn invoke(
        &self,
        name: &str,
        source: &str,
        context: Context,
    ) -> Result<Context, FunctionError> {
        let request = serde_json::to_string(&RunnerRequest {
            name,
            source,
            context: &context,
        })
        .map_err(|e| FunctionError::new("SerializationError", e.to_string()))?;

        let mut cmd = Command::new(&self.executable);
        cmd.arg("-c").arg(RUNNER);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|e| {
            FunctionError::new(
                "InterpreterError",
                format!("failed to start '{}': {e}", self.executable),
            )
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.as_bytes())
                .await
                .map_err(|e| FunctionError::new("InterpreterError", format!("write request: {e}")))?;
            stdin
                .shutdown()
                .await
                .map_err(|e| FunctionError::new("InterpreterError", format!("close stdin: {e}")))?;
        }

        let output = match self.timeout {
            Some(limit) => match timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(block = %name, timeout_s = limit.as_secs_f64(), "block function timed out");
                    return Err(FunctionError::new(
                        "TimeoutError",
                        format!("block did not finish within {}s", limit.as_secs_f64()),
                    ));
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| FunctionError::new("InterpreterError", format!("wait for interpreter: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            block = %name,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            exit = ?output.status.code(),
            "interpreter finished"
        );

        let reply: RunnerReply = match serde_json::from_str(stdout.trim()) {
            Ok(reply) => reply,
            Err(e) => {
                return Err(FunctionError::new(
                    "InterpreterError",
                    format!(
                        "interpreter exited with {} and no valid reply ({e}); stdout={}",
                        output.status,
                        preview(&stdout, STDOUT_PREVIEW_CHARS)
                    ),
                )
                .with_detail(preview(&stderr, STDERR_PREVIEW_CHARS)));
            }
        };

        if !reply.ok {
            let mut err = FunctionError::new(
                reply.error_type.unwrap_or_else(|| "Exception".to_string()),
                reply.error.unwrap_or_default(),
            );
            if let Some(tb) = reply.traceback {
                err = err.with_detail(tb);
            }
            return Err(err);
        }

        reply
            .context
            .and_then(Context::from_value)
            .ok_or_else(|| {
                FunctionError::new("TypeError", format!("Block {name} did not return a dictionary"))
            })
    }
}

/// Generated Python source bound to an interpreter.
#[derive(Debug, Clone)]
pub struct PythonFunction {
    name: String,
    source: Arc<str>,
    interpreter: Arc<PythonInterpreter>,
}

impl PythonFunction {
    /// Creates a new Python-backed block function.
    pub fn new(
        name: impl Into<String>,
        source: impl Into<Arc<str>>,
        interpreter: Arc<PythonInterpreter>,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            interpreter,
        }
    }

    /// Returns the Python source.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }
}

#[async_trait]
impl BlockFunction for PythonFunction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, context: Context) -> Result<Context, FunctionError> {
        self.interpreter.invoke(&self.name, &self.source, context).await
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str(&format!("... [truncated, total_chars={count}]"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::validate_function;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn python_available() -> bool {
        std::process::Command::new("python3")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn interpreter() -> Arc<PythonInterpreter> {
        Arc::new(PythonInterpreter::new("python3").with_timeout(Duration::from_secs(30)))
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("short", 10), "short");
        assert!(preview(&"x".repeat(20), 5).starts_with("xxxxx... [truncated"));
    }

    #[tokio::test]
    async fn test_missing_interpreter_is_reported() {
        let interpreter = PythonInterpreter::new("definitely-not-a-python-binary");
        let err = interpreter
            .invoke("block_1", "def block_1(context):\n    return context\n", Context::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_type, "InterpreterError");
    }

    #[tokio::test]
    async fn test_python_function_updates_context() {
        if !python_available() {
            return;
        }
        let source = "def block_1(context: dict) -> dict:\n    print('noise')\n    context['x'] = 1\n    return context\n";
        let func = PythonFunction::new("block_1", source, interpreter());

        let mut ctx = Context::new();
        ctx.insert("seed", json!("kept"));

        let out = func.call(ctx).await.unwrap();
        assert_eq!(out.get_i64("x"), Some(1));
        assert_eq!(out.get_str("seed"), Some("kept"));
    }

    #[tokio::test]
    async fn test_python_exception_becomes_function_error() {
        if !python_available() {
            return;
        }
        let source = "def block_2(context):\n    return {'y': context['x'] * 2}\n";
        let func = PythonFunction::new("block_2", source, interpreter());

        let err = func.call(Context::new()).await.unwrap_err();
        assert_eq!(err.error_type, "KeyError");
        assert!(err.detail.unwrap_or_default().contains("Traceback"));
    }

    #[tokio::test]
    async fn test_non_mapping_return_is_rejected() {
        if !python_available() {
            return;
        }
        let source = "def block_3(context):\n    return [1, 2]\n";
        let func = PythonFunction::new("block_3", source, interpreter());

        let err = func.call(Context::new()).await.unwrap_err();
        assert_eq!(err.error_type, "TypeError");
        assert!(err.message.contains("did not return a dictionary"));
    }

    #[tokio::test]
    async fn test_async_function_is_awaited() {
        if !python_available() {
            return;
        }
        let source = "import asyncio\n\nasync def block_1(context):\n    await asyncio.sleep(0)\n    context['x'] = 1\n    return context\n";
        validate_function(source, "block_1").unwrap();
        let func = PythonFunction::new("block_1", source, interpreter());

        let out = func.call(Context::new()).await.unwrap();
        assert_eq!(out.get_i64("x"), Some(1));
    }

    #[tokio::test]
    async fn test_slow_function_times_out() {
        if !python_available() {
            return;
        }
        let source = "import time\n\ndef block_1(context):\n    time.sleep(5)\n    return context\n";
        let interpreter =
            Arc::new(PythonInterpreter::new("python3").with_timeout(Duration::from_millis(100)));
        let func = PythonFunction::new("block_1", source, interpreter);

        let start = Instant::now();
        let err = func.call(Context::new()).await.unwrap_err();
        assert_eq!(err.error_type, "TimeoutError");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_from_settings_rejects_unusable_timeout() {
        let settings = InterpreterSettings {
            timeout_seconds: Some(-1.0),
            ..InterpreterSettings::default()
        };
        assert!(matches!(
            PythonInterpreter::from_settings(&settings),
            Err(BlockflowError::Config(_))
        ));

        let settings = InterpreterSettings {
            timeout_seconds: Some(2.0),
            ..InterpreterSettings::default()
        };
        let interpreter = PythonInterpreter::from_settings(&settings).unwrap();
        assert_eq!(interpreter.timeout, Some(Duration::from_secs(2)));
    }
}
