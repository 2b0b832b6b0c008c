//! Executes a validated snippet against a fixed namespace in a Python
//! subprocess.
//!
//! The snippet never sees the caller's environment: a generated wrapper
//! program binds exactly the [`ExecutionNamespace`] names as the snippet's
//! globals, strips dangerous builtins from that scope, and reports a
//! structured JSON result between sentinel markers. Each invocation gets a
//! fresh temporary workspace, a wall-clock timeout, and (on Unix) kernel
//! resource limits. Exactly one attempt per snippet, no retry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::{PlotError, Result};
use crate::extractor::CodeSnippet;

/// Resource limits applied to the snippet subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// Maximum memory in MB
    pub memory_mb: usize,
    /// Maximum CPU time in seconds
    pub cpu_seconds: u64,
    /// Maximum number of threads for scientific libraries
    pub max_threads: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: 2048,
            cpu_seconds: 30,
            max_threads: 4,
        }
    }
}

/// A value bound into the snippet's global scope.
#[derive(Debug, Clone)]
pub enum NamespaceValue {
    /// A dataframe materialized from a CSV file at execution time.
    DataFrameCsv(PathBuf),
    /// The pandas module handle.
    Pandas,
    /// The matplotlib.pyplot module handle (headless Agg backend).
    Pyplot,
    /// A JSON-serializable scalar or structure.
    Scalar(serde_json::Value),
}

/// The only names a snippet may resolve at execution time.
///
/// Constructed fresh per invocation and discarded after; bindings are applied
/// in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ExecutionNamespace {
    bindings: Vec<(String, NamespaceValue)>,
}

impl ExecutionNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, value: NamespaceValue) -> Self {
        self.bindings.push((name.into(), value));
        self
    }

    /// The conventional plotting namespace: `df` from a CSV, plus `pd` and
    /// `plt` module handles.
    pub fn for_dataframe(csv_path: impl Into<PathBuf>) -> Self {
        Self::new()
            .bind("df", NamespaceValue::DataFrameCsv(csv_path.into()))
            .bind("pd", NamespaceValue::Pandas)
            .bind("plt", NamespaceValue::Pyplot)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(name, _)| name.as_str())
    }

    /// Renders the Python binding statements for the wrapper program.
    fn render_bindings(&self) -> Result<String> {
        let mut lines = Vec::with_capacity(self.bindings.len());
        for (name, value) in &self.bindings {
            let line = match value {
                NamespaceValue::DataFrameCsv(path) => {
                    let path_literal = serde_json::to_string(&path.to_string_lossy())?;
                    format!("_bindings[{}] = pd.read_csv({})", py_str(name)?, path_literal)
                }
                NamespaceValue::Pandas => format!("_bindings[{}] = pd", py_str(name)?),
                NamespaceValue::Pyplot => format!("_bindings[{}] = plt", py_str(name)?),
                NamespaceValue::Scalar(value) => format!(
                    "_bindings[{}] = json.loads({})",
                    py_str(name)?,
                    py_str(&serde_json::to_string(value)?)?
                ),
            };
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }
}

/// JSON string literals are valid Python string literals.
fn py_str(s: &str) -> Result<String> {
    Ok(serde_json::to_string(s)?)
}

/// Result of a successful snippet execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    /// PNG bytes of the rendered chart, if the snippet produced a figure.
    pub plot_png: Option<Vec<u8>>,
    /// Captured stdout of the snippet, if any.
    pub stdout: Option<String>,
}

/// Trait for snippet executors. The orchestrator talks to this seam so tests
/// can prove a rejected snippet never reaches execution.
#[async_trait]
pub trait SnippetExecutor: Send + Sync {
    async fn execute(
        &self,
        snippet: &CodeSnippet,
        namespace: ExecutionNamespace,
    ) -> Result<ExecutionOutcome>;
}

/// Python subprocess executor with namespace restriction and guardrails.
pub struct PythonExecutor {
    python_path: PathBuf,
    limits: ResourceLimits,
    timeout: Duration,
    env_vars: HashMap<String, String>,
}

impl PythonExecutor {
    /// Create a new executor (finds Python in PATH).
    pub fn new() -> Result<Self> {
        let python_path = which::which("python3")
            .or_else(|_| which::which("python"))
            .map_err(|_| PlotError::PythonNotFound)?;
        Ok(Self {
            python_path,
            limits: ResourceLimits::default(),
            timeout: Duration::from_secs(60),
            env_vars: HashMap::new(),
        })
    }

    /// Create with an explicit Python path (for bundled interpreters).
    pub fn with_python_path(python_path: PathBuf) -> Result<Self> {
        if !python_path.exists() {
            return Err(PlotError::PythonNotFound);
        }
        Ok(Self {
            python_path,
            limits: ResourceLimits::default(),
            timeout: Duration::from_secs(60),
            env_vars: HashMap::new(),
        })
    }

    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Wall-clock cap on a single execution. A runaway snippet is SIGKILLed
    /// (whole process group) when this expires.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn python_path(&self) -> &PathBuf {
        &self.python_path
    }

    /// Generate the wrapper program that binds the namespace, executes the
    /// snippet under restricted globals, and emits a structured result.
    fn generate_wrapper(
        &self,
        snippet: &CodeSnippet,
        namespace: &ExecutionNamespace,
        output_dir: &str,
    ) -> Result<String> {
        let bindings = namespace.render_bindings()?;
        let snippet_literal = py_str(snippet.as_str())?;
        let plot_path_literal = py_str(&format!("{}/plot.png", output_dir))?;

        Ok(format!(
            r#"
import json
import sys
from io import StringIO

import matplotlib
matplotlib.use("Agg")
import matplotlib.pyplot as plt
import pandas as pd

_bindings = {{}}
{bindings}

# The snippet resolves ONLY the bound names plus defanged builtins.
import builtins as _builtins
_BLOCKED_BUILTINS = {{"open", "eval", "exec", "compile", "__import__", "input", "exit", "quit", "breakpoint", "help"}}
_safe_builtins = {{k: v for k, v in vars(_builtins).items() if k not in _BLOCKED_BUILTINS}}
_globals = dict(_bindings)
_globals["__builtins__"] = _safe_builtins

_snippet = {snippet_literal}
_plot_path = {plot_path_literal}

_captured_stdout = StringIO()
_original_stdout = sys.stdout
sys.stdout = _captured_stdout

_exec_error = None
try:
    exec(compile(_snippet, "<snippet>", "exec"), _globals)
except BaseException as e:
    _exec_error = f"{{type(e).__name__}}: {{e}}"

sys.stdout = _original_stdout

_plot = None
if _exec_error is None and plt.get_fignums():
    try:
        plt.savefig(_plot_path, bbox_inches="tight")
        _plot = "plot.png"
    except Exception as e:
        _exec_error = f"{{type(e).__name__}}: {{e}}"
plt.close("all")

print("OUTPUT_JSON_START")
print(json.dumps({{
    "stdout": _captured_stdout.getvalue() or None,
    "plot": _plot,
    "error": _exec_error,
}}))
print("OUTPUT_JSON_END")

if _exec_error:
    sys.exit(1)
"#,
        ))
    }

    /// Apply kernel resource limits to the subprocess.
    #[cfg(unix)]
    fn apply_resource_limits(&self, cmd: &mut Command) {
        let cpu_seconds = self.limits.cpu_seconds;
        let memory_bytes = self.limits.memory_mb * 1024 * 1024;

        unsafe {
            cmd.pre_exec(move || {
                // New process group so a timeout can kill the whole tree.
                libc::setpgid(0, 0);

                // macOS does not honor RLIMIT_AS, skip it there.
                #[cfg(not(target_os = "macos"))]
                {
                    let rlimit = libc::rlimit {
                        rlim_cur: memory_bytes as libc::rlim_t,
                        rlim_max: memory_bytes as libc::rlim_t,
                    };
                    if libc::setrlimit(libc::RLIMIT_AS, &rlimit) != 0 {
                        return Err(std::io::Error::last_os_error());
                    }
                }

                let rlimit = libc::rlimit {
                    rlim_cur: cpu_seconds as libc::rlim_t,
                    rlim_max: cpu_seconds as libc::rlim_t,
                };
                if libc::setrlimit(libc::RLIMIT_CPU, &rlimit) != 0 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
    }

    #[cfg(not(unix))]
    fn apply_resource_limits(&self, _cmd: &mut Command) {
        // Windows would use Job Objects; the timeout is the only cap there.
    }
}

#[async_trait]
impl SnippetExecutor for PythonExecutor {
    async fn execute(
        &self,
        snippet: &CodeSnippet,
        namespace: ExecutionNamespace,
    ) -> Result<ExecutionOutcome> {
        let workspace = tempfile::tempdir()?;
        let output_dir = workspace.path().to_string_lossy().to_string();
        let wrapper = self.generate_wrapper(snippet, &namespace, &output_dir)?;
        debug!(python = %self.python_path.display(), "executing snippet");

        let mut cmd = Command::new(&self.python_path);
        cmd.arg("-c")
            .arg(&wrapper)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("PYTHONIOENCODING", "utf-8")
            .env("MPLBACKEND", "Agg")
            .env("OMP_NUM_THREADS", self.limits.max_threads.to_string())
            .env("OPENBLAS_NUM_THREADS", self.limits.max_threads.to_string())
            .env("MKL_NUM_THREADS", self.limits.max_threads.to_string());
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        self.apply_resource_limits(&mut cmd);

        let child = cmd.spawn()?;
        let pid = child.id();

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(PlotError::IoError(e)),
            Err(_) => {
                // Timeout: kill the whole process group.
                #[cfg(unix)]
                if let Some(pid) = pid {
                    unsafe {
                        libc::kill(-(pid as i32), libc::SIGKILL);
                    }
                }
                warn!("snippet execution timed out after {:?}", self.timeout);
                return Err(PlotError::Timeout);
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let report = parse_wrapper_output(&stdout).ok_or_else(|| {
            if stderr.contains("MemoryError") {
                PlotError::ExecutionError("MemoryError: memory limit exceeded".to_string())
            } else {
                PlotError::ExecutionError(stderr.trim().to_string())
            }
        })?;

        if let Some(error) = report.error {
            return Err(PlotError::ExecutionError(error));
        }

        let plot_png = match report.plot {
            Some(name) => {
                let path = workspace.path().join(name);
                let bytes = std::fs::read(&path)?;
                info!(bytes = bytes.len(), "snippet produced a chart");
                Some(bytes)
            }
            None => None,
        };

        Ok(ExecutionOutcome {
            plot_png,
            stdout: report.stdout,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WrapperReport {
    stdout: Option<String>,
    plot: Option<String>,
    error: Option<String>,
}

/// Extracts the structured report between the sentinel markers.
fn parse_wrapper_output(stdout: &str) -> Option<WrapperReport> {
    let start = stdout.find("OUTPUT_JSON_START")?;
    let end = stdout.find("OUTPUT_JSON_END")?;
    let json_str = stdout[start + "OUTPUT_JSON_START".len()..end].trim();
    serde_json::from_str(json_str).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snippet(code: &str) -> CodeSnippet {
        CodeSnippet::new(code).unwrap()
    }

    #[test]
    fn namespace_renders_bindings_in_order() {
        let ns = ExecutionNamespace::for_dataframe("/data/houses.csv");
        let rendered = ns.render_bindings().unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("pd.read_csv(\"/data/houses.csv\")"));
        assert_eq!(lines[1], "_bindings[\"pd\"] = pd");
        assert_eq!(lines[2], "_bindings[\"plt\"] = plt");
        assert_eq!(ns.names().collect::<Vec<_>>(), vec!["df", "pd", "plt"]);
    }

    #[test]
    fn scalar_bindings_round_trip_through_json() {
        let ns = ExecutionNamespace::new().bind(
            "threshold",
            NamespaceValue::Scalar(serde_json::json!(0.5)),
        );
        let rendered = ns.render_bindings().unwrap();
        assert_eq!(rendered, "_bindings[\"threshold\"] = json.loads(\"0.5\")");
    }

    #[test]
    fn wrapper_embeds_snippet_as_literal() {
        let executor = PythonExecutor {
            python_path: PathBuf::from("python3"),
            limits: ResourceLimits::default(),
            timeout: Duration::from_secs(60),
            env_vars: HashMap::new(),
        };
        let ns = ExecutionNamespace::for_dataframe("/tmp/x.csv");
        let code = "df['a'].plot(kind='bar')\nplt.show()";
        let wrapper = executor
            .generate_wrapper(&snippet(code), &ns, "/tmp/ws")
            .unwrap();
        // The snippet crosses as a JSON string literal; quotes cannot break
        // out of the wrapper.
        assert!(wrapper.contains(r#"_snippet = "df['a'].plot(kind='bar')\nplt.show()""#));
        assert!(wrapper.contains("OUTPUT_JSON_START"));
        assert!(wrapper.contains(r#"matplotlib.use("Agg")"#));
        assert!(wrapper.contains(r#""__import__""#));
    }

    #[test]
    fn parses_wrapper_report() {
        let stdout = "noise before\nOUTPUT_JSON_START\n{\"stdout\": \"42\\n\", \"plot\": \"plot.png\", \"error\": null}\nOUTPUT_JSON_END\n";
        let report = parse_wrapper_output(stdout).unwrap();
        assert_eq!(report.stdout.as_deref(), Some("42\n"));
        assert_eq!(report.plot.as_deref(), Some("plot.png"));
        assert!(report.error.is_none());
    }

    #[test]
    fn missing_markers_yield_none() {
        assert!(parse_wrapper_output("Traceback (most recent call last)").is_none());
    }

    #[test]
    fn wrapper_error_becomes_execution_error() {
        let stdout = "OUTPUT_JSON_START\n{\"stdout\": null, \"plot\": null, \"error\": \"KeyError: 'missing column'\"}\nOUTPUT_JSON_END\n";
        let report = parse_wrapper_output(stdout).unwrap();
        assert_eq!(report.error.as_deref(), Some("KeyError: 'missing column'"));
    }
}
