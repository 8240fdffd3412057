//! Analysis engine adapter.
//!
//! The complexity analyzer is an external program. This crate only holds it
//! to its process contract: one positional path argument, analysis JSON on
//! stdout and exit 0 on success, a human-readable diagnostic on stderr
//! otherwise. It never looks inside stdout.
//!
//! [`AnalysisEngine`] is the seam: [`ProcessEngine`] runs the real program,
//! tests substitute fakes that return canned output.

use async_trait::async_trait;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How the engine process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineStatus {
    code: Option<i32>,
}

impl EngineStatus {
    pub fn exited(code: i32) -> Self {
        Self { code: Some(code) }
    }

    /// Terminated without an exit code (for example by a signal).
    pub fn terminated() -> Self {
        Self { code: None }
    }

    pub fn code(&self) -> Option<i32> {
        self.code
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl Display for EngineStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "termination without exit code"),
        }
    }
}

/// Everything captured from one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub status: EngineStatus,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to launch analysis engine {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed while waiting for analysis engine {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("analysis engine timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("analysis engine exited with {status}: {diagnostic}")]
    Failed {
        status: EngineStatus,
        diagnostic: String,
    },
}

impl EngineError {
    /// Text surfaced to callers: the engine's stderr for failed runs, the
    /// error message otherwise.
    pub fn diagnostic(&self) -> String {
        match self {
            Self::Failed { diagnostic, .. } => diagnostic.clone(),
            other => other.to_string(),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed { status, .. } => status.code(),
            _ => None,
        }
    }
}

/// Capability to run the analyzer against one stored source file.
///
/// `run` returns `Err` only when no exit status could be observed (launch
/// failure, timeout). A nonzero exit is still `Ok`; [`invoke`] applies the
/// success rule.
#[async_trait]
pub trait AnalysisEngine: Send + Sync {
    async fn run(&self, source: &Path) -> Result<EngineOutput, EngineError>;

    /// Short label for logs.
    fn describe(&self) -> String;
}

/// Runs the analyzer as a subordinate process with a bounded wait.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    timeout: Duration,
}

impl ProcessEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl AnalysisEngine for ProcessEngine {
    async fn run(&self, source: &Path) -> Result<EngineOutput, EngineError> {
        let program = self.program.display().to_string();
        let child = Command::new(&self.program)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Launch {
                program: program.clone(),
                source,
            })?;

        tracing::debug!(program = %program, source = %source.display(), "analysis engine launched");

        // Dropping the wait future on timeout (or on caller cancellation)
        // drops the child, and kill_on_drop terminates it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(EngineError::Wait { program, source }),
            Err(_) => {
                tracing::warn!(program = %program, timeout = ?self.timeout, "analysis engine timed out; killed");
                return Err(EngineError::TimedOut {
                    program,
                    timeout: self.timeout,
                });
            }
        };

        let status = match output.status.code() {
            Some(code) => EngineStatus::exited(code),
            None => EngineStatus::terminated(),
        };
        tracing::debug!(program = %program, %status, stdout_bytes = output.stdout.len(), "analysis engine finished");

        Ok(EngineOutput {
            stdout: output.stdout,
            stderr: output.stderr,
            status,
        })
    }

    fn describe(&self) -> String {
        self.program.display().to_string()
    }
}

/// Run the engine and apply the process contract: exit 0 yields the raw
/// stdout bytes, anything else is a failure carrying stderr.
pub async fn invoke(engine: &dyn AnalysisEngine, source: &Path) -> Result<Vec<u8>, EngineError> {
    let output = engine.run(source).await?;
    if output.status.success() {
        return Ok(output.stdout);
    }

    let diagnostic = diagnostic_text(&output.stderr);
    tracing::info!(engine = %engine.describe(), status = %output.status, diagnostic = %diagnostic, "analysis engine failed");
    Err(EngineError::Failed {
        status: output.status,
        diagnostic,
    })
}

fn diagnostic_text(stderr: &[u8]) -> String {
    String::from_utf8_lossy(stderr).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedEngine(EngineOutput);

    #[async_trait]
    impl AnalysisEngine for CannedEngine {
        async fn run(&self, _source: &Path) -> Result<EngineOutput, EngineError> {
            Ok(self.0.clone())
        }

        fn describe(&self) -> String {
            "canned".to_string()
        }
    }

    fn canned(stdout: &str, stderr: &str, status: EngineStatus) -> CannedEngine {
        CannedEngine(EngineOutput {
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            status,
        })
    }

    #[tokio::test]
    async fn invoke_returns_stdout_on_exit_zero() {
        let engine = canned(r#"{"summary":{}}"#, "warning: ignored", EngineStatus::exited(0));
        let stdout = invoke(&engine, Path::new("/tmp/x.cpp"))
            .await
            .expect("exit 0 should succeed");
        assert_eq!(stdout, br#"{"summary":{}}"#);
    }

    #[tokio::test]
    async fn invoke_surfaces_stderr_not_stdout_on_nonzero_exit() {
        let engine = canned("partial output", "parse error on line 4", EngineStatus::exited(1));
        let err = invoke(&engine, Path::new("/tmp/x.cpp"))
            .await
            .expect_err("exit 1 should fail");
        assert_eq!(err.diagnostic(), "parse error on line 4");
        assert_eq!(err.exit_code(), Some(1));
        assert!(matches!(err, EngineError::Failed { .. }));
    }

    #[tokio::test]
    async fn invoke_treats_missing_exit_code_as_failure() {
        let engine = canned("{}", "killed", EngineStatus::terminated());
        let err = invoke(&engine, Path::new("/tmp/x.cpp"))
            .await
            .expect_err("signal termination should fail");
        assert_eq!(err.exit_code(), None);
    }

    #[test]
    fn diagnostic_text_trims_trailing_newline_only() {
        assert_eq!(diagnostic_text(b"  bad input\n"), "  bad input");
    }

    #[tokio::test]
    async fn process_engine_reports_missing_program() {
        let engine = ProcessEngine::new("/nonexistent/cxlens-analyzer");
        let err = engine
            .run(Path::new("/tmp/x.cpp"))
            .await
            .expect_err("missing program should fail");
        assert!(matches!(err, EngineError::Launch { .. }));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        struct ScriptGuard {
            dir: PathBuf,
        }

        impl ScriptGuard {
            fn new(prefix: &str, body: &str) -> Self {
                let dir = std::env::temp_dir().join(format!(
                    "cxlens-engine-{prefix}-{}",
                    uuid::Uuid::new_v4()
                ));
                fs::create_dir_all(&dir).expect("script dir should be created");
                let script = dir.join("engine.sh");
                fs::write(&script, format!("#!/bin/sh\n{body}\n")).expect("script written");
                fs::set_permissions(&script, fs::Permissions::from_mode(0o755))
                    .expect("script made executable");
                Self { dir }
            }

            fn script(&self) -> PathBuf {
                self.dir.join("engine.sh")
            }
        }

        impl Drop for ScriptGuard {
            fn drop(&mut self) {
                let _ = fs::remove_dir_all(&self.dir);
            }
        }

        #[tokio::test]
        async fn passes_source_path_as_sole_argument() {
            let guard = ScriptGuard::new("args", r#"printf '%s|%s' "$#" "$1""#);
            let engine = ProcessEngine::new(guard.script());
            let out = engine
                .run(Path::new("/tmp/sample.cpp"))
                .await
                .expect("script should run");
            assert!(out.status.success());
            assert_eq!(String::from_utf8_lossy(&out.stdout), "1|/tmp/sample.cpp");
        }

        #[tokio::test]
        async fn captures_stderr_and_exit_code() {
            let guard = ScriptGuard::new("fail", "echo 'parse error on line 4' >&2\nexit 1");
            let engine = ProcessEngine::new(guard.script());
            let err = invoke(&engine, Path::new("/tmp/sample.cpp"))
                .await
                .expect_err("nonzero exit should fail");
            assert_eq!(err.diagnostic(), "parse error on line 4");
            assert_eq!(err.exit_code(), Some(1));
        }

        #[tokio::test]
        async fn hung_engine_is_killed_after_timeout() {
            let guard = ScriptGuard::new("hang", "exec sleep 30");
            let engine = ProcessEngine::new(guard.script()).with_timeout(Duration::from_millis(200));
            let started = std::time::Instant::now();
            let err = engine
                .run(Path::new("/tmp/sample.cpp"))
                .await
                .expect_err("hung engine should time out");
            assert!(matches!(err, EngineError::TimedOut { .. }));
            assert!(err.diagnostic().contains("timed out"));
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }
}
