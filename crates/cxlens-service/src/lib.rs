//! Pipeline coordination.
//!
//! Two request flows, each a straight sequence that stops at the first
//! failure:
//!
//! - analyze: submission present → store → invoke engine → validate stdout,
//!   with the stored file released whatever the outcome;
//! - report: validate a caller-supplied result body → render.
//!
//! [`Pipeline`] holds no per-request state and is shared across requests.

pub mod config;
pub mod http;
mod multipart;

pub use config::{ConfigError, ServiceConfig};

use cxlens_engine::{AnalysisEngine, EngineError, invoke};
use cxlens_report::{RenderError, ReportArtifact, render};
use cxlens_schema::{AnalysisResult, SchemaError, validate};
use cxlens_store::{StoreError, TempSource, TempSourceStore};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use thiserror::Error;

/// One uploaded source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub filename: Option<String>,
    pub bytes: Vec<u8>,
}

impl Submission {
    pub fn new(filename: Option<String>, bytes: Vec<u8>) -> Self {
        Self { filename, bytes }
    }
}

/// Where a payload that failed schema validation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOrigin {
    EngineOutput,
    ReportBody,
}

impl Display for SchemaOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EngineOutput => write!(f, "analyzer output"),
            Self::ReportBody => write!(f, "report body"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no file provided")]
    MissingInput,

    #[error("temporary storage failed: {0}")]
    Storage(#[from] StoreError),

    #[error("{0}")]
    Execution(#[from] EngineError),

    #[error("{origin} failed schema validation: {error}")]
    Schema {
        origin: SchemaOrigin,
        #[source]
        error: SchemaError,
    },

    #[error("report rendering failed: {0}")]
    Render(#[from] RenderError),
}

impl PipelineError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingInput => "missing_input",
            Self::Storage(_) => "storage_failure",
            Self::Execution(_) => "execution_failure",
            Self::Schema { .. } => "schema_failure",
            Self::Render(_) => "render_failure",
        }
    }
}

/// Store → invoke → validate for uploads; validate → render for reports.
#[derive(Clone)]
pub struct Pipeline {
    store: TempSourceStore,
    engine: Arc<dyn AnalysisEngine>,
}

impl Pipeline {
    pub fn new(store: TempSourceStore, engine: Arc<dyn AnalysisEngine>) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &TempSourceStore {
        &self.store
    }

    pub fn engine(&self) -> &dyn AnalysisEngine {
        self.engine.as_ref()
    }

    /// Analyze one submission.
    ///
    /// The stored source is released before returning. A release failure
    /// only surfaces when nothing else failed first.
    pub async fn analyze(
        &self,
        submission: Option<Submission>,
    ) -> Result<AnalysisResult, PipelineError> {
        let submission = submission.ok_or(PipelineError::MissingInput)?;
        tracing::info!(
            filename = submission.filename.as_deref().unwrap_or("(unnamed)"),
            bytes = submission.bytes.len(),
            engine = %self.engine.describe(),
            "analysis requested"
        );

        let source = self.store_off_worker(submission.bytes).await?;
        let outcome = self.run_engine(&source).await;
        let released = source.release();

        match (outcome, released) {
            (Ok(result), Ok(())) => {
                tracing::info!(
                    metrics = result.summary().len(),
                    functions = result.functions().len(),
                    "analysis complete"
                );
                Ok(result)
            }
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                tracing::warn!(error = %release_err, "temp source release failed after earlier failure");
                Err(err)
            }
        }
    }

    /// File creation and the write run on the blocking pool. If the caller
    /// is cancelled meanwhile, the guard is dropped there and removes the file.
    async fn store_off_worker(&self, bytes: Vec<u8>) -> Result<TempSource, StoreError> {
        let store = self.store.clone();
        let root = store.root().display().to_string();
        tokio::task::spawn_blocking(move || store.store(&bytes))
            .await
            .unwrap_or_else(|err| {
                Err(StoreError::Create {
                    path: root,
                    source: std::io::Error::other(err),
                })
            })
    }

    async fn run_engine(&self, source: &TempSource) -> Result<AnalysisResult, PipelineError> {
        let stdout = invoke(self.engine.as_ref(), source.path()).await?;
        validate(&stdout).map_err(|error| {
            tracing::warn!(reason = %error, "analyzer output rejected");
            PipelineError::Schema {
                origin: SchemaOrigin::EngineOutput,
                error,
            }
        })
    }
}

/// Render a report from a caller-supplied analysis result body.
pub fn report(body: &[u8]) -> Result<ReportArtifact, PipelineError> {
    let result = validate(body).map_err(|error| PipelineError::Schema {
        origin: SchemaOrigin::ReportBody,
        error,
    })?;
    let artifact = render(&result)?;
    tracing::info!(
        digest = %artifact.digest(),
        pages = artifact.page_count(),
        bytes = artifact.len(),
        "report rendered"
    );
    Ok(artifact)
}

/// Validate stored analyzer output without running the engine.
pub fn validate_output(bytes: &[u8]) -> Result<AnalysisResult, PipelineError> {
    validate(bytes).map_err(|error| PipelineError::Schema {
        origin: SchemaOrigin::EngineOutput,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cxlens_engine::{EngineOutput, EngineStatus};
    use std::collections::BTreeSet;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const VALID: &str = r#"{"summary": {"LOC": 120, "avg_complexity": 3.2}, "functions": [{"name": "main", "complexity": 5}]}"#;

    enum Behavior {
        Canned(EngineOutput),
        TimeOut,
        Hang,
    }

    /// Fake analyzer that records every path it was handed and what the file
    /// contained at that moment.
    struct FakeEngine {
        behavior: Behavior,
        calls: AtomicUsize,
        seen: Mutex<Vec<(PathBuf, Vec<u8>)>>,
    }

    impl FakeEngine {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn exiting(code: i32, stdout: &str, stderr: &str) -> Arc<Self> {
            Self::new(Behavior::Canned(EngineOutput {
                stdout: stdout.as_bytes().to_vec(),
                stderr: stderr.as_bytes().to_vec(),
                status: EngineStatus::exited(code),
            }))
        }

        fn seen_paths(&self) -> Vec<PathBuf> {
            self.seen
                .lock()
                .expect("seen lock")
                .iter()
                .map(|(p, _)| p.clone())
                .collect()
        }
    }

    #[async_trait]
    impl AnalysisEngine for FakeEngine {
        async fn run(&self, source: &Path) -> Result<EngineOutput, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let contents = std::fs::read(source).unwrap_or_default();
            self.seen
                .lock()
                .expect("seen lock")
                .push((source.to_path_buf(), contents));
            match &self.behavior {
                Behavior::Canned(output) => Ok(output.clone()),
                Behavior::TimeOut => Err(EngineError::TimedOut {
                    program: "fake".to_string(),
                    timeout: Duration::from_secs(1),
                }),
                Behavior::Hang => {
                    std::future::pending::<()>().await;
                    unreachable!("pending never resolves")
                }
            }
        }

        fn describe(&self) -> String {
            "fake".to_string()
        }
    }

    struct TempRoot(PathBuf);

    impl TempRoot {
        fn new(prefix: &str) -> Self {
            Self(std::env::temp_dir().join(format!(
                "cxlens-service-{prefix}-{}",
                uuid::Uuid::new_v4()
            )))
        }
    }

    impl Drop for TempRoot {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn pipeline(root: &TempRoot, engine: Arc<FakeEngine>) -> Pipeline {
        Pipeline::new(TempSourceStore::new(&root.0, ".cpp"), engine)
    }

    fn submission(text: &str) -> Option<Submission> {
        Some(Submission::new(
            Some("main.cpp".to_string()),
            text.as_bytes().to_vec(),
        ))
    }

    #[tokio::test]
    async fn missing_submission_never_reaches_engine() {
        let root = TempRoot::new("missing");
        let engine = FakeEngine::exiting(0, VALID, "");
        let err = pipeline(&root, engine.clone())
            .analyze(None)
            .await
            .expect_err("missing input should fail");
        assert!(matches!(err, PipelineError::MissingInput));
        assert_eq!(err.to_string(), "no file provided");
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_analysis_returns_result_and_cleans_up() {
        let root = TempRoot::new("ok");
        let engine = FakeEngine::exiting(0, VALID, "");
        let result = pipeline(&root, engine.clone())
            .analyze(submission("int main() { return 0; }"))
            .await
            .expect("analysis should succeed");

        assert_eq!(result.summary().names(), vec!["LOC", "avg_complexity"]);
        assert_eq!(result.functions()[0].name, "main");

        let seen = engine.seen.lock().expect("seen lock").clone();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, b"int main() { return 0; }");
        assert_eq!(seen[0].0.extension().and_then(|e| e.to_str()), Some("cpp"));
        assert!(!seen[0].0.exists());
    }

    #[tokio::test]
    async fn malformed_output_is_schema_failure_with_raw_text() {
        let root = TempRoot::new("schema");
        let engine = FakeEngine::exiting(0, "not json", "");
        let err = pipeline(&root, engine.clone())
            .analyze(submission("x"))
            .await
            .expect_err("not json should fail");

        match &err {
            PipelineError::Schema { origin, error } => {
                assert_eq!(*origin, SchemaOrigin::EngineOutput);
                assert_eq!(error.raw(), "not json");
            }
            other => panic!("expected schema failure, got {other:?}"),
        }
        assert_eq!(err.category(), "schema_failure");
        assert!(engine.seen_paths().iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn nonzero_exit_is_execution_failure_with_diagnostic() {
        let root = TempRoot::new("exec");
        let engine = FakeEngine::exiting(1, VALID, "parse error on line 4");
        let err = pipeline(&root, engine.clone())
            .analyze(submission("x"))
            .await
            .expect_err("exit 1 should fail");

        match &err {
            PipelineError::Execution(inner) => {
                assert_eq!(inner.diagnostic(), "parse error on line 4");
                assert_eq!(inner.exit_code(), Some(1));
            }
            other => panic!("expected execution failure, got {other:?}"),
        }
        assert!(engine.seen_paths().iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn engine_timeout_is_execution_failure() {
        let root = TempRoot::new("timeout");
        let engine = FakeEngine::new(Behavior::TimeOut);
        let err = pipeline(&root, engine.clone())
            .analyze(submission("x"))
            .await
            .expect_err("timeout should fail");
        assert_eq!(err.category(), "execution_failure");
        assert!(err.to_string().contains("timed out"));
        assert!(engine.seen_paths().iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn unusable_temp_root_is_storage_failure() {
        let root = TempRoot::new("storage");
        std::fs::write(&root.0, b"blocker").expect("blocker file");
        let engine = FakeEngine::exiting(0, VALID, "");
        let err = pipeline(&root, engine.clone())
            .analyze(submission("x"))
            .await
            .expect_err("storage should fail");
        assert_eq!(err.category(), "storage_failure");
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        let _ = std::fs::remove_file(&root.0);
    }

    #[tokio::test]
    async fn concurrent_submissions_get_distinct_temp_files() {
        let root = TempRoot::new("concurrent");
        let engine = FakeEngine::exiting(0, VALID, "");
        let pipeline = pipeline(&root, engine.clone());

        let runs = (0..6).map(|i| {
            let pipeline = pipeline.clone();
            async move { pipeline.analyze(submission(&format!("source {i}"))).await }
        });
        let results = futures_join_all(runs).await;
        assert!(results.iter().all(Result::is_ok));

        let seen = engine.seen.lock().expect("seen lock").clone();
        let paths: BTreeSet<_> = seen.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(paths.len(), 6);
        let contents: BTreeSet<_> = seen.iter().map(|(_, c)| c.clone()).collect();
        assert_eq!(contents.len(), 6);
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn aborted_request_removes_temp_file() {
        let root = TempRoot::new("abort");
        let engine = FakeEngine::new(Behavior::Hang);
        let pipeline = pipeline(&root, engine.clone());

        let task = tokio::spawn(async move { pipeline.analyze(submission("x")).await });
        while engine.calls.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let path = engine.seen_paths()[0].clone();
        assert!(path.exists());

        task.abort();
        let joined = task.await;
        assert!(joined.expect_err("task was aborted").is_cancelled());
        assert!(!path.exists());
    }

    #[test]
    fn report_renders_valid_body() {
        let artifact = report(VALID.as_bytes()).expect("report should render");
        assert_eq!(artifact.media_type(), "application/pdf");
        assert!(artifact.bytes().starts_with(b"%PDF"));
    }

    #[test]
    fn report_rejects_malformed_body_before_rendering() {
        let err = report(br#"{"summary": {"LOC": "many"}, "functions": []}"#)
            .expect_err("bad body should fail");
        match err {
            PipelineError::Schema { origin, error } => {
                assert_eq!(origin, SchemaOrigin::ReportBody);
                assert!(error.to_string().contains("summary.LOC"));
            }
            other => panic!("expected schema failure, got {other:?}"),
        }
    }

    #[test]
    fn validate_output_accepts_engine_payload() {
        let result = validate_output(VALID.as_bytes()).expect("valid output");
        assert_eq!(result.functions().len(), 1);
    }

    async fn futures_join_all<F, T>(futures: impl Iterator<Item = F>) -> Vec<T>
    where
        F: std::future::Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = futures.map(tokio::spawn).collect();
        let mut out = Vec::with_capacity(handles.len());
        for handle in handles {
            out.push(handle.await.expect("task should not panic"));
        }
        out
    }
}
