//! Embedded compiler strategy
//!
//! Calls a linked SECBIT compiler build through its `compileJSON` entry point. The call is
//! synchronous and returns the whole compiler output as one JSON string, with findings
//! under `errors`.
//!
//! The backend is a trait so that an embedding can provide the actual compiler. The
//! server binary does not bundle one and uses [`UnavailableCompiler`], which tells the user
//! to configure `solc` instead.

use crate::{
    analysis::{AnalysisError, AnalysisJob, AnalysisResult},
    proto::{self, RawFinding},
};
use anyhow::Result;
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};

/// Positional parameters of `compileJSON`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileInput<'a> {
    pub source: &'a str,
    pub optimize: bool,
    pub secbit_mode: bool,
    pub no_smt: bool,
    pub as_erc20: bool,
    /// Comma-joined tag list.
    pub tags: String,
}

pub trait CompileJson: Send + Sync {
    fn compile_json(&self, input: &CompileInput<'_>) -> Result<String>;
}

#[derive(Error, Debug)]
#[error("No embedded SECBIT compiler is available; set `secbit.solc` to a SECBIT solc binary")]
pub struct BackendUnavailable;

/// Backend for builds without an embedded compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableCompiler;

impl CompileJson for UnavailableCompiler {
    fn compile_json(&self, _input: &CompileInput<'_>) -> Result<String> {
        Err(BackendUnavailable.into())
    }
}

#[derive(Clone)]
pub struct InProcessCompiler {
    backend: Arc<dyn CompileJson>,
}

impl fmt::Debug for InProcessCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessCompiler").finish_non_exhaustive()
    }
}

impl InProcessCompiler {
    pub fn new(backend: Arc<dyn CompileJson>) -> Self {
        Self { backend }
    }

    /// The embedded build has no SMT solver, so `no_smt` is always set; only `asERC20`
    /// and the tag list come from configuration.
    pub fn compile_input(job: &AnalysisJob) -> CompileInput<'_> {
        CompileInput {
            source: &job.content,
            optimize: true,
            secbit_mode: true,
            no_smt: true,
            as_erc20: job.options.as_erc20,
            tags: job.options.tags.join(","),
        }
    }

    /// Runs the compile on the blocking pool; `compileJSON` holds its thread until done.
    pub async fn invoke(&self, job: &AnalysisJob) -> AnalysisResult<Vec<RawFinding>> {
        let backend = Arc::clone(&self.backend);
        let job = job.clone();

        tokio::task::spawn_blocking(move || Self::compile(backend.as_ref(), &job))
            .await
            .map_err(|e| AnalysisError::Backend {
                reason: format!("compile task did not finish: {}", e),
                notify: false,
            })?
    }

    fn compile(backend: &dyn CompileJson, job: &AnalysisJob) -> AnalysisResult<Vec<RawFinding>> {
        let input = Self::compile_input(job);
        info!(
            "Running embedded compiler on {} ({} bytes, tags: [{}])",
            job.uri,
            input.source.len(),
            input.tags
        );

        let output = backend
            .compile_json(&input)
            .map_err(|e| AnalysisError::Backend {
                notify: e.downcast_ref::<BackendUnavailable>().is_some(),
                reason: e.to_string(),
            })?;

        let findings = proto::parse_compile_output(&output).map_err(|e| {
            AnalysisError::malformed(format!("`{}` output: {}", proto::IN_PROCESS_OUTPUT_KEY, e))
        })?;

        debug!("Embedded compiler returned {} findings", findings.len());
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalyzerOptions;
    use lsp_types::Url;
    use std::{path::PathBuf, sync::Mutex};

    #[derive(Default)]
    struct RecordingCompiler {
        response: String,
        calls: Mutex<Vec<(String, bool, bool, bool, bool, String)>>,
    }

    impl CompileJson for RecordingCompiler {
        fn compile_json(&self, input: &CompileInput<'_>) -> Result<String> {
            self.calls.lock().unwrap().push((
                input.source.to_string(),
                input.optimize,
                input.secbit_mode,
                input.no_smt,
                input.as_erc20,
                input.tags.clone(),
            ));
            Ok(self.response.clone())
        }
    }

    struct FailingCompiler;

    impl CompileJson for FailingCompiler {
        fn compile_json(&self, _input: &CompileInput<'_>) -> Result<String> {
            Err(anyhow::anyhow!("memory access out of bounds"))
        }
    }

    fn job(options: AnalyzerOptions) -> AnalysisJob {
        AnalysisJob::new(
            Url::parse("file:///work/Vault.sol").unwrap(),
            PathBuf::from("/work/Vault.sol"),
            None,
            "contract Vault {}".to_string(),
            options,
        )
    }

    #[test]
    fn test_compile_input_parameters() {
        let job = job(AnalyzerOptions {
            no_smt: false,
            as_erc20: true,
            tags: vec!["reentrance".to_string(), "tx-origin".to_string()],
        });

        let input = InProcessCompiler::compile_input(&job);

        assert_eq!(input.source, "contract Vault {}");
        assert!(input.optimize);
        assert!(input.secbit_mode);
        assert!(input.no_smt);
        assert!(input.as_erc20);
        assert_eq!(input.tags, "reentrance,tx-origin");
    }

    #[tokio::test]
    async fn test_invoke_parses_errors_key() {
        let backend = Arc::new(RecordingCompiler {
            response: r#"{"errors": [{"tag": "reentrance", "desc": "possible reentrancy",
                "startline": 10, "startcolumn": 5, "endline": 10, "endcolumn": 20}]}"#
                .to_string(),
            ..Default::default()
        });
        let compiler = InProcessCompiler::new(backend.clone());

        let findings = compiler.invoke(&job(AnalyzerOptions::default())).await.unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].description, "possible reentrancy");

        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].5, "");
    }

    #[tokio::test]
    async fn test_invoke_malformed_output() {
        let backend = Arc::new(RecordingCompiler {
            response: "{\"errors\": [".to_string(),
            ..Default::default()
        });
        let compiler = InProcessCompiler::new(backend);

        let error = compiler.invoke(&job(AnalyzerOptions::default())).await.unwrap_err();

        assert!(matches!(error, AnalysisError::MalformedPayload { .. }));
        assert!(error.user_notice().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_backend_notifies_user() {
        let compiler = InProcessCompiler::new(Arc::new(UnavailableCompiler));

        let error = compiler.invoke(&job(AnalyzerOptions::default())).await.unwrap_err();

        let notice = error.user_notice().expect("user notice");
        assert!(notice.contains("secbit.solc"));
    }

    #[tokio::test]
    async fn test_backend_failure_is_log_only() {
        let compiler = InProcessCompiler::new(Arc::new(FailingCompiler));

        let error = compiler.invoke(&job(AnalyzerOptions::default())).await.unwrap_err();

        assert!(matches!(error, AnalysisError::Backend { notify: false, .. }));
        assert!(error.to_string().contains("out of bounds"));
    }
}
