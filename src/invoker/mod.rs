//! Analyzer invocation
//!
//! Two interchangeable ways of running the SECBIT compiler: spawning a native `solc`, or
//! calling an embedded `compileJSON` entry point. The choice is made once when
//! configuration is resolved. Callers only see a future that yields raw findings, so the
//! asynchronous process path and the synchronous embedded path share one contract.

pub mod external;
pub mod in_process;

pub use external::ExternalSolc;
pub use in_process::{
    BackendUnavailable, CompileInput, CompileJson, InProcessCompiler, UnavailableCompiler,
};

use crate::{
    analysis::{AnalysisJob, AnalysisResult},
    config::SecbitConfig,
    proto::RawFinding,
};
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub enum AnalyzerInvoker {
    External(ExternalSolc),
    InProcess(InProcessCompiler),
}

impl AnalyzerInvoker {
    /// A configured `solc` path selects the native binary; otherwise the embedded backend.
    pub fn from_config(config: &SecbitConfig, embedded: Arc<dyn CompileJson>) -> Self {
        match config.solc_path() {
            Some(binary) => {
                info!("Using external compiler at {}", binary.display());
                Self::External(ExternalSolc::new(binary.to_path_buf()))
            }
            None => {
                info!("No solc configured, using embedded compiler");
                Self::InProcess(InProcessCompiler::new(embedded))
            }
        }
    }

    pub async fn invoke(&self, job: &AnalysisJob) -> AnalysisResult<Vec<RawFinding>> {
        match self {
            Self::External(solc) => solc.invoke(job).await,
            Self::InProcess(compiler) => compiler.invoke(job).await,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::External(solc) => format!("external solc ({})", solc.binary().display()),
            Self::InProcess(_) => "embedded compiler".to_string(),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_solc_path_selects_external() {
        let config = SecbitConfig {
            solc: Some(PathBuf::from("/usr/local/bin/solc")),
            ..Default::default()
        };

        let invoker = AnalyzerInvoker::from_config(&config, Arc::new(UnavailableCompiler));

        assert!(invoker.is_external());
        assert!(invoker.describe().contains("/usr/local/bin/solc"));
    }

    #[test]
    fn test_missing_or_empty_solc_selects_in_process() {
        let config = SecbitConfig::default();
        let invoker = AnalyzerInvoker::from_config(&config, Arc::new(UnavailableCompiler));
        assert!(!invoker.is_external());

        let config = SecbitConfig {
            solc: Some(PathBuf::new()),
            ..Default::default()
        };
        let invoker = AnalyzerInvoker::from_config(&config, Arc::new(UnavailableCompiler));
        assert!(!invoker.is_external());
        assert_eq!(invoker.describe(), "embedded compiler");
    }
}
