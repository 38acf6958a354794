//! Analysis messages
//!
//! Typed messages between the LSP thread and the analysis worker, so channel traffic is
//! checked at compile time instead of passing `serde_json::Value` around.

use super::errors::AnalysisResult;
use crate::{invoker::AnalyzerInvoker, proto::RawFinding};
use lsp_types::Url;
use std::{path::PathBuf, sync::Arc, time::Duration};
use uuid::Uuid;

/// Analyzer switches derived from configuration for a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalyzerOptions {
    pub no_smt: bool,
    pub as_erc20: bool,
    /// Already filtered against the rule registry.
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub id: Uuid,
    pub uri: Url,
    pub path: PathBuf,
    pub version: Option<i32>,
    pub content: String,
    pub options: AnalyzerOptions,
}

impl AnalysisJob {
    pub fn new(
        uri: Url,
        path: PathBuf,
        version: Option<i32>,
        content: String,
        options: AnalyzerOptions,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            uri,
            path,
            version,
            content,
            options,
        }
    }
}

#[derive(Debug)]
pub struct AnalysisOutcome {
    pub job_id: Uuid,
    pub uri: Url,
    pub version: Option<i32>,
    pub duration: Duration,
    pub result: AnalysisResult<Vec<RawFinding>>,
}

#[derive(Debug)]
pub enum AnalysisCommand {
    Analyze {
        job: AnalysisJob,
        invoker: Arc<AnalyzerInvoker>,
        response_tx: std::sync::mpsc::Sender<AnalysisOutcome>,
    },
    Shutdown,
}
