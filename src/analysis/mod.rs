//! Analysis orchestration
//!
//! Runs analyzer invocations off the LSP message loop. The manager owns a tokio runtime on
//! its own thread and spawns every job as an independent task: jobs are not queued behind
//! each other, not deduplicated and not cancelled individually. Whichever job finishes
//! last for a document decides what the editor shows.

pub mod errors;
pub mod messages;

pub use errors::{AnalysisError, AnalysisResult};
pub use messages::{AnalysisCommand, AnalysisJob, AnalysisOutcome, AnalyzerOptions};

use crate::invoker::AnalyzerInvoker;
use anyhow::{Context, Result};
use std::{sync::Arc, time::Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct AnalysisManager {
    runtime: tokio::runtime::Runtime,
}

impl AnalysisManager {
    pub fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("secbit-analysis")
            .build()
            .context("Failed to create analysis runtime")?;

        Ok(Self { runtime })
    }

    pub fn run(self, command_rx: std::sync::mpsc::Receiver<AnalysisCommand>) {
        self.runtime.block_on(async {
            let shutdown_token = CancellationToken::new();
            let mut active_tasks = JoinSet::new();

            loop {
                match command_rx.recv() {
                    Ok(AnalysisCommand::Shutdown) => {
                        info!("Analysis shutdown requested");
                        shutdown_token.cancel();
                        break;
                    }
                    Ok(AnalysisCommand::Analyze {
                        job,
                        invoker,
                        response_tx,
                    }) => {
                        Self::spawn_analysis_task(
                            &mut active_tasks,
                            shutdown_token.clone(),
                            invoker,
                            job,
                            response_tx,
                        );
                    }
                    Err(_) => {
                        info!("Command channel disconnected, shutting down");
                        shutdown_token.cancel();
                        break;
                    }
                }

                while let Some(result) = active_tasks.try_join_next() {
                    match result {
                        Ok(()) => debug!("Analysis task completed"),
                        Err(e) if e.is_cancelled() => debug!("Analysis task was cancelled"),
                        Err(e) => warn!("Analysis task panicked: {}", e),
                    }
                }
            }

            while active_tasks.join_next().await.is_some() {}
            info!("AnalysisManager shutdown complete");
        });
    }

    fn spawn_analysis_task(
        tasks: &mut JoinSet<()>,
        shutdown: CancellationToken,
        invoker: Arc<AnalyzerInvoker>,
        job: AnalysisJob,
        response_tx: std::sync::mpsc::Sender<AnalysisOutcome>,
    ) {
        tasks.spawn(async move {
            let start = Instant::now();
            info!(
                "Started SECBIT analysis {} of {} using {}",
                job.id,
                job.uri,
                invoker.describe()
            );

            tokio::select! {
                result = invoker.invoke(&job) => {
                    let duration = start.elapsed();
                    match &result {
                        Ok(findings) => info!(
                            "Analysis {} finished in {:?} with {} findings",
                            job.id,
                            duration,
                            findings.len()
                        ),
                        Err(e) => warn!("Analysis {} failed after {:?}: {}", job.id, duration, e),
                    }

                    let outcome = AnalysisOutcome {
                        job_id: job.id,
                        uri: job.uri,
                        version: job.version,
                        duration,
                        result,
                    };

                    if response_tx.send(outcome).is_err() {
                        debug!("Outcome receiver dropped before analysis completed");
                    }
                }
                _ = shutdown.cancelled() => {
                    debug!("Analysis {} abandoned at shutdown", job.id);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{CompileInput, CompileJson, InProcessCompiler};
    use lsp_types::Url;
    use std::{path::PathBuf, sync::mpsc, thread, time::Duration};

    struct CannedCompiler(String);

    impl CompileJson for CannedCompiler {
        fn compile_json(&self, _input: &CompileInput<'_>) -> anyhow::Result<String> {
            Ok(self.0.clone())
        }
    }

    fn job(content: &str) -> AnalysisJob {
        AnalysisJob::new(
            Url::parse("file:///work/Token.sol").unwrap(),
            PathBuf::from("/work/Token.sol"),
            Some(3),
            content.to_string(),
            AnalyzerOptions::default(),
        )
    }

    fn in_process(payload: &str) -> Arc<AnalyzerInvoker> {
        Arc::new(AnalyzerInvoker::InProcess(InProcessCompiler::new(Arc::new(
            CannedCompiler(payload.to_string()),
        ))))
    }

    #[test]
    fn test_manager_creation() {
        assert!(AnalysisManager::new().is_ok());
    }

    #[test]
    fn test_manager_runs_jobs_and_shuts_down() {
        let (command_tx, command_rx) = mpsc::channel();
        let manager = AnalysisManager::new().unwrap();
        let worker = thread::spawn(move || manager.run(command_rx));

        let payload = r#"{"errors": [{"tag": "throw", "desc": "use revert",
            "startline": 2, "startcolumn": 1, "endline": 2, "endcolumn": 6}]}"#;
        let (response_tx, response_rx) = mpsc::channel();
        let submitted = job("contract A {}");
        let job_id = submitted.id;

        command_tx
            .send(AnalysisCommand::Analyze {
                job: submitted,
                invoker: in_process(payload),
                response_tx,
            })
            .unwrap();

        let outcome = response_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("analysis outcome");

        assert_eq!(outcome.job_id, job_id);
        assert_eq!(outcome.version, Some(3));
        assert_eq!(outcome.result.unwrap().len(), 1);

        command_tx.send(AnalysisCommand::Shutdown).unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn test_manager_reports_failures() {
        let (command_tx, command_rx) = mpsc::channel();
        let manager = AnalysisManager::new().unwrap();
        let worker = thread::spawn(move || manager.run(command_rx));

        let (response_tx, response_rx) = mpsc::channel();
        command_tx
            .send(AnalysisCommand::Analyze {
                job: job("contract A {}"),
                invoker: in_process("{\"errors\": [tru"),
                response_tx,
            })
            .unwrap();

        let outcome = response_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("analysis outcome");

        assert!(matches!(
            outcome.result,
            Err(AnalysisError::MalformedPayload { .. })
        ));

        drop(command_tx);
        worker.join().unwrap();
    }
}
