//! Native compiler strategy
//!
//! Copies the document to a hidden file beside the original, runs the SECBIT `solc` against
//! the copy and reads the JSON report it writes next to it. Keeping the copy in the
//! document's directory lets relative imports resolve. Documents with no directory on disk
//! fall back to a scratch directory. The report file is removed after every
//! run, successful or not, and a missing report is never an error during cleanup.

use crate::{
    analysis::{AnalysisError, AnalysisJob, AnalysisResult, AnalyzerOptions},
    proto::{self, RawFinding},
};
use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};
use tokio::process::Command;
use tracing::{debug, info, warn};

const FALLBACK_FILE_NAME: &str = "input.sol";
const COPY_PREFIX: &str = ".secbit-";
const COPY_SUFFIX: &str = ".sol";

#[derive(Debug, Clone)]
pub struct ExternalSolc {
    binary: PathBuf,
}

impl ExternalSolc {
    pub fn new(binary: PathBuf) -> Self {
        Self { binary }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Command line for one run: `-o / --overwrite [--no-smt] (--secbit-tag T)* [--erc20]
    /// --secbit-warnings <output> <input>`.
    pub fn build_args(options: &AnalyzerOptions, output: &Path, input: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-o".into(), "/".into(), "--overwrite".into()];

        if options.no_smt {
            args.push("--no-smt".into());
        }

        for tag in &options.tags {
            args.push("--secbit-tag".into());
            args.push(tag.into());
        }

        if options.as_erc20 {
            args.push("--erc20".into());
        }

        args.push("--secbit-warnings".into());
        args.push(output.into());
        args.push(input.into());

        args
    }

    /// `<input>.err`, next to the input.
    pub fn report_path(input: &Path) -> PathBuf {
        let mut report = input.as_os_str().to_os_string();
        report.push(".err");
        PathBuf::from(report)
    }

    /// Runs the analyzer on a hidden copy placed beside the document, so relative imports
    /// resolve as they would for the file itself. Documents without a directory on disk
    /// are analyzed from a scratch directory instead.
    pub async fn invoke(&self, job: &AnalysisJob) -> AnalysisResult<Vec<RawFinding>> {
        match source_dir(job).await {
            Some(dir) => self.invoke_beside(&dir, job).await,
            None => {
                let workdir = tempfile::Builder::new().prefix("secbit-").tempdir()?;
                self.invoke_in(workdir.path(), job).await
            }
        }
    }

    /// Copies the document to `.secbit-XXXX.sol` inside `dir`; the copy is removed on return.
    pub async fn invoke_beside(
        &self,
        dir: &Path,
        job: &AnalysisJob,
    ) -> AnalysisResult<Vec<RawFinding>> {
        let copy = tempfile::Builder::new()
            .prefix(COPY_PREFIX)
            .suffix(COPY_SUFFIX)
            .tempfile_in(dir)?;

        debug!("Analyzing copy {}", copy.path().display());
        self.run(copy.path(), job).await
    }

    /// Runs the analyzer with `workdir` as scratch space for the source copy and report.
    pub async fn invoke_in(
        &self,
        workdir: &Path,
        job: &AnalysisJob,
    ) -> AnalysisResult<Vec<RawFinding>> {
        let file_name = job
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_else(|| FALLBACK_FILE_NAME.into());

        self.run(&workdir.join(file_name), job).await
    }

    async fn run(&self, input: &Path, job: &AnalysisJob) -> AnalysisResult<Vec<RawFinding>> {
        tokio::fs::write(input, job.content.as_bytes()).await?;

        let output = Self::report_path(input);
        let args = Self::build_args(&job.options, &output, input);

        info!(
            "Running {} {}",
            self.binary.display(),
            args.iter()
                .map(|arg| arg.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let result = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| AnalysisError::SpawnFailed {
                binary: self.binary.clone(),
                source,
            })?;

        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
        info!("solc exited with code {:?}", result.status.code());

        if !result.status.success() {
            remove_if_present(&output).await;
            if !stderr.is_empty() {
                warn!("Analysis failed:\n{}", stderr);
            }
            return Err(AnalysisError::NonZeroExit {
                code: result.status.code(),
                stderr,
            });
        }

        if !stderr.is_empty() {
            warn!("Analyzer reported on stderr:\n{}", stderr);
        }

        let payload = tokio::fs::read_to_string(&output).await;
        remove_if_present(&output).await;

        let payload = payload.map_err(|e| {
            AnalysisError::malformed(format!("cannot read {}: {}", output.display(), e))
        })?;

        let findings = proto::parse_external_report(&payload).map_err(|e| {
            AnalysisError::malformed(format!("`{}` report: {}", proto::EXTERNAL_REPORT_KEY, e))
        })?;

        debug!("Finished processing solc output: {} findings", findings.len());
        Ok(findings)
    }
}

async fn source_dir(job: &AnalysisJob) -> Option<PathBuf> {
    let dir = job.path.parent().filter(|dir| dir.is_absolute())?;
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => Some(dir.to_path_buf()),
        _ => None,
    }
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed analyzer report {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove analyzer report {}: {}", path.display(), e),
    }
}
