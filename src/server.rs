//! LSP server implementation
//!
//! Routes protocol traffic to the components that do the work: the workspace keeps
//! document text, the analysis manager runs the compiler, the normalizer turns findings
//! into diagnostics. Handlers return quickly; analysis results are published from a
//! helper thread once the worker reports back.
//!
//! Every analysis ends in exactly one `publishDiagnostics` for its document. Failures
//! publish an empty set, so diagnostics from an earlier run never outlive a broken one.

use crate::{
    analysis::{AnalysisCommand, AnalysisJob, AnalysisOutcome},
    config::SecbitConfig,
    diagnostics::{self, DiagnosticStats},
    invoker::{AnalyzerInvoker, CompileJson},
    registry::RuleRegistry,
    workspace::WorkspaceManager,
};
use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Sender;
use lsp_server::{Connection, Message, Notification, Request, RequestId, Response};
use lsp_types::{
    notification::{
        DidChangeConfiguration, DidChangeTextDocument, DidCloseTextDocument,
        DidOpenTextDocument, DidSaveTextDocument, Initialized, Notification as _,
        PublishDiagnostics, ShowMessage,
    },
    request::{ExecuteCommand, Request as _},
    ExecuteCommandParams, InitializeParams, MessageType, PublishDiagnosticsParams,
    ShowMessageParams, Url,
};
use std::{
    path::PathBuf,
    sync::{mpsc, Arc, RwLock},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const ANALYZE_COMMAND: &str = "secbit.analyze";
pub const DESCRIBE_RULES_COMMAND: &str = "secbit.describeRules";

pub const COMMANDS: &[&str] = &[ANALYZE_COMMAND, DESCRIBE_RULES_COMMAND];

pub struct SecbitLspServer {
    workspace_manager: WorkspaceManager,
    registry: Arc<RuleRegistry>,
    config: RwLock<SecbitConfig>,
    invoker: RwLock<Arc<AnalyzerInvoker>>,
    embedded: Arc<dyn CompileJson>,
    analysis_tx: mpsc::Sender<AnalysisCommand>,
}

impl SecbitLspServer {
    pub fn new(
        init_params: &InitializeParams,
        analysis_tx: mpsc::Sender<AnalysisCommand>,
        config: SecbitConfig,
        embedded: Arc<dyn CompileJson>,
    ) -> Self {
        let invoker = AnalyzerInvoker::from_config(&config, embedded.clone());

        Self {
            workspace_manager: WorkspaceManager::new(init_params),
            registry: Arc::new(RuleRegistry::secbit()),
            config: RwLock::new(config),
            invoker: RwLock::new(Arc::new(invoker)),
            embedded,
            analysis_tx,
        }
    }

    pub fn process_request(&self, connection: &Connection, req: Request) {
        let req_id = req.id.clone();

        let result = match req.method.as_str() {
            ExecuteCommand::METHOD => self.handle_execute_command(connection, req),
            _ => {
                debug!("Received unhandled request: {}", req.method);
                let response = Response::new_err(
                    req.id,
                    lsp_server::ErrorCode::MethodNotFound as i32,
                    format!("Unhandled method: {}", req.method),
                );
                connection.sender.send(response.into()).map_err(Into::into)
            }
        };

        if let Err(e) = result {
            error!("Request {:?} failed: {}", req_id, e);
            let response = Response::new_err(req_id, -32603, e.to_string());
            let _ = connection.sender.send(response.into());
        }
    }

    pub fn process_notification(&self, connection: &Connection, not: Notification) {
        let method = not.method.clone();
        let result = match not.method.as_str() {
            DidOpenTextDocument::METHOD => self.handle_did_open(not),
            DidChangeTextDocument::METHOD => self.handle_did_change(not),
            DidCloseTextDocument::METHOD => self.handle_did_close(not),
            DidSaveTextDocument::METHOD => self.handle_did_save(connection, not),
            DidChangeConfiguration::METHOD => self.handle_did_change_configuration(not),
            Initialized::METHOD => {
                info!("Client initialized, analyzing with {}", self.describe_invoker());
                Ok(())
            }
            _ => {
                debug!("Received unhandled notification: {}", method);
                Ok(())
            }
        };

        if let Err(e) = result {
            error!("Error processing notification {}: {}", method, e);
        }
    }

    fn handle_execute_command(&self, connection: &Connection, req: Request) -> Result<()> {
        let params: ExecuteCommandParams = serde_json::from_value(req.params)?;

        match params.command.as_str() {
            ANALYZE_COMMAND => self.execute_analyze(connection, req.id, &params.arguments),
            DESCRIBE_RULES_COMMAND => self.execute_describe_rules(connection, req.id),
            _ => {
                let response = Response::new_err(
                    req.id,
                    -32601,
                    format!("Unknown command: {}", params.command),
                );
                connection.sender.send(response.into())?;
                Ok(())
            }
        }
    }

    fn execute_analyze(
        &self,
        connection: &Connection,
        req_id: RequestId,
        arguments: &[serde_json::Value],
    ) -> Result<()> {
        let uri = match arguments.first() {
            Some(value) => self.extract_uri_from_value(value)?,
            None => self
                .workspace_manager
                .last_active()
                .ok_or_else(|| anyhow!("No active document to analyze"))?,
        };

        let job_id = self.analyze_document(&connection.sender, &uri)?;

        let response = Response::new_ok(
            req_id,
            serde_json::json!({
                "uri": uri,
                "analyzed": job_id.is_some(),
                "jobId": job_id,
            }),
        );
        connection.sender.send(response.into())?;
        Ok(())
    }

    fn execute_describe_rules(&self, connection: &Connection, req_id: RequestId) -> Result<()> {
        let response = Response::new_ok(
            req_id,
            serde_json::json!({ "markdown": self.registry.describe_all() }),
        );
        connection.sender.send(response.into())?;
        Ok(())
    }

    fn handle_did_open(&self, not: Notification) -> Result<()> {
        let params: lsp_types::DidOpenTextDocumentParams = serde_json::from_value(not.params)?;
        let uri = params.text_document.uri.clone();
        self.workspace_manager.add_document(params.text_document);
        debug!(
            "Document opened: {} ({} open)",
            uri,
            self.workspace_manager.open_document_count()
        );
        Ok(())
    }

    fn handle_did_change(&self, not: Notification) -> Result<()> {
        let params: lsp_types::DidChangeTextDocumentParams = serde_json::from_value(not.params)?;

        debug!(
            "Document changed: {} (version {})",
            params.text_document.uri, params.text_document.version
        );

        // Full sync: the last change carries the whole text.
        if let Some(change) = params.content_changes.into_iter().last() {
            self.workspace_manager.update_document(
                &params.text_document.uri,
                params.text_document.version,
                change.text,
            )?;
        }

        Ok(())
    }

    fn handle_did_close(&self, not: Notification) -> Result<()> {
        let params: lsp_types::DidCloseTextDocumentParams = serde_json::from_value(not.params)?;
        self.workspace_manager
            .remove_document(&params.text_document.uri);
        debug!(
            "Document closed: {} ({} open)",
            params.text_document.uri,
            self.workspace_manager.open_document_count()
        );
        Ok(())
    }

    fn handle_did_save(&self, connection: &Connection, not: Notification) -> Result<()> {
        let params: lsp_types::DidSaveTextDocumentParams = serde_json::from_value(not.params)?;
        let uri = params.text_document.uri;

        debug!("Document saved: {}", uri);
        self.workspace_manager.mark_document_saved(&uri, params.text);

        if !self.read_config()?.on_save {
            return Ok(());
        }

        self.analyze_document(&connection.sender, &uri)?;
        Ok(())
    }

    fn handle_did_change_configuration(&self, not: Notification) -> Result<()> {
        let params: lsp_types::DidChangeConfigurationParams = serde_json::from_value(not.params)?;

        let config = {
            let mut config = self
                .config
                .write()
                .map_err(|_| anyhow!("Configuration lock poisoned"))?;
            config.update_from_lsp_value(params.settings)?;
            config.clone()
        };

        let invoker = AnalyzerInvoker::from_config(&config, self.embedded.clone());
        *self
            .invoker
            .write()
            .map_err(|_| anyhow!("Invoker lock poisoned"))? = Arc::new(invoker);

        Ok(())
    }

    /// Queues one analysis of `uri` and arranges for its diagnostics to be published.
    /// Returns `None` when the document is not Solidity.
    pub fn analyze_document(&self, sender: &Sender<Message>, uri: &Url) -> Result<Option<Uuid>> {
        if !self.workspace_manager.is_solidity(uri) {
            debug!("Skipping non-Solidity document: {}", uri);
            return Ok(None);
        }

        let path = uri
            .to_file_path()
            .unwrap_or_else(|_| PathBuf::from(uri.path()));

        let (content, version) = match self.workspace_manager.get_document(uri) {
            Some(doc) => (doc.content, Some(doc.version)),
            None => {
                debug!("Document not open, reading {} from disk", path.display());
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                (content, None)
            }
        };

        let resolved = self.read_config()?.resolve_options(&self.registry);
        for tag in &resolved.unknown_tags {
            warn!("Ignoring unknown check in configuration: {}", tag);
            Self::show_message(sender, format!("Unknown check: {}", tag))?;
        }

        let invoker = self.current_invoker()?;
        let job = AnalysisJob::new(uri.clone(), path, version, content, resolved.options);
        let job_id = job.id;

        let (response_tx, response_rx) = mpsc::channel();
        self.analysis_tx
            .send(AnalysisCommand::Analyze {
                job,
                invoker,
                response_tx,
            })
            .map_err(|_| anyhow!("Analysis worker is not running"))?;

        let sender = sender.clone();
        let registry = Arc::clone(&self.registry);

        std::thread::spawn(move || match response_rx.recv() {
            Ok(outcome) => {
                if let Err(e) = Self::publish_outcome(&sender, &registry, outcome) {
                    error!("Failed to publish diagnostics: {}", e);
                }
            }
            Err(_) => debug!("Analysis {} dropped before completion", job_id),
        });

        Ok(Some(job_id))
    }

    fn publish_outcome(
        sender: &Sender<Message>,
        registry: &RuleRegistry,
        outcome: AnalysisOutcome,
    ) -> Result<()> {
        let diagnostics = match outcome.result {
            Ok(findings) => diagnostics::normalize(registry, &findings),
            Err(e) => {
                if let Some(notice) = e.user_notice() {
                    Self::show_message(sender, notice)?;
                }
                Vec::new()
            }
        };

        let stats = DiagnosticStats::from_diagnostics(&diagnostics);
        info!(
            "Publishing {} diagnostics for {} ({} errors, {} warnings, {} info, highest: {}) after {:?}",
            stats.total_count,
            outcome.uri,
            stats.error_count,
            stats.warning_count,
            stats.info_count,
            stats
                .highest_severity()
                .map(|severity| severity.label())
                .unwrap_or("none"),
            outcome.duration
        );

        Self::publish_diagnostics(
            sender,
            outcome.uri,
            diagnostics::to_lsp_diagnostics(&diagnostics),
            outcome.version,
        )
    }

    fn publish_diagnostics(
        sender: &Sender<Message>,
        uri: Url,
        diagnostics: Vec<lsp_types::Diagnostic>,
        version: Option<i32>,
    ) -> Result<()> {
        let params = PublishDiagnosticsParams {
            uri,
            diagnostics,
            version,
        };

        let notification = Notification::new(
            PublishDiagnostics::METHOD.to_string(),
            serde_json::to_value(params)?,
        );

        sender.send(notification.into())?;
        Ok(())
    }

    fn show_message(sender: &Sender<Message>, message: String) -> Result<()> {
        let params = ShowMessageParams {
            typ: MessageType::INFO,
            message,
        };

        let notification = Notification::new(
            ShowMessage::METHOD.to_string(),
            serde_json::to_value(params)?,
        );

        sender.send(notification.into())?;
        Ok(())
    }

    fn read_config(&self) -> Result<SecbitConfig> {
        self.config
            .read()
            .map(|config| config.clone())
            .map_err(|_| anyhow!("Configuration lock poisoned"))
    }

    fn current_invoker(&self) -> Result<Arc<AnalyzerInvoker>> {
        self.invoker
            .read()
            .map(|invoker| Arc::clone(&*invoker))
            .map_err(|_| anyhow!("Invoker lock poisoned"))
    }

    fn describe_invoker(&self) -> String {
        self.current_invoker()
            .map(|invoker| invoker.describe())
            .unwrap_or_else(|e| e.to_string())
    }

    /// Accepts a URI string, a plain path, or a URI object as sent by editor clients.
    fn extract_uri_from_value(&self, value: &serde_json::Value) -> Result<Url> {
        if let Some(text) = value.as_str() {
            return self.uri_from_str(text);
        }

        if let Some(obj) = value.as_object() {
            for key in ["uri", "external"] {
                if let Some(text) = obj.get(key).and_then(|v| v.as_str()) {
                    return self.uri_from_str(text);
                }
            }

            for key in ["fsPath", "path"] {
                if let Some(path) = obj.get(key).and_then(|v| v.as_str()) {
                    return self.uri_from_path(PathBuf::from(path));
                }
            }

            return Err(anyhow!("URI object has no recognizable path field"));
        }

        Err(anyhow!(
            "Invalid document argument: expected string or URI object"
        ))
    }

    fn uri_from_str(&self, text: &str) -> Result<Url> {
        if text.contains("://") || text.starts_with("untitled:") {
            return Url::parse(text).with_context(|| format!("Invalid URI: {}", text));
        }
        self.uri_from_path(PathBuf::from(text))
    }

    fn uri_from_path(&self, path: PathBuf) -> Result<Url> {
        let path = self.workspace_manager.resolve_path(path);
        Url::from_file_path(&path).map_err(|_| anyhow!("Invalid file path: {}", path.display()))
    }
}
