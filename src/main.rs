//! SECBIT LSP server entry point
//!
//! Analysis runs on a dedicated worker thread with its own runtime, so the message loop
//! only tracks documents and hands out jobs.

use anyhow::{anyhow, Result};
use lsp_server::{Connection, Message};
use lsp_types::{
    ExecuteCommandOptions, InitializeParams, SaveOptions, ServerCapabilities,
    TextDocumentSyncCapability, TextDocumentSyncKind, TextDocumentSyncOptions,
    TextDocumentSyncSaveOptions, WorkDoneProgressOptions,
};
use std::{env, sync::mpsc, sync::Arc, thread};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use secbit_lsp::{analysis::AnalysisCommand, server::COMMANDS, *};

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("--version") | Some("-V") => {
            println!("secbit-lsp {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some("--list-rules") => {
            print!("{}", RuleRegistry::secbit().describe_all());
            return Ok(());
        }
        _ => {}
    }

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting SECBIT LSP server");

    let (connection, io_threads) = Connection::stdio();

    let server_capabilities = serde_json::to_value(ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(
            TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(TextDocumentSyncKind::FULL),
                save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                    include_text: Some(true),
                })),
                ..Default::default()
            },
        )),
        execute_command_provider: Some(ExecuteCommandOptions {
            commands: COMMANDS.iter().map(|c| c.to_string()).collect(),
            work_done_progress_options: WorkDoneProgressOptions {
                work_done_progress: None,
            },
        }),
        ..Default::default()
    })?;

    let init_params = connection.initialize(server_capabilities)?;
    let init_params: InitializeParams = serde_json::from_value(init_params)?;

    let config = match &init_params.initialization_options {
        Some(options) => SecbitConfig::from_lsp_value(options.clone()).unwrap_or_else(|e| {
            warn!("Ignoring invalid initialization options: {}", e);
            SecbitConfig::default()
        }),
        None => SecbitConfig::default(),
    };

    main_loop(connection, init_params, config)?;

    io_threads.join()?;
    info!("Shutting down SECBIT LSP server");
    Ok(())
}

fn main_loop(
    connection: Connection,
    init_params: InitializeParams,
    config: SecbitConfig,
) -> Result<()> {
    info!("Starting main loop");

    let (analysis_tx, analysis_rx) = mpsc::channel::<AnalysisCommand>();

    let manager = AnalysisManager::new()?;
    let analysis_thread = thread::spawn(move || manager.run(analysis_rx));

    let server = SecbitLspServer::new(
        &init_params,
        analysis_tx.clone(),
        config,
        Arc::new(UnavailableCompiler),
    );

    for msg in &connection.receiver {
        match msg {
            Message::Request(req) => {
                if connection.handle_shutdown(&req)? {
                    break;
                }
                server.process_request(&connection, req);
            }
            Message::Notification(not) => {
                server.process_notification(&connection, not);
            }
            Message::Response(_) => {}
        }
    }

    let _ = analysis_tx.send(AnalysisCommand::Shutdown);
    analysis_thread
        .join()
        .map_err(|_| anyhow!("Analysis thread panicked"))?;

    Ok(())
}
