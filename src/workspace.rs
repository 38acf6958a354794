//! Workspace management
//!
//! Editors send content changes before anything reaches disk, so analysis runs against
//! the in-memory text of open documents. The manager also remembers which document the
//! user touched last; that is the target of an analyze command issued without arguments.

use anyhow::{anyhow, Result};
use dashmap::DashMap;
use lsp_types::{InitializeParams, TextDocumentItem, Url};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};
use tracing::{debug, info, warn};

pub const SOLIDITY_LANGUAGE_ID: &str = "solidity";
const SOLIDITY_EXTENSION: &str = "sol";

#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub uri: Url,
    pub language_id: String,
    pub version: i32,
    pub content: String,
    pub is_dirty: bool,
}

impl DocumentInfo {
    pub fn is_solidity(&self) -> bool {
        self.language_id == SOLIDITY_LANGUAGE_ID
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    open_documents: Arc<DashMap<Url, DocumentInfo>>,

    last_active: Arc<RwLock<Option<Url>>>,

    workspace_root: Option<PathBuf>,
}

impl WorkspaceManager {
    pub fn new(init_params: &InitializeParams) -> Self {
        let workspace_root = Self::determine_workspace_root(init_params);
        info!("Initialized workspace with root: {:?}", workspace_root);

        Self {
            open_documents: Arc::new(DashMap::new()),
            last_active: Arc::new(RwLock::new(None)),
            workspace_root,
        }
    }

    pub fn add_document(&self, document: TextDocumentItem) {
        let doc_info = DocumentInfo {
            uri: document.uri.clone(),
            language_id: document.language_id,
            version: document.version,
            content: document.text,
            is_dirty: false,
        };

        debug!("Adding document: {} ({})", document.uri, doc_info.language_id);
        self.open_documents.insert(document.uri.clone(), doc_info);
        self.touch(&document.uri);
    }

    pub fn update_document(&self, uri: &Url, version: i32, content: String) -> Result<()> {
        let mut doc = self
            .open_documents
            .get_mut(uri)
            .ok_or_else(|| anyhow!("Document not found: {}", uri))?;

        doc.version = version;
        doc.content = content;
        doc.is_dirty = true;
        drop(doc);

        debug!("Updated document: {} (version {})", uri, version);
        self.touch(uri);
        Ok(())
    }

    /// Replaces the text with what was written to disk, if the client included it.
    pub fn mark_document_saved(&self, uri: &Url, text: Option<String>) {
        if let Some(mut doc) = self.open_documents.get_mut(uri) {
            if let Some(text) = text {
                doc.content = text;
            }
            doc.is_dirty = false;
            debug!("Marked document as saved: {}", uri);
        }
        self.touch(uri);
    }

    pub fn remove_document(&self, uri: &Url) {
        debug!("Removing document: {}", uri);
        self.open_documents.remove(uri);

        let mut last_active = self.write_last_active();
        if last_active.as_ref() == Some(uri) {
            *last_active = None;
        }
    }

    pub fn get_document(&self, uri: &Url) -> Option<DocumentInfo> {
        self.open_documents.get(uri).map(|doc| doc.clone())
    }

    pub fn open_document_count(&self) -> usize {
        self.open_documents.len()
    }

    pub fn last_active(&self) -> Option<Url> {
        match self.last_active.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Open documents are judged by language id, anything else by a `.sol` extension.
    pub fn is_solidity(&self, uri: &Url) -> bool {
        match self.open_documents.get(uri) {
            Some(doc) => doc.is_solidity(),
            None => Path::new(uri.path())
                .extension()
                .is_some_and(|ext| ext == SOLIDITY_EXTENSION),
        }
    }

    /// Resolves a command argument path; relative paths are taken from the workspace root.
    pub fn resolve_path(&self, path: PathBuf) -> PathBuf {
        if path.is_absolute() {
            return path;
        }

        match &self.workspace_root {
            Some(root) => root.join(path),
            None => path,
        }
    }

    fn touch(&self, uri: &Url) {
        *self.write_last_active() = Some(uri.clone());
    }

    fn write_last_active(&self) -> std::sync::RwLockWriteGuard<'_, Option<Url>> {
        match self.last_active.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn determine_workspace_root(init_params: &InitializeParams) -> Option<PathBuf> {
        if let Some(folders) = &init_params.workspace_folders {
            if let Some(first_folder) = folders.first() {
                if let Ok(path) = first_folder.uri.to_file_path() {
                    return Some(path);
                }
            }
        }

        #[allow(deprecated)]
        if let Some(root_uri) = &init_params.root_uri {
            if let Ok(path) = root_uri.to_file_path() {
                return Some(path);
            }
        }

        #[allow(deprecated)]
        if let Some(root_path) = &init_params.root_path {
            return Some(PathBuf::from(root_path));
        }

        warn!("No workspace root found in initialization parameters");
        None
    }
}
