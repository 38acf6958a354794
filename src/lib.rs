//! SECBIT LSP Server
//!
//! Surfaces the SECBIT static analyzer for Solidity as editor diagnostics. The analyzer is a
//! patched Solidity compiler, run either as a native binary or through an embedded
//! `compileJSON` entry point; this crate decides which checks to run, invokes it off the
//! message loop and turns its JSON findings into LSP diagnostics.
//!
//! The rule registry is an explicit value handed to the normalizer, so severity lookup can
//! be tested against any rule table.
//!
//! The `secbit-lsp` binary links no embedded compiler: it runs with [`UnavailableCompiler`],
//! so without a configured `secbit.solc` every analysis ends in a notice and an empty
//! diagnostic set. Embedders supply a real backend through [`CompileJson`] when
//! constructing [`SecbitLspServer`].

pub mod analysis;
pub mod config;
pub mod diagnostics;
pub mod invoker;
pub mod proto;
pub mod registry;
pub mod server;
pub mod workspace;

pub use analysis::AnalysisManager;
pub use config::SecbitConfig;
pub use diagnostics::{normalize, Diagnostic, DiagnosticStats};
pub use invoker::{AnalyzerInvoker, CompileJson, UnavailableCompiler};
pub use registry::{RuleDescriptor, RuleRegistry, Severity};
pub use server::SecbitLspServer;
pub use workspace::WorkspaceManager;
