//! Rule registry
//!
//! Static table of the checks the SECBIT analyzer knows about. The analyzer reports a tag
//! per finding and nothing else about urgency, so severity and category live here. The
//! registry is an explicitly constructed value handed to the normalizer instead of a
//! process-wide table, which lets tests swap in a small registry of their own.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Display urgency. Variants are declared from most to least urgent, so `Error` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Information,
}

impl Severity {
    pub fn to_lsp_severity(&self) -> lsp_types::DiagnosticSeverity {
        match self {
            Self::Error => lsp_types::DiagnosticSeverity::ERROR,
            Self::Warning => lsp_types::DiagnosticSeverity::WARNING,
            Self::Information => lsp_types::DiagnosticSeverity::INFORMATION,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warning => "Warning",
            Self::Information => "Information",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Erc20,
    Code,
    Gas,
    Vulnerability,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Erc20 => "erc20",
            Self::Code => "code",
            Self::Gas => "gas",
            Self::Vulnerability => "vulnerability",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub tag: String,
    pub severity: Severity,
    pub category: Category,
}

impl RuleDescriptor {
    pub fn new(tag: impl Into<String>, severity: Severity, category: Category) -> Self {
        Self {
            tag: tag.into(),
            severity,
            category,
        }
    }
}

/// Configured tags split by whether the registry knows them. Both lists keep input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSelection {
    pub accepted: Vec<String>,
    pub unknown: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RuleRegistry {
    rules: Vec<RuleDescriptor>,
    index: HashMap<String, usize>,
}

impl RuleRegistry {
    pub fn new(rules: Vec<RuleDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(rules.len());

        for (position, rule) in rules.iter().enumerate() {
            if index.insert(rule.tag.clone(), position).is_some() {
                return Err(anyhow!("Duplicate rule tag in registry: {}", rule.tag));
            }
        }

        Ok(Self { rules, index })
    }

    /// The checks shipped with the SECBIT analyzer.
    pub fn secbit() -> Self {
        use Category::*;
        use Severity::*;

        let table: [(&str, Severity, Category); 38] = [
            ("erc20-no-return", Error, Erc20),
            ("erc20-return-false", Error, Erc20),
            ("erc20-no-decimals", Error, Erc20),
            ("erc20-no-name", Error, Erc20),
            ("erc20-no-symbol", Error, Erc20),
            ("transfer-no-revert", Error, Erc20),
            ("transfer-no-event", Error, Erc20),
            ("approve-no-event", Error, Erc20),
            ("hardcode-addr", Warning, Code),
            ("byte-array", Information, Gas),
            ("constant-mutability", Information, Code),
            ("fix-version", Information, Code),
            ("int-div", Warning, Vulnerability),
            ("private-modifier", Information, Vulnerability),
            ("view-immutable", Information, Code),
            ("bad-name", Information, Code),
            ("tx-origin", Error, Vulnerability),
            ("throw", Information, Code),
            ("suicide", Information, Code),
            ("unchecked-math", Error, Vulnerability),
            ("sha3", Information, Code),
            // analyzer's spelling
            ("timstamp", Warning, Vulnerability),
            ("implicit-visibility", Information, Code),
            ("redundant-fallback", Warning, Vulnerability),
            ("type-inference", Information, Code),
            ("revert-vs-require", Information, Code),
            ("pure-function", Information, Code),
            ("reentrance", Error, Vulnerability),
            ("dirty-padding", Error, Vulnerability),
            ("no-return", Information, Code),
            ("delegatecall", Warning, Code),
            ("send-vs-transfer", Warning, Vulnerability),
            ("forced-ether", Error, Vulnerability),
            ("pull-vs-push", Error, Vulnerability),
            ("blockhash", Warning, Vulnerability),
            ("short-addr", Error, Erc20),
            ("transferfrom-no-allowed-check", Warning, Erc20),
            ("approve-with-balance-verify", Warning, Erc20),
        ];

        let rules = table
            .iter()
            .map(|(tag, severity, category)| RuleDescriptor::new(*tag, *severity, *category))
            .collect::<Vec<_>>();

        let index = rules
            .iter()
            .enumerate()
            .map(|(position, rule)| (rule.tag.clone(), position))
            .collect();

        Self { rules, index }
    }

    pub fn lookup(&self, tag: &str) -> Option<&RuleDescriptor> {
        self.index.get(tag).map(|&position| &self.rules[position])
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.index.contains_key(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuleDescriptor> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn filter_tags<S: AsRef<str>>(&self, tags: &[S]) -> TagSelection {
        let mut selection = TagSelection::default();

        for tag in tags {
            let tag = tag.as_ref();
            if self.contains(tag) {
                selection.accepted.push(tag.to_string());
            } else {
                selection.unknown.push(tag.to_string());
            }
        }

        selection
    }

    /// Markdown listing of every rule, in registry order.
    pub fn describe_all(&self) -> String {
        let mut listing = String::new();

        for rule in &self.rules {
            listing.push_str(&format!(
                "* {}\n**{}**\n**{}**\n\n",
                rule.tag,
                rule.category.as_str(),
                rule.severity.label()
            ));
        }

        listing
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::secbit()
    }
}
