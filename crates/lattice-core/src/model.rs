//! Core data structures for the dependency graph

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::identifier::NodeIdentifier;

/// Row id of a persisted node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub i64);

/// Row id of a persisted edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub i64);

/// Opaque key/value attributes attached to nodes and edges. Persisted as a
/// JSON object column; BTreeMap keeps the serialized form deterministic.
pub type Metadata = BTreeMap<String, String>;

/// Discriminates what kind of code entity a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Class,
    Interface,
    Function,
    Method,
    Variable,
    Module,
    Package,
    Heading,
    External,
    Unknown,
}

impl NodeKind {
    /// Stable string form used in node identifiers and SQL columns.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::File => "file",
            NodeKind::Class => "class",
            NodeKind::Interface => "interface",
            NodeKind::Function => "function",
            NodeKind::Method => "method",
            NodeKind::Variable => "variable",
            NodeKind::Module => "module",
            NodeKind::Package => "package",
            NodeKind::Heading => "heading",
            NodeKind::External => "external",
            NodeKind::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(NodeKind::File),
            "class" => Some(NodeKind::Class),
            "interface" => Some(NodeKind::Interface),
            "function" => Some(NodeKind::Function),
            "method" => Some(NodeKind::Method),
            "variable" => Some(NodeKind::Variable),
            "module" => Some(NodeKind::Module),
            "package" => Some(NodeKind::Package),
            "heading" => Some(NodeKind::Heading),
            "external" => Some(NodeKind::External),
            "unknown" => Some(NodeKind::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Language tags recognized at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Go,
    Java,
    Markdown,
}

impl Language {
    /// Detect the language tag from a file extension. Total on the
    /// recognized extension set, `UnsupportedLanguage` otherwise.
    pub fn detect(path: &Path) -> Result<Self, Error> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts") | Some("tsx") => Ok(Language::TypeScript),
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Ok(Language::JavaScript),
            Some("py") => Ok(Language::Python),
            Some("go") => Ok(Language::Go),
            Some("java") => Ok(Language::Java),
            Some("md") | Some("mdx") => Ok(Language::Markdown),
            _ => Err(Error::UnsupportedLanguage {
                path: path.display().to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Go => "go",
            Language::Java => "java",
            Language::Markdown => "markdown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "typescript" => Some(Language::TypeScript),
            "javascript" => Some(Language::JavaScript),
            "python" => Some(Language::Python),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            "markdown" => Some(Language::Markdown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grammar selection for the parser pool. Finer-grained than [`Language`]:
/// `.tsx` shares the typescript tag but needs the TSX grammar, and markdown
/// links live in a separate inline grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Syntax {
    TypeScript,
    Tsx,
    JavaScript,
    Python,
    Go,
    Java,
    Markdown,
    MarkdownInline,
}

impl Syntax {
    pub fn detect(path: &Path) -> Result<Self, Error> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ts") => Ok(Syntax::TypeScript),
            Some("tsx") => Ok(Syntax::Tsx),
            Some("js") | Some("jsx") | Some("mjs") | Some("cjs") => Ok(Syntax::JavaScript),
            Some("py") => Ok(Syntax::Python),
            Some("go") => Ok(Syntax::Go),
            Some("java") => Ok(Syntax::Java),
            Some("md") | Some("mdx") => Ok(Syntax::Markdown),
            _ => Err(Error::UnsupportedLanguage {
                path: path.display().to_string(),
            }),
        }
    }

    pub fn language(&self) -> Language {
        match self {
            Syntax::TypeScript | Syntax::Tsx => Language::TypeScript,
            Syntax::JavaScript => Language::JavaScript,
            Syntax::Python => Language::Python,
            Syntax::Go => Language::Go,
            Syntax::Java => Language::Java,
            Syntax::Markdown | Syntax::MarkdownInline => Language::Markdown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Syntax::TypeScript => "typescript",
            Syntax::Tsx => "tsx",
            Syntax::JavaScript => "javascript",
            Syntax::Python => "python",
            Syntax::Go => "go",
            Syntax::Java => "java",
            Syntax::Markdown => "markdown",
            Syntax::MarkdownInline => "markdown-inline",
        }
    }
}

/// Where in source an entity or match sits. Line and column are 1-based,
/// offsets are byte offsets into the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceLocation {
    pub line: u32,
    pub column: u32,
    pub start_offset: u32,
    pub end_offset: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// A node as handed to the store, before a row id exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub identifier: NodeIdentifier,
    pub kind: NodeKind,
    pub name: String,
    /// Repository-relative path, `None` for synthetic nodes.
    pub source_file: Option<String>,
    pub language: Option<Language>,
    pub location: Option<SourceLocation>,
    pub metadata: Metadata,
}

impl NodeRecord {
    pub fn new(identifier: NodeIdentifier, kind: NodeKind, name: impl Into<String>) -> Self {
        NodeRecord {
            identifier,
            kind,
            name: name.into(),
            source_file: None,
            language: None,
            location: None,
            metadata: Metadata::new(),
        }
    }

    pub fn with_source_file(mut self, source_file: impl Into<String>) -> Self {
        self.source_file = Some(source_file.into());
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = Some(language);
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A persisted node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: NodeId,
    pub identifier: NodeIdentifier,
    pub kind: NodeKind,
    pub name: String,
    pub source_file: Option<String>,
    pub language: Option<Language>,
    pub location: Option<SourceLocation>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An edge as handed to the store: endpoints are identifiers, resolved to
/// row ids at write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDraft {
    pub source: NodeIdentifier,
    pub target: NodeIdentifier,
    pub edge_type: String,
    pub derived: bool,
    /// Inference rule that produced a derived edge. `None` for explicit edges.
    pub rule: Option<String>,
    pub metadata: Metadata,
}

impl EdgeDraft {
    /// An explicit edge written by the extractor.
    pub fn explicit(
        source: NodeIdentifier,
        target: NodeIdentifier,
        edge_type: impl Into<String>,
    ) -> Self {
        EdgeDraft {
            source,
            target,
            edge_type: edge_type.into(),
            derived: false,
            rule: None,
            metadata: Metadata::new(),
        }
    }

    /// A derived edge materialized by the inference engine. Always cites a rule.
    pub fn derived(
        source: NodeIdentifier,
        target: NodeIdentifier,
        edge_type: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        EdgeDraft {
            source,
            target,
            edge_type: edge_type.into(),
            derived: true,
            rule: Some(rule.into()),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A persisted directed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: String,
    pub derived: bool,
    pub rule: Option<String>,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

/// A reference whose declaration could not be resolved at extraction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnknownSymbol {
    pub id: i64,
    pub name: String,
    /// Best guess at the referent's kind.
    pub kind: NodeKind,
    pub source_file: String,
    pub line: u32,
    pub column: u32,
    pub is_imported: bool,
    pub is_alias: bool,
    /// Extractor's prior for the guessed kind, 0–1.
    pub confidence: f64,
}

/// Proposed identity between an unknown symbol and a known node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquivalenceRelation {
    pub id: i64,
    pub unknown_id: i64,
    pub known_id: NodeId,
    pub rule: String,
    pub confidence: f64,
    pub validated: bool,
}

/// Dependency sub-kinds recorded in edge metadata under `"dependency"`.
pub mod dependency_kind {
    pub const IMPORT: &str = "import";
    pub const REQUIRE: &str = "require";
    pub const DYNAMIC: &str = "dynamic";
    pub const TYPE: &str = "type";
    pub const RE_EXPORT: &str = "re-export";
}
