//! Named, typed queries over syntax trees
//!
//! Each query is a compiled tree-sitter pattern plus a mapper into one of a
//! closed set of result kinds. A query result never mixes kinds: composed
//! views are product structs with one typed vector per query.

pub mod go;
pub mod java;
pub mod javascript;
pub mod markdown;
pub mod python;
pub mod typescript;

use streaming_iterator::StreamingIterator;
use tree_sitter::{Node, Query, QueryCursor, QueryMatch};

use lattice_core::SourceLocation;

/// One query match: where it was, the raw matched text, and the typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit<T> {
    pub location: SourceLocation,
    pub text: String,
    pub value: T,
}

/// Whether an import spec names a sibling file or an installed library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportPathKind {
    Local,
    Package,
}

/// How the dependency was expressed in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMechanism {
    Import,
    Require,
    Dynamic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportSource {
    pub source: String,
    pub is_relative: bool,
    pub kind: ImportPathKind,
    pub mechanism: ImportMechanism,
}

impl ImportSource {
    pub fn new(source: impl Into<String>, mechanism: ImportMechanism) -> Self {
        let source = source.into();
        let is_relative = source.starts_with("./") || source.starts_with("../");
        let kind = if is_relative || source.starts_with('/') {
            ImportPathKind::Local
        } else {
            ImportPathKind::Package
        };
        ImportSource {
            source,
            is_relative,
            kind,
            mechanism,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamedImport {
    pub name: String,
    pub original_name: String,
    pub alias: Option<String>,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefaultImport {
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeImportKind {
    Named,
    Default,
    Namespace,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeImport {
    pub type_name: String,
    pub source: String,
    pub alias: Option<String>,
    pub import_kind: TypeImportKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceImport {
    pub alias: String,
    pub source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Named,
    Default,
    ReExport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportItem {
    pub name: String,
    pub kind: ExportKind,
    /// Present for re-exports.
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: String,
    pub is_abstract: bool,
    pub extends: Option<String>,
    pub implements: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    pub name: String,
    pub extends: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl {
    pub name: String,
    /// Enclosing class or interface, when the grammar exposes it.
    pub owner: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableDecl {
    pub name: String,
}

/// Syntactic position a reference was seen in; drives the resolver's kind
/// prior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceContext {
    Call,
    Construction,
    TypePosition,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    pub name: String,
    pub context: ReferenceContext,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdHeading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdLink {
    pub text: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdCodeFence {
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MdFrontMatterKey {
    pub key: String,
}

/// Extended location of a node.
pub(crate) fn location(node: &Node<'_>) -> SourceLocation {
    let start = node.start_position();
    let end = node.end_position();
    SourceLocation {
        line: start.row as u32 + 1,
        column: start.column as u32 + 1,
        start_offset: node.start_byte() as u32,
        end_offset: node.end_byte() as u32,
        end_line: end.row as u32 + 1,
        end_column: end.column as u32 + 1,
    }
}

pub(crate) fn node_text<'a>(node: &Node<'_>, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

/// Captures of one match, addressable by capture name.
pub(crate) struct MatchView<'a, 'tree> {
    query: &'a Query,
    m: &'a QueryMatch<'a, 'tree>,
}

impl<'a, 'tree> MatchView<'a, 'tree> {
    pub fn node(&self, name: &str) -> Option<Node<'tree>> {
        let index = self.query.capture_index_for_name(name)?;
        self.m
            .captures
            .iter()
            .find(|c| c.index == index)
            .map(|c| c.node)
    }

    pub fn text(&self, name: &str, source: &'a str) -> Option<&'a str> {
        self.node(name).map(|n| node_text(&n, source))
    }
}

/// Run `query` over `root`, handing each match to `f`.
pub(crate) fn for_each_match<'tree>(
    query: &Query,
    root: Node<'tree>,
    source: &str,
    mut f: impl FnMut(&MatchView<'_, 'tree>),
) {
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(query, root, source.as_bytes());
    while let Some(m) = matches.next() {
        f(&MatchView { query, m });
    }
}

/// Compile a catalog query; patterns ship with the binary, so failure is a
/// programming bug worth failing loudly on at first use.
pub(crate) fn compile(grammar: &tree_sitter::Language, name: &str, pattern: &str) -> Query {
    match Query::new(grammar, pattern) {
        Ok(query) => query,
        Err(e) => panic!("catalog query '{name}' failed to compile: {e}"),
    }
}
