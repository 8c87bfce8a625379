//! Per-language analyzers over the query catalog
//!
//! Each analyzer runs the fixed query set for its language and composes the
//! results into [`FileAnalysis`]. Composition is a product of typed vectors;
//! a field never mixes result kinds. Queries a language has no counterpart
//! for compose as the empty vector.

mod go;
mod java;
mod javascript;
mod markdown;
mod python;
mod typescript;

pub use go::GoAnalyzer;
pub use java::JavaAnalyzer;
pub use javascript::JavaScriptAnalyzer;
pub use markdown::MarkdownAnalyzer;
pub use python::PythonAnalyzer;
pub use typescript::TypeScriptAnalyzer;

use lattice_core::{Result, Syntax};

use crate::parser_pool::{ParseOutcome, ParserPool};
use crate::queries::{
    ClassDecl, DefaultImport, ExportItem, FunctionDecl, Hit, ImportSource, InterfaceDecl,
    MdCodeFence, MdFrontMatterKey, MdHeading, MdLink, MethodDecl, NamedImport, NamespaceImport,
    Reference, TypeImport, VariableDecl,
};

/// Results of every import-shaped query.
#[derive(Debug, Clone, Default)]
pub struct ImportAnalysis {
    pub sources: Vec<Hit<ImportSource>>,
    pub named: Vec<Hit<NamedImport>>,
    pub defaults: Vec<Hit<DefaultImport>>,
    pub types: Vec<Hit<TypeImport>>,
    pub namespaces: Vec<Hit<NamespaceImport>>,
}

/// Results of every declaration-shaped query.
#[derive(Debug, Clone, Default)]
pub struct DeclarationAnalysis {
    pub classes: Vec<Hit<ClassDecl>>,
    pub interfaces: Vec<Hit<InterfaceDecl>>,
    pub functions: Vec<Hit<FunctionDecl>>,
    pub methods: Vec<Hit<MethodDecl>>,
    pub variables: Vec<Hit<VariableDecl>>,
}

/// Markdown-only artefacts.
#[derive(Debug, Clone, Default)]
pub struct MarkdownAnalysis {
    pub headings: Vec<Hit<MdHeading>>,
    pub links: Vec<Hit<MdLink>>,
    pub code_fences: Vec<Hit<MdCodeFence>>,
    pub front_matter_keys: Vec<Hit<MdFrontMatterKey>>,
}

/// Everything one file's query set produced.
#[derive(Debug, Clone, Default)]
pub struct FileAnalysis {
    pub imports: ImportAnalysis,
    pub exports: Vec<Hit<ExportItem>>,
    pub declarations: DeclarationAnalysis,
    pub references: Vec<Hit<Reference>>,
    pub markdown: Option<MarkdownAnalysis>,
}

pub trait LanguageAnalyzer: Send + Sync {
    fn analyze(&self, pool: &ParserPool, outcome: &ParseOutcome) -> Result<FileAnalysis>;
}

/// The analyzer for a syntax. Total over [`Syntax`]; the inline markdown
/// grammar is an implementation detail of the markdown analyzer.
pub fn analyzer_for(syntax: Syntax) -> &'static dyn LanguageAnalyzer {
    static TYPESCRIPT: TypeScriptAnalyzer = TypeScriptAnalyzer::new(false);
    static TSX: TypeScriptAnalyzer = TypeScriptAnalyzer::new(true);
    static JAVASCRIPT: JavaScriptAnalyzer = JavaScriptAnalyzer;
    static PYTHON: PythonAnalyzer = PythonAnalyzer;
    static GO: GoAnalyzer = GoAnalyzer;
    static JAVA: JavaAnalyzer = JavaAnalyzer;
    static MARKDOWN: MarkdownAnalyzer = MarkdownAnalyzer;

    match syntax {
        Syntax::TypeScript => &TYPESCRIPT,
        Syntax::Tsx => &TSX,
        Syntax::JavaScript => &JAVASCRIPT,
        Syntax::Python => &PYTHON,
        Syntax::Go => &GO,
        Syntax::Java => &JAVA,
        Syntax::Markdown | Syntax::MarkdownInline => &MARKDOWN,
    }
}
