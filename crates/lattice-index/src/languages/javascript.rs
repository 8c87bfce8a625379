//! JavaScript / JSX analyzer

use lattice_core::Result;

use super::{DeclarationAnalysis, FileAnalysis, ImportAnalysis, LanguageAnalyzer};
use crate::parser_pool::{ParseOutcome, ParserPool};
use crate::queries::javascript::JavaScriptQueries;

pub struct JavaScriptAnalyzer;

impl LanguageAnalyzer for JavaScriptAnalyzer {
    fn analyze(&self, _pool: &ParserPool, outcome: &ParseOutcome) -> Result<FileAnalysis> {
        let queries = JavaScriptQueries::get();
        let root = outcome.tree.root_node();
        let source = outcome.content.as_str();

        Ok(FileAnalysis {
            imports: ImportAnalysis {
                sources: queries.import_sources(root, source),
                named: queries.named_imports(root, source),
                defaults: queries.default_imports(root, source),
                types: Vec::new(),
                namespaces: queries.namespace_imports(root, source),
            },
            exports: queries.exports(root, source),
            declarations: DeclarationAnalysis {
                classes: queries.class_decls(root, source),
                interfaces: Vec::new(),
                functions: queries.function_decls(root, source),
                methods: queries.method_decls(root, source),
                variables: queries.variable_decls(root, source),
            },
            references: queries.references(root, source),
            markdown: None,
        })
    }
}
