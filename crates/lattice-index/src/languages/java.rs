//! Java analyzer

use lattice_core::Result;

use super::{DeclarationAnalysis, FileAnalysis, ImportAnalysis, LanguageAnalyzer};
use crate::parser_pool::{ParseOutcome, ParserPool};
use crate::queries::java::JavaQueries;

pub struct JavaAnalyzer;

impl LanguageAnalyzer for JavaAnalyzer {
    fn analyze(&self, _pool: &ParserPool, outcome: &ParseOutcome) -> Result<FileAnalysis> {
        let queries = JavaQueries::get();
        let root = outcome.tree.root_node();
        let source = outcome.content.as_str();

        Ok(FileAnalysis {
            imports: ImportAnalysis {
                sources: queries.import_sources(root, source),
                ..Default::default()
            },
            exports: Vec::new(),
            declarations: DeclarationAnalysis {
                classes: queries.class_decls(root, source),
                interfaces: queries.interface_decls(root, source),
                functions: Vec::new(),
                methods: queries.method_decls(root, source),
                variables: queries.variable_decls(root, source),
            },
            references: queries.references(root, source),
            markdown: None,
        })
    }
}
