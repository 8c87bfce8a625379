//! Go analyzer

use lattice_core::Result;

use super::{DeclarationAnalysis, FileAnalysis, ImportAnalysis, LanguageAnalyzer};
use crate::parser_pool::{ParseOutcome, ParserPool};
use crate::queries::go::GoQueries;

pub struct GoAnalyzer;

impl LanguageAnalyzer for GoAnalyzer {
    fn analyze(&self, _pool: &ParserPool, outcome: &ParseOutcome) -> Result<FileAnalysis> {
        let queries = GoQueries::get();
        let root = outcome.tree.root_node();
        let source = outcome.content.as_str();

        let (classes, interfaces) = queries.type_decls(root, source);

        Ok(FileAnalysis {
            imports: ImportAnalysis {
                sources: queries.import_sources(root, source),
                ..Default::default()
            },
            exports: Vec::new(),
            declarations: DeclarationAnalysis {
                classes,
                interfaces,
                functions: queries.function_decls(root, source),
                methods: queries.method_decls(root, source),
                variables: queries.variable_decls(root, source),
            },
            references: queries.references(root, source),
            markdown: None,
        })
    }
}
