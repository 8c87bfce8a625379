//! TypeScript / TSX analyzer

use lattice_core::Result;

use super::{DeclarationAnalysis, FileAnalysis, ImportAnalysis, LanguageAnalyzer};
use crate::parser_pool::{ParseOutcome, ParserPool};
use crate::queries::typescript::TypeScriptQueries;

pub struct TypeScriptAnalyzer {
    tsx: bool,
}

impl TypeScriptAnalyzer {
    pub const fn new(tsx: bool) -> Self {
        TypeScriptAnalyzer { tsx }
    }

    fn queries(&self) -> &'static TypeScriptQueries {
        if self.tsx {
            TypeScriptQueries::tsx()
        } else {
            TypeScriptQueries::typescript()
        }
    }
}

impl LanguageAnalyzer for TypeScriptAnalyzer {
    fn analyze(&self, _pool: &ParserPool, outcome: &ParseOutcome) -> Result<FileAnalysis> {
        let queries = self.queries();
        let root = outcome.tree.root_node();
        let source = outcome.content.as_str();

        Ok(FileAnalysis {
            imports: ImportAnalysis {
                sources: queries.import_sources(root, source),
                named: queries.named_imports(root, source),
                defaults: queries.default_imports(root, source),
                types: queries.type_imports(root, source),
                namespaces: queries.namespace_imports(root, source),
            },
            exports: queries.exports(root, source),
            declarations: DeclarationAnalysis {
                classes: queries.class_decls(root, source),
                interfaces: queries.interface_decls(root, source),
                functions: queries.function_decls(root, source),
                methods: queries.method_decls(root, source),
                variables: queries.variable_decls(root, source),
            },
            references: queries.references(root, source),
            markdown: None,
        })
    }
}
