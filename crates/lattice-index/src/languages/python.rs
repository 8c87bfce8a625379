//! Python analyzer

use lattice_core::Result;

use super::{DeclarationAnalysis, FileAnalysis, ImportAnalysis, LanguageAnalyzer};
use crate::parser_pool::{ParseOutcome, ParserPool};
use crate::queries::python::PythonQueries;
use crate::queries::{Hit, MethodDecl};

pub struct PythonAnalyzer;

impl LanguageAnalyzer for PythonAnalyzer {
    fn analyze(&self, _pool: &ParserPool, outcome: &ParseOutcome) -> Result<FileAnalysis> {
        let queries = PythonQueries::get();
        let root = outcome.tree.root_node();
        let source = outcome.content.as_str();

        // Defs inside a class body are methods of that class.
        let mut functions = Vec::new();
        let mut methods = Vec::new();
        for hit in queries.function_decls(root, source) {
            let (decl, owner) = hit.value;
            match owner {
                Some(owner) => methods.push(Hit {
                    location: hit.location,
                    text: hit.text,
                    value: MethodDecl {
                        name: decl.name,
                        owner: Some(owner),
                    },
                }),
                None => functions.push(Hit {
                    location: hit.location,
                    text: hit.text,
                    value: decl,
                }),
            }
        }

        Ok(FileAnalysis {
            imports: ImportAnalysis {
                sources: queries.import_sources(root, source),
                named: queries.named_imports(root, source),
                defaults: Vec::new(),
                types: Vec::new(),
                namespaces: Vec::new(),
            },
            exports: Vec::new(),
            declarations: DeclarationAnalysis {
                classes: queries.class_decls(root, source),
                interfaces: Vec::new(),
                functions,
                methods,
                variables: queries.variable_decls(root, source),
            },
            references: queries.references(root, source),
            markdown: None,
        })
    }
}
