//! Python catalog queries

use std::sync::OnceLock;

use tree_sitter::{Node, Query};

use super::*;

const IMPORT_SOURCES: &str = r#"
(import_statement name: (dotted_name) @module)
(import_statement name: (aliased_import name: (dotted_name) @aliased_module alias: (identifier) @alias))
(import_from_statement module_name: (dotted_name) @from_module)
(import_from_statement module_name: (relative_import) @relative_module)
"#;

const NAMED_IMPORTS: &str = r#"
(import_from_statement
  module_name: (_) @source
  name: (dotted_name (identifier) @name))
(import_from_statement
  module_name: (_) @source
  name: (aliased_import name: (dotted_name (identifier) @name) alias: (identifier) @alias))
"#;

const CLASS_DECLS: &str = r#"
(class_definition name: (identifier) @name) @class
"#;

const FUNCTION_DECLS: &str = r#"
(function_definition name: (identifier) @name) @function
"#;

const VARIABLE_DECLS: &str = r#"
(module (expression_statement (assignment left: (identifier) @name) @variable))
"#;

const REFERENCES: &str = r#"
(call function: (identifier) @call)
"#;

pub struct PythonQueries {
    import_sources: Query,
    named_imports: Query,
    class_decls: Query,
    function_decls: Query,
    variable_decls: Query,
    references: Query,
}

impl PythonQueries {
    pub fn get() -> &'static Self {
        static QUERIES: OnceLock<PythonQueries> = OnceLock::new();
        QUERIES.get_or_init(|| {
            let grammar = tree_sitter_python::LANGUAGE.into();
            PythonQueries {
                import_sources: compile(&grammar, "import-sources", IMPORT_SOURCES),
                named_imports: compile(&grammar, "named-imports", NAMED_IMPORTS),
                class_decls: compile(&grammar, "class-decls", CLASS_DECLS),
                function_decls: compile(&grammar, "function-decls", FUNCTION_DECLS),
                variable_decls: compile(&grammar, "variable-decls", VARIABLE_DECLS),
                references: compile(&grammar, "references", REFERENCES),
            }
        })
    }

    pub fn import_sources(&self, root: Node<'_>, source: &str) -> Vec<Hit<ImportSource>> {
        let mut hits = Vec::new();
        for_each_match(&self.import_sources, root, source, |m| {
            let node = m
                .node("module")
                .or_else(|| m.node("aliased_module"))
                .or_else(|| m.node("from_module"))
                .or_else(|| m.node("relative_module"));
            let Some(node) = node else { return };
            let spec = node_text(&node, source);
            // Python relative imports spell `.`/`..` rather than `./`.
            let mut value = ImportSource::new(spec, ImportMechanism::Import);
            if spec.starts_with('.') {
                value.is_relative = true;
                value.kind = ImportPathKind::Local;
            }
            hits.push(Hit {
                location: location(&node),
                text: spec.to_string(),
                value,
            });
        });
        hits
    }

    pub fn named_imports(&self, root: Node<'_>, source: &str) -> Vec<Hit<NamedImport>> {
        let mut hits = Vec::new();
        for_each_match(&self.named_imports, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let Some(import_source) = m.text("source", source) else { return };
            let name = node_text(&name_node, source).to_string();
            let alias = m.text("alias", source).map(str::to_string);
            hits.push(Hit {
                location: location(&name_node),
                text: name.clone(),
                value: NamedImport {
                    name: alias.clone().unwrap_or_else(|| name.clone()),
                    original_name: name,
                    alias,
                    source: import_source.to_string(),
                },
            });
        });
        hits
    }

    pub fn class_decls(&self, root: Node<'_>, source: &str) -> Vec<Hit<ClassDecl>> {
        let mut hits = Vec::new();
        for_each_match(&self.class_decls, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let Some(class_node) = m.node("class") else { return };
            let bases = superclasses(&class_node, source);
            hits.push(Hit {
                location: location(&class_node),
                text: node_text(&name_node, source).to_string(),
                value: ClassDecl {
                    name: node_text(&name_node, source).to_string(),
                    is_abstract: false,
                    extends: bases.first().cloned(),
                    implements: bases.into_iter().skip(1).collect(),
                },
            });
        });
        hits
    }

    /// Top-level defs become functions, defs nested inside a class become
    /// methods; the analyzer splits them by owner.
    pub fn function_decls(&self, root: Node<'_>, source: &str) -> Vec<Hit<(FunctionDecl, Option<String>)>> {
        let mut hits = Vec::new();
        for_each_match(&self.function_decls, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let Some(fn_node) = m.node("function") else { return };
            hits.push(Hit {
                location: location(&fn_node),
                text: node_text(&name_node, source).to_string(),
                value: (
                    FunctionDecl {
                        name: node_text(&name_node, source).to_string(),
                    },
                    enclosing_class(&fn_node, source),
                ),
            });
        });
        hits
    }

    pub fn variable_decls(&self, root: Node<'_>, source: &str) -> Vec<Hit<VariableDecl>> {
        let mut hits = Vec::new();
        for_each_match(&self.variable_decls, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let Some(var_node) = m.node("variable") else { return };
            hits.push(Hit {
                location: location(&var_node),
                text: node_text(&name_node, source).to_string(),
                value: VariableDecl {
                    name: node_text(&name_node, source).to_string(),
                },
            });
        });
        hits
    }

    pub fn references(&self, root: Node<'_>, source: &str) -> Vec<Hit<Reference>> {
        let mut hits = Vec::new();
        for_each_match(&self.references, root, source, |m| {
            let Some(node) = m.node("call") else { return };
            hits.push(Hit {
                location: location(&node),
                text: node_text(&node, source).to_string(),
                value: Reference {
                    name: node_text(&node, source).to_string(),
                    context: ReferenceContext::Call,
                },
            });
        });
        hits
    }
}

fn superclasses(class_node: &Node<'_>, source: &str) -> Vec<String> {
    let mut bases = Vec::new();
    if let Some(args) = class_node.child_by_field_name("superclasses") {
        let mut cursor = args.walk();
        for child in args.children(&mut cursor) {
            if child.kind() == "identifier" {
                bases.push(node_text(&child, source).to_string());
            }
        }
    }
    bases
}

fn enclosing_class(fn_node: &Node<'_>, source: &str) -> Option<String> {
    let mut current = fn_node.parent();
    while let Some(node) = current {
        if node.kind() == "class_definition" {
            return node
                .child_by_field_name("name")
                .map(|n| node_text(&n, source).to_string());
        }
        current = node.parent();
    }
    None
}
