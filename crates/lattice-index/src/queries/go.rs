//! Go catalog queries

use std::sync::OnceLock;

use tree_sitter::{Node, Query};

use super::*;

const IMPORT_SOURCES: &str = r#"
(import_spec path: (interpreted_string_literal) @path)
"#;

const TYPE_DECLS: &str = r#"
(type_declaration (type_spec name: (type_identifier) @struct_name type: (struct_type)))
(type_declaration (type_spec name: (type_identifier) @iface_name type: (interface_type)))
"#;

const FUNCTION_DECLS: &str = r#"
(function_declaration name: (identifier) @name) @function
"#;

const METHOD_DECLS: &str = r#"
(method_declaration name: (field_identifier) @name) @method
"#;

const VARIABLE_DECLS: &str = r#"
(source_file (var_declaration (var_spec name: (identifier) @name) @variable))
(source_file (const_declaration (const_spec name: (identifier) @name) @variable))
"#;

const REFERENCES: &str = r#"
(call_expression function: (identifier) @call)
"#;

pub struct GoQueries {
    import_sources: Query,
    type_decls: Query,
    function_decls: Query,
    method_decls: Query,
    variable_decls: Query,
    references: Query,
}

impl GoQueries {
    pub fn get() -> &'static Self {
        static QUERIES: OnceLock<GoQueries> = OnceLock::new();
        QUERIES.get_or_init(|| {
            let grammar = tree_sitter_go::LANGUAGE.into();
            GoQueries {
                import_sources: compile(&grammar, "import-sources", IMPORT_SOURCES),
                type_decls: compile(&grammar, "type-decls", TYPE_DECLS),
                function_decls: compile(&grammar, "function-decls", FUNCTION_DECLS),
                method_decls: compile(&grammar, "method-decls", METHOD_DECLS),
                variable_decls: compile(&grammar, "variable-decls", VARIABLE_DECLS),
                references: compile(&grammar, "references", REFERENCES),
            }
        })
    }

    pub fn import_sources(&self, root: Node<'_>, source: &str) -> Vec<Hit<ImportSource>> {
        let mut hits = Vec::new();
        for_each_match(&self.import_sources, root, source, |m| {
            let Some(node) = m.node("path") else { return };
            let spec = node_text(&node, source).trim_matches('"').to_string();
            hits.push(Hit {
                location: location(&node),
                text: spec.clone(),
                value: ImportSource::new(spec, ImportMechanism::Import),
            });
        });
        hits
    }

    /// Structs map to classes, interfaces to interfaces.
    pub fn type_decls(&self, root: Node<'_>, source: &str) -> (Vec<Hit<ClassDecl>>, Vec<Hit<InterfaceDecl>>) {
        let mut classes = Vec::new();
        let mut interfaces = Vec::new();
        for_each_match(&self.type_decls, root, source, |m| {
            if let Some(name_node) = m.node("struct_name") {
                classes.push(Hit {
                    location: location(&name_node),
                    text: node_text(&name_node, source).to_string(),
                    value: ClassDecl {
                        name: node_text(&name_node, source).to_string(),
                        is_abstract: false,
                        extends: None,
                        implements: Vec::new(),
                    },
                });
            } else if let Some(name_node) = m.node("iface_name") {
                interfaces.push(Hit {
                    location: location(&name_node),
                    text: node_text(&name_node, source).to_string(),
                    value: InterfaceDecl {
                        name: node_text(&name_node, source).to_string(),
                        extends: Vec::new(),
                    },
                });
            }
        });
        (classes, interfaces)
    }

    pub fn function_decls(&self, root: Node<'_>, source: &str) -> Vec<Hit<FunctionDecl>> {
        let mut hits = Vec::new();
        for_each_match(&self.function_decls, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let Some(fn_node) = m.node("function") else { return };
            hits.push(Hit {
                location: location(&fn_node),
                text: node_text(&name_node, source).to_string(),
                value: FunctionDecl {
                    name: node_text(&name_node, source).to_string(),
                },
            });
        });
        hits
    }

    pub fn method_decls(&self, root: Node<'_>, source: &str) -> Vec<Hit<MethodDecl>> {
        let mut hits = Vec::new();
        for_each_match(&self.method_decls, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let Some(method_node) = m.node("method") else { return };
            hits.push(Hit {
                location: location(&method_node),
                text: node_text(&name_node, source).to_string(),
                value: MethodDecl {
                    name: node_text(&name_node, source).to_string(),
                    owner: receiver_type(&method_node, source),
                },
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

/// Name of the receiver's type, with any pointer stripped.
fn receiver_type(method_node: &Node<'_>, source: &str) -> Option<String> {
    let receiver = method_node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    for child in receiver.children(&mut cursor) {
        if child.kind() == "parameter_declaration" {
            if let Some(ty) = child.child_by_field_name("type") {
                let text = node_text(&ty, source);
                return Some(text.trim_start_matches('*').to_string());
            }
        }
    }
    None
}
