//! Java catalog queries

use std::sync::OnceLock;

use tree_sitter::{Node, Query};

use super::*;

const IMPORT_SOURCES: &str = r#"
(import_declaration (scoped_identifier) @path)
"#;

const CLASS_DECLS: &str = r#"
(class_declaration name: (identifier) @name) @class
"#;

const INTERFACE_DECLS: &str = r#"
(interface_declaration name: (identifier) @name) @interface
"#;

const METHOD_DECLS: &str = r#"
(method_declaration name: (identifier) @name) @method
"#;

const VARIABLE_DECLS: &str = r#"
(field_declaration declarator: (variable_declarator name: (identifier) @name)) @variable
"#;

const REFERENCES: &str = r#"
(method_invocation name: (identifier) @call)
(object_creation_expression type: (type_identifier) @construction)
"#;

pub struct JavaQueries {
    import_sources: Query,
    class_decls: Query,
    interface_decls: Query,
    method_decls: Query,
    variable_decls: Query,
    references: Query,
}

impl JavaQueries {
    pub fn get() -> &'static Self {
        static QUERIES: OnceLock<JavaQueries> = OnceLock::new();
        QUERIES.get_or_init(|| {
            let grammar = tree_sitter_java::LANGUAGE.into();
            JavaQueries {
                import_sources: compile(&grammar, "import-sources", IMPORT_SOURCES),
                class_decls: compile(&grammar, "class-decls", CLASS_DECLS),
                interface_decls: compile(&grammar, "interface-decls", INTERFACE_DECLS),
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
            let spec = node_text(&node, source).to_string();
            hits.push(Hit {
                location: location(&node),
                text: spec.clone(),
                value: ImportSource::new(spec, ImportMechanism::Import),
            });
        });
        hits
    }

    pub fn class_decls(&self, root: Node<'_>, source: &str) -> Vec<Hit<ClassDecl>> {
        let mut hits = Vec::new();
        for_each_match(&self.class_decls, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let Some(class_node) = m.node("class") else { return };
            hits.push(Hit {
                location: location(&class_node),
                text: node_text(&name_node, source).to_string(),
                value: ClassDecl {
                    name: node_text(&name_node, source).to_string(),
                    is_abstract: has_abstract_modifier(&class_node, source),
                    extends: superclass(&class_node, source),
                    implements: implemented_interfaces(&class_node, source),
                },
            });
        });
        hits
    }

    pub fn interface_decls(&self, root: Node<'_>, source: &str) -> Vec<Hit<InterfaceDecl>> {
        let mut hits = Vec::new();
        for_each_match(&self.interface_decls, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let Some(iface_node) = m.node("interface") else { return };
            hits.push(Hit {
                location: location(&iface_node),
                text: node_text(&name_node, source).to_string(),
                value: InterfaceDecl {
                    name: node_text(&name_node, source).to_string(),
                    extends: extended_interfaces(&iface_node, source),
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
                    owner: enclosing_type_name(&method_node, source),
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
            let (node, context) = if let Some(n) = m.node("construction") {
                (n, ReferenceContext::Construction)
            } else if let Some(n) = m.node("call") {
                (n, ReferenceContext::Call)
            } else {
                return;
            };
            hits.push(Hit {
                location: location(&node),
                text: node_text(&node, source).to_string(),
                value: Reference {
                    name: node_text(&node, source).to_string(),
                    context,
                },
            });
        });
        hits
    }
}

fn has_abstract_modifier(class_node: &Node<'_>, source: &str) -> bool {
    let mut cursor = class_node.walk();
    for child in class_node.children(&mut cursor) {
        if child.kind() == "modifiers" {
            return node_text(&child, source).split_whitespace().any(|m| m == "abstract");
        }
    }
    false
}

fn superclass(class_node: &Node<'_>, source: &str) -> Option<String> {
    let clause = class_node.child_by_field_name("superclass")?;
    let mut cursor = clause.walk();
    for child in clause.children(&mut cursor) {
        if child.kind() == "type_identifier" {
            return Some(node_text(&child, source).to_string());
        }
    }
    None
}

fn implemented_interfaces(class_node: &Node<'_>, source: &str) -> Vec<String> {
    let mut interfaces = Vec::new();
    if let Some(clause) = class_node.child_by_field_name("interfaces") {
        collect_type_identifiers(&clause, source, &mut interfaces);
    }
    interfaces
}

fn extended_interfaces(iface_node: &Node<'_>, source: &str) -> Vec<String> {
    let mut interfaces = Vec::new();
    let mut cursor = iface_node.walk();
    for child in iface_node.children(&mut cursor) {
        if child.kind() == "extends_interfaces" {
            collect_type_identifiers(&child, source, &mut interfaces);
        }
    }
    interfaces
}

fn collect_type_identifiers(node: &Node<'_>, source: &str, out: &mut Vec<String>) {
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if child.kind() == "type_identifier" {
            out.push(node_text(&child, source).to_string());
        } else if child.child_count() > 0 {
            collect_type_identifiers(&child, source, out);
        }
    }
}

fn enclosing_type_name(method_node: &Node<'_>, source: &str) -> Option<String> {
    let mut current = method_node.parent();
    while let Some(node) = current {
        match node.kind() {
            "class_declaration" | "interface_declaration" | "enum_declaration" => {
                return node
                    .child_by_field_name("name")
                    .map(|n| node_text(&n, source).to_string());
            }
            _ => current = node.parent(),
        }
    }
    None
}
