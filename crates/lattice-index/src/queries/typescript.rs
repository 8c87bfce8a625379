//! TypeScript and TSX catalog queries
//!
//! The two grammars share node names, so the same patterns compile against
//! both; each grammar gets its own compiled set.

use std::sync::OnceLock;

use tree_sitter::{Node, Query};

use super::*;

const IMPORT_SOURCES: &str = r#"
(import_statement source: (string (string_fragment) @source))
(call_expression
  function: (import)
  arguments: (arguments (string (string_fragment) @dynamic_source)))
(call_expression
  function: (identifier) @_fn
  arguments: (arguments (string (string_fragment) @require_source))
  (#eq? @_fn "require"))
"#;

const NAMED_IMPORTS: &str = r#"
(import_statement
  (import_clause
    (named_imports
      (import_specifier
        name: (identifier) @name
        alias: (identifier)? @alias)))
  source: (string (string_fragment) @source))
"#;

const DEFAULT_IMPORTS: &str = r#"
(import_statement
  (import_clause (identifier) @name)
  source: (string (string_fragment) @source))
"#;

const NAMESPACE_IMPORTS: &str = r#"
(import_statement
  (import_clause (namespace_import (identifier) @alias))
  source: (string (string_fragment) @source))
"#;

const TYPE_IMPORTS: &str = r#"
(import_statement "type"
  (import_clause
    (named_imports
      (import_specifier
        name: (identifier) @name
        alias: (identifier)? @alias)))
  source: (string (string_fragment) @source))
(import_statement "type"
  (import_clause (identifier) @default_name)
  source: (string (string_fragment) @source))
(import_statement "type"
  (import_clause (namespace_import (identifier) @ns_alias))
  source: (string (string_fragment) @source))
"#;

const EXPORTS: &str = r#"
(export_statement
  (export_clause
    (export_specifier
      name: (identifier) @reexport_name
      alias: (identifier)? @reexport_alias))
  source: (string (string_fragment) @reexport_source))
(export_statement
  (export_clause
    (export_specifier
      name: (identifier) @named_name
      alias: (identifier)? @named_alias))
  !source)
(export_statement "*"
  source: (string (string_fragment) @star_source))
(export_statement "default") @default_export
(export_statement declaration: (class_declaration name: (type_identifier) @decl_name))
(export_statement declaration: (abstract_class_declaration name: (type_identifier) @decl_name))
(export_statement declaration: (interface_declaration name: (type_identifier) @decl_name))
(export_statement declaration: (function_declaration name: (identifier) @decl_name))
(export_statement declaration: (type_alias_declaration name: (type_identifier) @decl_name))
(export_statement declaration: (enum_declaration name: (identifier) @decl_name))
(export_statement declaration: (lexical_declaration (variable_declarator name: (identifier) @decl_name)))
"#;

const CLASS_DECLS: &str = r#"
(class_declaration name: (type_identifier) @name) @class
(abstract_class_declaration name: (type_identifier) @name) @abstract_class
"#;

const INTERFACE_DECLS: &str = r#"
(interface_declaration name: (type_identifier) @name) @interface
"#;

const FUNCTION_DECLS: &str = r#"
(function_declaration name: (identifier) @name) @function
"#;

const METHOD_DECLS: &str = r#"
(method_definition name: (property_identifier) @name) @method
"#;

const VARIABLE_DECLS: &str = r#"
(variable_declarator name: (identifier) @name) @variable
"#;

const REFERENCES: &str = r#"
(new_expression constructor: (identifier) @construction)
(call_expression function: (identifier) @call)
(type_annotation (type_identifier) @type_position)
"#;

pub struct TypeScriptQueries {
    import_sources: Query,
    named_imports: Query,
    default_imports: Query,
    namespace_imports: Query,
    type_imports: Query,
    exports: Query,
    class_decls: Query,
    interface_decls: Query,
    function_decls: Query,
    method_decls: Query,
    variable_decls: Query,
    references: Query,
}

impl TypeScriptQueries {
    fn compile_for(grammar: &tree_sitter::Language) -> Self {
        TypeScriptQueries {
            import_sources: compile(grammar, "import-sources", IMPORT_SOURCES),
            named_imports: compile(grammar, "named-imports", NAMED_IMPORTS),
            default_imports: compile(grammar, "default-imports", DEFAULT_IMPORTS),
            namespace_imports: compile(grammar, "namespace-imports", NAMESPACE_IMPORTS),
            type_imports: compile(grammar, "type-imports", TYPE_IMPORTS),
            exports: compile(grammar, "exports", EXPORTS),
            class_decls: compile(grammar, "class-decls", CLASS_DECLS),
            interface_decls: compile(grammar, "interface-decls", INTERFACE_DECLS),
            function_decls: compile(grammar, "function-decls", FUNCTION_DECLS),
            method_decls: compile(grammar, "method-decls", METHOD_DECLS),
            variable_decls: compile(grammar, "variable-decls", VARIABLE_DECLS),
            references: compile(grammar, "references", REFERENCES),
        }
    }

    /// Compiled set for the plain TypeScript grammar.
    pub fn typescript() -> &'static Self {
        static QUERIES: OnceLock<TypeScriptQueries> = OnceLock::new();
        QUERIES.get_or_init(|| {
            Self::compile_for(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into())
        })
    }

    /// Compiled set for the TSX grammar.
    pub fn tsx() -> &'static Self {
        static QUERIES: OnceLock<TypeScriptQueries> = OnceLock::new();
        QUERIES.get_or_init(|| Self::compile_for(&tree_sitter_typescript::LANGUAGE_TSX.into()))
    }

    pub fn import_sources(&self, root: Node<'_>, source: &str) -> Vec<Hit<ImportSource>> {
        let mut hits = Vec::new();
        for_each_match(&self.import_sources, root, source, |m| {
            let (node, mechanism) = if let Some(n) = m.node("source") {
                (n, ImportMechanism::Import)
            } else if let Some(n) = m.node("dynamic_source") {
                (n, ImportMechanism::Dynamic)
            } else if let Some(n) = m.node("require_source") {
                (n, ImportMechanism::Require)
            } else {
                return;
            };
            let spec = node_text(&node, source);
            hits.push(Hit {
                location: location(&node),
                text: spec.to_string(),
                value: ImportSource::new(spec, mechanism),
            });
        });
        hits
    }

    pub fn named_imports(&self, root: Node<'_>, source: &str) -> Vec<Hit<NamedImport>> {
        let mut hits = Vec::new();
        for_each_match(&self.named_imports, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let name = node_text(&name_node, source).to_string();
            let alias = m.text("alias", source).map(str::to_string);
            let Some(import_source) = m.text("source", source) else { return };
            hits.push(Hit {
                location: location(&name_node),
                text: name.clone(),
                value: NamedImport {
                    // The local binding is the alias when one exists.
                    name: alias.clone().unwrap_or_else(|| name.clone()),
                    original_name: name,
                    alias,
                    source: import_source.to_string(),
                },
            });
        });
        hits
    }

    pub fn default_imports(&self, root: Node<'_>, source: &str) -> Vec<Hit<DefaultImport>> {
        let mut hits = Vec::new();
        for_each_match(&self.default_imports, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let Some(import_source) = m.text("source", source) else { return };
            hits.push(Hit {
                location: location(&name_node),
                text: node_text(&name_node, source).to_string(),
                value: DefaultImport {
                    name: node_text(&name_node, source).to_string(),
                    source: import_source.to_string(),
                },
            });
        });
        hits
    }

    pub fn namespace_imports(&self, root: Node<'_>, source: &str) -> Vec<Hit<NamespaceImport>> {
        let mut hits = Vec::new();
        for_each_match(&self.namespace_imports, root, source, |m| {
            let Some(alias_node) = m.node("alias") else { return };
            let Some(import_source) = m.text("source", source) else { return };
            hits.push(Hit {
                location: location(&alias_node),
                text: node_text(&alias_node, source).to_string(),
                value: NamespaceImport {
                    alias: node_text(&alias_node, source).to_string(),
                    source: import_source.to_string(),
                },
            });
        });
        hits
    }

    pub fn type_imports(&self, root: Node<'_>, source: &str) -> Vec<Hit<TypeImport>> {
        let mut hits = Vec::new();
        for_each_match(&self.type_imports, root, source, |m| {
            let Some(import_source) = m.text("source", source) else { return };
            let hit = if let Some(name_node) = m.node("name") {
                Hit {
                    location: location(&name_node),
                    text: node_text(&name_node, source).to_string(),
                    value: TypeImport {
                        type_name: node_text(&name_node, source).to_string(),
                        source: import_source.to_string(),
                        alias: m.text("alias", source).map(str::to_string),
                        import_kind: TypeImportKind::Named,
                    },
                }
            } else if let Some(name_node) = m.node("default_name") {
                Hit {
                    location: location(&name_node),
                    text: node_text(&name_node, source).to_string(),
                    value: TypeImport {
                        type_name: node_text(&name_node, source).to_string(),
                        source: import_source.to_string(),
                        alias: None,
                        import_kind: TypeImportKind::Default,
                    },
                }
            } else if let Some(alias_node) = m.node("ns_alias") {
                Hit {
                    location: location(&alias_node),
                    text: node_text(&alias_node, source).to_string(),
                    value: TypeImport {
                        type_name: node_text(&alias_node, source).to_string(),
                        source: import_source.to_string(),
                        alias: Some(node_text(&alias_node, source).to_string()),
                        import_kind: TypeImportKind::Namespace,
                    },
                }
            } else {
                return;
            };
            hits.push(hit);
        });
        hits
    }

    pub fn exports(&self, root: Node<'_>, source: &str) -> Vec<Hit<ExportItem>> {
        let mut hits = Vec::new();
        for_each_match(&self.exports, root, source, |m| {
            if let Some(name_node) = m.node("reexport_name") {
                let alias = m.text("reexport_alias", source);
                hits.push(Hit {
                    location: location(&name_node),
                    text: node_text(&name_node, source).to_string(),
                    value: ExportItem {
                        name: alias.unwrap_or(node_text(&name_node, source)).to_string(),
                        kind: ExportKind::ReExport,
                        source: m.text("reexport_source", source).map(str::to_string),
                    },
                });
            } else if let Some(name_node) = m.node("named_name") {
                let alias = m.text("named_alias", source);
                hits.push(Hit {
                    location: location(&name_node),
                    text: node_text(&name_node, source).to_string(),
                    value: ExportItem {
                        name: alias.unwrap_or(node_text(&name_node, source)).to_string(),
                        kind: ExportKind::Named,
                        source: None,
                    },
                });
            } else if let Some(source_node) = m.node("star_source") {
                hits.push(Hit {
                    location: location(&source_node),
                    text: node_text(&source_node, source).to_string(),
                    value: ExportItem {
                        name: "*".to_string(),
                        kind: ExportKind::ReExport,
                        source: Some(node_text(&source_node, source).to_string()),
                    },
                });
            } else if let Some(stmt) = m.node("default_export") {
                hits.push(Hit {
                    location: location(&stmt),
                    text: default_export_name(&stmt, source),
                    value: ExportItem {
                        name: default_export_name(&stmt, source),
                        kind: ExportKind::Default,
                        source: None,
                    },
                });
            } else if let Some(name_node) = m.node("decl_name") {
                hits.push(Hit {
                    location: location(&name_node),
                    text: node_text(&name_node, source).to_string(),
                    value: ExportItem {
                        name: node_text(&name_node, source).to_string(),
                        kind: ExportKind::Named,
                        source: None,
                    },
                });
            }
        });
        hits
    }

    pub fn class_decls(&self, root: Node<'_>, source: &str) -> Vec<Hit<ClassDecl>> {
        let mut hits = Vec::new();
        for_each_match(&self.class_decls, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let class_node = m.node("class").or_else(|| m.node("abstract_class"));
            let Some(class_node) = class_node else { return };
            let (extends, implements) = class_heritage(&class_node, source);
            hits.push(Hit {
                location: location(&class_node),
                text: node_text(&name_node, source).to_string(),
                value: ClassDecl {
                    name: node_text(&name_node, source).to_string(),
                    is_abstract: m.node("abstract_class").is_some(),
                    extends,
                    implements,
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
                    extends: interface_extends(&iface_node, source),
                },
            });
        });
        hits
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
                    owner: enclosing_class_name(&method_node, source),
                },
            });
        });
        hits
    }

    /// Module-level variable declarations only; function locals are noise.
    pub fn variable_decls(&self, root: Node<'_>, source: &str) -> Vec<Hit<VariableDecl>> {
        let mut hits = Vec::new();
        for_each_match(&self.variable_decls, root, source, |m| {
            let Some(name_node) = m.node("name") else { return };
            let Some(var_node) = m.node("variable") else { return };
            if !is_module_level(&var_node) {
                return;
            }
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
            } else if let Some(n) = m.node("type_position") {
                (n, ReferenceContext::TypePosition)
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

/// `extends` / `implements` names from a class's heritage clause.
fn class_heritage(class_node: &Node<'_>, source: &str) -> (Option<String>, Vec<String>) {
    let mut extends = None;
    let mut implements = Vec::new();
    let mut cursor = class_node.walk();
    for child in class_node.children(&mut cursor) {
        if child.kind() != "class_heritage" {
            continue;
        }
        let mut heritage_cursor = child.walk();
        for clause in child.children(&mut heritage_cursor) {
            match clause.kind() {
                "extends_clause" => {
                    if let Some(value) = clause.child_by_field_name("value") {
                        extends = Some(node_text(&value, source).to_string());
                    }
                }
                "implements_clause" => {
                    let mut clause_cursor = clause.walk();
                    for ty in clause.children(&mut clause_cursor) {
                        if ty.kind() == "type_identifier" {
                            implements.push(node_text(&ty, source).to_string());
                        }
                    }
                }
                _ => {}
            }
        }
    }
    (extends, implements)
}

fn interface_extends(iface_node: &Node<'_>, source: &str) -> Vec<String> {
    let mut extends = Vec::new();
    let mut cursor = iface_node.walk();
    for child in iface_node.children(&mut cursor) {
        if child.kind() != "extends_type_clause" {
            continue;
        }
        let mut clause_cursor = child.walk();
        for ty in child.children(&mut clause_cursor) {
            if ty.kind() == "type_identifier" {
                extends.push(node_text(&ty, source).to_string());
            }
        }
    }
    extends
}

fn enclosing_class_name(method_node: &Node<'_>, source: &str) -> Option<String> {
    let mut current = method_node.parent();
    while let Some(node) = current {
        match node.kind() {
            "class_declaration" | "abstract_class_declaration" | "class" => {
                return node
                    .child_by_field_name("name")
                    .map(|n| node_text(&n, source).to_string());
            }
            _ => current = node.parent(),
        }
    }
    None
}

fn is_module_level(var_node: &Node<'_>) -> bool {
    let Some(declaration) = var_node.parent() else {
        return false;
    };
    matches!(
        declaration.parent().map(|p| p.kind()),
        Some("program") | Some("export_statement")
    )
}

fn default_export_name(stmt: &Node<'_>, source: &str) -> String {
    // `export default Foo` names the exported binding; anonymous values
    // export as "default".
    if let Some(value) = stmt.child_by_field_name("value") {
        if value.kind() == "identifier" {
            return node_text(&value, source).to_string();
        }
    }
    if let Some(decl) = stmt.child_by_field_name("declaration") {
        if let Some(name) = decl.child_by_field_name("name") {
            return node_text(&name, source).to_string();
        }
    }
    "default".to_string()
}
