//! Unit tests for lattice-index

use std::collections::HashMap;

use lattice_core::registry::edge_types;
use lattice_core::{Error, NodeKind};

use crate::extractor::{Extractor, ImportTargetResolver};

/// Resolver backed by a fixed spec → path table.
struct FixedResolver {
    table: HashMap<String, String>,
}

impl FixedResolver {
    fn new(entries: &[(&str, &str)]) -> Self {
        FixedResolver {
            table: entries
                .iter()
                .map(|(spec, path)| (spec.to_string(), path.to_string()))
                .collect(),
        }
    }

    fn empty() -> Self {
        Self::new(&[])
    }
}

impl ImportTargetResolver for FixedResolver {
    fn resolve(&self, _from_file: &str, spec: &str) -> Option<String> {
        self.table.get(spec).cloned()
    }
}

#[test]
fn typescript_file_with_local_and_package_imports() {
    let extractor = Extractor::new("proj");
    let resolver = FixedResolver::new(&[("./helpers/Helper", "src/helpers/Helper.ts")]);
    let source = r#"
import React from 'react';
import { Helper } from './helpers/Helper';

export class UserService {}
"#;

    let extraction = extractor.extract("src/UserService.ts", source, &resolver).unwrap();

    let identifiers: Vec<String> = extraction.nodes.iter().map(|n| n.identifier.to_string()).collect();
    assert!(identifiers.contains(&"proj/src/UserService.ts#file:UserService.ts".to_string()));
    assert!(identifiers.contains(&"proj/src/UserService.ts#class:UserService".to_string()));
    assert!(identifiers.contains(&"proj//#package:react".to_string()));
    assert!(identifiers.contains(&"proj/src/helpers/Helper.ts#file:Helper.ts".to_string()));

    let package_edges: Vec<_> = extraction
        .edges
        .iter()
        .filter(|e| e.edge_type == edge_types::IMPORTS_PACKAGE)
        .collect();
    assert_eq!(package_edges.len(), 1);
    assert_eq!(package_edges[0].target.to_string(), "proj//#package:react");

    let file_edges: Vec<_> = extraction
        .edges
        .iter()
        .filter(|e| e.edge_type == edge_types::IMPORTS_FILE)
        .collect();
    assert_eq!(file_edges.len(), 1);
    assert_eq!(
        file_edges[0].target.to_string(),
        "proj/src/helpers/Helper.ts#file:Helper.ts"
    );

    let contains: Vec<_> = extraction
        .edges
        .iter()
        .filter(|e| e.edge_type == edge_types::CONTAINS)
        .collect();
    assert_eq!(contains.len(), 1);
    assert_eq!(
        contains[0].target.to_string(),
        "proj/src/UserService.ts#class:UserService"
    );

    // The exported class is marked.
    let class = extraction
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Class)
        .unwrap();
    assert_eq!(class.metadata.get("exported").map(String::as_str), Some("true"));
}

#[test]
fn re_export_emits_re_exports_edge() {
    let extractor = Extractor::new("proj");
    let resolver = FixedResolver::new(&[("./helpers/Helper", "src/helpers/Helper.ts")]);
    let source = "export { Helper } from './helpers/Helper';\n";

    let extraction = extractor.extract("src/index.ts", source, &resolver).unwrap();

    let re_exports: Vec<_> = extraction
        .edges
        .iter()
        .filter(|e| e.edge_type == edge_types::RE_EXPORTS)
        .collect();
    assert_eq!(re_exports.len(), 1);
    assert_eq!(
        re_exports[0].source.to_string(),
        "proj/src/index.ts#file:index.ts"
    );
    assert_eq!(
        re_exports[0].target.to_string(),
        "proj/src/helpers/Helper.ts#file:Helper.ts"
    );
    assert_eq!(
        re_exports[0].metadata.get("dependency").map(String::as_str),
        Some("re-export")
    );
}

#[test]
fn unresolved_local_import_becomes_unknown_node() {
    let extractor = Extractor::new("proj");
    let source = "import { Ghost } from './ghost';\n";

    let extraction = extractor.extract("src/a.ts", source, &FixedResolver::empty()).unwrap();

    let unknown = extraction
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Unknown)
        .expect("unknown placeholder node");
    assert_eq!(
        unknown.metadata.get("original-import-spec").map(String::as_str),
        Some("./ghost")
    );

    let import_edges: Vec<_> = extraction
        .edges
        .iter()
        .filter(|e| e.edge_type == edge_types::IMPORTS_FILE)
        .collect();
    assert_eq!(import_edges.len(), 1);
    assert_eq!(import_edges[0].target, unknown.identifier);
}

#[test]
fn class_heritage_in_same_file_produces_extends_edge() {
    let extractor = Extractor::new("proj");
    let source = r#"
class Base {}
class Derived extends Base {}
"#;

    let extraction = extractor.extract("src/models.ts", source, &FixedResolver::empty()).unwrap();

    let extends: Vec<_> = extraction
        .edges
        .iter()
        .filter(|e| e.edge_type == edge_types::EXTENDS)
        .collect();
    assert_eq!(extends.len(), 1);
    assert_eq!(extends[0].source.to_string(), "proj/src/models.ts#class:Derived");
    assert_eq!(extends[0].target.to_string(), "proj/src/models.ts#class:Base");
}

#[test]
fn unresolved_reference_registers_unknown_symbol() {
    let extractor = Extractor::new("proj");
    let source = r#"
const user: User = load();
"#;

    let extraction = extractor.extract("src/types.ts", source, &FixedResolver::empty()).unwrap();

    let names: Vec<&str> = extraction.unknowns.iter().map(|u| u.name.as_str()).collect();
    assert!(names.contains(&"User"), "type reference: {names:?}");
    assert!(names.contains(&"load"), "call reference: {names:?}");

    let user = extraction.unknowns.iter().find(|u| u.name == "User").unwrap();
    assert_eq!(user.kind, NodeKind::Class);
    assert!(user.confidence > 0.0 && user.confidence <= 1.0);
}

#[test]
fn imported_names_are_not_unknown() {
    let extractor = Extractor::new("proj");
    let resolver = FixedResolver::new(&[("./user", "src/user.ts")]);
    let source = r#"
import { User } from './user';
const u = new User();
"#;

    let extraction = extractor.extract("src/a.ts", source, &resolver).unwrap();
    assert!(
        extraction.unknowns.iter().all(|u| u.name != "User"),
        "imported User must not register as unknown"
    );
}

#[test]
fn methods_carry_their_owner() {
    let extractor = Extractor::new("proj");
    let source = r#"
class UserService {
    loadUsers() {}
}
"#;

    let extraction = extractor.extract("src/s.ts", source, &FixedResolver::empty()).unwrap();
    let method = extraction
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Method)
        .expect("method node");
    assert_eq!(method.name, "UserService.loadUsers");
    assert_eq!(method.metadata.get("owner").map(String::as_str), Some("UserService"));
}

#[test]
fn python_extraction_maps_defs_and_imports() {
    let extractor = Extractor::new("proj");
    let source = r#"
import os
from models import User

class Service:
    def load(self):
        pass

def main():
    pass
"#;

    let extraction = extractor.extract("app/service.py", source, &FixedResolver::empty()).unwrap();

    let kinds: Vec<(NodeKind, &str)> = extraction
        .nodes
        .iter()
        .map(|n| (n.kind, n.name.as_str()))
        .collect();
    assert!(kinds.contains(&(NodeKind::Class, "Service")));
    assert!(kinds.contains(&(NodeKind::Method, "Service.load")));
    assert!(kinds.contains(&(NodeKind::Function, "main")));
    assert!(kinds.contains(&(NodeKind::Package, "os")));
    assert!(kinds.contains(&(NodeKind::Package, "models")));
}

#[test]
fn go_extraction_maps_types_and_imports() {
    let extractor = Extractor::new("proj");
    let source = r#"
package main

import "fmt"

type Server struct{}

type Handler interface{}

func (s *Server) Run() {}

func main() {
    fmt.Println("ok")
}
"#;

    let extraction = extractor.extract("cmd/main.go", source, &FixedResolver::empty()).unwrap();

    let kinds: Vec<(NodeKind, &str)> = extraction
        .nodes
        .iter()
        .map(|n| (n.kind, n.name.as_str()))
        .collect();
    assert!(kinds.contains(&(NodeKind::Class, "Server")), "{kinds:?}");
    assert!(kinds.contains(&(NodeKind::Interface, "Handler")), "{kinds:?}");
    assert!(kinds.contains(&(NodeKind::Method, "Server.Run")), "{kinds:?}");
    assert!(kinds.contains(&(NodeKind::Function, "main")), "{kinds:?}");
    assert!(kinds.contains(&(NodeKind::Package, "fmt")), "{kinds:?}");
}

#[test]
fn java_extraction_maps_classes_and_interfaces() {
    let extractor = Extractor::new("proj");
    let source = r#"
import java.util.List;

public class UserService implements Loader {
    public void load() {}
}

interface Loader {}
"#;

    let extraction = extractor.extract("src/UserService.java", source, &FixedResolver::empty()).unwrap();

    let kinds: Vec<(NodeKind, &str)> = extraction
        .nodes
        .iter()
        .map(|n| (n.kind, n.name.as_str()))
        .collect();
    assert!(kinds.contains(&(NodeKind::Class, "UserService")), "{kinds:?}");
    assert!(kinds.contains(&(NodeKind::Interface, "Loader")), "{kinds:?}");
    assert!(kinds.contains(&(NodeKind::Method, "UserService.load")), "{kinds:?}");

    let implements: Vec<_> = extraction
        .edges
        .iter()
        .filter(|e| e.edge_type == edge_types::IMPLEMENTS)
        .collect();
    assert_eq!(implements.len(), 1);
}

#[test]
fn markdown_extraction_produces_headings_and_doc_links() {
    let extractor = Extractor::new("proj");
    let resolver = FixedResolver::new(&[("./guide.md", "docs/guide.md")]);
    let source = r#"---
title: Overview
---

# Overview

See the [guide](./guide.md).

```rust
fn main() {}
```
"#;

    let extraction = extractor.extract("docs/README.md", source, &resolver).unwrap();

    let heading = extraction
        .nodes
        .iter()
        .find(|n| n.kind == NodeKind::Heading)
        .expect("heading node");
    assert_eq!(heading.name, "Overview");
    assert_eq!(heading.metadata.get("level").map(String::as_str), Some("1"));

    let links: Vec<_> = extraction
        .edges
        .iter()
        .filter(|e| e.edge_type == edge_types::DOC_LINKS_TO)
        .collect();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].target.to_string(), "proj/docs/guide.md#file:guide.md");
}

#[test]
fn oversize_file_is_skipped() {
    let extractor = Extractor::new("proj").with_max_file_bytes(16);
    let err = extractor
        .extract("src/big.ts", "export const x = 'way past the limit';", &FixedResolver::empty())
        .unwrap_err();
    assert!(matches!(err, Error::OversizeFile { .. }));
}

#[test]
fn unsupported_extension_fails() {
    let extractor = Extractor::new("proj");
    let err = extractor
        .extract("style.css", "body {}", &FixedResolver::empty())
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedLanguage { .. }));
}

#[test]
fn extraction_is_deterministic() {
    let extractor = Extractor::new("proj");
    let source = r#"
import { A } from './a';
export class B {}
"#;
    let resolver = FixedResolver::new(&[("./a", "src/a.ts")]);

    let first = extractor.extract("src/b.ts", source, &resolver).unwrap();
    let second = extractor.extract("src/b.ts", source, &resolver).unwrap();
    assert_eq!(first.nodes, second.nodes);
    assert_eq!(first.edges, second.edges);
}
