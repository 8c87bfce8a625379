//! Edge type registry
//!
//! Process-shared catalog of relationship kinds and their algebraic
//! properties. Append-only within a process: re-registering an identical
//! spec is a no-op, a conflicting spec is rejected. The specialization
//! graph over edge types is kept a forest, and at most one type may be
//! hierarchical per registry instance.

use dashmap::DashMap;
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Well-known edge type names.
pub mod edge_types {
    pub const CONTAINS: &str = "contains";
    pub const DEPENDS_ON: &str = "depends_on";
    pub const IMPORTS_FILE: &str = "imports_file";
    pub const IMPORTS_PACKAGE: &str = "imports_package";
    pub const RE_EXPORTS: &str = "re_exports";
    pub const EXTENDS: &str = "extends";
    pub const IMPLEMENTS: &str = "implements";
    pub const REFERENCES: &str = "references";
    pub const RENDERS: &str = "renders";
    pub const DEFINES: &str = "defines";
    pub const DOC_LINKS_TO: &str = "doc_links_to";
}

/// Rule identifiers cited by derived edges.
pub mod rules {
    pub const TRANSITIVE: &str = "transitive";
    pub const INHERITED_VIA_HIERARCHY: &str = "inherited_via_hierarchy";

    /// Rule for an implicit parent-type edge implied by a child-type edge.
    pub fn specialization_of(child: &str, parent: &str) -> String {
        format!("specialization_of({child},{parent})")
    }
}

/// Declared algebraic properties of one relationship kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeTypeSpec {
    pub edge_type: String,
    /// `A—t→B ∧ B—t→C ⇒ A—t→C`.
    #[serde(default)]
    pub is_transitive: bool,
    /// Outgoing edges propagate from hierarchical ancestors to descendants.
    #[serde(default)]
    pub is_inheritable: bool,
    /// This type IS the containment backbone used by inheritability.
    #[serde(default)]
    pub is_hierarchical: bool,
    #[serde(default = "default_directed")]
    pub is_directed: bool,
    /// Tie-break for rule ordering; lower wins.
    #[serde(default)]
    pub priority: i32,
    /// More abstract type this one specializes; a child edge implies an
    /// implicit edge of the parent type.
    #[serde(default)]
    pub parent: Option<String>,
    /// Whether self-loop edges of this type are storable.
    #[serde(default)]
    pub allows_self_loops: bool,
}

fn default_directed() -> bool {
    true
}

impl EdgeTypeSpec {
    pub fn new(edge_type: impl Into<String>) -> Self {
        EdgeTypeSpec {
            edge_type: edge_type.into(),
            is_transitive: false,
            is_inheritable: false,
            is_hierarchical: false,
            is_directed: true,
            priority: 0,
            parent: None,
            allows_self_loops: false,
        }
    }

    pub fn transitive(mut self) -> Self {
        self.is_transitive = true;
        self
    }

    pub fn inheritable(mut self) -> Self {
        self.is_inheritable = true;
        self
    }

    pub fn hierarchical(mut self) -> Self {
        self.is_hierarchical = true;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Counts exposed by [`EdgeTypeRegistry::statistics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStatistics {
    pub total: usize,
    pub transitive: usize,
    pub inheritable: usize,
    pub specialized: usize,
    pub has_hierarchical: bool,
}

/// Thread-safe, append-only catalog of edge type specs.
pub struct EdgeTypeRegistry {
    specs: DashMap<String, EdgeTypeSpec>,
}

impl EdgeTypeRegistry {
    /// An empty registry. Most callers want [`EdgeTypeRegistry::with_builtins`].
    pub fn new() -> Self {
        EdgeTypeRegistry {
            specs: DashMap::new(),
        }
    }

    /// A registry pre-loaded with the builtin vocabulary.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        for spec in builtin_specs() {
            // Builtins are internally consistent; registration cannot fail.
            registry
                .register(spec)
                .expect("builtin edge type specs are consistent");
        }
        registry
    }

    /// Register a spec. Idempotent on identical re-registration; a
    /// conflicting spec for an existing type fails with `EdgeTypeConflict`.
    pub fn register(&self, spec: EdgeTypeSpec) -> Result<()> {
        if let Some(existing) = self.specs.get(&spec.edge_type) {
            if *existing == spec {
                tracing::debug!(edge_type = %spec.edge_type, "edge type already registered");
                return Ok(());
            }
            return Err(Error::EdgeTypeConflict(spec.edge_type));
        }

        if spec.is_hierarchical {
            if let Some(existing) = self.hierarchical_type() {
                if existing.edge_type != spec.edge_type {
                    return Err(Error::EdgeTypeConflict(format!(
                        "{}: hierarchical type already claimed by {}",
                        spec.edge_type, existing.edge_type
                    )));
                }
            }
        }

        if let Some(parent) = &spec.parent {
            if self.would_cycle(&spec.edge_type, parent) {
                return Err(Error::EdgeTypeConflict(format!(
                    "{}: specialization cycle through {parent}",
                    spec.edge_type
                )));
            }
        }

        tracing::debug!(edge_type = %spec.edge_type, "registered edge type");
        self.specs.insert(spec.edge_type.clone(), spec);
        Ok(())
    }

    pub fn get(&self, edge_type: &str) -> Option<EdgeTypeSpec> {
        self.specs.get(edge_type).map(|r| r.value().clone())
    }

    pub fn contains(&self, edge_type: &str) -> bool {
        self.specs.contains_key(edge_type)
    }

    /// Spec for `edge_type`, or `UnknownEdgeType`.
    pub fn require(&self, edge_type: &str) -> Result<EdgeTypeSpec> {
        self.get(edge_type)
            .ok_or_else(|| Error::UnknownEdgeType(edge_type.to_string()))
    }

    pub fn transitive_types(&self) -> Vec<EdgeTypeSpec> {
        let mut specs: Vec<_> = self
            .specs
            .iter()
            .filter(|r| r.value().is_transitive)
            .map(|r| r.value().clone())
            .collect();
        specs.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.edge_type.cmp(&b.edge_type)));
        specs
    }

    pub fn inheritable_types(&self) -> Vec<EdgeTypeSpec> {
        let mut specs: Vec<_> = self
            .specs
            .iter()
            .filter(|r| r.value().is_inheritable)
            .map(|r| r.value().clone())
            .collect();
        specs.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.edge_type.cmp(&b.edge_type)));
        specs
    }

    /// The single containment relation, when one is registered.
    pub fn hierarchical_type(&self) -> Option<EdgeTypeSpec> {
        self.specs
            .iter()
            .find(|r| r.value().is_hierarchical)
            .map(|r| r.value().clone())
    }

    /// Direct specializations of `edge_type`.
    pub fn children_of(&self, edge_type: &str) -> Vec<EdgeTypeSpec> {
        let mut specs: Vec<_> = self
            .specs
            .iter()
            .filter(|r| r.value().parent.as_deref() == Some(edge_type))
            .map(|r| r.value().clone())
            .collect();
        specs.sort_by(|a, b| a.edge_type.cmp(&b.edge_type));
        specs
    }

    /// Parent chain of `edge_type`, nearest first.
    pub fn ancestors_of(&self, edge_type: &str) -> Vec<EdgeTypeSpec> {
        let mut chain = Vec::new();
        let mut current = self.get(edge_type).and_then(|s| s.parent);
        while let Some(parent) = current {
            match self.get(&parent) {
                Some(spec) => {
                    current = spec.parent.clone();
                    chain.push(spec);
                }
                None => break,
            }
        }
        chain
    }

    pub fn statistics(&self) -> RegistryStatistics {
        RegistryStatistics {
            total: self.specs.len(),
            transitive: self.specs.iter().filter(|r| r.value().is_transitive).count(),
            inheritable: self.specs.iter().filter(|r| r.value().is_inheritable).count(),
            specialized: self.specs.iter().filter(|r| r.value().parent.is_some()).count(),
            has_hierarchical: self.hierarchical_type().is_some(),
        }
    }

    /// Would adding `child → parent` make the specialization graph cyclic?
    fn would_cycle(&self, child: &str, parent: &str) -> bool {
        let snapshot: Vec<(String, String)> = self
            .specs
            .iter()
            .filter_map(|r| {
                r.value()
                    .parent
                    .as_ref()
                    .map(|p| (r.key().clone(), p.clone()))
            })
            .collect();
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for (c, p) in &snapshot {
            graph.add_edge(c.as_str(), p.as_str(), ());
        }
        graph.add_edge(child, parent, ());
        is_cyclic_directed(&graph)
    }
}

impl Default for EdgeTypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// The default relationship vocabulary written by the extractor.
pub fn builtin_specs() -> Vec<EdgeTypeSpec> {
    use edge_types::*;
    vec![
        EdgeTypeSpec::new(CONTAINS).hierarchical().with_priority(0),
        EdgeTypeSpec::new(DEPENDS_ON).transitive().with_priority(1),
        EdgeTypeSpec::new(IMPORTS_FILE).with_parent(DEPENDS_ON).with_priority(2),
        EdgeTypeSpec::new(IMPORTS_PACKAGE).with_parent(DEPENDS_ON).with_priority(2),
        EdgeTypeSpec::new(RE_EXPORTS).with_parent(DEPENDS_ON).with_priority(2),
        EdgeTypeSpec::new(EXTENDS).transitive().with_priority(3),
        EdgeTypeSpec::new(IMPLEMENTS).with_priority(3),
        EdgeTypeSpec::new(REFERENCES).with_priority(4),
        EdgeTypeSpec::new(RENDERS).inheritable().with_priority(4),
        EdgeTypeSpec::new(DEFINES).with_priority(5),
        EdgeTypeSpec::new(DOC_LINKS_TO).with_priority(5),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_reregistration_is_idempotent() {
        let registry = EdgeTypeRegistry::with_builtins();
        registry
            .register(EdgeTypeSpec::new(edge_types::DEPENDS_ON).transitive().with_priority(1))
            .unwrap();
        assert_eq!(registry.statistics().total, builtin_specs().len());
    }

    #[test]
    fn conflicting_reregistration_fails() {
        let registry = EdgeTypeRegistry::with_builtins();
        let err = registry
            .register(EdgeTypeSpec::new(edge_types::DEPENDS_ON))
            .unwrap_err();
        assert!(matches!(err, Error::EdgeTypeConflict(_)));
    }

    #[test]
    fn second_hierarchical_type_is_rejected() {
        let registry = EdgeTypeRegistry::with_builtins();
        let err = registry
            .register(EdgeTypeSpec::new("owns").hierarchical())
            .unwrap_err();
        assert!(matches!(err, Error::EdgeTypeConflict(_)));
    }

    #[test]
    fn specialization_cycles_are_rejected() {
        let registry = EdgeTypeRegistry::new();
        registry.register(EdgeTypeSpec::new("b").with_parent("a")).unwrap();
        let err = registry
            .register(EdgeTypeSpec::new("a").with_parent("b"))
            .unwrap_err();
        assert!(matches!(err, Error::EdgeTypeConflict(_)));

        let err = registry
            .register(EdgeTypeSpec::new("c").with_parent("c"))
            .unwrap_err();
        assert!(matches!(err, Error::EdgeTypeConflict(_)));
    }

    #[test]
    fn children_and_ancestors_views() {
        let registry = EdgeTypeRegistry::with_builtins();
        let children = registry.children_of(edge_types::DEPENDS_ON);
        let names: Vec<_> = children.iter().map(|s| s.edge_type.as_str()).collect();
        assert_eq!(names, vec![
            edge_types::IMPORTS_FILE,
            edge_types::IMPORTS_PACKAGE,
            edge_types::RE_EXPORTS,
        ]);

        let ancestors = registry.ancestors_of(edge_types::IMPORTS_FILE);
        assert_eq!(ancestors.len(), 1);
        assert_eq!(ancestors[0].edge_type, edge_types::DEPENDS_ON);
    }

    #[test]
    fn hierarchical_type_is_contains() {
        let registry = EdgeTypeRegistry::with_builtins();
        assert_eq!(
            registry.hierarchical_type().unwrap().edge_type,
            edge_types::CONTAINS
        );
    }
}
