//! Equivalence match rules
//!
//! Evaluated in priority order; each rule yields at most one candidate
//! score per known node. Rule names are persisted on equivalence rows, so
//! they are stable identifiers.

use lattice_core::{GraphNode, NodeKind, UnknownSymbol};

pub const EXACT_NAME_MATCH: &str = "exact_name_match";
pub const TYPE_BASED_MATCH: &str = "type_based_match";
pub const CONTEXT_BASED_MATCH: &str = "context_based_match";
pub const SEMANTIC_MATCH: &str = "semantic_match";
pub const MANUAL: &str = "manual";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchRule {
    pub name: &'static str,
    pub priority: u8,
    pub confidence: f64,
}

pub const RULES: [MatchRule; 4] = [
    MatchRule {
        name: EXACT_NAME_MATCH,
        priority: 1,
        confidence: 0.90,
    },
    MatchRule {
        name: TYPE_BASED_MATCH,
        priority: 2,
        confidence: 0.75,
    },
    MatchRule {
        name: CONTEXT_BASED_MATCH,
        priority: 3,
        confidence: 0.70,
    },
    MatchRule {
        name: SEMANTIC_MATCH,
        priority: 4,
        confidence: 0.60,
    },
];

/// Does `rule` hold for this (unknown, known) pair?
pub fn applies(rule: &MatchRule, unknown: &UnknownSymbol, known: &GraphNode) -> bool {
    match rule.name {
        EXACT_NAME_MATCH => unknown.name == known.name && unknown.kind == known.kind,
        TYPE_BASED_MATCH => {
            unknown.name.eq_ignore_ascii_case(&known.name) && unknown.kind == known.kind
        }
        CONTEXT_BASED_MATCH => {
            unknown.name == known.name
                && known.source_file.as_deref() == Some(unknown.source_file.as_str())
        }
        SEMANTIC_MATCH => semantic_affinity(unknown, known),
        _ => false,
    }
}

/// Metadata-level affinity: matching names with compatible kinds, or a
/// namespace/owner hint agreeing with the reference.
fn semantic_affinity(unknown: &UnknownSymbol, known: &GraphNode) -> bool {
    if !unknown.name.eq_ignore_ascii_case(&known.name) {
        return false;
    }
    if kinds_compatible(unknown.kind, known.kind) {
        return true;
    }
    known
        .metadata
        .get("namespace")
        .or_else(|| known.metadata.get("owner"))
        .is_some_and(|hint| hint.eq_ignore_ascii_case(&unknown.name))
}

/// Class/interface and function/method pairs are close enough for the
/// heuristic rules; exact kind equality is rule 1's business.
pub fn kinds_compatible(a: NodeKind, b: NodeKind) -> bool {
    if a == b || a == NodeKind::Unknown || b == NodeKind::Unknown {
        return true;
    }
    matches!(
        (a, b),
        (NodeKind::Class, NodeKind::Interface)
            | (NodeKind::Interface, NodeKind::Class)
            | (NodeKind::Function, NodeKind::Method)
            | (NodeKind::Method, NodeKind::Function)
    )
}
