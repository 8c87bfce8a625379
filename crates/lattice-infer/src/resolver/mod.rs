//! Unknown-symbol resolution
//!
//! Tracks references whose declaration was not found during extraction and
//! proposes equivalences with known declarations. Final confidence for a
//! pair is the maximum over matching rules plus a small bonus per
//! additional agreeing rule, capped at 1.0; adding a rule match can never
//! lower a pair's confidence.

pub mod rules;

use std::collections::HashMap;
use std::sync::Arc;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use lattice_core::store::{EdgeFilter, NodeFilter, UnknownSymbolFilter, UnknownSymbolRecord};
use lattice_core::{
    EquivalenceRelation, Error, GraphEdge, GraphNode, GraphStore, NodeId, NodeKind, Result,
    UnknownSymbol,
};

use self::rules::{MatchRule, RULES, applies, kinds_compatible};

/// Per-candidate agreement bonus and acceptance floor.
#[derive(Debug, Clone, Copy)]
pub struct ResolverConfig {
    /// Minimum score `batch_infer` accepts.
    pub floor: f64,
    /// Added per agreeing rule beyond the first.
    pub agreement_bonus: f64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            floor: 0.75,
            agreement_bonus: 0.05,
        }
    }
}

/// A ranked candidate for one unknown symbol.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub node: GraphNode,
    pub score: f64,
    /// The strongest rule that matched.
    pub rule: &'static str,
    pub matched_rules: Vec<&'static str>,
}

/// Kinds a declaration candidate may have; files and packages never
/// answer a symbol reference.
const CANDIDATE_KINDS: &[NodeKind] = &[
    NodeKind::Class,
    NodeKind::Interface,
    NodeKind::Function,
    NodeKind::Method,
    NodeKind::Variable,
    NodeKind::Module,
];

pub struct UnknownSymbolResolver {
    store: Arc<GraphStore>,
    config: ResolverConfig,
}

impl UnknownSymbolResolver {
    pub fn new(store: Arc<GraphStore>) -> Self {
        UnknownSymbolResolver {
            store,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Idempotent on `(name, source_file, location)`.
    pub fn register_unknown(&self, record: &UnknownSymbolRecord) -> Result<UnknownSymbol> {
        let id = self.store.insert_unknown_symbol(record)?;
        self.store
            .get_unknown_symbol(id)?
            .ok_or_else(|| Error::NodeNotFound(format!("unknown symbol {id}")))
    }

    /// Ranked candidates for `unknown`, best first. Ties order by
    /// identifier so ranking is deterministic.
    pub fn find_candidates(&self, unknown: &UnknownSymbol) -> Result<Vec<Candidate>> {
        let mut pool: HashMap<NodeId, GraphNode> = HashMap::new();

        // Name-equal, case-insensitive-name-equal, and same-file nodes
        // cover every rule's candidate set.
        let by_name = self.store.find_nodes(&NodeFilter {
            name: Some(unknown.name.clone()),
            kinds: Some(CANDIDATE_KINDS.to_vec()),
            ..Default::default()
        })?;
        let by_name_ci = self.store.find_nodes(&NodeFilter {
            name_ci: Some(unknown.name.clone()),
            kinds: Some(CANDIDATE_KINDS.to_vec()),
            ..Default::default()
        })?;
        let same_file = self.store.find_nodes(&NodeFilter {
            source_files: Some(vec![unknown.source_file.clone()]),
            kinds: Some(CANDIDATE_KINDS.to_vec()),
            ..Default::default()
        })?;
        for node in by_name.into_iter().chain(by_name_ci).chain(same_file) {
            pool.insert(node.id, node);
        }

        let mut candidates = Vec::new();
        for node in pool.into_values() {
            let matched: Vec<&MatchRule> = RULES
                .iter()
                .filter(|rule| applies(rule, unknown, &node))
                .collect();
            if matched.is_empty() {
                continue;
            }
            let best = matched
                .iter()
                .max_by(|a, b| {
                    a.confidence
                        .partial_cmp(&b.confidence)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then(b.priority.cmp(&a.priority))
                })
                .expect("matched is non-empty");
            let score = (best.confidence
                + self.config.agreement_bonus * (matched.len() as f64 - 1.0))
                .min(1.0);
            candidates.push(Candidate {
                score,
                rule: best.name,
                matched_rules: matched.iter().map(|r| r.name).collect(),
                node,
            });
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.node.identifier.cmp(&b.node.identifier))
        });
        Ok(candidates)
    }

    pub fn create_equivalence(
        &self,
        unknown_id: i64,
        known_id: NodeId,
        score: f64,
        rule: &str,
    ) -> Result<EquivalenceRelation> {
        self.store.insert_equivalence(unknown_id, known_id, rule, score)
    }

    /// Top-1 candidate per unknown, kept when it clears the floor.
    pub fn batch_infer(&self, unknowns: &[UnknownSymbol]) -> Result<Vec<EquivalenceRelation>> {
        let mut relations = Vec::new();
        for unknown in unknowns {
            let candidates = self.find_candidates(unknown)?;
            let Some(best) = candidates.first() else { continue };
            if best.score < self.config.floor {
                tracing::debug!(
                    name = %unknown.name,
                    score = best.score,
                    "best candidate below floor"
                );
                continue;
            }
            relations.push(self.create_equivalence(
                unknown.id,
                best.node.id,
                best.score,
                best.rule,
            )?);
        }
        Ok(relations)
    }

    /// Cheap sanity checks; marks the relation validated when they pass.
    pub fn validate(&self, relation: &EquivalenceRelation) -> Result<bool> {
        if relation.confidence <= 0.0 {
            return Ok(false);
        }
        let Some(unknown) = self.store.get_unknown_symbol(relation.unknown_id)? else {
            return Ok(false);
        };
        let Some(known) = self.store.get_node(relation.known_id)? else {
            return Ok(false);
        };
        if !kinds_compatible(unknown.kind, known.kind) {
            return Ok(false);
        }
        self.store.set_equivalence_validated(relation.id, true)?;
        Ok(true)
    }

    /// Unknowns matching `query` by fuzzy name match, best first, within
    /// the given filters.
    pub fn search_unknowns(
        &self,
        query: &str,
        filter: &UnknownSymbolFilter,
    ) -> Result<Vec<UnknownSymbol>> {
        let symbols = self.store.find_unknown_symbols(filter)?;
        if query.is_empty() {
            return Ok(symbols);
        }
        let matcher = SkimMatcherV2::default();
        let mut scored: Vec<(i64, UnknownSymbol)> = symbols
            .into_iter()
            .filter_map(|symbol| {
                matcher
                    .fuzzy_match(&symbol.name, query)
                    .map(|score| (score, symbol))
            })
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));
        Ok(scored.into_iter().map(|(_, symbol)| symbol).collect())
    }

    pub fn statistics(&self) -> Result<lattice_core::EquivalenceStatistics> {
        self.store.equivalence_statistics()
    }

    /// Outgoing edges visible from `unknown_id`. With `follow_equivalences`
    /// a validated equivalence acts as a canonical pointer: the known
    /// node's outgoing edges are included.
    pub fn edges_for_unknown(
        &self,
        unknown_id: i64,
        follow_equivalences: bool,
    ) -> Result<Vec<GraphEdge>> {
        if !follow_equivalences {
            return Ok(Vec::new());
        }
        let mut edges = Vec::new();
        for relation in self.store.equivalences_for_unknown(unknown_id)? {
            if !relation.validated {
                continue;
            }
            edges.extend(self.store.find_edges(&EdgeFilter {
                source: Some(relation.known_id),
                ..Default::default()
            })?);
        }
        Ok(edges)
    }
}
