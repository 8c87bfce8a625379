//! Inference over the graph store
//!
//! Derives the edges implied by explicit edges under the registry's
//! algebra: transitive reachability with justification paths, hierarchical
//! rollups with inheritable materialization, and the specialization
//! closure that lets parent-type consumers see child-type edges.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use tokio::sync::mpsc;

use lattice_core::registry::rules;
use lattice_core::store::EdgeFilter;
use lattice_core::{
    EdgeDraft, EdgeId, EdgeTypeRegistry, Error, GraphEdge, GraphNode, GraphStore, NodeId, Result,
};

use crate::cache::{CacheKey, CachedTraversal, InferenceCache, QueryKind};

#[derive(Debug, Clone, Copy)]
pub struct TransitiveOptions {
    /// Path length cap; `0` means immediate successors only, same as `1`.
    pub max_depth: u32,
    pub time_budget: Duration,
}

impl Default for TransitiveOptions {
    fn default() -> Self {
        TransitiveOptions {
            max_depth: 10,
            time_budget: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HierarchicalOptions {
    pub include_children: bool,
    pub include_parents: bool,
    pub max_depth: u32,
}

impl Default for HierarchicalOptions {
    fn default() -> Self {
        HierarchicalOptions {
            include_children: false,
            include_parents: true,
            max_depth: 16,
        }
    }
}

/// One reachable node with the explicit edges that justify the path to it.
#[derive(Debug, Clone)]
pub struct TransitiveTarget {
    pub node: GraphNode,
    pub depth: u32,
    pub path: Vec<EdgeId>,
}

#[derive(Debug, Clone, Default)]
pub struct TransitiveResult {
    pub targets: Vec<TransitiveTarget>,
    pub cycle_detected: bool,
    pub truncated: bool,
}

/// An edge surfaced by hierarchical inference; `holder` is the node the
/// edge was found on, which differs from the focal node for inherited hits.
#[derive(Debug, Clone)]
pub struct HierarchicalHit {
    pub holder: NodeId,
    pub target: GraphNode,
    pub edge_type: String,
    pub rule: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct HierarchicalResult {
    pub hits: Vec<HierarchicalHit>,
    pub truncated: bool,
}

/// An edge as seen through the specialization closure. Implicit parent-type
/// edges carry a rule and no persisted id.
#[derive(Debug, Clone, PartialEq)]
pub struct InferredEdge {
    pub edge_id: Option<EdgeId>,
    pub source: NodeId,
    pub target: NodeId,
    pub edge_type: String,
    pub derived: bool,
    pub rule: Option<String>,
}

/// A change the engine should react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    NodeUpserted { node: NodeId },
    EdgeWritten { edge_type: String },
    FileReplaced { path: String },
}

pub struct InferenceEngine {
    store: Arc<GraphStore>,
    registry: Arc<EdgeTypeRegistry>,
    cache: InferenceCache,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>,
}

impl InferenceEngine {
    pub fn new(store: Arc<GraphStore>, registry: Arc<EdgeTypeRegistry>) -> Self {
        InferenceEngine {
            store,
            registry,
            cache: InferenceCache::default(),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_cache(mut self, cache: InferenceCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache_stats(&self) -> crate::cache::CacheStats {
        self.cache.stats()
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<EdgeTypeRegistry> {
        &self.registry
    }

    /// Edge type plus all of its registered specializations, recursively.
    fn type_closure(&self, edge_type: &str) -> Vec<String> {
        let mut closure = vec![edge_type.to_string()];
        let mut queue = VecDeque::from([edge_type.to_string()]);
        while let Some(current) = queue.pop_front() {
            for child in self.registry.children_of(&current) {
                if !closure.contains(&child.edge_type) {
                    closure.push(child.edge_type.clone());
                    queue.push_back(child.edge_type);
                }
            }
        }
        closure
    }

    /// All nodes reachable from `start` along explicit `edge_type` edges
    /// (specializations included) within the depth budget. Breadth-first;
    /// ties inside a depth level order by target identifier. A node is
    /// visited at most once; the cycle flag reflects the reachable subgraph.
    pub fn query_transitive(
        &self,
        start: NodeId,
        edge_type: &str,
        options: TransitiveOptions,
    ) -> Result<TransitiveResult> {
        let spec = self.registry.require(edge_type)?;
        let max_depth = options.max_depth.max(1);

        let key = CacheKey {
            kind: QueryKind::Transitive,
            start,
            params: fingerprint(&(max_depth, options.time_budget.as_millis() as u64)),
        };
        let generation = self.store.generation_for(edge_type);
        if let Some(cached) = self.cache.get(edge_type, &key, generation) {
            return self.rehydrate(cached);
        }

        let deadline = Instant::now() + options.time_budget;
        let closure = self.type_closure(edge_type);
        let edges = self.store.find_edges(&EdgeFilter {
            edge_types: Some(closure),
            derived: Some(false),
            ..Default::default()
        })?;

        let mut adjacency: HashMap<NodeId, Vec<&GraphEdge>> = HashMap::new();
        let mut cycle_graph: DiGraphMap<i64, ()> = DiGraphMap::new();
        for edge in &edges {
            if edge.source == edge.target && !spec.allows_self_loops {
                continue;
            }
            adjacency.entry(edge.source).or_default().push(edge);
            cycle_graph.add_edge(edge.source.0, edge.target.0, ());
        }

        let mut visited: HashSet<NodeId> = HashSet::from([start]);
        let mut truncated = false;
        let mut targets: Vec<(NodeId, u32, Vec<EdgeId>)> = Vec::new();
        let mut frontier: Vec<(NodeId, Vec<EdgeId>)> = vec![(start, Vec::new())];

        let mut depth = 0;
        while !frontier.is_empty() {
            depth += 1;
            if depth > max_depth {
                // Anything still outgoing from the frontier is beyond the
                // depth budget.
                truncated = frontier
                    .iter()
                    .any(|(node, _)| adjacency.get(node).is_some_and(|edges| {
                        edges.iter().any(|e| !visited.contains(&e.target))
                    }));
                break;
            }
            if Instant::now() > deadline {
                truncated = true;
                break;
            }

            let mut next: Vec<(NodeId, Vec<EdgeId>)> = Vec::new();
            for (node, path) in &frontier {
                let Some(outgoing) = adjacency.get(node) else { continue };
                for edge in outgoing {
                    // Visited at most once per query; a revisit is fine in a
                    // DAG, cycles are judged on the reachable subgraph below.
                    if !visited.insert(edge.target) {
                        continue;
                    }
                    let mut next_path = path.clone();
                    next_path.push(edge.id);
                    targets.push((edge.target, depth, next_path.clone()));
                    next.push((edge.target, next_path));
                }
            }
            frontier = next;
        }

        let mut reachable_graph: DiGraphMap<i64, ()> = DiGraphMap::new();
        for (from, to, _) in cycle_graph.all_edges() {
            if visited.contains(&NodeId(from)) && visited.contains(&NodeId(to)) {
                reachable_graph.add_edge(from, to, ());
            }
        }
        let cycle_detected = is_cyclic_directed(&reachable_graph);

        let cached = CachedTraversal {
            targets,
            cycle_detected,
            truncated,
            generation,
        };
        self.cache.insert(edge_type, key, cached.clone());
        self.rehydrate(cached)
    }

    /// Fetch node payloads for a cached traversal and apply the result
    /// ordering: depth first, then identifier.
    fn rehydrate(&self, cached: CachedTraversal) -> Result<TransitiveResult> {
        let mut targets = Vec::with_capacity(cached.targets.len());
        for (node_id, depth, path) in cached.targets {
            let node = self
                .store
                .get_node(node_id)?
                .ok_or_else(|| Error::NodeNotFound(format!("node {}", node_id.0)))?;
            targets.push(TransitiveTarget { node, depth, path });
        }
        // Ties inside a depth level break on the identifier's string form.
        targets.sort_by(|a, b| {
            a.depth
                .cmp(&b.depth)
                .then_with(|| a.node.identifier.to_string().cmp(&b.node.identifier.to_string()))
        });
        Ok(TransitiveResult {
            targets,
            cycle_detected: cached.cycle_detected,
            truncated: cached.truncated,
        })
    }

    /// Outgoing edges of `edge_type` at `node` through the specialization
    /// closure: explicit edges of the type itself plus implicit parent-type
    /// views of child-type edges.
    pub fn edges_with_specialization(
        &self,
        node: NodeId,
        edge_type: &str,
    ) -> Result<Vec<InferredEdge>> {
        self.registry.require(edge_type)?;
        let mut result = Vec::new();
        for member_type in self.type_closure(edge_type) {
            let edges = self.store.find_edges(&EdgeFilter {
                source: Some(node),
                edge_types: Some(vec![member_type.clone()]),
                ..Default::default()
            })?;
            for edge in edges {
                if member_type == edge_type {
                    result.push(InferredEdge {
                        edge_id: Some(edge.id),
                        source: edge.source,
                        target: edge.target,
                        edge_type: edge.edge_type.clone(),
                        derived: edge.derived,
                        rule: edge.rule.clone(),
                    });
                } else {
                    result.push(InferredEdge {
                        edge_id: None,
                        source: edge.source,
                        target: edge.target,
                        edge_type: edge_type.to_string(),
                        derived: true,
                        rule: Some(rules::specialization_of(&member_type, edge_type)),
                    });
                }
            }
        }
        Ok(result)
    }

    /// Walk the hierarchical backbone from `node` and collect outgoing
    /// `edge_type` edges at every visited ancestor/descendant. When the
    /// type is inheritable, edges found on ancestors are materialized as
    /// derived edges on the focal node with rule `inherited_via_hierarchy`.
    pub fn query_hierarchical(
        &self,
        node: NodeId,
        edge_type: &str,
        options: HierarchicalOptions,
    ) -> Result<HierarchicalResult> {
        let spec = self.registry.require(edge_type)?;
        let hierarchical = self
            .registry
            .hierarchical_type()
            .ok_or_else(|| Error::UnknownEdgeType("no hierarchical type registered".into()))?;

        let mut result = HierarchicalResult::default();
        let mut holders: Vec<(NodeId, bool)> = vec![(node, false)];
        if options.include_parents {
            let (ancestors, truncated) =
                self.walk_hierarchy(node, &hierarchical.edge_type, true, options.max_depth)?;
            result.truncated |= truncated;
            for ancestor in ancestors {
                holders.push((ancestor, true));
            }
        }
        if options.include_children {
            let (descendants, truncated) =
                self.walk_hierarchy(node, &hierarchical.edge_type, false, options.max_depth)?;
            result.truncated |= truncated;
            for descendant in descendants {
                holders.push((descendant, false));
            }
        }
        for (holder, is_ancestor) in holders {
            for edge in self.edges_with_specialization(holder, edge_type)? {
                // Skip inherited copies already materialized on the holder,
                // otherwise re-runs double-report them.
                if edge.rule.as_deref() == Some(rules::INHERITED_VIA_HIERARCHY) && holder == node {
                    continue;
                }
                let target = self
                    .store
                    .get_node(edge.target)?
                    .ok_or_else(|| Error::NodeNotFound(format!("node {}", edge.target.0)))?;

                // Never materialize a self-loop on the focal node unless
                // the edge type allows them.
                if edge.target == node && !spec.allows_self_loops && is_ancestor {
                    continue;
                }

                let inherited = is_ancestor && spec.is_inheritable;
                if inherited {
                    let focal = self
                        .store
                        .get_node(node)?
                        .ok_or_else(|| Error::NodeNotFound(format!("node {}", node.0)))?;
                    let draft = EdgeDraft::derived(
                        focal.identifier.clone(),
                        target.identifier.clone(),
                        edge_type,
                        rules::INHERITED_VIA_HIERARCHY,
                    )
                    .with_metadata(
                        "path",
                        edge.edge_id.map(|id| id.0.to_string()).unwrap_or_default(),
                    );
                    self.store.upsert_edge(&draft)?;
                }

                result.hits.push(HierarchicalHit {
                    holder,
                    target,
                    edge_type: edge_type.to_string(),
                    rule: if inherited {
                        Some(rules::INHERITED_VIA_HIERARCHY.to_string())
                    } else {
                        edge.rule
                    },
                });
            }
        }
        Ok(result)
    }

    /// Ancestors (`upward`) or descendants of `node` along the hierarchical
    /// type, nearest first, visited at most once. The flag reports whether
    /// the depth budget cut the walk short.
    fn walk_hierarchy(
        &self,
        node: NodeId,
        hierarchical_type: &str,
        upward: bool,
        max_depth: u32,
    ) -> Result<(Vec<NodeId>, bool)> {
        let mut found = Vec::new();
        let mut visited = HashSet::from([node]);
        let mut frontier = vec![node];
        let mut depth = 0;

        while !frontier.is_empty() && depth < max_depth {
            depth += 1;
            let mut next = Vec::new();
            for current in &frontier {
                let filter = if upward {
                    EdgeFilter {
                        target: Some(*current),
                        edge_types: Some(vec![hierarchical_type.to_string()]),
                        ..Default::default()
                    }
                } else {
                    EdgeFilter {
                        source: Some(*current),
                        edge_types: Some(vec![hierarchical_type.to_string()]),
                        ..Default::default()
                    }
                };
                for edge in self.store.find_edges(&filter)? {
                    let neighbor = if upward { edge.source } else { edge.target };
                    if visited.insert(neighbor) {
                        found.push(neighbor);
                        next.push(neighbor);
                    }
                }
            }
            frontier = next;
        }
        Ok((found, !frontier.is_empty()))
    }

    /// Subscribe to change notifications; events arrive in the order
    /// changes were observed.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Eagerly drop affected cache entries and fan the event out to
    /// subscribers.
    pub fn process_change(&self, event: ChangeEvent) {
        match &event {
            ChangeEvent::EdgeWritten { edge_type } => self.cache.invalidate_type(edge_type),
            ChangeEvent::NodeUpserted { .. } | ChangeEvent::FileReplaced { .. } => {
                self.cache.invalidate_all()
            }
        }
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

fn fingerprint<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
