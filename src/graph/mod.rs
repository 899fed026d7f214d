//! The pipeline graph: topology, validation, schema propagation and item flow.
//!
//! A [`Graph`] is built from a [`PipelineDefinition`]: every node declares the
//! stream tokens it produces (`dst`, one per output port) and the tokens it
//! consumes (`src`); matching tokens become edges. Source nodes list external
//! `"project/dataset"` selectors in `src` instead. The adjacency index is
//! precomputed once per build, so traversal never rescans the edge list, and
//! edge insertion rejects cycles before any schema work happens.

use crate::error::{GraphError, RunError};
use crate::mapping::ResolvedMapping;
use crate::node::{Layer, LayerRegistry, NodeKind, NodeState, Routed};
use crate::pipeline::PipelineDefinition;
use crate::schema::Schema;
use ahash::AHashMap;
use std::collections::BinaryHeap;

mod exec;
mod schema_flow;

pub use exec::ExecEnv;

/// A directed connection between two node ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub from: usize,
    pub from_port: usize,
    pub to: usize,
    pub to_port: usize,
}

/// One node at runtime: the layer plus everything the graph caches for it.
pub struct GraphNode {
    pub id: String,
    pub layer: Box<dyn Layer>,
    pub state: NodeState,
    /// The merged input schema the cached resolution was computed from.
    cached_input: Option<Schema>,
    resolved: Option<ResolvedMapping>,
    /// Routed outputs of the last preview pass, reused for untouched nodes.
    preview_cache: Option<Vec<Routed>>,
}

impl GraphNode {
    fn new(id: String, layer: Box<dyn Layer>) -> Self {
        Self {
            id,
            layer,
            state: NodeState::Unconfigured,
            cached_input: None,
            resolved: None,
            preview_cache: None,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.layer.kind()
    }

    /// The node's resolved output schema, once propagation has run.
    pub fn output_schema(&self) -> Option<&Schema> {
        self.resolved.as_ref().map(|r| &r.schema)
    }
}

/// The DAG of nodes and edges, with a precomputed adjacency index and a
/// deterministic topological order.
pub struct Graph {
    definition: PipelineDefinition,
    nodes: Vec<GraphNode>,
    ids: AHashMap<String, usize>,
    edges: Vec<Edge>,
    incoming: Vec<Vec<usize>>,
    outgoing: Vec<Vec<usize>>,
    topo: Vec<usize>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

impl Graph {
    /// Builds and validates a graph from a pipeline document.
    ///
    /// Fails fast: unknown actions, duplicate ids, dangling stream tokens,
    /// cycles and invalid node settings are all reported here, before any
    /// schema computation or item flow.
    pub fn from_definition(
        definition: PipelineDefinition,
        registry: &LayerRegistry,
    ) -> Result<Graph, GraphError> {
        let mut graph = Graph {
            definition: PipelineDefinition::default(),
            nodes: Vec::new(),
            ids: AHashMap::new(),
            edges: Vec::new(),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            topo: Vec::new(),
        };

        for node_def in &definition.nodes {
            let factory =
                registry
                    .get(&node_def.action)
                    .ok_or_else(|| GraphError::UnknownAction {
                        node_id: node_def.id.clone(),
                        action: node_def.action.clone(),
                    })?;
            let layer = factory
                .create(node_def)
                .map_err(|error| GraphError::BadSettings {
                    node_id: node_def.id.clone(),
                    error,
                })?;
            graph.add_node(node_def.id.clone(), layer)?;
        }

        // Producer index: stream token -> (node, output port).
        let mut producers: AHashMap<&str, (usize, usize)> = AHashMap::new();
        for (idx, node_def) in definition.nodes.iter().enumerate() {
            for (port, token) in node_def.dst.iter().enumerate() {
                if producers.insert(token, (idx, port)).is_some() {
                    return Err(GraphError::AmbiguousStream {
                        token: token.clone(),
                    });
                }
            }
        }

        for (to, node_def) in definition.nodes.iter().enumerate() {
            if graph.nodes[to].kind() == NodeKind::Source {
                continue;
            }
            for (to_port, token) in node_def.src.iter().enumerate() {
                let &(from, from_port) =
                    producers
                        .get(token.as_str())
                        .ok_or_else(|| GraphError::DanglingSource {
                            node_id: node_def.id.clone(),
                            src: token.clone(),
                        })?;
                graph.add_edge(from, from_port, to, to_port)?;
            }
        }

        graph.definition = definition;
        graph.rebuild_topo();
        graph.validate()?;
        for node in &mut graph.nodes {
            node.state = NodeState::Validated;
        }
        Ok(graph)
    }

    /// The persisted document this graph was built from. Round-trips
    /// losslessly through [`Graph::from_definition`].
    pub fn to_definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    fn add_node(&mut self, id: String, layer: Box<dyn Layer>) -> Result<usize, GraphError> {
        if self.ids.contains_key(&id) {
            return Err(GraphError::DuplicateNodeId(id));
        }
        let idx = self.nodes.len();
        self.ids.insert(id.clone(), idx);
        self.nodes.push(GraphNode::new(id, layer));
        self.incoming.push(Vec::new());
        self.outgoing.push(Vec::new());
        Ok(idx)
    }

    /// Inserts an edge, rejecting it when the reverse path already exists.
    fn add_edge(
        &mut self,
        from: usize,
        from_port: usize,
        to: usize,
        to_port: usize,
    ) -> Result<(), GraphError> {
        if from == to || self.reaches(to, from) {
            return Err(GraphError::Cycle {
                from: self.nodes[from].id.clone(),
                to: self.nodes[to].id.clone(),
            });
        }
        let edge_idx = self.edges.len();
        self.edges.push(Edge {
            from,
            from_port,
            to,
            to_port,
        });
        self.outgoing[from].push(edge_idx);
        self.incoming[to].push(edge_idx);
        Ok(())
    }

    /// Whether `to` is reachable from `from` over existing edges.
    fn reaches(&self, from: usize, to: usize) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(idx) = stack.pop() {
            if idx == to {
                return true;
            }
            if std::mem::replace(&mut seen[idx], true) {
                continue;
            }
            stack.extend(self.outgoing[idx].iter().map(|&e| self.edges[e].to));
        }
        false
    }

    /// Kahn's algorithm with ties broken by node declaration order, so the
    /// rename suffix ladder resolves identically on every run.
    fn rebuild_topo(&mut self) {
        let mut indegree: Vec<usize> = self.incoming.iter().map(Vec::len).collect();
        // Min-heap over declaration indices.
        let mut ready: BinaryHeap<std::cmp::Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(idx, _)| std::cmp::Reverse(idx))
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(std::cmp::Reverse(idx)) = ready.pop() {
            order.push(idx);
            for &e in &self.outgoing[idx] {
                let to = self.edges[e].to;
                indegree[to] -= 1;
                if indegree[to] == 0 {
                    ready.push(std::cmp::Reverse(to));
                }
            }
        }
        self.topo = order;
    }

    /// Structural checks beyond what edge insertion enforces.
    fn validate(&self) -> Result<(), GraphError> {
        for (idx, node) in self.nodes.iter().enumerate() {
            let kind = node.kind();
            if kind != NodeKind::Source && self.incoming[idx].is_empty() {
                return Err(GraphError::NoInput {
                    node_id: node.id.clone(),
                });
            }
            let dst_count = self.definition.nodes[idx].dst.len();
            let (min, max) = match kind {
                NodeKind::Conditional => (2, 2),
                NodeKind::Sink => (0, 1),
                _ => (0, 1),
            };
            if dst_count < min || dst_count > max {
                return Err(GraphError::BadPortCount {
                    node_id: node.id.clone(),
                    expected: if min == max {
                        min.to_string()
                    } else {
                        format!("at most {max}")
                    },
                    found: dst_count,
                });
            }
            node.layer
                .validate()
                .map_err(|error| GraphError::BadSettings {
                    node_id: node.id.clone(),
                    error,
                })?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.ids.get(id).map(|&idx| &self.nodes[idx])
    }

    /// Node ids in the deterministic processing order.
    pub fn topo_order(&self) -> Vec<&str> {
        self.topo
            .iter()
            .map(|&idx| self.nodes[idx].id.as_str())
            .collect()
    }

    /// The resolved output schema of a node, once propagation has run.
    pub fn output_schema(&self, id: &str) -> Option<&Schema> {
        self.node(id).and_then(GraphNode::output_schema)
    }

    /// Node id -> resolved output schema for every node, used to persist a
    /// compiled pipeline artifact.
    pub fn node_schemas(&self) -> AHashMap<String, Schema> {
        self.nodes
            .iter()
            .filter_map(|n| n.output_schema().map(|s| (n.id.clone(), s.clone())))
            .collect()
    }

    pub(crate) fn source_indices(&self) -> Vec<usize> {
        self.topo
            .iter()
            .copied()
            .filter(|&idx| self.nodes[idx].kind() == NodeKind::Source)
            .collect()
    }

    pub(crate) fn sink_indices(&self) -> Vec<usize> {
        self.topo
            .iter()
            .copied()
            .filter(|&idx| self.nodes[idx].kind() == NodeKind::Sink)
            .collect()
    }

    pub(crate) fn node_index(&self, id: &str) -> Option<usize> {
        self.ids.get(id).copied()
    }

    pub(crate) fn source_selectors(&self, idx: usize) -> Vec<crate::collab::SourceSelector> {
        self.nodes[idx].layer.source_selectors()
    }

    fn resolved(&self, idx: usize) -> Result<&ResolvedMapping, RunError> {
        self.nodes[idx]
            .resolved
            .as_ref()
            .ok_or_else(|| {
                RunError::Graph(GraphError::SchemaNotReady {
                    node_id: self.nodes[idx].id.clone(),
                })
            })
    }
}
