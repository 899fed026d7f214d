//! Item flow through the graph: full-batch passes and single-item previews.

use crate::collab::{InferenceClient, ItemStore};
use crate::error::RunError;
use crate::executor::context::RunContext;
use crate::item::Item;
use crate::node::{LayerContext, NodeKind, NodeState, Routed, SinkOutput};
use ahash::{AHashMap, AHashSet};
use rand::rngs::StdRng;

use super::Graph;

/// Everything a graph pass needs from the outside world, threaded explicitly
/// from the executor.
pub struct ExecEnv<'e> {
    pub run: &'e RunContext,
    pub store: &'e dyn ItemStore,
    pub inference: Option<&'e dyn InferenceClient>,
    /// Per-run RNG; conditional routing is reproducible under a fixed seed.
    pub rng: &'e mut StdRng,
}

impl Graph {
    /// Pushes one batch of source items through the whole graph.
    ///
    /// `seeds` maps a source node index to the items pulled for it this pass.
    /// Nodes run once per batch in topological order; each node's routed
    /// outputs are remapped through its resolved name rewrites and fanned out
    /// to every downstream edge of the emitting port. Fan-out shares items by
    /// clone of the `Arc`-backed content, never by copying bytes.
    pub(crate) fn process_batch(
        &mut self,
        seeds: AHashMap<usize, Vec<Item>>,
        env: &mut ExecEnv<'_>,
    ) -> Result<(), RunError> {
        let mut buffers: Vec<Vec<Item>> = (0..self.nodes.len()).map(|_| Vec::new()).collect();
        for (idx, items) in seeds {
            buffers[idx] = items;
        }
        for idx in self.topo.clone() {
            let items = std::mem::take(&mut buffers[idx]);
            if items.is_empty() {
                continue;
            }
            let routed = match self.run_node(idx, items, env) {
                Ok(routed) => routed,
                Err(err) => {
                    self.nodes[idx].state = NodeState::Failed;
                    return Err(err);
                }
            };
            self.fan_out(idx, routed, &mut buffers)?;
            self.nodes[idx].state = NodeState::Ready;
        }
        Ok(())
    }

    /// Runs one node's batched transform. Item-level failures are already
    /// degraded inside the layer; an error here is fatal.
    fn run_node(
        &mut self,
        idx: usize,
        items: Vec<Item>,
        env: &mut ExecEnv<'_>,
    ) -> Result<Vec<Routed>, RunError> {
        let node = &mut self.nodes[idx];
        node.state = NodeState::Processing;
        tracing::debug!(
            node = %node.id,
            action = node.layer.action(),
            items = items.len(),
            "processing batch"
        );
        let mut ctx = LayerContext {
            node_id: &node.id,
            run: env.run,
            store: env.store,
            inference: env.inference,
            rng: env.rng,
        };
        node.layer.transform_batch(items, &mut ctx)
    }

    /// Applies the node's name rewrites and forwards each routed item to the
    /// downstream edges of its port.
    fn fan_out(
        &self,
        idx: usize,
        routed: Vec<Routed>,
        buffers: &mut [Vec<Item>],
    ) -> Result<(), RunError> {
        let resolved = self.resolved(idx)?;
        for (port, item) in routed {
            let remapped = item.with_annotation(item.annotation.remap(resolved));
            for &e in &self.outgoing[idx] {
                let edge = &self.edges[e];
                if edge.from_port == port {
                    buffers[edge.to].push(remapped.clone());
                }
            }
        }
        Ok(())
    }

    /// Calls one sink's postprocess step. Runs once per sink at the end of a
    /// run; failures here abort the run.
    pub(crate) fn postprocess_node(
        &mut self,
        idx: usize,
        env: &mut ExecEnv<'_>,
    ) -> Result<Option<SinkOutput>, RunError> {
        let node = &mut self.nodes[idx];
        let mut ctx = LayerContext {
            node_id: &node.id,
            run: env.run,
            store: env.store,
            inference: env.inference,
            rng: env.rng,
        };
        match node.layer.postprocess(&mut ctx) {
            Ok(output) => {
                node.state = NodeState::Done;
                Ok(output.map(|mut out| {
                    out.node_id = node.id.clone();
                    out
                }))
            }
            Err(err) => {
                node.state = NodeState::Failed;
                Err(err)
            }
        }
    }

    /// Runs one sample item through the minimal affected subgraph.
    ///
    /// When `changed_node` is given, only that node and its descendants are
    /// recomputed; every other node reuses its cached outputs from the last
    /// preview pass, and ancestors without a cache are computed on demand.
    /// Returns each node's output items as the node emitted them (name
    /// rewrites apply on the edges, not here), keyed by node id, for the UI
    /// to display. Sinks participate but perform no external writes when the
    /// run context is in preview mode.
    pub fn preview(
        &mut self,
        sample: &Item,
        changed_node: Option<&str>,
        env: &mut ExecEnv<'_>,
    ) -> Result<AHashMap<String, Vec<Item>>, RunError> {
        let affected = match changed_node.and_then(|id| self.node_index(id)) {
            Some(start) => self.descendants(start),
            None => (0..self.nodes.len()).collect(),
        };

        let mut buffers: Vec<Vec<Item>> = (0..self.nodes.len()).map(|_| Vec::new()).collect();
        let mut outputs = AHashMap::new();
        for idx in self.topo.clone() {
            let routed = if !affected.contains(&idx) {
                match self.nodes[idx].preview_cache.clone() {
                    Some(cached) => cached,
                    None => self.preview_node(idx, sample, &mut buffers, env)?,
                }
            } else {
                self.preview_node(idx, sample, &mut buffers, env)?
            };
            self.nodes[idx].preview_cache = Some(routed.clone());
            outputs.insert(
                self.nodes[idx].id.clone(),
                routed.iter().map(|(_, item)| item.clone()).collect(),
            );
            self.fan_out(idx, routed, &mut buffers)?;
        }
        Ok(outputs)
    }

    /// Recomputes one node's preview outputs from the current pass buffers.
    /// The returned items are pre-remap; [`Graph::fan_out`] applies the name
    /// rewrites when forwarding, and the cache stores the same pre-remap form.
    fn preview_node(
        &mut self,
        idx: usize,
        sample: &Item,
        buffers: &mut [Vec<Item>],
        env: &mut ExecEnv<'_>,
    ) -> Result<Vec<Routed>, RunError> {
        let items = if self.nodes[idx].kind() == NodeKind::Source {
            vec![sample.clone()]
        } else {
            std::mem::take(&mut buffers[idx])
        };
        self.run_node(idx, items, env)
    }

    /// The node itself plus everything reachable from it.
    fn descendants(&self, start: usize) -> AHashSet<usize> {
        let mut seen = AHashSet::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            if !seen.insert(idx) {
                continue;
            }
            stack.extend(self.outgoing[idx].iter().map(|&e| self.edges[e].to));
        }
        seen
    }
}
