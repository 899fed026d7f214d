//! Memoized source-to-sink schema propagation.
//!
//! Every node's output schema is a pure function of its merged input schema
//! and its mapping table, so propagation walks the topological order once,
//! merges the upstream schemas at each node and resolves the node's mapping.
//! The merged input is cached per node: when a recomputation produces a
//! structurally equal input, the cached resolution is reused and nothing
//! downstream of the node needs to change. That short-circuit is what keeps
//! interactive previews cheap while a user edits one node's settings.

use crate::collab::{ItemStore, retry_once};
use crate::error::RunError;
use crate::node::{NodeKind, NodeState};
use crate::schema::Schema;

use super::Graph;

impl Graph {
    /// Recomputes every node's output schema, bottom-up from the sources.
    ///
    /// Source nodes pull their schema from the item store (merged over all of
    /// their selectors); everything else merges the resolved output schemas of
    /// its upstream edges. Merge conflicts between reconverging branches or
    /// between multiple sources surface here, before any item is processed.
    pub fn propagate_schemas(&mut self, store: &dyn ItemStore) -> Result<(), RunError> {
        for idx in self.topo.clone() {
            let input = self.merged_input_schema(idx, store)?;
            let node = &mut self.nodes[idx];
            if node.resolved.is_some() && node.cached_input.as_ref() == Some(&input) {
                tracing::debug!(node = %node.id, "input schema unchanged, reusing resolution");
                continue;
            }
            let resolved = node.layer.output_schema(&input)?;
            tracing::debug!(
                node = %node.id,
                classes = resolved.schema.classes().len(),
                tags = resolved.schema.tags().len(),
                "schema resolved"
            );
            node.cached_input = Some(input);
            node.resolved = Some(resolved);
            node.preview_cache = None;
            node.state = NodeState::SchemaComputed;
        }
        Ok(())
    }

    fn merged_input_schema(&self, idx: usize, store: &dyn ItemStore) -> Result<Schema, RunError> {
        let node = &self.nodes[idx];
        let mut merged = Schema::new();
        if node.kind() == NodeKind::Source {
            for selector in node.layer.source_selectors() {
                let upstream = retry_once(|| store.get_schema(&selector))?;
                merged = Schema::merge(&merged, &upstream)?;
            }
        } else {
            for &e in &self.incoming[idx] {
                let from = self.edges[e].from;
                let upstream = self.resolved(from)?;
                merged = Schema::merge(&merged, &upstream.schema)?;
            }
        }
        Ok(merged)
    }
}
