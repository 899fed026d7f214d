//! The unit of work in a pipeline: one layer per graph node.
//!
//! A layer declares how it reshapes the class/tag namespace (its
//! [`ClassTagMapping`]) and how it reshapes items. The graph owns the
//! surrounding algebra: it merges input schemas, resolves the mapping, calls
//! the layer's transform, and applies the resolved name rewrites to every
//! emitted item. Layers therefore only implement their content-specific work.

use crate::collab::{InferenceClient, ItemStore, SourceSelector};
use crate::error::{BadSettingsError, ItemProcessingError, MappingError, RunError};
use crate::executor::context::RunContext;
use crate::item::Item;
use crate::mapping::{ClassTagMapping, ResolvedMapping};
use crate::schema::Schema;
use rand::rngs::StdRng;

pub mod layers;
pub mod registry;

pub use registry::{LayerFactory, LayerRegistry};

/// The closed set of behavioral families a node can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Source,
    Transform,
    Inference,
    /// Routes each item to exactly one of two output ports (true/false).
    Conditional,
    Sink,
}

/// Per-node lifecycle across one pipeline run. `Failed` is reachable from
/// any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Unconfigured,
    Validated,
    SchemaComputed,
    Ready,
    Processing,
    Done,
    Failed,
}

/// Index of the output port an item leaves through. Port 0 for everything
/// except the false branch of a conditional.
pub type OutPort = usize;

/// An item routed to one of the node's output ports.
pub type Routed = (OutPort, Item);

/// Everything a layer may touch while processing, threaded explicitly from
/// the executor.
pub struct LayerContext<'a> {
    pub node_id: &'a str,
    pub run: &'a RunContext,
    pub store: &'a dyn ItemStore,
    pub inference: Option<&'a dyn InferenceClient>,
    /// Per-run RNG, seeded from [`RunContext::seed`].
    pub rng: &'a mut StdRng,
}

/// The processing contract every node kind implements.
pub trait Layer: Send {
    fn action(&self) -> &str;
    fn kind(&self) -> NodeKind;

    /// Structural and semantic settings checks; runs before any schema work.
    fn validate(&self) -> Result<(), BadSettingsError> {
        Ok(())
    }

    /// How this layer reshapes the class/tag namespace.
    fn mapping(&self) -> ClassTagMapping {
        ClassTagMapping::passthrough()
    }

    /// Where a source layer pulls its items from; empty for every other kind.
    fn source_selectors(&self) -> Vec<SourceSelector> {
        Vec::new()
    }

    /// Computes the output schema and name rewrites for the merged input
    /// schema. The default resolves [`Layer::mapping`]; layers whose output
    /// schema depends on more than the mapping table override this.
    fn output_schema(&self, input: &Schema) -> Result<ResolvedMapping, MappingError> {
        self.mapping().resolve(input)
    }

    /// Transforms one item into zero, one, or many routed items. Pure with
    /// respect to external state; sinks may accumulate internally.
    fn transform(
        &mut self,
        item: Item,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, ItemProcessingError>;

    /// Batched variant for layers whose underlying operation amortizes over
    /// groups. The default calls [`Layer::transform`] per item and degrades
    /// gracefully: a failed item is logged and passed through unchanged so a
    /// single corrupt item never aborts the batch.
    fn transform_batch(
        &mut self,
        items: Vec<Item>,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, RunError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let fallback = item.clone();
            match self.transform(item, ctx) {
                Ok(routed) => out.extend(routed),
                Err(err) => {
                    tracing::warn!(node = ctx.node_id, error = %err, "item failed, passing through unchanged");
                    out.push((0, fallback));
                }
            }
        }
        Ok(out)
    }

    /// One external write per run for sinks, invoked after all items have
    /// flowed through. Failures here are fatal to the whole run.
    fn postprocess(&mut self, _ctx: &mut LayerContext<'_>) -> Result<Option<SinkOutput>, RunError> {
        Ok(None)
    }
}

/// What a sink produced, reported back to the user at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOutput {
    pub node_id: String,
    /// "project", "archive" or "labeling_job".
    pub kind: String,
    pub name: String,
    pub item_count: usize,
}
