//! Drives dataset items through a validated graph.
//!
//! The executor owns the run lifecycle: it enforces the single-run rule,
//! propagates schemas, pulls items from the source nodes' item store in
//! batches, streams every batch through the graph and finally invokes each
//! sink's postprocess step exactly once. Batches are processed sequentially;
//! batching amortizes external calls, it does not parallelize compute.

use crate::collab::{InferenceClient, ItemRef, ItemStore, retry_once};
use crate::error::RunError;
use crate::graph::{ExecEnv, Graph};
use crate::item::{Annotation, Item, ItemContent};
use crate::node::SinkOutput;
use ahash::AHashMap;
use rand::SeedableRng;
use rand::rngs::StdRng;

pub mod context;
pub mod updates;

pub use context::{CancelToken, Progress, RunContext, RunFlag, RunGuard};
pub use updates::{ChangeEvent, UpdateQueue};

/// What a finished run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Items pulled from the sources and pushed through the graph.
    pub processed: usize,
    pub total: usize,
    pub sink_outputs: Vec<SinkOutput>,
}

/// Executes pipeline runs and previews against one graph.
pub struct Executor<'a> {
    graph: &'a mut Graph,
    store: &'a dyn ItemStore,
    inference: Option<&'a dyn InferenceClient>,
    run_flag: RunFlag,
}

impl<'a> Executor<'a> {
    pub fn new(graph: &'a mut Graph, store: &'a dyn ItemStore) -> Self {
        Self {
            graph,
            store,
            inference: None,
            run_flag: RunFlag::new(),
        }
    }

    pub fn with_inference(mut self, client: &'a dyn InferenceClient) -> Self {
        self.inference = Some(client);
        self
    }

    /// The shared running flag; clone it to observe or block concurrent runs
    /// from outside.
    pub fn run_flag(&self) -> RunFlag {
        self.run_flag.clone()
    }

    /// Runs the whole pipeline over the full dataset.
    ///
    /// Fails before any item is processed when the graph is structurally
    /// invalid or the schemas conflict. Per-item failures degrade to warnings;
    /// collaborator failures abort after one retry, leaving any external
    /// writes already made in place.
    pub fn run(&mut self, ctx: &RunContext) -> Result<RunReport, RunError> {
        let _guard = self.run_flag.try_acquire()?;
        tracing::info!(batch_size = ctx.batch_size, seed = ctx.seed, "pipeline run starting");

        self.graph.propagate_schemas(self.store)?;

        let mut listings: Vec<(usize, Vec<ItemRef>)> = Vec::new();
        for idx in self.graph.source_indices() {
            let mut refs = Vec::new();
            for selector in self.source_selectors(idx) {
                refs.extend(retry_once(|| self.store.list_items(&selector))?);
            }
            listings.push((idx, refs));
        }
        let total: usize = listings.iter().map(|(_, refs)| refs.len()).sum();
        ctx.progress.set_total(total);

        let mut rng = StdRng::seed_from_u64(ctx.seed);
        let mut processed = 0usize;
        for (idx, refs) in listings {
            for chunk in refs.chunks(ctx.batch_size) {
                if ctx.cancel.is_cancelled() {
                    tracing::info!(processed, total, "run cancelled between batches");
                    return Err(RunError::Cancelled);
                }
                let items: Vec<Item> = chunk.iter().map(|r| self.load_item(r)).collect();
                let mut seeds = AHashMap::new();
                seeds.insert(idx, items);
                let mut env = ExecEnv {
                    run: ctx,
                    store: self.store,
                    inference: self.inference,
                    rng: &mut rng,
                };
                self.graph.process_batch(seeds, &mut env)?;
                processed += chunk.len();
                ctx.progress.advance(chunk.len());
            }
        }

        let mut sink_outputs = Vec::new();
        for idx in self.graph.sink_indices() {
            if ctx.cancel.is_cancelled() {
                tracing::info!("run cancelled before postprocessing");
                return Err(RunError::Cancelled);
            }
            let mut env = ExecEnv {
                run: ctx,
                store: self.store,
                inference: self.inference,
                rng: &mut rng,
            };
            if let Some(output) = self.graph.postprocess_node(idx, &mut env)? {
                tracing::info!(
                    sink = %output.node_id,
                    kind = %output.kind,
                    items = output.item_count,
                    "sink finalized"
                );
                sink_outputs.push(output);
            }
        }

        tracing::info!(processed, total, "pipeline run finished");
        Ok(RunReport {
            processed,
            total,
            sink_outputs,
        })
    }

    /// Runs one sample item through the affected subgraph for interactive
    /// feedback. Sinks perform no external writes. Returns each node's output
    /// items, keyed by node id.
    pub fn preview(
        &mut self,
        ctx: &RunContext,
        sample: &Item,
        changed_node: Option<&str>,
    ) -> Result<AHashMap<String, Vec<Item>>, RunError> {
        let _guard = self.run_flag.try_acquire()?;
        let preview_ctx = RunContext {
            preview_mode: true,
            ..ctx.clone()
        };
        self.graph.propagate_schemas(self.store)?;
        let mut rng = StdRng::seed_from_u64(preview_ctx.seed);
        let mut env = ExecEnv {
            run: &preview_ctx,
            store: self.store,
            inference: self.inference,
            rng: &mut rng,
        };
        self.graph.preview(sample, changed_node, &mut env)
    }

    fn source_selectors(&self, idx: usize) -> Vec<crate::collab::SourceSelector> {
        self.graph.source_selectors(idx)
    }

    /// Reads one item's content and annotation. Read failures degrade: the
    /// item continues through the graph with whatever could be read, so one
    /// corrupt blob never aborts a large batch.
    fn load_item(&self, item_ref: &ItemRef) -> Item {
        let annotation = match retry_once(|| self.store.read_annotation(item_ref)) {
            Ok(annotation) => annotation,
            Err(err) => {
                tracing::warn!(item = %item_ref.name, error = %err, "annotation unreadable, substituting empty");
                Annotation::empty(0, 0)
            }
        };
        let content = match retry_once(|| self.store.read_item(item_ref)) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!(item = %item_ref.name, error = %err, "content unreadable, keeping lazy reference");
                ItemContent::Lazy(item_ref.name.clone())
            }
        };
        Item::new(&item_ref.name, content, annotation)
    }
}
