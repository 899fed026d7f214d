//! # Annoflow - Node-Graph Data Transformation Engine
//!
//! **Annoflow** is a data-transformation (DTL) pipeline engine for annotated
//! image datasets. Pipelines are directed acyclic graphs of layers — sources,
//! annotation transforms, neural-network inference, conditionals and sinks —
//! and the engine resolves a consistent class/tag schema at every node before
//! streaming dataset items through the graph in batches.
//!
//! ## Core Workflow
//!
//! The engine is format-agnostic and operates on a canonical
//! [`PipelineDefinition`](pipeline::PipelineDefinition): an ordered list of
//! node records wired together by stream tokens. The primary workflow is:
//!
//! 1.  **Load Your Pipeline**: Parse your own pipeline format (or the persisted
//!     JSON document directly) and convert it via the
//!     [`IntoPipeline`](pipeline::IntoPipeline) trait.
//! 2.  **Build the Graph**: [`Graph::from_definition`](graph::Graph) validates
//!     the topology and every node's settings up front; cycles, dangling
//!     streams and bad settings are rejected before anything runs.
//! 3.  **Propagate Schemas**: each node's output schema is computed from its
//!     merged input schemas through its class/tag mapping, with deterministic
//!     conflict resolution.
//! 4.  **Execute**: an [`Executor`](executor::Executor) pulls items from the
//!     dataset store in batches and pushes them source-to-sink, or replays a
//!     single sample through the affected subgraph for interactive previews.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use annoflow::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let json = std::fs::read_to_string("pipeline.json")?;
//!     let definition = PipelineDefinition::from_json(&json)?;
//!
//!     let registry = LayerRegistry::new();
//!     let mut graph = Graph::from_definition(definition, &registry)?;
//!
//!     // The store is the external dataset backend; tests and the CLI use
//!     // the bundled in-memory implementation.
//!     let store = MemoryStore::new();
//!     let ctx = RunContext::new().with_batch_size(50);
//!     let report = Executor::new(&mut graph, &store).run(&ctx)?;
//!
//!     println!(
//!         "Processed {}/{} items into {} sink(s)",
//!         report.processed,
//!         report.total,
//!         report.sink_outputs.len()
//!     );
//!     Ok(())
//! }
//! ```

pub mod collab;
pub mod error;
pub mod executor;
pub mod graph;
pub mod item;
pub mod mapping;
pub mod node;
pub mod pipeline;
pub mod prelude;
pub mod schema;
