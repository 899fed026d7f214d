//! Prelude module for convenient imports
//!
//! Re-exports the most commonly used types and traits so callers can bring
//! the whole engine surface in with a single `use annoflow::prelude::*;`.

// Graph construction and execution
pub use crate::executor::{CancelToken, Executor, RunContext, RunFlag, RunReport};
pub use crate::graph::Graph;

// Pipeline document and artifacts
pub use crate::pipeline::{CompiledPipeline, IntoPipeline, NodeDefinition, PipelineDefinition};

// Schema and mapping types
pub use crate::mapping::{ClassTagMapping, MappingAction, ResolvedMapping};
pub use crate::schema::{ClassDef, Schema, ShapeKind, TagDef, TagValueKind};

// Items and annotations
pub use crate::item::{Annotation, Geometry, Item, ItemContent, Label, TagValue};

// Layers and their registry
pub use crate::node::{Layer, LayerFactory, LayerRegistry, NodeKind, SinkOutput};

// External collaborator boundary
pub use crate::collab::{
    InferenceClient, ItemStore, MemoryInference, MemoryStore, SourceSelector,
};

// Error types
pub use crate::error::{BadSettingsError, GraphError, MappingError, RunError, SchemaError};

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;
