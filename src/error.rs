use thiserror::Error;

/// Whether a schema entry is a class or a tag, used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Class,
    Tag,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Class => write!(f, "class"),
            EntryKind::Tag => write!(f, "tag"),
        }
    }
}

/// Errors raised while building or merging schemas.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    #[error("Conflicting definitions for {kind} '{name}' cannot be merged")]
    Conflict { name: String, kind: EntryKind },

    #[error("A {kind} named '{name}' already exists with a different definition")]
    DuplicateName { name: String, kind: EntryKind },
}

/// Errors raised while resolving a node's class/tag mapping against its input schema.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error(
        "Cannot merge '{source_name}' into '{target}': {source_shape} does not match {target_shape}"
    )]
    ShapeMismatch {
        source_name: String,
        target: String,
        source_shape: String,
        target_shape: String,
    },

    #[error("New {kind} '{name}' collides with an existing, different definition")]
    DuplicateName { name: String, kind: EntryKind },

    #[error("{kind} '{name}' is referenced by node settings but has no resolvable mapping entry")]
    MissingMapping { name: String, kind: EntryKind },
}

/// A user-correctable configuration problem, surfaced verbatim in the UI.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Bad settings{}: {message}", field.as_ref().map(|f| format!(" (field '{f}')")).unwrap_or_default())]
pub struct BadSettingsError {
    /// The offending settings field, when one can be named.
    pub field: Option<String>,
    pub message: String,
}

impl BadSettingsError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }

    pub fn for_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }
}

/// Structural problems with the pipeline graph. These block a run before it starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Adding an edge from '{from}' to '{to}' would create a cycle")]
    Cycle { from: String, to: String },

    #[error("Duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("Node '{node_id}' has an unregistered action: '{action}'")]
    UnknownAction { node_id: String, action: String },

    #[error("Node '{node_id}' consumes stream '{src}', but no node produces it")]
    DanglingSource { node_id: String, src: String },

    #[error("Node '{node_id}' is not a source but has no inbound connections")]
    NoInput { node_id: String },

    #[error("Stream token '{token}' is produced by more than one node")]
    AmbiguousStream { token: String },

    #[error("Node '{node_id}' must declare {expected} output stream(s), found {found}")]
    BadPortCount {
        node_id: String,
        expected: String,
        found: usize,
    },

    #[error("Node '{node_id}' has no resolved schema; propagate schemas before executing")]
    SchemaNotReady { node_id: String },

    #[error("Node '{node_id}' settings are invalid: {error}")]
    BadSettings {
        node_id: String,
        #[source]
        error: BadSettingsError,
    },
}

/// A failure reported by an external collaborator (item store, inference session).
#[derive(Error, Debug, Clone)]
pub enum ExternalError {
    /// The collaborator could not be reached; the engine retries once before
    /// treating this as fatal.
    #[error("Transient failure talking to {collaborator}: {message}")]
    Transient {
        collaborator: String,
        message: String,
    },

    #[error("{collaborator} failed permanently: {message}")]
    Permanent {
        collaborator: String,
        message: String,
    },
}

/// Errors that abort a whole pipeline run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("A pipeline run is already in progress")]
    AlreadyRunning,

    #[error("The run was cancelled before completion")]
    Cancelled,

    #[error(
        "External collaborator failed, results may be incomplete. \
         Already written outputs are not rolled back: {0}"
    )]
    External(#[from] ExternalError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// A per-item processing failure. Recovered at the node boundary: the item is
/// substituted and the run continues.
#[derive(Error, Debug, Clone)]
#[error("Failed to process item '{item_name}' in node '{node_id}': {message}")]
pub struct ItemProcessingError {
    pub node_id: String,
    pub item_name: String,
    pub message: String,
}

/// Errors that can occur when converting a custom pipeline format into a
/// [`PipelineDefinition`](crate::pipeline::PipelineDefinition).
#[derive(Error, Debug, Clone)]
pub enum PipelineConversionError {
    #[error("Invalid pipeline data: {0}")]
    ValidationError(String),
}

/// Errors raised while saving or loading a compiled pipeline artifact.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("{0}")]
    Generic(String),
}
