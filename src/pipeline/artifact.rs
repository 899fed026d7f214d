use super::definition::PipelineDefinition;
use crate::error::ArtifactError;
use crate::schema::Schema;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};

/// A validated pipeline together with its resolved per-node output schemas,
/// persisted so a UI can reopen a project without re-resolving anything.
///
/// Stored as JSON rather than a binary codec: node settings are free-form
/// JSON values, which only a self-describing format can round-trip.
#[derive(Serialize, Deserialize)]
pub struct CompiledPipeline {
    pub definition: PipelineDefinition,
    /// Node id -> that node's resolved output schema.
    pub node_schemas: AHashMap<String, Schema>,
}

impl CompiledPipeline {
    pub fn new(definition: PipelineDefinition, node_schemas: AHashMap<String, Schema>) -> Self {
        Self {
            definition,
            node_schemas,
        }
    }

    /// Saves the compiled pipeline to a file.
    pub fn save(&self, path: &str) -> Result<(), ArtifactError> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| ArtifactError::Generic(format!("Serialization failed: {}", e)))?;
        let mut file = fs::File::create(path).map_err(|e| {
            ArtifactError::Generic(format!("Could not create file '{}': {}", path, e))
        })?;
        file.write_all(&bytes).map_err(|e| {
            ArtifactError::Generic(format!("Could not write to file '{}': {}", path, e))
        })?;
        Ok(())
    }

    /// Loads a compiled pipeline from a file.
    pub fn from_file(path: &str) -> Result<Self, ArtifactError> {
        let mut file = fs::File::open(path)
            .map_err(|e| ArtifactError::Generic(format!("Could not open file '{}': {}", path, e)))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes).map_err(|e| {
            ArtifactError::Generic(format!("Could not read from file '{}': {}", path, e))
        })?;
        Self::from_bytes(&bytes)
    }

    /// Deserializes a compiled pipeline from a byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ArtifactError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ArtifactError::Generic(format!("Deserialization failed: {}", e)))
    }
}
