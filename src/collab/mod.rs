//! Boundaries to the external collaborators the engine orchestrates but does
//! not implement: the dataset/annotation store and the inference service.
//!
//! All calls are blocking from the engine's point of view; batching upstream
//! exists to amortize these calls, not to parallelize them.

use crate::error::ExternalError;
use crate::item::{Annotation, ItemContent};
use crate::schema::Schema;
use serde::{Deserialize, Serialize};

pub mod memory;

pub use memory::{MemoryInference, MemoryStore};

/// A `"project/dataset"` selector naming where source items come from.
/// A dataset of `"*"` selects every dataset of the project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSelector {
    pub project: String,
    pub dataset: String,
}

impl SourceSelector {
    pub const ALL_DATASETS: &'static str = "*";

    /// Parses `"project/dataset"`. A missing dataset part means all datasets.
    pub fn parse(raw: &str) -> Option<SourceSelector> {
        let mut parts = raw.splitn(2, '/');
        let project = parts.next()?.trim();
        if project.is_empty() {
            return None;
        }
        let dataset = parts.next().unwrap_or(Self::ALL_DATASETS).trim();
        Some(SourceSelector {
            project: project.to_string(),
            dataset: dataset.to_string(),
        })
    }

    pub fn is_wildcard(&self) -> bool {
        self.dataset == Self::ALL_DATASETS
    }

    /// Whether this selector covers the concrete `"project/dataset"` pair.
    pub fn matches(&self, project: &str, dataset: &str) -> bool {
        self.project == project && (self.is_wildcard() || self.dataset == dataset)
    }
}

impl std::fmt::Display for SourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.project, self.dataset)
    }
}

/// A handle to one stored item, stable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemRef {
    pub project: String,
    pub dataset: String,
    pub name: String,
}

/// The dataset/annotation storage backend.
pub trait ItemStore: Send + Sync {
    fn list_items(&self, selector: &SourceSelector) -> Result<Vec<ItemRef>, ExternalError>;
    fn read_item(&self, item: &ItemRef) -> Result<ItemContent, ExternalError>;
    fn read_annotation(&self, item: &ItemRef) -> Result<Annotation, ExternalError>;
    fn get_schema(&self, selector: &SourceSelector) -> Result<Schema, ExternalError>;

    fn create_container(&self, name: &str) -> Result<String, ExternalError>;
    fn write_item(
        &self,
        container_id: &str,
        name: &str,
        content: &ItemContent,
        annotation: &Annotation,
    ) -> Result<(), ExternalError>;
    /// Creates a labeling job over items previously written to `container_id`.
    fn create_labeling_job(
        &self,
        name: &str,
        container_id: &str,
        item_names: &[String],
    ) -> Result<String, ExternalError>;
}

/// A deployed model-serving session.
pub trait InferenceClient: Send + Sync {
    fn is_ready(&self, session: &str) -> Result<bool, ExternalError>;
    fn infer(&self, session: &str, content: &ItemContent) -> Result<Annotation, ExternalError>;

    /// Batched variant; the default amortizes nothing and simply loops.
    fn infer_batch(
        &self,
        session: &str,
        contents: &[ItemContent],
    ) -> Result<Vec<Annotation>, ExternalError> {
        contents.iter().map(|c| self.infer(session, c)).collect()
    }
}

/// Runs `op`, retrying exactly once when the failure is transient. A second
/// failure, or any permanent failure, is returned to the caller and aborts
/// the run.
pub fn retry_once<T>(
    mut op: impl FnMut() -> Result<T, ExternalError>,
) -> Result<T, ExternalError> {
    match op() {
        Ok(value) => Ok(value),
        Err(ExternalError::Transient {
            collaborator,
            message,
        }) => {
            tracing::warn!(%collaborator, %message, "transient collaborator failure, retrying once");
            op()
        }
        Err(err) => Err(err),
    }
}
