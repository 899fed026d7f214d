//! The shipped layer inventory.
//!
//! One module per behavioral family; each layer owns a serde settings struct
//! and a `from_definition` constructor the registry factories call.

use crate::error::BadSettingsError;
use crate::pipeline::NodeDefinition;
use serde::de::DeserializeOwned;

mod apply_nn;
mod condition;
mod instances_crop;
mod line_to_mask;
mod merge_classes;
mod save;
mod source;

pub use apply_nn::ApplyNnLayer;
pub use condition::{Condition, IfLayer};
pub use instances_crop::InstancesCropLayer;
pub use line_to_mask::LineToMaskLayer;
pub use merge_classes::MergeClassesLayer;
pub use save::{CreateNewProjectLayer, ExportArchiveLayer, LabelingJobLayer};
pub use source::ImagesProjectLayer;

/// Deserializes a node's `settings` JSON into a layer's settings struct.
/// `null` settings deserialize as an empty object so layers whose fields all
/// have defaults stay optional.
pub(crate) fn parse_settings<T: DeserializeOwned>(
    node: &NodeDefinition,
) -> Result<T, BadSettingsError> {
    let value = match &node.settings {
        serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(value)
        .map_err(|e| BadSettingsError::new(format!("invalid '{}' settings: {e}", node.action)))
}
