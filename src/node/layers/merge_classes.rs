use crate::error::{BadSettingsError, ItemProcessingError};
use crate::item::Item;
use crate::mapping::{ClassTagMapping, MappingAction};
use crate::node::{Layer, LayerContext, NodeKind, Routed};
use crate::pipeline::NodeDefinition;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Deserialize)]
struct Settings {
    /// Source class name -> existing target class name.
    classes_mapping: BTreeMap<String, String>,
}

/// Rewrites labels of the listed classes to existing target classes. The
/// whole behavior lives in the mapping table; items flow through untouched
/// and the graph applies the rename.
pub struct MergeClassesLayer {
    classes_mapping: BTreeMap<String, String>,
}

impl MergeClassesLayer {
    pub fn from_definition(node: &NodeDefinition) -> Result<Self, BadSettingsError> {
        let settings: Settings = super::parse_settings(node)?;
        Ok(Self {
            classes_mapping: settings.classes_mapping,
        })
    }
}

impl Layer for MergeClassesLayer {
    fn action(&self) -> &str {
        "merge_classes"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Transform
    }

    fn validate(&self) -> Result<(), BadSettingsError> {
        if self.classes_mapping.is_empty() {
            return Err(BadSettingsError::for_field(
                "classes_mapping",
                "at least one class must be merged",
            ));
        }
        Ok(())
    }

    fn mapping(&self) -> ClassTagMapping {
        let mut mapping = ClassTagMapping::passthrough();
        for (source, target) in &self.classes_mapping {
            mapping = mapping.with_class(source.clone(), MappingAction::MergeInto {
                target: target.clone(),
            });
        }
        mapping
    }

    fn transform(
        &mut self,
        item: Item,
        _ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, ItemProcessingError> {
        Ok(vec![(0, item)])
    }
}
