use crate::collab::SourceSelector;
use crate::error::{BadSettingsError, ItemProcessingError};
use crate::item::Item;
use crate::node::{Layer, LayerContext, NodeKind, Routed};
use crate::pipeline::NodeDefinition;

/// Pulls items from one or more `"project/dataset"` selectors. The executor
/// lists and reads the items; the layer itself only declares where they come
/// from and forwards them untouched.
pub struct ImagesProjectLayer {
    selectors: Vec<SourceSelector>,
}

impl ImagesProjectLayer {
    pub fn from_definition(node: &NodeDefinition) -> Result<Self, BadSettingsError> {
        if node.src.is_empty() {
            return Err(BadSettingsError::for_field(
                "src",
                "a source node needs at least one 'project/dataset' selector",
            ));
        }
        let selectors = node
            .src
            .iter()
            .map(|raw| {
                SourceSelector::parse(raw).ok_or_else(|| {
                    BadSettingsError::for_field("src", format!("'{raw}' is not a valid selector"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { selectors })
    }
}

impl Layer for ImagesProjectLayer {
    fn action(&self) -> &str {
        "images_project"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Source
    }

    fn source_selectors(&self) -> Vec<SourceSelector> {
        self.selectors.clone()
    }

    fn transform(
        &mut self,
        item: Item,
        _ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, ItemProcessingError> {
        Ok(vec![(0, item)])
    }
}
