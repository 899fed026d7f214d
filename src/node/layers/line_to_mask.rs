use crate::error::{BadSettingsError, ItemProcessingError};
use crate::item::{Geometry, Item, Label};
use crate::mapping::{ClassTagMapping, MappingAction};
use crate::node::{Layer, LayerContext, NodeKind, Routed};
use crate::pipeline::NodeDefinition;
use crate::schema::ShapeKind;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Deserialize)]
struct Settings {
    /// Polyline class name -> name of the bitmap class it becomes.
    classes_mapping: BTreeMap<String, String>,
    /// Stroke width in pixels.
    width: u32,
}

/// Rasterizes polyline labels of the listed classes into full-image bitmap
/// masks. The renamed definitions always carry the bitmap shape, whatever the
/// source shape was.
pub struct LineToMaskLayer {
    classes_mapping: BTreeMap<String, String>,
    width: u32,
}

impl LineToMaskLayer {
    pub fn from_definition(node: &NodeDefinition) -> Result<Self, BadSettingsError> {
        let settings: Settings = super::parse_settings(node)?;
        Ok(Self {
            classes_mapping: settings.classes_mapping,
            width: settings.width,
        })
    }
}

impl Layer for LineToMaskLayer {
    fn action(&self) -> &str {
        "line_to_mask"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Transform
    }

    fn validate(&self) -> Result<(), BadSettingsError> {
        if self.width < 1 {
            return Err(BadSettingsError::for_field(
                "width",
                "stroke width must be at least 1 pixel",
            ));
        }
        if self.classes_mapping.is_empty() {
            return Err(BadSettingsError::for_field(
                "classes_mapping",
                "at least one class must be converted",
            ));
        }
        Ok(())
    }

    fn mapping(&self) -> ClassTagMapping {
        let mut mapping = ClassTagMapping::passthrough();
        for (source, target) in &self.classes_mapping {
            mapping = mapping.with_class(source.clone(), MappingAction::Rename {
                new_name: target.clone(),
                new_shape: Some(ShapeKind::Bitmap),
            });
        }
        mapping
    }

    fn transform(
        &mut self,
        item: Item,
        _ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, ItemProcessingError> {
        let mut annotation = item.annotation.clone();
        let (img_w, img_h) = (annotation.width, annotation.height);
        for label in &mut annotation.labels {
            if !self.classes_mapping.contains_key(&label.class_name) {
                continue;
            }
            if let Geometry::Polyline { points } = &label.geometry {
                *label = Label {
                    class_name: label.class_name.clone(),
                    geometry: Geometry::stroke_to_bitmap(points, self.width, img_w, img_h),
                    tags: label.tags.clone(),
                };
            }
        }
        Ok(vec![(0, item.with_annotation(annotation))])
    }
}
