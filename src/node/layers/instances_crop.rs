use crate::error::{BadSettingsError, ItemProcessingError};
use crate::item::{Annotation, Item, Label};
use crate::mapping::{ClassTagMapping, MappingAction};
use crate::node::{Layer, LayerContext, NodeKind, Routed};
use crate::pipeline::NodeDefinition;
use itertools::Itertools;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Deserialize)]
struct Settings {
    /// Classes whose instances become crops.
    classes: Vec<String>,
    /// Classes whose labels are kept inside each crop.
    #[serde(default)]
    save_classes: Vec<String>,
    pad: PadSettings,
}

#[derive(Deserialize)]
struct PadSettings {
    sides: BTreeMap<String, String>,
}

/// Per-side padding, absolute or relative to the instance extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pad {
    Px(i64),
    Percent(i64),
}

impl Pad {
    /// Parses `"12px"` or `"15%"`.
    fn parse(raw: &str) -> Result<Pad, BadSettingsError> {
        let bad = || {
            BadSettingsError::for_field("pad", format!("'{raw}' is not of the form <n>px or <n>%"))
        };
        if let Some(n) = raw.strip_suffix("px") {
            return n.parse().map(Pad::Px).map_err(|_| bad());
        }
        if let Some(n) = raw.strip_suffix('%') {
            return n.parse().map(Pad::Percent).map_err(|_| bad());
        }
        Err(bad())
    }

    /// Pixels of padding for an instance of the given `extent` on this axis.
    fn resolve(self, extent: i64) -> i64 {
        match self {
            Pad::Px(n) => n,
            Pad::Percent(n) => extent * n / 100,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct PadSides {
    left: Pad,
    top: Pad,
    right: Pad,
    bottom: Pad,
}

impl Default for Pad {
    fn default() -> Self {
        Pad::Px(0)
    }
}

impl PadSides {
    fn from_settings(settings: &PadSettings) -> Result<PadSides, BadSettingsError> {
        let mut sides = PadSides::default();
        for (side, raw) in &settings.sides {
            let pad = Pad::parse(raw)?;
            match side.as_str() {
                "left" => sides.left = pad,
                "top" => sides.top = pad,
                "right" => sides.right = pad,
                "bottom" => sides.bottom = pad,
                other => {
                    return Err(BadSettingsError::for_field(
                        "pad",
                        format!("unknown side '{other}'"),
                    ));
                }
            }
        }
        Ok(sides)
    }
}

/// Fans each item out into one crop per instance of the listed classes. The
/// source item itself is not forwarded. Crops are emitted per class in
/// settings order, then per instance in annotation order, and named
/// `{item}_crop_{class}{index}`.
pub struct InstancesCropLayer {
    classes: Vec<String>,
    save_classes: Vec<String>,
    pad: PadSides,
}

impl InstancesCropLayer {
    pub fn from_definition(node: &NodeDefinition) -> Result<Self, BadSettingsError> {
        let settings: Settings = super::parse_settings(node)?;
        let pad = PadSides::from_settings(&settings.pad)?;
        Ok(Self {
            classes: settings.classes,
            save_classes: settings.save_classes,
            pad,
        })
    }

    /// Padded, image-clamped crop window for one instance.
    fn crop_window(&self, label: &Label, img_w: u32, img_h: u32) -> Option<(i64, i64, i64, i64)> {
        let (left, top, right, bottom) = label.geometry.bounding_box()?;
        let width = right - left + 1;
        let height = bottom - top + 1;
        let left = (left - self.pad.left.resolve(width)).max(0);
        let top = (top - self.pad.top.resolve(height)).max(0);
        let right = (right + self.pad.right.resolve(width)).min(img_w as i64 - 1);
        let bottom = (bottom + self.pad.bottom.resolve(height)).min(img_h as i64 - 1);
        if left > right || top > bottom {
            return None;
        }
        Some((left, top, right, bottom))
    }
}

impl Layer for InstancesCropLayer {
    fn action(&self) -> &str {
        "instances_crop"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Transform
    }

    fn validate(&self) -> Result<(), BadSettingsError> {
        if self.classes.is_empty() {
            return Err(BadSettingsError::for_field(
                "classes",
                "classes array can not be empty",
            ));
        }
        let overlap = self
            .classes
            .iter()
            .filter(|c| self.save_classes.contains(c))
            .join(", ");
        if !overlap.is_empty() {
            return Err(BadSettingsError::for_field(
                "save_classes",
                format!("classes and save_classes must not intersect: {overlap}"),
            ));
        }
        Ok(())
    }

    fn mapping(&self) -> ClassTagMapping {
        // Crops keep only the cropped and saved classes; item tags survive.
        let mut mapping = ClassTagMapping {
            tags_other: MappingAction::Default,
            ..ClassTagMapping::default()
        };
        for name in self.classes.iter().chain(self.save_classes.iter()) {
            mapping = mapping.with_class(name.clone(), MappingAction::Default);
        }
        mapping
    }

    fn transform(
        &mut self,
        item: Item,
        _ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, ItemProcessingError> {
        let (img_w, img_h) = (item.annotation.width, item.annotation.height);
        let mut out = Vec::new();
        for class in &self.classes {
            let instances = item
                .annotation
                .labels
                .iter()
                .filter(|l| &l.class_name == class);
            for (index, instance) in instances.enumerate() {
                let Some((left, top, right, bottom)) = self.crop_window(instance, img_w, img_h)
                else {
                    continue;
                };
                let mut annotation =
                    Annotation::empty((right - left + 1) as u32, (bottom - top + 1) as u32);
                annotation.tags = item.annotation.tags.clone();
                annotation.labels.push(Label {
                    class_name: instance.class_name.clone(),
                    geometry: instance.geometry.translated(-left, -top),
                    tags: instance.tags.clone(),
                });
                for kept in &item.annotation.labels {
                    if !self.save_classes.contains(&kept.class_name) {
                        continue;
                    }
                    let Some((kl, kt, kr, kb)) = kept.geometry.bounding_box() else {
                        continue;
                    };
                    if kl > right || kr < left || kt > bottom || kb < top {
                        continue;
                    }
                    annotation.labels.push(Label {
                        class_name: kept.class_name.clone(),
                        geometry: kept.geometry.translated(-left, -top),
                        tags: kept.tags.clone(),
                    });
                }
                let name = format!("{}_crop_{}{}", item.name, class, index);
                out.push((0, item.with_name(name).with_annotation(annotation)));
            }
        }
        Ok(out)
    }
}
