//! Dataset items flowing through the graph.
//!
//! An [`Item`] bundles an opaque content reference with its [`Annotation`].
//! Items are logically immutable: every transform builds a new `Item`, and the
//! content bytes sit behind an [`Arc`] so fan-out to several downstream edges
//! never copies them.

use crate::mapping::ResolvedMapping;
use crate::schema::ShapeKind;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A geometric label shape. Only the structure the shipped layers need;
/// general computer-vision math is out of scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Geometry {
    Point {
        x: i64,
        y: i64,
    },
    Rectangle {
        left: i64,
        top: i64,
        right: i64,
        bottom: i64,
    },
    Polygon {
        exterior: Vec<(i64, i64)>,
    },
    Polyline {
        points: Vec<(i64, i64)>,
    },
    /// A binary mask anchored at `origin`, row-major, one byte per pixel.
    Bitmap {
        origin: (i64, i64),
        width: u32,
        height: u32,
        data: Vec<u8>,
    },
}

impl Geometry {
    pub fn shape_kind(&self) -> ShapeKind {
        match self {
            Geometry::Point { .. } => ShapeKind::Point,
            Geometry::Rectangle { .. } => ShapeKind::Rectangle,
            Geometry::Polygon { .. } => ShapeKind::Polygon,
            Geometry::Polyline { .. } => ShapeKind::Polyline,
            Geometry::Bitmap { .. } => ShapeKind::Bitmap,
        }
    }

    /// Axis-aligned bounding box as `(left, top, right, bottom)`, inclusive.
    /// `None` for degenerate shapes with no points.
    pub fn bounding_box(&self) -> Option<(i64, i64, i64, i64)> {
        match self {
            Geometry::Point { x, y } => Some((*x, *y, *x, *y)),
            Geometry::Rectangle {
                left,
                top,
                right,
                bottom,
            } => Some((*left, *top, *right, *bottom)),
            Geometry::Polygon { exterior: pts } | Geometry::Polyline { points: pts } => {
                if pts.is_empty() {
                    return None;
                }
                let (mut l, mut t, mut r, mut b) = (i64::MAX, i64::MAX, i64::MIN, i64::MIN);
                for &(x, y) in pts {
                    l = l.min(x);
                    t = t.min(y);
                    r = r.max(x);
                    b = b.max(y);
                }
                Some((l, t, r, b))
            }
            Geometry::Bitmap {
                origin,
                width,
                height,
                ..
            } => Some((
                origin.0,
                origin.1,
                origin.0 + *width as i64 - 1,
                origin.1 + *height as i64 - 1,
            )),
        }
    }

    /// The same geometry shifted by `(dx, dy)`.
    pub fn translated(&self, dx: i64, dy: i64) -> Geometry {
        match self {
            Geometry::Point { x, y } => Geometry::Point {
                x: x + dx,
                y: y + dy,
            },
            Geometry::Rectangle {
                left,
                top,
                right,
                bottom,
            } => Geometry::Rectangle {
                left: left + dx,
                top: top + dy,
                right: right + dx,
                bottom: bottom + dy,
            },
            Geometry::Polygon { exterior } => Geometry::Polygon {
                exterior: exterior.iter().map(|&(x, y)| (x + dx, y + dy)).collect(),
            },
            Geometry::Polyline { points } => Geometry::Polyline {
                points: points.iter().map(|&(x, y)| (x + dx, y + dy)).collect(),
            },
            Geometry::Bitmap {
                origin,
                width,
                height,
                data,
            } => Geometry::Bitmap {
                origin: (origin.0 + dx, origin.1 + dy),
                width: *width,
                height: *height,
                data: data.clone(),
            },
        }
    }

    /// Rasterizes a polyline stroke of `width` pixels into a full-image
    /// bitmap. Square brush over line-segment interpolation; enough for the
    /// line-to-mask layer, not a general renderer.
    pub fn stroke_to_bitmap(points: &[(i64, i64)], width: u32, img_w: u32, img_h: u32) -> Geometry {
        let mut data = vec![0u8; (img_w as usize) * (img_h as usize)];
        let radius = (width as i64 - 1) / 2;
        let extra = (width as i64 - 1) - radius;
        let mut paint = |x: i64, y: i64| {
            for py in (y - radius)..=(y + extra) {
                for px in (x - radius)..=(x + extra) {
                    if px >= 0 && py >= 0 && (px as u32) < img_w && (py as u32) < img_h {
                        data[py as usize * img_w as usize + px as usize] = 1;
                    }
                }
            }
        };
        for pair in points.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            let steps = (x1 - x0).abs().max((y1 - y0).abs()).max(1);
            for s in 0..=steps {
                let x = x0 + (x1 - x0) * s / steps;
                let y = y0 + (y1 - y0) * s / steps;
                paint(x, y);
            }
        }
        if points.len() == 1 {
            paint(points[0].0, points[0].1);
        }
        Geometry::Bitmap {
            origin: (0, 0),
            width: img_w,
            height: img_h,
            data,
        }
    }
}

/// A tag attached to an item or a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagValue {
    pub name: String,
    pub value: TagPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagPayload {
    None,
    Str(String),
    Num(f64),
}

impl TagValue {
    pub fn marker(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: TagPayload::None,
        }
    }
}

/// One labeled object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub class_name: String,
    pub geometry: Geometry,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagValue>,
}

impl Label {
    pub fn new(class_name: impl Into<String>, geometry: Geometry) -> Self {
        Self {
            class_name: class_name.into(),
            geometry,
            tags: Vec::new(),
        }
    }
}

/// Structured labels for one item, valid under some schema context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub width: u32,
    pub height: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Label>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagValue>,
}

impl Annotation {
    pub fn empty(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            labels: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Applies a resolved mapping's name rewrites: labels and tags whose name
    /// maps are renamed, those absent from the maps are dropped.
    pub fn remap(&self, resolved: &ResolvedMapping) -> Annotation {
        let labels = self
            .labels
            .iter()
            .filter_map(|label| {
                let class_name = resolved.class_names.get(&label.class_name)?.clone();
                let tags = remap_tags(&label.tags, resolved);
                Some(Label {
                    class_name,
                    geometry: label.geometry.clone(),
                    tags,
                })
            })
            .collect();
        Annotation {
            width: self.width,
            height: self.height,
            labels,
            tags: remap_tags(&self.tags, resolved),
        }
    }
}

fn remap_tags(tags: &[TagValue], resolved: &ResolvedMapping) -> Vec<TagValue> {
    tags.iter()
        .filter_map(|tag| {
            let name = resolved.tag_names.get(&tag.name)?.clone();
            Some(TagValue {
                name,
                value: tag.value.clone(),
            })
        })
        .collect()
}

/// The content side of an item: raw bytes or a lazy reference the item store
/// resolves on demand. Codec details are a non-goal; the engine never looks
/// inside.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemContent {
    Bytes(Arc<Vec<u8>>),
    Lazy(String),
}

impl ItemContent {
    pub fn bytes(data: Vec<u8>) -> Self {
        ItemContent::Bytes(Arc::new(data))
    }
}

/// One dataset item in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub name: String,
    pub content: ItemContent,
    pub annotation: Annotation,
}

impl Item {
    pub fn new(name: impl Into<String>, content: ItemContent, annotation: Annotation) -> Self {
        Self {
            name: name.into(),
            content,
            annotation,
        }
    }

    /// The same content under a new annotation. Content is shared, not copied.
    pub fn with_annotation(&self, annotation: Annotation) -> Item {
        Item {
            name: self.name.clone(),
            content: self.content.clone(),
            annotation,
        }
    }

    /// The same content and annotation under a new name.
    pub fn with_name(&self, name: impl Into<String>) -> Item {
        Item {
            name: name.into(),
            ..self.clone()
        }
    }
}
