//! Versioned sets of class and tag definitions.
//!
//! A [`Schema`] describes the class/tag namespace annotations are valid under at
//! one point in the pipeline graph. Schemas are immutable by convention: every
//! recomputation replaces the value instead of mutating it in place, which is
//! what makes memoized propagation and preview rollback safe.

use crate::error::{EntryKind, SchemaError};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// RGB color attached to a class or tag definition.
pub type Color = [u8; 3];

/// The geometry family a class labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Point,
    Rectangle,
    Polygon,
    Polyline,
    Bitmap,
    /// Matches any geometry; merge-compatible with every other shape.
    Any,
}

impl ShapeKind {
    /// Whether labels of shape `other` may be merged into a class of this shape.
    pub fn accepts(self, other: ShapeKind) -> bool {
        self == ShapeKind::Any || other == ShapeKind::Any || self == other
    }
}

impl std::fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ShapeKind::Point => "point",
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Polygon => "polygon",
            ShapeKind::Polyline => "polyline",
            ShapeKind::Bitmap => "bitmap",
            ShapeKind::Any => "any",
        };
        write!(f, "{name}")
    }
}

/// The value discipline of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagValueKind {
    None,
    AnyString,
    OneOfString,
    Number,
}

/// A named object class. Immutable once placed in a [`Schema`]; edits go
/// through the `clone_*` constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,
    pub shape: ShapeKind,
    pub color: Color,
    /// Opaque per-shape configuration, carried through untouched.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>, shape: ShapeKind) -> Self {
        let name = name.into();
        let color = default_color(&name);
        Self {
            name,
            shape,
            color,
            config: serde_json::Map::new(),
        }
    }

    /// The same definition under a new name.
    pub fn clone_renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// The same definition under a new name and shape (e.g. line-to-mask
    /// always emits bitmap classes).
    pub fn clone_with_shape(&self, name: impl Into<String>, shape: ShapeKind) -> Self {
        Self {
            name: name.into(),
            shape,
            ..self.clone()
        }
    }
}

/// A named tag definition with the same immutability discipline as [`ClassDef`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDef {
    pub name: String,
    pub kind: TagValueKind,
    /// Only meaningful for [`TagValueKind::OneOfString`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<BTreeSet<String>>,
    pub color: Color,
}

impl TagDef {
    pub fn new(name: impl Into<String>, kind: TagValueKind) -> Self {
        let name = name.into();
        let color = default_color(&name);
        Self {
            name,
            kind,
            allowed_values: None,
            color,
        }
    }

    pub fn one_of(name: impl Into<String>, values: impl IntoIterator<Item = String>) -> Self {
        let mut def = Self::new(name, TagValueKind::OneOfString);
        def.allowed_values = Some(values.into_iter().collect());
        def
    }

    pub fn clone_renamed(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }
}

/// Deterministic color derived from the entry name, so freshly created
/// definitions stay stable across runs.
fn default_color(name: &str) -> Color {
    let mut h: u32 = 2166136261;
    for b in name.bytes() {
        h ^= b as u32;
        h = h.wrapping_mul(16777619);
    }
    [(h >> 16) as u8, (h >> 8) as u8, h as u8]
}

/// An ordered set of class and tag definitions, unique by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "SchemaDoc", into = "SchemaDoc")]
pub struct Schema {
    classes: Vec<ClassDef>,
    tags: Vec<TagDef>,
    class_index: AHashMap<String, usize>,
    tag_index: AHashMap<String, usize>,
}

/// Plain serialized form; the name indexes are rebuilt on load.
#[derive(Serialize, Deserialize)]
struct SchemaDoc {
    classes: Vec<ClassDef>,
    tags: Vec<TagDef>,
}

impl From<SchemaDoc> for Schema {
    fn from(doc: SchemaDoc) -> Self {
        let mut schema = Schema::new();
        for class in doc.classes {
            // Duplicates cannot appear in a document we wrote ourselves; keep
            // the first occurrence if a hand-edited file carries them.
            let _ = schema.add_class(class);
        }
        for tag in doc.tags {
            let _ = schema.add_tag(tag);
        }
        schema
    }
}

impl From<Schema> for SchemaDoc {
    fn from(schema: Schema) -> Self {
        SchemaDoc {
            classes: schema.classes,
            tags: schema.tags,
        }
    }
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    pub fn tags(&self) -> &[TagDef] {
        &self.tags
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.tags.is_empty()
    }

    pub fn get_class(&self, name: &str) -> Option<&ClassDef> {
        self.class_index.get(name).map(|&i| &self.classes[i])
    }

    pub fn get_tag(&self, name: &str) -> Option<&TagDef> {
        self.tag_index.get(name).map(|&i| &self.tags[i])
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.class_index.contains_key(name)
    }

    pub fn has_tag(&self, name: &str) -> bool {
        self.tag_index.contains_key(name)
    }

    /// Adds a class definition. Identical redefinition is a no-op; a differing
    /// one fails with [`SchemaError::DuplicateName`].
    pub fn add_class(&mut self, def: ClassDef) -> Result<(), SchemaError> {
        if let Some(existing) = self.get_class(&def.name) {
            if *existing == def {
                return Ok(());
            }
            return Err(SchemaError::DuplicateName {
                name: def.name,
                kind: EntryKind::Class,
            });
        }
        self.class_index.insert(def.name.clone(), self.classes.len());
        self.classes.push(def);
        Ok(())
    }

    /// Adds a tag definition with the same discipline as [`Schema::add_class`].
    pub fn add_tag(&mut self, def: TagDef) -> Result<(), SchemaError> {
        if let Some(existing) = self.get_tag(&def.name) {
            if *existing == def {
                return Ok(());
            }
            return Err(SchemaError::DuplicateName {
                name: def.name,
                kind: EntryKind::Tag,
            });
        }
        self.tag_index.insert(def.name.clone(), self.tags.len());
        self.tags.push(def);
        Ok(())
    }

    /// Unions two schemas by name.
    ///
    /// Identical same-name entries union silently. Same-name `OneOfString`
    /// tags that differ only in their allowed values have those value sets
    /// unioned. Any other definitional mismatch fails with
    /// [`SchemaError::Conflict`] carrying the offending name.
    pub fn merge(a: &Schema, b: &Schema) -> Result<Schema, SchemaError> {
        let mut merged = a.clone();
        for class in &b.classes {
            match merged.get_class(&class.name) {
                None => merged.add_class(class.clone())?,
                Some(existing) if existing == class => {}
                Some(_) => {
                    return Err(SchemaError::Conflict {
                        name: class.name.clone(),
                        kind: EntryKind::Class,
                    });
                }
            }
        }
        for tag in &b.tags {
            enum Disposition {
                Add,
                Keep,
                UnionValues(usize),
            }
            let disposition = match merged.get_tag(&tag.name) {
                None => Disposition::Add,
                Some(existing) if existing == tag => Disposition::Keep,
                Some(existing) if Self::one_of_compatible(existing, tag) => {
                    Disposition::UnionValues(merged.tag_index[&tag.name])
                }
                Some(_) => {
                    return Err(SchemaError::Conflict {
                        name: tag.name.clone(),
                        kind: EntryKind::Tag,
                    });
                }
            };
            match disposition {
                Disposition::Add => merged.add_tag(tag.clone())?,
                Disposition::Keep => {}
                Disposition::UnionValues(idx) => {
                    let ours = merged.tags[idx]
                        .allowed_values
                        .get_or_insert_with(BTreeSet::new);
                    if let Some(theirs) = &tag.allowed_values {
                        ours.extend(theirs.iter().cloned());
                    }
                }
            }
        }
        Ok(merged)
    }

    /// Two one-of tags whose only difference is the allowed-value set.
    fn one_of_compatible(a: &TagDef, b: &TagDef) -> bool {
        a.kind == TagValueKind::OneOfString
            && b.kind == TagValueKind::OneOfString
            && a.name == b.name
            && a.color == b.color
    }
}

/// Structural, order-insensitive equality over the name -> definition sets.
/// Used to short-circuit schema recomputation during propagation.
impl PartialEq for Schema {
    fn eq(&self, other: &Schema) -> bool {
        self.classes.len() == other.classes.len()
            && self.tags.len() == other.tags.len()
            && self
                .classes
                .iter()
                .all(|c| other.get_class(&c.name) == Some(c))
            && self.tags.iter().all(|t| other.get_tag(&t.name) == Some(t))
    }
}

impl Eq for Schema {}
