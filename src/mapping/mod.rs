//! The per-node class/tag remapping algebra.
//!
//! Every node declares a [`ClassTagMapping`]: a table from input class/tag
//! names to actions (rename, merge-into, ignore, pass through), an `OTHER`
//! wildcard for unlisted names, and a `NEW` list of definitions the node
//! invents. [`ClassTagMapping::resolve`] turns the node's input [`Schema`]
//! into its output schema plus the concrete name rewrites applied to every
//! item at processing time.

use crate::error::{EntryKind, MappingError};
use crate::schema::{ClassDef, Schema, ShapeKind, TagDef};
use ahash::AHashMap;

/// What happens to one input class or tag name.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingAction {
    /// Emit the definition under a new name, optionally with a new shape
    /// (ignored for tags). Collisions walk the suffix ladder.
    Rename {
        new_name: String,
        new_shape: Option<ShapeKind>,
    },
    /// Rewrite labels to an existing target definition. Shapes must be
    /// compatible.
    MergeInto { target: String },
    /// Drop the name; labels carrying it are dropped at transform time.
    Ignore,
    /// Pass the definition through unchanged.
    Default,
}

/// A node's complete mapping table for classes and tags.
#[derive(Debug, Clone)]
pub struct ClassTagMapping {
    pub classes: AHashMap<String, MappingAction>,
    /// Fallback action for classes without an explicit entry (the `OTHER` key).
    pub classes_other: MappingAction,
    /// Brand-new class definitions this node synthesizes (the `NEW` key).
    pub new_classes: Vec<ClassDef>,
    pub tags: AHashMap<String, MappingAction>,
    pub tags_other: MappingAction,
    pub new_tags: Vec<TagDef>,
    /// First disambiguation suffix tried by the rename conflict ladder.
    pub rename_suffix: String,
}

impl Default for ClassTagMapping {
    fn default() -> Self {
        Self {
            classes: AHashMap::new(),
            classes_other: MappingAction::Ignore,
            new_classes: Vec::new(),
            tags: AHashMap::new(),
            tags_other: MappingAction::Ignore,
            new_tags: Vec::new(),
            rename_suffix: "m".to_string(),
        }
    }
}

impl ClassTagMapping {
    /// Everything passes through untouched. The mapping of source nodes and
    /// purely pixel-level transforms.
    pub fn passthrough() -> Self {
        Self {
            classes_other: MappingAction::Default,
            tags_other: MappingAction::Default,
            ..Self::default()
        }
    }

    pub fn with_class(mut self, name: impl Into<String>, action: MappingAction) -> Self {
        self.classes.insert(name.into(), action);
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, action: MappingAction) -> Self {
        self.tags.insert(name.into(), action);
        self
    }

    pub fn with_new_class(mut self, def: ClassDef) -> Self {
        self.new_classes.push(def);
        self
    }

    pub fn with_new_tag(mut self, def: TagDef) -> Self {
        self.new_tags.push(def);
        self
    }

    /// Computes the output schema and name rewrites for `input`.
    ///
    /// Classes are processed in schema declaration order, then tags; together
    /// with the deterministic topological order of the graph this makes the
    /// suffix ladder reproducible across runs.
    pub fn resolve(&self, input: &Schema) -> Result<ResolvedMapping, MappingError> {
        let mut out = Schema::new();
        let mut class_names = AHashMap::new();
        let mut tag_names = AHashMap::new();

        for def in input.classes() {
            let action = self.classes.get(&def.name).unwrap_or(&self.classes_other);
            match action {
                MappingAction::Ignore => {}
                MappingAction::Default => {
                    let final_name = place_class(&mut out, def.clone(), &self.rename_suffix)?;
                    class_names.insert(def.name.clone(), final_name);
                }
                MappingAction::Rename { new_name, new_shape } => {
                    let renamed = match new_shape {
                        Some(shape) => def.clone_with_shape(new_name.clone(), *shape),
                        None => def.clone_renamed(new_name.clone()),
                    };
                    let final_name = place_class(&mut out, renamed, &self.rename_suffix)?;
                    class_names.insert(def.name.clone(), final_name);
                }
                MappingAction::MergeInto { target } => {
                    let target_def = lookup_class(input, &self.new_classes, target)?;
                    if !target_def.shape.accepts(def.shape) {
                        return Err(MappingError::ShapeMismatch {
                            source_name: def.name.clone(),
                            target: target.clone(),
                            source_shape: def.shape.to_string(),
                            target_shape: target_def.shape.to_string(),
                        });
                    }
                    match out.add_class(target_def.clone()) {
                        Ok(()) => {}
                        Err(_) => {
                            return Err(MappingError::DuplicateName {
                                name: target.clone(),
                                kind: EntryKind::Class,
                            });
                        }
                    }
                    class_names.insert(def.name.clone(), target.clone());
                }
            }
        }

        for def in self.new_classes.iter() {
            if out.add_class(def.clone()).is_err() {
                return Err(MappingError::DuplicateName {
                    name: def.name.clone(),
                    kind: EntryKind::Class,
                });
            }
            // New definitions map to themselves so labels the node itself
            // emits under them survive the rewrite.
            class_names.insert(def.name.clone(), def.name.clone());
        }

        for def in input.tags() {
            let action = self.tags.get(&def.name).unwrap_or(&self.tags_other);
            match action {
                MappingAction::Ignore => {}
                MappingAction::Default => {
                    let final_name = place_tag(&mut out, def.clone(), &self.rename_suffix)?;
                    tag_names.insert(def.name.clone(), final_name);
                }
                MappingAction::Rename { new_name, .. } => {
                    let renamed = def.clone_renamed(new_name.clone());
                    let final_name = place_tag(&mut out, renamed, &self.rename_suffix)?;
                    tag_names.insert(def.name.clone(), final_name);
                }
                MappingAction::MergeInto { target } => {
                    let target_def = lookup_tag(input, &self.new_tags, target)?;
                    if target_def.kind != def.kind {
                        return Err(MappingError::ShapeMismatch {
                            source_name: def.name.clone(),
                            target: target.clone(),
                            source_shape: format!("{:?}", def.kind),
                            target_shape: format!("{:?}", target_def.kind),
                        });
                    }
                    if out.add_tag(target_def.clone()).is_err() {
                        return Err(MappingError::DuplicateName {
                            name: target.clone(),
                            kind: EntryKind::Tag,
                        });
                    }
                    tag_names.insert(def.name.clone(), target.clone());
                }
            }
        }

        for def in self.new_tags.iter() {
            if out.add_tag(def.clone()).is_err() {
                return Err(MappingError::DuplicateName {
                    name: def.name.clone(),
                    kind: EntryKind::Tag,
                });
            }
            tag_names.insert(def.name.clone(), def.name.clone());
        }

        Ok(ResolvedMapping {
            schema: out,
            class_names,
            tag_names,
        })
    }
}

/// The outcome of resolving a mapping against one input schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMapping {
    /// The node's output schema.
    pub schema: Schema,
    /// Input class name -> output class name. Names absent here are dropped.
    pub class_names: AHashMap<String, String>,
    /// Input tag name -> output tag name. Names absent here are dropped.
    pub tag_names: AHashMap<String, String>,
}

/// Places `def` into the building output schema, walking the conflict ladder
/// when its name is taken by a different definition: `{name}` first, then
/// `{name}-{suffix}`, then `{name}-{suffix}-1`, `-2`, … At every rung an
/// identical existing definition is reused; a differing one is never
/// overwritten. Returns the name the definition ended up under.
fn place_class(out: &mut Schema, def: ClassDef, suffix: &str) -> Result<String, MappingError> {
    let base = def.name.clone();
    let mut candidate = def;
    let mut rung = 0u32;
    loop {
        match out.get_class(&candidate.name) {
            None => {
                let name = candidate.name.clone();
                out.add_class(candidate)
                    .map_err(|_| MappingError::DuplicateName {
                        name: name.clone(),
                        kind: EntryKind::Class,
                    })?;
                return Ok(name);
            }
            Some(existing) if *existing == candidate => return Ok(candidate.name),
            Some(_) => {
                rung += 1;
                let next = match rung {
                    1 => format!("{base}-{suffix}"),
                    n => format!("{base}-{suffix}-{}", n - 1),
                };
                candidate = candidate.clone_renamed(next);
            }
        }
    }
}

/// Tag counterpart of [`place_class`].
fn place_tag(out: &mut Schema, def: TagDef, suffix: &str) -> Result<String, MappingError> {
    let base = def.name.clone();
    let mut candidate = def;
    let mut rung = 0u32;
    loop {
        match out.get_tag(&candidate.name) {
            None => {
                let name = candidate.name.clone();
                out.add_tag(candidate)
                    .map_err(|_| MappingError::DuplicateName {
                        name: name.clone(),
                        kind: EntryKind::Tag,
                    })?;
                return Ok(name);
            }
            Some(existing) if *existing == candidate => return Ok(candidate.name),
            Some(_) => {
                rung += 1;
                let next = match rung {
                    1 => format!("{base}-{suffix}"),
                    n => format!("{base}-{suffix}-{}", n - 1),
                };
                candidate = candidate.clone_renamed(next);
            }
        }
    }
}

fn lookup_class<'a>(
    input: &'a Schema,
    new_classes: &'a [ClassDef],
    name: &str,
) -> Result<&'a ClassDef, MappingError> {
    input
        .get_class(name)
        .or_else(|| new_classes.iter().find(|c| c.name == name))
        .ok_or_else(|| MappingError::MissingMapping {
            name: name.to_string(),
            kind: EntryKind::Class,
        })
}

fn lookup_tag<'a>(
    input: &'a Schema,
    new_tags: &'a [TagDef],
    name: &str,
) -> Result<&'a TagDef, MappingError> {
    input
        .get_tag(name)
        .or_else(|| new_tags.iter().find(|t| t.name == name))
        .ok_or_else(|| MappingError::MissingMapping {
            name: name.to_string(),
            kind: EntryKind::Tag,
        })
}
