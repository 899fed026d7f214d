//! Common test utilities for building schemas, items and pipeline documents.
use annoflow::prelude::*;
use serde_json::json;

/// Creates a schema from `(name, shape)` class pairs.
#[allow(dead_code)]
pub fn schema_of(classes: &[(&str, ShapeKind)]) -> Schema {
    let mut schema = Schema::new();
    for (name, shape) in classes {
        schema
            .add_class(ClassDef::new(*name, *shape))
            .expect("duplicate class in test schema");
    }
    schema
}

#[allow(dead_code)]
pub fn rect(left: i64, top: i64, right: i64, bottom: i64) -> Geometry {
    Geometry::Rectangle {
        left,
        top,
        right,
        bottom,
    }
}

/// An item with the given labels on a 100x100 canvas.
#[allow(dead_code)]
pub fn item_with_labels(name: &str, labels: Vec<Label>) -> Item {
    item_on_canvas(name, 100, 100, labels)
}

/// An item with the given labels on an explicitly sized canvas.
#[allow(dead_code)]
pub fn item_on_canvas(name: &str, width: u32, height: u32, labels: Vec<Label>) -> Item {
    let mut annotation = Annotation::empty(width, height);
    annotation.labels = labels;
    Item::new(name, ItemContent::Lazy(name.to_string()), annotation)
}

/// A store holding one `demo/train` dataset with the given schema and items.
#[allow(dead_code)]
pub fn demo_store(schema: Schema, items: Vec<Item>) -> MemoryStore {
    let store = MemoryStore::new();
    store.add_dataset("demo", "train", schema);
    for item in items {
        store.add_item("demo", "train", &item.name, item.content, item.annotation);
    }
    store
}

/// `images_project -> create_new_project("out")`, the smallest runnable
/// pipeline.
#[allow(dead_code)]
pub fn passthrough_pipeline() -> PipelineDefinition {
    PipelineDefinition {
        nodes: vec![
            NodeDefinition::new("source", "images_project")
                .with_src(["demo/train"])
                .with_dst(["$source"]),
            NodeDefinition::new("save", "create_new_project")
                .with_settings(json!({ "project_name": "out" }))
                .with_src(["$source"]),
        ],
    }
}

/// `images_project -> merge_classes(pedestrian -> person) -> create_new_project("out")`.
#[allow(dead_code)]
pub fn merge_pipeline() -> PipelineDefinition {
    PipelineDefinition {
        nodes: vec![
            NodeDefinition::new("source", "images_project")
                .with_src(["demo/train"])
                .with_dst(["$source"]),
            NodeDefinition::new("merge", "merge_classes")
                .with_settings(json!({ "classes_mapping": { "pedestrian": "person" } }))
                .with_src(["$source"])
                .with_dst(["$merge"]),
            NodeDefinition::new("save", "create_new_project")
                .with_settings(json!({ "project_name": "out" }))
                .with_src(["$merge"]),
        ],
    }
}

/// The first container id the in-memory store hands out for `name`.
#[allow(dead_code)]
pub fn first_container(name: &str) -> String {
    format!("{name}#0")
}
