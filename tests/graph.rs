//! Graph construction, validation, topology and schema propagation.
mod common;
use annoflow::error::{BadSettingsError, GraphError, RunError, SchemaError};
use annoflow::node::{Layer, LayerContext, LayerFactory, NodeKind, Routed};
use annoflow::prelude::*;
use common::*;
use serde_json::json;
use std::result::Result;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn cycle_is_rejected_at_build_time() {
    let definition = PipelineDefinition {
        nodes: vec![
            NodeDefinition::new("a", "merge_classes")
                .with_settings(json!({ "classes_mapping": { "x": "y" } }))
                .with_src(["$b"])
                .with_dst(["$a"]),
            NodeDefinition::new("b", "merge_classes")
                .with_settings(json!({ "classes_mapping": { "x": "y" } }))
                .with_src(["$a"])
                .with_dst(["$b"]),
        ],
    };
    let err = Graph::from_definition(definition, &LayerRegistry::new()).unwrap_err();
    assert!(matches!(err, GraphError::Cycle { .. }));
}

#[test]
fn duplicate_node_id_is_rejected() {
    let mut definition = passthrough_pipeline();
    definition.nodes.push(definition.nodes[0].clone());
    let err = Graph::from_definition(definition, &LayerRegistry::new()).unwrap_err();
    assert!(matches!(err, GraphError::DuplicateNodeId(ref id) if id == "source"));
}

#[test]
fn unknown_action_is_rejected() {
    let definition = PipelineDefinition {
        nodes: vec![NodeDefinition::new("mystery", "warp_drive")],
    };
    let err = Graph::from_definition(definition, &LayerRegistry::new()).unwrap_err();
    assert!(matches!(err, GraphError::UnknownAction { ref action, .. } if action == "warp_drive"));
}

#[test]
fn dangling_stream_token_is_rejected() {
    let definition = PipelineDefinition {
        nodes: vec![
            NodeDefinition::new("save", "create_new_project")
                .with_settings(json!({ "project_name": "out" }))
                .with_src(["$nobody"]),
        ],
    };
    let err = Graph::from_definition(definition, &LayerRegistry::new()).unwrap_err();
    assert!(matches!(err, GraphError::DanglingSource { ref src, .. } if src == "$nobody"));
}

#[test]
fn non_source_without_inputs_is_rejected() {
    let definition = PipelineDefinition {
        nodes: vec![
            NodeDefinition::new("save", "create_new_project")
                .with_settings(json!({ "project_name": "out" })),
        ],
    };
    let err = Graph::from_definition(definition, &LayerRegistry::new()).unwrap_err();
    assert!(matches!(err, GraphError::NoInput { ref node_id } if node_id == "save"));
}

#[test]
fn conditional_must_declare_two_output_streams() {
    let definition = PipelineDefinition {
        nodes: vec![
            NodeDefinition::new("source", "images_project")
                .with_src(["demo/train"])
                .with_dst(["$source"]),
            NodeDefinition::new("split", "if")
                .with_settings(json!({ "condition": { "probability": 0.5 } }))
                .with_src(["$source"])
                .with_dst(["$split_true"]),
        ],
    };
    let err = Graph::from_definition(definition, &LayerRegistry::new()).unwrap_err();
    assert!(matches!(err, GraphError::BadPortCount { ref node_id, .. } if node_id == "split"));
}

#[test]
fn bad_settings_surface_with_node_id() {
    let definition = PipelineDefinition {
        nodes: vec![
            NodeDefinition::new("source", "images_project")
                .with_src(["demo/train"])
                .with_dst(["$source"]),
            NodeDefinition::new("lines", "line_to_mask")
                .with_settings(json!({ "classes_mapping": { "lane": "lane" }, "width": 0 }))
                .with_src(["$source"]),
        ],
    };
    let err = Graph::from_definition(definition, &LayerRegistry::new()).unwrap_err();
    match err {
        GraphError::BadSettings { node_id, error } => {
            assert_eq!(node_id, "lines");
            assert_eq!(error.field.as_deref(), Some("width"));
        }
        other => panic!("expected BadSettings, got {other:?}"),
    }
}

#[test]
fn definition_round_trips_through_json_and_graph() {
    // A wider document: chain of transforms plus a conditional fan.
    let mut nodes = vec![
        NodeDefinition::new("source", "images_project")
            .with_src(["demo/train", "demo/extra"])
            .with_dst(["$source"]),
    ];
    let mut upstream = "$source".to_string();
    for i in 0..20 {
        let id = format!("merge{i}");
        let token = format!("${id}");
        nodes.push(
            NodeDefinition::new(&id, "merge_classes")
                .with_settings(json!({ "classes_mapping": { "pedestrian": "person" } }))
                .with_src([upstream.clone()])
                .with_dst([token.clone()]),
        );
        upstream = token;
    }
    nodes.push(
        NodeDefinition::new("split", "if")
            .with_settings(json!({ "condition": { "min_objects_count": 1 } }))
            .with_src([upstream])
            .with_dst(["$split_true", "$split_false"]),
    );
    nodes.push(
        NodeDefinition::new("save", "create_new_project")
            .with_settings(json!({ "project_name": "out" }))
            .with_src(["$split_true"]),
    );
    nodes.push(
        NodeDefinition::new("rest", "export_archive")
            .with_settings(json!({ "archive_name": "rest" }))
            .with_src(["$split_false"]),
    );
    let definition = PipelineDefinition { nodes };

    let json = definition.to_json().unwrap();
    let reparsed = PipelineDefinition::from_json(&json).unwrap();
    assert_eq!(reparsed, definition);

    let graph = Graph::from_definition(reparsed, &LayerRegistry::new()).unwrap();
    assert_eq!(*graph.to_definition(), definition);
}

#[test]
fn topological_order_is_declaration_stable() {
    // Diamond: source -> (left, right) -> join. Left is declared before
    // right, so it must be processed first.
    let definition = PipelineDefinition {
        nodes: vec![
            NodeDefinition::new("source", "images_project")
                .with_src(["demo/train"])
                .with_dst(["$source"]),
            NodeDefinition::new("left", "merge_classes")
                .with_settings(json!({ "classes_mapping": { "pedestrian": "person" } }))
                .with_src(["$source"])
                .with_dst(["$left"]),
            NodeDefinition::new("right", "merge_classes")
                .with_settings(json!({ "classes_mapping": { "pedestrian": "person" } }))
                .with_src(["$source"])
                .with_dst(["$right"]),
            NodeDefinition::new("join", "export_archive")
                .with_settings(json!({ "archive_name": "joined" }))
                .with_src(["$left", "$right"]),
        ],
    };
    let graph = Graph::from_definition(definition, &LayerRegistry::new()).unwrap();
    assert_eq!(graph.topo_order(), vec!["source", "left", "right", "join"]);
}

#[test]
fn schemas_propagate_source_to_sink() {
    let store = demo_store(
        schema_of(&[
            ("person", ShapeKind::Rectangle),
            ("pedestrian", ShapeKind::Rectangle),
        ]),
        vec![],
    );
    let mut graph = Graph::from_definition(merge_pipeline(), &LayerRegistry::new()).unwrap();
    graph.propagate_schemas(&store).unwrap();

    let source_schema = graph.output_schema("source").unwrap();
    assert_eq!(source_schema.classes().len(), 2);
    let sink_schema = graph.output_schema("save").unwrap();
    assert_eq!(sink_schema.classes().len(), 1);
    assert!(sink_schema.has_class("person"));
}

#[test]
fn line_to_mask_emits_bitmap_class() {
    let store = demo_store(schema_of(&[("lane", ShapeKind::Polyline)]), vec![]);
    let definition = PipelineDefinition {
        nodes: vec![
            NodeDefinition::new("source", "images_project")
                .with_src(["demo/train"])
                .with_dst(["$source"]),
            NodeDefinition::new("lines", "line_to_mask")
                .with_settings(json!({ "classes_mapping": { "lane": "lane" }, "width": 3 }))
                .with_src(["$source"])
                .with_dst(["$lines"]),
            NodeDefinition::new("save", "create_new_project")
                .with_settings(json!({ "project_name": "out" }))
                .with_src(["$lines"]),
        ],
    };
    let mut graph = Graph::from_definition(definition, &LayerRegistry::new()).unwrap();
    graph.propagate_schemas(&store).unwrap();

    let schema = graph.output_schema("lines").unwrap();
    assert_eq!(schema.get_class("lane").unwrap().shape, ShapeKind::Bitmap);
}

#[test]
fn reconverging_sources_with_incompatible_shapes_conflict_before_any_item() {
    let store = MemoryStore::new();
    store.add_dataset("demo", "train", schema_of(&[("thing", ShapeKind::Rectangle)]));
    store.add_dataset("demo", "val", schema_of(&[("thing", ShapeKind::Bitmap)]));
    let definition = PipelineDefinition {
        nodes: vec![
            NodeDefinition::new("a", "images_project")
                .with_src(["demo/train"])
                .with_dst(["$a"]),
            NodeDefinition::new("b", "images_project")
                .with_src(["demo/val"])
                .with_dst(["$b"]),
            NodeDefinition::new("save", "create_new_project")
                .with_settings(json!({ "project_name": "out" }))
                .with_src(["$a", "$b"]),
        ],
    };
    let mut graph = Graph::from_definition(definition, &LayerRegistry::new()).unwrap();
    let err = graph.propagate_schemas(&store).unwrap_err();
    assert!(matches!(
        err,
        RunError::Schema(SchemaError::Conflict { ref name, .. }) if name == "thing"
    ));
}

// A passthrough layer that counts schema resolutions, to observe memoization.
struct CountingLayer;

static RESOLUTIONS: AtomicUsize = AtomicUsize::new(0);

impl Layer for CountingLayer {
    fn action(&self) -> &str {
        "counting"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Transform
    }

    fn output_schema(
        &self,
        input: &Schema,
    ) -> Result<ResolvedMapping, annoflow::error::MappingError> {
        RESOLUTIONS.fetch_add(1, Ordering::SeqCst);
        ClassTagMapping::passthrough().resolve(input)
    }

    fn transform(
        &mut self,
        item: Item,
        _ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, annoflow::error::ItemProcessingError> {
        Ok(vec![(0, item)])
    }
}

struct CountingFactory;

impl LayerFactory for CountingFactory {
    fn action(&self) -> &str {
        "counting"
    }

    fn create(&self, _node: &NodeDefinition) -> Result<Box<dyn Layer>, BadSettingsError> {
        Ok(Box::new(CountingLayer))
    }
}

#[test]
fn unchanged_input_schema_short_circuits_recomputation() {
    let registry = LayerRegistry::new().with_factory(Box::new(CountingFactory));
    let definition = PipelineDefinition {
        nodes: vec![
            NodeDefinition::new("source", "images_project")
                .with_src(["demo/train"])
                .with_dst(["$source"]),
            NodeDefinition::new("count", "counting")
                .with_src(["$source"])
                .with_dst(["$count"]),
            NodeDefinition::new("save", "create_new_project")
                .with_settings(json!({ "project_name": "out" }))
                .with_src(["$count"]),
        ],
    };
    let store = demo_store(schema_of(&[("person", ShapeKind::Rectangle)]), vec![]);
    let mut graph = Graph::from_definition(definition, &registry).unwrap();

    graph.propagate_schemas(&store).unwrap();
    let after_first = RESOLUTIONS.load(Ordering::SeqCst);
    assert_eq!(after_first, 1);

    graph.propagate_schemas(&store).unwrap();
    assert_eq!(RESOLUTIONS.load(Ordering::SeqCst), after_first);
}
