//! End-to-end: a pipeline document as the UI would hand it over, built,
//! executed and persisted as a compiled artifact.
mod common;
use annoflow::error::PipelineConversionError;
use annoflow::prelude::*;
use common::*;
use std::result::Result;

const STREET_PIPELINE: &str = r#"{
  "nodes": [
    {
      "id": "source",
      "action": "images_project",
      "src": ["street/*"],
      "dst": ["$source"]
    },
    {
      "id": "merge",
      "action": "merge_classes",
      "settings": { "classes_mapping": { "pedestrian": "person", "cyclist": "person" } },
      "src": ["$source"],
      "dst": ["$merge"]
    },
    {
      "id": "split",
      "action": "if",
      "settings": { "condition": { "min_objects_count": 1 } },
      "src": ["$merge"],
      "dst": ["$labeled", "$empty"]
    },
    {
      "id": "save",
      "action": "create_new_project",
      "settings": { "project_name": "street-clean" },
      "src": ["$labeled"]
    },
    {
      "id": "archive",
      "action": "export_archive",
      "settings": { "archive_name": "street-empty" },
      "src": ["$empty"]
    }
  ]
}"#;

fn street_store() -> MemoryStore {
    let schema = schema_of(&[
        ("person", ShapeKind::Rectangle),
        ("pedestrian", ShapeKind::Rectangle),
        ("cyclist", ShapeKind::Rectangle),
    ]);
    let store = MemoryStore::new();
    store.add_dataset("street", "train", schema.clone());
    store.add_dataset("street", "val", schema);
    let add = |dataset: &str, item: Item| {
        store.add_item("street", dataset, &item.name, item.content, item.annotation);
    };
    add("train", item_with_labels("t0.png", vec![
        Label::new("pedestrian", rect(0, 0, 10, 20)),
    ]));
    add("train", item_with_labels("t1.png", vec![]));
    add("val", item_with_labels("v0.png", vec![
        Label::new("cyclist", rect(5, 5, 25, 45)),
        Label::new("person", rect(30, 30, 50, 70)),
    ]));
    store
}

#[test]
fn document_to_run_end_to_end() {
    let store = street_store();
    let definition = PipelineDefinition::from_json(STREET_PIPELINE).unwrap();
    let mut graph = Graph::from_definition(definition, &LayerRegistry::new()).unwrap();

    let report = Executor::new(&mut graph, &store)
        .run(&RunContext::new())
        .unwrap();
    assert_eq!(report.processed, 3);

    // The wildcard selector spans both datasets; both merged classes land in
    // the sink schema as "person".
    let sink_schema = graph.output_schema("save").unwrap();
    assert_eq!(sink_schema.classes().len(), 1);
    assert!(sink_schema.has_class("person"));

    // Labeled items go to the project, the empty one to the archive.
    let saved = store.container_items(&first_container("street-clean"));
    let mut names: Vec<_> = saved.iter().map(|(name, _)| name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["t0.png", "v0.png"]);
    for (_, annotation) in &saved {
        for label in &annotation.labels {
            assert_eq!(label.class_name, "person");
        }
    }

    let archive_sink = report
        .sink_outputs
        .iter()
        .find(|s| s.node_id == "archive")
        .unwrap();
    assert_eq!(archive_sink.item_count, 1);
}

#[test]
fn compiled_artifact_round_trips_through_a_file() {
    let store = street_store();
    let definition = PipelineDefinition::from_json(STREET_PIPELINE).unwrap();
    let mut graph = Graph::from_definition(definition, &LayerRegistry::new()).unwrap();
    graph.propagate_schemas(&store).unwrap();

    let compiled = CompiledPipeline::new(graph.to_definition().clone(), graph.node_schemas());
    let path = std::env::temp_dir().join("annoflow-artifact-test.json");
    let path = path.to_str().unwrap();
    compiled.save(path).unwrap();

    let loaded = CompiledPipeline::from_file(path).unwrap();
    std::fs::remove_file(path).ok();
    assert_eq!(loaded.definition, compiled.definition);
    assert_eq!(loaded.node_schemas.len(), 5);
    assert_eq!(loaded.node_schemas["save"], compiled.node_schemas["save"]);

    // The reloaded definition still builds and validates.
    let graph = Graph::from_definition(loaded.definition, &LayerRegistry::new()).unwrap();
    assert_eq!(graph.len(), 5);
}

// A miniature external document model, exercised through the conversion seam.
struct Workflow {
    steps: Vec<(String, String)>,
}

impl IntoPipeline for Workflow {
    fn into_pipeline(self) -> Result<PipelineDefinition, PipelineConversionError> {
        if self.steps.is_empty() {
            return Err(PipelineConversionError::ValidationError(
                "a workflow needs at least one step".to_string(),
            ));
        }
        let mut nodes = Vec::new();
        let mut upstream: Option<String> = None;
        for (id, action) in self.steps {
            let token = format!("${id}");
            let mut node = NodeDefinition::new(&id, &action).with_dst([token.clone()]);
            if let Some(prev) = upstream {
                node = node.with_src([prev]);
            }
            nodes.push(node);
            upstream = Some(token);
        }
        Ok(PipelineDefinition { nodes })
    }
}

#[test]
fn custom_document_models_convert_through_the_trait() {
    let workflow = Workflow {
        steps: vec![
            ("a".to_string(), "images_project".to_string()),
            ("b".to_string(), "merge_classes".to_string()),
        ],
    };
    let definition = workflow.into_pipeline().unwrap();
    assert_eq!(definition.nodes.len(), 2);
    assert_eq!(definition.nodes[1].src, vec!["$a"]);

    let empty = Workflow { steps: Vec::new() };
    assert!(empty.into_pipeline().is_err());
}
