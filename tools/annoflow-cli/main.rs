use annoflow::prelude::*;
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::time::Instant;

// --- JSON Deserialization Structs (Input Format Specific) ---
// These structs match the CLI's dataset file format and are only used here.

#[derive(Deserialize)]
struct DatasetFile {
    datasets: Vec<RawDataset>,
}

#[derive(Deserialize)]
struct RawDataset {
    project: String,
    dataset: String,
    schema: Schema,
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Deserialize)]
struct RawItem {
    name: String,
    annotation: Annotation,
}

/// A node-graph data-transformation pipeline engine CLI
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the pipeline definition JSON file
    pipeline_path: String,

    /// Optional path to a dataset JSON file backing the source nodes
    #[arg(short, long)]
    dataset: Option<String>,

    /// Execute the pipeline instead of only validating it
    #[arg(short, long)]
    run: bool,

    /// Items pulled from each source per batch
    #[arg(long, default_value_t = 50)]
    batch_size: usize,

    /// Seed for the per-run RNG (probability conditionals)
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Optional path to save the compiled pipeline artifact to
    #[arg(long)]
    artifact: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();
    let cli = Cli::parse();
    let total_start = Instant::now();

    // --- 1. File Loading ---
    let load_start = Instant::now();
    let pipeline_json = fs::read_to_string(&cli.pipeline_path).unwrap_or_else(|e| {
        exit_with_error(&format!(
            "Failed to read pipeline file '{}': {}",
            &cli.pipeline_path, e
        ))
    });
    let definition = PipelineDefinition::from_json(&pipeline_json)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse pipeline JSON: {}", e)));

    let store = MemoryStore::new();
    let mut item_total = 0usize;
    if let Some(dataset_path) = &cli.dataset {
        let dataset_json = fs::read_to_string(dataset_path).unwrap_or_else(|e| {
            exit_with_error(&format!(
                "Failed to read dataset file '{}': {}",
                dataset_path, e
            ))
        });
        let file: DatasetFile = serde_json::from_str(&dataset_json)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse dataset JSON: {}", e)));
        for raw in file.datasets {
            store.add_dataset(&raw.project, &raw.dataset, raw.schema);
            for item in raw.items {
                item_total += 1;
                store.add_item(
                    &raw.project,
                    &raw.dataset,
                    &item.name,
                    ItemContent::Lazy(item.name.clone()),
                    item.annotation,
                );
            }
        }
    }
    let load_duration = load_start.elapsed();

    // --- 2. Graph Construction and Validation ---
    println!("\nBuilding pipeline graph...");
    let build_start = Instant::now();
    let registry = LayerRegistry::new();
    let mut graph = Graph::from_definition(definition, &registry)
        .unwrap_or_else(|e| exit_with_error(&format!("Pipeline validation failed: {}", e)));
    let build_duration = build_start.elapsed();
    println!(
        "Graph valid: {} node(s), processing order: {}",
        graph.len(),
        graph.topo_order().join(" -> ")
    );

    // --- 3. Schema Propagation ---
    let mut schema_duration = None;
    if cli.dataset.is_some() {
        let schema_start = Instant::now();
        graph
            .propagate_schemas(&store)
            .unwrap_or_else(|e| exit_with_error(&format!("Schema propagation failed: {}", e)));
        schema_duration = Some(schema_start.elapsed());

        println!("\nResolved schemas:");
        for id in graph.topo_order() {
            if let Some(schema) = graph.output_schema(id) {
                let classes: Vec<_> = schema
                    .classes()
                    .iter()
                    .map(|c| format!("{} ({})", c.name, c.shape))
                    .collect();
                let tags: Vec<_> = schema.tags().iter().map(|t| t.name.clone()).collect();
                println!(
                    "  {:<20} classes: [{}]  tags: [{}]",
                    id,
                    classes.join(", "),
                    tags.join(", ")
                );
            }
        }

        if let Some(artifact_path) = &cli.artifact {
            let compiled =
                CompiledPipeline::new(graph.to_definition().clone(), graph.node_schemas());
            compiled
                .save(artifact_path)
                .unwrap_or_else(|e| exit_with_error(&format!("Failed to save artifact: {}", e)));
            println!("\nCompiled pipeline saved to '{}'", artifact_path);
        }
    } else if cli.run || cli.artifact.is_some() {
        exit_with_error("A dataset file (--dataset) is required to propagate schemas or run");
    }

    // --- 4. Execution ---
    let mut run_duration = None;
    if cli.run {
        println!("\nRunning pipeline over {} item(s)...", item_total);
        let run_start = Instant::now();
        let ctx = RunContext::new()
            .with_batch_size(cli.batch_size)
            .with_seed(cli.seed);
        let report = Executor::new(&mut graph, &store)
            .run(&ctx)
            .unwrap_or_else(|e| exit_with_error(&format!("Pipeline run failed: {}", e)));
        run_duration = Some(run_start.elapsed());

        println!("\nRun finished: {}/{} items", report.processed, report.total);
        for output in &report.sink_outputs {
            println!(
                "  -> Sink '{}' wrote {} ({} item(s))",
                output.node_id, output.name, output.item_count
            );
        }
    }

    // --- 5. Summary ---
    let total_duration = total_start.elapsed();
    println!("\n--- Performance Summary ---");
    println!("File Loading:         {:?}", load_duration);
    println!("Graph Build:          {:?}", build_duration);
    if let Some(d) = schema_duration {
        println!("Schema Propagation:   {:?}", d);
    }
    if let Some(d) = run_duration {
        println!("Execution:            {:?}", d);
    }
    println!("-----------------------------");
    println!("Total:                {:?}", total_duration);
    println!();
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    std::process::exit(1);
}
