//! In-memory collaborator implementations.
//!
//! Used by the integration tests and the CLI so pipelines can be exercised
//! without a live annotation platform. Failure injection mirrors the outage
//! modes the executor must survive: per-item read failures and transient
//! session drops.

use crate::error::ExternalError;
use crate::item::{Annotation, ItemContent, Label};
use crate::schema::Schema;
use ahash::AHashMap;
use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::{InferenceClient, ItemRef, ItemStore, SourceSelector};

/// Poisoned locks are recovered: a panicking test thread must not wedge the
/// store for the assertions that follow.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Debug, Clone)]
struct StoredItem {
    name: String,
    content: ItemContent,
    annotation: Annotation,
}

#[derive(Debug, Default)]
struct Dataset {
    schema: Schema,
    items: Vec<StoredItem>,
}

/// An in-memory [`ItemStore`].
#[derive(Default)]
pub struct MemoryStore {
    // keyed by "project/dataset"
    datasets: Mutex<AHashMap<String, Dataset>>,
    containers: Mutex<AHashMap<String, Vec<StoredItem>>>,
    jobs: Mutex<Vec<(String, String, usize)>>,
    corrupt: Mutex<HashSet<String>>,
    next_container: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_dataset(&self, project: &str, dataset: &str, schema: Schema) {
        lock(&self.datasets)
            .insert(format!("{project}/{dataset}"), Dataset {
                schema,
                items: Vec::new(),
            });
    }

    pub fn add_item(
        &self,
        project: &str,
        dataset: &str,
        name: &str,
        content: ItemContent,
        annotation: Annotation,
    ) {
        let mut datasets = lock(&self.datasets);
        let entry = datasets.entry(format!("{project}/{dataset}")).or_default();
        entry.items.push(StoredItem {
            name: name.to_string(),
            content,
            annotation,
        });
    }

    /// Marks an item so that reading its content fails permanently, emulating
    /// a corrupt blob.
    pub fn corrupt_item(&self, name: &str) {
        lock(&self.corrupt).insert(name.to_string());
    }

    /// Items written to a container so far, as `(name, annotation)` pairs.
    pub fn container_items(&self, container_id: &str) -> Vec<(String, Annotation)> {
        lock(&self.containers)
            .get(container_id)
            .map(|items| {
                items
                    .iter()
                    .map(|i| (i.name.clone(), i.annotation.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn labeling_jobs(&self) -> Vec<(String, String, usize)> {
        lock(&self.jobs).clone()
    }

    fn matched_keys(&self, selector: &SourceSelector) -> Vec<String> {
        let datasets = lock(&self.datasets);
        let mut keys: Vec<String> = datasets
            .keys()
            .filter(|key| {
                key.split_once('/')
                    .is_some_and(|(p, d)| selector.matches(p, d))
            })
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl ItemStore for MemoryStore {
    fn list_items(&self, selector: &SourceSelector) -> Result<Vec<ItemRef>, ExternalError> {
        let keys = self.matched_keys(selector);
        if keys.is_empty() {
            return Err(ExternalError::Permanent {
                collaborator: "item store".to_string(),
                message: format!("no dataset matches selector '{selector}'"),
            });
        }
        let datasets = lock(&self.datasets);
        let mut refs = Vec::new();
        for key in keys {
            let (project, dataset) = key.split_once('/').unwrap_or((key.as_str(), ""));
            for item in &datasets[&key].items {
                refs.push(ItemRef {
                    project: project.to_string(),
                    dataset: dataset.to_string(),
                    name: item.name.clone(),
                });
            }
        }
        Ok(refs)
    }

    fn read_item(&self, item: &ItemRef) -> Result<ItemContent, ExternalError> {
        if lock(&self.corrupt).contains(&item.name) {
            return Err(ExternalError::Permanent {
                collaborator: "item store".to_string(),
                message: format!("content of '{}' is unreadable", item.name),
            });
        }
        self.find(item).map(|stored| stored.content)
    }

    fn read_annotation(&self, item: &ItemRef) -> Result<Annotation, ExternalError> {
        self.find(item).map(|stored| stored.annotation)
    }

    fn get_schema(&self, selector: &SourceSelector) -> Result<Schema, ExternalError> {
        let keys = self.matched_keys(selector);
        if keys.is_empty() {
            return Err(ExternalError::Permanent {
                collaborator: "item store".to_string(),
                message: format!("no dataset matches selector '{selector}'"),
            });
        }
        let datasets = lock(&self.datasets);
        let mut merged = Schema::new();
        for key in keys {
            merged = Schema::merge(&merged, &datasets[&key].schema).map_err(|e| {
                ExternalError::Permanent {
                    collaborator: "item store".to_string(),
                    message: format!("selector '{selector}' spans conflicting schemas: {e}"),
                }
            })?;
        }
        Ok(merged)
    }

    fn create_container(&self, name: &str) -> Result<String, ExternalError> {
        let id = format!("{}#{}", name, self.next_container.fetch_add(1, Ordering::SeqCst));
        lock(&self.containers).insert(id.clone(), Vec::new());
        Ok(id)
    }

    fn write_item(
        &self,
        container_id: &str,
        name: &str,
        content: &ItemContent,
        annotation: &Annotation,
    ) -> Result<(), ExternalError> {
        let mut containers = lock(&self.containers);
        let container =
            containers
                .get_mut(container_id)
                .ok_or_else(|| ExternalError::Permanent {
                    collaborator: "item store".to_string(),
                    message: format!("unknown container '{container_id}'"),
                })?;
        container.push(StoredItem {
            name: name.to_string(),
            content: content.clone(),
            annotation: annotation.clone(),
        });
        Ok(())
    }

    fn create_labeling_job(
        &self,
        name: &str,
        container_id: &str,
        item_names: &[String],
    ) -> Result<String, ExternalError> {
        let job_id = format!("job:{name}");
        lock(&self.jobs)
            .push((job_id.clone(), container_id.to_string(), item_names.len()));
        Ok(job_id)
    }
}

impl MemoryStore {
    fn find(&self, item: &ItemRef) -> Result<StoredItem, ExternalError> {
        let key = format!("{}/{}", item.project, item.dataset);
        let datasets = lock(&self.datasets);
        datasets
            .get(&key)
            .and_then(|ds| ds.items.iter().find(|i| i.name == item.name))
            .cloned()
            .ok_or_else(|| ExternalError::Permanent {
                collaborator: "item store".to_string(),
                message: format!("item '{}' not found in '{key}'", item.name),
            })
    }
}

/// An in-memory [`InferenceClient`] that labels every item with a fixed set
/// of predictions.
#[derive(Default)]
pub struct MemoryInference {
    predictions: Vec<Label>,
    ready: bool,
    /// Number of calls that fail transiently before the session recovers.
    flaky_calls: AtomicUsize,
}

impl MemoryInference {
    pub fn ready(predictions: Vec<Label>) -> Self {
        Self {
            predictions,
            ready: true,
            flaky_calls: AtomicUsize::new(0),
        }
    }

    pub fn not_deployed() -> Self {
        Self::default()
    }

    /// Makes the next `calls` inference calls fail with a transient error.
    pub fn fail_transiently(&self, calls: usize) {
        self.flaky_calls.store(calls, Ordering::SeqCst);
    }
}

impl InferenceClient for MemoryInference {
    fn is_ready(&self, _session: &str) -> Result<bool, ExternalError> {
        Ok(self.ready)
    }

    fn infer(&self, session: &str, _content: &ItemContent) -> Result<Annotation, ExternalError> {
        if self
            .flaky_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ExternalError::Transient {
                collaborator: format!("inference session '{session}'"),
                message: "connection dropped".to_string(),
            });
        }
        let mut annotation = Annotation::empty(0, 0);
        annotation.labels = self.predictions.clone();
        Ok(annotation)
    }
}
