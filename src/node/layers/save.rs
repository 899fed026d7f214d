//! Sink layers. Sinks accumulate state while items stream through them on
//! port 0 and perform their external writes against the item store; in
//! preview mode no external write happens at all. Write failures are fatal to
//! the run after the usual single retry.

use crate::collab::retry_once;
use crate::error::{BadSettingsError, ExternalError, ItemProcessingError, RunError};
use crate::item::{Annotation, Item};
use crate::node::{Layer, LayerContext, NodeKind, Routed, SinkOutput};
use crate::pipeline::NodeDefinition;
use serde::{Deserialize, Serialize};

/// Writes every arriving item into a freshly created project container.
pub struct CreateNewProjectLayer {
    project_name: String,
    container_id: Option<String>,
    written: Vec<String>,
}

#[derive(Deserialize)]
struct ProjectSettings {
    project_name: String,
}

impl CreateNewProjectLayer {
    pub fn from_definition(node: &NodeDefinition) -> Result<Self, BadSettingsError> {
        let settings: ProjectSettings = super::parse_settings(node)?;
        Ok(Self {
            project_name: settings.project_name,
            container_id: None,
            written: Vec::new(),
        })
    }

    fn write(&mut self, item: &Item, ctx: &LayerContext<'_>) -> Result<(), ExternalError> {
        if ctx.run.preview_mode {
            return Ok(());
        }
        let container = match &self.container_id {
            Some(id) => id.clone(),
            None => {
                let id = retry_once(|| ctx.store.create_container(&self.project_name))?;
                self.container_id = Some(id.clone());
                id
            }
        };
        retry_once(|| ctx.store.write_item(&container, &item.name, &item.content, &item.annotation))?;
        self.written.push(item.name.clone());
        Ok(())
    }
}

impl Layer for CreateNewProjectLayer {
    fn action(&self) -> &str {
        "create_new_project"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Sink
    }

    fn validate(&self) -> Result<(), BadSettingsError> {
        if self.project_name.is_empty() {
            return Err(BadSettingsError::for_field(
                "project_name",
                "a project name is required",
            ));
        }
        Ok(())
    }

    fn transform(
        &mut self,
        item: Item,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, ItemProcessingError> {
        self.write(&item, ctx).map_err(|e| ItemProcessingError {
            node_id: ctx.node_id.to_string(),
            item_name: item.name.clone(),
            message: e.to_string(),
        })?;
        Ok(vec![(0, item)])
    }

    fn transform_batch(
        &mut self,
        items: Vec<Item>,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, RunError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            self.write(&item, ctx)?;
            out.push((0, item));
        }
        Ok(out)
    }

    fn postprocess(&mut self, _ctx: &mut LayerContext<'_>) -> Result<Option<SinkOutput>, RunError> {
        Ok(Some(SinkOutput {
            node_id: String::new(),
            kind: "project".to_string(),
            name: self.project_name.clone(),
            item_count: self.written.len(),
        }))
    }
}

/// Accumulates annotations in memory and writes one archive blob at the end
/// of the run.
pub struct ExportArchiveLayer {
    archive_name: String,
    entries: Vec<ArchiveEntry>,
}

#[derive(Deserialize)]
struct ArchiveSettings {
    archive_name: String,
}

#[derive(Serialize)]
struct ArchiveEntry {
    name: String,
    annotation: Annotation,
}

impl ExportArchiveLayer {
    pub fn from_definition(node: &NodeDefinition) -> Result<Self, BadSettingsError> {
        let settings: ArchiveSettings = super::parse_settings(node)?;
        Ok(Self {
            archive_name: settings.archive_name,
            entries: Vec::new(),
        })
    }
}

impl Layer for ExportArchiveLayer {
    fn action(&self) -> &str {
        "export_archive"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Sink
    }

    fn validate(&self) -> Result<(), BadSettingsError> {
        if self.archive_name.is_empty() {
            return Err(BadSettingsError::for_field(
                "archive_name",
                "an archive name is required",
            ));
        }
        Ok(())
    }

    fn transform(
        &mut self,
        item: Item,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, ItemProcessingError> {
        if !ctx.run.preview_mode {
            self.entries.push(ArchiveEntry {
                name: item.name.clone(),
                annotation: item.annotation.clone(),
            });
        }
        Ok(vec![(0, item)])
    }

    fn postprocess(&mut self, ctx: &mut LayerContext<'_>) -> Result<Option<SinkOutput>, RunError> {
        let item_count = self.entries.len();
        if !ctx.run.preview_mode {
            let blob = serde_json::to_vec(&self.entries).map_err(|e| {
                RunError::External(ExternalError::Permanent {
                    collaborator: "archive serializer".to_string(),
                    message: e.to_string(),
                })
            })?;
            let container = retry_once(|| ctx.store.create_container(&self.archive_name))?;
            let name = format!("{}.json", self.archive_name);
            let content = crate::item::ItemContent::bytes(blob);
            retry_once(|| {
                ctx.store
                    .write_item(&container, &name, &content, &Annotation::empty(0, 0))
            })?;
        }
        Ok(Some(SinkOutput {
            node_id: String::new(),
            kind: "archive".to_string(),
            name: self.archive_name.clone(),
            item_count,
        }))
    }
}

/// Writes arriving items into a container and opens a labeling job over them
/// once the stream ends.
pub struct LabelingJobLayer {
    job_name: String,
    container_id: Option<String>,
    item_names: Vec<String>,
}

#[derive(Deserialize)]
struct JobSettings {
    job_name: String,
}

impl LabelingJobLayer {
    pub fn from_definition(node: &NodeDefinition) -> Result<Self, BadSettingsError> {
        let settings: JobSettings = super::parse_settings(node)?;
        Ok(Self {
            job_name: settings.job_name,
            container_id: None,
            item_names: Vec::new(),
        })
    }

    fn write(&mut self, item: &Item, ctx: &LayerContext<'_>) -> Result<(), ExternalError> {
        if ctx.run.preview_mode {
            return Ok(());
        }
        let container = match &self.container_id {
            Some(id) => id.clone(),
            None => {
                let id = retry_once(|| ctx.store.create_container(&self.job_name))?;
                self.container_id = Some(id.clone());
                id
            }
        };
        retry_once(|| ctx.store.write_item(&container, &item.name, &item.content, &item.annotation))?;
        self.item_names.push(item.name.clone());
        Ok(())
    }
}

impl Layer for LabelingJobLayer {
    fn action(&self) -> &str {
        "labeling_job"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Sink
    }

    fn validate(&self) -> Result<(), BadSettingsError> {
        if self.job_name.is_empty() {
            return Err(BadSettingsError::for_field(
                "job_name",
                "a job name is required",
            ));
        }
        Ok(())
    }

    fn transform(
        &mut self,
        item: Item,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, ItemProcessingError> {
        self.write(&item, ctx).map_err(|e| ItemProcessingError {
            node_id: ctx.node_id.to_string(),
            item_name: item.name.clone(),
            message: e.to_string(),
        })?;
        Ok(vec![(0, item)])
    }

    fn transform_batch(
        &mut self,
        items: Vec<Item>,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, RunError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            self.write(&item, ctx)?;
            out.push((0, item));
        }
        Ok(out)
    }

    fn postprocess(&mut self, ctx: &mut LayerContext<'_>) -> Result<Option<SinkOutput>, RunError> {
        if !ctx.run.preview_mode {
            if let Some(container) = &self.container_id {
                retry_once(|| {
                    ctx.store
                        .create_labeling_job(&self.job_name, container, &self.item_names)
                })?;
            }
        }
        Ok(Some(SinkOutput {
            node_id: String::new(),
            kind: "labeling_job".to_string(),
            name: self.job_name.clone(),
            item_count: self.item_names.len(),
        }))
    }
}
