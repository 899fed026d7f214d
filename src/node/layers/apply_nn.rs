use crate::collab::retry_once;
use crate::error::{BadSettingsError, ExternalError, ItemProcessingError, RunError};
use crate::item::Item;
use crate::mapping::ClassTagMapping;
use crate::node::{Layer, LayerContext, NodeKind, Routed};
use crate::pipeline::NodeDefinition;
use crate::schema::{ClassDef, TagDef};
use serde::Deserialize;

#[derive(Deserialize)]
struct Settings {
    /// Handle of the deployed model-serving session.
    session: String,
    /// Classes the model may predict, appended to the output schema.
    #[serde(default)]
    model_classes: Vec<ClassDef>,
    /// Tags the model may predict, appended to the output schema.
    #[serde(default)]
    model_tags: Vec<TagDef>,
}

/// Runs a deployed model over each batch and appends its predictions to the
/// items' annotations. The model's classes and tags join the output schema as
/// new definitions, walking the conflict ladder on collision.
pub struct ApplyNnLayer {
    session: String,
    model_classes: Vec<ClassDef>,
    model_tags: Vec<TagDef>,
    readiness_checked: bool,
}

impl ApplyNnLayer {
    pub fn from_definition(node: &NodeDefinition) -> Result<Self, BadSettingsError> {
        let settings: Settings = super::parse_settings(node)?;
        Ok(Self {
            session: settings.session,
            model_classes: settings.model_classes,
            model_tags: settings.model_tags,
            readiness_checked: false,
        })
    }

    /// Verifies the session is deployed, once per run. A missing or
    /// undeployed session is a permanent failure, not something to retry.
    fn ensure_ready(&mut self, ctx: &LayerContext<'_>) -> Result<(), ExternalError> {
        if self.readiness_checked {
            return Ok(());
        }
        let client = ctx.inference.ok_or_else(|| ExternalError::Permanent {
            collaborator: format!("inference session '{}'", self.session),
            message: "no inference client is configured".to_string(),
        })?;
        if !retry_once(|| client.is_ready(&self.session))? {
            return Err(ExternalError::Permanent {
                collaborator: format!("inference session '{}'", self.session),
                message: "model is not deployed".to_string(),
            });
        }
        self.readiness_checked = true;
        Ok(())
    }
}

impl Layer for ApplyNnLayer {
    fn action(&self) -> &str {
        "apply_nn"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Inference
    }

    fn validate(&self) -> Result<(), BadSettingsError> {
        if self.session.is_empty() {
            return Err(BadSettingsError::for_field(
                "session",
                "a session handle is required",
            ));
        }
        Ok(())
    }

    fn mapping(&self) -> ClassTagMapping {
        let mut mapping = ClassTagMapping::passthrough();
        for def in &self.model_classes {
            mapping = mapping.with_new_class(def.clone());
        }
        for def in &self.model_tags {
            mapping = mapping.with_new_tag(def.clone());
        }
        mapping
    }

    fn transform(
        &mut self,
        item: Item,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, ItemProcessingError> {
        // Single-item path; the batched override is what the executor calls.
        let node_id = ctx.node_id.to_string();
        let item_name = item.name.clone();
        self.transform_batch(vec![item], ctx)
            .map_err(|e| ItemProcessingError {
                node_id,
                item_name,
                message: e.to_string(),
            })
    }

    /// Inference failures are fatal after one retry; a half-annotated dataset
    /// is worse than an aborted run.
    fn transform_batch(
        &mut self,
        items: Vec<Item>,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, RunError> {
        self.ensure_ready(ctx)?;
        let client = ctx.inference.ok_or_else(|| ExternalError::Permanent {
            collaborator: format!("inference session '{}'", self.session),
            message: "no inference client is configured".to_string(),
        })?;
        let contents: Vec<_> = items.iter().map(|i| i.content.clone()).collect();
        let predictions = retry_once(|| client.infer_batch(&self.session, &contents))?;
        let mut out = Vec::with_capacity(items.len());
        for (item, predicted) in items.into_iter().zip(predictions) {
            let mut annotation = item.annotation.clone();
            annotation.labels.extend(predicted.labels);
            annotation.tags.extend(predicted.tags);
            out.push((0, item.with_annotation(annotation)));
        }
        Ok(out)
    }
}
