use crate::error::{BadSettingsError, ItemProcessingError};
use crate::item::Item;
use crate::node::{Layer, LayerContext, NodeKind, Routed};
use crate::pipeline::NodeDefinition;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// The predicate an `if` node evaluates per item. Externally tagged, so the
/// settings read `{"condition": {"probability": 0.3}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// True for roughly this fraction of items, drawn from the per-run RNG.
    Probability(f64),
    /// True when the item carries at least this many labels.
    MinObjectsCount(usize),
    /// True when the item's image is at least this many pixels tall.
    MinHeight(i64),
    /// True when the item carries any of these tags.
    Tags(Vec<String>),
    /// True when any label belongs to one of these classes.
    Classes(Vec<String>),
}

#[derive(Deserialize)]
struct Settings {
    condition: Condition,
}

/// Routes each item to the true branch (port 0) or the false branch (port 1).
/// Both branches see the unchanged input schema.
pub struct IfLayer {
    condition: Condition,
}

impl IfLayer {
    pub fn from_definition(node: &NodeDefinition) -> Result<Self, BadSettingsError> {
        let settings: Settings = super::parse_settings(node)?;
        Ok(Self {
            condition: settings.condition,
        })
    }

    fn holds(&self, item: &Item, ctx: &mut LayerContext<'_>) -> bool {
        match &self.condition {
            Condition::Probability(p) => ctx.rng.random::<f64>() < *p,
            Condition::MinObjectsCount(n) => item.annotation.labels.len() >= *n,
            Condition::MinHeight(h) => i64::from(item.annotation.height) >= *h,
            Condition::Tags(names) => item
                .annotation
                .tags
                .iter()
                .any(|t| names.contains(&t.name)),
            Condition::Classes(names) => item
                .annotation
                .labels
                .iter()
                .any(|l| names.contains(&l.class_name)),
        }
    }
}

impl Layer for IfLayer {
    fn action(&self) -> &str {
        "if"
    }

    fn kind(&self) -> NodeKind {
        NodeKind::Conditional
    }

    fn validate(&self) -> Result<(), BadSettingsError> {
        if let Condition::Probability(p) = self.condition {
            if !(0.0..=1.0).contains(&p) {
                return Err(BadSettingsError::for_field(
                    "condition",
                    format!("probability {p} is outside [0, 1]"),
                ));
            }
        }
        Ok(())
    }

    fn transform(
        &mut self,
        item: Item,
        ctx: &mut LayerContext<'_>,
    ) -> Result<Vec<Routed>, ItemProcessingError> {
        let port = if self.holds(&item, ctx) { 0 } else { 1 };
        Ok(vec![(port, item)])
    }
}
