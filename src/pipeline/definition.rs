use serde::{Deserialize, Serialize};

/// The complete, canonical definition of a pipeline, ready to be built into a
/// [`Graph`](crate::graph::Graph). This is also the persisted interchange
/// format between the UI and the engine; it round-trips losslessly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub nodes: Vec<NodeDefinition>,
}

/// One node record: an ordered list of these is the whole document.
///
/// `src` and `dst` name data streams. A node's `dst` tokens identify its
/// output ports (conditionals have two: true then false); downstream nodes
/// repeat those tokens in `src`. Source nodes instead list external
/// `"project/dataset"` selectors in `src`, where `"*"` selects all datasets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,
    pub action: String,
    #[serde(default)]
    pub settings: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub src: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dst: Vec<String>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            settings: serde_json::Value::Null,
            src: Vec::new(),
            dst: Vec::new(),
        }
    }

    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_src(mut self, src: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.src = src.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dst(mut self, dst: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dst = dst.into_iter().map(Into::into).collect();
        self
    }
}

impl PipelineDefinition {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
