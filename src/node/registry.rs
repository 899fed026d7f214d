//! Action-name registry of layer factories.
//!
//! A [`Graph`](crate::graph::Graph) is built from a
//! [`PipelineDefinition`](crate::pipeline::PipelineDefinition) by looking up
//! each node's `action` string here and asking the factory to construct the
//! layer from the node's settings. The default set covers the shipped layer
//! inventory; callers extend it with [`LayerRegistry::with_factory`].

use crate::error::BadSettingsError;
use crate::pipeline::NodeDefinition;
use ahash::AHashMap;

use super::Layer;
use super::layers::{
    ApplyNnLayer, CreateNewProjectLayer, ExportArchiveLayer, IfLayer, ImagesProjectLayer,
    InstancesCropLayer, LabelingJobLayer, LineToMaskLayer, MergeClassesLayer,
};

/// Constructs a [`Layer`] of one action kind from a node definition.
pub trait LayerFactory: Send + Sync {
    fn action(&self) -> &str;
    fn create(&self, node: &NodeDefinition) -> Result<Box<dyn Layer>, BadSettingsError>;
}

/// Master macro defining a factory struct per shipped layer plus the default
/// registration table.
macro_rules! define_layer_factories {
    ( $( ($factory:ident, $action:expr, $layer:ty) ),* $(,)? ) => {
        $(
            struct $factory;
            impl LayerFactory for $factory {
                fn action(&self) -> &str { $action }
                fn create(&self, node: &NodeDefinition) -> Result<Box<dyn Layer>, BadSettingsError> {
                    Ok(Box::new(<$layer>::from_definition(node)?))
                }
            }
        )*

        fn register_default_factories(registry: &mut AHashMap<String, Box<dyn LayerFactory>>) {
            $( registry.insert($action.to_string(), Box::new($factory)); )*
        }
    };
}

define_layer_factories! {
    (ImagesProjectFactory, "images_project", ImagesProjectLayer),
    (MergeClassesFactory, "merge_classes", MergeClassesLayer),
    (LineToMaskFactory, "line_to_mask", LineToMaskLayer),
    (InstancesCropFactory, "instances_crop", InstancesCropLayer),
    (IfFactory, "if", IfLayer),
    (ApplyNnFactory, "apply_nn", ApplyNnLayer),
    (CreateNewProjectFactory, "create_new_project", CreateNewProjectLayer),
    (ExportArchiveFactory, "export_archive", ExportArchiveLayer),
    (LabelingJobFactory, "labeling_job", LabelingJobLayer),
}

/// The set of actions a graph may be built from.
pub struct LayerRegistry {
    factories: AHashMap<String, Box<dyn LayerFactory>>,
}

impl Default for LayerRegistry {
    fn default() -> Self {
        let mut factories = AHashMap::new();
        register_default_factories(&mut factories);
        Self { factories }
    }
}

impl LayerRegistry {
    /// A registry holding the shipped layer inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty registry; useful when every action is custom.
    pub fn empty() -> Self {
        Self {
            factories: AHashMap::new(),
        }
    }

    /// Registers a custom factory, replacing any factory already claiming the
    /// same action name.
    pub fn with_factory(mut self, factory: Box<dyn LayerFactory>) -> Self {
        self.factories.insert(factory.action().to_string(), factory);
        self
    }

    pub fn get(&self, action: &str) -> Option<&dyn LayerFactory> {
        self.factories.get(action).map(Box::as_ref)
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
