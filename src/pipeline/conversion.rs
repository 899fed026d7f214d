use super::definition::PipelineDefinition;
use crate::error::PipelineConversionError;

/// A trait for custom data models that can be converted into a
/// [`PipelineDefinition`].
///
/// This is the extension point for keeping the engine format-agnostic: UIs
/// and external tools keep their own document shape and implement this trait
/// on the top-level struct to hand the engine a canonical node list.
///
/// # Example
///
/// ```rust,no_run
/// use annoflow::prelude::*;
/// use annoflow::error::PipelineConversionError;
/// use std::result::Result;
///
/// struct MyStep { name: String, action: String }
/// struct MyWorkflow { steps: Vec<MyStep> }
///
/// impl IntoPipeline for MyWorkflow {
///     fn into_pipeline(self) -> Result<PipelineDefinition, PipelineConversionError> {
///         let mut nodes = Vec::new();
///         for step in self.steps {
///             nodes.push(NodeDefinition::new(step.name, step.action));
///             // ... fill in settings, src and dst ...
///         }
///         Ok(PipelineDefinition { nodes })
///     }
/// }
/// ```
pub trait IntoPipeline {
    /// Consumes the object and converts it into a canonical pipeline document.
    fn into_pipeline(self) -> Result<PipelineDefinition, PipelineConversionError>;
}

impl IntoPipeline for PipelineDefinition {
    fn into_pipeline(self) -> Result<PipelineDefinition, PipelineConversionError> {
        Ok(self)
    }
}
