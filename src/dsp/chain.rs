//! Pipeline: ordered composition of transforms
//!
//! Stages run in order (index 0 first). Each stage sees the previous stage's
//! output; the first failing stage aborts the run and its error is returned
//! as-is. An empty pipeline returns its input unchanged.

use log::debug;
use serde_json::{json, Value};

use super::config::PipelineConfig;
use super::Transform;
use crate::engine::Signal;
use crate::error::Result;

/// Ordered list of transforms applied as one
#[derive(Clone, Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Transform>>,
}

impl Pipeline {
    /// Create an empty (identity) pipeline
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Compose `stages` left to right
    pub fn compose(stages: Vec<Box<dyn Transform>>) -> Self {
        Self { stages }
    }

    /// Append a stage
    pub fn then(mut self, stage: impl Transform + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append a boxed stage
    pub fn push(&mut self, stage: Box<dyn Transform>) {
        self.stages.push(stage);
    }

    /// Build from a parsed configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::compose(config.stages.iter().map(|spec| spec.build()).collect())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(Self::from_config(&PipelineConfig::from_json_str(json)?))
    }

    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        Ok(Self::from_config(&PipelineConfig::from_file(path)?))
    }

    /// Get the number of stages
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Check if the pipeline is empty
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Iterate over stages
    pub fn iter(&self) -> impl Iterator<Item = &dyn Transform> {
        self.stages.iter().map(|t| t.as_ref())
    }

    /// Stage names in order
    pub fn names(&self) -> Vec<&'static str> {
        self.iter().map(|t| t.name()).collect()
    }

    /// Run every stage and keep each intermediate output
    ///
    /// The last element equals what `apply` returns.
    pub fn trace(&self, input: &Signal) -> Result<Vec<Signal>> {
        let mut outputs: Vec<Signal> = Vec::with_capacity(self.stages.len());
        for (i, stage) in self.stages.iter().enumerate() {
            let previous = outputs.last().unwrap_or(input);
            let output = stage.apply(previous)?;
            debug!(
                "pipeline stage {} ({}): {:?} -> {:?}",
                i,
                stage.name(),
                previous.shape(),
                output.shape()
            );
            outputs.push(output);
        }
        Ok(outputs)
    }

    /// Serialize the pipeline to the same JSON shape `PipelineConfig` reads
    pub fn to_json(&self) -> Value {
        let stages: Vec<Value> = self
            .stages
            .iter()
            .map(|stage| {
                let mut entry = json!({ "type": stage.name() });
                if let (Some(entry), Value::Object(params)) = (entry.as_object_mut(), stage.params()) {
                    entry.extend(params);
                }
                entry
            })
            .collect();
        json!({ "stages": stages })
    }
}

impl Transform for Pipeline {
    fn apply(&self, input: &Signal) -> Result<Signal> {
        let mut current = input.clone();
        for (i, stage) in self.stages.iter().enumerate() {
            let output = stage.apply(&current)?;
            debug!(
                "pipeline stage {} ({}): {:?} -> {:?}",
                i,
                stage.name(),
                current.shape(),
                output.shape()
            );
            current = output;
        }
        Ok(current)
    }

    fn name(&self) -> &'static str {
        "pipeline"
    }

    fn params(&self) -> Value {
        self.to_json()
    }

    fn box_clone(&self) -> Box<dyn Transform> {
        Box::new(self.clone())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.stages.iter()).finish()
    }
}
