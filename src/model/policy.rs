use std::path::PathBuf;

use ort::session::{builder::GraphOptimizationLevel, Session};

use super::observation::{InputShape, Observation};
use super::package::ModelPackage;
use crate::error::ModelError;

/// A decision model that maps an observation to per-action outputs.
pub trait PolicyModel {
    fn input_shape(&self) -> InputShape;

    fn predict(&mut self, observation: &Observation) -> Result<Vec<f32>, ModelError>;
}

/// Builds a fresh model instance; each render worker loads its own.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn PolicyModel>, ModelError>;
}

pub struct OnnxPolicy {
    session: Session,
    input_name: String,
    shape: InputShape,
    discrete: bool,
}

impl OnnxPolicy {
    pub fn new(
        weights: &std::path::Path,
        shape: InputShape,
        discrete: bool,
        intra_threads: usize,
    ) -> Result<Self, ModelError> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(intra_threads)?
            .commit_from_file(weights)?;
        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .ok_or_else(|| ModelError::Inference("model declares no inputs".to_string()))?;

        tracing::debug!("ONNX session ready for {} (input {})", weights.display(), input_name);

        Ok(Self {
            session,
            input_name,
            shape,
            discrete,
        })
    }
}

impl PolicyModel for OnnxPolicy {
    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn predict(&mut self, observation: &Observation) -> Result<Vec<f32>, ModelError> {
        let shape = observation.tensor_shape();
        let input = ort::value::Value::from_array((
            shape.as_slice(),
            observation.data.clone().into_boxed_slice(),
        ))?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        let values = data.to_vec();

        Ok(if self.discrete {
            normalize(values)
        } else {
            values
        })
    }
}

/// Loads [`OnnxPolicy`] sessions from a model package.
#[derive(Debug, Clone)]
pub struct OnnxLoader {
    weights: PathBuf,
    shape: InputShape,
    discrete: bool,
    intra_threads: usize,
}

impl OnnxLoader {
    pub fn from_package(package: &ModelPackage) -> Self {
        Self {
            weights: package.weights.clone(),
            shape: InputShape {
                channels: package.metadata.camera_channels(),
                ..InputShape::default()
            },
            discrete: package.metadata.is_discrete(),
            intra_threads: 1,
        }
    }

    // Sets the number of intra-op threads per session.
    pub fn with_intra_threads(mut self, intra_threads: usize) -> Self {
        self.intra_threads = intra_threads.max(1);
        self
    }
}

impl ModelLoader for OnnxLoader {
    fn load(&self) -> Result<Box<dyn PolicyModel>, ModelError> {
        let policy = OnnxPolicy::new(&self.weights, self.shape, self.discrete, self.intra_threads)?;
        Ok(Box::new(policy))
    }
}

/// Passes probabilities through, and applies a softmax to raw logits.
pub(crate) fn normalize(values: Vec<f32>) -> Vec<f32> {
    let sum: f32 = values.iter().sum();
    let is_distribution = values.iter().all(|v| *v >= 0.0) && (sum - 1.0).abs() < 1e-3;
    if values.is_empty() || is_distribution {
        return values;
    }

    let max_logit = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max_logit).exp()).collect();
    let total: f32 = exps.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        let n = values.len() as f32;
        return vec![1.0 / n; values.len()];
    }
    exps.into_iter().map(|e| e / total).collect()
}
