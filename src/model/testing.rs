//! Deterministic stand-ins for ONNX sessions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::observation::{InputShape, Observation};
use super::policy::{ModelLoader, PolicyModel};
use crate::error::ModelError;

/// Puts 0.7 on class `(level / 10) % actions`, where `level` is the first
/// observation value, and spreads the rest evenly.
pub(crate) struct ScriptedModel {
    actions: usize,
    shape: InputShape,
    corner_sensitive: bool,
    panic_on_level: Option<f32>,
    fail_on_level: Option<f32>,
    pub calls: usize,
}

impl ScriptedModel {
    pub fn new(actions: usize) -> Self {
        Self {
            actions,
            shape: InputShape::default(),
            corner_sensitive: false,
            panic_on_level: None,
            fail_on_level: None,
            calls: 0,
        }
    }

    /// Class 0 probability becomes the top-left quadrant brightness.
    pub fn corner_sensitive(mut self) -> Self {
        self.corner_sensitive = true;
        self
    }

    fn corner_output(&self, observation: &Observation) -> Vec<f32> {
        let (w, h) = (observation.shape.width, observation.shape.height);
        let channels = observation.shape.channels;
        let mut sum = 0.0;
        let mut count = 0.0;
        for y in 0..h / 2 {
            for x in 0..w / 2 {
                sum += observation.data[((y * w + x) as usize) * channels];
                count += 1.0;
            }
        }
        let p0 = (sum / count / 255.0f32).clamp(0.0, 1.0);
        let mut out = vec![0.0; self.actions.max(2)];
        out[0] = p0;
        out[1] = 1.0 - p0;
        out
    }
}

impl PolicyModel for ScriptedModel {
    fn input_shape(&self) -> InputShape {
        self.shape
    }

    fn predict(&mut self, observation: &Observation) -> Result<Vec<f32>, ModelError> {
        self.calls += 1;
        if self.corner_sensitive {
            return Ok(self.corner_output(observation));
        }

        let level = observation.data.first().copied().unwrap_or(0.0);
        if self.panic_on_level == Some(level) {
            panic!("scripted panic at level {level}");
        }
        if self.fail_on_level == Some(level) {
            return Err(ModelError::Inference(format!("scripted failure at level {level}")));
        }

        let top = (level as usize / 10) % self.actions;
        let rest = if self.actions > 1 {
            0.3 / (self.actions - 1) as f32
        } else {
            0.0
        };
        let mut out = vec![rest; self.actions];
        out[top] = if self.actions > 1 { 0.7 } else { 1.0 };
        Ok(out)
    }
}

#[derive(Clone)]
pub(crate) struct ScriptedLoader {
    actions: usize,
    shape: InputShape,
    fail_load: bool,
    panic_on_level: Option<f32>,
    fail_on_level: Option<f32>,
    pub loads: Arc<AtomicUsize>,
}

impl ScriptedLoader {
    pub fn new(actions: usize) -> Self {
        Self {
            actions,
            shape: InputShape {
                width: 16,
                height: 12,
                channels: 1,
            },
            fail_load: false,
            panic_on_level: None,
            fail_on_level: None,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn panic_on_level(mut self, level: f32) -> Self {
        self.panic_on_level = Some(level);
        self
    }

    pub fn fail_on_level(mut self, level: f32) -> Self {
        self.fail_on_level = Some(level);
        self
    }
}

impl ModelLoader for ScriptedLoader {
    fn load(&self) -> Result<Box<dyn PolicyModel>, ModelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail_load {
            return Err(ModelError::Inference("scripted load failure".to_string()));
        }
        let mut model = ScriptedModel::new(self.actions);
        model.shape = self.shape;
        model.panic_on_level = self.panic_on_level;
        model.fail_on_level = self.fail_on_level;
        Ok(Box::new(model))
    }
}
