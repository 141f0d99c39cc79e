use std::path::Path;

use serde::Serialize;

use super::types::Step;

/// Aggregate comparison of the vehicle's choices against the re-run model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepSummary {
    pub frames: usize,
    pub duration_secs: f64,
    /// Share of frames where both picked the same action.
    pub agreement_rate: f64,
    pub mean_vehicle_top_probability: f64,
    pub mean_model_top_probability: f64,
    pub vehicle_histogram: Vec<u64>,
    pub model_histogram: Vec<u64>,
    pub mean_abs_difference: f64,
}

impl StepSummary {
    pub fn from_steps(steps: &[Step]) -> Self {
        let width = steps
            .iter()
            .map(|s| s.vehicle_probabilities.len().max(s.model_probabilities.len()))
            .max()
            .unwrap_or(0);
        let mut vehicle_histogram = vec![0u64; width];
        let mut model_histogram = vec![0u64; width];

        let mut compared = 0usize;
        let mut agreed = 0usize;
        let mut vehicle_top = 0.0f64;
        let mut model_top = 0.0f64;
        let mut abs_difference = 0.0f64;

        for step in steps {
            if let Some(action) = step.vehicle_action {
                vehicle_histogram[action] += 1;
                vehicle_top += step.vehicle_probabilities[action] as f64;
            }
            if let Some(action) = step.model_action {
                model_histogram[action] += 1;
                model_top += step.model_probabilities[action] as f64;
            }
            if let (Some(vehicle), Some(model)) = (step.vehicle_action, step.model_action) {
                compared += 1;
                if vehicle == model {
                    agreed += 1;
                }
            }

            let pairs = step
                .vehicle_probabilities
                .iter()
                .zip(&step.model_probabilities);
            let count = pairs.len();
            if count > 0 {
                let total: f64 = pairs.map(|(v, m)| (v - m).abs() as f64).sum();
                abs_difference += total / count as f64;
            }
        }

        let frames = steps.len();
        let mean = |sum: f64| if frames > 0 { sum / frames as f64 } else { 0.0 };
        let duration_secs = match (steps.first(), steps.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).max(0.0),
            _ => 0.0,
        };

        Self {
            frames,
            duration_secs,
            agreement_rate: if compared > 0 {
                agreed as f64 / compared as f64
            } else {
                0.0
            },
            mean_vehicle_top_probability: mean(vehicle_top),
            mean_model_top_probability: mean(model_top),
            vehicle_histogram,
            model_histogram,
            mean_abs_difference: mean(abs_difference),
        }
    }

    pub fn log(&self) {
        tracing::info!(
            "Summary: {} frames over {:.1}s, agreement {:.1}%, mean top probability vehicle {:.3} / model {:.3}, mean |diff| {:.3}",
            self.frames,
            self.duration_secs,
            self.agreement_rate * 100.0,
            self.mean_vehicle_top_probability,
            self.mean_model_top_probability,
            self.mean_abs_difference
        );
        tracing::info!(
            "Action histogram vehicle {:?} / model {:?}",
            self.vehicle_histogram,
            self.model_histogram
        );
    }

    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}
