use super::observation::Observation;
use super::policy::PolicyModel;
use crate::error::ModelError;

/// Occlusion-sensitivity map over the observation plus the unoccluded model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Attention {
    pub probabilities: Vec<f32>,
    pub grid_width: usize,
    pub grid_height: usize,
    /// Row-major heat per patch in `[0, 1]`.
    pub heat: Vec<f32>,
}

impl Attention {
    pub fn top_class(&self) -> Option<usize> {
        argmax(&self.probabilities)
    }

    /// Bilinearly resamples the patch grid to `width x height`, row-major.
    pub fn upsample(&self, width: u32, height: u32) -> Vec<f32> {
        let (gw, gh) = (self.grid_width, self.grid_height);
        if gw == 0 || gh == 0 {
            return vec![0.0; (width * height) as usize];
        }
        let cell = |x: usize, y: usize| self.heat[y * gw + x];

        let mut out = Vec::with_capacity((width * height) as usize);
        for py in 0..height {
            let gy = ((py as f32 + 0.5) / height as f32 * gh as f32 - 0.5).clamp(0.0, (gh - 1) as f32);
            let y0 = gy.floor() as usize;
            let y1 = (y0 + 1).min(gh - 1);
            let ty = gy - y0 as f32;
            for px in 0..width {
                let gx =
                    ((px as f32 + 0.5) / width as f32 * gw as f32 - 0.5).clamp(0.0, (gw - 1) as f32);
                let x0 = gx.floor() as usize;
                let x1 = (x0 + 1).min(gw - 1);
                let tx = gx - x0 as f32;

                let top = cell(x0, y0) * (1.0 - tx) + cell(x1, y0) * tx;
                let bottom = cell(x0, y1) * (1.0 - tx) + cell(x1, y1) * tx;
                out.push(top * (1.0 - ty) + bottom * ty);
            }
        }
        out
    }
}

/// Runs the model once on the full observation and once per occluded patch.
///
/// Heat is the drop of the baseline top-class probability when the patch is
/// replaced by the channel means, clamped at zero and scaled so the hottest
/// patch is 1.
pub fn occlusion_map(
    model: &mut dyn PolicyModel,
    observation: &Observation,
    patch: u32,
) -> Result<Attention, ModelError> {
    let probabilities = model.predict(observation)?;
    let Some(top) = argmax(&probabilities) else {
        return Err(ModelError::Inference("model returned no outputs".to_string()));
    };
    let baseline = probabilities[top];

    let patch = patch.max(1);
    let (width, height) = (observation.shape.width, observation.shape.height);
    let grid_width = width.div_ceil(patch) as usize;
    let grid_height = height.div_ceil(patch) as usize;
    let fill = observation.channel_means();

    let mut heat = Vec::with_capacity(grid_width * grid_height);
    for gy in 0..grid_height as u32 {
        for gx in 0..grid_width as u32 {
            let (x0, y0) = (gx * patch, gy * patch);
            let occluded = observation.occluded(x0, y0, x0 + patch, y0 + patch, &fill);
            let output = model.predict(&occluded)?;
            let drop = baseline - output.get(top).copied().unwrap_or(0.0);
            heat.push(drop.max(0.0));
        }
    }

    let peak = heat.iter().cloned().fold(0.0f32, f32::max);
    if peak > 0.0 {
        heat.iter_mut().for_each(|h| *h /= peak);
    }

    Ok(Attention {
        probabilities,
        grid_width,
        grid_height,
        heat,
    })
}

pub fn argmax(values: &[f32]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
}
