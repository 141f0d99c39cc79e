use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiscreteAction {
    pub index: usize,
    /// Degrees, positive to the left.
    pub steering_angle: f32,
    /// Metres per second.
    pub speed: f32,
}

/// Ordered discrete actions of a model plus the display orientation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionSpace {
    pub actions: Vec<DiscreteAction>,
    /// Set when the first action steers right, so bars are mirrored to read left to right.
    pub flip: bool,
}

impl ActionSpace {
    pub fn new(actions: Vec<DiscreteAction>) -> Self {
        let flip = actions.first().is_some_and(|a| a.steering_angle < 0.0);
        Self { actions, flip }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn max_speed(&self) -> f32 {
        self.actions.iter().map(|a| a.speed).fold(0.0, f32::max)
    }

    /// Bar label for action `index`: `30D 1.5M/S`, or `30D 50%` when relative.
    pub fn label(&self, index: usize, relative: bool) -> String {
        let Some(action) = self.actions.get(index) else {
            return index.to_string();
        };
        let max_speed = self.max_speed();
        if relative && max_speed > 0.0 {
            format!(
                "{:.0}D {:.0}%",
                action.steering_angle,
                action.speed / max_speed * 100.0
            )
        } else {
            format!("{:.0}D {:.1}M/S", action.steering_angle, action.speed)
        }
    }

    /// Action indexes in the order bars are drawn.
    pub fn display_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.actions.len()).collect();
        if self.flip {
            order.reverse();
        }
        order
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageShape {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

/// Summary of a bag computed before rendering starts.
#[derive(Debug, Clone, Serialize)]
pub struct BagInfo {
    pub name: String,
    pub start_time: DateTime<Utc>,
    pub fps: f64,
    pub total_frames: u64,
    /// Mean seconds between consecutive messages over the leading sample.
    pub step_diff: f64,
    pub image_shape: ImageShape,
    pub action_space: Option<ActionSpace>,
}

impl BagInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.fps > 0.0 {
            self.total_frames as f64 / self.fps
        } else {
            0.0
        }
    }
}
