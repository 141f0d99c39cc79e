use serde::{Deserialize, Serialize};

use crate::bag::{ActionSpace, DiscreteAction};

pub const METADATA_FILE: &str = "model_metadata.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionSpaceType {
    Discrete,
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ActionEntry {
    pub steering_angle: f32,
    pub speed: f32,
    #[serde(default)]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Range {
    pub low: f32,
    pub high: f32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ActionSpaceSpec {
    Discrete(Vec<ActionEntry>),
    Continuous { steering_angle: Range, speed: Range },
}

/// Contents of a model package's `model_metadata.json`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelMetadata {
    pub action_space: ActionSpaceSpec,
    #[serde(default)]
    pub action_space_type: Option<ActionSpaceType>,
    #[serde(default)]
    pub sensor: Vec<String>,
    #[serde(default)]
    pub neural_network: Option<String>,
    #[serde(default)]
    pub training_algorithm: Option<String>,
    #[serde(default)]
    pub version: Option<serde_json::Value>,
}

impl ModelMetadata {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn is_discrete(&self) -> bool {
        match self.action_space_type {
            Some(kind) => kind == ActionSpaceType::Discrete,
            None => matches!(self.action_space, ActionSpaceSpec::Discrete(_)),
        }
    }

    /// Discrete action list in index order, `None` for continuous models.
    pub fn action_space(&self) -> Option<ActionSpace> {
        if !self.is_discrete() {
            return None;
        }
        let ActionSpaceSpec::Discrete(entries) = &self.action_space else {
            return None;
        };

        let mut actions: Vec<DiscreteAction> = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| DiscreteAction {
                index: entry.index.unwrap_or(position),
                steering_angle: entry.steering_angle,
                speed: entry.speed,
            })
            .collect();
        actions.sort_by_key(|a| a.index);
        Some(ActionSpace::new(actions))
    }

    /// Number of policy outputs. Continuous models report two (steering, speed).
    pub fn action_count(&self) -> usize {
        match &self.action_space {
            ActionSpaceSpec::Discrete(entries) if self.is_discrete() => entries.len(),
            _ => 2,
        }
    }

    /// Camera channels stacked into the observation.
    pub fn camera_channels(&self) -> usize {
        if self.sensor.iter().any(|s| s == "STEREO_CAMERAS") {
            2
        } else {
            1
        }
    }

    pub fn version_string(&self) -> String {
        match &self.version {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "1".to_string(),
        }
    }
}
