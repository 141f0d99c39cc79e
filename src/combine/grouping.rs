use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::clip::{normalize_component, ClipRef};

const SUFFIX_LEN: usize = 6;

/// How clips are partitioned into combined outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingMode {
    /// One output per subject, model and recording day.
    #[default]
    SubjectModelDate,
    SubjectModel,
    Subject,
}

impl GroupingMode {
    fn key(&self, clip: &ClipRef) -> GroupKey {
        let model = match self {
            GroupingMode::Subject => None,
            _ => Some(clip.model.clone()),
        };
        let date = match self {
            GroupingMode::SubjectModelDate => Some(clip.timestamp.date_naive()),
            _ => None,
        };
        GroupKey {
            subject: clip.subject.clone(),
            model,
            date,
        }
    }
}

impl std::str::FromStr for GroupingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "subject-model-date" => Ok(GroupingMode::SubjectModelDate),
            "subject-model" => Ok(GroupingMode::SubjectModel),
            "subject" => Ok(GroupingMode::Subject),
            other => Err(format!("unknown grouping mode {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub subject: String,
    pub model: Option<String>,
    pub date: Option<NaiveDate>,
}

/// Clips that end up in one combined output, in timestamp order.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoGroup {
    pub key: GroupKey,
    pub clips: Vec<ClipRef>,
    pub output_name: String,
}

/// Partitions `clips` by `mode`.
///
/// Partitions come out ordered by their earliest clip and each is sorted by
/// timestamp, ties broken by path. `suffix` supplies the random name part.
pub fn group_clips(
    mut clips: Vec<ClipRef>,
    mode: GroupingMode,
    vehicle: Option<&str>,
    mut suffix: impl FnMut() -> String,
) -> Vec<VideoGroup> {
    clips.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.path.cmp(&b.path)));

    let mut partitions: IndexMap<GroupKey, Vec<ClipRef>> = IndexMap::new();
    for clip in clips {
        partitions.entry(mode.key(&clip)).or_default().push(clip);
    }

    partitions
        .into_iter()
        .filter_map(|(key, clips)| {
            let first = clips.first()?;
            let vehicle = vehicle
                .map(str::to_string)
                .or_else(|| first.vehicle.clone());
            let output_name =
                build_output_name(&key, first.timestamp, vehicle.as_deref(), &suffix());
            Some(VideoGroup {
                key,
                clips,
                output_name,
            })
        })
        .collect()
}

/// `subject[_model][_vehicle]_{date|first timestamp}_{suffix}.mp4`
pub fn build_output_name(
    key: &GroupKey,
    first_clip: DateTime<Utc>,
    vehicle: Option<&str>,
    suffix: &str,
) -> String {
    let mut parts = vec![normalize_component(&key.subject)];
    if let Some(model) = &key.model {
        parts.push(normalize_component(model));
    }
    if let Some(vehicle) = vehicle.map(normalize_component).filter(|v| !v.is_empty()) {
        parts.push(vehicle);
    }
    parts.push(match key.date {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => first_clip.format("%Y%m%d-%H%M%S").to_string(),
    });
    parts.push(suffix.to_string());
    format!("{}.mp4", parts.join("_"))
}

pub fn random_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn clip(path: &str, subject: &str, model: &str, day: u32, hour: u32) -> ClipRef {
        ClipRef::new(
            path,
            subject,
            model,
            None,
            Utc.with_ymd_and_hms(2024, 5, day, hour, 0, 0).unwrap(),
        )
    }

    fn fixed() -> impl FnMut() -> String {
        || "abc123".to_string()
    }

    fn sample() -> Vec<ClipRef> {
        vec![
            clip("d.mp4", "bob", "m1", 2, 9),
            clip("a.mp4", "ann", "m1", 1, 12),
            clip("c.mp4", "ann", "m2", 1, 10),
            clip("b.mp4", "ann", "m1", 1, 8),
            clip("e.mp4", "ann", "m1", 2, 8),
        ]
    }

    fn paths(group: &VideoGroup) -> Vec<&str> {
        group.clips.iter().map(|c| c.path.to_str().unwrap()).collect()
    }

    #[test]
    fn subject_model_date_splits_by_day() {
        let groups = group_clips(sample(), GroupingMode::SubjectModelDate, None, fixed());
        let names: Vec<&str> = groups.iter().map(|g| g.output_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "ann_m1_2024-05-01_abc123.mp4",
                "ann_m2_2024-05-01_abc123.mp4",
                "ann_m1_2024-05-02_abc123.mp4",
                "bob_m1_2024-05-02_abc123.mp4",
            ]
        );
        assert_eq!(paths(&groups[0]), vec!["b.mp4", "a.mp4"]);
    }

    #[test]
    fn subject_mode_merges_models_in_timestamp_order() {
        let groups = group_clips(sample(), GroupingMode::Subject, Some("car 1"), fixed());
        assert_eq!(groups.len(), 2);
        assert_eq!(paths(&groups[0]), vec!["b.mp4", "c.mp4", "a.mp4", "e.mp4"]);
        assert_eq!(groups[0].output_name, "ann_car-1_20240501-080000_abc123.mp4");
        assert_eq!(groups[1].output_name, "bob_car-1_20240502-090000_abc123.mp4");
    }

    #[test]
    fn grouping_is_deterministic_for_any_input_order() {
        let mut reversed = sample();
        reversed.reverse();
        assert_eq!(
            group_clips(sample(), GroupingMode::SubjectModel, None, fixed()),
            group_clips(reversed, GroupingMode::SubjectModel, None, fixed())
        );
    }

    #[test]
    fn timestamp_ties_fall_back_to_path() {
        let clips = vec![clip("z.mp4", "ann", "m", 1, 8), clip("y.mp4", "ann", "m", 1, 8)];
        let groups = group_clips(clips, GroupingMode::SubjectModel, None, fixed());
        assert_eq!(paths(&groups[0]), vec!["y.mp4", "z.mp4"]);
    }

    #[test]
    fn suffixes_are_six_alphanumerics() {
        let suffix = random_suffix();
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn modes_parse_from_cli_names() {
        assert_eq!("subject".parse::<GroupingMode>(), Ok(GroupingMode::Subject));
        assert!("weekly".parse::<GroupingMode>().is_err());
    }
}
