use std::path::Path;

use chrono::{DateTime, Utc};

use super::info::{BagInfo, ImageShape};
use super::message::InferenceMessage;
use super::reader::BagReader;
use crate::error::BagError;
use crate::model::ModelMetadata;

/// Messages sampled to estimate the recording cadence.
const CADENCE_SAMPLE: u64 = 60;
const FALLBACK_FPS: f64 = 15.0;

/// Computes the [`BagInfo`] for a bag. Fails on a missing topic or an empty bag.
#[tracing::instrument(skip(metadata))]
pub fn analyze_bag(
    path: &Path,
    topic: &str,
    metadata: Option<&ModelMetadata>,
) -> Result<BagInfo, BagError> {
    let reader = BagReader::open(path, topic)?;
    let name = bag_name(path);

    let sample = reader.read(CADENCE_SAMPLE)?;
    let Some(first) = sample.first() else {
        return Err(BagError::Empty(name));
    };
    let first_ns = first.timestamp_ns;
    let step_diff = mean_step(sample.iter().map(|m| m.timestamp_ns));

    let total_frames = reader.message_count()?;
    let last_ns = reader
        .time_bounds()?
        .map(|(_, last)| last)
        .unwrap_or(first_ns);
    let fps = estimate_fps(total_frames, first_ns, last_ns, step_diff);

    let decoded = InferenceMessage::decode(&first.data)?;
    let camera = decoded.images.first().ok_or(BagError::NoImage)?;
    let image_shape = ImageShape {
        width: camera.width,
        height: camera.height,
        channels: if camera.encoding == "mono8" { 1 } else { 3 },
    };

    let action_space = metadata.and_then(ModelMetadata::action_space);

    let info = BagInfo {
        name,
        start_time: DateTime::<Utc>::from_timestamp_nanos(first_ns),
        fps,
        total_frames,
        step_diff,
        image_shape,
        action_space,
    };
    tracing::info!(
        "Bag {}: {} frames at {:.2} fps, {}x{} images",
        info.name,
        info.total_frames,
        info.fps,
        info.image_shape.width,
        info.image_shape.height
    );
    Ok(info)
}

pub(crate) fn bag_name(path: &Path) -> String {
    let stem = if path.is_dir() {
        path.file_name()
    } else {
        path.file_stem()
    };
    stem.and_then(|s| s.to_str())
        .unwrap_or("bag")
        .to_string()
}

fn mean_step(timestamps: impl Iterator<Item = i64>) -> f64 {
    let stamps: Vec<i64> = timestamps.collect();
    if stamps.len() < 2 {
        return 0.0;
    }
    let span = (stamps[stamps.len() - 1] - stamps[0]) as f64 / 1e9;
    span / (stamps.len() - 1) as f64
}

fn estimate_fps(total: u64, first_ns: i64, last_ns: i64, step_diff: f64) -> f64 {
    let span = (last_ns - first_ns) as f64 / 1e9;
    if total > 1 && span > 0.0 {
        (total - 1) as f64 / span
    } else if step_diff > 0.0 {
        1.0 / step_diff
    } else {
        FALLBACK_FPS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bag::fixtures::{encode_message, sample_bag, write_bag, START_NS, TOPIC};

    #[test]
    fn analyzes_a_sample_bag() {
        let dir = tempfile::tempdir().unwrap();
        let bag = sample_bag(dir.path(), 31, 15.0, 3);

        let info = analyze_bag(&bag, TOPIC, None).unwrap();
        assert_eq!(info.name, "session_bag");
        assert_eq!(info.total_frames, 31);
        assert!((info.fps - 15.0).abs() < 0.01);
        assert!((info.step_diff - 1.0 / 15.0).abs() < 1e-3);
        assert_eq!(
            info.image_shape,
            ImageShape {
                width: 8,
                height: 6,
                channels: 3
            }
        );
        assert_eq!(info.start_time.timestamp(), START_NS / 1_000_000_000);
        assert!(info.action_space.is_none());
    }

    #[test]
    fn action_space_comes_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let bag = sample_bag(dir.path(), 3, 10.0, 2);
        let metadata = ModelMetadata::from_slice(
            br#"{"action_space": [
                {"steering_angle": -20, "speed": 1.0, "index": 0},
                {"steering_angle": 20, "speed": 1.0, "index": 1}
            ]}"#,
        )
        .unwrap();

        let info = analyze_bag(&bag, TOPIC, Some(&metadata)).unwrap();
        let space = info.action_space.unwrap();
        assert_eq!(space.len(), 2);
        assert!(space.flip);
    }

    #[test]
    fn single_message_falls_back_to_default_fps() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("one.db3");
        write_bag(&db, TOPIC, &[(START_NS, encode_message(4, 4, [0, 0, 0], &[1.0]))]);

        let info = analyze_bag(&db, TOPIC, None).unwrap();
        assert_eq!(info.name, "one");
        assert_eq!(info.fps, FALLBACK_FPS);
    }

    #[test]
    fn empty_bag_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("empty.db3");
        write_bag(&db, TOPIC, &[]);
        assert!(matches!(
            analyze_bag(&db, TOPIC, None),
            Err(BagError::Empty(name)) if name == "empty"
        ));
    }
}
