//! Builders for small on-disk bags used across the test suites.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use super::cdr::CdrWriter;

pub(crate) const TOPIC: &str = "/inference_pkg/rl_results";
pub(crate) const START_NS: i64 = 1_700_000_000_000_000_000;

/// One bgr8 camera image filled with `bgr`, followed by one result per probability.
pub(crate) fn encode_message(width: u32, height: u32, bgr: [u8; 3], probs: &[f32]) -> Vec<u8> {
    let mut pixels = Vec::with_capacity((width * height * 3) as usize);
    for _ in 0..width * height {
        pixels.extend_from_slice(&bgr);
    }

    let mut writer = CdrWriter::new();
    writer
        .u32(1)
        .i32(1_700_000_000)
        .u32(0)
        .string("camera")
        .u32(height)
        .u32(width)
        .string("bgr8")
        .u8(0)
        .u32(width * 3)
        .bytes(&pixels)
        .u32(probs.len() as u32);
    for (label, prob) in probs.iter().enumerate() {
        writer
            .i32(label as i32)
            .f32(*prob)
            .f32(0.0)
            .f32(0.0)
            .f32(0.0)
            .f32(0.0);
    }
    writer.finish()
}

pub(crate) fn write_bag(path: &Path, topic: &str, messages: &[(i64, Vec<u8>)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE topics(id INTEGER PRIMARY KEY, name TEXT NOT NULL, type TEXT NOT NULL,
             serialization_format TEXT NOT NULL, offered_qos_profiles TEXT NOT NULL);
         CREATE TABLE messages(id INTEGER PRIMARY KEY, topic_id INTEGER NOT NULL,
             timestamp INTEGER NOT NULL, data BLOB NOT NULL);",
    )
    .unwrap();
    conn.execute(
        "INSERT INTO topics(id, name, type, serialization_format, offered_qos_profiles)
         VALUES (1, ?1, 'deepracer_interfaces_pkg/msg/InferResultsArray', 'cdr', '')",
        params![topic],
    )
    .unwrap();
    conn.execute(
        "INSERT INTO topics(id, name, type, serialization_format, offered_qos_profiles)
         VALUES (2, '/rosout', 'rcl_interfaces/msg/Log', 'cdr', '')",
        [],
    )
    .unwrap();
    for (timestamp, data) in messages {
        conn.execute(
            "INSERT INTO messages(topic_id, timestamp, data) VALUES (1, ?1, ?2)",
            params![timestamp, data],
        )
        .unwrap();
    }
    conn.execute(
        "INSERT INTO messages(topic_id, timestamp, data) VALUES (2, ?1, x'00')",
        params![START_NS],
    )
    .unwrap();
}

/// A bag directory holding `frames` 8x6 messages at `fps`; frame `i` (0-based)
/// has a gray level of `i * 10 % 250` and puts most probability on `i % actions`.
pub(crate) fn sample_bag(dir: &Path, frames: usize, fps: f64, actions: usize) -> PathBuf {
    let bag_dir = dir.join("session_bag");
    std::fs::create_dir_all(&bag_dir).unwrap();
    let step_ns = (1e9 / fps) as i64;
    let messages: Vec<(i64, Vec<u8>)> = (0..frames)
        .map(|i| {
            let level = (i * 10 % 250) as u8;
            let mut probs = vec![0.1 / actions as f32; actions];
            probs[i % actions] += 0.9;
            (
                START_NS + i as i64 * step_ns,
                encode_message(8, 6, [level, level, level], &probs),
            )
        })
        .collect();
    write_bag(&bag_dir.join("session_bag_0.db3"), TOPIC, &messages);
    bag_dir
}
