//! Grouping rendered clips and concatenating them behind divider cards.

pub mod clip;
pub mod combiner;
pub mod divider;
pub mod grouping;

pub use clip::{clip_file_name, normalize_component, scan_clips, ClipRef};
pub use combiner::{CombineOptions, CombinedVideo, VideoCombiner};
pub use divider::DividerStyle;
pub use grouping::{build_output_name, group_clips, random_suffix, GroupKey, GroupingMode, VideoGroup};
