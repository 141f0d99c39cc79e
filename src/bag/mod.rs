//! Reading recorded sessions: sqlite3 storage, CDR payloads and the pre-render analysis.

pub mod analyzer;
pub mod cdr;
pub mod info;
pub mod message;
pub mod reader;

#[cfg(test)]
pub(crate) mod fixtures;

pub use analyzer::analyze_bag;
pub use info::{ActionSpace, BagInfo, DiscreteAction, ImageShape};
pub use message::{CameraImage, InferResult, InferenceMessage};
pub use reader::{BagMessage, BagReader};
