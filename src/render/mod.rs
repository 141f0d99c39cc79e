//! Frame visualization: layout, bitmap text, attention overlay and JPEG output.

pub mod background;
pub mod composer;
pub mod draw;
pub mod palette;

pub use background::Background;
pub use composer::{format_clock, ComposerSettings, FrameComposer};
