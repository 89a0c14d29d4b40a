//! Playback Bridge
//!
//! Drives an external embeddable player as an invisible audio engine.

mod bridge;
mod widget;

pub use bridge::*;
pub use widget::*;
