//! Embeddable player widget: configuration and control surface
//!
//! The widget itself lives in the host (an iframe player). The core only
//! describes how it must be configured and which commands it accepts.

use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::config::PlayerConfig;

/// Identifies one widget instance for the lifetime of a mount
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WidgetInstance(pub u64);

impl fmt::Display for WidgetInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

/// Suggested playback quality, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackQuality {
    Small,
    Medium,
    Large,
    Hd720,
    Hd1080,
    Default,
}

impl PlaybackQuality {
    /// Lowest quality the widget offers
    pub const LOWEST: PlaybackQuality = PlaybackQuality::Small;

    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackQuality::Small => "small",
            PlaybackQuality::Medium => "medium",
            PlaybackQuality::Large => "large",
            PlaybackQuality::Hd720 => "hd720",
            PlaybackQuality::Hd1080 => "hd1080",
            PlaybackQuality::Default => "default",
        }
    }
}

/// Player variables passed to the widget at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerVars {
    pub autoplay: u8,
    pub controls: u8,
    pub disablekb: u8,
    pub fs: u8,
    pub iv_load_policy: u8,
    pub modestbranding: u8,
    pub rel: u8,
    pub showinfo: u8,
    pub playsinline: u8,
    pub enablejsapi: u8,
    pub origin: String,
}

impl PlayerVars {
    /// Audio-only policy: autoplay, no chrome, no input, no suggestions
    pub fn hidden_audio(origin: impl Into<String>) -> Self {
        Self {
            autoplay: 1,
            controls: 0,
            disablekb: 1,
            fs: 0,
            iv_load_policy: 3,
            modestbranding: 1,
            rel: 0,
            showinfo: 0,
            playsinline: 1,
            enablejsapi: 1,
            origin: origin.into(),
        }
    }
}

/// Full widget options bag
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetOptions {
    pub height: String,
    pub width: String,
    pub host: String,
    pub player_vars: PlayerVars,
}

impl WidgetOptions {
    pub fn from_config(config: &PlayerConfig) -> Self {
        Self {
            height: "1".to_string(),
            width: "1".to_string(),
            host: config.host.clone(),
            player_vars: PlayerVars::hidden_audio(config.origin.clone()),
        }
    }

    pub fn to_json(&self) -> String {
        json_or_empty(self)
    }
}

/// Serialize for the host, or `{}` (widget defaults) if that fails
fn json_or_empty<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            warn!("Could not serialize widget options, host will use defaults: {}", e);
            "{}".to_string()
        }
    }
}

/// Styling for the element hosting the widget: off-screen, transparent,
/// click-through and behind everything, but still rendered so it keeps playing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenSurface {
    pub top_px: i32,
    pub left_px: i32,
    pub z_index: i32,
}

impl Default for HiddenSurface {
    fn default() -> Self {
        Self {
            top_px: -1000,
            left_px: 0,
            z_index: -1,
        }
    }
}

impl HiddenSurface {
    pub fn css(&self) -> String {
        format!(
            "position: fixed; top: {}px; left: {}px; opacity: 0; pointer-events: none; z-index: {};",
            self.top_px, self.left_px, self.z_index
        )
    }
}

/// A live widget instance
pub trait MediaWidget: Send + Sync {
    fn set_playback_quality(&self, quality: PlaybackQuality);
    fn destroy(self: Box<Self>);
}

/// Creates widget instances in the host
pub trait WidgetHost: Send + Sync {
    fn create(
        &self,
        instance: WidgetInstance,
        media_id: &str,
        options: &WidgetOptions,
        surface: &HiddenSurface,
    ) -> Box<dyn MediaWidget>;
}
