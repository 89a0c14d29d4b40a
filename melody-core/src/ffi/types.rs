//! FFI types exposed via uniffi

use crate::backend::{
    BackendError, OperationOutcome as InternalOutcome, Song as InternalSong,
    UserPreferences as InternalPreferences,
};
use crate::config::ConfigError;
use crate::identity::{IdentityState, LocalIdentity};
use crate::sidebar::{AccountBadge as InternalBadge, LibraryItem as InternalLibraryItem, LibraryItemKind};

/// Error types exposed via FFI
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Auth(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("No player host registered")]
    PlayerUnavailable,

    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl From<BackendError> for CoreError {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Auth(msg) => CoreError::Auth(msg),
            BackendError::Http(e) => CoreError::Network(e.to_string()),
            BackendError::Api { message, .. } => CoreError::Backend(message),
        }
    }
}

impl From<ConfigError> for CoreError {
    fn from(e: ConfigError) -> Self {
        CoreError::Config(e.to_string())
    }
}

/// Where a signed-in identity is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum Persistence {
    /// Survives restarts ("remember me")
    Durable,
    /// Cleared with the browsing session
    Session,
}

/// Identity status exposed via FFI
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum IdentityStatus {
    Absent,
    Placeholder,
    Resolved,
}

/// Current user exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct UserIdentity {
    pub id: String,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
    pub status: IdentityStatus,
}

impl UserIdentity {
    pub fn from_state(state: &IdentityState) -> Option<Self> {
        let (identity, status) = match state {
            IdentityState::Absent => return None,
            IdentityState::PlaceholderLoaded(identity) => (identity, IdentityStatus::Placeholder),
            IdentityState::Resolved(identity) => (identity, IdentityStatus::Resolved),
        };
        Some(Self::with_status(identity, status))
    }

    fn with_status(identity: &LocalIdentity, status: IdentityStatus) -> Self {
        Self {
            id: identity.id.clone(),
            username: identity.username.clone(),
            email: identity.email.clone(),
            avatar: identity.avatar.clone(),
            status,
        }
    }
}

/// Song exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub duration: String,
    pub image_url: String,
    pub audio_url: String,
    pub ai_hint: Option<String>,
}

impl From<InternalSong> for Song {
    fn from(s: InternalSong) -> Self {
        Self {
            id: s.id,
            title: s.title,
            artist: s.artist,
            album: s.album,
            duration: s.duration,
            image_url: s.image_url,
            audio_url: s.audio_url,
            ai_hint: s.ai_hint,
        }
    }
}

impl From<Song> for InternalSong {
    fn from(s: Song) -> Self {
        Self {
            id: s.id,
            title: s.title,
            artist: s.artist,
            album: s.album,
            duration: s.duration,
            image_url: s.image_url,
            audio_url: s.audio_url,
            ai_hint: s.ai_hint,
        }
    }
}

/// Listening preferences exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct UserPreferences {
    pub artists: Vec<String>,
    pub genres: Vec<String>,
}

impl From<InternalPreferences> for UserPreferences {
    fn from(p: InternalPreferences) -> Self {
        Self {
            artists: p.artists,
            genres: p.genres,
        }
    }
}

impl From<UserPreferences> for InternalPreferences {
    fn from(p: UserPreferences) -> Self {
        Self {
            artists: p.artists,
            genres: p.genres,
        }
    }
}

/// Soft-failure result exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct OperationOutcome {
    pub success: bool,
    pub message: String,
}

impl From<InternalOutcome> for OperationOutcome {
    fn from(o: InternalOutcome) -> Self {
        Self {
            success: o.success,
            message: o.message,
        }
    }
}

/// Navigation link exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct NavEntry {
    pub href: String,
    pub label: String,
    pub active: bool,
}

/// Account badge exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct AccountBadge {
    pub label: String,
    pub initials: String,
    pub avatar: Option<String>,
    pub membership: String,
    pub enabled: bool,
}

impl From<InternalBadge> for AccountBadge {
    fn from(b: InternalBadge) -> Self {
        Self {
            label: b.label,
            initials: b.initials,
            avatar: b.avatar,
            membership: b.membership,
            enabled: b.enabled,
        }
    }
}

/// Library entry exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct LibraryItem {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub image_url: String,
    pub is_artist: bool,
}

impl From<&InternalLibraryItem> for LibraryItem {
    fn from(item: &InternalLibraryItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            subtitle: item.subtitle.clone(),
            image_url: item.image_url.clone(),
            is_artist: item.kind == LibraryItemKind::Artist,
        }
    }
}

/// Host-side key/value storage (one per tier)
#[uniffi::export(callback_interface)]
pub trait StorageTier: Send + Sync {
    fn get_item(&self, key: String) -> Option<String>;
    fn set_item(&self, key: String, value: String);
    fn remove_item(&self, key: String);
}

/// Host-side widget factory and command sink
#[uniffi::export(callback_interface)]
pub trait PlayerHost: Send + Sync {
    /// Create a hidden player. `options_json` is the full options bag,
    /// `surface_css` the inline style of its container.
    fn create_player(&self, instance_id: u64, media_id: String, options_json: String, surface_css: String);
    fn destroy_player(&self, instance_id: u64);
    fn set_playback_quality(&self, instance_id: u64, quality: String);
}

/// Callback interface for app events
#[uniffi::export(callback_interface)]
pub trait AppCallback: Send + Sync {
    fn on_identity_changed(&self, identity: Option<UserIdentity>);
    fn on_navigate(&self, route: String);
    fn on_player_ready(&self, instance_id: u64);
    fn on_player_state_change(&self, instance_id: u64, state: i32);
}
