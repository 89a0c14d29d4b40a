//! Melody - Core Library
//!
//! Session identity reconciliation, the hidden playback bridge and access to
//! the hosted backend, exposed to native UIs via uniffi.

pub mod backend;
pub mod config;
pub mod ffi;
pub mod identity;
pub mod playback;
pub mod sidebar;

// Re-exports for convenience
pub use backend::{BackendClient, BackendError, Song};
pub use config::Config;
pub use identity::{IdentityState, LocalIdentity, SessionReconciler};
pub use playback::{PlaybackBridge, PlaybackTarget};

// Setup uniffi scaffolding
uniffi::setup_scaffolding!();
