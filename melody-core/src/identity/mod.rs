//! Session Identity
//!
//! Derives the current user from the host's two storage tiers and keeps the
//! display name in line with the remote profile store.

mod reconciler;
mod storage;
mod user;

pub use reconciler::*;
pub use storage::*;
pub use user::*;
