//! Hosted Backend Client
//!
//! Thin data-access layer over the hosted auth + relational backend:
//! sign-up/sign-in, profiles, preferences, favorites and recently played.

mod client;
mod types;

pub use client::{BackendClient, BackendError, RECENTLY_PLAYED_LIMIT};
pub use types::{OperationOutcome, ProfileDisplay, ProfileRow, SignedInUser, Song, UserPreferences};
