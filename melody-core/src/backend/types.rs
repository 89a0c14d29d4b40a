//! Types for hosted backend rows and auth responses

use serde::{Deserialize, Serialize};

/// A song as stored in the `song_data` column of favorites and recently-played rows.
///
/// Stored rows are free-form JSON, so missing fields read as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Song {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Display duration, e.g. "3:45"
    pub duration: String,
    pub image_url: String,
    pub audio_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_hint: Option<String>,
}

/// Listening preferences stored as JSON on the profile row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub artists: Vec<String>,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// The display subset of a profile row
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProfileDisplay {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// A full `profiles` row
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub preferences: Option<UserPreferences>,
}

/// Outcome of a write the UI treats as non-blocking
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    pub success: bool,
    pub message: String,
}

impl OperationOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// A signed-in user, ready to be persisted as the local identity record
#[derive(Debug, Clone, PartialEq)]
pub struct SignedInUser {
    pub id: String,
    pub email: String,
    pub username: String,
    pub avatar: Option<String>,
    pub registered_at: Option<String>,
    pub access_token: Option<String>,
}

/// User object returned by the auth endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserMetadata {
    #[serde(default)]
    pub username: Option<String>,
}

/// Response of the password grant
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: AuthUser,
}

/// Sign-up returns either a session (with a nested user) or the bare user
/// when email confirmation is pending
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignUpResponse {
    Session { user: AuthUser },
    User(AuthUser),
}

impl SignUpResponse {
    pub fn into_user(self) -> AuthUser {
        match self {
            SignUpResponse::Session { user } => user,
            SignUpResponse::User(user) => user,
        }
    }
}

/// Error body returned by the auth and table endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ErrorBody {
    /// Most descriptive message available
    pub fn message(&self) -> Option<String> {
        self.msg
            .clone()
            .or_else(|| self.message.clone())
            .or_else(|| self.error_description.clone())
            .or_else(|| self.error.clone())
    }
}

/// Request body for the sign-up endpoint
#[derive(Debug, Clone, Serialize)]
pub struct SignUpRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub data: SignUpMetadata<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignUpMetadata<'a> {
    pub username: &'a str,
}

/// Request body for the password grant
#[derive(Debug, Clone, Serialize)]
pub struct PasswordGrantRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Row inserted into `profiles` on sign-up
#[derive(Debug, Clone, Serialize)]
pub struct NewProfile<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    pub preferences: UserPreferences,
}

/// Partial update of a `profiles` row
#[derive(Debug, Clone, Serialize)]
pub struct ProfileUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<&'a str>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferencesUpdate<'a> {
    pub preferences: &'a UserPreferences,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferencesRow {
    #[serde(default)]
    pub preferences: Option<UserPreferences>,
}

/// Row upserted into `favorites`
#[derive(Debug, Clone, Serialize)]
pub struct FavoriteRow<'a> {
    pub user_id: &'a str,
    pub song_id: &'a str,
    pub song_data: &'a Song,
}

/// Row upserted into `recently_played`
#[derive(Debug, Clone, Serialize)]
pub struct RecentlyPlayedRow<'a> {
    pub user_id: &'a str,
    pub song_id: &'a str,
    pub song_data: &'a Song,
    pub played_at: String,
}

/// Projection used when reading songs back
#[derive(Debug, Clone, Deserialize)]
pub struct SongDataRow {
    pub song_data: Song,
}
