//! Hosted backend HTTP client (auth + table endpoints)

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use reqwest::{Client, Method, Response};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::types::*;
use crate::config::BackendConfig;
use crate::identity::ProfileSource;

/// Number of recently-played rows read back per user
pub const RECENTLY_PLAYED_LIMIT: usize = 20;

/// Errors that can occur when talking to the hosted backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Sign-up / sign-in failure with a message meant for the user
    #[error("{0}")]
    Auth(String),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
}

impl BackendError {
    /// Message without the transport prefix, for user-facing text
    pub fn message(&self) -> String {
        match self {
            BackendError::Http(e) => e.to_string(),
            BackendError::Auth(msg) => msg.clone(),
            BackendError::Api { message, .. } => message.clone(),
        }
    }
}

/// Client for the hosted backend's REST API
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    anon_key: String,
    access_token: Option<String>,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_max_idle_per_host(4)
            .build()?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            access_token: None,
        })
    }

    /// Authenticate table requests as a signed-in user
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Drop the user token and fall back to the anon key
    pub fn without_access_token(mut self) -> Self {
        self.access_token = None;
        self
    }

    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    fn request(&self, method: Method, url: String) -> reqwest::RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer)
    }

    fn auth_request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.request(method, format!("{}/auth/v1{}", self.base_url, path))
    }

    fn table_request(&self, method: Method, table: &str) -> reqwest::RequestBuilder {
        self.request(method, format!("{}/rest/v1/{}", self.base_url, table))
    }

    /// Turn a non-2xx response into `BackendError::Api`
    async fn check(resp: Response) -> Result<Response, BackendError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body: ErrorBody = resp.json().await.unwrap_or_default();
        let message = body
            .message()
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());

        Err(BackendError::Api {
            status: status.as_u16(),
            message,
        })
    }

    fn now() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    // =========================================================================
    // Auth
    // =========================================================================

    /// Create an account and its profile row.
    ///
    /// A failed profile insert is logged but does not fail the sign-up: the
    /// auth user already exists at that point.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn sign_up(&self, username: &str, email: &str, password: &str) -> Result<String, BackendError> {
        let resp = self
            .auth_request(Method::POST, "/signup")
            .json(&SignUpRequest {
                email,
                password,
                data: SignUpMetadata { username },
            })
            .send()
            .await?;

        let resp = Self::check(resp)
            .await
            .map_err(|e| BackendError::Auth(e.message()))?;

        let user = resp
            .json::<SignUpResponse>()
            .await
            .map_err(|_| BackendError::Auth("Could not create the account.".to_string()))?
            .into_user();

        let insert = self
            .table_request(Method::POST, "profiles")
            .header("Prefer", "return=minimal")
            .json(&[NewProfile {
                id: &user.id,
                username,
                email,
                preferences: UserPreferences::default(),
            }])
            .send()
            .await;

        match insert {
            Ok(resp) => {
                if let Err(e) = Self::check(resp).await {
                    warn!("Profile creation failed for {}: {}", user.id, e);
                }
            }
            Err(e) => warn!("Profile creation failed for {}: {}", user.id, e),
        }

        info!("Signed up user {}", user.id);
        Ok("Registration successful! Welcome.".to_string())
    }

    /// Password sign-in.
    ///
    /// Username resolution: profile row, then auth metadata, then the email's
    /// local part.
    #[instrument(skip_all, fields(email = %email))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignedInUser, BackendError> {
        let resp = self
            .auth_request(Method::POST, "/token")
            .query(&[("grant_type", "password")])
            .json(&PasswordGrantRequest { email, password })
            .send()
            .await
            .map_err(|e| BackendError::Auth(format!("Sign-in failed: {}", e)))?;

        let resp = Self::check(resp)
            .await
            .map_err(|e| BackendError::Auth(format!("Sign-in failed: {}", e.message())))?;

        let token = resp
            .json::<TokenResponse>()
            .await
            .map_err(|_| BackendError::Auth("User not found.".to_string()))?;

        let user_client = self.clone().with_access_token(token.access_token.clone());
        let profile = match user_client.fetch_profile(&token.user.id).await {
            Ok(profile) => profile,
            Err(e) => {
                debug!("Profile lookup after sign-in failed: {}", e);
                None
            }
        };

        let username = profile
            .as_ref()
            .and_then(|p| p.username.clone())
            .filter(|name| !name.is_empty())
            .or_else(|| token.user.user_metadata.username.clone().filter(|n| !n.is_empty()))
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        info!("Signed in user {}", token.user.id);
        Ok(SignedInUser {
            id: token.user.id,
            email: token.user.email.unwrap_or_default(),
            username,
            avatar: profile.and_then(|p| p.avatar_url),
            registered_at: token.user.created_at,
            access_token: Some(token.access_token),
        })
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Fetch a full profile row
    pub async fn fetch_profile(&self, user_id: &str) -> Result<Option<ProfileRow>, BackendError> {
        let resp = self
            .table_request(Method::GET, "profiles")
            .query(&[("select", "*".to_string()), ("id", format!("eq.{}", user_id))])
            .send()
            .await?;

        let rows: Vec<ProfileRow> = Self::check(resp).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    /// Fetch the display name and avatar for a user
    #[instrument(skip(self))]
    pub async fn fetch_profile_display(&self, user_id: &str) -> Result<Option<ProfileDisplay>, BackendError> {
        let resp = self
            .table_request(Method::GET, "profiles")
            .query(&[
                ("select", "username,avatar_url".to_string()),
                ("id", format!("eq.{}", user_id)),
            ])
            .send()
            .await?;

        let rows: Vec<ProfileDisplay> = Self::check(resp).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    /// Update username and/or avatar. Empty values are not sent.
    #[instrument(skip(self))]
    pub async fn update_profile(
        &self,
        user_id: &str,
        username: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<(), BackendError> {
        let update = ProfileUpdate {
            username: username.filter(|s| !s.is_empty()),
            avatar_url: avatar.filter(|s| !s.is_empty()),
            updated_at: Self::now(),
        };

        let resp = self
            .table_request(Method::PATCH, "profiles")
            .query(&[("id", format!("eq.{}", user_id))])
            .json(&update)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    #[instrument(skip(self, preferences))]
    pub async fn save_preferences(
        &self,
        user_id: &str,
        preferences: &UserPreferences,
    ) -> Result<OperationOutcome, BackendError> {
        let resp = self
            .table_request(Method::PATCH, "profiles")
            .query(&[("id", format!("eq.{}", user_id))])
            .json(&PreferencesUpdate { preferences })
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(OperationOutcome::ok("User preferences saved."))
    }

    /// Stored preferences, or empty preferences if anything goes wrong
    pub async fn get_preferences(&self, user_id: &str) -> UserPreferences {
        let result: Result<Vec<PreferencesRow>, BackendError> = async {
            let resp = self
                .table_request(Method::GET, "profiles")
                .query(&[("select", "preferences".to_string()), ("id", format!("eq.{}", user_id))])
                .send()
                .await?;
            Ok::<_, BackendError>(Self::check(resp).await?.json().await?)
        }
        .await;

        match result {
            Ok(rows) => rows
                .into_iter()
                .next()
                .and_then(|row| row.preferences)
                .unwrap_or_default(),
            Err(e) => {
                debug!("Preferences unavailable for {}: {}", user_id, e);
                UserPreferences::default()
            }
        }
    }

    // =========================================================================
    // Favorites
    // =========================================================================

    #[instrument(skip(self, song), fields(song_id = %song.id))]
    pub async fn save_favorite(&self, user_id: &str, song: &Song) -> OperationOutcome {
        let result = self
            .upsert(
                "favorites",
                &FavoriteRow {
                    user_id,
                    song_id: &song.id,
                    song_data: song,
                },
            )
            .await;

        match result {
            Ok(()) => OperationOutcome::ok("Song added to favorites."),
            Err(e) => {
                warn!("Could not add favorite: {}", e);
                OperationOutcome::failed(e.message())
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn remove_favorite(&self, user_id: &str, song_id: &str) -> OperationOutcome {
        let result: Result<(), BackendError> = async {
            let resp = self
                .table_request(Method::DELETE, "favorites")
                .query(&[
                    ("user_id", format!("eq.{}", user_id)),
                    ("song_id", format!("eq.{}", song_id)),
                ])
                .send()
                .await?;
            Self::check(resp).await?;
            Ok::<(), BackendError>(())
        }
        .await;

        match result {
            Ok(()) => OperationOutcome::ok("Song removed from favorites."),
            Err(e) => {
                warn!("Could not remove favorite: {}", e);
                OperationOutcome::failed(e.message())
            }
        }
    }

    pub async fn favorites(&self, user_id: &str) -> Vec<Song> {
        match self.songs("favorites", &[("user_id", format!("eq.{}", user_id))]).await {
            Ok(songs) => songs,
            Err(e) => {
                warn!("Could not load favorites: {}", e);
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Recently played
    // =========================================================================

    /// Record a play. There is no write-side cap; only reads are limited.
    #[instrument(skip(self, song), fields(song_id = %song.id))]
    pub async fn add_recently_played(&self, user_id: &str, song: &Song) -> OperationOutcome {
        let result = self
            .upsert(
                "recently_played",
                &RecentlyPlayedRow {
                    user_id,
                    song_id: &song.id,
                    song_data: song,
                    played_at: Self::now(),
                },
            )
            .await;

        match result {
            Ok(()) => OperationOutcome::ok("Recently played song added."),
            Err(e) => {
                warn!("Could not add recently played song: {}", e);
                OperationOutcome::failed(e.message())
            }
        }
    }

    /// Most recent plays first, at most `RECENTLY_PLAYED_LIMIT`
    pub async fn recently_played(&self, user_id: &str) -> Vec<Song> {
        let filters = [
            ("user_id", format!("eq.{}", user_id)),
            ("order", "played_at.desc".to_string()),
            ("limit", RECENTLY_PLAYED_LIMIT.to_string()),
        ];
        match self.songs("recently_played", &filters).await {
            Ok(songs) => songs,
            Err(e) => {
                warn!("Could not load history: {}", e);
                Vec::new()
            }
        }
    }

    async fn upsert<T: serde::Serialize>(&self, table: &str, row: &T) -> Result<(), BackendError> {
        let resp = self
            .table_request(Method::POST, table)
            .query(&[("on_conflict", "user_id,song_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn songs(&self, table: &str, filters: &[(&str, String)]) -> Result<Vec<Song>, BackendError> {
        let resp = self
            .table_request(Method::GET, table)
            .query(&[("select", "song_data")])
            .query(filters)
            .send()
            .await?;

        let rows: Vec<SongDataRow> = Self::check(resp).await?.json().await?;
        Ok(rows.into_iter().map(|row| row.song_data).collect())
    }
}

#[async_trait]
impl ProfileSource for BackendClient {
    async fn fetch_display(&self, user_id: &str) -> Result<Option<ProfileDisplay>, BackendError> {
        self.fetch_profile_display(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = BackendClient::new(&BackendConfig::new("https://demo.supabase.co/", "anon")).unwrap();
        assert_eq!(client.base_url, "https://demo.supabase.co");
        assert!(!client.has_access_token());

        let client = client.with_access_token("token");
        assert_eq!(client.access_token.as_deref(), Some("token"));
        assert!(!client.without_access_token().has_access_token());
    }

    #[test]
    fn test_error_message_strips_prefix() {
        let err = BackendError::Api {
            status: 409,
            message: "duplicate key".to_string(),
        };
        assert_eq!(err.message(), "duplicate key");
        assert_eq!(err.to_string(), "API error (HTTP 409): duplicate key");
    }
}
