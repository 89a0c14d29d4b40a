//! The locally held "who is logged in" view

use serde::{Deserialize, Serialize};

/// Display name used when neither a username nor an email is available
pub const DEFAULT_DISPLAY_NAME: &str = "Kullanıcı";

/// Sign-in prompt label, which ends up stored as a name by older sessions
pub const SIGN_IN_LABEL: &str = "Giriş Yap";

/// Whether a display name is a known placeholder awaiting resolution
pub fn is_placeholder_name(name: &str) -> bool {
    name == DEFAULT_DISPLAY_NAME || name == SIGN_IN_LABEL
}

/// Serialized identity record as found in a storage tier
#[derive(Debug, Clone, Deserialize)]
pub struct StoredIdentity {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

/// Identity record written to a storage tier after sign-in
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord<'a> {
    pub id: &'a str,
    pub username: &'a str,
    pub email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<&'a str>,
}

/// Current user as shown by the UI. `username` is never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub id: String,
    pub username: String,
    pub email: String,
    pub avatar: Option<String>,
}

impl LocalIdentity {
    /// Whether the display name still needs to be resolved remotely
    pub fn has_placeholder_name(&self) -> bool {
        is_placeholder_name(&self.username)
    }
}

impl From<StoredIdentity> for LocalIdentity {
    fn from(stored: StoredIdentity) -> Self {
        let email = stored.email.unwrap_or_default();
        let username = stored
            .username
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| display_name_from_email(&email));

        Self {
            id: stored.id,
            username,
            email,
            avatar: stored.avatar,
        }
    }
}

/// Local part of an email address, or the default label if there is none
pub fn display_name_from_email(email: &str) -> String {
    match email.split('@').next() {
        Some(local) if !local.is_empty() => local.to_string(),
        _ => DEFAULT_DISPLAY_NAME.to_string(),
    }
}

/// Identity lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdentityState {
    /// Nobody is signed in
    #[default]
    Absent,
    /// Signed in, but the display name is a placeholder
    PlaceholderLoaded(LocalIdentity),
    /// Signed in with a real display name
    Resolved(LocalIdentity),
}

impl IdentityState {
    pub fn from_identity(identity: LocalIdentity) -> Self {
        if identity.has_placeholder_name() {
            IdentityState::PlaceholderLoaded(identity)
        } else {
            IdentityState::Resolved(identity)
        }
    }

    pub fn identity(&self) -> Option<&LocalIdentity> {
        match self {
            IdentityState::Absent => None,
            IdentityState::PlaceholderLoaded(identity) | IdentityState::Resolved(identity) => Some(identity),
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, IdentityState::Absent)
    }

    pub fn needs_reconcile(&self) -> bool {
        matches!(self, IdentityState::PlaceholderLoaded(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> LocalIdentity {
        serde_json::from_str::<StoredIdentity>(json).unwrap().into()
    }

    #[test]
    fn test_username_from_email_local_part() {
        let identity = parse(r#"{"id": "u1", "email": "a@b.com"}"#);
        assert_eq!(identity.username, "a");
        assert_eq!(identity.email, "a@b.com");
    }

    #[test]
    fn test_empty_username_treated_as_missing() {
        let identity = parse(r#"{"id": "u1", "username": "", "email": "melis@example.com"}"#);
        assert_eq!(identity.username, "melis");
    }

    #[test]
    fn test_no_email_yields_placeholder() {
        let identity = parse(r#"{"id": "u1"}"#);
        assert_eq!(identity.username, DEFAULT_DISPLAY_NAME);
        assert!(identity.has_placeholder_name());

        let identity = parse(r#"{"id": "u1", "email": "@b.com"}"#);
        assert_eq!(identity.username, DEFAULT_DISPLAY_NAME);
    }

    #[test]
    fn test_state_classification() {
        let identity = parse(r#"{"id": "u1", "username": "Giriş Yap"}"#);
        assert!(IdentityState::from_identity(identity).needs_reconcile());

        let identity = parse(r#"{"id": "u1", "username": "deniz"}"#);
        let state = IdentityState::from_identity(identity);
        assert!(matches!(state, IdentityState::Resolved(_)));
        assert_eq!(state.identity().map(|i| i.username.as_str()), Some("deniz"));
        assert!(IdentityState::Absent.identity().is_none());
    }

    #[test]
    fn test_record_serialization() {
        let record = IdentityRecord {
            id: "u1",
            username: "deniz",
            email: "d@e.com",
            avatar: None,
            registered_at: Some("2024-01-01T00:00:00Z"),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["registeredAt"], "2024-01-01T00:00:00Z");
        assert!(value.get("avatar").is_none());
    }
}
