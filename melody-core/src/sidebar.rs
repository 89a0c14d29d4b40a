//! Sidebar model: navigation, account badge and the user's library list

use rand::seq::SliceRandom;
use rand::Rng;

use crate::identity::{LocalIdentity, SIGN_IN_LABEL};

/// Membership label shown under the account name
pub const MEMBERSHIP_LABEL: &str = "Normal Üye";

/// Initials shown when nobody is signed in
const ANONYMOUS_INITIALS: &str = "??";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavLink {
    pub href: &'static str,
    pub label: &'static str,
}

pub const NAV_LINKS: [NavLink; 3] = [
    NavLink { href: "/home", label: "Ana Sayfa" },
    NavLink { href: "/home/library", label: "Kitaplığın" },
    NavLink { href: "/home/playlists", label: "Playlistler" },
];

/// Navigation links with the one matching `pathname` marked active
pub fn nav_entries(pathname: &str) -> Vec<(NavLink, bool)> {
    NAV_LINKS
        .iter()
        .map(|link| (*link, link.href == pathname))
        .collect()
}

/// What the account button at the bottom of the sidebar shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountBadge {
    pub label: String,
    pub initials: String,
    pub avatar: Option<String>,
    pub membership: String,
    /// The account menu only opens for a signed-in user
    pub enabled: bool,
}

impl AccountBadge {
    pub fn for_identity(identity: Option<&LocalIdentity>) -> Self {
        match identity {
            Some(identity) => Self {
                label: identity.username.clone(),
                initials: identity.username.chars().take(2).collect::<String>().to_uppercase(),
                avatar: identity.avatar.clone(),
                membership: MEMBERSHIP_LABEL.to_string(),
                enabled: true,
            },
            None => Self {
                label: SIGN_IN_LABEL.to_string(),
                initials: ANONYMOUS_INITIALS.to_string(),
                avatar: None,
                membership: MEMBERSHIP_LABEL.to_string(),
                enabled: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryItemKind {
    Playlist,
    Artist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryItem {
    pub id: String,
    pub title: String,
    pub subtitle: String,
    pub image_url: String,
    pub kind: LibraryItemKind,
}

impl LibraryItem {
    fn artist(id: &str, title: &str, image_url: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            subtitle: "Sanatçı".to_string(),
            image_url: image_url.to_string(),
            kind: LibraryItemKind::Artist,
        }
    }
}

/// Artists offered by "add artist"
fn suggested_artists() -> Vec<LibraryItem> {
    vec![
        LibraryItem::artist("new1", "Ceza", "https://i.scdn.co/image/ab6761610000e5eb5d644d56778f309a63dc1b21"),
        LibraryItem::artist("new2", "Sagopa Kajmer", "https://i.scdn.co/image/ab6761610000e5ebb5d644d56778f309a63dc1b21"),
        LibraryItem::artist("new3", "Ezhel", "https://i.scdn.co/image/ab6761610000e5eb19c2794025b5c9281e64627d"),
        LibraryItem::artist("new4", "Şebnem Ferah", "https://i.scdn.co/image/ab6761610000e5eb4122d256860361026f43e32e"),
        LibraryItem::artist("new5", "Duman", "https://i.scdn.co/image/ab6761610000e5ebc56cc7c07b49463283257523"),
    ]
}

/// The "Your Library" list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    items: Vec<LibraryItem>,
}

impl Default for Library {
    fn default() -> Self {
        Self {
            items: vec![LibraryItem {
                id: "1".to_string(),
                title: "Beğenilen Şarkılar".to_string(),
                subtitle: "Playlist • 12 şarkı".to_string(),
                image_url: "https://misc.scdn.co/liked-songs/liked-songs-640.png".to_string(),
                kind: LibraryItemKind::Playlist,
            }],
        }
    }
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[LibraryItem] {
        &self.items
    }

    /// Append a random suggested artist unless one with the same title is
    /// already listed. Returns the artist if it was added.
    pub fn add_random_artist<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<LibraryItem> {
        let artist = suggested_artists().choose(rng)?.clone();
        if self.items.iter().any(|item| item.title == artist.title) {
            return None;
        }
        self.items.push(artist.clone());
        Some(artist)
    }
}
