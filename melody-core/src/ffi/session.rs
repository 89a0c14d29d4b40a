//! Session implementation for FFI

use std::sync::{Arc, Once};

use parking_lot::RwLock;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};
use tracing_subscriber::filter::Directive;

use crate::backend::BackendClient;
use crate::config::Config;
use crate::identity::{SessionReconciler, Tier, TieredStore};
use crate::playback::{PlaybackBridge, PlaybackTarget, WidgetInstance, WidgetOptions};
use crate::sidebar::{self, Library};

use super::adapters::{CallbackRelay, ForeignPlayerHost, ForeignStorage, SharedBackend, SharedCallback};
use super::types::*;

static TRACING_INIT: Once = Once::new();

/// Noisy dependencies silenced regardless of the configured filter
const QUIET_TARGETS: [&str; 3] = ["hyper_util=off", "hyper=off", "reqwest=off"];

fn init_tracing(filter: &str) {
    TRACING_INIT.call_once(|| {
        let mut env_filter = tracing_subscriber::EnvFilter::try_new(filter)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("melody_core=debug"));
        for target in QUIET_TARGETS {
            if let Ok(directive) = target.parse::<Directive>() {
                env_filter = env_filter.add_directive(directive);
            }
        }

        let _ = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_target(false)
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}

/// Main session interface
#[derive(uniffi::Object)]
pub struct Session {
    runtime: Runtime,
    config: Config,
    backend: SharedBackend,
    reconciler: Arc<SessionReconciler>,
    bridge: RwLock<Option<PlaybackBridge>>,
    library: RwLock<Library>,
    callback: SharedCallback,
    relay: Arc<CallbackRelay>,
}

#[uniffi::export]
impl Session {
    /// Create a session configured from the environment (`MELODY_*`, `.env`)
    #[uniffi::constructor]
    pub fn new(durable: Box<dyn StorageTier>, session: Box<dyn StorageTier>) -> Result<Arc<Self>, CoreError> {
        let config = Config::load()?;
        Self::build(config, durable, session)
    }

    /// Create a session with explicit backend settings
    #[uniffi::constructor]
    pub fn with_backend(
        backend_url: String,
        anon_key: String,
        player_origin: String,
        durable: Box<dyn StorageTier>,
        session: Box<dyn StorageTier>,
    ) -> Result<Arc<Self>, CoreError> {
        let mut config = Config::load()?;
        config.backend.url = backend_url.trim_end_matches('/').to_string();
        config.backend.anon_key = anon_key;
        config.player.origin = player_origin;
        Self::build(config, durable, session)
    }

    /// Set the event callback
    pub fn set_callback(&self, callback: Box<dyn AppCallback>) {
        *self.callback.write() = Some(Arc::from(callback));
    }

    /// Register the host that creates hidden players. Replacing the host
    /// destroys the current player.
    pub fn set_player_host(&self, host: Box<dyn PlayerHost>) {
        let bridge = PlaybackBridge::new(
            Arc::new(ForeignPlayerHost(Arc::from(host))),
            self.relay.clone(),
            WidgetOptions::from_config(&self.config.player),
        );
        *self.bridge.write() = Some(bridge);
    }

    // =========================================================================
    // Identity
    // =========================================================================

    /// Load the identity from storage; fixes a placeholder name in the background
    pub fn load_identity(&self) -> Option<UserIdentity> {
        let state = self.reconciler.load();
        self.spawn_reconcile();
        UserIdentity::from_state(&state)
    }

    /// The host saw the storage change from another browsing context.
    /// `key` is `None` when the whole store was cleared.
    pub fn storage_changed(&self, key: Option<String>) {
        if self.reconciler.on_external_change(key.as_deref()).is_some() {
            self.spawn_reconcile();
        }
    }

    pub fn current_identity(&self) -> Option<UserIdentity> {
        UserIdentity::from_state(&self.reconciler.state())
    }

    /// Clear the identity and navigate to sign-in. Works offline.
    pub fn logout(&self) {
        let client = self.backend.client().without_access_token();
        self.backend.replace(client);
        self.reconciler.logout();
    }

    // =========================================================================
    // Auth and profile
    // =========================================================================

    pub fn sign_up(&self, username: String, email: String, password: String) -> Result<String, CoreError> {
        let client = self.backend.client();
        let result = self
            .runtime
            .block_on(async { client.sign_up(&username, &email, &password).await });
        if let Err(e) = &result {
            warn!("Sign-up failed: {}", e);
        }
        Ok(result?)
    }

    /// Sign in and persist the identity in the chosen tier
    pub fn sign_in(&self, email: String, password: String, persistence: Persistence) -> Result<UserIdentity, CoreError> {
        let client = self.backend.client();
        let user = self
            .runtime
            .block_on(async { client.sign_in(&email, &password).await })?;

        if let Some(token) = &user.access_token {
            self.backend.replace(client.with_access_token(token.clone()));
        }

        let tier = match persistence {
            Persistence::Durable => Tier::Durable,
            Persistence::Session => Tier::Session,
        };
        let state = self.reconciler.remember(&user, tier);
        self.spawn_reconcile();

        info!("Signed in as {}", user.username);
        UserIdentity::from_state(&state).ok_or(CoreError::NotSignedIn)
    }

    pub fn update_profile(&self, username: Option<String>, avatar: Option<String>) -> Result<(), CoreError> {
        let user_id = self.user_id()?;
        let client = self.backend.client();
        self.runtime.block_on(async {
            client
                .update_profile(&user_id, username.as_deref(), avatar.as_deref())
                .await
        })?;
        Ok(())
    }

    pub fn save_preferences(&self, preferences: UserPreferences) -> Result<OperationOutcome, CoreError> {
        let user_id = self.user_id()?;
        let client = self.backend.client();
        let preferences = preferences.into();
        let outcome = self
            .runtime
            .block_on(async { client.save_preferences(&user_id, &preferences).await })?;
        Ok(outcome.into())
    }

    /// Stored preferences; empty when signed out or unavailable
    pub fn get_preferences(&self) -> UserPreferences {
        let Ok(user_id) = self.user_id() else {
            return crate::backend::UserPreferences::default().into();
        };
        let client = self.backend.client();
        self.runtime
            .block_on(async { client.get_preferences(&user_id).await })
            .into()
    }

    // =========================================================================
    // Favorites and history
    // =========================================================================

    pub fn save_favorite(&self, song: Song) -> OperationOutcome {
        let Ok(user_id) = self.user_id() else {
            return not_signed_in();
        };
        let client = self.backend.client();
        let song = song.into();
        self.runtime
            .block_on(async { client.save_favorite(&user_id, &song).await })
            .into()
    }

    pub fn remove_favorite(&self, song_id: String) -> OperationOutcome {
        let Ok(user_id) = self.user_id() else {
            return not_signed_in();
        };
        let client = self.backend.client();
        self.runtime
            .block_on(async { client.remove_favorite(&user_id, &song_id).await })
            .into()
    }

    pub fn favorites(&self) -> Vec<Song> {
        let Ok(user_id) = self.user_id() else {
            return Vec::new();
        };
        let client = self.backend.client();
        self.runtime
            .block_on(async { client.favorites(&user_id).await })
            .into_iter()
            .map(Song::from)
            .collect()
    }

    pub fn add_recently_played(&self, song: Song) -> OperationOutcome {
        let Ok(user_id) = self.user_id() else {
            return not_signed_in();
        };
        let client = self.backend.client();
        let song = song.into();
        self.runtime
            .block_on(async { client.add_recently_played(&user_id, &song).await })
            .into()
    }

    pub fn recently_played(&self) -> Vec<Song> {
        let Ok(user_id) = self.user_id() else {
            return Vec::new();
        };
        let client = self.backend.client();
        self.runtime
            .block_on(async { client.recently_played(&user_id).await })
            .into_iter()
            .map(Song::from)
            .collect()
    }

    // =========================================================================
    // Playback
    // =========================================================================

    /// Mount (or keep) the hidden player for `media_id`. Returns the instance id.
    pub fn mount_player(&self, media_id: String, is_playing: bool, data_saver: bool) -> Result<u64, CoreError> {
        let bridge = self.bridge.read();
        let bridge = bridge.as_ref().ok_or(CoreError::PlayerUnavailable)?;
        let target = PlaybackTarget {
            media_id,
            is_playing,
            data_saver,
        };
        Ok(bridge.mount(target).0)
    }

    pub fn unmount_player(&self) {
        if let Some(bridge) = self.bridge.read().as_ref() {
            bridge.unmount();
        }
    }

    /// Called by the host when a player becomes controllable
    pub fn player_ready(&self, instance_id: u64) {
        if let Some(bridge) = self.bridge.read().as_ref() {
            bridge.handle_ready(WidgetInstance(instance_id));
        }
    }

    /// Called by the host on every player state change
    pub fn player_state_changed(&self, instance_id: u64, state: i32) {
        if let Some(bridge) = self.bridge.read().as_ref() {
            bridge.handle_state_change(WidgetInstance(instance_id), state);
        }
    }

    // =========================================================================
    // Sidebar
    // =========================================================================

    pub fn nav_links(&self, pathname: String) -> Vec<NavEntry> {
        sidebar::nav_entries(&pathname)
            .into_iter()
            .map(|(link, active)| NavEntry {
                href: link.href.to_string(),
                label: link.label.to_string(),
                active,
            })
            .collect()
    }

    pub fn account_badge(&self) -> AccountBadge {
        sidebar::AccountBadge::for_identity(self.reconciler.current().as_ref()).into()
    }

    pub fn library_items(&self) -> Vec<LibraryItem> {
        self.library.read().items().iter().map(LibraryItem::from).collect()
    }

    /// Add a random suggested artist; `None` if it was already in the library
    pub fn add_random_artist(&self) -> Option<LibraryItem> {
        let mut rng = rand::thread_rng();
        self.library
            .write()
            .add_random_artist(&mut rng)
            .as_ref()
            .map(LibraryItem::from)
    }
}

impl Session {
    fn build(config: Config, durable: Box<dyn StorageTier>, session: Box<dyn StorageTier>) -> Result<Arc<Self>, CoreError> {
        init_tracing(&config.logging.filter);
        config.validate()?;
        config.log_summary();

        info!("Initializing melody-core session");

        let runtime = Runtime::new().map_err(|e| CoreError::Runtime(e.to_string()))?;
        let backend = SharedBackend(Arc::new(RwLock::new(BackendClient::new(&config.backend)?)));
        let callback: SharedCallback = Arc::new(RwLock::new(None));
        let relay = Arc::new(CallbackRelay::new(Arc::clone(&callback)));

        let store = TieredStore::new(Arc::new(ForeignStorage(durable)), Arc::new(ForeignStorage(session)));
        let reconciler = Arc::new(SessionReconciler::new(store, Arc::new(backend.clone())));
        reconciler.set_observer(relay.clone());

        Ok(Arc::new(Self {
            runtime,
            config,
            backend,
            reconciler,
            bridge: RwLock::new(None),
            library: RwLock::new(Library::new()),
            callback,
            relay,
        }))
    }

    fn user_id(&self) -> Result<String, CoreError> {
        self.reconciler
            .current()
            .map(|identity| identity.id)
            .ok_or(CoreError::NotSignedIn)
    }

    /// Fire-and-forget placeholder fix; the result arrives via the callback
    fn spawn_reconcile(&self) {
        if !self.reconciler.needs_reconcile() {
            return;
        }

        let reconciler = Arc::clone(&self.reconciler);
        self.runtime.spawn(async move {
            let outcome = reconciler.reconcile().await;
            debug!("Reconcile finished: {:?}", outcome);
        });
    }
}

fn not_signed_in() -> OperationOutcome {
    OperationOutcome {
        success: false,
        message: CoreError::NotSignedIn.to_string(),
    }
}
