//! Glue between foreign callback interfaces and the core traits

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::backend::{BackendClient, BackendError, ProfileDisplay};
use crate::identity::{IdentityState, ProfileSource, SessionObserver, StorageMedium};
use crate::playback::{HiddenSurface, MediaWidget, PlaybackListener, PlaybackQuality, WidgetHost, WidgetInstance, WidgetOptions};

use super::types::{AppCallback, PlayerHost, StorageTier, UserIdentity};

pub(crate) type SharedCallback = Arc<RwLock<Option<Arc<dyn AppCallback>>>>;

/// The session's backend client, swapped when the access token changes
#[derive(Clone)]
pub(crate) struct SharedBackend(pub Arc<RwLock<BackendClient>>);

impl SharedBackend {
    pub fn client(&self) -> BackendClient {
        self.0.read().clone()
    }

    pub fn replace(&self, client: BackendClient) {
        *self.0.write() = client;
    }
}

#[async_trait]
impl ProfileSource for SharedBackend {
    async fn fetch_display(&self, user_id: &str) -> Result<Option<ProfileDisplay>, BackendError> {
        let client = self.client();
        client.fetch_profile_display(user_id).await
    }
}

/// A foreign storage tier
pub(crate) struct ForeignStorage(pub Box<dyn StorageTier>);

impl StorageMedium for ForeignStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get_item(key.to_string())
    }

    fn set(&self, key: &str, value: &str) {
        self.0.set_item(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.0.remove_item(key.to_string());
    }
}

/// Widget factory backed by the foreign player host
pub(crate) struct ForeignPlayerHost(pub Arc<dyn PlayerHost>);

impl WidgetHost for ForeignPlayerHost {
    fn create(
        &self,
        instance: WidgetInstance,
        media_id: &str,
        options: &WidgetOptions,
        surface: &HiddenSurface,
    ) -> Box<dyn MediaWidget> {
        self.0
            .create_player(instance.0, media_id.to_string(), options.to_json(), surface.css());
        Box::new(ForeignWidget {
            host: Arc::clone(&self.0),
            instance,
        })
    }
}

struct ForeignWidget {
    host: Arc<dyn PlayerHost>,
    instance: WidgetInstance,
}

impl MediaWidget for ForeignWidget {
    fn set_playback_quality(&self, quality: PlaybackQuality) {
        self.host
            .set_playback_quality(self.instance.0, quality.as_str().to_string());
    }

    fn destroy(self: Box<Self>) {
        self.host.destroy_player(self.instance.0);
    }
}

/// Routes core events to whichever app callback is currently registered
pub(crate) struct CallbackRelay {
    callback: SharedCallback,
}

impl CallbackRelay {
    pub fn new(callback: SharedCallback) -> Self {
        Self { callback }
    }

    fn with<F: FnOnce(&dyn AppCallback)>(&self, f: F) {
        let callback = self.callback.read().clone();
        if let Some(cb) = callback {
            f(cb.as_ref());
        }
    }
}

impl SessionObserver for CallbackRelay {
    fn identity_changed(&self, state: &IdentityState) {
        self.with(|cb| cb.on_identity_changed(UserIdentity::from_state(state)));
    }

    fn navigate(&self, route: &str) {
        self.with(|cb| cb.on_navigate(route.to_string()));
    }
}

impl PlaybackListener for CallbackRelay {
    fn on_ready(&self, instance: WidgetInstance) {
        self.with(|cb| cb.on_player_ready(instance.0));
    }

    fn on_state_change(&self, instance: WidgetInstance, state: i32) {
        self.with(|cb| cb.on_player_state_change(instance.0, state));
    }
}
