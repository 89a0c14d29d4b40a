//! Session reconciliation
//!
//! Keeps one consistent [`IdentityState`] on top of the two storage tiers and
//! repairs placeholder display names from the remote profile store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::storage::{Tier, TieredStore, CURRENT_USER_KEY};
use super::user::{IdentityRecord, IdentityState, LocalIdentity, StoredIdentity};
use crate::backend::{BackendError, ProfileDisplay, SignedInUser};

/// Route the UI navigates to after logout
pub const SIGN_IN_ROUTE: &str = "/login";

/// Remote lookup of a user's display name and avatar
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_display(&self, user_id: &str) -> Result<Option<ProfileDisplay>, BackendError>;
}

/// Receives identity changes and navigation requests
pub trait SessionObserver: Send + Sync {
    fn identity_changed(&self, state: &IdentityState);
    fn navigate(&self, route: &str);
}

/// Result of a reconcile pass. Failures are reported here, never raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Identity is absent or already resolved
    NotNeeded,
    /// Display name replaced and written back
    Resolved(LocalIdentity),
    /// The remote record has no usable name
    NoRemoteName,
    /// Lookup failed; the placeholder stays
    Failed,
    /// Identity changed (load/logout) while the lookup was in flight
    Superseded,
}

pub struct SessionReconciler {
    store: TieredStore,
    profiles: Arc<dyn ProfileSource>,
    state: RwLock<IdentityState>,
    /// Bumped on every load/logout; stale lookups compare against it
    generation: AtomicU64,
    /// Serializes storage writes. Never held together with `state`, so a host
    /// that reports its own writes back through `on_external_change` can
    /// re-enter `load` safely.
    write_back: Mutex<()>,
    observer: RwLock<Option<Arc<dyn SessionObserver>>>,
}

impl SessionReconciler {
    pub fn new(store: TieredStore, profiles: Arc<dyn ProfileSource>) -> Self {
        Self {
            store,
            profiles,
            state: RwLock::new(IdentityState::Absent),
            generation: AtomicU64::new(0),
            write_back: Mutex::new(()),
            observer: RwLock::new(None),
        }
    }

    pub fn set_observer(&self, observer: Arc<dyn SessionObserver>) {
        *self.observer.write() = Some(observer);
    }

    pub fn state(&self) -> IdentityState {
        self.state.read().clone()
    }

    pub fn current(&self) -> Option<LocalIdentity> {
        self.state.read().identity().cloned()
    }

    pub fn needs_reconcile(&self) -> bool {
        self.state.read().needs_reconcile()
    }

    /// Rebuild the identity from storage (durable tier first).
    ///
    /// A corrupt record clears the identity; the error is only logged.
    pub fn load(&self) -> IdentityState {
        let loaded = match self.store.read(CURRENT_USER_KEY) {
            None => IdentityState::Absent,
            Some((tier, raw)) => match serde_json::from_str::<StoredIdentity>(&raw) {
                Ok(stored) => IdentityState::from_identity(LocalIdentity::from(stored)),
                Err(e) => {
                    warn!("User data parse error in {:?} tier: {}", tier, e);
                    IdentityState::Absent
                }
            },
        };

        {
            let mut state = self.state.write();
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = loaded.clone();
        }

        debug!("Identity loaded: {:?}", loaded);
        self.notify_identity(&loaded);
        loaded
    }

    /// Re-run `load()` if the host reports an external change to the identity
    /// key. `None` means the whole store was cleared.
    pub fn on_external_change(&self, key: Option<&str>) -> Option<IdentityState> {
        match key {
            Some(key) if key != CURRENT_USER_KEY => None,
            _ => {
                debug!("Storage changed externally, reloading identity");
                Some(self.load())
            }
        }
    }

    /// Replace a placeholder display name with the one from the profile store.
    ///
    /// The corrected name (and avatar, if the profile has one) is merged into
    /// the tiers that already hold a record.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        let (identity, generation) = {
            let state = self.state.read();
            match &*state {
                IdentityState::PlaceholderLoaded(identity) => {
                    (identity.clone(), self.generation.load(Ordering::SeqCst))
                }
                _ => return ReconcileOutcome::NotNeeded,
            }
        };

        let display = match self.profiles.fetch_display(&identity.id).await {
            Ok(Some(display)) => display,
            Ok(None) => {
                debug!("No profile row for {}", identity.id);
                return ReconcileOutcome::NoRemoteName;
            }
            Err(e) => {
                warn!("Error fixing username for {}: {}", identity.id, e);
                return ReconcileOutcome::Failed;
            }
        };

        let Some(username) = display.username.filter(|name| !name.is_empty()) else {
            debug!("Profile for {} has no username", identity.id);
            return ReconcileOutcome::NoRemoteName;
        };

        let resolved = {
            let _write_back = self.write_back.lock();
            let resolved = {
                let mut state = self.state.write();
                if self.generation.load(Ordering::SeqCst) != generation {
                    info!("Identity changed during lookup for {}, discarding result", identity.id);
                    return ReconcileOutcome::Superseded;
                }

                let resolved = LocalIdentity {
                    username: username.clone(),
                    avatar: display.avatar_url.clone().or(identity.avatar),
                    ..identity
                };
                *state = IdentityState::Resolved(resolved.clone());
                resolved
            };

            let mut patch = Map::new();
            patch.insert("username".to_string(), Value::String(username));
            if let Some(avatar) = display.avatar_url {
                patch.insert("avatar".to_string(), Value::String(avatar));
            }
            let tiers = self.store.merge_existing(CURRENT_USER_KEY, &patch);
            info!("Username auto-fixed from profile store: {} (tiers: {:?})", resolved.username, tiers);

            resolved
        };

        self.notify_identity(&IdentityState::Resolved(resolved.clone()));
        ReconcileOutcome::Resolved(resolved)
    }

    /// Clear both tiers and the in-memory identity, then navigate to sign-in.
    /// Never touches the network.
    pub fn logout(&self) {
        {
            let _write_back = self.write_back.lock();
            {
                let mut state = self.state.write();
                self.generation.fetch_add(1, Ordering::SeqCst);
                *state = IdentityState::Absent;
            }
            self.store.remove_all(CURRENT_USER_KEY);
        }

        info!("Logged out");
        if let Some(observer) = self.observer() {
            observer.identity_changed(&IdentityState::Absent);
            observer.navigate(SIGN_IN_ROUTE);
        }
    }

    /// Persist a freshly signed-in user into one tier and reload.
    ///
    /// The other tier's record is removed so the two never disagree.
    pub fn remember(&self, user: &SignedInUser, tier: Tier) -> IdentityState {
        let record = IdentityRecord {
            id: &user.id,
            username: &user.username,
            email: &user.email,
            avatar: user.avatar.as_deref(),
            registered_at: user.registered_at.as_deref(),
        };

        let write_back = self.write_back.lock();
        match serde_json::to_string(&record) {
            Ok(json) => {
                self.store.write(tier, CURRENT_USER_KEY, &json);
                self.store.tier(tier.other()).remove(CURRENT_USER_KEY);
                debug!("Stored identity for {} in {:?} tier", user.id, tier);
            }
            Err(e) => warn!("Could not serialize identity for {}: {}", user.id, e),
        }
        drop(write_back);

        self.load()
    }

    fn observer(&self) -> Option<Arc<dyn SessionObserver>> {
        self.observer.read().clone()
    }

    fn notify_identity(&self, state: &IdentityState) {
        if let Some(observer) = self.observer() {
            observer.identity_changed(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::storage::{MemoryStorage, StorageMedium};
    use crate::identity::user::DEFAULT_DISPLAY_NAME;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    enum Reply {
        Profile(Option<&'static str>, Option<&'static str>),
        Missing,
        Fail,
    }

    struct FakeProfiles {
        reply: Reply,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl FakeProfiles {
        fn new(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                gate: None,
            })
        }

        fn gated(reply: Reply, gate: Arc<Notify>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
                gate: Some(gate),
            })
        }
    }

    #[async_trait]
    impl ProfileSource for FakeProfiles {
        async fn fetch_display(&self, _user_id: &str) -> Result<Option<ProfileDisplay>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.reply {
                Reply::Profile(username, avatar) => Ok(Some(ProfileDisplay {
                    username: username.map(str::to_string),
                    avatar_url: avatar.map(str::to_string),
                })),
                Reply::Missing => Ok(None),
                Reply::Fail => Err(BackendError::Api {
                    status: 503,
                    message: "unavailable".to_string(),
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl SessionObserver for RecordingObserver {
        fn identity_changed(&self, state: &IdentityState) {
            let name = state.identity().map(|i| i.username.clone()).unwrap_or_default();
            self.events.lock().push(format!("identity:{}", name));
        }

        fn navigate(&self, route: &str) {
            self.events.lock().push(format!("navigate:{}", route));
        }
    }

    struct Harness {
        durable: Arc<MemoryStorage>,
        session: Arc<MemoryStorage>,
        profiles: Arc<FakeProfiles>,
        observer: Arc<RecordingObserver>,
        reconciler: SessionReconciler,
    }

    fn harness(profiles: Arc<FakeProfiles>) -> Harness {
        let durable = Arc::new(MemoryStorage::new());
        let session = Arc::new(MemoryStorage::new());
        let observer = Arc::new(RecordingObserver::default());
        let reconciler = SessionReconciler::new(
            TieredStore::new(durable.clone(), session.clone()),
            profiles.clone(),
        );
        reconciler.set_observer(observer.clone());
        Harness {
            durable,
            session,
            profiles,
            observer,
            reconciler,
        }
    }

    fn stored(storage: &MemoryStorage) -> Option<Value> {
        storage
            .get(CURRENT_USER_KEY)
            .map(|raw| serde_json::from_str(&raw).unwrap())
    }

    #[test]
    fn test_load_derives_username_from_email() {
        let h = harness(FakeProfiles::new(Reply::Missing));
        h.durable.set(CURRENT_USER_KEY, r#"{"id":"u1","email":"a@b.com"}"#);

        let state = h.reconciler.load();

        assert_eq!(state.identity().unwrap().username, "a");
        assert!(matches!(state, IdentityState::Resolved(_)));
    }

    #[test]
    fn test_load_without_email_is_placeholder() {
        let h = harness(FakeProfiles::new(Reply::Missing));
        h.session.set(CURRENT_USER_KEY, r#"{"id":"u1","email":""}"#);

        let state = h.reconciler.load();

        assert_eq!(state.identity().unwrap().username, DEFAULT_DISPLAY_NAME);
        assert!(h.reconciler.needs_reconcile());
    }

    #[test]
    fn test_load_prefers_durable_tier() {
        let h = harness(FakeProfiles::new(Reply::Missing));
        h.session.set(CURRENT_USER_KEY, r#"{"id":"s","username":"session"}"#);
        h.durable.set(CURRENT_USER_KEY, r#"{"id":"d","username":"durable"}"#);

        assert_eq!(h.reconciler.load().identity().unwrap().id, "d");
    }

    #[test]
    fn test_corrupt_record_clears_identity() {
        let h = harness(FakeProfiles::new(Reply::Missing));
        h.durable.set(CURRENT_USER_KEY, r#"{"id":"u1","username":"ok"}"#);
        h.reconciler.load();

        h.durable.set(CURRENT_USER_KEY, "{broken");
        let state = h.reconciler.load();

        assert!(state.is_absent());
        assert!(h.reconciler.current().is_none());
    }

    #[tokio::test]
    async fn test_reconcile_updates_only_existing_tiers() {
        let h = harness(FakeProfiles::new(Reply::Profile(Some("realname"), None)));
        h.durable.set(
            CURRENT_USER_KEY,
            r#"{"id":"u1","username":"Kullanıcı","email":"x@y.com","avatar":"old.png"}"#,
        );
        h.reconciler.load();

        let outcome = h.reconciler.reconcile().await;

        let identity = match outcome {
            ReconcileOutcome::Resolved(identity) => identity,
            other => panic!("expected resolution, got {:?}", other),
        };
        assert_eq!(identity.username, "realname");
        assert_eq!(identity.avatar.as_deref(), Some("old.png"));
        assert!(matches!(h.reconciler.state(), IdentityState::Resolved(_)));

        let durable = stored(&h.durable).unwrap();
        assert_eq!(durable["username"], "realname");
        assert_eq!(durable["avatar"], "old.png");
        assert!(h.session.get(CURRENT_USER_KEY).is_none());
    }

    #[tokio::test]
    async fn test_reconcile_updates_both_tiers_and_avatar() {
        let h = harness(FakeProfiles::new(Reply::Profile(Some("realname"), Some("new.png"))));
        h.durable.set(CURRENT_USER_KEY, r#"{"id":"u1","username":"Giriş Yap","registeredAt":"2024"}"#);
        h.session.set(CURRENT_USER_KEY, r#"{"id":"u1","username":"Giriş Yap"}"#);
        h.reconciler.load();

        h.reconciler.reconcile().await;

        let durable = stored(&h.durable).unwrap();
        let session = stored(&h.session).unwrap();
        assert_eq!(durable["username"], "realname");
        assert_eq!(durable["avatar"], "new.png");
        assert_eq!(durable["registeredAt"], "2024");
        assert_eq!(session["username"], "realname");
        assert_eq!(h.reconciler.current().unwrap().avatar.as_deref(), Some("new.png"));
    }

    #[tokio::test]
    async fn test_reconcile_failure_keeps_placeholder() {
        let h = harness(FakeProfiles::new(Reply::Fail));
        h.durable.set(CURRENT_USER_KEY, r#"{"id":"u1","username":"Kullanıcı"}"#);
        let before = h.reconciler.load();

        assert_eq!(h.reconciler.reconcile().await, ReconcileOutcome::Failed);
        assert_eq!(h.reconciler.state(), before);
        assert!(h.reconciler.needs_reconcile());
        assert_eq!(stored(&h.durable).unwrap()["username"], "Kullanıcı");
    }

    #[tokio::test]
    async fn test_reconcile_ignores_empty_remote_name() {
        let h = harness(FakeProfiles::new(Reply::Profile(Some(""), Some("a.png"))));
        h.durable.set(CURRENT_USER_KEY, r#"{"id":"u1"}"#);
        h.reconciler.load();

        assert_eq!(h.reconciler.reconcile().await, ReconcileOutcome::NoRemoteName);
        assert!(h.reconciler.needs_reconcile());
    }

    #[tokio::test]
    async fn test_reconcile_skips_resolved_identity() {
        let h = harness(FakeProfiles::new(Reply::Profile(Some("other"), None)));
        h.durable.set(CURRENT_USER_KEY, r#"{"id":"u1","username":"deniz"}"#);
        h.reconciler.load();

        assert_eq!(h.reconciler.reconcile().await, ReconcileOutcome::NotNeeded);
        assert_eq!(h.profiles.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_logout_is_immediate() {
        let h = harness(FakeProfiles::new(Reply::Missing));
        h.durable.set(CURRENT_USER_KEY, r#"{"id":"u1","username":"deniz"}"#);
        h.session.set(CURRENT_USER_KEY, r#"{"id":"u1","username":"deniz"}"#);
        h.reconciler.load();

        h.reconciler.logout();

        assert!(h.durable.get(CURRENT_USER_KEY).is_none());
        assert!(h.session.get(CURRENT_USER_KEY).is_none());
        assert!(h.reconciler.state().is_absent());

        let events = h.observer.events.lock().clone();
        assert_eq!(events.last().map(String::as_str), Some("navigate:/login"));
    }

    #[tokio::test]
    async fn test_lookup_superseded_by_logout_is_discarded() {
        let gate = Arc::new(Notify::new());
        let h = harness(FakeProfiles::gated(Reply::Profile(Some("realname"), None), gate.clone()));
        h.durable.set(CURRENT_USER_KEY, r#"{"id":"u1","username":"Kullanıcı"}"#);
        h.reconciler.load();

        let (outcome, _) = tokio::join!(h.reconciler.reconcile(), async {
            h.reconciler.logout();
            gate.notify_one();
        });

        assert_eq!(outcome, ReconcileOutcome::Superseded);
        assert!(h.reconciler.state().is_absent());
        assert!(h.durable.get(CURRENT_USER_KEY).is_none());
    }

    #[test]
    fn test_external_change_reloads() {
        let h = harness(FakeProfiles::new(Reply::Missing));
        assert!(h.reconciler.load().is_absent());

        h.session.set(CURRENT_USER_KEY, r#"{"id":"u2","username":"ece"}"#);
        assert!(h.reconciler.on_external_change(Some("theme")).is_none());
        assert!(h.reconciler.state().is_absent());

        let state = h.reconciler.on_external_change(Some(CURRENT_USER_KEY)).unwrap();
        assert_eq!(state.identity().unwrap().username, "ece");

        h.session.remove(CURRENT_USER_KEY);
        assert!(h.reconciler.on_external_change(None).unwrap().is_absent());
    }

    #[test]
    fn test_remember_writes_one_tier() {
        let h = harness(FakeProfiles::new(Reply::Missing));
        h.session.set(CURRENT_USER_KEY, r#"{"id":"old","username":"old"}"#);

        let user = SignedInUser {
            id: "u1".to_string(),
            email: "deniz@example.com".to_string(),
            username: "deniz".to_string(),
            avatar: None,
            registered_at: Some("2024-05-01T10:00:00Z".to_string()),
            access_token: Some("secret".to_string()),
        };
        let state = h.reconciler.remember(&user, Tier::Durable);

        assert_eq!(state.identity().unwrap().id, "u1");
        assert!(h.session.get(CURRENT_USER_KEY).is_none());
        let durable = stored(&h.durable).unwrap();
        assert_eq!(durable["username"], "deniz");
        assert_eq!(durable["registeredAt"], "2024-05-01T10:00:00Z");
        assert!(durable.get("access_token").is_none());
        assert!(durable.get("accessToken").is_none());
    }

    /// Storage that reports its own writes back to the reconciler, the way a
    /// host with synchronous change notifications does
    #[derive(Default)]
    struct ReentrantStorage {
        inner: MemoryStorage,
        reconciler: Mutex<Option<std::sync::Weak<SessionReconciler>>>,
    }

    impl ReentrantStorage {
        fn changed(&self, key: &str) {
            let reconciler = self.reconciler.lock().as_ref().and_then(|weak| weak.upgrade());
            if let Some(reconciler) = reconciler {
                reconciler.on_external_change(Some(key));
            }
        }
    }

    impl StorageMedium for ReentrantStorage {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) {
            self.inner.set(key, value);
            self.changed(key);
        }

        fn remove(&self, key: &str) {
            self.inner.remove(key);
            self.changed(key);
        }
    }

    fn reentrant(profiles: Arc<FakeProfiles>) -> (Arc<ReentrantStorage>, Arc<ReentrantStorage>, Arc<SessionReconciler>) {
        let durable = Arc::new(ReentrantStorage::default());
        let session = Arc::new(ReentrantStorage::default());
        let reconciler = Arc::new(SessionReconciler::new(
            TieredStore::new(durable.clone(), session.clone()),
            profiles,
        ));
        *durable.reconciler.lock() = Some(Arc::downgrade(&reconciler));
        *session.reconciler.lock() = Some(Arc::downgrade(&reconciler));
        (durable, session, reconciler)
    }

    /// Run `f` on its own thread; false if it did not finish in time
    fn finishes_within_3s<F: FnOnce() + Send + 'static>(f: F) -> bool {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            f();
            let _ = tx.send(());
        });
        rx.recv_timeout(std::time::Duration::from_secs(3)).is_ok()
    }

    #[test]
    fn test_logout_with_reentrant_storage() {
        let (durable, session, reconciler) = reentrant(FakeProfiles::new(Reply::Missing));
        durable.inner.set(CURRENT_USER_KEY, r#"{"id":"u1","username":"deniz"}"#);
        session.inner.set(CURRENT_USER_KEY, r#"{"id":"u1","username":"deniz"}"#);
        reconciler.load();

        let r = reconciler.clone();
        assert!(finishes_within_3s(move || r.logout()));

        assert!(reconciler.state().is_absent());
        assert!(durable.get(CURRENT_USER_KEY).is_none());
        assert!(session.get(CURRENT_USER_KEY).is_none());
    }

    #[test]
    fn test_reconcile_and_remember_with_reentrant_storage() {
        let (durable, _session, reconciler) =
            reentrant(FakeProfiles::new(Reply::Profile(Some("realname"), None)));
        durable.inner.set(CURRENT_USER_KEY, r#"{"id":"u1","username":"Kullanıcı"}"#);
        reconciler.load();

        let r = reconciler.clone();
        assert!(finishes_within_3s(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(r.reconcile());
        }));
        assert_eq!(reconciler.current().unwrap().username, "realname");

        let user = SignedInUser {
            id: "u2".to_string(),
            email: "ece@example.com".to_string(),
            username: "ece".to_string(),
            avatar: None,
            registered_at: None,
            access_token: None,
        };
        let r = reconciler.clone();
        assert!(finishes_within_3s(move || {
            r.remember(&user, Tier::Session);
        }));
        assert_eq!(reconciler.current().unwrap().id, "u2");
    }
}
