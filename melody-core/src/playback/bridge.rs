//! Playback bridge
//!
//! Owns at most one hidden widget instance and translates its notifications
//! into [`PlaybackListener`] calls. Changing the media id always recreates the
//! widget; there is no in-place retargeting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::widget::{HiddenSurface, MediaWidget, PlaybackQuality, WidgetHost, WidgetInstance, WidgetOptions};

/// What the caller wants played
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackTarget {
    pub media_id: String,
    pub is_playing: bool,
    /// Ask for the lowest quality once the widget is ready
    pub data_saver: bool,
}

impl PlaybackTarget {
    pub fn new(media_id: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            is_playing: true,
            data_saver: false,
        }
    }

    pub fn with_data_saver(mut self, data_saver: bool) -> Self {
        self.data_saver = data_saver;
        self
    }
}

/// Upward event surface of the bridge
pub trait PlaybackListener: Send + Sync {
    fn on_ready(&self, instance: WidgetInstance);
    /// Raw widget state code, unmodified
    fn on_state_change(&self, instance: WidgetInstance, state: i32);
}

struct MountedWidget {
    instance: WidgetInstance,
    target: PlaybackTarget,
    widget: Box<dyn MediaWidget>,
    ready: bool,
}

pub struct PlaybackBridge {
    host: Arc<dyn WidgetHost>,
    listener: Arc<dyn PlaybackListener>,
    options: WidgetOptions,
    surface: HiddenSurface,
    current: Mutex<Option<MountedWidget>>,
    next_instance: AtomicU64,
}

impl PlaybackBridge {
    pub fn new(host: Arc<dyn WidgetHost>, listener: Arc<dyn PlaybackListener>, options: WidgetOptions) -> Self {
        Self {
            host,
            listener,
            options,
            surface: HiddenSurface::default(),
            current: Mutex::new(None),
            next_instance: AtomicU64::new(1),
        }
    }

    /// Mount a widget for `target`.
    ///
    /// Same media id: only the control inputs are updated. New media id: the
    /// old instance is destroyed before the new one is created.
    ///
    /// The host must not call back into the bridge from inside `create`.
    pub fn mount(&self, target: PlaybackTarget) -> WidgetInstance {
        let mut current = self.current.lock();

        if let Some(mounted) = current.as_mut() {
            if mounted.target.media_id == target.media_id {
                mounted.target = target;
                return mounted.instance;
            }
        }

        if let Some(previous) = current.take() {
            debug!("Destroying {} ({})", previous.instance, previous.target.media_id);
            previous.widget.destroy();
        }

        let instance = WidgetInstance(self.next_instance.fetch_add(1, Ordering::SeqCst));
        let widget = self
            .host
            .create(instance, &target.media_id, &self.options, &self.surface);
        info!("Mounted {} for {}", instance, target.media_id);

        *current = Some(MountedWidget {
            instance,
            target,
            widget,
            ready: false,
        });
        instance
    }

    /// Destroy the current widget, if any
    pub fn unmount(&self) {
        if let Some(previous) = self.current.lock().take() {
            debug!("Unmounting {}", previous.instance);
            previous.widget.destroy();
        }
    }

    /// The mounted instance and its target
    pub fn current(&self) -> Option<(WidgetInstance, PlaybackTarget)> {
        self.current
            .lock()
            .as_ref()
            .map(|m| (m.instance, m.target.clone()))
    }

    /// Widget reported it is controllable.
    ///
    /// With data saver on, the quality request is issued before the listener
    /// hears about readiness. Repeated or stale notifications are dropped.
    pub fn handle_ready(&self, instance: WidgetInstance) {
        {
            let mut current = self.current.lock();
            let Some(mounted) = current.as_mut().filter(|m| m.instance == instance) else {
                debug!("Ignoring ready from stale {}", instance);
                return;
            };
            if mounted.ready {
                return;
            }
            mounted.ready = true;

            if mounted.target.data_saver {
                debug!("Data saver on, requesting {} for {}", PlaybackQuality::LOWEST.as_str(), instance);
                mounted.widget.set_playback_quality(PlaybackQuality::LOWEST);
            }
        }

        self.listener.on_ready(instance);
    }

    /// Forward a state change from the current instance unmodified
    pub fn handle_state_change(&self, instance: WidgetInstance, state: i32) {
        let is_current = self
            .current
            .lock()
            .as_ref()
            .map(|m| m.instance == instance)
            .unwrap_or(false);

        if is_current {
            self.listener.on_state_change(instance, state);
        } else {
            debug!("Ignoring state {} from stale {}", state, instance);
        }
    }
}

impl Drop for PlaybackBridge {
    fn drop(&mut self) {
        if let Some(previous) = self.current.get_mut().take() {
            previous.widget.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlayerConfig;

    #[derive(Default)]
    struct Log {
        events: Mutex<Vec<String>>,
    }

    impl Log {
        fn push(&self, event: String) {
            self.events.lock().push(event);
        }

        fn take(&self) -> Vec<String> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    struct FakeWidget {
        instance: WidgetInstance,
        log: Arc<Log>,
    }

    impl MediaWidget for FakeWidget {
        fn set_playback_quality(&self, quality: PlaybackQuality) {
            self.log.push(format!("quality {} {}", self.instance.0, quality.as_str()));
        }

        fn destroy(self: Box<Self>) {
            self.log.push(format!("destroy {}", self.instance.0));
        }
    }

    struct FakeHost {
        log: Arc<Log>,
    }

    impl WidgetHost for FakeHost {
        fn create(
            &self,
            instance: WidgetInstance,
            media_id: &str,
            options: &WidgetOptions,
            _surface: &HiddenSurface,
        ) -> Box<dyn MediaWidget> {
            assert_eq!(options.player_vars.autoplay, 1);
            self.log.push(format!("create {} {}", instance.0, media_id));
            Box::new(FakeWidget {
                instance,
                log: self.log.clone(),
            })
        }
    }

    struct FakeListener {
        log: Arc<Log>,
    }

    impl PlaybackListener for FakeListener {
        fn on_ready(&self, instance: WidgetInstance) {
            self.log.push(format!("ready {}", instance.0));
        }

        fn on_state_change(&self, instance: WidgetInstance, state: i32) {
            self.log.push(format!("state {} {}", instance.0, state));
        }
    }

    fn bridge() -> (PlaybackBridge, Arc<Log>) {
        let log = Arc::new(Log::default());
        let bridge = PlaybackBridge::new(
            Arc::new(FakeHost { log: log.clone() }),
            Arc::new(FakeListener { log: log.clone() }),
            WidgetOptions::from_config(&PlayerConfig::default()),
        );
        (bridge, log)
    }

    #[test]
    fn test_new_media_destroys_before_create() {
        let (bridge, log) = bridge();

        let first = bridge.mount(PlaybackTarget::new("aaa"));
        let second = bridge.mount(PlaybackTarget::new("bbb"));

        assert_ne!(first, second);
        assert_eq!(log.take(), vec!["create 1 aaa", "destroy 1", "create 2 bbb"]);
    }

    #[test]
    fn test_same_media_keeps_instance() {
        let (bridge, log) = bridge();

        let first = bridge.mount(PlaybackTarget::new("aaa"));
        let mut paused = PlaybackTarget::new("aaa");
        paused.is_playing = false;
        let again = bridge.mount(paused);

        assert_eq!(first, again);
        assert_eq!(log.take(), vec!["create 1 aaa"]);
        assert!(!bridge.current().unwrap().1.is_playing);
    }

    #[test]
    fn test_data_saver_quality_precedes_ready() {
        let (bridge, log) = bridge();
        let instance = bridge.mount(PlaybackTarget::new("aaa").with_data_saver(true));
        log.take();

        bridge.handle_ready(instance);
        bridge.handle_ready(instance);

        assert_eq!(log.take(), vec!["quality 1 small", "ready 1"]);
    }

    #[test]
    fn test_ready_without_data_saver() {
        let (bridge, log) = bridge();
        let instance = bridge.mount(PlaybackTarget::new("aaa"));
        log.take();

        bridge.handle_ready(instance);

        assert_eq!(log.take(), vec!["ready 1"]);
    }

    #[test]
    fn test_stale_events_dropped() {
        let (bridge, log) = bridge();
        let old = bridge.mount(PlaybackTarget::new("aaa"));
        let new = bridge.mount(PlaybackTarget::new("bbb"));
        log.take();

        bridge.handle_ready(old);
        bridge.handle_state_change(old, 1);
        bridge.handle_state_change(new, 3);

        assert_eq!(log.take(), vec!["state 2 3"]);
    }

    #[test]
    fn test_unmount_and_drop_destroy() {
        let (bridge, log) = bridge();
        bridge.mount(PlaybackTarget::new("aaa"));
        bridge.unmount();
        assert!(bridge.current().is_none());

        bridge.mount(PlaybackTarget::new("bbb"));
        drop(bridge);

        assert_eq!(log.take(), vec!["create 1 aaa", "destroy 1", "create 2 bbb", "destroy 2"]);
    }
}
