// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Traits at the seam between this engine and the (out-of-scope) watcher
//! registry and request/response codec, plus a minimal in-memory registry
//! good enough for tests and small standalone uses.
//!
//! Grounded on the teacher's `DashMap`-backed registries in
//! `client::pool_sessions::Pool`.

use std::sync::Arc;

use dashmap::DashMap;

use crate::session::events::WatchedEvent;
use crate::wire::record::{EventType, WatchEventState};

/// Receives the server's `err` code for the packet it was registered
/// against, once the reply arrives or the packet is finalized by
/// connection loss.
pub trait WatchRegistration: Send + Sync + std::fmt::Debug {
    fn register(&self, err_code: i32);
}

/// Opaque deserialize-on-success hook; `body` is the reply payload with the
/// reply header already stripped off.
pub trait ResponseSink: Send + Sync {
    fn accept(&self, body: &[u8]) -> anyhow::Result<()>;
}

pub trait Watcher: Send + Sync {
    fn process(&self, event: &WatchedEvent);
}

/// Materializes which watchers fire for a given notification or
/// session-state event, at enqueue time (spec.md §4.7).
pub trait WatcherRegistry: Send + Sync {
    fn materialize(
        &self,
        state: WatchEventState,
        event_type: EventType,
        path: Option<&str>,
    ) -> Vec<Arc<dyn Watcher>>;

    /// The currently-registered default (session-state) watchers, used to
    /// rebuild a `SetWatches` packet after a reconnect.
    fn data_watch_paths(&self) -> Vec<String> {
        Vec::new()
    }
    fn exist_watch_paths(&self) -> Vec<String> {
        Vec::new()
    }
    fn child_watch_paths(&self) -> Vec<String> {
        Vec::new()
    }
}

/// One-shot path watches (ZooKeeper semantics: a data/exists/children watch
/// fires at most once) plus a set of persistent default watchers that fire
/// on every session-state transition.
#[derive(Debug, Default)]
pub struct SimpleWatcherRegistry {
    path_watches: DashMap<String, Vec<Arc<dyn Watcher>>>,
    default_watchers: DashMap<u32, Arc<dyn Watcher>>,
    next_default_id: std::sync::atomic::AtomicU32,
}

impl SimpleWatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_path_watch(&self, path: impl Into<String>, watcher: Arc<dyn Watcher>) {
        self.path_watches.entry(path.into()).or_default().push(watcher);
    }

    pub fn register_default_watcher(&self, watcher: Arc<dyn Watcher>) -> u32 {
        let id = self
            .next_default_id
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.default_watchers.insert(id, watcher);
        id
    }
}

impl WatcherRegistry for SimpleWatcherRegistry {
    fn materialize(
        &self,
        _state: WatchEventState,
        event_type: EventType,
        path: Option<&str>,
    ) -> Vec<Arc<dyn Watcher>> {
        // The default watchers (registered once, e.g. at construction)
        // see every event; a one-shot path watch additionally fires for
        // the single notification it was registered against.
        let mut watchers: Vec<Arc<dyn Watcher>> = self
            .default_watchers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        if event_type != EventType::None {
            if let Some((_, mut path_specific)) = path.and_then(|p| self.path_watches.remove(p)) {
                watchers.append(&mut path_specific);
            }
        }
        watchers
    }

    fn data_watch_paths(&self) -> Vec<String> {
        self.path_watches.iter().map(|e| e.key().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWatcher(Arc<AtomicUsize>);
    impl Watcher for CountingWatcher {
        fn process(&self, _event: &WatchedEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn path_watch_fires_once_then_is_gone() {
        let registry = SimpleWatcherRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.register_path_watch("/a", Arc::new(CountingWatcher(hits.clone())));

        let fired = registry.materialize(
            WatchEventState::SyncConnected,
            EventType::NodeDataChanged,
            Some("/a"),
        );
        assert_eq!(fired.len(), 1);
        let fired_again = registry.materialize(
            WatchEventState::SyncConnected,
            EventType::NodeDataChanged,
            Some("/a"),
        );
        assert!(fired_again.is_empty());
    }

    #[test]
    fn default_watchers_fire_on_every_session_event() {
        let registry = SimpleWatcherRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.register_default_watcher(Arc::new(CountingWatcher(hits.clone())));

        for _ in 0..3 {
            let fired =
                registry.materialize(WatchEventState::Disconnected, EventType::None, None);
            assert_eq!(fired.len(), 1);
        }
    }
}
