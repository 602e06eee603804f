// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! C6: the event consumer (spec.md §4.7), realized as one tokio task. Watch
//! materialization happens here, at dispatch time against the registry that
//! dedup already ran against at enqueue time (`shared::EventQueueHandle`).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::session::events::WatchedEvent;
use crate::session::watcher::{Watcher, WatcherRegistry};
use crate::shared::Shared;

pub(crate) async fn run(
    shared: Arc<Shared>,
    registry: Arc<dyn WatcherRegistry>,
    mut events_rx: mpsc::UnboundedReceiver<WatchedEvent>,
) {
    loop {
        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => {
                while let Ok(event) = events_rx.try_recv() {
                    dispatch(&registry, &event);
                }
                return;
            }
            maybe_event = events_rx.recv() => {
                match maybe_event {
                    Some(event) => dispatch(&registry, &event),
                    None => return,
                }
            }
        }
    }
}

fn dispatch(registry: &Arc<dyn WatcherRegistry>, event: &WatchedEvent) {
    let watchers = registry.materialize(event.state, event.event_type, event.path.as_deref());
    for watcher in watchers {
        invoke(&watcher, event);
    }
}

/// One misbehaving watcher must not poison the consumer loop or stop other
/// watchers for the same event from firing.
fn invoke(watcher: &Arc<dyn Watcher>, event: &WatchedEvent) {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| watcher.process(event)));
    if let Err(panic) = result {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        tracing::error!(panic = %message, "watcher callback panicked");
    }
}
