// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The context every long-running task (C4, C5, C6) shares: the session
//! core, the state machine, both queues, the event sink and the static
//! configuration. Grounded on the teacher's `ClientConnection`, which bundles
//! exactly this kind of cross-task state behind a single struct its
//! `read_loop`/`send_request` methods close over.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::cfg::EngineConfig;
use crate::queues::{OutgoingQueue, PendingQueue};
use crate::session::core::SessionCore;
use crate::session::events::WatchedEvent;
use crate::session::packet::XidGenerator;
use crate::session::state::StateCell;
use crate::session::watcher::WatcherRegistry;
use crate::session::SessionState;

/// Enqueues a watched event without giving the producer/receiver tasks an
/// owning reference back to the consumer task (spec.md §9's cyclic-reference
/// note).
pub trait EventSink: Send + Sync {
    fn queue_event(&self, event: WatchedEvent);
}

pub struct EventQueueHandle {
    tx: tokio::sync::mpsc::UnboundedSender<WatchedEvent>,
    last_none_state: std::sync::Mutex<Option<crate::wire::record::WatchEventState>>,
}

impl EventQueueHandle {
    pub fn new() -> (Arc<Self>, tokio::sync::mpsc::UnboundedReceiver<WatchedEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (
            Arc::new(Self {
                tx,
                last_none_state: std::sync::Mutex::new(None),
            }),
            rx,
        )
    }
}

impl EventSink for EventQueueHandle {
    fn queue_event(&self, event: WatchedEvent) {
        if event.event_type == crate::wire::record::EventType::None {
            let mut last = self.last_none_state.lock().expect("event dedup mutex poisoned");
            if *last == Some(event.state) {
                return;
            }
            *last = Some(event.state);
        }
        let _ = self.tx.send(event);
    }
}

pub struct Shared {
    pub core: SessionCore,
    pub state: StateCell,
    pub outgoing: Arc<OutgoingQueue>,
    pub pending: Arc<PendingQueue>,
    pub event_sink: Arc<dyn EventSink>,
    pub watcher_registry: Arc<dyn WatcherRegistry>,
    pub cfg: EngineConfig,
    pub xid_gen: XidGenerator,
    pub cancel: CancellationToken,
    pub closing: AtomicBool,
    pub sent_count: AtomicU64,
    pub recv_count: AtomicU64,
}

impl Shared {
    pub fn new(
        cfg: EngineConfig,
        event_sink: Arc<dyn EventSink>,
        watcher_registry: Arc<dyn WatcherRegistry>,
    ) -> Arc<Self> {
        let requested_timeout = cfg.session_timeout_ms;
        Arc::new(Self {
            core: SessionCore::new(requested_timeout),
            state: StateCell::new(SessionState::NotConnected),
            outgoing: OutgoingQueue::new(),
            pending: PendingQueue::new(),
            event_sink,
            watcher_registry,
            cfg,
            xid_gen: XidGenerator::new(),
            cancel: CancellationToken::new(),
            closing: AtomicBool::new(false),
            sent_count: AtomicU64::new(0),
            recv_count: AtomicU64::new(0),
        })
    }

    pub fn ping_interval(&self) -> Duration {
        let negotiated = self.core.negotiated_timeout_ms().max(1);
        Duration::from_millis(self.cfg.ping_interval_ms(negotiated) as u64)
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}
