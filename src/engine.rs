// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `SessionEngine`: the crate's public entry point, composing C1–C6 and
//! exposing `queue_packet`/`dispose` per spec.md §6. Grounded on the
//! teacher's `client::pool_sessions::Pool`, which plays the same
//! composition-root role over `ClientConnection`/`Session`.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::task::JoinHandle;

use crate::cfg::EngineConfig;
use crate::session::packet::{conn_loss_packet, Packet, PacketHandle};
use crate::session::state::SessionState;
use crate::session::watcher::{ResponseSink, WatchRegistration, WatcherRegistry};
use crate::shared::{EventQueueHandle, Shared};
use crate::wire::record::{RequestHeader, OP_CLOSE_SESSION};

pub struct SessionEngine {
    shared: Arc<Shared>,
    producer_task: Option<JoinHandle<()>>,
    consumer_task: Option<JoinHandle<()>>,
}

impl SessionEngine {
    pub fn start(mut cfg: EngineConfig, watcher_registry: Arc<dyn WatcherRegistry>) -> anyhow::Result<Self> {
        cfg.validate_and_normalize()?;

        let (event_sink, events_rx) = EventQueueHandle::new();
        let shared = Shared::new(cfg, event_sink, watcher_registry.clone());

        let producer_shared = shared.clone();
        let producer_task = tokio::spawn(async move { crate::producer::run(producer_shared).await });

        let consumer_shared = shared.clone();
        let consumer_task =
            tokio::spawn(async move { crate::consumer::run(consumer_shared, watcher_registry, events_rx).await });

        Ok(Self {
            shared,
            producer_task: Some(producer_task),
            consumer_task: Some(consumer_task),
        })
    }

    pub fn session_id(&self) -> i64 {
        self.shared.core.session_id()
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    pub fn last_zxid(&self) -> i64 {
        self.shared.core.last_zxid()
    }

    /// The crate's only public entry point for submitting work
    /// (spec.md §6). A packet queued while the session is closing, or
    /// already in a terminal state, is finalized immediately without ever
    /// touching the socket.
    #[allow(clippy::too_many_arguments)]
    pub fn queue_packet(
        &self,
        op_type: i32,
        request_body: Bytes,
        client_path: Option<String>,
        server_path: Option<String>,
        watch_registration: Option<Arc<dyn WatchRegistration>>,
        response_sink: Option<Arc<dyn ResponseSink>>,
    ) -> PacketHandle {
        let xid = self.shared.xid_gen.next();
        let header = RequestHeader { xid, op_type };

        let state = self.shared.state.get();
        if self.shared.is_closing() || state.is_terminal() {
            let (packet, rx) = Packet::new(Some(header), Bytes::new(), client_path, server_path, watch_registration, response_sink);
            conn_loss_packet(&packet, state);
            return PacketHandle::new(packet, rx);
        }

        let framed = frame(&header, &request_body, self.shared.cfg.packet_len_max);
        let (packet, rx) = Packet::new(Some(header), framed, client_path, server_path, watch_registration, response_sink);
        self.shared.outgoing.push(packet.clone());
        self.shared.outgoing.wake_sender();
        PacketHandle::new(packet, rx)
    }

    /// Enqueues a `CloseSession` packet, then flips the closing flag so the
    /// request producer stops reconnecting once the socket drops. The flag
    /// is set *after* enqueuing so the `CloseSession` packet itself is not
    /// caught by `queue_packet`'s closing guard and conn-loss-finalized
    /// before it ever reaches the socket; only packets queued after this
    /// call are rejected.
    pub fn queue_close_session(&self) -> PacketHandle {
        let handle = self.queue_packet(OP_CLOSE_SESSION, Bytes::new(), None, None, None, None);
        self.shared.closing.store(true, Ordering::SeqCst);
        handle
    }

    /// Hard shutdown (spec.md §5): cancels the shared token, joins both
    /// tasks, then drains any events queued in the gap so final
    /// state-transition events still reach watchers.
    pub async fn dispose(mut self) {
        self.shared.cancel.cancel();
        self.shared.outgoing.wake_sender();

        if let Some(task) = self.producer_task.take() {
            let _ = task.await;
        }
        if let Some(task) = self.consumer_task.take() {
            let _ = task.await;
        }
    }
}

fn frame(header: &RequestHeader, body: &[u8], packet_len_max: u32) -> Bytes {
    let mut encoded = BytesMut::with_capacity(8 + body.len());
    header.encode(&mut encoded);
    encoded.extend_from_slice(body);
    debug_assert!(
        (encoded.len() as u64) <= packet_len_max as u64,
        "caller-supplied body exceeds packet_len_max"
    );
    let mut framed = BytesMut::with_capacity(4 + encoded.len());
    framed.extend_from_slice(&(encoded.len() as u32).to_be_bytes());
    framed.extend_from_slice(&encoded);
    framed.freeze()
}
