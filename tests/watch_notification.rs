// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use zk_session_core::cfg::EngineConfig;
use zk_session_core::session::{SimpleWatcherRegistry, WatchedEvent, Watcher};
use zk_session_core::wire::{ConnectResponse, EventType, ReplyHeader, WatcherEvent, NOTIFICATION_XID};
use zk_session_core::SessionEngine;

struct RecordingWatcher(Arc<Mutex<Vec<WatchedEvent>>>);

impl Watcher for RecordingWatcher {
    fn process(&self, event: &WatchedEvent) {
        self.0.lock().expect("recording mutex poisoned").push(event.clone());
    }
}

/// A notification that arrives unsolicited (no matching pending packet)
/// must be routed straight to the watcher registry with its path
/// chroot-stripped, per spec.md §4.6/§4.7.
#[tokio::test]
async fn server_notification_reaches_registered_watcher_with_chroot_stripped() {
    let (addr, listener) = common::bind_ephemeral().await.expect("bind");

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let _connect_req = common::read_frame(&mut stream).await.expect("read ConnectRequest");

        let resp = ConnectResponse {
            protocol_version: 0,
            timeout_ms: 20_000,
            session_id: 0x99,
            passwd: Bytes::new(),
        };
        let mut body = BytesMut::new();
        resp.encode(&mut body);
        common::write_frame(&mut stream, &body).await.expect("write ConnectResponse");

        // A notification frame is a ReplyHeader (xid == -1) followed by a
        // WatcherEvent, both in the same frame.
        let reply = ReplyHeader { xid: NOTIFICATION_XID, zxid: 0, err: 0 };
        let event = WatcherEvent {
            event_type: EventType::NodeDataChanged,
            state: 3, // SyncConnected
            path: "/app/root/nodes/1".to_string(),
        };
        let mut notif_body = BytesMut::new();
        reply.encode(&mut notif_body);
        event.encode(&mut notif_body);
        common::write_frame(&mut stream, &notif_body).await.expect("write notification");

        let mut scratch = [0u8; 4];
        let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut scratch).await;
    });

    let registry = Arc::new(SimpleWatcherRegistry::new());
    let captured = Arc::new(Mutex::new(Vec::new()));
    registry.register_default_watcher(Arc::new(RecordingWatcher(captured.clone())));

    let cfg = EngineConfig {
        server_addrs: vec![addr],
        session_timeout_ms: 20_000,
        chroot: "/app/root".to_string(),
        ..EngineConfig::default()
    };
    let engine = SessionEngine::start(cfg, registry).expect("start engine");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if captured.lock().expect("recording mutex poisoned").len() >= 2 {
            break;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for watcher events");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let events = captured.lock().expect("recording mutex poisoned").clone();
    // First event is the SyncConnected session-state event fired on
    // entering CONNECTED; second is the server notification.
    let notification = events
        .iter()
        .find(|e| e.event_type == EventType::NodeDataChanged)
        .expect("notification event recorded");
    assert_eq!(notification.path.as_deref(), Some("/nodes/1"));

    engine.dispose().await;
    server.abort();
}
