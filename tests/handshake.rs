// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use zk_session_core::cfg::EngineConfig;
use zk_session_core::error::KeeperError;
use zk_session_core::session::{SessionState, SimpleWatcherRegistry};
use zk_session_core::wire::{ConnectResponse, ReplyHeader, RequestHeader};
use zk_session_core::SessionEngine;

/// Scenario S1-equivalent: connect, negotiate a session, round-trip one
/// ordinary request through the producer/receiver pair.
#[tokio::test]
async fn handshake_then_request_round_trip() {
    let (addr, listener) = common::bind_ephemeral().await.expect("bind");

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");

        let _connect_req = common::read_frame(&mut stream).await.expect("read ConnectRequest");
        let resp = ConnectResponse {
            protocol_version: 0,
            timeout_ms: 20_000,
            session_id: 0x4242,
            passwd: Bytes::from_static(b"0123456789abcdef"),
        };
        let mut body = BytesMut::new();
        resp.encode(&mut body);
        common::write_frame(&mut stream, &body).await.expect("write ConnectResponse");

        let req = common::read_frame(&mut stream).await.expect("read request");
        let mut req_bytes = req;
        let header = RequestHeader::decode(&mut req_bytes).expect("decode request header");

        let reply = ReplyHeader { xid: header.xid, zxid: 7, err: 0 };
        let mut reply_body = BytesMut::new();
        reply.encode(&mut reply_body);
        common::write_frame(&mut stream, &reply_body).await.expect("write reply");

        // Keep the connection open until the test drops it.
        let mut scratch = [0u8; 4];
        let _ = tokio::io::AsyncReadExt::read(&mut stream, &mut scratch).await;
    });

    let cfg = EngineConfig {
        server_addrs: vec![addr],
        session_timeout_ms: 20_000,
        ..EngineConfig::default()
    };
    let engine = SessionEngine::start(cfg, Arc::new(SimpleWatcherRegistry::new())).expect("start engine");

    let handle = engine.queue_packet(1, Bytes::new(), None, None, None, None);
    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.wait())
        .await
        .expect("request timed out");

    assert_eq!(outcome.err, KeeperError::Ok);
    assert_eq!(outcome.zxid, 7);
    assert_eq!(engine.session_id(), 0x4242);
    assert_eq!(engine.state(), SessionState::Connected);

    engine.dispose().await;
    server.abort();
}
