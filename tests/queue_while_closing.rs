// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

mod common;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use zk_session_core::cfg::EngineConfig;
use zk_session_core::error::KeeperError;
use zk_session_core::session::SimpleWatcherRegistry;
use zk_session_core::SessionEngine;

/// Boundary behavior from spec.md §6: a packet queued after `closing` is
/// set must be finalized with `CONNECTIONLOSS` immediately, never reaching
/// the socket. The server address here is never actually contacted within
/// the assertion window, so a passing test proves the finalization is
/// synchronous rather than a race against a real connection attempt.
#[tokio::test]
async fn packet_queued_after_close_session_is_finalized_immediately() {
    let cfg = EngineConfig {
        server_addrs: vec!["127.0.0.1:1".to_string()],
        session_timeout_ms: 20_000,
        ..EngineConfig::default()
    };
    let engine = SessionEngine::start(cfg, Arc::new(SimpleWatcherRegistry::new())).expect("start engine");

    let _close_handle = engine.queue_close_session();

    let late_handle = engine.queue_packet(1, Bytes::new(), None, None, None, None);
    let outcome = tokio::time::timeout(Duration::from_millis(200), late_handle.wait())
        .await
        .expect("finalization should be immediate, not dependent on the network");

    assert_eq!(outcome.err, KeeperError::ConnectionLoss);

    engine.dispose().await;
}
