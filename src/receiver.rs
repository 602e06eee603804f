// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! C5: the receive path (spec.md §4.3/§4.5/§4.6), realized as one tokio
//! task per connection generation, spawned fresh by `producer::reconnect`
//! and torn down (aborted) on the next reconnect. Grounded on the teacher's
//! `ClientConnection::read_loop` length/payload reassembly.

use std::sync::Arc;

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::session::packet::finish_packet;
use crate::session::transitions;
use crate::shared::Shared;
use crate::wire::record::{
    ConnectResponse, ReplyHeader, WatchEventState, WatcherEvent, AUTH_XID, NOTIFICATION_XID,
    PING_XID,
};

/// `reader` is generic rather than the concrete `OwnedReadHalf` so the
/// frame-reassembly logic can be driven by an in-memory stream in tests
/// (spec.md §8's "split into 1-byte chunks still reassembles" case).
pub(crate) async fn run(shared: Arc<Shared>, mut reader: impl AsyncRead + Unpin, server_addr: String) {
    let mut initialized = false;
    let outcome = receive_loop(&shared, &mut reader, &mut initialized, &server_addr).await;

    if let Err(e) = outcome {
        tracing::warn!(server = %server_addr, session_id = %shared.core.hex_session_id(), error = %e, "receive path ended");
    }
    transitions::enter_not_connected(&shared);
    shared.outgoing.wake_sender();
}

async fn receive_loop(
    shared: &Arc<Shared>,
    reader: &mut (impl AsyncRead + Unpin),
    initialized: &mut bool,
    server_addr: &str,
) -> Result<()> {
    loop {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                anyhow::bail!("server closed the connection");
            }
            Err(e) => return Err(e).context("reading frame length"),
        }

        let len = i32::from_be_bytes(len_buf);
        if len < 0 || (len as u32) > shared.cfg.packet_len_max {
            anyhow::bail!(
                "frame length {len} outside [0, {}]",
                shared.cfg.packet_len_max
            );
        }
        let len = len as usize;
        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await.context("reading frame payload")?;
        shared.recv_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let mut payload = Bytes::from(payload);

        if !*initialized {
            handle_connect_response(shared, &mut payload, server_addr).await?;
            *initialized = true;
        } else {
            handle_response(shared, &mut payload).await?;
        }
    }
}

async fn handle_connect_response(shared: &Arc<Shared>, payload: &mut Bytes, server_addr: &str) -> Result<()> {
    let resp = ConnectResponse::decode(payload).context("decoding ConnectResponse")?;

    if resp.timeout_ms <= 0 {
        tracing::warn!(session_id = %shared.core.hex_session_id(), "negotiated timeout <= 0, session expired at handshake");
        transitions::enter_expired(shared);
        anyhow::bail!("session expired during handshake");
    }

    shared.core.set_negotiated(resp.timeout_ms, resp.session_id, resp.passwd.clone());
    transitions::enter_connected(shared);
    tracing::info!(
        session_id = %shared.core.hex_session_id(),
        server = %server_addr,
        timeout_ms = resp.timeout_ms,
        "session established"
    );
    Ok(())
}

async fn handle_response(shared: &Arc<Shared>, payload: &mut Bytes) -> Result<()> {
    let header = ReplyHeader::decode(payload).context("decoding ReplyHeader")?;

    match header.xid {
        PING_XID => {
            tracing::debug!(session_id = %shared.core.hex_session_id(), "pong received");
            Ok(())
        }
        AUTH_XID => {
            if header.err != 0 {
                tracing::warn!(err = header.err, session_id = %shared.core.hex_session_id(), "authentication rejected");
                transitions::enter_auth_failed(shared);
                anyhow::bail!("authentication rejected by server");
            }
            tracing::debug!(session_id = %shared.core.hex_session_id(), "authentication acknowledged");
            Ok(())
        }
        NOTIFICATION_XID => {
            let event = WatcherEvent::decode(payload).context("decoding WatcherEvent")?;
            let path = strip_chroot(&shared.cfg.chroot, &event.path);
            let state = WatchEventState::from_wire(event.state).context("decoding watcher event state")?;
            shared.event_sink.queue_event(crate::session::events::WatchedEvent {
                state,
                event_type: event.event_type,
                path: Some(path),
            });
            Ok(())
        }
        xid => {
            let front = shared
                .pending
                .pop_front()
                .await
                .ok_or_else(|| anyhow::anyhow!("reply xid={xid} arrived with an empty pending queue"))?;

            if front.xid() != Some(xid) {
                crate::session::packet::conn_loss_packet(&front, crate::session::state::SessionState::NotConnected);
                anyhow::bail!(
                    "pending queue xid mismatch: expected {:?}, got {xid}",
                    front.xid()
                );
            }

            if header.zxid > 0 {
                shared.core.bump_last_zxid(header.zxid);
            }
            if header.err == 0 {
                if let Some(sink) = front.response_sink() {
                    sink.accept(payload).context("response sink rejected payload")?;
                }
            }
            finish_packet(&front, header);
            Ok(())
        }
    }
}

/// Per spec.md §4.6: exact match strips to `/`, otherwise the prefix is
/// removed; an unrelated path (shouldn't happen server-side) is passed
/// through unchanged rather than panicking.
fn strip_chroot(chroot: &str, path: &str) -> String {
    if chroot.is_empty() {
        return path.to_string();
    }
    if path == chroot {
        return "/".to_string();
    }
    match path.strip_prefix(chroot) {
        Some(stripped) if stripped.starts_with('/') => stripped.to_string(),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chroot_strip_exact_match_yields_root() {
        assert_eq!(strip_chroot("/app/a", "/app/a"), "/");
    }

    #[test]
    fn chroot_strip_suffix() {
        assert_eq!(strip_chroot("/app/a", "/app/a/nodes/1"), "/nodes/1");
    }

    #[test]
    fn chroot_strip_noop_when_unconfigured() {
        assert_eq!(strip_chroot("", "/nodes/1"), "/nodes/1");
    }

    #[test]
    fn chroot_strip_passes_through_unrelated_path() {
        assert_eq!(strip_chroot("/app/a", "/other/path"), "/other/path");
    }

    fn test_shared() -> Arc<Shared> {
        use crate::cfg::EngineConfig;
        use crate::session::SimpleWatcherRegistry;
        use crate::shared::EventQueueHandle;

        let cfg = EngineConfig {
            server_addrs: vec!["127.0.0.1:0".to_string()],
            ..EngineConfig::default()
        };
        let (event_sink, _events_rx) = EventQueueHandle::new();
        Shared::new(cfg, event_sink, Arc::new(SimpleWatcherRegistry::new()))
    }

    fn framed(body: &bytes::BytesMut) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + body.len());
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.extend_from_slice(body);
        out
    }

    /// Drives the whole frame-reassembly + handshake + reply-routing path
    /// through a stream that only ever yields one byte per read, per
    /// spec.md §8's split-read boundary case.
    #[tokio::test]
    async fn reassembles_frames_split_into_single_byte_reads() {
        use crate::wire::record::ConnectResponse;
        use tokio::io::AsyncWriteExt;

        let shared = test_shared();

        let connect_resp = ConnectResponse {
            protocol_version: 0,
            timeout_ms: 20_000,
            session_id: 0x55,
            passwd: Bytes::from_static(b"0123456789abcdef"),
        };
        let mut body = bytes::BytesMut::new();
        connect_resp.encode(&mut body);
        let mut wire_bytes = framed(&body);

        let ping_reply = ReplyHeader { xid: PING_XID, zxid: 0, err: 0 };
        let mut ping_body = bytes::BytesMut::new();
        ping_reply.encode(&mut ping_body);
        wire_bytes.extend(framed(&ping_body));

        let (mut client_side, server_side) = tokio::io::duplex(4096);
        let writer = tokio::spawn(async move {
            for byte in wire_bytes {
                client_side.write_all(&[byte]).await.expect("write single byte");
            }
        });

        let mut initialized = false;
        let mut server_side = server_side;
        // The stream ends (duplex closes) right after the two frames, so
        // the loop is expected to end with an UnexpectedEof-flavored error.
        let result = receive_loop(&shared, &mut server_side, &mut initialized, "test").await;
        writer.await.expect("writer task panicked");

        assert!(initialized);
        assert_eq!(shared.core.session_id(), 0x55);
        assert_eq!(shared.state.get(), crate::session::state::SessionState::Connected);
        assert!(result.is_err());
    }
}
