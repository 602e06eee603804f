// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! C4: the request producer (spec.md §4.2/§4.4), realized as one tokio
//! task — the crate's single "send thread". Grounded on the teacher's
//! `ClientConnection::connect`/`write` and its reconnect-adjacent helpers in
//! `client::pool_sessions::Pool`.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use bytes::{Bytes, BytesMut};
use rand::Rng;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::queues::Taken;
use crate::session::packet::{conn_loss_packet, Packet};
use crate::session::state::SessionState;
use crate::session::transitions;
use crate::shared::Shared;
use crate::wire::record::{
    AuthPacket, ConnectRequest, RequestHeader, SetWatches, AUTH_XID, OP_AUTH, OP_PING,
    OP_SET_WATCHES, PING_XID, SET_WATCHES_XID,
};

const RECONNECT_JITTER_MAX_MS: u64 = 50;
const FULL_CYCLE_BACKOFF: Duration = Duration::from_secs(1);

/// Runs until the shared cancellation token fires or the session reaches a
/// terminal state.
pub async fn run(shared: Arc<Shared>) {
    let mut next_addr_to_try: usize = 0;
    let mut last_connect_index: Option<usize> = None;
    let mut first_attempt = true;
    let mut writer: Option<OwnedWriteHalf> = None;
    let mut receiver_task: Option<JoinHandle<()>> = None;
    let mut last_ping_sent = Instant::now();

    loop {
        if shared.cancel.is_cancelled() {
            cleanup(&shared, &mut writer, &mut receiver_task).await;
            return;
        }

        let state = shared.state.get();
        if state.is_terminal() {
            cleanup(&shared, &mut writer, &mut receiver_task).await;
            return;
        }

        // Per spec.md §4.2 step 1: reconnect only when there is no socket or
        // the session is disconnected. `Connecting` means `reconnect()` has
        // already handed off to a freshly spawned receiver that just hasn't
        // parsed the `ConnectResponse` yet — re-entering `reconnect()` here
        // would tear that socket down before it ever got used.
        if writer.is_none() || state == SessionState::NotConnected {
            if shared.is_closing() {
                cleanup(&shared, &mut writer, &mut receiver_task).await;
                return;
            }
            match reconnect(
                &shared,
                &mut next_addr_to_try,
                &mut last_connect_index,
                first_attempt,
                &mut writer,
                &mut receiver_task,
            )
            .await
            {
                Ok(()) => {
                    first_attempt = false;
                    last_ping_sent = Instant::now();
                }
                Err(e) => {
                    tracing::warn!(error = %e, session_id = %shared.core.hex_session_id(), "reconnect attempt failed");
                    continue;
                }
            }
        }

        let ping_interval = shared.ping_interval();
        let wait_for = ping_interval.saturating_sub(last_ping_sent.elapsed());

        match shared.outgoing.take_with_timeout(wait_for).await {
            Taken::Packet(packet) => {
                let w = writer.as_mut().expect("writer present while state is Connected");
                match do_send(&shared, w, &packet).await {
                    Ok(()) => last_ping_sent = Instant::now(),
                    Err(e) => handle_io_error(&shared, &mut writer, &mut receiver_task, Some(packet), e).await,
                }
            }
            Taken::Timeout => {
                match encode_ping(shared.cfg.packet_len_max) {
                    Ok(framed) => {
                        let ping = Packet::internal(
                            Some(RequestHeader { xid: PING_XID, op_type: OP_PING }),
                            framed,
                        );
                        let w = writer.as_mut().expect("writer present while state is Connected");
                        match do_send(&shared, w, &ping).await {
                            Ok(()) => last_ping_sent = Instant::now(),
                            Err(e) => handle_io_error(&shared, &mut writer, &mut receiver_task, None, e).await,
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to encode ping"),
                }
            }
            Taken::Woken => {
                // The receiver (or a prior write failure) already flipped
                // the state; the next loop iteration reconnects.
            }
            Taken::Closed => {
                cleanup(&shared, &mut writer, &mut receiver_task).await;
                return;
            }
        }
    }
}

async fn do_send(shared: &Shared, writer: &mut OwnedWriteHalf, packet: &Arc<Packet>) -> io::Result<()> {
    let tracked = packet.wants_pending_tracking();
    if tracked {
        shared.pending.push_back(packet.clone()).await;
    }
    match writer.write_all(&packet.serialized_bytes).await {
        Ok(()) => {
            shared.sent_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            Ok(())
        }
        Err(e) => {
            if tracked {
                shared.pending.remove_if_tail(packet).await;
            }
            Err(e)
        }
    }
}

async fn handle_io_error(
    shared: &Arc<Shared>,
    writer: &mut Option<OwnedWriteHalf>,
    receiver_task: &mut Option<JoinHandle<()>>,
    in_flight: Option<Arc<Packet>>,
    err: io::Error,
) {
    tracing::warn!(error = %err, session_id = %shared.core.hex_session_id(), "socket write failed");
    cleanup(shared, writer, receiver_task).await;
    transitions::enter_not_connected(shared);
    if let Some(packet) = in_flight {
        conn_loss_packet(&packet, shared.state.get());
    }
}

/// Closes the current socket (if any), stops its receiver task, and drains
/// C2/C3 finalizing every queued packet as connection-loss.
async fn cleanup(shared: &Shared, writer: &mut Option<OwnedWriteHalf>, receiver_task: &mut Option<JoinHandle<()>>) {
    if let Some(mut w) = writer.take() {
        let _ = w.shutdown().await;
    }
    if let Some(handle) = receiver_task.take() {
        handle.abort();
    }
    let state = shared.state.get();
    for packet in shared.outgoing.try_drain() {
        conn_loss_packet(&packet, state);
    }
    for packet in shared.pending.drain_all().await {
        conn_loss_packet(&packet, state);
    }
}

#[allow(clippy::too_many_arguments)]
async fn reconnect(
    shared: &Arc<Shared>,
    next_addr_to_try: &mut usize,
    last_connect_index: &mut Option<usize>,
    first_attempt: bool,
    writer_slot: &mut Option<OwnedWriteHalf>,
    receiver_slot: &mut Option<JoinHandle<()>>,
) -> Result<()> {
    if !first_attempt {
        let jitter_ms = rand::rng().random_range(0..RECONNECT_JITTER_MAX_MS);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
    }
    if *last_connect_index == Some(*next_addr_to_try) {
        tokio::time::sleep(FULL_CYCLE_BACKOFF).await;
    }

    let used_index = *next_addr_to_try;
    let addr = shared
        .cfg
        .server_addrs
        .get(used_index)
        .context("server_addrs index out of range")?
        .clone();
    *next_addr_to_try = (used_index + 1) % shared.cfg.server_addrs.len();

    if !transitions::enter_connecting(shared) {
        anyhow::bail!("session reached a terminal state, aborting reconnect");
    }

    cleanup(shared, writer_slot, receiver_slot).await;

    let connect_timeout = Duration::from_millis(shared.cfg.connect_timeout_ms() as u64);
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect(&addr))
        .await
        .context("connect timed out")?
        .with_context(|| format!("connecting to {addr}"))?;
    stream.set_nodelay(true).context("setting TCP_NODELAY")?;
    stream.set_linger(None).context("clearing SO_LINGER")?;
    let (reader, mut writer) = stream.into_split();

    let connect_req = ConnectRequest {
        protocol_version: 0,
        last_zxid_seen: shared.core.last_zxid(),
        timeout_ms: shared.cfg.session_timeout_ms as i32,
        session_id: shared.core.session_id(),
        passwd: shared.core.password(),
    };
    let connect_pkt = Packet::internal(None, frame(&encode(&connect_req), shared.cfg.packet_len_max)?);
    do_send(shared, &mut writer, &connect_pkt)
        .await
        .context("writing ConnectRequest")?;
    *last_connect_index = Some(used_index);

    for cred in &shared.cfg.auth_credentials {
        let auth = AuthPacket {
            scheme: cred.scheme.clone(),
            auth: Bytes::from(cred.auth.clone()),
        };
        let header = RequestHeader { xid: AUTH_XID, op_type: OP_AUTH };
        let auth_pkt = Packet::internal(
            Some(header),
            frame(&encode_with_header(&header, &auth), shared.cfg.packet_len_max)?,
        );
        do_send(shared, &mut writer, &auth_pkt)
            .await
            .context("writing AuthPacket")?;
    }

    if shared.cfg.auto_reset_watches {
        let set_watches = SetWatches {
            relative_zxid: shared.core.last_zxid(),
            data_watches: shared.watcher_registry.data_watch_paths(),
            exist_watches: shared.watcher_registry.exist_watch_paths(),
            child_watches: shared.watcher_registry.child_watch_paths(),
        };
        if !set_watches.data_watches.is_empty()
            || !set_watches.exist_watches.is_empty()
            || !set_watches.child_watches.is_empty()
        {
            let header = RequestHeader { xid: SET_WATCHES_XID, op_type: OP_SET_WATCHES };
            let sw_pkt = Packet::internal(
                Some(header),
                frame(&encode_with_header(&header, &set_watches), shared.cfg.packet_len_max)?,
            );
            do_send(shared, &mut writer, &sw_pkt)
                .await
                .context("writing SetWatches")?;
        }
    }

    let shared_for_receiver = shared.clone();
    let addr_for_receiver = addr.clone();
    let handle = tokio::spawn(async move {
        crate::receiver::run(shared_for_receiver, reader, addr_for_receiver).await;
    });

    *writer_slot = Some(writer);
    *receiver_slot = Some(handle);
    tracing::info!(server = %addr, session_id = %shared.core.hex_session_id(), "connection established");
    Ok(())
}

fn encode_ping(packet_len_max: u32) -> Result<Bytes> {
    let header = RequestHeader { xid: PING_XID, op_type: OP_PING };
    let mut buf = BytesMut::new();
    header.encode(&mut buf);
    frame(&buf, packet_len_max)
}

trait Encodable {
    fn encode_body(&self, buf: &mut BytesMut);
}

impl Encodable for ConnectRequest {
    fn encode_body(&self, buf: &mut BytesMut) {
        self.encode(buf);
    }
}
impl Encodable for AuthPacket {
    fn encode_body(&self, buf: &mut BytesMut) {
        self.encode(buf);
    }
}
impl Encodable for SetWatches {
    fn encode_body(&self, buf: &mut BytesMut) {
        self.encode(buf);
    }
}

fn encode(record: &impl Encodable) -> BytesMut {
    let mut buf = BytesMut::new();
    record.encode_body(&mut buf);
    buf
}

/// AuthPacket/SetWatches (unlike ConnectRequest) are preceded by a
/// `RequestHeader` on the wire, so the server's reply can be matched back
/// by its reserved xid.
fn encode_with_header(header: &RequestHeader, record: &impl Encodable) -> BytesMut {
    let mut buf = BytesMut::new();
    header.encode(&mut buf);
    record.encode_body(&mut buf);
    buf
}

/// Prefixes `body` with its big-endian `u32` length, per spec.md §3's
/// framing rule, rejecting bodies above `packet_len_max`.
fn frame(body: &BytesMut, packet_len_max: u32) -> Result<Bytes> {
    anyhow::ensure!(
        (body.len() as u64) <= packet_len_max as u64,
        "encoded body of {} bytes exceeds packet_len_max {packet_len_max}",
        body.len()
    );
    let mut framed = BytesMut::with_capacity(4 + body.len());
    framed.extend_from_slice(&(body.len() as u32).to_be_bytes());
    framed.extend_from_slice(body);
    Ok(framed.freeze())
}
