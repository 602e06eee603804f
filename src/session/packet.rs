// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The unit of work flowing through C2/C3 (spec.md §3 `Packet`, §4.8
//! finalization).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::KeeperError;
use crate::session::state::SessionState;
use crate::session::watcher::{ResponseSink, WatchRegistration};
use crate::wire::record::{ReplyHeader, RequestHeader};

/// A packet that has been handed its final reply header exactly once.
pub struct Packet {
    pub header: Option<RequestHeader>,
    pub client_path: Option<String>,
    pub server_path: Option<String>,
    pub serialized_bytes: Bytes,
    watch_registration: Option<std::sync::Arc<dyn WatchRegistration>>,
    response_sink: Option<std::sync::Arc<dyn ResponseSink>>,
    reply_header: Mutex<Option<ReplyHeader>>,
    finished: AtomicBool,
    done_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("header", &self.header)
            .field("client_path", &self.client_path)
            .field("len", &self.serialized_bytes.len())
            .field("finished", &self.finished.load(Ordering::SeqCst))
            .finish()
    }
}

impl Packet {
    /// A packet submitted through the public API: carries a done-channel so
    /// the caller can `await` its [`PacketHandle`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        header: Option<RequestHeader>,
        serialized_bytes: Bytes,
        client_path: Option<String>,
        server_path: Option<String>,
        watch_registration: Option<std::sync::Arc<dyn WatchRegistration>>,
        response_sink: Option<std::sync::Arc<dyn ResponseSink>>,
    ) -> (std::sync::Arc<Self>, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let packet = std::sync::Arc::new(Self {
            header,
            client_path,
            server_path,
            serialized_bytes,
            watch_registration,
            response_sink,
            reply_header: Mutex::new(None),
            finished: AtomicBool::new(false),
            done_tx: Mutex::new(Some(tx)),
        });
        (packet, rx)
    }

    /// A packet this crate generates and sends internally (connect, auth,
    /// ping, set-watches): no caller is waiting on it.
    pub fn internal(header: Option<RequestHeader>, serialized_bytes: Bytes) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            header,
            client_path: None,
            server_path: None,
            serialized_bytes,
            watch_registration: None,
            response_sink: None,
            reply_header: Mutex::new(None),
            finished: AtomicBool::new(false),
            done_tx: Mutex::new(None),
        })
    }

    /// Whether this packet occupies a slot in the pending (C3) queue: any
    /// packet carrying a header whose op type is not ping/auth.
    pub fn wants_pending_tracking(&self) -> bool {
        match self.header {
            None => false,
            Some(h) => h.op_type != crate::wire::record::OP_PING && h.op_type != crate::wire::record::OP_AUTH,
        }
    }

    pub fn xid(&self) -> Option<i32> {
        self.header.map(|h| h.xid)
    }

    pub fn response_sink(&self) -> Option<&std::sync::Arc<dyn ResponseSink>> {
        self.response_sink.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Sets the reply header exactly once, notifies the watch registration (if
/// any) of the outcome, and wakes the waiting [`PacketHandle`].
pub fn finish_packet(packet: &std::sync::Arc<Packet>, header: ReplyHeader) {
    if packet.finished.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Some(reg) = &packet.watch_registration {
        reg.register(header.err);
    }
    *packet.reply_header.lock().expect("reply header mutex poisoned") = Some(header);
    if let Some(tx) = packet.done_tx.lock().expect("done_tx mutex poisoned").take() {
        let _ = tx.send(());
    }
}

/// Finalizes a packet as connection-loss (or the terminal-state-specific
/// variant), per spec.md §4.8's `ConLossPacket`.
pub fn conn_loss_packet(packet: &std::sync::Arc<Packet>, state: SessionState) {
    let err = match state {
        SessionState::AuthFailed => KeeperError::AuthFailed,
        SessionState::Closed => KeeperError::SessionExpired,
        _ => KeeperError::ConnectionLoss,
    };
    finish_packet(
        packet,
        ReplyHeader {
            xid: packet.xid().unwrap_or(0),
            zxid: 0,
            err: err.code(),
        },
    )
}

/// Caller-visible handle returned by `queue_packet`.
pub struct PacketHandle {
    packet: std::sync::Arc<Packet>,
    done_rx: oneshot::Receiver<()>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReplyOutcome {
    pub xid: i32,
    pub zxid: i64,
    pub err: KeeperError,
}

impl PacketHandle {
    pub fn new(packet: std::sync::Arc<Packet>, done_rx: oneshot::Receiver<()>) -> Self {
        Self { packet, done_rx }
    }

    pub fn xid(&self) -> Option<i32> {
        self.packet.xid()
    }

    /// Waits for the packet to be finalized, then returns its outcome.
    /// If the done sender is ever dropped without firing (should not
    /// happen; `finish_packet` always sends), surfaces as connection loss.
    pub async fn wait(mut self) -> ReplyOutcome {
        let _ = (&mut self.done_rx).await;
        let header = *self
            .packet
            .reply_header
            .lock()
            .expect("reply header mutex poisoned");
        match header {
            Some(h) => ReplyOutcome {
                xid: h.xid,
                zxid: h.zxid,
                err: KeeperError::from_code(h.err),
            },
            None => ReplyOutcome {
                xid: self.packet.xid().unwrap_or(0),
                zxid: 0,
                err: KeeperError::ConnectionLoss,
            },
        }
    }
}

/// Monotonically increasing xid counter starting at 1; wraps back to 1
/// rather than spilling into the reserved negative range.
#[derive(Debug)]
pub struct XidGenerator(AtomicI32);

impl XidGenerator {
    pub fn new() -> Self {
        Self(AtomicI32::new(1))
    }

    pub fn next(&self) -> i32 {
        let prev = self.0.fetch_add(1, Ordering::SeqCst);
        if prev <= 0 {
            self.0.store(2, Ordering::SeqCst);
            return 1;
        }
        prev
    }
}

impl Default for XidGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xid_generator_is_monotonic_and_positive() {
        let gen = XidGenerator::new();
        let a = gen.next();
        let b = gen.next();
        assert!(a > 0 && b > a);
    }

    #[tokio::test]
    async fn finish_packet_is_idempotent_and_wakes_handle() {
        let (packet, rx) = Packet::new(
            Some(RequestHeader { xid: 7, op_type: 1 }),
            Bytes::new(),
            None,
            None,
            None,
            None,
        );
        let handle = PacketHandle::new(packet.clone(), rx);
        finish_packet(&packet, ReplyHeader { xid: 7, zxid: 5, err: 0 });
        finish_packet(&packet, ReplyHeader { xid: 7, zxid: 99, err: -4 });

        let outcome = handle.wait().await;
        assert_eq!(outcome.zxid, 5);
        assert_eq!(outcome.err, KeeperError::Ok);
    }

    #[tokio::test]
    async fn conn_loss_maps_terminal_states_to_distinct_errors() {
        let (packet, rx) = Packet::new(
            Some(RequestHeader { xid: 3, op_type: 1 }),
            Bytes::new(),
            None,
            None,
            None,
            None,
        );
        let handle = PacketHandle::new(packet.clone(), rx);
        conn_loss_packet(&packet, SessionState::Closed);
        let outcome = handle.wait().await;
        assert_eq!(outcome.err, KeeperError::SessionExpired);
    }
}
