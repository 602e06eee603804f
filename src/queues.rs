// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! C2 (outgoing) and C3 (pending) queues (spec.md §3).
//!
//! C2 pairs an unbounded mpsc channel with a `Notify` used to wake the send
//! loop without ever enqueuing a sentinel value (the null-sentinel smell
//! spec.md §9 calls out on the source this was translated from).

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex, Notify};

use crate::session::packet::Packet;

pub enum Taken {
    Packet(Arc<Packet>),
    Timeout,
    Woken,
    Closed,
}

pub struct OutgoingQueue {
    tx: mpsc::UnboundedSender<Arc<Packet>>,
    rx: Mutex<mpsc::UnboundedReceiver<Arc<Packet>>>,
    wake: Notify,
}

impl OutgoingQueue {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            tx,
            rx: Mutex::new(rx),
            wake: Notify::new(),
        })
    }

    pub fn push(&self, packet: Arc<Packet>) {
        // An unbounded sender only fails once every receiver is gone, which
        // only happens after the engine has been disposed.
        let _ = self.tx.send(packet);
    }

    pub fn wake_sender(&self) {
        self.wake.notify_one();
    }

    /// Drains whatever happens to be queued right now, without blocking.
    /// Used by `Cleanup` to finalize still-queued packets as connection-loss.
    pub fn try_drain(&self) -> Vec<Arc<Packet>> {
        let mut rx = self.rx.try_lock().expect("outgoing queue receiver locked by sender loop");
        let mut out = Vec::new();
        while let Ok(p) = rx.try_recv() {
            out.push(p);
        }
        out
    }

    /// Blocks (the request producer's only suspension point, per spec.md
    /// §4.2) until a packet is available, the wake signal fires, the ping
    /// interval elapses, or the channel is closed.
    pub async fn take_with_timeout(&self, dur: Duration) -> Taken {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            _ = self.wake.notified() => Taken::Woken,
            res = tokio::time::timeout(dur, rx.recv()) => match res {
                Ok(Some(p)) => Taken::Packet(p),
                Ok(None) => Taken::Closed,
                Err(_) => Taken::Timeout,
            },
        }
    }
}

/// C3: strictly FIFO, single producer (C4) and single consumer (C5).
pub struct PendingQueue {
    inner: Mutex<VecDeque<Arc<Packet>>>,
}

impl PendingQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(VecDeque::new()),
        })
    }

    pub async fn push_back(&self, packet: Arc<Packet>) {
        self.inner.lock().await.push_back(packet);
    }

    pub async fn pop_front(&self) -> Option<Arc<Packet>> {
        self.inner.lock().await.pop_front()
    }

    /// Used only by C4 to undo its own just-pushed packet when the write
    /// that was supposed to follow it fails; safe because only C4 ever
    /// touches the back of the queue.
    pub async fn remove_if_tail(&self, packet: &Arc<Packet>) -> bool {
        let mut guard = self.inner.lock().await;
        if matches!(guard.back(), Some(back) if Arc::ptr_eq(back, packet)) {
            guard.pop_back();
            true
        } else {
            false
        }
    }

    pub async fn drain_all(&self) -> Vec<Arc<Packet>> {
        self.inner.lock().await.drain(..).collect()
    }
}
