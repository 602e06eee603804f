// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Session identity and negotiated parameters (spec.md §3 `Session`).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;

#[derive(Debug)]
pub struct SessionCore {
    session_id: AtomicI64,
    password: Mutex<Bytes>,
    negotiated_timeout_ms: AtomicI64,
    last_zxid: AtomicI64,
}

impl SessionCore {
    pub fn new(requested_timeout_ms: i64) -> Self {
        Self {
            session_id: AtomicI64::new(0),
            password: Mutex::new(Bytes::new()),
            negotiated_timeout_ms: AtomicI64::new(requested_timeout_ms),
            last_zxid: AtomicI64::new(0),
        }
    }

    pub fn session_id(&self) -> i64 {
        self.session_id.load(Ordering::SeqCst)
    }

    pub fn password(&self) -> Bytes {
        self.password.lock().expect("session password mutex poisoned").clone()
    }

    pub fn negotiated_timeout_ms(&self) -> i64 {
        self.negotiated_timeout_ms.load(Ordering::SeqCst)
    }

    pub fn last_zxid(&self) -> i64 {
        self.last_zxid.load(Ordering::SeqCst)
    }

    /// zxid is monotonically non-decreasing; a stale or out-of-order reply
    /// must never move it backwards.
    pub fn bump_last_zxid(&self, zxid: i64) {
        self.last_zxid.fetch_max(zxid, Ordering::SeqCst);
    }

    pub fn set_negotiated(&self, timeout_ms: i32, session_id: i64, password: Bytes) {
        self.negotiated_timeout_ms.store(timeout_ms as i64, Ordering::SeqCst);
        self.session_id.store(session_id, Ordering::SeqCst);
        *self.password.lock().expect("session password mutex poisoned") = password;
    }

    pub fn hex_session_id(&self) -> String {
        format!("0x{:x}", self.session_id())
    }
}
