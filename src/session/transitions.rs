// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Centralizes the "every transition into/out of CONNECTED enqueues a
//! session-state event" invariant (spec.md §4.1/§8) so C4 and C5 cannot
//! apply the transition without also emitting the event.

use crate::session::events::WatchedEvent;
use crate::session::state::SessionState;
use crate::shared::Shared;
use crate::wire::record::WatchEventState;

pub fn enter_connecting(shared: &Shared) -> bool {
    shared.state.set(SessionState::Connecting)
}

pub fn enter_connected(shared: &Shared) {
    if shared.state.set(SessionState::Connected) {
        shared
            .event_sink
            .queue_event(WatchedEvent::session_state(WatchEventState::SyncConnected));
    }
}

/// Only enqueues `Disconnected` when the prior state was actually
/// `Connected` (invariant 4 of spec.md §8) — an error while still
/// `Connecting` never reached `Connected`, so no such transition occurred.
pub fn enter_not_connected(shared: &Shared) {
    let prev = shared.state.get();
    if prev == SessionState::Connected {
        shared.state.set(SessionState::NotConnected);
        shared
            .event_sink
            .queue_event(WatchedEvent::session_state(WatchEventState::Disconnected));
    } else if prev.is_alive() {
        shared.state.set(SessionState::NotConnected);
    }
}

pub fn enter_expired(shared: &Shared) {
    shared
        .event_sink
        .queue_event(WatchedEvent::session_state(WatchEventState::Expired));
    shared.state.set(SessionState::Closed);
}

pub fn enter_auth_failed(shared: &Shared) {
    shared.state.set(SessionState::AuthFailed);
    shared
        .event_sink
        .queue_event(WatchedEvent::session_state(WatchEventState::AuthFailed));
}
