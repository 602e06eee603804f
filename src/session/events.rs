// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The event shape handed to watchers (spec.md §3/§4.7).

use crate::wire::record::{EventType, WatchEventState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedEvent {
    pub state: WatchEventState,
    pub event_type: EventType,
    pub path: Option<String>,
}

impl WatchedEvent {
    pub fn session_state(state: WatchEventState) -> Self {
        Self {
            state,
            event_type: EventType::None,
            path: None,
        }
    }
}
