// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod core;
pub mod events;
pub mod packet;
pub mod state;
pub mod transitions;
pub mod watcher;

pub use core::SessionCore;
pub use events::WatchedEvent;
pub use packet::{conn_loss_packet, finish_packet, Packet, PacketHandle, ReplyOutcome, XidGenerator};
pub use state::{SessionState, StateCell};
pub use watcher::{ResponseSink, SimpleWatcherRegistry, WatchRegistration, Watcher, WatcherRegistry};
