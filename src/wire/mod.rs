// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Length-prefixed framing and Jute-style record encoding.

pub mod jute;
pub mod record;

pub use record::{
    AuthPacket, ConnectRequest, ConnectResponse, EventType, RequestHeader, ReplyHeader,
    SetWatches, WatchEventState, WatcherEvent, AUTH_XID, NOTIFICATION_XID, OP_AUTH,
    OP_CLOSE_SESSION, OP_NOTIFICATION, OP_PING, OP_SET_WATCHES, PING_XID, SET_WATCHES_XID,
};
