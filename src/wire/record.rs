// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Handshake and notification records: the only operation-specific wire
//! shapes this crate needs to know about. Everything else (the body of a
//! normal request/response) is opaque `Bytes` handed in by the caller.

use bytes::{Bytes, BytesMut};

use crate::error::WireError;
use crate::wire::jute::*;

/// Reserved xids, never handed out by the xid counter.
pub const NOTIFICATION_XID: i32 = -1;
pub const PING_XID: i32 = -2;
pub const AUTH_XID: i32 = -4;
pub const SET_WATCHES_XID: i32 = -8;

pub const OP_NOTIFICATION: i32 = 0;
pub const OP_CLOSE_SESSION: i32 = -11;
pub const OP_PING: i32 = 11;
pub const OP_AUTH: i32 = 100;
pub const OP_SET_WATCHES: i32 = 101;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub xid: i32,
    pub op_type: i32,
}

impl RequestHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, self.xid);
        put_i32(buf, self.op_type);
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            xid: get_i32(buf)?,
            op_type: get_i32(buf)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub xid: i32,
    pub zxid: i64,
    pub err: i32,
}

impl ReplyHeader {
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, self.xid);
        put_i64(buf, self.zxid);
        put_i32(buf, self.err);
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            xid: get_i32(buf)?,
            zxid: get_i64(buf)?,
            err: get_i32(buf)?,
        })
    }
}

/// No read-only flag: this engine only ever requests a read-write session.
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub protocol_version: i32,
    pub last_zxid_seen: i64,
    pub timeout_ms: i32,
    pub session_id: i64,
    pub passwd: Bytes,
}

impl ConnectRequest {
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, self.protocol_version);
        put_i64(buf, self.last_zxid_seen);
        put_i32(buf, self.timeout_ms);
        put_i64(buf, self.session_id);
        put_bytes(buf, Some(&self.passwd));
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            protocol_version: get_i32(buf)?,
            last_zxid_seen: get_i64(buf)?,
            timeout_ms: get_i32(buf)?,
            session_id: get_i64(buf)?,
            passwd: get_bytes(buf)?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConnectResponse {
    pub protocol_version: i32,
    pub timeout_ms: i32,
    pub session_id: i64,
    pub passwd: Bytes,
}

impl ConnectResponse {
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, self.protocol_version);
        put_i32(buf, self.timeout_ms);
        put_i64(buf, self.session_id);
        put_bytes(buf, Some(&self.passwd));
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            protocol_version: get_i32(buf)?,
            timeout_ms: get_i32(buf)?,
            session_id: get_i64(buf)?,
            passwd: get_bytes(buf)?.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AuthPacket {
    pub scheme: String,
    pub auth: Bytes,
}

impl AuthPacket {
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, 0); // `type`, always 0 on the wire
        put_string(buf, Some(&self.scheme));
        put_bytes(buf, Some(&self.auth));
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        let _type = get_i32(buf)?;
        let scheme = get_string(buf)?.ok_or(WireError::UnexpectedNull)?;
        let auth = get_bytes(buf)?.unwrap_or_default();
        Ok(Self { scheme, auth })
    }
}

#[derive(Debug, Clone)]
pub struct SetWatches {
    pub relative_zxid: i64,
    pub data_watches: Vec<String>,
    pub exist_watches: Vec<String>,
    pub child_watches: Vec<String>,
}

impl SetWatches {
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i64(buf, self.relative_zxid);
        put_vec_str(buf, &self.data_watches);
        put_vec_str(buf, &self.exist_watches);
        put_vec_str(buf, &self.child_watches);
    }

    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            relative_zxid: get_i64(buf)?,
            data_watches: get_vec_str(buf)?,
            exist_watches: get_vec_str(buf)?,
            child_watches: get_vec_str(buf)?,
        })
    }
}

/// The `type` a `WatcherEvent`/`WatchedEvent` carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    None,
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    NodeChildrenChanged,
}

impl EventType {
    pub fn to_wire(self) -> i32 {
        match self {
            EventType::None => -1,
            EventType::NodeCreated => 1,
            EventType::NodeDeleted => 2,
            EventType::NodeDataChanged => 3,
            EventType::NodeChildrenChanged => 4,
        }
    }

    pub fn from_wire(code: i32) -> Result<Self, WireError> {
        match code {
            -1 => Ok(EventType::None),
            1 => Ok(EventType::NodeCreated),
            2 => Ok(EventType::NodeDeleted),
            3 => Ok(EventType::NodeDataChanged),
            4 => Ok(EventType::NodeChildrenChanged),
            other => Err(WireError::UnknownEventType(other)),
        }
    }
}

/// The connection-level state a watched event carries, distinct from the
/// engine's internal [`crate::session::state::SessionState`]: this is the
/// value watchers observe, and it has a value (`Expired`) that the internal
/// state machine never parks in (it moves straight to `Closed`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventState {
    Disconnected,
    SyncConnected,
    AuthFailed,
    Expired,
}

impl WatchEventState {
    pub fn to_wire(self) -> i32 {
        match self {
            WatchEventState::Disconnected => 0,
            WatchEventState::SyncConnected => 3,
            WatchEventState::AuthFailed => 4,
            WatchEventState::Expired => -112,
        }
    }

    pub fn from_wire(code: i32) -> Result<Self, WireError> {
        match code {
            0 => Ok(WatchEventState::Disconnected),
            3 => Ok(WatchEventState::SyncConnected),
            4 => Ok(WatchEventState::AuthFailed),
            -112 => Ok(WatchEventState::Expired),
            other => Err(WireError::UnknownKeeperState(other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WatcherEvent {
    pub event_type: EventType,
    pub state: i32,
    pub path: String,
}

impl WatcherEvent {
    pub fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        let event_type = EventType::from_wire(get_i32(buf)?)?;
        let state = get_i32(buf)?;
        let path = get_string(buf)?.unwrap_or_default();
        Ok(Self {
            event_type,
            state,
            path,
        })
    }

    /// Servers never need to *decode* a `WatcherEvent` in this crate's own
    /// production path, but a server stub in tests does need to encode one.
    pub fn encode(&self, buf: &mut BytesMut) {
        put_i32(buf, self.event_type.to_wire());
        put_i32(buf, self.state);
        put_string(buf, Some(&self.path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_request_round_trips() {
        let req = ConnectRequest {
            protocol_version: 0,
            last_zxid_seen: 42,
            timeout_ms: 20_000,
            session_id: 0,
            passwd: Bytes::from_static(&[0; 16]),
        };
        let mut buf = BytesMut::new();
        req.encode(&mut buf);
        let mut frozen = buf.freeze();
        let decoded = ConnectRequest::decode(&mut frozen).unwrap();
        assert_eq!(decoded.last_zxid_seen, 42);
        assert_eq!(decoded.timeout_ms, 20_000);
        assert_eq!(decoded.passwd.len(), 16);
    }

    #[test]
    fn watcher_event_round_trips() {
        let event = WatcherEvent {
            event_type: EventType::NodeDataChanged,
            state: WatchEventState::SyncConnected.to_wire(),
            path: "/foo/bar".to_string(),
        };
        let mut buf = BytesMut::new();
        event.encode(&mut buf);
        let mut frozen = buf.freeze();
        let decoded = WatcherEvent::decode(&mut frozen).unwrap();
        assert_eq!(decoded.event_type, EventType::NodeDataChanged);
        assert_eq!(decoded.path, "/foo/bar");
        assert_eq!(
            WatchEventState::from_wire(decoded.state).unwrap(),
            WatchEventState::SyncConnected
        );
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(matches!(
            EventType::from_wire(99),
            Err(WireError::UnknownEventType(99))
        ));
    }
}
