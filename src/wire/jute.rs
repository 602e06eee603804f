// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Primitive encode/decode helpers for the length-prefixed, big-endian
//! record encoding used by the handshake and notification records.
//!
//! `bytes::Buf`/`BufMut` already default to big-endian for the fixed-width
//! getters/putters used here, so no separate endianness wrapper is needed.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::WireError;

fn ensure_remaining(buf: &Bytes, n: usize) -> Result<(), WireError> {
    if buf.remaining() < n {
        Err(WireError::UnexpectedEof)
    } else {
        Ok(())
    }
}

pub fn put_bool(buf: &mut BytesMut, v: bool) {
    buf.put_u8(u8::from(v));
}

pub fn get_bool(buf: &mut Bytes) -> Result<bool, WireError> {
    ensure_remaining(buf, 1)?;
    Ok(buf.get_u8() != 0)
}

pub fn put_i32(buf: &mut BytesMut, v: i32) {
    buf.put_i32(v);
}

pub fn get_i32(buf: &mut Bytes) -> Result<i32, WireError> {
    ensure_remaining(buf, 4)?;
    Ok(buf.get_i32())
}

pub fn put_i64(buf: &mut BytesMut, v: i64) {
    buf.put_i64(v);
}

pub fn get_i64(buf: &mut Bytes) -> Result<i64, WireError> {
    ensure_remaining(buf, 8)?;
    Ok(buf.get_i64())
}

/// A `-1` length prefix encodes a null byte array; any other negative
/// length is malformed.
pub fn put_bytes(buf: &mut BytesMut, data: Option<&[u8]>) {
    match data {
        None => buf.put_i32(-1),
        Some(d) => {
            buf.put_i32(d.len() as i32);
            buf.put_slice(d);
        }
    }
}

pub fn get_bytes(buf: &mut Bytes) -> Result<Option<Bytes>, WireError> {
    let len = get_i32(buf)?;
    if len == -1 {
        return Ok(None);
    }
    if len < -1 {
        return Err(WireError::NegativeLength(len));
    }
    let len = len as usize;
    ensure_remaining(buf, len)?;
    Ok(Some(buf.copy_to_bytes(len)))
}

pub fn put_string(buf: &mut BytesMut, s: Option<&str>) {
    put_bytes(buf, s.map(str::as_bytes));
}

pub fn get_string(buf: &mut Bytes) -> Result<Option<String>, WireError> {
    match get_bytes(buf)? {
        None => Ok(None),
        Some(raw) => String::from_utf8(raw.to_vec())
            .map(Some)
            .map_err(|_| WireError::InvalidUtf8),
    }
}

pub fn put_vec_str(buf: &mut BytesMut, items: &[String]) {
    buf.put_i32(items.len() as i32);
    for item in items {
        put_string(buf, Some(item));
    }
}

pub fn get_vec_str(buf: &mut Bytes) -> Result<Vec<String>, WireError> {
    let count = get_i32(buf)?;
    if count < 0 {
        return Err(WireError::NegativeLength(count));
    }
    let mut out = Vec::new();
    for _ in 0..count {
        let item = get_string(buf)?.ok_or(WireError::UnexpectedNull)?;
        out.push(item);
    }
    Ok(out)
}
