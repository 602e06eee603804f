// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A minimal in-process ZooKeeper-style server used to drive the literal
//! scenarios from spec.md §8/§9 end to end, grounded on the shape of the
//! teacher's `tests/integration_tests` suite (one helper module, one file
//! per scenario).

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub fn encode_frame(body: &BytesMut) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

pub async fn read_frame(stream: &mut TcpStream) -> anyhow::Result<Bytes> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = i32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(Bytes::from(payload))
}

pub async fn write_frame(stream: &mut TcpStream, body: &BytesMut) -> anyhow::Result<()> {
    stream.write_all(&encode_frame(body)).await?;
    Ok(())
}

/// Binds to an ephemeral localhost port and returns its address without
/// accepting anything yet, so tests can decide exactly when/how to answer.
pub async fn bind_ephemeral() -> anyhow::Result<(String, TcpListener)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?.to_string();
    Ok((addr, listener))
}
