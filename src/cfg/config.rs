// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Engine configuration, grounded on the teacher's `cfg::config::Config`
//! (serde + `validate_and_normalize`), trimmed to the knobs the session
//! engine itself consumes.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PACKET_LEN_MAX: u32 = 4 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthCredential {
    pub scheme: String,
    pub auth: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Tried round-robin, per spec.md §4.4.
    pub server_addrs: Vec<String>,
    pub session_timeout_ms: i64,
    #[serde(default = "default_packet_len_max")]
    pub packet_len_max: u32,
    #[serde(default)]
    pub auth_credentials: Vec<AuthCredential>,
    /// Empty string means "no chroot".
    #[serde(default)]
    pub chroot: String,
    #[serde(default = "default_true")]
    pub auto_reset_watches: bool,
}

fn default_packet_len_max() -> u32 {
    DEFAULT_PACKET_LEN_MAX
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_addrs: Vec::new(),
            session_timeout_ms: 30_000,
            packet_len_max: DEFAULT_PACKET_LEN_MAX,
            auth_credentials: Vec::new(),
            chroot: String::new(),
            auto_reset_watches: true,
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("reading config file {:?}", path.as_ref()))?;
        let mut cfg: Self = serde_yaml::from_str(&raw).context("parsing engine config yaml")?;
        cfg.validate_and_normalize()?;
        Ok(cfg)
    }

    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(!self.server_addrs.is_empty(), "server_addrs must not be empty");
        ensure!(self.packet_len_max > 0, "packet_len_max must be > 0");
        ensure!(self.session_timeout_ms > 0, "session_timeout_ms must be > 0");
        if self.chroot == "/" {
            self.chroot.clear();
        }
        if !self.chroot.is_empty() && !self.chroot.starts_with('/') {
            self.chroot = format!("/{}", self.chroot);
        }
        if self.chroot.ends_with('/') {
            self.chroot.pop();
        }
        Ok(())
    }

    /// Per spec.md §4.2, the ping interval is nominally half the negotiated
    /// timeout, clamped into the `timeout/3..timeout/2` band.
    pub fn ping_interval_ms(&self, negotiated_timeout_ms: i64) -> i64 {
        let nominal = negotiated_timeout_ms / 2;
        nominal.clamp(negotiated_timeout_ms / 3, negotiated_timeout_ms / 2).max(1)
    }

    /// Per spec.md §5, the per-server connect timeout shrinks as the server
    /// list grows so a full reconnect cycle stays bounded by the session
    /// timeout.
    pub fn connect_timeout_ms(&self) -> i64 {
        (self.session_timeout_ms / self.server_addrs.len().max(1) as i64).max(1)
    }
}
