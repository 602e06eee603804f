// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Tracing-subscriber bring-up, trimmed from the teacher's
//! `cfg::logger::init_logger`: same stdout/stderr/file-with-rotation sink
//! selection driven by config, minus the custom JSON formatter/fastrace span
//! capture layer (this engine has no distributed-tracing requirement).

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSink {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogRotation {
    Never,
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    #[serde(default)]
    pub sink: Option<LogSink>,
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default)]
    pub file_prefix: Option<String>,
    #[serde(default)]
    pub rotation: Option<LogRotation>,
    #[serde(default)]
    pub json: bool,
    #[serde(default)]
    pub env_filter: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            sink: Some(LogSink::Stdout),
            directory: None,
            file_prefix: None,
            rotation: None,
            json: false,
            env_filter: None,
        }
    }
}

/// Must be kept alive for the lifetime of the process: dropping it flushes
/// and tears down the non-blocking writer thread.
pub fn init_logger(cfg: &LoggerConfig) -> Result<WorkerGuard> {
    let filter = cfg
        .env_filter
        .clone()
        .map(EnvFilter::new)
        .unwrap_or_else(|| EnvFilter::new("info"));

    let sink = cfg.sink.unwrap_or(LogSink::Stdout);
    let (writer, guard) = match sink {
        LogSink::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogSink::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogSink::File => {
            let dir = cfg.directory.clone().unwrap_or_else(|| PathBuf::from("./logs"));
            let prefix = cfg.file_prefix.clone().unwrap_or_else(|| "zk-session-core".to_string());
            let rotation = match cfg.rotation.unwrap_or(LogRotation::Daily) {
                LogRotation::Never => Rotation::NEVER,
                LogRotation::Daily => Rotation::DAILY,
                LogRotation::Hourly => Rotation::HOURLY,
            };
            let appender = tracing_appender::rolling::RollingFileAppender::new(rotation, dir, prefix);
            tracing_appender::non_blocking(appender)
        }
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(writer);

    if cfg.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow::anyhow!("tracing subscriber already initialized: {e}"))
    .context("initializing tracing subscriber")?;

    Ok(guard)
}
