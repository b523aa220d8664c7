// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for the open interceptor

use nix::errno::Errno;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for interceptor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by collaborators of the dispatcher.
///
/// None of these ever reach the intercepted caller: the dispatcher logs them
/// and falls back to the plain open.
#[derive(Debug, Error)]
pub enum Error {
    #[error("path has no file name component: {0}")]
    NoFileName(String),

    #[error("failed to open directory {path}: {errno}")]
    OpenDir { path: String, errno: Errno },

    #[error("{op} ioctl failed: {errno}")]
    Ioctl { op: &'static str, errno: Errno },

    #[error("failed to open log file {path}: {source}")]
    LogSink {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
}
