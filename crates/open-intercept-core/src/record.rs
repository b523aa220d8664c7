// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use crate::flags::{describe_flags, describe_mode};
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use std::fmt;

/// Prefix of every line written to the log file
pub const COMPONENT: &str = "file-open-interceptor";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    Created,
    OpenedExisting,
}

/// One successful open that asked for creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRecord {
    pub path: String,
    /// Flags as the caller passed them, before any rewrite
    pub flags: OFlag,
    pub mode: Mode,
    pub outcome: OpenOutcome,
    pub striped: bool,
    pub pid: u32,
}

impl fmt::Display for OpenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = describe_flags(self.flags);
        let mode = describe_mode(self.mode);
        match self.outcome {
            OpenOutcome::Created => write!(
                f,
                "[{COMPONENT}] created: path={} flags={flags} mode={mode} striped={} pid={}",
                self.path,
                if self.striped { "yes" } else { "no" },
                self.pid
            ),
            OpenOutcome::OpenedExisting => write!(
                f,
                "[{COMPONENT}] opened-existing: path={} flags={flags} mode={mode} pid={}",
                self.path, self.pid
            ),
        }
    }
}
