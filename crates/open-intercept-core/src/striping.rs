// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Striped-filesystem collaborator interface
//!
//! The dispatcher only needs four things from a striping filesystem: whether a
//! directory belongs to it, a way to create a file with a given layout, and
//! read-back of the resulting layout for the log.

use crate::error::{Error, Result};
use nix::sys::stat::Mode;
use std::ffi::{CStr, CString};
use std::os::fd::RawFd;

pub const DEFAULT_STRIPE_COUNT: u32 = 3;
pub const DEFAULT_STRIPE_SIZE: u32 = 1024 * 1024;

/// Layout requested for newly created files
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripingHint {
    /// Number of storage targets
    pub stripe_count: u32,
    /// Chunk size in bytes
    pub stripe_size: u32,
}

impl Default for StripingHint {
    fn default() -> Self {
        Self {
            stripe_count: DEFAULT_STRIPE_COUNT,
            stripe_size: DEFAULT_STRIPE_SIZE,
        }
    }
}

/// Whether a directory lives on the striping filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Foreign,
    Member { config_file: Option<String> },
}

/// Stripe pattern of an existing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeInfo {
    pub pattern_type: u32,
    pub chunk_size: u32,
    pub target_count: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeTarget {
    pub target_id: u16,
    pub node_id: u16,
    pub node_name: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
pub trait StripedFs {
    /// Checks the open directory `dir` for membership.
    fn membership(&self, dir: RawFd) -> Result<Membership>;

    /// Creates `name` inside `dir` with the requested layout.
    fn create_striped(&self, dir: RawFd, name: &CStr, mode: Mode, hint: StripingHint) -> Result<()>;

    fn stripe_info(&self, file: RawFd) -> Result<StripeInfo>;

    fn stripe_target(&self, file: RawFd, index: u16) -> Result<StripeTarget>;
}

/// Splits `path` into its parent directory and final component.
///
/// A bare name resolves against `.`; a path ending in `/` has no file name.
pub fn split_parent(path: &CStr) -> Result<(CString, CString)> {
    let bytes = path.to_bytes();
    let no_name = || Error::NoFileName(path.to_string_lossy().into_owned());

    let (parent, name) = match bytes.iter().rposition(|&b| b == b'/') {
        None => (&b"."[..], bytes),
        Some(0) => (&b"/"[..], &bytes[1..]),
        Some(idx) => (&bytes[..idx], &bytes[idx + 1..]),
    };
    if name.is_empty() {
        return Err(no_name());
    }

    let parent = CString::new(parent).map_err(|_| no_name())?;
    let name = CString::new(name).map_err(|_| no_name())?;
    Ok((parent, name))
}
