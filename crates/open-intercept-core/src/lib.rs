// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Core of the file-open interceptor
//!
//! This crate holds everything the preload shim needs that does not depend on
//! how calls are intercepted:
//! - [`call`]: normalization of `open`/`openat`/`creat` arguments
//! - [`dispatch`]: the hook body (striped-create redirect, pass-through, record)
//! - [`beegfs`]: the BeeGFS client ioctls behind the [`StripedFs`] trait
//! - [`syscalls`]: raw syscall execution that bypasses interposed libc symbols
//! - [`log_sink`], [`config`]: the log file and environment configuration

pub mod beegfs;
pub mod call;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod flags;
pub mod guard;
pub mod log_sink;
pub mod record;
pub mod striping;
pub mod syscalls;

pub use beegfs::BeegfsClient;
pub use call::{InterceptedCall, OpenRequest, SyscallKind, CREAT_FLAGS};
pub use config::ShimConfig;
pub use dispatch::{DispatchOutcome, OpenDispatcher, SyscallHook};
pub use error::{Error, Result};
pub use flags::{describe_flags, describe_mode};
pub use guard::HookGuard;
pub use log_sink::{init_tracing, LogSink, DEFAULT_LOG_PATH};
pub use record::{OpenOutcome, OpenRecord, COMPONENT};
pub use striping::{split_parent, Membership, StripeInfo, StripeTarget, StripedFs, StripingHint};
pub use syscalls::{DirectSyscalls, Syscalls};
