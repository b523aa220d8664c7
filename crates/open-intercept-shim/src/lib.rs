#![cfg_attr(not(target_os = "linux"), allow(dead_code))]
// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! File-Open Interceptor Shim
//!
//! Preload this library into a process to have every file-creating
//! `open`/`openat`/`creat` recorded in `FILE_OPEN_LOG`. New files inside a
//! BeeGFS mount are created with the configured striping layout first.
//!
//! Two host mechanisms are supported:
//! - default: LD_PRELOAD interposition of the libc entry points (`redhook`)
//! - `syscall-intercept` feature: a hook registered with `libsyscall_intercept`

pub mod state;

#[cfg(all(target_os = "linux", not(test), not(feature = "syscall-intercept")))]
mod ld_preload;

#[cfg(all(target_os = "linux", feature = "syscall-intercept"))]
pub mod syscall_intercept;

#[cfg(all(target_os = "linux", not(test), not(feature = "syscall-intercept")))]
#[ctor::ctor]
fn initialize_shim() {
    state::initialize(open_intercept_core::DirectSyscalls);
}

#[cfg(all(target_os = "linux", not(test), feature = "syscall-intercept"))]
#[ctor::ctor]
fn initialize_shim() {
    if state::initialize(syscall_intercept::NoInterceptSyscalls) {
        syscall_intercept::install();
    }
}
