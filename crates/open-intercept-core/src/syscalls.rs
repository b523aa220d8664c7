// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Raw syscall backend
//!
//! Everything the dispatcher executes goes through [`Syscalls::syscall`], which
//! must reach the kernel without passing through any interposed libc symbol.
//! Results follow the kernel convention: non-negative on success, `-errno` on
//! failure. No implementation may leave a probe's errno visible to the caller.

use crate::call::InterceptedCall;
use libc::c_long;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use std::ffi::CStr;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

pub trait Syscalls {
    /// Issues syscall `nr` with the given registers.
    fn syscall(&self, nr: c_long, args: [c_long; 6]) -> c_long;

    /// Executes the call the application asked for.
    fn invoke(&self, call: &InterceptedCall) -> c_long {
        let (nr, args) = call.raw();
        self.syscall(nr, args)
    }

    fn open_dir(&self, dirfd: RawFd, path: &CStr) -> nix::Result<OwnedFd> {
        let flags = OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC;
        let (nr, args) = InterceptedCall::openat(dirfd, path.as_ptr(), flags.bits(), 0).raw();
        into_owned_fd(self.syscall(nr, args))
    }

    fn open_file(&self, dir: RawFd, name: &CStr) -> nix::Result<OwnedFd> {
        let flags = OFlag::O_RDONLY | OFlag::O_CLOEXEC;
        let (nr, args) = InterceptedCall::openat(dir, name.as_ptr(), flags.bits(), 0).raw();
        into_owned_fd(self.syscall(nr, args))
    }

    fn exists(&self, dirfd: RawFd, path: &CStr) -> bool {
        let args = [
            dirfd as c_long,
            path.as_ptr() as c_long,
            libc::F_OK as c_long,
            0,
            0,
            0,
        ];
        self.syscall(libc::SYS_faccessat, args) == 0
    }
}

/// Takes ownership of a descriptor returned in kernel convention.
pub fn into_owned_fd(ret: c_long) -> nix::Result<OwnedFd> {
    if ret < 0 {
        Err(Errno::from_raw(-ret as i32))
    } else {
        Ok(unsafe { OwnedFd::from_raw_fd(ret as RawFd) })
    }
}

/// Backend built on `libc::syscall`, which no LD_PRELOAD hook of the open family intercepts.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectSyscalls;

impl Syscalls for DirectSyscalls {
    fn syscall(&self, nr: c_long, args: [c_long; 6]) -> c_long {
        let saved = Errno::last_raw();
        let ret = unsafe {
            libc::syscall(nr, args[0], args[1], args[2], args[3], args[4], args[5])
        };
        let ret = if ret < 0 {
            -(Errno::last_raw() as c_long)
        } else {
            ret
        };
        Errno::set_raw(saved);
        ret
    }
}
