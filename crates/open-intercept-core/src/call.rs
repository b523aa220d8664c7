// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Normalization of raw open-family system calls
//!
//! The host mechanism hands us a syscall number and six register-width
//! arguments. `open`, `openat` and `creat` spread the same three values
//! (path, flags, mode) over different argument slots; [`InterceptedCall::open_request`]
//! folds them into one [`OpenRequest`].

use libc::{c_char, c_int, c_long, mode_t};
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use std::ffi::CStr;
use std::os::fd::RawFd;

/// Flags implied by `creat(2)`, which carries no flags argument of its own.
pub const CREAT_FLAGS: OFlag = OFlag::O_CREAT.union(OFlag::O_WRONLY).union(OFlag::O_TRUNC);

/// Flag the `*64` libc entry points add before entering the kernel.
///
/// 64-bit kernels imply it, so it is left out there and the logged flags
/// match what the caller passed.
#[cfg(target_pointer_width = "32")]
pub const LARGEFILE_FLAG: c_int = libc::O_LARGEFILE;
#[cfg(not(target_pointer_width = "32"))]
pub const LARGEFILE_FLAG: c_int = 0;

/// Kind of an intercepted system call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallKind {
    Open,
    OpenAt,
    Creat,
    /// Any syscall the dispatcher does not recognize, by number
    Other(c_long),
}

impl SyscallKind {
    pub fn from_number(nr: c_long) -> Self {
        #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
        {
            if nr == libc::SYS_open {
                return SyscallKind::Open;
            }
            if nr == libc::SYS_creat {
                return SyscallKind::Creat;
            }
        }
        if nr == libc::SYS_openat {
            SyscallKind::OpenAt
        } else {
            SyscallKind::Other(nr)
        }
    }

    pub fn is_open_family(self) -> bool {
        !matches!(self, SyscallKind::Other(_))
    }
}

/// One raw call as observed by the hook point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterceptedCall {
    pub kind: SyscallKind,
    pub args: [c_long; 6],
}

impl InterceptedCall {
    pub fn new(kind: SyscallKind, args: [c_long; 6]) -> Self {
        Self { kind, args }
    }

    pub fn from_raw(nr: c_long, args: [c_long; 6]) -> Self {
        Self::new(SyscallKind::from_number(nr), args)
    }

    pub fn open(path: *const c_char, flags: c_int, mode: mode_t) -> Self {
        Self::new(
            SyscallKind::Open,
            [path as c_long, flags as c_long, mode as c_long, 0, 0, 0],
        )
    }

    pub fn openat(dirfd: RawFd, path: *const c_char, flags: c_int, mode: mode_t) -> Self {
        Self::new(
            SyscallKind::OpenAt,
            [
                dirfd as c_long,
                path as c_long,
                flags as c_long,
                mode as c_long,
                0,
                0,
            ],
        )
    }

    pub fn creat(path: *const c_char, mode: mode_t) -> Self {
        Self::new(SyscallKind::Creat, [path as c_long, mode as c_long, 0, 0, 0, 0])
    }

    pub fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> Self {
        Self::open(path, flags | LARGEFILE_FLAG, mode)
    }

    pub fn openat64(dirfd: RawFd, path: *const c_char, flags: c_int, mode: mode_t) -> Self {
        Self::openat(dirfd, path, flags | LARGEFILE_FLAG, mode)
    }

    /// `creat64`; where the large-file flag is needed it becomes an `openat`,
    /// since `creat` has no flags slot.
    pub fn creat64(path: *const c_char, mode: mode_t) -> Self {
        if LARGEFILE_FLAG == 0 {
            Self::creat(path, mode)
        } else {
            Self::openat(
                libc::AT_FDCWD,
                path,
                CREAT_FLAGS.bits() | LARGEFILE_FLAG,
                mode,
            )
        }
    }

    /// Syscall number and argument registers to hand to the kernel.
    ///
    /// Architectures without the legacy `open`/`creat` syscalls get the
    /// equivalent `openat(AT_FDCWD, ...)`.
    pub fn raw(&self) -> (c_long, [c_long; 6]) {
        let a = self.args;
        match self.kind {
            #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
            SyscallKind::Open => (libc::SYS_open, a),
            #[cfg(any(target_arch = "x86_64", target_arch = "x86"))]
            SyscallKind::Creat => (libc::SYS_creat, a),
            #[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
            SyscallKind::Open => (
                libc::SYS_openat,
                [libc::AT_FDCWD as c_long, a[0], a[1], a[2], 0, 0],
            ),
            #[cfg(not(any(target_arch = "x86_64", target_arch = "x86")))]
            SyscallKind::Creat => (
                libc::SYS_openat,
                [
                    libc::AT_FDCWD as c_long,
                    a[0],
                    CREAT_FLAGS.bits() as c_long,
                    a[1],
                    0,
                    0,
                ],
            ),
            SyscallKind::OpenAt => (libc::SYS_openat, a),
            SyscallKind::Other(nr) => (nr, a),
        }
    }

    /// Extracts the uniform request, or `None` for anything outside the open family.
    ///
    /// # Safety
    ///
    /// For open-family kinds the path argument must be null or point to a
    /// NUL-terminated string that stays valid for `'a`.
    pub unsafe fn open_request<'a>(&self) -> Option<OpenRequest<'a>> {
        let a = self.args;
        let (dirfd, path, flags, mode) = match self.kind {
            SyscallKind::Open => (
                libc::AT_FDCWD,
                a[0],
                OFlag::from_bits_retain(a[1] as c_int),
                a[2],
            ),
            SyscallKind::OpenAt => (
                a[0] as RawFd,
                a[1],
                OFlag::from_bits_retain(a[2] as c_int),
                a[3],
            ),
            SyscallKind::Creat => (libc::AT_FDCWD, a[0], CREAT_FLAGS, a[1]),
            SyscallKind::Other(_) => return None,
        };

        let path = path as *const c_char;
        let path = if path.is_null() {
            None
        } else {
            Some(CStr::from_ptr(path))
        };

        Some(OpenRequest {
            dirfd,
            path,
            flags,
            mode: Mode::from_bits_truncate(mode as mode_t),
        })
    }

    /// The same call with its flags replaced.
    ///
    /// `creat` has no flags slot, so it is reissued as `openat(AT_FDCWD, ...)`.
    pub fn with_flags(&self, flags: OFlag) -> Self {
        let mut args = self.args;
        match self.kind {
            SyscallKind::Open => {
                args[1] = flags.bits() as c_long;
                Self::new(SyscallKind::Open, args)
            }
            SyscallKind::OpenAt => {
                args[2] = flags.bits() as c_long;
                Self::new(SyscallKind::OpenAt, args)
            }
            SyscallKind::Creat => Self::new(
                SyscallKind::OpenAt,
                [
                    libc::AT_FDCWD as c_long,
                    args[0],
                    flags.bits() as c_long,
                    args[1],
                    0,
                    0,
                ],
            ),
            SyscallKind::Other(_) => *self,
        }
    }
}

/// Path, flags and mode of an open-family call, whatever its argument layout
#[derive(Debug, Clone, Copy)]
pub struct OpenRequest<'a> {
    /// Directory the path is relative to; `AT_FDCWD` unless the call was `openat`
    pub dirfd: RawFd,
    pub path: Option<&'a CStr>,
    pub flags: OFlag,
    pub mode: Mode,
}

impl OpenRequest<'_> {
    pub fn requests_creation(&self) -> bool {
        self.flags.contains(OFlag::O_CREAT)
    }

    pub fn is_exclusive(&self) -> bool {
        self.flags.contains(OFlag::O_EXCL)
    }

    /// Creation without `O_EXCL` is the only case worth redirecting.
    pub fn is_striping_candidate(&self) -> bool {
        self.path.is_some() && self.requests_creation() && !self.is_exclusive()
    }
}
