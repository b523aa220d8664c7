// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! LD_PRELOAD entry points
//!
//! Each hook packs its arguments into an [`InterceptedCall`] and hands it to
//! the installed dispatcher. The variadic `mode` is declared as a fixed third
//! or fourth argument; the register it lives in is read even when the caller
//! did not pass it, and the value is only used when `O_CREAT` is set.
//!
//! The `*64` variants carry the large-file flag their libc versions would add.

use crate::state;
use libc::{c_char, c_int, mode_t};
use nix::errno::Errno;
use open_intercept_core::{HookGuard, InterceptedCall};

/// Runs `call` through the dispatcher, or `real` when that is not possible.
unsafe fn dispatch<R>(call: InterceptedCall, real: R) -> c_int
where
    R: FnOnce() -> c_int,
{
    let saved_errno = Errno::last_raw();
    let Some(hook) = state::installed() else {
        return real();
    };
    let Some(_guard) = HookGuard::enter() else {
        return real();
    };

    let outcome = hook.hook(&call);
    if !outcome.handled {
        return real();
    }
    outcome.into_libc_return(saved_errno) as c_int
}

redhook::hook! {
    unsafe fn open(path: *const c_char, flags: c_int, mode: mode_t) -> c_int => file_open_open {
        dispatch(InterceptedCall::open(path, flags, mode), || {
            redhook::real!(open)(path, flags, mode)
        })
    }
}

redhook::hook! {
    unsafe fn open64(path: *const c_char, flags: c_int, mode: mode_t) -> c_int => file_open_open64 {
        dispatch(InterceptedCall::open64(path, flags, mode), || {
            redhook::real!(open64)(path, flags, mode)
        })
    }
}

redhook::hook! {
    unsafe fn openat(
        dirfd: c_int,
        path: *const c_char,
        flags: c_int,
        mode: mode_t
    ) -> c_int => file_open_openat {
        dispatch(InterceptedCall::openat(dirfd, path, flags, mode), || {
            redhook::real!(openat)(dirfd, path, flags, mode)
        })
    }
}

redhook::hook! {
    unsafe fn openat64(
        dirfd: c_int,
        path: *const c_char,
        flags: c_int,
        mode: mode_t
    ) -> c_int => file_open_openat64 {
        dispatch(InterceptedCall::openat64(dirfd, path, flags, mode), || {
            redhook::real!(openat64)(dirfd, path, flags, mode)
        })
    }
}

redhook::hook! {
    unsafe fn creat(path: *const c_char, mode: mode_t) -> c_int => file_open_creat {
        dispatch(InterceptedCall::creat(path, mode), || redhook::real!(creat)(path, mode))
    }
}

redhook::hook! {
    unsafe fn creat64(path: *const c_char, mode: mode_t) -> c_int => file_open_creat64 {
        dispatch(InterceptedCall::creat64(path, mode), || {
            redhook::real!(creat64)(path, mode)
        })
    }
}
