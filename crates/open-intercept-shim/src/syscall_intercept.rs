// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Registration with `libsyscall_intercept`
//!
//! The library patches the syscall instructions inside libc and calls
//! `intercept_hook_point` for each one, so even opens libc issues internally
//! are observed. Results go back through `result` in kernel convention; the
//! library turns them into errno for the caller.

use crate::state;
use libc::{c_int, c_long};
use nix::errno::Errno;
use open_intercept_core::{HookGuard, InterceptedCall, Syscalls};

type HookFn = unsafe extern "C" fn(
    syscall_number: c_long,
    arg0: c_long,
    arg1: c_long,
    arg2: c_long,
    arg3: c_long,
    arg4: c_long,
    arg5: c_long,
    result: *mut c_long,
) -> c_int;

/// The hook took over the call and stored its result
const HOOK_HANDLED: c_int = 0;
/// The library must execute the original syscall
const HOOK_FORWARD: c_int = 1;

#[link(name = "syscall_intercept")]
extern "C" {
    static mut intercept_hook_point: Option<HookFn>;

    fn syscall_no_intercept(syscall_number: c_long, ...) -> c_long;
}

/// Backend whose syscalls bypass the patched libc.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoInterceptSyscalls;

impl Syscalls for NoInterceptSyscalls {
    fn syscall(&self, nr: c_long, args: [c_long; 6]) -> c_long {
        unsafe { syscall_no_intercept(nr, args[0], args[1], args[2], args[3], args[4], args[5]) }
    }
}

unsafe extern "C" fn file_open_hook(
    syscall_number: c_long,
    arg0: c_long,
    arg1: c_long,
    arg2: c_long,
    arg3: c_long,
    arg4: c_long,
    arg5: c_long,
    result: *mut c_long,
) -> c_int {
    let call = InterceptedCall::from_raw(syscall_number, [arg0, arg1, arg2, arg3, arg4, arg5]);
    if !call.kind.is_open_family() {
        return HOOK_FORWARD;
    }
    // The library derives the caller's errno from `result` alone.
    let saved_errno = Errno::last_raw();
    let handled = run_hook(&call, result);
    Errno::set_raw(saved_errno);
    handled
}

unsafe fn run_hook(call: &InterceptedCall, result: *mut c_long) -> c_int {
    let Some(hook) = state::installed() else {
        return HOOK_FORWARD;
    };
    let Some(_guard) = HookGuard::enter() else {
        return HOOK_FORWARD;
    };

    let outcome = hook.hook(call);
    if !outcome.handled {
        return HOOK_FORWARD;
    }
    *result = outcome.result;
    HOOK_HANDLED
}

/// Points `intercept_hook_point` at the dispatcher.
pub fn install() {
    unsafe {
        intercept_hook_point = Some(file_open_hook);
    }
}
