// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Per-thread reentrancy guard for hook bodies

use std::cell::Cell;

thread_local! {
    static HOOK_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Marks the current thread as inside a hook until dropped.
pub struct HookGuard {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl HookGuard {
    /// Enters the hook, or returns `None` when this thread is already inside one.
    ///
    /// Also returns `None` during thread teardown, when thread-locals are gone
    /// and the only safe thing left is to pass the call through.
    pub fn enter() -> Option<Self> {
        HOOK_DEPTH
            .try_with(|cell| {
                if cell.get() > 0 {
                    return false;
                }
                cell.set(1);
                true
            })
            .ok()
            .filter(|entered| *entered)
            .map(|_| HookGuard {
                _not_send: std::marker::PhantomData,
            })
    }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        let _ = HOOK_DEPTH.try_with(|cell| cell.set(0));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn in_hook() -> bool {
        HOOK_DEPTH.try_with(|cell| cell.get() > 0).unwrap_or(true)
    }

    #[test]
    fn nested_entry_is_refused() {
        assert!(!in_hook());
        let outer = HookGuard::enter().expect("first entry");
        assert!(in_hook());
        assert!(HookGuard::enter().is_none());
        drop(outer);
        assert!(!in_hook());
        assert!(HookGuard::enter().is_some());
    }

    #[test]
    fn threads_are_independent() {
        let _guard = HookGuard::enter().expect("entry on test thread");
        let other = std::thread::spawn(|| HookGuard::enter().is_some())
            .join()
            .unwrap();
        assert!(other);
    }
}
