// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Process-wide interceptor state

use once_cell::sync::OnceCell;
use open_intercept_core::{
    init_tracing, BeegfsClient, LogSink, OpenDispatcher, ShimConfig, SyscallHook, Syscalls,
    COMPONENT,
};

pub type SharedHook = Box<dyn SyscallHook + Send + Sync>;

/// Dispatcher the hook functions forward to; unset while the shim is dormant
static HOOK: OnceCell<SharedHook> = OnceCell::new();

pub fn installed() -> Option<&'static (dyn SyscallHook + Send + Sync)> {
    HOOK.get().map(|hook| &**hook)
}

/// Builds the dispatcher variant selected by `config`.
pub fn build_hook<S>(config: &ShimConfig, syscalls: S, sink: LogSink) -> SharedHook
where
    S: Syscalls + Send + Sync + 'static,
{
    let dispatcher = OpenDispatcher::new(syscalls, sink);
    match config.striping {
        Some(hint) => Box::new(dispatcher.with_striping(BeegfsClient, hint)),
        None => Box::new(dispatcher),
    }
}

/// Reads the environment and installs the dispatcher.
///
/// Returns false when the shim stays dormant. An unusable log file
/// terminates the process.
pub fn initialize<S>(syscalls: S) -> bool
where
    S: Syscalls + Send + Sync + 'static,
{
    let config = match ShimConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[{COMPONENT}] {e}; interceptor disabled");
            return false;
        }
    };
    if !config.enabled {
        return false;
    }

    let sink = match LogSink::open(&config.log_path) {
        Ok(sink) => sink,
        Err(e) => {
            eprintln!("[{COMPONENT}] fatal: {e}");
            unsafe { libc::_exit(1) }
        }
    };

    if let Err(e) = init_tracing(sink.clone(), &config.log_level) {
        eprintln!("[{COMPONENT}] diagnostics disabled: {e}");
    }

    let hook = build_hook(&config, syscalls, sink);
    if HOOK.set(hook).is_err() {
        return false;
    }
    tracing::debug!(
        log = %config.log_path.display(),
        striping = ?config.striping,
        "interceptor installed"
    );
    true
}
