// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Human-readable rendering of open flags and modes for the log

use nix::fcntl::OFlag;
use nix::sys::stat::Mode;

const NAMED_FLAGS: &[(OFlag, &str)] = &[
    (OFlag::O_CREAT, "O_CREAT"),
    (OFlag::O_EXCL, "O_EXCL"),
    (OFlag::O_TRUNC, "O_TRUNC"),
    (OFlag::O_APPEND, "O_APPEND"),
    (OFlag::O_NONBLOCK, "O_NONBLOCK"),
    (OFlag::O_DIRECTORY, "O_DIRECTORY"),
    (OFlag::O_NOFOLLOW, "O_NOFOLLOW"),
    (OFlag::O_CLOEXEC, "O_CLOEXEC"),
    (OFlag::O_SYNC, "O_SYNC"),
];

fn access_mode(flags: OFlag) -> &'static str {
    let access = flags & OFlag::O_ACCMODE;
    if access == OFlag::O_RDWR {
        "O_RDWR"
    } else if access == OFlag::O_WRONLY {
        "O_WRONLY"
    } else {
        "O_RDONLY"
    }
}

/// Renders e.g. `O_WRONLY|O_CREAT(0x41)`.
pub fn describe_flags(flags: OFlag) -> String {
    let mut names = vec![access_mode(flags)];
    names.extend(
        NAMED_FLAGS
            .iter()
            .filter(|(flag, _)| flags.contains(*flag))
            .map(|(_, name)| *name),
    );
    format!("{}(0x{:x})", names.join("|"), flags.bits())
}

pub fn describe_mode(mode: Mode) -> String {
    format!("{:04o}", mode.bits())
}
