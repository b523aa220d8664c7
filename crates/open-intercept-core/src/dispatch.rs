// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Open-family dispatcher
//!
//! [`OpenDispatcher::handle`] is the body of every hook: it normalizes the
//! call, optionally pre-creates the file with a striping layout, runs the real
//! syscall and records creating opens. Failures on the striping path never
//! reach the caller; the call then behaves exactly as if it had not been
//! intercepted.

use crate::beegfs::BeegfsClient;
use crate::call::{InterceptedCall, OpenRequest};
use crate::error::{Error, Result};
use crate::log_sink::LogSink;
use crate::record::{OpenOutcome, OpenRecord};
use crate::striping::{split_parent, Membership, StripedFs, StripingHint};
use crate::syscalls::Syscalls;
use libc::c_long;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use std::ffi::CStr;
use std::os::fd::{AsRawFd, RawFd};
use tracing::{debug, info, warn};

/// Result of one hook invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// False means the original call must proceed untouched
    pub handled: bool,
    /// Kernel convention: non-negative on success, `-errno` on failure
    pub result: c_long,
}

impl DispatchOutcome {
    pub fn forward() -> Self {
        Self {
            handled: false,
            result: 0,
        }
    }

    pub fn handled(result: c_long) -> Self {
        Self {
            handled: true,
            result,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result >= 0
    }

    /// Converts to the libc calling convention.
    ///
    /// On failure errno is set from the result and `-1` returned; on success
    /// errno is put back to `saved_errno`, the value observed on hook entry.
    pub fn into_libc_return(self, saved_errno: i32) -> c_long {
        if self.is_success() {
            Errno::set_raw(saved_errno);
            self.result
        } else {
            Errno::set_raw((-self.result) as i32);
            -1
        }
    }
}

/// Callback registered at a hook point
pub trait SyscallHook {
    /// # Safety
    ///
    /// Pointer arguments of `call` must be valid as the kernel ABI of the
    /// syscall requires.
    unsafe fn hook(&self, call: &InterceptedCall) -> DispatchOutcome;
}

pub struct OpenDispatcher<S, F = BeegfsClient> {
    syscalls: S,
    striping: Option<(F, StripingHint)>,
    log: LogSink,
}

impl<S: Syscalls> OpenDispatcher<S> {
    /// Logging-only dispatcher; see [`OpenDispatcher::with_striping`].
    pub fn new(syscalls: S, log: LogSink) -> Self {
        Self {
            syscalls,
            striping: None,
            log,
        }
    }
}

impl<S: Syscalls, F: StripedFs> OpenDispatcher<S, F> {
    /// Enables the striped-create redirect through `fs`.
    pub fn with_striping<G: StripedFs>(self, fs: G, hint: StripingHint) -> OpenDispatcher<S, G> {
        OpenDispatcher {
            syscalls: self.syscalls,
            striping: Some((fs, hint)),
            log: self.log,
        }
    }

    pub fn syscalls(&self) -> &S {
        &self.syscalls
    }

    /// Errno on return is the value it had on entry; the real call's error
    /// is carried in the outcome.
    ///
    /// # Safety
    ///
    /// See [`SyscallHook::hook`].
    pub unsafe fn handle(&self, call: &InterceptedCall) -> DispatchOutcome {
        let Some(request) = call.open_request() else {
            return DispatchOutcome::forward();
        };
        let saved_errno = Errno::last_raw();
        let outcome = self.handle_open(call, &request);
        Errno::set_raw(saved_errno);
        outcome
    }

    fn handle_open(&self, call: &InterceptedCall, request: &OpenRequest<'_>) -> DispatchOutcome {
        let Some(path) = request.path else {
            return DispatchOutcome::handled(self.syscalls.invoke(call));
        };

        let striped = request.is_striping_candidate() && self.try_striped_create(request, path);
        let existed = request.requests_creation()
            && !striped
            && self.syscalls.exists(request.dirfd, path);

        let result = if striped {
            let reissued = call.with_flags(request.flags.difference(OFlag::O_CREAT));
            self.syscalls.invoke(&reissued)
        } else {
            self.syscalls.invoke(call)
        };

        if result >= 0 && request.requests_creation() {
            let record = OpenRecord {
                path: path.to_string_lossy().into_owned(),
                flags: request.flags,
                mode: request.mode,
                outcome: if striped || !existed {
                    OpenOutcome::Created
                } else {
                    OpenOutcome::OpenedExisting
                },
                striped,
                pid: std::process::id(),
            };
            if let Err(err) = self.log.record(&record) {
                warn!(error = %err, "failed to write open record");
            }
        }

        DispatchOutcome::handled(result)
    }

    fn try_striped_create(&self, request: &OpenRequest<'_>, path: &CStr) -> bool {
        let Some((fs, hint)) = &self.striping else {
            return false;
        };
        match self.create_striped(fs, *hint, request, path) {
            Ok(created) => created,
            Err(
                err @ (Error::NoFileName(_)
                | Error::OpenDir { .. }
                | Error::Ioctl {
                    errno: Errno::EEXIST,
                    ..
                }),
            ) => {
                debug!(path = %path.to_string_lossy(), reason = %err, "striped create skipped");
                false
            }
            Err(err) => {
                warn!(
                    path = %path.to_string_lossy(),
                    error = %err,
                    "striped create failed, falling back to plain open"
                );
                false
            }
        }
    }

    fn create_striped(
        &self,
        fs: &F,
        hint: StripingHint,
        request: &OpenRequest<'_>,
        path: &CStr,
    ) -> Result<bool> {
        let (parent, name) = split_parent(path)?;
        let dir = self
            .syscalls
            .open_dir(request.dirfd, &parent)
            .map_err(|errno| Error::OpenDir {
                path: parent.to_string_lossy().into_owned(),
                errno,
            })?;

        match fs.membership(dir.as_raw_fd())? {
            Membership::Foreign => {
                debug!(dir = %parent.to_string_lossy(), "not on a striped filesystem");
                return Ok(false);
            }
            Membership::Member { config_file } => {
                debug!(
                    dir = %parent.to_string_lossy(),
                    config_file = config_file.as_deref().unwrap_or("unknown"),
                    "directory is on BeeGFS"
                );
            }
        }

        fs.create_striped(dir.as_raw_fd(), &name, request.mode, hint)?;
        info!(
            path = %path.to_string_lossy(),
            stripe_count = hint.stripe_count,
            stripe_size = hint.stripe_size,
            "created striped file"
        );
        self.log_stripe_layout(fs, dir.as_raw_fd(), &name);
        Ok(true)
    }

    fn log_stripe_layout(&self, fs: &F, dir: RawFd, name: &CStr) {
        let file = match self.syscalls.open_file(dir, name) {
            Ok(file) => file,
            Err(errno) => {
                warn!(%errno, "cannot open striped file to read its layout");
                return;
            }
        };
        let info = match fs.stripe_info(file.as_raw_fd()) {
            Ok(info) => info,
            Err(err) => {
                warn!(error = %err, "stripe info unavailable");
                return;
            }
        };
        info!(
            pattern_type = info.pattern_type,
            chunk_size = info.chunk_size,
            targets = info.target_count,
            "stripe pattern"
        );
        for index in 0..info.target_count {
            match fs.stripe_target(file.as_raw_fd(), index) {
                Ok(target) => info!(
                    index,
                    target_id = target.target_id,
                    node_id = target.node_id,
                    node = target.node_name.as_deref().unwrap_or("?"),
                    "stripe target"
                ),
                Err(err) => warn!(index, error = %err, "stripe target unavailable"),
            }
        }
    }
}

impl<S: Syscalls, F: StripedFs> SyscallHook for OpenDispatcher<S, F> {
    unsafe fn hook(&self, call: &InterceptedCall) -> DispatchOutcome {
        self.handle(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{SyscallKind, CREAT_FLAGS};
    use crate::striping::{MockStripedFs, StripeInfo, StripeTarget};
    use crate::syscalls::{into_owned_fd, DirectSyscalls};
    use nix::sys::stat::Mode;
    use std::cell::RefCell;
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;
    use std::path::{Path, PathBuf};
    use tempfile::{tempdir, TempDir};

    /// Real syscalls, with every pass-through recorded
    #[derive(Default)]
    struct RecordingSyscalls {
        invoked: RefCell<Vec<InterceptedCall>>,
    }

    impl Syscalls for RecordingSyscalls {
        fn syscall(&self, nr: c_long, args: [c_long; 6]) -> c_long {
            DirectSyscalls.syscall(nr, args)
        }

        fn invoke(&self, call: &InterceptedCall) -> c_long {
            self.invoked.borrow_mut().push(*call);
            DirectSyscalls.invoke(call)
        }
    }

    struct Fixture {
        dir: TempDir,
        log_path: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            let log_path = dir.path().join("file_open.log");
            Self { dir, log_path }
        }

        fn sink(&self) -> LogSink {
            LogSink::open(&self.log_path).unwrap()
        }

        fn target(&self, name: &str) -> CString {
            cpath(&self.dir.path().join(name))
        }

        fn log_lines(&self) -> Vec<String> {
            std::fs::read_to_string(&self.log_path)
                .unwrap()
                .lines()
                .map(str::to_owned)
                .collect()
        }

        fn plain(&self) -> OpenDispatcher<RecordingSyscalls> {
            OpenDispatcher::new(RecordingSyscalls::default(), self.sink())
        }

        fn striping(&self, fs: MockStripedFs) -> OpenDispatcher<RecordingSyscalls, MockStripedFs> {
            self.plain().with_striping(fs, StripingHint::default())
        }
    }

    fn cpath(path: &Path) -> CString {
        CString::new(path.as_os_str().as_bytes()).unwrap()
    }

    fn close(outcome: DispatchOutcome) {
        assert!(outcome.handled);
        drop(into_owned_fd(outcome.result).expect("open succeeded"));
    }

    fn create_for_real(dir: RawFd, name: &CStr, mode: Mode) -> Result<()> {
        let flags = libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY | libc::O_CLOEXEC;
        let fd = unsafe { libc::openat(dir, name.as_ptr(), flags, mode.bits() as libc::c_uint) };
        if fd < 0 {
            return Err(Error::Ioctl {
                op: "mkfile-stripe-hints",
                errno: Errno::last(),
            });
        }
        unsafe { libc::close(fd) };
        Ok(())
    }

    /// A striping filesystem that accepts every directory and creates plain files
    fn member_fs(expected_name: &'static str) -> MockStripedFs {
        let mut fs = MockStripedFs::new();
        fs.expect_membership().returning(|_| {
            Ok(Membership::Member {
                config_file: Some("/etc/beegfs/beegfs-client.conf".into()),
            })
        });
        fs.expect_create_striped()
            .withf(move |_, name, _, hint| {
                name.to_bytes() == expected_name.as_bytes() && *hint == StripingHint::default()
            })
            .times(1)
            .returning(|dir, name, mode, _| create_for_real(dir, name, mode));
        fs.expect_stripe_info().returning(|_| {
            Ok(StripeInfo {
                pattern_type: 1,
                chunk_size: 1 << 20,
                target_count: 3,
            })
        });
        fs.expect_stripe_target().times(3).returning(|_, index| {
            Ok(StripeTarget {
                target_id: 100 + index,
                node_id: 1,
                node_name: Some("storage01".into()),
            })
        });
        fs
    }

    #[test]
    fn other_syscalls_are_forwarded_untouched() {
        let fx = Fixture::new();
        let dispatcher = fx.striping(MockStripedFs::new());
        let call = InterceptedCall::from_raw(libc::SYS_getpid, [0; 6]);

        Errno::set_raw(libc::EAGAIN);
        let outcome = unsafe { dispatcher.handle(&call) };
        assert_eq!(outcome, DispatchOutcome::forward());
        assert_eq!(Errno::last_raw(), libc::EAGAIN);
        assert!(dispatcher.syscalls().invoked.borrow().is_empty());
        assert!(fx.log_lines().is_empty());
    }

    #[test]
    fn create_on_striped_filesystem_clears_o_creat() {
        let fx = Fixture::new();
        let dispatcher = fx.striping(member_fs("newfile.txt"));
        let path = fx.target("newfile.txt");
        let flags = OFlag::O_CREAT | OFlag::O_WRONLY;
        let call = InterceptedCall::open(path.as_ptr(), flags.bits(), 0o644);

        let outcome = unsafe { dispatcher.handle(&call) };
        close(outcome);

        let invoked = dispatcher.syscalls().invoked.borrow();
        assert_eq!(invoked.len(), 1);
        assert_eq!(invoked[0].args[1], OFlag::O_WRONLY.bits() as c_long);
        assert_eq!(
            fx.log_lines(),
            vec![format!(
                "[file-open-interceptor] created: path={} flags=O_WRONLY|O_CREAT(0x41) \
                 mode=0644 striped=yes pid={}",
                path.to_str().unwrap(),
                std::process::id()
            )]
        );
    }

    #[test]
    fn foreign_filesystem_runs_the_original_call() {
        let fx = Fixture::new();
        let mut fs = MockStripedFs::new();
        fs.expect_membership().times(1).returning(|_| Ok(Membership::Foreign));
        let dispatcher = fx.striping(fs);
        let path = fx.target("plain.txt");
        let call = InterceptedCall::openat(
            libc::AT_FDCWD,
            path.as_ptr(),
            (OFlag::O_CREAT | OFlag::O_WRONLY).bits(),
            0o644,
        );

        close(unsafe { dispatcher.handle(&call) });

        assert_eq!(*dispatcher.syscalls().invoked.borrow(), vec![call]);
        let lines = fx.log_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(" created: "));
        assert!(lines[0].contains(" striped=no "));
    }

    #[test]
    fn exclusive_create_of_existing_file_is_never_redirected() {
        let fx = Fixture::new();
        std::fs::write(fx.dir.path().join("taken.txt"), b"").unwrap();
        // No expectations: any collaborator call panics.
        let dispatcher = fx.striping(MockStripedFs::new());
        let path = fx.target("taken.txt");
        let flags = OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_WRONLY;
        let call = InterceptedCall::open(path.as_ptr(), flags.bits(), 0o644);

        let outcome = unsafe { dispatcher.handle(&call) };
        assert!(outcome.handled);
        assert_eq!(outcome.result, -(libc::EEXIST as c_long));
        assert_eq!(*dispatcher.syscalls().invoked.borrow(), vec![call]);
        assert!(fx.log_lines().is_empty());
    }

    #[test]
    fn failed_striped_create_falls_back_to_plain_open() {
        let fx = Fixture::new();
        let mut fs = MockStripedFs::new();
        fs.expect_membership()
            .returning(|_| Ok(Membership::Member { config_file: None }));
        fs.expect_create_striped().times(1).returning(|_, _, _, _| {
            Err(Error::Ioctl {
                op: "mkfile-stripe-hints",
                errno: Errno::EIO,
            })
        });
        let dispatcher = fx.striping(fs);
        let path = fx.target("fallback.txt");
        let call = InterceptedCall::open(
            path.as_ptr(),
            (OFlag::O_CREAT | OFlag::O_RDWR).bits(),
            0o600,
        );

        close(unsafe { dispatcher.handle(&call) });

        assert_eq!(*dispatcher.syscalls().invoked.borrow(), vec![call]);
        assert!(fx.dir.path().join("fallback.txt").exists());
        let lines = fx.log_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("created: "));
        assert!(lines[0].contains("mode=0600 striped=no "));
    }

    #[test]
    fn reopening_an_existing_file_is_reported_as_such() {
        let fx = Fixture::new();
        let dispatcher = fx.plain();
        let path = fx.target("twice.txt");
        let call = InterceptedCall::open(
            path.as_ptr(),
            (OFlag::O_CREAT | OFlag::O_WRONLY).bits(),
            0o644,
        );

        close(unsafe { dispatcher.handle(&call) });
        close(unsafe { dispatcher.handle(&call) });

        let lines = fx.log_lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("] created: "));
        assert!(lines[0].contains(" striped=no "));
        assert!(lines[1].contains("] opened-existing: "));
    }

    #[test]
    fn creat_is_reissued_as_openat_after_redirect() {
        let fx = Fixture::new();
        let dispatcher = fx.striping(member_fs("viacreat.txt"));
        let path = fx.target("viacreat.txt");
        let call = InterceptedCall::creat(path.as_ptr(), 0o600);

        close(unsafe { dispatcher.handle(&call) });

        let invoked = dispatcher.syscalls().invoked.borrow();
        assert_eq!(invoked.len(), 1);
        assert_eq!(invoked[0].kind, SyscallKind::OpenAt);
        assert_eq!(invoked[0].args[0], libc::AT_FDCWD as c_long);
        assert_eq!(
            invoked[0].args[2],
            CREAT_FLAGS.difference(OFlag::O_CREAT).bits() as c_long
        );
        assert_eq!(invoked[0].args[3], 0o600);

        let lines = fx.log_lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("flags=O_WRONLY|O_CREAT|O_TRUNC(0x241) mode=0600 striped=yes"));
    }

    #[test]
    fn openat_resolves_the_parent_against_its_directory() {
        let fx = Fixture::new();
        let dispatcher = fx.striping(member_fs("relative.txt"));
        let dir = std::fs::File::open(fx.dir.path()).unwrap();
        let name = CString::new("relative.txt").unwrap();
        let call = InterceptedCall::openat(
            dir.as_raw_fd(),
            name.as_ptr(),
            (OFlag::O_CREAT | OFlag::O_WRONLY).bits(),
            0o644,
        );

        close(unsafe { dispatcher.handle(&call) });

        assert!(fx.dir.path().join("relative.txt").exists());
        let invoked = dispatcher.syscalls().invoked.borrow();
        assert_eq!(invoked[0].args[0], dir.as_raw_fd() as c_long);
        assert_eq!(invoked[0].args[2], OFlag::O_WRONLY.bits() as c_long);
        assert!(fx.log_lines()[0].contains("path=relative.txt "));
    }

    #[test]
    fn null_path_gets_the_kernel_error() {
        let fx = Fixture::new();
        let dispatcher = fx.striping(MockStripedFs::new());
        let call = InterceptedCall::open(
            std::ptr::null(),
            (OFlag::O_CREAT | OFlag::O_WRONLY).bits(),
            0o644,
        );

        let outcome = unsafe { dispatcher.handle(&call) };
        assert_eq!(outcome, DispatchOutcome::handled(-(libc::EFAULT as c_long)));
        assert!(fx.log_lines().is_empty());
    }

    #[test]
    fn failed_plain_open_is_returned_verbatim_and_not_logged() {
        let fx = Fixture::new();
        let dispatcher = fx.plain();
        let path = fx.target("absent.txt");
        let call = InterceptedCall::open(path.as_ptr(), OFlag::O_RDONLY.bits(), 0);

        let outcome = unsafe { dispatcher.handle(&call) };
        assert_eq!(outcome, DispatchOutcome::handled(-(libc::ENOENT as c_long)));
        assert!(fx.log_lines().is_empty());
    }

    #[test]
    fn plain_open_without_creation_is_not_logged() {
        let fx = Fixture::new();
        std::fs::write(fx.dir.path().join("read.txt"), b"data").unwrap();
        let dispatcher = fx.plain();
        let path = fx.target("read.txt");
        let call = InterceptedCall::open(path.as_ptr(), OFlag::O_RDONLY.bits(), 0);

        close(unsafe { dispatcher.handle(&call) });
        assert!(fx.log_lines().is_empty());
    }

    #[test]
    fn creating_open_outside_beegfs_keeps_errno() {
        let fx = Fixture::new();
        let dispatcher = fx
            .plain()
            .with_striping(BeegfsClient, StripingHint::default());
        let path = fx.target("local.txt");
        let call = InterceptedCall::open(
            path.as_ptr(),
            (OFlag::O_CREAT | OFlag::O_WRONLY).bits(),
            0o644,
        );

        Errno::set_raw(0);
        let outcome = unsafe { dispatcher.handle(&call) };
        assert_eq!(Errno::last_raw(), 0);
        close(outcome);
        assert!(fx.log_lines()[0].contains(" striped=no "));
    }

    #[test]
    fn failed_striped_create_keeps_errno() {
        let fx = Fixture::new();
        let mut fs = MockStripedFs::new();
        fs.expect_membership()
            .returning(|_| Ok(Membership::Member { config_file: None }));
        fs.expect_create_striped().times(1).returning(|_, _, _, _| {
            Errno::set_raw(libc::EIO);
            Err(Error::Ioctl {
                op: "mkfile-stripe-hints",
                errno: Errno::EIO,
            })
        });
        let dispatcher = fx.striping(fs);
        let path = fx.target("noisy.txt");
        let call = InterceptedCall::open(
            path.as_ptr(),
            (OFlag::O_CREAT | OFlag::O_WRONLY).bits(),
            0o644,
        );

        Errno::set_raw(libc::EAGAIN);
        let outcome = unsafe { dispatcher.handle(&call) };
        assert_eq!(Errno::last_raw(), libc::EAGAIN);
        close(outcome);
    }

    #[test]
    fn failed_open_leaves_errno_to_the_outcome() {
        let fx = Fixture::new();
        let dispatcher = fx.plain();
        let path = fx.target("missing/child.txt");
        let call = InterceptedCall::open(
            path.as_ptr(),
            (OFlag::O_CREAT | OFlag::O_WRONLY).bits(),
            0o644,
        );

        Errno::set_raw(0);
        let outcome = unsafe { dispatcher.handle(&call) };
        assert_eq!(outcome, DispatchOutcome::handled(-(libc::ENOENT as c_long)));
        assert_eq!(Errno::last_raw(), 0);
    }

    #[test]
    fn libc_return_sets_or_restores_errno() {
        Errno::set_raw(libc::EINTR);
        assert_eq!(
            DispatchOutcome::handled(-(libc::ENOENT as c_long)).into_libc_return(0),
            -1
        );
        assert_eq!(Errno::last_raw(), libc::ENOENT);

        assert_eq!(DispatchOutcome::handled(5).into_libc_return(libc::EINTR), 5);
        assert_eq!(Errno::last_raw(), libc::EINTR);
    }
}
