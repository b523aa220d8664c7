// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! BeeGFS client ioctls
//!
//! The BeeGFS kernel client answers a small set of ioctls (type `'f'`) on any
//! descriptor inside a BeeGFS mount. Other filesystems reject them with
//! `ENOTTY`, which is how non-membership shows up.

use crate::error::{Error, Result};
use crate::striping::{Membership, StripeInfo, StripeTarget, StripedFs, StripingHint};
use nix::errno::Errno;
use nix::sys::stat::Mode;
use std::ffi::CStr;
use std::os::fd::RawFd;

/// Reply written by the membership ioctl, including the terminating NUL
const TEST_STRING: &[u8] = b"_FhGfS_\0";

mod sys {
    use libc::{c_char, c_int, c_uint};

    pub const IOCTYPE_ID: u8 = b'f';
    pub const IOCNUM_GET_CFG_FILE: u8 = 20;
    pub const IOCNUM_TEST_IS_BEEGFS: u8 = 22;
    pub const IOCNUM_GET_STRIPEINFO: u8 = 25;
    pub const IOCNUM_GET_STRIPETARGET: u8 = 26;
    pub const IOCNUM_MKFILE_STRIPEHINTS: u8 = 27;

    pub const CFG_MAX_PATH: usize = 4096;
    pub const NODESTRID_BUFLEN: usize = 256;
    /// Size encoded in the membership request; smaller than the reply, kept for ABI compatibility
    pub const TEST_BUFLEN: usize = 6;

    pub const TEST_IS_BEEGFS_REQUEST: nix::sys::ioctl::ioctl_num_type =
        nix::request_code_read!(IOCTYPE_ID, IOCNUM_TEST_IS_BEEGFS, TEST_BUFLEN);

    #[repr(C)]
    pub struct GetCfgFileArg {
        pub path: [u8; CFG_MAX_PATH],
        pub length: c_int,
    }

    #[repr(C)]
    pub struct MkFileWithStripeHintsArg {
        pub filename: *const c_char,
        pub mode: c_uint,
        pub numtargets: c_uint,
        pub chunksize: c_uint,
    }

    #[repr(C)]
    #[derive(Default)]
    pub struct GetStripeInfoArg {
        pub pattern_type: c_uint,
        pub chunk_size: c_uint,
        pub num_targets: u16,
    }

    #[repr(C)]
    pub struct GetStripeTargetArg {
        pub target_index: u16,
        pub target_num_id: u16,
        pub node_num_id: u16,
        pub node_str_id: [u8; NODESTRID_BUFLEN],
    }

    nix::ioctl_read_bad!(test_is_beegfs, TEST_IS_BEEGFS_REQUEST, u8);
    nix::ioctl_read!(get_cfg_file, IOCTYPE_ID, IOCNUM_GET_CFG_FILE, GetCfgFileArg);
    nix::ioctl_write_ptr!(
        mkfile_stripe_hints,
        IOCTYPE_ID,
        IOCNUM_MKFILE_STRIPEHINTS,
        MkFileWithStripeHintsArg
    );
    nix::ioctl_read!(get_stripe_info, IOCTYPE_ID, IOCNUM_GET_STRIPEINFO, GetStripeInfoArg);
    nix::ioctl_read!(
        get_stripe_target,
        IOCTYPE_ID,
        IOCNUM_GET_STRIPETARGET,
        GetStripeTargetArg
    );
}

/// Runs an ioctl and puts errno back; the error travels in the `Result`.
fn keeping_errno<T>(ioctl: impl FnOnce() -> T) -> T {
    let saved = Errno::last_raw();
    let result = ioctl();
    Errno::set_raw(saved);
    result
}

fn c_string_prefix(buf: &[u8]) -> String {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..len]).into_owned()
}

/// [`StripedFs`] backed by the BeeGFS kernel client
#[derive(Debug, Default, Clone, Copy)]
pub struct BeegfsClient;

impl BeegfsClient {
    /// Client configuration file of the mount `fd` belongs to.
    pub fn config_file(&self, fd: RawFd) -> Result<String> {
        let mut arg = sys::GetCfgFileArg {
            path: [0; sys::CFG_MAX_PATH],
            length: sys::CFG_MAX_PATH as libc::c_int,
        };
        keeping_errno(|| unsafe { sys::get_cfg_file(fd, &mut arg) }).map_err(|errno| {
            Error::Ioctl {
                op: "get-config-file",
                errno,
            }
        })?;
        Ok(c_string_prefix(&arg.path))
    }
}

impl StripedFs for BeegfsClient {
    fn membership(&self, dir: RawFd) -> Result<Membership> {
        let mut reply = [0u8; TEST_STRING.len()];
        match keeping_errno(|| unsafe { sys::test_is_beegfs(dir, reply.as_mut_ptr()) }) {
            Ok(_) => {}
            Err(Errno::ENOTTY | Errno::EINVAL | Errno::EOPNOTSUPP | Errno::ENOSYS) => {
                return Ok(Membership::Foreign);
            }
            Err(errno) => {
                return Err(Error::Ioctl {
                    op: "test-is-beegfs",
                    errno,
                });
            }
        }
        if reply[..] != TEST_STRING[..] {
            return Ok(Membership::Foreign);
        }

        let config_file = match self.config_file(dir) {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::debug!(error = %err, "BeeGFS config file unavailable");
                None
            }
        };
        Ok(Membership::Member { config_file })
    }

    fn create_striped(
        &self,
        dir: RawFd,
        name: &CStr,
        mode: Mode,
        hint: StripingHint,
    ) -> Result<()> {
        let arg = sys::MkFileWithStripeHintsArg {
            filename: name.as_ptr(),
            mode: mode.bits() as libc::c_uint,
            numtargets: hint.stripe_count,
            chunksize: hint.stripe_size,
        };
        keeping_errno(|| unsafe { sys::mkfile_stripe_hints(dir, &arg) })
            .map(drop)
            .map_err(|errno| Error::Ioctl {
                op: "mkfile-stripe-hints",
                errno,
            })
    }

    fn stripe_info(&self, file: RawFd) -> Result<StripeInfo> {
        let mut arg = sys::GetStripeInfoArg::default();
        keeping_errno(|| unsafe { sys::get_stripe_info(file, &mut arg) }).map_err(|errno| {
            Error::Ioctl {
                op: "get-stripe-info",
                errno,
            }
        })?;
        Ok(StripeInfo {
            pattern_type: arg.pattern_type,
            chunk_size: arg.chunk_size,
            target_count: arg.num_targets,
        })
    }

    fn stripe_target(&self, file: RawFd, index: u16) -> Result<StripeTarget> {
        let mut arg = sys::GetStripeTargetArg {
            target_index: index,
            target_num_id: 0,
            node_num_id: 0,
            node_str_id: [0; sys::NODESTRID_BUFLEN],
        };
        keeping_errno(|| unsafe { sys::get_stripe_target(file, &mut arg) }).map_err(|errno| {
            Error::Ioctl {
                op: "get-stripe-target",
                errno,
            }
        })?;
        let node_name = c_string_prefix(&arg.node_str_id);
        Ok(StripeTarget {
            target_id: arg.target_num_id,
            node_id: arg.node_num_id,
            node_name: (!node_name.is_empty()).then_some(node_name),
        })
    }
}
