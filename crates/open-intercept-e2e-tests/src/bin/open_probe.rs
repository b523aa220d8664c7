// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Issues open-family calls straight through libc and reports each result.
//!
//! Output lines look like `<op> path=<p> result=<n> errno=<e>`.

use anyhow::{bail, Context, Result};
use std::ffi::CString;
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

const MODE: libc::mode_t = 0o644;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        bail!("Usage: {} <create DIR | excl PATH | errno PATH>", args[0]);
    }

    println!("probe pid={}", std::process::id());
    match args[1].as_str() {
        "create" => create_files(Path::new(&args[2])),
        "excl" => exclusive_create(&args[2]),
        "errno" => errno_after_success(&args[2]),
        other => bail!("Unknown command: {other}. Available commands: create, excl, errno"),
    }
}

fn c_path(path: impl AsRef<Path>) -> Result<CString> {
    let path = path.as_ref();
    CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("path contains NUL: {}", path.display()))
}

fn errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

fn report(op: &str, path: &CString, fd: libc::c_int) -> i32 {
    let err = if fd < 0 { errno() } else { 0 };
    let _ = writeln!(
        io::stdout(),
        "{op} path={} result={fd} errno={err}",
        path.to_string_lossy()
    );
    err
}

fn write_and_close(fd: libc::c_int, content: &str) -> Result<()> {
    let written = unsafe { libc::write(fd, content.as_ptr().cast(), content.len()) };
    unsafe { libc::close(fd) };
    if written != content.len() as isize {
        bail!("short write: {written}");
    }
    Ok(())
}

/// Creates test1..3.txt in `dir` through open, openat and creat.
fn create_files(dir: &Path) -> Result<()> {
    let flags = libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC;

    let path = c_path(dir.join("test1.txt"))?;
    let fd = unsafe { libc::open(path.as_ptr(), flags, MODE as libc::c_uint) };
    report("open", &path, fd);
    if fd < 0 {
        bail!("open failed");
    }
    write_and_close(fd, "Test file 1 created with open()\n")?;

    let path = c_path(dir.join("test2.txt"))?;
    let fd = unsafe { libc::openat(libc::AT_FDCWD, path.as_ptr(), flags, MODE as libc::c_uint) };
    report("openat", &path, fd);
    if fd < 0 {
        bail!("openat failed");
    }
    write_and_close(fd, "Test file 2 created with openat()\n")?;

    let path = c_path(dir.join("test3.txt"))?;
    let fd = unsafe { libc::creat(path.as_ptr(), MODE) };
    report("creat", &path, fd);
    if fd < 0 {
        bail!("creat failed");
    }
    write_and_close(fd, "Test file 3 created with creat()\n")
}

/// O_CREAT|O_EXCL; failing is an expected outcome here, not an error.
fn exclusive_create(path: &str) -> Result<()> {
    let path = c_path(path)?;
    let flags = libc::O_CREAT | libc::O_EXCL | libc::O_WRONLY;
    let fd = unsafe { libc::open(path.as_ptr(), flags, MODE as libc::c_uint) };
    report("open", &path, fd);
    if fd >= 0 {
        unsafe { libc::close(fd) };
    }
    Ok(())
}

/// A successful open must leave a pre-set errno alone.
fn errno_after_success(path: &str) -> Result<()> {
    let path = c_path(path)?;
    unsafe { *libc::__errno_location() = libc::EINTR };
    let fd = unsafe {
        libc::open(
            path.as_ptr(),
            libc::O_CREAT | libc::O_WRONLY,
            MODE as libc::c_uint,
        )
    };
    let after = errno();
    let _ = writeln!(
        io::stdout(),
        "open path={} result={fd} errno={after}",
        path.to_string_lossy()
    );
    if fd < 0 {
        bail!("open failed");
    }
    unsafe { libc::close(fd) };
    Ok(())
}
