// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end tests for the file-open interceptor shim
//!
//! The `open_probe` binary performs the opens; the helpers here locate the
//! built shim, run the probe with it preloaded and read back the log.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

pub const SHIM_NAME: &str = "libopen_intercept_shim.so";

/// Environment variables the shim reads; cleared for every probe run
pub const SHIM_ENV: &[&str] = &[
    "FILE_OPEN_LOG",
    "FILE_OPEN_ENABLED",
    "FILE_OPEN_STRIPING",
    "FILE_OPEN_STRIPE_COUNT",
    "FILE_OPEN_STRIPE_SIZE",
    "FILE_OPEN_LOG_LEVEL",
];

/// Find the built shim next to `probe`, or in the workspace target directory.
pub fn find_shim_path(probe: &Path) -> Option<PathBuf> {
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "debug".into());
    let workspace_target = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("target")
        .join(&profile);

    let mut candidates = Vec::new();
    if let Some(dir) = probe.parent() {
        candidates.push(dir.join(SHIM_NAME));
        candidates.push(dir.join("deps").join(SHIM_NAME));
    }
    candidates.push(workspace_target.join(SHIM_NAME));
    candidates.push(workspace_target.join("deps").join(SHIM_NAME));

    candidates.into_iter().find(|path| path.exists())
}

/// One run of the probe binary
pub struct ProbeRun<'a> {
    probe: &'a Path,
    shim: Option<&'a Path>,
    envs: Vec<(String, String)>,
}

impl<'a> ProbeRun<'a> {
    pub fn new(probe: &'a Path) -> Self {
        Self {
            probe,
            shim: None,
            envs: Vec::new(),
        }
    }

    pub fn preload(mut self, shim: &'a Path) -> Self {
        self.shim = Some(shim);
        self
    }

    pub fn env(mut self, key: &str, value: impl AsRef<str>) -> Self {
        self.envs.push((key.to_string(), value.as_ref().to_string()));
        self
    }

    pub fn run(self, args: &[&str]) -> Result<Output> {
        let mut command = Command::new(self.probe);
        command.args(args).env_remove("LD_PRELOAD");
        for key in SHIM_ENV {
            command.env_remove(key);
        }
        if let Some(shim) = self.shim {
            command.env("LD_PRELOAD", shim);
        }
        command.envs(self.envs);

        let output = command
            .output()
            .with_context(|| format!("failed to run {}", self.probe.display()))?;
        Ok(output)
    }

    /// Like [`ProbeRun::run`], but fails unless the probe exits successfully.
    pub fn run_ok(self, args: &[&str]) -> Result<Output> {
        let probe = self.probe.display().to_string();
        let output = self.run(args)?;
        if !output.status.success() {
            bail!(
                "{probe} {args:?} failed: {}\nstdout: {}\nstderr: {}",
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            );
        }
        Ok(output)
    }
}

/// Open records in the log, skipping diagnostics. A missing log reads as empty.
pub fn read_records(log: &Path) -> Result<Vec<String>> {
    if !log.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(log)
        .with_context(|| format!("failed to read {}", log.display()))?;
    Ok(contents
        .lines()
        .filter(|line| line.contains("] created: ") || line.contains("] opened-existing: "))
        .map(str::to_owned)
        .collect())
}

/// Value of `key=` in a line of probe output, e.g. `errno` in `open result=-1 errno=17`.
pub fn probe_field<'o>(stdout: &'o str, op: &str, key: &str) -> Option<&'o str> {
    let mut fields = stdout
        .lines()
        .map(str::split_whitespace)
        .find(|fields| fields.clone().next() == Some(op))?;
    fields.find_map(|field| field.strip_prefix(key)?.strip_prefix('='))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_fields_are_parsed() {
        let stdout = "probe pid=42\n\
                      openat path=/tmp/y result=3 errno=0\n\
                      open path=/tmp/x result=-1 errno=17\n";
        assert_eq!(probe_field(stdout, "open", "errno"), Some("17"));
        assert_eq!(probe_field(stdout, "open", "result"), Some("-1"));
        assert_eq!(probe_field(stdout, "openat", "result"), Some("3"));
        assert_eq!(probe_field(stdout, "probe", "pid"), Some("42"));
        assert_eq!(probe_field(stdout, "creat", "errno"), None);
    }
}
