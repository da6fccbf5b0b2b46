// SPDX-License-Identifier: GPL-3.0-only

//! Stamps `GIT_VERSION` for `storycam --version`
//!
//! `STORYCAM_VERSION` wins when set. Otherwise the version is
//! `git describe` without its leading `v`, and the package version when the
//! source is not a git checkout.

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-env-changed=STORYCAM_VERSION");
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");

    let version = std::env::var("STORYCAM_VERSION")
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(describe)
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

fn describe() -> Option<String> {
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let described = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let version = described.strip_prefix('v').unwrap_or(&described);
    (!version.is_empty()).then(|| version.to_string())
}
