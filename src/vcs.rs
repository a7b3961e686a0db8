//! VCS mirror adapter (component G): the vault is optionally backed by a
//! git working copy. This module's only job is shelling out to `git` with
//! the right arguments and working directory — git itself is the version
//! control system, not something this crate reimplements.

use std::path::Path;
use std::process::Command;

use log::warn;

use crate::error::{Result, VaultError};

#[derive(Debug, Clone, Copy)]
pub enum Op {
    Add,
    Edit,
    Delete,
}

impl Op {
    fn verb(self) -> &'static str {
        match self {
            Op::Add => "Added",
            Op::Edit => "Edited",
            Op::Delete => "Deleted",
        }
    }
}

fn run(root: &Path, suppress_output: bool, args: &[&str]) -> Result<()> {
    let mut cmd = Command::new("git");
    cmd.current_dir(root).args(args);
    if suppress_output {
        cmd.stdout(std::process::Stdio::null()).stderr(std::process::Stdio::piped());
    }
    let output = cmd.output().map_err(|e| VaultError::Vcs(format!("could not run git: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(VaultError::Vcs(format!("git {}: {stderr}", args.join(" "))));
    }
    Ok(())
}

pub fn init(root: &Path) -> Result<()> {
    run(root, true, &["init"])
}

pub fn clone(root: &Path, url: &str) -> Result<()> {
    if root.is_dir() {
        let has_entries = std::fs::read_dir(root).map(|mut d| d.next().is_some()).unwrap_or(false);
        if has_entries {
            return Err(VaultError::UserInput(format!(
                "{} already exists and is not empty",
                root.display()
            )));
        }
    }
    let parent = root.parent().unwrap_or(Path::new("."));
    let target = root.file_name().and_then(|n| n.to_str()).unwrap_or(".");
    run(parent, false, &["clone", url, target])
}

pub fn set_remote(root: &Path, url: &str) -> Result<()> {
    let _ = run(root, true, &["remote", "rm", "origin"]);
    run(root, false, &["remote", "add", "-f", "origin", url])
}

pub fn commit(root: &Path, file: &str, op: Op, message: Option<&str>) -> Result<()> {
    let message = message
        .map(str::to_string)
        .unwrap_or_else(|| format!("{} secret '{}'", op.verb(), file));
    run(root, true, &["add", file])?;
    run(root, true, &["commit", "-m", &message])
}

pub fn commit_rename(root: &Path, old_file: &str, new_file: &str) -> Result<()> {
    run(root, true, &["add", old_file])?;
    run(root, true, &["add", new_file])?;
    let message = format!("Renamed '{old_file}' to '{new_file}'");
    run(root, true, &["commit", "-m", &message])
}

/// Record every currently-modified file (used after `key rotate`, which
/// touches the whole tree) under one commit message.
pub fn commit_all(root: &Path, message: &str) -> Result<()> {
    run(root, true, &["add", "-A"])?;
    run(root, true, &["commit", "-m", message])
}

pub fn push(root: &Path) -> Result<()> {
    run(root, false, &["add", "-A"])?;
    let _ = run(root, false, &["commit", "-m", "Vault store update."]);
    run(root, false, &["push", "-u", "origin", "master"])
}

pub fn pull(root: &Path) -> Result<()> {
    run(root, false, &["pull", "origin", "master"])
}

/// Revert the working tree to its last committed state and drop untracked
/// files — used to roll back a failed `key rotate` (§4.6 steps 5–7).
pub fn hard_reset(root: &Path) -> Result<()> {
    run(root, true, &["reset", "--hard", "HEAD"])?;
    run(root, true, &["clean", "-fd"])
}

/// The prior art commits writes to the mirror on a best-effort basis: a
/// missing git binary or an uninitialized working copy should not stop a
/// `add`/`edit`/`delete` from succeeding on disk. Failures are logged, not
/// propagated.
pub fn commit_best_effort(root: &Path, file: &str, op: Op, message: Option<&str>) {
    if let Err(e) = commit(root, file, op, message) {
        warn!("could not record '{file}' in the git mirror: {e}");
    }
}

pub fn commit_rename_best_effort(root: &Path, old_file: &str, new_file: &str) {
    if let Err(e) = commit_rename(root, old_file, new_file) {
        warn!("could not record rename '{old_file}' -> '{new_file}' in the git mirror: {e}");
    }
}
