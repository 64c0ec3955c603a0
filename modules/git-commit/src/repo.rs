use crate::{git, GitError};
use netsec_core::layout;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const GITIGNORE_ENTRY: &str = ".netsec-state/";

const OPERATION_MARKERS: &[&str] = &["MERGE_HEAD", "CHERRY_PICK_HEAD", "rebase-apply", "rebase-merge"];

pub fn check_git_available() -> Result<(), GitError> {
    match Command::new("git").arg("--version").output() {
        Ok(out) if out.status.success() => Ok(()),
        Ok(out) => Err(GitError::Missing(String::from_utf8_lossy(&out.stderr).trim().to_string())),
        Err(e) => Err(GitError::Missing(e.to_string())),
    }
}

/// Refuse to ingest into a repository with an operation in progress or with
/// any tracked change, staged or not. Untracked files are fine, and so is an
/// unstaged edit to an environment's commit ledger, which every commit
/// leaves behind.
pub fn check_safe_working_tree(repo: &Path) -> Result<(), GitError> {
    check_git_available()?;
    let git_dir = repo.join(".git");
    if let Some(marker) = OPERATION_MARKERS.iter().find(|m| git_dir.join(m).exists()) {
        return Err(GitError::RepoUnsafe(format!("{} in progress", marker)));
    }

    let out = git(repo, &["status", "--porcelain"])?;
    if !out.status.success() {
        return Err(GitError::RepoUnsafe(String::from_utf8_lossy(&out.stderr).trim().to_string()));
    }
    let stdout = String::from_utf8_lossy(&out.stdout);
    for line in stdout.lines() {
        if line.len() < 4 || line.starts_with("??") {
            continue;
        }
        let (staged, path) = (line.as_bytes()[0], line[3..].trim_matches('"'));
        if staged == b' ' && is_commit_ledger(path) {
            continue;
        }
        return Err(GitError::RepoUnsafe(format!("uncommitted change to {}", path)));
    }
    Ok(())
}

fn is_commit_ledger(path: &str) -> bool {
    path.split('/').nth(1).map_or(false, |env_id| layout::rel::commit_ledger(env_id) == path)
}

/// Create (or adopt) a state repository at `path` and return its absolute
/// path. Existing git history and `.gitignore` content are kept.
pub fn init_repo(path: &Path) -> Result<PathBuf, GitError> {
    check_git_available()?;
    fs::create_dir_all(path)?;
    let repo = fs::canonicalize(path)?;
    if !repo.join(".git").exists() {
        let out = git(&repo, &["init", "-q"])?;
        if !out.status.success() {
            return Err(GitError::Command { args: "init".into(), detail: String::from_utf8_lossy(&out.stderr).trim().to_string() });
        }
        tracing::info!(repo = %repo.display(), "initialised git repository");
    }
    for dir in [layout::envs_dir(&repo), layout::state_dir(&repo), layout::extract_root(&repo)] {
        fs::create_dir_all(dir)?;
    }
    ensure_gitignore_entry(&repo, GITIGNORE_ENTRY)?;
    Ok(repo)
}

fn ensure_gitignore_entry(repo: &Path, entry: &str) -> io::Result<()> {
    let path = repo.join(".gitignore");
    let mut text = match fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e),
    };
    if text.lines().any(|l| l.trim() == entry) {
        return Ok(());
    }
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
    text.push_str(entry);
    text.push('\n');
    fs::write(path, text)
}
