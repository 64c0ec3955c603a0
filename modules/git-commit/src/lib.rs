//! Version-control side of ingestion: repository checks and allowlisted
//! commits, all through the `git` executable.

mod repo;

pub use repo::{check_git_available, check_safe_working_tree, init_repo, GITIGNORE_ENTRY};

use netsec_core::{layout, EntityKind};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git executable is not available on PATH: {0}")]
    Missing(String),
    #[error("repository is in an unsafe state for ingest: {0}")]
    RepoUnsafe(String),
    #[error("nothing to commit")]
    NothingToCommit,
    #[error("git {args}: {detail}")]
    Command { args: String, detail: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub(crate) fn git(repo: &Path, args: &[&str]) -> Result<Output, GitError> {
    Command::new("git").arg("-C").arg(repo).args(args).output().map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => GitError::Missing(e.to_string()),
        _ => GitError::Io(e),
    })
}

fn git_ok(repo: &Path, args: &[&str]) -> Result<String, GitError> {
    let out = git(repo, args)?;
    if !out.status.success() {
        let mut detail = String::from_utf8_lossy(&out.stderr).trim().to_string();
        if detail.is_empty() {
            detail = String::from_utf8_lossy(&out.stdout).trim().to_string();
        }
        return Err(GitError::Command { args: args.first().copied().unwrap_or_default().to_string(), detail });
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

pub struct CommitMeta<'a> {
    pub env_id: &'a str,
    pub kind: EntityKind,
    pub entity_id: &'a str,
    pub state_sha256: &'a str,
    pub tsf_id: &'a str,
}

/// `ingest(<env>): <type>/<id> <sha12> <tsf_id>` with spaces in the TSF id
/// replaced by underscores.
pub fn build_subject(meta: &CommitMeta<'_>) -> String {
    let short = meta.state_sha256.get(..12).unwrap_or(meta.state_sha256);
    format!("ingest({}): {}/{} {} {}", meta.env_id, meta.kind, meta.entity_id, short, meta.tsf_id.replace(' ', "_"))
}

/// Every path an ingest commit may stage, sorted.
pub fn build_allowlist(repo: &Path, env_id: &str, kind: EntityKind, entity_id: &str, snapshot_file: &str) -> Vec<PathBuf> {
    let mut out = vec![
        layout::commit_ledger_path(repo, env_id),
        layout::latest_path(repo, env_id, kind, entity_id),
        layout::snapshots_dir(repo, env_id, kind, entity_id).join(snapshot_file),
    ];
    let exports = layout::exports_dir(repo, env_id);
    out.extend(layout::EXPORT_FILES.iter().map(|f| exports.join(f)));
    out.sort();
    out
}

/// Stage the allowlisted paths that exist and commit only those paths.
/// Returns the new commit id, or [`GitError::NothingToCommit`] when none of
/// them changed. Anything else already staged stays staged and out of the
/// commit.
pub fn commit_allowlisted(repo: &Path, allowlist: &[PathBuf], subject: &str) -> Result<String, GitError> {
    let stage: Vec<String> = allowlist
        .iter()
        .filter(|p| p.exists())
        .map(|p| p.strip_prefix(repo).unwrap_or(p).to_string_lossy().into_owned())
        .collect();
    if stage.is_empty() {
        return Err(GitError::NothingToCommit);
    }

    let mut add: Vec<&str> = vec!["add", "--"];
    add.extend(stage.iter().map(String::as_str));
    git_ok(repo, &add)?;

    let mut diff_args: Vec<&str> = vec!["diff", "--cached", "--quiet", "--"];
    diff_args.extend(stage.iter().map(String::as_str));
    let diff = git(repo, &diff_args)?;
    match diff.status.code() {
        Some(0) => return Err(GitError::NothingToCommit),
        Some(1) => {}
        _ => return Err(GitError::Command { args: "diff".into(), detail: String::from_utf8_lossy(&diff.stderr).trim().to_string() }),
    }

    let mut commit: Vec<&str> = vec!["commit", "-q", "-m", subject, "--"];
    commit.extend(stage.iter().map(String::as_str));
    git_ok(repo, &commit)?;
    let head = git_ok(repo, &["rev-parse", "HEAD"])?;
    tracing::info!(commit = %head, %subject, staged = stage.len(), "state committed");
    Ok(head)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::fs;

    #[test]
    fn subject_is_deterministic() {
        let meta = CommitMeta {
            env_id: "prod",
            kind: EntityKind::Firewall,
            entity_id: "S1",
            state_sha256: "0123456789abcdef0123",
            tsf_id: "S1|my fw_ts.tgz",
        };
        assert_eq!(build_subject(&meta), "ingest(prod): firewall/S1 0123456789ab S1|my_fw_ts.tgz");
        let short = CommitMeta { state_sha256: "abc", ..meta };
        assert!(build_subject(&short).contains(" abc "));
    }

    #[test]
    fn allowlist_covers_state_and_exports() {
        let list = build_allowlist(Path::new("/r"), "prod", EntityKind::Panorama, "P1", "snap.json");
        assert_eq!(list.len(), 3 + layout::EXPORT_FILES.len());
        assert!(list.windows(2).all(|w| w[0] <= w[1]));
        assert!(list.contains(&PathBuf::from("/r/envs/prod/state/panorama/P1/snapshots/snap.json")));
        assert!(list.contains(&PathBuf::from("/r/envs/prod/exports/topology.mmd")));
    }

    #[test]
    fn commits_only_existing_allowlisted_paths() {
        if !git_available() {
            eprintln!("skipping: git not available");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path();
        init_test_repo(repo);
        fs::write(repo.join("a.txt"), "a").unwrap();
        fs::write(repo.join("other.txt"), "x").unwrap();

        let allow = vec![repo.join("a.txt"), repo.join("missing.txt")];
        let head = commit_allowlisted(repo, &allow, "ingest(test): firewall/S1 abc S1|x").unwrap();
        assert_eq!(head.len(), 40);
        assert_eq!(run_git(repo, &["log", "-1", "--format=%s"]), "ingest(test): firewall/S1 abc S1|x");
        assert_eq!(run_git(repo, &["show", "--name-only", "--format=", "HEAD"]), "a.txt");

        assert!(matches!(commit_allowlisted(repo, &allow, "again"), Err(GitError::NothingToCommit)));
        assert!(matches!(commit_allowlisted(repo, &[repo.join("missing.txt")], "none"), Err(GitError::NothingToCommit)));
        assert_eq!(run_git(repo, &["rev-list", "--count", "HEAD"]), "1");
    }

    #[test]
    fn staged_paths_outside_allowlist_stay_out_of_commit() {
        if !git_available() {
            eprintln!("skipping: git not available");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let repo = dir.path();
        init_test_repo(repo);
        let nodes = repo.join("envs/prod/exports/nodes.csv");
        fs::create_dir_all(nodes.parent().unwrap()).unwrap();
        fs::write(&nodes, "node_id\n").unwrap();
        fs::write(repo.join("envs/prod/stray.txt"), "s").unwrap();
        run_git(repo, &["add", "envs/prod/stray.txt"]);

        commit_allowlisted(repo, &[nodes.clone()], "ingest(prod): firewall/S1 abc S1|x").unwrap();
        assert_eq!(run_git(repo, &["show", "--name-only", "--format=", "HEAD"]), "envs/prod/exports/nodes.csv");
        assert_eq!(run_git(repo, &["diff", "--cached", "--name-only"]), "envs/prod/stray.txt");

        assert!(matches!(commit_allowlisted(repo, &[nodes], "again"), Err(GitError::NothingToCommit)));
        assert_eq!(run_git(repo, &["rev-list", "--count", "HEAD"]), "1");
    }
}
