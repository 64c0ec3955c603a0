//! Ingest orchestrator: drives one run over a set of tech-support archives,
//! from extraction to an allowlisted commit per changed entity.

pub mod log;
pub mod workspace;

use git_commit::{CommitMeta, GitError};
use log::{append_ingest_attempt, read_seen_tsf_ids, IngestLogEntry};
use netsec_core::env::{EnvError, EnvRegistry};
use netsec_core::{layout, timefmt, ErrorCode};
use rdns::LookupFn;
use run_lock::{LockError, LockGuard, ProcessInspector, ProcfsInspector};
use serde::Serialize;
use state_store::{CommitLedgerEntry, Persisted, StateError};
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::OffsetDateTime;
use tsf_parse::model::{DeviceDns, ReverseDns};
use tsf_parse::{ParseContext, ParseStatus, Snapshot};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("ingest requires at least one input path")]
    NoInputs,
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("resolve inputs: {0}")]
    Input(io::Error),
    #[error("ingest io: {0}")]
    Io(#[from] io::Error),
    #[error("ingest log: {0}")]
    Log(#[from] serde_json::Error),
    #[error("append commit ledger: {0}")]
    Ledger(#[from] StateError),
}

impl IngestError {
    pub fn code(&self) -> ErrorCode {
        match self {
            IngestError::NoInputs | IngestError::Env(EnvError::InvalidId(_)) => ErrorCode::Usage,
            IngestError::Git(GitError::Missing(_)) => ErrorCode::GitMissing,
            IngestError::Git(GitError::RepoUnsafe(_)) => ErrorCode::RepoUnsafe,
            IngestError::Lock(LockError::Held(_)) => ErrorCode::LockHeld,
            IngestError::Ledger(_) => ErrorCode::Internal,
            _ => ErrorCode::Io,
        }
    }
}

/// Terminal result of one archive attempt, as written to the ingest log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    SkippedDuplicateTsf,
    SkippedStateUnchanged,
    ParseErrorPartial,
    ParseErrorFatal,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Committed => "committed",
            Outcome::SkippedDuplicateTsf => "skipped_duplicate_tsf",
            Outcome::SkippedStateUnchanged => "skipped_state_unchanged",
            Outcome::ParseErrorPartial => "parse_error_partial",
            Outcome::ParseErrorFatal => "parse_error_fatal",
        }
    }
}

/// Regenerates environment exports before each commit.
pub trait Exporter {
    fn export(&self, repo: &Path, env_id: &str, now: OffsetDateTime) -> Result<(), export::ExportError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentExporter;

impl Exporter for EnvironmentExporter {
    fn export(&self, repo: &Path, env_id: &str, now: OffsetDateTime) -> Result<(), export::ExportError> {
        export::run(&export::ExportOptions { repo: repo.to_path_buf(), env_id: env_id.to_string(), now }).map(|_| ())
    }
}

/// Process-level dependencies of a run.
pub struct Collaborators<'a> {
    pub pid: i64,
    pub inspector: &'a dyn ProcessInspector,
    pub exporter: &'a dyn Exporter,
    pub rdns: Option<LookupFn>,
}

impl Collaborators<'static> {
    pub fn system() -> Self {
        Collaborators { pid: i64::from(std::process::id()), inspector: &ProcfsInspector, exporter: &EnvironmentExporter, rdns: Some(rdns::system_lookup()) }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub repo: PathBuf,
    pub env_raw: String,
    pub inputs: Vec<PathBuf>,
    pub enable_rdns: bool,
    pub keep_extract: bool,
    pub skip_duplicates: bool,
    pub now: OffsetDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub input_archive_path: String,
    pub result: String,
    pub notes: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub tsf_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub entity_type: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub entity_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub run_id: String,
    pub env_id: String,
    pub attempted: usize,
    pub committed: usize,
    pub skipped_duplicate_tsf: usize,
    pub skipped_state_unchanged: usize,
    pub parse_error_partial: usize,
    pub parse_error_fatal: usize,
    pub issues: Vec<Issue>,
    pub warnings: Vec<String>,
}

impl Summary {
    fn record(&mut self, outcome: Outcome, entry: &IngestLogEntry) {
        self.attempted += 1;
        match outcome {
            Outcome::Committed => self.committed += 1,
            Outcome::SkippedDuplicateTsf => self.skipped_duplicate_tsf += 1,
            Outcome::SkippedStateUnchanged => self.skipped_state_unchanged += 1,
            Outcome::ParseErrorPartial => self.parse_error_partial += 1,
            Outcome::ParseErrorFatal => self.parse_error_fatal += 1,
        }
        if matches!(outcome, Outcome::ParseErrorPartial | Outcome::ParseErrorFatal) {
            self.issues.push(Issue {
                input_archive_path: entry.input_archive_path.clone(),
                result: entry.result.clone(),
                notes: entry.notes.clone(),
                error: entry.error.clone(),
                tsf_id: entry.tsf_id.clone(),
                entity_type: entry.entity_type.clone(),
                entity_id: entry.entity_id.clone(),
            });
        }
    }
}

/// One archive's result plus the ledger line owed when it was committed.
struct Attempt {
    outcome: Outcome,
    entry: IngestLogEntry,
    ledger: Option<CommitLedgerEntry>,
}

impl Attempt {
    fn done(outcome: Outcome, mut entry: IngestLogEntry) -> Self {
        entry.result = outcome.as_str().to_string();
        Attempt { outcome, entry, ledger: None }
    }

    fn fatal(mut entry: IngestLogEntry, notes: &str, error: impl ToString) -> Self {
        entry.notes = notes.to_string();
        entry.error = error.to_string();
        Attempt::done(Outcome::ParseErrorFatal, entry)
    }
}

struct RunContext<'a> {
    opts: &'a RunOptions,
    collab: &'a Collaborators<'a>,
    env_id: String,
    run_root: PathBuf,
    seen: Option<HashSet<String>>,
}

/// Ingest every input into the environment. Per-archive failures are
/// recorded in the summary; only setup failures and a failed ledger append
/// end the run with an error.
pub fn run(opts: &RunOptions, collab: &Collaborators<'_>) -> Result<Summary, IngestError> {
    if opts.inputs.is_empty() {
        return Err(IngestError::NoInputs);
    }
    git_commit::check_safe_working_tree(&opts.repo)?;
    let lock = LockGuard::acquire(&opts.repo, opts.now, collab.pid, "ingest", collab.inspector)?;

    let (env_id, _) = EnvRegistry::new(&opts.repo).create(&opts.env_raw)?;
    let ordered = workspace::resolve_inputs(&opts.inputs).map_err(IngestError::Input)?;
    let extract_root = layout::extract_root(&opts.repo);
    let mut warnings = lock.warnings().to_vec();
    warnings.extend(workspace::cleanup_stale_extract_dirs(&extract_root, opts.now)?);

    let run_id = format!("run-{}", uuid::Uuid::now_v7());
    let run_root = extract_root.join(&run_id);
    std::fs::create_dir_all(&run_root)?;

    let log_path = layout::ingest_log_path(&opts.repo);
    let seen = if opts.skip_duplicates { Some(read_seen_tsf_ids(&log_path, &env_id)?) } else { None };
    let mut ctx = RunContext { opts, collab, env_id: env_id.clone(), run_root, seen };
    let mut summary = Summary { run_id: run_id.clone(), env_id: env_id.clone(), warnings, ..Default::default() };
    tracing::info!(%run_id, env = %env_id, inputs = ordered.len(), "ingest run started");

    let attempted_at = timefmt::rfc3339(opts.now);
    for (idx, input) in ordered.iter().enumerate() {
        let entry = IngestLogEntry {
            attempted_at_utc: attempted_at.clone(),
            run_id: run_id.clone(),
            env_id: env_id.clone(),
            input_archive_path: input.to_string_lossy().into_owned(),
            ..Default::default()
        };
        let mut attempt = process_archive(&mut ctx, idx + 1, input, entry);

        // The ledger line describing a commit is written after that commit,
        // so it lands in the next one. Its `changed_paths` still names the
        // ledger file among the paths the entry accounts for.
        if let Some(ledger) = attempt.ledger.take() {
            if let Err(e) = state_store::append_ledger(&layout::commit_ledger_path(&opts.repo, &env_id), &ledger) {
                let failed = Attempt::fatal(attempt.entry, "commit_ledger_append_failed", &e);
                summary.record(failed.outcome, &failed.entry);
                if let Err(log_err) = append_ingest_attempt(&log_path, &failed.entry) {
                    tracing::warn!(error = %log_err, "ingest log append failed");
                }
                tracing::error!(input = %input.display(), error = %e, "commit ledger append failed");
                return Err(e.into());
            }
        }

        tracing::info!(
            input = %input.display(),
            result = attempt.outcome.as_str(),
            notes = %attempt.entry.notes,
            entity = %attempt.entry.entity_id,
            "archive processed"
        );
        summary.record(attempt.outcome, &attempt.entry);
        append_ingest_attempt(&log_path, &attempt.entry)?;
    }

    if !opts.keep_extract {
        if let Err(e) = std::fs::remove_dir(&ctx.run_root) {
            tracing::debug!(dir = %ctx.run_root.display(), error = %e, "run extract directory left in place");
        }
    }
    tracing::info!(
        %run_id,
        attempted = summary.attempted,
        committed = summary.committed,
        unchanged = summary.skipped_state_unchanged,
        partial = summary.parse_error_partial,
        fatal = summary.parse_error_fatal,
        "ingest run finished"
    );
    Ok(summary)
}

fn process_archive(ctx: &mut RunContext<'_>, index: usize, input: &Path, mut entry: IngestLogEntry) -> Attempt {
    let opts = ctx.opts;
    if !tsf_extract::is_supported_archive(input) {
        entry.notes = "unsupported_extension".to_string();
        return Attempt::done(Outcome::ParseErrorFatal, entry);
    }

    let dir = match workspace::begin_extract_dir(&ctx.run_root, input, index) {
        Ok(dir) => dir,
        Err(e) => return Attempt::fatal(entry, "extract_dir_create_failed", e),
    };
    if let Err(e) = tsf_extract::extract(input, &dir) {
        workspace::finish_extract_dir(&dir, opts.keep_extract);
        return Attempt::fatal(entry, "extract_failed", e);
    }
    let files = workspace::read_extracted_files(&dir);
    workspace::finish_extract_dir(&dir, opts.keep_extract);
    let files = match files {
        Ok(files) => files,
        Err(e) => return Attempt::fatal(entry, "extract_read_failed", e),
    };

    let paths: Vec<&str> = files.keys().map(String::as_str).collect();
    let identity = tsf_identity::derive_identity(&paths, |p| {
        files.get(p).map(|s| s.as_bytes().to_vec()).ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    });
    entry.tsf_id = identity.fingerprint.clone();

    if let Some(seen) = ctx.seen.as_mut() {
        if tsf_identity::is_duplicate(&identity.fingerprint, seen) {
            return Attempt::done(Outcome::SkippedDuplicateTsf, entry);
        }
        seen.insert(identity.fingerprint.clone());
    }

    let parse_ctx = ParseContext {
        tsf_id: identity.fingerprint.clone(),
        tsf_original_name: identity.canonical_name.clone(),
        input_archive_name: input.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
        ingested_at_utc: timefmt::rfc3339(opts.now),
    };
    let mut out = match tsf_parse::parse_snapshot(&parse_ctx, &files) {
        Ok(out) => out,
        Err(e) => return Attempt::fatal(entry, "parse_failed", e),
    };
    entry.entity_type = out.kind.as_str().to_string();
    entry.entity_id = out.entity_id.clone();

    let latest = layout::latest_path(&opts.repo, &ctx.env_id, out.kind, &out.entity_id);
    let snapshots = layout::snapshots_dir(&opts.repo, &ctx.env_id, out.kind, &out.entity_id);
    let previous = match state_store::read_latest(&latest) {
        Ok(prev) => prev,
        Err(e) => return Attempt::fatal(entry, "state_persist_failed", e),
    };
    if let Snapshot::Firewall(fw) = &mut out.snapshot {
        enrich_dns(&mut fw.device, previous.as_ref(), ctx);
    }

    let mut value = match out.snapshot.to_value() {
        Ok(v) => v,
        Err(e) => return Attempt::fatal(entry, "state_persist_failed", e),
    };
    let persisted = match state_store::persist_if_changed(&mut value, &latest, &snapshots, &timefmt::snapshot_stamp(opts.now)) {
        Ok(p) => p,
        Err(e) => return Attempt::fatal(entry, "state_persist_failed", e),
    };

    if out.status == ParseStatus::Partial {
        entry.notes = "parse_partial".to_string();
        return Attempt::done(Outcome::ParseErrorPartial, entry);
    }
    let (hash, snapshot_file) = match persisted {
        Persisted::Unchanged { .. } => return Attempt::done(Outcome::SkippedStateUnchanged, entry),
        Persisted::Written { hash, snapshot_file } => (hash, snapshot_file),
    };

    if let Err(e) = ctx.collab.exporter.export(&opts.repo, &ctx.env_id, opts.now) {
        return Attempt::fatal(entry, "export_failed", e);
    }
    let subject = git_commit::build_subject(&CommitMeta {
        env_id: &ctx.env_id,
        kind: out.kind,
        entity_id: &out.entity_id,
        state_sha256: &hash,
        tsf_id: &identity.fingerprint,
    });
    let allowlist = git_commit::build_allowlist(&opts.repo, &ctx.env_id, out.kind, &out.entity_id, &snapshot_file);
    let commit = match git_commit::commit_allowlisted(&opts.repo, &allowlist, &subject) {
        Ok(c) => c,
        Err(e) => return Attempt::fatal(entry, "commit_failed", e),
    };

    entry.git_commit = commit.clone();
    let ledger = CommitLedgerEntry {
        committed_at_utc: timefmt::rfc3339(opts.now),
        tsf_id: identity.fingerprint,
        tsf_original_name: identity.canonical_name,
        entity_type: out.kind.as_str().to_string(),
        entity_id: out.entity_id.clone(),
        state_sha256: hash,
        git_commit: commit,
        changed_scope: state_store::changed_scope(previous.as_ref(), &value),
        changed_paths: state_store::changed_state_paths(&ctx.env_id, out.kind, &out.entity_id, &snapshot_file),
    };
    let mut attempt = Attempt::done(Outcome::Committed, entry);
    attempt.ledger = Some(ledger);
    attempt
}

/// Carry the stored reverse-DNS record forward, or look one up for a device
/// seen for the first time.
fn enrich_dns(device: &mut tsf_parse::model::Device, previous: Option<&serde_json::Value>, ctx: &RunContext<'_>) {
    if let Some(dns) = previous.and_then(|p| p.pointer("/device/dns")) {
        match serde_json::from_value::<DeviceDns>(dns.clone()) {
            Ok(dns) => device.dns = Some(dns),
            Err(e) => tracing::warn!(device = %device.id, error = %e, "ignoring unreadable stored dns record"),
        }
    }
    let lookup = rdns::maybe_lookup(
        &rdns::Options {
            enabled: ctx.opts.enable_rdns,
            is_new_device: previous.is_none(),
            mgmt_ip: &device.mgmt_ip,
            now: ctx.opts.now,
            attempt_timeout: rdns::DEFAULT_ATTEMPT_TIMEOUT,
        },
        ctx.collab.rdns.as_ref(),
    );
    if let Some(r) = lookup {
        device.dns = Some(DeviceDns {
            reverse: ReverseDns { ip: r.ip, ptr_name: r.ptr_name, status: r.status.as_str().to_string(), looked_up_at_utc: r.looked_up_at_utc },
        });
    }
}
