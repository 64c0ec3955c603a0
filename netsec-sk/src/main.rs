use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use export::ExportError;
use git_commit::GitError;
use ingest::{Collaborators, IngestError, RunOptions, Summary};
use netsec_core::env::{normalize_env_id, validate_env_id, EnvError, EnvRegistry};
use netsec_core::error::format_error_line;
use netsec_core::{timefmt, ErrorCode};
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

mod config;

const DEFAULT_REPO: &str = "./default";
const DEFAULT_ENV: &str = "default";

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat { Text, Json }

#[derive(Debug, Error)]
#[error("{0}")]
struct UsageError(String);

#[derive(Debug, Parser)]
#[command(name = "netsec-sk", version, about = "PAN-OS tech-support ingestion into a git-versioned state repository")]
struct Cli {
    /// Optional config file (YAML). If omitted, loads ./netsec.yaml if present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// State repository path (default ./default)
    #[arg(long, global = true)]
    repo: Option<PathBuf>,
    /// Environment id (default "default")
    #[arg(long, global = true)]
    env: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print version information
    Version,
    /// Create the state repository and its git working tree
    Init,
    /// Manage environments
    Env {
        #[command(subcommand)]
        cmd: EnvCmd,
    },
    /// Ingest tech-support archives (files or directories)
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Reverse-DNS lookup of the management IP for newly seen devices
        #[arg(long)]
        rdns: bool,
        /// Keep per-archive extraction directories
        #[arg(long)]
        keep_extract: bool,
        /// Skip archives whose TSF id was already ingested in this environment
        #[arg(long)]
        skip_duplicates: bool,
        #[arg(long, value_enum)]
        format: Option<OutputFormat>,
    },
    /// Rebuild the environment's export files from current state
    Export {
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Debug, Subcommand)]
enum EnvCmd {
    /// Create an environment (no-op when it exists)
    Create { id: String },
    /// List environments, one per line
    List,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            let code = error_code(&err);
            eprintln!("{}", format_error_line(code, &format!("{:#}", err)));
            code.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

fn run(cli: Cli) -> Result<i32> {
    if let Commands::Version = cli.command {
        println!("netsec-sk {} (core {})", env!("CARGO_PKG_VERSION"), netsec_core::version());
        return Ok(0);
    }
    let cfg = config::load_config(cli.config.as_deref()).map_err(|e| UsageError(format!("{:#}", e)))?.unwrap_or_default();
    let repo = cli.repo.or(cfg.repo).unwrap_or_else(|| PathBuf::from(DEFAULT_REPO));
    let env_raw = cli.env.or(cfg.env).unwrap_or_else(|| DEFAULT_ENV.to_string());

    match cli.command {
        Commands::Version => {}
        Commands::Init => {
            let path = git_commit::init_repo(&repo)?;
            println!("Initialized repository: {}", path.display());
        }
        Commands::Env { cmd } => {
            let registry = EnvRegistry::new(&repo);
            match cmd {
                EnvCmd::Create { id } => {
                    let (env_id, created) = registry.create(&id)?;
                    if created {
                        println!("Environment created: {}", env_id);
                    } else {
                        println!("Environment already exists: {}", env_id);
                    }
                }
                EnvCmd::List => {
                    for env_id in registry.list()? {
                        println!("{}", env_id);
                    }
                }
            }
        }
        Commands::Ingest { paths, rdns, keep_extract, skip_duplicates, format } => {
            let icfg = cfg.ingest.unwrap_or_default();
            let format = match (format, icfg.format.as_deref()) {
                (Some(f), _) => f,
                (None, Some(s)) => OutputFormat::from_str(s, true).map_err(|e| UsageError(format!("config ingest.format: {}", e)))?,
                (None, None) => OutputFormat::Text,
            };
            let opts = RunOptions {
                repo,
                env_raw,
                inputs: paths,
                enable_rdns: rdns || icfg.rdns.unwrap_or(false),
                keep_extract: keep_extract || icfg.keep_extract.unwrap_or(false),
                skip_duplicates: skip_duplicates || icfg.skip_duplicates.unwrap_or(false),
                now: timefmt::now_utc(),
            };
            let summary = ingest::run(&opts, &Collaborators::system())?;
            print_summary(&summary, format)?;
            return Ok(summary_exit_code(&summary));
        }
        Commands::Export { format } => {
            let env_id = normalize_env_id(&env_raw);
            validate_env_id(&env_id)?;
            let report = export::run(&export::ExportOptions { repo, env_id: env_id.clone(), now: timefmt::now_utc() })?;
            match format {
                OutputFormat::Text => println!("Export complete: {}", env_id),
                OutputFormat::Json => {
                    let obj = serde_json::json!({ "env_id": env_id, "counts": report.counts, "files": report.files });
                    println!("{}", serde_json::to_string(&obj)?);
                }
            }
        }
    }
    Ok(0)
}

fn print_summary(summary: &Summary, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for issue in &summary.issues {
                tracing::warn!(input = %issue.input_archive_path, result = %issue.result, notes = %issue.notes, error = %issue.error, "archive not committed");
            }
            for w in &summary.warnings {
                tracing::warn!(warning = %w, "ingest warning");
            }
            println!(
                "Ingest complete: attempted={} committed={} skipped_duplicate_tsf={} skipped_state_unchanged={} parse_error_partial={} parse_error_fatal={}",
                summary.attempted,
                summary.committed,
                summary.skipped_duplicate_tsf,
                summary.skipped_state_unchanged,
                summary.parse_error_partial,
                summary.parse_error_fatal
            );
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(summary)?),
    }
    Ok(())
}

/// Fatal archives outrank partial ones.
fn summary_exit_code(summary: &Summary) -> i32 {
    if summary.parse_error_fatal > 0 {
        ErrorCode::ParseFatal.exit_code()
    } else if summary.parse_error_partial > 0 {
        ErrorCode::ParsePartial.exit_code()
    } else {
        0
    }
}

fn error_code(err: &anyhow::Error) -> ErrorCode {
    if err.downcast_ref::<UsageError>().is_some() {
        return ErrorCode::Usage;
    }
    if let Some(e) = err.downcast_ref::<IngestError>() {
        return e.code();
    }
    if let Some(e) = err.downcast_ref::<EnvError>() {
        return match e {
            EnvError::InvalidId(_) => ErrorCode::Usage,
            EnvError::Io(_) => ErrorCode::Io,
        };
    }
    if let Some(e) = err.downcast_ref::<GitError>() {
        return match e {
            GitError::Missing(_) => ErrorCode::GitMissing,
            GitError::RepoUnsafe(_) => ErrorCode::RepoUnsafe,
            _ => ErrorCode::Io,
        };
    }
    if err.downcast_ref::<ExportError>().is_some() || err.downcast_ref::<io::Error>().is_some() || err.downcast_ref::<serde_json::Error>().is_some() {
        return ErrorCode::Io;
    }
    ErrorCode::Internal
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_apply_after_subcommand() {
        let cli = Cli::try_parse_from(["netsec-sk", "ingest", "a_ts.tgz", "--env", "Prod", "--repo", "/srv/r", "--rdns"]).unwrap();
        assert_eq!(cli.env.as_deref(), Some("Prod"));
        assert_eq!(cli.repo, Some(PathBuf::from("/srv/r")));
        match cli.command {
            Commands::Ingest { paths, rdns, keep_extract, .. } => {
                assert_eq!(paths, vec![PathBuf::from("a_ts.tgz")]);
                assert!(rdns);
                assert!(!keep_extract);
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Cli::try_parse_from(["netsec-sk", "ingest"]).is_err());
    }

    #[test]
    fn errors_map_to_codes() {
        assert_eq!(error_code(&UsageError("bad".into()).into()), ErrorCode::Usage);
        assert_eq!(error_code(&EnvError::InvalidId("Bad Env".into()).into()), ErrorCode::Usage);
        assert_eq!(error_code(&GitError::Missing("no git".into()).into()), ErrorCode::GitMissing);
        assert_eq!(error_code(&IngestError::NoInputs.into()), ErrorCode::Usage);
        assert_eq!(error_code(&io::Error::new(io::ErrorKind::Other, "disk").into()), ErrorCode::Io);
        assert_eq!(error_code(&anyhow::anyhow!("boom")), ErrorCode::Internal);
    }

    #[test]
    fn fatal_outranks_partial() {
        let mut s = Summary { parse_error_partial: 1, ..Default::default() };
        assert_eq!(summary_exit_code(&s), 7);
        s.parse_error_fatal = 1;
        assert_eq!(summary_exit_code(&s), 6);
        assert_eq!(summary_exit_code(&Summary::default()), 0);
    }
}
