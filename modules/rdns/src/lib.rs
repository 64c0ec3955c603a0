//! Reverse-DNS enrichment for newly seen firewalls.
//!
//! The resolver call is blocking, so each attempt runs on tokio's blocking
//! pool under a deadline. Two attempts are made; the outcome is always a
//! status, never an error.

use dns_lookup::LookupErrorKind;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::time::timeout;

pub const ATTEMPTS: usize = 2;
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    NotFound,
    Failed(String),
}

pub type LookupFn = Arc<dyn Fn(Ipv4Addr) -> Result<String, LookupError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    NotFound,
    Timeout,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ok => "ok",
            Status::NotFound => "not_found",
            Status::Timeout => "timeout",
            Status::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReverseLookup {
    pub ip: String,
    pub ptr_name: String,
    pub status: Status,
    pub looked_up_at_utc: String,
}

#[derive(Debug, Clone)]
pub struct Options<'a> {
    pub enabled: bool,
    pub is_new_device: bool,
    pub mgmt_ip: &'a str,
    pub now: OffsetDateTime,
    pub attempt_timeout: Duration,
}

/// Look up the PTR name of `mgmt_ip` when enrichment is enabled, the device
/// is new and the address is IPv4. Returns `None` when no lookup was made.
pub fn maybe_lookup(opts: &Options<'_>, lookup: Option<&LookupFn>) -> Option<ReverseLookup> {
    let lookup = lookup?;
    if !opts.enabled || !opts.is_new_device {
        return None;
    }
    let ip: Ipv4Addr = opts.mgmt_ip.trim().parse().ok()?;

    let (status, ptr_name) = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(rt) => {
            let result = rt.block_on(attempt_lookups(lookup, ip, opts.attempt_timeout));
            // a timed-out resolver call may still be running; do not wait for it
            rt.shutdown_background();
            result
        }
        Err(e) => {
            tracing::warn!(error = %e, "rdns runtime unavailable");
            (Status::Error, String::new())
        }
    };
    tracing::debug!(%ip, status = status.as_str(), "reverse lookup finished");
    Some(ReverseLookup {
        ip: opts.mgmt_ip.trim().to_string(),
        ptr_name,
        status,
        looked_up_at_utc: netsec_core::timefmt::rfc3339(opts.now),
    })
}

async fn attempt_lookups(lookup: &LookupFn, ip: Ipv4Addr, per_attempt: Duration) -> (Status, String) {
    let mut status = Status::Error;
    for _ in 0..ATTEMPTS {
        let f = Arc::clone(lookup);
        match timeout(per_attempt, tokio::task::spawn_blocking(move || f(ip))).await {
            Ok(Ok(Ok(ptr))) if !ptr.is_empty() => return (Status::Ok, ptr),
            Ok(Ok(Err(LookupError::NotFound))) => return (Status::NotFound, String::new()),
            Err(_) => status = Status::Timeout,
            _ => status = Status::Error,
        }
    }
    (status, String::new())
}

/// Resolver-backed lookup using `getnameinfo(NI_NAMEREQD)`.
pub fn system_lookup() -> LookupFn {
    Arc::new(resolve_ptr)
}

fn resolve_ptr(ip: Ipv4Addr) -> Result<String, LookupError> {
    let sock = SocketAddr::from((ip, 0));
    match dns_lookup::getnameinfo(&sock, libc::NI_NAMEREQD) {
        Ok((host, _)) => Ok(host.trim_end_matches('.').to_string()),
        Err(e) if matches!(e.kind(), LookupErrorKind::NoName | LookupErrorKind::NoData) => Err(LookupError::NotFound),
        Err(e) => Err(LookupError::Failed(format!("getnameinfo: {:?}", e.kind()))),
    }
}
