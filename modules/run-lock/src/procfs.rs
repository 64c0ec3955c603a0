use crate::ProcessInspector;
#[cfg(target_os = "linux")]
use nix::unistd::{sysconf, SysconfVar};

/// Liveness checker backed by procfs: a process's start time is its
/// `starttime` tick count from `/proc/<pid>/stat` plus the boot time.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcfsInspector;

impl ProcessInspector for ProcfsInspector {
    #[cfg(target_os = "linux")]
    fn process_start_unix(&self, pid: i64) -> Option<i64> {
        if pid <= 0 { return None; }
        let stat = std::fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
        start_ticks(&stat).and_then(|ticks| {
            let hz = clock_ticks_per_sec()?;
            Some(boot_time()? + (ticks / hz) as i64)
        })
    }

    #[cfg(not(target_os = "linux"))]
    fn process_start_unix(&self, _pid: i64) -> Option<i64> {
        None
    }
}

// Field 22 of /proc/<pid>/stat. The command name (field 2) may itself contain
// spaces and parentheses, so counting starts after the last ')'.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn start_ticks(stat: &str) -> Option<u64> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(19)?.parse().ok()
}

#[cfg(target_os = "linux")]
fn boot_time() -> Option<i64> {
    let stat = std::fs::read_to_string("/proc/stat").ok()?;
    stat.lines().find_map(|l| l.strip_prefix("btime ")).and_then(|v| v.trim().parse().ok())
}

#[cfg(target_os = "linux")]
fn clock_ticks_per_sec() -> Option<u64> {
    match sysconf(SysconfVar::CLK_TCK) {
        Ok(Some(hz)) if hz > 0 => Some(hz as u64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_ticks_skips_command_with_spaces() {
        let line = "4242 (my (odd) cmd) S 1 4242 4242 0 -1 4194560 100 0 0 0 1 2 0 0 20 0 1 0 987654 1000 10";
        assert_eq!(start_ticks(line), Some(987654));
        assert_eq!(start_ticks("garbage"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn clock_tick_rate_is_positive() {
        assert!(clock_ticks_per_sec().unwrap() > 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn own_process_has_a_start_time() {
        let pid = std::process::id() as i64;
        let start = ProcfsInspector.process_start_unix(pid).expect("own start time");
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        assert!(start <= now + 1);
        assert_eq!(ProcfsInspector.process_start_unix(-1), None);
    }
}
