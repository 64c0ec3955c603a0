//! Error taxonomy shared by every layer, and its process exit codes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Usage,
    GitMissing,
    RepoUnsafe,
    LockHeld,
    ParseFatal,
    ParsePartial,
    Io,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Usage => "E_USAGE",
            ErrorCode::GitMissing => "E_GIT_MISSING",
            ErrorCode::RepoUnsafe => "E_REPO_UNSAFE",
            ErrorCode::LockHeld => "E_LOCK_HELD",
            ErrorCode::ParseFatal => "E_PARSE_FATAL",
            ErrorCode::ParsePartial => "E_PARSE_PARTIAL",
            ErrorCode::Io => "E_IO",
            ErrorCode::Internal => "E_INTERNAL",
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            ErrorCode::Usage => 2,
            ErrorCode::GitMissing => 3,
            ErrorCode::RepoUnsafe => 4,
            ErrorCode::LockHeld => 5,
            ErrorCode::ParseFatal | ErrorCode::Io => 6,
            ErrorCode::ParsePartial => 7,
            ErrorCode::Internal => 9,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Render the single stderr line used for every failed command.
pub fn format_error_line(code: ErrorCode, message: &str) -> String {
    format!("ERROR {} {}", code, message)
}
