// Consistent exit codes for the folio CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/input error (malformed JSON, bad URL, missing option)
//   3  = document not found
//   11 = authentication error
//   13 = remote unreachable
//   14 = remote rejected the request

use std::process;

use folio_sync::{RemoteError, SyncError};

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    NotFound = 3,
    Auth = 11,
    Network = 13,
    Rejected = 14,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(sync_err) = cause.downcast_ref::<SyncError>() {
                return Self::from_sync(sync_err);
            }
            if let Some(remote_err) = cause.downcast_ref::<RemoteError>() {
                return Self::from_remote(remote_err);
            }
            if cause.downcast_ref::<serde_json::Error>().is_some() {
                return Self::Usage;
            }
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>() {
                return match io_err.kind() {
                    std::io::ErrorKind::NotFound => Self::NotFound,
                    _ => Self::Error,
                };
            }
        }
        Self::Error
    }

    pub fn from_sync(err: &SyncError) -> Self {
        match err {
            SyncError::NotFound { .. } => Self::NotFound,
            SyncError::Remote(remote) => Self::from_remote(remote),
            SyncError::FlushInProgress | SyncError::Cache(_) | SyncError::SessionClosed => {
                Self::Error
            }
        }
    }

    pub fn from_remote(err: &RemoteError) -> Self {
        match err {
            RemoteError::Unavailable(_) => Self::Network,
            RemoteError::Rejected { status: 401 | 403, .. } => Self::Auth,
            RemoteError::Rejected { status: 404, .. } => Self::NotFound,
            RemoteError::Rejected { .. } | RemoteError::Decode(_) => Self::Rejected,
            RemoteError::InvalidUrl(_) => Self::Usage,
        }
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
