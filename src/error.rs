// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Error taxonomy shared by the parser, model builder and resolvers.
//!
//! Each variant family maps to one stable process exit code so calling
//! tooling can tell bad identities, bad scheduler output and transient
//! collaborator failures apart.

use std::time::Duration;

use thiserror::Error;

/// Exit code for a wait-status or state code missing from the code tables
pub const EXIT_UNKNOWN_CODE: i32 = 20;
/// Exit code for a host-group that the scheduler does not know
pub const EXIT_UNKNOWN_HOST_GROUP: i32 = 22;
/// Exit code for a user absent from the account database
pub const EXIT_UNKNOWN_USER: i32 = 25;
/// Exit code for scheduler output that does not match the field layout
pub const EXIT_UNSUPPORTED_FORMAT: i32 = 26;
/// Exit code for a failed or timed out scheduler / monitoring call
pub const EXIT_COLLABORATOR: i32 = 27;
/// Exit code for an unreadable or invalid configuration file
pub const EXIT_CONFIG: i32 = 28;

/// Failure of one outbound call (scheduler command or monitoring fetch).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("{command} did not finish within {}s", timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("failed to fetch {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum QueryError {
    /// A block or line does not match the field layout of the query mode.
    #[error("unsupported output format in {context}: {detail}")]
    UnsupportedFormat { context: String, detail: String },

    /// A host reports more used than total cores.
    #[error("unsupported output format for host {host}: {used} used of {total} cores")]
    CoreOverflow { host: String, used: u32, total: u32 },

    #[error("unknown pending-job wait status '{0}'; extend the wait-status table")]
    UnknownWaitStatus(String),

    #[error("unknown state code '{code}' on host {host}; extend the state-code table")]
    UnknownStateCode { host: String, code: String },

    #[error("user {0} is not recognized")]
    UnknownUser(String),

    #[error("incorrect or unknown host-group '{0}'")]
    UnknownHostGroup(String),

    #[error(transparent)]
    Source(#[from] SourceError),
}

impl QueryError {
    pub fn unsupported(context: impl Into<String>, detail: impl Into<String>) -> Self {
        QueryError::UnsupportedFormat {
            context: context.into(),
            detail: detail.into(),
        }
    }

    /// Stable process exit code for this error family
    pub fn exit_code(&self) -> i32 {
        match self {
            QueryError::UnsupportedFormat { .. } | QueryError::CoreOverflow { .. } => {
                EXIT_UNSUPPORTED_FORMAT
            }
            QueryError::UnknownWaitStatus(_) | QueryError::UnknownStateCode { .. } => {
                EXIT_UNKNOWN_CODE
            }
            QueryError::UnknownUser(_) => EXIT_UNKNOWN_USER,
            QueryError::UnknownHostGroup(_) => EXIT_UNKNOWN_HOST_GROUP,
            QueryError::Source(_) => EXIT_COLLABORATOR,
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct_per_family() {
        let shape = QueryError::unsupported("qstat -f", "too few fields");
        let overflow = QueryError::CoreOverflow {
            host: "node01".to_string(),
            used: 9,
            total: 8,
        };
        let code = QueryError::UnknownWaitStatus("xqw".to_string());
        let user = QueryError::UnknownUser("jdoe3".to_string());
        let group = QueryError::UnknownHostGroup("nope".to_string());
        let source = QueryError::from(SourceError::Timeout {
            command: "qstat -f".to_string(),
            timeout: Duration::from_secs(5),
        });

        assert_eq!(shape.exit_code(), overflow.exit_code());
        let codes = [
            shape.exit_code(),
            code.exit_code(),
            user.exit_code(),
            group.exit_code(),
            source.exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_error_messages() {
        let err = QueryError::UnknownUser("jdoe3".to_string());
        assert_eq!(err.to_string(), "user jdoe3 is not recognized");

        let err = QueryError::from(SourceError::Timeout {
            command: "qhost".to_string(),
            timeout: Duration::from_secs(30),
        });
        assert_eq!(err.to_string(), "qhost did not finish within 30s");
    }
}
