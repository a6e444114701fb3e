// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Raw status sources: the only place that talks to the scheduler.
//!
//! The parser and analyzers consume plain text through [`StatusSource`], so
//! the whole model can be rebuilt from canned output in tests.

pub mod grid_engine;

#[cfg(test)]
pub mod fake;

pub use grid_engine::GridEngine;

use crate::config::QueryMode;
use crate::error::SourceError;

pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Text-level view of the scheduler and its surroundings.
///
/// Formats returned here are owned by the scheduler version in use; callers
/// parse them with the configured layouts.
pub trait StatusSource {
    /// Host-group names, each with its `@` prefix (`qconf -shgrpl`)
    fn host_groups(&self) -> SourceResult<Vec<String>>;

    /// Machines of a host-group with nested groups resolved (`qconf -shgrp_resolved`)
    fn host_group_members(&self, group: &str) -> SourceResult<Vec<String>>;

    /// Tree of a host-group, nested groups and machines (`qconf -shgrp_tree`)
    fn host_group_tree(&self, group: &str) -> SourceResult<String>;

    /// Full status dump (`qstat -f` / `qstat -F`)
    fn status_dump(&self, mode: QueryMode) -> SourceResult<String>;

    /// Names of all user-lists (`qconf -sul`)
    fn user_lists(&self) -> SourceResult<Vec<String>>;

    /// Detailed definition of a user-list (`qconf -su`)
    fn user_list_members(&self, list: &str) -> SourceResult<String>;

    /// Queue definition including its access lists (`qconf -sq`)
    fn queue_definition(&self, queue: &str) -> SourceResult<String>;

    /// Per-job detail (`qstat -j`)
    fn job_detail(&self, job_id: &str) -> SourceResult<String>;

    /// Load table for a comma separated host list (`qhost -h`)
    fn host_load(&self, hosts_csv: &str) -> SourceResult<String>;

    /// Accounts known to the operating system, independent of the scheduler
    fn known_users(&self) -> SourceResult<Vec<String>>;

    /// Users registered with the scheduler (`qconf -suserl`)
    fn scheduler_users(&self) -> SourceResult<Vec<String>>;

    /// Process table of one host from the monitoring endpoint
    fn process_snapshot(&self, host: &str) -> SourceResult<String>;
}

/// Normalize a host-group name to carry exactly one `@` prefix
pub fn with_group_prefix(group: &str) -> String {
    format!("@{}", group.trim_start_matches('@'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_group_prefix() {
        assert_eq!(with_group_prefix("general_access"), "@general_access");
        assert_eq!(with_group_prefix("@general_access"), "@general_access");
    }
}
