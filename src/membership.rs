// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Which host-groups a user may submit to, derived from user-list
//! membership and the access lists of the configured queues.

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{QueryError, Result};
use crate::source::{with_group_prefix, StatusSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostGroupMembership {
    pub user_name: String,
    pub user_lists: Vec<String>,
    /// Always ends with the general-access and debug groups
    pub accessible_groups: Vec<String>,
}

/// Which queues to search for access entries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueBreadth {
    /// Only the primary queue (`long`)
    Primary,
    /// Every configured queue
    All,
}

/// One `[@group=list list]` entry of a queue's `user_lists` attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAccess {
    pub group: String,
    pub user_lists: Vec<String>,
}

pub struct MembershipResolver<'a> {
    config: &'a Config,
    source: &'a dyn StatusSource,
}

impl<'a> MembershipResolver<'a> {
    pub fn new(config: &'a Config, source: &'a dyn StatusSource) -> Self {
        Self { config, source }
    }

    /// Resolve accessible host-groups of `user`.
    ///
    /// The account check runs first: an unknown user never causes a
    /// scheduler query.
    pub fn resolve(&self, user: &str, breadth: QueueBreadth) -> Result<HostGroupMembership> {
        ensure_known_user(self.source, user)?;

        let mut user_lists = Vec::new();
        for list in self.source.user_lists()? {
            let definition = self.source.user_list_members(&list)?;
            if list_contains_user(&definition, user) {
                user_lists.push(list);
            }
        }
        debug!(user, lists = ?user_lists, "user-list membership");

        let mut groups: Vec<String> = Vec::new();
        for queue in self.queues(breadth) {
            let definition = self.source.queue_definition(queue)?;
            for entry in parse_queue_access(&definition) {
                let granted = entry.user_lists.iter().any(|ul| user_lists.contains(ul));
                if granted && !groups.contains(&entry.group) {
                    groups.push(entry.group);
                }
            }
        }

        for open in [&self.config.general_access_group, &self.config.debug_group] {
            let open = with_group_prefix(open);
            if !groups.contains(&open) {
                groups.push(open);
            }
        }

        Ok(HostGroupMembership {
            user_name: user.to_string(),
            user_lists,
            accessible_groups: groups,
        })
    }

    fn queues(&self, breadth: QueueBreadth) -> Vec<&'a str> {
        match breadth {
            QueueBreadth::Primary => vec![self.config.primary_queue.as_str()],
            QueueBreadth::All => self.config.queues.iter().map(String::as_str).collect(),
        }
    }
}

/// Fail with [`QueryError::UnknownUser`] unless the account database knows `user`
pub fn ensure_known_user(source: &dyn StatusSource, user: &str) -> Result<()> {
    let known = source.known_users()?;
    if known.iter().any(|u| u == user) {
        Ok(())
    } else {
        warn!(user, "user not found in account database");
        Err(QueryError::UnknownUser(user.to_string()))
    }
}

/// Value of a `key value` attribute in `qconf` output, with `\` line
/// continuations joined.
fn attribute_value(text: &str, key: &str) -> Option<String> {
    let mut lines = text.lines();
    let first = lines.find(|l| l.split_whitespace().next() == Some(key))?;
    let mut value = first.trim_start()[key.len()..].trim().to_string();

    while value.ends_with('\\') {
        value.pop();
        match lines.next() {
            Some(next) => {
                value.push(' ');
                value.push_str(next.trim());
            }
            None => break,
        }
    }
    Some(value)
}

fn tokens(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
}

/// Whether a `qconf -su` definition lists `user` in its entries.
///
/// Matches whole names only, so `jdoe` is not found in `jdoe3`.
fn list_contains_user(definition: &str, user: &str) -> bool {
    match attribute_value(definition, "entries") {
        Some(entries) => tokens(&entries).any(|t| t == user),
        None => false,
    }
}

/// Host-group specific entries of a queue's `user_lists` attribute.
///
/// ```text
/// user_lists            NONE,[@hg1=ul1 ul2],[@hg2=ul3], \
///                       [@hg3=ul4]
/// ```
pub fn parse_queue_access(definition: &str) -> Vec<QueueAccess> {
    let Some(value) = attribute_value(definition, "user_lists") else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    let mut rest = value.as_str();
    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']') else {
            break;
        };
        let body = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];

        let Some((group, lists)) = body.split_once('=') else {
            continue;
        };
        let group = group.trim();
        if !group.starts_with('@') {
            continue;
        }
        entries.push(QueueAccess {
            group: group.to_string(),
            user_lists: tokens(lists).map(String::from).collect(),
        });
    }
    entries
}
