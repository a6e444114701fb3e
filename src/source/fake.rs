// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Canned-output status source for tests. Records every call it receives.

use std::cell::RefCell;
use std::collections::HashMap;

use super::{with_group_prefix, SourceResult, StatusSource};
use crate::config::QueryMode;
use crate::error::SourceError;

#[derive(Default)]
pub struct FakeSource {
    responses: HashMap<String, String>,
    calls: RefCell<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the text returned for `key` (see [`FakeSource::calls`] for key format)
    pub fn with(mut self, key: &str, text: &str) -> Self {
        self.responses.insert(key.to_string(), text.to_string());
        self
    }

    /// Keys of all calls so far, e.g. `status_dump:-f` or `job_detail:42`
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls.borrow().iter().any(|c| c.starts_with(prefix))
    }

    fn get(&self, key: String) -> SourceResult<String> {
        self.calls.borrow_mut().push(key.clone());
        self.responses
            .get(&key)
            .cloned()
            .ok_or_else(|| SourceError::Failed {
                command: key,
                status: "exit status: 1".to_string(),
                stderr: "no canned response".to_string(),
            })
    }
}

fn split(text: String) -> Vec<String> {
    text.split_whitespace().map(String::from).collect()
}

impl StatusSource for FakeSource {
    fn host_groups(&self) -> SourceResult<Vec<String>> {
        self.get("host_groups".to_string()).map(split)
    }

    fn host_group_members(&self, group: &str) -> SourceResult<Vec<String>> {
        self.get(format!("members:{}", with_group_prefix(group))).map(split)
    }

    fn host_group_tree(&self, group: &str) -> SourceResult<String> {
        self.get(format!("tree:{}", with_group_prefix(group)))
    }

    fn status_dump(&self, mode: QueryMode) -> SourceResult<String> {
        self.get(format!("status_dump:{}", mode.flag()))
    }

    fn user_lists(&self) -> SourceResult<Vec<String>> {
        self.get("user_lists".to_string()).map(split)
    }

    fn user_list_members(&self, list: &str) -> SourceResult<String> {
        self.get(format!("user_list:{}", list))
    }

    fn queue_definition(&self, queue: &str) -> SourceResult<String> {
        self.get(format!("queue:{}", queue))
    }

    fn job_detail(&self, job_id: &str) -> SourceResult<String> {
        self.get(format!("job_detail:{}", job_id))
    }

    fn host_load(&self, hosts_csv: &str) -> SourceResult<String> {
        self.get(format!("host_load:{}", hosts_csv))
    }

    fn known_users(&self) -> SourceResult<Vec<String>> {
        self.get("known_users".to_string()).map(split)
    }

    fn scheduler_users(&self) -> SourceResult<Vec<String>> {
        self.get("scheduler_users".to_string()).map(split)
    }

    fn process_snapshot(&self, host: &str) -> SourceResult<String> {
        self.get(format!("process_snapshot:{}", host))
    }
}
