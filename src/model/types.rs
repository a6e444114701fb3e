// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Cluster entities rebuilt from one status snapshot.

use std::collections::HashMap;
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use crate::error::{QueryError, Result};
use crate::source::StatusSource;

/// Peak memory placeholder until the scheduler reports one
pub const MEMORY_NA: &str = "NA";

/// Memory figures reported by `qstat -F` resource lines
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeMemory {
    pub total: String,
    pub used: Option<String>,
}

/// A compute host with its running jobs.
///
/// `free_cores == total_cores - used_cores` holds after every mutation;
/// the three counts only change together through [`Node::set_cores`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    name: String,
    queue: String,
    total_cores: u32,
    used_cores: u32,
    free_cores: u32,
    disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    load: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    memory: Option<NodeMemory>,
    jobs: Vec<Job>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: String::new(),
            total_cores: 0,
            used_cores: 0,
            free_cores: 0,
            disabled: false,
            load: None,
            memory: None,
            jobs: Vec::new(),
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    /// Set total and used cores at once. Rejects `used > total` and leaves
    /// the node unchanged in that case.
    pub fn set_cores(&mut self, total: u32, used: u32) -> Result<()> {
        if used > total {
            return Err(QueryError::CoreOverflow {
                host: self.name.clone(),
                used,
                total,
            });
        }
        self.total_cores = total;
        self.used_cores = used;
        self.free_cores = total - used;
        Ok(())
    }

    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    pub fn set_load(&mut self, load: f64) {
        self.load = Some(load);
    }

    pub fn set_memory(&mut self, memory: NodeMemory) {
        self.memory = Some(memory);
    }

    pub fn add_job(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue instance the node was read from (`long` in `long@node01`)
    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn total_cores(&self) -> u32 {
        self.total_cores
    }

    pub fn used_cores(&self) -> u32 {
        self.used_cores
    }

    pub fn free_cores(&self) -> u32 {
        self.free_cores
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Schedulable and without any used core
    pub fn is_empty(&self) -> bool {
        !self.disabled && self.used_cores == 0
    }

    /// Every core allocated by the scheduler
    pub fn is_full(&self) -> bool {
        self.total_cores > 0 && self.used_cores == self.total_cores
    }

    pub fn load(&self) -> Option<f64> {
        self.load
    }

    pub fn memory(&self) -> Option<&NodeMemory> {
        self.memory.as_ref()
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Measured load per allocated core; `None` without a load sample or jobs
    pub fn efficiency(&self) -> Option<f64> {
        match (self.load, self.used_cores) {
            (Some(load), used) if used > 0 => Some(load / used as f64),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    id: String,
    name: String,
    owner: String,
    cores: u32,
    priority: f64,
    max_memory: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    start_time: Option<String>,
}

impl Job {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, cores: u32) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            owner: owner.into(),
            cores,
            priority: 0.0,
            max_memory: MEMORY_NA.to_string(),
            start_time: None,
        }
    }

    /// Assign the scheduler id. With a detail source this also looks up
    /// peak memory and start time; a failed lookup keeps both unresolved.
    pub fn set_id(&mut self, id: impl Into<String>, details: Option<&dyn StatusSource>) {
        self.id = id.into();
        let Some(source) = details else {
            return;
        };
        match source.job_detail(&self.id) {
            Ok(text) => {
                if let Some(mem) = parse_max_memory(&text) {
                    self.max_memory = mem;
                }
                self.start_time = parse_start_time(&text);
            }
            Err(err) => {
                warn!(job = %self.id, error = %err, "job detail unavailable");
            }
        }
    }

    pub fn set_priority(&mut self, priority: f64) {
        self.priority = priority;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn cores(&self) -> u32 {
        self.cores
    }

    pub fn priority(&self) -> f64 {
        self.priority
    }

    pub fn max_memory(&self) -> &str {
        &self.max_memory
    }

    pub fn start_time(&self) -> Option<&str> {
        self.start_time.as_deref()
    }
}

/// `maxvmem=` value from `qstat -j` usage lines
fn parse_max_memory(detail: &str) -> Option<String> {
    let start = detail.find("maxvmem=")? + "maxvmem=".len();
    let value: String = detail[start..]
        .chars()
        .take_while(|c| !c.is_whitespace() && *c != ',')
        .collect();
    (!value.is_empty()).then_some(value)
}

/// `start_time` value from `qstat -j`, e.g. `start_time   1:   07/13/2016 09:45:56.231`
fn parse_start_time(detail: &str) -> Option<String> {
    let line = detail
        .lines()
        .find(|l| l.trim_start().starts_with("start_time"))?;
    let (_, value) = line.split_once(':')?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Why a pending job is not running yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WaitStatus {
    Waiting,
    Held,
    Error,
}

impl FromStr for WaitStatus {
    type Err = QueryError;

    fn from_str(code: &str) -> Result<Self> {
        match code {
            "qw" => Ok(WaitStatus::Waiting),
            "hqw" => Ok(WaitStatus::Held),
            "Eqw" => Ok(WaitStatus::Error),
            other => Err(QueryError::UnknownWaitStatus(other.to_string())),
        }
    }
}

impl WaitStatus {
    pub fn label(self) -> &'static str {
        match self {
            WaitStatus::Waiting => "Waiting",
            WaitStatus::Held => "Held",
            WaitStatus::Error => "Error",
        }
    }
}

/// A submitted job not yet placed on any node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingJob {
    #[serde(flatten)]
    pub job: Job,
    pub wait_status: WaitStatus,
    pub queued_since: String,
}

/// Position of a job inside [`ClusterModel::nodes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobRef {
    pub node: usize,
    pub job: usize,
}

/// A job owner. Jobs stay owned by their nodes; the user keeps positions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub name: String,
    pub jobs: Vec<JobRef>,
}

impl User {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            jobs: Vec::new(),
        }
    }

    pub fn jobs<'a>(&'a self, nodes: &'a [Node]) -> impl Iterator<Item = (&'a Node, &'a Job)> + 'a {
        self.jobs.iter().filter_map(move |r| {
            let node = nodes.get(r.node)?;
            Some((node, node.jobs.get(r.job)?))
        })
    }

    /// Sum of job cores, recomputed on every call
    pub fn cores_used(&self, nodes: &[Node]) -> u32 {
        self.jobs(nodes).map(|(_, job)| job.cores()).sum()
    }

    /// Distinct nodes the user's jobs run on, in first-seen order
    pub fn nodes<'a>(&self, nodes: &'a [Node]) -> Vec<&'a Node> {
        let mut seen: Vec<usize> = Vec::new();
        for r in &self.jobs {
            if !seen.contains(&r.node) {
                seen.push(r.node);
            }
        }
        seen.into_iter().filter_map(|i| nodes.get(i)).collect()
    }
}

/// Nodes, pending jobs and users of one query
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterModel {
    pub nodes: Vec<Node>,
    pub pending: Vec<PendingJob>,
    users: Vec<User>,
    #[serde(skip)]
    user_index: HashMap<String, usize>,
}

impl ClusterModel {
    /// Append a node and register its jobs with their owners
    pub fn push_node(&mut self, node: Node) {
        let node_idx = self.nodes.len();
        for (job_idx, job) in node.jobs().iter().enumerate() {
            self.record_job(
                job.owner(),
                JobRef {
                    node: node_idx,
                    job: job_idx,
                },
            );
        }
        self.nodes.push(node);
    }

    fn record_job(&mut self, owner: &str, job: JobRef) {
        let idx = match self.user_index.get(owner) {
            Some(&idx) => idx,
            None => {
                self.users.push(User::new(owner));
                self.user_index.insert(owner.to_string(), self.users.len() - 1);
                self.users.len() - 1
            }
        };
        self.users[idx].jobs.push(job);
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    pub fn user(&self, name: &str) -> Option<&User> {
        self.user_index.get(name).map(|&idx| &self.users[idx])
    }

    pub fn user_cores(&self, name: &str) -> u32 {
        self.user(name).map(|u| u.cores_used(&self.nodes)).unwrap_or(0)
    }

    pub fn user_job_count(&self, name: &str) -> usize {
        self.user(name).map(|u| u.jobs.len()).unwrap_or(0)
    }

    pub fn pending_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a PendingJob> + 'a {
        self.pending.iter().filter(move |p| p.job.owner() == name)
    }
}
