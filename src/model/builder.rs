// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Turns parsed host blocks into nodes, jobs, users and pending jobs.

use tracing::debug;

use super::types::{ClusterModel, Job, Node, NodeMemory, PendingJob, WaitStatus};
use crate::config::{Config, FieldLayout, QueryMode};
use crate::error::{QueryError, Result};
use crate::source::StatusSource;
use crate::status::HostBlock;

pub struct ModelBuilder<'a> {
    mode: QueryMode,
    layout: &'a FieldLayout,
    details: Option<&'a dyn StatusSource>,
    /// Restricts the detail lookup to jobs of this owner
    details_owner: Option<String>,
}

impl<'a> ModelBuilder<'a> {
    pub fn new(config: &'a Config, mode: QueryMode) -> Self {
        Self {
            mode,
            layout: config.layout(mode),
            details: None,
            details_owner: None,
        }
    }

    /// Resolve peak memory and start time of every running job through `source`
    pub fn with_job_details(mut self, source: &'a dyn StatusSource) -> Self {
        self.details = Some(source);
        self
    }

    /// Only look up details of jobs owned by `owner`
    pub fn details_only_for(mut self, owner: &str) -> Self {
        self.details_owner = Some(owner.to_string());
        self
    }

    /// Build the model. Any malformed line aborts the whole build.
    pub fn build(&self, blocks: &[&HostBlock], pending_lines: &[String]) -> Result<ClusterModel> {
        let mut model = ClusterModel::default();
        for block in blocks {
            model.push_node(self.build_node(block)?);
        }
        // The parser already dropped the pending section header
        for line in pending_lines {
            model.pending.push(self.parse_pending_line(line)?);
        }
        debug!(
            nodes = model.nodes.len(),
            pending = model.pending.len(),
            users = model.users().len(),
            "model built"
        );
        Ok(model)
    }

    pub fn build_node(&self, block: &HostBlock) -> Result<Node> {
        let summary = &block.summary;
        let mut node = Node::new(&summary.host).with_queue(&summary.queue);
        node.set_cores(summary.total, summary.used)?;
        node.set_disabled(summary.is_disabled());

        if let Some(total) = block.resource("mem_total") {
            node.set_memory(NodeMemory {
                total: total.to_string(),
                used: block.resource("mem_used").map(String::from),
            });
        }

        for line in &block.job_lines {
            let (mut job, id) = self.parse_job_line(line)?;
            let details = match &self.details_owner {
                Some(owner) if job.owner() != owner.as_str() => None,
                _ => self.details,
            };
            // Id last: it may trigger the per-job detail lookup
            job.set_id(id, details);
            node.add_job(job);
        }
        Ok(node)
    }

    /// Parse a running-job line into a job (without id) and its id
    fn parse_job_line(&self, line: &str) -> Result<(Job, String)> {
        let fields = self.job_fields(line)?;
        let l = self.layout;

        let cores = fields[l.job_cores_field]
            .parse::<u32>()
            .map_err(|_| self.shape_error(format!("job core count not a number: '{}'", line)))?;
        let priority = fields[l.job_priority_field]
            .parse::<f64>()
            .map_err(|_| self.shape_error(format!("job priority not a number: '{}'", line)))?;

        let mut job = Job::new(fields[l.job_name_field], fields[l.job_user_field], cores);
        job.set_priority(priority);
        Ok((job, fields[l.job_id_field].to_string()))
    }

    fn parse_pending_line(&self, line: &str) -> Result<PendingJob> {
        let (mut job, id) = self.parse_job_line(line)?;
        let fields = self.job_fields(line)?;
        let wait_status: WaitStatus = fields[self.layout.job_state_field].parse()?;
        let queued_since = format!(
            "{} {}",
            fields[self.layout.job_date_field], fields[self.layout.job_time_field]
        );
        job.set_id(id, None);

        Ok(PendingJob {
            job,
            wait_status,
            queued_since,
        })
    }

    fn job_fields<'l>(&self, line: &'l str) -> Result<Vec<&'l str>> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < self.layout.min_job_fields {
            return Err(self.shape_error(format!(
                "job line has {} fields, expected at least {}: '{}'",
                fields.len(),
                self.layout.min_job_fields,
                line
            )));
        }
        Ok(fields)
    }

    fn shape_error(&self, detail: String) -> QueryError {
        QueryError::unsupported(format!("qstat {}", self.mode.flag()), detail)
    }
}
