// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! One invocation's worth of queries: fetch raw text, parse it, build the
//! model and hand the result to a reporter.
//!
//! Successive scheduler calls are treated as one snapshot even though the
//! cluster may change between them.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate_groups, ClusterTotals, MachineInventory};
use crate::config::{Config, QueryMode};
use crate::efficiency::{host_list_csv, parse_load_samples, EfficiencyAnalyzer};
use crate::error::{QueryError, Result};
use crate::membership::{ensure_known_user, HostGroupMembership, MembershipResolver, QueueBreadth};
use crate::model::{ClusterModel, ModelBuilder, Node, PendingJob};
use crate::monitor::ProcessSnapshot;
use crate::source::{with_group_prefix, StatusSource};
use crate::status::{StatusDump, StatusParser};

const ALL_GROUPS: &str = "all";

/// Host-group selection of a group query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GroupScope {
    /// Every machine of every host-group, each counted once
    All,
    Named(String),
}

impl GroupScope {
    pub fn label(&self) -> &str {
        match self {
            GroupScope::All => ALL_GROUPS,
            GroupScope::Named(group) => group,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupReport {
    pub scope: GroupScope,
    pub totals: ClusterTotals,
    pub model: ClusterModel,
}

/// Running and pending jobs of one user
#[derive(Debug, Clone, Serialize)]
pub struct UserReport {
    pub user: String,
    pub job_count: usize,
    pub cores_used: u32,
    /// Nodes holding at least one of the user's jobs, with all their jobs
    pub nodes: Vec<Node>,
    pub pending: Vec<PendingJob>,
    pub detailed: bool,
    /// Per node in `nodes` order; only filled for detailed queries
    pub processes: Vec<NodeProcesses>,
}

/// Process samples of one node; `snapshot` is `None` when the fetch failed
#[derive(Debug, Clone, Serialize)]
pub struct NodeProcesses {
    pub host: String,
    pub snapshot: Option<ProcessSnapshot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessReport {
    pub membership: HostGroupMembership,
    /// `(group, qconf -shgrp_tree output)` for detailed queries; `None` marks a failed lookup
    pub trees: Vec<(String, Option<String>)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueReport {
    pub queue: String,
    pub membership: HostGroupMembership,
    pub totals: ClusterTotals,
}

/// A low-efficiency node and the host-group it was discovered through
#[derive(Debug, Clone, Serialize)]
pub struct FlaggedNode {
    pub group: Option<String>,
    #[serde(flatten)]
    pub node: Node,
}

#[derive(Debug, Clone, Serialize)]
pub struct EfficiencyReport {
    pub threshold: f64,
    pub machines: usize,
    pub nodes: Vec<FlaggedNode>,
}

pub struct ClusterQuery<'a> {
    config: &'a Config,
    source: &'a dyn StatusSource,
    mode: QueryMode,
}

impl<'a> ClusterQuery<'a> {
    pub fn new(config: &'a Config, source: &'a dyn StatusSource, mode: QueryMode) -> Self {
        Self {
            config,
            source,
            mode,
        }
    }

    pub fn host_groups(&self) -> Result<Vec<String>> {
        Ok(self.source.host_groups()?)
    }

    pub fn scheduler_users(&self) -> Result<Vec<String>> {
        Ok(self.source.scheduler_users()?)
    }

    /// Validate a host-group name given with or without `@`.
    ///
    /// `all` and the two open groups are accepted without asking the scheduler.
    pub fn resolve_scope(&self, name: &str) -> Result<GroupScope> {
        if name == ALL_GROUPS {
            return Ok(GroupScope::All);
        }
        let group = with_group_prefix(name);
        let always_open = [&self.config.debug_group, &self.config.general_access_group]
            .iter()
            .any(|open| with_group_prefix(open) == group);
        if always_open || self.source.host_groups()?.contains(&group) {
            Ok(GroupScope::Named(group))
        } else {
            Err(QueryError::UnknownHostGroup(name.to_string()))
        }
    }

    fn scope_hosts(&self, scope: &GroupScope) -> Result<Vec<String>> {
        match scope {
            GroupScope::All => Ok(MachineInventory::discover(self.source)?.names()),
            GroupScope::Named(group) => Ok(self.source.host_group_members(group)?),
        }
    }

    fn status(&self) -> Result<StatusDump> {
        let text = self.source.status_dump(self.mode)?;
        StatusParser::new(self.config, self.mode).parse(&text)
    }

    fn builder(&self, resolve_jobs: bool) -> ModelBuilder<'a> {
        let builder = ModelBuilder::new(self.config, self.mode);
        if resolve_jobs && self.config.lookup_job_details {
            builder.with_job_details(self.source)
        } else {
            builder
        }
    }

    /// Nodes and totals of one host-group or of the whole cluster
    pub fn group(&self, name: &str, details: bool) -> Result<GroupReport> {
        let scope = self.resolve_scope(name)?;
        let hosts = self.scope_hosts(&scope)?;
        let dump = self.status()?;

        let blocks = dump.select(&hosts, self.config.domain());
        let model = self.builder(details).build(&blocks, &[])?;
        let totals = ClusterTotals::from_nodes(&model.nodes);
        info!(group = scope.label(), nodes = totals.total_nodes, "group resolved");

        Ok(GroupReport {
            scope,
            totals,
            model,
        })
    }

    /// Jobs of `user` grouped by node, plus their pending jobs.
    ///
    /// The account check runs before any scheduler query.
    pub fn user(&self, user: &str, details: bool) -> Result<UserReport> {
        ensure_known_user(self.source, user)?;

        let dump = self.status()?;
        let user_field = self.config.layout(self.mode).job_user_field;
        let blocks: Vec<_> = dump
            .blocks
            .iter()
            .filter(|block| {
                block
                    .job_lines
                    .iter()
                    .any(|line| line.split_whitespace().nth(user_field) == Some(user))
            })
            .collect();

        let model = self
            .builder(true)
            .details_only_for(user)
            .build(&blocks, &dump.pending_lines)?;
        let nodes: Vec<Node> = model
            .user(user)
            .map(|u| u.nodes(&model.nodes).into_iter().cloned().collect())
            .unwrap_or_default();
        let processes = if details {
            self.process_samples(&nodes, user)
        } else {
            Vec::new()
        };

        Ok(UserReport {
            user: user.to_string(),
            job_count: model.user_job_count(user),
            cores_used: model.user_cores(user),
            pending: model.pending_for(user).cloned().collect(),
            nodes,
            detailed: details,
            processes,
        })
    }

    /// One monitoring fetch per node; a failed fetch leaves a gap for that node only
    fn process_samples(&self, nodes: &[Node], user: &str) -> Vec<NodeProcesses> {
        nodes
            .iter()
            .map(|node| {
                let host = self.config.short_name(node.name()).to_string();
                let snapshot = match self.source.process_snapshot(&host) {
                    Ok(page) => Some(ProcessSnapshot::parse(&page, user)),
                    Err(err) => {
                        warn!(host = %host, error = %err, "process snapshot unavailable");
                        None
                    }
                };
                NodeProcesses { host, snapshot }
            })
            .collect()
    }

    /// Host-groups `user` may use, optionally with each group's tree
    pub fn access(&self, user: &str, details: bool) -> Result<AccessReport> {
        let membership =
            MembershipResolver::new(self.config, self.source).resolve(user, QueueBreadth::All)?;

        let trees = if details {
            membership
                .accessible_groups
                .iter()
                .map(|group| {
                    let tree = self
                        .source
                        .host_group_tree(group)
                        .map_err(|err| warn!(group = %group, error = %err, "host-group tree unavailable"))
                        .ok();
                    (group.clone(), tree)
                })
                .collect()
        } else {
            Vec::new()
        };

        Ok(AccessReport { membership, trees })
    }

    /// Totals over every host-group `user` reaches through the primary queue
    pub fn primary_queue(&self, user: &str) -> Result<QueueReport> {
        let membership = MembershipResolver::new(self.config, self.source)
            .resolve(user, QueueBreadth::Primary)?;
        let dump = self.status()?;
        let builder = self.builder(false);

        let mut groups: Vec<Vec<Node>> = Vec::new();
        for group in &membership.accessible_groups {
            let hosts = match self.source.host_group_members(group) {
                Ok(hosts) => hosts,
                Err(err) => {
                    warn!(group = %group, error = %err, "host-group members unavailable");
                    continue;
                }
            };
            let blocks = dump.select(&hosts, self.config.domain());
            groups.push(builder.build(&blocks, &[])?.nodes);
        }

        let totals = aggregate_groups(groups.iter().map(Vec::as_slice));
        debug!(groups = groups.len(), nodes = totals.total_nodes, "primary queue aggregated");

        Ok(QueueReport {
            queue: self.config.primary_queue.clone(),
            membership,
            totals,
        })
    }

    /// Fully allocated nodes with near-zero load across the whole cluster
    pub fn efficiency(&self, threshold: Option<f64>) -> Result<EfficiencyReport> {
        let inventory = MachineInventory::discover(self.source)?;
        let hosts = inventory.names();

        let load_text = self.source.host_load(&host_list_csv(&hosts, self.config))?;
        let samples = parse_load_samples(&load_text, &self.config.load_layout)?;

        // A host is listed once per queue instance; any full instance counts
        let dump = self.status()?;
        let blocks = dump.instances(&hosts, self.config.domain());
        let model = self.builder(false).build(&blocks, &[])?;

        let analyzer = match threshold {
            Some(threshold) => EfficiencyAnalyzer::with_threshold(self.config, threshold),
            None => EfficiencyAnalyzer::new(self.config),
        };
        let nodes: Vec<FlaggedNode> = analyzer
            .analyze(&model, &samples)
            .into_iter()
            .map(|node| FlaggedNode {
                group: inventory.group_of(node.name()).map(String::from),
                node,
            })
            .collect();
        info!(machines = inventory.len(), flagged = nodes.len(), "efficiency scan finished");

        Ok(EfficiencyReport {
            threshold: analyzer.threshold(),
            machines: inventory.len(),
            nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fake::FakeSource;

    const DUMP: &str = "\
queuename                      qtype resv/used/tot. load_avg arch          states
---------------------------------------------------------------------------------
long@n1.c.org                  BIP   0/8/8          0.01     lx-amd64
   4711 0.50500 sim_a      jdoe         r     07/13/2016 09:45:56     8
---------------------------------------------------------------------------------
long@n2.c.org                  BIP   0/2/8          2.00     lx-amd64
   4712 0.50500 sim_b      asmith       r     07/13/2016 09:45:56     2
---------------------------------------------------------------------------------
long@n3.c.org                  BIP   0/0/8          0.00     lx-amd64      d
---------------------------------------------------------------------------------
debug@n4.c.org                 BIP   0/4/8          4.00     lx-amd64
   4713 0.50500 sim_c      jdoe         r     07/13/2016 09:45:56     4

###############################################################################
 - PENDING JOBS - PENDING JOBS - PENDING JOBS - PENDING JOBS - PENDING JOBS
###############################################################################
   4720 0.00000 sim_d      jdoe         qw    07/13/2016 12:00:00     8
   4721 0.00000 sim_e      asmith       hqw   07/13/2016 12:01:00     1
";

    const QHOST: &str = "\
HOSTNAME                ARCH         NCPU NSOC NCOR NTHR  LOAD  MEMTOT  MEMUSE  SWAPTO  SWAPUS
----------------------------------------------------------------------------------------------
global                  -               -    -    -    -     -       -       -       -       -
n1                      lx-amd64        8    2    8    8  0.01   62.9G   10.2G    2.0G     0.0
n2                      lx-amd64        8    2    8    8  2.00   62.9G   10.2G    2.0G     0.0
n3                      lx-amd64        8    2    8    8     -       -       -       -       -
n4                      lx-amd64        8    2    8    8  4.00   62.9G   10.2G    2.0G     0.0
";

    fn config() -> Config {
        Config {
            domain_suffix: Some(".c.org".to_string()),
            lookup_job_details: false,
            ..Default::default()
        }
    }

    fn source() -> FakeSource {
        FakeSource::new()
            .with("host_groups", "@hg1 @hg2")
            .with("members:@hg1", "n1.c.org n2.c.org n3.c.org")
            .with("members:@hg2", "n2.c.org n4.c.org")
            .with("tree:@hg1", "@hg1\n   n1.c.org\n   n2.c.org\n   n3.c.org\n")
            .with("tree:@hg2", "@hg2\n   n2.c.org\n   n4.c.org\n")
            .with("status_dump:-f", DUMP)
            .with("known_users", "root jdoe asmith")
            .with("host_load:n1,n2,n3,n4", QHOST)
    }

    #[test]
    fn test_unknown_group() {
        let config = config();
        let source = source();
        let query = ClusterQuery::new(&config, &source, QueryMode::Full);
        let err = query.group("hg9", false).unwrap_err();
        assert!(matches!(err, QueryError::UnknownHostGroup(ref g) if g == "hg9"));
        assert!(!source.called("status_dump"));
    }

    #[test]
    fn test_open_groups_skip_validation() {
        let config = config();
        let source = FakeSource::new();
        let query = ClusterQuery::new(&config, &source, QueryMode::Full);
        assert_eq!(
            query.resolve_scope("debug_d12chas").unwrap(),
            GroupScope::Named("@debug_d12chas".to_string())
        );
        assert_eq!(query.resolve_scope("all").unwrap(), GroupScope::All);
        assert!(source.calls().is_empty());
    }

    #[test]
    fn test_named_group_totals() {
        let config = config();
        let source = source();
        let report = ClusterQuery::new(&config, &source, QueryMode::Full)
            .group("@hg1", false)
            .unwrap();

        assert_eq!(report.scope, GroupScope::Named("@hg1".to_string()));
        assert_eq!(report.totals.total_nodes, 3);
        assert_eq!(report.totals.total_cores, 24);
        assert_eq!(report.totals.used_cores, 10);
        assert_eq!(report.totals.free_cores, 6);
        assert_eq!(report.totals.disabled_cores, 8);
        assert_eq!(report.totals.disabled_nodes, 1);
        assert_eq!(report.totals.empty_nodes, 0);
    }

    #[test]
    fn test_all_counts_shared_machine_once() {
        let config = config();
        let source = source();
        let report = ClusterQuery::new(&config, &source, QueryMode::Full)
            .group("all", false)
            .unwrap();

        assert_eq!(report.totals.total_nodes, 4);
        assert_eq!(report.totals.total_cores, 32);
        assert_eq!(
            report.totals.total_cores,
            report.totals.used_cores + report.totals.free_cores + report.totals.disabled_cores
        );
    }

    #[test]
    fn test_unknown_user_issues_no_status_query() {
        let config = config();
        let source = source();
        let err = ClusterQuery::new(&config, &source, QueryMode::Full)
            .user("jdoe3", false)
            .unwrap_err();
        assert!(matches!(err, QueryError::UnknownUser(_)));
        assert_eq!(source.calls(), vec!["known_users"]);
    }

    #[test]
    fn test_user_view() {
        let config = config();
        let source = source();
        let report = ClusterQuery::new(&config, &source, QueryMode::Full)
            .user("jdoe", false)
            .unwrap();

        let names: Vec<&str> = report.nodes.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["n1.c.org", "n4.c.org"]);
        assert_eq!(report.job_count, 2);
        assert_eq!(report.cores_used, 12);
        assert_eq!(report.pending.len(), 1);
        assert_eq!(report.pending[0].job.id(), "4720");
        assert!(report.processes.is_empty());
    }

    #[test]
    fn test_user_view_looks_up_own_jobs_only() {
        let config = Config {
            lookup_job_details: true,
            ..config()
        };
        let shared = "\
long@n1.c.org                  BIP   0/8/8          8.00     lx-amd64
   4711 0.50500 sim_a      jdoe         r     07/13/2016 09:45:56     4
   4714 0.50500 sim_f      asmith       r     07/13/2016 09:45:56     4
";
        let source = source()
            .with("status_dump:-f", shared)
            .with("job_detail:4711", "usage 1: cpu=1, maxvmem=2.0G\n");
        let report = ClusterQuery::new(&config, &source, QueryMode::Full)
            .user("jdoe", false)
            .unwrap();

        assert!(!report.detailed);
        assert_eq!(report.nodes[0].jobs()[0].max_memory(), "2.0G");
        assert!(source.called("job_detail:4711"));
        assert!(!source.called("job_detail:4714"));
    }

    #[test]
    fn test_user_details_keep_going_on_fetch_failure() {
        let config = config();
        let page = "48213 jdoe 20 0 2364012 1.2g 9112 R 100.0 1.9 120:11.48 sim_a\n";
        let source = source().with("process_snapshot:n1", page);
        let report = ClusterQuery::new(&config, &source, QueryMode::Full)
            .user("jdoe", true)
            .unwrap();

        assert_eq!(report.processes.len(), 2);
        assert_eq!(report.processes[0].host, "n1");
        assert_eq!(report.processes[0].snapshot.as_ref().map(|s| s.len()), Some(1));
        assert!(report.processes[1].snapshot.is_none());
    }

    #[test]
    fn test_efficiency_scan() {
        let config = config();
        let source = source();
        let report = ClusterQuery::new(&config, &source, QueryMode::Full)
            .efficiency(None)
            .unwrap();

        assert_eq!(report.machines, 4);
        assert_eq!(report.threshold, 0.05);
        assert_eq!(report.nodes.len(), 1);
        assert_eq!(report.nodes[0].node.name(), "n1.c.org");
        assert_eq!(report.nodes[0].group.as_deref(), Some("@hg1"));
        assert_eq!(report.nodes[0].node.jobs()[0].owner(), "jdoe");
    }

    #[test]
    fn test_efficiency_finds_full_instance_after_idle_one() {
        let config = config();
        let dump = "\
queuename                      qtype resv/used/tot. load_avg arch          states
---------------------------------------------------------------------------------
debug@n1.c.org                 BIP   0/0/8          0.01     lx-amd64
---------------------------------------------------------------------------------
long@n1.c.org                  BIP   0/8/8          0.01     lx-amd64
   4711 0.50500 sim_a      jdoe         r     07/13/2016 09:45:56     8
";
        let source = FakeSource::new()
            .with("host_groups", "@hg1")
            .with("tree:@hg1", "@hg1\n   n1.c.org\n")
            .with("status_dump:-f", dump)
            .with("host_load:n1", QHOST);

        let report = ClusterQuery::new(&config, &source, QueryMode::Full)
            .efficiency(None)
            .unwrap();

        assert_eq!(report.nodes.len(), 1);
        assert_eq!(report.nodes[0].node.queue(), "long");
        assert_eq!(report.nodes[0].node.jobs()[0].id(), "4711");
    }

    #[test]
    fn test_primary_queue_totals() {
        let config = config();
        let source = source()
            .with("user_lists", "L1")
            .with("user_list:L1", "name L1\nentries jdoe\n")
            .with("queue:long", "qname long\nuser_lists [@hg1=L1],[@hg2=L1]\n")
            .with("members:@general_access", "n2.c.org")
            .with("members:@debug_d12chas", "n4.c.org");

        let report = ClusterQuery::new(&config, &source, QueryMode::Full)
            .primary_queue("jdoe")
            .unwrap();

        assert_eq!(report.queue, "long");
        assert_eq!(report.totals.total_nodes, 4);
        assert!(!source.called("queue:hpc"));
    }

    #[test]
    fn test_access_details_record_tree_gaps() {
        let config = config();
        let source = source()
            .with("user_lists", "L1")
            .with("user_list:L1", "name L1\nentries jdoe\n")
            .with("queue:long", "qname long\nuser_lists [@hg1=L1]\n")
            .with("queue:hpc", "qname hpc\nuser_lists NONE\n")
            .with("queue:gpu", "qname gpu\nuser_lists NONE\n")
            .with("queue:gpu-debug", "qname gpu-debug\nuser_lists NONE\n");

        let report = ClusterQuery::new(&config, &source, QueryMode::Full)
            .access("jdoe", true)
            .unwrap();

        assert_eq!(report.trees.len(), 3);
        assert_eq!(report.trees[0].0, "@hg1");
        assert!(report.trees[0].1.is_some());
        assert!(report.trees[1].1.is_none());
    }
}
