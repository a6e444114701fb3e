// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Core and node totals over a set of nodes, with de-duplication across
//! overlapping host-groups.

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::model::Node;
use crate::source::StatusSource;

/// Core and node counts of a host-group, queue or the whole cluster.
///
/// `total_cores == used_cores + free_cores + disabled_cores` and
/// `total_nodes == used_nodes() + empty_nodes + disabled_nodes`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusterTotals {
    pub total_nodes: u32,
    pub total_cores: u32,
    pub used_cores: u32,
    pub free_cores: u32,
    pub disabled_cores: u32,
    pub disabled_nodes: u32,
    pub empty_nodes: u32,
}

impl ClusterTotals {
    pub fn from_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut totals = Self::default();
        for node in nodes {
            totals.add_node(node);
        }
        totals
    }

    /// Count one node. Disabled nodes only contribute disabled cores, even
    /// if the scheduler still lists jobs on them.
    pub fn add_node(&mut self, node: &Node) {
        self.total_nodes += 1;
        self.total_cores += node.total_cores();

        if node.is_disabled() {
            self.disabled_cores += node.total_cores();
            self.disabled_nodes += 1;
        } else if node.is_empty() {
            self.empty_nodes += 1;
            self.free_cores += node.total_cores();
        } else {
            self.used_cores += node.used_cores();
            self.free_cores += node.free_cores();
        }
    }

    /// Nodes that are neither disabled nor empty
    pub fn used_nodes(&self) -> u32 {
        self.total_nodes - self.empty_nodes - self.disabled_nodes
    }
}

/// Nodes of several groups with each node name kept once; the first group
/// that lists a node wins.
pub fn dedup_nodes<'a, G>(groups: G) -> Vec<&'a Node>
where
    G: IntoIterator<Item = &'a [Node]>,
{
    let mut seen: HashSet<&str> = HashSet::new();
    let mut nodes = Vec::new();
    for group in groups {
        for node in group {
            if seen.insert(node.name()) {
                nodes.push(node);
            }
        }
    }
    nodes
}

/// Totals over several groups, counting shared nodes once
pub fn aggregate_groups<'a, G>(groups: G) -> ClusterTotals
where
    G: IntoIterator<Item = &'a [Node]>,
{
    ClusterTotals::from_nodes(dedup_nodes(groups))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Machine {
    pub name: String,
    /// Host-group that first listed this machine
    pub group: String,
}

/// Every machine known to the scheduler, each attributed to one host-group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MachineInventory {
    machines: Vec<Machine>,
}

impl MachineInventory {
    /// Walk host-groups in the order the scheduler lists them.
    ///
    /// Attribution depends on that order, which the scheduler does not
    /// promise to keep stable between calls.
    pub fn discover(source: &dyn StatusSource) -> Result<Self> {
        let mut inventory = Self::default();
        for group in source.host_groups()? {
            let tree = source.host_group_tree(&group)?;
            let added = inventory.add_tree(&group, &tree);
            debug!(group = %group, added, "host-group walked");
        }
        Ok(inventory)
    }

    /// Add machines of one `qconf -shgrp_tree` output; returns how many were new
    fn add_tree(&mut self, group: &str, tree: &str) -> usize {
        let before = self.machines.len();
        for token in tree.split_whitespace() {
            if token.contains('@') || self.contains(token) {
                continue;
            }
            self.machines.push(Machine {
                name: token.to_string(),
                group: group.to_string(),
            });
        }
        self.machines.len() - before
    }

    pub fn contains(&self, name: &str) -> bool {
        self.machines.iter().any(|m| m.name == name)
    }

    /// Machine names in discovery order
    pub fn names(&self) -> Vec<String> {
        self.machines.iter().map(|m| m.name.clone()).collect()
    }

    pub fn group_of(&self, name: &str) -> Option<&str> {
        self.machines
            .iter()
            .find(|m| m.name == name)
            .map(|m| m.group.as_str())
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}
