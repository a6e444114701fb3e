// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

use serde::Serialize;

use crate::config::HostState;

/// Parsed host summary line, e.g.
/// `long@node01.cluster.org  BIP  0/4/8  0.05  lx-amd64  d`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostSummary {
    /// Queue instance prefix (`long` in `long@node01`)
    pub queue: String,
    pub host: String,
    pub qtype: String,
    pub reserved: u32,
    pub used: u32,
    pub total: u32,
    /// `None` when the scheduler reports `-NA-`
    pub load_avg: Option<f64>,
    pub arch: String,
    pub state_code: Option<String>,
    #[serde(skip)]
    pub state: HostState,
}

impl HostSummary {
    pub fn is_disabled(&self) -> bool {
        self.state == HostState::Disabled
    }
}

/// One host's section of a status dump
#[derive(Debug, Clone, PartialEq)]
pub struct HostBlock {
    pub summary: HostSummary,
    /// Resource attribute lines (`hl:mem_total=62.8G`), `qstat -F` only
    pub resources: Vec<String>,
    /// Raw running-job lines, in dump order
    pub job_lines: Vec<String>,
}

impl HostBlock {
    pub fn new(summary: HostSummary) -> Self {
        Self {
            summary,
            resources: Vec::new(),
            job_lines: Vec::new(),
        }
    }

    pub fn host(&self) -> &str {
        &self.summary.host
    }

    /// Value of a resource attribute by name, ignoring its `hl:`/`qf:` scope
    pub fn resource(&self, name: &str) -> Option<&str> {
        self.resources.iter().find_map(|line| {
            let (lhs, value) = line.trim().split_once('=')?;
            let key = lhs.split_once(':').map(|(_, k)| k).unwrap_or(lhs);
            (key == name).then_some(value)
        })
    }
}

/// Result of splitting a full status dump
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusDump {
    /// Host blocks in dump order; a host may appear once per queue instance
    pub blocks: Vec<HostBlock>,
    /// Pending-job lines with the section header removed
    pub pending_lines: Vec<String>,
}

impl StatusDump {
    /// First block of the given host, matching with or without the domain suffix
    pub fn find_host(&self, name: &str, domain: &str) -> Option<&HostBlock> {
        self.blocks
            .iter()
            .find(|block| same_host(block.host(), name, domain))
    }

    /// First block of each named host, in the order of `names`.
    ///
    /// Hosts missing from the dump are skipped; repeated names yield one block.
    pub fn select(&self, names: &[String], domain: &str) -> Vec<&HostBlock> {
        let mut selected: Vec<&HostBlock> = Vec::new();
        for name in names {
            match self.find_host(name, domain) {
                Some(block) if !selected.iter().any(|b| b.host() == block.host()) => {
                    selected.push(block)
                }
                Some(_) => {}
                None => tracing::debug!(host = %name, "host not present in status dump"),
            }
        }
        selected
    }

    /// Every queue instance of each named host, grouped in the order of `names`
    pub fn instances(&self, names: &[String], domain: &str) -> Vec<&HostBlock> {
        let mut selected: Vec<&HostBlock> = Vec::new();
        for name in names {
            for block in self.blocks.iter().filter(|b| same_host(b.host(), name, domain)) {
                if !selected.iter().any(|b| std::ptr::eq(*b, block)) {
                    selected.push(block);
                }
            }
        }
        selected
    }
}

pub fn same_host(a: &str, b: &str, domain: &str) -> bool {
    if a == b {
        return true;
    }
    if domain.is_empty() {
        return false;
    }
    a.strip_suffix(domain).unwrap_or(a) == b.strip_suffix(domain).unwrap_or(b)
}
