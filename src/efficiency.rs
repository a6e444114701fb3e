// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Low-efficiency detection: nodes the scheduler reports as fully allocated
//! while their measured load stays near zero.

use serde::Serialize;
use tracing::trace;

use crate::config::{Config, LoadLayout};
use crate::error::{QueryError, Result};
use crate::model::{ClusterModel, Node};
use crate::status::types::same_host;

/// Load of one host from `qhost`; `None` when the host is powered off
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSample {
    pub host: String,
    pub load: Option<f64>,
}

/// Parse `qhost -h` output.
///
/// ```text
/// HOSTNAME                ARCH         NCPU NSOC NCOR NTHR  LOAD  MEMTOT  MEMUSE  SWAPTO  SWAPUS
/// ----------------------------------------------------------------------------------------------
/// global                  -               -    -    -    -     -       -       -       -       -
/// d12chas400              lx-amd64       24    2   24   24  0.01   62.9G   10.2G    2.0G     0.0
/// ```
pub fn parse_load_samples(text: &str, layout: &LoadLayout) -> Result<Vec<LoadSample>> {
    let mut samples = Vec::new();
    for line in text.lines().skip(layout.header_lines) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < layout.min_fields {
            trace!(line, "skipping short qhost line");
            continue;
        }

        let raw = fields[layout.load_field];
        let load = if raw == layout.unavailable {
            None
        } else {
            Some(raw.parse::<f64>().map_err(|_| {
                QueryError::unsupported("qhost", format!("load '{}' is not a number", raw))
            })?)
        };

        samples.push(LoadSample {
            host: fields[layout.host_field].to_string(),
            load,
        });
    }
    Ok(samples)
}

/// Comma separated short host names, as `qhost -h` expects them
pub fn host_list_csv(hosts: &[String], config: &Config) -> String {
    hosts
        .iter()
        .map(|h| config.short_name(h))
        .collect::<Vec<_>>()
        .join(",")
}

pub struct EfficiencyAnalyzer<'a> {
    threshold: f64,
    domain: &'a str,
}

impl<'a> EfficiencyAnalyzer<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self::with_threshold(config, config.low_load_threshold)
    }

    pub fn with_threshold(config: &'a Config, threshold: f64) -> Self {
        Self {
            threshold,
            domain: config.domain(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Fully allocated, powered on and below the load threshold
    pub fn is_low_efficiency(&self, node: &Node, load: Option<f64>) -> bool {
        match load {
            Some(load) => node.is_full() && load < self.threshold,
            None => false,
        }
    }

    /// Flagged nodes in sample order, each carrying its load and job list.
    ///
    /// `model` may hold one node per queue instance of a host; the first full
    /// instance flags the host and supplies the jobs.
    pub fn analyze(&self, model: &ClusterModel, samples: &[LoadSample]) -> Vec<Node> {
        let mut flagged = Vec::new();
        for sample in samples {
            let mut instances = model
                .nodes
                .iter()
                .filter(|n| same_host(n.name(), &sample.host, self.domain))
                .peekable();
            if instances.peek().is_none() {
                trace!(host = %sample.host, "load sample without status entry");
                continue;
            }

            if let Some(node) = instances.find(|n| self.is_low_efficiency(n, sample.load)) {
                let mut node = node.clone();
                if let Some(load) = sample.load {
                    node.set_load(load);
                }
                flagged.push(node);
            }
        }
        flagged
    }
}
