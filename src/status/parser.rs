// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Splits `qstat -f` / `qstat -F` output into host blocks.
//!
//! The dump has no grammar, only conventions:
//!
//! ```text
//! queuename                      qtype resv/used/tot. load_avg arch          states
//! ---------------------------------------------------------------------------------
//! long@node01.cluster.org        BIP   0/4/8          0.05     lx-amd64
//!   4711 0.50500 sim_a      jdoe         r     07/13/2016 09:45:56     4
//! ---------------------------------------------------------------------------------
//! long@node02.cluster.org        BIP   0/0/8          0.01     lx-amd64      d
//!
//! ###############################################################################
//!  - PENDING JOBS - PENDING JOBS - PENDING JOBS - PENDING JOBS - PENDING JOBS
//! ###############################################################################
//!   4712 0.00000 sim_b      jdoe         qw    07/13/2016 09:50:01     8
//! ```
//!
//! The scan is a small line state machine. A pending-jobs marker that shows up
//! while a host is still open closes that host (its text is kept) before the
//! pending section starts; the last host of the dump has no trailing separator.

use tracing::trace;

use super::types::{HostBlock, HostSummary, StatusDump};
use crate::config::{Config, FieldLayout, HostState, QueryMode, StateCodeTable};
use crate::error::{QueryError, Result};

/// First column title of the `qstat` header line
const COLUMN_HEADER: &str = "queuename";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Waiting for the next `queue@host` summary line
    HostSummary,
    /// Inside `qstat -F` resource attributes, before the job marker
    Resources,
    /// Collecting job lines of the open host
    JobList,
    /// Between the `#` rows of the pending-jobs header
    PendingBoundary,
    /// Collecting pending-job lines until the end of the dump
    Pending,
}

pub struct StatusParser<'a> {
    mode: QueryMode,
    layout: &'a FieldLayout,
    codes: &'a StateCodeTable,
    pending_marker_width: usize,
    separator_width: usize,
}

impl<'a> StatusParser<'a> {
    pub fn new(config: &'a Config, mode: QueryMode) -> Self {
        Self {
            mode,
            layout: config.layout(mode),
            codes: &config.state_codes,
            pending_marker_width: config.pending_marker_width,
            separator_width: config.separator_width,
        }
    }

    pub fn parse(&self, text: &str) -> Result<StatusDump> {
        let mut dump = StatusDump::default();
        let mut open: Option<HostBlock> = None;
        let mut state = ScanState::HostSummary;

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            if self.is_pending_marker(trimmed) {
                // Last host before the pending section has no separator of its own
                dump.blocks.extend(open.take());
                state = ScanState::PendingBoundary;
                continue;
            }

            state = match state {
                ScanState::PendingBoundary if is_pending_header(trimmed) => state,
                ScanState::PendingBoundary | ScanState::Pending => {
                    dump.pending_lines.push(trimmed.to_string());
                    ScanState::Pending
                }
                _ if self.is_separator(trimmed) => {
                    dump.blocks.extend(open.take());
                    ScanState::HostSummary
                }
                ScanState::HostSummary => {
                    if self.is_column_header(trimmed) {
                        trace!(line = trimmed, "skipping column header");
                        continue;
                    }
                    if !is_summary_line(trimmed, self.layout) {
                        return Err(self.shape_error(format!(
                            "expected a host line, found '{}'",
                            trimmed
                        )));
                    }
                    open = Some(HostBlock::new(self.parse_summary(trimmed)?));
                    match self.layout.job_section_marker {
                        Some(_) => ScanState::Resources,
                        None => ScanState::JobList,
                    }
                }
                ScanState::Resources => {
                    let marker = self.layout.job_section_marker.as_deref().unwrap_or_default();
                    if let Some(block) = open.as_mut() {
                        block.resources.push(trimmed.to_string());
                    }
                    if trimmed.starts_with(marker) {
                        ScanState::JobList
                    } else {
                        ScanState::Resources
                    }
                }
                ScanState::JobList => {
                    if let Some(block) = open.as_mut() {
                        block.job_lines.push(trimmed.to_string());
                    }
                    ScanState::JobList
                }
            };
        }

        dump.blocks.extend(open.take());
        Ok(dump)
    }

    fn parse_summary(&self, line: &str) -> Result<HostSummary> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < self.layout.min_summary_fields {
            return Err(self.shape_error(format!(
                "host line has {} fields, expected at least {}: '{}'",
                fields.len(),
                self.layout.min_summary_fields,
                line
            )));
        }

        // `queue@host`, or a bare host name when the dump has no queue instances
        let queue_host = fields[self.layout.queue_host_field];
        let (queue, host) = queue_host.split_once('@').unwrap_or(("", queue_host));
        if host.is_empty() {
            return Err(self.shape_error(format!("no host name in '{}'", queue_host)));
        }

        let (reserved, used, total) = parse_core_fraction(fields[self.layout.core_fraction_field])
            .ok_or_else(|| {
                self.shape_error(format!(
                    "core fraction '{}' of {} is not used/total",
                    fields[self.layout.core_fraction_field], host
                ))
            })?;

        let state_code = fields.get(self.layout.state_code_field).map(|s| s.to_string());
        let state = match state_code.as_deref() {
            None => HostState::Schedulable,
            Some(code) => self.codes.classify(code).ok_or_else(|| QueryError::UnknownStateCode {
                host: host.to_string(),
                code: code.to_string(),
            })?,
        };

        Ok(HostSummary {
            queue: queue.to_string(),
            host: host.to_string(),
            qtype: fields.get(1).map(|s| s.to_string()).unwrap_or_default(),
            reserved,
            used,
            total,
            load_avg: fields
                .get(self.layout.load_field)
                .and_then(|s| s.parse().ok()),
            arch: fields
                .get(self.layout.arch_field)
                .map(|s| s.to_string())
                .unwrap_or_default(),
            state_code,
            state,
        })
    }

    fn shape_error(&self, detail: String) -> QueryError {
        QueryError::unsupported(format!("qstat {}", self.mode.flag()), detail)
    }

    fn is_column_header(&self, trimmed: &str) -> bool {
        trimmed.split_whitespace().nth(self.layout.queue_host_field) == Some(COLUMN_HEADER)
    }

    fn is_pending_marker(&self, trimmed: &str) -> bool {
        trimmed.len() >= self.pending_marker_width && trimmed.chars().all(|c| c == '#')
    }

    fn is_separator(&self, trimmed: &str) -> bool {
        trimmed.len() >= self.separator_width && trimmed.chars().all(|c| c == '-')
    }
}

/// A `queue@host` field or a core fraction where the layout expects one
fn is_summary_line(trimmed: &str, layout: &FieldLayout) -> bool {
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    let queue_host = fields
        .get(layout.queue_host_field)
        .is_some_and(|field| field.contains('@'));
    let fraction = fields
        .get(layout.core_fraction_field)
        .is_some_and(|field| parse_core_fraction(field).is_some());
    queue_host || fraction
}

fn is_pending_header(trimmed: &str) -> bool {
    trimmed.starts_with('-') && trimmed.contains("JOBS")
}

/// Parse `used/total` or `reserved/used/total` into (reserved, used, total)
pub fn parse_core_fraction(field: &str) -> Option<(u32, u32, u32)> {
    let parts: Vec<&str> = field.split('/').collect();
    let (reserved, used, total) = match parts.as_slice() {
        [used, total] => ("0", *used, *total),
        [reserved, used, total] => (*reserved, *used, *total),
        _ => return None,
    };
    Some((
        reserved.parse().ok()?,
        used.parse().ok()?,
        total.parse().ok()?,
    ))
}
