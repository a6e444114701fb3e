// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Per-process samples scraped from the monitoring page of a node.
//!
//! The page embeds plain `top` output:
//!
//! ```text
//!   PID USER      PR  NI    VIRT    RES    SHR S  %CPU %MEM     TIME+ COMMAND
//! 48213 jdoe      20   0 2364012 1.2g    9112 R 100.0  1.9 120:11.48 sim_a
//! ```

use serde::Serialize;
use tracing::trace;

const PID_FIELD: usize = 0;
const USER_FIELD: usize = 1;
const RES_FIELD: usize = 5;
const CPU_FIELD: usize = 8;
const TIME_FIELD: usize = 10;
const COMMAND_FIELD: usize = 11;

const KB_PER_MB: f64 = 1_000.0;
const KB_PER_GB: f64 = 1_000_000.0;
const KB_PER_TB: f64 = 1_000_000_000.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessSample {
    pub pid: String,
    /// Resident memory as reported (`123456`, `512m`, `1.2g`)
    pub resident: String,
    /// `None` when the reported value has no known unit
    pub resident_kb: Option<f64>,
    pub cpu_percent: String,
    pub time: String,
    pub command: String,
}

/// Processes of one user on one node
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProcessSnapshot {
    pub samples: Vec<ProcessSample>,
}

impl ProcessSnapshot {
    /// Keep the `top` lines owned by `user`
    pub fn parse(page: &str, user: &str) -> Self {
        let samples = page
            .lines()
            .filter_map(|line| {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() <= COMMAND_FIELD || fields[USER_FIELD] != user {
                    return None;
                }
                let resident = fields[RES_FIELD];
                Some(ProcessSample {
                    pid: fields[PID_FIELD].to_string(),
                    resident: resident.to_string(),
                    resident_kb: to_kb(resident),
                    cpu_percent: fields[CPU_FIELD].to_string(),
                    time: fields[TIME_FIELD].to_string(),
                    command: fields[COMMAND_FIELD].to_string(),
                })
            })
            .collect();
        Self { samples }
    }

    /// Resident memory of all samples, skipping values without a known unit
    pub fn total_kb(&self) -> f64 {
        self.samples
            .iter()
            .filter_map(|s| {
                if s.resident_kb.is_none() {
                    trace!(pid = %s.pid, resident = %s.resident, "memory value skipped");
                }
                s.resident_kb
            })
            .sum()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Convert a `top` memory value to KB; plain numbers already are KB.
pub fn to_kb(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let (number, factor) = match raw.chars().last()? {
        't' | 'T' => (&raw[..raw.len() - 1], KB_PER_TB),
        'g' | 'G' => (&raw[..raw.len() - 1], KB_PER_GB),
        'm' | 'M' => (&raw[..raw.len() - 1], KB_PER_MB),
        'k' | 'K' => (&raw[..raw.len() - 1], 1.0),
        _ => (raw, 1.0),
    };
    number.parse::<f64>().ok().map(|n| n * factor)
}

/// Human readable memory amount
pub fn format_mem(kb: f64) -> String {
    if kb >= KB_PER_GB {
        format!("{:.2} GB", kb / KB_PER_GB)
    } else if kb >= KB_PER_MB {
        format!("{:.1} MB", kb / KB_PER_MB)
    } else {
        format!("{:.0} KB", kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "\
<html><body><pre>
top - 10:01:02 up 12 days,  3 users,  load average: 8.01, 8.02, 8.00
  PID USER      PR  NI    VIRT    RES    SHR S  %CPU %MEM     TIME+ COMMAND
48213 jdoe      20   0 2364012   1.2g   9112 R 100.0  1.9 120:11.48 sim_a
48214 jdoe      20   0  364012 204800   9112 R  99.7  0.3 120:10.02 sim_a
48215 jdoe3     20   0  364012   512m   9112 R  99.7  0.3 120:10.02 other
  901 root      20   0   24012   2012   1112 S   0.0  0.0   0:01.00 sshd
</pre></body></html>
";

    #[test]
    fn test_parse_keeps_user_processes() {
        let snapshot = ProcessSnapshot::parse(PAGE, "jdoe");
        assert_eq!(snapshot.len(), 2);
        let first = &snapshot.samples[0];
        assert_eq!(first.pid, "48213");
        assert_eq!(first.resident, "1.2g");
        assert_eq!(first.cpu_percent, "100.0");
        assert_eq!(first.time, "120:11.48");
        assert_eq!(first.command, "sim_a");
    }

    #[test]
    fn test_total_memory() {
        let snapshot = ProcessSnapshot::parse(PAGE, "jdoe");
        assert!((snapshot.total_kb() - 1_404_800.0).abs() < 1e-6);
        assert_eq!(format_mem(snapshot.total_kb()), "1.40 GB");
    }

    #[test]
    fn test_no_processes() {
        let snapshot = ProcessSnapshot::parse(PAGE, "nobody");
        assert!(snapshot.is_empty());
        assert_eq!(snapshot.total_kb(), 0.0);
    }

    #[test]
    fn test_to_kb() {
        assert_eq!(to_kb("123456"), Some(123456.0));
        assert_eq!(to_kb("512m"), Some(512_000.0));
        assert_eq!(to_kb("3.5g"), Some(3_500_000.0));
        assert_eq!(to_kb("1.1t"), Some(1_100_000_000.0));
        assert_eq!(to_kb("lots"), None);
        assert_eq!(to_kb(""), None);
    }

    #[test]
    fn test_format_mem() {
        assert_eq!(format_mem(512.0), "512 KB");
        assert_eq!(format_mem(204_800.0), "204.8 MB");
        assert_eq!(format_mem(3_500_000.0), "3.50 GB");
    }
}
