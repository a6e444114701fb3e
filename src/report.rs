// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Plain-text and JSON rendering of query results.

use std::io::{self, Write};

use serde::Serialize;

use crate::aggregate::ClusterTotals;
use crate::model::{Node, PendingJob};
use crate::monitor::format_mem;
use crate::query::{AccessReport, EfficiencyReport, GroupReport, QueueReport, UserReport};

const TERM_WIDTH: usize = 80;
const HALF: usize = TERM_WIDTH / 2;
const INDENT: &str = "    ";

/// Core map cells
const OPEN_CORE: &str = "[O]";
const USED_CORE: &str = "[~]";
const DISABLED_CORE: &str = "[#]";

/// Above this many cores the map switches to wide rows
const WIDE_MAP_CORES: u32 = 400;
const WIDE_ROW: usize = 39;
const NARROW_ROW: usize = 30;

pub fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)
}

fn rule<W: Write>(out: &mut W, width: usize, c: char) -> io::Result<()> {
    writeln!(out, "{}", c.to_string().repeat(width))
}

fn banner<W: Write>(out: &mut W, title: &str) -> io::Result<()> {
    rule(out, TERM_WIDTH, '=')?;
    writeln!(out, "={:^w$}=", title, w = TERM_WIDTH - 2)?;
    rule(out, TERM_WIDTH, '=')
}

fn row<W: Write>(out: &mut W, label: &str, value: impl std::fmt::Display) -> io::Result<()> {
    writeln!(out, "{:<HALF$}{}", label, value)
}

pub fn write_totals<W: Write>(out: &mut W, label: &str, totals: &ClusterTotals) -> io::Result<()> {
    writeln!(out, "{}", label)?;
    rule(out, 60, '-')?;
    row(out, "Total Cores:", totals.total_cores)?;
    row(out, "Used Cores:", totals.used_cores)?;
    row(out, "Free Cores:", totals.free_cores)?;
    row(out, "Disabled/Error Cores:", totals.disabled_cores)?;
    writeln!(out)?;
    row(out, "Total Nodes:", totals.total_nodes)?;
    row(out, "Used Nodes:", totals.used_nodes())?;
    row(out, "Disabled/Error Nodes:", totals.disabled_nodes)?;
    row(out, "Empty Nodes:", totals.empty_nodes)
}

pub fn write_group<W: Write>(out: &mut W, report: &GroupReport) -> io::Result<()> {
    write_totals(out, report.scope.label(), &report.totals)
}

/// Totals followed by one line per node and its jobs
pub fn write_group_details<W: Write>(out: &mut W, report: &GroupReport) -> io::Result<()> {
    let t = &report.totals;
    writeln!(out, "Detailed info pertaining to: {}", report.scope.label())?;
    writeln!(out, "Total Nodes: {}", t.total_nodes)?;
    writeln!(
        out,
        "Total Cores: {}{INDENT}Used Cores: {}{INDENT}Free Cores: {}{INDENT}Disabled Cores: {}",
        t.total_cores, t.used_cores, t.free_cores, t.disabled_cores
    )?;
    writeln!(out)?;
    writeln!(out, "{:<HALF$}Used Cores/Total Cores", "Node name")?;
    for node in &report.model.nodes {
        write_node_line(out, node)?;
        for job in node.jobs() {
            writeln!(
                out,
                "{INDENT}{INDENT}{:<12}{:<12}{:<20}{:>4}  {:<8.5}{}",
                job.id(),
                job.owner(),
                job.name(),
                job.cores(),
                job.priority(),
                job.max_memory()
            )?;
        }
    }
    Ok(())
}

fn write_node_line<W: Write>(out: &mut W, node: &Node) -> io::Result<()> {
    let cores = format!("{}/{}", node.used_cores(), node.total_cores());
    let state = if node.is_disabled() { "Unavailable" } else { "" };
    let memory = match node.memory() {
        Some(m) => format!("{INDENT}mem {}/{}", m.used.as_deref().unwrap_or("?"), m.total),
        None => String::new(),
    };
    writeln!(
        out,
        "{:<HALF$}{:>7}{INDENT}{}{}",
        format!("{INDENT}{}", node.name()),
        cores,
        state,
        memory
    )
}

/// Core map: disabled nodes draw only `[#]`, others free then used cores
pub fn write_visual<W: Write>(out: &mut W, report: &GroupReport) -> io::Result<()> {
    let t = &report.totals;
    let per_row = if t.total_cores > WIDE_MAP_CORES {
        WIDE_ROW
    } else {
        NARROW_ROW
    };
    let width = per_row * OPEN_CORE.len();

    writeln!(out, "{:^width$}", format!("{} Queue", report.scope.label()))?;
    rule(out, width, '-')?;
    row(out, "Total Cores:", t.total_cores)?;
    row(out, "Used Cores:", t.used_cores)?;
    row(out, "Free Cores:", t.free_cores)?;
    row(out, "Disabled/Error Cores:", t.disabled_cores)?;
    row(out, "Total Nodes:", t.total_nodes)?;
    rule(out, width, '-')?;
    writeln!(
        out,
        "{:^width$}",
        format!("{OPEN_CORE} = Open Core{INDENT}{USED_CORE} = Used Core{INDENT}{DISABLED_CORE} = Disabled/Err Core")
    )?;
    writeln!(out)?;

    let cells = report.model.nodes.iter().flat_map(|node| {
        let (open, used, disabled) = if node.is_disabled() {
            (0, 0, node.total_cores())
        } else {
            (node.free_cores(), node.used_cores(), 0)
        };
        std::iter::repeat(OPEN_CORE)
            .take(open as usize)
            .chain(std::iter::repeat(USED_CORE).take(used as usize))
            .chain(std::iter::repeat(DISABLED_CORE).take(disabled as usize))
    });

    let mut drawn = 0;
    for cell in cells {
        write!(out, "{}", cell)?;
        drawn += 1;
        if drawn == per_row {
            writeln!(out)?;
            drawn = 0;
        }
    }
    if drawn > 0 {
        writeln!(out)?;
    }
    rule(out, width, '-')
}

pub fn write_lines<W: Write>(out: &mut W, items: &[String]) -> io::Result<()> {
    for item in items {
        writeln!(out, "{}", item)?;
    }
    Ok(())
}

/// Jobs of one user per node; detailed reports add process samples
pub fn write_user<W: Write>(out: &mut W, report: &UserReport) -> io::Result<()> {
    let title = if report.detailed {
        format!("Detailed Process information for {}.", report.user)
    } else {
        format!("Job information for {}.", report.user)
    };
    banner(out, &title)?;

    for (idx, node) in report.nodes.iter().enumerate() {
        writeln!(out)?;
        writeln!(
            out,
            "{:<HALF$}{:>HALF$}",
            node.name(),
            format!("Core Usage: {}/{}", node.used_cores(), node.total_cores())
        )?;
        rule(out, TERM_WIDTH - 1, '-')?;
        writeln!(
            out,
            "{:^20}{:^20}{:^9}{:^31}",
            "Job ID", "Job Name", "Cores", "Start Time"
        )?;
        for job in node.jobs().iter().filter(|j| j.owner() == report.user) {
            writeln!(
                out,
                "{:^20}{:^20}{:^9}{:^31}",
                job.id(),
                job.name(),
                job.cores(),
                job.start_time().unwrap_or("NA")
            )?;
        }

        if let Some(processes) = report.processes.get(idx) {
            match &processes.snapshot {
                Some(snapshot) => {
                    writeln!(
                        out,
                        "{:^10}{:^20}{:^20}{:^10}{:^16}",
                        "PID", "ProcName", "Memory Used", "CPU%", "TIME"
                    )?;
                    for p in &snapshot.samples {
                        let mem = p.resident_kb.map(format_mem).unwrap_or_else(|| p.resident.clone());
                        writeln!(
                            out,
                            "{:^10}{:^20}{:^20}{:^10}{:^16}",
                            p.pid, p.command, mem, p.cpu_percent, p.time
                        )?;
                    }
                    writeln!(
                        out,
                        "User's total memory usage on Node: {}",
                        format_mem(snapshot.total_kb())
                    )?;
                    writeln!(
                        out,
                        "Total number of processes owned by user on Node: {}",
                        snapshot.len()
                    )?;
                }
                None => writeln!(out, "Process information unavailable for {}", processes.host)?,
            }
        }
    }

    writeln!(out, "----")?;
    writeln!(out, "{}'s Total Running Jobs: {}", report.user, report.job_count)?;
    writeln!(out, "Total cores used: {}", report.cores_used)?;
    write_pending(out, &report.user, &report.pending)
}

fn write_pending<W: Write>(out: &mut W, user: &str, pending: &[PendingJob]) -> io::Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    writeln!(out)?;
    rule(out, TERM_WIDTH, '#')?;
    writeln!(out, "{:^TERM_WIDTH$}", format!("{}'s pending jobs:", user))?;
    rule(out, TERM_WIDTH, '#')?;
    for p in pending {
        writeln!(
            out,
            "{:<12}{:<20}{:>5}  {:<8}{}",
            p.job.id(),
            p.job.name(),
            p.job.cores(),
            p.wait_status.label(),
            p.queued_since
        )?;
    }
    Ok(())
}

pub fn write_access<W: Write>(out: &mut W, report: &AccessReport) -> io::Result<()> {
    let m = &report.membership;
    writeln!(out)?;
    writeln!(out, "Host-group info pertaining to {}:", m.user_name)?;
    rule(out, 60, '-')?;
    writeln!(out, "User-lists: {}", m.user_lists.join(" "))?;
    writeln!(out, "Host-groups:")?;
    for group in &m.accessible_groups {
        writeln!(out, "{INDENT}{}", group)?;
    }

    for (group, tree) in &report.trees {
        writeln!(out)?;
        match tree {
            Some(tree) => write!(out, "{}", tree)?,
            None => writeln!(out, "{} (tree unavailable)", group)?,
        }
    }
    Ok(())
}

pub fn write_queue<W: Write>(out: &mut W, report: &QueueReport) -> io::Result<()> {
    let label = format!("{} queue for {}", report.queue, report.membership.user_name);
    write_totals(out, &label, &report.totals)
}

pub fn write_efficiency<W: Write>(out: &mut W, report: &EfficiencyReport) -> io::Result<()> {
    banner(out, "Low Efficiency Nodes")?;
    writeln!(
        out,
        "{} machines checked, load threshold {}",
        report.machines, report.threshold
    )?;
    writeln!(
        out,
        "{:<15}{:^15}{:^15}{}",
        "HOSTNAME", "CPU LOAD", "LOAD/CORE", "HOST-GROUP"
    )?;
    writeln!(out, "{INDENT}{:<15}{:<15}Job Name", "Job ID", "User")?;
    writeln!(out)?;

    for flagged in &report.nodes {
        let node = &flagged.node;
        let load = node.load().map(|l| format!("{:.2}", l)).unwrap_or_default();
        let per_core = node.efficiency().map(|e| format!("{:.4}", e)).unwrap_or_default();
        writeln!(
            out,
            "{:<15}{:^15}{:^15}{}",
            node.name(),
            load,
            per_core,
            flagged.group.as_deref().unwrap_or("-")
        )?;
        for job in node.jobs() {
            writeln!(out, "{INDENT}{:<15}{:<15}{}", job.id(), job.owner(), job.name())?;
        }
        rule(out, 40, '-')?;
    }
    Ok(())
}
