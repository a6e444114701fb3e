// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;

mod aggregate;
mod config;
mod efficiency;
mod error;
mod logging;
mod membership;
mod model;
mod monitor;
mod query;
mod report;
mod source;
mod status;

use config::{Config, QueryMode};
use error::{QueryError, EXIT_CONFIG};
use query::ClusterQuery;
use source::GridEngine;

#[derive(Parser, Debug)]
#[command(name = "node-search")]
#[command(about = "Host-group, user and core usage overview for Grid Engine clusters")]
#[command(version)]
struct Args {
    /// Configuration file (default: $XDG_CONFIG_HOME/node-search/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Status query mode: `f` for qstat -f, `F` for qstat -F
    #[arg(long, value_enum, global = true)]
    mode: Option<QueryMode>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Load below which a fully allocated node is reported
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Timeout for each scheduler command in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Skip the per-job qstat -j lookup of peak memory and start time
    #[arg(long, global = true)]
    no_job_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all host-groups
    Hosts,
    /// Core and node usage of a host-group, or `all`
    Group {
        /// Host-group name, the `@` is optional
        name: String,
        /// List every node with its jobs
        #[arg(long)]
        details: bool,
        /// Draw a core map
        #[arg(long, conflicts_with = "details")]
        visual: bool,
    },
    /// Nodes and jobs of a user
    User {
        name: String,
        /// Add per-process samples from the monitoring service
        #[arg(long)]
        details: bool,
    },
    /// Host-groups a user may submit to
    Access {
        name: String,
        /// Show the tree of every accessible host-group
        #[arg(long)]
        details: bool,
    },
    /// Usage of the primary queue for the current user
    Qlong,
    /// List users known to the scheduler
    Users,
    /// Fully allocated nodes with near-zero load
    Efficiency,
}

fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.verbose);

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            return ExitCode::from(EXIT_CONFIG as u8);
        }
    };

    match run(&args, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let code = err
                .downcast_ref::<QueryError>()
                .map(QueryError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = config::load(args.config.clone())?;

    if let Some(threshold) = args.threshold {
        if !(threshold > 0.0) {
            bail!("--threshold must be positive");
        }
        config.low_load_threshold = threshold;
    }
    if let Some(timeout) = args.timeout {
        config.command_timeout_secs = timeout;
    }
    if args.no_job_memory {
        config.lookup_job_details = false;
    }
    Ok(config)
}

fn run(args: &Args, config: &Config) -> Result<()> {
    let mode = args.mode.unwrap_or_default();
    let source = GridEngine::new(config).context("failed to start the command runtime")?;
    let query = ClusterQuery::new(config, &source, mode);
    debug!(command = ?args.command, mode = mode.flag(), "dispatching");

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match &args.command {
        Command::Hosts => {
            let groups = query.host_groups()?;
            if args.json {
                report::write_json(&mut out, &groups)?;
            } else {
                report::write_lines(&mut out, &groups)?;
            }
        }
        Command::Group {
            name,
            details,
            visual,
        } => {
            let group = query.group(name, *details)?;
            if args.json {
                report::write_json(&mut out, &group)?;
            } else if *visual {
                report::write_visual(&mut out, &group)?;
            } else if *details {
                report::write_group_details(&mut out, &group)?;
            } else {
                report::write_group(&mut out, &group)?;
            }
        }
        Command::User { name, details } => {
            let user = query.user(name, *details)?;
            if args.json {
                report::write_json(&mut out, &user)?;
            } else {
                report::write_user(&mut out, &user)?;
            }
        }
        Command::Access { name, details } => {
            let access = query.access(name, *details)?;
            if args.json {
                report::write_json(&mut out, &access)?;
            } else {
                report::write_access(&mut out, &access)?;
            }
        }
        Command::Qlong => {
            let user = std::env::var("USER").context("USER is not set")?;
            let queue = query.primary_queue(&user)?;
            if args.json {
                report::write_json(&mut out, &queue)?;
            } else {
                report::write_queue(&mut out, &queue)?;
            }
        }
        Command::Users => {
            let users = query.scheduler_users()?;
            if args.json {
                report::write_json(&mut out, &users)?;
            } else {
                report::write_lines(&mut out, &users)?;
            }
        }
        Command::Efficiency => {
            let efficiency = query.efficiency(args.threshold)?;
            if args.json {
                report::write_json(&mut out, &efficiency)?;
            } else {
                report::write_efficiency(&mut out, &efficiency)?;
            }
        }
    }

    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_group_with_globals() {
        let args = Args::parse_from(["node-search", "group", "hg1", "--visual", "--mode", "F", "-vv"]);
        assert_eq!(args.mode, Some(QueryMode::Resources));
        assert_eq!(args.verbose, 2);
        assert!(matches!(
            args.command,
            Command::Group { ref name, visual: true, details: false } if name == "hg1"
        ));
    }

    #[test]
    fn test_visual_conflicts_with_details() {
        let result = Args::try_parse_from(["node-search", "group", "all", "--visual", "--details"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_explicit_config() {
        let args = Args::parse_from([
            "node-search",
            "--config",
            "/nonexistent/node-search.toml",
            "efficiency",
        ]);
        assert!(load_config(&args).is_err());
    }
}
