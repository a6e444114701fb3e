// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Grid Engine CLI integration: `qconf`, `qstat` and `qhost`.
//!
//! Every call runs on a current-thread runtime under a per-call timeout; a
//! command that hangs is killed and surfaces as [`SourceError::Timeout`].

use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tokio::process::Command;
use tokio::runtime::Runtime;
use tracing::{debug, trace};

use super::{with_group_prefix, SourceResult, StatusSource};
use crate::config::{Config, QueryMode};
use crate::error::SourceError;

const PASSWD_PATH: &str = "/etc/passwd";

pub struct GridEngine {
    runtime: Runtime,
    http: reqwest::Client,
    timeout: Duration,
    passwd_path: PathBuf,
    config: Config,
}

impl GridEngine {
    pub fn new(config: &Config) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(Self {
            runtime,
            http: reqwest::Client::new(),
            timeout: config.command_timeout(),
            passwd_path: PathBuf::from(PASSWD_PATH),
            config: config.clone(),
        })
    }

    /// Run a command to completion and return its stdout
    fn run(&self, program: &str, args: &[&str]) -> SourceResult<String> {
        let command = format!("{} {}", program, args.join(" "));
        debug!(%command, "running scheduler command");

        let output = self
            .with_timeout(
                &command,
                Command::new(program).args(args).kill_on_drop(true).output(),
            )?
            .map_err(|source| SourceError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(SourceError::Failed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        trace!(%command, bytes = stdout.len(), "command finished");
        Ok(stdout)
    }

    fn with_timeout<F: Future>(&self, command: &str, fut: F) -> SourceResult<F::Output> {
        self.runtime
            .block_on(async { tokio::time::timeout(self.timeout, fut).await })
            .map_err(|_| SourceError::Timeout {
                command: command.to_string(),
                timeout: self.timeout,
            })
    }
}

impl StatusSource for GridEngine {
    fn host_groups(&self) -> SourceResult<Vec<String>> {
        Ok(words(&self.run("qconf", &["-shgrpl"])?))
    }

    fn host_group_members(&self, group: &str) -> SourceResult<Vec<String>> {
        let group = with_group_prefix(group);
        Ok(words(&self.run("qconf", &["-shgrp_resolved", &group])?))
    }

    fn host_group_tree(&self, group: &str) -> SourceResult<String> {
        let group = with_group_prefix(group);
        self.run("qconf", &["-shgrp_tree", &group])
    }

    fn status_dump(&self, mode: QueryMode) -> SourceResult<String> {
        self.run("qstat", &[mode.flag()])
    }

    fn user_lists(&self) -> SourceResult<Vec<String>> {
        Ok(lines(&self.run("qconf", &["-sul"])?))
    }

    fn user_list_members(&self, list: &str) -> SourceResult<String> {
        self.run("qconf", &["-su", list])
    }

    fn queue_definition(&self, queue: &str) -> SourceResult<String> {
        self.run("qconf", &["-sq", queue])
    }

    fn job_detail(&self, job_id: &str) -> SourceResult<String> {
        self.run("qstat", &["-j", job_id])
    }

    fn host_load(&self, hosts_csv: &str) -> SourceResult<String> {
        self.run("qhost", &["-h", hosts_csv])
    }

    fn known_users(&self) -> SourceResult<Vec<String>> {
        let content = fs::read_to_string(&self.passwd_path).map_err(|source| SourceError::Io {
            path: self.passwd_path.display().to_string(),
            source,
        })?;
        Ok(parse_passwd_names(&content))
    }

    fn scheduler_users(&self) -> SourceResult<Vec<String>> {
        Ok(lines(&self.run("qconf", &["-suserl"])?))
    }

    fn process_snapshot(&self, host: &str) -> SourceResult<String> {
        let url = self.config.monitor_url_for(host);
        debug!(%url, "fetching process snapshot");

        let http_err = |source| SourceError::Http {
            url: url.clone(),
            source,
        };
        let fetch = async {
            let response = self.http.get(&url).send().await?.error_for_status()?;
            Ok::<_, reqwest::Error>(response.text().await?)
        };
        self.with_timeout(&url, fetch)?.map_err(http_err)
    }
}

fn words(output: &str) -> Vec<String> {
    output.split_whitespace().map(String::from).collect()
}

fn lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Account names from passwd(5) content
fn parse_passwd_names(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() >= 3 && !parts[0].is_empty() {
                Some(parts[0].to_string())
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_passwd_names() {
        let content = "root:x:0:0:root:/root:/bin/bash\n\
                       # comment line\n\
                       jdoe:x:1000:1000:John Doe:/home/jdoe:/bin/tcsh\n\
                       broken-line\n";
        assert_eq!(parse_passwd_names(content), vec!["root", "jdoe"]);
    }

    #[test]
    fn test_words_and_lines() {
        assert_eq!(words("@a @b\n@c\n"), vec!["@a", "@b", "@c"]);
        assert_eq!(lines("ul one\n\n  ul_two  \n"), vec!["ul one", "ul_two"]);
    }

    #[test]
    fn test_missing_command_is_spawn_error() {
        let engine = GridEngine::new(&Config::default()).unwrap();
        let err = engine
            .run("node-search-no-such-binary", &["-x"])
            .unwrap_err();
        assert!(matches!(err, SourceError::Spawn { .. }));
    }

    #[test]
    fn test_known_users_unreadable_passwd() {
        let mut engine = GridEngine::new(&Config::default()).unwrap();
        engine.passwd_path = PathBuf::from("/nonexistent/passwd");
        assert!(matches!(engine.known_users(), Err(SourceError::Io { .. })));
    }
}
