// SPDX-FileCopyrightText: 2026 GSI Helmholtzzentrum f. Schwerionenforschung GmbH, Darmstadt, Germany
// SPDX-License-Identifier: LGPL-3.0-or-later

//! Deployment configuration: queue names, code tables, field layouts.
//!
//! Everything the scheduler deployment can change lives here so the parser
//! and analyzers never embed literal offsets or code sets.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

const APP_DIR_NAME: &str = "node-search";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Which full-status query the dump came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
pub enum QueryMode {
    /// `qstat -f`: host summary line directly followed by job lines
    #[default]
    #[value(name = "f")]
    Full,
    /// `qstat -F`: host summary, resource attribute lines, then job lines
    #[value(name = "F")]
    Resources,
}

impl QueryMode {
    pub fn flag(self) -> &'static str {
        match self {
            QueryMode::Full => "-f",
            QueryMode::Resources => "-F",
        }
    }
}

/// Field positions for one status query mode.
///
/// All indices refer to whitespace-separated fields of a single line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldLayout {
    pub min_summary_fields: usize,
    pub queue_host_field: usize,
    pub core_fraction_field: usize,
    pub load_field: usize,
    pub arch_field: usize,
    pub state_code_field: usize,
    /// Line prefix after which job lines start; `None` when jobs follow the summary
    pub job_section_marker: Option<String>,
    pub min_job_fields: usize,
    pub job_id_field: usize,
    pub job_priority_field: usize,
    pub job_name_field: usize,
    pub job_user_field: usize,
    pub job_state_field: usize,
    pub job_date_field: usize,
    pub job_time_field: usize,
    pub job_cores_field: usize,
}

impl FieldLayout {
    /// Layout of `qstat -f`
    pub fn full() -> Self {
        Self {
            min_summary_fields: 5,
            queue_host_field: 0,
            core_fraction_field: 2,
            load_field: 3,
            arch_field: 4,
            state_code_field: 5,
            job_section_marker: None,
            min_job_fields: 8,
            job_id_field: 0,
            job_priority_field: 1,
            job_name_field: 2,
            job_user_field: 3,
            job_state_field: 4,
            job_date_field: 5,
            job_time_field: 6,
            job_cores_field: 7,
        }
    }

    /// Layout of `qstat -F`
    pub fn resources() -> Self {
        Self {
            job_section_marker: Some("qf:min_cpu_interval".to_string()),
            ..Self::full()
        }
    }
}

impl FieldLayout {
    /// Largest index read from a job line, running or pending
    fn highest_job_field(&self) -> usize {
        [
            self.job_id_field,
            self.job_priority_field,
            self.job_name_field,
            self.job_user_field,
            self.job_state_field,
            self.job_date_field,
            self.job_time_field,
            self.job_cores_field,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

impl Default for FieldLayout {
    fn default() -> Self {
        Self::full()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layouts {
    #[serde(default = "FieldLayout::full")]
    pub full: FieldLayout,
    #[serde(default = "FieldLayout::resources")]
    pub resources: FieldLayout,
}

impl Default for Layouts {
    fn default() -> Self {
        Self {
            full: FieldLayout::full(),
            resources: FieldLayout::resources(),
        }
    }
}

impl Layouts {
    pub fn for_mode(&self, mode: QueryMode) -> &FieldLayout {
        match mode {
            QueryMode::Full => &self.full,
            QueryMode::Resources => &self.resources,
        }
    }
}

/// Column layout of `qhost -h` output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadLayout {
    /// Header, underline and the `global` pseudo-host
    pub header_lines: usize,
    pub min_fields: usize,
    pub host_field: usize,
    pub load_field: usize,
    /// Load value reported for hosts that are powered off
    pub unavailable: String,
}

impl Default for LoadLayout {
    fn default() -> Self {
        Self {
            header_lines: 3,
            min_fields: 7,
            host_field: 0,
            load_field: 6,
            unavailable: "-".to_string(),
        }
    }
}

/// Classification of a host's state column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    Schedulable,
    Disabled,
}

/// Closed table of host state codes.
///
/// Deployments emit different subsets; a code in neither list is an error
/// so the table gets extended instead of silently guessed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateCodeTable {
    /// Administratively disabled, error and auxiliary-disabled codes
    pub disabled: Vec<String>,
    /// Codes that leave the host schedulable (alarm, suspended, ...)
    pub schedulable: Vec<String>,
}

impl Default for StateCodeTable {
    fn default() -> Self {
        Self {
            disabled: ["d", "E", "au", "Eau", "Eqw", "adu"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            schedulable: ["a", "s", "S", "A", "C", "c", "o"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl StateCodeTable {
    pub fn classify(&self, code: &str) -> Option<HostState> {
        if self.disabled.iter().any(|c| c == code) {
            Some(HostState::Disabled)
        } else if self.schedulable.iter().any(|c| c == code) {
            Some(HostState::Schedulable)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cluster domain suffix including the leading dot, e.g. ".cluster.example.org".
    /// Derived from the local FQDN when unset.
    pub domain_suffix: Option<String>,
    /// Host-group open to every user (debug queue)
    pub debug_group: String,
    /// Host-group open to every user (general access queue)
    pub general_access_group: String,
    /// Queues whose access lists are searched for a user's host-groups
    pub queues: Vec<String>,
    /// Queue used for the primary-queue totals view
    pub primary_queue: String,
    /// Load below which a fully allocated node counts as low efficiency
    pub low_load_threshold: f64,
    pub state_codes: StateCodeTable,
    pub layouts: Layouts,
    pub load_layout: LoadLayout,
    /// Width of the `#` row that opens the pending-jobs section
    pub pending_marker_width: usize,
    /// Minimum width of the `-` row separating host blocks
    pub separator_width: usize,
    pub command_timeout_secs: u64,
    /// `{host}` is replaced by the FQDN, `{domain}` by the domain suffix
    pub monitor_url: String,
    /// Query `qstat -j` per job for peak memory and start time
    pub lookup_job_details: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain_suffix: None,
            debug_group: "debug_d12chas".to_string(),
            general_access_group: "general_access".to_string(),
            queues: ["long", "hpc", "gpu", "gpu-debug"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            primary_queue: "long".to_string(),
            low_load_threshold: 0.05,
            state_codes: StateCodeTable::default(),
            layouts: Layouts::default(),
            load_layout: LoadLayout::default(),
            pending_marker_width: 79,
            separator_width: 20,
            command_timeout_secs: 30,
            monitor_url: "https://mon{domain}/xymon-cgi/svcstatus.sh?HOST={host}&SERVICE=cpu"
                .to_string(),
            lookup_job_details: true,
        }
    }
}

impl Config {
    pub fn domain(&self) -> &str {
        self.domain_suffix.as_deref().unwrap_or("")
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn layout(&self, mode: QueryMode) -> &FieldLayout {
        self.layouts.for_mode(mode)
    }

    /// Strip the domain suffix from a host name (`node01.cluster.org` -> `node01`)
    pub fn short_name<'a>(&self, host: &'a str) -> &'a str {
        let domain = self.domain();
        if domain.is_empty() {
            return host;
        }
        host.strip_suffix(domain).unwrap_or(host)
    }

    /// Fully qualified name of a host, appending the domain when missing
    pub fn fqdn(&self, host: &str) -> String {
        let domain = self.domain();
        if domain.is_empty() || host.ends_with(domain) {
            host.to_string()
        } else {
            format!("{}{}", host, domain)
        }
    }

    pub fn monitor_url_for(&self, host: &str) -> String {
        self.monitor_url
            .replace("{host}", &self.fqdn(host))
            .replace("{domain}", self.domain())
    }

    fn validate(&self) -> Result<()> {
        if !(self.low_load_threshold > 0.0) {
            bail!("low_load_threshold must be positive");
        }
        if self.queues.is_empty() {
            bail!("at least one queue must be configured");
        }
        for (name, layout) in [("full", &self.layouts.full), ("resources", &self.layouts.resources)] {
            let highest = layout
                .core_fraction_field
                .max(layout.queue_host_field);
            if layout.min_summary_fields <= highest {
                bail!("layout {}: min_summary_fields must cover the core fraction field", name);
            }
            if layout.min_job_fields <= layout.highest_job_field() {
                bail!("layout {}: min_job_fields must cover all job fields", name);
            }
        }
        let load = &self.load_layout;
        if load.min_fields <= load.host_field.max(load.load_field) {
            bail!("load_layout: min_fields must cover the host and load fields");
        }
        Ok(())
    }
}

/// Load configuration from an explicit path or the default location.
///
/// An explicit path must exist; the default file is optional.
pub fn load(path_override: Option<PathBuf>) -> Result<Config> {
    let required = path_override.is_some();
    let path = match path_override {
        Some(path) => Some(path),
        None => default_config_path(),
    };

    let mut config = match path.as_deref() {
        Some(path) => read_config_file(path, required)?,
        None => Config::default(),
    };

    if config.domain_suffix.is_none() {
        config.domain_suffix = Some(local_domain_suffix());
    }
    config.validate()?;
    debug!(domain = config.domain(), "configuration loaded");
    Ok(config)
}

fn read_config_file(path: &Path, required: bool) -> Result<Config> {
    if !path.exists() {
        if required {
            bail!("config file not found at {}", path.display());
        }
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Domain of the local host: `login01.cluster.org` -> `.cluster.org`
fn local_domain_suffix() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .ok()
        .and_then(|fqdn| domain_of(&fqdn))
        .unwrap_or_default()
}

fn domain_of(fqdn: &str) -> Option<String> {
    fqdn.find('.')
        .map(|idx| fqdn[idx..].to_string())
        .filter(|domain| domain.len() > 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_code_table() {
        let table = StateCodeTable::default();
        assert_eq!(table.classify("d"), Some(HostState::Disabled));
        assert_eq!(table.classify("adu"), Some(HostState::Disabled));
        assert_eq!(table.classify("a"), Some(HostState::Schedulable));
        assert_eq!(table.classify("zz"), None);
    }

    #[test]
    fn test_layouts_differ_only_in_marker() {
        let layouts = Layouts::default();
        assert_eq!(layouts.for_mode(QueryMode::Full).job_section_marker, None);
        assert_eq!(
            layouts.for_mode(QueryMode::Resources).job_section_marker.as_deref(),
            Some("qf:min_cpu_interval")
        );
        assert_eq!(
            layouts.full.job_cores_field,
            layouts.resources.job_cores_field
        );
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            domain_suffix = ".cluster.example.org"
            low_load_threshold = 0.1

            [state_codes]
            disabled = ["d", "u"]
            "#,
        )
        .unwrap();

        assert_eq!(config.domain(), ".cluster.example.org");
        assert_eq!(config.low_load_threshold, 0.1);
        assert_eq!(config.state_codes.classify("u"), Some(HostState::Disabled));
        assert_eq!(config.state_codes.classify("E"), None);
        // Untouched sections keep their defaults
        assert_eq!(config.state_codes.schedulable, StateCodeTable::default().schedulable);
        assert_eq!(config.layouts, Layouts::default());
        assert_eq!(config.primary_queue, "long");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_layout() {
        let mut config = Config::default();
        config.layouts.full.min_job_fields = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_covers_every_job_field() {
        let mut config = Config::default();
        config.layouts.resources.job_priority_field = 9;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.layouts.full.job_time_field = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_load_layout() {
        let config: Config = toml::from_str(
            r#"
            [load_layout]
            load_field = 12
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.load_layout.min_fields = 11;
        config.load_layout.load_field = 10;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_host_names() {
        let config = Config {
            domain_suffix: Some(".crc.example.edu".to_string()),
            ..Default::default()
        };
        assert_eq!(config.short_name("d12chas400.crc.example.edu"), "d12chas400");
        assert_eq!(config.short_name("d12chas400"), "d12chas400");
        assert_eq!(config.fqdn("d12chas400"), "d12chas400.crc.example.edu");
        assert_eq!(
            config.monitor_url_for("d12chas400"),
            "https://mon.crc.example.edu/xymon-cgi/svcstatus.sh?HOST=d12chas400.crc.example.edu&SERVICE=cpu"
        );
    }

    #[test]
    fn test_domain_of() {
        assert_eq!(domain_of("login01.cluster.org").as_deref(), Some(".cluster.org"));
        assert_eq!(domain_of("login01"), None);
        assert_eq!(domain_of("login01."), None);
    }
}
