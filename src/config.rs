//! Ruleset files
//!
//! A ruleset file is the JSON form of an [`IpTables`]: named tables, each a
//! flat rule list with per-hook entry and underflow indices, plus the
//! per-hook table order. [`RulesetConfig::build`] turns it into live tables,
//! checking every name, interface and port range along the way. Structural
//! checks (chain wiring, underflow policies) happen later, when the result
//! is installed.
//!
//! Files are written atomically with a `.sha256` checksum next to them.
//! A checksum mismatch on load is reported but does not fail the load, so
//! hand-edited files keep working.

use crate::core::error::{Error, Result};
use crate::core::hook::Hook;
use crate::core::iptables::IpTables;
use crate::core::matcher::{AddressMatcher, InterfaceMatcher, PortMatcher, PortRange};
use crate::core::packet::TransportProtocol;
use crate::core::rule::{IpHeaderFilter, Rule};
use crate::core::table::Table;
use crate::core::target::{
    AcceptTarget, DropTarget, ERROR_TARGET_NAME, ErrorTarget, LogTarget, ReturnTarget,
};
use crate::utils::get_data_dir;
use crate::validators;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Maximum number of rules per table in a ruleset file.
///
/// Limit prevents memory exhaustion from malformed/malicious files.
pub const MAX_RULES: usize = 1000;

/// File name of the ruleset in the data directory.
pub const DEFAULT_RULESET_FILE: &str = "ruleset.json";

/// Serialized ruleset: tables by name plus the per-hook table order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesetConfig {
    #[serde(default)]
    pub tables: BTreeMap<String, TableConfig>,
    #[serde(default)]
    pub priorities: BTreeMap<Hook, Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableConfig {
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
    /// Entry rule per hook; `null` records the hook as unset
    #[serde(default)]
    pub builtin_chains: BTreeMap<Hook, Option<usize>>,
    #[serde(default)]
    pub underflows: BTreeMap<Hook, Option<usize>>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub user_chains: HashMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<TransportProtocol>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matchers: Vec<MatcherConfig>,
    pub target: TargetConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatcherConfig {
    Port {
        protocol: TransportProtocol,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<PortRange>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<PortRange>,
    },
    Address {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<IpNetwork>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<IpNetwork>,
        #[serde(default)]
        invert: bool,
    },
    Interface {
        name: String,
        #[serde(default)]
        invert: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetConfig {
    Accept,
    Drop,
    Return,
    Log {
        #[serde(default)]
        prefix: String,
    },
    Error {
        #[serde(default = "default_error_name")]
        name: String,
    },
}

fn default_error_name() -> String {
    ERROR_TARGET_NAME.to_string()
}

fn invalid(field: String, message: String) -> Error {
    Error::Validation { field, message }
}

impl RulesetConfig {
    /// Total number of rules across all tables.
    pub fn rule_count(&self) -> usize {
        self.tables.values().map(|t| t.rules.len()).sum()
    }

    /// Builds live tables from the file contents.
    ///
    /// # Errors
    ///
    /// Returns `Error::TooManyRules` if a table exceeds [`MAX_RULES`], or
    /// `Error::Validation` naming the offending field for bad names,
    /// interfaces, port ranges or matcher/protocol combinations.
    pub fn build(&self) -> Result<IpTables> {
        let mut tables = IpTables::new();

        for (name, table) in &self.tables {
            validators::validate_table_name(name)
                .map_err(|message| invalid(format!("tables.{name}"), message))?;
            tables = tables.with_table(name.clone(), table.build(name)?);
        }

        for (hook, names) in &self.priorities {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            tables = tables.with_priority(*hook, &names);
        }

        Ok(tables)
    }
}

impl TableConfig {
    fn build(&self, name: &str) -> Result<Table> {
        if self.rules.len() > MAX_RULES {
            return Err(Error::TooManyRules {
                table: name.to_string(),
                count: self.rules.len(),
                max: MAX_RULES,
            });
        }

        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| rule.build(&format!("tables.{name}.rules[{i}]")))
            .collect::<Result<Vec<_>>>()?;

        let mut table = Table::new(rules);
        table.builtin_chains.clone_from(&self.builtin_chains);
        table.underflows.clone_from(&self.underflows);
        table.user_chains.clone_from(&self.user_chains);
        Ok(table)
    }
}

impl RuleConfig {
    fn build(&self, field: &str) -> Result<Rule> {
        let mut rule = match &self.target {
            TargetConfig::Accept => Rule::new(AcceptTarget),
            TargetConfig::Drop => Rule::new(DropTarget),
            TargetConfig::Return => Rule::new(ReturnTarget),
            TargetConfig::Log { prefix } => Rule::new(LogTarget::new(
                validators::sanitize_log_prefix(prefix),
            )),
            TargetConfig::Error { name } => {
                let name = validators::validate_target_name(name)
                    .map_err(|message| invalid(format!("{field}.target"), message))?;
                Rule::new(ErrorTarget::new(name))
            }
        };

        if let Some(protocol) = self.protocol {
            rule = rule.with_filter(IpHeaderFilter::protocol(protocol));
        }

        for (i, matcher) in self.matchers.iter().enumerate() {
            let field = format!("{field}.matchers[{i}]");
            rule = match matcher {
                MatcherConfig::Port {
                    protocol,
                    source,
                    destination,
                } => {
                    let mut m = PortMatcher::new(*protocol).map_err(|e| match e {
                        Error::Validation { message, .. } => invalid(field.clone(), message),
                        other => other,
                    })?;
                    if let Some(range) = source {
                        validators::validate_port_range(range.start, range.end)
                            .map_err(|message| invalid(format!("{field}.source"), message))?;
                        m = m.with_source(*range);
                    }
                    if let Some(range) = destination {
                        validators::validate_port_range(range.start, range.end)
                            .map_err(|message| invalid(format!("{field}.destination"), message))?;
                        m = m.with_destination(*range);
                    }
                    rule.with_matcher(m)
                }
                MatcherConfig::Address {
                    source,
                    destination,
                    invert,
                } => {
                    let mut m = AddressMatcher::new();
                    if let Some(network) = source {
                        m = m.with_source(*network);
                    }
                    if let Some(network) = destination {
                        m = m.with_destination(*network);
                    }
                    if *invert {
                        m = m.inverted();
                    }
                    rule.with_matcher(m)
                }
                MatcherConfig::Interface { name, invert } => {
                    let name = validators::validate_interface(name)
                        .map_err(|message| invalid(format!("{field}.name"), message))?;
                    let m = InterfaceMatcher::new(name);
                    rule.with_matcher(if *invert { m.inverted() } else { m })
                }
            };
        }

        Ok(rule)
    }
}

/// Path of the ruleset in the XDG data directory.
pub fn default_ruleset_path() -> Option<PathBuf> {
    get_data_dir().map(|dir| dir.join(DEFAULT_RULESET_FILE))
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Loads a ruleset file.
///
/// # Errors
///
/// Returns `Err` if the file cannot be read, is not valid JSON, or a table
/// holds more than [`MAX_RULES`] rules.
///
/// # Async
/// Uses `tokio::fs` for non-blocking file I/O.
pub async fn load_ruleset(path: &Path) -> Result<RulesetConfig> {
    let json = tokio::fs::read_to_string(path).await?;

    // Verify checksum if present (warns but doesn't fail for manually edited files)
    if let Ok(expected) = tokio::fs::read_to_string(with_suffix(path, ".sha256")).await {
        let actual = sha256_hex(json.as_bytes());
        if expected.trim() != actual {
            tracing::warn!(
                "Ruleset '{}' checksum mismatch (expected: {}, got: {})",
                path.display(),
                expected.trim(),
                actual
            );
        }
    }

    let config: RulesetConfig = serde_json::from_str(&json)?;

    for (name, table) in &config.tables {
        if table.rules.len() > MAX_RULES {
            return Err(Error::TooManyRules {
                table: name.clone(),
                count: table.rules.len(),
                max: MAX_RULES,
            });
        }
    }

    tracing::debug!(
        "Loaded ruleset '{}' ({} tables, {} rules)",
        path.display(),
        config.tables.len(),
        config.rule_count()
    );
    Ok(config)
}

/// Saves a ruleset file atomically.
///
/// Writes to a temporary file with mode 0o600, syncs it, renames it over
/// `path`, then writes the checksum sidecar.
///
/// # Errors
///
/// Returns `Err` if serialization or any file operation fails.
///
/// # Async
/// Uses `tokio::fs` for non-blocking file I/O.
pub async fn save_ruleset(path: &Path, config: &RulesetConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    let temp_path = with_suffix(path, ".tmp");

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    #[cfg(unix)]
    {
        use tokio::fs::OpenOptions;
        use tokio::io::AsyncWriteExt;

        // Set restrictive permissions (0o600) BEFORE writing firewall rules
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o600)
            .open(&temp_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
    }

    #[cfg(not(unix))]
    {
        tokio::fs::write(&temp_path, &json).await?;
    }

    tokio::fs::rename(&temp_path, path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::StorageFull {
            std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "Disk full: cannot save ruleset. Free up space and try again.",
            )
        } else {
            e
        }
    })?;

    tokio::fs::write(with_suffix(path, ".sha256"), sha256_hex(json.as_bytes())).await?;

    tracing::debug!("Saved ruleset '{}'", path.display());
    Ok(())
}

fn block_on<F>(future: F) -> Result<F::Output>
where
    F: std::future::Future + Send,
    F::Output: Send,
{
    use tokio::runtime::{Handle, RuntimeFlavor};

    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            Ok(tokio::task::block_in_place(|| handle.block_on(future)))
        }
        // A current-thread runtime cannot be blocked from inside; drive the
        // future on a private runtime in a scoped thread instead
        Ok(_) => std::thread::scope(|scope| {
            scope
                .spawn(|| block_on_fresh(future))
                .join()
                .unwrap_or_else(|_| {
                    Err(Error::Io(std::io::Error::other(
                        "ruleset I/O thread panicked",
                    )))
                })
        }),
        Err(_) => block_on_fresh(future),
    }
}

fn block_on_fresh<F: std::future::Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

/// Synchronous wrapper for [`load_ruleset`].
///
/// # Errors
///
/// Same as [`load_ruleset`], plus `Error::Io` if no runtime can be created.
///
/// Callable from any context: outside a runtime, from a multi-thread runtime
/// worker, or from a current-thread runtime (the I/O then runs on a helper
/// thread).
pub fn load_ruleset_blocking(path: &Path) -> Result<RulesetConfig> {
    block_on(load_ruleset(path))?
}

/// Synchronous wrapper for [`save_ruleset`].
///
/// # Errors
///
/// Same as [`save_ruleset`], plus `Error::Io` if no runtime can be created.
pub fn save_ruleset_blocking(path: &Path, config: &RulesetConfig) -> Result<()> {
    block_on(save_ruleset(path, config))?
}
