//! Packet filtering core
//!
//! This module contains the data model and the evaluation algorithm of the
//! filtering engine. It provides:
//!
//! - [`hook`]: Stack interception points
//! - [`packet`]: The read-only packet view and probe packet synthesis
//! - [`matcher`] / [`target`]: Rule condition and action capabilities
//! - [`rule`] / [`table`]: Rules and the per-hook chain wiring of tables
//! - [`iptables`]: Per-hook traversal and ruleset validation
//! - [`defaults`]: Default and empty rulesets
//! - [`firewall`]: Atomically replaceable live ruleset
//! - [`error`]: Error types for configuration violations

pub mod defaults;
pub mod error;
pub mod firewall;
pub mod hook;
pub mod iptables;
pub mod matcher;
pub mod packet;
pub mod rule;
pub mod table;
pub mod target;
pub mod verdict;

#[cfg(test)]
pub mod test_helpers;
