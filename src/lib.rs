//! stackwall - netfilter-style packet filtering engine
//!
//! Classifies packets at the five interception points of a network stack
//! using iptables-style tables of rules, and tells the caller whether each
//! packet continues through the stack or is dropped.
//!
//! # Architecture
//!
//! - [`core`] - Tables, rules, traversal, validation and the live engine
//! - [`config`] - Ruleset files (JSON) and their persistence
//! - [`audit`] - Audit logging of validation and install outcomes
//! - [`validators`] - Input validation and sanitization
//! - [`utils`] - Utility functions (XDG directories, etc.)
//!
//! # Safety Features
//!
//! - Rulesets are validated once, before they go live
//! - Installs replace the whole ruleset atomically; in-flight checks finish
//!   on the ruleset they started with
//! - Anything that cannot be decided drops the packet
//! - SHA-256 ruleset file checksums
//! - Atomic file operations with secure permissions

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use crate::core::defaults::{default_tables, empty_filter_table, empty_filter_tables};
pub use crate::core::error::{Error, Result};
pub use crate::core::firewall::{Firewall, Snapshot};
pub use crate::core::hook::Hook;
pub use crate::core::iptables::{IpTables, check_rule, check_table};
pub use crate::core::packet::{Packet, PacketSpec, TransportProtocol};
pub use crate::core::rule::{IpHeaderFilter, Rule};
pub use crate::core::table::Table;
pub use crate::core::verdict::{RuleVerdict, TableVerdict};
