//! Rule targets
//!
//! A [`Target`] is what a rule does once its filter and matchers hold. The
//! traversal code only ever calls [`Target::action`]; the remaining trait
//! methods describe a target's shape so rulesets can be validated before
//! they are installed.

use crate::core::packet::Packet;
use crate::core::verdict::{RuleVerdict, TableVerdict};
use std::fmt;
use tracing::{error, info};

/// Name the error sentinel carries when none is given.
pub const ERROR_TARGET_NAME: &str = "ERROR";

pub trait Target: fmt::Debug + Send + Sync {
    /// Name shown in listings (`ACCEPT`, `DROP`, `LOG`…).
    fn name(&self) -> &str;

    fn action(&self, packet: &Packet) -> RuleVerdict;

    /// The fixed verdict this target always produces, if it is a plain
    /// policy. Only targets with a policy may sit at an underflow.
    fn policy(&self) -> Option<TableVerdict> {
        None
    }

    /// Returns `true` if evaluation never proceeds past a rule with this
    /// target once the rule matches.
    fn is_terminal(&self) -> bool {
        self.policy().is_some()
    }

    /// Returns `true` for the construction sentinel that must never run.
    fn is_error(&self) -> bool {
        false
    }
}

/// Unconditionally accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcceptTarget;

impl Target for AcceptTarget {
    fn name(&self) -> &str {
        "ACCEPT"
    }

    fn action(&self, _packet: &Packet) -> RuleVerdict {
        RuleVerdict::Accept
    }

    fn policy(&self) -> Option<TableVerdict> {
        Some(TableVerdict::Accept)
    }
}

/// Unconditionally drops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropTarget;

impl Target for DropTarget {
    fn name(&self) -> &str {
        "DROP"
    }

    fn action(&self, _packet: &Packet) -> RuleVerdict {
        RuleVerdict::Drop
    }

    fn policy(&self) -> Option<TableVerdict> {
        Some(TableVerdict::Drop)
    }
}

/// Ends the current chain and defers to its underflow policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReturnTarget;

impl Target for ReturnTarget {
    fn name(&self) -> &str {
        "RETURN"
    }

    fn action(&self, _packet: &Packet) -> RuleVerdict {
        RuleVerdict::Return
    }

    fn is_terminal(&self) -> bool {
        true
    }
}

/// Records the packet and falls through to the next rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    prefix: String,
}

impl LogTarget {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl Target for LogTarget {
    fn name(&self) -> &str {
        "LOG"
    }

    fn action(&self, packet: &Packet) -> RuleVerdict {
        info!(
            prefix = %self.prefix,
            src = ?packet.source_addr(),
            dst = ?packet.destination_addr(),
            proto = ?packet.transport_protocol_number(),
            sport = ?packet.source_port(),
            dport = ?packet.destination_port(),
            "packet logged"
        );
        RuleVerdict::Continue
    }
}

/// Marks the end of a table's rules.
///
/// Well-formed chains always decide before reaching it, and installation
/// rejects any chain that could fall into it. If it runs anyway the packet
/// is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorTarget {
    name: String,
}

impl ErrorTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for ErrorTarget {
    fn default() -> Self {
        Self::new(ERROR_TARGET_NAME)
    }
}

impl Target for ErrorTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn action(&self, _packet: &Packet) -> RuleVerdict {
        error!(target_name = %self.name, "error target reached; chain has no default policy");
        debug_assert!(false, "error target {} reached", self.name);
        RuleVerdict::Drop
    }

    fn is_terminal(&self) -> bool {
        true
    }

    fn is_error(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_targets() {
        let packet = Packet::default();
        assert_eq!(AcceptTarget.action(&packet), RuleVerdict::Accept);
        assert_eq!(AcceptTarget.policy(), Some(TableVerdict::Accept));
        assert_eq!(DropTarget.action(&packet), RuleVerdict::Drop);
        assert_eq!(DropTarget.policy(), Some(TableVerdict::Drop));
        assert!(AcceptTarget.is_terminal());
    }

    #[test]
    fn test_return_is_terminal_without_policy() {
        assert_eq!(ReturnTarget.action(&Packet::default()), RuleVerdict::Return);
        assert_eq!(ReturnTarget.policy(), None);
        assert!(ReturnTarget.is_terminal());
    }

    #[test]
    fn test_log_falls_through() {
        let target = LogTarget::new("probe: ");
        assert_eq!(target.action(&Packet::default()), RuleVerdict::Continue);
        assert!(!target.is_terminal());
        assert_eq!(target.prefix(), "probe: ");
    }

    #[test]
    fn test_error_target_shape() {
        let target = ErrorTarget::default();
        assert_eq!(target.name(), ERROR_TARGET_NAME);
        assert!(target.is_error());
        assert!(target.is_terminal());
        assert_eq!(target.policy(), None);
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_error_target_fails_closed() {
        assert_eq!(
            ErrorTarget::default().action(&Packet::default()),
            RuleVerdict::Drop
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "error target")]
    fn test_error_target_asserts_in_debug() {
        let _ = ErrorTarget::default().action(&Packet::default());
    }
}
