//! Tables and their per-hook wiring
//!
//! A [`Table`] is a flat list of rules. Each hook it participates in has an
//! entry index, where the built-in chain for that hook starts, and an
//! underflow index, the rule holding the chain's default policy. An entry of
//! `None` means the table is not wired into that hook.

use crate::core::error::{Error, Result};
use crate::core::hook::Hook;
use crate::core::rule::Rule;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct Table {
    pub rules: Vec<Rule>,
    pub builtin_chains: BTreeMap<Hook, Option<usize>>,
    pub underflows: BTreeMap<Hook, Option<usize>>,
    /// User-defined chain entry points. Reserved; traversal never jumps.
    pub user_chains: HashMap<String, usize>,
}

impl Table {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    /// Wires the table into `hook`, starting at `entry` with the default
    /// policy held by rule `underflow`.
    pub fn with_chain(mut self, hook: Hook, entry: usize, underflow: usize) -> Self {
        self.builtin_chains.insert(hook, Some(entry));
        self.underflows.insert(hook, Some(underflow));
        self
    }

    /// Records `hook` as explicitly unset.
    pub fn with_unset_chain(mut self, hook: Hook) -> Self {
        self.builtin_chains.insert(hook, None);
        self.underflows.insert(hook, None);
        self
    }

    pub fn builtin_chain(&self, hook: Hook) -> Option<usize> {
        self.builtin_chains.get(&hook).copied().flatten()
    }

    pub fn underflow(&self, hook: Hook) -> Option<usize> {
        self.underflows.get(&hook).copied().flatten()
    }

    /// Hooks this table has a built-in chain for, in traversal order.
    pub fn hooks(&self) -> impl Iterator<Item = Hook> + '_ {
        self.builtin_chains
            .iter()
            .filter_map(|(hook, entry)| entry.map(|_| *hook))
    }

    /// Checks every wired hook and the user chain table.
    ///
    /// # Errors
    ///
    /// Returns the first configuration violation found.
    pub fn validate(&self, name: &str) -> Result<()> {
        for hook in self.hooks() {
            self.validate_hook(name, hook)?;
        }

        for (chain, &index) in &self.user_chains {
            if index >= self.rules.len() {
                return Err(Error::Validation {
                    field: format!("{name}.user_chains.{chain}"),
                    message: format!(
                        "rule index {index} out of range ({} rules)",
                        self.rules.len()
                    ),
                });
            }
        }

        Ok(())
    }

    /// Checks that the built-in chain for `hook` can be traversed safely.
    ///
    /// - entry and underflow are set and in range
    /// - the underflow rule is unconditional and its target is a plain
    ///   accept or drop
    /// - walking forward from the entry, an unconditional terminal rule is
    ///   always met before the error sentinel
    ///
    /// # Errors
    ///
    /// Returns the violated constraint.
    pub fn validate_hook(&self, name: &str, hook: Hook) -> Result<()> {
        let entry = self
            .builtin_chain(hook)
            .ok_or_else(|| Error::UnsetBuiltinChain {
                table: name.to_string(),
                hook,
            })?;
        let underflow = self.underflow(hook).ok_or_else(|| Error::UnsetUnderflow {
            table: name.to_string(),
            hook,
        })?;

        for index in [entry, underflow] {
            if index >= self.rules.len() {
                return Err(Error::RuleIndexOutOfRange {
                    table: name.to_string(),
                    hook,
                    index,
                    len: self.rules.len(),
                });
            }
        }

        let policy_rule = &self.rules[underflow];
        if !policy_rule.is_unconditional() {
            return Err(Error::UnderflowNotUnconditional {
                table: name.to_string(),
                hook,
                index: underflow,
            });
        }
        if policy_rule.target.policy().is_none() {
            return Err(Error::UnderflowNotPolicy {
                table: name.to_string(),
                hook,
                index: underflow,
                target: policy_rule.target.name().to_string(),
            });
        }

        for (index, rule) in self.rules.iter().enumerate().skip(entry) {
            if rule.target.is_error() {
                return Err(Error::ErrorSentinelReachable {
                    table: name.to_string(),
                    hook,
                    index,
                });
            }
            if rule.is_unconditional() && rule.target.is_terminal() {
                break;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher::InterfaceMatcher;
    use crate::core::packet::TransportProtocol;
    use crate::core::rule::IpHeaderFilter;
    use crate::core::target::{AcceptTarget, DropTarget, ErrorTarget, LogTarget, ReturnTarget};

    fn accept_then_error() -> Table {
        Table::new(vec![Rule::new(AcceptTarget), Rule::new(ErrorTarget::default())])
            .with_chain(Hook::Input, 0, 0)
    }

    #[test]
    fn test_valid_table() {
        assert!(accept_then_error().validate("filter").is_ok());
    }

    #[test]
    fn test_unset_entries_are_skipped() {
        let table = Table::new(vec![])
            .with_unset_chain(Hook::Input)
            .with_unset_chain(Hook::Output);

        assert_eq!(table.hooks().count(), 0);
        assert!(table.validate("filter").is_ok());
        assert!(matches!(
            table.validate_hook("filter", Hook::Input),
            Err(Error::UnsetBuiltinChain { .. })
        ));
    }

    #[test]
    fn test_out_of_range_entry() {
        let table = Table::new(vec![Rule::new(AcceptTarget)]).with_chain(Hook::Input, 3, 0);
        assert!(matches!(
            table.validate("filter"),
            Err(Error::RuleIndexOutOfRange { index: 3, len: 1, .. })
        ));
    }

    #[test]
    fn test_underflow_with_matcher_rejected() {
        let table = Table::new(vec![
            Rule::new(AcceptTarget).with_matcher(InterfaceMatcher::new("eth0")),
            Rule::new(ErrorTarget::default()),
        ])
        .with_chain(Hook::Input, 0, 0);

        assert!(matches!(
            table.validate("filter"),
            Err(Error::UnderflowNotUnconditional { index: 0, .. })
        ));
    }

    #[test]
    fn test_underflow_with_filter_rejected() {
        let table = Table::new(vec![
            Rule::new(DropTarget).with_filter(IpHeaderFilter::protocol(TransportProtocol::Tcp)),
        ])
        .with_chain(Hook::Output, 0, 0);

        assert!(matches!(
            table.validate("filter"),
            Err(Error::UnderflowNotUnconditional { .. })
        ));
    }

    #[test]
    fn test_underflow_must_be_policy() {
        let table = Table::new(vec![Rule::new(ReturnTarget)]).with_chain(Hook::Input, 0, 0);
        assert!(matches!(
            table.validate("filter"),
            Err(Error::UnderflowNotPolicy { .. })
        ));
    }

    #[test]
    fn test_error_sentinel_reachable_through_conditional_rules() {
        let table = Table::new(vec![
            Rule::new(DropTarget),
            Rule::new(AcceptTarget).with_matcher(InterfaceMatcher::new("lo")),
            Rule::new(LogTarget::new("x")),
            Rule::new(ErrorTarget::default()),
        ])
        .with_chain(Hook::Input, 1, 0);

        assert!(matches!(
            table.validate("filter"),
            Err(Error::ErrorSentinelReachable { index: 3, .. })
        ));
    }

    #[test]
    fn test_user_chain_index_checked() {
        let mut table = accept_then_error();
        table.user_chains.insert("custom".to_string(), 9);
        assert!(matches!(
            table.validate("filter"),
            Err(Error::Validation { .. })
        ));
    }
}
