//! Rule evaluation
//!
//! [`IpTables::check`] is the single entry point the network stack calls at
//! each hook. It consults the tables registered for the hook in priority
//! order; each table walks its built-in chain for the hook rule by rule
//! until one decides.
//!
//! # Preconditions
//!
//! The packet's network header must already be located by the caller. This
//! is checked only in debug builds.
//!
//! The ruleset must have passed [`IpTables::validate`]. Evaluation trusts the
//! wiring it was given and does not re-check it per packet. If an invalid
//! ruleset is evaluated anyway, the affected packet is dropped and debug
//! builds panic.

use crate::core::error::{Error, Result};
use crate::core::hook::Hook;
use crate::core::matcher::MatchResult;
use crate::core::packet::Packet;
use crate::core::table::Table;
use crate::core::verdict::{RuleVerdict, TableVerdict};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, trace};

/// All tables plus, per hook, the order in which tables are consulted.
#[derive(Debug, Clone, Default)]
pub struct IpTables {
    pub tables: HashMap<String, Table>,
    pub priorities: BTreeMap<Hook, Vec<String>>,
}

impl IpTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, name: impl Into<String>, table: Table) -> Self {
        self.tables.insert(name.into(), table);
        self
    }

    pub fn with_priority(mut self, hook: Hook, tables: &[&str]) -> Self {
        self.priorities
            .insert(hook, tables.iter().map(ToString::to_string).collect());
        self
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Names of the tables consulted at `hook`, in order.
    pub fn tables_for(&self, hook: Hook) -> &[String] {
        self.priorities.get(&hook).map_or(&[], Vec::as_slice)
    }

    pub fn rule_count(&self) -> usize {
        self.tables.values().map(|t| t.rules.len()).sum()
    }

    /// Checks the whole ruleset before it may be evaluated.
    ///
    /// Every table named in a priority list must exist and be wired into
    /// that hook, and every wired chain in every table must pass
    /// [`Table::validate_hook`].
    ///
    /// # Errors
    ///
    /// Returns the first configuration violation found.
    pub fn validate(&self) -> Result<()> {
        for (&hook, names) in &self.priorities {
            for name in names {
                let table = self.tables.get(name).ok_or_else(|| Error::UnknownTable {
                    hook,
                    table: name.clone(),
                })?;
                table.validate_hook(name, hook)?;
            }
        }

        let mut names: Vec<&String> = self.tables.keys().collect();
        names.sort();
        for name in names {
            self.tables[name].validate(name)?;
        }

        Ok(())
    }

    /// Runs `packet` through the tables registered for `hook`.
    ///
    /// Returns `true` if the packet should continue traversing the stack and
    /// `false` if it should be dropped. A hook with no tables accepts.
    pub fn check(&self, hook: Hook, packet: &Packet) -> bool {
        debug_assert!(
            !packet.network_header().is_empty(),
            "network header must be set before check"
        );

        for name in self.tables_for(hook) {
            let Some(table) = self.tables.get(name) else {
                debug_assert!(false, "hook {hook} references unknown table {name}");
                return false;
            };

            match check_table(hook, packet, table) {
                TableVerdict::Accept => {}
                // Drop is final; later tables cannot resurrect the packet.
                TableVerdict::Drop => {
                    debug!(%hook, table = %name, "packet dropped");
                    return false;
                }
            }
        }

        true
    }
}

/// Walks the built-in chain for `hook` in `table`.
pub fn check_table(hook: Hook, packet: &Packet, table: &Table) -> TableVerdict {
    let Some(entry) = table.builtin_chain(hook) else {
        debug_assert!(false, "table consulted at {hook} without a built-in chain");
        return TableVerdict::Drop;
    };

    for rule_idx in entry..table.rules.len() {
        match check_rule(hook, packet, table, rule_idx) {
            RuleVerdict::Accept => return TableVerdict::Accept,
            RuleVerdict::Drop => return TableVerdict::Drop,
            RuleVerdict::Continue => {}
            // No jumps, so every return leaves a built-in chain.
            RuleVerdict::Return => return underflow_verdict(hook, packet, table),
        }
    }

    // Nothing decided. Fail closed.
    trace!(%hook, "end of rules reached without a verdict");
    TableVerdict::Drop
}

/// Evaluates a single rule: header filter, then matchers in order, then the
/// target.
pub fn check_rule(hook: Hook, packet: &Packet, table: &Table, rule_idx: usize) -> RuleVerdict {
    let Some(rule) = table.rules.get(rule_idx) else {
        return RuleVerdict::Continue;
    };

    if !rule.filter.accepts(packet) {
        return RuleVerdict::Continue;
    }

    let interface = packet.interface_for(hook);
    for matcher in &rule.matchers {
        let MatchResult { matches, hot_drop } = matcher.matches(hook, packet, interface);
        if hot_drop {
            trace!(%hook, rule = rule_idx, matcher = matcher.name(), "hot drop");
            return RuleVerdict::Drop;
        }
        if !matches {
            return RuleVerdict::Continue;
        }
    }

    let verdict = rule.target.action(packet);
    trace!(%hook, rule = rule_idx, %verdict, "rule matched");
    verdict
}

fn underflow_verdict(hook: Hook, packet: &Packet, table: &Table) -> TableVerdict {
    let Some(rule) = table.underflow(hook).and_then(|idx| table.rules.get(idx)) else {
        debug_assert!(false, "return at {hook} without an underflow");
        return TableVerdict::Drop;
    };

    // Only the target runs; the rule is unconditional by validation.
    if let Some(verdict) = rule.target.action(packet).decision() {
        verdict
    } else {
        debug_assert!(false, "underflow at {hook} did not accept or drop");
        TableVerdict::Drop
    }
}

impl fmt::Display for IpTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.tables.keys().collect();
        names.sort();

        for name in names {
            let table = &self.tables[name];
            writeln!(f, "*{name}")?;
            for hook in table.hooks() {
                let Some(entry) = table.builtin_chain(hook) else {
                    continue;
                };
                let underflow = table.underflow(hook);
                let policy = underflow
                    .and_then(|idx| table.rules.get(idx))
                    .map_or("-", |rule| rule.target.name());
                writeln!(f, ":{} {policy}", hook.chain_name())?;

                // A chain runs from its entry through its policy rule.
                let end = underflow
                    .filter(|&idx| idx >= entry)
                    .map_or(table.rules.len(), |idx| idx + 1);
                for (idx, rule) in table.rules.iter().enumerate().take(end).skip(entry) {
                    writeln!(f, "  {idx:>3} {rule}")?;
                }
            }
            let unset: Vec<&str> = table
                .builtin_chains
                .iter()
                .filter(|(_, entry)| entry.is_none())
                .map(|(hook, _)| hook.chain_name())
                .collect();
            if !unset.is_empty() {
                writeln!(f, "# unset: {}", unset.join(", "))?;
            }
        }

        for (hook, names) in &self.priorities {
            writeln!(f, "# {} -> [{}]", hook.chain_name(), names.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::matcher::InterfaceMatcher;
    use crate::core::packet::TransportProtocol;
    use crate::core::rule::{IpHeaderFilter, Rule};
    use crate::core::target::{AcceptTarget, DropTarget, ErrorTarget, LogTarget, ReturnTarget};
    use crate::core::test_helpers::{CountingMatcher, HotDropMatcher, tcp_packet, udp_packet};
    use std::sync::Arc;

    fn single_table(table: Table, hook: Hook) -> IpTables {
        IpTables::new()
            .with_table("filter", table)
            .with_priority(hook, &["filter"])
    }

    #[test]
    fn test_first_accept_decides() {
        let counter = CountingMatcher::new(true);
        let table = Table::new(vec![
            Rule::new(AcceptTarget),
            Rule::new(AcceptTarget).with_matcher(counter.clone()),
            Rule::new(AcceptTarget).with_matcher(counter.clone()),
            Rule::new(ErrorTarget::default()),
        ])
        .with_chain(Hook::Input, 0, 0);

        assert_eq!(
            check_table(Hook::Input, &tcp_packet(22), &table),
            TableVerdict::Accept
        );
        assert_eq!(counter.calls(), 0);
    }

    #[test]
    fn test_filter_mismatch_skips_matchers_and_target() {
        let counter = CountingMatcher::new(true);
        let table = Table::new(vec![
            Rule::new(DropTarget)
                .with_filter(IpHeaderFilter::protocol(TransportProtocol::Udp))
                .with_matcher(counter.clone()),
            Rule::new(AcceptTarget),
        ])
        .with_chain(Hook::Input, 0, 1);

        assert_eq!(
            check_rule(Hook::Input, &tcp_packet(22), &table, 0),
            RuleVerdict::Continue
        );
        assert_eq!(
            check_table(Hook::Input, &tcp_packet(22), &table),
            TableVerdict::Accept
        );
        assert_eq!(counter.calls(), 0);

        // Same rule decides for the protocol it filters on
        assert_eq!(
            check_table(Hook::Input, &udp_packet(53), &table),
            TableVerdict::Drop
        );
        assert_eq!(counter.calls(), 1);
    }

    #[test]
    fn test_hot_drop_beats_accepting_target() {
        let later = CountingMatcher::new(true);
        let table = Table::new(vec![
            Rule::new(AcceptTarget)
                .with_matcher(HotDropMatcher)
                .with_matcher(later.clone()),
            Rule::new(AcceptTarget),
        ])
        .with_chain(Hook::Input, 0, 1);

        assert_eq!(
            check_rule(Hook::Input, &tcp_packet(22), &table, 0),
            RuleVerdict::Drop
        );
        assert_eq!(later.calls(), 0);
    }

    #[test]
    fn test_matchers_short_circuit() {
        let first = CountingMatcher::new(false);
        let second = CountingMatcher::new(true);
        let table = Table::new(vec![
            Rule::new(DropTarget)
                .with_matcher(first.clone())
                .with_matcher(second.clone()),
            Rule::new(AcceptTarget),
        ])
        .with_chain(Hook::Input, 0, 1);

        assert!(single_table(table, Hook::Input).check(Hook::Input, &tcp_packet(22)));
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 0);
    }

    #[test]
    fn test_exhausted_rules_fail_closed() {
        let table = Table::new(vec![
            Rule::new(DropTarget),
            Rule::new(AcceptTarget).with_matcher(CountingMatcher::new(false)),
            Rule::new(LogTarget::new("fallthrough: ")),
        ])
        .with_chain(Hook::Input, 1, 0);

        assert_eq!(
            check_table(Hook::Input, &tcp_packet(22), &table),
            TableVerdict::Drop
        );
    }

    #[test]
    fn test_return_uses_underflow_policy() {
        let table = Table::new(vec![
            Rule::new(ReturnTarget),
            Rule::new(AcceptTarget),
            Rule::new(DropTarget),
        ])
        .with_chain(Hook::Input, 0, 1)
        .with_chain(Hook::Output, 0, 2);

        assert_eq!(
            check_table(Hook::Input, &tcp_packet(22), &table),
            TableVerdict::Accept
        );
        assert_eq!(
            check_table(Hook::Output, &tcp_packet(22), &table),
            TableVerdict::Drop
        );
    }

    #[test]
    fn test_drop_is_final_across_tables() {
        let counter = CountingMatcher::new(true);
        let dropping = Table::new(vec![Rule::new(DropTarget)]).with_chain(Hook::Output, 0, 0);
        let accepting = Table::new(vec![
            Rule::new(AcceptTarget).with_matcher(counter.clone()),
            Rule::new(AcceptTarget),
        ])
        .with_chain(Hook::Output, 0, 1);

        let tables = IpTables::new()
            .with_table("mangle", dropping)
            .with_table("filter", accepting)
            .with_priority(Hook::Output, &["mangle", "filter"]);

        assert!(tables.validate().is_ok());
        assert!(!tables.check(Hook::Output, &tcp_packet(80)));
        assert_eq!(counter.calls(), 0);
    }

    #[test]
    fn test_hook_without_tables_accepts() {
        let tables = IpTables::new();
        assert!(tables.check(Hook::Forward, &tcp_packet(22)));
    }

    #[test]
    fn test_interface_hint_passed_to_matchers() {
        let table = Table::new(vec![
            Rule::new(DropTarget).with_matcher(InterfaceMatcher::new("eth+")),
            Rule::new(AcceptTarget),
        ])
        .with_chain(Hook::Input, 0, 1)
        .with_chain(Hook::Output, 0, 1);
        let tables = IpTables::new()
            .with_table("filter", table)
            .with_priority(Hook::Input, &["filter"])
            .with_priority(Hook::Output, &["filter"]);

        let packet = tcp_packet(22)
            .with_input_interface("eth0")
            .with_output_interface("wlan0");
        assert!(!tables.check(Hook::Input, &packet));
        assert!(tables.check(Hook::Output, &packet));
    }

    #[test]
    fn test_validate_unknown_table() {
        let tables = IpTables::new().with_priority(Hook::Input, &["raw"]);
        assert!(matches!(
            tables.validate(),
            Err(Error::UnknownTable { hook: Hook::Input, .. })
        ));
    }

    #[test]
    fn test_validate_priority_needs_builtin_chain() {
        let table = Table::new(vec![]).with_unset_chain(Hook::Input);
        let tables = single_table(table, Hook::Input);
        assert!(matches!(
            tables.validate(),
            Err(Error::UnsetBuiltinChain { hook: Hook::Input, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_conditional_underflow() {
        let table = Table::new(vec![
            Rule::new(AcceptTarget).with_matcher(CountingMatcher::new(true)),
            Rule::new(ErrorTarget::default()),
        ])
        .with_chain(Hook::Input, 0, 0);

        assert!(matches!(
            single_table(table, Hook::Input).validate(),
            Err(Error::UnderflowNotUnconditional { .. })
        ));
    }

    #[test]
    fn test_rules_are_shared_between_clones() {
        let table = Table::new(vec![Rule::new(AcceptTarget)]).with_chain(Hook::Input, 0, 0);
        let tables = single_table(table, Hook::Input);
        let copy = tables.clone();

        let original = &tables.tables["filter"].rules[0].target;
        let cloned = &copy.tables["filter"].rules[0].target;
        assert!(Arc::ptr_eq(original, cloned));
    }

    #[test]
    fn test_display_lists_chains() {
        let table = Table::new(vec![Rule::new(AcceptTarget), Rule::new(ErrorTarget::default())])
            .with_chain(Hook::Input, 0, 0)
            .with_unset_chain(Hook::Forward);
        let text = single_table(table, Hook::Input).to_string();

        assert!(text.contains("*filter"));
        assert!(text.contains(":INPUT ACCEPT"));
        assert!(text.contains("# unset: FORWARD"));
        assert!(text.contains("# INPUT -> [filter]"));
    }
}
