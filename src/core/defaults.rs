//! Stock rulesets used at stack bring-up
//!
//! Both builders return a fresh, owned ruleset. Nothing here is global.

use crate::core::hook::Hook;
use crate::core::iptables::IpTables;
use crate::core::rule::Rule;
use crate::core::table::Table;
use crate::core::target::{AcceptTarget, ErrorTarget};

pub const TABLE_NAME_NAT: &str = "nat";
pub const TABLE_NAME_MANGLE: &str = "mangle";
pub const TABLE_NAME_FILTER: &str = "filter";

/// Builds the permissive default ruleset.
///
/// `nat`, `mangle` and `filter` each hold one accept rule per built-in chain,
/// which is also that chain's policy, followed by the error sentinel. The
/// per-hook table order is the conventional netfilter one and is observable
/// behavior, so it must not be rearranged:
///
/// | hook       | tables                 |
/// |------------|------------------------|
/// | PREROUTING | mangle, nat            |
/// | INPUT      | nat, filter            |
/// | OUTPUT     | mangle, nat, filter    |
///
/// FORWARD and POSTROUTING consult no tables.
pub fn default_tables() -> IpTables {
    let nat = Table::new(vec![
        Rule::new(AcceptTarget),
        Rule::new(AcceptTarget),
        Rule::new(AcceptTarget),
        Rule::new(AcceptTarget),
        Rule::new(ErrorTarget::default()),
    ])
    .with_chain(Hook::Prerouting, 0, 0)
    .with_chain(Hook::Input, 1, 1)
    .with_chain(Hook::Output, 2, 2)
    .with_chain(Hook::Postrouting, 3, 3);

    let mangle = Table::new(vec![
        Rule::new(AcceptTarget),
        Rule::new(AcceptTarget),
        Rule::new(ErrorTarget::default()),
    ])
    .with_chain(Hook::Prerouting, 0, 0)
    .with_chain(Hook::Output, 1, 1);

    let filter = Table::new(vec![
        Rule::new(AcceptTarget),
        Rule::new(AcceptTarget),
        Rule::new(AcceptTarget),
        Rule::new(ErrorTarget::default()),
    ])
    .with_chain(Hook::Input, 0, 0)
    .with_chain(Hook::Forward, 1, 1)
    .with_chain(Hook::Output, 2, 2);

    IpTables::new()
        .with_table(TABLE_NAME_NAT, nat)
        .with_table(TABLE_NAME_MANGLE, mangle)
        .with_table(TABLE_NAME_FILTER, filter)
        .with_priority(Hook::Input, &[TABLE_NAME_NAT, TABLE_NAME_FILTER])
        .with_priority(Hook::Prerouting, &[TABLE_NAME_MANGLE, TABLE_NAME_NAT])
        .with_priority(
            Hook::Output,
            &[TABLE_NAME_MANGLE, TABLE_NAME_NAT, TABLE_NAME_FILTER],
        )
}

/// Builds a filter table with no rules whose INPUT, FORWARD and OUTPUT
/// chains are all unset.
pub fn empty_filter_table() -> Table {
    Table::new(Vec::new())
        .with_unset_chain(Hook::Input)
        .with_unset_chain(Hook::Forward)
        .with_unset_chain(Hook::Output)
}

/// Builds a ruleset holding only [`empty_filter_table`] and consulting no
/// tables at any hook: every packet passes.
pub fn empty_filter_tables() -> IpTables {
    IpTables::new().with_table(TABLE_NAME_FILTER, empty_filter_table())
}
