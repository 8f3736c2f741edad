//! Stack hook points
//!
//! A [`Hook`] names the fixed place in packet traversal where the owning
//! network stack hands a packet to the filtering engine. The set is closed.

use serde::{Deserialize, Serialize};

/// Chain names as used by the conventional iptables tooling.
pub const CHAIN_NAME_PREROUTING: &str = "PREROUTING";
pub const CHAIN_NAME_INPUT: &str = "INPUT";
pub const CHAIN_NAME_FORWARD: &str = "FORWARD";
pub const CHAIN_NAME_OUTPUT: &str = "OUTPUT";
pub const CHAIN_NAME_POSTROUTING: &str = "POSTROUTING";

/// Stack interception point.
///
/// Ordering follows the path a forwarded packet takes through the stack, so
/// ordered collections keyed by `Hook` list chains in traversal order.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Hook {
    /// Every incoming packet, before the routing decision
    #[strum(serialize = "prerouting")]
    Prerouting,
    /// Incoming packets destined for this host
    #[strum(serialize = "input")]
    Input,
    /// Incoming packets routed to another host
    #[strum(serialize = "forward")]
    Forward,
    /// Locally generated packets
    #[strum(serialize = "output")]
    Output,
    /// Every outgoing packet, after the routing decision
    #[strum(serialize = "postrouting")]
    Postrouting,
}

impl Hook {
    /// Returns the conventional built-in chain name for this hook.
    pub const fn chain_name(self) -> &'static str {
        match self {
            Hook::Prerouting => CHAIN_NAME_PREROUTING,
            Hook::Input => CHAIN_NAME_INPUT,
            Hook::Forward => CHAIN_NAME_FORWARD,
            Hook::Output => CHAIN_NAME_OUTPUT,
            Hook::Postrouting => CHAIN_NAME_POSTROUTING,
        }
    }

    /// Returns `true` for hooks that see a packet on its way in.
    ///
    /// Ingress hooks hand matchers the input interface; egress hooks hand
    /// them the output interface. Forward counts as ingress, like
    /// iptables' `-i` on the FORWARD chain.
    pub const fn is_ingress(self) -> bool {
        matches!(self, Hook::Prerouting | Hook::Input | Hook::Forward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_hook_parse_is_case_insensitive() {
        assert_eq!(Hook::from_str("input").unwrap(), Hook::Input);
        assert_eq!(Hook::from_str("POSTROUTING").unwrap(), Hook::Postrouting);
        assert!(Hook::from_str("nat").is_err());
    }

    #[test]
    fn test_hooks_iterate_in_traversal_order() {
        let hooks: Vec<Hook> = Hook::iter().collect();
        let mut sorted = hooks.clone();
        sorted.sort();
        assert_eq!(hooks, sorted);
        assert_eq!(hooks.len(), 5);
    }

    #[test]
    fn test_chain_names() {
        assert_eq!(Hook::Forward.chain_name(), "FORWARD");
        assert_eq!(Hook::Prerouting.to_string(), "prerouting");
    }

    #[test]
    fn test_hook_serializes_lowercase() {
        let json = serde_json::to_string(&Hook::Output).unwrap();
        assert_eq!(json, "\"output\"");
    }
}
