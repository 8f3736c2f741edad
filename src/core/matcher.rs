//! Rule matchers
//!
//! A [`Matcher`] is a read-only predicate over a packet. Rules hold an
//! ordered list of them and evaluate them with short-circuit AND semantics.
//! A matcher can also demand a hot drop: an immediate, unconditional drop
//! that skips the remaining matchers and the rule's target. The built-in
//! matchers use it for packets too malformed to evaluate.

use crate::core::error::{Error, Result};
use crate::core::hook::Hook;
use crate::core::packet::{Packet, TransportProtocol};
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of running a matcher against a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchResult {
    pub matches: bool,
    /// Drop the packet now, regardless of `matches`
    pub hot_drop: bool,
}

impl MatchResult {
    pub const MATCH: Self = Self {
        matches: true,
        hot_drop: false,
    };
    pub const NO_MATCH: Self = Self {
        matches: false,
        hot_drop: false,
    };
    pub const HOT_DROP: Self = Self {
        matches: false,
        hot_drop: true,
    };

    pub const fn from_bool(matches: bool) -> Self {
        if matches { Self::MATCH } else { Self::NO_MATCH }
    }
}

/// Condition a rule checks before running its target.
///
/// Implementations must not mutate the packet and must be safe to call from
/// many threads at once; the same rule is evaluated concurrently for every
/// in-flight packet.
pub trait Matcher: fmt::Debug + Send + Sync {
    /// Short extension name, as iptables would print it (`tcp`, `iprange`…).
    fn name(&self) -> &'static str;

    /// Tests `packet` at `hook`. `interface` is the interface the packet is
    /// arriving on (ingress hooks) or leaving by (egress hooks), if known.
    fn matches(&self, hook: Hook, packet: &Packet, interface: Option<&str>) -> MatchResult;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.start..=self.end).contains(&port)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// Matches TCP or UDP ports.
///
/// Hot-drops packets that claim the protocol but whose transport header is
/// too short to carry both ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMatcher {
    protocol: TransportProtocol,
    source: Option<PortRange>,
    destination: Option<PortRange>,
}

impl PortMatcher {
    /// # Errors
    ///
    /// Returns `Error::Validation` for protocols without ports.
    pub fn new(protocol: TransportProtocol) -> Result<Self> {
        if !protocol.has_ports() {
            return Err(Error::Validation {
                field: "protocol".to_string(),
                message: format!("{protocol} has no ports to match"),
            });
        }
        Ok(Self {
            protocol,
            source: None,
            destination: None,
        })
    }

    pub fn with_source(mut self, range: PortRange) -> Self {
        self.source = Some(range);
        self
    }

    pub fn with_destination(mut self, range: PortRange) -> Self {
        self.destination = Some(range);
        self
    }
}

impl Matcher for PortMatcher {
    fn name(&self) -> &'static str {
        match self.protocol {
            TransportProtocol::Udp => "udp",
            _ => "tcp",
        }
    }

    fn matches(&self, _hook: Hook, packet: &Packet, _interface: Option<&str>) -> MatchResult {
        if packet.transport_protocol_number() != Some(self.protocol.number()) {
            return MatchResult::NO_MATCH;
        }

        let (Some(source), Some(destination)) = (packet.source_port(), packet.destination_port())
        else {
            return MatchResult::HOT_DROP;
        };

        let source_ok = self.source.is_none_or(|r| r.contains(source));
        let destination_ok = self.destination.is_none_or(|r| r.contains(destination));
        MatchResult::from_bool(source_ok && destination_ok)
    }
}

/// Matches source and/or destination networks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddressMatcher {
    source: Option<IpNetwork>,
    destination: Option<IpNetwork>,
    invert: bool,
}

impl AddressMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, network: IpNetwork) -> Self {
        self.source = Some(network);
        self
    }

    pub fn with_destination(mut self, network: IpNetwork) -> Self {
        self.destination = Some(network);
        self
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }
}

impl Matcher for AddressMatcher {
    fn name(&self) -> &'static str {
        "iprange"
    }

    fn matches(&self, _hook: Hook, packet: &Packet, _interface: Option<&str>) -> MatchResult {
        let source_ok = self.source.is_none_or(|network| {
            packet
                .source_addr()
                .is_some_and(|addr| network.contains(addr))
        });
        let destination_ok = self.destination.is_none_or(|network| {
            packet
                .destination_addr()
                .is_some_and(|addr| network.contains(addr))
        });
        MatchResult::from_bool((source_ok && destination_ok) != self.invert)
    }
}

/// Matches the interface hint.
///
/// A trailing `+` matches any interface with the preceding prefix, so
/// `eth+` covers `eth0` and `eth1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceMatcher {
    pattern: String,
    invert: bool,
}

impl InterfaceMatcher {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            invert: false,
        }
    }

    pub fn inverted(mut self) -> Self {
        self.invert = true;
        self
    }

    fn pattern_matches(&self, name: &str) -> bool {
        match self.pattern.strip_suffix('+') {
            Some(prefix) => name.starts_with(prefix),
            None => name == self.pattern,
        }
    }
}

impl Matcher for InterfaceMatcher {
    fn name(&self) -> &'static str {
        "iface"
    }

    fn matches(&self, _hook: Hook, _packet: &Packet, interface: Option<&str>) -> MatchResult {
        let found = interface.is_some_and(|name| self.pattern_matches(name));
        MatchResult::from_bool(found != self.invert)
    }
}
