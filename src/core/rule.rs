//! Rules: header filter, matchers, target

use crate::core::matcher::Matcher;
use crate::core::packet::{Packet, TransportProtocol};
use crate::core::target::Target;
use std::fmt;
use std::sync::Arc;

/// Constraints on the network-layer header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IpHeaderFilter {
    /// Required transport protocol; `None` accepts any
    pub protocol: Option<TransportProtocol>,
}

impl IpHeaderFilter {
    pub fn protocol(protocol: TransportProtocol) -> Self {
        Self {
            protocol: Some(protocol),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.protocol.is_none()
    }

    pub fn accepts(&self, packet: &Packet) -> bool {
        self.protocol
            .is_none_or(|p| packet.transport_protocol_number() == Some(p.number()))
    }
}

/// A single rule.
///
/// Matchers run in declaration order and stop at the first that fails, so
/// their order is part of the rule's meaning. Rules are shared by reference
/// between snapshots and threads and are never mutated after construction.
#[derive(Debug, Clone)]
pub struct Rule {
    pub filter: IpHeaderFilter,
    pub matchers: Vec<Arc<dyn Matcher>>,
    pub target: Arc<dyn Target>,
}

impl Rule {
    /// Creates an unconditional rule.
    pub fn new(target: impl Target + 'static) -> Self {
        Self {
            filter: IpHeaderFilter::default(),
            matchers: Vec::new(),
            target: Arc::new(target),
        }
    }

    pub fn with_filter(mut self, filter: IpHeaderFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matchers.push(Arc::new(matcher));
        self
    }

    /// Returns `true` if the rule runs its target for every packet.
    pub fn is_unconditional(&self) -> bool {
        self.filter.is_empty() && self.matchers.is_empty()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<8}", self.target.name())?;
        match self.filter.protocol {
            Some(p) => write!(f, " {:<6}", p.as_ref())?,
            None => write!(f, " {:<6}", "all")?,
        }
        for matcher in &self.matchers {
            write!(f, " {}", matcher.name())?;
        }
        Ok(())
    }
}
