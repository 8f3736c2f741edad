//! Shared test utilities for core module tests
//!
//! Provides common packets and instrumented matchers to avoid duplication
//! across test suites. This module is only compiled in test mode.

use crate::core::hook::Hook;
use crate::core::matcher::{MatchResult, Matcher};
use crate::core::packet::{Packet, PacketSpec, TransportProtocol};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Builds a packet from field values.
///
/// # Panics
///
/// Panics if `source` and `destination` are not valid addresses of the same
/// family.
pub fn packet(
    protocol: TransportProtocol,
    source: &str,
    destination: &str,
    source_port: u16,
    destination_port: u16,
) -> Packet {
    PacketSpec {
        protocol,
        source: source.parse().expect("valid source address"),
        destination: destination.parse().expect("valid destination address"),
        source_port,
        destination_port,
        input_interface: None,
        output_interface: None,
    }
    .build()
    .expect("matching address families")
}

/// IPv4 TCP packet from 10.0.0.1:40000 to 10.0.0.2 on `port`.
pub fn tcp_packet(port: u16) -> Packet {
    packet(TransportProtocol::Tcp, "10.0.0.1", "10.0.0.2", 40000, port)
}

/// IPv4 UDP packet from 10.0.0.1:40000 to 10.0.0.2 on `port`.
pub fn udp_packet(port: u16) -> Packet {
    packet(TransportProtocol::Udp, "10.0.0.1", "10.0.0.2", 40000, port)
}

/// Matcher with a fixed answer that counts how often it was asked.
///
/// Clones share the counter, so a test can keep one clone and hand the
/// other to a rule.
#[derive(Debug, Clone)]
pub struct CountingMatcher {
    answer: bool,
    calls: Arc<AtomicUsize>,
}

impl CountingMatcher {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Matcher for CountingMatcher {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn matches(&self, _hook: Hook, _packet: &Packet, _interface: Option<&str>) -> MatchResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        MatchResult::from_bool(self.answer)
    }
}

/// Matcher that always demands a hot drop.
#[derive(Debug, Clone, Copy)]
pub struct HotDropMatcher;

impl Matcher for HotDropMatcher {
    fn name(&self) -> &'static str {
        "hotdrop"
    }

    fn matches(&self, _hook: Hook, _packet: &Packet, _interface: Option<&str>) -> MatchResult {
        MatchResult::HOT_DROP
    }
}
