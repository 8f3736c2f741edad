//! Packet view consumed by the engine
//!
//! The owning network stack parses and positions headers before calling into
//! the engine. [`Packet`] is the read-only view the engine, its matchers and
//! its targets get: the network-layer header bytes, the transport header
//! bytes and the interfaces the packet arrived on or leaves by.
//!
//! [`PacketSpec`] goes the other way and synthesizes well-formed headers from
//! a handful of fields. The CLI uses it to build probe packets.

use crate::core::error::{Error, Result};
use crate::core::hook::Hook;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

const IPV4_HEADER_LEN: usize = 20;
const IPV4_PROTOCOL_OFFSET: usize = 9;
const IPV4_SRC_OFFSET: usize = 12;
const IPV4_DST_OFFSET: usize = 16;

const IPV6_HEADER_LEN: usize = 40;
const IPV6_NEXT_HEADER_OFFSET: usize = 6;
const IPV6_SRC_OFFSET: usize = 8;
const IPV6_DST_OFFSET: usize = 24;

const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const ICMP_HEADER_LEN: usize = 8;

const DEFAULT_TTL: u8 = 64;

/// Transport protocols the engine knows by name.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum TransportProtocol {
    #[strum(serialize = "icmp")]
    Icmp,
    #[strum(serialize = "tcp")]
    Tcp,
    #[strum(serialize = "udp")]
    Udp,
    #[strum(serialize = "icmpv6")]
    Icmpv6,
}

impl TransportProtocol {
    /// IANA protocol number, as carried in the IPv4 protocol field or the
    /// IPv6 next-header field.
    pub const fn number(self) -> u8 {
        match self {
            TransportProtocol::Icmp => 1,
            TransportProtocol::Tcp => 6,
            TransportProtocol::Udp => 17,
            TransportProtocol::Icmpv6 => 58,
        }
    }

    pub const fn from_number(number: u8) -> Option<Self> {
        match number {
            1 => Some(TransportProtocol::Icmp),
            6 => Some(TransportProtocol::Tcp),
            17 => Some(TransportProtocol::Udp),
            58 => Some(TransportProtocol::Icmpv6),
            _ => None,
        }
    }

    /// Returns `true` if the protocol header starts with source and
    /// destination ports.
    pub const fn has_ports(self) -> bool {
        matches!(self, TransportProtocol::Tcp | TransportProtocol::Udp)
    }
}

/// A packet whose network header has already been located by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    network_header: Vec<u8>,
    transport_header: Vec<u8>,
    input_interface: Option<String>,
    output_interface: Option<String>,
}

impl Packet {
    pub fn new(network_header: Vec<u8>) -> Self {
        Self {
            network_header,
            ..Self::default()
        }
    }

    pub fn with_transport_header(mut self, header: Vec<u8>) -> Self {
        self.transport_header = header;
        self
    }

    pub fn with_input_interface(mut self, name: impl Into<String>) -> Self {
        self.input_interface = Some(name.into());
        self
    }

    pub fn with_output_interface(mut self, name: impl Into<String>) -> Self {
        self.output_interface = Some(name.into());
        self
    }

    pub fn network_header(&self) -> &[u8] {
        &self.network_header
    }

    pub fn transport_header(&self) -> &[u8] {
        &self.transport_header
    }

    pub fn input_interface(&self) -> Option<&str> {
        self.input_interface.as_deref()
    }

    pub fn output_interface(&self) -> Option<&str> {
        self.output_interface.as_deref()
    }

    /// Returns the interface matchers see at `hook`.
    pub fn interface_for(&self, hook: Hook) -> Option<&str> {
        if hook.is_ingress() {
            self.input_interface()
        } else {
            self.output_interface()
        }
    }

    /// IP version from the first nibble of the network header.
    pub fn ip_version(&self) -> Option<u8> {
        self.network_header.first().map(|b| b >> 4)
    }

    /// Raw transport protocol number.
    ///
    /// For IPv6 this is the fixed header's next-header field; extension
    /// headers are not walked.
    pub fn transport_protocol_number(&self) -> Option<u8> {
        match self.ip_version()? {
            4 => self.network_header.get(IPV4_PROTOCOL_OFFSET).copied(),
            6 => self.network_header.get(IPV6_NEXT_HEADER_OFFSET).copied(),
            _ => None,
        }
    }

    pub fn transport_protocol(&self) -> Option<TransportProtocol> {
        self.transport_protocol_number()
            .and_then(TransportProtocol::from_number)
    }

    pub fn source_addr(&self) -> Option<IpAddr> {
        self.address(IPV4_SRC_OFFSET, IPV6_SRC_OFFSET)
    }

    pub fn destination_addr(&self) -> Option<IpAddr> {
        self.address(IPV4_DST_OFFSET, IPV6_DST_OFFSET)
    }

    /// Source port, read from the first two transport header bytes.
    ///
    /// Only meaningful when [`TransportProtocol::has_ports`] holds for the
    /// packet's protocol. `None` if the header is truncated.
    pub fn source_port(&self) -> Option<u16> {
        self.port_at(0)
    }

    pub fn destination_port(&self) -> Option<u16> {
        self.port_at(2)
    }

    fn address(&self, v4_offset: usize, v6_offset: usize) -> Option<IpAddr> {
        match self.ip_version()? {
            4 => {
                let bytes: [u8; 4] = self
                    .network_header
                    .get(v4_offset..v4_offset + 4)?
                    .try_into()
                    .ok()?;
                Some(IpAddr::V4(Ipv4Addr::from(bytes)))
            }
            6 => {
                let bytes: [u8; 16] = self
                    .network_header
                    .get(v6_offset..v6_offset + 16)?
                    .try_into()
                    .ok()?;
                Some(IpAddr::V6(Ipv6Addr::from(bytes)))
            }
            _ => None,
        }
    }

    fn port_at(&self, offset: usize) -> Option<u16> {
        let bytes: [u8; 2] = self
            .transport_header
            .get(offset..offset + 2)?
            .try_into()
            .ok()?;
        Some(u16::from_be_bytes(bytes))
    }
}

/// Field-level description of a probe packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketSpec {
    pub protocol: TransportProtocol,
    pub source: IpAddr,
    pub destination: IpAddr,
    #[serde(default)]
    pub source_port: u16,
    #[serde(default)]
    pub destination_port: u16,
    #[serde(default)]
    pub input_interface: Option<String>,
    #[serde(default)]
    pub output_interface: Option<String>,
}

impl PacketSpec {
    /// Synthesizes the network and transport headers these fields describe.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if source and destination are from
    /// different address families.
    pub fn build(&self) -> Result<Packet> {
        let transport = self.transport_header();
        let network = match (self.source, self.destination) {
            (IpAddr::V4(src), IpAddr::V4(dst)) => {
                ipv4_header(src, dst, self.protocol.number(), transport.len())
            }
            (IpAddr::V6(src), IpAddr::V6(dst)) => {
                ipv6_header(src, dst, self.protocol.number(), transport.len())
            }
            _ => {
                return Err(Error::Validation {
                    field: "destination".to_string(),
                    message: "source and destination must be the same address family"
                        .to_string(),
                });
            }
        };

        let mut packet = Packet::new(network).with_transport_header(transport);
        if let Some(name) = &self.input_interface {
            packet = packet.with_input_interface(name.clone());
        }
        if let Some(name) = &self.output_interface {
            packet = packet.with_output_interface(name.clone());
        }
        Ok(packet)
    }

    fn transport_header(&self) -> Vec<u8> {
        match self.protocol {
            TransportProtocol::Tcp => {
                let mut header = vec![0u8; TCP_MIN_HEADER_LEN];
                header[0..2].copy_from_slice(&self.source_port.to_be_bytes());
                header[2..4].copy_from_slice(&self.destination_port.to_be_bytes());
                // Data offset of five words, SYN set
                header[12] = 5 << 4;
                header[13] = 0x02;
                header
            }
            TransportProtocol::Udp => {
                let mut header = vec![0u8; UDP_HEADER_LEN];
                header[0..2].copy_from_slice(&self.source_port.to_be_bytes());
                header[2..4].copy_from_slice(&self.destination_port.to_be_bytes());
                header[4..6].copy_from_slice(&(UDP_HEADER_LEN as u16).to_be_bytes());
                header
            }
            TransportProtocol::Icmp => {
                let mut header = vec![0u8; ICMP_HEADER_LEN];
                // Echo request
                header[0] = 8;
                header
            }
            TransportProtocol::Icmpv6 => {
                let mut header = vec![0u8; ICMP_HEADER_LEN];
                header[0] = 128;
                header
            }
        }
    }
}

fn ipv4_header(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, transport_len: usize) -> Vec<u8> {
    let total_len = u16::try_from(IPV4_HEADER_LEN + transport_len).unwrap_or(u16::MAX);
    let mut header = vec![0u8; IPV4_HEADER_LEN];
    header[0] = 0x45;
    header[2..4].copy_from_slice(&total_len.to_be_bytes());
    header[8] = DEFAULT_TTL;
    header[IPV4_PROTOCOL_OFFSET] = protocol;
    header[IPV4_SRC_OFFSET..IPV4_SRC_OFFSET + 4].copy_from_slice(&src.octets());
    header[IPV4_DST_OFFSET..IPV4_DST_OFFSET + 4].copy_from_slice(&dst.octets());
    let checksum = internet_checksum(&header);
    header[10..12].copy_from_slice(&checksum.to_be_bytes());
    header
}

fn ipv6_header(src: Ipv6Addr, dst: Ipv6Addr, next_header: u8, payload_len: usize) -> Vec<u8> {
    let payload_len = u16::try_from(payload_len).unwrap_or(u16::MAX);
    let mut header = vec![0u8; IPV6_HEADER_LEN];
    header[0] = 0x60;
    header[4..6].copy_from_slice(&payload_len.to_be_bytes());
    header[IPV6_NEXT_HEADER_OFFSET] = next_header;
    header[7] = DEFAULT_TTL;
    header[IPV6_SRC_OFFSET..IPV6_SRC_OFFSET + 16].copy_from_slice(&src.octets());
    header[IPV6_DST_OFFSET..IPV6_DST_OFFSET + 16].copy_from_slice(&dst.octets());
    header
}

/// RFC 1071 ones' complement checksum.
fn internet_checksum(bytes: &[u8]) -> u16 {
    let mut sum: u32 = bytes
        .chunks(2)
        .map(|pair| {
            let hi = u32::from(pair[0]) << 8;
            let lo = pair.get(1).copied().map_or(0, u32::from);
            hi | lo
        })
        .sum();
    while sum > 0xffff {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    #[allow(clippy::cast_possible_truncation)]
    let folded = sum as u16;
    !folded
}
