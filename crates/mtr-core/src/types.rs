//! Core types for path measurement.

use crate::MtrError;
use std::net::Ipv4Addr;
use std::time::Duration;

/// A single reply delivered by the probe transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeReply {
    /// The TTL the probe was sent with.
    pub ttl: u8,
    /// The address that responded.
    pub ip: Ipv4Addr,
    /// Round-trip time for this probe.
    pub rtt: Duration,
}

impl ProbeReply {
    /// The round-trip time in milliseconds.
    pub fn rtt_ms(&self) -> f64 {
        self.rtt.as_secs_f64() * 1000.0
    }
}

/// Immutable per-run measurement parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Source address probes are sent from.
    pub source_ip: Ipv4Addr,
    /// Highest TTL probed during discovery.
    pub max_hops: u8,
    /// Total probes attributed to each hop, the discovery probe included.
    pub ping_count: u32,
    /// Discovery stops after this many consecutive unanswered TTLs.
    pub max_unknowns: u32,
    /// Timeout for a single probe before back-off applies.
    pub base_timeout: Duration,
}

impl Config {
    /// Builds a validated configuration.
    ///
    /// Fails with [`MtrError::UnknownSourceIp`] when `source_ip` is not an
    /// IPv4 literal, and with [`MtrError::InvalidConfig`] for zero counts.
    pub fn new(
        source_ip: &str,
        max_hops: u8,
        ping_count: u32,
        max_unknowns: u32,
        base_timeout: Duration,
    ) -> Result<Self, MtrError> {
        let source_ip: Ipv4Addr = source_ip.parse().map_err(|_| MtrError::UnknownSourceIp)?;
        if max_hops == 0 {
            return Err(MtrError::InvalidConfig("max_hops must be positive"));
        }
        if ping_count == 0 {
            return Err(MtrError::InvalidConfig("ping_count must be positive"));
        }
        if max_unknowns == 0 {
            return Err(MtrError::InvalidConfig("max_unknowns must be positive"));
        }
        Ok(Self {
            source_ip,
            max_hops,
            ping_count,
            max_unknowns,
            base_timeout,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_ip: Ipv4Addr::UNSPECIFIED,
            max_hops: 30,
            ping_count: 20,
            max_unknowns: 5,
            base_timeout: Duration::from_secs(1),
        }
    }
}
