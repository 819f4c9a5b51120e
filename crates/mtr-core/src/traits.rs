//! The probe transport consumed by the measurement engine.

use crate::error::MtrError;
use crate::types::ProbeReply;
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::time::Duration;

/// Capability set required of a probe transport: a one-shot traceroute
/// sweep plus single TTL-scoped probes.
///
/// Methods take `&self` so one transport can be shared across the per-hop
/// workers of the concurrent probing variant.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Issues one ICMP echo probe per TTL in `1..=max_hops` toward `dst`
    /// and returns every reply received before the probes time out.
    ///
    /// Replies may come back in any order. The transport should deliver at
    /// most one reply per TTL; the engine tolerates a second reply for the
    /// same TTL by keeping the first and logging the conflict.
    async fn trace(&self, dst: Ipv4Addr) -> Result<Vec<ProbeReply>, MtrError>;

    /// Sends a single echo probe with the given TTL to `ip` and waits up
    /// to `timeout` for any ICMP reply.
    ///
    /// Returns `Ok(None)` if no reply arrived within the timeout.
    async fn probe(
        &self,
        ip: Ipv4Addr,
        ttl: u8,
        timeout: Duration,
    ) -> Result<Option<ProbeReply>, MtrError>;

    /// Releases the transport.
    async fn close(&self) -> Result<(), MtrError>;
}
