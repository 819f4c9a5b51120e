//! Hop-discovery phase: one traceroute sweep into an ordered hop table.

use crate::error::MtrError;
use crate::hops::{HopSlot, HopTable};
use crate::traits::ProbeTransport;
use crate::types::{Config, ProbeReply};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Runs the initial trace and builds the hop table.
///
/// Returns the table together with the report timestamp, stamped after
/// the sweep completes.
pub(crate) async fn discover<T: ProbeTransport + ?Sized>(
    transport: &T,
    dst: Ipv4Addr,
    dst_str: &str,
    config: &Config,
) -> Result<(HopTable, i64), MtrError> {
    let replies = transport.trace(dst).await?;
    let time = now_unix_seconds();
    let routes = collect_routes(replies);
    Ok((build_table(&routes, dst, dst_str, config), time))
}

fn now_unix_seconds() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Indexes replies by TTL, keeping the first reply per TTL.
///
/// A second reply for the same TTL is a transport bug; both addresses are
/// logged and the later one dropped.
fn collect_routes(replies: Vec<ProbeReply>) -> HashMap<u8, ProbeReply> {
    let mut routes = HashMap::with_capacity(replies.len());
    for reply in replies {
        match routes.entry(reply.ttl) {
            Entry::Occupied(existing) => {
                let existing: &ProbeReply = existing.get();
                warn!(
                    ttl = reply.ttl,
                    new_ip = %reply.ip,
                    existing_ip = %existing.ip,
                    "conflicting replies for TTL, keeping the first"
                );
            }
            Entry::Vacant(slot) => {
                slot.insert(reply);
            }
        }
    }
    routes
}

/// Walks TTLs in order, creating one slot per TTL until a termination
/// rule fires.
///
/// Termination is checked after each TTL, in order: the destination
/// answered at this TTL (numeric address comparison); too many
/// consecutive silent TTLs; the responder's rendered address equals the
/// caller's destination string (kept as a redundant safety check).
fn build_table(
    routes: &HashMap<u8, ProbeReply>,
    dst: Ipv4Addr,
    dst_str: &str,
    config: &Config,
) -> HopTable {
    let mut table = HopTable::default();
    let mut consecutive_unknowns = 0u32;
    for ttl in 1..=config.max_hops {
        let responder = if let Some(reply) = routes.get(&ttl) {
            table.push(HopSlot::known(ttl, reply.ip, reply.rtt_ms()));
            consecutive_unknowns = 0;
            Some(reply.ip)
        } else {
            table.push(HopSlot::unknown(ttl));
            consecutive_unknowns += 1;
            None
        };
        if responder == Some(dst) {
            break;
        }
        if consecutive_unknowns >= config.max_unknowns {
            break;
        }
        if responder.is_some_and(|ip| ip.to_string() == dst_str) {
            break;
        }
    }
    table
}
