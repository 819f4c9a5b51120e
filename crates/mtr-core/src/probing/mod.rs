//! Probing phase: per-hop statistics collection with come-back recovery.
//!
//! Both execution variants share the same per-hop loop; they differ only
//! in whether hops are visited in TTL order or by one worker task each.

pub(crate) mod parallel;
pub(crate) mod serial;

use crate::hops::{HopSlot, HopTable};
use crate::traits::ProbeTransport;
use crate::types::{Config, ProbeReply};
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, trace};

/// Destination-directed retries per unknown hop before giving up.
const RETRY_CAP: u32 = 4;
/// Timeout back-off added per failed destination-directed retry.
const BACKOFF_STEP: Duration = Duration::from_secs(1);
/// Ceiling for the backed-off retry timeout.
const BACKOFF_CEILING: Duration = Duration::from_secs(5);

/// Issues the `ping_count - 1` follow-up probes for one hop and folds the
/// outcomes into its statistics.
///
/// A hop that answered discovery is probed directly. A hop that did not
/// is re-traced through the destination at the hop's own TTL; if a fresh
/// address answers there, the hop enters come-back mode and is probed
/// directly at that TTL with the timeout that worked. An address already
/// attributed to another hop is never adopted.
pub(crate) async fn probe_hop<T: ProbeTransport + ?Sized>(
    transport: &T,
    table: &HopTable,
    slot: &HopSlot,
    dst: Ipv4Addr,
    config: &Config,
    retry_unknown: bool,
) {
    let mut to = config.base_timeout;
    let mut retry_time = 0u32;
    let mut work_timeout = config.base_timeout;
    let mut comeback = false;

    for _ in 1..config.ping_count {
        // Sent counts the attempt even when the retry cap skips the probe.
        slot.update_stats(|stats| stats.sent += 1.0);

        match slot.host() {
            Some(host) => {
                let (ttl, timeout) = if comeback {
                    (slot.index, work_timeout)
                } else {
                    (config.max_hops, config.base_timeout)
                };
                match transport.probe(host, ttl, timeout).await {
                    Ok(Some(reply)) => record_success(slot, &reply),
                    Ok(None) => slot.update_stats(|stats| stats.lost += 1),
                    Err(err) => {
                        debug!(hop = slot.index, error = %err, "probe failed");
                        slot.update_stats(|stats| stats.lost += 1);
                    }
                }
            }
            None => {
                if !retry_unknown {
                    slot.update_stats(|stats| stats.lost += 1);
                    continue;
                }
                if retry_time >= RETRY_CAP {
                    continue;
                }
                match transport.probe(dst, slot.index, to).await {
                    Ok(Some(reply)) if !table.contains_host(reply.ip) => {
                        comeback = true;
                        work_timeout = to;
                        slot.set_host(reply.ip);
                        record_success(slot, &reply);
                    }
                    Ok(Some(reply)) => {
                        trace!(
                            hop = slot.index,
                            ip = %reply.ip,
                            "responder already attributed to another hop"
                        );
                        to = back_off(to);
                        slot.update_stats(|stats| stats.lost += 1);
                    }
                    Ok(None) => {
                        to = back_off(to);
                        slot.update_stats(|stats| stats.lost += 1);
                    }
                    Err(err) => {
                        debug!(hop = slot.index, error = %err, "retrace failed");
                        to = back_off(to);
                        slot.update_stats(|stats| stats.lost += 1);
                    }
                }
                retry_time += 1;
            }
        }
    }

    // Loss is only recomputed for hops with a responder; a hop that never
    // answered keeps the 1.0 it got from discovery.
    if slot.host().is_some() {
        slot.update_stats(|stats| stats.loss = f64::from(stats.lost) / stats.sent);
    }
}

fn record_success(slot: &HopSlot, reply: &ProbeReply) {
    let rtt = reply.rtt_ms();
    slot.update_stats(|stats| {
        stats.last = rtt;
        stats.avg = (stats.avg * (stats.sent - 1.0) + rtt) / stats.sent;
        if stats.best > rtt {
            stats.best = rtt;
        }
        if stats.wrst < rtt {
            stats.wrst = rtt;
        }
    });
}

fn back_off(to: Duration) -> Duration {
    if to < BACKOFF_CEILING {
        to + BACKOFF_STEP
    } else {
        to
    }
}
