//! Concurrent probing: one worker task per hop, joined before assembly.

use super::probe_hop;
use crate::hops::HopTable;
use crate::traits::ProbeTransport;
use crate::types::Config;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::warn;

/// Spawns one worker per hop slot and waits for all of them.
///
/// Each worker mutates only its own slot; the table is shared read-only
/// for the come-back duplicate scan. Unknown-hop retries are always
/// enabled in this variant.
pub(crate) async fn probe_all_parallel<T: ProbeTransport + 'static>(
    transport: &Arc<T>,
    table: &Arc<HopTable>,
    dst: Ipv4Addr,
    config: &Config,
) {
    let mut workers = JoinSet::new();
    for i in 0..table.len() {
        let transport = Arc::clone(transport);
        let table = Arc::clone(table);
        let config = config.clone();
        workers.spawn(async move {
            let slot = Arc::clone(&table.slots()[i]);
            probe_hop(transport.as_ref(), &table, &slot, dst, &config, true).await;
        });
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "probe worker failed to join");
        }
    }
}
