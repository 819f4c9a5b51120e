//! Orchestrates a full path-measurement run.

use crate::discovery::discover;
use crate::error::{MtrError, RunError};
use crate::probing::parallel::probe_all_parallel;
use crate::probing::serial::probe_all_serial;
use crate::report::{assemble, Report};
use crate::traits::ProbeTransport;
use crate::types::Config;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::debug;

enum ProbeMode {
    /// Sequential, unknown hops never retried.
    NoRetry,
    /// Sequential with destination-directed recovery of unknown hops.
    Sequential,
    /// One worker per hop with recovery, joined before assembly.
    Concurrent,
}

/// Path measurement handle: a validated configuration bound to a probe
/// transport.
///
/// The transport is acquired once at construction and released by
/// [`Mtr::close`]. All run state is scoped to a single call; nothing
/// persists across runs.
pub struct Mtr<T: ProbeTransport> {
    config: Config,
    transport: Arc<T>,
}

impl<T: ProbeTransport + 'static> Mtr<T> {
    pub fn new(transport: T, config: Config) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Measures the path to `dst`, probing hops in TTL order and leaving
    /// unknown hops alone.
    pub async fn run_path_no_retry(&self, dst: &str) -> Result<Report, RunError> {
        self.run(dst, ProbeMode::NoRetry).await
    }

    /// Measures the path to `dst`, probing hops in TTL order and retrying
    /// unknown hops through the destination.
    pub async fn run_path_sequential(&self, dst: &str) -> Result<Report, RunError> {
        self.run(dst, ProbeMode::Sequential).await
    }

    /// Measures the path to `dst` with one worker per hop.
    pub async fn run_path_concurrent(&self, dst: &str) -> Result<Report, RunError> {
        self.run(dst, ProbeMode::Concurrent).await
    }

    /// Releases the transport.
    pub async fn close(&self) -> Result<(), MtrError> {
        self.transport.close().await
    }

    async fn run(&self, dst: &str, mode: ProbeMode) -> Result<Report, RunError> {
        let dst_ip: Ipv4Addr = match dst.parse() {
            Ok(ip) => ip,
            Err(_) => {
                return Err(RunError {
                    report: Report::default(),
                    source: MtrError::UnknownDestIp,
                })
            }
        };
        let src = self.config.source_ip.to_string();

        let (table, time) =
            match discover(self.transport.as_ref(), dst_ip, dst, &self.config).await {
                Ok(discovered) => discovered,
                Err(source) => {
                    return Err(RunError {
                        report: Report {
                            time: 0,
                            src,
                            dst: dst.to_string(),
                            count: self.config.ping_count,
                            hups: Vec::new(),
                        },
                        source,
                    })
                }
            };
        debug!(dst, hops = table.len(), "discovery complete");

        let table = Arc::new(table);
        match mode {
            ProbeMode::NoRetry => {
                probe_all_serial(self.transport.as_ref(), &table, dst_ip, &self.config, false)
                    .await;
            }
            ProbeMode::Sequential => {
                probe_all_serial(self.transport.as_ref(), &table, dst_ip, &self.config, true)
                    .await;
            }
            ProbeMode::Concurrent => {
                probe_all_parallel(&self.transport, &table, dst_ip, &self.config).await;
            }
        }

        Ok(assemble(&table, time, &src, dst, self.config.ping_count))
    }
}
