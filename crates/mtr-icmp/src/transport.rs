//! Raw-socket implementation of the probe transport.

use crate::packet::{build_echo_request, parse_reply};
use async_trait::async_trait;
use mtr_core::{MtrError, ProbeReply, ProbeTransport};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::collections::{HashMap, HashSet};
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::{Duration, Instant};
use tracing::trace;

/// Delay between the TTL-staggered probes of a trace sweep.
const TRACE_DELAY: Duration = Duration::from_millis(10);
/// Receive poll granularity while waiting for replies.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const RECV_BUFFER_LEN: usize = 1500;

/// Global echo-id counter so concurrent transports never share an id.
static ECHO_ID_COUNTER: AtomicU16 = AtomicU16::new(1);

fn next_echo_id() -> u16 {
    ECHO_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// ICMPv4 probe transport over a raw socket.
///
/// Sockets are scoped per operation: `trace` holds one for the whole
/// sweep, `probe` opens and drops one per call, so every exit path
/// releases the descriptor.
pub struct IcmpTransport {
    source_ip: Ipv4Addr,
    max_hops: u8,
    base_timeout: Duration,
    echo_id: u16,
    closed: AtomicBool,
}

impl IcmpTransport {
    pub fn new(source_ip: Ipv4Addr, max_hops: u8, base_timeout: Duration) -> Self {
        Self {
            source_ip,
            max_hops,
            base_timeout,
            echo_id: next_echo_id(),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), MtrError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MtrError::TransportClosed);
        }
        Ok(())
    }
}

#[async_trait]
impl ProbeTransport for IcmpTransport {
    async fn trace(&self, dst: Ipv4Addr) -> Result<Vec<ProbeReply>, MtrError> {
        self.ensure_open()?;
        let source_ip = self.source_ip;
        let max_hops = self.max_hops;
        let timeout = self.base_timeout;
        let echo_id = self.echo_id;
        tokio::task::spawn_blocking(move || {
            trace_blocking(source_ip, dst, max_hops, timeout, echo_id)
        })
        .await
        .map_err(|err| MtrError::Internal(format!("trace task failed: {err}")))?
    }

    async fn probe(
        &self,
        ip: Ipv4Addr,
        ttl: u8,
        timeout: Duration,
    ) -> Result<Option<ProbeReply>, MtrError> {
        self.ensure_open()?;
        let source_ip = self.source_ip;
        let echo_id = self.echo_id;
        tokio::task::spawn_blocking(move || probe_blocking(source_ip, ip, ttl, timeout, echo_id))
            .await
            .map_err(|err| MtrError::Internal(format!("probe task failed: {err}")))?
    }

    async fn close(&self) -> Result<(), MtrError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn open_socket(source_ip: Ipv4Addr) -> Result<Socket, MtrError> {
    let socket = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
        .map_err(MtrError::SocketCreation)?;
    socket
        .set_recv_buffer_size(1024 * 1024)
        .map_err(MtrError::SocketCreation)?;
    if !source_ip.is_unspecified() {
        socket
            .bind(&SockAddr::from(SocketAddr::new(IpAddr::V4(source_ip), 0)))
            .map_err(MtrError::SocketCreation)?;
    }
    Ok(socket)
}

fn send_echo(socket: &Socket, dst: Ipv4Addr, ttl: u8, echo_id: u16) -> Result<(), MtrError> {
    socket
        .set_ttl(u32::from(ttl))
        .map_err(MtrError::SendFailed)?;
    let packet = build_echo_request(echo_id, u16::from(ttl));
    socket
        .send_to(&packet, &SockAddr::from(SocketAddr::new(IpAddr::V4(dst), 0)))
        .map_err(MtrError::SendFailed)?;
    Ok(())
}

/// Blocking receive of one datagram, waiting at most `wait`.
///
/// Returns `Ok(None)` when the wait lapsed without a packet.
fn recv_datagram(
    socket: &Socket,
    buffer: &mut [u8],
    wait: Duration,
) -> Result<Option<usize>, MtrError> {
    socket
        .set_read_timeout(Some(wait.max(Duration::from_millis(1))))
        .map_err(MtrError::ReceiveFailed)?;
    // socket2 receives into MaybeUninit; reuse the caller's buffer.
    let uninit: &mut [MaybeUninit<u8>] = unsafe {
        std::slice::from_raw_parts_mut(buffer.as_mut_ptr().cast::<MaybeUninit<u8>>(), buffer.len())
    };
    match socket.recv_from(uninit) {
        Ok((len, _)) => Ok(Some(len)),
        Err(err)
            if err.kind() == std::io::ErrorKind::WouldBlock
                || err.kind() == std::io::ErrorKind::TimedOut =>
        {
            Ok(None)
        }
        Err(err) => Err(MtrError::ReceiveFailed(err)),
    }
}

/// Sends one echo per TTL with a fixed inter-probe delay, then collects
/// replies until every probe is answered or the timeout lapses.
fn trace_blocking(
    source_ip: Ipv4Addr,
    dst: Ipv4Addr,
    max_hops: u8,
    timeout: Duration,
    echo_id: u16,
) -> Result<Vec<ProbeReply>, MtrError> {
    let socket = open_socket(source_ip)?;

    let mut sent_at: HashMap<u16, Instant> = HashMap::with_capacity(usize::from(max_hops));
    for ttl in 1..=max_hops {
        send_echo(&socket, dst, ttl, echo_id)?;
        sent_at.insert(u16::from(ttl), Instant::now());
        std::thread::sleep(TRACE_DELAY);
    }

    let mut replies = Vec::new();
    let mut answered: HashSet<u16> = HashSet::new();
    let mut buffer = [0u8; RECV_BUFFER_LEN];
    let deadline = Instant::now() + timeout;
    while answered.len() < sent_at.len() {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            break;
        };
        let Some(len) = recv_datagram(&socket, &mut buffer, remaining.min(POLL_INTERVAL))? else {
            continue;
        };
        let Some(response) = parse_reply(&buffer[..len]) else {
            continue;
        };
        if response.echo_id != echo_id {
            trace!(
                expected = echo_id,
                actual = response.echo_id,
                "ignored reply with foreign echo id"
            );
            continue;
        }
        let Some(sent) = sent_at.get(&response.sequence) else {
            continue;
        };
        // At most one reply per TTL leaves the transport.
        if !answered.insert(response.sequence) {
            continue;
        }
        replies.push(ProbeReply {
            ttl: response.sequence as u8,
            ip: response.responder,
            rtt: sent.elapsed(),
        });
    }
    Ok(replies)
}

/// Sends a single TTL-limited echo and waits up to `timeout` for the
/// matching reply.
fn probe_blocking(
    source_ip: Ipv4Addr,
    dst: Ipv4Addr,
    ttl: u8,
    timeout: Duration,
    echo_id: u16,
) -> Result<Option<ProbeReply>, MtrError> {
    let socket = open_socket(source_ip)?;
    send_echo(&socket, dst, ttl, echo_id)?;
    let sent = Instant::now();
    let deadline = sent + timeout;

    let mut buffer = [0u8; RECV_BUFFER_LEN];
    loop {
        let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
            return Ok(None);
        };
        let Some(len) = recv_datagram(&socket, &mut buffer, remaining.min(POLL_INTERVAL))? else {
            continue;
        };
        let Some(response) = parse_reply(&buffer[..len]) else {
            continue;
        };
        if response.echo_id == echo_id && response.sequence == u16::from(ttl) {
            return Ok(Some(ProbeReply {
                ttl,
                ip: response.responder,
                rtt: sent.elapsed(),
            }));
        }
    }
}
