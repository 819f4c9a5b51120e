//! Raw-socket ICMPv4 probe transport.

mod packet;
mod transport;

pub use packet::{build_echo_request, parse_reply, EchoResponse, ResponseKind};
pub use transport::IcmpTransport;
