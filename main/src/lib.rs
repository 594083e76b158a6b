mod announcement;
mod announcer;
mod finder;
mod network;
mod registry;

use std::net::Ipv4Addr;
use std::net::SocketAddrV4;

pub use announcer::AnnounceError;
pub use announcer::Announcer;
pub use farol_protocol::ServerDescriptor;
pub use farol_protocol::ServiceDescriptor;
pub use finder::FindError;
pub use finder::Finder;
pub use registry::DiscoveredServer;

/// IPv4 address every announcement is sent to.
///
/// The limited broadcast address reaches all hosts on the local link without
/// knowing the subnet mask, which is all a LAN presence protocol needs.
/// Routers never forward it.
fn broadcast_address(port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::BROADCAST, port)
}
