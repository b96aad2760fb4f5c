use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket};
use std::sync::Arc;

use nix::ifaddrs::getifaddrs;
use nix::net::if_::InterfaceFlags;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use super::{EngineConfig, EngineError};

/// Network interface the engine joined the group on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub addr: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InterfaceCandidate {
    pub name: String,
    pub addr: Ipv4Addr,
    pub up: bool,
    pub multicast: bool,
    pub loopback: bool,
}

#[derive(Debug)]
pub(crate) struct Transport {
    pub socket: Arc<UdpSocket>,
    pub group: SocketAddr,
    pub interface: Interface,
    pub local_addr: SocketAddr,
}

/// Binds the shared send/receive socket and joins the multicast group.
///
/// Must be called from within a tokio runtime.
pub(crate) fn open(config: &EngineConfig) -> Result<Transport, EngineError> {
    let group = config.group_addr()?;
    let bind_ip = config.bind_addr()?;
    let interface = select_interface(config.interface.as_deref(), bind_ip)?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    let bind = SocketAddrV4::new(
        bind_ip.unwrap_or(Ipv4Addr::UNSPECIFIED),
        config.multicast_port,
    );
    socket.bind(&bind.into())?;
    socket.join_multicast_v4(&group, &interface.addr)?;
    socket.set_multicast_ttl_v4(config.multicast_ttl)?;
    socket.set_multicast_if_v4(&interface.addr)?;
    socket.set_nonblocking(true)?;

    let std_socket: StdUdpSocket = socket.into();
    let socket = UdpSocket::from_std(std_socket)?;
    let local_addr = socket.local_addr()?;

    Ok(Transport {
        socket: Arc::new(socket),
        group: SocketAddr::V4(SocketAddrV4::new(group, config.multicast_port)),
        interface,
        local_addr,
    })
}

fn select_interface(name: Option<&str>, bind_ip: Option<Ipv4Addr>) -> Result<Interface, EngineError> {
    let candidates = list_interfaces()?;
    pick_interface(&candidates, name, bind_ip)
}

fn list_interfaces() -> Result<Vec<InterfaceCandidate>, EngineError> {
    let addrs = getifaddrs().map_err(std::io::Error::from)?;
    let candidates = addrs
        .filter_map(|ifaddr| {
            let sin = *ifaddr.address.as_ref()?.as_sockaddr_in()?;
            Some(InterfaceCandidate {
                addr: *SocketAddrV4::from(sin).ip(),
                up: ifaddr.flags.contains(InterfaceFlags::IFF_UP),
                multicast: ifaddr.flags.contains(InterfaceFlags::IFF_MULTICAST),
                loopback: ifaddr.flags.contains(InterfaceFlags::IFF_LOOPBACK),
                name: ifaddr.interface_name,
            })
        })
        .collect();
    Ok(candidates)
}

/// Interface choice, in order: explicit name, owner of the bind address,
/// first up multicast-capable non-loopback IPv4 interface.
pub(crate) fn pick_interface(
    candidates: &[InterfaceCandidate],
    name: Option<&str>,
    bind_ip: Option<Ipv4Addr>,
) -> Result<Interface, EngineError> {
    let found = |c: &InterfaceCandidate| Interface {
        name: c.name.clone(),
        addr: c.addr,
    };

    if let Some(name) = name.filter(|n| !n.is_empty()) {
        return candidates
            .iter()
            .find(|c| c.name == name)
            .map(found)
            .ok_or_else(|| EngineError::InterfaceNotFound(name.to_string()));
    }

    if let Some(ip) = bind_ip {
        if let Some(c) = candidates.iter().find(|c| c.addr == ip) {
            return Ok(found(c));
        }
    }

    candidates
        .iter()
        .find(|c| c.up && c.multicast && !c.loopback)
        .map(found)
        .ok_or(EngineError::NoMulticastInterface)
}
