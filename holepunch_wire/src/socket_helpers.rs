use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

fn get_udp_socket_builder(domain: Domain) -> Result<Socket, anyhow::Error> {
    Ok(socket2::Socket::new(
        domain,
        Type::DGRAM,
        Some(Protocol::UDP),
    )?)
}

fn setup_bind(addr: SocketAddr, socket: &Socket, reuse: bool) -> Result<(), anyhow::Error> {
    if reuse {
        socket.set_reuse_address(true)?;

        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        {
            socket.set_reuse_port(true)?;
        }
    }

    socket.set_nonblocking(true)?;

    if addr.is_ipv6() {
        socket.set_only_v6(false)?;
    }

    socket.bind(&SockAddr::from(addr))?;

    Ok(())
}

fn get_udp_socket_inner<T: std::net::ToSocketAddrs>(
    addr: T,
    reuse: bool,
) -> Result<UdpSocket, anyhow::Error> {
    let addr: SocketAddr = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| anyhow::Error::msg("Bad socket addr"))?;
    log::trace!(target: "holepunch", "[Socket helper] Getting UDP (reuse={}) socket @ {:?} ...", reuse, &addr);
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = get_udp_socket_builder(domain)?;
    setup_bind(addr, &socket, reuse)?;

    Ok(tokio::net::UdpSocket::from_std(socket.into())?)
}

pub fn get_udp_socket<T: std::net::ToSocketAddrs>(addr: T) -> Result<UdpSocket, anyhow::Error> {
    get_udp_socket_inner(addr, false)
}

/// The punch socket shares its port with whatever the service later binds, so
/// address/port reuse is enabled
pub fn get_reuse_udp_socket<T: std::net::ToSocketAddrs>(
    addr: T,
) -> Result<UdpSocket, anyhow::Error> {
    get_udp_socket_inner(addr, true)
}

/// Resolves `ip:port` to the first IPv4 socket address
pub async fn resolve_udp4(ip: &str, port: u16) -> Result<SocketAddr, anyhow::Error> {
    if ip.is_empty() {
        return Err(anyhow::Error::msg("empty remote address"));
    }

    if port == 0 {
        return Err(anyhow::Error::msg(format!("remote port missing for {ip}")));
    }

    tokio::net::lookup_host((ip, port))
        .await?
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| anyhow::Error::msg(format!("no IPv4 address found for {ip}:{port}")))
}

/// Binds `0.0.0.0:local_port` and connects it to `remote`, so that plain
/// `send`/`recv` only ever talk to the punch target
pub async fn get_connected_udp_socket(
    local_port: u16,
    remote: SocketAddr,
) -> Result<UdpSocket, anyhow::Error> {
    let socket = get_reuse_udp_socket(SocketAddr::new(
        IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        local_port,
    ))?;
    socket.connect(remote).await?;
    Ok(socket)
}

/// Checks whether a UDP socket could currently be bound at `port` on all interfaces
pub fn is_udp_port_available(port: u16) -> bool {
    std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}
