//! Server-side view of wire addresses.

use posix_proto::{Sockaddr, SockaddrIn, SockaddrIn6};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Parses a wire address, or returns the errno the kernel would report.
pub(crate) fn from_wire(addr: &Sockaddr) -> Result<SocketAddr, i32> {
    match addr {
        Sockaddr::In(sin) => {
            let octets: [u8; 4] = sin.addr.as_slice().try_into().map_err(|_| libc::EINVAL)?;
            let port = u16::try_from(sin.port).map_err(|_| libc::EINVAL)?;
            Ok(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(octets), port)))
        }
        Sockaddr::In6(sin6) => {
            let octets: [u8; 16] = sin6.addr.as_slice().try_into().map_err(|_| libc::EINVAL)?;
            let port = u16::try_from(sin6.port).map_err(|_| libc::EINVAL)?;
            Ok(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(octets),
                port,
                sin6.flowinfo,
                sin6.scope_id,
            )))
        }
        Sockaddr::Unknown => Err(libc::EINVAL),
    }
}

pub(crate) fn to_wire(addr: &SocketAddr) -> Sockaddr {
    match addr {
        SocketAddr::V4(v4) => Sockaddr::In(SockaddrIn {
            family: libc::AF_INET,
            port: u32::from(v4.port()),
            addr: v4.ip().octets().to_vec(),
        }),
        SocketAddr::V6(v6) => Sockaddr::In6(SockaddrIn6 {
            family: libc::AF_INET6,
            port: u32::from(v6.port()),
            flowinfo: v6.flowinfo(),
            scope_id: v6.scope_id(),
            addr: v6.ip().octets().to_vec(),
        }),
    }
}

pub(crate) fn family_of(addr: &SocketAddr) -> i32 {
    match addr {
        SocketAddr::V4(_) => libc::AF_INET,
        SocketAddr::V6(_) => libc::AF_INET6,
    }
}

/// The wildcard address of `domain` with port 0.
pub(crate) fn unspecified(domain: i32) -> SocketAddr {
    if domain == libc::AF_INET6 {
        SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0))
    } else {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
    }
}

/// Whether a socket bound to `local` receives traffic sent to `dest`.
pub(crate) fn accepts(local: &SocketAddr, dest: &SocketAddr) -> bool {
    local.port() == dest.port()
        && family_of(local) == family_of(dest)
        && (local.ip().is_unspecified() || local.ip() == dest.ip())
}

/// Whether two bindings of the same socket type collide.
pub(crate) fn overlaps(a: &SocketAddr, b: &SocketAddr) -> bool {
    a.port() == b.port()
        && family_of(a) == family_of(b)
        && (a.ip().is_unspecified() || b.ip().is_unspecified() || a.ip() == b.ip())
}
