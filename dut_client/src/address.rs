//! Conversion between socket addresses and their wire form.

use crate::error::{DutError, Result};
use posix_proto::{Sockaddr, SockaddrIn, SockaddrIn6};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

/// Encodes an address for the DUT. IPv6 flow info is always sent as zero.
pub fn to_wire(addr: &SocketAddr) -> Sockaddr {
    match addr {
        SocketAddr::V4(v4) => Sockaddr::In(SockaddrIn {
            family: libc::AF_INET,
            port: u32::from(v4.port()),
            addr: v4.ip().octets().to_vec(),
        }),
        SocketAddr::V6(v6) => Sockaddr::In6(SockaddrIn6 {
            family: libc::AF_INET6,
            port: u32::from(v6.port()),
            flowinfo: 0,
            scope_id: v6.scope_id(),
            addr: v6.ip().octets().to_vec(),
        }),
    }
}

/// Decodes an address returned by the DUT.
///
/// Unknown kinds, address payloads whose length doesn't match the kind and
/// out-of-range ports are all [`DutError::UnrecognizedAddress`]; there is no
/// sensible family to guess. Flow info is not carried and decodes as zero.
pub fn from_wire(addr: &Sockaddr) -> Result<SocketAddr> {
    let unrecognized = || DutError::UnrecognizedAddress(format!("{:?}", addr));
    match addr {
        Sockaddr::In(sin) => {
            let octets: [u8; 4] = sin.addr.as_slice().try_into().map_err(|_| unrecognized())?;
            let port = u16::try_from(sin.port).map_err(|_| unrecognized())?;
            Ok(SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(octets), port)))
        }
        Sockaddr::In6(sin6) => {
            let octets: [u8; 16] = sin6.addr.as_slice().try_into().map_err(|_| unrecognized())?;
            let port = u16::try_from(sin6.port).map_err(|_| unrecognized())?;
            Ok(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(octets),
                port,
                0,
                sin6.scope_id,
            )))
        }
        Sockaddr::Unknown => Err(unrecognized()),
    }
}
