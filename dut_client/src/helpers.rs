//! Multi-call helpers built from the convenience calls.

use crate::error::Result;
use crate::session::Session;
use crate::RemoteFd;
use remote_ipc::RemoteTransport;
use std::net::{IpAddr, SocketAddr};

impl<T: RemoteTransport> Session<T> {
    /// Creates a socket of `addr`'s family, binds it to `addr` on an
    /// ephemeral port and returns it with the port the DUT picked.
    ///
    /// IPv4-mapped IPv6 addresses count as IPv4.
    #[track_caller]
    pub fn create_bound_socket(
        &self,
        ty: i32,
        protocol: i32,
        addr: IpAddr,
    ) -> Result<(RemoteFd, u16)> {
        let addr = addr.to_canonical();
        let domain = match addr {
            IpAddr::V4(_) => libc::AF_INET,
            IpAddr::V6(_) => libc::AF_INET6,
        };
        let fd = self.socket(domain, ty, protocol)?;
        self.bind(fd, SocketAddr::new(addr, 0))?;
        let bound = self.get_sock_name(fd)?;
        tracing::debug!(target: "dut", fd, port = bound.port(), "created bound socket");
        Ok((fd, bound.port()))
    }

    /// A listening socket on the configured remote IPv4 address.
    #[track_caller]
    pub fn create_listener(&self, ty: i32, protocol: i32, backlog: i32) -> Result<(RemoteFd, u16)> {
        let (fd, port) =
            self.create_bound_socket(ty, protocol, IpAddr::V4(self.config().remote_ipv4))?;
        self.listen(fd, backlog)?;
        Ok((fd, port))
    }
}
