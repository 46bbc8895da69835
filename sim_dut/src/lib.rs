//! # Simulated device under test
//!
//! An in-memory POSIX socket table that answers every posix service call
//! the way a Linux DUT would for the common cases, so client code can be
//! exercised end to end on one machine.
//!
//! ## Philosophy
//!
//! - **Deterministic**: descriptors and ephemeral ports are handed out in order
//! - **Never blocks**: calls that would block on a real kernel fail with
//!   `EAGAIN` instead
//! - **Test-focused**: not a network stack; no packets exist, data moves
//!   directly between simulated sockets
//!
//! ## Example
//!
//! ```
//! use sim_dut::SimDut;
//!
//! let transport = SimDut::new().into_loopback();
//! # let _ = transport;
//! ```

mod addr;
pub mod socket;

use ipc::MessageEnvelope;
use posix_proto::*;
use remote_ipc::{LoopbackTransport, RemoteHandler, RemoteIpcServer};
use socket::{SimSocket, SockKind, SockState};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use tracing::trace;

/// First descriptor handed out; 0-2 are the server's stdio.
pub const FIRST_FD: i32 = 3;

/// Ephemeral port range (Linux defaults).
pub const EPHEMERAL_PORTS: std::ops::RangeInclusive<u16> = 32768..=60999;

type SysResult<T> = Result<T, i32>;

fn ret(result: SysResult<i32>) -> RetResponse {
    match result {
        Ok(ret) => RetResponse { ret, errno: 0 },
        Err(errno) => RetResponse { ret: -1, errno },
    }
}

#[derive(Debug)]
pub struct SimDut {
    sockets: BTreeMap<i32, SimSocket>,
    next_ephemeral: u16,
}

impl Default for SimDut {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDut {
    pub fn new() -> Self {
        Self {
            sockets: BTreeMap::new(),
            next_ephemeral: *EPHEMERAL_PORTS.start(),
        }
    }

    /// Wraps the simulation in a server speaking the posix schema.
    pub fn into_server(self) -> RemoteIpcServer<Self> {
        RemoteIpcServer::new(self, POSIX_SCHEMA_VERSION)
    }

    /// Wraps the simulation in an in-process transport.
    pub fn into_loopback(self) -> LoopbackTransport<Self> {
        LoopbackTransport::new(self.into_server())
    }

    /// Descriptors a client can currently use.
    pub fn open_fds(&self) -> Vec<i32> {
        self.sockets
            .iter()
            .filter(|(_, socket)| socket.accepted)
            .map(|(fd, _)| *fd)
            .collect()
    }

    fn lowest_free_fd(&self) -> i32 {
        let mut fd = FIRST_FD;
        while self.sockets.contains_key(&fd) {
            fd += 1;
        }
        fd
    }

    fn insert(&mut self, socket: SimSocket) -> i32 {
        let fd = self.lowest_free_fd();
        self.sockets.insert(fd, socket);
        fd
    }

    fn get(&self, fd: i32) -> SysResult<&SimSocket> {
        self.sockets
            .get(&fd)
            .filter(|socket| socket.accepted)
            .ok_or(libc::EBADF)
    }

    fn get_mut(&mut self, fd: i32) -> SysResult<&mut SimSocket> {
        self.sockets
            .get_mut(&fd)
            .filter(|socket| socket.accepted)
            .ok_or(libc::EBADF)
    }

    fn in_use(&self, kind: SockKind, addr: &SocketAddr) -> bool {
        self.sockets.values().any(|socket| {
            socket.kind == kind
                && socket
                    .local
                    .map_or(false, |local| addr::overlaps(&local, addr))
        })
    }

    fn allocate_port(&mut self, kind: SockKind, ip: SocketAddr) -> SysResult<u16> {
        let span = usize::from(EPHEMERAL_PORTS.end() - EPHEMERAL_PORTS.start()) + 1;
        for _ in 0..span {
            let port = self.next_ephemeral;
            self.next_ephemeral = if port == *EPHEMERAL_PORTS.end() {
                *EPHEMERAL_PORTS.start()
            } else {
                port + 1
            };
            let mut candidate = ip;
            candidate.set_port(port);
            if !self.in_use(kind, &candidate) {
                return Ok(port);
            }
        }
        Err(libc::EADDRINUSE)
    }

    /// Binds `fd` to `addr`, picking an ephemeral port for port 0.
    fn bind_to(&mut self, fd: i32, mut addr: SocketAddr) -> SysResult<SocketAddr> {
        let (domain, kind, bound) = {
            let socket = self.get(fd)?;
            (socket.domain, socket.kind, socket.local.is_some())
        };
        if addr::family_of(&addr) != domain {
            return Err(libc::EAFNOSUPPORT);
        }
        if bound {
            return Err(libc::EINVAL);
        }
        if addr.port() == 0 {
            let port = self.allocate_port(kind, addr)?;
            addr.set_port(port);
        } else if self.in_use(kind, &addr) {
            return Err(libc::EADDRINUSE);
        }
        self.get_mut(fd)?.local = Some(addr);
        Ok(addr)
    }

    /// Implicit bind done by listen/connect/sendto on an unbound socket.
    fn auto_bind(&mut self, fd: i32, toward: Option<&SocketAddr>) -> SysResult<SocketAddr> {
        let socket = self.get(fd)?;
        if let Some(local) = socket.local {
            return Ok(local);
        }
        let mut local = addr::unspecified(socket.domain);
        if let Some(dest) = toward {
            if !dest.ip().is_unspecified() {
                local.set_ip(dest.ip());
            }
        }
        self.bind_to(fd, local)
    }

    fn find_bound(&self, kind: SockKind, dest: &SocketAddr, listening: bool) -> Option<i32> {
        self.sockets
            .iter()
            .filter(|(_, socket)| socket.accepted && socket.kind == kind)
            .filter(|(_, socket)| socket.is_listening() == listening)
            .find(|(_, socket)| {
                socket
                    .local
                    .map_or(false, |local| addr::accepts(&local, dest))
            })
            .map(|(fd, _)| *fd)
    }

    fn connect_stream(&mut self, fd: i32, dest: SocketAddr) -> SysResult<i32> {
        match self.get(fd)?.state {
            SockState::Connected { .. } => return Err(libc::EISCONN),
            SockState::Listening { .. } => return Err(libc::EINVAL),
            SockState::Idle => {}
        }
        let listener_fd = self
            .find_bound(SockKind::Stream, &dest, true)
            .ok_or(libc::ECONNREFUSED)?;
        if let SockState::Listening { capacity, pending } = &self.get(listener_fd)?.state {
            if pending.len() >= *capacity {
                return Err(libc::EAGAIN);
            }
        }

        let client_addr = self.auto_bind(fd, Some(&dest))?;
        let domain = self.get(fd)?.domain;
        let mut server_half = SimSocket::new(domain, SockKind::Stream);
        server_half.local = Some(dest);
        server_half.accepted = false;
        server_half.state = SockState::Connected {
            peer: client_addr,
            peer_fd: Some(fd),
        };
        let server_fd = self.insert(server_half);

        self.get_mut(fd)?.state = SockState::Connected {
            peer: dest,
            peer_fd: Some(server_fd),
        };
        if let SockState::Listening { pending, .. } = &mut self.get_mut(listener_fd)?.state {
            pending.push_back(server_fd);
        }
        Ok(0)
    }

    fn deliver_stream(&mut self, fd: i32, buf: &[u8]) -> SysResult<i32> {
        let socket = self.get(fd)?;
        let peer_fd = match socket.state {
            SockState::Connected { peer_fd: Some(peer_fd), .. } => peer_fd,
            _ => return Err(libc::ENOTCONN),
        };
        if socket.peer_closed {
            return Err(libc::EPIPE);
        }
        // The peer may not have been accepted yet, so bypass `get_mut`.
        let peer = self.sockets.get_mut(&peer_fd).ok_or(libc::EPIPE)?;
        peer.stream_rx.extend(buf);
        Ok(buf.len() as i32)
    }

    fn deliver_dgram(&mut self, fd: i32, buf: &[u8], dest: SocketAddr) -> SysResult<i32> {
        if addr::family_of(&dest) != self.get(fd)?.domain {
            return Err(libc::EAFNOSUPPORT);
        }
        let source = self.auto_bind(fd, Some(&dest))?;
        // Datagrams to nobody vanish, as on a real network.
        if let Some(receiver) = self.find_bound(SockKind::Dgram, &dest, false) {
            self.get_mut(receiver)?
                .dgram_rx
                .push_back((source, buf.to_vec()));
        }
        Ok(buf.len() as i32)
    }

    fn receive(&mut self, fd: i32, len: i32, flags: i32) -> SysResult<Vec<u8>> {
        let len = usize::try_from(len).map_err(|_| libc::EINVAL)?;
        let peek = flags & libc::MSG_PEEK != 0;
        let socket = self.get_mut(fd)?;
        match socket.kind {
            SockKind::Stream => {
                if socket.peer_fd().is_none() {
                    return Err(libc::ENOTCONN);
                }
                if socket.stream_rx.is_empty() {
                    return if socket.peer_closed {
                        Ok(Vec::new())
                    } else {
                        Err(libc::EAGAIN)
                    };
                }
                let n = len.min(socket.stream_rx.len());
                if peek {
                    Ok(socket.stream_rx.iter().take(n).copied().collect())
                } else {
                    Ok(socket.stream_rx.drain(..n).collect())
                }
            }
            SockKind::Dgram => {
                let datagram = if peek {
                    socket.dgram_rx.front().map(|(_, data)| data.clone())
                } else {
                    socket.dgram_rx.pop_front().map(|(_, data)| data)
                };
                let mut data = datagram.ok_or(libc::EAGAIN)?;
                data.truncate(len);
                Ok(data)
            }
        }
    }

    fn mark_peer_closed(&mut self, peer_fd: Option<i32>) {
        if let Some(peer) = peer_fd.and_then(|fd| self.sockets.get_mut(&fd)) {
            peer.peer_closed = true;
        }
    }

    fn close_fd(&mut self, fd: i32) -> SysResult<i32> {
        self.get(fd)?;
        let socket = self.sockets.remove(&fd).ok_or(libc::EBADF)?;
        match socket.state {
            SockState::Connected { peer_fd, .. } => self.mark_peer_closed(peer_fd),
            SockState::Listening { pending, .. } => {
                for embryo in pending {
                    let client = self.sockets.remove(&embryo).and_then(|s| s.peer_fd());
                    self.mark_peer_closed(client);
                }
            }
            SockState::Idle => {}
        }
        Ok(0)
    }

    fn sockname(&self, fd: i32) -> SysResult<SocketAddr> {
        let socket = self.get(fd)?;
        Ok(socket
            .local
            .unwrap_or_else(|| addr::unspecified(socket.domain)))
    }
}

impl PosixService for SimDut {
    fn accept(&mut self, request: AcceptRequest) -> AcceptResponse {
        let result = (|| {
            let listener = self.get_mut(request.sockfd)?;
            let SockState::Listening { pending, .. } = &mut listener.state else {
                return Err(libc::EINVAL);
            };
            let fd = pending.pop_front().ok_or(libc::EAGAIN)?;
            let socket = self.sockets.get_mut(&fd).ok_or(libc::ECONNABORTED)?;
            socket.accepted = true;
            let SockState::Connected { peer, .. } = socket.state else {
                return Err(libc::ECONNABORTED);
            };
            Ok((fd, peer))
        })();
        match result {
            Ok((fd, peer)) => AcceptResponse {
                fd,
                addr: addr::to_wire(&peer),
                errno: 0,
            },
            Err(errno) => AcceptResponse {
                fd: -1,
                addr: Sockaddr::Unknown,
                errno,
            },
        }
    }

    fn bind(&mut self, request: BindRequest) -> RetResponse {
        ret(addr::from_wire(&request.addr).and_then(|addr| {
            self.bind_to(request.sockfd, addr)?;
            Ok(0)
        }))
    }

    fn close(&mut self, request: CloseRequest) -> RetResponse {
        ret(self.close_fd(request.fd))
    }

    fn connect(&mut self, request: ConnectRequest) -> RetResponse {
        ret((|| {
            let dest = addr::from_wire(&request.addr)?;
            let socket = self.get(request.sockfd)?;
            if addr::family_of(&dest) != socket.domain {
                return Err(libc::EAFNOSUPPORT);
            }
            let kind = socket.kind;
            match kind {
                SockKind::Stream => self.connect_stream(request.sockfd, dest),
                SockKind::Dgram => {
                    self.auto_bind(request.sockfd, Some(&dest))?;
                    self.get_mut(request.sockfd)?.state = SockState::Connected {
                        peer: dest,
                        peer_fd: None,
                    };
                    Ok(0)
                }
            }
        })())
    }

    fn get_sock_name(&mut self, request: GetSockNameRequest) -> GetSockNameResponse {
        match self.sockname(request.sockfd) {
            Ok(local) => GetSockNameResponse {
                ret: 0,
                addr: addr::to_wire(&local),
                errno: 0,
            },
            Err(errno) => GetSockNameResponse {
                ret: -1,
                addr: Sockaddr::Unknown,
                errno,
            },
        }
    }

    fn get_sock_opt(&mut self, request: GetSockOptRequest) -> GetSockOptResponse {
        let result = (|| {
            let optlen = usize::try_from(request.optlen).map_err(|_| libc::EINVAL)?;
            let value = self
                .get(request.sockfd)?
                .option(request.level, request.optname)?;
            Ok(value[..optlen.min(value.len())].to_vec())
        })();
        match result {
            Ok(optval) => GetSockOptResponse {
                ret: 0,
                optval,
                errno: 0,
            },
            Err(errno) => GetSockOptResponse {
                ret: -1,
                optval: Vec::new(),
                errno,
            },
        }
    }

    fn get_sock_opt_int(&mut self, request: GetSockOptIntRequest) -> GetSockOptIntResponse {
        let result = (|| {
            let value = self
                .get(request.sockfd)?
                .option(request.level, request.optname)?;
            let bytes: [u8; 4] = value
                .get(..4)
                .and_then(|head| head.try_into().ok())
                .ok_or(libc::EINVAL)?;
            Ok(i32::from_ne_bytes(bytes))
        })();
        match result {
            Ok(intval) => GetSockOptIntResponse {
                ret: 0,
                intval,
                errno: 0,
            },
            Err(errno) => GetSockOptIntResponse {
                ret: -1,
                intval: 0,
                errno,
            },
        }
    }

    fn get_sock_opt_timeval(
        &mut self,
        request: GetSockOptTimevalRequest,
    ) -> GetSockOptTimevalResponse {
        let result = (|| {
            let value = self
                .get(request.sockfd)?
                .option(request.level, request.optname)?;
            if value.len() != 16 {
                return Err(libc::EINVAL);
            }
            let field = |range: std::ops::Range<usize>| -> SysResult<i64> {
                Ok(i64::from_ne_bytes(
                    value[range].try_into().map_err(|_| libc::EINVAL)?,
                ))
            };
            Ok(Timeval {
                seconds: field(0..8)?,
                microseconds: field(8..16)?,
            })
        })();
        match result {
            Ok(timeval) => GetSockOptTimevalResponse {
                ret: 0,
                timeval,
                errno: 0,
            },
            Err(errno) => GetSockOptTimevalResponse {
                ret: -1,
                timeval: Timeval::default(),
                errno,
            },
        }
    }

    fn listen(&mut self, request: ListenRequest) -> RetResponse {
        ret((|| {
            let socket = self.get(request.sockfd)?;
            if socket.kind != SockKind::Stream {
                return Err(libc::EOPNOTSUPP);
            }
            if matches!(socket.state, SockState::Connected { .. }) {
                return Err(libc::EINVAL);
            }
            self.auto_bind(request.sockfd, None)?;
            // Linux lets one connection more than the backlog wait.
            let capacity = usize::try_from(request.backlog.max(0)).unwrap_or(0) + 1;
            let socket = self.get_mut(request.sockfd)?;
            match &mut socket.state {
                SockState::Listening { capacity: current, .. } => *current = capacity,
                state => {
                    *state = SockState::Listening {
                        capacity,
                        pending: Default::default(),
                    }
                }
            }
            Ok(0)
        })())
    }

    fn recv(&mut self, request: RecvRequest) -> RecvResponse {
        match self.receive(request.sockfd, request.len, request.flags) {
            Ok(buf) => RecvResponse {
                ret: buf.len() as i32,
                buf,
                errno: 0,
            },
            Err(errno) => RecvResponse {
                ret: -1,
                buf: Vec::new(),
                errno,
            },
        }
    }

    fn send(&mut self, request: SendRequest) -> RetResponse {
        ret((|| {
            let socket = self.get(request.sockfd)?;
            let peer = match socket.state {
                SockState::Connected { peer, .. } => Some(peer),
                _ => None,
            };
            match (socket.kind, peer) {
                (SockKind::Stream, _) => self.deliver_stream(request.sockfd, &request.buf),
                (SockKind::Dgram, Some(peer)) => {
                    self.deliver_dgram(request.sockfd, &request.buf, peer)
                }
                (SockKind::Dgram, None) => Err(libc::EDESTADDRREQ),
            }
        })())
    }

    fn send_to(&mut self, request: SendToRequest) -> RetResponse {
        ret((|| {
            let kind = self.get(request.sockfd)?.kind;
            match kind {
                SockKind::Stream => self.deliver_stream(request.sockfd, &request.buf),
                SockKind::Dgram => {
                    let dest = addr::from_wire(&request.dest_addr)?;
                    self.deliver_dgram(request.sockfd, &request.buf, dest)
                }
            }
        })())
    }

    fn set_sock_opt(&mut self, request: SetSockOptRequest) -> RetResponse {
        ret(self.get_mut(request.sockfd).and_then(|socket| {
            socket.set_option(request.level, request.optname, &request.optval)?;
            Ok(0)
        }))
    }

    fn set_sock_opt_int(&mut self, request: SetSockOptIntRequest) -> RetResponse {
        ret(self.get_mut(request.sockfd).and_then(|socket| {
            socket.set_option(request.level, request.optname, &request.intval.to_ne_bytes())?;
            Ok(0)
        }))
    }

    fn set_sock_opt_timeval(&mut self, request: SetSockOptTimevalRequest) -> RetResponse {
        let mut optval = request.timeval.seconds.to_ne_bytes().to_vec();
        optval.extend_from_slice(&request.timeval.microseconds.to_ne_bytes());
        ret(self.get_mut(request.sockfd).and_then(|socket| {
            socket.set_option(request.level, request.optname, &optval)?;
            Ok(0)
        }))
    }

    fn socket(&mut self, request: SocketRequest) -> SocketResponse {
        if request.domain != libc::AF_INET && request.domain != libc::AF_INET6 {
            return SocketResponse {
                fd: -1,
                errno: libc::EAFNOSUPPORT,
            };
        }
        let Some(kind) = SockKind::from_type(request.ty) else {
            return SocketResponse {
                fd: -1,
                errno: libc::EINVAL,
            };
        };
        let fd = self.insert(SimSocket::new(request.domain, kind));
        SocketResponse { fd, errno: 0 }
    }
}

impl RemoteHandler for SimDut {
    fn handle(&mut self, request: MessageEnvelope) -> Result<MessageEnvelope, String> {
        trace!(target: "dut", action = %request.action, "simulated call");
        posix_proto::dispatch(self, &request).map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4(addr: &str) -> Sockaddr {
        addr::to_wire(&addr.parse().unwrap())
    }

    fn udp(dut: &mut SimDut) -> i32 {
        dut.socket(SocketRequest {
            domain: libc::AF_INET,
            ty: libc::SOCK_DGRAM,
            protocol: 0,
        })
        .fd
    }

    fn tcp(dut: &mut SimDut) -> i32 {
        dut.socket(SocketRequest {
            domain: libc::AF_INET,
            ty: libc::SOCK_STREAM,
            protocol: 0,
        })
        .fd
    }

    fn bound_port(dut: &mut SimDut, fd: i32) -> u16 {
        let name = dut.get_sock_name(GetSockNameRequest { sockfd: fd });
        match name.addr {
            Sockaddr::In(sin) => sin.port as u16,
            other => panic!("unexpected address {:?}", other),
        }
    }

    #[test]
    fn test_fds_are_lowest_free() {
        let mut dut = SimDut::new();
        let a = udp(&mut dut);
        let b = udp(&mut dut);
        assert_eq!((a, b), (FIRST_FD, FIRST_FD + 1));

        assert_eq!(dut.close(CloseRequest { fd: a }).ret, 0);
        assert_eq!(udp(&mut dut), a);
        assert_eq!(dut.open_fds(), vec![a, b]);
    }

    #[test]
    fn test_socket_rejects_unknown_domain() {
        let mut dut = SimDut::new();
        let response = dut.socket(SocketRequest {
            domain: libc::AF_UNIX,
            ty: libc::SOCK_STREAM,
            protocol: 0,
        });
        assert_eq!(response.fd, -1);
        assert_eq!(response.errno, libc::EAFNOSUPPORT);
    }

    #[test]
    fn test_bind_port_zero_is_ephemeral() {
        let mut dut = SimDut::new();
        let a = udp(&mut dut);
        let b = udp(&mut dut);
        assert_eq!(dut.bind(BindRequest { sockfd: a, addr: v4("0.0.0.0:0") }).ret, 0);
        assert_eq!(dut.bind(BindRequest { sockfd: b, addr: v4("0.0.0.0:0") }).ret, 0);

        let (pa, pb) = (bound_port(&mut dut, a), bound_port(&mut dut, b));
        assert!(EPHEMERAL_PORTS.contains(&pa));
        assert_ne!(pa, pb);
    }

    #[test]
    fn test_bind_conflicts() {
        let mut dut = SimDut::new();
        let a = udp(&mut dut);
        let b = udp(&mut dut);
        assert_eq!(dut.bind(BindRequest { sockfd: a, addr: v4("0.0.0.0:5000") }).ret, 0);

        let again = dut.bind(BindRequest { sockfd: a, addr: v4("0.0.0.0:5001") });
        assert_eq!(again.errno, libc::EINVAL);

        let clash = dut.bind(BindRequest { sockfd: b, addr: v4("127.0.0.1:5000") });
        assert_eq!((clash.ret, clash.errno), (-1, libc::EADDRINUSE));

        // TCP and UDP port spaces are separate.
        let t = tcp(&mut dut);
        assert_eq!(dut.bind(BindRequest { sockfd: t, addr: v4("0.0.0.0:5000") }).ret, 0);
    }

    #[test]
    fn test_connect_refused_without_listener() {
        let mut dut = SimDut::new();
        let fd = tcp(&mut dut);
        let response = dut.connect(ConnectRequest { sockfd: fd, addr: v4("127.0.0.1:9") });
        assert_eq!((response.ret, response.errno), (-1, libc::ECONNREFUSED));
    }

    #[test]
    fn test_stream_connection_lifecycle() {
        let mut dut = SimDut::new();
        let listener = tcp(&mut dut);
        dut.bind(BindRequest { sockfd: listener, addr: v4("0.0.0.0:8080") });
        assert_eq!(dut.listen(ListenRequest { sockfd: listener, backlog: 1 }).ret, 0);

        let empty = dut.accept(AcceptRequest { sockfd: listener });
        assert_eq!((empty.fd, empty.errno), (-1, libc::EAGAIN));

        let client = tcp(&mut dut);
        assert_eq!(dut.connect(ConnectRequest { sockfd: client, addr: v4("127.0.0.1:8080") }).ret, 0);
        let client_port = bound_port(&mut dut, client);

        let accepted = dut.accept(AcceptRequest { sockfd: listener });
        assert!(accepted.fd >= FIRST_FD);
        match &accepted.addr {
            Sockaddr::In(sin) => assert_eq!(sin.port, u32::from(client_port)),
            other => panic!("unexpected address {:?}", other),
        }

        let sent = dut.send(SendRequest { sockfd: client, buf: b"hello".to_vec(), flags: 0 });
        assert_eq!(sent.ret, 5);
        let peeked = dut.recv(RecvRequest { sockfd: accepted.fd, len: 2, flags: libc::MSG_PEEK });
        assert_eq!(peeked.buf, b"he");
        let read = dut.recv(RecvRequest { sockfd: accepted.fd, len: 64, flags: 0 });
        assert_eq!((read.ret, read.buf.as_slice()), (5, &b"hello"[..]));

        dut.close(CloseRequest { fd: client });
        let eof = dut.recv(RecvRequest { sockfd: accepted.fd, len: 64, flags: 0 });
        assert_eq!((eof.ret, eof.errno), (0, 0));
    }

    #[test]
    fn test_backlog_full() {
        let mut dut = SimDut::new();
        let listener = tcp(&mut dut);
        dut.bind(BindRequest { sockfd: listener, addr: v4("0.0.0.0:7000") });
        dut.listen(ListenRequest { sockfd: listener, backlog: 0 });

        let first = tcp(&mut dut);
        let second = tcp(&mut dut);
        assert_eq!(dut.connect(ConnectRequest { sockfd: first, addr: v4("10.0.0.1:7000") }).ret, 0);
        let full = dut.connect(ConnectRequest { sockfd: second, addr: v4("10.0.0.1:7000") });
        assert_eq!(full.errno, libc::EAGAIN);
    }

    #[test]
    fn test_unaccepted_fd_is_invisible() {
        let mut dut = SimDut::new();
        let listener = tcp(&mut dut);
        dut.listen(ListenRequest { sockfd: listener, backlog: 4 });
        let port = bound_port(&mut dut, listener);
        let client = tcp(&mut dut);
        dut.connect(ConnectRequest {
            sockfd: client,
            addr: v4(&format!("127.0.0.1:{}", port)),
        });

        assert_eq!(dut.open_fds(), vec![listener, client]);
        dut.close(CloseRequest { fd: listener });
        let reset = dut.send(SendRequest { sockfd: client, buf: vec![1], flags: 0 });
        assert_eq!(reset.errno, libc::EPIPE);
    }

    #[test]
    fn test_datagram_delivery() {
        let mut dut = SimDut::new();
        let rx = udp(&mut dut);
        let tx = udp(&mut dut);
        dut.bind(BindRequest { sockfd: rx, addr: v4("127.0.0.1:4000") });

        let unconnected = dut.send(SendRequest { sockfd: tx, buf: vec![1], flags: 0 });
        assert_eq!(unconnected.errno, libc::EDESTADDRREQ);

        let sent = dut.send_to(SendToRequest {
            sockfd: tx,
            buf: b"ping".to_vec(),
            flags: 0,
            dest_addr: v4("127.0.0.1:4000"),
        });
        assert_eq!(sent.ret, 4);

        let short = dut.recv(RecvRequest { sockfd: rx, len: 2, flags: 0 });
        assert_eq!(short.buf, b"pi");
        let drained = dut.recv(RecvRequest { sockfd: rx, len: 2, flags: 0 });
        assert_eq!(drained.errno, libc::EAGAIN);
    }

    #[test]
    fn test_options() {
        let mut dut = SimDut::new();
        let fd = tcp(&mut dut);
        let set = dut.set_sock_opt_int(SetSockOptIntRequest {
            sockfd: fd,
            level: libc::IPPROTO_TCP,
            optname: libc::TCP_NODELAY,
            intval: 1,
        });
        assert_eq!(set.ret, 0);
        let got = dut.get_sock_opt_int(GetSockOptIntRequest {
            sockfd: fd,
            level: libc::IPPROTO_TCP,
            optname: libc::TCP_NODELAY,
        });
        assert_eq!(got.intval, 1);

        let timeval = Timeval { seconds: 3, microseconds: 250 };
        dut.set_sock_opt_timeval(SetSockOptTimevalRequest {
            sockfd: fd,
            level: libc::SOL_SOCKET,
            optname: libc::SO_RCVTIMEO,
            timeval,
        });
        let got = dut.get_sock_opt_timeval(GetSockOptTimevalRequest {
            sockfd: fd,
            level: libc::SOL_SOCKET,
            optname: libc::SO_RCVTIMEO,
        });
        assert_eq!(got.timeval, timeval);

        let raw = dut.get_sock_opt(GetSockOptRequest {
            sockfd: fd,
            level: libc::SOL_SOCKET,
            optname: libc::SO_TYPE,
            optlen: 2,
        });
        assert_eq!(raw.optval.len(), 2);

        let unknown = dut.get_sock_opt_int(GetSockOptIntRequest {
            sockfd: fd,
            level: libc::SOL_SOCKET,
            optname: libc::SO_BROADCAST,
        });
        assert_eq!((unknown.ret, unknown.errno), (-1, libc::ENOPROTOOPT));
    }

    #[test]
    fn test_handler_dispatch() {
        let transport = SimDut::new().into_loopback();
        transport.with_handler(|dut| assert!(dut.open_fds().is_empty()));
    }
}
