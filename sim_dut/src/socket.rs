//! Simulated socket state.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

const DEFAULT_BUF_SIZE: i32 = 212_992;
const TIMEVAL_LEN: usize = 16;
const INT_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SockKind {
    Stream,
    Dgram,
}

impl SockKind {
    /// Parses a socket type, ignoring the creation flags.
    pub fn from_type(ty: i32) -> Option<Self> {
        match ty & !(libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC) {
            libc::SOCK_STREAM => Some(SockKind::Stream),
            libc::SOCK_DGRAM => Some(SockKind::Dgram),
            _ => None,
        }
    }

    pub fn as_type(self) -> i32 {
        match self {
            SockKind::Stream => libc::SOCK_STREAM,
            SockKind::Dgram => libc::SOCK_DGRAM,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockState {
    Idle,
    Listening {
        capacity: usize,
        pending: VecDeque<i32>,
    },
    /// `peer_fd` is the socket on the other end of a stream connection,
    /// `None` for datagram sockets with a default destination.
    Connected {
        peer: SocketAddr,
        peer_fd: Option<i32>,
    },
}

#[derive(Debug)]
pub struct SimSocket {
    pub domain: i32,
    pub kind: SockKind,
    pub local: Option<SocketAddr>,
    pub state: SockState,
    /// False for the server half of a connection nobody accepted yet.
    pub accepted: bool,
    pub peer_closed: bool,
    pub stream_rx: VecDeque<u8>,
    pub dgram_rx: VecDeque<(SocketAddr, Vec<u8>)>,
    options: HashMap<(i32, i32), Vec<u8>>,
}

impl SimSocket {
    pub fn new(domain: i32, kind: SockKind) -> Self {
        let mut options = HashMap::new();
        let int = |v: i32| v.to_ne_bytes().to_vec();
        options.insert((libc::SOL_SOCKET, libc::SO_TYPE), int(kind.as_type()));
        options.insert((libc::SOL_SOCKET, libc::SO_ERROR), int(0));
        options.insert((libc::SOL_SOCKET, libc::SO_REUSEADDR), int(0));
        options.insert((libc::SOL_SOCKET, libc::SO_RCVBUF), int(DEFAULT_BUF_SIZE));
        options.insert((libc::SOL_SOCKET, libc::SO_SNDBUF), int(DEFAULT_BUF_SIZE));
        options.insert((libc::SOL_SOCKET, libc::SO_RCVTIMEO), vec![0; TIMEVAL_LEN]);
        options.insert((libc::SOL_SOCKET, libc::SO_SNDTIMEO), vec![0; TIMEVAL_LEN]);
        if kind == SockKind::Stream {
            options.insert((libc::IPPROTO_TCP, libc::TCP_NODELAY), int(0));
        }

        Self {
            domain,
            kind,
            local: None,
            state: SockState::Idle,
            accepted: true,
            peer_closed: false,
            stream_rx: VecDeque::new(),
            dgram_rx: VecDeque::new(),
            options,
        }
    }

    pub fn is_listening(&self) -> bool {
        matches!(self.state, SockState::Listening { .. })
    }

    pub fn peer_fd(&self) -> Option<i32> {
        match self.state {
            SockState::Connected { peer_fd, .. } => peer_fd,
            _ => None,
        }
    }

    pub fn option(&self, level: i32, optname: i32) -> Result<&[u8], i32> {
        self.options
            .get(&(level, optname))
            .map(Vec::as_slice)
            .ok_or(libc::ENOPROTOOPT)
    }

    /// Stores an option value, validated against the option's natural width.
    pub fn set_option(&mut self, level: i32, optname: i32, value: &[u8]) -> Result<(), i32> {
        if (level, optname) == (libc::SOL_SOCKET, libc::SO_TYPE)
            || (level, optname) == (libc::SOL_SOCKET, libc::SO_ERROR)
        {
            return Err(libc::ENOPROTOOPT);
        }
        let width = option_width(level, optname).ok_or(libc::ENOPROTOOPT)?;
        if !self.options.contains_key(&(level, optname)) {
            return Err(libc::ENOPROTOOPT);
        }
        if value.len() < width {
            return Err(libc::EINVAL);
        }
        if width == TIMEVAL_LEN {
            let usec = i64::from_ne_bytes(value[8..16].try_into().map_err(|_| libc::EINVAL)?);
            if !(0..1_000_000).contains(&usec) {
                return Err(libc::EDOM);
            }
        }
        self.options
            .insert((level, optname), value[..width].to_vec());
        Ok(())
    }
}

/// Natural value width of the options the simulation knows about.
fn option_width(level: i32, optname: i32) -> Option<usize> {
    match (level, optname) {
        (libc::SOL_SOCKET, libc::SO_RCVTIMEO) | (libc::SOL_SOCKET, libc::SO_SNDTIMEO) => {
            Some(TIMEVAL_LEN)
        }
        (libc::SOL_SOCKET, libc::SO_TYPE)
        | (libc::SOL_SOCKET, libc::SO_ERROR)
        | (libc::SOL_SOCKET, libc::SO_REUSEADDR)
        | (libc::SOL_SOCKET, libc::SO_RCVBUF)
        | (libc::SOL_SOCKET, libc::SO_SNDBUF)
        | (libc::IPPROTO_TCP, libc::TCP_NODELAY) => Some(INT_LEN),
        _ => None,
    }
}
