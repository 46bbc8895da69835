//! Named socket calls.
//!
//! Each call comes in two flavors. `*_with_errno` takes an explicit
//! deadline and returns the whole [`CallResult`], failed or not. The plain
//! name uses the session's default deadline, treats a negative return as a
//! fatal test failure and returns only the payload.

use crate::call::{CallResult, OnFailure, Syscall};
use crate::error::{DutError, Result};
use crate::option::{self, OptionValue, Timeval};
use crate::session::Session;
use crate::{address, RemoteFd};
use posix_proto::*;
use remote_ipc::RemoteTransport;
use std::net::SocketAddr;
use std::time::Duration;

impl<T: RemoteTransport> Session<T> {
    #[track_caller]
    fn raw<S: Syscall>(&self, request: S, timeout: Duration) -> Result<CallResult<S::Output>> {
        self.call(&request, timeout, OnFailure::ReturnErrno)
    }

    #[track_caller]
    fn checked<S: Syscall>(&self, request: S) -> Result<S::Output> {
        let result = self.call(&request, self.default_timeout(), OnFailure::Fatal)?;
        Ok(result.value)
    }

    #[track_caller]
    fn returned_address(&self, method: &str, addr: Option<SocketAddr>) -> Result<SocketAddr> {
        match addr {
            Some(addr) => Ok(addr),
            None => Err(self.fatal(DutError::MalformedResponse {
                method: method.to_string(),
                reason: "successful call returned no address".to_string(),
            })),
        }
    }

    #[track_caller]
    pub fn socket_with_errno(
        &self,
        timeout: Duration,
        domain: i32,
        ty: i32,
        protocol: i32,
    ) -> Result<CallResult<RemoteFd>> {
        self.raw(SocketRequest { domain, ty, protocol }, timeout)
    }

    #[track_caller]
    pub fn socket(&self, domain: i32, ty: i32, protocol: i32) -> Result<RemoteFd> {
        self.checked(SocketRequest { domain, ty, protocol })
    }

    #[track_caller]
    pub fn bind_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        addr: SocketAddr,
    ) -> Result<CallResult<()>> {
        self.raw(
            BindRequest {
                sockfd,
                addr: address::to_wire(&addr),
            },
            timeout,
        )
    }

    #[track_caller]
    pub fn bind(&self, sockfd: RemoteFd, addr: SocketAddr) -> Result<()> {
        self.checked(BindRequest {
            sockfd,
            addr: address::to_wire(&addr),
        })
    }

    #[track_caller]
    pub fn connect_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        addr: SocketAddr,
    ) -> Result<CallResult<()>> {
        self.raw(
            ConnectRequest {
                sockfd,
                addr: address::to_wire(&addr),
            },
            timeout,
        )
    }

    #[track_caller]
    pub fn connect(&self, sockfd: RemoteFd, addr: SocketAddr) -> Result<()> {
        self.checked(ConnectRequest {
            sockfd,
            addr: address::to_wire(&addr),
        })
    }

    #[track_caller]
    pub fn listen_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        backlog: i32,
    ) -> Result<CallResult<()>> {
        self.raw(ListenRequest { sockfd, backlog }, timeout)
    }

    #[track_caller]
    pub fn listen(&self, sockfd: RemoteFd, backlog: i32) -> Result<()> {
        self.checked(ListenRequest { sockfd, backlog })
    }

    /// On success `ret` is the new descriptor and `value` the peer address.
    #[track_caller]
    pub fn accept_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
    ) -> Result<CallResult<Option<SocketAddr>>> {
        self.raw(AcceptRequest { sockfd }, timeout)
    }

    #[track_caller]
    pub fn accept(&self, sockfd: RemoteFd) -> Result<(RemoteFd, SocketAddr)> {
        let result = self.call(
            &AcceptRequest { sockfd },
            self.default_timeout(),
            OnFailure::Fatal,
        )?;
        let peer = self.returned_address(method::ACCEPT, result.value)?;
        Ok((result.ret, peer))
    }

    #[track_caller]
    pub fn send_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        buf: &[u8],
        flags: i32,
    ) -> Result<CallResult<usize>> {
        self.raw(
            SendRequest {
                sockfd,
                buf: buf.to_vec(),
                flags,
            },
            timeout,
        )
    }

    #[track_caller]
    pub fn send(&self, sockfd: RemoteFd, buf: &[u8], flags: i32) -> Result<usize> {
        self.checked(SendRequest {
            sockfd,
            buf: buf.to_vec(),
            flags,
        })
    }

    #[track_caller]
    pub fn send_to_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        buf: &[u8],
        flags: i32,
        dest_addr: SocketAddr,
    ) -> Result<CallResult<usize>> {
        self.raw(
            SendToRequest {
                sockfd,
                buf: buf.to_vec(),
                flags,
                dest_addr: address::to_wire(&dest_addr),
            },
            timeout,
        )
    }

    #[track_caller]
    pub fn send_to(
        &self,
        sockfd: RemoteFd,
        buf: &[u8],
        flags: i32,
        dest_addr: SocketAddr,
    ) -> Result<usize> {
        self.checked(SendToRequest {
            sockfd,
            buf: buf.to_vec(),
            flags,
            dest_addr: address::to_wire(&dest_addr),
        })
    }

    /// Receives at most `len` bytes.
    #[track_caller]
    pub fn recv_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        len: i32,
        flags: i32,
    ) -> Result<CallResult<Vec<u8>>> {
        self.raw(RecvRequest { sockfd, len, flags }, timeout)
    }

    #[track_caller]
    pub fn recv(&self, sockfd: RemoteFd, len: i32, flags: i32) -> Result<Vec<u8>> {
        self.checked(RecvRequest { sockfd, len, flags })
    }

    #[track_caller]
    pub fn get_sock_name_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
    ) -> Result<CallResult<Option<SocketAddr>>> {
        self.raw(GetSockNameRequest { sockfd }, timeout)
    }

    #[track_caller]
    pub fn get_sock_name(&self, sockfd: RemoteFd) -> Result<SocketAddr> {
        let local = self.checked(GetSockNameRequest { sockfd })?;
        self.returned_address(method::GET_SOCK_NAME, local)
    }

    /// Reads an option as at most `optlen` raw bytes.
    #[track_caller]
    pub fn get_sock_opt_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
        optlen: i32,
    ) -> Result<CallResult<Vec<u8>>> {
        self.raw(
            GetSockOptRequest {
                sockfd,
                level,
                optname,
                optlen,
            },
            timeout,
        )
    }

    #[track_caller]
    pub fn get_sock_opt(
        &self,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
        optlen: i32,
    ) -> Result<Vec<u8>> {
        self.checked(GetSockOptRequest {
            sockfd,
            level,
            optname,
            optlen,
        })
    }

    #[track_caller]
    pub fn get_sock_opt_int_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
    ) -> Result<CallResult<i32>> {
        self.raw(
            GetSockOptIntRequest {
                sockfd,
                level,
                optname,
            },
            timeout,
        )
    }

    #[track_caller]
    pub fn get_sock_opt_int(&self, sockfd: RemoteFd, level: i32, optname: i32) -> Result<i32> {
        self.checked(GetSockOptIntRequest {
            sockfd,
            level,
            optname,
        })
    }

    #[track_caller]
    pub fn get_sock_opt_timeval_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
    ) -> Result<CallResult<Timeval>> {
        self.raw(
            GetSockOptTimevalRequest {
                sockfd,
                level,
                optname,
            },
            timeout,
        )
    }

    #[track_caller]
    pub fn get_sock_opt_timeval(
        &self,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
    ) -> Result<Timeval> {
        self.checked(GetSockOptTimevalRequest {
            sockfd,
            level,
            optname,
        })
    }

    #[track_caller]
    pub fn set_sock_opt_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
        optval: &[u8],
    ) -> Result<CallResult<()>> {
        self.raw(
            SetSockOptRequest {
                sockfd,
                level,
                optname,
                optval: optval.to_vec(),
            },
            timeout,
        )
    }

    #[track_caller]
    pub fn set_sock_opt(
        &self,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
        optval: &[u8],
    ) -> Result<()> {
        self.checked(SetSockOptRequest {
            sockfd,
            level,
            optname,
            optval: optval.to_vec(),
        })
    }

    #[track_caller]
    pub fn set_sock_opt_int_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
        intval: i32,
    ) -> Result<CallResult<()>> {
        self.raw(
            SetSockOptIntRequest {
                sockfd,
                level,
                optname,
                intval,
            },
            timeout,
        )
    }

    #[track_caller]
    pub fn set_sock_opt_int(
        &self,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
        intval: i32,
    ) -> Result<()> {
        self.checked(SetSockOptIntRequest {
            sockfd,
            level,
            optname,
            intval,
        })
    }

    #[track_caller]
    pub fn set_sock_opt_timeval_with_errno(
        &self,
        timeout: Duration,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
        timeval: Timeval,
    ) -> Result<CallResult<()>> {
        self.raw(
            SetSockOptTimevalRequest {
                sockfd,
                level,
                optname,
                timeval: option::timeval_to_wire(timeval),
            },
            timeout,
        )
    }

    #[track_caller]
    pub fn set_sock_opt_timeval(
        &self,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
        timeval: Timeval,
    ) -> Result<()> {
        self.checked(SetSockOptTimevalRequest {
            sockfd,
            level,
            optname,
            timeval: option::timeval_to_wire(timeval),
        })
    }

    /// Sets an option through the call matching the value's shape.
    #[track_caller]
    pub fn set_sock_opt_value(
        &self,
        sockfd: RemoteFd,
        level: i32,
        optname: i32,
        value: &OptionValue,
    ) -> Result<()> {
        match value {
            OptionValue::Bytes(bytes) => self.set_sock_opt(sockfd, level, optname, bytes),
            OptionValue::Int(intval) => self.set_sock_opt_int(sockfd, level, optname, *intval),
            OptionValue::Timeval(tv) => self.set_sock_opt_timeval(sockfd, level, optname, *tv),
        }
    }

    #[track_caller]
    pub fn close_with_errno(&self, timeout: Duration, fd: RemoteFd) -> Result<CallResult<()>> {
        self.raw(CloseRequest { fd }, timeout)
    }

    #[track_caller]
    pub fn close(&self, fd: RemoteFd) -> Result<()> {
        self.checked(CloseRequest { fd })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DutConfig;
    use crate::report::RecordingReporter;
    use proptest::prelude::*;
    use remote_ipc::LoopbackTransport;
    use sim_dut::SimDut;
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_millis(100);

    fn session() -> (Session<LoopbackTransport<SimDut>>, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::new());
        let session = Session::new(
            SimDut::new().into_loopback(),
            DutConfig::default(),
            reporter.clone(),
        );
        (session, reporter)
    }

    fn localhost(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_stream_exchange() {
        let (dut, reporter) = session();

        let listener = dut.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        dut.bind(listener, localhost(0)).unwrap();
        dut.listen(listener, 4).unwrap();
        let server_addr = dut.get_sock_name(listener).unwrap();
        assert_ne!(server_addr.port(), 0);

        let client = dut.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        dut.connect(client, server_addr).unwrap();
        let client_addr = dut.get_sock_name(client).unwrap();

        let (conn, peer) = dut.accept(listener).unwrap();
        assert!(conn >= 0);
        assert_eq!(peer.port(), client_addr.port());

        assert_eq!(dut.send(client, b"ping", 0).unwrap(), 4);
        assert_eq!(dut.recv(conn, 16, 0).unwrap(), b"ping".to_vec());

        for fd in [conn, client, listener] {
            dut.close(fd).unwrap();
        }
        assert_eq!(reporter.fatal_count(), 0);
        dut.tear_down();
    }

    #[test]
    fn test_datagram_send_to() {
        let (dut, _reporter) = session();

        let receiver = dut.socket(libc::AF_INET6, libc::SOCK_DGRAM, 0).unwrap();
        dut.bind(receiver, "[::1]:0".parse().unwrap()).unwrap();
        let dest = dut.get_sock_name(receiver).unwrap();

        let sender = dut.socket(libc::AF_INET6, libc::SOCK_DGRAM, 0).unwrap();
        assert_eq!(dut.send_to(sender, b"datagram", 0, dest).unwrap(), 8);
        assert_eq!(dut.recv(receiver, 64, 0).unwrap(), b"datagram".to_vec());
    }

    #[test]
    fn test_raw_failure_is_returned() {
        let (dut, reporter) = session();

        let result = dut.close_with_errno(TIMEOUT, 42).unwrap();
        assert!(result.failed());
        assert_eq!(result.errno.raw(), libc::EBADF);

        let fd = dut.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        let accepted = dut.accept_with_errno(TIMEOUT, fd).unwrap();
        assert!(accepted.ret < 0);
        assert_eq!(accepted.value, None);
        assert_eq!(accepted.errno.raw(), libc::EINVAL);

        assert_eq!(reporter.fatal_count(), 0);
    }

    #[test]
    fn test_convenience_failure_is_fatal() {
        let (dut, reporter) = session();

        let err = dut.listen(99, 1).unwrap_err();
        assert_eq!(err.errno().map(|errno| errno.raw()), Some(libc::EBADF));
        assert!(err.to_string().starts_with("failed to listen on socket"));

        let fatals = reporter.fatals();
        assert_eq!(fatals.len(), 1);
        assert_eq!(fatals[0].file, file!());
    }

    #[test]
    fn test_socket_unsupported_family() {
        let (dut, _reporter) = session();

        let result = dut
            .socket_with_errno(TIMEOUT, libc::AF_UNIX, libc::SOCK_STREAM, 0)
            .unwrap();
        assert!(result.failed());
        assert_eq!(result.value, result.ret);
        assert_eq!(result.errno.raw(), libc::EAFNOSUPPORT);
    }

    #[test]
    fn test_option_setters_by_shape() {
        let (dut, _reporter) = session();
        let fd = dut.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();

        dut.set_sock_opt_value(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, &OptionValue::Int(1))
            .unwrap();
        assert_eq!(
            dut.get_sock_opt_int(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR).unwrap(),
            1
        );

        let timeout = Timeval::new(2, 500);
        dut.set_sock_opt_value(fd, libc::SOL_SOCKET, libc::SO_RCVTIMEO, &timeout.into())
            .unwrap();
        assert_eq!(
            dut.get_sock_opt_timeval(fd, libc::SOL_SOCKET, libc::SO_RCVTIMEO).unwrap(),
            timeout
        );

        let raw = dut
            .get_sock_opt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, 4)
            .unwrap();
        assert_eq!(raw, 1i32.to_ne_bytes().to_vec());

        let rejected = dut
            .set_sock_opt_with_errno(TIMEOUT, fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, &[1])
            .unwrap();
        assert_eq!(rejected.errno.raw(), libc::EINVAL);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        // Non-negative returns never escalate; negative ones always do.
        #[test]
        fn prop_sentinel(ret in any::<i32>(), errno in 0i32..200) {
            let (dut, reporter) = session();
            let outcome = dut.complete("check", CallResult::new(ret, (), errno), OnFailure::Fatal);
            if ret < 0 {
                prop_assert!(matches!(outcome, Err(DutError::Posix { op: "check", .. })), "expected Posix error for op check, got {:?}", outcome);
                prop_assert_eq!(reporter.fatal_count(), 1);
            } else {
                prop_assert!(outcome.is_ok());
                prop_assert_eq!(reporter.fatal_count(), 0);
            }
        }
    }
}
