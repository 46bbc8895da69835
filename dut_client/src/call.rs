//! Per-call decoding and the failure policy.

use crate::address;
use crate::error::{Errno, Result};
use crate::option::{self, Timeval};
use crate::RemoteFd;
use posix_proto::*;
use std::net::SocketAddr;

/// Outcome of one remote call.
///
/// `ret` and `errno` are independent: `errno` only means something when
/// [`CallResult::failed`] is true, and nothing here enforces that it is
/// zero otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult<T> {
    pub ret: i32,
    pub value: T,
    pub errno: Errno,
}

impl<T> CallResult<T> {
    pub fn new(ret: i32, value: T, errno: i32) -> Self {
        Self {
            ret,
            value,
            errno: Errno(errno),
        }
    }

    /// True when the return code is the failure sentinel (any negative value).
    pub fn failed(&self) -> bool {
        self.ret < 0
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CallResult<U> {
        CallResult {
            ret: self.ret,
            value: f(self.value),
            errno: self.errno,
        }
    }
}

/// What a call does when the DUT reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// Report to the session's sink and return [`crate::DutError::Posix`].
    Fatal,
    /// Hand the failed result back as data.
    ReturnErrno,
}

/// A request the session knows how to issue and decode.
pub trait Syscall: PosixMethod {
    /// Operation name used in failure messages ("failed to {OP}: ...").
    const OP: &'static str;

    type Output;

    fn decode(response: Self::Response) -> Result<CallResult<Self::Output>>;
}

/// Decodes an address only when the call that produced it succeeded.
fn address_on_success(ret: i32, addr: &Sockaddr) -> Result<Option<SocketAddr>> {
    if ret < 0 {
        return Ok(None);
    }
    address::from_wire(addr).map(Some)
}

fn count(ret: i32) -> usize {
    usize::try_from(ret).unwrap_or(0)
}

macro_rules! ret_only {
    ($($request:ty => $op:expr;)*) => {
        $(
            impl Syscall for $request {
                const OP: &'static str = $op;
                type Output = ();

                fn decode(response: RetResponse) -> Result<CallResult<()>> {
                    Ok(CallResult::new(response.ret, (), response.errno))
                }
            }
        )*
    };
}

ret_only! {
    BindRequest => "bind socket";
    CloseRequest => "close";
    ConnectRequest => "connect socket";
    ListenRequest => "listen on socket";
    SetSockOptRequest => "set socket option";
    SetSockOptIntRequest => "set socket option";
    SetSockOptTimevalRequest => "set socket option";
}

impl Syscall for SocketRequest {
    const OP: &'static str = "create socket";
    type Output = RemoteFd;

    fn decode(response: SocketResponse) -> Result<CallResult<RemoteFd>> {
        Ok(CallResult::new(response.fd, response.fd, response.errno))
    }
}

impl Syscall for AcceptRequest {
    const OP: &'static str = "accept on socket";
    type Output = Option<SocketAddr>;

    fn decode(response: AcceptResponse) -> Result<CallResult<Option<SocketAddr>>> {
        let peer = address_on_success(response.fd, &response.addr)?;
        Ok(CallResult::new(response.fd, peer, response.errno))
    }
}

impl Syscall for SendRequest {
    const OP: &'static str = "send";
    type Output = usize;

    fn decode(response: RetResponse) -> Result<CallResult<usize>> {
        Ok(CallResult::new(response.ret, count(response.ret), response.errno))
    }
}

impl Syscall for SendToRequest {
    const OP: &'static str = "send to";
    type Output = usize;

    fn decode(response: RetResponse) -> Result<CallResult<usize>> {
        Ok(CallResult::new(response.ret, count(response.ret), response.errno))
    }
}

impl Syscall for RecvRequest {
    const OP: &'static str = "recv";
    type Output = Vec<u8>;

    fn decode(response: RecvResponse) -> Result<CallResult<Vec<u8>>> {
        Ok(CallResult::new(response.ret, response.buf, response.errno))
    }
}

impl Syscall for GetSockNameRequest {
    const OP: &'static str = "get socket name";
    type Output = Option<SocketAddr>;

    fn decode(response: GetSockNameResponse) -> Result<CallResult<Option<SocketAddr>>> {
        let local = address_on_success(response.ret, &response.addr)?;
        Ok(CallResult::new(response.ret, local, response.errno))
    }
}

impl Syscall for GetSockOptRequest {
    const OP: &'static str = "get socket option";
    type Output = Vec<u8>;

    fn decode(response: GetSockOptResponse) -> Result<CallResult<Vec<u8>>> {
        Ok(CallResult::new(response.ret, response.optval, response.errno))
    }
}

impl Syscall for GetSockOptIntRequest {
    const OP: &'static str = "get socket option";
    type Output = i32;

    fn decode(response: GetSockOptIntResponse) -> Result<CallResult<i32>> {
        Ok(CallResult::new(response.ret, response.intval, response.errno))
    }
}

impl Syscall for GetSockOptTimevalRequest {
    const OP: &'static str = "get socket option";
    type Output = Timeval;

    fn decode(response: GetSockOptTimevalResponse) -> Result<CallResult<Timeval>> {
        Ok(CallResult::new(
            response.ret,
            option::timeval_from_wire(response.timeval),
            response.errno,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DutError;

    #[test]
    fn test_sentinel_is_any_negative() {
        assert!(CallResult::new(-1, (), 9).failed());
        assert!(CallResult::new(-22, (), 0).failed());
        assert!(!CallResult::new(0, (), 0).failed());
        assert!(!CallResult::new(5, (), 11).failed());
    }

    #[test]
    fn test_accept_address_only_on_success() {
        let failed = AcceptResponse {
            fd: -1,
            addr: Sockaddr::Unknown,
            errno: libc::EAGAIN,
        };
        let result = AcceptRequest::decode(failed).unwrap();
        assert!(result.failed());
        assert_eq!(result.value, None);
        assert_eq!(result.errno, Errno(libc::EAGAIN));

        let garbled = AcceptResponse {
            fd: 5,
            addr: Sockaddr::Unknown,
            errno: 0,
        };
        assert!(matches!(
            AcceptRequest::decode(garbled),
            Err(DutError::UnrecognizedAddress(_))
        ));
    }

    #[test]
    fn test_send_count() {
        let sent = SendRequest::decode(RetResponse { ret: 12, errno: 0 }).unwrap();
        assert_eq!(sent.value, 12);
        let failed = SendRequest::decode(RetResponse {
            ret: -1,
            errno: libc::EPIPE,
        })
        .unwrap();
        assert_eq!(failed.value, 0);
        assert!(failed.failed());
    }

    #[test]
    fn test_map_keeps_ret_and_errno() {
        let result = CallResult::new(3, 3, 0).map(|fd| fd * 2);
        assert_eq!(result.ret, 3);
        assert_eq!(result.value, 6);
        assert_eq!(result.errno, Errno::NONE);
    }
}
