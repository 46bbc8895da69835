//! Request and response messages, one request type per method.

use crate::method;
use crate::wire::{Sockaddr, Timeval};
use crate::PosixMethod;
use serde::{Deserialize, Serialize};

/// Response for calls whose only result is a return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetResponse {
    pub ret: i32,
    pub errno: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketRequest {
    pub domain: i32,
    #[serde(rename = "type")]
    pub ty: i32,
    pub protocol: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SocketResponse {
    pub fd: i32,
    pub errno: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRequest {
    pub sockfd: i32,
    pub addr: Sockaddr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
    pub sockfd: i32,
    pub addr: Sockaddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenRequest {
    pub sockfd: i32,
    pub backlog: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptRequest {
    pub sockfd: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcceptResponse {
    pub fd: i32,
    #[serde(default)]
    pub addr: Sockaddr,
    pub errno: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendRequest {
    pub sockfd: i32,
    #[serde(with = "ipc::bytes")]
    pub buf: Vec<u8>,
    pub flags: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendToRequest {
    pub sockfd: i32,
    #[serde(with = "ipc::bytes")]
    pub buf: Vec<u8>,
    pub flags: i32,
    pub dest_addr: Sockaddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecvRequest {
    pub sockfd: i32,
    pub len: i32,
    pub flags: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecvResponse {
    pub ret: i32,
    #[serde(default, with = "ipc::bytes")]
    pub buf: Vec<u8>,
    pub errno: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSockNameRequest {
    pub sockfd: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetSockNameResponse {
    pub ret: i32,
    #[serde(default)]
    pub addr: Sockaddr,
    pub errno: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSockOptRequest {
    pub sockfd: i32,
    pub level: i32,
    pub optname: i32,
    pub optlen: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetSockOptResponse {
    pub ret: i32,
    #[serde(default, with = "ipc::bytes")]
    pub optval: Vec<u8>,
    pub errno: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSockOptIntRequest {
    pub sockfd: i32,
    pub level: i32,
    pub optname: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetSockOptIntResponse {
    pub ret: i32,
    pub intval: i32,
    pub errno: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetSockOptTimevalRequest {
    pub sockfd: i32,
    pub level: i32,
    pub optname: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetSockOptTimevalResponse {
    pub ret: i32,
    #[serde(default)]
    pub timeval: Timeval,
    pub errno: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSockOptRequest {
    pub sockfd: i32,
    pub level: i32,
    pub optname: i32,
    #[serde(with = "ipc::bytes")]
    pub optval: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSockOptIntRequest {
    pub sockfd: i32,
    pub level: i32,
    pub optname: i32,
    pub intval: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSockOptTimevalRequest {
    pub sockfd: i32,
    pub level: i32,
    pub optname: i32,
    pub timeval: Timeval,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseRequest {
    pub fd: i32,
}

macro_rules! posix_methods {
    ($($request:ty => $method:expr, $response:ty;)*) => {
        $(
            impl PosixMethod for $request {
                const METHOD: &'static str = $method;
                type Response = $response;
            }
        )*
    };
}

posix_methods! {
    AcceptRequest => method::ACCEPT, AcceptResponse;
    BindRequest => method::BIND, RetResponse;
    CloseRequest => method::CLOSE, RetResponse;
    ConnectRequest => method::CONNECT, RetResponse;
    GetSockNameRequest => method::GET_SOCK_NAME, GetSockNameResponse;
    GetSockOptRequest => method::GET_SOCK_OPT, GetSockOptResponse;
    GetSockOptIntRequest => method::GET_SOCK_OPT_INT, GetSockOptIntResponse;
    GetSockOptTimevalRequest => method::GET_SOCK_OPT_TIMEVAL, GetSockOptTimevalResponse;
    ListenRequest => method::LISTEN, RetResponse;
    RecvRequest => method::RECV, RecvResponse;
    SendRequest => method::SEND, RetResponse;
    SendToRequest => method::SEND_TO, RetResponse;
    SetSockOptRequest => method::SET_SOCK_OPT, RetResponse;
    SetSockOptIntRequest => method::SET_SOCK_OPT_INT, RetResponse;
    SetSockOptTimevalRequest => method::SET_SOCK_OPT_TIMEVAL, RetResponse;
    SocketRequest => method::SOCKET, SocketResponse;
}
