//! # Posix service wire schema
//!
//! Request and response messages for every socket call the DUT's posix
//! server executes, plus the glue that moves them in and out of
//! [`ipc::MessageEnvelope`]s.
//!
//! Every response carries the syscall's return value and the `errno` the
//! DUT observed. Address and option payloads use the wire shapes in
//! [`wire`], which are deliberately dumber than the client's typed values:
//! a [`wire::Sockaddr`] may hold an address kind this schema version does
//! not know about, and callers must be prepared for that.

pub mod messages;
pub mod service;
pub mod wire;

pub use messages::*;
pub use service::{dispatch, DispatchError, PosixService};
pub use wire::{Sockaddr, SockaddrIn, SockaddrIn6, Timeval};

use ipc::{MessageEnvelope, MessageId, MessagePayload, SchemaVersion};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Posix message schema version (v1.0).
pub const POSIX_SCHEMA_VERSION: SchemaVersion = SchemaVersion::new(1, 0);

/// Envelope actions, one per remote call.
pub mod method {
    pub const ACCEPT: &str = "Posix/Accept";
    pub const BIND: &str = "Posix/Bind";
    pub const CLOSE: &str = "Posix/Close";
    pub const CONNECT: &str = "Posix/Connect";
    pub const GET_SOCK_NAME: &str = "Posix/GetSockName";
    pub const GET_SOCK_OPT: &str = "Posix/GetSockOpt";
    pub const GET_SOCK_OPT_INT: &str = "Posix/GetSockOptInt";
    pub const GET_SOCK_OPT_TIMEVAL: &str = "Posix/GetSockOptTimeval";
    pub const LISTEN: &str = "Posix/Listen";
    pub const RECV: &str = "Posix/Recv";
    pub const SEND: &str = "Posix/Send";
    pub const SEND_TO: &str = "Posix/SendTo";
    pub const SET_SOCK_OPT: &str = "Posix/SetSockOpt";
    pub const SET_SOCK_OPT_INT: &str = "Posix/SetSockOptInt";
    pub const SET_SOCK_OPT_TIMEVAL: &str = "Posix/SetSockOptTimeval";
    pub const SOCKET: &str = "Posix/Socket";

    pub const ALL: [&str; 16] = [
        ACCEPT,
        BIND,
        CLOSE,
        CONNECT,
        GET_SOCK_NAME,
        GET_SOCK_OPT,
        GET_SOCK_OPT_INT,
        GET_SOCK_OPT_TIMEVAL,
        LISTEN,
        RECV,
        SEND,
        SEND_TO,
        SET_SOCK_OPT,
        SET_SOCK_OPT_INT,
        SET_SOCK_OPT_TIMEVAL,
        SOCKET,
    ];
}

/// Binds a request message to its method name and response message.
pub trait PosixMethod: Serialize + DeserializeOwned {
    /// Envelope action for this request.
    const METHOD: &'static str;

    /// Response message the server answers with.
    type Response: Serialize + DeserializeOwned;

    /// Wraps this request in a message envelope.
    fn into_envelope(&self) -> Result<MessageEnvelope, serde_json::Error> {
        let payload = MessagePayload::new(self)?;
        Ok(MessageEnvelope::new(
            Self::METHOD,
            POSIX_SCHEMA_VERSION,
            payload,
        ))
    }
}

/// Wraps a response in an envelope correlated to the request it answers.
pub fn response_envelope<R: Serialize>(
    action: &str,
    response: &R,
    correlation: MessageId,
) -> Result<MessageEnvelope, serde_json::Error> {
    let payload = MessagePayload::new(response)?;
    Ok(MessageEnvelope::new(action, POSIX_SCHEMA_VERSION, payload).with_correlation(correlation))
}
