//! Remote calls over a message transport.
//!
//! A client hands a request envelope and a deadline to a [`RemoteTransport`]
//! and gets back the correlated response envelope, or a [`TransportError`]
//! if the plumbing failed. The server side runs a [`RemoteHandler`] behind a
//! [`RemoteIpcServer`], either in-process ([`LoopbackTransport`]) or over TCP
//! ([`TcpTransport`] talking to [`serve`]).

mod frame;
pub mod loopback;
pub mod server;
pub mod tcp;

use ipc::MessageEnvelope;
use std::io;
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

pub use loopback::LoopbackTransport;
pub use server::{serve, serve_connection, RemoteIpcServer};
pub use tcp::TcpTransport;

/// Liveness ping action, answered by the server without reaching the handler.
pub const PING_ACTION: &str = "remote.ping";

/// Action of a response reporting that the server could not process a request.
pub const REMOTE_ERROR_ACTION: &str = "remote.error";

/// Failures of the transport itself, never of the remote operation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("deadline of {deadline:?} exceeded waiting for {method}")]
    DeadlineExceeded { method: String, deadline: Duration },

    #[error("connection lost")]
    Disconnected,

    #[error("keepalive ping unanswered within {0:?}")]
    KeepaliveExpired(Duration),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("server rejected {method}: {message}")]
    Remote { method: String, message: String },

    #[error("transport closed")]
    Closed,
}

/// Server-side failures while turning a request into a response.
#[derive(Debug, Error)]
pub enum RemoteIpcError {
    #[error("Codec error: {0}")]
    Codec(String),

    #[error(transparent)]
    SchemaMismatch(#[from] ipc::SchemaMismatchError),

    #[error("Handler error: {0}")]
    Handler(String),
}

/// Executes requests on the server side.
pub trait RemoteHandler: Send {
    /// Produces the response envelope for `request`, correlated to it.
    fn handle(&mut self, request: MessageEnvelope) -> Result<MessageEnvelope, String>;
}

/// A reliable, ordered request/response channel with per-call deadlines.
///
/// Implementations are shared by every thread of one test, so `call` takes
/// `&self` and each call is an independent round trip.
pub trait RemoteTransport: Send + Sync {
    /// Sends `request` and waits at most `deadline` for its response.
    fn call(
        &self,
        request: MessageEnvelope,
        deadline: Duration,
    ) -> Result<MessageEnvelope, TransportError>;

    /// Releases the connection. Later calls fail with [`TransportError::Closed`].
    fn close(&self);
}

impl<T: RemoteTransport + ?Sized> RemoteTransport for Box<T> {
    fn call(
        &self,
        request: MessageEnvelope,
        deadline: Duration,
    ) -> Result<MessageEnvelope, TransportError> {
        (**self).call(request, deadline)
    }

    fn close(&self) {
        (**self).close()
    }
}

/// Converts a server error envelope into the error it reports.
pub(crate) fn check_remote_error(
    request_action: &str,
    response: MessageEnvelope,
) -> Result<MessageEnvelope, TransportError> {
    if response.action != REMOTE_ERROR_ACTION {
        return Ok(response);
    }
    let message = response
        .payload
        .deserialize::<String>()
        .map_err(|err| TransportError::Codec(err.to_string()))?;
    Err(TransportError::Remote {
        method: request_action.to_string(),
        message,
    })
}

/// Locks a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
