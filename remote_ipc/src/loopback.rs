//! In-process transport that hands envelopes straight to a server.

use crate::server::RemoteIpcServer;
use crate::{check_remote_error, lock, RemoteHandler, RemoteTransport, TransportError};
use ipc::MessageEnvelope;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Runs requests against a [`RemoteIpcServer`] in the calling thread.
///
/// An optional latency models a slow link: a call whose deadline is shorter
/// than the latency sleeps for the deadline and then fails, exactly like a
/// real transport whose response never arrived in time.
pub struct LoopbackTransport<H: RemoteHandler> {
    server: Mutex<RemoteIpcServer<H>>,
    latency: Duration,
    closed: AtomicBool,
}

impl<H: RemoteHandler> LoopbackTransport<H> {
    pub fn new(server: RemoteIpcServer<H>) -> Self {
        Self {
            server: Mutex::new(server),
            latency: Duration::ZERO,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Runs `f` against the server's handler, e.g. to inspect simulated state.
    pub fn with_handler<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        f(lock(&self.server).handler_mut())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<H: RemoteHandler> RemoteTransport for LoopbackTransport<H> {
    fn call(
        &self,
        request: MessageEnvelope,
        deadline: Duration,
    ) -> Result<MessageEnvelope, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        if self.latency >= deadline {
            thread::sleep(deadline);
            return Err(TransportError::DeadlineExceeded {
                method: request.action,
                deadline,
            });
        }
        thread::sleep(self.latency);

        let id = request.id;
        let action = request.action.clone();
        let response = lock(&self.server).respond(request);
        if !response.answers(&id) {
            return Err(TransportError::Codec(format!(
                "response to {} is not correlated with the request",
                action
            )));
        }
        check_remote_error(&action, response)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
