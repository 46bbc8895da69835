//! TCP transport with per-call deadlines and a keepalive ping.
//!
//! One reader thread owns the receive half of the stream and routes each
//! response to the caller waiting on its correlation id, so any number of
//! threads may have calls in flight at once. Callers never hold a lock
//! while waiting for a response.

use crate::{check_remote_error, frame, lock, RemoteTransport, TransportError, PING_ACTION};
use ipc::{MessageEnvelope, MessageId, MessagePayload, SchemaVersion};
use std::collections::HashMap;
use std::io::{self, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<MessageId, Sender<MessageEnvelope>>>,
    closed: AtomicBool,
    last_heard: Mutex<Option<Instant>>,
}

impl Shared {
    fn shut(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the senders wakes every waiter with `Disconnected`.
        lock(&self.pending).clear();
    }
}

pub struct TcpTransport {
    peer: SocketAddr,
    writer: Mutex<TcpStream>,
    shared: Arc<Shared>,
    keepalive: Duration,
    released: AtomicBool,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl TcpTransport {
    /// Dials `addr`, waiting at most `keepalive` for the connection.
    ///
    /// The same interval bounds how long the link may stay silent before the
    /// next call first pings it.
    pub fn connect(addr: SocketAddr, keepalive: Duration) -> Result<Self, TransportError> {
        let stream = TcpStream::connect_timeout(&addr, keepalive)
            .map_err(|source| TransportError::Connect { addr, source })?;
        stream.set_nodelay(true)?;
        let read_half = stream.try_clone()?;

        let shared = Arc::new(Shared::default());
        *lock(&shared.last_heard) = Some(Instant::now());

        let reader_shared = Arc::clone(&shared);
        let reader = thread::Builder::new()
            .name(format!("dut-transport-{}", addr))
            .spawn(move || read_loop(read_half, reader_shared))?;

        debug!(target: "dut", peer = %addr, ?keepalive, "transport connected");
        Ok(Self {
            peer: addr,
            writer: Mutex::new(stream),
            shared,
            keepalive,
            released: AtomicBool::new(false),
            reader: Mutex::new(Some(reader)),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Pings the server if nothing has been heard from it for a full
    /// keepalive interval.
    ///
    /// The ping spends the calling request's budget. Only a ping that went
    /// unanswered for the whole keepalive interval condemns the link.
    fn ping_if_idle(
        &self,
        method: &str,
        started: Instant,
        deadline: Duration,
    ) -> Result<(), TransportError> {
        let last_heard = *lock(&self.shared.last_heard);
        let idle = last_heard.map_or(Duration::MAX, |at| at.elapsed());
        if idle < self.keepalive {
            return Ok(());
        }

        trace!(target: "dut", peer = %self.peer, ?idle, "keepalive ping");
        let payload =
            MessagePayload::new(&()).map_err(|err| TransportError::Codec(err.to_string()))?;
        let ping = MessageEnvelope::new(PING_ACTION, SchemaVersion::new(1, 0), payload);
        let budget = self.keepalive.min(deadline);
        match self.exchange(ping, started, budget) {
            Ok(_) => Ok(()),
            Err(TransportError::DeadlineExceeded { .. }) if budget < self.keepalive => {
                Err(TransportError::DeadlineExceeded {
                    method: method.to_string(),
                    deadline,
                })
            }
            Err(TransportError::DeadlineExceeded { .. }) => {
                warn!(target: "dut", peer = %self.peer, "keepalive expired");
                self.shared.shut();
                Err(TransportError::KeepaliveExpired(self.keepalive))
            }
            Err(err) => Err(err),
        }
    }

    /// Sends `request` and waits for its response until `deadline` after `started`.
    fn exchange(
        &self,
        request: MessageEnvelope,
        started: Instant,
        deadline: Duration,
    ) -> Result<MessageEnvelope, TransportError> {
        let deadline_exceeded = |method: &str| TransportError::DeadlineExceeded {
            method: method.to_string(),
            deadline,
        };
        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(deadline_exceeded(&request.action));
        }
        let frame = frame::encode_frame(&request)
            .map_err(|err| TransportError::Codec(err.to_string()))?;

        let id = request.id;
        let (tx, rx) = mpsc::channel();
        lock(&self.shared.pending).insert(id, tx);
        if self.is_closed() {
            lock(&self.shared.pending).remove(&id);
            return Err(TransportError::Disconnected);
        }

        let sent = {
            let mut writer = lock(&self.writer);
            writer
                .set_write_timeout(Some(remaining))
                .and_then(|()| writer.write_all(&frame))
                .and_then(|()| writer.flush())
        };
        if let Err(err) = sent {
            lock(&self.shared.pending).remove(&id);
            // Part of the frame may be on the wire, so the stream is out of sync.
            warn!(target: "dut", peer = %self.peer, error = %err, "write failed, dropping link");
            self.shared.shut();
            let _ = lock(&self.writer).shutdown(Shutdown::Both);
            return Err(match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                    deadline_exceeded(&request.action)
                }
                _ => TransportError::Io(err),
            });
        }

        trace!(target: "dut", peer = %self.peer, action = %request.action, len = frame.len(), "frame sent");

        let remaining = deadline.saturating_sub(started.elapsed());
        match rx.recv_timeout(remaining) {
            Ok(response) => check_remote_error(&request.action, response),
            Err(RecvTimeoutError::Timeout) => {
                lock(&self.shared.pending).remove(&id);
                Err(deadline_exceeded(&request.action))
            }
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }
}

impl RemoteTransport for TcpTransport {
    fn call(
        &self,
        request: MessageEnvelope,
        deadline: Duration,
    ) -> Result<MessageEnvelope, TransportError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        if self.is_closed() {
            return Err(TransportError::Disconnected);
        }
        let started = Instant::now();
        self.ping_if_idle(&request.action, started, deadline)?;
        self.exchange(request, started, deadline)
    }

    fn close(&self) {
        self.released.store(true, Ordering::SeqCst);
        self.shared.shut();
        // The reader sees end of stream and exits.
        let _ = lock(&self.writer).shutdown(Shutdown::Both);
        if let Some(reader) = lock(&self.reader).take() {
            let _ = reader.join();
        }
        debug!(target: "dut", peer = %self.peer, "transport closed");
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if lock(&self.reader).is_some() {
            self.close();
        }
    }
}

fn read_loop(stream: TcpStream, shared: Arc<Shared>) {
    let mut reader = BufReader::new(stream);
    loop {
        match frame::read_frame(&mut reader) {
            Ok(Some(response)) => {
                *lock(&shared.last_heard) = Some(Instant::now());
                let Some(correlation) = response.correlation_id else {
                    warn!(target: "dut", action = %response.action, "uncorrelated frame dropped");
                    continue;
                };
                trace!(target: "dut", action = %response.action, id = %correlation, "response frame");
                // A missing entry means the caller already gave up on it.
                if let Some(waiter) = lock(&shared.pending).remove(&correlation) {
                    let _ = waiter.send(response);
                }
            }
            Ok(None) => {
                if !shared.closed.load(Ordering::SeqCst) {
                    warn!(target: "dut", "server closed the connection");
                }
                break;
            }
            Err(err) => {
                if !shared.closed.load(Ordering::SeqCst) {
                    warn!(target: "dut", error = %err, "transport read failed");
                }
                break;
            }
        }
    }
    shared.shut();
}
