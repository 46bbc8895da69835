//! Server side: version checks, liveness pings and the TCP serve loop.

use crate::{frame, lock, RemoteHandler, RemoteIpcError, PING_ACTION, REMOTE_ERROR_ACTION};
use ipc::{MessageEnvelope, MessagePayload, SchemaVersion, VersionPolicy};
use std::io::{self, BufReader, BufWriter};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, trace, warn};

pub struct RemoteIpcServer<H: RemoteHandler> {
    handler: H,
    policy: VersionPolicy,
}

impl<H: RemoteHandler> RemoteIpcServer<H> {
    pub fn new(handler: H, schema: SchemaVersion) -> Self {
        Self {
            handler,
            policy: VersionPolicy::current(schema),
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Answers one request envelope.
    ///
    /// Pings are answered here; everything else must pass the version
    /// policy before reaching the handler.
    pub fn handle_message(
        &mut self,
        message: MessageEnvelope,
    ) -> Result<MessageEnvelope, RemoteIpcError> {
        if message.action == PING_ACTION {
            let payload =
                MessagePayload::new(&()).map_err(|err| RemoteIpcError::Codec(err.to_string()))?;
            return Ok(
                MessageEnvelope::new(PING_ACTION, message.schema_version, payload)
                    .with_correlation(message.id),
            );
        }

        self.policy.check_envelope(&message)?;
        self.handler.handle(message).map_err(RemoteIpcError::Handler)
    }

    /// Like [`Self::handle_message`], but folds failures into an error
    /// envelope the client can correlate.
    pub fn respond(&mut self, message: MessageEnvelope) -> MessageEnvelope {
        let id = message.id;
        let schema = message.schema_version;
        match self.handle_message(message) {
            Ok(response) => response,
            Err(err) => {
                warn!(target: "dut", error = %err, "request rejected");
                error_envelope(&err.to_string(), schema).with_correlation(id)
            }
        }
    }
}

fn error_envelope(message: &str, schema: SchemaVersion) -> MessageEnvelope {
    // A String always serializes.
    let payload = MessagePayload::new(&message)
        .unwrap_or_else(|_| MessagePayload::from_raw(b"\"unserializable error\"".to_vec()));
    MessageEnvelope::new(REMOTE_ERROR_ACTION, schema, payload)
}

/// Serves requests from one connection until the peer hangs up.
pub fn serve_connection<H: RemoteHandler>(
    stream: TcpStream,
    server: Arc<Mutex<RemoteIpcServer<H>>>,
) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    debug!(target: "dut", %peer, "serving connection");
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    while let Some(request) = frame::read_frame(&mut reader)? {
        trace!(target: "dut", action = %request.action, id = %request.id, "request frame");
        let response = lock(&server).respond(request);
        frame::write_frame(&mut writer, &response)?;
    }

    debug!(target: "dut", %peer, "connection closed by peer");
    Ok(())
}

/// Accepts connections forever, one thread per connection.
pub fn serve<H: RemoteHandler + 'static>(
    listener: TcpListener,
    server: Arc<Mutex<RemoteIpcServer<H>>>,
) -> io::Result<()> {
    for stream in listener.incoming() {
        let stream = stream?;
        let server = Arc::clone(&server);
        thread::spawn(move || {
            if let Err(err) = serve_connection(stream, server) {
                warn!(target: "dut", error = %err, "connection failed");
            }
        });
    }
    Ok(())
}
