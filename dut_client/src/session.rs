//! The session handle.

use crate::call::{CallResult, OnFailure, Syscall};
use crate::config::DutConfig;
use crate::error::{DutError, Result};
use crate::report::{FailureReporter, TracingReporter};
use posix_proto::PosixMethod;
use remote_ipc::{RemoteTransport, TcpTransport, TransportError};
use std::panic::Location;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One test's connection to the DUT and its failure sink.
///
/// Calls take `&self` and may run from several threads at once. A session
/// belongs to a single test; hand it to [`Session::tear_down`] on every
/// exit path.
pub struct Session<T: RemoteTransport = TcpTransport> {
    transport: T,
    reporter: Box<dyn FailureReporter>,
    config: DutConfig,
}

impl Session<TcpTransport> {
    /// Dials the configured posix server.
    #[track_caller]
    pub fn dial(config: DutConfig, reporter: impl FailureReporter + 'static) -> Result<Self> {
        let at = Location::caller();
        let addr = match config.server_address() {
            Ok(addr) => addr,
            Err(err) => {
                let err = DutError::from(err);
                reporter.fatal(at, &err.to_string());
                return Err(err);
            }
        };
        match TcpTransport::connect(addr, config.rpc_keepalive) {
            Ok(transport) => {
                info!(target: "dut", %addr, keepalive = ?config.rpc_keepalive, "connected to posix server");
                Ok(Self::new(transport, config, reporter))
            }
            Err(source) => {
                let err = DutError::Transport {
                    method: "connect".to_string(),
                    source,
                };
                reporter.fatal(at, &err.to_string());
                Err(err)
            }
        }
    }
}

impl<T: RemoteTransport> Session<T> {
    pub fn new(transport: T, config: DutConfig, reporter: impl FailureReporter + 'static) -> Self {
        Self {
            transport,
            reporter: Box::new(reporter),
            config,
        }
    }

    /// A session with default configuration that logs failures.
    pub fn with_transport(transport: T) -> Self {
        Self::new(transport, DutConfig::default(), TracingReporter)
    }

    pub fn config(&self) -> &DutConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Deadline used by the calls that don't take one.
    pub fn default_timeout(&self) -> Duration {
        self.config.rpc_timeout
    }

    /// Releases the transport.
    pub fn tear_down(self) {
        self.transport.close();
        info!(target: "dut", "session torn down");
    }

    /// Issues `request` and applies `policy` to the outcome.
    #[track_caller]
    pub fn call<S: Syscall>(
        &self,
        request: &S,
        timeout: Duration,
        policy: OnFailure,
    ) -> Result<CallResult<S::Output>> {
        let result = self.invoke(request, timeout)?;
        self.complete(S::OP, result, policy)
    }

    /// One round trip: encode, send with `timeout`, check correlation, decode.
    ///
    /// Remote failures come back as data; every local failure is reported to
    /// the sink and returned as `Err`.
    #[track_caller]
    pub fn invoke<S: Syscall>(&self, request: &S, timeout: Duration) -> Result<CallResult<S::Output>> {
        let method = S::METHOD;
        let envelope = match request.into_envelope() {
            Ok(envelope) => envelope,
            Err(err) => {
                return Err(self.fatal(DutError::Transport {
                    method: method.to_string(),
                    source: TransportError::Codec(err.to_string()),
                }))
            }
        };
        let request_id = envelope.id;
        debug!(target: "dut", method, deadline = ?timeout, "calling");

        let response = match self.transport.call(envelope, timeout) {
            Ok(response) => response,
            Err(source) => {
                warn!(target: "dut", method, error = %source, "transport failure");
                return Err(self.fatal(DutError::Transport {
                    method: method.to_string(),
                    source,
                }));
            }
        };
        if !response.answers(&request_id) {
            return Err(self.fatal(DutError::MalformedResponse {
                method: method.to_string(),
                reason: format!("response does not answer request {}", request_id),
            }));
        }
        let decoded: S::Response = match response.payload.deserialize() {
            Ok(decoded) => decoded,
            Err(err) => {
                return Err(self.fatal(DutError::MalformedResponse {
                    method: method.to_string(),
                    reason: err.to_string(),
                }))
            }
        };
        let result = match S::decode(decoded) {
            Ok(result) => result,
            Err(err) => return Err(self.fatal(err)),
        };

        debug!(target: "dut", method, ret = result.ret, errno = result.errno.raw(), "returned");
        Ok(result)
    }

    /// Applies `policy` to a finished call.
    #[track_caller]
    pub fn complete<O>(
        &self,
        op: &'static str,
        result: CallResult<O>,
        policy: OnFailure,
    ) -> Result<CallResult<O>> {
        if !result.failed() {
            return Ok(result);
        }
        match policy {
            OnFailure::Fatal => Err(self.fatal(DutError::Posix {
                op,
                errno: result.errno,
            })),
            OnFailure::ReturnErrno => {
                self.reporter
                    .note(&format!("{} returned {}: {}", op, result.ret, result.errno));
                Ok(result)
            }
        }
    }

    /// Reports `error` against the calling test and hands it back.
    #[track_caller]
    pub(crate) fn fatal(&self, error: DutError) -> DutError {
        self.reporter.fatal(Location::caller(), &error.to_string());
        error
    }
}
