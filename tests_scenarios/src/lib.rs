//! Scenario Test Utilities
//!
//! Shared bootstrap for end-to-end scenarios against a simulated DUT,
//! either in-process or behind a real TCP posix server.
//!
//! ## Test Philosophy
//!
//! - **Same scenario, both transports**: loopback and TCP must behave alike
//! - **Failures are inspected, not swallowed**: every session records what it reported
//! - **Real deadlines**: timing tests run against a server that never answers

use dut_client::{DutConfig, RecordingReporter, Session};
use remote_ipc::{LoopbackTransport, TcpTransport};
use sim_dut::SimDut;
use std::io;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub type LoopbackSession = Session<LoopbackTransport<SimDut>>;
pub type TcpSession = Session<TcpTransport>;

/// Configuration pointing at a posix server on `addr`.
pub fn config_for(addr: SocketAddr) -> DutConfig {
    DutConfig {
        posix_server_ip: addr.ip().to_string(),
        posix_server_port: addr.port(),
        rpc_timeout: Duration::from_secs(2),
        ..DutConfig::default()
    }
}

/// An in-process session over a fresh simulated DUT.
pub fn loopback_bootstrap() -> (LoopbackSession, Arc<RecordingReporter>) {
    loopback_bootstrap_with(DutConfig::default(), SimDut::new().into_loopback())
}

pub fn loopback_bootstrap_with(
    config: DutConfig,
    transport: LoopbackTransport<SimDut>,
) -> (LoopbackSession, Arc<RecordingReporter>) {
    let reporter = Arc::new(RecordingReporter::new());
    (Session::new(transport, config, reporter.clone()), reporter)
}

/// Starts a TCP posix server backed by a fresh simulated DUT.
///
/// The server runs on a detached thread for the rest of the test process.
pub fn spawn_sim_dut_server() -> io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    let server = Arc::new(Mutex::new(SimDut::new().into_server()));
    thread::spawn(move || {
        if let Err(err) = remote_ipc::serve(listener, server) {
            tracing::warn!(target: "dut", error = %err, "sim DUT server stopped");
        }
    });
    Ok(addr)
}

/// A session connected over TCP to its own simulated DUT.
pub fn tcp_bootstrap() -> io::Result<(TcpSession, Arc<RecordingReporter>)> {
    let addr = spawn_sim_dut_server()?;
    tcp_bootstrap_with(config_for(addr))
}

pub fn tcp_bootstrap_with(config: DutConfig) -> io::Result<(TcpSession, Arc<RecordingReporter>)> {
    let reporter = Arc::new(RecordingReporter::new());
    let session = Session::dial(config, reporter.clone())
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
    Ok((session, reporter))
}

/// Starts a server that accepts connections and reads everything sent to
/// it without ever answering.
pub fn spawn_black_hole() -> io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            thread::spawn(move || {
                let mut stream = stream;
                let _ = io::copy(&mut stream, &mut io::sink());
            });
        }
    });
    Ok(addr)
}

/// 127.0.0.1 on `port`.
pub fn localhost(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}
