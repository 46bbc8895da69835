//! # DUT client
//!
//! Drives POSIX socket calls on a remote device under test and reports
//! what the DUT's kernel said.
//!
//! ## Philosophy
//!
//! - **Report verbatim**: every call is one round trip; no retries, no caching
//! - **Two failure classes**: a failed syscall is data, a broken harness is an error
//! - **Bounded waits**: every call carries a deadline
//! - **Explicit configuration**: a [`DutConfig`] value, never process-wide flags
//!
//! ## Example
//!
//! ```no_run
//! use dut_client::{DutConfig, PanicReporter, Session};
//! use std::net::{IpAddr, Ipv4Addr};
//!
//! let dut = Session::dial(DutConfig::from_env()?, PanicReporter)?;
//! let (fd, port) = dut.create_bound_socket(libc::SOCK_DGRAM, 0, IpAddr::V4(Ipv4Addr::UNSPECIFIED))?;
//! println!("fd {} bound to port {}", fd, port);
//! dut.tear_down();
//! # Ok::<(), dut_client::DutError>(())
//! ```

pub mod address;
pub mod call;
pub mod config;
pub mod error;
mod helpers;
pub mod option;
mod posix;
pub mod report;
pub mod session;

pub use call::{CallResult, OnFailure, Syscall};
pub use config::DutConfig;
pub use error::{ConfigError, DutError, Errno, Result};
pub use option::{OptionValue, Timeval};
pub use report::{FailureReporter, PanicReporter, RecordingReporter, TracingReporter};
pub use session::Session;

/// A descriptor in the DUT's process. Negative values are never valid.
pub type RemoteFd = i32;
