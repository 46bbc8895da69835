//! Where fatal test failures go.

use std::panic::Location;
use std::sync::{Arc, Mutex};

/// Receives fatal failures and informational notes for one test.
///
/// `at` is the test code that made the failing call, never a frame inside
/// this crate.
pub trait FailureReporter: Send + Sync {
    fn fatal(&self, at: &'static Location<'static>, message: &str);

    fn note(&self, message: &str);
}

impl<R: FailureReporter + ?Sized> FailureReporter for Arc<R> {
    fn fatal(&self, at: &'static Location<'static>, message: &str) {
        (**self).fatal(at, message)
    }

    fn note(&self, message: &str) {
        (**self).note(message)
    }
}

/// Logs failures and leaves control flow to the returned `Err`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl FailureReporter for TracingReporter {
    fn fatal(&self, at: &'static Location<'static>, message: &str) {
        tracing::error!(target: "dut", location = %at, "{}", message);
    }

    fn note(&self, message: &str) {
        tracing::info!(target: "dut", "{}", message);
    }
}

/// Ends the current test thread on the first fatal failure.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicReporter;

impl FailureReporter for PanicReporter {
    fn fatal(&self, at: &'static Location<'static>, message: &str) {
        panic!("{}: {}", at, message);
    }

    fn note(&self, message: &str) {
        tracing::info!(target: "dut", "{}", message);
    }
}

/// A fatal failure captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub file: &'static str,
    pub line: u32,
    pub message: String,
}

/// Keeps everything it is told, for assertions.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    fatals: Mutex<Vec<Recorded>>,
    notes: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fatals(&self) -> Vec<Recorded> {
        self.fatals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn notes(&self) -> Vec<String> {
        self.notes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn fatal_count(&self) -> usize {
        self.fatals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

impl FailureReporter for RecordingReporter {
    fn fatal(&self, at: &'static Location<'static>, message: &str) {
        self.fatals
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(Recorded {
                file: at.file(),
                line: at.line(),
                message: message.to_string(),
            });
    }

    fn note(&self, message: &str) {
        self.notes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.to_string());
    }
}
