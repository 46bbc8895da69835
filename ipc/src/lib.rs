//! # Message envelopes for remote calls
//!
//! This crate defines the framing shared by the DUT client and the posix
//! server it drives.
//!
//! ## Philosophy
//!
//! - **One envelope, many methods**: every call travels in the same envelope,
//!   the method is named by `action`
//! - **Correlated**: a response carries the id of the request it answers
//! - **Versionable**: payload schemas carry a version checked on receipt
//!
//! The payload itself is type-erased JSON, carried as base64; the typed request and response
//! messages live in `posix_proto`.

pub mod bytes;
pub mod message;

pub use message::{
    Compatibility, MessageEnvelope, MessageId, MessagePayload, SchemaMismatchError,
    SchemaVersion, VersionPolicy,
};
