//! Message types and envelope structure

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new random message ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a message ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Msg({})", self.0)
    }
}

/// Schema version for message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Major version (breaking changes)
    pub major: u32,
    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl SchemaVersion {
    /// Creates a new schema version
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Same major version = compatible
    pub fn is_compatible_with(&self, other: &SchemaVersion) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}", self.major, self.minor)
    }
}

/// Compatibility result for version checking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Versions are compatible
    Compatible,
    /// Sender version is too old, upgrade required
    UpgradeRequired,
    /// Sender version is newer than anything the receiver understands
    Unsupported,
}

/// Range of schema versions a receiver accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionPolicy {
    current: SchemaVersion,
    min_major: u32,
}

impl VersionPolicy {
    /// Creates a version policy accepting only the current major version
    pub const fn current(version: SchemaVersion) -> Self {
        Self {
            current: version,
            min_major: version.major,
        }
    }

    /// Sets the minimum supported major version
    pub const fn with_min_major(mut self, min_major: u32) -> Self {
        self.min_major = min_major;
        self
    }

    /// Checks if an incoming schema version is compatible
    pub fn check_compatibility(&self, incoming: &SchemaVersion) -> Compatibility {
        if incoming.major > self.current.major {
            return Compatibility::Unsupported;
        }
        if incoming.major < self.min_major {
            return Compatibility::UpgradeRequired;
        }
        Compatibility::Compatible
    }

    /// Checks an envelope, producing a mismatch error naming its action
    pub fn check_envelope(&self, envelope: &MessageEnvelope) -> Result<(), SchemaMismatchError> {
        match self.check_compatibility(&envelope.schema_version) {
            Compatibility::Compatible => Ok(()),
            Compatibility::UpgradeRequired => Err(SchemaMismatchError::UpgradeRequired {
                action: envelope.action.clone(),
                expected_min: self.min_version(),
                received: envelope.schema_version,
            }),
            Compatibility::Unsupported => Err(SchemaMismatchError::Unsupported {
                action: envelope.action.clone(),
                current: self.current,
                received: envelope.schema_version,
            }),
        }
    }

    /// Returns the current version
    pub fn current_version(&self) -> SchemaVersion {
        self.current
    }

    /// Returns the minimum supported version
    pub fn min_version(&self) -> SchemaVersion {
        SchemaVersion::new(self.min_major, 0)
    }
}

/// Error when schema versions don't match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaMismatchError {
    UpgradeRequired {
        action: String,
        expected_min: SchemaVersion,
        received: SchemaVersion,
    },
    Unsupported {
        action: String,
        current: SchemaVersion,
        received: SchemaVersion,
    },
}

impl fmt::Display for SchemaMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaMismatchError::UpgradeRequired {
                action,
                expected_min,
                received,
            } => write!(
                f,
                "schema version too old for {}: received {}, expected at least {}",
                action, received, expected_min
            ),
            SchemaMismatchError::Unsupported {
                action,
                current,
                received,
            } => write!(
                f,
                "schema version not supported for {}: received {}, newest known {}",
                action, received, current
            ),
        }
    }
}

impl std::error::Error for SchemaMismatchError {}

/// Message envelope carrying one request or response
///
/// The payload is type-erased so transports can move envelopes without
/// knowing the method's message types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Unique identifier for this message
    pub id: MessageId,
    /// Method being invoked (or answered)
    pub action: String,
    /// Schema version of the payload
    pub schema_version: SchemaVersion,
    /// Request this message answers, set on responses
    pub correlation_id: Option<MessageId>,
    /// Serialized payload
    pub payload: MessagePayload,
}

impl MessageEnvelope {
    /// Creates a new message envelope
    pub fn new(
        action: impl Into<String>,
        schema_version: SchemaVersion,
        payload: MessagePayload,
    ) -> Self {
        Self {
            id: MessageId::new(),
            action: action.into(),
            schema_version,
            correlation_id: None,
            payload,
        }
    }

    /// Sets the correlation ID (for responses)
    pub fn with_correlation(mut self, correlation_id: MessageId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Checks if this is a response to another message
    pub fn is_response(&self) -> bool {
        self.correlation_id.is_some()
    }

    /// Checks if this is the response to `request`
    pub fn answers(&self, request: &MessageId) -> bool {
        self.correlation_id.as_ref() == Some(request)
    }

    /// Serializes the whole envelope for a byte-oriented transport
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses an envelope produced by [`MessageEnvelope::to_bytes`]
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// Type-erased message payload (JSON)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(with = "crate::bytes")]
    data: Vec<u8>,
}

impl MessagePayload {
    /// Creates a new payload from serializable data
    pub fn new<T: Serialize>(data: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_vec(data)?;
        Ok(Self { data: json })
    }

    /// Deserializes the payload into a specific type
    pub fn deserialize<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.data)
    }

    /// Returns the raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Wraps bytes that are already JSON
    pub fn from_raw(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ping {
        seq: u32,
    }

    #[test]
    fn test_message_id_creation() {
        let id1 = MessageId::new();
        let id2 = MessageId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_message_id_display() {
        let id = MessageId::new();
        assert!(format!("{}", id).starts_with("Msg("));
    }

    #[test]
    fn test_schema_version_compatibility() {
        let v1_0 = SchemaVersion::new(1, 0);
        let v1_3 = SchemaVersion::new(1, 3);
        let v2_0 = SchemaVersion::new(2, 0);

        assert!(v1_0.is_compatible_with(&v1_3));
        assert!(!v1_0.is_compatible_with(&v2_0));
        assert_eq!(format!("{}", v1_3), "v1.3");
    }

    #[test]
    fn test_message_payload_serialization() {
        let payload = MessagePayload::new(&Ping { seq: 7 }).unwrap();
        let decoded: Ping = payload.deserialize().unwrap();
        assert_eq!(decoded, Ping { seq: 7 });
        assert_eq!(payload.as_bytes(), br#"{"seq":7}"#);
    }

    #[test]
    fn test_message_envelope_with_correlation() {
        let request = MessageEnvelope::new(
            "Posix/Close",
            SchemaVersion::new(1, 0),
            MessagePayload::new(&Ping { seq: 1 }).unwrap(),
        );
        assert!(!request.is_response());

        let response = MessageEnvelope::new(
            "Posix/Close",
            SchemaVersion::new(1, 0),
            MessagePayload::new(&Ping { seq: 2 }).unwrap(),
        )
        .with_correlation(request.id);

        assert!(response.is_response());
        assert!(response.answers(&request.id));
        assert!(!response.answers(&MessageId::new()));
    }

    #[test]
    fn test_envelope_bytes() {
        let envelope = MessageEnvelope::new(
            "Posix/Listen",
            SchemaVersion::new(1, 0),
            MessagePayload::new(&Ping { seq: 3 }).unwrap(),
        );
        let bytes = envelope.to_bytes().unwrap();
        let decoded = MessageEnvelope::from_bytes(&bytes).unwrap();

        assert_eq!(decoded.id, envelope.id);
        assert_eq!(decoded.action, "Posix/Listen");
        assert_eq!(decoded.payload, envelope.payload);
        assert!(MessageEnvelope::from_bytes(b"{not json").is_err());
    }

    #[test]
    fn test_version_policy_current_only() {
        let policy = VersionPolicy::current(SchemaVersion::new(2, 1));

        assert_eq!(
            policy.check_compatibility(&SchemaVersion::new(2, 0)),
            Compatibility::Compatible
        );
        assert_eq!(
            policy.check_compatibility(&SchemaVersion::new(2, 9)),
            Compatibility::Compatible
        );
        assert_eq!(
            policy.check_compatibility(&SchemaVersion::new(1, 5)),
            Compatibility::UpgradeRequired
        );
        assert_eq!(
            policy.check_compatibility(&SchemaVersion::new(3, 0)),
            Compatibility::Unsupported
        );
    }

    #[test]
    fn test_version_policy_with_minimum() {
        let policy = VersionPolicy::current(SchemaVersion::new(3, 0)).with_min_major(2);

        assert_eq!(
            policy.check_compatibility(&SchemaVersion::new(2, 4)),
            Compatibility::Compatible
        );
        assert_eq!(
            policy.check_compatibility(&SchemaVersion::new(1, 0)),
            Compatibility::UpgradeRequired
        );
        assert_eq!(policy.min_version(), SchemaVersion::new(2, 0));
        assert_eq!(policy.current_version(), SchemaVersion::new(3, 0));
    }

    #[test]
    fn test_check_envelope_names_action() {
        let policy = VersionPolicy::current(SchemaVersion::new(1, 0));
        let envelope = MessageEnvelope::new(
            "Posix/Socket",
            SchemaVersion::new(4, 0),
            MessagePayload::new(&Ping { seq: 0 }).unwrap(),
        );

        let err = policy.check_envelope(&envelope).unwrap_err();
        assert!(matches!(err, SchemaMismatchError::Unsupported { .. }));
        assert!(err.to_string().contains("Posix/Socket"));
    }
}
