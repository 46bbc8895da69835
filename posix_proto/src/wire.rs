//! Address and option payload shapes as they appear on the wire.

use serde::{Deserialize, Serialize};

/// Wire form of `struct sockaddr_in`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SockaddrIn {
    pub family: i32,
    pub port: u32,
    pub addr: Vec<u8>,
}

/// Wire form of `struct sockaddr_in6`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SockaddrIn6 {
    pub family: i32,
    pub port: u32,
    pub flowinfo: u32,
    pub scope_id: u32,
    pub addr: Vec<u8>,
}

/// A socket address of some family.
///
/// `Unknown` stands for any kind this schema version cannot name, and for
/// an address the sender left unset. Receivers decide whether that is an
/// error.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Sockaddr {
    In(SockaddrIn),
    In6(SockaddrIn6),
    #[default]
    #[serde(other)]
    Unknown,
}

impl Sockaddr {
    /// Returns true when no recognized address is present.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Sockaddr::Unknown)
    }
}

/// Wire form of `struct timeval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Timeval {
    pub seconds: i64,
    pub microseconds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sockaddr_tagged_encoding() {
        let addr = Sockaddr::In(SockaddrIn {
            family: 2,
            port: 80,
            addr: vec![10, 0, 0, 1],
        });
        let json = serde_json::to_value(&addr).unwrap();
        assert_eq!(json["kind"], "in");
        assert_eq!(json["port"], 80);
    }

    #[test]
    fn test_unrecognized_kind_decodes_as_unknown() {
        let decoded: Sockaddr =
            serde_json::from_str(r#"{"kind":"un","path":"/tmp/sock"}"#).unwrap();
        assert!(decoded.is_unknown());
    }

    #[test]
    fn test_default_is_unknown() {
        assert_eq!(Sockaddr::default(), Sockaddr::Unknown);
        assert_eq!(Timeval::default(), Timeval { seconds: 0, microseconds: 0 });
    }
}
