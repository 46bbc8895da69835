//! Socket option values and their wire forms.
//!
//! Byte and integer values cross the wire untouched, so integer options
//! assume the DUT shares the controller's width and byte order. When that
//! does not hold, use the raw byte calls and lay the bytes out by hand.

use posix_proto::Timeval as WireTimeval;
use std::time::Duration;

/// `struct timeval` with 64-bit fields on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Timeval {
    pub sec: i64,
    pub usec: i64,
}

impl Timeval {
    pub const fn new(sec: i64, usec: i64) -> Self {
        Self { sec, usec }
    }

    /// Splits a duration, saturating seconds beyond `i64::MAX`.
    pub fn from_duration(duration: Duration) -> Self {
        Self {
            sec: i64::try_from(duration.as_secs()).unwrap_or(i64::MAX),
            usec: i64::from(duration.subsec_micros()),
        }
    }

    /// The duration this value denotes, if it is non-negative and normalized.
    pub fn to_duration(self) -> Option<Duration> {
        let sec = u64::try_from(self.sec).ok()?;
        let usec = u64::try_from(self.usec).ok().filter(|usec| *usec < 1_000_000)?;
        Some(Duration::from_secs(sec) + Duration::from_micros(usec))
    }
}

pub fn timeval_to_wire(tv: Timeval) -> WireTimeval {
    WireTimeval {
        seconds: tv.sec,
        microseconds: tv.usec,
    }
}

pub fn timeval_from_wire(tv: WireTimeval) -> Timeval {
    Timeval {
        sec: tv.seconds,
        usec: tv.microseconds,
    }
}

/// A socket option value of one of the shapes the DUT understands.
///
/// Which shape fits a given (level, name) pair is the caller's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    Bytes(Vec<u8>),
    Int(i32),
    Timeval(Timeval),
}

impl OptionValue {
    /// The value laid out in the controller's native representation.
    pub fn to_ne_bytes(&self) -> Vec<u8> {
        match self {
            OptionValue::Bytes(bytes) => bytes.clone(),
            OptionValue::Int(value) => value.to_ne_bytes().to_vec(),
            OptionValue::Timeval(tv) => {
                let mut bytes = tv.sec.to_ne_bytes().to_vec();
                bytes.extend_from_slice(&tv.usec.to_ne_bytes());
                bytes
            }
        }
    }
}

impl From<i32> for OptionValue {
    fn from(value: i32) -> Self {
        OptionValue::Int(value)
    }
}

impl From<Timeval> for OptionValue {
    fn from(value: Timeval) -> Self {
        OptionValue::Timeval(value)
    }
}

impl From<Vec<u8>> for OptionValue {
    fn from(value: Vec<u8>) -> Self {
        OptionValue::Bytes(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_timeval_duration() {
        let tv = Timeval::from_duration(Duration::from_millis(1_500));
        assert_eq!(tv, Timeval::new(1, 500_000));
        assert_eq!(tv.to_duration(), Some(Duration::from_millis(1_500)));
        assert_eq!(Timeval::new(-1, 0).to_duration(), None);
        assert_eq!(Timeval::new(0, 1_000_000).to_duration(), None);
    }

    #[test]
    fn test_option_value_bytes() {
        assert_eq!(OptionValue::Int(7).to_ne_bytes(), 7i32.to_ne_bytes().to_vec());
        assert_eq!(OptionValue::from(vec![1, 2]).to_ne_bytes(), vec![1, 2]);
        assert_eq!(OptionValue::from(Timeval::new(1, 2)).to_ne_bytes().len(), 16);
    }

    proptest! {
        #[test]
        fn prop_timeval_round_trip(sec in any::<i64>(), usec in any::<i64>()) {
            let tv = Timeval::new(sec, usec);
            prop_assert_eq!(timeval_from_wire(timeval_to_wire(tv)), tv);
        }
    }
}
