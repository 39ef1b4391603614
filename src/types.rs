//! Core types shared by the manager, the service link and consumers.

use crate::error::LocationError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A location fix delivered by the service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude in degrees (-90 to 90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to 180).
    pub longitude: f64,
    /// Altitude in meters above sea level, if available.
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters, if available.
    pub accuracy: Option<f64>,
    /// Ground speed in meters per second, if available.
    pub speed: Option<f64>,
    /// Bearing in degrees, if available.
    pub bearing: Option<f64>,
    /// Time the fix was taken.
    pub timestamp: Timestamp,
}

impl Location {
    /// A bare fix with only coordinates and time.
    pub fn new(latitude: f64, longitude: f64, timestamp: Timestamp) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            speed: None,
            bearing: None,
            timestamp,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Strictly newer than `other`. Equal timestamps are not newer.
    pub fn is_newer_than(&self, other: &Location) -> bool {
        self.timestamp > other.timestamp
    }
}

/// Status codes reported to the consumer.
///
/// The numeric values are part of the wire contract with native
/// integrations and must not be reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Status {
    Disconnected = 0,
    Connected = 1,
    ConnectionError = 2,
    ConnectionSuspended = 3,
    RequestSuccess = 4,
    RequestFail = 5,
}

impl Status {
    /// Numeric wire code.
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl TryFrom<i32> for Status {
    type Error = LocationError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Status::Disconnected),
            1 => Ok(Status::Connected),
            2 => Ok(Status::ConnectionError),
            3 => Ok(Status::ConnectionSuspended),
            4 => Ok(Status::RequestSuccess),
            5 => Ok(Status::RequestFail),
            other => Err(LocationError::InvalidStatus(other)),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Disconnected => "disconnected",
            Status::Connected => "connected",
            Status::ConnectionError => "connection error",
            Status::ConnectionSuspended => "connection suspended",
            Status::RequestSuccess => "request success",
            Status::RequestFail => "request fail",
        };
        f.write_str(name)
    }
}

/// State of the connection to the location service, as tracked by the manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Suspended,
    Failed,
}

impl ConnectionState {
    /// Whether a new connect attempt should be issued from this state.
    ///
    /// A suspended connection is restored by the service itself.
    pub fn needs_connect(self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        let all = [
            Status::Disconnected,
            Status::Connected,
            Status::ConnectionError,
            Status::ConnectionSuspended,
            Status::RequestSuccess,
            Status::RequestFail,
        ];
        for (expected, status) in all.iter().enumerate() {
            assert_eq!(status.code(), expected as i32);
            assert_eq!(Status::try_from(expected as i32).unwrap(), *status);
        }
    }

    #[test]
    fn test_unknown_status_code() {
        assert!(matches!(
            Status::try_from(6),
            Err(LocationError::InvalidStatus(6))
        ));
        assert!(Status::try_from(-1).is_err());
    }

    #[test]
    fn test_location_newer() {
        let old = Location::new(1.0, 2.0, Timestamp(100));
        let new = Location::new(1.0, 2.0, Timestamp(150));
        assert!(new.is_newer_than(&old));
        assert!(!old.is_newer_than(&new));
        assert!(!old.is_newer_than(&old.clone()));
    }

    #[test]
    fn test_connect_needed_states() {
        assert!(ConnectionState::Disconnected.needs_connect());
        assert!(ConnectionState::Failed.needs_connect());
        assert!(!ConnectionState::Suspended.needs_connect());
        assert!(!ConnectionState::Connecting.needs_connect());
        assert!(!ConnectionState::Connected.needs_connect());
    }
}
