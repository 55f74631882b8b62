// Error types for the dual-channel vehicle

use std::fmt;

use crate::motor::kinematics::EffortOutOfRange;
use crate::vehicle::Channel;

/// Which coordinated operation produced a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Disconnect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Connect => write!(f, "Connecting to the ATRV"),
            Operation::Disconnect => write!(f, "Disconnecting from the ATRV"),
        }
    }
}

/// Failure of a single channel during connect/disconnect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFailure {
    pub channel: Channel,
    pub message: String,
    /// Driver error code, 0 when unknown
    pub code: i32,
}

/// One or both channels failed to connect or disconnect.
///
/// Channels that succeeded are left as they are; a failed connect is not
/// rolled back.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{operation}: {}", format_failures(.failures))]
pub struct ConnectionFailure {
    operation: Operation,
    failures: Vec<ChannelFailure>,
}

impl ConnectionFailure {
    pub fn new(operation: Operation, failures: Vec<ChannelFailure>) -> Self {
        Self {
            operation,
            failures,
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn failures(&self) -> &[ChannelFailure] {
        &self.failures
    }

    pub fn failed_channels(&self) -> Vec<Channel> {
        self.failures.iter().map(|f| f.channel).collect()
    }

    /// Message recorded for `channel`, if it failed
    pub fn message(&self, channel: Channel) -> Option<&str> {
        self.failures
            .iter()
            .find(|f| f.channel == channel)
            .map(|f| f.message.as_str())
    }

    /// Numeric code of the first failing channel
    pub fn error_type(&self) -> i32 {
        self.failures.first().map_or(0, |f| f.code)
    }
}

fn format_failures(failures: &[ChannelFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} mdc2250: {}", f.channel, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failure raised off the caller's stack, e.g. inside a telemetry handler
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AsyncFailure {
    #[error("{channel} telemetry handler failed: {reason}")]
    Telemetry { channel: Channel, reason: String },

    /// The driver lost its link after connecting, e.g. the reader hit an I/O error
    #[error("{channel} link failed: {reason}")]
    Link { channel: Channel, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum VehicleError {
    #[error(transparent)]
    Connection(#[from] ConnectionFailure),

    #[error(transparent)]
    EffortOutOfRange(#[from] EffortOutOfRange),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rear_failure() -> ChannelFailure {
        ChannelFailure {
            channel: Channel::Rear,
            message: "No such file or directory".to_string(),
            code: 1,
        }
    }

    #[test]
    fn test_single_channel_display() {
        let err = ConnectionFailure::new(Operation::Connect, vec![rear_failure()]);
        assert_eq!(
            err.to_string(),
            "Connecting to the ATRV: rear mdc2250: No such file or directory"
        );
        assert_eq!(err.failed_channels(), vec![Channel::Rear]);
        assert_eq!(err.message(Channel::Front), None);
        assert_eq!(err.error_type(), 1);
    }

    #[test]
    fn test_both_channels_display() {
        let front = ChannelFailure {
            channel: Channel::Front,
            message: "timeout".to_string(),
            code: 3,
        };
        let err = ConnectionFailure::new(Operation::Disconnect, vec![front, rear_failure()]);
        let msg = err.to_string();
        assert!(msg.starts_with("Disconnecting from the ATRV: front mdc2250: timeout; rear"));
        assert_eq!(err.error_type(), 3);
        assert_eq!(err.message(Channel::Front), Some("timeout"));
    }

    #[test]
    fn test_vehicle_error_from() {
        let err: VehicleError = ConnectionFailure::new(Operation::Connect, vec![]).into();
        assert!(matches!(err, VehicleError::Connection(_)));
        assert_eq!(
            ConnectionFailure::new(Operation::Connect, vec![]).error_type(),
            0
        );
    }

    #[test]
    fn test_async_failure_display() {
        let failure = AsyncFailure::Telemetry {
            channel: Channel::Front,
            reason: "parse error".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "front telemetry handler failed: parse error"
        );

        let failure = AsyncFailure::Link {
            channel: Channel::Rear,
            reason: "Broken pipe".to_string(),
        };
        assert_eq!(failure.to_string(), "rear link failed: Broken pipe");
    }
}
