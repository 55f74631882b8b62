// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::vehicle::Channel;

// Command from teleop/scripts -> runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct TwistCommand {
    /// m/s, positive = forward
    pub linear: f64,
    /// rad/s, positive = counter-clockwise
    pub angular: f64,
}

impl TwistCommand {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    /// Scale normalized stick/key axes (-1..1) into a twist
    pub fn from_axes(linear_axis: f64, angular_axis: f64, linear_scale: f64, angular_scale: f64) -> Self {
        Self {
            linear: linear_axis * linear_scale,
            angular: angular_axis * angular_scale,
        }
    }
}

/// One telemetry line republished by the runtime
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetrySample {
    pub channel: Channel,
    pub message: String,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    /// A background failure was reported by a controller channel
    Degraded,
}
