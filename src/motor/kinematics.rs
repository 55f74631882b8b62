// Differential-drive kinematics for the ATRV skid-steer base
// Converts a body twist (linear m/s, angular rad/s) into motor controller effort units.

use std::f64::consts::PI;

/// Largest effort magnitude the motor controller accepts
pub const MAX_EFFORT: f64 = 1000.0;

/// Motor-to-wheel gear ratio
pub const GEAR_RATIO: f64 = 11.0;

/// ATRV defaults
pub const TRACK_WIDTH: f64 = 0.76; // meters
pub const WHEEL_RADIUS: f64 = 0.203; // meters
pub const MAX_RPM: f64 = 3000.0;
pub const ENCODER_PPR: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("{field} must be strictly positive and finite, got {value}")]
    NonPositive { field: &'static str, value: f64 },
}

/// Physical parameters of the base. Fixed for the lifetime of a vehicle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleGeometry {
    track_width: f64,
    wheel_radius: f64,
    max_rpm: f64,
    encoder_ppr: f64,
}

impl Default for VehicleGeometry {
    fn default() -> Self {
        Self {
            track_width: TRACK_WIDTH,
            wheel_radius: WHEEL_RADIUS,
            max_rpm: MAX_RPM,
            encoder_ppr: ENCODER_PPR,
        }
    }
}

impl VehicleGeometry {
    pub fn new(
        track_width: f64,
        wheel_radius: f64,
        max_rpm: f64,
        encoder_ppr: f64,
    ) -> Result<Self, GeometryError> {
        for (field, value) in [
            ("track_width", track_width),
            ("wheel_radius", wheel_radius),
            ("max_rpm", max_rpm),
            ("encoder_ppr", encoder_ppr),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(GeometryError::NonPositive { field, value });
            }
        }

        Ok(Self {
            track_width,
            wheel_radius,
            max_rpm,
            encoder_ppr,
        })
    }

    pub fn track_width(&self) -> f64 {
        self.track_width
    }

    pub fn wheel_radius(&self) -> f64 {
        self.wheel_radius
    }

    pub fn max_rpm(&self) -> f64 {
        self.max_rpm
    }

    pub fn encoder_ppr(&self) -> f64 {
        self.encoder_ppr
    }

    /// Left and right wheel ground speeds (m/s) for a body twist
    pub fn wheel_speeds(&self, linear_velocity: f64, angular_velocity: f64) -> (f64, f64) {
        let half_track = angular_velocity * self.track_width / 2.0;
        (linear_velocity + half_track, linear_velocity - half_track)
    }

    /// Wheel ground speed (m/s) to wheel rpm
    fn speed_to_rpm(&self, wheel_ms: f64) -> f64 {
        wheel_ms / (2.0 * PI * self.wheel_radius) * 60.0
    }

    /// Wheel rpm to controller effort, as a fraction of max rpm scaled by the gearing
    fn rpm_to_effort(&self, rpm: f64) -> f64 {
        (rpm / self.max_rpm) * MAX_EFFORT * GEAR_RATIO
    }

    /// Convert a body twist into per-side efforts
    ///
    /// # Arguments
    /// * `linear_velocity` - Forward velocity in m/s (positive = forward)
    /// * `angular_velocity` - Rotational velocity in rad/s (positive = counter-clockwise)
    ///
    /// No clamping is applied here; see [`EffortLimit`].
    pub fn twist_to_efforts(&self, linear_velocity: f64, angular_velocity: f64) -> WheelEfforts {
        let (left_ms, right_ms) = self.wheel_speeds(linear_velocity, angular_velocity);
        WheelEfforts {
            left: self.rpm_to_effort(self.speed_to_rpm(left_ms)),
            right: self.rpm_to_effort(self.speed_to_rpm(right_ms)),
        }
    }
}

/// Effort pair sent to both axle controllers
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WheelEfforts {
    pub left: f64,
    pub right: f64,
}

impl WheelEfforts {
    pub fn new(left: f64, right: f64) -> Self {
        Self { left, right }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// True when either side is non-finite or beyond `±limit`
    fn exceeds(&self, limit: f64) -> bool {
        [self.left, self.right]
            .iter()
            .any(|e| !(e.is_finite() && e.abs() <= limit))
    }
}

/// NaN stops the side; infinities saturate
fn clamp_effort(effort: f64) -> f64 {
    if effort.is_nan() {
        0.0
    } else {
        effort.clamp(-MAX_EFFORT, MAX_EFFORT)
    }
}

/// What to do with efforts outside `±MAX_EFFORT`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EffortLimit {
    /// Pass through untouched; range is the caller's responsibility
    #[default]
    Unchecked,
    /// Clamp each side independently; a NaN side is commanded to zero
    Clamp,
    /// Refuse the command, including any non-finite effort
    Reject,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("effort out of range: left={left:.1}, right={right:.1}, limit=±{limit}")]
pub struct EffortOutOfRange {
    pub left: f64,
    pub right: f64,
    pub limit: f64,
}

impl EffortLimit {
    pub fn apply(self, efforts: WheelEfforts) -> Result<WheelEfforts, EffortOutOfRange> {
        match self {
            EffortLimit::Unchecked => Ok(efforts),
            EffortLimit::Clamp => Ok(WheelEfforts {
                left: clamp_effort(efforts.left),
                right: clamp_effort(efforts.right),
            }),
            EffortLimit::Reject if efforts.exceeds(MAX_EFFORT) => Err(EffortOutOfRange {
                left: efforts.left,
                right: efforts.right,
                limit: MAX_EFFORT,
            }),
            EffortLimit::Reject => Ok(efforts),
        }
    }
}
