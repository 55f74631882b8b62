// Motor control module for the ATRV skid-steer base
//
// Provides:
// - Differential-drive kinematics (body twist -> wheel efforts)
// - The motor controller capability trait
// - Roboteq MDC2250 serial driver

pub mod controller;
pub mod kinematics;
pub mod mdc2250;

pub use controller::{ControllerError, LineCallback, MotorController};
pub use kinematics::{EffortLimit, EffortOutOfRange, GeometryError, VehicleGeometry, WheelEfforts};
pub use mdc2250::Mdc2250;
