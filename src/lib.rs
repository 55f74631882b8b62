pub mod callbacks;
pub mod config;
pub mod error;
pub mod messages;
pub mod motor;
pub mod runtime;
pub mod vehicle;

pub use callbacks::{CallbackSet, ExceptionHandler, HandlerError, InfoHandler, TelemetryHandler};
pub use error::{AsyncFailure, ChannelFailure, ConnectionFailure, Operation, VehicleError};
pub use vehicle::{Channel, ChannelHandle, ConnectionOutcome, Vehicle, VehicleOptions};
