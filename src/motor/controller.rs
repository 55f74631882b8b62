// Capability every axle motor controller driver must provide
//
// The vehicle only talks to hardware through this trait, so the serial driver
// can be swapped for a simulated one in tests.

/// Callback receiving one line of driver output (log text or telemetry)
pub type LineCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Error types surfaced by a motor controller driver
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("No response from controller on {port}")]
    NoResponse { port: String },

    #[error("Controller not connected")]
    NotConnected,

    #[error("Controller rejected request: {reason}")]
    Device { reason: String },
}

impl ControllerError {
    /// Stable numeric code for programmatic dispatch
    pub fn code(&self) -> i32 {
        match self {
            ControllerError::Serial(_) => 1,
            ControllerError::Io(_) => 2,
            ControllerError::NoResponse { .. } => 3,
            ControllerError::NotConnected => 4,
            ControllerError::Device { .. } => 5,
        }
    }
}

/// One motor controller channel driving a left/right motor pair
pub trait MotorController: Send {
    /// Open the link and configure the controller watchdog (milliseconds)
    fn connect(&mut self, port: &str, watchdog_ms: u32, echo: bool) -> Result<(), ControllerError>;

    /// Close the link. Closing an unconnected controller must succeed.
    fn disconnect(&mut self) -> Result<(), ControllerError>;

    /// Fire-and-forget effort command for both motors.
    ///
    /// No acknowledgment is awaited; failures are the driver's to report
    /// through its info callback.
    fn command_motors(&mut self, left_effort: f64, right_effort: f64);

    /// Start repeating queries (comma separated, e.g. `"C,V,C,A"`) every
    /// `sample_rate_ms` and deliver each reply line to `callback`
    fn set_telemetry(&mut self, request: &str, sample_rate_ms: u32, callback: LineCallback);

    /// Route the driver's informational messages
    fn set_info_handler(&mut self, callback: LineCallback);

    /// Route failures the driver detects on its own threads after connecting.
    /// Drivers without background work may ignore it.
    fn set_failure_handler(&mut self, _callback: LineCallback) {}
}
