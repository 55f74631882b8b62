// Timeouts, topics, motor controller configuration
use std::time::Duration;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_VEL: &str = "atrv/cmd/vel"; // twist commands
pub const TOPIC_TELEMETRY: &str = "atrv/state/telemetry"; // controller telemetry
pub const TOPIC_HEALTH: &str = "atrv/state/health"; // health status

// Serial ports for the front and rear MDC2250 controllers
pub const FRONT_PORT: &str = "/dev/tty.USA49Wfd124P2.2";
pub const REAR_PORT: &str = "/dev/tty.USA49Wfd124P1.1";

// Controller-side watchdog: motors halt if no command arrives within this window
pub const WATCHDOG_MS: u32 = 3000;

// Telemetry queried from each controller once connected
pub const TELEMETRY_REQUEST: &str = "C,V,C,A";
pub const TELEMETRY_RATE_MS: u32 = 25;
