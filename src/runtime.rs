// 50 Hz loop with watchdog
// Note: this watchdog is ours, on top of the controller watchdog. If teleop stops
// publishing, the base is commanded to zero instead of repeating the last twist.

use crossbeam_channel::{Receiver, TrySendError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{error, info, warn};

use crate::callbacks::HandlerError;
use crate::config::{
    CMD_TIMEOUT, FRONT_PORT, LOOP_HZ, REAR_PORT, TOPIC_CMD_VEL, TOPIC_HEALTH, TOPIC_TELEMETRY,
    WATCHDOG_MS,
};
use crate::error::AsyncFailure;
use crate::messages::{RuntimeHealth, TelemetrySample, TwistCommand};
use crate::motor::Mdc2250;
use crate::vehicle::{Channel, Vehicle, VehicleOptions};

/// Telemetry lines buffered between controller readers and the publish loop
const TELEMETRY_QUEUE: usize = 256;

#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub front_port: String,
    pub rear_port: String,
    pub watchdog_ms: u32,
    pub echo: bool,
    pub vehicle: VehicleOptions,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            front_port: FRONT_PORT.to_string(),
            rear_port: REAR_PORT.to_string(),
            watchdog_ms: WATCHDOG_MS,
            echo: true,
            vehicle: VehicleOptions::default(),
        }
    }
}

pub struct Runtime {
    latest_cmd: Option<TwistCommand>,
    cmd_received_at: Instant,
    health: RuntimeHealth,
    degraded: bool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            latest_cmd: None,
            cmd_received_at: Instant::now(),
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            degraded: false,
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    /// Process incoming command
    pub fn on_command(&mut self, cmd: TwistCommand) {
        info!("Received command: {:?}", &cmd);
        self.latest_cmd = Some(cmd);
        self.cmd_received_at = Instant::now();
    }

    /// A controller reported a background failure; sticky until restart
    pub fn on_failure(&mut self, failure: &AsyncFailure) {
        error!("Background failure: {}", failure);
        self.degraded = true;
    }

    /// Compute the twist to apply based on watchdog state
    pub fn compute_twist(&mut self) -> TwistCommand {
        let cmd_age = self.cmd_received_at.elapsed();

        let (health, twist) = if cmd_age > CMD_TIMEOUT {
            // Watchdog triggered - stop the robot
            if self.health != RuntimeHealth::CmdStale {
                warn!("Command stale ({:?} old), stopping robot", cmd_age);
            }
            (RuntimeHealth::CmdStale, TwistCommand::default())
        } else if let Some(cmd) = self.latest_cmd {
            (RuntimeHealth::Ok, cmd)
        } else {
            // No command ever received
            (RuntimeHealth::CmdStale, TwistCommand::default())
        };

        self.health = if self.degraded && health == RuntimeHealth::Ok {
            RuntimeHealth::Degraded
        } else {
            health
        };
        twist
    }
}

/// Build the serial vehicle, with telemetry fanned into a queue for publishing
fn build_vehicle(
    options: &RuntimeOptions,
) -> (Vehicle<Mdc2250>, Receiver<TelemetrySample>) {
    let (tx, rx) = crossbeam_channel::bounded(TELEMETRY_QUEUE);
    let mut vehicle = Vehicle::serial(options.vehicle.clone());

    vehicle.set_telemetry_handler(
        move |channel: Channel, message: &str| -> Result<(), HandlerError> {
            let sample = TelemetrySample {
                channel,
                message: message.to_string(),
            };
            match tx.try_send(sample) {
                // Publisher is behind; drop the sample rather than block the reader
                Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
                Err(e) => Err(e.into()),
            }
        },
    );

    (vehicle, rx)
}

pub async fn run(options: RuntimeOptions) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (vehicle, telemetry) = build_vehicle(&options);
    let failures = vehicle.background_failures();
    let vehicle = Arc::new(vehicle);

    info!("Connecting motor controllers...");
    let connecting = vehicle.clone();
    let connect_options = options.clone();
    tokio::task::spawn_blocking(move || {
        connecting.connect(
            &connect_options.front_port,
            &connect_options.rear_port,
            connect_options.watchdog_ms,
            connect_options.echo,
        )
    })
    .await??;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let subscriber = session.declare_subscriber(TOPIC_CMD_VEL).await?;
    let pub_telemetry = session.declare_publisher(TOPIC_TELEMETRY).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut runtime = Runtime::new();
    let mut tick = interval(Duration::from_millis(1000 / LOOP_HZ));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}", TOPIC_CMD_VEL);
    info!("Publishing to: {}, {}", TOPIC_TELEMETRY, TOPIC_HEALTH);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
        }

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = subscriber.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<TwistCommand>(&payload) {
                Ok(cmd) => runtime.on_command(cmd),
                Err(e) => warn!("Failed to parse command: {}", e),
            }
        }

        // 2. Background failures are logged and degrade health; the loop keeps running
        for failure in failures.try_iter() {
            runtime.on_failure(&failure);
        }

        // 3. Apply twist (includes watchdog logic)
        let twist = runtime.compute_twist();
        if let Err(e) = vehicle.move_base(twist.linear, twist.angular) {
            warn!("Rejected command {:?}: {}", twist, e);
        }

        // 4. Publish telemetry and health
        for sample in telemetry.try_iter() {
            pub_telemetry.put(serde_json::to_string(&sample)?).await?;
        }
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
    }

    if let Err(e) = vehicle.stop() {
        warn!("Failed to stop base: {}", e);
    }
    let disconnecting = vehicle.clone();
    tokio::task::spawn_blocking(move || disconnecting.disconnect()).await??;
    info!("Motor controllers disconnected");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stale_until_first_command() {
        let mut runtime = Runtime::new();
        // cmd_received_at is "now", but no command has arrived yet
        assert_eq!(runtime.compute_twist(), TwistCommand::default());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_fresh_command_applied() {
        let mut runtime = Runtime::new();
        runtime.on_command(TwistCommand::new(0.4, 0.1));
        assert_eq!(runtime.compute_twist(), TwistCommand::new(0.4, 0.1));
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_watchdog_zeroes_stale_command() {
        let mut runtime = Runtime::new();
        runtime.on_command(TwistCommand::new(0.4, 0.1));
        std::thread::sleep(CMD_TIMEOUT + Duration::from_millis(50));
        assert_eq!(runtime.compute_twist(), TwistCommand::default());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_failure_degrades_health() {
        let mut runtime = Runtime::new();
        runtime.on_failure(&AsyncFailure::Telemetry {
            channel: Channel::Front,
            reason: "bad line".to_string(),
        });
        runtime.on_command(TwistCommand::new(0.2, 0.0));
        runtime.compute_twist();
        assert_eq!(runtime.health(), RuntimeHealth::Degraded);
    }
}
