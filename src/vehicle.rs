//! Dual-channel ATRV base.
//!
//! The ATRV is driven by two MDC2250 controllers, one per axle. [`Vehicle`]
//! presents them as a single differential-drive base: connect and disconnect
//! run on both channels concurrently and report per-channel failures, and every
//! motion command is mirrored to front and rear.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info, warn};

use crate::callbacks::{CallbackSet, ExceptionHandler, InfoHandler, TelemetryHandler};
use crate::config::{TELEMETRY_RATE_MS, TELEMETRY_REQUEST};
use crate::error::{AsyncFailure, ChannelFailure, ConnectionFailure, Operation, VehicleError};
use crate::motor::controller::{ControllerError, MotorController};
use crate::motor::kinematics::{EffortLimit, VehicleGeometry, WheelEfforts};
use crate::motor::mdc2250::Mdc2250;

/// Axle controller identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Front,
    Rear,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Front, Channel::Rear];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Front => "front",
            Channel::Rear => "rear",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One axle controller and the last error it reported
pub struct ChannelHandle<D> {
    channel: Channel,
    driver: Mutex<D>,
    last_error: Mutex<Option<String>>,
}

impl<D: MotorController> ChannelHandle<D> {
    fn new(channel: Channel, mut driver: D, callbacks: &Arc<CallbackSet>) -> Self {
        let info = callbacks.clone();
        driver.set_info_handler(Box::new(move |msg: &str| info.channel_info(channel, msg)));

        let failure = callbacks.clone();
        driver.set_failure_handler(Box::new(move |reason: &str| {
            failure.exception(&AsyncFailure::Link {
                channel,
                reason: reason.to_string(),
            })
        }));

        Self {
            channel,
            driver: Mutex::new(driver),
            last_error: Mutex::new(None),
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Most recent connect/disconnect error, cleared by the next success
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn record(&self, result: Result<(), ControllerError>) -> Option<ChannelFailure> {
        let mut last_error = self.last_error.lock();
        match result {
            Ok(()) => {
                *last_error = None;
                None
            }
            Err(e) => {
                let message = e.to_string();
                warn!("{} channel: {}", self.channel, message);
                *last_error = Some(message.clone());
                Some(ChannelFailure {
                    channel: self.channel,
                    message,
                    code: e.code(),
                })
            }
        }
    }

    fn connect(&self, port: &str, watchdog_ms: u32, echo: bool) -> Option<ChannelFailure> {
        debug!("Connecting {} channel on {}", self.channel, port);
        let result = self.driver.lock().connect(port, watchdog_ms, echo);
        self.record(result)
    }

    fn disconnect(&self) -> Option<ChannelFailure> {
        debug!("Disconnecting {} channel", self.channel);
        let result = self.driver.lock().disconnect();
        self.record(result)
    }

    fn command(&self, efforts: WheelEfforts) {
        self.driver
            .lock()
            .command_motors(efforts.left, efforts.right);
    }

    fn arm_telemetry(&self, request: &str, sample_rate_ms: u32, callbacks: &Arc<CallbackSet>) {
        let callbacks = callbacks.clone();
        let channel = self.channel;
        self.driver.lock().set_telemetry(
            request,
            sample_rate_ms,
            Box::new(move |msg: &str| callbacks.telemetry(channel, msg)),
        );
    }
}

/// Per-channel result of one connect/disconnect round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOutcome {
    pub operation: Operation,
    pub front: Option<ChannelFailure>,
    pub rear: Option<ChannelFailure>,
}

impl ConnectionOutcome {
    pub fn error(&self, channel: Channel) -> Option<&ChannelFailure> {
        match channel {
            Channel::Front => self.front.as_ref(),
            Channel::Rear => self.rear.as_ref(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.front.is_none() && self.rear.is_none()
    }

    pub fn into_result(self) -> Result<(), ConnectionFailure> {
        if self.is_ok() {
            return Ok(());
        }
        let failures = [self.front, self.rear].into_iter().flatten().collect();
        Err(ConnectionFailure::new(self.operation, failures))
    }
}

/// Construction-time settings for a [`Vehicle`]
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleOptions {
    pub geometry: VehicleGeometry,
    pub effort_limit: EffortLimit,
    /// Comma separated query items streamed back from each controller
    pub telemetry_request: String,
    pub telemetry_rate_ms: u32,
}

impl Default for VehicleOptions {
    fn default() -> Self {
        Self {
            geometry: VehicleGeometry::default(),
            effort_limit: EffortLimit::default(),
            telemetry_request: TELEMETRY_REQUEST.to_string(),
            telemetry_rate_ms: TELEMETRY_RATE_MS,
        }
    }
}

/// Skid-steer base made of a front and a rear motor controller
pub struct Vehicle<D: MotorController> {
    options: VehicleOptions,
    front: ChannelHandle<D>,
    rear: ChannelHandle<D>,
    command: Mutex<WheelEfforts>,
    callbacks: Arc<CallbackSet>,
}

impl Vehicle<Mdc2250> {
    /// Vehicle backed by two MDC2250 serial controllers
    pub fn serial(options: VehicleOptions) -> Self {
        Self::new(Mdc2250::new(), Mdc2250::new(), options)
    }
}

impl<D: MotorController> Vehicle<D> {
    pub fn new(front: D, rear: D, options: VehicleOptions) -> Self {
        let callbacks = Arc::new(CallbackSet::new());
        Self {
            options,
            front: ChannelHandle::new(Channel::Front, front, &callbacks),
            rear: ChannelHandle::new(Channel::Rear, rear, &callbacks),
            command: Mutex::new(WheelEfforts::zero()),
            callbacks,
        }
    }

    pub fn geometry(&self) -> &VehicleGeometry {
        &self.options.geometry
    }

    pub fn handle(&self, channel: Channel) -> &ChannelHandle<D> {
        match channel {
            Channel::Front => &self.front,
            Channel::Rear => &self.rear,
        }
    }

    pub fn channel_error(&self, channel: Channel) -> Option<String> {
        self.handle(channel).last_error()
    }

    /// Connect both controllers concurrently.
    ///
    /// Each channel's failure is captured independently; the call only fails
    /// after both attempts finished. A channel that connected stays connected
    /// when the other fails, call [`Vehicle::disconnect`] to unwind it.
    /// Telemetry is armed on both channels only when both succeeded.
    ///
    /// There is no timeout here: a controller that never answers blocks until
    /// its driver gives up. Each channel's driver stays locked for its whole
    /// attempt (up to the 1 s MDC2250 handshake), so a `move_base` issued
    /// meanwhile waits for the attempt to finish.
    pub fn connect(
        &self,
        front_port: &str,
        rear_port: &str,
        watchdog_ms: u32,
        echo: bool,
    ) -> Result<(), ConnectionFailure> {
        info!("Connecting to ATRV: front={}, rear={}", front_port, rear_port);
        self.on_both(Operation::Connect, |handle| {
            let port = match handle.channel() {
                Channel::Front => front_port,
                Channel::Rear => rear_port,
            };
            handle.connect(port, watchdog_ms, echo)
        })
        .into_result()?;

        for handle in [&self.front, &self.rear] {
            handle.arm_telemetry(
                &self.options.telemetry_request,
                self.options.telemetry_rate_ms,
                &self.callbacks,
            );
        }
        info!("ATRV connected");
        Ok(())
    }

    /// Disconnect both controllers concurrently. Disconnecting a channel that
    /// is not connected succeeds, so calling this twice is harmless.
    pub fn disconnect(&self) -> Result<(), ConnectionFailure> {
        self.on_both(Operation::Disconnect, ChannelHandle::disconnect)
            .into_result()
    }

    /// Drive the base with a body twist.
    ///
    /// # Arguments
    /// * `linear_velocity` - Forward velocity in m/s (positive = forward)
    /// * `angular_velocity` - Rotational velocity in rad/s (positive = counter-clockwise)
    ///
    /// The same effort pair goes to both controllers without waiting for an
    /// acknowledgment. Concurrent calls are serialized; the last one wins.
    /// Only the [`EffortLimit::Reject`] policy can make this fail.
    pub fn move_base(&self, linear_velocity: f64, angular_velocity: f64) -> Result<(), VehicleError> {
        let requested = self
            .options
            .geometry
            .twist_to_efforts(linear_velocity, angular_velocity);
        let efforts = self.options.effort_limit.apply(requested)?;

        let mut command = self.command.lock();
        *command = efforts;
        self.front.command(efforts);
        self.rear.command(efforts);
        debug!(
            "Commanded efforts: left={:.1}, right={:.1}",
            efforts.left, efforts.right
        );
        Ok(())
    }

    pub fn stop(&self) -> Result<(), VehicleError> {
        self.move_base(0.0, 0.0)
    }

    /// Latest effort pair dispatched to the controllers
    pub fn last_command(&self) -> WheelEfforts {
        *self.command.lock()
    }

    pub fn set_info_handler(&mut self, handler: impl InfoHandler + 'static) {
        self.callbacks.set_info(Arc::new(handler));
    }

    /// Replace the handler for failures raised on background threads.
    ///
    /// The default logs the failure and queues it on
    /// [`Vehicle::background_failures`]; it never aborts the process.
    pub fn set_exception_handler(&mut self, handler: impl ExceptionHandler + 'static) {
        self.callbacks.set_exception(Arc::new(handler));
    }

    pub fn set_telemetry_handler(&mut self, handler: impl TelemetryHandler + 'static) {
        self.callbacks.set_telemetry(Arc::new(handler));
    }

    /// Failures queued by the default exception handler
    pub fn background_failures(&self) -> crossbeam_channel::Receiver<AsyncFailure> {
        self.callbacks.failures()
    }

    /// Run `op` on both channels in parallel and wait for both
    fn on_both<F>(&self, operation: Operation, op: F) -> ConnectionOutcome
    where
        F: Fn(&ChannelHandle<D>) -> Option<ChannelFailure> + Sync,
    {
        let (front, rear) = thread::scope(|s| {
            let front = s.spawn(|| op(&self.front));
            let rear = s.spawn(|| op(&self.rear));
            (
                settle(Channel::Front, front.join()),
                settle(Channel::Rear, rear.join()),
            )
        });

        ConnectionOutcome {
            operation,
            front,
            rear,
        }
    }
}

fn settle(channel: Channel, joined: thread::Result<Option<ChannelFailure>>) -> Option<ChannelFailure> {
    joined.unwrap_or_else(|_| {
        Some(ChannelFailure {
            channel,
            message: "worker thread panicked".to_string(),
            code: 0,
        })
    })
}

impl<D: MotorController> Drop for Vehicle<D> {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Failed to disconnect on drop: {}", e);
        }
    }
}
