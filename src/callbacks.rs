//! Pluggable handlers for vehicle events.
//!
//! Both channels report through one [`CallbackSet`]. Each slot holds a single
//! handler; the vehicle owner replaces it through the `Vehicle::set_*_handler`
//! setters. Closures with the matching signature implement the handler traits.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::AsyncFailure;
use crate::vehicle::Channel;

/// Error a telemetry handler may return
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Pending background failures kept for the owner before new ones are dropped
pub const FAILURE_QUEUE_CAPACITY: usize = 64;

pub trait InfoHandler: Send + Sync {
    fn on_info(&self, message: &str);
}

pub trait ExceptionHandler: Send + Sync {
    fn on_exception(&self, failure: &AsyncFailure);
}

pub trait TelemetryHandler: Send + Sync {
    fn on_telemetry(&self, channel: Channel, message: &str) -> Result<(), HandlerError>;
}

impl<F: Fn(&str) + Send + Sync> InfoHandler for F {
    fn on_info(&self, message: &str) {
        self(message)
    }
}

impl<F: Fn(&AsyncFailure) + Send + Sync> ExceptionHandler for F {
    fn on_exception(&self, failure: &AsyncFailure) {
        self(failure)
    }
}

impl<F> TelemetryHandler for F
where
    F: Fn(Channel, &str) -> Result<(), HandlerError> + Send + Sync,
{
    fn on_telemetry(&self, channel: Channel, message: &str) -> Result<(), HandlerError> {
        self(channel, message)
    }
}

/// Default info handler: forwards to `tracing`
struct LogInfo;

impl InfoHandler for LogInfo {
    fn on_info(&self, message: &str) {
        info!("ATRV Info: {}", message);
    }
}

/// Default telemetry handler: forwards to `tracing`
struct LogTelemetry;

impl TelemetryHandler for LogTelemetry {
    fn on_telemetry(&self, channel: Channel, message: &str) -> Result<(), HandlerError> {
        info!("ATRV {} telemetry: {}", channel, message);
        Ok(())
    }
}

/// Default exception handler: logs the failure and queues it for the owner
struct ReportFailure {
    tx: Sender<AsyncFailure>,
}

impl ExceptionHandler for ReportFailure {
    fn on_exception(&self, failure: &AsyncFailure) {
        error!("ATRV Unhandled Exception: {}", failure);
        if let Err(TrySendError::Full(dropped)) = self.tx.try_send(failure.clone()) {
            warn!("Background failure queue full, dropping: {}", dropped);
        }
    }
}

pub struct CallbackSet {
    info: RwLock<Arc<dyn InfoHandler>>,
    exception: RwLock<Arc<dyn ExceptionHandler>>,
    telemetry: RwLock<Arc<dyn TelemetryHandler>>,
    failures: Receiver<AsyncFailure>,
}

impl Default for CallbackSet {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackSet {
    pub fn new() -> Self {
        let (tx, failures) = crossbeam_channel::bounded(FAILURE_QUEUE_CAPACITY);
        Self {
            info: RwLock::new(Arc::new(LogInfo)),
            exception: RwLock::new(Arc::new(ReportFailure { tx })),
            telemetry: RwLock::new(Arc::new(LogTelemetry)),
            failures,
        }
    }

    pub(crate) fn set_info(&self, handler: Arc<dyn InfoHandler>) {
        *self.info.write() = handler;
    }

    pub(crate) fn set_exception(&self, handler: Arc<dyn ExceptionHandler>) {
        *self.exception.write() = handler;
    }

    pub(crate) fn set_telemetry(&self, handler: Arc<dyn TelemetryHandler>) {
        *self.telemetry.write() = handler;
    }

    /// Failures the default exception handler has queued
    pub fn failures(&self) -> Receiver<AsyncFailure> {
        self.failures.clone()
    }

    pub fn info(&self, message: &str) {
        // Clone out so a handler may run while the slot is being replaced
        let handler = self.info.read().clone();
        handler.on_info(message);
    }

    /// Tag a driver message with the channel it came from
    pub fn channel_info(&self, channel: Channel, message: &str) {
        self.info(&format!("{} motor controller: {}", channel, message));
    }

    pub fn exception(&self, failure: &AsyncFailure) {
        let handler = self.exception.read().clone();
        handler.on_exception(failure);
    }

    /// Deliver telemetry; a failing handler is reported to the exception slot
    pub fn telemetry(&self, channel: Channel, message: &str) {
        let handler = self.telemetry.read().clone();
        if let Err(e) = handler.on_telemetry(channel, message) {
            self.exception(&AsyncFailure::Telemetry {
                channel,
                reason: e.to_string(),
            });
        }
    }
}
