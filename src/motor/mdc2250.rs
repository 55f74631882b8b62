// Roboteq MDC2250 serial driver
//
// ASCII command set over RS-232/USB, every command terminated by '\r':
//   ^ECHOF n     echo off (1) / on (0)
//   ^RWD ms      serial command watchdog
//   !G ch val    motor effort, -1000..1000
//   ?X           query; reply "X=a:b"
//   # C / # ms   clear / repeat the query history every ms
// Replies "+" and "-" acknowledge or reject a command.
//
// A reader thread owns the receive side. If it dies on an I/O error the link
// is reported through the failure handler; commands keep failing until the
// controller is reconnected.

use parking_lot::Mutex;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::controller::{ControllerError, LineCallback, MotorController};

/// Default serial configuration for the MDC2250
pub const DEFAULT_BAUDRATE: u32 = 115_200;
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// How long to wait for the firmware id reply after opening the port
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

type CallbackSlot = Arc<Mutex<Option<LineCallback>>>;

/// Motor effort command for one controller channel (1 or 2)
fn motor_command(motor: u8, effort: f64) -> String {
    format!("!G {} {}\r", motor, effort.round() as i64)
}

fn echo_command(echo: bool) -> String {
    // ECHOF is "echo off", so the flag is inverted
    format!("^ECHOF {}\r", if echo { 0 } else { 1 })
}

fn watchdog_command(watchdog_ms: u32) -> String {
    format!("^RWD {}\r", watchdog_ms)
}

/// Clear the query history, queue each requested item, then repeat at the sample rate
fn telemetry_commands(request: &str, sample_rate_ms: u32) -> String {
    let mut out = String::from("# C\r");
    for item in request.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        out.push_str(&format!("?{}\r", item));
    }
    out.push_str(&format!("# {}\r", sample_rate_ms));
    out
}

/// Classified controller output line
#[derive(Debug, PartialEq)]
enum Reply<'a> {
    Ack,
    Nack,
    /// Query result, e.g. "V=120:118"
    Data(&'a str),
    /// Our own command echoed back
    Echo(&'a str),
    Other(&'a str),
}

fn classify(line: &str) -> Reply<'_> {
    match line {
        "+" => Reply::Ack,
        "-" => Reply::Nack,
        l if l.starts_with(['!', '?', '^', '#', '~', '%']) => Reply::Echo(l),
        l if l.contains('=') => Reply::Data(l),
        l => Reply::Other(l),
    }
}

/// Splits a byte stream into '\r' / '\n' terminated lines
#[derive(Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b == b'\r' || b == b'\n' {
                if !self.pending.is_empty() {
                    lines.push(String::from_utf8_lossy(&self.pending).trim().to_string());
                    self.pending.clear();
                }
            } else {
                self.pending.push(b);
            }
        }
        lines
    }
}

fn emit(slot: &CallbackSlot, msg: &str) {
    if let Some(cb) = slot.lock().as_ref() {
        cb(msg);
    }
}

struct Reader {
    running: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Reader {
    fn spawn(
        mut port: Box<dyn SerialPort>,
        info: CallbackSlot,
        telemetry: CallbackSlot,
        failure: CallbackSlot,
    ) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let handle = thread::Builder::new()
            .name("mdc2250-reader".to_string())
            .spawn(move || {
                let mut lines = LineBuffer::default();
                let mut chunk = [0u8; 256];

                while flag.load(Ordering::Relaxed) {
                    let n = match port.read(&mut chunk) {
                        Ok(n) => n,
                        Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                        Err(e) => {
                            warn!("MDC2250 reader stopped: {}", e);
                            emit(&info, &format!("Reader stopped: {}", e));
                            emit(&failure, &e.to_string());
                            break;
                        }
                    };

                    for line in lines.push(&chunk[..n]) {
                        match classify(&line) {
                            Reply::Data(data) => emit(&telemetry, data),
                            Reply::Nack => emit(&info, "Command rejected by controller"),
                            Reply::Ack | Reply::Echo(_) => {}
                            Reply::Other(other) => debug!("MDC2250: {}", other),
                        }
                    }
                }
            })?;

        Ok(Self { running, handle })
    }

    fn stop(self) {
        self.running.store(false, Ordering::Relaxed);
        if self.handle.join().is_err() {
            warn!("MDC2250 reader thread panicked");
        }
    }
}

/// One MDC2250 dual-channel motor controller on a serial port
pub struct Mdc2250 {
    baudrate: u32,
    port: Option<Box<dyn SerialPort>>,
    port_name: String,
    reader: Option<Reader>,
    info: CallbackSlot,
    telemetry: CallbackSlot,
    failure: CallbackSlot,
}

impl Default for Mdc2250 {
    fn default() -> Self {
        Self::with_baudrate(DEFAULT_BAUDRATE)
    }
}

impl Mdc2250 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_baudrate(baudrate: u32) -> Self {
        Self {
            baudrate,
            port: None,
            port_name: String::new(),
            reader: None,
            info: Arc::new(Mutex::new(None)),
            telemetry: Arc::new(Mutex::new(None)),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn write(&mut self, data: &str) -> Result<(), ControllerError> {
        let port = self.port.as_mut().ok_or(ControllerError::NotConnected)?;
        port.write_all(data.as_bytes())?;
        port.flush()?;
        Ok(())
    }

    /// Query the firmware id until it answers or the handshake times out
    fn handshake(port: &mut dyn SerialPort, port_name: &str) -> Result<(), ControllerError> {
        port.write_all(b"?FID\r")?;
        port.flush()?;

        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        let mut lines = LineBuffer::default();
        let mut chunk = [0u8; 64];

        while Instant::now() < deadline {
            let n = match port.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            };
            if lines.push(&chunk[..n]).iter().any(|l| l.starts_with("FID=")) {
                return Ok(());
            }
        }

        Err(ControllerError::NoResponse {
            port: port_name.to_string(),
        })
    }

    fn shutdown(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.stop();
        }
        self.port = None;
    }
}

impl MotorController for Mdc2250 {
    fn connect(&mut self, port: &str, watchdog_ms: u32, echo: bool) -> Result<(), ControllerError> {
        if self.is_connected() {
            self.disconnect()?;
        }

        info!("Opening MDC2250 on {} at {} baud", port, self.baudrate);
        let mut serial = serialport::new(port, self.baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        serial.write_all(echo_command(echo).as_bytes())?;
        serial.write_all(watchdog_command(watchdog_ms).as_bytes())?;
        Self::handshake(serial.as_mut(), port)?;

        let reader_port = serial.try_clone()?;
        self.reader = Some(Reader::spawn(
            reader_port,
            self.info.clone(),
            self.telemetry.clone(),
            self.failure.clone(),
        )?);
        self.port = Some(serial);
        self.port_name = port.to_string();

        emit(
            &self.info,
            &format!("Connected on {} (watchdog {} ms)", port, watchdog_ms),
        );
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), ControllerError> {
        if !self.is_connected() {
            return Ok(());
        }

        // Stop both motors before letting go of the port
        let stopped = self.write(&format!("{}{}", motor_command(1, 0.0), motor_command(2, 0.0)));
        self.shutdown();
        emit(&self.info, &format!("Disconnected from {}", self.port_name));
        stopped
    }

    fn command_motors(&mut self, left_effort: f64, right_effort: f64) {
        let cmd = format!(
            "{}{}",
            motor_command(1, left_effort),
            motor_command(2, right_effort)
        );
        if let Err(e) = self.write(&cmd) {
            warn!("Failed to command motors: {}", e);
            emit(&self.info, &format!("Motor command failed: {}", e));
        }
    }

    fn set_telemetry(&mut self, request: &str, sample_rate_ms: u32, callback: LineCallback) {
        *self.telemetry.lock() = Some(callback);
        if let Err(e) = self.write(&telemetry_commands(request, sample_rate_ms)) {
            warn!("Failed to start telemetry: {}", e);
            emit(&self.info, &format!("Telemetry setup failed: {}", e));
        }
    }

    fn set_info_handler(&mut self, callback: LineCallback) {
        *self.info.lock() = Some(callback);
    }

    fn set_failure_handler(&mut self, callback: LineCallback) {
        *self.failure.lock() = Some(callback);
    }
}

impl Drop for Mdc2250 {
    fn drop(&mut self) {
        if let Err(e) = self.disconnect() {
            warn!("Failed to stop MDC2250 on drop: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_motor_command_format() {
        assert_eq!(motor_command(1, 172.48), "!G 1 172\r");
        assert_eq!(motor_command(2, -172.6), "!G 2 -173\r");
        assert_eq!(motor_command(1, 0.0), "!G 1 0\r");
    }

    #[test]
    fn test_config_commands() {
        assert_eq!(echo_command(true), "^ECHOF 0\r");
        assert_eq!(echo_command(false), "^ECHOF 1\r");
        assert_eq!(watchdog_command(3000), "^RWD 3000\r");
    }

    #[test]
    fn test_telemetry_commands() {
        assert_eq!(
            telemetry_commands("C,V,C,A", 25),
            "# C\r?C\r?V\r?C\r?A\r# 25\r"
        );
        assert_eq!(telemetry_commands(" V , ", 50), "# C\r?V\r# 50\r");
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("+"), Reply::Ack);
        assert_eq!(classify("-"), Reply::Nack);
        assert_eq!(classify("V=120:118"), Reply::Data("V=120:118"));
        assert_eq!(classify("?V"), Reply::Echo("?V"));
        assert_eq!(classify("!G 1 100"), Reply::Echo("!G 1 100"));
        assert_eq!(classify("Roboteq"), Reply::Other("Roboteq"));
    }

    #[test]
    fn test_line_buffer_splits_partial_reads() {
        let mut buf = LineBuffer::default();
        assert!(buf.push(b"A=1").is_empty());
        assert_eq!(buf.push(b"2:3\r\nV=4"), vec!["A=12:3".to_string()]);
        assert_eq!(buf.push(b"\r+\r"), vec!["V=4".to_string(), "+".to_string()]);
    }

    #[test]
    fn test_unconnected_controller() {
        let mut mc = Mdc2250::new();
        assert!(!mc.is_connected());
        // Idempotent disconnect and a dropped command must not fail loudly
        assert!(mc.disconnect().is_ok());
        assert!(mc.disconnect().is_ok());
        mc.command_motors(100.0, 100.0);
    }

    #[test]
    fn test_command_failure_reported_to_info() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut mc = Mdc2250::new();
        mc.set_info_handler(Box::new(move |msg: &str| sink.lock().push(msg.to_string())));

        mc.command_motors(10.0, 10.0);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].contains("not connected"));
    }

    #[test]
    fn test_connect_missing_port_fails() {
        let mut mc = Mdc2250::new();
        let err = mc
            .connect("/dev/does-not-exist-atrv", 1000, false)
            .unwrap_err();
        assert!(matches!(err, ControllerError::Serial(_)));
        assert!(!mc.is_connected());
    }
}
