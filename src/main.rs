use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use atrv_base_runtime::config::{FRONT_PORT, REAR_PORT, TELEMETRY_RATE_MS, TELEMETRY_REQUEST, WATCHDOG_MS};
use atrv_base_runtime::motor::kinematics::{
    ENCODER_PPR, EffortLimit, MAX_RPM, TRACK_WIDTH, VehicleGeometry, WHEEL_RADIUS,
};
use atrv_base_runtime::runtime::{self, RuntimeOptions};
use atrv_base_runtime::vehicle::VehicleOptions;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LimitArg {
    Unchecked,
    Clamp,
    Reject,
}

impl From<LimitArg> for EffortLimit {
    fn from(arg: LimitArg) -> Self {
        match arg {
            LimitArg::Unchecked => EffortLimit::Unchecked,
            LimitArg::Clamp => EffortLimit::Clamp,
            LimitArg::Reject => EffortLimit::Reject,
        }
    }
}

/// Drive the ATRV base from twist commands published over Zenoh
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Serial port of the front motor controller
    #[arg(long, default_value = FRONT_PORT)]
    front_port: String,

    /// Serial port of the rear motor controller
    #[arg(long, default_value = REAR_PORT)]
    rear_port: String,

    /// Controller watchdog in milliseconds
    #[arg(long, default_value_t = WATCHDOG_MS)]
    watchdog_ms: u32,

    /// Disable command echo on the controllers
    #[arg(long)]
    no_echo: bool,

    /// How to handle efforts beyond the controller range
    #[arg(long, value_enum, default_value_t = LimitArg::Unchecked)]
    effort_limit: LimitArg,

    #[arg(long, default_value_t = TRACK_WIDTH)]
    track_width: f64,

    #[arg(long, default_value_t = WHEEL_RADIUS)]
    wheel_radius: f64,

    #[arg(long, default_value_t = MAX_RPM)]
    max_rpm: f64,
}

fn options(args: Args) -> Result<RuntimeOptions, Box<dyn std::error::Error + Send + Sync>> {
    let geometry = VehicleGeometry::new(args.track_width, args.wheel_radius, args.max_rpm, ENCODER_PPR)?;
    Ok(RuntimeOptions {
        front_port: args.front_port,
        rear_port: args.rear_port,
        watchdog_ms: args.watchdog_ms,
        echo: !args.no_echo,
        vehicle: VehicleOptions {
            geometry,
            effort_limit: args.effort_limit.into(),
            telemetry_request: TELEMETRY_REQUEST.to_string(),
            telemetry_rate_ms: TELEMETRY_RATE_MS,
        },
    })
}

#[tokio::main]
async fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let result = match options(Args::parse()) {
        Ok(options) => runtime::run(options).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Runtime error: {}", e);
        std::process::exit(1);
    }
}
