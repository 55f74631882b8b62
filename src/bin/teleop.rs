// Keyboard teleop: W/S drive, A/D turn, R/F speed, Q quit
//
// Keys act as a virtual joystick; each axis is scaled into a twist
// (linear in m/s, angular in rad/s) and published at ~50Hz.
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use atrv_base_runtime::config::TOPIC_CMD_VEL;
use atrv_base_runtime::messages::TwistCommand;

const SPEED_LEVELS: [f64; 3] = [0.25, 0.5, 1.0]; // fraction of full stick
const SPEED_LABELS: [&str; 3] = ["LOW", "MED", "HIGH"];
const INPUT_TIMEOUT_MS: u64 = 100; // Reset velocities after this much time with no input

#[derive(Debug, Parser)]
struct Args {
    /// Linear velocity (m/s) at full stick
    #[arg(long, default_value_t = 1.0)]
    linear_scale: f64,

    /// Angular velocity (rad/s) at full stick
    #[arg(long, default_value_t = 0.2)]
    angular_scale: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    let args = Args::parse();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_VEL).await?;

    info!("Controls: W/S=drive, A/D=turn, R/F=speed, Q=quit");
    info!("Speed: {}", SPEED_LABELS[0]);

    enable_raw_mode()?;
    let result = run_teleop(&publisher, &args).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
    args: &Args,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Virtual stick state, -1..1 per axis
    let mut linear_axis = 0.0;
    let mut angular_axis = 0.0;
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                let level = SPEED_LEVELS[speed_idx];

                match code {
                    KeyCode::Char('w') if pressed => {
                        linear_axis = level;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        linear_axis = -level;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        angular_axis = level;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        angular_axis = -level;
                        last_movement_input = Instant::now();
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(SPEED_LEVELS.len() - 1);
                        info!("Speed: {}", SPEED_LABELS[speed_idx]);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        info!("Speed: {}", SPEED_LABELS[speed_idx]);
                    }

                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Release the stick if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            linear_axis = 0.0;
            angular_axis = 0.0;
        }

        let cmd = TwistCommand::from_axes(
            linear_axis,
            angular_axis,
            args.linear_scale,
            args.angular_scale,
        );
        publisher.put(serde_json::to_string(&cmd)?).await?;
    }

    // Leave the base stopped
    publisher
        .put(serde_json::to_string(&TwistCommand::default())?)
        .await?;
    Ok(())
}
