// Keyboard teleop: W/S channel A, A/D channel B, E power on, O power off,
// Space e-stop, R/F speed, Q quit
//
// Usage: cargo run --example cmd_sender -- [addr]
// Example: cargo run --example cmd_sender -- 192.168.1.40:8080
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use rover_motor_runtime::messages::{Command, encode_frames};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::info;

const SPEEDS: [i16; 3] = [256, 640, 1023]; // duty
const INPUT_TIMEOUT_MS: u64 = 100; // Zero the axes after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let target: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse()?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(target).await?;
    info!("Sending frames to {}", target);
    info!("Controls: W/S=A axis, A/D=B axis, E=on, O=off, Space=e-stop, R/F=speed, Q=quit");
    info!("Speed: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&socket).await;
    disable_raw_mode()?;

    // Leave the rover powered down
    socket.send(&encode_frames(&[Command::PowerOff])).await?;
    result
}

async fn run_teleop(socket: &UdpSocket) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut speed_idx: usize = 0;

    // Persistent axis state
    let mut duty_a: i16 = 0;
    let mut duty_b: i16 = 0;
    let mut last_movement_input = Instant::now();
    // Axis frames are held back after an e-stop so the brake stays engaged
    let mut braked = false;

    loop {
        // Frames that must go out once, ahead of the axis update
        let mut once = Vec::new();

        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    KeyCode::Char('w') if pressed => {
                        duty_a = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        braked = false;
                    }
                    KeyCode::Char('s') if pressed => {
                        duty_a = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        braked = false;
                    }
                    KeyCode::Char('a') if pressed => {
                        duty_b = SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        braked = false;
                    }
                    KeyCode::Char('d') if pressed => {
                        duty_b = -SPEEDS[speed_idx];
                        last_movement_input = Instant::now();
                        braked = false;
                    }

                    KeyCode::Char('e') if pressed => {
                        info!("Power on");
                        once.push(Command::PowerOn);
                    }
                    KeyCode::Char('o') if pressed => {
                        info!("Power off");
                        once.push(Command::PowerOff);
                    }
                    KeyCode::Char(' ') if pressed => {
                        info!("E-stop");
                        duty_a = 0;
                        duty_b = 0;
                        braked = true;
                        once.push(Command::EStop);
                    }

                    // Speed control
                    KeyCode::Char('r') if pressed => {
                        speed_idx = (speed_idx + 1).min(2);
                        print_speed(speed_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        speed_idx = speed_idx.saturating_sub(1);
                        print_speed(speed_idx);
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Reset axes if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            duty_a = 0;
            duty_b = 0;
        }

        if !braked {
            once.push(Command::SetA(duty_a));
            once.push(Command::SetB(duty_b));
        }
        if !once.is_empty() {
            socket.send(&encode_frames(&once)).await?;
        }
    }

    Ok(())
}

fn print_speed(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Speed: {}", label);
}
