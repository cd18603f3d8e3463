// Keyboard teleop over HTTP: W/S drive, A/D turn, R/F step length, SPACE stop, P photo, Q quit
//
// Usage: cargo run --example teleop -- [robot-ip]
//
// Each key press is one blocking maneuver; keys pressed while the rover is
// moving are dropped so commands don't pile up.

use std::fs;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use rover_control::client::RoverClient;
use rover_control::motor::Maneuver;
use tracing::{info, warn};

const STEPS_MS: [u32; 3] = [200, 500, 1500]; // short / medium / long
const TURN_MS: u32 = 250; // roughly 45-60 degrees

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let robot_ip = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "192.168.1.100".to_string());
    let client = RoverClient::for_host(&robot_ip);

    let status = client.status().await?;
    info!("Connected to {} (camera: {})", client.base_url(), status.camera);
    info!("Controls: W/S=drive, A/D=turn, R/F=step, SPACE=stop, P=photo, Q=quit");
    print_step(1);

    enable_raw_mode()?;
    let result = run_teleop(&client).await;
    disable_raw_mode()?;

    // Leave it stopped whatever happened
    if let Err(e) = client.stop().await {
        warn!("Final stop failed: {}", e);
    }
    result
}

async fn run_teleop(client: &RoverClient) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut step_idx: usize = 1;

    loop {
        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        let command = match code {
            KeyCode::Char('w') => Some((Maneuver::Forward, STEPS_MS[step_idx])),
            KeyCode::Char('s') => Some((Maneuver::Backward, STEPS_MS[step_idx])),
            KeyCode::Char('a') => Some((Maneuver::TurnLeft, TURN_MS)),
            KeyCode::Char('d') => Some((Maneuver::TurnRight, TURN_MS)),
            KeyCode::Char(' ') => Some((Maneuver::Stop, 0)),

            KeyCode::Char('r') => {
                step_idx = (step_idx + 1).min(STEPS_MS.len() - 1);
                print_step(step_idx);
                None
            }
            KeyCode::Char('f') => {
                step_idx = step_idx.saturating_sub(1);
                print_step(step_idx);
                None
            }

            KeyCode::Char('p') => {
                save_photo(client).await;
                None
            }

            KeyCode::Char('q') | KeyCode::Esc => break,
            _ => None,
        };

        if let Some((maneuver, duration_ms)) = command {
            match client.drive(maneuver, duration_ms).await {
                Ok(reply) => info!("{} ok", reply.action),
                Err(e) => warn!("{} failed: {}", maneuver, e),
            }
            drain_pending_keys()?;
        }
    }

    Ok(())
}

/// Drop key presses that queued up while the rover was moving
fn drain_pending_keys() -> std::io::Result<()> {
    while event::poll(Duration::ZERO)? {
        let _ = event::read()?;
    }
    Ok(())
}

async fn save_photo(client: &RoverClient) {
    let jpeg = match client.capture_photo().await {
        Ok(jpeg) => jpeg,
        Err(e) => {
            warn!("Photo failed: {}", e);
            return;
        }
    };

    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let path = format!("photos/rover_photo_{}.jpg", stamp);
    let saved = fs::create_dir_all("photos").and_then(|_| fs::write(&path, &jpeg));
    match saved {
        Ok(()) => info!("Saved {} ({} bytes)", path, jpeg.len()),
        Err(e) => warn!("Could not save {}: {}", path, e),
    }
}

fn print_step(idx: usize) {
    let label = ["SHORT", "MEDIUM", "LONG"][idx];
    info!("Step: {} ({}ms)", label, STEPS_MS[idx]);
}
