//! Enroll and detect a finger against the simulated sensor
//!
//! Run with `RUST_LOG=debug` to see every frame.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing_subscriber::EnvFilter;

use touchpass::{EnrollRequest, Keyboard, LogicalFingerId, MemoryStore, PollOutcome, Sensor, TouchPass};
use touchpass_transport::{FingerModel, SimulatedSensor};

/// Prints instead of typing
struct ConsoleKeyboard;

impl Keyboard for ConsoleKeyboard {
    fn is_connected(&self) -> bool {
        true
    }

    fn type_text(&mut self, text: &str) -> touchpass::Result<()> {
        println!("[keyboard] {}", text);
        Ok(())
    }

    fn press_enter(&mut self) -> touchpass::Result<()> {
        println!("[keyboard] <enter>");
        Ok(())
    }

    fn release_all(&mut self) -> touchpass::Result<()> {
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("touchpass=info".parse()?))
        .init();

    let sim = SimulatedSensor::new().with_finger(FingerModel::Alternating);
    let handle = sim.handle();

    let mut device = TouchPass::new(Sensor::new(sim), MemoryStore::new(), ConsoleKeyboard);
    let params = device.connect().await?;
    println!("Sensor: {}", params);

    let request = EnrollRequest::new("Work", "secret123", true, LogicalFingerId::new(0)?);
    let slot = device.start_enrollment(request, Instant::now()).await?;
    println!("Enrolling into slot {}", slot);

    loop {
        if let PollOutcome::Enrollment(status) = device.poll(Instant::now()).await? {
            println!("step {} | {}", status.step, status.message);
            if status.done {
                println!("success: {}, error: {:?}", status.success, status.error);
                break;
            }
        }
        sleep(Duration::from_millis(50)).await;
    }

    // Touch again: the module now reports the new template
    handle.set_finger(FingerModel::Present);
    handle.set_match(Some((slot, 180)));

    if let PollOutcome::Detection { matched } = device.poll(Instant::now()).await? {
        println!("Detection: {:?}", matched);
    }

    for finger in device.fingers()? {
        println!("{:>3}  {}  {}", finger.slot, finger.finger_id, finger.name);
    }

    device.disconnect().await?;
    Ok(())
}
