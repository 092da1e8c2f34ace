//! High-level device interface

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use touchpass_transport::Transport;
use touchpass_types::{FingerRecord, LogicalFingerId, SystemParameters};

use crate::detect::{Detection, Detector};
use crate::enroll::{EnrollError, EnrollRequest, EnrollStatus, Enrollment};
use crate::error::{Error, Result};
use crate::keyboard::Keyboard;
use crate::sensor::Sensor;
use crate::store::FingerStore;

/// Result of one [`TouchPass::poll`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PollOutcome {
    /// An enrollment session was stepped
    Enrollment(EnrollStatus),
    /// A detection pass ran
    Detection { matched: Option<Detection> },
}

/// Stored finger without its credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerEntry {
    pub slot: u16,
    pub name: String,
    pub finger_id: LogicalFingerId,
    pub press_enter: bool,
    pub has_credential: bool,
}

impl FingerEntry {
    fn new(slot: u16, record: &FingerRecord) -> Self {
        Self {
            slot,
            name: record.display_name(slot),
            finger_id: record.finger_id,
            press_enter: record.press_enter,
            has_credential: record.has_credential(),
        }
    }
}

/// Changes to a stored finger; `None` keeps the current value
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FingerUpdate {
    pub name: Option<String>,
    pub credential: Option<String>,
    pub press_enter: Option<bool>,
}

impl FingerUpdate {
    fn apply(self, record: &mut FingerRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(credential) = self.credential {
            record.credential = credential;
        }
        if let Some(press_enter) = self.press_enter {
            record.press_enter = press_enter;
        }
    }
}

impl fmt::Debug for FingerUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerUpdate")
            .field("name", &self.name)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("press_enter", &self.press_enter)
            .finish()
    }
}

/// Sensor reachability and library fill
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub connected: bool,
    pub template_count: Option<u16>,
    pub library_size: u16,
    pub enrolling: bool,
}

/// TouchPass device
///
/// Owns the sensor, the enrollment session, the record store and the
/// keyboard. Drive it by calling [`poll`](Self::poll) from a loop.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
///
/// use touchpass::{Keyboard, MemoryStore, Sensor, TouchPass};
/// use touchpass_transport::TcpTransport;
///
/// struct Stdout;
///
/// impl Keyboard for Stdout {
///     fn is_connected(&self) -> bool { true }
///     fn type_text(&mut self, text: &str) -> touchpass::Result<()> { print!("{}", text); Ok(()) }
///     fn press_enter(&mut self) -> touchpass::Result<()> { println!(); Ok(()) }
///     fn release_all(&mut self) -> touchpass::Result<()> { Ok(()) }
/// }
///
/// #[tokio::main]
/// async fn main() -> touchpass::Result<()> {
///     let sensor = Sensor::new(TcpTransport::new("192.168.1.50", 2000));
///     let mut device = TouchPass::new(sensor, MemoryStore::new(), Stdout);
///
///     device.connect().await?;
///
///     loop {
///         if let Err(e) = device.poll(tokio::time::Instant::now()).await {
///             eprintln!("poll failed: {}", e);
///         }
///         tokio::time::sleep(Duration::from_millis(50)).await;
///     }
/// }
/// ```
pub struct TouchPass<T, S, K> {
    sensor: Sensor<T>,
    enrollment: Enrollment,
    detector: Detector,
    store: S,
    keyboard: K,
}

impl<T, S, K> TouchPass<T, S, K>
where
    T: Transport,
    S: FingerStore,
    K: Keyboard,
{
    pub fn new(sensor: Sensor<T>, store: S, keyboard: K) -> Self {
        Self {
            sensor,
            enrollment: Enrollment::new(),
            detector: Detector::new(),
            store,
            keyboard,
        }
    }

    /// Replace the enrollment driver, e.g. one with a custom timeout
    pub fn with_enrollment(mut self, enrollment: Enrollment) -> Self {
        self.enrollment = enrollment;
        self
    }

    pub fn sensor(&self) -> &Sensor<T> {
        &self.sensor
    }

    pub fn sensor_mut(&mut self) -> &mut Sensor<T> {
        &mut self.sensor
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn keyboard_mut(&mut self) -> &mut K {
        &mut self.keyboard
    }

    /// Open the link and read the module's system parameters
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The link cannot be opened
    /// - The module does not answer
    pub async fn connect(&mut self) -> Result<SystemParameters> {
        info!("Connecting to sensor on {}...", self.sensor.channel().transport().endpoint());

        self.sensor.connect().await?;
        let params = self.sensor.read_system_parameters().await?;

        if let Err(e) = self.sensor.set_idle_led(true).await {
            warn!(error = %e, "Failed to set idle LED");
        }

        info!("Connected: {}", params);
        Ok(params)
    }

    /// Close the link
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.enrollment.cancel() {
            warn!("Disconnecting during enrollment");
        }
        self.sensor.disconnect().await?;
        info!("Disconnected");
        Ok(())
    }

    /// Begin enrolling a finger; detection pauses until it finishes
    pub async fn start_enrollment(&mut self, request: EnrollRequest, now: Instant) -> std::result::Result<u16, EnrollError> {
        self.enrollment
            .start_enrollment(&mut self.sensor, &self.store, request, now)
            .await
    }

    pub fn enrollment_status(&self) -> EnrollStatus {
        self.enrollment.status()
    }

    /// Abandon the running enrollment; returns whether one was running
    pub fn cancel_enrollment(&mut self) -> bool {
        self.enrollment.cancel()
    }

    /// One iteration of the device loop
    ///
    /// Steps the enrollment while one is active; otherwise runs one
    /// detection pass.
    pub async fn poll(&mut self, now: Instant) -> Result<PollOutcome> {
        if self.enrollment.is_active() {
            let status = self.enrollment.step(&mut self.sensor, &self.store, now).await;
            return Ok(PollOutcome::Enrollment(status));
        }

        let matched = self
            .detector
            .detect(&mut self.sensor, &self.store, &mut self.keyboard)
            .await?;
        Ok(PollOutcome::Detection { matched })
    }

    /// Stored fingers by slot
    pub fn fingers(&self) -> Result<Vec<FingerEntry>> {
        let mut entries = Vec::new();
        for slot in self.store.slots()? {
            if let Some(record) = self.store.load(slot)? {
                entries.push(FingerEntry::new(slot, &record));
            }
        }
        Ok(entries)
    }

    /// Stored finger at `slot`
    pub fn finger(&self, slot: u16) -> Result<FingerEntry> {
        let record = self.store.load(slot)?.ok_or(Error::NoRecord(slot))?;
        Ok(FingerEntry::new(slot, &record))
    }

    /// Change a stored finger's name, credential or enter flag
    ///
    /// The template stays as it is; no re-enrollment is needed.
    pub fn update_finger(&mut self, slot: u16, update: FingerUpdate) -> Result<FingerEntry> {
        let mut record = self.store.load(slot)?.ok_or(Error::NoRecord(slot))?;
        update.apply(&mut record);
        self.store.save(slot, &record)?;

        info!("Updated finger at slot {}", slot);
        Ok(FingerEntry::new(slot, &record))
    }

    /// Delete one finger's template and record
    pub async fn delete_finger(&mut self, slot: u16) -> Result<()> {
        info!("Deleting finger at slot {}", slot);
        self.sensor.delete_template(slot).await?;
        self.store.delete(slot)?;
        Ok(())
    }

    /// Delete every template and record
    pub async fn empty_library(&mut self) -> Result<()> {
        self.sensor.empty_library().await?;
        self.store.clear()?;
        Ok(())
    }

    /// Probe the module
    pub async fn health(&mut self) -> Health {
        let connected = self.sensor.is_connected().await;
        let template_count = if connected {
            match self.sensor.template_count().await {
                Ok(count) => Some(count),
                Err(e) => {
                    debug!(error = %e, "Template count unavailable");
                    None
                }
            }
        } else {
            None
        };

        Health {
            connected,
            template_count,
            library_size: self.sensor.library_size(),
            enrolling: self.enrollment.is_active(),
        }
    }
}
