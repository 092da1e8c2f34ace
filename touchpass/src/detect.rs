//! Fingerprint detection
//!
//! One pass: look for a finger, search the library and type the matching
//! record's credential. A finger that stays on the sensor is reported once;
//! the next match needs a fresh touch.

use serde::Serialize;
use tracing::{debug, info, warn};

use touchpass_transport::Transport;

use crate::error::Result;
use crate::keyboard::Keyboard;
use crate::sensor::Sensor;
use crate::store::FingerStore;

/// A matched finger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub slot: u16,
    pub score: u16,
    /// Record name, if the slot has a record
    pub name: Option<String>,
    /// Whether the credential was typed
    pub typed: bool,
}

/// Detection routine
#[derive(Debug, Default)]
pub struct Detector {
    /// Slot matched by the touch still on the sensor
    held: Option<u16>,
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of the current touch, if the finger has not been lifted yet
    pub fn held(&self) -> Option<u16> {
        self.held
    }

    /// Run one detection pass
    ///
    /// Returns `Ok(None)` when no finger is on the sensor, it matches no
    /// template, or the finger of the last match has not been lifted yet.
    /// A match whose slot has no record is reported but nothing is typed;
    /// neither is an empty credential or anything while the keyboard has
    /// no host.
    pub async fn detect<T, S, K>(
        &mut self,
        sensor: &mut Sensor<T>,
        store: &S,
        keyboard: &mut K,
    ) -> Result<Option<Detection>>
    where
        T: Transport,
        S: FingerStore + ?Sized,
        K: Keyboard + ?Sized,
    {
        if let Some(slot) = self.held {
            if !sensor.is_finger_lifted().await {
                return Ok(None);
            }
            debug!(slot, "Finger lifted");
            self.held = None;
        }

        let Some(found) = sensor.identify().await? else {
            return Ok(None);
        };
        self.held = Some(found.slot);

        let record = store.load(found.slot)?;
        let mut detection = Detection {
            slot: found.slot,
            score: found.score,
            name: record.as_ref().map(|r| r.display_name(found.slot)),
            typed: false,
        };

        let Some(record) = record else {
            warn!(slot = found.slot, "Match without a stored record");
            return Ok(Some(detection));
        };

        info!(
            slot = found.slot,
            score = found.score,
            "Matched {} ({})",
            record.name,
            record.finger_id
        );

        if !record.has_credential() {
            debug!("No credential stored for {}", record.name);
            return Ok(Some(detection));
        }
        if !keyboard.is_connected() {
            warn!("Keyboard not connected, not typing credential");
            return Ok(Some(detection));
        }

        keyboard.release_all()?;
        keyboard.type_text(&record.credential)?;
        if record.press_enter {
            keyboard.press_enter()?;
        }
        keyboard.release_all()?;

        detection.typed = true;
        Ok(Some(detection))
    }
}
