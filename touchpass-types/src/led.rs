//! Aura LED ring configuration

use serde::{Deserialize, Serialize};

/// Light effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LedMode {
    Breathing = 0x01,
    Flashing = 0x02,
    On = 0x03,
    Off = 0x04,
}

/// Ring color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum LedColor {
    Red = 0x01,
    Blue = 0x02,
    Purple = 0x03,
    Green = 0x04,
    Cyan = 0x06,
}

/// Parameters of one `AuraLedConfig` instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedConfig {
    pub mode: LedMode,
    /// Effect speed, 0-255 (lower is faster)
    pub speed: u8,
    pub color: LedColor,
    /// Number of cycles for breathing/flashing; 0 repeats forever
    pub count: u8,
}

impl LedConfig {
    pub const fn new(mode: LedMode, speed: u8, color: LedColor, count: u8) -> Self {
        Self {
            mode,
            speed,
            color,
            count,
        }
    }

    /// Waiting for a finger
    pub const PROMPT: Self = Self::new(LedMode::Breathing, 100, LedColor::Blue, 0);

    /// One capture accepted
    pub const CAPTURE_OK: Self = Self::new(LedMode::Flashing, 100, LedColor::Green, 2);

    /// Roughly half of the enrollment captures done
    pub const HALFWAY: Self = Self::new(LedMode::Flashing, 100, LedColor::Blue, 3);

    /// Template being merged
    pub const WORKING: Self = Self::new(LedMode::Breathing, 50, LedColor::Blue, 0);

    pub const SUCCESS: Self = Self::new(LedMode::On, 0, LedColor::Green, 0);

    pub const FAILURE: Self = Self::new(LedMode::On, 0, LedColor::Red, 0);

    pub const OFF: Self = Self::new(LedMode::Off, 0, LedColor::Blue, 0);

    /// Instruction parameters: mode, speed, color, count
    pub fn params(&self) -> [u8; 4] {
        [self.mode as u8, self.speed, self.color as u8, self.count]
    }
}
