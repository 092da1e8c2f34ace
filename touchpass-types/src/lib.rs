//! Type definitions for touchpass

pub mod error;
pub mod finger;
pub mod led;
pub mod system;

pub use error::{Error, Result};
pub use finger::{FingerRecord, Hand, LogicalFingerId, SearchMatch};
pub use led::{LedColor, LedConfig, LedMode};
pub use system::{StatusRegister, SystemParameters};
