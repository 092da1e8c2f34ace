//! # touchpass
//!
//! Fingerprint-to-keystroke device core for R502/R503 style optical sensors.
//!
//! ## Features
//!
//! - Command/response channel with framing recovery and per-command timeouts
//! - Typed sensor operations (capture, extract, merge, store, search, LED)
//! - Six-capture enrollment state machine driven by polling
//! - Detection routine that types the matched finger's credential
//! - TOML configuration
//!
//! ## Quick Start
//!
//! ```no_run
//! use touchpass::{EnrollRequest, Sensor};
//! use touchpass_transport::TcpTransport;
//! use touchpass_types::LogicalFingerId;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut sensor = Sensor::new(TcpTransport::new("192.168.1.50", 2000));
//!     sensor.connect().await?;
//!
//!     let params = sensor.read_system_parameters().await?;
//!     println!("{}", params);
//!
//!     let request = EnrollRequest::new("Work", "secret123", false, LogicalFingerId::new(0)?);
//!     println!("{:?}", request);
//!
//!     sensor.disconnect().await?;
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod detect;
pub mod device;
pub mod enroll;
pub mod error;
pub mod keyboard;
pub mod sensor;
pub mod store;

// Re-exports
pub use channel::{Channel, Response};
pub use config::Config;
pub use detect::{Detection, Detector};
pub use device::{FingerEntry, FingerUpdate, Health, PollOutcome, TouchPass};
pub use enroll::{EnrollError, EnrollRequest, EnrollStatus, Enrollment, Step};
pub use error::{Error, Result};
pub use keyboard::Keyboard;
pub use sensor::{Sensor, Timeouts};
pub use store::{FingerStore, MemoryStore};

// Re-export types
pub use touchpass_core::{Command, ConfirmationCode};
pub use touchpass_types::{FingerRecord, LedConfig, LogicalFingerId, SearchMatch, SystemParameters};
