//! Configuration loaded from TOML
//!
//! ```toml
//! [sensor]
//! address = 0xFFFFFFFF
//! library_size = 200
//!
//! [sensor.timeouts]
//! capture_ms = 3000
//!
//! [enrollment]
//! timeout_ms = 60000
//!
//! [link]
//! host = "192.168.1.50"
//! port = 2000
//! ```
//!
//! Every key is optional and falls back to the module defaults.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use touchpass_core::{
    constants::{library, DEFAULT_MAX_RAW_BYTES},
    Packet, DEFAULT_ADDRESS,
};
use touchpass_transport::{TcpTransport, Transport};

use crate::channel::Channel;
use crate::enroll::{Enrollment, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::sensor::{Sensor, Timeouts};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sensor: SensorConfig,
    pub enrollment: EnrollmentConfig,
    /// Serial-over-TCP bridge; absent when the sensor is wired directly
    pub link: Option<LinkConfig>,
}

/// Sensor module settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub address: u32,
    /// Library capacity assumed until the module reports its own
    pub library_size: u16,
    /// Raw bytes one response may take before the frame is abandoned
    pub max_raw_bytes: usize,
    pub timeouts: Timeouts,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            library_size: library::DEFAULT_SIZE,
            max_raw_bytes: DEFAULT_MAX_RAW_BYTES,
            timeouts: Timeouts::default(),
        }
    }
}

/// Enrollment settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrollmentConfig {
    pub timeout_ms: u64,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

/// Serial-over-TCP bridge settings
#[derive(Debug, Clone, Deserialize)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.sensor.library_size == 0 {
            return Err(Error::Validation("library_size must be greater than 0".into()));
        }
        if self.sensor.max_raw_bytes < Packet::MIN_FRAME_SIZE {
            return Err(Error::Validation(format!(
                "max_raw_bytes must be at least {}",
                Packet::MIN_FRAME_SIZE
            )));
        }

        let t = &self.sensor.timeouts;
        let all = [
            t.handshake_ms,
            t.capture_ms,
            t.extract_ms,
            t.merge_ms,
            t.store_ms,
            t.delete_ms,
            t.empty_ms,
            t.search_ms,
            t.index_table_ms,
            t.query_ms,
        ];
        if all.contains(&0) {
            return Err(Error::Validation("sensor timeouts must be greater than 0".into()));
        }

        if self.enrollment.timeout_ms == 0 {
            return Err(Error::Validation("enrollment timeout must be greater than 0".into()));
        }

        if let Some(link) = &self.link {
            if link.host.trim().is_empty() {
                return Err(Error::Validation("link host cannot be empty".into()));
            }
            if link.port == 0 {
                return Err(Error::Validation("link port must be greater than 0".into()));
            }
        }

        Ok(())
    }

    /// Sensor on `transport` with these settings
    pub fn sensor<T: Transport>(&self, transport: T) -> Sensor<T> {
        let channel = Channel::new(transport)
            .with_address(self.sensor.address)
            .with_max_raw_bytes(self.sensor.max_raw_bytes);

        Sensor::from_channel(channel)
            .with_timeouts(self.sensor.timeouts)
            .with_library_size(self.sensor.library_size)
    }

    pub fn enrollment(&self) -> Enrollment {
        Enrollment::new().with_timeout(Duration::from_millis(self.enrollment.timeout_ms))
    }
}

impl LinkConfig {
    /// Bridge transport for this link
    pub fn transport(&self) -> TcpTransport {
        TcpTransport::new(self.host.clone(), self.port)
            .with_connect_timeout(Duration::from_millis(self.connect_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use touchpass_transport::SimulatedSensor;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();

        assert_eq!(config.sensor.address, 0xFFFF_FFFF);
        assert_eq!(config.sensor.library_size, 200);
        assert_eq!(config.sensor.max_raw_bytes, 512);
        assert_eq!(config.sensor.timeouts, Timeouts::default());
        assert_eq!(config.enrollment.timeout_ms, 60_000);
        assert!(config.link.is_none());
    }

    #[test]
    fn test_partial_overrides() {
        let config = Config::from_toml_str(
            r#"
            [sensor]
            address = 0x00000001
            library_size = 1000

            [sensor.timeouts]
            capture_ms = 5000

            [enrollment]
            timeout_ms = 30000

            [link]
            host = "192.168.1.50"
            port = 2000
            "#,
        )
        .unwrap();

        assert_eq!(config.sensor.address, 1);
        assert_eq!(config.sensor.library_size, 1000);
        assert_eq!(config.sensor.timeouts.capture_ms, 5000);
        assert_eq!(config.sensor.timeouts.search_ms, 3000);
        assert_eq!(config.enrollment.timeout_ms, 30_000);

        let link = config.link.unwrap();
        assert_eq!(link.connect_timeout_ms, 5000);
        assert_eq!(link.transport().endpoint(), "192.168.1.50:2000");
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            Config::from_toml_str("[sensor]\nlibrary_size = 0"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[sensor.timeouts]\nstore_ms = 0"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[link]\nhost = \"\"\nport = 2000"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            Config::from_toml_str("[sensor]\naddress = \"broadcast\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_builds_sensor() {
        let config = Config::from_toml_str("[sensor]\naddress = 7\nlibrary_size = 50").unwrap();
        let sensor = config.sensor(SimulatedSensor::new());

        assert_eq!(sensor.channel().address(), 7);
        assert_eq!(sensor.library_size(), 50);
    }
}
