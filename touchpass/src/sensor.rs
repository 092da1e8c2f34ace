//! Typed sensor operations
//!
//! One method per module instruction, built on [`Channel::call`]. Every
//! method takes `&mut self`, so only one command is ever in flight.

use std::time::Duration;

use bytes::Bytes;
use serde::Deserialize;
use tracing::{debug, info, warn};

use touchpass_core::{
    constants::{buffers, library, timeouts},
    Command, ConfirmationCode,
};
use touchpass_transport::Transport;
use touchpass_types::{LedConfig, SearchMatch, SystemParameters};

use crate::channel::Channel;
use crate::error::{Error, Result};

/// Per-instruction response timeouts in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub handshake_ms: u64,
    pub capture_ms: u64,
    pub extract_ms: u64,
    pub merge_ms: u64,
    pub store_ms: u64,
    pub delete_ms: u64,
    pub empty_ms: u64,
    pub search_ms: u64,
    pub index_table_ms: u64,
    pub query_ms: u64,
}

impl Timeouts {
    /// Timeout applied to `command`
    pub fn for_command(&self, command: Command) -> Duration {
        let ms = match command {
            Command::HandShake | Command::CheckSensor => self.handshake_ms,
            Command::GenImg => self.capture_ms,
            Command::Img2Tz => self.extract_ms,
            Command::RegModel => self.merge_ms,
            Command::Store => self.store_ms,
            Command::DeletChar => self.delete_ms,
            Command::Empty => self.empty_ms,
            Command::Search => self.search_ms,
            Command::ReadIndexTable => self.index_table_ms,
            Command::ReadSysPara | Command::TemplateNum | Command::AuraLedConfig => self.query_ms,
        };
        Duration::from_millis(ms)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            handshake_ms: timeouts::HANDSHAKE_MS,
            capture_ms: timeouts::CAPTURE_MS,
            extract_ms: timeouts::EXTRACT_MS,
            merge_ms: timeouts::MERGE_MS,
            store_ms: timeouts::STORE_MS,
            delete_ms: timeouts::DELETE_MS,
            empty_ms: timeouts::EMPTY_MS,
            search_ms: timeouts::SEARCH_MS,
            index_table_ms: timeouts::INDEX_TABLE_MS,
            query_ms: timeouts::QUERY_MS,
        }
    }
}

/// Optical fingerprint sensor module
///
/// # Examples
///
/// ```no_run
/// use touchpass::Sensor;
/// use touchpass_transport::TcpTransport;
///
/// #[tokio::main]
/// async fn main() -> touchpass::Result<()> {
///     let mut sensor = Sensor::new(TcpTransport::new("192.168.1.50", 2000));
///     sensor.connect().await?;
///
///     let params = sensor.read_system_parameters().await?;
///     println!("{}", params);
///
///     match sensor.find_empty_slot().await {
///         Some(slot) => println!("First free slot: {}", slot),
///         None => println!("Library full"),
///     }
///     Ok(())
/// }
/// ```
pub struct Sensor<T> {
    channel: Channel<T>,
    timeouts: Timeouts,
    library_size: u16,
}

impl<T: Transport> Sensor<T> {
    /// Create a sensor on the default address
    pub fn new(transport: T) -> Self {
        Self::from_channel(Channel::new(transport))
    }

    pub fn from_channel(channel: Channel<T>) -> Self {
        Self {
            channel,
            timeouts: Timeouts::default(),
            library_size: library::DEFAULT_SIZE,
        }
    }

    /// Set the module address
    pub fn with_address(mut self, address: u32) -> Self {
        self.channel = self.channel.with_address(address);
        self
    }

    /// Set the response timeouts
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set the assumed library capacity
    ///
    /// Replaced by the module's own value once the system parameters are read.
    pub fn with_library_size(mut self, size: u16) -> Self {
        self.library_size = size;
        self
    }

    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel<T> {
        &mut self.channel
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Library capacity, cached from the last system parameter read
    pub fn library_size(&self) -> u16 {
        self.library_size
    }

    /// Open the link
    pub async fn connect(&mut self) -> Result<()> {
        self.channel.connect().await
    }

    /// Close the link
    pub async fn disconnect(&mut self) -> Result<()> {
        self.channel.disconnect().await
    }

    /// Run one instruction and require a success code
    async fn execute(&mut self, command: Command, params: &[u8]) -> Result<Bytes> {
        let timeout = self.timeouts.for_command(command);
        self.channel
            .call(command, params, timeout)
            .await?
            .into_result(command)
    }

    /// Capture a finger image into the image buffer
    ///
    /// Fails with [`ConfirmationCode::NoFinger`] when the sensor is empty.
    pub async fn capture_image(&mut self) -> Result<()> {
        self.execute(Command::GenImg, &[]).await?;
        Ok(())
    }

    /// Extract characteristics of the captured image into char buffer `buffer`
    pub async fn generate_characteristics(&mut self, buffer: u8) -> Result<()> {
        self.execute(Command::Img2Tz, &[buffer]).await?;
        Ok(())
    }

    /// Merge the char buffers into one template
    pub async fn create_template(&mut self) -> Result<()> {
        self.execute(Command::RegModel, &[]).await?;
        Ok(())
    }

    /// Store the template in `buffer` at library `slot`
    pub async fn store_template(&mut self, buffer: u8, slot: u16) -> Result<()> {
        let [hi, lo] = slot.to_be_bytes();
        self.execute(Command::Store, &[buffer, hi, lo]).await?;
        Ok(())
    }

    /// Delete `count` templates starting at `slot`
    pub async fn delete_templates(&mut self, slot: u16, count: u16) -> Result<()> {
        let mut params = [0u8; 4];
        params[..2].copy_from_slice(&slot.to_be_bytes());
        params[2..].copy_from_slice(&count.to_be_bytes());
        self.execute(Command::DeletChar, &params).await?;
        Ok(())
    }

    /// Delete the template at `slot`
    pub async fn delete_template(&mut self, slot: u16) -> Result<()> {
        self.delete_templates(slot, 1).await
    }

    /// Wipe the whole library
    pub async fn empty_library(&mut self) -> Result<()> {
        warn!("Emptying template library");
        self.execute(Command::Empty, &[]).await?;
        Ok(())
    }

    /// Search `count` slots from `start` for the template in `buffer`
    ///
    /// No match is reported as [`ConfirmationCode::NotFound`].
    pub async fn search(&mut self, buffer: u8, start: u16, count: u16) -> Result<SearchMatch> {
        let mut params = [0u8; 5];
        params[0] = buffer;
        params[1..3].copy_from_slice(&start.to_be_bytes());
        params[3..].copy_from_slice(&count.to_be_bytes());

        let data = self.execute(Command::Search, &params).await?;
        if data.len() < 4 {
            return Err(Error::InvalidResponse {
                command: Command::Search,
                reason: format!("expected 4 data bytes, got {}", data.len()),
            });
        }

        Ok(SearchMatch {
            slot: u16::from_be_bytes([data[0], data[1]]),
            score: u16::from_be_bytes([data[2], data[3]]),
        })
    }

    /// Read one 256-slot occupancy page
    ///
    /// Bit `b` of byte `i` is set when slot `page * 256 + i * 8 + b` holds a template.
    pub async fn read_index_table(&mut self, page: u8) -> Result<[u8; library::PAGE_BYTES]> {
        let data = self.execute(Command::ReadIndexTable, &[page]).await?;

        data.get(..library::PAGE_BYTES)
            .and_then(|bitmap| bitmap.try_into().ok())
            .ok_or_else(|| Error::InvalidResponse {
                command: Command::ReadIndexTable,
                reason: format!("expected {} bitmap bytes, got {}", library::PAGE_BYTES, data.len()),
            })
    }

    /// Configure the LED ring
    pub async fn set_led(&mut self, config: LedConfig) -> Result<()> {
        self.execute(Command::AuraLedConfig, &config.params()).await?;
        Ok(())
    }

    /// Idle pattern: breathing blue while the device is reachable, off otherwise
    pub async fn set_idle_led(&mut self, active: bool) -> Result<()> {
        let config = if active { LedConfig::PROMPT } else { LedConfig::OFF };
        self.set_led(config).await
    }

    pub async fn handshake(&mut self) -> Result<()> {
        self.execute(Command::HandShake, &[]).await?;
        Ok(())
    }

    pub async fn check_sensor(&mut self) -> Result<()> {
        self.execute(Command::CheckSensor, &[]).await?;
        Ok(())
    }

    /// Whether the module answers
    ///
    /// Some firmware revisions lack the handshake instruction, so the
    /// sensor self check is tried when the handshake fails.
    pub async fn is_connected(&mut self) -> bool {
        if let Err(e) = self.handshake().await {
            debug!(error = %e, "Handshake failed, trying sensor check");
            return self.check_sensor().await.is_ok();
        }
        true
    }

    /// Read the system parameters and cache the library capacity
    pub async fn read_system_parameters(&mut self) -> Result<SystemParameters> {
        let data = self.execute(Command::ReadSysPara, &[]).await?;
        let params = SystemParameters::parse(&data)?;

        if params.library_size != self.library_size {
            info!(
                "Library size {} (was {})",
                params.library_size, self.library_size
            );
        }
        self.library_size = params.library_size;

        Ok(params)
    }

    /// Number of stored templates
    pub async fn template_count(&mut self) -> Result<u16> {
        let data = self.execute(Command::TemplateNum, &[]).await?;
        if data.len() < 2 {
            return Err(Error::InvalidResponse {
                command: Command::TemplateNum,
                reason: format!("expected 2 data bytes, got {}", data.len()),
            });
        }
        Ok(u16::from_be_bytes([data[0], data[1]]))
    }

    /// Lowest free library slot
    ///
    /// Scans index table pages up to the library capacity. Returns `None`
    /// when the library is full or a page cannot be read.
    pub async fn find_empty_slot(&mut self) -> Option<u16> {
        let capacity = self.library_size;
        let pages = capacity.div_ceil(library::SLOTS_PER_PAGE);

        for page in 0..pages {
            let Ok(index) = u8::try_from(page) else {
                warn!(page, "Index table page out of range");
                return None;
            };
            let bitmap = match self.read_index_table(index).await {
                Ok(bitmap) => bitmap,
                Err(e) => {
                    warn!(page, error = %e, "Index table read failed");
                    return None;
                }
            };

            if let Some(slot) = first_clear_slot(page, &bitmap, capacity) {
                return Some(slot);
            }
        }

        None
    }

    /// Whether the finger has left the sensor
    ///
    /// Runs an image capture: only the module's "no finger" code (0x02)
    /// counts as lifted. A successful capture, any other code or a link
    /// failure means the finger is still there or the module is busy.
    pub async fn is_finger_lifted(&mut self) -> bool {
        matches!(
            self.capture_image().await,
            Err(Error::Sensor {
                code: ConfirmationCode::NoFinger,
                ..
            })
        )
    }

    /// Capture, extract and search the whole library
    ///
    /// An empty sensor or an unknown finger is `Ok(None)`.
    pub async fn identify(&mut self) -> Result<Option<SearchMatch>> {
        match self.capture_image().await {
            Ok(()) => {}
            Err(Error::Sensor {
                code: ConfirmationCode::NoFinger,
                ..
            }) => return Ok(None),
            Err(e) => return Err(e),
        }

        self.generate_characteristics(buffers::PRIMARY).await?;

        match self.search(buffers::PRIMARY, 0, self.library_size).await {
            Ok(found) => Ok(Some(found)),
            Err(Error::Sensor {
                code: ConfirmationCode::NotFound,
                ..
            }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Lowest clear bit in one page that lies below `capacity`
fn first_clear_slot(page: u16, bitmap: &[u8], capacity: u16) -> Option<u16> {
    let base = u32::from(page) * u32::from(library::SLOTS_PER_PAGE);

    for (i, &byte) in bitmap.iter().enumerate() {
        if byte == 0xFF {
            continue;
        }
        for bit in 0..8 {
            let slot = base + (i as u32) * 8 + bit;
            if slot >= u32::from(capacity) {
                return None;
            }
            if byte & (1 << bit) == 0 {
                return Some(slot as u16);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use touchpass_transport::{FingerModel, SimHandle, SimulatedSensor};

    async fn sensor(sim: SimulatedSensor) -> (Sensor<SimulatedSensor>, SimHandle) {
        let handle = sim.handle();
        let mut sensor = Sensor::new(sim);
        sensor.connect().await.unwrap();
        (sensor, handle)
    }

    #[test]
    fn test_first_clear_slot() {
        let mut bitmap = [0u8; 32];
        bitmap[0] = 0b0000_0111;
        assert_eq!(first_clear_slot(0, &bitmap, 10), Some(3));

        bitmap[0] = 0xFF;
        bitmap[1] = 0b0000_0011;
        assert_eq!(first_clear_slot(0, &bitmap, 10), None);
        assert_eq!(first_clear_slot(0, &bitmap, 200), Some(10));
        assert_eq!(first_clear_slot(1, &bitmap, 300), Some(256 + 10));
    }

    #[test]
    fn test_default_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.for_command(Command::HandShake), Duration::from_millis(500));
        assert_eq!(timeouts.for_command(Command::GenImg), Duration::from_millis(3000));
        assert_eq!(timeouts.for_command(Command::Empty), Duration::from_millis(3000));
        assert_eq!(timeouts.for_command(Command::ReadIndexTable), Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn test_find_empty_slot() {
        let sim = SimulatedSensor::new().with_library_size(10).with_occupied(&[0, 1, 2]);
        let (mut sensor, _) = sensor(sim).await;
        sensor.read_system_parameters().await.unwrap();

        assert_eq!(sensor.library_size(), 10);
        assert_eq!(sensor.find_empty_slot().await, Some(3));
    }

    #[tokio::test]
    async fn test_find_empty_slot_full() {
        let slots: Vec<u16> = (0..10).collect();
        let sim = SimulatedSensor::new().with_library_size(10).with_occupied(&slots);
        let (mut sensor, _) = sensor(sim).await;
        sensor.read_system_parameters().await.unwrap();

        assert_eq!(sensor.find_empty_slot().await, None);
    }

    #[tokio::test]
    async fn test_find_empty_slot_second_page() {
        let slots: Vec<u16> = (0..256).collect();
        let sim = SimulatedSensor::new().with_library_size(1000).with_occupied(&slots);
        let (mut sensor, handle) = sensor(sim).await;
        sensor.read_system_parameters().await.unwrap();

        assert_eq!(sensor.find_empty_slot().await, Some(256));
        assert_eq!(handle.count(Command::ReadIndexTable), 2);
    }

    #[tokio::test]
    async fn test_find_empty_slot_last_page() {
        let slots: Vec<u16> = (0..u16::MAX - 1).collect();
        let sim = SimulatedSensor::new().with_library_size(u16::MAX).with_occupied(&slots);
        let (mut sensor, handle) = sensor(sim).await;
        sensor.read_system_parameters().await.unwrap();

        assert_eq!(sensor.find_empty_slot().await, Some(u16::MAX - 1));
        assert_eq!(handle.count(Command::ReadIndexTable), 256);
        assert_eq!(
            handle.last_params(Command::ReadIndexTable).unwrap().as_ref(),
            &[0xFF]
        );

        handle.set_occupied(u16::MAX - 1, true);
        assert_eq!(sensor.find_empty_slot().await, None);
    }

    #[tokio::test]
    async fn test_find_empty_slot_read_failure() {
        let (mut sensor, handle) = sensor(SimulatedSensor::new()).await;
        handle.fail(Command::ReadIndexTable, ConfirmationCode::PacketError);

        assert_eq!(sensor.find_empty_slot().await, None);
    }

    #[tokio::test]
    async fn test_store_params_big_endian() {
        let sim = SimulatedSensor::new().with_finger(FingerModel::Present);
        let (mut sensor, handle) = sensor(sim).await;

        sensor.capture_image().await.unwrap();
        sensor.generate_characteristics(1).await.unwrap();
        sensor.store_template(1, 0x0102).await.unwrap_err();
        assert_eq!(
            handle.last_params(Command::Store).unwrap().as_ref(),
            &[0x01, 0x01, 0x02]
        );

        sensor.store_template(1, 7).await.unwrap();
        assert_eq!(handle.occupied_slots(), vec![7]);
    }

    #[tokio::test]
    async fn test_finger_lifted() {
        let (mut sensor, handle) = sensor(SimulatedSensor::new()).await;
        assert!(sensor.is_finger_lifted().await);

        handle.set_finger(FingerModel::Present);
        assert!(!sensor.is_finger_lifted().await);

        handle.fail(Command::GenImg, ConfirmationCode::ImageFailed);
        assert!(!sensor.is_finger_lifted().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finger_lifted_link_failure() {
        let (mut sensor, handle) = sensor(SimulatedSensor::new()).await;
        handle.set_unplugged(true);

        assert!(!sensor.is_finger_lifted().await);
    }

    #[tokio::test]
    async fn test_identify() {
        let sim = SimulatedSensor::new().with_occupied(&[4]);
        let (mut sensor, handle) = sensor(sim).await;

        assert_eq!(sensor.identify().await.unwrap(), None);
        assert_eq!(handle.count(Command::Img2Tz), 0);

        handle.set_finger(FingerModel::Present);
        assert_eq!(sensor.identify().await.unwrap(), None);

        handle.set_match(Some((4, 120)));
        assert_eq!(
            sensor.identify().await.unwrap(),
            Some(SearchMatch { slot: 4, score: 120 })
        );
        assert_eq!(
            handle.last_params(Command::Search).unwrap().as_ref(),
            &[0x01, 0x00, 0x00, 0x00, 0xC8]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_is_connected_falls_back_to_check_sensor() {
        let (mut sensor, handle) = sensor(SimulatedSensor::new()).await;
        handle.set_silent(Command::HandShake, true);

        assert!(sensor.is_connected().await);
        assert_eq!(
            handle.commands(),
            vec![Command::HandShake, Command::CheckSensor]
        );

        handle.set_unplugged(true);
        assert!(!sensor.is_connected().await);
    }

    #[tokio::test]
    async fn test_template_count_and_delete() {
        let sim = SimulatedSensor::new().with_occupied(&[1, 2, 3]);
        let (mut sensor, _) = sensor(sim).await;

        assert_eq!(sensor.template_count().await.unwrap(), 3);
        sensor.delete_templates(1, 2).await.unwrap();
        assert_eq!(sensor.template_count().await.unwrap(), 1);
        sensor.empty_library().await.unwrap();
        assert_eq!(sensor.template_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_set_led() {
        let (mut sensor, handle) = sensor(SimulatedSensor::new()).await;

        sensor.set_led(LedConfig::CAPTURE_OK).await.unwrap();
        sensor.set_idle_led(false).await.unwrap();

        assert_eq!(
            handle.led_log(),
            vec![
                Bytes::from_static(&[0x02, 100, 0x04, 2]),
                Bytes::from_static(&[0x04, 0, 0x02, 0]),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_timeouts() {
        let (sensor, handle) = sensor(SimulatedSensor::new()).await;
        let mut sensor = sensor.with_timeouts(Timeouts {
            capture_ms: 50,
            ..Timeouts::default()
        });
        handle.set_silent(Command::GenImg, true);

        match sensor.capture_image().await {
            Err(Error::Timeout { after, .. }) => assert_eq!(after, Duration::from_millis(50)),
            other => panic!("Expected timeout, got {:?}", other),
        }
    }
}
