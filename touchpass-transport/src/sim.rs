//! In-process sensor module model
//!
//! [`SimulatedSensor`] answers command frames the way an R502 module does:
//! it keeps a template library, char buffers and a finger that can be put
//! down or lifted. A [`SimHandle`] shares the state so tests can inspect the
//! command log and inject faults while the sensor is owned by a driver.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use touchpass_core::{
    constants::library, Command, ConfirmationCode, FrameDecoder, Packet, DEFAULT_ADDRESS,
};

use crate::{error::*, Transport};

/// How the simulated finger behaves across image captures
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FingerModel {
    /// Nothing on the sensor
    Absent,
    /// Finger resting on the sensor
    Present,
    /// Finger is down for one capture, up for the next, and so on
    Alternating,
}

#[derive(Debug)]
struct SimState {
    address: u32,
    connected: bool,
    unplugged: bool,
    library: Vec<bool>,
    finger: FingerModel,
    finger_down: bool,
    image_valid: bool,
    char_buffers: BTreeSet<u8>,
    failures: HashMap<Command, ConfirmationCode>,
    silent: HashSet<Command>,
    search_result: Option<(u16, u16)>,
    pending: BytesMut,
    reply_prefix: Vec<u8>,
    corrupt_next: bool,
    log: Vec<(Command, Bytes)>,
}

impl SimState {
    fn new() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            connected: false,
            unplugged: false,
            library: vec![false; library::DEFAULT_SIZE as usize],
            finger: FingerModel::Absent,
            finger_down: false,
            image_valid: false,
            char_buffers: BTreeSet::new(),
            failures: HashMap::new(),
            silent: HashSet::new(),
            search_result: None,
            pending: BytesMut::new(),
            reply_prefix: Vec::new(),
            corrupt_next: false,
            log: Vec::new(),
        }
    }

    fn set_finger(&mut self, model: FingerModel) {
        self.finger = model;
        self.finger_down = model != FingerModel::Absent;
    }

    /// Process one command frame and queue the reply, if any
    fn handle(&mut self, packet: &Packet) {
        if self.unplugged {
            trace!("Sensor unplugged, dropping {}", packet);
            return;
        }
        if packet.address != self.address {
            trace!(
                address = format!("0x{:08X}", packet.address),
                "Frame for another module, ignoring"
            );
            return;
        }

        let Some(command) = packet.command_code() else {
            self.reply(ConfirmationCode::PacketError, &[]);
            return;
        };

        let params = packet.data();
        self.log.push((command, params.clone()));

        if self.silent.contains(&command) {
            debug!("Staying silent on {}", command);
            return;
        }

        // Image capture moves the finger even when the reply is overridden
        if command == Command::GenImg {
            let down = self.finger_down;
            if self.finger == FingerModel::Alternating {
                self.finger_down = !down;
            }
            self.image_valid = down;
        }

        if let Some(&code) = self.failures.get(&command) {
            self.reply(code, &[]);
            return;
        }

        let (code, data) = self.execute(command, &params);
        self.reply(code, &data);
    }

    fn execute(&mut self, command: Command, params: &[u8]) -> (ConfirmationCode, Vec<u8>) {
        use ConfirmationCode::*;

        match command {
            Command::HandShake | Command::CheckSensor | Command::AuraLedConfig => (Success, vec![]),

            Command::GenImg => {
                if self.image_valid {
                    (Success, vec![])
                } else {
                    (NoFinger, vec![])
                }
            }

            Command::Img2Tz => match params.first() {
                None => (PacketError, vec![]),
                Some(_) if !self.image_valid => (InvalidPrimaryImage, vec![]),
                Some(&buffer) => {
                    self.char_buffers.insert(buffer);
                    (Success, vec![])
                }
            },

            Command::RegModel => {
                if self.char_buffers.len() >= 2 {
                    (Success, vec![])
                } else {
                    (MergeFailed, vec![])
                }
            }

            Command::Store => {
                if params.len() < 3 {
                    return (PacketError, vec![]);
                }
                let slot = u16::from_be_bytes([params[1], params[2]]) as usize;
                if slot >= self.library.len() {
                    (SlotOutOfRange, vec![])
                } else if !self.char_buffers.contains(&params[0]) {
                    (InvalidRegister, vec![])
                } else {
                    self.library[slot] = true;
                    (Success, vec![])
                }
            }

            Command::DeletChar => {
                if params.len() < 4 {
                    return (PacketError, vec![]);
                }
                let start = u16::from_be_bytes([params[0], params[1]]) as usize;
                let count = u16::from_be_bytes([params[2], params[3]]) as usize;
                match self.library.get_mut(start..start + count) {
                    Some(slots) => {
                        slots.iter_mut().for_each(|s| *s = false);
                        (Success, vec![])
                    }
                    None => (DeleteFailed, vec![]),
                }
            }

            Command::Empty => {
                self.library.iter_mut().for_each(|s| *s = false);
                (Success, vec![])
            }

            Command::ReadSysPara => {
                let mut data = BytesMut::with_capacity(16);
                data.put_u16(0x0000);
                data.put_u16(0x0000);
                data.put_u16(self.library.len() as u16);
                data.put_u16(3);
                data.put_u32(self.address);
                data.put_u16(2);
                data.put_u16(6);
                (Success, data.to_vec())
            }

            Command::TemplateNum => {
                let count = self.library.iter().filter(|&&s| s).count() as u16;
                (Success, count.to_be_bytes().to_vec())
            }

            Command::ReadIndexTable => {
                let page = params.first().copied().unwrap_or(0) as usize;
                let per_page = library::SLOTS_PER_PAGE as usize;
                let mut bitmap = vec![0u8; library::PAGE_BYTES];

                let start = page * per_page;
                let occupied = self.library.iter().enumerate().skip(start).take(per_page);
                for (i, _) in occupied.filter(|(_, slot)| **slot) {
                    let bit = i - start;
                    bitmap[bit / 8] |= 1 << (bit % 8);
                }
                (Success, bitmap)
            }

            Command::Search => match (params.first(), self.search_result) {
                (None, _) => (PacketError, vec![]),
                (Some(buffer), _) if !self.char_buffers.contains(buffer) => (InvalidRegister, vec![]),
                (Some(_), Some((slot, score))) => {
                    let mut data = slot.to_be_bytes().to_vec();
                    data.extend_from_slice(&score.to_be_bytes());
                    (Success, data)
                }
                (Some(_), None) => (NotFound, vec![]),
            },
        }
    }

    fn reply(&mut self, code: ConfirmationCode, data: &[u8]) {
        let mut frame = match Packet::ack(self.address, code, data) {
            Ok(packet) => packet.encode(),
            Err(e) => {
                warn!(error = %e, "Cannot build reply");
                return;
            }
        };

        if self.corrupt_next {
            self.corrupt_next = false;
            let last = frame.len() - 1;
            frame[last] ^= 0xFF;
        }

        let prefix = std::mem::take(&mut self.reply_prefix);
        self.pending.put_slice(&prefix);
        self.pending.put_slice(&frame);
    }
}

/// Simulated sensor module behind the [`Transport`] trait
#[derive(Debug)]
pub struct SimulatedSensor {
    state: Arc<Mutex<SimState>>,
    decoder: FrameDecoder,
}

impl SimulatedSensor {
    /// Module with an empty 200-slot library and no finger
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
            decoder: FrameDecoder::new(),
        }
    }

    /// Set the module address
    pub fn with_address(self, address: u32) -> Self {
        self.state.lock().address = address;
        self
    }

    /// Set the library capacity
    pub fn with_library_size(self, size: u16) -> Self {
        self.state.lock().library = vec![false; size as usize];
        self
    }

    /// Mark slots as holding a template
    pub fn with_occupied(self, slots: &[u16]) -> Self {
        {
            let mut state = self.state.lock();
            for &slot in slots {
                if let Some(s) = state.library.get_mut(slot as usize) {
                    *s = true;
                }
            }
        }
        self
    }

    /// Set the finger behaviour
    pub fn with_finger(self, model: FingerModel) -> Self {
        self.state.lock().set_finger(model);
        self
    }

    /// Answer `Search` with a match
    pub fn with_match(self, slot: u16, score: u16) -> Self {
        self.state.lock().search_result = Some((slot, score));
        self
    }

    /// Shared handle for inspection and fault injection
    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for SimulatedSensor {
    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.connected {
            return Err(Error::AlreadyConnected);
        }
        state.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.pending.clear();
        self.decoder.reset();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(Error::NotConnected);
        }

        for &byte in data {
            let mut outcome = self.decoder.push(byte);
            loop {
                match outcome {
                    Ok(Some(packet)) => state.handle(&packet),
                    Ok(None) => break,
                    Err(e) => debug!(error = %e, "Module dropped a bad frame"),
                }
                outcome = self.decoder.advance();
            }
        }
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut> {
        let ready = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(Error::NotConnected);
            }
            if state.pending.is_empty() {
                None
            } else {
                Some(state.pending.split())
            }
        };

        match ready {
            Some(buf) => Ok(buf),
            None => {
                tokio::time::sleep(timeout).await;
                Err(Error::ReadTimeout)
            }
        }
    }

    fn endpoint(&self) -> String {
        format!("sim@0x{:08X}", self.state.lock().address)
    }
}

/// Shared view into a [`SimulatedSensor`]
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    /// Instructions received so far, in order
    pub fn commands(&self) -> Vec<Command> {
        self.state.lock().log.iter().map(|(c, _)| *c).collect()
    }

    /// How many times `command` was received
    pub fn count(&self, command: Command) -> usize {
        self.state.lock().log.iter().filter(|(c, _)| *c == command).count()
    }

    /// Parameters of the most recent `command`
    pub fn last_params(&self, command: Command) -> Option<Bytes> {
        self.state
            .lock()
            .log
            .iter()
            .rev()
            .find(|(c, _)| *c == command)
            .map(|(_, p)| p.clone())
    }

    /// Forget the command log
    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    /// Parameters of every `command` received, in order
    pub fn params(&self, command: Command) -> Vec<Bytes> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|(c, _)| *c == command)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// LED parameter blocks received, in order
    pub fn led_log(&self) -> Vec<Bytes> {
        self.params(Command::AuraLedConfig)
    }

    /// Slots holding a template
    pub fn occupied_slots(&self) -> Vec<u16> {
        self.state
            .lock()
            .library
            .iter()
            .enumerate()
            .filter(|(_, occupied)| **occupied)
            .map(|(i, _)| i as u16)
            .collect()
    }

    /// Mark one slot free or occupied
    pub fn set_occupied(&self, slot: u16, occupied: bool) {
        if let Some(s) = self.state.lock().library.get_mut(slot as usize) {
            *s = occupied;
        }
    }

    /// Change the finger behaviour
    pub fn set_finger(&self, model: FingerModel) {
        self.state.lock().set_finger(model);
    }

    /// Answer every `command` with `code` until cleared
    pub fn fail(&self, command: Command, code: ConfirmationCode) {
        self.state.lock().failures.insert(command, code);
    }

    /// Stop failing `command`
    pub fn clear_failure(&self, command: Command) {
        self.state.lock().failures.remove(&command);
    }

    /// Never answer `command`
    pub fn set_silent(&self, command: Command, silent: bool) {
        let mut state = self.state.lock();
        if silent {
            state.silent.insert(command);
        } else {
            state.silent.remove(&command);
        }
    }

    /// Stop answering anything, as if the module lost power
    pub fn set_unplugged(&self, unplugged: bool) {
        self.state.lock().unplugged = unplugged;
    }

    /// Answer `Search` with a match, or with "not found" on `None`
    pub fn set_match(&self, result: Option<(u16, u16)>) {
        self.state.lock().search_result = result;
    }

    /// Bytes waiting on the line right now
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.state.lock().pending.put_slice(bytes);
    }

    /// Bytes sent just ahead of the next reply
    pub fn prefix_next_reply(&self, bytes: &[u8]) {
        self.state.lock().reply_prefix.extend_from_slice(bytes);
    }

    /// Break the checksum of the next reply
    pub fn corrupt_next_reply(&self) {
        self.state.lock().corrupt_next = true;
    }
}
