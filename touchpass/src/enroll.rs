//! Enrollment state machine
//!
//! A finger is enrolled from six captures, each extracted into its own char
//! buffer, with the finger lifted in between. The buffers are merged into
//! one template, stored at a slot allocated up front, and the finger record
//! is persisted for that slot.
//!
//! ```text
//! Idle -> Capture(1) -> LiftWait(1) -> ... -> LiftWait(5) -> Capture(6) -> Merging -> Done
//! ```
//!
//! The machine never sleeps. The caller drives it with [`Enrollment::step`],
//! which issues at most one capture (plus extraction) or the merge per call.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use touchpass_core::{constants::buffers, ConfirmationCode};
use touchpass_transport::Transport;
use touchpass_types::{FingerRecord, LedConfig, LogicalFingerId};

use crate::error::Error;
use crate::sensor::Sensor;
use crate::store::FingerStore;

/// Whole-session limit, measured from a successful start
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const PROMPTS: [&str; buffers::ENROLL_CAPTURES as usize] = [
    "Place finger on sensor",
    "Lift and place again",
    "Again, adjust slightly",
    "Now adjust your grip",
    "Place again",
    "One more time",
];

const MERGING_PROMPT: &str = "Creating template...";

/// Capture number, 1 through 6
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Step(u8);

impl Step {
    pub const FIRST: Self = Self(1);
    pub const LAST: Self = Self(buffers::ENROLL_CAPTURES);

    /// Lifting after this capture marks roughly half way
    const HALFWAY: Self = Self(4);

    pub fn new(n: u8) -> Option<Self> {
        (Self::FIRST.0..=Self::LAST.0).contains(&n).then_some(Self(n))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    fn next(self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    /// Char buffer receiving this capture
    fn buffer(self) -> u8 {
        self.0
    }

    fn prompt(self) -> &'static str {
        PROMPTS[usize::from(self.0 - 1)]
    }
}

/// Why an enrollment did not complete
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnrollError {
    #[error("Library full")]
    LibraryFull,

    #[error("Timeout")]
    Timeout,

    #[error("Image capture failed")]
    CaptureFailed,

    #[error("Feature extraction failed")]
    ExtractionFailed,

    #[error("Template merge failed")]
    MergeFailed,

    #[error("Store failed")]
    StoreFailed,

    #[error("Storage failed")]
    StorageFailed,

    #[error("Enrollment already in progress")]
    InProgress,
}

/// What to enroll
#[derive(Clone, PartialEq, Eq)]
pub struct EnrollRequest {
    pub name: String,
    pub credential: String,
    pub press_enter: bool,
    pub finger_id: LogicalFingerId,
}

impl EnrollRequest {
    pub fn new(
        name: impl Into<String>,
        credential: impl Into<String>,
        press_enter: bool,
        finger_id: LogicalFingerId,
    ) -> Self {
        Self {
            name: name.into(),
            credential: credential.into(),
            press_enter,
            finger_id,
        }
    }

    fn to_record(&self) -> FingerRecord {
        FingerRecord::new(
            self.name.clone(),
            self.credential.clone(),
            self.press_enter,
            self.finger_id,
        )
    }
}

impl std::fmt::Debug for EnrollRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrollRequest")
            .field("name", &self.name)
            .field("credential", &"<redacted>")
            .field("press_enter", &self.press_enter)
            .field("finger_id", &self.finger_id)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Capture(Step),
    LiftWait(Step),
    Merging,
}

#[derive(Debug)]
struct Session {
    request: EnrollRequest,
    slot: u16,
    phase: Phase,
    deadline: Instant,
    /// Indicator cue deferred to the next step
    pending_cue: Option<LedConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Outcome {
    success: bool,
    slot: u16,
    step: u8,
}

#[derive(Debug)]
enum State {
    Idle,
    Active(Session),
    Done(Outcome),
}

/// Progress snapshot for hosts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollStatus {
    /// A session is running
    pub active: bool,
    /// Current capture, 1-6; 0 when idle
    pub step: u8,
    pub merging: bool,
    /// Instruction for the user
    pub message: &'static str,
    pub done: bool,
    pub success: bool,
    pub error: Option<String>,
    /// Slot of the stored template after a successful enrollment
    pub slot: Option<u16>,
}

/// Single enrollment session driver
#[derive(Debug)]
pub struct Enrollment {
    state: State,
    last_error: Option<EnrollError>,
    timeout: Duration,
}

impl Enrollment {
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            last_error: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set the whole-session limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether a session is between start and a terminal state
    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    pub fn last_error(&self) -> Option<&EnrollError> {
        self.last_error.as_ref()
    }

    /// Begin enrolling `request`
    ///
    /// Any template and record already held for the same logical finger are
    /// deleted first, then the lowest free slot is allocated. Returns the
    /// allocated slot; no capture is issued before it is known.
    ///
    /// # Errors
    ///
    /// - [`EnrollError::InProgress`] while another session is active
    /// - [`EnrollError::LibraryFull`] when no slot is free
    /// - [`EnrollError::StorageFailed`] when the record store cannot be queried
    pub async fn start_enrollment<T, S>(
        &mut self,
        sensor: &mut Sensor<T>,
        store: &S,
        request: EnrollRequest,
        now: Instant,
    ) -> Result<u16, EnrollError>
    where
        T: Transport,
        S: FingerStore + ?Sized,
    {
        if self.is_active() {
            return Err(EnrollError::InProgress);
        }

        match store.find_by_logical_id(request.finger_id) {
            Ok(Some(existing)) => {
                info!("Replacing {} at slot {}", request.finger_id, existing);
                if let Err(e) = sensor.delete_template(existing).await {
                    warn!(slot = existing, error = %e, "Failed to delete old template");
                }
                if let Err(e) = store.delete(existing) {
                    warn!(slot = existing, error = %e, "Failed to delete old record");
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Record lookup failed");
                return self.reject(EnrollError::StorageFailed);
            }
        }

        let slot = match sensor.find_empty_slot().await {
            Some(slot) if slot < sensor.library_size() => slot,
            _ => return self.reject(EnrollError::LibraryFull),
        };

        info!("Enrolling {} into slot {}", request.finger_id, slot);

        self.state = State::Active(Session {
            request,
            slot,
            phase: Phase::Capture(Step::FIRST),
            deadline: now + self.timeout,
            pending_cue: None,
        });
        self.last_error = None;

        cue(sensor, LedConfig::PROMPT).await;

        Ok(slot)
    }

    fn reject(&mut self, error: EnrollError) -> Result<u16, EnrollError> {
        warn!("Enrollment not started: {}", error);
        self.state = State::Idle;
        self.last_error = Some(error.clone());
        Err(error)
    }

    /// Advance the active session by at most one transition
    ///
    /// Checks the deadline before touching the sensor. Does nothing while
    /// idle or done.
    pub async fn step<T, S>(&mut self, sensor: &mut Sensor<T>, store: &S, now: Instant) -> EnrollStatus
    where
        T: Transport,
        S: FingerStore + ?Sized,
    {
        let (phase, deadline, pending_cue) = match &mut self.state {
            State::Active(session) => (session.phase, session.deadline, session.pending_cue.take()),
            _ => return self.status(),
        };

        if now >= deadline {
            self.fail(sensor, EnrollError::Timeout).await;
            return self.status();
        }

        if let Some(config) = pending_cue {
            cue(sensor, config).await;
        }

        match phase {
            Phase::Capture(step) => self.capture(sensor, step).await,
            Phase::LiftWait(step) => self.lift_wait(sensor, step).await,
            Phase::Merging => self.merge(sensor, store).await,
        }

        self.status()
    }

    async fn capture<T: Transport>(&mut self, sensor: &mut Sensor<T>, step: Step) {
        match sensor.capture_image().await {
            Ok(()) => {}
            Err(e) if is_waiting(&e) => return,
            Err(e) => {
                warn!(step = step.get(), error = %e, "Capture failed");
                self.fail(sensor, EnrollError::CaptureFailed).await;
                return;
            }
        }

        if let Err(e) = sensor.generate_characteristics(step.buffer()).await {
            warn!(step = step.get(), error = %e, "Extraction failed");
            self.fail(sensor, EnrollError::ExtractionFailed).await;
            return;
        }

        debug!("Capture {} stored in buffer {}", step.get(), step.buffer());

        if step == Step::LAST {
            self.set_phase(Phase::Merging);
            cue(sensor, LedConfig::WORKING).await;
        } else {
            self.set_phase(Phase::LiftWait(step));
            cue(sensor, LedConfig::CAPTURE_OK).await;
        }
    }

    async fn lift_wait<T: Transport>(&mut self, sensor: &mut Sensor<T>, step: Step) {
        if !sensor.is_finger_lifted().await {
            return;
        }

        let Some(next) = step.next() else {
            return;
        };
        self.set_phase(Phase::Capture(next));

        if step == Step::HALFWAY {
            cue(sensor, LedConfig::HALFWAY).await;
            if let State::Active(session) = &mut self.state {
                session.pending_cue = Some(LedConfig::PROMPT);
            }
        } else {
            cue(sensor, LedConfig::PROMPT).await;
        }
    }

    async fn merge<T, S>(&mut self, sensor: &mut Sensor<T>, store: &S)
    where
        T: Transport,
        S: FingerStore + ?Sized,
    {
        let (slot, record) = match &self.state {
            State::Active(session) => (session.slot, session.request.to_record()),
            _ => return,
        };

        if let Err(e) = sensor.create_template().await {
            warn!(error = %e, "Template merge failed");
            self.fail(sensor, EnrollError::MergeFailed).await;
            return;
        }

        if let Err(e) = sensor.store_template(buffers::PRIMARY, slot).await {
            warn!(slot, error = %e, "Template store failed");
            self.fail(sensor, EnrollError::StoreFailed).await;
            return;
        }

        if let Err(e) = store.save(slot, &record) {
            warn!(slot, error = %e, "Record save failed");
            self.fail(sensor, EnrollError::StorageFailed).await;
            return;
        }

        info!("Enrolled {} ({}) at slot {}", record.finger_id, record.name, slot);

        self.state = State::Done(Outcome {
            success: true,
            slot,
            step: Step::LAST.get(),
        });
        cue(sensor, LedConfig::SUCCESS).await;
    }

    async fn fail<T: Transport>(&mut self, sensor: &mut Sensor<T>, error: EnrollError) {
        let (slot, step) = match &self.state {
            State::Active(session) => (session.slot, phase_step(session.phase)),
            _ => (0, 0),
        };

        info!("Enrollment failed at step {}: {}", step, error);

        self.state = State::Done(Outcome {
            success: false,
            slot,
            step,
        });
        self.last_error = Some(error);

        cue(sensor, LedConfig::FAILURE).await;
    }

    fn set_phase(&mut self, phase: Phase) {
        if let State::Active(session) = &mut self.state {
            debug!("Enrollment {:?} -> {:?}", session.phase, phase);
            session.phase = phase;
        }
    }

    /// Abandon the session
    ///
    /// Nothing is sent to the sensor; a template deleted when the session
    /// started stays deleted. Returns whether a session was running.
    pub fn cancel(&mut self) -> bool {
        let was_active = self.is_active();
        if was_active {
            info!("Enrollment cancelled");
        }
        self.state = State::Idle;
        self.last_error = None;
        was_active
    }

    pub fn status(&self) -> EnrollStatus {
        let error = self.last_error.as_ref().map(ToString::to_string);

        match &self.state {
            State::Idle => EnrollStatus {
                active: false,
                step: 0,
                merging: false,
                message: "",
                done: false,
                success: false,
                error,
                slot: None,
            },
            State::Active(session) => {
                let (message, merging) = match session.phase {
                    Phase::Capture(step) | Phase::LiftWait(step) => (step.prompt(), false),
                    Phase::Merging => (MERGING_PROMPT, true),
                };
                EnrollStatus {
                    active: true,
                    step: phase_step(session.phase),
                    merging,
                    message,
                    done: false,
                    success: false,
                    error: None,
                    slot: None,
                }
            }
            State::Done(outcome) => EnrollStatus {
                active: false,
                step: outcome.step,
                merging: false,
                message: "",
                done: true,
                success: outcome.success,
                error,
                slot: outcome.success.then_some(outcome.slot),
            },
        }
    }
}

impl Default for Enrollment {
    fn default() -> Self {
        Self::new()
    }
}

fn phase_step(phase: Phase) -> u8 {
    match phase {
        Phase::Capture(step) | Phase::LiftWait(step) => step.get(),
        Phase::Merging => Step::LAST.get(),
    }
}

/// Capture results that mean "try again on the next step"
fn is_waiting(error: &Error) -> bool {
    error.sensor_code() == Some(ConfirmationCode::NoFinger) || error.is_timeout()
}

/// Indicator cue; a failed LED command never fails the enrollment
async fn cue<T: Transport>(sensor: &mut Sensor<T>, config: LedConfig) {
    if let Err(e) = sensor.set_led(config).await {
        warn!(error = %e, "LED cue {:?} failed", config.mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, MockFingerStore};
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use touchpass_core::Command;
    use touchpass_transport::{FingerModel, SimHandle, SimulatedSensor};

    async fn setup(sim: SimulatedSensor) -> (Sensor<SimulatedSensor>, SimHandle) {
        let handle = sim.handle();
        let mut sensor = Sensor::new(sim);
        sensor.connect().await.unwrap();
        sensor.read_system_parameters().await.unwrap();
        handle.clear_log();
        (sensor, handle)
    }

    fn work_request() -> EnrollRequest {
        EnrollRequest::new("Work", "secret123", false, LogicalFingerId::new(0).unwrap())
    }

    async fn run_to_done<S: FingerStore + ?Sized>(
        enrollment: &mut Enrollment,
        sensor: &mut Sensor<SimulatedSensor>,
        store: &S,
    ) -> EnrollStatus {
        for _ in 0..64 {
            let status = enrollment.step(sensor, store, Instant::now()).await;
            if status.done {
                return status;
            }
        }
        panic!("Enrollment did not finish: {:?}", enrollment.status());
    }

    #[test]
    fn test_step_bounds() {
        assert_eq!(Step::new(0), None);
        assert_eq!(Step::new(7), None);
        assert_eq!(Step::new(6), Some(Step::LAST));
        assert_eq!(Step::LAST.next(), None);
        assert_eq!(Step::FIRST.prompt(), "Place finger on sensor");
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path() {
        let (mut sensor, handle) =
            setup(SimulatedSensor::new().with_finger(FingerModel::Alternating)).await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        let slot = enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();
        assert_eq!(slot, 0);

        let status = run_to_done(&mut enrollment, &mut sensor, &store).await;
        assert_eq!(
            status,
            EnrollStatus {
                active: false,
                step: 6,
                merging: false,
                message: "",
                done: true,
                success: true,
                error: None,
                slot: Some(0),
            }
        );

        let record = store.load(0).unwrap().unwrap();
        assert_eq!(record.name, "Work");
        assert_eq!(record.credential, "secret123");
        assert!(!record.press_enter);
        assert_eq!(record.finger_id.get(), 0);

        assert_eq!(handle.occupied_slots(), vec![0]);
        assert_eq!(handle.count(Command::Img2Tz), 6);
        assert_eq!(handle.count(Command::RegModel), 1);
        assert_eq!(
            handle.last_params(Command::Store).unwrap().as_ref(),
            &[0x01, 0x00, 0x00]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffers_in_order() {
        let (mut sensor, handle) =
            setup(SimulatedSensor::new().with_finger(FingerModel::Alternating)).await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();
        run_to_done(&mut enrollment, &mut sensor, &store).await;

        let buffers: Vec<Bytes> = handle.params(Command::Img2Tz);
        let expected: Vec<Bytes> = (1..=6u8).map(|b| Bytes::copy_from_slice(&[b])).collect();
        assert_eq!(buffers, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_led_cues() {
        let (mut sensor, handle) =
            setup(SimulatedSensor::new().with_finger(FingerModel::Alternating)).await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();
        run_to_done(&mut enrollment, &mut sensor, &store).await;

        let prompt = Bytes::copy_from_slice(&LedConfig::PROMPT.params());
        let ok = Bytes::copy_from_slice(&LedConfig::CAPTURE_OK.params());
        let halfway = Bytes::copy_from_slice(&LedConfig::HALFWAY.params());
        let working = Bytes::copy_from_slice(&LedConfig::WORKING.params());
        let success = Bytes::copy_from_slice(&LedConfig::SUCCESS.params());

        assert_eq!(
            handle.led_log(),
            vec![
                prompt.clone(),
                ok.clone(),
                prompt.clone(),
                ok.clone(),
                prompt.clone(),
                ok.clone(),
                prompt.clone(),
                ok.clone(),
                halfway,
                prompt.clone(),
                ok.clone(),
                prompt,
                working,
                success,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_same_finger() {
        let (mut sensor, handle) = setup(
            SimulatedSensor::new()
                .with_finger(FingerModel::Alternating)
                .with_occupied(&[0, 3]),
        )
        .await;
        let store = MemoryStore::new();
        let id = LogicalFingerId::new(0).unwrap();
        store
            .save(3, &FingerRecord::new("Old", "old", true, id))
            .unwrap();
        store
            .save(0, &FingerRecord::new("Other", "x", false, LogicalFingerId::new(1).unwrap()))
            .unwrap();

        let mut enrollment = Enrollment::new();
        let slot = enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();

        assert_eq!(slot, 1);
        assert_eq!(handle.last_params(Command::DeletChar).unwrap().as_ref(), &[0, 3, 0, 1]);
        assert_eq!(store.load(3).unwrap(), None);

        let status = run_to_done(&mut enrollment, &mut sensor, &store).await;
        assert!(status.success);

        let with_id: Vec<u16> = store
            .slots()
            .unwrap()
            .into_iter()
            .filter(|&slot| store.load(slot).unwrap().is_some_and(|r| r.finger_id == id))
            .collect();
        assert_eq!(with_id, vec![1]);
        assert_eq!(handle.occupied_slots(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_when_finger_never_lifted() {
        let (mut sensor, _) = setup(SimulatedSensor::new().with_finger(FingerModel::Present)).await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();
        let start = Instant::now();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), start)
            .await
            .unwrap();

        for _ in 0..5 {
            let status = enrollment.step(&mut sensor, &store, start).await;
            assert!(status.active);
            assert_eq!(status.step, 1);
        }

        let status = enrollment
            .step(&mut sensor, &store, start + Duration::from_secs(61))
            .await;
        assert!(status.done);
        assert!(!status.success);
        assert_eq!(status.error.as_deref(), Some("Timeout"));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_timeout() {
        let (mut sensor, handle) = setup(SimulatedSensor::new()).await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new().with_timeout(Duration::from_secs(5));
        let start = Instant::now();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), start)
            .await
            .unwrap();
        let captures = handle.count(Command::GenImg);

        let status = enrollment
            .step(&mut sensor, &store, start + Duration::from_secs(5))
            .await;
        assert_eq!(status.error.as_deref(), Some("Timeout"));
        // Deadline is checked before the sensor is touched
        assert_eq!(handle.count(Command::GenImg), captures);
    }

    #[tokio::test(start_paused = true)]
    async fn test_library_full() {
        let slots: Vec<u16> = (0..10).collect();
        let (mut sensor, handle) = setup(
            SimulatedSensor::new()
                .with_library_size(10)
                .with_occupied(&slots)
                .with_finger(FingerModel::Present),
        )
        .await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        let result = enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await;

        assert_eq!(result, Err(EnrollError::LibraryFull));
        assert!(!enrollment.is_active());
        assert_eq!(handle.count(Command::GenImg), 0);

        let status = enrollment.status();
        assert!(!status.active);
        assert!(!status.done);
        assert_eq!(status.error.as_deref(), Some("Library full"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_finger() {
        let (mut sensor, handle) = setup(SimulatedSensor::new()).await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();

        for _ in 0..3 {
            let status = enrollment.step(&mut sensor, &store, Instant::now()).await;
            assert_eq!(status.step, 1);
            assert_eq!(status.message, "Place finger on sensor");
        }
        assert_eq!(handle.count(Command::Img2Tz), 0);

        handle.set_finger(FingerModel::Present);
        let status = enrollment.step(&mut sensor, &store, Instant::now()).await;
        assert_eq!(status.step, 1);
        assert_eq!(handle.count(Command::Img2Tz), 1);

        // Finger still down: stays in the lift wait
        let status = enrollment.step(&mut sensor, &store, Instant::now()).await;
        assert!(status.active);
        assert_eq!(status.step, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_link_timeout_keeps_waiting() {
        let (mut sensor, handle) = setup(SimulatedSensor::new()).await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();

        handle.set_silent(Command::GenImg, true);
        let status = enrollment.step(&mut sensor, &store, Instant::now()).await;
        assert!(status.active);
        assert_eq!(status.error, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_error_ends_session() {
        let (mut sensor, handle) = setup(SimulatedSensor::new().with_finger(FingerModel::Present)).await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();
        handle.fail(Command::GenImg, ConfirmationCode::ImageFailed);

        let status = enrollment.step(&mut sensor, &store, Instant::now()).await;
        assert!(status.done);
        assert_eq!(status.error.as_deref(), Some("Image capture failed"));
        assert_eq!(
            handle.led_log().last().unwrap().as_ref(),
            &LedConfig::FAILURE.params()
        );

        // Cancelling a finished session clears its error
        assert!(!enrollment.cancel());
        let status = enrollment.status();
        assert!(!status.done);
        assert_eq!(status.error, None);
        assert_eq!(enrollment.last_error(), None);

        handle.clear_failure(Command::GenImg);
        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();
        let status = enrollment.step(&mut sensor, &store, Instant::now()).await;
        assert_eq!(status.error, None);
        assert!(status.active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extraction_failure() {
        let (mut sensor, handle) = setup(SimulatedSensor::new().with_finger(FingerModel::Present)).await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();
        handle.fail(Command::Img2Tz, ConfirmationCode::ImageTooSmall);

        let status = enrollment.step(&mut sensor, &store, Instant::now()).await;
        assert!(status.done);
        assert!(!status.success);
        assert_eq!(status.error.as_deref(), Some("Feature extraction failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_merge_failure() {
        let (mut sensor, handle) =
            setup(SimulatedSensor::new().with_finger(FingerModel::Alternating)).await;
        handle.fail(Command::RegModel, ConfirmationCode::MergeFailed);
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();
        let status = run_to_done(&mut enrollment, &mut sensor, &store).await;

        assert_eq!(status.error.as_deref(), Some("Template merge failed"));
        assert_eq!(handle.count(Command::Store), 0);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure() {
        let (mut sensor, handle) =
            setup(SimulatedSensor::new().with_finger(FingerModel::Alternating)).await;
        handle.fail(Command::Store, ConfirmationCode::FlashWriteFailed);
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();
        let status = run_to_done(&mut enrollment, &mut sensor, &store).await;

        assert_eq!(status.error.as_deref(), Some("Store failed"));
        assert_eq!(status.slot, None);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure() {
        let (mut sensor, _) = setup(SimulatedSensor::new().with_finger(FingerModel::Alternating)).await;
        let mut store = MockFingerStore::new();
        store.expect_find_by_logical_id().returning(|_| Ok(None));
        store
            .expect_save()
            .times(1)
            .returning(|_, _| Err(Error::Storage("flash write failed".into())));

        let mut enrollment = Enrollment::new();
        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();
        let status = run_to_done(&mut enrollment, &mut sensor, &store).await;

        assert!(!status.success);
        assert_eq!(status.error.as_deref(), Some("Storage failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_led_failure_does_not_fail_enrollment() {
        let (mut sensor, handle) =
            setup(SimulatedSensor::new().with_finger(FingerModel::Alternating)).await;
        handle.fail(Command::AuraLedConfig, ConfirmationCode::PacketError);
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();
        let status = run_to_done(&mut enrollment, &mut sensor, &store).await;

        assert!(status.success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_rejected() {
        let (mut sensor, _) = setup(SimulatedSensor::new()).await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();

        let second = EnrollRequest::new("Home", "x", true, LogicalFingerId::new(5).unwrap());
        let result = enrollment
            .start_enrollment(&mut sensor, &store, second, Instant::now())
            .await;
        assert_eq!(result, Err(EnrollError::InProgress));
        assert!(enrollment.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let (mut sensor, handle) = setup(
            SimulatedSensor::new()
                .with_finger(FingerModel::Present)
                .with_occupied(&[2]),
        )
        .await;
        let store = MemoryStore::new();
        store
            .save(2, &FingerRecord::new("Old", "old", false, LogicalFingerId::new(0).unwrap()))
            .unwrap();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();
        enrollment.step(&mut sensor, &store, Instant::now()).await;
        handle.clear_log();

        assert!(enrollment.cancel());
        assert!(!enrollment.cancel());

        let status = enrollment.status();
        assert!(!status.active);
        assert!(!status.done);
        assert_eq!(status.step, 0);
        assert!(handle.commands().is_empty());

        // The pre-flight delete is not undone
        assert!(handle.occupied_slots().is_empty());
        assert_eq!(store.load(2).unwrap(), None);

        let status = enrollment.step(&mut sensor, &store, Instant::now()).await;
        assert!(!status.active);
        assert!(handle.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_after_start() {
        let (mut sensor, _) = setup(SimulatedSensor::new()).await;
        let store = MemoryStore::new();
        let mut enrollment = Enrollment::new();

        enrollment
            .start_enrollment(&mut sensor, &store, work_request(), Instant::now())
            .await
            .unwrap();

        assert_eq!(
            enrollment.status(),
            EnrollStatus {
                active: true,
                step: 1,
                merging: false,
                message: "Place finger on sensor",
                done: false,
                success: false,
                error: None,
                slot: None,
            }
        );
    }
}
