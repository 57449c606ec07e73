//! In-process sensor double.
//!
//! Behaves like a single physical camera: one session at a time,
//! asynchronous focus and capture results, and injectable failures.
//! Every call is recorded so tests can assert on hardware traffic.

use super::sensor::{
    ConfigurationKind, EventSink, Parameters, PictureFormat, PreviewTarget, RequestTag, Sensor,
    SensorError, SensorEvent, SensorHandle,
};
use crate::capture::EncodedImage;
use crate::negotiation::Size;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Hardware behaviour of a [`SimulatedSensor`].
#[derive(Debug, Clone)]
pub struct SimulatedSensorConfig {
    /// Advertised preview sizes.
    pub preview_sizes: Vec<Size>,
    /// Advertised picture sizes.
    pub picture_sizes: Vec<Size>,
    /// Advertised picture encodings.
    pub picture_formats: Vec<PictureFormat>,
    /// Focus outcome reported for every request.
    pub focus_succeeds: bool,
    /// Injected failures.
    pub faults: InjectedFaults,
}

impl Default for SimulatedSensorConfig {
    fn default() -> Self {
        Self {
            preview_sizes: vec![
                Size::new(320, 240),
                Size::new(640, 480),
                Size::new(1280, 720),
                Size::new(1920, 1080),
            ],
            picture_sizes: vec![
                Size::new(640, 480),
                Size::new(1280, 720),
                Size::new(1920, 1080),
                Size::new(2592, 1944),
            ],
            picture_formats: vec![PictureFormat::Nv21, PictureFormat::Jpeg],
            focus_succeeds: true,
            faults: InjectedFaults::default(),
        }
    }
}

/// Operations that should fail.
#[derive(Debug, Clone, Default)]
pub struct InjectedFaults {
    pub open: bool,
    pub bind: bool,
    pub parameters: bool,
    pub streaming: bool,
    pub focus_request: bool,
    pub capture_request: bool,
}

/// A recorded hardware call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorCall {
    Open,
    BindPreview(PreviewTarget),
    SetParameters(Parameters),
    StartStreaming,
    StopStreaming,
    RequestFocus(RequestTag),
    RequestCapture(RequestTag),
    Release,
}

#[derive(Debug, Default)]
struct SharedState {
    calls: Vec<SensorCall>,
    open: bool,
    hold_events: bool,
    held: Vec<SensorEvent>,
    sink: Option<EventSink>,
    epoch: u64,
    pictures_taken: u64,
}

fn lock(state: &Mutex<SharedState>) -> MutexGuard<'_, SharedState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Simulated camera.
#[derive(Debug)]
pub struct SimulatedSensor {
    config: SimulatedSensorConfig,
    state: Arc<Mutex<SharedState>>,
}

impl SimulatedSensor {
    pub fn new(config: SimulatedSensorConfig) -> Self {
        Self {
            config,
            state: Arc::default(),
        }
    }

    /// Returns a probe sharing this sensor's recorded state.
    pub fn probe(&self) -> SensorProbe {
        SensorProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new(SimulatedSensorConfig::default())
    }
}

impl Sensor for SimulatedSensor {
    type Handle = SimulatedHandle;

    fn open(&mut self, events: EventSink, epoch: u64) -> Result<SimulatedHandle, SensorError> {
        let mut state = lock(&self.state);
        state.calls.push(SensorCall::Open);

        if self.config.faults.open {
            return Err(SensorError::Unavailable("simulated open failure".into()));
        }
        if state.open {
            return Err(SensorError::InUse);
        }

        state.open = true;
        state.sink = Some(events.clone());
        state.epoch = epoch;
        tracing::info!(epoch, "Simulated sensor opened");

        Ok(SimulatedHandle {
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            events,
            parameters: Parameters::default(),
            streaming: false,
        })
    }
}

/// Open session on a [`SimulatedSensor`].
#[derive(Debug)]
pub struct SimulatedHandle {
    config: SimulatedSensorConfig,
    state: Arc<Mutex<SharedState>>,
    events: EventSink,
    parameters: Parameters,
    streaming: bool,
}

impl SimulatedHandle {
    fn record(&self, call: SensorCall) {
        lock(&self.state).calls.push(call);
    }

    fn emit(&self, mut state: MutexGuard<'_, SharedState>, event: SensorEvent) {
        if state.hold_events {
            state.held.push(event);
        } else {
            drop(state);
            self.events.post(event);
        }
    }

    fn picture_payload(&self, tag: RequestTag, sequence: u64) -> EncodedImage {
        let size = self.parameters.picture_size.unwrap_or(Size::new(640, 480));
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend_from_slice(&size.width.to_be_bytes());
        bytes.extend_from_slice(&size.height.to_be_bytes());
        bytes.extend_from_slice(&tag.session.to_be_bytes());
        bytes.extend_from_slice(&sequence.to_be_bytes());
        bytes.extend_from_slice(&[0xFF, 0xD9]);
        EncodedImage::new(bytes, self.parameters.picture_format.unwrap_or(PictureFormat::Jpeg))
    }
}

impl SensorHandle for SimulatedHandle {
    fn supported_sizes(&self, kind: ConfigurationKind) -> Vec<Size> {
        match kind {
            ConfigurationKind::Preview => self.config.preview_sizes.clone(),
            ConfigurationKind::Picture => self.config.picture_sizes.clone(),
        }
    }

    fn supported_picture_formats(&self) -> Vec<PictureFormat> {
        self.config.picture_formats.clone()
    }

    fn bind_preview(&mut self, target: &PreviewTarget) -> Result<(), SensorError> {
        self.record(SensorCall::BindPreview(*target));
        if self.config.faults.bind {
            return Err(SensorError::Bind("simulated bind failure".into()));
        }
        Ok(())
    }

    fn set_parameters(&mut self, parameters: &Parameters) -> Result<(), SensorError> {
        self.record(SensorCall::SetParameters(parameters.clone()));
        if self.config.faults.parameters {
            return Err(SensorError::Parameters("simulated rejection".into()));
        }
        if self.streaming {
            return Err(SensorError::Parameters("cannot reconfigure while streaming".into()));
        }
        self.parameters = parameters.clone();
        Ok(())
    }

    fn start_streaming(&mut self) -> Result<(), SensorError> {
        self.record(SensorCall::StartStreaming);
        if self.config.faults.streaming {
            return Err(SensorError::Streaming("simulated streaming failure".into()));
        }
        self.streaming = true;
        Ok(())
    }

    fn stop_streaming(&mut self) {
        self.record(SensorCall::StopStreaming);
        self.streaming = false;
    }

    fn request_focus(&mut self, tag: RequestTag) -> Result<(), SensorError> {
        let mut state = lock(&self.state);
        state.calls.push(SensorCall::RequestFocus(tag));
        if self.config.faults.focus_request {
            return Err(SensorError::Request("simulated focus failure".into()));
        }
        if !self.streaming {
            return Err(SensorError::Request("focus requires streaming".into()));
        }
        let success = self.config.focus_succeeds;
        self.emit(state, SensorEvent::FocusCompleted { tag, success });
        Ok(())
    }

    fn request_capture(&mut self, tag: RequestTag) -> Result<(), SensorError> {
        let mut state = lock(&self.state);
        state.calls.push(SensorCall::RequestCapture(tag));
        if self.config.faults.capture_request {
            return Err(SensorError::Request("simulated capture failure".into()));
        }
        state.pictures_taken += 1;
        let image = self.picture_payload(tag, state.pictures_taken);
        self.emit(state, SensorEvent::PictureTaken { tag, image });
        Ok(())
    }

    fn release(self) {
        // Drop does the bookkeeping.
    }
}

impl Drop for SimulatedHandle {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.calls.push(SensorCall::Release);
        state.open = false;
        tracing::info!(epoch = state.epoch, "Simulated sensor released");
    }
}

/// Test and demo access to a [`SimulatedSensor`]'s state.
#[derive(Debug, Clone)]
pub struct SensorProbe {
    state: Arc<Mutex<SharedState>>,
}

impl SensorProbe {
    /// All calls made so far.
    pub fn calls(&self) -> Vec<SensorCall> {
        lock(&self.state).calls.clone()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&SensorCall) -> bool) -> usize {
        lock(&self.state).calls.iter().filter(|c| pred(*c)).count()
    }

    /// Returns true while a handle is open.
    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// Holds asynchronous results instead of posting them.
    pub fn hold_events(&self, hold: bool) {
        lock(&self.state).hold_events = hold;
    }

    /// Posts every held result, even if the handle has since been released.
    pub fn flush_held(&self) -> usize {
        let (held, sink) = {
            let mut state = lock(&self.state);
            (std::mem::take(&mut state.held), state.sink.clone())
        };
        let count = held.len();
        if let Some(sink) = sink {
            for event in held {
                sink.post(event);
            }
        }
        count
    }

    /// Posts a device fault for the most recently opened handle.
    pub fn inject_fault(&self, reason: &str) {
        let (epoch, sink) = {
            let state = lock(&self.state);
            (state.epoch, state.sink.clone())
        };
        if let Some(sink) = sink {
            sink.post(SensorEvent::Fault {
                epoch,
                reason: reason.to_string(),
            });
        }
    }
}
