//! Sensor capability set.
//!
//! The hardware is modelled as two traits: [`Sensor`] opens an exclusive
//! session and [`SensorHandle`] is that session. Slow operations (focus,
//! capture) return immediately and post their result later as a
//! [`SensorEvent`] on the [`EventSink`] supplied at open time.

use crate::capture::EncodedImage;
use crate::negotiation::Size;
use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by the hardware layer.
#[derive(Debug, Clone, Error)]
pub enum SensorError {
    #[error("sensor unavailable: {0}")]
    Unavailable(String),
    #[error("sensor already in use")]
    InUse,
    #[error("failed to bind preview output: {0}")]
    Bind(String),
    #[error("parameters rejected: {0}")]
    Parameters(String),
    #[error("streaming failed: {0}")]
    Streaming(String),
    #[error("request rejected: {0}")]
    Request(String),
}

/// The two independently advertised size lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigurationKind {
    /// Sizes usable for the live preview stream.
    Preview,
    /// Sizes usable for still pictures.
    Picture,
}

/// Encodings a sensor may produce for still pictures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PictureFormat {
    Jpeg,
    Nv21,
    Yuyv,
    Rgb565,
}

/// A parameter set committed to an open handle.
///
/// `None` fields leave the hardware default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    /// Preview stream size.
    pub preview_size: Option<Size>,
    /// Still picture size.
    pub picture_size: Option<Size>,
    /// Still picture encoding.
    pub picture_format: Option<PictureFormat>,
}

/// Opaque identifier of the surface the preview is drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PreviewTarget {
    id: u64,
}

impl PreviewTarget {
    pub fn new(id: u64) -> Self {
        Self { id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Identifies an asynchronous request.
///
/// `epoch` names the handle the request was issued on; `session` names
/// the capture session. Both are echoed back in the matching event so
/// late results can be recognised and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestTag {
    pub epoch: u64,
    pub session: u64,
}

/// Results delivered by the hardware on its dispatch context.
#[derive(Debug, Clone)]
pub enum SensorEvent {
    /// A focus request finished.
    FocusCompleted { tag: RequestTag, success: bool },
    /// A capture request produced an encoded picture.
    PictureTaken { tag: RequestTag, image: EncodedImage },
    /// The device failed while the handle was open.
    Fault { epoch: u64, reason: String },
}

impl SensorEvent {
    /// Handle epoch the event belongs to.
    pub fn epoch(&self) -> u64 {
        match self {
            SensorEvent::FocusCompleted { tag, .. } | SensorEvent::PictureTaken { tag, .. } => {
                tag.epoch
            }
            SensorEvent::Fault { epoch, .. } => *epoch,
        }
    }
}

/// Where a sensor posts its asynchronous results.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<SensorEvent>,
}

impl EventSink {
    pub fn new(tx: Sender<SensorEvent>) -> Self {
        Self { tx }
    }

    /// Posts an event; a closed receiver means nobody is listening any more.
    pub fn post(&self, event: SensorEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Event receiver gone, dropping sensor event");
        }
    }
}

/// Factory for exclusive sensor sessions.
pub trait Sensor: Send {
    /// The open session type.
    type Handle: SensorHandle;

    /// Opens the sensor. `epoch` is stamped on faults the handle reports.
    fn open(&mut self, events: EventSink, epoch: u64) -> Result<Self::Handle, SensorError>;
}

/// An open, exclusively owned sensor session.
///
/// [`SensorHandle::release`] consumes the handle, so it cannot be used
/// afterwards.
pub trait SensorHandle: Send {
    /// Sizes the hardware advertises for `kind`, in hardware order.
    fn supported_sizes(&self, kind: ConfigurationKind) -> Vec<Size>;

    /// Still picture encodings the hardware advertises.
    fn supported_picture_formats(&self) -> Vec<PictureFormat>;

    /// Attaches the preview output.
    fn bind_preview(&mut self, target: &PreviewTarget) -> Result<(), SensorError>;

    /// Commits a parameter set.
    fn set_parameters(&mut self, parameters: &Parameters) -> Result<(), SensorError>;

    /// Starts the live preview stream.
    fn start_streaming(&mut self) -> Result<(), SensorError>;

    /// Stops the live preview stream.
    fn stop_streaming(&mut self);

    /// Starts focusing; completion arrives as [`SensorEvent::FocusCompleted`].
    fn request_focus(&mut self, tag: RequestTag) -> Result<(), SensorError>;

    /// Takes a picture; the data arrives as [`SensorEvent::PictureTaken`].
    fn request_capture(&mut self, tag: RequestTag) -> Result<(), SensorError>;

    /// Closes the session.
    fn release(self);
}
