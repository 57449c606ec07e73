//! Still capture: session sequencing and orchestration.
//!
//! A capture runs focus, then exposure, then handoff. The sequencing
//! lives in a pure state machine ([`session`]); [`CapturePipeline`]
//! executes its commands against the camera and the collaborators.

mod config;
mod image;
mod pipeline;
pub mod session;

pub use config::{CaptureConfig, ConfigError, FileConfig, OutputConfig};
pub use image::EncodedImage;
pub use pipeline::{CapturePipeline, Dispatcher, TriggerOutcome};
pub use session::{BusyPolicy, CaptureSession, SessionPolicy};
