//! Still Capture Library
//!
//! Operates an image sensor to take one still photograph and hand the
//! encoded bytes to a downstream consumer.
//!
//! # Architecture
//!
//! ```text
//! surface lifecycle ──► camera (handle owner) ◄── negotiation (size pick)
//!                            ▲
//! user trigger ──► capture (session + pipeline) ──► handoff
//!                            ▲
//!            hardware callbacks (dispatch thread)
//! ```
//!
//! # Design Principles
//!
//! - **One owner**: only the resource manager holds the sensor handle
//! - **Handle follows surface**: opened on create, released on destroy
//! - **Explicit sequencing**: focus, capture and handoff are state
//!   machine transitions, not nested callbacks
//! - **Late callbacks are harmless**: results for a released handle or a
//!   finished session are dropped
//!
//! # Example
//!
//! ```no_run
//! use still_capture::{
//!     capture::{CapturePipeline, FileConfig},
//!     handoff::{DirectoryHandoff, LogNotifier},
//!     hardware::{PreviewTarget, SimulatedSensor},
//!     metrics::CaptureMetrics,
//!     negotiation::DisplayExtent,
//! };
//!
//! let config = FileConfig::default();
//! let pipeline = CapturePipeline::new(
//!     SimulatedSensor::default(),
//!     DirectoryHandoff::new("captures", "photo"),
//!     LogNotifier,
//!     &config,
//!     CaptureMetrics::new().unwrap(),
//! );
//! let dispatcher = pipeline.spawn_dispatcher().unwrap();
//!
//! pipeline.surface_created(PreviewTarget::new(1));
//! pipeline.surface_changed(DisplayExtent::new(1280, 720).unwrap());
//! pipeline.trigger_focus();
//!
//! // ... later, when the surface goes away
//! pipeline.surface_destroyed();
//! dispatcher.stop();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod camera;
pub mod capture;
pub mod handoff;
pub mod hardware;
pub mod metrics;
pub mod negotiation;

// Re-export commonly used types at crate root
pub use camera::{CameraError, CameraResourceManager, HandleState};
pub use capture::{CapturePipeline, EncodedImage, FileConfig, TriggerOutcome};
pub use handoff::{Handoff, Notice, Notifier};
pub use hardware::{Sensor, SensorEvent, SensorHandle, SimulatedSensor};
pub use negotiation::{select_best, DisplayExtent, SelectionMode, Size, SizeNegotiator};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
