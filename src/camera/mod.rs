//! Camera resource lifecycle.
//!
//! [`CameraResourceManager`] is the only owner of the sensor handle.
//! Everything else reaches the hardware through it.

mod manager;

pub use manager::{CameraError, CameraResourceManager, HandleState, SurfaceConfiguration};
