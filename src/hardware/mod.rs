//! Image sensor abstraction.
//!
//! The core only sees the sensor as a capability set. Real backends and
//! the bundled [`SimulatedSensor`] both implement [`Sensor`] and
//! [`SensorHandle`].

mod sensor;
mod simulated;

pub use sensor::{
    ConfigurationKind, EventSink, Parameters, PictureFormat, PreviewTarget, RequestTag, Sensor,
    SensorError, SensorEvent, SensorHandle,
};
pub use simulated::{
    InjectedFaults, SensorCall, SensorProbe, SimulatedHandle, SimulatedSensor,
    SimulatedSensorConfig,
};
