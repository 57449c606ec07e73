//! Exclusive ownership of the sensor handle.
//!
//! The handle's lifetime follows the rendering surface: it is opened
//! when the surface appears, configured and streamed when the surface
//! gets a size, and released when the surface goes away.

use crate::hardware::{
    ConfigurationKind, EventSink, Parameters, PictureFormat, PreviewTarget, RequestTag, Sensor,
    SensorError, SensorHandle,
};
use crate::negotiation::{DisplayExtent, SelectionMode, SizeNegotiator};
use thiserror::Error;

/// Errors surfaced by the resource manager.
#[derive(Debug, Clone, Error)]
pub enum CameraError {
    #[error("failed to open camera: {0}")]
    AcquisitionFailed(SensorError),
    #[error("failed to bind preview output: {0}")]
    BindFailed(SensorError),
    #[error("failed to apply camera parameters: {0}")]
    ConfigurationFailed(SensorError),
    #[error("failed to start streaming: {0}")]
    StreamingFailed(SensorError),
    #[error("camera is not open")]
    NotOpen,
    #[error("camera is not streaming")]
    NotStreaming,
    #[error("camera rejected request: {0}")]
    RequestFailed(SensorError),
}

impl CameraError {
    /// Returns true if the error ends the current screen.
    ///
    /// Fatal errors always leave the manager without a handle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CameraError::AcquisitionFailed(_)
                | CameraError::BindFailed(_)
                | CameraError::ConfigurationFailed(_)
                | CameraError::StreamingFailed(_)
        )
    }
}

/// Observable handle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    Unopened,
    Open,
    Streaming,
}

enum Slot<H> {
    Unopened,
    Open(H),
    Streaming(H),
}

/// Result of configuring the handle for a surface size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceConfiguration {
    /// Parameters committed to the hardware.
    pub parameters: Parameters,
    /// Size lists for which negotiation found nothing.
    pub misses: Vec<ConfigurationKind>,
}

/// Owns the sensor and at most one open handle.
pub struct CameraResourceManager<S: Sensor> {
    sensor: S,
    events: EventSink,
    negotiator: SizeNegotiator,
    preferred_format: PictureFormat,
    slot: Slot<S::Handle>,
    epoch: u64,
}

impl<S: Sensor> CameraResourceManager<S> {
    /// Creates a manager. Nothing is opened until a surface appears.
    pub fn new(
        sensor: S,
        events: EventSink,
        negotiator: SizeNegotiator,
        preferred_format: PictureFormat,
    ) -> Self {
        Self {
            sensor,
            events,
            negotiator,
            preferred_format,
            slot: Slot::Unopened,
            epoch: 0,
        }
    }

    /// Current handle state.
    pub fn state(&self) -> HandleState {
        match self.slot {
            Slot::Unopened => HandleState::Unopened,
            Slot::Open(_) => HandleState::Open,
            Slot::Streaming(_) => HandleState::Streaming,
        }
    }

    /// Epoch of the most recent open attempt.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns true if `epoch` names the handle that is currently open.
    pub fn is_live(&self, epoch: u64) -> bool {
        !matches!(self.slot, Slot::Unopened) && epoch == self.epoch
    }

    /// Opens the sensor and binds the preview output.
    ///
    /// On failure no handle is left open.
    pub fn on_surface_created(&mut self, target: PreviewTarget) -> Result<(), CameraError> {
        if self.release() {
            tracing::warn!("Surface created while a handle was still open; released it first");
        }

        self.epoch += 1;
        let mut handle = self
            .sensor
            .open(self.events.clone(), self.epoch)
            .map_err(|e| {
                tracing::warn!(error = %e, "Camera open failed");
                CameraError::AcquisitionFailed(e)
            })?;

        if let Err(e) = handle.bind_preview(&target) {
            tracing::warn!(error = %e, target = target.id(), "Preview bind failed, releasing camera");
            handle.release();
            return Err(CameraError::BindFailed(e));
        }

        tracing::info!(epoch = self.epoch, target = target.id(), "Camera opened");
        self.slot = Slot::Open(handle);
        Ok(())
    }

    /// Negotiates sizes for `extent`, commits them and starts streaming.
    ///
    /// A negotiation miss leaves that dimension at the hardware default.
    /// A hardware failure while committing or streaming releases the
    /// handle.
    pub fn on_surface_changed(
        &mut self,
        extent: DisplayExtent,
    ) -> Result<SurfaceConfiguration, CameraError> {
        let mut handle = match std::mem::replace(&mut self.slot, Slot::Unopened) {
            Slot::Unopened => return Err(CameraError::NotOpen),
            Slot::Open(handle) => handle,
            Slot::Streaming(mut handle) => {
                handle.stop_streaming();
                handle
            }
        };

        let configuration = self.negotiate(&handle, extent);

        if let Err(e) = handle.set_parameters(&configuration.parameters) {
            tracing::warn!(error = %e, "Parameters rejected, releasing camera");
            handle.release();
            return Err(CameraError::ConfigurationFailed(e));
        }
        if let Err(e) = handle.start_streaming() {
            tracing::warn!(error = %e, "Streaming failed, releasing camera");
            handle.release();
            return Err(CameraError::StreamingFailed(e));
        }

        tracing::info!(
            extent = %extent,
            preview = ?configuration.parameters.preview_size,
            picture = ?configuration.parameters.picture_size,
            format = ?configuration.parameters.picture_format,
            "Camera streaming"
        );
        self.slot = Slot::Streaming(handle);
        Ok(configuration)
    }

    /// Stops streaming and releases the handle. Safe to call repeatedly.
    pub fn on_surface_destroyed(&mut self) {
        if self.release() {
            tracing::info!(epoch = self.epoch, "Camera released on surface teardown");
        }
    }

    /// Handles an asynchronous device fault.
    ///
    /// Returns true if the fault belonged to the live handle, which is
    /// then released.
    pub fn on_fault(&mut self, epoch: u64, reason: &str) -> bool {
        if !self.is_live(epoch) {
            tracing::debug!(epoch, reason, "Ignoring fault for stale handle");
            return false;
        }
        tracing::warn!(epoch, reason, "Camera fault, releasing handle");
        self.release()
    }

    /// Issues an asynchronous focus request for `session`.
    pub fn request_focus(&mut self, session: u64) -> Result<RequestTag, CameraError> {
        let tag = RequestTag {
            epoch: self.epoch,
            session,
        };
        self.streaming_handle()?
            .request_focus(tag)
            .map_err(CameraError::RequestFailed)?;
        Ok(tag)
    }

    /// Issues an asynchronous still capture request for `session`.
    pub fn request_capture(&mut self, session: u64) -> Result<RequestTag, CameraError> {
        let tag = RequestTag {
            epoch: self.epoch,
            session,
        };
        self.streaming_handle()?
            .request_capture(tag)
            .map_err(CameraError::RequestFailed)?;
        Ok(tag)
    }

    fn streaming_handle(&mut self) -> Result<&mut S::Handle, CameraError> {
        match &mut self.slot {
            Slot::Streaming(handle) => Ok(handle),
            Slot::Open(_) => Err(CameraError::NotStreaming),
            Slot::Unopened => Err(CameraError::NotOpen),
        }
    }

    fn negotiate(&self, handle: &S::Handle, extent: DisplayExtent) -> SurfaceConfiguration {
        let mut parameters = Parameters::default();
        let mut misses = Vec::new();

        let picture_sizes = handle.supported_sizes(ConfigurationKind::Picture);
        parameters.picture_size =
            self.negotiator
                .select_best(&picture_sizes, SelectionMode::Capture, extent);
        if parameters.picture_size.is_none() {
            tracing::debug!("No picture size negotiated, keeping hardware default");
            misses.push(ConfigurationKind::Picture);
        }

        let preview_sizes = handle.supported_sizes(ConfigurationKind::Preview);
        parameters.preview_size =
            self.negotiator
                .select_best(&preview_sizes, SelectionMode::Preview, extent);
        if parameters.preview_size.is_none() {
            tracing::debug!("No preview size negotiated, keeping hardware default");
            misses.push(ConfigurationKind::Preview);
        }

        if handle
            .supported_picture_formats()
            .contains(&self.preferred_format)
        {
            parameters.picture_format = Some(self.preferred_format);
        }

        SurfaceConfiguration { parameters, misses }
    }

    /// Tears down whatever handle is open. Returns true if one was.
    fn release(&mut self) -> bool {
        match std::mem::replace(&mut self.slot, Slot::Unopened) {
            Slot::Unopened => false,
            Slot::Open(handle) => {
                handle.release();
                true
            }
            Slot::Streaming(mut handle) => {
                handle.stop_streaming();
                handle.release();
                true
            }
        }
    }
}

impl<S: Sensor> Drop for CameraResourceManager<S> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{
        InjectedFaults, SensorCall, SensorEvent, SensorProbe, SimulatedSensor,
        SimulatedSensorConfig,
    };
    use crate::negotiation::Size;
    use crossbeam::channel::{unbounded, Receiver};

    fn setup(
        config: SimulatedSensorConfig,
    ) -> (
        CameraResourceManager<SimulatedSensor>,
        SensorProbe,
        Receiver<SensorEvent>,
    ) {
        let (tx, rx) = unbounded();
        let sensor = SimulatedSensor::new(config);
        let probe = sensor.probe();
        let manager = CameraResourceManager::new(
            sensor,
            EventSink::new(tx),
            SizeNegotiator::default(),
            PictureFormat::Jpeg,
        );
        (manager, probe, rx)
    }

    fn extent(w: u32, h: u32) -> DisplayExtent {
        DisplayExtent::new(w, h).unwrap()
    }

    #[test]
    fn test_full_lifecycle() {
        let (mut manager, probe, _rx) = setup(SimulatedSensorConfig::default());
        assert_eq!(manager.state(), HandleState::Unopened);

        manager.on_surface_created(PreviewTarget::new(1)).unwrap();
        assert_eq!(manager.state(), HandleState::Open);

        let configured = manager.on_surface_changed(extent(1280, 720)).unwrap();
        assert_eq!(manager.state(), HandleState::Streaming);
        assert_eq!(
            configured.parameters,
            Parameters {
                preview_size: Some(Size::new(1280, 720)),
                picture_size: Some(Size::new(1920, 1080)),
                picture_format: Some(PictureFormat::Jpeg),
            }
        );
        assert!(configured.misses.is_empty());

        manager.on_surface_destroyed();
        assert_eq!(manager.state(), HandleState::Unopened);
        assert!(!probe.is_open());

        let calls = probe.calls();
        let stop = calls.iter().position(|c| *c == SensorCall::StopStreaming);
        let release = calls.iter().position(|c| *c == SensorCall::Release);
        assert!(stop.is_some() && stop < release);
    }

    #[test]
    fn test_acquisition_failure_leaves_no_handle() {
        let (mut manager, probe, _rx) = setup(SimulatedSensorConfig {
            faults: InjectedFaults {
                open: true,
                ..Default::default()
            },
            ..Default::default()
        });

        let err = manager.on_surface_created(PreviewTarget::new(1)).unwrap_err();
        assert!(matches!(err, CameraError::AcquisitionFailed(_)));
        assert!(err.is_fatal());
        assert_eq!(manager.state(), HandleState::Unopened);

        assert!(matches!(
            manager.on_surface_changed(extent(640, 480)),
            Err(CameraError::NotOpen)
        ));
        assert_eq!(probe.count(|c| *c == SensorCall::StartStreaming), 0);
    }

    #[test]
    fn test_bind_failure_releases_handle() {
        let (mut manager, probe, _rx) = setup(SimulatedSensorConfig {
            faults: InjectedFaults {
                bind: true,
                ..Default::default()
            },
            ..Default::default()
        });

        let err = manager.on_surface_created(PreviewTarget::new(1)).unwrap_err();
        assert!(matches!(err, CameraError::BindFailed(_)));
        assert_eq!(manager.state(), HandleState::Unopened);
        assert!(!probe.is_open());
        assert_eq!(probe.count(|c| *c == SensorCall::Release), 1);
    }

    #[test]
    fn test_negotiation_miss_keeps_hardware_default() {
        let (mut manager, probe, _rx) = setup(SimulatedSensorConfig {
            preview_sizes: Vec::new(),
            picture_formats: vec![PictureFormat::Nv21],
            ..Default::default()
        });

        manager.on_surface_created(PreviewTarget::new(1)).unwrap();
        let configured = manager.on_surface_changed(extent(1280, 720)).unwrap();

        assert_eq!(configured.misses, vec![ConfigurationKind::Preview]);
        assert_eq!(configured.parameters.preview_size, None);
        assert_eq!(configured.parameters.picture_format, None);
        assert!(configured.parameters.picture_size.is_some());
        assert_eq!(manager.state(), HandleState::Streaming);
        assert_eq!(probe.count(|c| *c == SensorCall::StartStreaming), 1);
    }

    #[test]
    fn test_parameter_rejection_is_fatal() {
        let (mut manager, probe, _rx) = setup(SimulatedSensorConfig {
            faults: InjectedFaults {
                parameters: true,
                ..Default::default()
            },
            ..Default::default()
        });

        manager.on_surface_created(PreviewTarget::new(1)).unwrap();
        let err = manager.on_surface_changed(extent(1280, 720)).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(manager.state(), HandleState::Unopened);
        assert!(!probe.is_open());
    }

    #[test]
    fn test_streaming_failure_is_fatal() {
        let (mut manager, probe, _rx) = setup(SimulatedSensorConfig {
            faults: InjectedFaults {
                streaming: true,
                ..Default::default()
            },
            ..Default::default()
        });

        manager.on_surface_created(PreviewTarget::new(1)).unwrap();
        let err = manager.on_surface_changed(extent(1280, 720)).unwrap_err();
        assert!(matches!(err, CameraError::StreamingFailed(_)));
        assert!(err.is_fatal());
        assert_eq!(manager.state(), HandleState::Unopened);
        assert!(!probe.is_open());
        assert_eq!(probe.count(|c| *c == SensorCall::Release), 1);
    }

    #[test]
    fn test_resize_restarts_stream() {
        let (mut manager, probe, _rx) = setup(SimulatedSensorConfig::default());
        manager.on_surface_created(PreviewTarget::new(1)).unwrap();
        manager.on_surface_changed(extent(1280, 720)).unwrap();
        let configured = manager.on_surface_changed(extent(640, 480)).unwrap();

        assert_eq!(configured.parameters.preview_size, Some(Size::new(640, 480)));
        assert_eq!(probe.count(|c| *c == SensorCall::StopStreaming), 1);
        assert_eq!(probe.count(|c| *c == SensorCall::StartStreaming), 2);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let (mut manager, probe, _rx) = setup(SimulatedSensorConfig::default());
        manager.on_surface_created(PreviewTarget::new(1)).unwrap();
        manager.on_surface_destroyed();
        manager.on_surface_destroyed();
        assert_eq!(probe.count(|c| *c == SensorCall::Release), 1);
    }

    #[test]
    fn test_fault_collapses_to_unopened() {
        let (mut manager, probe, _rx) = setup(SimulatedSensorConfig::default());
        manager.on_surface_created(PreviewTarget::new(1)).unwrap();
        manager.on_surface_changed(extent(1280, 720)).unwrap();

        assert!(!manager.on_fault(manager.epoch() + 1, "other handle"));
        assert_eq!(manager.state(), HandleState::Streaming);

        assert!(manager.on_fault(manager.epoch(), "disconnected"));
        assert_eq!(manager.state(), HandleState::Unopened);
        assert!(!probe.is_open());
    }

    #[test]
    fn test_requests_require_streaming() {
        let (mut manager, _probe, _rx) = setup(SimulatedSensorConfig::default());
        assert!(matches!(manager.request_focus(1), Err(CameraError::NotOpen)));

        manager.on_surface_created(PreviewTarget::new(1)).unwrap();
        assert!(matches!(
            manager.request_focus(1),
            Err(CameraError::NotStreaming)
        ));

        manager.on_surface_changed(extent(1280, 720)).unwrap();
        let tag = manager.request_focus(1).unwrap();
        assert_eq!(tag.epoch, manager.epoch());
        assert_eq!(tag.session, 1);
    }

    #[test]
    fn test_drop_releases_handle() {
        let (mut manager, probe, _rx) = setup(SimulatedSensorConfig::default());
        manager.on_surface_created(PreviewTarget::new(1)).unwrap();
        drop(manager);
        assert!(!probe.is_open());
    }
}
