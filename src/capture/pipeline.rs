//! Capture orchestration.
//!
//! [`CapturePipeline`] is the boundary of the core. Surface lifecycle
//! calls and user triggers arrive from the owner thread; hardware
//! results arrive as [`SensorEvent`]s on a separate dispatch thread.
//! Both paths go through one lock, so the resource manager and the
//! session state are never mutated concurrently. Handoff and notices
//! run after the lock is released.

use super::config::FileConfig;
use super::session::{CaptureSession, Command, Input, Outcome};
use crate::camera::{CameraError, CameraResourceManager, HandleState};
use crate::handoff::{Handoff, Notice, Notifier};
use crate::hardware::{EventSink, PreviewTarget, Sensor, SensorEvent};
use crate::metrics::CaptureMetrics;
use crate::negotiation::{DisplayExtent, SizeNegotiator};
use crossbeam::channel::{bounded, select, unbounded, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

/// What became of a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A focus request was issued.
    Started,
    /// Stored until the running session ends.
    Queued,
    /// Dropped because a session is in flight.
    Busy,
    /// Dropped because the camera is not streaming.
    NotReady,
    /// Dropped because the screen ended after a fatal failure.
    Finished,
    /// The focus request was rejected by the hardware.
    Failed,
}

struct Core<S: Sensor> {
    manager: CameraResourceManager<S>,
    session: CaptureSession,
    finished: bool,
}

struct Shared<S: Sensor, H, N> {
    core: Mutex<Core<S>>,
    events: Receiver<SensorEvent>,
    handoff: H,
    notifier: N,
    metrics: CaptureMetrics,
}

/// Drives the focus, capture and handoff sequence.
///
/// Cloning yields another reference to the same pipeline.
pub struct CapturePipeline<S: Sensor, H, N> {
    shared: Arc<Shared<S, H, N>>,
}

impl<S: Sensor, H, N> Clone for CapturePipeline<S, H, N> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S, H, N> CapturePipeline<S, H, N>
where
    S: Sensor,
    H: Handoff,
    N: Notifier,
{
    /// Creates a pipeline around `sensor`. Nothing is opened yet.
    pub fn new(
        sensor: S,
        handoff: H,
        notifier: N,
        config: &FileConfig,
        metrics: CaptureMetrics,
    ) -> Self {
        let (tx, rx) = unbounded();
        let manager = CameraResourceManager::new(
            sensor,
            EventSink::new(tx),
            SizeNegotiator::new(config.negotiation.clone()),
            config.capture.preferred_format,
        );
        metrics.set_handle_state(HandleState::Unopened);

        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    manager,
                    session: CaptureSession::new(config.capture.session_policy()),
                    finished: false,
                }),
                events: rx,
                handoff,
                notifier,
                metrics,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core<S>> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The rendering surface exists: open the camera and bind the preview.
    pub fn surface_created(&self, target: PreviewTarget) {
        let deferred = {
            let mut core = self.lock();
            if core.finished {
                tracing::debug!("Screen finished, ignoring surface creation");
                return;
            }
            let result = core.manager.on_surface_created(target);
            let deferred = self.settle_lifecycle(&mut core, result.map(|_| ()));
            self.shared.metrics.set_handle_state(core.manager.state());
            deferred
        };
        self.run_deferred(deferred);
    }

    /// The surface has a size: negotiate, configure and stream.
    pub fn surface_changed(&self, extent: DisplayExtent) {
        let deferred = {
            let mut core = self.lock();
            if core.session.is_active() {
                tracing::info!("Reconfiguring camera, abandoning in-flight capture");
                self.abort_session(&mut core);
            }
            let result = core.manager.on_surface_changed(extent).map(|configured| {
                self.shared
                    .metrics
                    .negotiation_missed(configured.misses.len());
            });
            let deferred = self.settle_lifecycle(&mut core, result);
            self.shared.metrics.set_handle_state(core.manager.state());
            deferred
        };
        self.run_deferred(deferred);
    }

    /// The surface is gone: stop streaming and release the camera.
    ///
    /// An in-flight session is dropped without a notice; its late
    /// callbacks are ignored.
    pub fn surface_destroyed(&self) {
        let mut core = self.lock();
        if core.session.is_active() {
            self.abort_session(&mut core);
        }
        core.manager.on_surface_destroyed();
        self.shared.metrics.set_handle_state(core.manager.state());
    }

    /// User action: start a capture session.
    pub fn trigger_focus(&self) -> TriggerOutcome {
        let (outcome, deferred) = {
            let mut core = self.lock();
            if core.finished {
                self.shared.metrics.trigger_ignored();
                return TriggerOutcome::Finished;
            }
            if core.manager.state() != HandleState::Streaming {
                tracing::debug!(state = ?core.manager.state(), "Trigger ignored, camera not streaming");
                self.shared.metrics.trigger_ignored();
                return TriggerOutcome::NotReady;
            }

            let (outcome, commands) = core.session.apply(Input::Trigger);
            let outcome = match outcome {
                Outcome::Applied => TriggerOutcome::Started,
                Outcome::Queued => TriggerOutcome::Queued,
                Outcome::Busy | Outcome::Stale => {
                    tracing::debug!("Trigger ignored, capture already in flight");
                    self.shared.metrics.trigger_ignored();
                    TriggerOutcome::Busy
                }
            };
            let deferred = self.execute(&mut core, commands);
            let outcome = if outcome == TriggerOutcome::Started && !core.session.is_active() {
                TriggerOutcome::Failed
            } else {
                outcome
            };
            (outcome, deferred)
        };
        self.run_deferred(deferred);
        outcome
    }

    /// Handles one hardware result.
    pub fn dispatch(&self, event: SensorEvent) {
        let deferred = {
            let mut core = self.lock();
            if !core.manager.is_live(event.epoch()) {
                tracing::debug!(epoch = event.epoch(), "Ignoring callback for released handle");
                self.shared.metrics.stale_event();
                return;
            }

            let input = match event {
                SensorEvent::Fault { epoch, reason } => {
                    let deferred = self.on_fault(&mut core, epoch, &reason);
                    drop(core);
                    self.run_deferred(deferred);
                    return;
                }
                SensorEvent::FocusCompleted { tag, success } => Input::FocusResult {
                    session: tag.session,
                    success,
                },
                SensorEvent::PictureTaken { tag, image } => {
                    tracing::info!(session = tag.session, bytes = image.len(), "Picture received");
                    Input::ImageReady {
                        session: tag.session,
                        image,
                    }
                }
            };
            let failed_focus = match &input {
                Input::FocusResult { session, success } if !success => Some(*session),
                _ => None,
            };
            let (outcome, deferred) = self.drive(&mut core, input);
            if let (Some(session), Outcome::Applied) = (failed_focus, outcome) {
                tracing::info!(session, "Focus failed");
                self.shared.metrics.focus_failed();
            }
            deferred
        };
        self.run_deferred(deferred);
    }

    /// Dispatches every queued hardware result without blocking.
    pub fn pump(&self) -> usize {
        let mut count = 0;
        while let Ok(event) = self.shared.events.try_recv() {
            self.dispatch(event);
            count += 1;
        }
        count
    }

    /// Current hardware handle state.
    pub fn handle_state(&self) -> HandleState {
        self.lock().manager.state()
    }

    /// Returns true while a capture session is in flight.
    pub fn is_busy(&self) -> bool {
        self.lock().session.is_active()
    }

    /// Returns true once a fatal failure has ended the screen.
    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Counters shared with the pipeline.
    pub fn metrics(&self) -> &CaptureMetrics {
        &self.shared.metrics
    }

    /// Converts a lifecycle result into deferred side effects.
    fn settle_lifecycle(
        &self,
        core: &mut Core<S>,
        result: Result<(), CameraError>,
    ) -> Vec<Command> {
        match result {
            Ok(()) => Vec::new(),
            Err(e) if e.is_fatal() => {
                tracing::warn!(error = %e, "Fatal camera failure, ending screen");
                core.finished = true;
                vec![Command::Notify(Notice::CameraUnavailable)]
            }
            Err(e) => {
                tracing::debug!(error = %e, "Lifecycle event ignored");
                Vec::new()
            }
        }
    }

    fn on_fault(&self, core: &mut Core<S>, epoch: u64, reason: &str) -> Vec<Command> {
        if !core.manager.on_fault(epoch, reason) {
            return Vec::new();
        }
        if core.session.is_active() {
            self.abort_session(core);
        }
        core.finished = true;
        self.shared.metrics.set_handle_state(core.manager.state());
        vec![Command::Notify(Notice::CameraFault)]
    }

    fn abort_session(&self, core: &mut Core<S>) {
        core.session.apply(Input::Abort);
        self.shared.metrics.session_aborted();
    }

    /// Applies `input` and executes hardware commands until the
    /// machine settles. Returns the commands that must run unlocked.
    fn drive(&self, core: &mut Core<S>, input: Input) -> (Outcome, Vec<Command>) {
        let (outcome, commands) = core.session.apply(input);
        if outcome == Outcome::Stale {
            tracing::debug!("Ignoring callback for finished session");
            self.shared.metrics.stale_event();
        }
        (outcome, self.execute(core, commands))
    }

    fn execute(&self, core: &mut Core<S>, commands: Vec<Command>) -> Vec<Command> {
        let mut pending: VecDeque<Command> = commands.into();
        let mut deferred = Vec::new();

        while let Some(command) = pending.pop_front() {
            tracing::trace!(?command, "Executing command");
            let (session, result) = match command {
                Command::RequestFocus { session } => {
                    self.shared.metrics.session_started();
                    (session, core.manager.request_focus(session))
                }
                Command::RequestCapture { session } => {
                    (session, core.manager.request_capture(session))
                }
                other => {
                    deferred.push(other);
                    continue;
                }
            };

            if let Err(e) = result {
                tracing::warn!(session, error = %e, "Camera request failed, abandoning capture");
                self.shared.metrics.session_aborted();
                let (_, follow_up) = core.session.apply(Input::RequestFailed { session });
                pending.extend(follow_up);
            }
        }
        deferred
    }

    fn run_deferred(&self, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::HandOff(image) => match self.shared.handoff.hand_off(image) {
                    Ok(()) => self.shared.metrics.handoff(),
                    Err(e) => tracing::error!(error = %e, "Handoff target rejected picture"),
                },
                Command::Notify(notice) => {
                    self.shared.metrics.notice();
                    self.shared.notifier.notify(notice);
                }
                Command::RequestFocus { .. } | Command::RequestCapture { .. } => {
                    tracing::error!(?command, "Hardware command escaped the lock");
                }
            }
        }
    }
}

impl<S, H, N> CapturePipeline<S, H, N>
where
    S: Sensor + 'static,
    H: Handoff + 'static,
    N: Notifier + 'static,
{
    /// Spawns the thread that delivers hardware results.
    pub fn spawn_dispatcher(&self) -> std::io::Result<Dispatcher> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let pipeline = self.clone();
        let thread = std::thread::Builder::new()
            .name("camera-dispatch".into())
            .spawn(move || {
                let events = pipeline.shared.events.clone();
                loop {
                    select! {
                        recv(events) -> event => match event {
                            Ok(event) => pipeline.dispatch(event),
                            Err(_) => break,
                        },
                        recv(shutdown_rx) -> _ => break,
                    }
                }
                tracing::debug!("Dispatcher stopped");
            })?;

        Ok(Dispatcher {
            shutdown: shutdown_tx,
            thread: Some(thread),
        })
    }
}

/// Handle to the dispatch thread. Stops the thread when dropped.
pub struct Dispatcher {
    shutdown: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Stops the thread and waits for it to exit.
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Dispatcher thread panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
