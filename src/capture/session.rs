//! Capture session state machine.
//!
//! Every input is a named transition: it takes the current state and
//! yields the next state plus the commands to execute. Nothing here
//! touches hardware, so sequencing is testable on its own.

use super::image::EncodedImage;
use crate::handoff::Notice;
use serde::{Deserialize, Serialize};

/// What to do with a trigger while a session is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Drop the trigger.
    #[default]
    Ignore,
    /// Remember one trigger and start it when the current session ends.
    Queue,
}

/// Session policy knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Take the picture even when focusing reports failure.
    pub capture_on_focus_failure: bool,
    /// Trigger handling while busy.
    pub on_busy: BusyPolicy,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            capture_on_focus_failure: true,
            on_busy: BusyPolicy::Ignore,
        }
    }
}

/// Where the current session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Focusing { session: u64 },
    Capturing { session: u64 },
}

impl Phase {
    /// Id of the in-flight session, if any.
    pub fn session(&self) -> Option<u64> {
        match *self {
            Phase::Idle => None,
            Phase::Focusing { session } | Phase::Capturing { session } => Some(session),
        }
    }
}

/// Full machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    pub phase: Phase,
    /// A trigger is waiting for the current session to end.
    pub queued: bool,
    /// Id handed to the next session.
    pub next_session: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            queued: false,
            next_session: 1,
        }
    }
}

/// Inputs driving the machine.
#[derive(Debug, Clone)]
pub enum Input {
    /// The user asked for a picture.
    Trigger,
    /// The hardware finished focusing.
    FocusResult { session: u64, success: bool },
    /// The hardware delivered the encoded picture.
    ImageReady { session: u64, image: EncodedImage },
    /// A focus or capture request was rejected synchronously.
    RequestFailed { session: u64 },
    /// The hardware went away; drop everything silently.
    Abort,
}

/// Side effects requested by a transition.
#[derive(Debug, Clone)]
pub enum Command {
    RequestFocus { session: u64 },
    RequestCapture { session: u64 },
    HandOff(EncodedImage),
    Notify(Notice),
}

/// How an input was received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The input advanced the machine.
    Applied,
    /// A trigger was stored for later.
    Queued,
    /// A trigger arrived while busy and was dropped.
    Busy,
    /// The input belongs to a session that is no longer current.
    Stale,
}

/// Result of one transition.
#[derive(Debug, Clone)]
pub struct Transition {
    pub state: SessionState,
    pub outcome: Outcome,
    pub commands: Vec<Command>,
}

impl Transition {
    fn applied(state: SessionState, commands: Vec<Command>) -> Self {
        Self {
            state,
            outcome: Outcome::Applied,
            commands,
        }
    }

    fn unchanged(state: SessionState, outcome: Outcome) -> Self {
        Self {
            state,
            outcome,
            commands: Vec::new(),
        }
    }
}

/// Computes the next state for `input`.
pub fn transition(state: SessionState, input: Input, policy: &SessionPolicy) -> Transition {
    match input {
        Input::Trigger => on_trigger(state, policy),
        Input::FocusResult { session, success } => on_focus_result(state, session, success, policy),
        Input::ImageReady { session, image } => on_image_ready(state, session, image),
        Input::RequestFailed { session } => on_request_failed(state, session),
        Input::Abort => Transition::applied(
            SessionState {
                phase: Phase::Idle,
                queued: false,
                ..state
            },
            Vec::new(),
        ),
    }
}

fn on_trigger(state: SessionState, policy: &SessionPolicy) -> Transition {
    if state.phase != Phase::Idle {
        return match policy.on_busy {
            BusyPolicy::Queue if !state.queued => Transition {
                state: SessionState {
                    queued: true,
                    ..state
                },
                outcome: Outcome::Queued,
                commands: Vec::new(),
            },
            _ => Transition::unchanged(state, Outcome::Busy),
        };
    }
    let (state, commands) = start(state);
    Transition::applied(state, commands)
}

fn on_focus_result(
    state: SessionState,
    session: u64,
    success: bool,
    policy: &SessionPolicy,
) -> Transition {
    if state.phase != (Phase::Focusing { session }) {
        return Transition::unchanged(state, Outcome::Stale);
    }

    if success || policy.capture_on_focus_failure {
        let next = SessionState {
            phase: Phase::Capturing { session },
            ..state
        };
        return Transition::applied(next, vec![Command::RequestCapture { session }]);
    }

    let (state, mut commands) = finish(state);
    commands.insert(0, Command::Notify(Notice::FocusFailed));
    Transition::applied(state, commands)
}

fn on_image_ready(state: SessionState, session: u64, image: EncodedImage) -> Transition {
    if state.phase != (Phase::Capturing { session }) {
        return Transition::unchanged(state, Outcome::Stale);
    }
    let (state, mut commands) = finish(state);
    commands.insert(0, Command::HandOff(image));
    Transition::applied(state, commands)
}

fn on_request_failed(state: SessionState, session: u64) -> Transition {
    if state.phase.session() != Some(session) {
        return Transition::unchanged(state, Outcome::Stale);
    }
    let (state, mut commands) = finish(state);
    commands.insert(0, Command::Notify(Notice::CaptureFailed));
    Transition::applied(state, commands)
}

/// Opens a new session.
fn start(state: SessionState) -> (SessionState, Vec<Command>) {
    let session = state.next_session;
    let next = SessionState {
        phase: Phase::Focusing { session },
        queued: false,
        next_session: session + 1,
    };
    (next, vec![Command::RequestFocus { session }])
}

/// Ends the current session, starting the queued one if present.
fn finish(state: SessionState) -> (SessionState, Vec<Command>) {
    let idle = SessionState {
        phase: Phase::Idle,
        ..state
    };
    if idle.queued {
        start(idle)
    } else {
        (idle, Vec::new())
    }
}

/// A [`SessionState`] paired with its policy.
#[derive(Debug, Clone, Default)]
pub struct CaptureSession {
    state: SessionState,
    policy: SessionPolicy,
}

impl CaptureSession {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            state: SessionState::default(),
            policy,
        }
    }

    /// Applies `input`, returning the outcome and commands to run.
    pub fn apply(&mut self, input: Input) -> (Outcome, Vec<Command>) {
        let Transition {
            state,
            outcome,
            commands,
        } = transition(self.state, input, &self.policy);
        if state.phase != self.state.phase {
            tracing::trace!(from = ?self.state.phase, to = ?state.phase, "Session transition");
        }
        self.state = state;
        (outcome, commands)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns true while a session is in flight.
    pub fn is_active(&self) -> bool {
        self.state.phase != Phase::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::PictureFormat;

    fn image() -> EncodedImage {
        EncodedImage::new(vec![0xFF, 0xD8, 0x01, 0xFF, 0xD9], PictureFormat::Jpeg)
    }

    fn queueing() -> SessionPolicy {
        SessionPolicy {
            on_busy: BusyPolicy::Queue,
            ..Default::default()
        }
    }

    #[test]
    fn test_happy_path_sequence() {
        let mut session = CaptureSession::default();

        let (outcome, commands) = session.apply(Input::Trigger);
        assert_eq!(outcome, Outcome::Applied);
        assert!(matches!(commands[..], [Command::RequestFocus { session: 1 }]));

        let (_, commands) = session.apply(Input::FocusResult {
            session: 1,
            success: true,
        });
        assert!(matches!(commands[..], [Command::RequestCapture { session: 1 }]));

        let (_, commands) = session.apply(Input::ImageReady {
            session: 1,
            image: image(),
        });
        assert!(matches!(commands[..], [Command::HandOff(_)]));
        assert!(!session.is_active());
    }

    #[test]
    fn test_focus_failure_still_captures_by_default() {
        let mut session = CaptureSession::default();
        session.apply(Input::Trigger);
        let (_, commands) = session.apply(Input::FocusResult {
            session: 1,
            success: false,
        });
        assert!(matches!(commands[..], [Command::RequestCapture { session: 1 }]));
    }

    #[test]
    fn test_focus_failure_aborts_when_disabled() {
        let mut session = CaptureSession::new(SessionPolicy {
            capture_on_focus_failure: false,
            ..Default::default()
        });
        session.apply(Input::Trigger);
        let (_, commands) = session.apply(Input::FocusResult {
            session: 1,
            success: false,
        });
        assert!(matches!(commands[..], [Command::Notify(Notice::FocusFailed)]));
        assert!(!session.is_active());
    }

    #[test]
    fn test_busy_trigger_is_ignored() {
        let mut session = CaptureSession::default();
        session.apply(Input::Trigger);
        let (outcome, commands) = session.apply(Input::Trigger);
        assert_eq!(outcome, Outcome::Busy);
        assert!(commands.is_empty());
        assert_eq!(session.state().phase, Phase::Focusing { session: 1 });
    }

    #[test]
    fn test_queue_policy_holds_one_trigger() {
        let mut session = CaptureSession::new(queueing());
        session.apply(Input::Trigger);
        assert_eq!(session.apply(Input::Trigger).0, Outcome::Queued);
        assert_eq!(session.apply(Input::Trigger).0, Outcome::Busy);

        session.apply(Input::FocusResult {
            session: 1,
            success: true,
        });
        let (_, commands) = session.apply(Input::ImageReady {
            session: 1,
            image: image(),
        });
        assert!(matches!(
            commands[..],
            [Command::HandOff(_), Command::RequestFocus { session: 2 }]
        ));
        assert!(!session.state().queued);
    }

    #[test]
    fn test_stale_inputs_are_ignored() {
        let mut session = CaptureSession::default();
        let (outcome, _) = session.apply(Input::FocusResult {
            session: 1,
            success: true,
        });
        assert_eq!(outcome, Outcome::Stale);

        session.apply(Input::Trigger);
        let (outcome, commands) = session.apply(Input::ImageReady {
            session: 1,
            image: image(),
        });
        assert_eq!(outcome, Outcome::Stale);
        assert!(commands.is_empty());
        assert_eq!(session.state().phase, Phase::Focusing { session: 1 });
    }

    #[test]
    fn test_request_failure_notifies_and_idles() {
        let mut session = CaptureSession::default();
        session.apply(Input::Trigger);
        session.apply(Input::FocusResult {
            session: 1,
            success: true,
        });
        let (_, commands) = session.apply(Input::RequestFailed { session: 1 });
        assert!(matches!(commands[..], [Command::Notify(Notice::CaptureFailed)]));
        assert!(!session.is_active());
    }

    #[test]
    fn test_abort_drops_queue_silently() {
        let mut session = CaptureSession::new(queueing());
        session.apply(Input::Trigger);
        session.apply(Input::Trigger);
        let (_, commands) = session.apply(Input::Abort);
        assert!(commands.is_empty());
        assert_eq!(session.state().phase, Phase::Idle);
        assert!(!session.state().queued);

        // A late callback for the aborted session does nothing.
        let (outcome, _) = session.apply(Input::FocusResult {
            session: 1,
            success: true,
        });
        assert_eq!(outcome, Outcome::Stale);
    }

    #[test]
    fn test_session_ids_increase() {
        let mut session = CaptureSession::default();
        session.apply(Input::Trigger);
        session.apply(Input::Abort);
        let (_, commands) = session.apply(Input::Trigger);
        assert!(matches!(commands[..], [Command::RequestFocus { session: 2 }]));
    }
}
