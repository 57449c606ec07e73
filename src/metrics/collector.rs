//! Metrics collection and registry.

use crate::camera::HandleState;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics for the capture pipeline.
///
/// Cloning is cheap; clones update the same underlying series.
#[derive(Clone)]
pub struct CaptureMetrics {
    registry: Registry,

    // Session metrics
    sessions_started: IntCounter,
    handoffs: IntCounter,
    focus_failures: IntCounter,
    sessions_aborted: IntCounter,
    triggers_ignored: IntCounter,

    // Hardware metrics
    handle_state: IntGauge,
    negotiation_misses: IntCounter,
    stale_events: IntCounter,

    // User-facing
    notices: IntCounter,
}

impl CaptureMetrics {
    /// Creates a registry with all capture metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let sessions_started = IntCounter::new(
            "still_capture_sessions_started_total",
            "Capture sessions that issued a focus request",
        )?;
        let handoffs = IntCounter::new(
            "still_capture_handoffs_total",
            "Encoded pictures handed to the consumer",
        )?;
        let focus_failures = IntCounter::new(
            "still_capture_focus_failures_total",
            "Focus results reporting failure",
        )?;
        let sessions_aborted = IntCounter::new(
            "still_capture_sessions_aborted_total",
            "Sessions ended without a picture",
        )?;
        let triggers_ignored = IntCounter::new(
            "still_capture_triggers_ignored_total",
            "Triggers dropped because a session was busy or the camera not ready",
        )?;

        let handle_state = IntGauge::new(
            "still_capture_handle_state",
            "Hardware handle state (0=unopened, 1=open, 2=streaming)",
        )?;
        let negotiation_misses = IntCounter::new(
            "still_capture_negotiation_misses_total",
            "Size lists for which no configuration could be negotiated",
        )?;
        let stale_events = IntCounter::new(
            "still_capture_stale_events_total",
            "Hardware callbacks ignored because their handle or session was gone",
        )?;

        let notices = IntCounter::new(
            "still_capture_notices_total",
            "Notices shown to the user",
        )?;

        registry.register(Box::new(sessions_started.clone()))?;
        registry.register(Box::new(handoffs.clone()))?;
        registry.register(Box::new(focus_failures.clone()))?;
        registry.register(Box::new(sessions_aborted.clone()))?;
        registry.register(Box::new(triggers_ignored.clone()))?;
        registry.register(Box::new(handle_state.clone()))?;
        registry.register(Box::new(negotiation_misses.clone()))?;
        registry.register(Box::new(stale_events.clone()))?;
        registry.register(Box::new(notices.clone()))?;

        Ok(Self {
            registry,
            sessions_started,
            handoffs,
            focus_failures,
            sessions_aborted,
            triggers_ignored,
            handle_state,
            negotiation_misses,
            stale_events,
            notices,
        })
    }

    pub fn session_started(&self) {
        self.sessions_started.inc();
    }

    pub fn handoff(&self) {
        self.handoffs.inc();
    }

    pub fn focus_failed(&self) {
        self.focus_failures.inc();
    }

    pub fn session_aborted(&self) {
        self.sessions_aborted.inc();
    }

    pub fn trigger_ignored(&self) {
        self.triggers_ignored.inc();
    }

    pub fn negotiation_missed(&self, count: usize) {
        self.negotiation_misses.inc_by(count as u64);
    }

    pub fn stale_event(&self) {
        self.stale_events.inc();
    }

    pub fn notice(&self) {
        self.notices.inc();
    }

    /// Records the current handle state.
    pub fn set_handle_state(&self, state: HandleState) {
        let value = match state {
            HandleState::Unopened => 0,
            HandleState::Open => 1,
            HandleState::Streaming => 2,
        };
        self.handle_state.set(value);
    }

    /// Number of pictures handed off so far.
    pub fn handoff_count(&self) -> u64 {
        self.handoffs.get()
    }

    /// Number of focus failures reported for live sessions.
    pub fn focus_failure_count(&self) -> u64 {
        self.focus_failures.get()
    }

    /// Number of notices shown so far.
    pub fn notice_count(&self) -> u64 {
        self.notices.get()
    }

    /// Number of stale callbacks dropped so far.
    pub fn stale_count(&self) -> u64 {
        self.stale_events.get()
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        assert!(CaptureMetrics::new().is_ok());
    }

    #[test]
    fn test_clones_share_series() {
        let metrics = CaptureMetrics::new().unwrap();
        let clone = metrics.clone();
        clone.handoff();
        clone.handoff();
        assert_eq!(metrics.handoff_count(), 2);
    }

    #[test]
    fn test_metrics_encode() {
        let metrics = CaptureMetrics::new().unwrap();
        metrics.set_handle_state(HandleState::Streaming);
        metrics.negotiation_missed(2);

        let output = metrics.encode().unwrap();
        assert!(output.contains("still_capture_handle_state 2"));
        assert!(output.contains("still_capture_negotiation_misses_total 2"));
        assert!(output.contains("still_capture_sessions_started_total 0"));
    }
}
