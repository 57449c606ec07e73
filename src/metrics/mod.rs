//! Prometheus metrics for the capture pipeline.
//!
//! # Metrics Exposed
//!
//! ## Sessions
//! - `still_capture_sessions_started_total` - Sessions that issued a focus request
//! - `still_capture_handoffs_total` - Pictures handed to the consumer
//! - `still_capture_focus_failures_total` - Focus results reporting failure
//! - `still_capture_sessions_aborted_total` - Sessions ended without a picture
//! - `still_capture_triggers_ignored_total` - Triggers dropped while busy or not ready
//!
//! ## Hardware
//! - `still_capture_handle_state` - 0=unopened, 1=open, 2=streaming
//! - `still_capture_negotiation_misses_total` - Size lists with no usable entry
//! - `still_capture_stale_events_total` - Callbacks dropped after release
//!
//! ## User
//! - `still_capture_notices_total` - Notices shown
//!
//! # Example
//!
//! ```
//! use still_capture::metrics::CaptureMetrics;
//!
//! let metrics = CaptureMetrics::new().expect("metrics registry");
//! metrics.handoff();
//! assert!(metrics.encode().unwrap().contains("still_capture_handoffs_total 1"));
//! ```

mod collector;

pub use collector::{CaptureMetrics, MetricsError};
