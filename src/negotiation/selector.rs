//! Best-size selection.
//!
//! Candidates are filtered by aspect-ratio fit first, then ranked by
//! area. Preview favours the size closest to the viewport; capture
//! favours the largest size that still fits the aspect.

use super::size::{DisplayExtent, Size};
use serde::{Deserialize, Serialize};

/// Aspect differences closer than this are treated as equal.
const ASPECT_EPSILON: f64 = 1e-9;

/// Which call site the negotiation serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    /// Live streaming output; match the viewport.
    Preview,
    /// Still picture; maximise resolution.
    Capture,
}

/// Aspect-ratio tolerances per selection mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AspectTolerance {
    /// Maximum |candidate ratio - target ratio| for preview sizes.
    pub preview: f64,
    /// Maximum |candidate ratio - target ratio| for picture sizes.
    pub capture: f64,
}

impl Default for AspectTolerance {
    fn default() -> Self {
        Self {
            preview: 0.1,
            capture: 0.05,
        }
    }
}

impl AspectTolerance {
    /// Only exact aspect matches count as fitting.
    pub fn strict() -> Self {
        Self {
            preview: ASPECT_EPSILON,
            capture: ASPECT_EPSILON,
        }
    }

    /// Loose tolerances for sensors with few advertised sizes.
    pub fn permissive() -> Self {
        Self {
            preview: 0.25,
            capture: 0.2,
        }
    }

    /// Returns the tolerance for a mode.
    pub fn for_mode(&self, mode: SelectionMode) -> f64 {
        match mode {
            SelectionMode::Preview => self.preview,
            SelectionMode::Capture => self.capture,
        }
    }

    /// Returns true if both tolerances are finite and non-negative.
    pub fn is_valid(&self) -> bool {
        [self.preview, self.capture]
            .iter()
            .all(|t| t.is_finite() && *t >= 0.0)
    }
}

/// Picks sensor sizes for a target extent.
///
/// Stateless apart from its tolerances; it never touches hardware.
#[derive(Debug, Clone, Default)]
pub struct SizeNegotiator {
    tolerance: AspectTolerance,
}

impl SizeNegotiator {
    /// Creates a negotiator with the given tolerances.
    pub fn new(tolerance: AspectTolerance) -> Self {
        Self { tolerance }
    }

    /// Selects the best entry of `supported` for `target`.
    ///
    /// Returns `None` when no usable entry exists. Entries with a zero
    /// dimension are never selected. Ties go to the earliest entry.
    pub fn select_best(
        &self,
        supported: &[Size],
        mode: SelectionMode,
        target: DisplayExtent,
    ) -> Option<Size> {
        let target_ratio = target.aspect_ratio();
        let aspect_gap = |size: Size| (size.aspect_ratio() - target_ratio).abs();

        let candidates: Vec<Size> = supported.iter().copied().filter(Size::is_valid).collect();
        if candidates.is_empty() {
            return None;
        }

        let tolerance = self.tolerance.for_mode(mode);
        let mut fitting: Vec<Size> = candidates
            .iter()
            .copied()
            .filter(|s| aspect_gap(*s) <= tolerance + ASPECT_EPSILON)
            .collect();

        if fitting.is_empty() {
            // Nothing fits; fall back to the closest aspect ratios.
            let closest = candidates
                .iter()
                .map(|s| aspect_gap(*s))
                .fold(f64::INFINITY, f64::min);
            fitting = candidates
                .iter()
                .copied()
                .filter(|s| aspect_gap(*s) - closest <= ASPECT_EPSILON)
                .collect();
            tracing::debug!(
                ?mode,
                target = %target,
                closest_gap = closest,
                "No size within aspect tolerance, using closest aspect"
            );
        }

        let chosen = match mode {
            SelectionMode::Preview => {
                let target_area = target.area();
                first_min_by_key(&fitting, |s| s.area().abs_diff(target_area))
            }
            SelectionMode::Capture => first_min_by_key(&fitting, |s| u64::MAX - s.area()),
        };

        if let Some(size) = chosen {
            tracing::debug!(?mode, target = %target, chosen = %size, "Negotiated size");
        }
        chosen
    }
}

/// Returns the first element with the smallest key.
fn first_min_by_key<F>(sizes: &[Size], key: F) -> Option<Size>
where
    F: Fn(&Size) -> u64,
{
    let mut best: Option<(u64, Size)> = None;
    for size in sizes {
        let k = key(size);
        match best {
            Some((best_key, _)) if k >= best_key => {}
            _ => best = Some((k, *size)),
        }
    }
    best.map(|(_, size)| size)
}

/// Selects with default tolerances.
pub fn select_best(supported: &[Size], mode: SelectionMode, target: DisplayExtent) -> Option<Size> {
    SizeNegotiator::default().select_best(supported, mode, target)
}
