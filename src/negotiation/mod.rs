//! Size negotiation against hardware-advertised configurations.
//!
//! Pure selection logic with no hardware access, so it can be tested
//! against literal fixture lists.

mod selector;
mod size;

pub use selector::{select_best, AspectTolerance, SelectionMode, SizeNegotiator};
pub use size::{DisplayExtent, Size};
