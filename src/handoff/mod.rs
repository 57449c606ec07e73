//! Collaborators at the edge of the core.
//!
//! A [`Handoff`] receives each finished picture; a [`Notifier`] shows
//! transient notices to the user. The core knows nothing about what
//! either does afterwards.

mod notify;
mod sink;

pub use notify::{ChannelNotifier, LogNotifier, Notice, Notifier};
pub use sink::{ChannelHandoff, DirectoryHandoff, Handoff, HandoffError};
