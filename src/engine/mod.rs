//! Core engine: the live dispatch loop.
//!
//! Frames from the connection manager are decoded by the protocol layer,
//! applied to the run state by the reconciler, and the resulting effects are
//! executed here (commands back over the link, user notifications).

pub mod live;
pub mod notifier;

pub use live::LiveClient;
pub use notifier::{Notifier, TracingNotifier};
