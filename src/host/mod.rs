//! Host side-channel boundary and its adapter.
//!
//! Active only when a host is detected at initialization.

mod adapter;
mod signals;

pub(crate) use adapter::HostAdapter;
pub use signals::{HostChannel, QueuedHostChannel, RawHostSignal, SceneDescriptor, SignalSender};
