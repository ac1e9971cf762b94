//! Bridge configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a [`Bridge`](crate::Bridge). The defaults suit a single
/// embedded page; embedders with chattier hosts can widen the buffers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Raw host signal queue depth for [`QueuedHostChannel`](crate::QueuedHostChannel)
    /// built through [`Bridge::queued_host`](crate::Bridge::queued_host).
    pub signal_capacity: usize,
    /// Diagnostics broadcast buffer; lagging subscribers skip old records.
    pub diagnostics_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            signal_capacity: 64,
            diagnostics_capacity: 256,
        }
    }
}
