//! Bridge tuning

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Dispatched chunks not yet accepted by the consumer before the
    /// bridge reports itself full
    #[serde(default = "default_high_water_mark")]
    pub high_water_mark: usize,

    /// Bytes coalesced before a chunk is dispatched
    #[serde(default = "default_flush_threshold_bytes")]
    pub flush_threshold_bytes: usize,

    /// Chunks the consumer itself buffers
    #[serde(default = "default_consumer_queue_chunks")]
    pub consumer_queue_chunks: usize,
}

fn default_high_water_mark() -> usize {
    16
}

fn default_flush_threshold_bytes() -> usize {
    64 * 1024
}

fn default_consumer_queue_chunks() -> usize {
    8
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            high_water_mark: default_high_water_mark(),
            flush_threshold_bytes: default_flush_threshold_bytes(),
            consumer_queue_chunks: default_consumer_queue_chunks(),
        }
    }
}
