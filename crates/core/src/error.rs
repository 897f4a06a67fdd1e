use thiserror::Error;

/// Per-attempt failure taxonomy.
///
/// All variants are recoverable: an attempt that fails is recorded in the
/// schedule's history and the schedule returns to idle for its next trigger.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("database dump failed: {0}")]
    Dump(String),

    #[error(
        "disk pressure unresolved: {free_bytes} of {total_bytes} bytes free and nothing left to evict"
    )]
    DiskPressureUnresolved { free_bytes: u64, total_bytes: u64 },

    #[error("disk stats probe failed: {0}")]
    Probe(String),

    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

impl EngineError {
    pub fn is_disk_pressure(&self) -> bool {
        matches!(self, Self::DiskPressureUnresolved { .. })
    }
}
