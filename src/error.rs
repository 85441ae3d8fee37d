//! # Error Types
//!
//! Run-level errors surfaced to callers. Per-item failures never appear here:
//! they are carried as [`TaskFailure`](crate::execution::TaskFailure) inside the
//! result vector instead.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::execution::distributor::ScratchError;
use crate::execution::partition::PartitionError;
use crate::execution::worker_pool::PoolError;
use crate::storage::codec::CodecError;
use crate::storage::offload_store::StorageAccessError;

#[derive(Debug, Error)]
pub enum TurntableError {
    #[error("Invalid partition: {0}")]
    InvalidPartition(#[from] PartitionError),

    #[error("Pool setup failed: {0}")]
    PoolSetup(#[from] PoolError),

    #[error("Scratch storage error: {0}")]
    ScratchIo(#[from] ScratchError),

    #[error("Storage access error: {0}")]
    StorageAccess(#[from] StorageAccessError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl TurntableError {
    /// Whether the error happened before any task was handed to a worker
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            TurntableError::InvalidPartition(_)
                | TurntableError::PoolSetup(_)
                | TurntableError::ScratchIo(_)
                | TurntableError::Configuration(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, TurntableError>;
