//! Error types for Montage.

use thiserror::Error;

use crate::asset::{AssetId, AssetStatus};

/// Main error type for Montage operations.
#[derive(Error, Debug)]
pub enum MontageError {
    /// An edit would overlap clips, break source bounds, or touch a locked track.
    /// Nothing is applied when this is returned.
    #[error("Timeline conflict: {0}")]
    TimelineConflict(String),

    #[error("Asset {asset_id} is not ready (status: {status})")]
    AssetNotReady {
        asset_id: AssetId,
        status: AssetStatus,
    },

    #[error("Export blocked by assets that are not ready: {}", join_ids(.asset_ids))]
    IncompleteAssets { asset_ids: Vec<AssetId> },

    #[error("Invalid asset transition for {asset_id}: {from} -> {to}")]
    InvalidTransition {
        asset_id: AssetId,
        from: AssetStatus,
        to: AssetStatus,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_ids(ids: &[AssetId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Result type alias for Montage operations.
pub type Result<T> = std::result::Result<T, MontageError>;
