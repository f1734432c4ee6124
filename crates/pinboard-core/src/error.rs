//! Errors returned by board operations.

use crate::item::ItemId;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors from editing operations on a [`Board`](crate::board::Board).
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),
    #[error("Nothing selected")]
    EmptySelection,
    #[error("Image has no pixels")]
    EmptyImage,
    #[error("Invalid scale: {0}")]
    InvalidScale(f64),
    #[error("An item is already being cropped")]
    CropModeActive,
    #[error("No item is being cropped")]
    NotInCropMode,
    #[error("A background job is already running")]
    JobActive,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for board operations.
pub type BoardResult<T> = Result<T, BoardError>;
