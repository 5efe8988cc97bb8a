//! Error types for keytrack

use thiserror::Error;

use crate::{CameraId, CategoryId, FrameIndex, InstanceId, ItemId, ShapeType};

/// Core keytrack errors
///
/// Only caller-supplied references and payloads produce errors. Broken
/// internal invariants fail fast instead.
#[derive(Error, Debug)]
pub enum KeytrackError {
    // Reference errors
    #[error("Unknown instance: {0}")]
    UnknownInstance(InstanceId),

    #[error("Unknown item {item} in instance {instance}")]
    UnknownItem { instance: InstanceId, item: ItemId },

    #[error("Unknown camera: {0}")]
    UnknownCamera(CameraId),

    #[error("Unknown category: {0}")]
    UnknownCategory(CategoryId),

    #[error("Item name {name} is not part of category {category}")]
    UnknownItemName { category: CategoryId, name: String },

    #[error("Frame {frame} not found on camera {camera}")]
    FrameNotFound { camera: CameraId, frame: FrameIndex },

    // Numbering errors
    #[error("Instance number {number} already used in category {category}")]
    NumberTaken { category: CategoryId, number: u32 },

    // Payload errors
    #[error("Unknown shape type: {0}")]
    UnknownShapeType(String),

    #[error("Invalid {shape_type} shape: {reason}")]
    InvalidShape { shape_type: ShapeType, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for keytrack operations
pub type KeytrackResult<T> = Result<T, KeytrackError>;
