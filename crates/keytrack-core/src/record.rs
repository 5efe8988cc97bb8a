//! Persisted annotation records
//!
//! The exchange format consumed on load and produced on save. Field names
//! are camelCase; optional fields are omitted when absent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    Attributes, CameraId, CategoryId, FrameIndex, FrameRecord, InstanceId, ItemId, KeytrackError,
    KeytrackResult, ShapeGeometry, ShapeType,
};

/// One tracked object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceRecord {
    pub id: InstanceId,
    pub category: CategoryId,
    pub number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_attributes: Option<Vec<DynamicAttributesRecord>>,
    #[serde(default)]
    pub children: Vec<ItemRecord>,
}

/// Instance-level attributes of one camera, keyed by frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicAttributesRecord {
    pub camera: CameraId,
    #[serde(default)]
    pub frames: Vec<DynamicFrameRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicFrameRecord {
    pub frame_index: FrameIndex,
    #[serde(default)]
    pub attributes: Attributes,
}

/// One labeled part of an instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    pub id: ItemId,
    /// Item category within the instance category (e.g. "body", "wheel")
    pub name: String,
    pub number: u32,
    #[serde(default)]
    pub cameras: Vec<CameraRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraRecord {
    pub camera: CameraId,
    #[serde(default)]
    pub frames: Vec<FrameData>,
}

/// Wire form of a [`FrameRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameData {
    pub frame_index: FrameIndex,
    #[serde(default)]
    pub is_key_frame: bool,
    /// Resolved in `TryFrom`; an unknown type fails only its own frame
    pub shape_type: String,
    pub shape: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Attributes>,
}

impl From<FrameRecord> for FrameData {
    fn from(record: FrameRecord) -> Self {
        FrameData {
            frame_index: record.frame_index,
            is_key_frame: record.is_key_frame,
            shape_type: record.shape_type().as_str().to_string(),
            shape: record.geometry.to_value(),
            order: record.order,
            attributes: (!record.attributes.is_empty()).then_some(record.attributes),
        }
    }
}

impl TryFrom<FrameData> for FrameRecord {
    type Error = KeytrackError;

    fn try_from(data: FrameData) -> Result<Self, Self::Error> {
        let shape_type = ShapeType::parse(&data.shape_type)?;
        Ok(FrameRecord {
            frame_index: data.frame_index,
            is_key_frame: data.is_key_frame,
            geometry: ShapeGeometry::from_parts(shape_type, data.shape)?,
            order: data.order,
            attributes: data.attributes.unwrap_or_default(),
        })
    }
}

/// Parse a JSON array of instance records
pub fn parse_instances(json: &str) -> KeytrackResult<Vec<InstanceRecord>> {
    Ok(serde_json::from_str(json)?)
}

/// Render instance records as a JSON array
pub fn render_instances(records: &[InstanceRecord]) -> KeytrackResult<String> {
    Ok(serde_json::to_string(records)?)
}
