//! Identity types for keytrack
//!
//! Every entity in the annotation tree is keyed by an opaque string that
//! round-trips through the persisted payload unchanged. Newtypes keep an
//! instance id from being passed where a camera is expected.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Zero-based index of a frame in the sequence
pub type FrameIndex = u32;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Tracked object identity - one real-world object across the sequence
    InstanceId,
    "Instance"
);

string_id!(
    /// Item identity - one labeled part of an instance
    ItemId,
    "Item"
);

string_id!(
    /// Camera identity - one viewpoint of the multi-camera sequence
    CameraId,
    "Camera"
);

string_id!(
    /// Category identity - the class an instance belongs to (e.g. "car")
    CategoryId,
    "Category"
);

impl InstanceId {
    /// Mint a fresh random id for an interactively created instance
    pub fn generate() -> Self {
        InstanceId(uuid::Uuid::new_v4().to_string())
    }
}

impl ItemId {
    /// Mint a fresh random id for an interactively created item
    pub fn generate() -> Self {
        ItemId(uuid::Uuid::new_v4().to_string())
    }
}
