//! Session configuration

use keytrack_history::ChangeLogConfig;
use keytrack_track::InterpolationConfig;

/// Session configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Undo/redo history bounds
    pub history: ChangeLogConfig,
    /// Interpolation policy handed to every track
    pub interpolation: InterpolationConfig,
    /// Re-interpolate around a keyframe whenever it is edited
    pub interpolate_on_edit: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            history: ChangeLogConfig::default(),
            interpolation: InterpolationConfig::default(),
            interpolate_on_edit: true,
        }
    }
}

impl SessionConfig {
    /// Keeps every history entry; used by replay tooling and fuzzing
    pub fn unbounded() -> Self {
        SessionConfig {
            history: ChangeLogConfig::unbounded(),
            ..Default::default()
        }
    }

    /// Resample polygons and lines with differing vertex counts
    pub fn resampling() -> Self {
        SessionConfig {
            interpolation: InterpolationConfig::resampling(),
            ..Default::default()
        }
    }
}

/// UI states during which undo and redo are suppressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InteractionGuard {
    pub modal_open: bool,
    pub drawing: bool,
}

impl InteractionGuard {
    pub fn is_busy(&self) -> bool {
        self.modal_open || self.drawing
    }
}
