//! Capture events
//!
//! The generator buffers one event per noteworthy thing that happens during
//! a run. Callers drain them to report progress or assert on behaviour.

use crate::jam::Recovery;

/// Something that happened during capture
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Scenario loaded with the ego vehicle at a spawn point
    MapLoaded { map: String, spawn: String },
    /// A frame was kept and written
    FrameWritten { map: String, index: u32 },
    /// The ego vehicle did not move enough; nothing was written
    Stalled {
        map: String,
        index: u32,
        distance: f64,
        remaining_patience: u32,
    },
    /// A jam recovery ran
    Recovered {
        map: String,
        index: u32,
        recovery: Recovery,
        /// Spawn point moved to, for relocations
        spawn: Option<String>,
    },
    /// All frames of a map were written
    MapFinished {
        map: String,
        frames: u32,
        iterations: u64,
        recoveries: u32,
    },
}

impl CaptureEvent {
    /// Map the event belongs to
    pub fn map(&self) -> &str {
        match self {
            Self::MapLoaded { map, .. }
            | Self::FrameWritten { map, .. }
            | Self::Stalled { map, .. }
            | Self::Recovered { map, .. }
            | Self::MapFinished { map, .. } => map,
        }
    }
}
