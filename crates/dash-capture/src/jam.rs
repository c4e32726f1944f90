//! Traffic jam detection
//!
//! The detector is fed the ego position once per capture step. It keeps a
//! patience counter that drops on every step where the vehicle moved less
//! than `jam_dist`; when the counter hits zero a recovery is requested.
//!
//! Recovery escalates: the first jam at a location repairs the vehicle in
//! place, a jam that persists after that relocates it to the next spawn
//! point. A step with real progress returns the detector to the unjammed
//! state.

use dash_protocol::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CaptureError;

/// How the first observation after (re)starting the detector is judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstCheck {
    /// Compare the first position against the world origin
    AgainstOrigin,
    /// Record the first position and count the step as progress
    #[default]
    Skip,
}

/// Jam detection thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JamConfig {
    /// Minimum displacement per step, in metres, that counts as progress
    pub jam_dist: f64,
    /// Consecutive stalled steps tolerated before recovery
    pub jam_steps: u32,
    /// Treatment of the first observation
    #[serde(default)]
    pub first_check: FirstCheck,
}

impl Default for JamConfig {
    fn default() -> Self {
        Self {
            jam_dist: 0.2,
            jam_steps: 2,
            first_check: FirstCheck::Skip,
        }
    }
}

impl JamConfig {
    /// Check the thresholds are usable
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.jam_steps == 0 {
            return Err(CaptureError::InvalidConfig(
                "jam_steps must be at least 1".into(),
            ));
        }
        // Patience is reset to jam_steps + 1 after a recovery
        if self.jam_steps == u32::MAX {
            return Err(CaptureError::InvalidConfig(format!(
                "jam_steps must be below {}",
                u32::MAX
            )));
        }
        if !self.jam_dist.is_finite() || self.jam_dist < 0.0 {
            return Err(CaptureError::InvalidConfig(format!(
                "jam_dist must be a non-negative distance, got {}",
                self.jam_dist
            )));
        }
        Ok(())
    }
}

/// Recovery requested by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recovery {
    /// Clear traffic and reset the ego vehicle at its current pose
    RepairInPlace,
    /// Clear traffic and move the ego vehicle to the next spawn point
    Relocate,
}

impl Recovery {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::RepairInPlace => "repair in place",
            Self::Relocate => "relocate",
        }
    }
}

/// Whether a recovery has already been attempted at the current location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JamPhase {
    /// Normal operation
    #[default]
    Unjammed,
    /// A recovery ran and no progress has been seen since
    Jammed,
}

/// Mutable detector state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JamState {
    /// Stalled steps left before recovery
    pub remaining_patience: u32,
    /// Set once a recovery ran, cleared by the next step with progress
    pub jammed: bool,
}

impl JamState {
    fn fresh(jam_steps: u32) -> Self {
        Self {
            remaining_patience: jam_steps,
            jammed: false,
        }
    }
}

/// Outcome of one observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JamStep {
    /// Displacement since the previous observation, `None` when skipped
    pub distance: Option<f64>,
    /// The vehicle made progress; the capture of this step is kept
    pub progressed: bool,
    /// Patience left after this step
    pub remaining_patience: u32,
    /// Recovery to perform before the next step
    pub recovery: Option<Recovery>,
}

/// Jam detector for one capture run
#[derive(Debug, Clone)]
pub struct JamDetector {
    config: JamConfig,
    state: JamState,
    previous: Option<Vec3>,
}

impl JamDetector {
    /// Create a detector with the given thresholds
    pub fn new(config: JamConfig) -> Self {
        Self {
            config,
            state: JamState::fresh(config.jam_steps),
            previous: Self::initial_previous(config.first_check),
        }
    }

    fn initial_previous(first_check: FirstCheck) -> Option<Vec3> {
        match first_check {
            FirstCheck::AgainstOrigin => Some(Vec3::ORIGIN),
            FirstCheck::Skip => None,
        }
    }

    /// Get the thresholds
    pub fn config(&self) -> &JamConfig {
        &self.config
    }

    /// Get the current state
    pub fn state(&self) -> JamState {
        self.state
    }

    /// Get the current phase
    pub fn phase(&self) -> JamPhase {
        if self.state.jammed {
            JamPhase::Jammed
        } else {
            JamPhase::Unjammed
        }
    }

    /// Last observed position
    pub fn previous(&self) -> Option<Vec3> {
        self.previous
    }

    /// Forget all history, as if newly created
    pub fn reset(&mut self) {
        self.state = JamState::fresh(self.config.jam_steps);
        self.previous = Self::initial_previous(self.config.first_check);
    }

    /// Feed the position polled at this capture step
    pub fn observe(&mut self, pos: Vec3) -> JamStep {
        let distance = self.previous.map(|prev| prev.distance(&pos));
        self.previous = Some(pos);

        let progressed = match distance {
            Some(d) if d < self.config.jam_dist => {
                self.state.remaining_patience = self.state.remaining_patience.saturating_sub(1);
                warn!(
                    "Vehicle did not move (dist={:.2}). {} steps until reset...",
                    d, self.state.remaining_patience
                );
                false
            }
            _ => {
                self.state.jammed = false;
                self.state.remaining_patience = self.config.jam_steps;
                true
            }
        };

        let recovery = if self.state.remaining_patience == 0 {
            let recovery = if self.state.jammed {
                Recovery::Relocate
            } else {
                Recovery::RepairInPlace
            };
            self.state.remaining_patience = self.config.jam_steps.saturating_add(1);
            self.state.jammed = true;
            debug!("Jam detected, requesting {}", recovery.name());
            Some(recovery)
        } else {
            None
        };

        JamStep {
            distance,
            progressed,
            remaining_patience: self.state.remaining_patience,
            recovery,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin_config() -> JamConfig {
        JamConfig {
            jam_dist: 0.2,
            jam_steps: 2,
            first_check: FirstCheck::AgainstOrigin,
        }
    }

    #[test]
    fn test_stationary_at_origin_triggers_recovery() {
        let mut det = JamDetector::new(origin_config());

        let s1 = det.observe(Vec3::ORIGIN);
        assert_eq!(s1.remaining_patience, 1);
        assert!(!s1.progressed);
        assert_eq!(s1.recovery, None);
        assert!(!det.state().jammed);

        let s2 = det.observe(Vec3::ORIGIN);
        assert_eq!(s2.recovery, Some(Recovery::RepairInPlace));
        assert!(det.state().jammed);
        assert_eq!(s2.remaining_patience, 3);
        assert_eq!(det.state().remaining_patience, 3);
    }

    #[test]
    fn test_movement_resets_patience() {
        let mut det = JamDetector::new(origin_config());

        let s1 = det.observe(Vec3::ORIGIN);
        assert_eq!(s1.remaining_patience, 1);

        let s2 = det.observe(Vec3::new(5.0, 0.0, 0.0));
        assert_eq!(s2.distance, Some(5.0));
        assert!(s2.progressed);
        assert_eq!(s2.remaining_patience, 2);
        assert_eq!(s2.recovery, None);
        assert!(!det.state().jammed);
    }

    #[test]
    fn test_skip_first_check_counts_as_progress() {
        let mut det = JamDetector::new(JamConfig::default());

        let s1 = det.observe(Vec3::ORIGIN);
        assert_eq!(s1.distance, None);
        assert!(s1.progressed);
        assert_eq!(s1.remaining_patience, 2);

        let s2 = det.observe(Vec3::ORIGIN);
        assert_eq!(s2.distance, Some(0.0));
        assert!(!s2.progressed);
        assert_eq!(s2.remaining_patience, 1);
    }

    #[test]
    fn test_persistent_jam_escalates_to_relocate() {
        let mut det = JamDetector::new(origin_config());
        let stuck = Vec3::new(10.0, 10.0, 0.0);

        // Move to the stuck location
        assert!(det.observe(stuck).progressed);

        assert_eq!(det.observe(stuck).recovery, None);
        assert_eq!(det.observe(stuck).recovery, Some(Recovery::RepairInPlace));
        assert_eq!(det.phase(), JamPhase::Jammed);

        // After recovery the countdown runs jam_steps + 1 steps
        assert_eq!(det.observe(stuck).remaining_patience, 2);
        assert_eq!(det.observe(stuck).remaining_patience, 1);
        let step = det.observe(stuck);
        assert_eq!(step.recovery, Some(Recovery::Relocate));
        assert_eq!(step.remaining_patience, 3);
        assert_eq!(det.phase(), JamPhase::Jammed);
    }

    #[test]
    fn test_progress_after_recovery_clears_jam() {
        let mut det = JamDetector::new(origin_config());
        det.observe(Vec3::ORIGIN);
        det.observe(Vec3::ORIGIN);
        assert_eq!(det.phase(), JamPhase::Jammed);

        let step = det.observe(Vec3::new(0.0, 1.0, 0.0));
        assert!(step.progressed);
        assert_eq!(det.phase(), JamPhase::Unjammed);
        assert_eq!(step.remaining_patience, 2);

        // Next jam starts over with a repair
        det.observe(Vec3::new(0.0, 1.0, 0.0));
        let step = det.observe(Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(step.recovery, Some(Recovery::RepairInPlace));
    }

    #[test]
    fn test_movement_exactly_at_threshold_is_progress() {
        let mut det = JamDetector::new(JamConfig {
            jam_dist: 1.0,
            ..origin_config()
        });
        let step = det.observe(Vec3::new(1.0, 0.0, 0.0));
        assert!(step.progressed);
    }

    #[test]
    fn test_single_step_patience() {
        let mut det = JamDetector::new(JamConfig {
            jam_steps: 1,
            ..origin_config()
        });
        let step = det.observe(Vec3::ORIGIN);
        assert_eq!(step.recovery, Some(Recovery::RepairInPlace));
        assert_eq!(step.remaining_patience, 2);
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut det = JamDetector::new(origin_config());
        det.observe(Vec3::ORIGIN);
        det.observe(Vec3::ORIGIN);
        det.reset();

        assert_eq!(
            det.state(),
            JamState {
                remaining_patience: 2,
                jammed: false
            }
        );
        assert_eq!(det.previous(), Some(Vec3::ORIGIN));
    }

    #[test]
    fn test_validate() {
        assert!(JamConfig::default().validate().is_ok());
        assert!(JamConfig {
            jam_steps: 0,
            ..JamConfig::default()
        }
        .validate()
        .is_err());
        assert!(JamConfig {
            jam_steps: u32::MAX,
            ..JamConfig::default()
        }
        .validate()
        .is_err());
        assert!(JamConfig {
            jam_steps: u32::MAX - 1,
            ..JamConfig::default()
        }
        .validate()
        .is_ok());
        assert!(JamConfig {
            jam_dist: f64::NAN,
            ..JamConfig::default()
        }
        .validate()
        .is_err());
        assert!(JamConfig {
            jam_dist: -1.0,
            ..JamConfig::default()
        }
        .validate()
        .is_err());
    }
}
