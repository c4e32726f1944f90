//! Capture run configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use dash_protocol::{CameraSpec, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::CaptureError;
use crate::jam::JamConfig;

/// Camera mounted on the ego vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    pub fov_y: f64,
    /// Mount position relative to the vehicle
    pub pos: Vec3,
    /// Viewing direction relative to the vehicle
    pub dir: Vec3,
    /// Resolution as `[width, height]`
    pub resolution: [u32; 2],
    /// Near clipping plane in metres
    pub near: f64,
    /// Far clipping plane in metres
    pub far: f64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y: 70.0,
            pos: Vec3::new(0.0, -1.9, 0.95),
            dir: Vec3::new(0.0, -1.0, 0.0),
            resolution: [2048, 1024],
            near: 0.01,
            far: 1000.0,
        }
    }
}

impl CameraConfig {
    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.resolution[0]
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.resolution[1]
    }

    /// Sensor description sent to the simulator; all buffers enabled
    pub fn to_spec(&self) -> CameraSpec {
        CameraSpec {
            pos: self.pos,
            dir: self.dir,
            fov_y: self.fov_y,
            resolution: self.resolution,
            near: self.near,
            far: self.far,
            colour: true,
            annotation: true,
            depth: true,
        }
    }
}

/// Wall-clock time of day in the simulated world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hours: u8,
    minutes: u8,
    seconds: u8,
}

impl TimeOfDay {
    pub fn new(hours: u8, minutes: u8, seconds: u8) -> Result<Self, CaptureError> {
        if hours > 23 || minutes > 59 || seconds > 59 {
            return Err(CaptureError::InvalidConfig(format!(
                "time of day out of range: {:02}:{:02}:{:02}",
                hours, minutes, seconds
            )));
        }
        Ok(Self {
            hours,
            minutes,
            seconds,
        })
    }

    /// Seconds since midnight
    pub fn seconds_since_midnight(&self) -> u32 {
        self.hours as u32 * 3600 + self.minutes as u32 * 60 + self.seconds as u32
    }

    /// Fraction of the day in [0, 1), as the simulator expects it
    pub fn day_fraction(&self) -> f64 {
        self.seconds_since_midnight() as f64 / 86_400.0
    }
}

impl Default for TimeOfDay {
    fn default() -> Self {
        Self {
            hours: 14,
            minutes: 0,
            seconds: 0,
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = CaptureError;

    /// Parse `HH:MM` or `HH:MM:SS`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CaptureError::InvalidConfig(format!("invalid time of day: {:?}", s));

        let parts: Vec<&str> = s.trim().split(':').collect();
        if !(2..=3).contains(&parts.len()) {
            return Err(invalid());
        }

        let mut fields = [0u8; 3];
        for (field, part) in fields.iter_mut().zip(&parts) {
            if part.is_empty() || part.len() > 2 {
                return Err(invalid());
            }
            *field = part.parse().map_err(|_| invalid())?;
        }

        Self::new(fields[0], fields[1], fields[2])
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = CaptureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(tod: TimeOfDay) -> Self {
        tod.to_string()
    }
}

/// Configuration for a capture run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Experiment name, also the output directory
    pub experiment_name: String,
    /// Frames kept per map
    pub images_per_map: u32,
    /// Jam detection thresholds
    pub jam: JamConfig,
    /// Physics steps per simulated second
    pub steps_per_second: u32,
    /// Physics steps between two captures
    pub capture_steps: u32,
    /// Ego speed limit in km/h
    pub ego_speed_kph: f64,
    /// Camera settings
    pub camera: CameraConfig,
    /// Time of day when capture starts
    pub initial_time: TimeOfDay,
    /// Let the time of day progress during capture
    pub change_tod: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            experiment_name: "dataset".to_string(),
            images_per_map: 1000,
            jam: JamConfig::default(),
            steps_per_second: 30,
            capture_steps: 300,
            ego_speed_kph: 80.0,
            camera: CameraConfig::default(),
            initial_time: TimeOfDay::default(),
            change_tod: true,
        }
    }
}

impl CaptureConfig {
    /// Simulated time between two captures
    pub fn capture_period(&self) -> Duration {
        Duration::from_secs_f64(self.capture_steps as f64 / self.steps_per_second as f64)
    }

    /// Ego speed limit in metres per second
    pub fn ego_speed_mps(&self) -> f64 {
        self.ego_speed_kph / 3.6
    }

    /// Reject settings the capture loop cannot run with
    pub fn validate(&self) -> Result<(), CaptureError> {
        self.jam.validate()?;

        let fail = |msg: &str| Err(CaptureError::InvalidConfig(msg.to_string()));

        if self.experiment_name.trim().is_empty() {
            return fail("experiment name must not be empty");
        }
        if self.images_per_map == 0 {
            return fail("images per map must be at least 1");
        }
        if self.steps_per_second == 0 {
            return fail("steps per second must be at least 1");
        }
        if self.capture_steps == 0 {
            return fail("capture steps must be at least 1");
        }
        if !self.ego_speed_kph.is_finite() || self.ego_speed_kph <= 0.0 {
            return fail("ego speed must be positive");
        }
        if !(self.camera.fov_y > 0.0 && self.camera.fov_y < 180.0) {
            return fail("camera field of view must be between 0 and 180 degrees");
        }
        if self.camera.width() == 0 || self.camera.height() == 0 {
            return fail("camera resolution must be non-zero");
        }
        if !(self.camera.near > 0.0 && self.camera.far > self.camera.near) {
            return fail("camera clipping planes must satisfy 0 < near < far");
        }
        Ok(())
    }
}
