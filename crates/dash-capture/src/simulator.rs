//! Simulator control boundary
//!
//! Everything the capture engine asks of the simulator goes through the
//! [`Simulator`] trait. Each call completes only once the simulator has
//! finished the work, so a `step` call blocks the driver for the whole
//! duration of the requested physics steps.

use dash_protocol::{
    AiMode, CameraBuffers, CameraFrameHeader, CameraSpec, Quat, ScenarioSpec, SpeedMode, Vec3,
    VehicleSnapshot, LUA_FORCE_TELEPORT_TRAFFIC, LUA_UNPAUSE_PHYSICS,
};

use crate::error::CaptureError;

/// Camera buffers read back from the simulator
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCapture {
    /// Layout of the payload
    pub header: CameraFrameHeader,
    /// Colour, annotation and depth buffers back to back
    pub payload: Vec<u8>,
}

impl CameraCapture {
    /// Split the payload into its buffers
    pub fn buffers(&self) -> Result<CameraBuffers<'_>, CaptureError> {
        Ok(self.header.split(&self.payload)?)
    }
}

/// Operations the capture engine needs from a driving simulator
#[allow(async_fn_in_trait)]
pub trait Simulator {
    /// Open the session; returns the simulator's name
    async fn hello(&mut self) -> Result<String, CaptureError>;

    /// Fix the physics step rate so that runs are reproducible
    async fn set_deterministic(&mut self, steps_per_second: u32) -> Result<(), CaptureError>;

    /// Build and load a scenario
    async fn load_scenario(&mut self, scenario: &ScenarioSpec) -> Result<(), CaptureError>;

    /// Start the loaded scenario
    async fn start_scenario(&mut self) -> Result<(), CaptureError>;

    /// Pause the simulation clock
    async fn pause(&mut self) -> Result<(), CaptureError>;

    /// Resume the simulation clock
    async fn resume(&mut self) -> Result<(), CaptureError>;

    /// Advance the simulation by `count` steps
    async fn step(&mut self, count: u32) -> Result<(), CaptureError>;

    /// Move a vehicle to a pose; the vehicle is repaired on arrival
    async fn teleport_vehicle(&mut self, vid: &str, pos: Vec3, rot: Quat)
        -> Result<(), CaptureError>;

    /// Queue a raw scripting command
    async fn queue_lua(&mut self, chunk: &str) -> Result<(), CaptureError>;

    /// Spawn background traffic
    async fn spawn_traffic(&mut self) -> Result<(), CaptureError>;

    /// Set the time of day as a day fraction; `play` lets it progress
    async fn set_time_of_day(&mut self, tod: f64, play: bool) -> Result<(), CaptureError>;

    /// Hide the HUD so it does not end up in camera frames
    async fn hide_hud(&mut self) -> Result<(), CaptureError>;

    /// Attach a named camera to a vehicle
    async fn open_camera(
        &mut self,
        name: &str,
        vid: &str,
        camera: &CameraSpec,
    ) -> Result<(), CaptureError>;

    /// Poll state, electrics and timer of a vehicle
    async fn poll_vehicle(&mut self, vid: &str) -> Result<VehicleSnapshot, CaptureError>;

    /// Render and read back a named camera
    async fn poll_camera(&mut self, name: &str) -> Result<CameraCapture, CaptureError>;

    /// Set the AI driving mode of a vehicle
    async fn ai_set_mode(&mut self, vid: &str, mode: AiMode) -> Result<(), CaptureError>;

    /// Enable or disable lane keeping
    async fn ai_drive_in_lane(&mut self, vid: &str, enabled: bool) -> Result<(), CaptureError>;

    /// Set the AI speed in metres per second
    async fn ai_set_speed(
        &mut self,
        vid: &str,
        speed_mps: f64,
        mode: SpeedMode,
    ) -> Result<(), CaptureError>;

    /// Teleport every traffic vehicle away to clear gridlock
    async fn force_teleport_traffic(&mut self) -> Result<(), CaptureError> {
        self.queue_lua(LUA_FORCE_TELEPORT_TRAFFIC).await
    }

    /// Lift the physics pause the simulator raises on detected instabilities
    async fn unpause_physics(&mut self) -> Result<(), CaptureError> {
        self.queue_lua(LUA_UNPAUSE_PHYSICS).await
    }
}
