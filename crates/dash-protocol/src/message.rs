//! Request and response messages for the simulator control link
//!
//! Every request is answered by exactly one response. Messages travel as the
//! JSON header of a frame (see [`crate::codec`]); bulk data such as camera
//! buffers travels in the frame payload.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::geometry::{Quat, Vec3};

/// Protocol revision spoken by this crate
pub const PROTOCOL_VERSION: u32 = 1;

/// Scripting command that teleports every traffic vehicle to a fresh location
pub const LUA_FORCE_TELEPORT_TRAFFIC: &str = "gameplay_traffic.forceTeleportAll()";

/// Scripting command that lifts the physics pause raised on instabilities
pub const LUA_UNPAUSE_PHYSICS: &str = "bullettime.pause(false)";

/// Sensors that can be attached to a vehicle at scenario build time
///
/// Vehicle state (position and rotation) is always available and does not
/// need to be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Vehicle electrics (wheel speed, gear, lights, ...)
    Electrics,
    /// Simulation clock
    Timer,
}

/// A vehicle to place when the scenario is built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSpec {
    /// Vehicle id used by every later request
    pub vid: String,
    /// Vehicle model name
    pub model: String,
    /// Paint colour
    pub color: String,
    /// Initial position
    pub pos: Vec3,
    /// Initial rotation
    pub rot: Quat,
    /// Sensors attached at spawn
    #[serde(default)]
    pub sensors: Vec<SensorKind>,
}

/// A scenario on a given map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSpec {
    /// Map (level) name
    pub map: String,
    /// Scenario name
    pub name: String,
    /// Vehicles placed at load time
    pub vehicles: Vec<VehicleSpec>,
}

/// Camera sensor parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSpec {
    /// Mount position relative to the vehicle
    pub pos: Vec3,
    /// Viewing direction relative to the vehicle
    pub dir: Vec3,
    /// Vertical field of view in degrees
    pub fov_y: f64,
    /// Resolution as `[width, height]`
    pub resolution: [u32; 2],
    /// Near clipping plane in metres
    pub near: f64,
    /// Far clipping plane in metres
    pub far: f64,
    /// Render the colour buffer
    pub colour: bool,
    /// Render the semantic annotation buffer
    pub annotation: bool,
    /// Render the depth buffer
    pub depth: bool,
}

/// AI driving modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiMode {
    /// No AI control
    #[default]
    Disabled,
    /// Drive around the whole road network
    Span,
    /// Pick random destinations
    Random,
    /// Behave like background traffic
    Traffic,
}

impl AiMode {
    /// Wire name of the mode
    pub fn name(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Span => "span",
            Self::Random => "random",
            Self::Traffic => "traffic",
        }
    }
}

/// How an AI speed value is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedMode {
    /// Upper bound, the AI may drive slower
    Limit,
    /// Target speed the AI tries to hold
    Set,
}

/// Requests sent from the capture driver to the simulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimRequest {
    /// Open the session and agree on a protocol version
    Hello { client: String, version: u32 },
    /// Fix the number of physics steps per simulated second
    SetDeterministic { steps_per_second: u32 },
    /// Build and load a scenario
    LoadScenario { scenario: ScenarioSpec },
    /// Start the loaded scenario
    StartScenario,
    /// Pause the simulation clock
    Pause,
    /// Resume the simulation clock
    Resume,
    /// Advance the simulation by a number of steps, blocking until done
    Step { count: u32 },
    /// Move a vehicle to a pose (also repairs it)
    Teleport { vid: String, pos: Vec3, rot: Quat },
    /// Queue a raw command for the simulator's scripting engine
    QueueLua { chunk: String },
    /// Spawn background traffic
    SpawnTraffic,
    /// Set time of day as a fraction of the day; `play` lets it progress
    SetTimeOfDay { tod: f64, play: bool },
    /// Hide the on-screen HUD
    HideHud,
    /// Attach a named camera to a vehicle
    OpenCamera {
        name: String,
        vid: String,
        camera: CameraSpec,
    },
    /// Poll state, electrics and timer of a vehicle
    PollVehicle { vid: String },
    /// Render and read back a named camera
    PollCamera { name: String },
    /// Set the AI driving mode of a vehicle
    AiSetMode { vid: String, mode: AiMode },
    /// Enable or disable lane keeping for an AI vehicle
    AiDriveInLane { vid: String, enabled: bool },
    /// Set the AI speed of a vehicle in metres per second
    AiSetSpeed {
        vid: String,
        speed_mps: f64,
        mode: SpeedMode,
    },
}

impl SimRequest {
    /// Short name of the request, for logging and error reporting
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::SetDeterministic { .. } => "set_deterministic",
            Self::LoadScenario { .. } => "load_scenario",
            Self::StartScenario => "start_scenario",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Step { .. } => "step",
            Self::Teleport { .. } => "teleport",
            Self::QueueLua { .. } => "queue_lua",
            Self::SpawnTraffic => "spawn_traffic",
            Self::SetTimeOfDay { .. } => "set_time_of_day",
            Self::HideHud => "hide_hud",
            Self::OpenCamera { .. } => "open_camera",
            Self::PollVehicle { .. } => "poll_vehicle",
            Self::PollCamera { .. } => "poll_camera",
            Self::AiSetMode { .. } => "ai_set_mode",
            Self::AiDriveInLane { .. } => "ai_drive_in_lane",
            Self::AiSetSpeed { .. } => "ai_set_speed",
        }
    }
}

/// Sensor readings of a vehicle at poll time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleSnapshot {
    /// Position
    pub pos: Vec3,
    /// Rotation
    pub rot: Quat,
    /// Simulation time in seconds (timer sensor)
    pub time: f64,
    /// Electrics values by name
    #[serde(default)]
    pub electrics: BTreeMap<String, serde_json::Value>,
}

/// Description of camera buffers carried in a frame payload
///
/// The payload holds the colour buffer (RGBA8), the annotation buffer (RGBA8)
/// and the depth buffer (f32 little-endian) back to back, in that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraFrameHeader {
    pub width: u32,
    pub height: u32,
    pub colour_len: usize,
    pub annotation_len: usize,
    pub depth_len: usize,
}

/// Borrowed views into a camera payload
#[derive(Debug, Clone, Copy)]
pub struct CameraBuffers<'a> {
    pub colour: &'a [u8],
    pub annotation: &'a [u8],
    pub depth: &'a [u8],
}

impl CameraFrameHeader {
    /// Build a header for full-resolution RGBA colour/annotation and f32 depth
    pub fn full(width: u32, height: u32) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            colour_len: pixels * 4,
            annotation_len: pixels * 4,
            depth_len: pixels * 4,
        }
    }

    /// Total payload bytes described by this header, `None` on overflow
    pub fn payload_len(&self) -> Option<usize> {
        self.colour_len
            .checked_add(self.annotation_len)?
            .checked_add(self.depth_len)
    }

    /// Bytes of one full-resolution buffer at four bytes per pixel
    fn buffer_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(4)
    }

    /// Split a payload into its three buffers
    ///
    /// Each buffer must be exactly `width * height * 4` bytes and the three
    /// must account for the whole payload.
    pub fn split<'a>(&self, payload: &'a [u8]) -> Result<CameraBuffers<'a>, ParseError> {
        let expected = self.buffer_len().ok_or(ParseError::PayloadMismatch {
            expected: usize::MAX,
            actual: payload.len(),
        })?;
        for (buffer, actual) in [
            ("colour", self.colour_len),
            ("annotation", self.annotation_len),
            ("depth", self.depth_len),
        ] {
            if actual != expected {
                return Err(ParseError::BufferMismatch {
                    buffer,
                    expected,
                    actual,
                });
            }
        }

        let total = self.payload_len().ok_or(ParseError::PayloadMismatch {
            expected: usize::MAX,
            actual: payload.len(),
        })?;
        if payload.len() != total {
            return Err(ParseError::PayloadMismatch {
                expected: total,
                actual: payload.len(),
            });
        }
        let (colour, rest) = payload.split_at(self.colour_len);
        let (annotation, depth) = rest.split_at(self.annotation_len);
        Ok(CameraBuffers {
            colour,
            annotation,
            depth,
        })
    }
}

/// Responses sent from the simulator to the capture driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimResponse {
    /// Answer to [`SimRequest::Hello`]
    Hello { server: String, version: u32 },
    /// Request completed without data
    Ack,
    /// Answer to [`SimRequest::PollVehicle`]
    VehicleState { snapshot: VehicleSnapshot },
    /// Answer to [`SimRequest::PollCamera`]; buffers follow in the payload
    CameraData { frame: CameraFrameHeader },
    /// Request failed on the simulator side
    Error { message: String },
}

impl SimResponse {
    /// Short name of the response, for logging and error reporting
    pub fn name(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::Ack => "ack",
            Self::VehicleState { .. } => "vehicle_state",
            Self::CameraData { .. } => "camera_data",
            Self::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_tagging() {
        let req = SimRequest::Step { count: 300 };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"step","count":300}"#);

        let unit = serde_json::to_string(&SimRequest::SpawnTraffic).unwrap();
        assert_eq!(unit, r#"{"type":"spawn_traffic"}"#);
    }

    #[test]
    fn test_teleport_wire_shape() {
        let req = SimRequest::Teleport {
            vid: "ego".into(),
            pos: Vec3::new(1.0, 2.0, 3.0),
            rot: Quat::new(0.0, 0.0, 1.0, 0.0),
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["type"], "teleport");
        assert_eq!(value["pos"], serde_json::json!([1.0, 2.0, 3.0]));
        assert_eq!(value["rot"], serde_json::json!([0.0, 0.0, 1.0, 0.0]));
    }

    #[test]
    fn test_ai_mode_names() {
        assert_eq!(AiMode::Span.name(), "span");
        let json = serde_json::to_string(&AiMode::Span).unwrap();
        assert_eq!(json, r#""span""#);
    }

    #[test]
    fn test_response_error_parses() {
        let resp: SimResponse =
            serde_json::from_str(r#"{"type":"error","message":"no such map"}"#).unwrap();
        assert_eq!(
            resp,
            SimResponse::Error {
                message: "no such map".into()
            }
        );
        assert_eq!(resp.name(), "error");
    }

    #[test]
    fn test_snapshot_electrics_default() {
        let resp: SimResponse = serde_json::from_str(
            r#"{"type":"vehicle_state","snapshot":{"pos":[1,2,3],"rot":[0,0,0,1],"time":4.5}}"#,
        )
        .unwrap();
        match resp {
            SimResponse::VehicleState { snapshot } => {
                assert_eq!(snapshot.pos, Vec3::new(1.0, 2.0, 3.0));
                assert_eq!(snapshot.time, 4.5);
                assert!(snapshot.electrics.is_empty());
            }
            other => panic!("unexpected response {:?}", other),
        }
    }

    #[test]
    fn test_camera_header_split() {
        let header = CameraFrameHeader::full(2, 1);
        assert_eq!(header.payload_len(), Some(24));

        let payload: Vec<u8> = (0..24).collect();
        let buffers = header.split(&payload).unwrap();
        assert_eq!(buffers.colour, &payload[0..8]);
        assert_eq!(buffers.annotation, &payload[8..16]);
        assert_eq!(buffers.depth, &payload[16..24]);
    }

    #[test]
    fn test_camera_header_split_rejects_short_payload() {
        let header = CameraFrameHeader::full(2, 2);
        let err = header.split(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            ParseError::PayloadMismatch {
                expected: 48,
                actual: 10
            }
        );
    }

    #[test]
    fn test_camera_header_overflowing_lengths_rejected() {
        let header = CameraFrameHeader {
            width: 2,
            height: 2,
            colour_len: usize::MAX,
            annotation_len: 1,
            depth_len: 16,
        };
        assert_eq!(header.payload_len(), None);
        assert!(matches!(
            header.split(&[]),
            Err(ParseError::BufferMismatch {
                buffer: "colour",
                expected: 16,
                ..
            })
        ));
    }

    #[test]
    fn test_camera_header_split_rejects_uneven_buffers() {
        let mut header = CameraFrameHeader::full(2, 2);
        header.annotation_len = 12;
        header.depth_len = 20;
        let err = header.split(&[0u8; 48]).unwrap_err();
        assert_eq!(
            err,
            ParseError::BufferMismatch {
                buffer: "annotation",
                expected: 16,
                actual: 12
            }
        );
    }

    #[test]
    fn test_camera_header_huge_resolution_rejected() {
        let header = CameraFrameHeader {
            width: u32::MAX,
            height: u32::MAX,
            colour_len: 0,
            annotation_len: 0,
            depth_len: 0,
        };
        assert!(header.split(&[]).is_err());
    }
}
