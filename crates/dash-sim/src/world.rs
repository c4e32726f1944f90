//! Virtual simulator world
//!
//! A deterministic stand-in for a driving simulator. Vehicles drive
//! straight along their heading at their AI speed, the clock advances one
//! physics step per tick, and cameras render a synthetic gradient. Tests
//! inject obstructions to reproduce the stalls a real simulator produces.

use std::collections::BTreeMap;

use dash_protocol::{
    AiMode, CameraFrameHeader, CameraSpec, Packet, Quat, ScenarioSpec, SimRequest, SimResponse,
    Vec3, VehicleSnapshot, LUA_FORCE_TELEPORT_TRAFFIC, LUA_UNPAUSE_PHYSICS, PROTOCOL_VERSION,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Forward axis of a vehicle with identity rotation
pub const VEHICLE_FORWARD: Vec3 = Vec3::new(0.0, -1.0, 0.0);

/// A teleport closer than this to the wedge point leaves the vehicle wedged
pub const WEDGE_ESCAPE_DIST: f64 = 1.0;

/// Seconds in one simulated day
const DAY_LENGTH_SECS: f64 = 86_400.0;

/// Physics rate before a deterministic rate is set
const DEFAULT_STEPS_PER_SECOND: u32 = 60;

/// Something that keeps the ego vehicle from moving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Obstruction {
    /// Gridlocked traffic; cleared by force-teleporting all traffic
    Traffic,
    /// Vehicle stuck on geometry; cleared by teleporting it elsewhere
    Wedged,
    /// Physics paused on an instability; cleared by un-pausing physics
    Instability,
}

/// Configuration for creating a virtual simulator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualSimConfig {
    /// Name reported in the hello exchange
    pub name: String,
    /// Protocol version reported in the hello exchange
    pub version: u32,
}

impl Default for VirtualSimConfig {
    fn default() -> Self {
        Self {
            name: "dash-sim".to_string(),
            version: PROTOCOL_VERSION,
        }
    }
}

#[derive(Debug, Clone)]
struct VirtualVehicle {
    pos: Vec3,
    rot: Quat,
    ai_mode: AiMode,
    in_lane: bool,
    speed_mps: f64,
}

impl VirtualVehicle {
    fn is_driving(&self) -> bool {
        self.ai_mode != AiMode::Disabled && self.speed_mps > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ActiveObstruction {
    kind: Obstruction,
    /// Ego position when the obstruction started
    at: Vec3,
}

#[derive(Debug, Clone)]
struct VirtualCamera {
    vid: String,
    spec: CameraSpec,
}

/// A deterministic driving simulator
#[derive(Debug)]
pub struct VirtualSimulator {
    config: VirtualSimConfig,
    steps_per_second: u32,
    scenario: Option<ScenarioSpec>,
    started: bool,
    paused: bool,
    traffic: bool,
    hud_hidden: bool,
    tick: u64,
    time: f64,
    tod: f64,
    tod_play: bool,
    ego: Option<String>,
    vehicles: BTreeMap<String, VirtualVehicle>,
    cameras: BTreeMap<String, VirtualCamera>,
    scheduled: Vec<(u64, Obstruction)>,
    active: Vec<ActiveObstruction>,
    lua_log: Vec<String>,
    teleports: Vec<(String, Vec3)>,
    requests: u64,
}

impl Default for VirtualSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualSimulator {
    /// Create a simulator with default settings
    pub fn new() -> Self {
        Self::from_config(VirtualSimConfig::default())
    }

    /// Create a simulator from configuration
    pub fn from_config(config: VirtualSimConfig) -> Self {
        Self {
            config,
            steps_per_second: DEFAULT_STEPS_PER_SECOND,
            scenario: None,
            started: false,
            paused: false,
            traffic: false,
            hud_hidden: false,
            tick: 0,
            time: 0.0,
            tod: 0.5,
            tod_play: false,
            ego: None,
            vehicles: BTreeMap::new(),
            cameras: BTreeMap::new(),
            scheduled: Vec::new(),
            active: Vec::new(),
            lua_log: Vec::new(),
            teleports: Vec::new(),
            requests: 0,
        }
    }

    /// Get the simulator name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Physics steps elapsed since the scenario was loaded
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Simulated seconds since the scenario was loaded
    pub fn time(&self) -> f64 {
        self.time
    }

    /// Current time of day as a day fraction
    pub fn time_of_day(&self) -> f64 {
        self.tod
    }

    /// Configured physics rate
    pub fn steps_per_second(&self) -> u32 {
        self.steps_per_second
    }

    /// Loaded scenario, if any
    pub fn scenario(&self) -> Option<&ScenarioSpec> {
        self.scenario.as_ref()
    }

    /// Whether the scenario was started
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether the simulation clock is paused
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Whether background traffic was spawned
    pub fn has_traffic(&self) -> bool {
        self.traffic
    }

    /// Whether the HUD is hidden
    pub fn is_hud_hidden(&self) -> bool {
        self.hud_hidden
    }

    /// Position of a vehicle
    pub fn vehicle_pos(&self, vid: &str) -> Option<Vec3> {
        self.vehicles.get(vid).map(|v| v.pos)
    }

    /// AI mode of a vehicle
    pub fn vehicle_ai_mode(&self, vid: &str) -> Option<AiMode> {
        self.vehicles.get(vid).map(|v| v.ai_mode)
    }

    /// Whether lane keeping is on for a vehicle
    pub fn vehicle_in_lane(&self, vid: &str) -> Option<bool> {
        self.vehicles.get(vid).map(|v| v.in_lane)
    }

    /// AI speed of a vehicle in metres per second
    pub fn vehicle_speed(&self, vid: &str) -> Option<f64> {
        self.vehicles.get(vid).map(|v| v.speed_mps)
    }

    /// Every raw script chunk received, in order
    pub fn lua_log(&self) -> &[String] {
        &self.lua_log
    }

    /// Every teleport received, in order
    pub fn teleports(&self) -> &[(String, Vec3)] {
        &self.teleports
    }

    /// Number of requests handled
    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Obstructions currently holding the ego vehicle
    pub fn active_obstructions(&self) -> Vec<Obstruction> {
        self.active.iter().map(|o| o.kind).collect()
    }

    /// Start an obstruction now
    pub fn obstruct(&mut self, kind: Obstruction) {
        let at = self.ego_pos().unwrap_or(Vec3::ORIGIN);
        info!("Obstruction {:?} started at tick {} ({})", kind, self.tick, at);
        self.active.push(ActiveObstruction { kind, at });
    }

    /// Start an obstruction once the clock reaches `tick`
    pub fn schedule(&mut self, tick: u64, kind: Obstruction) {
        debug!("Obstruction {:?} scheduled for tick {}", kind, tick);
        self.scheduled.push((tick, kind));
    }

    /// Builder form of [`schedule`](Self::schedule)
    pub fn with_obstruction_at(mut self, tick: u64, kind: Obstruction) -> Self {
        self.schedule(tick, kind);
        self
    }

    fn ego_pos(&self) -> Option<Vec3> {
        self.ego.as_deref().and_then(|vid| self.vehicle_pos(vid))
    }

    fn clear(&mut self, kind: Obstruction) {
        let before = self.active.len();
        self.active.retain(|o| o.kind != kind);
        if self.active.len() != before {
            info!("Obstruction {:?} cleared at tick {}", kind, self.tick);
        }
    }

    fn is_blocked(&self) -> bool {
        !self.active.is_empty()
    }

    fn start_due_obstructions(&mut self) {
        let tick = self.tick;
        let (due, pending): (Vec<_>, Vec<_>) =
            self.scheduled.drain(..).partition(|(at, _)| *at <= tick);
        self.scheduled = pending;
        for (_, kind) in due {
            self.obstruct(kind);
        }
    }

    fn advance(&mut self, count: u32) {
        let dt = 1.0 / self.steps_per_second as f64;
        for _ in 0..count {
            self.start_due_obstructions();

            let blocked = self.is_blocked();
            for (vid, vehicle) in self.vehicles.iter_mut() {
                let held = blocked && self.ego.as_deref() == Some(vid.as_str());
                if vehicle.is_driving() && !held {
                    let heading = vehicle.rot.rotate(VEHICLE_FORWARD);
                    vehicle.pos = vehicle.pos.offset(heading.scaled(vehicle.speed_mps * dt));
                }
            }

            self.tick += 1;
            self.time += dt;
            if self.tod_play {
                self.tod = (self.tod + dt / DAY_LENGTH_SECS).fract();
            }
        }
    }

    fn teleport(&mut self, vid: &str, pos: Vec3, rot: Quat) -> Result<(), String> {
        let vehicle = self
            .vehicles
            .get_mut(vid)
            .ok_or_else(|| format!("unknown vehicle '{}'", vid))?;
        vehicle.pos = pos;
        vehicle.rot = rot;
        self.teleports.push((vid.to_string(), pos));

        if self.ego.as_deref() == Some(vid) {
            let before = self.active.len();
            self.active.retain(|o| {
                o.kind != Obstruction::Wedged || o.at.distance(&pos) < WEDGE_ESCAPE_DIST
            });
            if self.active.len() != before {
                info!("Vehicle {} freed by teleport to {}", vid, pos);
            }
        }
        Ok(())
    }

    fn run_lua(&mut self, chunk: &str) {
        self.lua_log.push(chunk.to_string());
        match chunk {
            LUA_FORCE_TELEPORT_TRAFFIC => self.clear(Obstruction::Traffic),
            LUA_UNPAUSE_PHYSICS => self.clear(Obstruction::Instability),
            other => debug!("Ignoring script chunk: {}", other),
        }
    }

    fn vehicle_mut(&mut self, vid: &str) -> Result<&mut VirtualVehicle, String> {
        self.vehicles
            .get_mut(vid)
            .ok_or_else(|| format!("unknown vehicle '{}'", vid))
    }

    fn require_scenario(&self) -> Result<(), String> {
        if self.scenario.is_none() {
            return Err("no scenario loaded".to_string());
        }
        Ok(())
    }

    fn snapshot(&self, vid: &str) -> Result<VehicleSnapshot, String> {
        let vehicle = self
            .vehicles
            .get(vid)
            .ok_or_else(|| format!("unknown vehicle '{}'", vid))?;

        let moving = vehicle.is_driving()
            && !(self.is_blocked() && self.ego.as_deref() == Some(vid));
        let wheelspeed = if moving { vehicle.speed_mps } else { 0.0 };

        let mut electrics = BTreeMap::new();
        electrics.insert("wheelspeed".to_string(), serde_json::json!(wheelspeed));
        electrics.insert("running".to_string(), serde_json::json!(true));
        electrics.insert("gear".to_string(), serde_json::json!(if moving { 3 } else { 0 }));

        Ok(VehicleSnapshot {
            pos: vehicle.pos,
            rot: vehicle.rot,
            time: self.time,
            electrics,
        })
    }

    fn render(&self, name: &str) -> Result<Packet<SimResponse>, String> {
        let camera = self
            .cameras
            .get(name)
            .ok_or_else(|| format!("unknown camera '{}'", name))?;
        if !self.vehicles.contains_key(&camera.vid) {
            return Err(format!("camera '{}' lost its vehicle", name));
        }

        let [width, height] = camera.spec.resolution;
        let header = CameraFrameHeader::full(width, height);
        let mut colour = Vec::with_capacity(header.colour_len);
        let mut annotation = Vec::with_capacity(header.annotation_len);
        let mut depth = Vec::with_capacity(header.depth_len);

        let shade = (self.tick % 256) as u8;
        let horizon = height / 2;
        for y in 0..height {
            for x in 0..width {
                colour.extend_from_slice(&[
                    (x * 255 / width.max(1)) as u8,
                    (y * 255 / height.max(1)) as u8,
                    shade,
                    255,
                ]);
                if y < horizon {
                    annotation.extend_from_slice(&[70, 130, 180, 255]);
                } else {
                    annotation.extend_from_slice(&[128, 64, 128, 255]);
                }
                let metres = if y < horizon {
                    f32::INFINITY
                } else {
                    let rows_below = (height - y) as f64;
                    (camera.spec.far * rows_below / (height - horizon).max(1) as f64) as f32
                };
                depth.extend_from_slice(&metres.to_le_bytes());
            }
        }

        let mut payload = colour;
        payload.extend_from_slice(&annotation);
        payload.extend_from_slice(&depth);
        Ok(Packet::with_payload(
            SimResponse::CameraData { frame: header },
            payload,
        ))
    }

    /// Answer one request
    pub fn handle(&mut self, req: SimRequest) -> Packet<SimResponse> {
        self.requests += 1;
        debug!("Virtual sim handling {}", req.name());
        match self.dispatch(req) {
            Ok(packet) => packet,
            Err(message) => Packet::new(SimResponse::Error { message }),
        }
    }

    fn dispatch(&mut self, req: SimRequest) -> Result<Packet<SimResponse>, String> {
        match req {
            SimRequest::Hello { client, .. } => {
                info!("Client {} connected", client);
                Ok(Packet::new(SimResponse::Hello {
                    server: self.config.name.clone(),
                    version: self.config.version,
                }))
            }
            SimRequest::SetDeterministic { steps_per_second } => {
                if steps_per_second == 0 {
                    return Err("steps_per_second must be positive".to_string());
                }
                self.steps_per_second = steps_per_second;
                ack()
            }
            SimRequest::LoadScenario { scenario } => {
                info!("Loading scenario {} on {}", scenario.name, scenario.map);
                self.vehicles = scenario
                    .vehicles
                    .iter()
                    .map(|v| {
                        (
                            v.vid.clone(),
                            VirtualVehicle {
                                pos: v.pos,
                                rot: v.rot,
                                ai_mode: AiMode::Disabled,
                                in_lane: false,
                                speed_mps: 0.0,
                            },
                        )
                    })
                    .collect();
                self.ego = scenario.vehicles.first().map(|v| v.vid.clone());
                self.cameras.clear();
                self.active.clear();
                self.started = false;
                self.traffic = false;
                self.tick = 0;
                self.time = 0.0;
                self.scenario = Some(scenario);
                ack()
            }
            SimRequest::StartScenario => {
                self.require_scenario()?;
                self.started = true;
                ack()
            }
            SimRequest::Pause => {
                self.paused = true;
                ack()
            }
            SimRequest::Resume => {
                self.paused = false;
                ack()
            }
            SimRequest::Step { count } => {
                if !self.started {
                    return Err("scenario not started".to_string());
                }
                self.advance(count);
                ack()
            }
            SimRequest::Teleport { vid, pos, rot } => {
                self.teleport(&vid, pos, rot)?;
                ack()
            }
            SimRequest::QueueLua { chunk } => {
                self.run_lua(&chunk);
                ack()
            }
            SimRequest::SpawnTraffic => {
                self.require_scenario()?;
                self.traffic = true;
                ack()
            }
            SimRequest::SetTimeOfDay { tod, play } => {
                if !(0.0..=1.0).contains(&tod) {
                    return Err(format!("time of day {} out of range", tod));
                }
                self.tod = tod;
                self.tod_play = play;
                ack()
            }
            SimRequest::HideHud => {
                self.hud_hidden = true;
                ack()
            }
            SimRequest::OpenCamera { name, vid, camera } => {
                if !self.vehicles.contains_key(&vid) {
                    return Err(format!("unknown vehicle '{}'", vid));
                }
                if camera.resolution[0] == 0 || camera.resolution[1] == 0 {
                    return Err("camera resolution must be positive".to_string());
                }
                self.cameras.insert(name, VirtualCamera { vid, spec: camera });
                ack()
            }
            SimRequest::PollVehicle { vid } => {
                let snapshot = self.snapshot(&vid)?;
                Ok(Packet::new(SimResponse::VehicleState { snapshot }))
            }
            SimRequest::PollCamera { name } => self.render(&name),
            SimRequest::AiSetMode { vid, mode } => {
                self.vehicle_mut(&vid)?.ai_mode = mode;
                ack()
            }
            SimRequest::AiDriveInLane { vid, enabled } => {
                self.vehicle_mut(&vid)?.in_lane = enabled;
                ack()
            }
            SimRequest::AiSetSpeed { vid, speed_mps, .. } => {
                if !speed_mps.is_finite() || speed_mps < 0.0 {
                    return Err(format!("invalid speed {}", speed_mps));
                }
                self.vehicle_mut(&vid)?.speed_mps = speed_mps;
                ack()
            }
        }
    }
}

fn ack() -> Result<Packet<SimResponse>, String> {
    Ok(Packet::new(SimResponse::Ack))
}
