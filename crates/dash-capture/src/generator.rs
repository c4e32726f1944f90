//! Capture session driver
//!
//! [`Generator`] drives one simulator through the maps of a run. Per map it
//! builds the scenario, then loops: poll the ego vehicle and camera, feed the
//! position to the jam detector, write the frame if the vehicle made
//! progress, recover if the detector asks for it, and step the simulation
//! forward.

use std::path::PathBuf;

use dash_protocol::{AiMode, ScenarioSpec, SensorKind, SpeedMode, VehicleSnapshot, VehicleSpec};
use tracing::{debug, info, warn};

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::events::CaptureEvent;
use crate::frame::FrameRecord;
use crate::jam::{JamDetector, Recovery};
use crate::output::OutputLayout;
use crate::simulator::{CameraCapture, Simulator};
use crate::spawn::{SpawnCatalog, SpawnCycle};

/// Vehicle id of the ego vehicle
pub const EGO_VID: &str = "ego";
/// Ego vehicle model
pub const EGO_MODEL: &str = "etk800";
/// Ego vehicle paint
pub const EGO_COLOR: &str = "White";
/// Name of the capture camera
pub const CAMERA_NAME: &str = "camera";

/// Per-map run state
///
/// Owns the spawn cycle, jam detector and frame counters of one map.
#[derive(Debug)]
pub struct MapSession {
    map: String,
    spawns: SpawnCycle,
    detector: JamDetector,
    layout: OutputLayout,
    frame_index: u32,
    iterations: u64,
    recoveries: u32,
}

impl MapSession {
    /// Map being captured
    pub fn map(&self) -> &str {
        &self.map
    }

    /// Spawn cycle of the map
    pub fn spawns(&self) -> &SpawnCycle {
        &self.spawns
    }

    /// Jam detector of the map
    pub fn detector(&self) -> &JamDetector {
        &self.detector
    }

    /// Output paths of the map
    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Index the next kept frame will be written under
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Capture iterations run so far, kept or not
    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Recoveries run so far
    pub fn recoveries(&self) -> u32 {
        self.recoveries
    }
}

/// Captures datasets from a simulator
pub struct Generator<S> {
    sim: S,
    config: CaptureConfig,
    catalog: SpawnCatalog,
    output_root: PathBuf,
    event_buffer: Vec<CaptureEvent>,
}

impl<S: Simulator> Generator<S> {
    /// Create a generator; the configuration is validated here
    pub fn new(sim: S, config: CaptureConfig, catalog: SpawnCatalog) -> Result<Self, CaptureError> {
        config.validate()?;
        Ok(Self {
            sim,
            config,
            catalog,
            output_root: PathBuf::from("."),
            event_buffer: Vec::new(),
        })
    }

    /// Place the experiment directory under `root` instead of the working directory
    pub fn with_output_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.output_root = root.into();
        self
    }

    /// Get the configuration
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Get the spawn catalog
    pub fn catalog(&self) -> &SpawnCatalog {
        &self.catalog
    }

    /// Directory all output of this run goes to
    pub fn experiment_dir(&self) -> PathBuf {
        self.output_root.join(&self.config.experiment_name)
    }

    /// Get the simulator handle
    pub fn simulator(&self) -> &S {
        &self.sim
    }

    /// Get a mutable simulator handle
    pub fn simulator_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    /// Give back the simulator handle
    pub fn into_simulator(self) -> S {
        self.sim
    }

    /// Drain pending events
    pub fn drain_events(&mut self) -> Vec<CaptureEvent> {
        std::mem::take(&mut self.event_buffer)
    }

    /// Apply run-wide simulator settings
    pub async fn configure(&mut self) -> Result<(), CaptureError> {
        let camera = &self.config.camera;
        info!(
            "Camera settings: FOV {} deg, resolution {}x{}, capture period {:.2} s",
            camera.fov_y,
            camera.width(),
            camera.height(),
            self.config.capture_period().as_secs_f64()
        );
        self.sim
            .set_deterministic(self.config.steps_per_second)
            .await
    }

    fn scenario_for(&self, map: &str, spawns: &SpawnCycle) -> ScenarioSpec {
        let spawn = spawns.current();
        ScenarioSpec {
            map: map.to_string(),
            name: format!("{}_dataset", map),
            vehicles: vec![VehicleSpec {
                vid: EGO_VID.to_string(),
                model: EGO_MODEL.to_string(),
                color: EGO_COLOR.to_string(),
                pos: spawn.pos,
                rot: spawn.rot,
                sensors: vec![SensorKind::Electrics, SensorKind::Timer],
            }],
        }
    }

    /// Load the scenario of a map and get it ready for capture
    ///
    /// The ego vehicle starts at the first spawn point of the map. Traffic is
    /// spawned and the simulation is stepped one simulated second so the
    /// world settles before capture starts.
    pub async fn prepare_map(&mut self, map: &str) -> Result<MapSession, CaptureError> {
        let spawns = self.catalog.cycle(map)?;
        let scenario = self.scenario_for(map, &spawns);

        info!("Loading scenario {}...", scenario.name);
        self.sim.load_scenario(&scenario).await?;
        self.sim.pause().await?;
        self.sim.start_scenario().await?;

        info!("Creating camera...");
        self.sim
            .open_camera(CAMERA_NAME, EGO_VID, &self.config.camera.to_spec())
            .await?;

        info!("Spawning traffic...");
        self.sim.spawn_traffic().await?;
        self.sim.hide_hud().await?;
        self.sim.step(self.config.steps_per_second).await?;

        self.event_buffer.push(CaptureEvent::MapLoaded {
            map: map.to_string(),
            spawn: spawns.current().name.clone(),
        });

        Ok(MapSession {
            map: map.to_string(),
            spawns,
            detector: JamDetector::new(self.config.jam),
            layout: OutputLayout::new(&self.experiment_dir(), map),
            frame_index: 0,
            iterations: 0,
            recoveries: 0,
        })
    }

    /// Capture frames until the session holds `images_per_map` of them
    pub async fn capture(&mut self, session: &mut MapSession) -> Result<(), CaptureError> {
        info!("Generating annotated images for {}...", session.map);

        info!("Setting environment...");
        self.sim
            .set_time_of_day(
                self.config.initial_time.day_fraction(),
                self.config.change_tod,
            )
            .await?;

        self.engage_ai().await?;
        self.sim
            .ai_set_speed(EGO_VID, self.config.ego_speed_mps(), SpeedMode::Limit)
            .await?;

        session.layout.create_dirs()?;

        while session.frame_index < self.config.images_per_map {
            self.capture_step(session).await?;
            self.sim.step(self.config.capture_steps).await?;
        }

        info!(
            "Finished {}: {} frames in {} iterations, {} recoveries",
            session.map, session.frame_index, session.iterations, session.recoveries
        );
        self.event_buffer.push(CaptureEvent::MapFinished {
            map: session.map.clone(),
            frames: session.frame_index,
            iterations: session.iterations,
            recoveries: session.recoveries,
        });
        Ok(())
    }

    /// Prepare and capture a map in one go
    pub async fn generate_map(&mut self, map: &str) -> Result<MapSession, CaptureError> {
        let mut session = self.prepare_map(map).await?;
        self.capture(&mut session).await?;
        Ok(session)
    }

    async fn capture_step(&mut self, session: &mut MapSession) -> Result<(), CaptureError> {
        let snapshot = self.sim.poll_vehicle(EGO_VID).await?;
        let capture = self.sim.poll_camera(CAMERA_NAME).await?;
        session.iterations += 1;

        let step = session.detector.observe(snapshot.pos);

        if step.progressed {
            self.keep_frame(session, &capture, &snapshot)?;
        } else {
            self.event_buffer.push(CaptureEvent::Stalled {
                map: session.map.clone(),
                index: session.frame_index,
                distance: step.distance.unwrap_or(0.0),
                remaining_patience: step.remaining_patience,
            });
        }

        if let Some(recovery) = step.recovery {
            warn!(
                "Traffic jam detected at iteration {:06}, resetting traffic vehicles...",
                session.frame_index
            );
            self.recover(session, recovery, &snapshot).await?;
        }
        Ok(())
    }

    fn keep_frame(
        &mut self,
        session: &mut MapSession,
        capture: &CameraCapture,
        snapshot: &VehicleSnapshot,
    ) -> Result<(), CaptureError> {
        let record = FrameRecord::from_capture(capture, snapshot, &self.config.camera)?;
        session.layout.write(session.frame_index, &record)?;

        debug!(
            "Wrote {} ({}/{})",
            session.layout.stem(session.frame_index),
            session.frame_index + 1,
            self.config.images_per_map
        );
        self.event_buffer.push(CaptureEvent::FrameWritten {
            map: session.map.clone(),
            index: session.frame_index,
        });
        session.frame_index += 1;
        Ok(())
    }

    async fn recover(
        &mut self,
        session: &mut MapSession,
        recovery: Recovery,
        snapshot: &VehicleSnapshot,
    ) -> Result<(), CaptureError> {
        self.sim.force_teleport_traffic().await?;

        let spawn = match recovery {
            Recovery::RepairInPlace => {
                self.sim
                    .teleport_vehicle(EGO_VID, snapshot.pos, snapshot.rot)
                    .await?;
                None
            }
            Recovery::Relocate => {
                let point = session.spawns.advance().clone();
                info!("Changing spawn point to '{}'", point.name);
                self.sim
                    .teleport_vehicle(EGO_VID, point.pos, point.rot)
                    .await?;
                Some(point.name)
            }
        };

        self.engage_ai().await?;
        self.sim.unpause_physics().await?;

        session.recoveries += 1;
        self.event_buffer.push(CaptureEvent::Recovered {
            map: session.map.clone(),
            index: session.frame_index,
            recovery,
            spawn,
        });
        Ok(())
    }

    async fn engage_ai(&mut self) -> Result<(), CaptureError> {
        self.sim.ai_set_mode(EGO_VID, AiMode::Span).await?;
        self.sim.ai_drive_in_lane(EGO_VID, true).await
    }
}
