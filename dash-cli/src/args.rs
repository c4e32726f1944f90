//! Command line arguments
//!
//! The parsed arguments are also what gets dumped to `parameters.json`, so
//! field names double as the keys of that file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dash_capture::{
    CameraConfig, CaptureConfig, FirstCheck, JamConfig, SpawnCatalog, TimeOfDay,
};
use dash_protocol::Vec3;
use serde::Serialize;

/// dashcap - annotated driving dataset capture
#[derive(Parser, Debug, Clone, Serialize)]
#[command(name = "dashcap")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Simulator hostname
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Simulator port
    #[arg(long, default_value_t = 64256)]
    pub port: u16,

    /// Experiment name, also the output directory
    #[arg(long, default_value = "dataset")]
    pub experiment_name: String,

    /// Maps to generate images for, in order
    #[arg(long, num_args = 1.., default_values_t = [String::from("italy"), String::from("east_coast_usa")])]
    pub maps: Vec<String>,

    /// Number of images generated per map
    #[arg(long, default_value_t = 1000)]
    pub imgs_per_map: u32,

    /// Distance in metres under which a capture step counts as stalled
    #[arg(long, default_value_t = 0.2)]
    pub jam_dist: f64,

    /// Stalled capture steps tolerated before a jam is declared
    #[arg(long, default_value_t = 2)]
    pub jam_steps: u32,

    /// Physics steps per simulated second
    #[arg(long, default_value_t = 30)]
    pub steps_per_second: u32,

    /// Physics steps between two camera captures
    #[arg(long, default_value_t = 300)]
    pub capture_steps: u32,

    /// Speed limit of the camera vehicle in km/h
    #[arg(long, default_value_t = 80.0)]
    pub ego_speed_kph: f64,

    /// Vertical field of view of the camera, in degrees
    #[arg(long, default_value_t = 70.0)]
    pub camera_fov: f64,

    /// Camera position relative to the vehicle
    #[arg(
        long,
        num_args = 3,
        value_names = ["X", "Y", "Z"],
        allow_negative_numbers = true,
        default_values_t = [0.0, -1.9, 0.95]
    )]
    pub camera_pos: Vec<f64>,

    /// Camera resolution in pixels
    #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"], default_values_t = [2048u32, 1024])]
    pub camera_res: Vec<u32>,

    /// Initial time of day, HH:MM[:SS]
    #[arg(long, default_value = "14:00:00")]
    pub initial_time: TimeOfDay,

    /// Keep the time of day fixed instead of letting it progress
    #[arg(long)]
    pub no_change_tod: bool,

    /// JSON file with extra spawn points, merged over the built-in ones
    #[arg(long, value_name = "FILE")]
    pub spawn_points: Option<PathBuf>,

    /// Compare the first position of a run against the world origin
    #[arg(long)]
    pub check_first_step: bool,

    /// Do not wait for Enter after a scenario has loaded
    #[arg(long)]
    pub no_prompt: bool,

    /// Dry run against the built-in virtual simulator instead of connecting
    #[arg(long)]
    pub virtual_sim: bool,
}

impl Cli {
    /// Build the capture configuration
    pub fn capture_config(&self) -> Result<CaptureConfig> {
        let [x, y, z] = <[f64; 3]>::try_from(self.camera_pos.as_slice())
            .context("--camera-pos takes exactly three values")?;
        let resolution = <[u32; 2]>::try_from(self.camera_res.as_slice())
            .context("--camera-res takes exactly two values")?;

        let config = CaptureConfig {
            experiment_name: self.experiment_name.clone(),
            images_per_map: self.imgs_per_map,
            jam: JamConfig {
                jam_dist: self.jam_dist,
                jam_steps: self.jam_steps,
                first_check: if self.check_first_step {
                    FirstCheck::AgainstOrigin
                } else {
                    FirstCheck::Skip
                },
            },
            steps_per_second: self.steps_per_second,
            capture_steps: self.capture_steps,
            ego_speed_kph: self.ego_speed_kph,
            camera: CameraConfig {
                fov_y: self.camera_fov,
                pos: Vec3::new(x, y, z),
                resolution,
                ..Default::default()
            },
            initial_time: self.initial_time,
            change_tod: !self.no_change_tod,
        };
        config.validate()?;
        Ok(config)
    }

    /// Built-in spawn points, extended by `--spawn-points`
    pub fn spawn_catalog(&self) -> Result<SpawnCatalog> {
        let mut catalog = SpawnCatalog::builtin();
        if let Some(path) = &self.spawn_points {
            let extra = SpawnCatalog::load(path)
                .with_context(|| format!("loading spawn points from {}", path.display()))?;
            catalog.merge(extra);
        }

        if let Some(missing) = self.maps.iter().find(|m| !catalog.contains(m)) {
            anyhow::bail!(
                "no spawn points for map '{}'; known maps: {}",
                missing,
                catalog.maps().collect::<Vec<_>>().join(", ")
            );
        }
        Ok(catalog)
    }
}
