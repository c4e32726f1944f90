//! Dataset Capture Engine
//!
//! This crate drives a driving simulator to collect annotated camera
//! datasets. Per map it spawns an AI-driven ego vehicle with a camera
//! attached, steps the simulation at a fixed period and writes the colour
//! image, annotation mask, depth map and vehicle metadata of every step in
//! which the vehicle actually moved.
//!
//! # Architecture
//!
//! - [`Simulator`] is the boundary to the simulator; [`SimClient`] implements
//!   it over the frame protocol from `dash_protocol`
//! - [`Generator`] owns the simulator handle and runs maps one at a time,
//!   keeping per-map state in a [`MapSession`]
//! - [`JamDetector`] decides whether a step made progress and when the ego
//!   vehicle must be recovered
//! - [`SpawnCatalog`] holds the spawn points recoveries cycle through
//! - All noteworthy things are reported as [`CaptureEvent`]s
//!
//! # Example
//!
//! ```rust,no_run
//! use dash_capture::{CaptureConfig, Generator, SimClient, SpawnCatalog};
//!
//! # async fn run() -> Result<(), dash_capture::CaptureError> {
//! let sim = SimClient::connect("localhost", 64256).await?;
//! let mut generator = Generator::new(sim, CaptureConfig::default(), SpawnCatalog::builtin())?;
//!
//! generator.configure().await?;
//! generator.generate_map("italy").await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod generator;
pub mod jam;
pub mod output;
pub mod simulator;
pub mod spawn;

pub use client::SimClient;
pub use config::{CameraConfig, CaptureConfig, TimeOfDay};
pub use error::CaptureError;
pub use events::CaptureEvent;
pub use frame::{FrameMetadata, FrameRecord};
pub use generator::{Generator, MapSession, CAMERA_NAME, EGO_COLOR, EGO_MODEL, EGO_VID};
pub use jam::{FirstCheck, JamConfig, JamDetector, JamPhase, JamState, JamStep, Recovery};
pub use output::{write_parameters, FrameKind, OutputLayout, PARAMETERS_FILE};
pub use simulator::{CameraCapture, Simulator};
pub use spawn::{SpawnCatalog, SpawnCycle, SpawnPoint};
