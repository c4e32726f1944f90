//! Virtual Driving Simulator
//!
//! This crate provides a deterministic in-process simulator that speaks the
//! dashcap control protocol, for testing the capture engine without a
//! simulator install. It includes:
//!
//! - **VirtualSimulator**: answers every control request against a tiny
//!   world where vehicles drive straight along their heading
//! - **run_virtual_sim_task**: serves the protocol over any async stream
//!
//! Tests reproduce the stalls of a real simulator by injecting
//! [`Obstruction`]s, either immediately or scheduled for a tick.
//!
//! # Example
//!
//! ```rust
//! use dash_sim::{Obstruction, VirtualSimulator};
//! use dash_protocol::{SimRequest, SimResponse};
//!
//! let mut sim = VirtualSimulator::new().with_obstruction_at(600, Obstruction::Traffic);
//!
//! let resp = sim.handle(SimRequest::HideHud);
//! assert_eq!(resp.message, SimResponse::Ack);
//! assert!(sim.is_hud_hidden());
//! ```

pub mod server;
pub mod world;

pub use server::{run_virtual_sim_task, VirtualSimCommand, VirtualSimEvent};
pub use world::{Obstruction, VirtualSimConfig, VirtualSimulator, VEHICLE_FORWARD, WEDGE_ESCAPE_DIST};
