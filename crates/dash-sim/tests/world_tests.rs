//! Integration tests for the virtual simulator world
//!
//! These tests drive the simulator through its request handler and verify
//! that motion, timing and obstructions stay deterministic.

use dash_protocol::{
    AiMode, Quat, ScenarioSpec, SimRequest, SimResponse, SpeedMode, Vec3, VehicleSpec,
    LUA_FORCE_TELEPORT_TRAFFIC,
};
use dash_sim::{Obstruction, VirtualSimulator, WEDGE_ESCAPE_DIST};

mod helpers {
    use super::*;

    pub fn load(sim: &mut VirtualSimulator, pos: Vec3, rot: Quat) {
        let scenario = ScenarioSpec {
            map: "test".into(),
            name: "test_dataset".into(),
            vehicles: vec![VehicleSpec {
                vid: "ego".into(),
                model: "etk800".into(),
                color: "White".into(),
                pos,
                rot,
                sensors: Vec::new(),
            }],
        };
        ack(sim, SimRequest::LoadScenario { scenario });
        ack(sim, SimRequest::StartScenario);
    }

    pub fn drive(sim: &mut VirtualSimulator, speed_mps: f64) {
        ack(
            sim,
            SimRequest::AiSetMode {
                vid: "ego".into(),
                mode: AiMode::Span,
            },
        );
        ack(
            sim,
            SimRequest::AiSetSpeed {
                vid: "ego".into(),
                speed_mps,
                mode: SpeedMode::Limit,
            },
        );
    }

    pub fn ack(sim: &mut VirtualSimulator, req: SimRequest) {
        let name = req.name();
        let resp = sim.handle(req);
        assert_eq!(resp.message, SimResponse::Ack, "{} not acknowledged", name);
    }
}

use helpers::*;

#[test]
fn test_reload_resets_clock_and_obstructions() {
    let mut sim = VirtualSimulator::new();
    load(&mut sim, Vec3::ORIGIN, Quat::IDENTITY);
    drive(&mut sim, 10.0);
    sim.obstruct(Obstruction::Traffic);
    ack(&mut sim, SimRequest::Step { count: 30 });

    load(&mut sim, Vec3::ORIGIN, Quat::IDENTITY);
    assert_eq!(sim.tick(), 0);
    assert_eq!(sim.time(), 0.0);
    assert!(sim.active_obstructions().is_empty());
    assert_eq!(sim.vehicle_ai_mode("ego"), Some(AiMode::Disabled));
}

#[test]
fn test_recovery_sequence_frees_traffic_jam() {
    let mut sim = VirtualSimulator::new().with_obstruction_at(0, Obstruction::Traffic);
    load(&mut sim, Vec3::ORIGIN, Quat::IDENTITY);
    drive(&mut sim, 10.0);

    ack(&mut sim, SimRequest::Step { count: 60 });
    assert_eq!(sim.vehicle_pos("ego"), Some(Vec3::ORIGIN));

    ack(
        &mut sim,
        SimRequest::QueueLua {
            chunk: LUA_FORCE_TELEPORT_TRAFFIC.into(),
        },
    );
    ack(&mut sim, SimRequest::Step { count: 60 });
    assert!(sim.vehicle_pos("ego").unwrap().distance(&Vec3::ORIGIN) > 9.0);
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn yaw() -> impl Strategy<Value = Quat> {
        (0.0f64..std::f64::consts::TAU).prop_map(|a| {
            let half = a / 2.0;
            Quat::new(0.0, 0.0, half.sin(), half.cos())
        })
    }

    proptest! {
        #[test]
        fn unobstructed_distance_matches_speed(
            rot in yaw(),
            speed in 0.5f64..40.0,
            sps in 1u32..120,
            ticks in 1u32..400,
        ) {
            let mut sim = VirtualSimulator::new();
            ack(&mut sim, SimRequest::SetDeterministic { steps_per_second: sps });
            load(&mut sim, Vec3::ORIGIN, rot);
            drive(&mut sim, speed);
            ack(&mut sim, SimRequest::Step { count: ticks });

            let travelled = sim.vehicle_pos("ego").unwrap().distance(&Vec3::ORIGIN);
            let expected = speed * ticks as f64 / sps as f64;
            prop_assert!((travelled - expected).abs() < 1e-6 * expected.max(1.0));
            prop_assert_eq!(sim.tick(), ticks as u64);
        }

        #[test]
        fn wedge_only_released_by_distant_teleport(
            dx in -5.0f64..5.0,
            dy in -5.0f64..5.0,
        ) {
            let mut sim = VirtualSimulator::new();
            load(&mut sim, Vec3::ORIGIN, Quat::IDENTITY);
            sim.obstruct(Obstruction::Wedged);

            let target = Vec3::new(dx, dy, 0.0);
            ack(&mut sim, SimRequest::Teleport { vid: "ego".into(), pos: target, rot: Quat::IDENTITY });

            let freed = sim.active_obstructions().is_empty();
            prop_assert_eq!(freed, target.distance(&Vec3::ORIGIN) >= WEDGE_ESCAPE_DIST);
        }
    }
}
