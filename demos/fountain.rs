//! Water fountain: a rate-spawned cone of particles under gravity and wind.
//!
//! Shows the frame loop with a live parameter: the `Wind` acceleration is
//! rewritten every frame and picked up by the next snapshot.
//!
//! Run with: `RUST_LOG=info cargo run --example fountain`

use stateless_particles::parameters::ParameterDeclaration;
use stateless_particles::prelude::*;
use stateless_particles::ParameterValue;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn definition() -> EmitterDefinition {
    EmitterDefinition {
        name: "Fountain".into(),
        random_seed: 1234,
        lifetime: LifetimeRange { min: 1.5, max: 2.5 },
        loop_duration: 4.0,
        spawn: vec![SpawnInfo::Rate {
            rate: 500.0,
            start: 0.0,
            end: None,
        }],
        parameters: vec![ParameterDeclaration {
            name: "Wind".into(),
            default: ParameterValue::Vec3(Vec3::ZERO),
        }],
        attributes: vec![
            ParticleAttribute::Position.current(),
            ParticleAttribute::Position.previous(),
            ParticleAttribute::Color.current(),
            ParticleAttribute::SpriteSize.current(),
        ],
        modules: vec![
            InitializeParticle {
                color: Distribution::range(Vec4::new(0.4, 0.6, 1.0, 1.0), Vec4::new(0.7, 0.9, 1.0, 1.0)),
                sprite_size: Distribution::uniform_range(4.0, 8.0),
                ..Default::default()
            }
            .into(),
            ShapeLocation {
                shape: Shape::Ring {
                    radius: 10.0,
                    coverage: 1.0,
                    arc: 1.0,
                },
                ..Default::default()
            }
            .into(),
            AddVelocity {
                mode: VelocityMode::InCone {
                    axis: Vec3::Z,
                    angle_degrees: 12.0,
                    inner_fraction: 0.0,
                    speed: Distribution::range(550.0, 650.0),
                },
                ..Default::default()
            }
            .into(),
            GravityForce::default().into(),
            AccelerationForce {
                acceleration: Distribution::binding("Wind"),
                space: CoordinateSpace::World,
                ..Default::default()
            }
            .into(),
            Drag {
                drag: Distribution::constant(0.3),
                ..Default::default()
            }
            .into(),
            SolveVelocitiesAndForces::default().into(),
            ScaleColor {
                scale: Distribution::curve(Curve::new([
                    (0.0, Vec4::ONE),
                    (0.8, Vec4::ONE),
                    (1.0, Vec4::new(1.0, 1.0, 1.0, 0.0)),
                ])),
                ..Default::default()
            }
            .into(),
        ],
        ..Default::default()
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let emitter = Arc::new(definition().build(&BuildOptions::default())?);
    tracing::info!(kernels = ?emitter.exec_modules(), "fountain ready");

    let mut store = emitter.parameter_store();
    let mut instance = EmitterInstance::new(emitter.clone());
    let dt = 1.0 / 30.0;

    for frame in 0..180 {
        let gust = (frame as f32 * 0.05).sin() * 200.0;
        store.set("Wind", Vec3::new(gust, 0.0, 0.0))?;
        let params = store.snapshot();

        let batches = instance.advance(dt, &params);
        if frame % 30 == 0 {
            let alive: usize = batches.iter().map(|b| b.len()).sum();
            let highest = batches
                .iter()
                .flat_map(|b| (0..b.len()).filter_map(move |i| b.get::<Vec3>(ParticleAttribute::Position.current(), i)))
                .map(|p| p.z)
                .fold(f32::MIN, f32::max);
            tracing::info!(
                time = instance.time(),
                alive,
                batches = batches.len(),
                highest,
                wind = gust,
                "frame"
            );
        }
    }
    Ok(())
}
