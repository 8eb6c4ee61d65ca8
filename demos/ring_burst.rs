//! Ring burst: one burst of sparks on a ring, pushed outward, animated
//! through a flipbook. The emitter is authored in JSON.
//!
//! Prints the same particle at several times to show that any time can be
//! queried directly, in any order.
//!
//! Run with: `cargo run --example ring_burst`

use stateless_particles::prelude::*;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const RING_BURST: &str = r#"{
    "name": "RingBurst",
    "random_seed": 99,
    "lifetime": { "min": 1.0, "max": 1.5 },
    "loop_behavior": "Once",
    "loop_duration": 2.0,
    "spawn": [ { "Burst": { "time": 0.0, "amount": 2000 } } ],
    "attributes": [
        "Position",
        "Previous.Position",
        "Color",
        "SpriteSize",
        "SubImageIndex"
    ],
    "modules": [
        {
            "module": "InitializeParticle",
            "color": { "NonUniformConstant": [1.0, 0.7, 0.2, 1.0] },
            "sprite_size": { "UniformRange": { "min": 2.0, "max": 5.0 } }
        },
        {
            "module": "ShapeLocation",
            "shape": { "Ring": { "radius": 50.0, "coverage": 0.0 } }
        },
        {
            "module": "AddVelocity",
            "mode": {
                "FromPoint": {
                    "origin": [0.0, 0.0, 0.0],
                    "speed": { "UniformRange": { "min": 150.0, "max": 250.0 } }
                }
            }
        },
        { "module": "Drag", "drag": { "NonUniformConstant": 2.0 } },
        { "module": "SolveVelocitiesAndForces" },
        {
            "module": "ScaleSpriteSize",
            "scale": {
                "UniformCurve": {
                    "keys": [
                        { "time": 0.0, "value": 1.0 },
                        { "time": 1.0, "value": 0.0 }
                    ]
                }
            }
        },
        { "module": "SubUvAnimation", "mode": "Linear", "num_frames": 8 }
    ]
}"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let definition = EmitterDefinition::from_json(RING_BURST)?;
    let emitter = Arc::new(definition.build(&BuildOptions::default())?);
    let params = emitter.parameter_store().snapshot();
    let dt = 1.0 / 60.0;

    println!("=== Ring Burst ===");
    println!("Kernels: {}", emitter.exec_modules().join(", "));
    println!();

    // Out of order on purpose.
    for time in [0.9, 0.1, 0.5, 1.4] {
        let mut batches = emitter.gather(time, dt);
        emitter.simulate_batches(&mut batches, &params, dt);

        let alive: usize = batches.iter().map(|b| b.len()).sum();
        let mean_radius = batches
            .iter()
            .flat_map(|b| (0..b.len()).filter_map(move |i| b.get::<Vec3>(ParticleAttribute::Position.current(), i)))
            .map(|p| p.truncate().length())
            .sum::<f32>()
            / alive.max(1) as f32;
        tracing::info!(time, alive, mean_radius, "gathered");

        if let Some(batch) = batches.first() {
            let position: Option<Vec3> = batch.get(ParticleAttribute::Position.current(), 0);
            let frame: Option<f32> = batch.get(ParticleAttribute::SubImageIndex.current(), 0);
            let size: Option<Vec2> = batch.get(ParticleAttribute::SpriteSize.current(), 0);
            println!(
                "t={:.1}  particle #{}  position={:?}  frame={:?}  size={:?}",
                time,
                batch.unique_indices().next().unwrap_or(0),
                position,
                frame,
                size
            );
        }
    }

    let mut instance = EmitterInstance::new(emitter);
    instance.seek(0.5);
    let replayed = instance.advance(0.0, &params);
    println!();
    println!(
        "Seek to 0.5 and advance by 0: {} particles",
        replayed.iter().map(|b| b.len()).sum::<usize>()
    );
    Ok(())
}
