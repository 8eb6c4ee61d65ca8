//! End-to-end behavior of compiled emitters.
//!
//! Each test builds an emitter from a definition, gathers the particles alive
//! at some time and checks the simulated columns.

use glam::{Quat, Vec3, Vec4};
use proptest::prelude::*;
use stateless_particles::prelude::*;
use stateless_particles::random::random_float4;
use stateless_particles::sampler::sample_curve;
use stateless_particles::{
    BuiltDistribution, DistributionSampler, ParameterDeclaration, ParameterExpression, ParameterValue, ParticleBatch,
};

fn burst(amount: u32, lifetime: f32) -> EmitterDefinition {
    EmitterDefinition {
        random_seed: 77,
        loop_behavior: LoopBehavior::Once,
        loop_duration: 1.0,
        lifetime: LifetimeRange {
            min: lifetime,
            max: lifetime,
        },
        spawn: vec![SpawnInfo::Burst { time: 0.0, amount }],
        ..Default::default()
    }
}

fn run(definition: &EmitterDefinition, time: f32, dt: f32) -> Vec<ParticleBatch> {
    let emitter = definition.build(&BuildOptions::default()).unwrap();
    let params = emitter.parameter_store().snapshot();
    let mut batches = emitter.gather(time, dt);
    emitter.simulate_batches(&mut batches, &params, dt);
    batches
}

fn column<T: stateless_particles::ParticleValue>(batches: &[ParticleBatch], variable: ParticleVariable) -> Vec<T> {
    batches
        .iter()
        .flat_map(|b| (0..b.len()).map(move |i| b.get::<T>(variable, i).unwrap()))
        .collect()
}

fn every_module() -> Vec<stateless_particles::Module> {
    let mut material = DynamicMaterialParameters::default();
    material.parameters[1].x = Some(Distribution::curve(Curve::linear(0.0, 1.0)));
    vec![
        InitializeParticle::default().into(),
        InitialMeshOrientation::default().into(),
        ShapeLocation::default().into(),
        AddVelocity::default().into(),
        AccelerationForce::default().into(),
        GravityForce::default().into(),
        Drag::default().into(),
        CurlNoiseForce::default().into(),
        SolveVelocitiesAndForces::default().into(),
        RotateAroundPoint::default().into(),
        CameraOffset::default().into(),
        material.into(),
        MeshRotationRate::default().into(),
        MeshIndex::default().into(),
        WeightedMeshIndex::default().into(),
        ScaleColor::default().into(),
        ScaleMeshSize::default().into(),
        ScaleMeshSizeBySpeed::default().into(),
        ScaleRibbonWidth::default().into(),
        ScaleSpriteSize::default().into(),
        ScaleSpriteSizeBySpeed::default().into(),
        SpriteFacingAndAlignment::default().into(),
        SpriteRotationRate::default().into(),
        SubUvAnimation::default().into(),
    ]
}

// ============================================================================
// Determinism
// ============================================================================

proptest! {
    #[test]
    fn prop_random_is_pure(index in any::<u32>(), emitter_seed in any::<u32>(), seed in any::<u32>()) {
        let a = random_float4(index, emitter_seed, seed);
        let b = random_float4(index, emitter_seed, seed);
        prop_assert_eq!(a, b);
        prop_assert!(a.cmpge(Vec4::ZERO).all() && a.cmplt(Vec4::ONE).all());
    }

    #[test]
    fn prop_random_flags_round_trip(offset in 0usize..(1 << 20), uniform in any::<bool>()) {
        let d = BuiltDistribution::random(offset, uniform).unwrap();
        prop_assert!(d.is_random());
        prop_assert!(!d.is_binding());
        prop_assert_eq!(d.is_uniform(), uniform);
        prop_assert_eq!(d.data_offset() as usize, offset);
        prop_assert_eq!(BuiltDistribution::from_words(d.words()), d);
    }

    #[test]
    fn prop_binding_flags_round_trip(offset in 0usize..(1 << 20)) {
        let d = BuiltDistribution::binding(offset).unwrap();
        prop_assert!(d.is_binding());
        prop_assert!(!d.is_random() && !d.is_uniform());
        prop_assert_eq!(d.data_offset() as usize, offset);
        prop_assert_eq!(d.scale(), 1.0);
    }

    #[test]
    fn prop_curve_endpoints_are_exact(
        from in -1000.0f32..1000.0,
        to in -1000.0f32..1000.0,
        resolution in 2usize..=512,
    ) {
        let (values, bias, scale) = Curve::linear(from, to).to_lut(resolution, 0.0);
        let d = BuiltDistribution::curve(0, values.len(), bias, scale).unwrap();
        prop_assert!(!d.is_random() && !d.is_binding());
        prop_assert_eq!(d.table_length() as usize, values.len() - 1);
        prop_assert_eq!(sample_curve::<f32>(&d, &values, 0.0), from);
        prop_assert_eq!(sample_curve::<f32>(&d, &values, 1.0), to);
    }
}

#[test]
fn test_batch_split_does_not_change_results() {
    let mut definition = burst(300, 2.0);
    definition.attributes = vec![
        ParticleAttribute::Position.current(),
        ParticleAttribute::Color.current(),
    ];
    definition.modules = vec![
        InitializeParticle {
            color: Distribution::range(Vec4::ZERO, Vec4::ONE),
            ..Default::default()
        }
        .into(),
        ShapeLocation::default().into(),
        CurlNoiseForce::default().into(),
        SolveVelocitiesAndForces::default().into(),
    ];

    let whole = run(&definition, 0.8, 0.1);
    let emitter = definition
        .build(&BuildOptions {
            max_batch_size: 7,
            ..Default::default()
        })
        .unwrap();
    let params = emitter.parameter_store().snapshot();
    let mut split = emitter.gather(0.8, 0.1);
    assert!(split.len() > 1);
    for batch in &mut split {
        emitter.simulate(batch, &params, 0.1);
    }

    let a: Vec<Vec4> = column(&whole, ParticleAttribute::Color.current());
    let b: Vec<Vec4> = column(&split, ParticleAttribute::Color.current());
    assert_eq!(a, b);
    let a: Vec<Vec3> = column(&whole, ParticleAttribute::Position.current());
    let b: Vec<Vec3> = column(&split, ParticleAttribute::Position.current());
    assert_eq!(a, b);
}

#[test]
fn test_same_time_same_particles() {
    let mut definition = burst(50, 1.0);
    definition.attributes = vec![ParticleAttribute::Position.current()];
    definition.modules = vec![ShapeLocation::default().into()];
    let a: Vec<Vec3> = column(&run(&definition, 0.3, 0.1), ParticleAttribute::Position.current());
    let b: Vec<Vec3> = column(&run(&definition, 0.3, 0.1), ParticleAttribute::Position.current());
    assert_eq!(a.len(), 50);
    assert_eq!(a, b);
}

// ============================================================================
// Optional attributes
// ============================================================================

#[test]
fn test_every_module_with_only_previous_attributes() {
    let mut definition = burst(64, 2.0);
    definition.attributes = ParticleAttribute::ALL.iter().map(|a| a.previous()).collect();
    definition.modules = every_module();
    let emitter = definition.build(&BuildOptions::default()).unwrap();
    assert!(!emitter.exec_modules().is_empty());

    let batches = run(&definition, 0.5, 0.1);
    let positions: Vec<Vec3> = column(&batches, ParticleAttribute::Position.previous());
    assert_eq!(positions.len(), 64);
    assert!(positions.iter().all(|p| p.is_finite()));
}

#[test]
fn test_every_module_with_only_current_attributes() {
    let mut definition = burst(64, 2.0);
    definition.attributes = ParticleAttribute::ALL.iter().map(|a| a.current()).collect();
    definition.modules = every_module();
    let batches = run(&definition, 0.5, 0.1);
    let colors: Vec<Vec4> = column(&batches, ParticleAttribute::Color.current());
    assert_eq!(colors.len(), 64);
    assert!(colors.iter().all(|c| c.is_finite()));
}

#[test]
fn test_every_module_with_no_attributes() {
    let mut definition = burst(16, 2.0);
    // Modules that read Position would pull it into the layout.
    definition.modules = every_module()
        .into_iter()
        .filter(|m| m.input_variables().is_empty())
        .collect();
    let emitter = definition.build(&BuildOptions::default()).unwrap();
    assert!(emitter.exec_modules().is_empty());
    // Every module still owns built data.
    assert!(!emitter.built_data().is_empty());
    assert_eq!(run(&definition, 0.5, 0.1).iter().map(|b| b.len()).sum::<usize>(), 16);
}

#[test]
fn test_disabled_module_leaves_others_bit_identical() {
    let mut definition = burst(100, 2.0);
    definition.attributes = vec![
        ParticleAttribute::Position.current(),
        ParticleAttribute::Position.previous(),
        ParticleAttribute::Color.current(),
        ParticleAttribute::SpriteSize.current(),
    ];
    definition.modules = vec![
        InitializeParticle::default().into(),
        ShapeLocation::default().into(),
        ScaleColor {
            scale: Distribution::range(Vec4::ZERO, Vec4::ONE),
            ..Default::default()
        }
        .into(),
        GravityForce::default().into(),
        SolveVelocitiesAndForces::default().into(),
        ScaleSpriteSize::default().into(),
    ];
    let enabled = definition.clone();
    if let stateless_particles::Module::ScaleColor(scale) = &mut definition.modules[2] {
        scale.enabled = false;
    }

    let a_emitter = enabled.build(&BuildOptions::default()).unwrap();
    let b_emitter = definition.build(&BuildOptions::default()).unwrap();
    assert_eq!(a_emitter.built_data().len(), b_emitter.built_data().len());
    assert!(!b_emitter.exec_modules().contains(&"ScaleColor"));

    let a = run(&enabled, 1.2, 0.1);
    let b = run(&definition, 1.2, 0.1);
    for variable in [ParticleAttribute::Position.current(), ParticleAttribute::Position.previous()] {
        let pa: Vec<Vec3> = column(&a, variable);
        let pb: Vec<Vec3> = column(&b, variable);
        let bits = |v: &[Vec3]| v.iter().flat_map(|p| p.to_array().map(f32::to_bits)).collect::<Vec<_>>();
        assert_eq!(bits(&pa), bits(&pb));
    }
    let sa: Vec<glam::Vec2> = column(&a, ParticleAttribute::SpriteSize.current());
    let sb: Vec<glam::Vec2> = column(&b, ParticleAttribute::SpriteSize.current());
    assert_eq!(sa, sb);
    let ca: Vec<Vec4> = column(&a, ParticleAttribute::Color.current());
    let cb: Vec<Vec4> = column(&b, ParticleAttribute::Color.current());
    assert_ne!(ca, cb);
}

// ============================================================================
// Distributions
// ============================================================================

#[test]
fn test_curve_with_no_keys_uses_default() {
    let mut definition = burst(4, 2.0);
    definition.attributes = vec![ParticleAttribute::CameraOffset.current()];
    definition.modules = vec![CameraOffset {
        offset: Distribution::curve(Curve::new(Vec::<(f32, f32)>::new())),
        ..Default::default()
    }
    .into()];
    for time in [0.0, 0.7, 1.9] {
        let offsets: Vec<f32> = column(&run(&definition, time, 0.1), ParticleAttribute::CameraOffset.current());
        assert!(offsets.iter().all(|&o| o == 0.0));
    }
}

#[test]
fn test_curve_with_one_key_is_constant() {
    let mut definition = burst(4, 2.0);
    definition.attributes = vec![ParticleAttribute::CameraOffset.current()];
    definition.modules = vec![CameraOffset {
        offset: Distribution::curve(Curve::new([(0.3, 7.0)])),
        ..Default::default()
    }
    .into()];
    for time in [0.0, 0.7, 1.9] {
        let offsets: Vec<f32> = column(&run(&definition, time, 0.1), ParticleAttribute::CameraOffset.current());
        assert_eq!(offsets.len(), 4);
        assert!(offsets.iter().all(|&o| o == 7.0), "{offsets:?}");
    }
}

#[test]
fn test_uniform_range_scales_components_together() {
    let data = [5.0, 5.0, 5.0, 10.0, 10.0, 10.0];
    let random = Vec4::new(0.2, 0.6, 0.9, 0.0);

    let uniform = BuiltDistribution::random(0, true).unwrap();
    let v: Vec3 = DistributionSampler::new(uniform, &data, &[], random).sample(0.0);
    assert_eq!(v, Vec3::splat(6.0));

    let independent = BuiltDistribution::random(0, false).unwrap();
    let v: Vec3 = DistributionSampler::new(independent, &data, &[], random).sample(0.0);
    assert_eq!(v, Vec3::new(6.0, 8.0, 9.5));
}

#[test]
fn test_uniform_range_through_a_module() {
    let mut definition = burst(32, 2.0);
    definition.attributes = vec![ParticleAttribute::Scale.current()];
    definition.modules = vec![InitializeParticle {
        mesh_scale: Distribution::uniform_range(5.0, 10.0),
        ..Default::default()
    }
    .into()];
    let uniform: Vec<Vec3> = column(&run(&definition, 0.5, 0.1), ParticleAttribute::Scale.current());
    assert!(uniform.iter().all(|s| s.x == s.y && s.y == s.z && (5.0..=10.0).contains(&s.x)));

    definition.modules = vec![InitializeParticle {
        mesh_scale: Distribution::range(Vec3::splat(5.0), Vec3::splat(10.0)),
        ..Default::default()
    }
    .into()];
    let independent: Vec<Vec3> = column(&run(&definition, 0.5, 0.1), ParticleAttribute::Scale.current());
    assert!(independent.iter().any(|s| s.x != s.y));
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_rotation_rate_scenario() {
    let mut definition = burst(1, 2.0);
    definition.attributes = vec![
        ParticleAttribute::MeshOrientation.current(),
        ParticleAttribute::MeshOrientation.previous(),
    ];
    definition.modules = vec![MeshRotationRate {
        rotation_rate: Distribution::constant(Vec3::new(90.0, 0.0, 0.0)),
        ..Default::default()
    }
    .into()];
    let batches = run(&definition, 1.0, 0.1);
    let q: Vec<Quat> = column(&batches, ParticleAttribute::MeshOrientation.current());
    assert!(q[0].abs_diff_eq(Quat::from_rotation_x(90f32.to_radians()), 1e-5), "{:?}", q[0]);
}

#[test]
fn test_ring_full_disc_is_area_uniform() {
    const SAMPLES: u32 = 20_000;
    const BINS: usize = 10;

    let mut definition = burst(SAMPLES, 10.0);
    definition.attributes = vec![ParticleAttribute::Position.current()];
    definition.modules = vec![ShapeLocation {
        shape: Shape::Ring {
            radius: 100.0,
            coverage: 1.0,
            arc: 1.0,
        },
        ..Default::default()
    }
    .into()];

    let positions: Vec<Vec3> = column(&run(&definition, 0.5, 0.1), ParticleAttribute::Position.current());
    assert_eq!(positions.len(), SAMPLES as usize);

    let mut histogram = [0.0f32; BINS];
    for p in &positions {
        assert!(p.z.abs() < 1e-3);
        let r = p.truncate().length();
        assert!(r <= 100.0 + 1e-3);
        let bin = ((r / 100.0 * BINS as f32) as usize).min(BINS - 1);
        histogram[bin] += 1.0 / SAMPLES as f32;
    }
    for (k, &fraction) in histogram.iter().enumerate() {
        let expected = (((k + 1) * (k + 1) - k * k) as f32) / (BINS * BINS) as f32;
        assert!(
            (fraction - expected).abs() < 0.015,
            "bin {k}: {fraction} vs {expected} ({histogram:?})"
        );
    }
}

#[test]
fn test_gravity_fountain_falls() {
    let mut definition = burst(20, 3.0);
    definition.attributes = vec![ParticleAttribute::Position.current(), ParticleAttribute::Velocity.current()];
    definition.modules = vec![
        AddVelocity {
            mode: VelocityMode::Linear {
                velocity: Distribution::constant(Vec3::new(0.0, 0.0, 500.0)),
            },
            ..Default::default()
        }
        .into(),
        GravityForce::default().into(),
        SolveVelocitiesAndForces::default().into(),
    ];
    let batches = run(&definition, 1.0, 0.1);
    let positions: Vec<Vec3> = column(&batches, ParticleAttribute::Position.current());
    let velocities: Vec<Vec3> = column(&batches, ParticleAttribute::Velocity.current());
    // z = 500t - 490t^2 at t = 1
    assert!(positions.iter().all(|p| (p.z - 10.0).abs() < 1e-2));
    assert!(velocities.iter().all(|v| (v.z + 480.0).abs() < 1e-2));
}

// ============================================================================
// Live Parameters
// ============================================================================

#[test]
fn test_declared_wind_moves_particles() {
    let mut definition = burst(8, 5.0);
    definition.attributes = vec![ParticleAttribute::Position.current()];
    definition.parameters = vec![ParameterDeclaration {
        name: "Wind".into(),
        default: ParameterValue::Vec3(Vec3::new(100.0, 0.0, 0.0)),
    }];
    definition.modules = vec![
        AccelerationForce {
            acceleration: Distribution::binding("Wind"),
            ..Default::default()
        }
        .into(),
        SolveVelocitiesAndForces::default().into(),
    ];

    let batches = run(&definition, 1.0, 0.1);
    let positions: Vec<Vec3> = column(&batches, ParticleAttribute::Position.current());
    assert_eq!(positions.len(), 8);
    assert!(positions.iter().all(|p| p.abs_diff_eq(Vec3::new(50.0, 0.0, 0.0), 1e-3)), "{positions:?}");

    let emitter = definition.build(&BuildOptions::default()).unwrap();
    let mut store = emitter.parameter_store();
    store.set("Wind", Vec3::new(0.0, -20.0, 0.0)).unwrap();
    let params = store.snapshot();
    let mut batches = emitter.gather(1.0, 0.1);
    emitter.simulate_batches(&mut batches, &params, 0.1);
    let positions: Vec<Vec3> = column(&batches, ParticleAttribute::Position.current());
    assert!(positions.iter().all(|p| p.abs_diff_eq(Vec3::new(0.0, -10.0, 0.0), 1e-3)));
}

#[test]
fn test_expression_may_precede_its_binding() {
    let mut definition = burst(1, 5.0);
    definition.attributes = vec![ParticleAttribute::Position.current()];
    let gust = ParameterExpression::negate(ParameterExpression::binding("Gust"));
    definition.modules = vec![
        AccelerationForce {
            acceleration: Distribution::Expression(gust),
            ..Default::default()
        }
        .into(),
        AccelerationForce {
            acceleration: Distribution::binding("Gust"),
            ..Default::default()
        }
        .into(),
        SolveVelocitiesAndForces::default().into(),
    ];
    assert!(definition.build(&BuildOptions::default()).is_ok());

    definition.modules.remove(1);
    assert!(matches!(
        definition.build(&BuildOptions::default()),
        Err(BuildError::UnknownBinding(name)) if name == "Gust"
    ));
}
