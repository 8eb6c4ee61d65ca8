//! Color over life.

use super::scale_size::build_scale;
use super::{default_enabled, ModuleStage, StatelessModule};
use crate::attributes::ParticleAttribute;
use crate::build_context::EmitterBuildContext;
use crate::distribution::Distribution;
use crate::error::BuildError;
use glam::Vec4;
use serde::{Deserialize, Serialize};

/// Multiplies `Color` by `scale` sampled at normalized age.
///
/// Without an earlier color writer the base color is white.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleColor {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub scale: Distribution<Vec4>,
}

impl Default for ScaleColor {
    fn default() -> Self {
        Self {
            enabled: true,
            scale: Distribution::constant(Vec4::ONE),
        }
    }
}

impl StatelessModule for ScaleColor {
    const NAME: &'static str = "ScaleColor";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        build_scale(ctx, self.enabled, ParticleAttribute::Color, &self.scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::Curve;
    use crate::modules::testing::{build, particles};
    use crate::modules::InitializeParticle;

    #[test]
    fn test_fade_out_over_life() {
        let initialize = InitializeParticle {
            color: Distribution::constant(Vec4::new(1.0, 0.5, 0.25, 1.0)),
            ..Default::default()
        };
        let fade = ScaleColor {
            scale: Distribution::curve(Curve::linear(Vec4::ONE, Vec4::new(1.0, 1.0, 1.0, 0.0))),
            ..Default::default()
        };
        let harness = build(
            vec![fade.into(), initialize.into()],
            &[ParticleAttribute::Color.current(), ParticleAttribute::Color.previous()],
        );
        let batch = harness.run(&[(0, 0.75, 1.0)], 0.25);
        let color: Vec4 = batch.get(ParticleAttribute::Color.current(), 0).unwrap();
        let previous: Vec4 = batch.get(ParticleAttribute::Color.previous(), 0).unwrap();
        assert!(color.abs_diff_eq(Vec4::new(1.0, 0.5, 0.25, 0.25), 1e-3), "{color}");
        assert!(previous.abs_diff_eq(Vec4::new(1.0, 0.5, 0.25, 0.5), 1e-3), "{previous}");
    }

    #[test]
    fn test_random_scale_is_fixed_per_particle() {
        let module = ScaleColor {
            scale: Distribution::range(Vec4::ZERO, Vec4::ONE),
            ..Default::default()
        };
        let harness = build(vec![module.into()], &[ParticleAttribute::Color.current()]);
        let early = harness.run(&particles(8, 0.1, 1.0), 0.1);
        let late = harness.run(&particles(8, 0.9, 1.0), 0.1);
        for i in 0..8 {
            let a: Vec4 = early.get(ParticleAttribute::Color.current(), i).unwrap();
            let b: Vec4 = late.get(ParticleAttribute::Color.current(), i).unwrap();
            assert_eq!(a, b);
            assert!(a.cmpge(Vec4::ZERO).all() && a.cmple(Vec4::ONE).all());
        }
    }
}
