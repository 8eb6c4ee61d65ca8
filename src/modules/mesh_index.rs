//! Mesh selection for mesh renderers.

use super::{default_enabled, lerp, variable_offsets, ModuleStage, StatelessModule};
use crate::attributes::{ParticleAttribute, INDEX_NONE};
use crate::build_context::EmitterBuildContext;
use crate::context::ParticleSimulationContext;
use crate::distribution::{Distribution, MAX_DATA_OFFSET};
use crate::error::BuildError;
use crate::GpuLayout;
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Picks a mesh index uniformly from an inclusive range.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshIndex {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Whole numbers; a range selects `min..=max`.
    pub index: Distribution<f32>,
}

impl Default for MeshIndex {
    fn default() -> Self {
        Self {
            enabled: true,
            index: Distribution::constant(0.0),
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct MeshIndexBuiltData {
    mesh_index_offset: i32,
    previous_mesh_index_offset: i32,
    index_min: f32,
    index_max: f32,
    index_binding: i32,
}

impl StatelessModule for MeshIndex {
    const NAME: &'static str = "MeshIndex";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let (mesh_index_offset, previous_mesh_index_offset) = variable_offsets(ctx, ParticleAttribute::MeshIndex);
        let range = ctx.convert_distribution_to_range(&self.index, 0.0)?;
        let (min, max) = (range.min.min(range.max).floor(), range.min.max(range.max).floor());
        let data = MeshIndexBuiltData {
            mesh_index_offset,
            previous_mesh_index_offset,
            index_min: min.max(0.0),
            index_max: max.max(0.0),
            index_binding: range.binding_offset(),
        };
        let handle = ctx.allocate_built_data(data);
        if self.enabled && mesh_index_offset != INDEX_NONE {
            ctx.add_particle_simulation_exec(handle, simulate);
        }
        Ok(())
    }
}

fn simulate(ctx: &mut ParticleSimulationContext<'_>) {
    let data: MeshIndexBuiltData = ctx.read_built_data();
    let bound: f32 = ctx.parameter_value(data.index_binding);
    for i in 0..ctx.num_instances() {
        let picked = lerp(data.index_min, data.index_max + 1.0, ctx.random_float(i, 0)).floor();
        let index = (picked.min(data.index_max) + bound.floor()).max(0.0) as i32;
        ctx.write_particle_variable(data.mesh_index_offset, i, index);
        ctx.write_particle_variable(data.previous_mesh_index_offset, i, index);
    }
}

/// Picks a mesh index with probability proportional to its weight.
///
/// Weights are turned into a Walker alias table at build time, so a particle
/// picks its mesh with one table lookup no matter how many meshes there are.
/// Negative weights count as zero; if every weight is zero the choice is uniform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightedMeshIndex {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub weights: Vec<f32>,
}

impl Default for WeightedMeshIndex {
    fn default() -> Self {
        Self {
            enabled: true,
            weights: vec![1.0],
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, GpuLayout)]
struct WeightedMeshIndexBuiltData {
    mesh_index_offset: i32,
    previous_mesh_index_offset: i32,
    /// Pool offset of `(probability, alias)` pairs.
    table_offset: u32,
    table_length: u32,
}

/// Alias table entry: keep `index` with `probability`, else take `alias`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct AliasEntry {
    pub(crate) probability: f32,
    pub(crate) alias: u32,
}

/// Vose's variant of the alias method.
pub(crate) fn build_alias_table(weights: &[f32]) -> Vec<AliasEntry> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    let clamped: Vec<f32> = weights.iter().map(|w| if w.is_finite() { w.max(0.0) } else { 0.0 }).collect();
    let total: f32 = clamped.iter().sum();
    let mut scaled: Vec<f32> = if total > 0.0 {
        clamped.iter().map(|w| w * n as f32 / total).collect()
    } else {
        vec![1.0; n]
    };

    let mut table = vec![
        AliasEntry {
            probability: 1.0,
            alias: 0,
        };
        n
    ];
    let (mut small, mut large): (Vec<usize>, Vec<usize>) = (0..n).partition(|&i| scaled[i] < 1.0);

    while let (Some(&s), Some(&l)) = (small.last(), large.last()) {
        small.pop();
        table[s] = AliasEntry {
            probability: scaled[s],
            alias: l as u32,
        };
        scaled[l] -= 1.0 - scaled[s];
        if scaled[l] < 1.0 {
            large.pop();
            small.push(l);
        }
    }
    // Leftovers are 1.0 up to rounding.
    for i in small.into_iter().chain(large) {
        table[i] = AliasEntry {
            probability: 1.0,
            alias: i as u32,
        };
    }
    table
}

impl StatelessModule for WeightedMeshIndex {
    const NAME: &'static str = "WeightedMeshIndex";
    const STAGE: ModuleStage = ModuleStage::PostSolve;

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn build(&self, ctx: &mut EmitterBuildContext<'_>) -> Result<(), BuildError> {
        let (mesh_index_offset, previous_mesh_index_offset) = variable_offsets(ctx, ParticleAttribute::MeshIndex);
        let active = self.enabled && mesh_index_offset != INDEX_NONE && !self.weights.is_empty();

        let (table_offset, table_length) = if active {
            let table = build_alias_table(&self.weights);
            let words: Vec<f32> = table.iter().flat_map(|e| [e.probability, e.alias as f32]).collect();
            let offset = ctx.add_static_data(&words);
            if offset >= MAX_DATA_OFFSET {
                return Err(BuildError::DataOffsetOverflow { offset });
            }
            (offset as u32, table.len() as u32)
        } else {
            (0, 0)
        };

        let handle = ctx.allocate_built_data(WeightedMeshIndexBuiltData {
            mesh_index_offset,
            previous_mesh_index_offset,
            table_offset,
            table_length,
        });
        if active {
            ctx.add_particle_simulation_exec(handle, simulate_weighted);
        }
        Ok(())
    }
}

fn simulate_weighted(ctx: &mut ParticleSimulationContext<'_>) {
    let data: WeightedMeshIndexBuiltData = ctx.read_built_data();
    let table = &ctx.static_data()[data.table_offset as usize..][..data.table_length as usize * 2];
    let last = data.table_length - 1;

    for i in 0..ctx.num_instances() {
        let r = ctx.random_float2(i, 0);
        let slot = ((r.x * data.table_length as f32) as u32).min(last) as usize;
        let index = if r.y < table[slot * 2] {
            slot as i32
        } else {
            table[slot * 2 + 1] as i32
        };
        ctx.write_particle_variable(data.mesh_index_offset, i, index);
        ctx.write_particle_variable(data.previous_mesh_index_offset, i, index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::{build, particles};

    fn histogram(module: WeightedMeshIndex, bins: usize, count: u32) -> Vec<f32> {
        let harness = build(vec![module.into()], &[ParticleAttribute::MeshIndex.current()]);
        let batch = harness.run(&particles(count, 0.5, 1.0), 0.1);
        let mut histogram = vec![0.0; bins];
        for i in 0..batch.len() {
            let index: i32 = batch.get(ParticleAttribute::MeshIndex.current(), i).unwrap();
            histogram[index as usize] += 1.0 / count as f32;
        }
        histogram
    }

    #[test]
    fn test_alias_table_preserves_weights() {
        let weights = [1.0, 3.0, 0.0, 4.0];
        let table = build_alias_table(&weights);
        let n = table.len() as f32;
        let mut mass = [0.0f32; 4];
        for (i, entry) in table.iter().enumerate() {
            mass[i] += entry.probability / n;
            mass[entry.alias as usize] += (1.0 - entry.probability) / n;
        }
        for (m, w) in mass.iter().zip(weights) {
            assert!((m - w / 8.0).abs() < 1e-5, "{mass:?}");
        }
    }

    #[test]
    fn test_alias_table_degenerate_weights() {
        assert!(build_alias_table(&[]).is_empty());
        let table = build_alias_table(&[0.0, -2.0, f32::NAN]);
        assert!(table.iter().all(|e| e.probability == 1.0));
    }

    #[test]
    fn test_weighted_selection_matches_weights() {
        let module = WeightedMeshIndex {
            weights: vec![1.0, 0.0, 3.0],
            ..Default::default()
        };
        let histogram = histogram(module, 3, 20_000);
        assert!((histogram[0] - 0.25).abs() < 0.02, "{histogram:?}");
        assert_eq!(histogram[1], 0.0);
        assert!((histogram[2] - 0.75).abs() < 0.02, "{histogram:?}");
    }

    #[test]
    fn test_weighted_without_weights_has_no_kernel() {
        let module = WeightedMeshIndex {
            weights: Vec::new(),
            ..Default::default()
        };
        let harness = build(vec![module.into()], &[ParticleAttribute::MeshIndex.current()]);
        assert!(harness.exec_modules().is_empty());
    }

    #[test]
    fn test_range_is_inclusive() {
        let module = MeshIndex {
            index: Distribution::range(1.0, 3.0),
            ..Default::default()
        };
        let harness = build(vec![module.into()], &[ParticleAttribute::MeshIndex.current()]);
        let batch = harness.run(&particles(500, 0.5, 1.0), 0.1);
        let mut seen = [false; 4];
        for i in 0..batch.len() {
            let index: i32 = batch.get(ParticleAttribute::MeshIndex.current(), i).unwrap();
            assert!((1..=3).contains(&index));
            seen[index as usize] = true;
        }
        assert_eq!(seen, [false, true, true, true]);
    }

    #[test]
    fn test_bound_index_follows_parameter() {
        let module = MeshIndex {
            index: Distribution::binding("Variant"),
            ..Default::default()
        };
        let harness = build(vec![module.into()], &[ParticleAttribute::MeshIndex.current()]);
        let mut store = harness.parameter_store();
        store.set("Variant", 2.7f32).unwrap();
        let batch = harness.run_with(&particles(16, 0.5, 1.0), 0.1, &store.snapshot());
        for i in 0..batch.len() {
            assert_eq!(batch.get::<i32>(ParticleAttribute::MeshIndex.current(), i), Some(2));
        }
        store.set("Variant", -1.0f32).unwrap();
        let batch = harness.run_with(&particles(1, 0.5, 1.0), 0.1, &store.snapshot());
        assert_eq!(batch.get::<i32>(ParticleAttribute::MeshIndex.current(), 0), Some(0));
    }
}
