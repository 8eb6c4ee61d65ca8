//! The static float pool shared by every module of a compiled emitter.

/// Append-only pool of flattened floats.
///
/// Vectors are stored component-major and contiguous, so a `Vec3` value
/// takes three consecutive entries. Offsets returned by [`add`](Self::add)
/// stay valid for the lifetime of the compiled emitter. Identical runs of
/// floats are not deduplicated.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StaticDataPool {
    data: Vec<f32>,
}

impl StaticDataPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `values` and return the element offset of the first one.
    pub fn add(&mut self, values: &[f32]) -> usize {
        let offset = self.data.len();
        self.data.extend_from_slice(values);
        offset
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Byte view for uploading to the `static_data` storage binding.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
