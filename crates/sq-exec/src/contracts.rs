//! Resource contracts
//!
//! The machine never owns textures, images or buffers. It calls out
//! through these traits and treats a missing resource as all zeros.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::tokens::{ImageFormat, TextureTarget};
use crate::vector::{Channel, NUM_CHANNELS, QUAD_SIZE};

/// Shared byte storage used for SSBOs and workgroup memory
pub type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Create a zero-filled shared buffer
pub fn shared_buffer(size: usize) -> SharedBuffer {
    Arc::new(Mutex::new(vec![0; size]))
}

/// Per-channel, per-lane RGBA result: `rgba[chan][lane]`
pub type QuadRgba = [[f32; QUAD_SIZE]; NUM_CHANNELS];

/// How the sampler derives the level of detail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplerControl {
    /// Implicit LOD from quad derivatives
    #[default]
    None,
    /// Implicit LOD plus per-lane bias
    Bias,
    /// Per-lane explicit LOD
    Explicit,
    /// Base level only
    Zero,
    /// LOD from caller-supplied derivatives
    DerivsExplicit,
    /// Four-texel gather
    Gather,
}

/// Texture coordinates handed to the sampler.
///
/// `c0` carries the array layer or shadow reference depending on the
/// target; `lod` carries the bias/explicit LOD, the gather component or
/// the shadow reference of cube-array targets.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SampleCoords {
    pub s: [f32; QUAD_SIZE],
    pub t: [f32; QUAD_SIZE],
    pub p: [f32; QUAD_SIZE],
    pub c0: [f32; QUAD_SIZE],
    pub lod: [f32; QUAD_SIZE],
}

/// Explicit derivatives: `[axis][dx=0 / dy=1][lane]`
pub type Derivatives = [[[f32; QUAD_SIZE]; 2]; 3];

/// Texture sampling interface
pub trait Sampler: Send + Sync {
    /// Filtered sample of four lanes
    fn get_samples(
        &self,
        view: u32,
        sampler: u32,
        coords: &SampleCoords,
        derivs: Option<&Derivatives>,
        offsets: [i32; 3],
        control: SamplerControl,
    ) -> QuadRgba;

    /// Width, height, depth/layers and level count of `level`
    fn get_dims(&self, view: u32, level: i32) -> [i32; 4];

    /// Unfiltered texel fetch by integer coordinates
    fn get_texel(
        &self,
        view: u32,
        i: [i32; QUAD_SIZE],
        j: [i32; QUAD_SIZE],
        k: [i32; QUAD_SIZE],
        lod: [i32; QUAD_SIZE],
        offsets: [i32; 3],
    ) -> QuadRgba;

    /// Returns (mipmap level that would be accessed, unclamped lambda)
    fn query_lod(
        &self,
        view: u32,
        sampler: u32,
        coords: &SampleCoords,
        control: SamplerControl,
    ) -> ([f32; QUAD_SIZE], [f32; QUAD_SIZE]);
}

/// Parameters shared by every image access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageParams {
    pub unit: u32,
    pub target: TextureTarget,
    pub format: ImageFormat,
    /// Lanes allowed to have side effects
    pub execmask: u32,
}

/// Integer image coordinates per lane (s, t, r, sample)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageCoords {
    pub s: [i32; QUAD_SIZE],
    pub t: [i32; QUAD_SIZE],
    pub r: [i32; QUAD_SIZE],
    pub sample: [i32; QUAD_SIZE],
}

/// Read-modify-write operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicOp {
    Uadd,
    Xchg,
    Cas,
    And,
    Or,
    Xor,
    Umin,
    Umax,
    Imin,
    Imax,
    Fadd,
}

impl AtomicOp {
    /// Combine the stored value with the operand(s). `cmp` is only
    /// consulted for CAS, where `operand` is the comparison value.
    pub fn apply(self, stored: u32, operand: u32, cmp: u32) -> u32 {
        match self {
            AtomicOp::Uadd => stored.wrapping_add(operand),
            AtomicOp::Xchg => operand,
            AtomicOp::Cas => {
                if stored == operand {
                    cmp
                } else {
                    stored
                }
            }
            AtomicOp::And => stored & operand,
            AtomicOp::Or => stored | operand,
            AtomicOp::Xor => stored ^ operand,
            AtomicOp::Umin => stored.min(operand),
            AtomicOp::Umax => stored.max(operand),
            AtomicOp::Imin => (stored as i32).min(operand as i32) as u32,
            AtomicOp::Imax => (stored as i32).max(operand as i32) as u32,
            AtomicOp::Fadd => (f32::from_bits(stored) + f32::from_bits(operand)).to_bits(),
        }
    }
}

/// Image load/store interface. Values travel as raw bits.
pub trait Image: Send + Sync {
    fn load(&self, params: &ImageParams, coords: &ImageCoords) -> [Channel; NUM_CHANNELS];

    fn store(&self, params: &ImageParams, coords: &ImageCoords, rgba: &[Channel; NUM_CHANNELS]);

    /// Atomic operation; returns the values held before the operation
    fn op(
        &self,
        params: &ImageParams,
        op: AtomicOp,
        coords: &ImageCoords,
        value: &[Channel; NUM_CHANNELS],
        value2: &[Channel; NUM_CHANNELS],
    ) -> [Channel; NUM_CHANNELS];

    fn get_dims(&self, params: &ImageParams) -> [i32; 4];
}

/// Shader storage buffer lookup
pub trait Buffer: Send + Sync {
    /// Backing storage of `unit`, or `None` when nothing is bound
    fn lookup(&self, unit: u32) -> Option<SharedBuffer>;
}

/// Resources a program may call out to
#[derive(Clone, Default)]
pub struct Resources {
    pub sampler: Option<Arc<dyn Sampler>>,
    pub image: Option<Arc<dyn Image>>,
    pub buffer: Option<Arc<dyn Buffer>>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn Sampler>) -> Self {
        self.sampler = Some(sampler);
        self
    }

    pub fn with_image(mut self, image: Arc<dyn Image>) -> Self {
        self.image = Some(image);
        self
    }

    pub fn with_buffer(mut self, buffer: Arc<dyn Buffer>) -> Self {
        self.buffer = Some(buffer);
        self
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("sampler", &self.sampler.is_some())
            .field("image", &self.image.is_some())
            .field("buffer", &self.buffer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_apply() {
        assert_eq!(AtomicOp::Uadd.apply(5, 3, 0), 8);
        assert_eq!(AtomicOp::Uadd.apply(u32::MAX, 1, 0), 0);
        assert_eq!(AtomicOp::Cas.apply(7, 7, 9), 9);
        assert_eq!(AtomicOp::Cas.apply(7, 6, 9), 7);
        assert_eq!(AtomicOp::Imin.apply((-3i32) as u32, 2, 0), (-3i32) as u32);
        assert_eq!(AtomicOp::Umin.apply((-3i32) as u32, 2, 0), 2);
        assert_eq!(
            AtomicOp::Fadd.apply(1.5f32.to_bits(), 2.0f32.to_bits(), 0),
            3.5f32.to_bits()
        );
    }
}
