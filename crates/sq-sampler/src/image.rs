//! Shader images
//!
//! [`SoftImage`] is a unit table of image storages implementing the
//! machine's load/store/atomic contract. Lanes outside the execution mask
//! or outside the image never write; they still read so atomics return a
//! defined value.

use std::sync::Arc;

use parking_lot::RwLock;
use sq_core::SamplerError;
use sq_exec::vector::NUM_CHANNELS;
use sq_exec::{
    AtomicOp, Channel, Image, ImageCoords, ImageFormat, ImageParams, TextureTarget, QUAD_SIZE,
};
use tracing::{debug, warn};

pub const MAX_SHADER_IMAGES: usize = 32;

/// Texel storage of one image
#[derive(Debug, Clone)]
pub struct ImageStorage {
    pub width: u32,
    pub height: u32,
    /// Slices of 3D images or layers of arrays
    pub depth: u32,
    pub format: ImageFormat,
    data: Vec<u8>,
}

pub type SharedImage = Arc<RwLock<ImageStorage>>;

impl ImageStorage {
    pub fn new(
        format: ImageFormat,
        width: u32,
        height: u32,
        depth: u32,
    ) -> Result<Self, SamplerError> {
        if width == 0 || height == 0 || depth == 0 {
            return Err(SamplerError::InvalidTexture(format!(
                "image size {width}x{height}x{depth}"
            )));
        }
        let len = width as usize * height as usize * depth as usize * format.block_size();
        Ok(Self {
            width,
            height,
            depth,
            format,
            data: vec![0; len],
        })
    }

    pub fn shared(self) -> SharedImage {
        Arc::new(RwLock::new(self))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn offset(&self, x: i32, y: i32, z: i32) -> Option<usize> {
        let in_range = |v: i32, size: u32| v >= 0 && (v as u32) < size;
        if !in_range(x, self.width) || !in_range(y, self.height) || !in_range(z, self.depth) {
            return None;
        }
        let index = (z as usize * self.height as usize + y as usize) * self.width as usize
            + x as usize;
        Some(index * self.format.block_size())
    }

    /// Raw channel bits of the texel at byte offset `off`
    fn read(&self, off: usize) -> [u32; NUM_CHANNELS] {
        let bytes = &self.data[off..off + self.format.block_size()];
        let word = |i: usize| -> u32 { bytemuck::pod_read_unaligned(&bytes[i * 4..i * 4 + 4]) };
        match self.format {
            ImageFormat::R32Float => [word(0), 0, 0, 1.0f32.to_bits()],
            ImageFormat::R32Uint | ImageFormat::R32Sint => [word(0), 0, 0, 1],
            ImageFormat::Rgba32Float | ImageFormat::Rgba32Uint | ImageFormat::Rgba32Sint => {
                std::array::from_fn(word)
            }
            ImageFormat::Rgba8Unorm => {
                std::array::from_fn(|c| (bytes[c] as f32 / 255.0).to_bits())
            }
        }
    }

    fn write(&mut self, off: usize, texel: &[u32; NUM_CHANNELS]) {
        let size = self.format.block_size();
        let bytes = &mut self.data[off..off + size];
        match self.format {
            ImageFormat::Rgba8Unorm => {
                for (byte, bits) in bytes.iter_mut().zip(texel) {
                    let v = f32::from_bits(*bits);
                    // NaN stores as zero
                    *byte = (v.clamp(0.0, 1.0) * 255.0).round() as u8;
                }
            }
            _ => {
                for (chunk, bits) in bytes.chunks_exact_mut(4).zip(texel) {
                    chunk.copy_from_slice(bytemuck::bytes_of(bits));
                }
            }
        }
    }

    /// Load a texel as raw channel bits; `None` when out of bounds
    pub fn load(&self, x: i32, y: i32, z: i32) -> Option<[u32; NUM_CHANNELS]> {
        self.offset(x, y, z).map(|off| self.read(off))
    }

    /// Store raw channel bits; out-of-bounds stores are dropped
    pub fn store(&mut self, x: i32, y: i32, z: i32, texel: &[u32; NUM_CHANNELS]) {
        if let Some(off) = self.offset(x, y, z) {
            self.write(off, texel);
        }
    }
}

/// Texel coordinates of `lane` for an image of `target`
fn texel_coords(target: TextureTarget, coords: &ImageCoords, lane: usize) -> (i32, i32, i32) {
    let (s, t, r) = (coords.s[lane], coords.t[lane], coords.r[lane]);
    match target {
        TextureTarget::Buffer | TextureTarget::Tex1D | TextureTarget::Shadow1D => (s, 0, 0),
        TextureTarget::Tex1DArray | TextureTarget::Shadow1DArray => (s, 0, t),
        TextureTarget::Tex2D
        | TextureTarget::Rect
        | TextureTarget::Shadow2D
        | TextureTarget::ShadowRect => (s, t, 0),
        _ => (s, t, r),
    }
}

fn lane_enabled(params: &ImageParams, lane: usize) -> bool {
    params.execmask & (1 << lane) != 0
}

fn to_channels(texels: &[[u32; NUM_CHANNELS]; QUAD_SIZE]) -> [Channel; NUM_CHANNELS] {
    std::array::from_fn(|c| Channel::from_u(std::array::from_fn(|lane| texels[lane][c])))
}

fn lane_texel(rgba: &[Channel; NUM_CHANNELS], lane: usize) -> [u32; NUM_CHANNELS] {
    std::array::from_fn(|c| rgba[c].u(lane))
}

/// Image unit table
#[derive(Debug)]
pub struct SoftImage {
    units: RwLock<Vec<Option<SharedImage>>>,
}

impl SoftImage {
    pub fn new() -> Self {
        Self {
            units: RwLock::new(vec![None; MAX_SHADER_IMAGES]),
        }
    }

    pub fn bind(&self, unit: u32, image: Option<SharedImage>) -> Result<(), SamplerError> {
        let mut units = self.units.write();
        let slot = units
            .get_mut(unit as usize)
            .ok_or(SamplerError::UnitOutOfRange(unit))?;
        if let Some(image) = &image {
            let storage = image.read();
            debug!(
                unit,
                format = ?storage.format,
                width = storage.width,
                height = storage.height,
                depth = storage.depth,
                "bound image"
            );
        }
        *slot = image;
        Ok(())
    }

    pub fn storage(&self, unit: u32) -> Option<SharedImage> {
        self.units.read().get(unit as usize).cloned().flatten()
    }
}

impl Default for SoftImage {
    fn default() -> Self {
        Self::new()
    }
}

impl Image for SoftImage {
    fn load(&self, params: &ImageParams, coords: &ImageCoords) -> [Channel; NUM_CHANNELS] {
        let mut texels = [[0; NUM_CHANNELS]; QUAD_SIZE];
        if let Some(image) = self.storage(params.unit) {
            let image = image.read();
            for (lane, texel) in texels.iter_mut().enumerate() {
                let (x, y, z) = texel_coords(params.target, coords, lane);
                if let Some(value) = image.load(x, y, z) {
                    *texel = value;
                }
            }
        }
        to_channels(&texels)
    }

    fn store(&self, params: &ImageParams, coords: &ImageCoords, rgba: &[Channel; NUM_CHANNELS]) {
        let Some(image) = self.storage(params.unit) else {
            return;
        };
        let mut image = image.write();
        for lane in (0..QUAD_SIZE).filter(|&lane| lane_enabled(params, lane)) {
            let (x, y, z) = texel_coords(params.target, coords, lane);
            image.store(x, y, z, &lane_texel(rgba, lane));
        }
    }

    fn op(
        &self,
        params: &ImageParams,
        op: AtomicOp,
        coords: &ImageCoords,
        value: &[Channel; NUM_CHANNELS],
        value2: &[Channel; NUM_CHANNELS],
    ) -> [Channel; NUM_CHANNELS] {
        let mut texels = [[0; NUM_CHANNELS]; QUAD_SIZE];
        let Some(image) = self.storage(params.unit) else {
            return to_channels(&texels);
        };
        let mut image = image.write();
        let writable = image.format != ImageFormat::Rgba8Unorm;
        if !writable {
            warn!(unit = params.unit, ?op, "atomic on a normalized image is read-only");
        }

        // Lanes apply in order so aliasing texels see earlier results
        for (lane, texel) in texels.iter_mut().enumerate() {
            let (x, y, z) = texel_coords(params.target, coords, lane);
            let Some(old) = image.load(x, y, z) else {
                continue;
            };
            *texel = old;
            if writable && lane_enabled(params, lane) {
                let mut new = old;
                new[0] = op.apply(old[0], value[0].u(lane), value2[0].u(lane));
                image.store(x, y, z, &new);
            }
        }
        to_channels(&texels)
    }

    fn get_dims(&self, params: &ImageParams) -> [i32; 4] {
        let Some(image) = self.storage(params.unit) else {
            return [0; 4];
        };
        let image = image.read();
        let (w, h, d) = (image.width as i32, image.height as i32, image.depth as i32);
        match params.target {
            TextureTarget::Buffer | TextureTarget::Tex1D | TextureTarget::Shadow1D => {
                [w, 0, 0, 0]
            }
            TextureTarget::Tex1DArray | TextureTarget::Shadow1DArray => [w, d, 0, 0],
            TextureTarget::Tex2D
            | TextureTarget::Rect
            | TextureTarget::Shadow2D
            | TextureTarget::ShadowRect => [w, h, 0, 0],
            _ => [w, h, d, 0],
        }
    }
}
