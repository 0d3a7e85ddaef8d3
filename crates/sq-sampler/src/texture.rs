//! Texture storage
//!
//! A [`SoftTexture`] keeps every mip level decoded to RGBA `f32` texels,
//! the way the sampler reads them. Integer formats keep their raw bits in
//! the float slots. Layers of array and cube textures, and slices of 3D
//! textures, share the `z` axis.

use serde::{Deserialize, Serialize};
use sq_core::SamplerError;
use tracing::debug;

/// Shape of a texture resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ResourceTarget {
    Buffer,
    Tex1D,
    Tex1DArray,
    #[default]
    Tex2D,
    Rect,
    Tex2DArray,
    Tex3D,
    Cube,
    CubeArray,
}

impl ResourceTarget {
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Tex1DArray | Self::Tex2DArray | Self::CubeArray)
    }

    pub fn is_cube(&self) -> bool {
        matches!(self, Self::Cube | Self::CubeArray)
    }
}

/// Texel storage format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TexelFormat {
    #[default]
    Rgba8Unorm,
    Rgba8Snorm,
    R32Float,
    Rgba32Float,
    R32Uint,
    Rgba32Uint,
    Rgba32Sint,
    Depth32Float,
    Depth16Unorm,
}

impl TexelFormat {
    /// Bytes per texel
    pub fn block_size(&self) -> u32 {
        match self {
            Self::Rgba8Unorm | Self::Rgba8Snorm => 4,
            Self::R32Float | Self::R32Uint | Self::Depth32Float => 4,
            Self::Depth16Unorm => 2,
            Self::Rgba32Float | Self::Rgba32Uint | Self::Rgba32Sint => 16,
        }
    }

    pub fn is_unorm(&self) -> bool {
        matches!(self, Self::Rgba8Unorm | Self::Depth16Unorm)
    }

    pub fn is_snorm(&self) -> bool {
        matches!(self, Self::Rgba8Snorm)
    }

    pub fn is_pure_integer(&self) -> bool {
        matches!(self, Self::R32Uint | Self::Rgba32Uint | Self::Rgba32Sint)
    }

    /// Whether the first channel is stored as a float
    pub fn is_float(&self) -> bool {
        matches!(
            self,
            Self::R32Float | Self::Rgba32Float | Self::Depth32Float
        )
    }

    /// Value of a constant-one channel, as stored in a float slot
    pub fn one(&self) -> f32 {
        if self.is_pure_integer() {
            f32::from_bits(1)
        } else {
            1.0
        }
    }

    /// Decode one texel; missing channels read as 0 and missing alpha as 1
    pub fn decode(&self, bytes: &[u8]) -> [f32; 4] {
        let word = |i: usize| -> u32 {
            bytes
                .get(i * 4..i * 4 + 4)
                .map(bytemuck::pod_read_unaligned)
                .unwrap_or(0)
        };
        match self {
            Self::Rgba8Unorm => {
                let mut out = [0.0; 4];
                for (c, v) in out.iter_mut().enumerate() {
                    *v = bytes.get(c).copied().unwrap_or(0) as f32 / 255.0;
                }
                out
            }
            Self::Rgba8Snorm => {
                let mut out = [0.0; 4];
                for (c, v) in out.iter_mut().enumerate() {
                    let b = bytes.get(c).copied().unwrap_or(0) as i8;
                    *v = (b as f32 / 127.0).max(-1.0);
                }
                out
            }
            Self::R32Float | Self::Depth32Float => [f32::from_bits(word(0)), 0.0, 0.0, 1.0],
            Self::Depth16Unorm => {
                let v = bytes
                    .get(0..2)
                    .map(bytemuck::pod_read_unaligned::<u16>)
                    .unwrap_or(0);
                [v as f32 / 65535.0, 0.0, 0.0, 1.0]
            }
            Self::Rgba32Float | Self::Rgba32Uint | Self::Rgba32Sint => {
                [0, 1, 2, 3].map(|i| f32::from_bits(word(i)))
            }
            Self::R32Uint => [f32::from_bits(word(0)), 0.0, 0.0, self.one()],
        }
    }
}

/// Creation parameters of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureDesc {
    pub target: ResourceTarget,
    pub format: TexelFormat,
    pub width: u32,
    #[serde(default = "one")]
    pub height: u32,
    #[serde(default = "one")]
    pub depth: u32,
    #[serde(default = "one")]
    pub array_size: u32,
    /// Number of mip levels
    #[serde(default = "one")]
    pub levels: u32,
}

fn one() -> u32 {
    1
}

impl TextureDesc {
    pub fn new(target: ResourceTarget, format: TexelFormat, width: u32, height: u32) -> Self {
        let array_size = if target.is_cube() { 6 } else { 1 };
        Self {
            target,
            format,
            width,
            height,
            depth: 1,
            array_size,
            levels: 1,
        }
    }

    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        self
    }
}

/// Size of `size` at mip `level`
#[inline]
pub fn minify(size: u32, level: u32) -> u32 {
    size.checked_shr(level).unwrap_or(0).max(1)
}

#[derive(Debug, Clone)]
struct MipLevel {
    width: u32,
    height: u32,
    /// Slices for 3D textures, layers otherwise
    depth: u32,
    texels: Vec<[f32; 4]>,
}

/// Decoded texture resource
#[derive(Debug, Clone)]
pub struct SoftTexture {
    desc: TextureDesc,
    levels: Vec<MipLevel>,
    pot: bool,
}

impl SoftTexture {
    pub fn new(desc: TextureDesc) -> Result<Self, SamplerError> {
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 || desc.array_size == 0 {
            return Err(SamplerError::InvalidTexture(format!(
                "zero-sized texture {}x{}x{} [{}]",
                desc.width, desc.height, desc.depth, desc.array_size
            )));
        }
        if desc.levels == 0 || desc.levels > 16 {
            return Err(SamplerError::InvalidTexture(format!(
                "invalid level count {}",
                desc.levels
            )));
        }
        if desc.target.is_cube() && (desc.width != desc.height || desc.array_size % 6 != 0) {
            return Err(SamplerError::InvalidTexture(
                "cube faces must be square and come in groups of six".into(),
            ));
        }
        if desc.target == ResourceTarget::Buffer && desc.levels != 1 {
            return Err(SamplerError::InvalidTexture(
                "buffer textures have a single level".into(),
            ));
        }

        let levels = (0..desc.levels)
            .map(|level| {
                let width = minify(desc.width, level);
                let height = match desc.target {
                    ResourceTarget::Buffer
                    | ResourceTarget::Tex1D
                    | ResourceTarget::Tex1DArray => 1,
                    _ => minify(desc.height, level),
                };
                let depth = if desc.target == ResourceTarget::Tex3D {
                    minify(desc.depth, level)
                } else {
                    desc.array_size
                };
                // Texel indices are computed in u32
                let len = width
                    .checked_mul(height)
                    .and_then(|n| n.checked_mul(depth))
                    .ok_or_else(|| {
                        SamplerError::InvalidTexture(format!(
                            "level {level} of {width}x{height}x{depth} texels is too large"
                        ))
                    })?;
                Ok(MipLevel {
                    width,
                    height,
                    depth,
                    texels: vec![[0.0; 4]; len as usize],
                })
            })
            .collect::<Result<Vec<_>, SamplerError>>()?;

        let pot = desc.width.is_power_of_two()
            && desc.height.is_power_of_two()
            && desc.depth.is_power_of_two();

        debug!(?desc, pot, "created texture");
        Ok(Self { desc, levels, pot })
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn format(&self) -> TexelFormat {
        self.desc.format
    }

    /// All base dimensions are powers of two
    pub fn is_pot(&self) -> bool {
        self.pot
    }

    pub fn num_levels(&self) -> u32 {
        self.desc.levels
    }

    pub fn width(&self, level: u32) -> u32 {
        minify(self.desc.width, level)
    }

    pub fn height(&self, level: u32) -> u32 {
        minify(self.desc.height, level)
    }

    pub fn depth(&self, level: u32) -> u32 {
        minify(self.desc.depth, level)
    }

    /// Texel without border handling. Coordinates outside the level read
    /// as zero.
    #[inline]
    pub fn texel(&self, level: u32, x: i32, y: i32, z: i32) -> [f32; 4] {
        self.index(level, x, y, z)
            .and_then(|(l, i)| self.levels[l].texels.get(i).copied())
            .unwrap_or([0.0; 4])
    }

    pub fn set_texel(&mut self, level: u32, x: i32, y: i32, z: i32, rgba: [f32; 4]) {
        if let Some((l, i)) = self.index(level, x, y, z) {
            if let Some(texel) = self.levels[l].texels.get_mut(i) {
                *texel = rgba;
            }
        }
    }

    /// Fill one layer (or slice) of a level from decoded texels in row
    /// order
    pub fn write_layer(
        &mut self,
        level: u32,
        z: u32,
        texels: &[[f32; 4]],
    ) -> Result<(), SamplerError> {
        let mip = self
            .levels
            .get_mut(level as usize)
            .ok_or_else(|| SamplerError::InvalidTexture(format!("no level {level}")))?;
        if z >= mip.depth {
            return Err(SamplerError::InvalidTexture(format!(
                "layer {z} out of range at level {level}"
            )));
        }
        let layer_len = (mip.width * mip.height) as usize;
        if texels.len() != layer_len {
            return Err(SamplerError::InvalidTexture(format!(
                "expected {layer_len} texels, got {}",
                texels.len()
            )));
        }
        let start = z as usize * layer_len;
        mip.texels[start..start + layer_len].copy_from_slice(texels);
        Ok(())
    }

    /// Fill one layer of a level from packed texel bytes of the texture's
    /// format
    pub fn write_layer_bytes(
        &mut self,
        level: u32,
        z: u32,
        bytes: &[u8],
    ) -> Result<(), SamplerError> {
        let format = self.desc.format;
        let block = format.block_size() as usize;
        if bytes.len() % block != 0 {
            return Err(SamplerError::InvalidTexture(format!(
                "{} bytes is not a multiple of the {block}-byte texel",
                bytes.len()
            )));
        }
        let texels: Vec<[f32; 4]> = bytes.chunks_exact(block).map(|b| format.decode(b)).collect();
        self.write_layer(level, z, &texels)
    }

    fn index(&self, level: u32, x: i32, y: i32, z: i32) -> Option<(usize, usize)> {
        let mip = self.levels.get(level as usize)?;
        if x < 0 || y < 0 || z < 0 {
            return None;
        }
        let (x, y, z) = (x as u32, y as u32, z as u32);
        if x >= mip.width || y >= mip.height || z >= mip.depth {
            return None;
        }
        Some((
            level as usize,
            ((z * mip.height + y) * mip.width + x) as usize,
        ))
    }
}
