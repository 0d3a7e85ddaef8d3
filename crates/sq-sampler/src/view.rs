//! Sampler views

use std::sync::Arc;

use sq_core::SamplerError;

use crate::swizzle::{Swizzle, SWIZZLE_RGBA};
use crate::texture::{ResourceTarget, SoftTexture, TexelFormat};

/// A window onto a texture: target, level and layer range, and component
/// swizzle
#[derive(Debug, Clone)]
pub struct SamplerView {
    pub texture: Arc<SoftTexture>,
    pub target: ResourceTarget,
    pub first_level: u32,
    pub last_level: u32,
    pub first_layer: u32,
    pub last_layer: u32,
    pub swizzle: [Swizzle; 4],
    /// Byte range of buffer views
    pub buffer_offset: u32,
    pub buffer_size: u32,
}

impl SamplerView {
    /// View covering the whole texture with its own target
    pub fn new(texture: Arc<SoftTexture>) -> Self {
        let desc = *texture.desc();
        Self {
            target: desc.target,
            first_level: 0,
            last_level: desc.levels - 1,
            first_layer: 0,
            last_layer: desc.array_size - 1,
            swizzle: SWIZZLE_RGBA,
            buffer_offset: 0,
            buffer_size: desc.width * desc.format.block_size(),
            texture,
        }
    }

    pub fn with_target(mut self, target: ResourceTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_levels(mut self, first: u32, last: u32) -> Self {
        self.first_level = first;
        self.last_level = last;
        self
    }

    pub fn with_layers(mut self, first: u32, last: u32) -> Self {
        self.first_layer = first;
        self.last_layer = last;
        self
    }

    pub fn with_swizzle(mut self, swizzle: [Swizzle; 4]) -> Self {
        self.swizzle = swizzle;
        self
    }

    pub fn with_buffer_range(mut self, offset: u32, size: u32) -> Self {
        self.buffer_offset = offset;
        self.buffer_size = size;
        self
    }
}

/// Sampler view with the per-view facts the filters need precomputed
#[derive(Debug, Clone)]
pub struct PreparedView {
    pub view: SamplerView,
    pub need_swizzle: bool,
    pub need_cube_convert: bool,
    /// Power-of-two 2D or rect texture
    pub pot2d: bool,
    /// log2 of the base width and height
    pub xpot: u32,
    pub ypot: u32,
    /// Value of a constant-one channel
    pub oneval: f32,
}

impl PreparedView {
    pub fn new(view: SamplerView) -> Result<Self, SamplerError> {
        let tex = &view.texture;
        let desc = tex.desc();
        if view.first_level > view.last_level || view.last_level >= tex.num_levels() {
            return Err(SamplerError::InvalidTexture(format!(
                "level range {}..={} outside {} levels",
                view.first_level,
                view.last_level,
                tex.num_levels()
            )));
        }
        let layers = if desc.target == ResourceTarget::Tex3D {
            1
        } else {
            desc.array_size
        };
        if view.target != ResourceTarget::Buffer
            && (view.first_layer > view.last_layer || view.last_layer >= layers)
        {
            return Err(SamplerError::InvalidTexture(format!(
                "layer range {}..={} outside {} layers",
                view.first_layer, view.last_layer, layers
            )));
        }
        if view.target.is_cube()
            && ((!desc.target.is_cube() && desc.target != ResourceTarget::Tex2DArray)
                || view.last_layer - view.first_layer < 5)
        {
            return Err(SamplerError::InvalidTexture(format!(
                "cube view of {} {:?} layers",
                view.last_layer - view.first_layer + 1,
                desc.target
            )));
        }

        Ok(Self {
            need_swizzle: view.swizzle != SWIZZLE_RGBA,
            need_cube_convert: view.target.is_cube(),
            pot2d: tex.is_pot()
                && matches!(view.target, ResourceTarget::Tex2D | ResourceTarget::Rect),
            xpot: desc.width.ilog2(),
            ypot: desc.height.ilog2(),
            oneval: desc.format.one(),
            view,
        })
    }

    #[inline]
    pub fn texture(&self) -> &SoftTexture {
        &self.view.texture
    }

    pub fn target(&self) -> ResourceTarget {
        self.view.target
    }

    pub fn format(&self) -> TexelFormat {
        self.view.texture.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::TextureDesc;

    fn texture(target: ResourceTarget, w: u32, h: u32, levels: u32) -> Arc<SoftTexture> {
        let desc = TextureDesc::new(target, TexelFormat::Rgba8Unorm, w, h).with_levels(levels);
        Arc::new(SoftTexture::new(desc).unwrap())
    }

    #[test]
    fn test_prepare_flags() {
        let view = SamplerView::new(texture(ResourceTarget::Tex2D, 8, 4, 3));
        let prepared = PreparedView::new(view).unwrap();
        assert!(prepared.pot2d);
        assert!(!prepared.need_swizzle);
        assert_eq!((prepared.xpot, prepared.ypot), (3, 2));
        assert_eq!(prepared.oneval, 1.0);

        let view = SamplerView::new(texture(ResourceTarget::Tex2D, 6, 4, 1))
            .with_swizzle([Swizzle::A, Swizzle::G, Swizzle::B, Swizzle::One]);
        let prepared = PreparedView::new(view).unwrap();
        assert!(!prepared.pot2d);
        assert!(prepared.need_swizzle);
    }

    #[test]
    fn test_prepare_rejects_ranges() {
        let view = SamplerView::new(texture(ResourceTarget::Tex2D, 8, 8, 2)).with_levels(0, 2);
        assert!(PreparedView::new(view).is_err());

        let view = SamplerView::new(texture(ResourceTarget::Tex2D, 8, 8, 1)).with_layers(0, 1);
        assert!(PreparedView::new(view).is_err());

        let view = SamplerView::new(texture(ResourceTarget::Tex2D, 8, 8, 1))
            .with_target(ResourceTarget::Cube);
        assert!(PreparedView::new(view).is_err());
    }
}
