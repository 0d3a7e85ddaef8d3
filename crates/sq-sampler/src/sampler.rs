//! Software sampler bound to one shader stage
//!
//! Holds the sampler view and sampler state tables of a stage and
//! implements the execution machine's [`Sampler`] contract on top of them.

use std::sync::Arc;

use parking_lot::RwLock;
use sq_core::{SamplerConfig, SamplerError};
use sq_exec::{
    Derivatives, QuadRgba, SampleCoords, Sampler, SamplerControl, ShaderType, QUAD_SIZE,
};
use tracing::{debug, trace, warn};

use crate::compare::{prepare_compare_values, sample_compare};
use crate::cube::convert_cube;
use crate::filter::SampleContext;
use crate::lod::{
    compute_lambda_lod, compute_lambda_lod_unclamped, gather_component, LambdaKind, LodInputs,
};
use crate::mip::{get_filters, FilterInputs};
use crate::state::{CompiledSampler, SamplerState};
use crate::swizzle::{border_color, do_swizzling};
use crate::texture::ResourceTarget;
use crate::view::{PreparedView, SamplerView};

pub const MAX_SAMPLER_VIEWS: usize = 128;
pub const MAX_SAMPLERS: usize = 32;

/// Integer clamp that tolerates `lo > hi`
#[inline]
fn clampi(x: i32, lo: i32, hi: i32) -> i32 {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

pub struct SoftSampler {
    stage: ShaderType,
    config: SamplerConfig,
    views: RwLock<Vec<Option<Arc<PreparedView>>>>,
    samplers: RwLock<Vec<Option<Arc<CompiledSampler>>>>,
}

impl SoftSampler {
    pub fn new(stage: ShaderType, config: SamplerConfig) -> Self {
        Self {
            stage,
            config,
            views: RwLock::new(vec![None; MAX_SAMPLER_VIEWS]),
            samplers: RwLock::new(vec![None; MAX_SAMPLERS]),
        }
    }

    pub fn stage(&self) -> ShaderType {
        self.stage
    }

    /// Bind or unbind the sampler view of `unit`
    pub fn set_sampler_view(
        &self,
        unit: u32,
        view: Option<SamplerView>,
    ) -> Result<(), SamplerError> {
        if unit as usize >= MAX_SAMPLER_VIEWS {
            return Err(SamplerError::UnitOutOfRange(unit));
        }
        let prepared = view.map(PreparedView::new).transpose()?.map(Arc::new);
        if let Some(view) = &prepared {
            debug!(
                unit,
                target = ?view.target(),
                format = ?view.format(),
                levels = ?(view.view.first_level..=view.view.last_level),
                "bound sampler view"
            );
        }
        self.views.write()[unit as usize] = prepared;
        Ok(())
    }

    /// Bind or unbind the sampler state of `unit`
    pub fn bind_sampler_state(
        &self,
        unit: u32,
        state: Option<SamplerState>,
    ) -> Result<(), SamplerError> {
        if unit as usize >= MAX_SAMPLERS {
            return Err(SamplerError::UnitOutOfRange(unit));
        }
        let compiled = state.map(|s| Arc::new(CompiledSampler::compile(&s, &self.config)));
        self.samplers.write()[unit as usize] = compiled;
        Ok(())
    }

    fn view(&self, unit: u32) -> Option<Arc<PreparedView>> {
        self.views.read().get(unit as usize).cloned().flatten()
    }

    fn sampler(&self, unit: u32) -> Option<Arc<CompiledSampler>> {
        self.samplers.read().get(unit as usize).cloned().flatten()
    }

    /// Sample a quad through an already resolved view and sampler
    pub fn sample_quad(
        &self,
        view: &PreparedView,
        samp: &CompiledSampler,
        coords: &SampleCoords,
        derivs: Option<&Derivatives>,
        offsets: [i32; 3],
        control: SamplerControl,
    ) -> QuadRgba {
        let state = &samp.base;
        let format = view.format();
        let border = border_color(state.border_color, format);

        let compare_values = state
            .compare_mode
            .then(|| prepare_compare_values(view.target(), &coords.p, &coords.c0, &coords.lod));
        let gather_comp = gather_component(&coords.lod);

        let lambda = LambdaKind::for_stage(view.target(), self.stage);
        let lod_inputs = LodInputs {
            s: &coords.s,
            t: &coords.t,
            p: &coords.p,
            derivs,
            lod_in: &coords.lod,
        };
        let lod = compute_lambda_lod(view, state, lambda, &lod_inputs, control);

        let (s, t, p, faces) = if view.need_cube_convert {
            let cube = convert_cube(&coords.s, &coords.t, &coords.p, &coords.c0);
            (cube.s, cube.t, cube.p, cube.faces)
        } else {
            (coords.s, coords.t, coords.p, [0; QUAD_SIZE])
        };

        let filters = get_filters(view, samp, control);
        trace!(?filters, ?lod, ?control, "sample quad");
        let ctx = SampleContext { view, samp, border };
        let inputs = FilterInputs {
            s: &s,
            t: &t,
            p: &p,
            faces: &faces,
            lod: &lod,
            offset: offsets,
            control,
            gather_comp,
        };
        let mut rgba = filters.mip.filter(&ctx, filters.min, filters.mag, &inputs);

        if let Some(pc) = compare_values {
            sample_compare(format, state.compare_func, &pc, control, &mut rgba);
        }
        if view.need_swizzle && control != SamplerControl::Gather {
            rgba = do_swizzling(&view.view.swizzle, view.oneval, &rgba);
        }
        rgba
    }
}

impl Default for SoftSampler {
    fn default() -> Self {
        Self::new(ShaderType::Fragment, SamplerConfig::default())
    }
}

impl std::fmt::Debug for SoftSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let views = self.views.read().iter().filter(|v| v.is_some()).count();
        let samplers = self.samplers.read().iter().filter(|s| s.is_some()).count();
        f.debug_struct("SoftSampler")
            .field("stage", &self.stage)
            .field("views", &views)
            .field("samplers", &samplers)
            .finish()
    }
}

impl Sampler for SoftSampler {
    fn get_samples(
        &self,
        view: u32,
        sampler: u32,
        coords: &SampleCoords,
        derivs: Option<&Derivatives>,
        offsets: [i32; 3],
        control: SamplerControl,
    ) -> QuadRgba {
        match (self.view(view), self.sampler(sampler)) {
            (Some(v), Some(s)) => self.sample_quad(&v, &s, coords, derivs, offsets, control),
            _ => {
                trace!(view, sampler, "sample from unbound unit");
                QuadRgba::default()
            }
        }
    }

    fn get_dims(&self, view: u32, level: i32) -> [i32; 4] {
        let Some(prepared) = self.view(view) else {
            return [0; 4];
        };
        let v = &prepared.view;
        let tex = prepared.texture();

        if v.target == ResourceTarget::Buffer {
            return [(v.buffer_size / prepared.format().block_size()) as i32, 0, 0, 0];
        }

        let level = level.saturating_add(v.first_level as i32);
        if level < 0 || level > v.last_level as i32 {
            return [0; 4];
        }
        let level = level as u32;
        let layers = (v.last_layer - v.first_layer + 1) as i32;

        let mut dims = [0; 4];
        dims[3] = (v.last_level - v.first_level + 1) as i32;
        dims[0] = tex.width(level) as i32;
        match v.target {
            ResourceTarget::Buffer | ResourceTarget::Tex1D => {}
            ResourceTarget::Tex1DArray => dims[1] = layers,
            ResourceTarget::Tex2D | ResourceTarget::Rect | ResourceTarget::Cube => {
                dims[1] = tex.height(level) as i32;
            }
            ResourceTarget::Tex2DArray => {
                dims[1] = tex.height(level) as i32;
                dims[2] = layers;
            }
            ResourceTarget::Tex3D => {
                dims[1] = tex.height(level) as i32;
                dims[2] = tex.depth(level) as i32;
            }
            ResourceTarget::CubeArray => {
                dims[1] = tex.height(level) as i32;
                dims[2] = layers / 6;
            }
        }
        dims
    }

    fn get_texel(
        &self,
        view: u32,
        i: [i32; QUAD_SIZE],
        j: [i32; QUAD_SIZE],
        k: [i32; QUAD_SIZE],
        lod: [i32; QUAD_SIZE],
        offsets: [i32; 3],
    ) -> QuadRgba {
        let mut rgba = QuadRgba::default();
        let Some(prepared) = self.view(view) else {
            return rgba;
        };
        let v = &prepared.view;
        let tex = prepared.texture();

        let (first, last) = (v.first_level as i32, v.last_level as i32);
        let level = if v.target == ResourceTarget::Buffer {
            0
        } else {
            clampi(lod[0].saturating_add(first), first, last) as u32
        };
        let width = tex.width(level) as i32;
        let height = tex.height(level) as i32;
        let depth = tex.depth(level) as i32;
        let (first_layer, last_layer) = (v.first_layer as i32, v.last_layer as i32);

        for lane in 0..QUAD_SIZE {
            let x = i[lane].saturating_add(offsets[0]);
            let y = j[lane].saturating_add(offsets[1]);
            let texel = match v.target {
                ResourceTarget::Buffer => {
                    let elem = prepared.format().block_size();
                    let first_elem = (v.buffer_offset / elem) as i32;
                    let last_elem = ((v.buffer_offset + v.buffer_size) / elem) as i32 - 1;
                    let x = clampi(x.saturating_add(first_elem), first_elem, last_elem);
                    tex.texel(0, x, 0, 0)
                }
                ResourceTarget::Tex1D => tex.texel(level, clampi(x, 0, width - 1), 0, first_layer),
                ResourceTarget::Tex1DArray => {
                    let layer = clampi(j[lane], first_layer, last_layer);
                    tex.texel(level, clampi(x, 0, width - 1), 0, layer)
                }
                ResourceTarget::Tex2D | ResourceTarget::Rect => tex.texel(
                    level,
                    clampi(x, 0, width - 1),
                    clampi(y, 0, height - 1),
                    first_layer,
                ),
                ResourceTarget::Tex2DArray => tex.texel(
                    level,
                    clampi(x, 0, width - 1),
                    clampi(y, 0, height - 1),
                    clampi(k[lane], first_layer, last_layer),
                ),
                ResourceTarget::Tex3D => tex.texel(
                    level,
                    clampi(x, 0, width - 1),
                    clampi(y, 0, height - 1),
                    clampi(k[lane].saturating_add(offsets[2]), 0, depth - 1),
                ),
                ResourceTarget::Cube | ResourceTarget::CubeArray => {
                    warn!(view, target = ?v.target, "texel fetch from cube view");
                    return rgba;
                }
            };
            for (chan, value) in texel.into_iter().enumerate() {
                rgba[chan][lane] = value;
            }
        }

        if prepared.need_swizzle {
            rgba = do_swizzling(&v.swizzle, prepared.oneval, &rgba);
        }
        rgba
    }

    fn query_lod(
        &self,
        view: u32,
        sampler: u32,
        coords: &SampleCoords,
        control: SamplerControl,
    ) -> ([f32; QUAD_SIZE], [f32; QUAD_SIZE]) {
        let (Some(prepared), Some(samp)) = (self.view(view), self.sampler(sampler)) else {
            return ([0.0; QUAD_SIZE], [0.0; QUAD_SIZE]);
        };
        let zero_grad: Derivatives = Default::default();
        let inputs = LodInputs {
            s: &coords.s,
            t: &coords.t,
            p: &coords.p,
            derivs: Some(&zero_grad),
            lod_in: &[0.0; QUAD_SIZE],
        };
        let lambda = LambdaKind::for_stage(prepared.target(), self.stage);
        let lod = compute_lambda_lod_unclamped(&prepared, &samp.base, lambda, &inputs, control);
        let filters = get_filters(&prepared, &samp, control);
        let mipmap = filters.mip.relative_level(&prepared, &samp.base, &lod);
        (mipmap, lod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{FilterMode, MipFilterMode};
    use crate::swizzle::Swizzle;
    use crate::texture::{SoftTexture, TexelFormat, TextureDesc};

    fn ramp(target: ResourceTarget, w: u32, h: u32, levels: u32) -> Arc<SoftTexture> {
        let desc = TextureDesc::new(target, TexelFormat::Rgba32Float, w, h).with_levels(levels);
        let mut tex = SoftTexture::new(desc).unwrap();
        for level in 0..levels {
            for y in 0..tex.height(level) as i32 {
                for x in 0..tex.width(level) as i32 {
                    tex.set_texel(level, x, y, 0, [x as f32, y as f32, level as f32, 1.0]);
                }
            }
        }
        Arc::new(tex)
    }

    fn coords(s: f32, t: f32) -> SampleCoords {
        SampleCoords {
            s: [s; 4],
            t: [t; 4],
            ..SampleCoords::default()
        }
    }

    #[test]
    fn test_unit_range_checked() {
        let sampler = SoftSampler::default();
        assert_eq!(
            sampler.bind_sampler_state(MAX_SAMPLERS as u32, Some(SamplerState::new())),
            Err(SamplerError::UnitOutOfRange(MAX_SAMPLERS as u32))
        );
        let view = SamplerView::new(ramp(ResourceTarget::Tex2D, 4, 4, 1));
        assert!(sampler.set_sampler_view(MAX_SAMPLER_VIEWS as u32, Some(view)).is_err());
    }

    #[test]
    fn test_unbound_units_sample_zero() {
        let sampler = SoftSampler::default();
        let rgba = sampler.get_samples(0, 0, &coords(0.5, 0.5), None, [0; 3], Default::default());
        assert_eq!(rgba, QuadRgba::default());
        assert_eq!(sampler.get_dims(3, 0), [0; 4]);

        // A view without a sampler state is still unusable for filtering
        let view = SamplerView::new(ramp(ResourceTarget::Tex2D, 4, 4, 1));
        sampler.set_sampler_view(0, Some(view)).unwrap();
        let rgba = sampler.get_samples(0, 0, &coords(0.5, 0.5), None, [0; 3], Default::default());
        assert_eq!(rgba, QuadRgba::default());
    }

    #[test]
    fn test_nearest_sample_with_offset() {
        let sampler = SoftSampler::default();
        let view = SamplerView::new(ramp(ResourceTarget::Tex2D, 4, 4, 1));
        sampler.set_sampler_view(0, Some(view)).unwrap();
        sampler.bind_sampler_state(0, Some(SamplerState::new())).unwrap();

        let c = coords(0.3, 0.6);
        let rgba = sampler.get_samples(0, 0, &c, None, [0; 3], SamplerControl::Zero);
        assert_eq!((rgba[0][0], rgba[1][0]), (1.0, 2.0));
        let rgba = sampler.get_samples(0, 0, &c, None, [1, -1, 0], SamplerControl::Zero);
        assert_eq!((rgba[0][0], rgba[1][0]), (2.0, 1.0));
    }

    #[test]
    fn test_swizzle_applied_after_filtering() {
        let sampler = SoftSampler::default();
        let view = SamplerView::new(ramp(ResourceTarget::Tex2D, 4, 4, 1)).with_swizzle([
            Swizzle::G,
            Swizzle::R,
            Swizzle::Zero,
            Swizzle::One,
        ]);
        sampler.set_sampler_view(0, Some(view)).unwrap();
        sampler.bind_sampler_state(0, Some(SamplerState::new())).unwrap();
        let rgba = sampler.get_samples(0, 0, &coords(0.3, 0.6), None, [0; 3], Default::default());
        assert_eq!([rgba[0][1], rgba[1][1], rgba[2][1], rgba[3][1]], [2.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_dims_per_target() {
        let sampler = SoftSampler::default();
        let tex = ramp(ResourceTarget::Tex2D, 16, 8, 4);
        let view = SamplerView::new(tex).with_levels(1, 3);
        sampler.set_sampler_view(0, Some(view)).unwrap();
        assert_eq!(sampler.get_dims(0, 0), [8, 4, 0, 3]);
        assert_eq!(sampler.get_dims(0, 2), [2, 1, 0, 3]);
        assert_eq!(sampler.get_dims(0, 3), [0; 4]);
        assert_eq!(sampler.get_dims(0, -2), [0; 4]);

        let desc = TextureDesc::new(ResourceTarget::CubeArray, TexelFormat::Rgba8Unorm, 4, 4)
            .with_array_size(12);
        let cube = Arc::new(SoftTexture::new(desc).unwrap());
        sampler.set_sampler_view(1, Some(SamplerView::new(cube))).unwrap();
        assert_eq!(sampler.get_dims(1, 0), [4, 4, 2, 1]);
    }

    #[test]
    fn test_texel_fetch_clamps() {
        let sampler = SoftSampler::default();
        let view = SamplerView::new(ramp(ResourceTarget::Tex2D, 8, 8, 4)).with_levels(1, 2);
        sampler.set_sampler_view(0, Some(view)).unwrap();

        let rgba = sampler.get_texel(0, [1, 9, -3, 2], [2, 0, 0, 9], [0; 4], [0; 4], [0; 3]);
        assert_eq!(rgba[0], [1.0, 3.0, 0.0, 2.0]);
        assert_eq!(rgba[1], [2.0, 0.0, 0.0, 3.0]);
        assert_eq!(rgba[2], [1.0; 4]);

        // LOD is relative to the first level and clamped to the last
        let rgba = sampler.get_texel(0, [0; 4], [0; 4], [0; 4], [5; 4], [0; 3]);
        assert_eq!(rgba[2], [2.0; 4]);
    }

    #[test]
    fn test_query_lod() {
        let sampler = SoftSampler::default();
        let view = SamplerView::new(ramp(ResourceTarget::Tex2D, 64, 64, 7));
        sampler.set_sampler_view(0, Some(view)).unwrap();
        let state = SamplerState::new()
            .with_filter(FilterMode::Linear, FilterMode::Linear, MipFilterMode::Nearest)
            .with_lod_range(0.0, 2.0);
        sampler.bind_sampler_state(0, Some(state)).unwrap();

        // 8 texels per pixel: lambda 3, clamped to 2 for the level
        let step = 8.0 / 64.0;
        let c = SampleCoords {
            s: [0.0, step, 0.0, step],
            t: [step, step, 0.0, 0.0],
            ..SampleCoords::default()
        };
        let (mipmap, lod) = sampler.query_lod(0, 0, &c, SamplerControl::None);
        assert_eq!(lod, [3.0; 4]);
        assert_eq!(mipmap, [2.0; 4]);
    }
}
