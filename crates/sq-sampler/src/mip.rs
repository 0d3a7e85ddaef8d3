//! Mipmap level selection
//!
//! A [`MipStrategy`] turns per-lane LODs into one or two image filter
//! invocations per lane and blends between levels where the sampler asks
//! for it.

use sq_exec::{QuadRgba, SamplerControl, QUAD_SIZE};

use crate::ewa;
use crate::filter::{FilterArgs, ImageFilter, SampleContext};
use crate::lod::clamp_lod;
use crate::state::{CompiledSampler, FilterMode, SamplerState};
use crate::view::PreparedView;
use crate::wrap::{frac, lerp};

/// Coordinates and LODs shared by every strategy
#[derive(Debug, Clone, Copy)]
pub struct FilterInputs<'a> {
    pub s: &'a [f32; 4],
    pub t: &'a [f32; 4],
    pub p: &'a [f32; 4],
    pub faces: &'a [usize; 4],
    pub lod: &'a [f32; 4],
    pub offset: [i32; 3],
    pub control: SamplerControl,
    pub gather_comp: usize,
}

impl FilterInputs<'_> {
    #[inline]
    pub fn gather(&self) -> bool {
        self.control == SamplerControl::Gather
    }

    /// Image filter arguments of `lane` at `level`
    pub fn args(&self, lane: usize, level: u32) -> FilterArgs {
        FilterArgs {
            s: self.s[lane],
            t: self.t[lane],
            p: self.p[lane],
            level,
            face: self.faces[lane],
            offset: self.offset,
            gather: self.gather().then_some(self.gather_comp),
        }
    }
}

#[inline]
pub(crate) fn store(rgba: &mut QuadRgba, lane: usize, texel: [f32; 4]) {
    for (chan, value) in texel.into_iter().enumerate() {
        rgba[chan][lane] = value;
    }
}

fn blend(weight: f32, a: [f32; 4], b: [f32; 4]) -> [f32; 4] {
    std::array::from_fn(|c| lerp(weight, a[c], b[c]))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MipStrategy {
    /// Base level only, magnification or minification by LOD sign
    None,
    /// Base level only with min and mag filters equal
    NoneNoFilterSelect,
    Nearest,
    Linear,
    /// Elliptical weighted average over the base level footprint
    LinearAniso,
    /// Linear mip blend of power-of-two repeat textures
    Linear2DLinearRepeatPot,
}

impl MipStrategy {
    pub fn filter(
        self,
        ctx: &SampleContext<'_>,
        min: ImageFilter,
        mag: ImageFilter,
        inputs: &FilterInputs<'_>,
    ) -> QuadRgba {
        let mut rgba = [[0.0; QUAD_SIZE]; 4];
        let first = ctx.view.view.first_level;
        let last = ctx.view.view.last_level;
        let gather = inputs.gather();

        match self {
            Self::None => {
                for j in 0..QUAD_SIZE {
                    let filter = if inputs.lod[j] <= 0.0 && !gather { mag } else { min };
                    store(&mut rgba, j, filter.sample(ctx, &inputs.args(j, first)));
                }
            }
            Self::NoneNoFilterSelect => {
                for j in 0..QUAD_SIZE {
                    store(&mut rgba, j, mag.sample(ctx, &inputs.args(j, first)));
                }
            }
            Self::Nearest => {
                for j in 0..QUAD_SIZE {
                    let lod = inputs.lod[j];
                    let texel = if lod <= 0.0 && !gather {
                        mag.sample(ctx, &inputs.args(j, first))
                    } else {
                        let level = (first as i32)
                            .saturating_add((lod + 0.5) as i32)
                            .clamp(first as i32, last as i32);
                        min.sample(ctx, &inputs.args(j, level as u32))
                    };
                    store(&mut rgba, j, texel);
                }
            }
            Self::Linear => {
                for j in 0..QUAD_SIZE {
                    let lod = inputs.lod[j];
                    let level0 = (first as i32).saturating_add(lod as i32);
                    let texel = if lod <= 0.0 && !gather {
                        mag.sample(ctx, &inputs.args(j, first))
                    } else if level0 >= last as i32 {
                        min.sample(ctx, &inputs.args(j, last))
                    } else {
                        let level0 = level0 as u32;
                        let c0 = min.sample(ctx, &inputs.args(j, level0));
                        let c1 = min.sample(ctx, &inputs.args(j, level0 + 1));
                        blend(frac(lod), c0, c1)
                    };
                    store(&mut rgba, j, texel);
                }
            }
            Self::LinearAniso => {
                return ewa::filter_linear_aniso(ctx, min, inputs);
            }
            Self::Linear2DLinearRepeatPot => {
                let filter = ImageFilter::LinearRepeatPot;
                for j in 0..QUAD_SIZE {
                    let lod = inputs.lod[j];
                    let level0 = (first as i32).saturating_add(lod as i32);
                    let texel = if level0 < 0 || level0 as u32 >= last {
                        let level = if level0 < 0 { first } else { last };
                        filter.sample(ctx, &inputs.args(j, level))
                    } else {
                        let level0 = level0 as u32;
                        let c0 = filter.sample(ctx, &inputs.args(j, level0));
                        let c1 = filter.sample(ctx, &inputs.args(j, level0 + 1));
                        blend(frac(lod), c0, c1)
                    };
                    store(&mut rgba, j, texel);
                }
            }
        }
        rgba
    }

    /// Mip level each lane would sample, relative to the view's first level
    pub fn relative_level(
        self,
        view: &PreparedView,
        state: &SamplerState,
        lod: &[f32; 4],
    ) -> [f32; 4] {
        match self {
            Self::None | Self::NoneNoFilterSelect => [0.0; 4],
            Self::Nearest => clamp_lod(view, state, lod).map(|l| ((l + 0.5) as i32) as f32),
            Self::Linear | Self::LinearAniso | Self::Linear2DLinearRepeatPot => {
                clamp_lod(view, state, lod)
            }
        }
    }
}

/// Mip strategy with its minification and magnification filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Filters {
    pub mip: MipStrategy,
    pub min: ImageFilter,
    pub mag: ImageFilter,
}

/// Pick the filters for one sample call
pub fn get_filters(
    view: &PreparedView,
    samp: &CompiledSampler,
    control: SamplerControl,
) -> Filters {
    if control == SamplerControl::Gather {
        let gather = ImageFilter::select(view, samp, FilterMode::Linear, true);
        return Filters {
            mip: MipStrategy::Nearest,
            min: gather,
            mag: gather,
        };
    }
    if view.pot2d && samp.min_mag_equal_repeat_linear {
        return Filters {
            mip: MipStrategy::Linear2DLinearRepeatPot,
            min: ImageFilter::LinearRepeatPot,
            mag: ImageFilter::LinearRepeatPot,
        };
    }

    let min = ImageFilter::select(view, samp, samp.min_img_filter, false);
    let mag = if samp.min_mag_equal {
        min
    } else {
        ImageFilter::select(view, samp, samp.base.mag_img_filter, false)
    };
    Filters {
        mip: samp.mip,
        min,
        mag,
    }
}
