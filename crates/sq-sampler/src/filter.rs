//! Image filters
//!
//! One filter samples a single mip level of a view at one lane's
//! coordinates. Which variant runs is decided once per sample call from
//! the view target and the compiled sampler state.

use crate::cube::seamless_texel;
use crate::state::{CompiledSampler, FilterMode};
use crate::swizzle::gather_value;
use crate::texture::{ResourceTarget, SoftTexture};
use crate::view::PreparedView;
use crate::wrap::{
    coord_to_layer, ifloor, lerp, lerp_2d, lerp_3d, linear_clamp_to_border,
    nearest_clamp_to_edge, WrapMode,
};

/// Per-lane filter arguments
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterArgs {
    pub s: f32,
    pub t: f32,
    pub p: f32,
    pub level: u32,
    pub face: usize,
    pub offset: [i32; 3],
    /// Component to gather, when gathering
    pub gather: Option<usize>,
}

/// Everything a filter reads besides its arguments
#[derive(Debug, Clone, Copy)]
pub struct SampleContext<'a> {
    pub view: &'a PreparedView,
    pub samp: &'a CompiledSampler,
    /// Border color, already clamped for the view format
    pub border: [f32; 4],
}

impl SampleContext<'_> {
    #[inline]
    fn tex(&self) -> &SoftTexture {
        self.view.texture()
    }

    #[inline]
    fn first_layer(&self) -> i32 {
        self.view.view.first_layer as i32
    }

    fn in_plane(&self, level: u32, x: i32, y: i32) -> bool {
        let tex = self.tex();
        x >= 0 && x < tex.width(level) as i32 && y >= 0 && y < tex.height(level) as i32
    }

    /// 2D texel at the first layer; outside the level gives the border
    fn texel_2d(&self, level: u32, x: i32, y: i32) -> [f32; 4] {
        if self.in_plane(level, x, y) {
            self.tex().texel(level, x, y, self.first_layer())
        } else {
            self.border
        }
    }

    /// Texel of one layer of a 2D array or cube
    fn texel_layer(&self, level: u32, x: i32, y: i32, layer: i32) -> [f32; 4] {
        if self.in_plane(level, x, y) {
            self.tex().texel(level, x, y, layer)
        } else {
            self.border
        }
    }

    /// 1D array texel; only x is bounds checked
    fn texel_1d_array(&self, level: u32, x: i32, layer: i32) -> [f32; 4] {
        if x >= 0 && x < self.tex().width(level) as i32 {
            self.tex().texel(level, x, 0, layer)
        } else {
            self.border
        }
    }

    fn texel_3d(&self, level: u32, x: i32, y: i32, z: i32) -> [f32; 4] {
        let tex = self.tex();
        if self.in_plane(level, x, y) && z >= 0 && z < tex.depth(level) as i32 {
            tex.texel(level, x, y, z)
        } else {
            self.border
        }
    }

    fn layer_of(&self, coord: f32) -> i32 {
        coord_to_layer(coord, self.view.view.first_layer, self.view.view.last_layer)
    }

    /// First layer of the cube addressed by a cube array coordinate
    fn cube_array_layer(&self, p: f32) -> i32 {
        let first = self.first_layer();
        let last = self.view.view.last_layer as i32;
        (6 * ifloor(p + 0.5) + first).clamp(first, last - 5)
    }

    /// Blend or gather four texels ordered (x0,y0) (x1,y0) (x0,y1) (x1,y1)
    fn resolve_quad(
        &self,
        tx: &[[f32; 4]; 4],
        xw: f32,
        yw: f32,
        gather: Option<usize>,
    ) -> [f32; 4] {
        match gather {
            Some(comp) => std::array::from_fn(|c| {
                gather_value(&self.view.view.swizzle, self.view.oneval, c, comp, tx)
            }),
            None => std::array::from_fn(|c| {
                lerp_2d(xw, yw, tx[0][c], tx[1][c], tx[2][c], tx[3][c])
            }),
        }
    }
}

/// Size of a power-of-two dimension at `level`
#[inline]
pub fn pot_level_size(base_pot: u32, level: u32) -> i32 {
    if base_pot >= level {
        1 << (base_pot - level)
    } else {
        1
    }
}

/// Image filter variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFilter {
    Nearest1D,
    Linear1D,
    Nearest1DArray,
    Linear1DArray,
    Nearest2D,
    Linear2D,
    Nearest2DArray,
    Linear2DArray,
    NearestCube,
    LinearCube,
    NearestCubeArray,
    LinearCubeArray,
    Nearest3D,
    Linear3D,
    /// Power-of-two repeat fast paths
    NearestRepeatPot,
    LinearRepeatPot,
    NearestClampPot,
}

impl ImageFilter {
    pub fn select(
        view: &PreparedView,
        samp: &CompiledSampler,
        filter: FilterMode,
        gather: bool,
    ) -> Self {
        let nearest = filter == FilterMode::Nearest;
        let pick = |n: Self, l: Self| if nearest { n } else { l };
        let base = &samp.base;

        match view.target() {
            ResourceTarget::Buffer | ResourceTarget::Tex1D => {
                pick(Self::Nearest1D, Self::Linear1D)
            }
            ResourceTarget::Tex1DArray => pick(Self::Nearest1DArray, Self::Linear1DArray),
            ResourceTarget::Tex2D | ResourceTarget::Rect => {
                if !gather
                    && view.pot2d
                    && base.wrap_s == base.wrap_t
                    && !base.unnormalized_coords
                {
                    match (base.wrap_s, filter) {
                        (WrapMode::Repeat, FilterMode::Nearest) => return Self::NearestRepeatPot,
                        (WrapMode::Repeat, FilterMode::Linear) => return Self::LinearRepeatPot,
                        (WrapMode::Clamp, FilterMode::Nearest) => return Self::NearestClampPot,
                        _ => {}
                    }
                }
                pick(Self::Nearest2D, Self::Linear2D)
            }
            ResourceTarget::Tex2DArray => pick(Self::Nearest2DArray, Self::Linear2DArray),
            ResourceTarget::Cube => pick(Self::NearestCube, Self::LinearCube),
            ResourceTarget::CubeArray => pick(Self::NearestCubeArray, Self::LinearCubeArray),
            ResourceTarget::Tex3D => pick(Self::Nearest3D, Self::Linear3D),
        }
    }

    /// Sample one lane
    pub fn sample(self, ctx: &SampleContext<'_>, args: &FilterArgs) -> [f32; 4] {
        match self {
            Self::Nearest1D => nearest_1d(ctx, args, ctx.first_layer()),
            Self::Linear1D => linear_1d(ctx, args, ctx.first_layer()),
            Self::Nearest1DArray => {
                let layer = ctx.layer_of(args.t);
                nearest_1d(ctx, args, layer)
            }
            Self::Linear1DArray => {
                let layer = ctx.layer_of(args.t);
                linear_1d(ctx, args, layer)
            }
            Self::Nearest2D => {
                let (x, y) = nearest_xy(ctx, args);
                ctx.texel_2d(args.level, x, y)
            }
            Self::Linear2D => linear_2d(ctx, args, |x, y| ctx.texel_2d(args.level, x, y)),
            Self::Nearest2DArray => {
                let layer = ctx.layer_of(args.p);
                let (x, y) = nearest_xy(ctx, args);
                ctx.texel_layer(args.level, x, y, layer)
            }
            Self::Linear2DArray => {
                let layer = ctx.layer_of(args.p);
                linear_2d(ctx, args, |x, y| ctx.texel_layer(args.level, x, y, layer))
            }
            Self::NearestCube => nearest_cube(ctx, args),
            Self::LinearCube => linear_cube(ctx, args, ctx.first_layer()),
            Self::NearestCubeArray => {
                let layerface = ctx.cube_array_layer(args.p) + args.face as i32;
                let (x, y) = nearest_xy(ctx, args);
                ctx.texel_layer(args.level, x, y, layerface)
            }
            Self::LinearCubeArray => linear_cube(ctx, args, ctx.cube_array_layer(args.p)),
            Self::Nearest3D => nearest_3d(ctx, args),
            Self::Linear3D => linear_3d(ctx, args),
            Self::NearestRepeatPot => nearest_repeat_pot(ctx, args),
            Self::LinearRepeatPot => linear_repeat_pot(ctx, args),
            Self::NearestClampPot => nearest_clamp_pot(ctx, args),
        }
    }
}

fn nearest_xy(ctx: &SampleContext<'_>, args: &FilterArgs) -> (i32, i32) {
    let tex = ctx.tex();
    let wrap = &ctx.samp.nearest_wrap;
    (
        wrap[0].apply(args.s, tex.width(args.level), args.offset[0]),
        wrap[1].apply(args.t, tex.height(args.level), args.offset[1]),
    )
}

fn nearest_1d(ctx: &SampleContext<'_>, args: &FilterArgs, layer: i32) -> [f32; 4] {
    let width = ctx.tex().width(args.level);
    let x = ctx.samp.nearest_wrap[0].apply(args.s, width, args.offset[0]);
    ctx.texel_1d_array(args.level, x, layer)
}

fn linear_1d(ctx: &SampleContext<'_>, args: &FilterArgs, layer: i32) -> [f32; 4] {
    let width = ctx.tex().width(args.level);
    let (x0, x1, xw) = ctx.samp.linear_wrap[0].apply(args.s, width, args.offset[0]);
    let tx0 = ctx.texel_1d_array(args.level, x0, layer);
    let tx1 = ctx.texel_1d_array(args.level, x1, layer);
    std::array::from_fn(|c| lerp(xw, tx0[c], tx1[c]))
}

fn linear_2d(
    ctx: &SampleContext<'_>,
    args: &FilterArgs,
    fetch: impl Fn(i32, i32) -> [f32; 4],
) -> [f32; 4] {
    let tex = ctx.tex();
    let wrap = &ctx.samp.linear_wrap;
    let (x0, x1, xw) = wrap[0].apply(args.s, tex.width(args.level), args.offset[0]);
    let (y0, y1, yw) = wrap[1].apply(args.t, tex.height(args.level), args.offset[1]);
    let tx = [fetch(x0, y0), fetch(x1, y0), fetch(x0, y1), fetch(x1, y1)];
    ctx.resolve_quad(&tx, xw, yw, args.gather)
}

fn nearest_cube(ctx: &SampleContext<'_>, args: &FilterArgs) -> [f32; 4] {
    let tex = ctx.tex();
    let layerface = ctx.first_layer() + args.face as i32;
    let (x, y) = if ctx.samp.base.seamless_cube_map {
        // Nearest filtering never leaves the face
        (
            nearest_clamp_to_edge(args.s, tex.width(args.level), args.offset[0]),
            nearest_clamp_to_edge(args.t, tex.height(args.level), args.offset[1]),
        )
    } else {
        nearest_xy(ctx, args)
    };
    ctx.texel_layer(args.level, x, y, layerface)
}

fn linear_cube(ctx: &SampleContext<'_>, args: &FilterArgs, layer: i32) -> [f32; 4] {
    let tex = ctx.tex();
    let (width, height) = (tex.width(args.level), tex.height(args.level));

    if ctx.samp.base.seamless_cube_map {
        let (x0, x1, xw) = linear_clamp_to_border(args.s, width, args.offset[0]);
        let (y0, y1, yw) = linear_clamp_to_border(args.t, height, args.offset[1]);
        let fetch = |x, y| seamless_texel(tex, args.level, x, y, layer, args.face);
        let tx = [fetch(x0, y0), fetch(x1, y0), fetch(x0, y1), fetch(x1, y1)];
        ctx.resolve_quad(&tx, xw, yw, args.gather)
    } else {
        let layerface = layer + args.face as i32;
        linear_2d(ctx, args, |x, y| ctx.texel_layer(args.level, x, y, layerface))
    }
}

fn nearest_3d(ctx: &SampleContext<'_>, args: &FilterArgs) -> [f32; 4] {
    let (x, y) = nearest_xy(ctx, args);
    let depth = ctx.tex().depth(args.level);
    let z = ctx.samp.nearest_wrap[2].apply(args.p, depth, args.offset[2]);
    ctx.texel_3d(args.level, x, y, z)
}

fn linear_3d(ctx: &SampleContext<'_>, args: &FilterArgs) -> [f32; 4] {
    let tex = ctx.tex();
    let wrap = &ctx.samp.linear_wrap;
    let level = args.level;
    let (x0, x1, xw) = wrap[0].apply(args.s, tex.width(level), args.offset[0]);
    let (y0, y1, yw) = wrap[1].apply(args.t, tex.height(level), args.offset[1]);
    let (z0, z1, zw) = wrap[2].apply(args.p, tex.depth(level), args.offset[2]);

    let slice = |z| {
        [
            ctx.texel_3d(level, x0, y0, z),
            ctx.texel_3d(level, x1, y0, z),
            ctx.texel_3d(level, x0, y1, z),
            ctx.texel_3d(level, x1, y1, z),
        ]
    };
    let (near, far) = (slice(z0), slice(z1));
    std::array::from_fn(|c| {
        lerp_3d(
            xw,
            yw,
            zw,
            [near[0][c], near[1][c], near[2][c], near[3][c]],
            [far[0][c], far[1][c], far[2][c], far[3][c]],
        )
    })
}

fn linear_repeat_pot(ctx: &SampleContext<'_>, args: &FilterArgs) -> [f32; 4] {
    let xpot = pot_level_size(ctx.view.xpot, args.level);
    let ypot = pot_level_size(ctx.view.ypot, args.level);
    let u = args.s * xpot as f32 - 0.5 + args.offset[0] as f32;
    let v = args.t * ypot as f32 - 0.5 + args.offset[1] as f32;
    let (uflr, vflr) = (ifloor(u), ifloor(v));
    let (xw, yw) = (u - uflr as f32, v - vflr as f32);

    let x0 = uflr & (xpot - 1);
    let y0 = vflr & (ypot - 1);
    let x1 = (x0 + 1) & (xpot - 1);
    let y1 = (y0 + 1) & (ypot - 1);

    let tex = ctx.tex();
    let z = ctx.first_layer();
    let tx = [
        tex.texel(args.level, x0, y0, z),
        tex.texel(args.level, x1, y0, z),
        tex.texel(args.level, x0, y1, z),
        tex.texel(args.level, x1, y1, z),
    ];
    std::array::from_fn(|c| lerp_2d(xw, yw, tx[0][c], tx[1][c], tx[2][c], tx[3][c]))
}

fn nearest_repeat_pot(ctx: &SampleContext<'_>, args: &FilterArgs) -> [f32; 4] {
    let xpot = pot_level_size(ctx.view.xpot, args.level);
    let ypot = pot_level_size(ctx.view.ypot, args.level);
    let x = ifloor(args.s * xpot as f32 + args.offset[0] as f32) & (xpot - 1);
    let y = ifloor(args.t * ypot as f32 + args.offset[1] as f32) & (ypot - 1);
    ctx.tex().texel(args.level, x, y, ctx.first_layer())
}

fn nearest_clamp_pot(ctx: &SampleContext<'_>, args: &FilterArgs) -> [f32; 4] {
    let xpot = pot_level_size(ctx.view.xpot, args.level);
    let ypot = pot_level_size(ctx.view.ypot, args.level);
    let x = ifloor(args.s * xpot as f32 + args.offset[0] as f32).clamp(0, xpot - 1);
    let y = ifloor(args.t * ypot as f32 + args.offset[1] as f32).clamp(0, ypot - 1);
    ctx.tex().texel(args.level, x, y, ctx.first_layer())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use sq_core::SamplerConfig;

    use super::*;
    use crate::state::{MipFilterMode, SamplerState};
    use crate::texture::{TexelFormat, TextureDesc};
    use crate::view::SamplerView;

    fn checker(target: ResourceTarget, w: u32, h: u32) -> PreparedView {
        let desc = TextureDesc::new(target, TexelFormat::Rgba32Float, w, h);
        let mut tex = SoftTexture::new(desc).unwrap();
        for y in 0..h as i32 {
            for x in 0..w as i32 {
                tex.set_texel(0, x, y, 0, [(y * w as i32 + x) as f32, 0.0, 0.0, 1.0]);
            }
        }
        PreparedView::new(SamplerView::new(Arc::new(tex))).unwrap()
    }

    fn compile(state: SamplerState) -> CompiledSampler {
        CompiledSampler::compile(&state, &SamplerConfig::default())
    }

    fn args(s: f32, t: f32) -> FilterArgs {
        FilterArgs {
            s,
            t,
            ..FilterArgs::default()
        }
    }

    #[test]
    fn test_pot_fast_path_selection() {
        let view = checker(ResourceTarget::Tex2D, 4, 4);
        let repeat = compile(SamplerState::new());
        assert_eq!(
            ImageFilter::select(&view, &repeat, FilterMode::Linear, false),
            ImageFilter::LinearRepeatPot
        );
        assert_eq!(
            ImageFilter::select(&view, &repeat, FilterMode::Linear, true),
            ImageFilter::Linear2D
        );

        let clamp = compile(SamplerState::new().with_wrap(
            WrapMode::Clamp,
            WrapMode::Clamp,
            WrapMode::Clamp,
        ));
        assert_eq!(
            ImageFilter::select(&view, &clamp, FilterMode::Nearest, false),
            ImageFilter::NearestClampPot
        );

        let npot = checker(ResourceTarget::Tex2D, 3, 4);
        assert_eq!(
            ImageFilter::select(&npot, &repeat, FilterMode::Nearest, false),
            ImageFilter::Nearest2D
        );
    }

    #[test]
    fn test_pot_paths_match_generic() {
        let view = checker(ResourceTarget::Tex2D, 4, 4);
        let samp = compile(SamplerState::new().with_filter(
            FilterMode::Linear,
            FilterMode::Linear,
            MipFilterMode::None,
        ));
        let ctx = SampleContext {
            view: &view,
            samp: &samp,
            border: [0.0; 4],
        };
        for (s, t) in [(0.3, 0.6), (-0.2, 1.4), (0.99, 0.01)] {
            let a = args(s, t);
            let fast = ImageFilter::LinearRepeatPot.sample(&ctx, &a);
            let slow = ImageFilter::Linear2D.sample(&ctx, &a);
            assert!((fast[0] - slow[0]).abs() < 1e-4, "{s},{t}: {fast:?} vs {slow:?}");
            assert_eq!(
                ImageFilter::NearestRepeatPot.sample(&ctx, &a),
                ImageFilter::Nearest2D.sample(&ctx, &a)
            );
        }
    }

    #[test]
    fn test_border_texels() {
        let view = checker(ResourceTarget::Tex2D, 3, 3);
        let samp = compile(SamplerState::new().with_wrap(
            WrapMode::ClampToBorder,
            WrapMode::ClampToBorder,
            WrapMode::ClampToBorder,
        ));
        let ctx = SampleContext {
            view: &view,
            samp: &samp,
            border: [7.0, 7.0, 7.0, 7.0],
        };
        assert_eq!(ImageFilter::Nearest2D.sample(&ctx, &args(-0.5, 0.5)), [7.0; 4]);
        assert_eq!(ImageFilter::Nearest2D.sample(&ctx, &args(0.5, 0.5))[0], 4.0);
    }

    #[test]
    fn test_gather_collects_four_texels() {
        let view = checker(ResourceTarget::Tex2D, 2, 2);
        let samp = compile(SamplerState::new());
        let ctx = SampleContext {
            view: &view,
            samp: &samp,
            border: [0.0; 4],
        };
        let a = FilterArgs {
            gather: Some(0),
            ..args(0.5, 0.5)
        };
        // Texels 0 1 / 2 3 come back in (x0,y1) (x1,y1) (x1,y0) (x0,y0) order
        assert_eq!(ImageFilter::Linear2D.sample(&ctx, &a), [2.0, 3.0, 1.0, 0.0]);
    }

    #[test]
    fn test_array_layer_selection() {
        let desc = TextureDesc::new(ResourceTarget::Tex2DArray, TexelFormat::Rgba32Float, 2, 2)
            .with_array_size(3);
        let mut tex = SoftTexture::new(desc).unwrap();
        for layer in 0..3 {
            tex.set_texel(0, 0, 0, layer, [layer as f32; 4]);
        }
        let view = PreparedView::new(SamplerView::new(Arc::new(tex)).with_layers(1, 2)).unwrap();
        let samp = compile(SamplerState::new());
        let ctx = SampleContext {
            view: &view,
            samp: &samp,
            border: [0.0; 4],
        };
        let sample = |p| {
            ImageFilter::Nearest2DArray.sample(&ctx, &FilterArgs { p, ..args(0.1, 0.1) })[0]
        };
        assert_eq!(sample(0.0), 1.0);
        assert_eq!(sample(2.2), 2.0);
        assert_eq!(sample(9.0), 2.0);
    }

    #[test]
    fn test_pot_level_size() {
        assert_eq!(pot_level_size(3, 0), 8);
        assert_eq!(pot_level_size(3, 3), 1);
        assert_eq!(pot_level_size(3, 5), 1);
    }
}
