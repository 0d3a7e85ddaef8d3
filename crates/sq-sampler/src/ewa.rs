//! Anisotropic filtering with an elliptical weighted average
//!
//! The pixel footprint is approximated by an ellipse in texel space. Every
//! texel inside the ellipse's bounding box is weighted by a gaussian of
//! its distance from the center, looked up in a precomputed table.

use once_cell::sync::Lazy;
use sq_exec::vector::{BOTTOM_LEFT, BOTTOM_RIGHT, TOP_LEFT};
use sq_exec::{QuadRgba, SamplerControl, QUAD_SIZE};

use crate::filter::{ImageFilter, SampleContext};
use crate::lod::compute_lod;
use crate::mip::{store, FilterInputs};
use crate::texture::minify;

pub const WEIGHT_LUT_SIZE: usize = 1024;

static WEIGHT_LUT: Lazy<[f32; WEIGHT_LUT_SIZE]> = Lazy::new(|| {
    const ALPHA: f32 = 2.0;
    std::array::from_fn(|i| {
        let r2 = i as f32 / (WEIGHT_LUT_SIZE - 1) as f32;
        (-ALPHA * r2).exp()
    })
});

/// Texel-space derivatives of the quad
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Footprint {
    pub dudx: f32,
    pub dvdx: f32,
    pub dudy: f32,
    pub dvdy: f32,
}

impl Footprint {
    pub fn from_quad(s: &[f32; 4], t: &[f32; 4], width: u32, height: u32) -> Self {
        let (s_to_u, t_to_v) = (width as f32, height as f32);
        Self {
            dudx: (s[BOTTOM_RIGHT] - s[BOTTOM_LEFT]) * s_to_u,
            dudy: (s[TOP_LEFT] - s[BOTTOM_LEFT]) * s_to_u,
            dvdx: (t[BOTTOM_RIGHT] - t[BOTTOM_LEFT]) * t_to_v,
            dvdy: (t[TOP_LEFT] - t[BOTTOM_LEFT]) * t_to_v,
        }
    }

    /// Lambda of the minor axis, with the major axis limited to
    /// `max_anisotropy` times the minor one
    pub fn lambda(&self, max_anisotropy: f32) -> f32 {
        let px2 = self.dudx * self.dudx + self.dvdx * self.dvdx;
        let py2 = self.dudy * self.dudy + self.dvdy * self.dvdy;
        let (pmax2, mut pmin2) = if px2 < py2 { (py2, px2) } else { (px2, py2) };

        let max_eccentricity = max_anisotropy * max_anisotropy;
        if pmax2 / pmin2 > max_eccentricity {
            pmin2 = pmax2 / max_eccentricity;
        }
        0.5 * pmin2.log2()
    }
}

/// Anisotropic mip strategy. `min` must be a nearest filter.
pub fn filter_linear_aniso(
    ctx: &SampleContext<'_>,
    min: ImageFilter,
    inputs: &FilterInputs<'_>,
) -> QuadRgba {
    let view = &ctx.view.view;
    let state = &ctx.samp.base;
    let tex = ctx.view.texture();
    let footprint = Footprint::from_quad(
        inputs.s,
        inputs.t,
        tex.width(view.first_level),
        tex.height(view.first_level),
    );

    let lod = match inputs.control {
        SamplerControl::Bias | SamplerControl::None | SamplerControl::DerivsExplicit => {
            let lambda = footprint.lambda(state.max_anisotropy) + state.lod_bias;
            compute_lod(state, inputs.control, lambda, inputs.lod)
        }
        _ => compute_lod(state, inputs.control, state.lod_bias, inputs.lod),
    };

    // One level for the whole quad
    let level0 = (view.first_level as i32).saturating_add(lod[0] as i32);
    if level0 >= view.last_level as i32 {
        let mut rgba = [[0.0; QUAD_SIZE]; 4];
        for j in 0..QUAD_SIZE {
            store(&mut rgba, j, min.sample(ctx, &inputs.args(j, view.last_level)));
        }
        return rgba;
    }
    filter_2d_ewa(ctx, min, inputs, level0, &footprint)
}

/// Weighted average of the texels under each lane's ellipse at `level`
pub fn filter_2d_ewa(
    ctx: &SampleContext<'_>,
    min: ImageFilter,
    inputs: &FilterInputs<'_>,
    level: i32,
    footprint: &Footprint,
) -> QuadRgba {
    let tex = ctx.view.texture();
    let level0 = level.max(0) as u32;
    let scaling = 1.0 / (1u32 << level0.min(31)) as f32;
    let width = minify(tex.desc().width, level0) as f32;
    let height = minify(tex.desc().height, level0) as f32;

    let ux = footprint.dudx * scaling;
    let vx = footprint.dvdx * scaling;
    let uy = footprint.dudy * scaling;
    let vy = footprint.dvdy * scaling;

    // Ellipse A*u*u + B*u*v + C*v*v = F
    let mut a = vx * vx + vy * vy + 1.0;
    let mut b = -2.0 * (ux * vx + uy * vy);
    let mut c = ux * ux + uy * uy + 1.0;
    let f = a * c - b * b / 4.0;

    let d = -b * b + 4.0 * c * a;
    let box_u = 2.0 / d * (d * c * f).sqrt();
    let box_v = 2.0 / d * (a * d * f).sqrt();

    let mut rgba = [[0.0; QUAD_SIZE]; 4];
    if !box_u.is_finite() || !box_v.is_finite() {
        for j in 0..QUAD_SIZE {
            store(&mut rgba, j, min.sample(ctx, &inputs.args(j, level0)));
        }
        return rgba;
    }

    // Scale so that F lands on the last table entry
    let form_scale = (WEIGHT_LUT_SIZE - 1) as f64 / f as f64;
    a = (a as f64 * form_scale) as f32;
    b = (b as f64 * form_scale) as f32;
    c = (c as f64 * form_scale) as f32;
    let ddq = 2.0 * a;

    let lut = &*WEIGHT_LUT;
    let base_width = tex.desc().width as f32;
    let base_height = tex.desc().height as f32;

    for j in 0..QUAD_SIZE {
        let tex_u = -0.5 + inputs.s[j] * base_width * scaling;
        let tex_v = -0.5 + inputs.t[j] * base_height * scaling;

        let u0 = (tex_u - box_u).floor() as i32;
        let u1 = (tex_u + box_u).ceil() as i32;
        let v0 = (tex_v - box_v).floor() as i32;
        let v1 = (tex_v + box_v).ceil() as i32;
        let big_u = u0 as f32 - tex_u;

        let mut num = [0.0f32; 4];
        let mut den = 0.0f32;
        let mut args = inputs.args(j, level0);

        for v in v0..=v1 {
            let big_v = v as f32 - tex_v;
            let mut dq = a * (2.0 * big_u + 1.0) + b * big_v;
            let mut q = (c * big_v + b * big_u) * big_v + a * big_u * big_u;

            for u in u0..=u1 {
                if q < WEIGHT_LUT_SIZE as f32 {
                    let weight = lut[q.max(0.0) as usize];
                    args.s = u as f32 / width;
                    args.t = v as f32 / height;
                    let texel = min.sample(ctx, &args);
                    for (n, value) in num.iter_mut().zip(texel) {
                        *n += weight * value;
                    }
                    den += weight;
                }
                q += dq;
                dq += ddq;
            }
        }

        let texel = if den <= 0.0 {
            min.sample(ctx, &inputs.args(j, level0))
        } else {
            num.map(|n| n / den)
        };
        store(&mut rgba, j, texel);
    }
    rgba
}
