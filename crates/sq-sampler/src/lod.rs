//! Level of detail computation
//!
//! Lambda is derived from the quad's screen-space derivatives: the
//! x derivative is bottom-right minus bottom-left, the y derivative is
//! top-left minus bottom-left. Implicit lambda is one value per quad,
//! explicit gradients give one value per lane.

use sq_exec::vector::{BOTTOM_LEFT, BOTTOM_RIGHT, TOP_LEFT};
use sq_exec::{Derivatives, SamplerControl, ShaderType, QUAD_SIZE};

use crate::state::SamplerState;
use crate::texture::ResourceTarget;
use crate::view::PreparedView;

/// Clamp that passes NaN through and tolerates `lo > hi`
#[inline]
pub fn clampf(x: f32, lo: f32, hi: f32) -> f32 {
    if x < lo {
        lo
    } else if x > hi {
        hi
    } else {
        x
    }
}

/// How rho is formed from the derivatives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LambdaKind {
    /// No derivatives outside fragment shaders; lambda is always 0
    Vertex,
    Linear1D,
    Planar2D,
    Volume3D,
    Cube,
}

impl LambdaKind {
    /// Kind used for implicit derivatives
    pub fn for_stage(target: ResourceTarget, stage: ShaderType) -> Self {
        if stage != ShaderType::Fragment {
            return Self::Vertex;
        }
        Self::for_target(target)
    }

    /// Kind used for explicit gradients, which do not depend on the stage
    pub fn for_target(target: ResourceTarget) -> Self {
        match target {
            ResourceTarget::Buffer | ResourceTarget::Tex1D | ResourceTarget::Tex1DArray => {
                Self::Linear1D
            }
            ResourceTarget::Tex2D | ResourceTarget::Tex2DArray | ResourceTarget::Rect => {
                Self::Planar2D
            }
            ResourceTarget::Cube | ResourceTarget::CubeArray => Self::Cube,
            ResourceTarget::Tex3D => Self::Volume3D,
        }
    }

    /// Lambda of one lane of explicit gradients
    pub fn from_grad(self, view: &PreparedView, derivs: &Derivatives, lane: usize) -> f32 {
        let tex = view.texture();
        let first = view.view.first_level;
        let axis = |a: usize| derivs[a][0][lane].abs().max(derivs[a][1][lane].abs());

        let rho = match self {
            Self::Vertex => return 0.0,
            Self::Linear1D => axis(0) * tex.width(first) as f32,
            Self::Planar2D => {
                let maxx = axis(0) * tex.width(first) as f32;
                let maxy = axis(1) * tex.height(first) as f32;
                maxx.max(maxy)
            }
            Self::Volume3D => {
                let maxx = axis(0) * tex.width(first) as f32;
                let maxy = axis(1) * tex.height(first) as f32;
                let maxz = axis(2) * tex.depth(first) as f32;
                maxx.max(maxy).max(maxz)
            }
            Self::Cube => {
                axis(0).max(axis(1)).max(axis(2)) * tex.width(first) as f32 / 2.0
            }
        };
        rho.log2()
    }

    /// Quad lambda from the coordinates themselves
    pub fn lambda(self, view: &PreparedView, s: &[f32; 4], t: &[f32; 4], p: &[f32; 4]) -> f32 {
        if self == Self::Vertex {
            return 0.0;
        }
        self.from_grad(view, &quad_derivatives(s, t, p), 0)
    }
}

/// Screen-space derivatives of the quad, stored in lane 0
pub fn quad_derivatives(s: &[f32; 4], t: &[f32; 4], p: &[f32; 4]) -> Derivatives {
    let mut derivs = [[[0.0; QUAD_SIZE]; 2]; 3];
    for (axis, c) in [s, t, p].into_iter().enumerate() {
        derivs[axis][0][0] = c[BOTTOM_RIGHT] - c[BOTTOM_LEFT];
        derivs[axis][1][0] = c[TOP_LEFT] - c[BOTTOM_LEFT];
    }
    derivs
}

/// Per-lane inputs of the LOD computation
#[derive(Debug, Clone, Copy)]
pub struct LodInputs<'a> {
    pub s: &'a [f32; 4],
    pub t: &'a [f32; 4],
    pub p: &'a [f32; 4],
    pub derivs: Option<&'a Derivatives>,
    /// Per-lane bias or explicit LOD
    pub lod_in: &'a [f32; 4],
}

/// Lambda with the state bias applied but no clamping
pub fn compute_lambda_lod_unclamped(
    view: &PreparedView,
    state: &SamplerState,
    lambda: LambdaKind,
    inputs: &LodInputs<'_>,
    control: SamplerControl,
) -> [f32; 4] {
    let lod_bias = state.lod_bias;
    match control {
        SamplerControl::None => {
            [lambda.lambda(view, inputs.s, inputs.t, inputs.p) + lod_bias; 4]
        }
        SamplerControl::DerivsExplicit => {
            let zero = [[[0.0; QUAD_SIZE]; 2]; 3];
            let derivs = inputs.derivs.unwrap_or(&zero);
            let grad = LambdaKind::for_target(view.target());
            std::array::from_fn(|lane| grad.from_grad(view, derivs, lane))
        }
        SamplerControl::Bias => {
            let base = lambda.lambda(view, inputs.s, inputs.t, inputs.p) + lod_bias;
            inputs.lod_in.map(|bias| base + bias)
        }
        SamplerControl::Explicit => inputs.lod_in.map(|lod| lod + lod_bias),
        SamplerControl::Zero | SamplerControl::Gather => [lod_bias; 4],
    }
}

/// Lambda clamped to the state's LOD range
pub fn compute_lambda_lod(
    view: &PreparedView,
    state: &SamplerState,
    lambda: LambdaKind,
    inputs: &LodInputs<'_>,
    control: SamplerControl,
) -> [f32; 4] {
    compute_lambda_lod_unclamped(view, state, lambda, inputs, control)
        .map(|lod| clampf(lod, state.min_lod, state.max_lod))
}

/// Final LOD from an already biased lambda
pub fn compute_lod(
    state: &SamplerState,
    control: SamplerControl,
    biased_lambda: f32,
    lod_in: &[f32; 4],
) -> [f32; 4] {
    let (min_lod, max_lod) = (state.min_lod, state.max_lod);
    match control {
        SamplerControl::None | SamplerControl::Zero | SamplerControl::Gather => {
            [clampf(biased_lambda, min_lod, max_lod); 4]
        }
        SamplerControl::DerivsExplicit => *lod_in,
        SamplerControl::Bias => lod_in.map(|bias| clampf(biased_lambda + bias, min_lod, max_lod)),
        SamplerControl::Explicit => lod_in.map(|lod| clampf(lod, min_lod, max_lod)),
    }
}

/// Gather component packed into the bits of the first LOD slot
#[inline]
pub fn gather_component(lod_in: &[f32; 4]) -> usize {
    (lod_in[0].to_bits() & 3) as usize
}

/// LOD clamped to the state range and then to the view's level range,
/// relative to the first level
pub fn clamp_lod(view: &PreparedView, state: &SamplerState, lod: &[f32; 4]) -> [f32; 4] {
    let max_level = (view.view.last_level - view.view.first_level) as f32;
    lod.map(|l| clampf(clampf(l, state.min_lod, state.max_lod), 0.0, max_level))
}
