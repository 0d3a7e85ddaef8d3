//! Depth compare

use sq_exec::{QuadRgba, SamplerControl};

use crate::state::CompareFunc;
use crate::texture::{ResourceTarget, TexelFormat};

/// Pick the coordinate carrying the depth reference for `target`
pub fn prepare_compare_values(
    target: ResourceTarget,
    p: &[f32; 4],
    c0: &[f32; 4],
    c1: &[f32; 4],
) -> [f32; 4] {
    match target {
        ResourceTarget::Tex2DArray | ResourceTarget::Cube => *c0,
        ResourceTarget::CubeArray => *c1,
        _ => *p,
    }
}

/// Replace the filtered texels with compare results. Gathers compare all
/// four channels; otherwise red is compared and replicated to rgb with
/// alpha one.
pub fn sample_compare(
    format: TexelFormat,
    func: CompareFunc,
    reference: &[f32; 4],
    control: SamplerControl,
    rgba: &mut QuadRgba,
) {
    // Conversion to a normalized format clamps the reference
    let pc = if format.is_float() {
        *reference
    } else {
        reference.map(|r| r.clamp(0.0, 1.0))
    };
    let result = |v: usize, j: usize| -> f32 {
        if func.test(pc[j], rgba[v][j]) {
            1.0
        } else {
            0.0
        }
    };

    if control == SamplerControl::Gather {
        let k: QuadRgba = std::array::from_fn(|v| std::array::from_fn(|j| result(v, j)));
        *rgba = k;
    } else {
        let k: [f32; 4] = std::array::from_fn(|j| result(0, j));
        *rgba = [k, k, k, [1.0; 4]];
    }
}
