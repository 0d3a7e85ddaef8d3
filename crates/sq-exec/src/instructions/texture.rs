//! Texture instructions
//!
//! Arguments are marshalled into [`SampleCoords`] and handed to the bound
//! [`Sampler`](crate::contracts::Sampler). Without a sampler every texture
//! instruction returns zeros.

use sq_core::ExecError;

use crate::contracts::{Derivatives, QuadRgba, SampleCoords, SamplerControl};
use crate::machine::{DataType, Machine};
use crate::tokens::{Instruction, TextureTarget};
use crate::vector::{Channel, CHAN_W, CHAN_X, CHAN_Y, NUM_CHANNELS, QUAD_SIZE};

/// How the optional LOD operand of a sampling instruction is used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TexModifier {
    None,
    Projected,
    Bias,
    Explicit,
    Gather,
    /// Base level, no LOD operand
    LevelZero,
}

fn rgba_channels(rgba: &QuadRgba) -> [Channel; NUM_CHANNELS] {
    rgba.map(Channel::from_f)
}

fn sampler_unit(mach: &Machine, inst: &Instruction, src: usize) -> u32 {
    inst.src
        .get(src)
        .map(|reg| mach.resource_unit(reg))
        .unwrap_or(0)
}

/// Filtered sample - TEX/TXP/TXB/TXL/TEX_LZ/TG4/TEX2/TXB2/TXL2
///
/// `sampler_src` is the operand index of the sampler register. With a
/// sampler in src1 the LOD/bias/projector comes from src0.w, otherwise
/// from src1.x.
pub fn tex(
    mach: &mut Machine,
    inst: &Instruction,
    modifier: TexModifier,
    sampler_src: usize,
) -> Result<(), ExecError> {
    let unit = sampler_unit(mach, inst, sampler_src);
    let offsets = mach.tex_offsets(inst);
    let target = inst.texture_target();
    let dim = target.coord_dim();
    let shadow_ref = target.shadow_ref();

    let mut args = [[0f32; QUAD_SIZE]; 5];
    let mut proj = None;
    let mut control = SamplerControl::None;

    match modifier {
        TexModifier::None => {}
        TexModifier::LevelZero => control = SamplerControl::Zero,
        _ => {
            let value = if sampler_src == 1 {
                mach.fetch(inst, 0, CHAN_W, DataType::Float)
            } else {
                mach.fetch(inst, 1, CHAN_X, DataType::Float)
            };
            match modifier {
                TexModifier::Projected => proj = Some(value.to_f()),
                TexModifier::Bias => control = SamplerControl::Bias,
                TexModifier::Explicit => control = SamplerControl::Explicit,
                TexModifier::Gather => control = SamplerControl::Gather,
                _ => {}
            }
            if proj.is_none() {
                args[4] = value.to_f();
            }
        }
    }

    let project = |mut v: [f32; QUAD_SIZE]| {
        if let Some(q) = proj {
            for lane in 0..QUAD_SIZE {
                v[lane] /= q[lane];
            }
        }
        v
    };

    for (i, arg) in args.iter_mut().enumerate().take(dim) {
        *arg = project(mach.fetch(inst, 0, CHAN_X + i, DataType::Float).to_f());
    }
    if let Some(sref) = shadow_ref {
        args[sref] = project(mach.fetch(inst, sref / 4, sref % 4, DataType::Float).to_f());
    }

    let coords = SampleCoords {
        s: args[0],
        t: args[1],
        p: args[2],
        c0: args[3],
        lod: args[4],
    };

    let rgba = match &mach.resources.sampler {
        Some(sampler) => sampler.get_samples(unit, unit, &coords, None, offsets, control),
        None => QuadRgba::default(),
    };
    mach.store_dst(inst, &rgba_channels(&rgba));
    Ok(())
}

/// Sample with explicit derivatives - TXD coord, ddx, ddy, sampler
pub fn txd(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    let unit = sampler_unit(mach, inst, 3);
    let offsets = mach.tex_offsets(inst);

    let (coord_chans, deriv_axes): (usize, usize) = match inst.texture_target() {
        TextureTarget::Tex1D => (1, 1),
        TextureTarget::Shadow1D | TextureTarget::Tex1DArray | TextureTarget::Shadow1DArray => {
            (3, 1)
        }
        TextureTarget::Tex2D | TextureTarget::Rect => (2, 2),
        TextureTarget::Shadow2D
        | TextureTarget::ShadowRect
        | TextureTarget::Tex2DArray
        | TextureTarget::Shadow2DArray => (4, 2),
        TextureTarget::Tex3D
        | TextureTarget::Cube
        | TextureTarget::CubeArray
        | TextureTarget::ShadowCube => (4, 3),
        other => {
            return Err(ExecError::invalid(
                mach.pc.max(1) as usize - 1,
                format!("TXD does not support {other:?}"),
            ))
        }
    };

    let mut args = [[0f32; QUAD_SIZE]; 4];
    for (chan, arg) in args.iter_mut().enumerate().take(coord_chans) {
        *arg = mach.fetch(inst, 0, chan, DataType::Float).to_f();
    }

    let mut derivs: Derivatives = Default::default();
    for (axis, d) in derivs.iter_mut().enumerate().take(deriv_axes) {
        d[0] = mach.fetch(inst, 1, axis, DataType::Float).to_f();
        d[1] = mach.fetch(inst, 2, axis, DataType::Float).to_f();
    }

    let coords = SampleCoords {
        s: args[0],
        t: args[1],
        p: args[2],
        c0: args[3],
        lod: [0.0; QUAD_SIZE],
    };

    let rgba = match &mach.resources.sampler {
        Some(sampler) => sampler.get_samples(
            unit,
            unit,
            &coords,
            Some(&derivs),
            offsets,
            SamplerControl::DerivsExplicit,
        ),
        None => QuadRgba::default(),
    };
    mach.store_dst(inst, &rgba_channels(&rgba));
    Ok(())
}

/// Unfiltered texel fetch - TXF coord(int), sampler
pub fn txf(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    let unit = sampler_unit(mach, inst, 1);
    let offsets = mach.tex_offsets(inst);

    let mut r = [[0i32; QUAD_SIZE]; 4];
    r[CHAN_W] = mach.fetch(inst, 0, CHAN_W, DataType::Int).to_i();

    let chans = match inst.texture_target() {
        TextureTarget::Tex3D | TextureTarget::Tex2DArray | TextureTarget::Shadow2DArray => 3,
        TextureTarget::Tex2D
        | TextureTarget::Rect
        | TextureTarget::Shadow1DArray
        | TextureTarget::Shadow2D
        | TextureTarget::ShadowRect
        | TextureTarget::Tex1DArray => 2,
        TextureTarget::Buffer | TextureTarget::Tex1D | TextureTarget::Shadow1D => 1,
        other => {
            return Err(ExecError::invalid(
                mach.pc.max(1) as usize - 1,
                format!("TXF does not support {other:?}"),
            ))
        }
    };
    for (chan, coord) in r.iter_mut().enumerate().take(chans) {
        *coord = mach.fetch(inst, 0, chan, DataType::Int).to_i();
    }

    let rgba = match &mach.resources.sampler {
        Some(sampler) => sampler.get_texel(unit, r[0], r[1], r[2], r[3], offsets),
        None => QuadRgba::default(),
    };
    mach.store_dst(inst, &rgba_channels(&rgba));
    Ok(())
}

/// Texture size query - TXQ lod, sampler
pub fn txq(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    let unit = sampler_unit(mach, inst, 1);
    let level = mach.fetch(inst, 0, CHAN_X, DataType::Int).i(0);

    let dims = match &mach.resources.sampler {
        Some(sampler) => sampler.get_dims(unit, level),
        None => [0; 4],
    };
    mach.store_dst(inst, &dims.map(Channel::splat_i));
    Ok(())
}

/// LOD query - LODQ coord, sampler
///
/// x receives the mip level that would be accessed, y the unclamped LOD.
pub fn lodq(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    let unit = sampler_unit(mach, inst, 1);
    let dim = inst.texture_target().coord_dim();

    let mut args = [[0f32; QUAD_SIZE]; 4];
    for (chan, arg) in args.iter_mut().enumerate().take(dim) {
        *arg = mach.fetch(inst, 0, chan, DataType::Float).to_f();
    }
    let coords = SampleCoords {
        s: args[0],
        t: args[1],
        p: args[2],
        c0: args[3],
        lod: [0.0; QUAD_SIZE],
    };

    let (mip, lod) = match &mach.resources.sampler {
        Some(sampler) => sampler.query_lod(unit, unit, &coords, SamplerControl::None),
        None => ([0.0; QUAD_SIZE], [0.0; QUAD_SIZE]),
    };

    let Some(dst) = inst.dst.first().copied() else {
        return Ok(());
    };
    if dst.write_mask.has(CHAN_X) {
        mach.store(&Channel::from_f(mip), &dst, inst.saturate, CHAN_X);
    }
    if dst.write_mask.has(CHAN_Y) {
        mach.store(&Channel::from_f(lod), &dst, inst.saturate, CHAN_Y);
    }
    Ok(())
}
