//! Texture coordinate wrapping
//!
//! Maps a (possibly out of range) coordinate onto integer texel indices.
//! Nearest wrapping yields one index, linear wrapping two indices and the
//! blend weight between them. Border modes may produce `-1` or `size`,
//! which the texel fetch turns into the border color.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-axis wrap mode of a sampler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
    ClampToEdge,
    ClampToBorder,
    MirrorRepeat,
    MirrorClamp,
    MirrorClampToEdge,
    MirrorClampToBorder,
}

/// Fractional part, correct for negative values
#[inline]
pub fn frac(f: f32) -> f32 {
    f - f.floor()
}

#[inline]
pub fn lerp(a: f32, v0: f32, v1: f32) -> f32 {
    v0 + a * (v1 - v0)
}

/// Bilinear interpolation of four samples in a box
#[inline]
pub fn lerp_2d(a: f32, b: f32, v00: f32, v10: f32, v01: f32, v11: f32) -> f32 {
    let temp0 = lerp(a, v00, v10);
    let temp1 = lerp(a, v01, v11);
    lerp(b, temp0, temp1)
}

/// Trilinear interpolation; `near` and `far` are the two bilinear boxes
/// ordered (00, 10, 01, 11).
#[inline]
pub fn lerp_3d(a: f32, b: f32, c: f32, near: [f32; 4], far: [f32; 4]) -> f32 {
    let temp0 = lerp_2d(a, b, near[0], near[1], near[2], near[3]);
    let temp1 = lerp_2d(a, b, far[0], far[1], far[2], far[3]);
    lerp(c, temp0, temp1)
}

#[inline]
pub fn ifloor(f: f32) -> i32 {
    f.floor() as i32
}

/// `coord` modulo `size`, always in `[0, size)`
#[inline]
pub fn repeat(coord: i32, size: u32) -> i32 {
    coord.rem_euclid(size.max(1) as i32)
}

/// Array layer index of an array texture coordinate
#[inline]
pub fn coord_to_layer(coord: f32, first_layer: u32, last_layer: u32) -> i32 {
    let c = ifloor(coord + 0.5);
    c.clamp(first_layer as i32, last_layer as i32)
}

pub fn nearest_repeat(s: f32, size: u32, offset: i32) -> i32 {
    let i = ifloor(s * size as f32);
    repeat(i + offset, size)
}

pub fn nearest_clamp(s: f32, size: u32, offset: i32) -> i32 {
    let s = s * size as f32 + offset as f32;
    if s <= 0.0 {
        0
    } else if s >= size as f32 {
        size as i32 - 1
    } else {
        ifloor(s)
    }
}

pub fn nearest_clamp_to_edge(s: f32, size: u32, offset: i32) -> i32 {
    let min = 0.5;
    let max = size as f32 - 0.5;
    let s = s * size as f32 + offset as f32;
    if s < min {
        0
    } else if s > max {
        size as i32 - 1
    } else {
        ifloor(s)
    }
}

pub fn nearest_clamp_to_border(s: f32, size: u32, offset: i32) -> i32 {
    let min = -0.5;
    let max = size as f32 + 0.5;
    let s = s * size as f32 + offset as f32;
    if s <= min {
        -1
    } else if s >= max {
        size as i32
    } else {
        ifloor(s)
    }
}

pub fn nearest_mirror_repeat(s: f32, size: u32, offset: i32) -> i32 {
    let min = 1.0 / (2.0 * size as f32);
    let max = 1.0 - min;
    let s = s + offset as f32 / size as f32;
    let flr = ifloor(s);
    let mut u = frac(s);
    if flr & 1 != 0 {
        u = 1.0 - u;
    }
    if u < min {
        0
    } else if u > max {
        size as i32 - 1
    } else {
        ifloor(u * size as f32)
    }
}

pub fn nearest_mirror_clamp(s: f32, size: u32, offset: i32) -> i32 {
    let u = (s * size as f32 + offset as f32).abs();
    if u <= 0.0 {
        0
    } else if u >= size as f32 {
        size as i32 - 1
    } else {
        ifloor(u)
    }
}

pub fn nearest_mirror_clamp_to_edge(s: f32, size: u32, offset: i32) -> i32 {
    let min = 0.5;
    let max = size as f32 - 0.5;
    let u = (s * size as f32 + offset as f32).abs();
    if u < min {
        0
    } else if u > max {
        size as i32 - 1
    } else {
        ifloor(u)
    }
}

pub fn nearest_mirror_clamp_to_border(s: f32, size: u32, offset: i32) -> i32 {
    let min = -0.5;
    let max = size as f32 + 0.5;
    let u = (s * size as f32 + offset as f32).abs();
    if u < min {
        -1
    } else if u > max {
        size as i32
    } else {
        ifloor(u)
    }
}

/// Two texel indices and the weight of the second
pub type LinearTexels = (i32, i32, f32);

pub fn linear_repeat(s: f32, size: u32, offset: i32) -> LinearTexels {
    let u = s * size as f32 - 0.5;
    let i0 = repeat(ifloor(u) + offset, size);
    let i1 = repeat(i0 + 1, size);
    (i0, i1, frac(u))
}

pub fn linear_clamp(s: f32, size: u32, offset: i32) -> LinearTexels {
    let u = (s * size as f32 + offset as f32).clamp(0.0, size as f32) - 0.5;
    let i0 = ifloor(u);
    (i0, i0 + 1, frac(u))
}

pub fn linear_clamp_to_edge(s: f32, size: u32, offset: i32) -> LinearTexels {
    let u = (s * size as f32 + offset as f32).clamp(0.0, size as f32) - 0.5;
    let i0 = ifloor(u);
    let i1 = i0 + 1;
    (i0.max(0), i1.min(size as i32 - 1), frac(u))
}

pub fn linear_clamp_to_border(s: f32, size: u32, offset: i32) -> LinearTexels {
    let min = -1.0;
    let max = size as f32 + 0.5;
    let u = (s * size as f32 + offset as f32).clamp(min, max) - 0.5;
    let i0 = ifloor(u);
    (i0, i0 + 1, frac(u))
}

pub fn linear_mirror_repeat(s: f32, size: u32, offset: i32) -> LinearTexels {
    let size_i = size as i32;
    let s = s + offset as f32 / size as f32;
    let flr = ifloor(s);
    let no_mirror = flr & 1 == 0;

    let mut u = frac(s);
    if no_mirror {
        u = u * size as f32 - 0.5;
    } else {
        u = 1.0 - u;
        u = u * size as f32 + 0.5;
    }

    let mut i0 = ifloor(u);
    let mut i1 = if no_mirror { i0 + 1 } else { i0 - 1 };

    if i0 < 0 {
        i0 += 1;
    }
    if i0 >= size_i {
        i0 = size_i - 1;
    }
    if i1 >= size_i {
        i1 = size_i - 1;
    }
    if i1 < 0 {
        i1 += 1;
    }

    let w = if no_mirror { frac(u) } else { frac(1.0 - u) };
    (i0, i1, w)
}

pub fn linear_mirror_clamp(s: f32, size: u32, offset: i32) -> LinearTexels {
    let u = (s * size as f32 + offset as f32).abs().min(size as f32) - 0.5;
    let i0 = ifloor(u);
    (i0, i0 + 1, frac(u))
}

pub fn linear_mirror_clamp_to_edge(s: f32, size: u32, offset: i32) -> LinearTexels {
    let u = (s * size as f32 + offset as f32).abs().min(size as f32) - 0.5;
    let i0 = ifloor(u);
    let i1 = i0 + 1;
    (i0.max(0), i1.min(size as i32 - 1), frac(u))
}

pub fn linear_mirror_clamp_to_border(s: f32, size: u32, offset: i32) -> LinearTexels {
    let min = -0.5;
    let max = size as f32 + 0.5;
    let t = (s * size as f32 + offset as f32).abs();
    let u = t.clamp(min, max) - 0.5;
    let i0 = ifloor(u);
    (i0, i0 + 1, frac(u))
}

pub fn nearest_unorm_clamp(s: f32, size: u32, offset: i32) -> i32 {
    (ifloor(s) + offset).clamp(0, size as i32 - 1)
}

pub fn nearest_unorm_clamp_to_border(s: f32, size: u32, offset: i32) -> i32 {
    ifloor((s + offset as f32).clamp(-0.5, size as f32 + 0.5))
}

pub fn nearest_unorm_clamp_to_edge(s: f32, size: u32, offset: i32) -> i32 {
    ifloor((s + offset as f32).clamp(0.5, size as f32 - 0.5))
}

pub fn linear_unorm_clamp(s: f32, size: u32, offset: i32) -> LinearTexels {
    let u = (s + offset as f32 - 0.5).clamp(0.0, size as f32 - 1.0);
    let i0 = ifloor(u);
    (i0, i0 + 1, frac(u))
}

pub fn linear_unorm_clamp_to_border(s: f32, size: u32, offset: i32) -> LinearTexels {
    let u = (s + offset as f32).clamp(-0.5, size as f32 + 0.5) - 0.5;
    let i0 = ifloor(u);
    (i0, (i0 + 1).min(size as i32 - 1), frac(u))
}

pub fn linear_unorm_clamp_to_edge(s: f32, size: u32, offset: i32) -> LinearTexels {
    let u = (s + offset as f32).clamp(0.5, size as f32 - 0.5) - 0.5;
    let i0 = ifloor(u);
    (i0, (i0 + 1).min(size as i32 - 1), frac(u))
}

/// Nearest wrap function resolved from a mode and coordinate convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NearestWrap {
    Repeat,
    Clamp,
    ClampToEdge,
    ClampToBorder,
    MirrorRepeat,
    MirrorClamp,
    MirrorClampToEdge,
    MirrorClampToBorder,
    UnormClamp,
    UnormClampToEdge,
    UnormClampToBorder,
}

impl NearestWrap {
    /// Unnormalized coordinates only support the clamp family; anything
    /// else falls back to plain clamp.
    pub fn select(mode: WrapMode, unnormalized: bool) -> Self {
        if unnormalized {
            return match mode {
                WrapMode::Clamp => Self::UnormClamp,
                WrapMode::ClampToEdge => Self::UnormClampToEdge,
                WrapMode::ClampToBorder => Self::UnormClampToBorder,
                other => {
                    warn!(?other, "illegal wrap mode with unnormalized coords");
                    Self::UnormClamp
                }
            };
        }
        match mode {
            WrapMode::Repeat => Self::Repeat,
            WrapMode::Clamp => Self::Clamp,
            WrapMode::ClampToEdge => Self::ClampToEdge,
            WrapMode::ClampToBorder => Self::ClampToBorder,
            WrapMode::MirrorRepeat => Self::MirrorRepeat,
            WrapMode::MirrorClamp => Self::MirrorClamp,
            WrapMode::MirrorClampToEdge => Self::MirrorClampToEdge,
            WrapMode::MirrorClampToBorder => Self::MirrorClampToBorder,
        }
    }

    #[inline]
    pub fn apply(self, s: f32, size: u32, offset: i32) -> i32 {
        match self {
            Self::Repeat => nearest_repeat(s, size, offset),
            Self::Clamp => nearest_clamp(s, size, offset),
            Self::ClampToEdge => nearest_clamp_to_edge(s, size, offset),
            Self::ClampToBorder => nearest_clamp_to_border(s, size, offset),
            Self::MirrorRepeat => nearest_mirror_repeat(s, size, offset),
            Self::MirrorClamp => nearest_mirror_clamp(s, size, offset),
            Self::MirrorClampToEdge => nearest_mirror_clamp_to_edge(s, size, offset),
            Self::MirrorClampToBorder => nearest_mirror_clamp_to_border(s, size, offset),
            Self::UnormClamp => nearest_unorm_clamp(s, size, offset),
            Self::UnormClampToEdge => nearest_unorm_clamp_to_edge(s, size, offset),
            Self::UnormClampToBorder => nearest_unorm_clamp_to_border(s, size, offset),
        }
    }
}

/// Linear wrap function resolved from a mode and coordinate convention
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinearWrap {
    Repeat,
    Clamp,
    ClampToEdge,
    ClampToBorder,
    MirrorRepeat,
    MirrorClamp,
    MirrorClampToEdge,
    MirrorClampToBorder,
    UnormClamp,
    UnormClampToEdge,
    UnormClampToBorder,
}

impl LinearWrap {
    pub fn select(mode: WrapMode, unnormalized: bool) -> Self {
        if unnormalized {
            return match mode {
                WrapMode::Clamp => Self::UnormClamp,
                WrapMode::ClampToEdge => Self::UnormClampToEdge,
                WrapMode::ClampToBorder => Self::UnormClampToBorder,
                other => {
                    warn!(?other, "illegal wrap mode with unnormalized coords");
                    Self::UnormClamp
                }
            };
        }
        match mode {
            WrapMode::Repeat => Self::Repeat,
            WrapMode::Clamp => Self::Clamp,
            WrapMode::ClampToEdge => Self::ClampToEdge,
            WrapMode::ClampToBorder => Self::ClampToBorder,
            WrapMode::MirrorRepeat => Self::MirrorRepeat,
            WrapMode::MirrorClamp => Self::MirrorClamp,
            WrapMode::MirrorClampToEdge => Self::MirrorClampToEdge,
            WrapMode::MirrorClampToBorder => Self::MirrorClampToBorder,
        }
    }

    #[inline]
    pub fn apply(self, s: f32, size: u32, offset: i32) -> LinearTexels {
        match self {
            Self::Repeat => linear_repeat(s, size, offset),
            Self::Clamp => linear_clamp(s, size, offset),
            Self::ClampToEdge => linear_clamp_to_edge(s, size, offset),
            Self::ClampToBorder => linear_clamp_to_border(s, size, offset),
            Self::MirrorRepeat => linear_mirror_repeat(s, size, offset),
            Self::MirrorClamp => linear_mirror_clamp(s, size, offset),
            Self::MirrorClampToEdge => linear_mirror_clamp_to_edge(s, size, offset),
            Self::MirrorClampToBorder => linear_mirror_clamp_to_border(s, size, offset),
            Self::UnormClamp => linear_unorm_clamp(s, size, offset),
            Self::UnormClampToEdge => linear_unorm_clamp_to_edge(s, size, offset),
            Self::UnormClampToBorder => linear_unorm_clamp_to_border(s, size, offset),
        }
    }
}
