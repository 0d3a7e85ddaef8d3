//! Component swizzle and border color handling

use serde::{Deserialize, Serialize};
use sq_exec::QuadRgba;

use crate::texture::TexelFormat;

/// Source of one output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Swizzle {
    R,
    G,
    B,
    A,
    Zero,
    One,
}

/// Identity RGBA swizzle
pub const SWIZZLE_RGBA: [Swizzle; 4] = [Swizzle::R, Swizzle::G, Swizzle::B, Swizzle::A];

/// Remap the channels of a quad result. `one` is the format's constant
/// one value.
pub fn do_swizzling(swizzle: &[Swizzle; 4], one: f32, input: &QuadRgba) -> QuadRgba {
    let mut out = [[0.0; 4]; 4];
    for (chan, sw) in swizzle.iter().enumerate() {
        out[chan] = match sw {
            Swizzle::R => input[0],
            Swizzle::G => input[1],
            Swizzle::B => input[2],
            Swizzle::A => input[3],
            Swizzle::Zero => [0.0; 4],
            Swizzle::One => [one; 4],
        };
    }
    out
}

/// Gather channel selection.
///
/// The four gathered texels are fetched in (x0,y0) (x1,y0) (x0,y1) (x1,y1)
/// order; output channel `chan` comes from the texel that ordering puts at
/// gather position `chan`. `comp` picks the component through the view
/// swizzle.
pub fn gather_value(
    swizzle: &[Swizzle; 4],
    one: f32,
    chan: usize,
    comp: usize,
    texels: &[[f32; 4]; 4],
) -> f32 {
    const CHAN_TEXEL: [usize; 4] = [2, 3, 1, 0];
    let texel = &texels[CHAN_TEXEL[chan & 3]];
    match swizzle[comp & 3] {
        Swizzle::R => texel[0],
        Swizzle::G => texel[1],
        Swizzle::B => texel[2],
        Swizzle::A => texel[3],
        Swizzle::Zero => 0.0,
        Swizzle::One => one,
    }
}

/// Border color as seen through a view of `format`
pub fn border_color(color: [f32; 4], format: TexelFormat) -> [f32; 4] {
    if format.is_unorm() {
        color.map(|c| c.clamp(0.0, 1.0))
    } else if format.is_snorm() {
        color.map(|c| c.clamp(-1.0, 1.0))
    } else {
        color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swizzle_constants() {
        let input = [[1.0; 4], [2.0; 4], [3.0; 4], [4.0; 4]];
        let sw = [Swizzle::B, Swizzle::Zero, Swizzle::One, Swizzle::R];
        let out = do_swizzling(&sw, 1.0, &input);
        assert_eq!(out, [[3.0; 4], [0.0; 4], [1.0; 4], [1.0; 4]]);

        let int_one = f32::from_bits(1);
        let out = do_swizzling(&[Swizzle::One; 4], int_one, &input);
        assert_eq!(out[0][0].to_bits(), 1);
    }

    #[test]
    fn test_gather_order() {
        let texels = [
            [0.0, 10.0, 0.0, 0.0],
            [1.0, 11.0, 0.0, 0.0],
            [2.0, 12.0, 0.0, 0.0],
            [3.0, 13.0, 0.0, 0.0],
        ];
        let got: Vec<f32> = (0..4)
            .map(|chan| gather_value(&SWIZZLE_RGBA, 1.0, chan, 0, &texels))
            .collect();
        assert_eq!(got, vec![2.0, 3.0, 1.0, 0.0]);
        assert_eq!(gather_value(&SWIZZLE_RGBA, 1.0, 0, 1, &texels), 12.0);
    }

    #[test]
    fn test_border_clamp() {
        let color = [-0.5, 0.5, 1.5, 1.0];
        assert_eq!(border_color(color, TexelFormat::Rgba8Unorm), [0.0, 0.5, 1.0, 1.0]);
        assert_eq!(border_color(color, TexelFormat::Rgba8Snorm), [-0.5, 0.5, 1.0, 1.0]);
        assert_eq!(border_color(color, TexelFormat::Rgba32Float), color);
    }
}
