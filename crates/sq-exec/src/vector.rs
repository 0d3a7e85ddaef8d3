//! Quad register storage
//!
//! A [`Channel`] holds one 32-bit value for each of the four pixels of a
//! 2x2 quad. The bits are shared between the float, signed and unsigned
//! views: switching views reinterprets, it never converts.

use bytemuck::{Pod, Zeroable};

/// Number of lanes (pixels) processed together
pub const QUAD_SIZE: usize = 4;
/// Number of channels (x, y, z, w) in a register
pub const NUM_CHANNELS: usize = 4;

pub const TOP_LEFT: usize = 0;
pub const TOP_RIGHT: usize = 1;
pub const BOTTOM_LEFT: usize = 2;
pub const BOTTOM_RIGHT: usize = 3;

pub const CHAN_X: usize = 0;
pub const CHAN_Y: usize = 1;
pub const CHAN_Z: usize = 2;
pub const CHAN_W: usize = 3;

/// Lane mask with every lane of the quad enabled
pub const ALL_LANES: u32 = 0xF;

/// One channel of a quad register: a lane-wise union of f32/i32/u32
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Channel(pub [u32; QUAD_SIZE]);

impl Channel {
    pub const ZERO: Channel = Channel([0; QUAD_SIZE]);

    pub fn splat_f(v: f32) -> Self {
        Self([v.to_bits(); QUAD_SIZE])
    }

    pub fn splat_i(v: i32) -> Self {
        Self([v as u32; QUAD_SIZE])
    }

    pub fn splat_u(v: u32) -> Self {
        Self([v; QUAD_SIZE])
    }

    pub fn from_f(v: [f32; QUAD_SIZE]) -> Self {
        Self(v.map(f32::to_bits))
    }

    pub fn from_i(v: [i32; QUAD_SIZE]) -> Self {
        Self(v.map(|x| x as u32))
    }

    pub fn from_u(v: [u32; QUAD_SIZE]) -> Self {
        Self(v)
    }

    #[inline]
    pub fn f(&self, lane: usize) -> f32 {
        f32::from_bits(self.0[lane])
    }

    #[inline]
    pub fn i(&self, lane: usize) -> i32 {
        self.0[lane] as i32
    }

    #[inline]
    pub fn u(&self, lane: usize) -> u32 {
        self.0[lane]
    }

    #[inline]
    pub fn set_f(&mut self, lane: usize, v: f32) {
        self.0[lane] = v.to_bits();
    }

    #[inline]
    pub fn set_i(&mut self, lane: usize, v: i32) {
        self.0[lane] = v as u32;
    }

    #[inline]
    pub fn set_u(&mut self, lane: usize, v: u32) {
        self.0[lane] = v;
    }

    pub fn to_f(&self) -> [f32; QUAD_SIZE] {
        self.0.map(f32::from_bits)
    }

    pub fn to_i(&self) -> [i32; QUAD_SIZE] {
        self.0.map(|x| x as i32)
    }

    pub fn to_u(&self) -> [u32; QUAD_SIZE] {
        self.0
    }

    pub fn map_f(self, op: impl Fn(f32) -> f32) -> Self {
        Self(self.0.map(|x| op(f32::from_bits(x)).to_bits()))
    }

    pub fn map_i(self, op: impl Fn(i32) -> i32) -> Self {
        Self(self.0.map(|x| op(x as i32) as u32))
    }

    pub fn map_u(self, op: impl Fn(u32) -> u32) -> Self {
        Self(self.0.map(op))
    }

    pub fn zip_f(self, other: Self, op: impl Fn(f32, f32) -> f32) -> Self {
        let mut out = Self::ZERO;
        for lane in 0..QUAD_SIZE {
            out.set_f(lane, op(self.f(lane), other.f(lane)));
        }
        out
    }

    pub fn zip_i(self, other: Self, op: impl Fn(i32, i32) -> i32) -> Self {
        let mut out = Self::ZERO;
        for lane in 0..QUAD_SIZE {
            out.set_i(lane, op(self.i(lane), other.i(lane)));
        }
        out
    }

    pub fn zip_u(self, other: Self, op: impl Fn(u32, u32) -> u32) -> Self {
        let mut out = Self::ZERO;
        for lane in 0..QUAD_SIZE {
            out.set_u(lane, op(self.u(lane), other.u(lane)));
        }
        out
    }
}

/// A four-channel quad register
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Vector {
    pub xyzw: [Channel; NUM_CHANNELS],
}

impl Vector {
    pub const ZERO: Vector = Vector {
        xyzw: [Channel::ZERO; NUM_CHANNELS],
    };

    /// Same xyzw value in every lane
    pub fn splat_f(v: [f32; NUM_CHANNELS]) -> Self {
        Self {
            xyzw: v.map(Channel::splat_f),
        }
    }

    pub fn splat_u(v: [u32; NUM_CHANNELS]) -> Self {
        Self {
            xyzw: v.map(Channel::splat_u),
        }
    }

    /// Gather channel values of one lane
    pub fn lane_f(&self, lane: usize) -> [f32; NUM_CHANNELS] {
        [
            self.xyzw[0].f(lane),
            self.xyzw[1].f(lane),
            self.xyzw[2].f(lane),
            self.xyzw[3].f(lane),
        ]
    }
}

/// Iterate over the lanes enabled in `mask`
pub fn lanes(mask: u32) -> impl Iterator<Item = usize> {
    (0..QUAD_SIZE).filter(move |lane| mask & (1 << lane) != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reinterpret_not_convert() {
        let c = Channel::splat_f(1.0);
        assert_eq!(c.u(0), 0x3F80_0000);
        assert_eq!(c.i(3), 0x3F80_0000);

        let c = Channel::splat_i(-1);
        assert_eq!(c.u(2), u32::MAX);
        assert!(c.f(2).is_nan());
    }

    #[test]
    fn test_zip_and_map() {
        let a = Channel::from_f([1.0, 2.0, 3.0, 4.0]);
        let b = Channel::splat_f(0.5);
        assert_eq!(a.zip_f(b, |x, y| x * y).to_f(), [0.5, 1.0, 1.5, 2.0]);
        assert_eq!(
            Channel::from_i([1, -2, 3, -4]).map_i(i32::wrapping_neg).to_i(),
            [-1, 2, -3, 4]
        );
    }

    #[test]
    fn test_lanes_iterator() {
        assert_eq!(lanes(0b1010).collect::<Vec<_>>(), vec![1, 3]);
        assert_eq!(lanes(ALL_LANES).count(), 4);
        assert_eq!(lanes(0).count(), 0);
    }
}
