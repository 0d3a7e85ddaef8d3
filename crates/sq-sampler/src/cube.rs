//! Cube map face selection and seamless edge walking

use crate::texture::SoftTexture;

pub const FACE_POS_X: usize = 0;
pub const FACE_NEG_X: usize = 1;
pub const FACE_POS_Y: usize = 2;
pub const FACE_NEG_Y: usize = 3;
pub const FACE_POS_Z: usize = 4;
pub const FACE_NEG_Z: usize = 5;

/// Neighbor of each face across its x-, x+, y- and y+ edges
pub const FACE_ARRAY: [[usize; 4]; 6] = [
    [FACE_POS_Z, FACE_NEG_Z, FACE_POS_Y, FACE_NEG_Y],
    [FACE_NEG_Z, FACE_POS_Z, FACE_POS_Y, FACE_NEG_Y],
    [FACE_NEG_X, FACE_POS_X, FACE_NEG_Z, FACE_POS_Z],
    [FACE_NEG_X, FACE_POS_X, FACE_POS_Z, FACE_NEG_Z],
    [FACE_NEG_X, FACE_POS_X, FACE_POS_Y, FACE_NEG_Y],
    [FACE_POS_X, FACE_NEG_X, FACE_POS_Y, FACE_NEG_Y],
];

/// Face-local coordinates of a quad of direction vectors
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CubeCoords {
    pub s: [f32; 4],
    pub t: [f32; 4],
    /// Array layer of cube arrays, passed through from `c0`
    pub p: [f32; 4],
    pub faces: [usize; 4],
}

/// Select the major axis face of each lane's direction and project the
/// other two components onto it
pub fn convert_cube(s: &[f32; 4], t: &[f32; 4], p: &[f32; 4], c0: &[f32; 4]) -> CubeCoords {
    let mut out = CubeCoords {
        p: *c0,
        ..CubeCoords::default()
    };

    for j in 0..4 {
        let (rx, ry, rz) = (s[j], t[j], p[j]);
        let (arx, ary, arz) = (rx.abs(), ry.abs(), rz.abs());

        if arx >= ary && arx >= arz {
            let sign = if rx >= 0.0 { 1.0 } else { -1.0 };
            let ima = -0.5 / arx;
            out.s[j] = sign * rz * ima + 0.5;
            out.t[j] = ry * ima + 0.5;
            out.faces[j] = if rx >= 0.0 { FACE_POS_X } else { FACE_NEG_X };
        } else if ary >= arx && ary >= arz {
            let sign = if ry >= 0.0 { 1.0 } else { -1.0 };
            let ima = -0.5 / ary;
            out.s[j] = -rx * ima + 0.5;
            out.t[j] = sign * -rz * ima + 0.5;
            out.faces[j] = if ry >= 0.0 { FACE_POS_Y } else { FACE_NEG_Y };
        } else {
            let sign = if rz >= 0.0 { 1.0 } else { -1.0 };
            let ima = -0.5 / arz;
            out.s[j] = sign * -rx * ima + 0.5;
            out.t[j] = ry * ima + 0.5;
            out.faces[j] = if rz >= 0.0 { FACE_POS_Z } else { FACE_NEG_Z };
        }
    }
    out
}

#[inline]
pub fn next_face(face: usize, idx: usize) -> usize {
    FACE_ARRAY[face][idx]
}

/// x coordinate on the neighbor face after falling off edge `idx`
pub fn next_xcoord(face: usize, idx: usize, max: i32, xc: i32, yc: i32) -> i32 {
    match (face, idx) {
        (0, 0 | 2 | 3) | (1 | 4 | 5, 0) => max,
        (1, 1..=3) | (0 | 4 | 5, 1) => 0,
        (4, 2 | 3) | (2, 3) | (3, 2) => xc,
        (5, 2 | 3) | (2, 2) | (3, 3) => max - xc,
        (2, 0) | (3, 1) => yc,
        _ => max - yc,
    }
}

/// y coordinate on the neighbor face after falling off edge `idx`
pub fn next_ycoord(face: usize, idx: usize, max: i32, xc: i32, yc: i32) -> i32 {
    if idx <= 1 && (face <= 1 || face >= 4) {
        return yc;
    }
    match (face, idx) {
        (2, _) | (4, 3) | (5, 2) => 0,
        (3, _) | (4, 2) | (5, 3) => max,
        (0, 3) | (1, 2) => xc,
        _ => max - xc,
    }
}

/// Fetch a texel of a cube face, following the edge onto the adjacent
/// face when `(x, y)` lies outside it. `layer` is the first layer of the
/// cube.
pub fn seamless_texel(
    tex: &SoftTexture,
    level: u32,
    x: i32,
    y: i32,
    layer: i32,
    face: usize,
) -> [f32; 4] {
    let max_x = tex.width(level) as i32;
    let max = max_x - 1;
    let (mut new_x, mut new_y, mut face) = (x, y, face);

    let edge = if x < 0 {
        Some(0)
    } else if x >= max_x {
        Some(1)
    } else if y < 0 {
        Some(2)
    } else if y >= max_x {
        Some(3)
    } else {
        None
    };

    if let Some(idx) = edge {
        // Corners are resolved against the x edge
        let y = if idx <= 1 { y.clamp(0, max) } else { y };
        new_x = next_xcoord(face, idx, max, x, y);
        new_y = next_ycoord(face, idx, max, x, y);
        face = next_face(face, idx);
    }

    tex.texel(level, new_x, new_y, layer + face as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::{ResourceTarget, TexelFormat, TextureDesc};

    #[test]
    fn test_face_selection() {
        let c = convert_cube(
            &[1.0, -1.0, 0.2, 0.1],
            &[0.1, 0.2, 1.0, -0.3],
            &[0.3, 0.0, -0.4, -0.9],
            &[7.0; 4],
        );
        assert_eq!(c.faces, [FACE_POS_X, FACE_NEG_X, FACE_POS_Y, FACE_NEG_Z]);
        assert_eq!(c.p, [7.0; 4]);
        // +X: s = -rz/2|rx| + 0.5, t = -ry/2|rx| + 0.5
        assert!((c.s[0] - 0.35).abs() < 1e-6);
        assert!((c.t[0] - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_center_maps_to_half() {
        let c = convert_cube(&[0.0; 4], &[0.0; 4], &[1.0, 1.0, -1.0, -1.0], &[0.0; 4]);
        assert_eq!(c.faces, [FACE_POS_Z, FACE_POS_Z, FACE_NEG_Z, FACE_NEG_Z]);
        assert_eq!(c.s, [0.5; 4]);
        assert_eq!(c.t, [0.5; 4]);
    }

    #[test]
    fn test_adjacency_is_symmetric() {
        for face in 0..6 {
            for idx in 0..4 {
                let neighbor = next_face(face, idx);
                assert_ne!(neighbor, face);
                assert!(FACE_ARRAY[neighbor].contains(&face));
            }
        }
    }

    #[test]
    fn test_edge_remap() {
        // Off the left edge of +X lands on the right column of +Z
        assert_eq!(next_xcoord(FACE_POS_X, 0, 7, -1, 3), 7);
        assert_eq!(next_ycoord(FACE_POS_X, 0, 7, -1, 3), 3);
        // Off the top of +Y lands on the top row of -Z, mirrored in x
        assert_eq!(next_xcoord(FACE_POS_Y, 2, 7, 2, -1), 5);
        assert_eq!(next_ycoord(FACE_POS_Y, 2, 7, 2, -1), 0);
    }

    #[test]
    fn test_seamless_texel_walks_to_neighbor() {
        let desc = TextureDesc::new(ResourceTarget::Cube, TexelFormat::Rgba32Float, 4, 4);
        let mut tex = SoftTexture::new(desc).unwrap();
        tex.set_texel(0, 3, 1, FACE_POS_Z as i32, [9.0; 4]);

        assert_eq!(seamless_texel(&tex, 0, -1, 1, 0, FACE_POS_X), [9.0; 4]);
        assert_eq!(seamless_texel(&tex, 0, 0, 1, 0, FACE_POS_X), [0.0; 4]);
    }
}
