//! Arithmetic, logic and conversion instructions
//!
//! Vector instructions fetch every written channel before storing any of
//! them, so a destination may alias a source. Scalar instructions read the
//! x component of their sources and broadcast the result.

use sq_core::ExecError;

use crate::machine::{DataType, Machine};
use crate::tokens::{Instruction, Opcode};
use crate::vector::{
    Channel, BOTTOM_LEFT, BOTTOM_RIGHT, CHAN_W, CHAN_X, CHAN_Y, CHAN_Z, NUM_CHANNELS, QUAD_SIZE,
    TOP_LEFT, TOP_RIGHT,
};

const TRUE_U: u32 = !0;

/// Execute an ALU instruction. Returns false for opcodes handled elsewhere.
pub fn execute(mach: &mut Machine, inst: &Instruction) -> Result<bool, ExecError> {
    use DataType::{Float, Int, Uint};

    match inst.opcode {
        Opcode::Mov => vector_unary(mach, inst, Float, |a| a),
        Opcode::Arl => vector_unary(mach, inst, Float, |a| {
            Channel::from_i(a.to_f().map(|x| x.floor() as i32))
        }),
        Opcode::Arr => vector_unary(mach, inst, Float, |a| {
            Channel::from_i(a.to_f().map(|x| (x + 0.5).floor() as i32))
        }),
        Opcode::Uarl => vector_unary(mach, inst, Uint, |a| a),

        Opcode::Add => vector_binary(mach, inst, Float, |a, b| a.zip_f(b, |x, y| x + y)),
        Opcode::Sub => vector_binary(mach, inst, Float, |a, b| a.zip_f(b, |x, y| x - y)),
        Opcode::Mul => vector_binary(mach, inst, Float, |a, b| a.zip_f(b, |x, y| x * y)),
        Opcode::Div => vector_binary(mach, inst, Float, |a, b| a.zip_f(b, |x, y| x / y)),
        Opcode::Min => vector_binary(mach, inst, Float, |a, b| a.zip_f(b, f32::min)),
        Opcode::Max => vector_binary(mach, inst, Float, |a, b| a.zip_f(b, f32::max)),
        Opcode::Mad => vector_trinary(mach, inst, Float, |a, b, c| {
            zip3_f(a, b, c, |x, y, z| x * y + z)
        }),
        Opcode::Fma => vector_trinary(mach, inst, Float, |a, b, c| {
            zip3_f(a, b, c, |x, y, z| x.mul_add(y, z))
        }),
        Opcode::Lrp => vector_trinary(mach, inst, Float, |a, b, c| {
            zip3_f(a, b, c, |t, x, y| t * (x - y) + y)
        }),
        Opcode::Cmp => vector_trinary(mach, inst, Float, |a, b, c| {
            zip3(a, b, c, |s, x, y| if f32::from_bits(s) < 0.0 { x } else { y })
        }),
        Opcode::Ucmp => vector_trinary(mach, inst, Uint, |a, b, c| {
            zip3(a, b, c, |s, x, y| if s != 0 { x } else { y })
        }),

        Opcode::Dp2 => dot(mach, inst, 2),
        Opcode::Dp3 => dot(mach, inst, 3),
        Opcode::Dp4 => dot(mach, inst, 4),
        Opcode::Dst => dst(mach, inst),
        Opcode::Lit => lit(mach, inst),
        Opcode::Exp => exp(mach, inst),
        Opcode::Log => log(mach, inst),

        Opcode::Slt => vector_binary(mach, inst, Float, |a, b| set_f(a, b, |x, y| x < y)),
        Opcode::Sge => vector_binary(mach, inst, Float, |a, b| set_f(a, b, |x, y| x >= y)),
        Opcode::Sgt => vector_binary(mach, inst, Float, |a, b| set_f(a, b, |x, y| x > y)),
        Opcode::Sle => vector_binary(mach, inst, Float, |a, b| set_f(a, b, |x, y| x <= y)),
        Opcode::Seq => vector_binary(mach, inst, Float, |a, b| set_f(a, b, |x, y| x == y)),
        Opcode::Sne => vector_binary(mach, inst, Float, |a, b| set_f(a, b, |x, y| x != y)),
        Opcode::Ssg => vector_unary(mach, inst, Float, |a| a.map_f(sign)),

        Opcode::Rcp => scalar_unary(mach, inst, |x| 1.0 / x),
        Opcode::Rsq => scalar_unary(mach, inst, |x| 1.0 / x.sqrt()),
        Opcode::Sqrt => scalar_unary(mach, inst, f32::sqrt),
        Opcode::Ex2 => scalar_unary(mach, inst, f32::exp2),
        Opcode::Lg2 => scalar_unary(mach, inst, lg2),
        Opcode::Sin => scalar_unary(mach, inst, f32::sin),
        Opcode::Cos => scalar_unary(mach, inst, f32::cos),
        Opcode::Pow => scalar_binary(mach, inst, f32::powf),

        Opcode::Frc => vector_unary(mach, inst, Float, |a| a.map_f(|x| x - x.floor())),
        Opcode::Flr => vector_unary(mach, inst, Float, |a| a.map_f(f32::floor)),
        Opcode::Ceil => vector_unary(mach, inst, Float, |a| a.map_f(f32::ceil)),
        Opcode::Rnd => vector_unary(mach, inst, Float, |a| a.map_f(f32::round_ties_even)),
        Opcode::Trunc => vector_unary(mach, inst, Float, |a| a.map_f(f32::trunc)),

        Opcode::Ddx => vector_unary(mach, inst, Float, ddx),
        Opcode::Ddy => vector_unary(mach, inst, Float, ddy),
        Opcode::DdxFine => vector_unary(mach, inst, Float, ddx_fine),
        Opcode::DdyFine => vector_unary(mach, inst, Float, ddy_fine),

        Opcode::F2i => vector_unary(mach, inst, Float, |a| {
            Channel::from_i(a.to_f().map(|x| x as i32))
        }),
        Opcode::F2u => vector_unary(mach, inst, Float, |a| {
            Channel::from_u(a.to_f().map(|x| x as u32))
        }),
        Opcode::I2f => vector_unary(mach, inst, Int, |a| {
            Channel::from_f(a.to_i().map(|x| x as f32))
        }),
        Opcode::U2f => vector_unary(mach, inst, Uint, |a| {
            Channel::from_f(a.to_u().map(|x| x as f32))
        }),

        Opcode::Uadd => vector_binary(mach, inst, Int, |a, b| a.zip_i(b, i32::wrapping_add)),
        Opcode::Umul => vector_binary(mach, inst, Uint, |a, b| a.zip_u(b, u32::wrapping_mul)),
        Opcode::Umad => vector_trinary(mach, inst, Uint, |a, b, c| {
            zip3(a, b, c, |x, y, z| x.wrapping_mul(y).wrapping_add(z))
        }),
        Opcode::Idiv => vector_binary(mach, inst, Int, |a, b| {
            a.zip_i(b, |x, y| if y != 0 { x.wrapping_div(y) } else { 0 })
        }),
        Opcode::Mod => vector_binary(mach, inst, Int, |a, b| {
            a.zip_i(b, |x, y| if y != 0 { x.wrapping_rem(y) } else { !0 })
        }),
        Opcode::Udiv => vector_binary(mach, inst, Uint, |a, b| {
            a.zip_u(b, |x, y| if y != 0 { x / y } else { !0 })
        }),
        Opcode::Umod => vector_binary(mach, inst, Uint, |a, b| {
            a.zip_u(b, |x, y| if y != 0 { x % y } else { !0 })
        }),
        Opcode::Imax => vector_binary(mach, inst, Int, |a, b| a.zip_i(b, i32::max)),
        Opcode::Imin => vector_binary(mach, inst, Int, |a, b| a.zip_i(b, i32::min)),
        Opcode::Umax => vector_binary(mach, inst, Uint, |a, b| a.zip_u(b, u32::max)),
        Opcode::Umin => vector_binary(mach, inst, Uint, |a, b| a.zip_u(b, u32::min)),
        Opcode::Ineg => vector_unary(mach, inst, Int, |a| a.map_i(i32::wrapping_neg)),
        Opcode::Iabs => vector_unary(mach, inst, Int, |a| a.map_i(i32::wrapping_abs)),
        Opcode::Issg => vector_unary(mach, inst, Int, |a| a.map_i(i32::signum)),

        Opcode::Shl => vector_binary(mach, inst, Uint, |a, b| a.zip_u(b, |x, y| x << (y & 0x1f))),
        Opcode::Ishr => vector_binary(mach, inst, Int, |a, b| a.zip_i(b, |x, y| x >> (y & 0x1f))),
        Opcode::Ushr => vector_binary(mach, inst, Uint, |a, b| a.zip_u(b, |x, y| x >> (y & 0x1f))),
        Opcode::And => vector_binary(mach, inst, Uint, |a, b| a.zip_u(b, |x, y| x & y)),
        Opcode::Or => vector_binary(mach, inst, Uint, |a, b| a.zip_u(b, |x, y| x | y)),
        Opcode::Xor => vector_binary(mach, inst, Uint, |a, b| a.zip_u(b, |x, y| x ^ y)),
        Opcode::Not => vector_unary(mach, inst, Uint, |a| a.map_u(|x| !x)),

        Opcode::Fseq => vector_binary(mach, inst, Float, |a, b| mask_f(a, b, |x, y| x == y)),
        Opcode::Fsne => vector_binary(mach, inst, Float, |a, b| mask_f(a, b, |x, y| x != y)),
        Opcode::Fslt => vector_binary(mach, inst, Float, |a, b| mask_f(a, b, |x, y| x < y)),
        Opcode::Fsge => vector_binary(mach, inst, Float, |a, b| mask_f(a, b, |x, y| x >= y)),
        Opcode::Useq => vector_binary(mach, inst, Uint, |a, b| mask_u(a, b, |x, y| x == y)),
        Opcode::Usne => vector_binary(mach, inst, Uint, |a, b| mask_u(a, b, |x, y| x != y)),
        Opcode::Uslt => vector_binary(mach, inst, Uint, |a, b| mask_u(a, b, |x, y| x < y)),
        Opcode::Usge => vector_binary(mach, inst, Uint, |a, b| mask_u(a, b, |x, y| x >= y)),
        Opcode::Islt => vector_binary(mach, inst, Int, |a, b| {
            mask_u(a, b, |x, y| (x as i32) < (y as i32))
        }),
        Opcode::Isge => vector_binary(mach, inst, Int, |a, b| {
            mask_u(a, b, |x, y| (x as i32) >= (y as i32))
        }),

        Opcode::ImulHi => vector_binary(mach, inst, Int, |a, b| {
            a.zip_i(b, |x, y| ((x as i64 * y as i64) >> 32) as i32)
        }),
        Opcode::UmulHi => vector_binary(mach, inst, Uint, |a, b| {
            a.zip_u(b, |x, y| ((x as u64 * y as u64) >> 32) as u32)
        }),
        Opcode::Ibfe => vector_trinary(mach, inst, Int, |a, b, c| {
            zip3(a, b, c, |v, o, w| ibfe(v as i32, o as i32, w as i32) as u32)
        }),
        Opcode::Ubfe => vector_trinary(mach, inst, Uint, |a, b, c| zip3(a, b, c, ubfe)),
        Opcode::Bfi => bfi(mach, inst),
        Opcode::Brev => vector_unary(mach, inst, Uint, |a| a.map_u(u32::reverse_bits)),
        Opcode::Popc => vector_unary(mach, inst, Uint, |a| a.map_u(u32::count_ones)),
        Opcode::Lsb => vector_unary(mach, inst, Uint, |a| {
            a.map_u(|x| if x == 0 { !0 } else { x.trailing_zeros() })
        }),
        Opcode::Imsb => vector_unary(mach, inst, Int, |a| {
            a.map_i(|x| {
                let x = if x < 0 { !x } else { x };
                last_bit(x as u32) - 1
            })
        }),
        Opcode::Umsb => vector_unary(mach, inst, Uint, |a| a.map_i(|x| last_bit(x as u32) - 1)),
        Opcode::Ldexp => vector_binary(mach, inst, Float, |a, b| {
            let mut out = Channel::ZERO;
            for lane in 0..QUAD_SIZE {
                out.set_f(lane, ldexp(a.f(lane), b.i(lane)));
            }
            out
        }),

        _ => return Ok(false),
    }
    Ok(true)
}

fn vector_unary(
    mach: &mut Machine,
    inst: &Instruction,
    ty: DataType,
    op: impl Fn(Channel) -> Channel,
) {
    let mut out = [Channel::ZERO; NUM_CHANNELS];
    for chan in inst.write_mask().channels() {
        out[chan] = op(mach.fetch(inst, 0, chan, ty));
    }
    mach.store_dst(inst, &out);
}

fn vector_binary(
    mach: &mut Machine,
    inst: &Instruction,
    ty: DataType,
    op: impl Fn(Channel, Channel) -> Channel,
) {
    let mut out = [Channel::ZERO; NUM_CHANNELS];
    for chan in inst.write_mask().channels() {
        out[chan] = op(mach.fetch(inst, 0, chan, ty), mach.fetch(inst, 1, chan, ty));
    }
    mach.store_dst(inst, &out);
}

fn vector_trinary(
    mach: &mut Machine,
    inst: &Instruction,
    ty: DataType,
    op: impl Fn(Channel, Channel, Channel) -> Channel,
) {
    let mut out = [Channel::ZERO; NUM_CHANNELS];
    for chan in inst.write_mask().channels() {
        out[chan] = op(
            mach.fetch(inst, 0, chan, ty),
            mach.fetch(inst, 1, chan, ty),
            mach.fetch(inst, 2, chan, ty),
        );
    }
    mach.store_dst(inst, &out);
}

fn scalar_unary(mach: &mut Machine, inst: &Instruction, op: impl Fn(f32) -> f32) {
    let x = mach.fetch(inst, 0, CHAN_X, DataType::Float).map_f(op);
    mach.store_dst_scalar(inst, &x);
}

fn scalar_binary(mach: &mut Machine, inst: &Instruction, op: impl Fn(f32, f32) -> f32) {
    let a = mach.fetch(inst, 0, CHAN_X, DataType::Float);
    let b = mach.fetch(inst, 1, CHAN_X, DataType::Float);
    mach.store_dst_scalar(inst, &a.zip_f(b, op));
}

fn zip3(a: Channel, b: Channel, c: Channel, op: impl Fn(u32, u32, u32) -> u32) -> Channel {
    let mut out = Channel::ZERO;
    for lane in 0..QUAD_SIZE {
        out.set_u(lane, op(a.u(lane), b.u(lane), c.u(lane)));
    }
    out
}

fn zip3_f(a: Channel, b: Channel, c: Channel, op: impl Fn(f32, f32, f32) -> f32) -> Channel {
    zip3(a, b, c, |x, y, z| {
        op(f32::from_bits(x), f32::from_bits(y), f32::from_bits(z)).to_bits()
    })
}

/// 1.0 / 0.0 comparison result
fn set_f(a: Channel, b: Channel, pred: impl Fn(f32, f32) -> bool) -> Channel {
    a.zip_f(b, |x, y| if pred(x, y) { 1.0 } else { 0.0 })
}

/// All-ones / zero comparison of float operands
fn mask_f(a: Channel, b: Channel, pred: impl Fn(f32, f32) -> bool) -> Channel {
    a.zip_u(b, |x, y| {
        if pred(f32::from_bits(x), f32::from_bits(y)) {
            TRUE_U
        } else {
            0
        }
    })
}

fn mask_u(a: Channel, b: Channel, pred: impl Fn(u32, u32) -> bool) -> Channel {
    a.zip_u(b, |x, y| if pred(x, y) { TRUE_U } else { 0 })
}

fn sign(x: f32) -> f32 {
    if x < 0.0 {
        -1.0
    } else if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn lg2(x: f32) -> f32 {
    x.ln() * 1.442695
}

fn ldexp(x: f32, exp: i32) -> f32 {
    // Scale in steps that keep 2^e representable
    let mut x = x;
    let mut exp = exp.clamp(-400, 400);
    while exp > 127 {
        x *= 2f32.powi(127);
        exp -= 127;
    }
    while exp < -126 {
        x *= 2f32.powi(-126);
        exp += 126;
    }
    x * 2f32.powi(exp)
}

/// Position of the highest set bit plus one; 0 for 0
fn last_bit(x: u32) -> i32 {
    32 - x.leading_zeros() as i32
}

fn ibfe(value: i32, offset: i32, width: i32) -> i32 {
    let offset = offset & 0x1f;
    if width == 32 && offset == 0 {
        return value;
    }
    let width = width & 0x1f;
    if width == 0 {
        0
    } else if width + offset < 32 {
        (value << (32 - width - offset)) >> (32 - width)
    } else {
        value >> offset
    }
}

fn ubfe(value: u32, offset: u32, width: u32) -> u32 {
    let offset = offset & 0x1f;
    if width == 32 && offset == 0 {
        return value;
    }
    let width = width & 0x1f;
    if width == 0 {
        0
    } else if width + offset < 32 {
        (value << (32 - width - offset)) >> (32 - width)
    } else {
        value >> offset
    }
}

/// Bitfield insert - BFI dst, base, insert, offset, width
fn bfi(mach: &mut Machine, inst: &Instruction) {
    let mut out = [Channel::ZERO; NUM_CHANNELS];
    for chan in inst.write_mask().channels() {
        let base = mach.fetch(inst, 0, chan, DataType::Uint);
        let insert = mach.fetch(inst, 1, chan, DataType::Uint);
        let offset = mach.fetch(inst, 2, chan, DataType::Uint);
        let width = mach.fetch(inst, 3, chan, DataType::Uint);
        for lane in 0..QUAD_SIZE {
            let w = width.u(lane);
            let o = offset.u(lane) & 0x1f;
            let value = if w == 32 {
                insert.u(lane)
            } else {
                let mask = 1u32.wrapping_shl(w).wrapping_sub(1).wrapping_shl(o);
                (insert.u(lane).wrapping_shl(o) & mask) | (base.u(lane) & !mask)
            };
            out[chan].set_u(lane, value);
        }
    }
    mach.store_dst(inst, &out);
}

fn ddx(a: Channel) -> Channel {
    Channel::splat_f(a.f(BOTTOM_RIGHT) - a.f(BOTTOM_LEFT))
}

fn ddy(a: Channel) -> Channel {
    Channel::splat_f(a.f(BOTTOM_LEFT) - a.f(TOP_LEFT))
}

fn ddx_fine(a: Channel) -> Channel {
    let top = a.f(TOP_RIGHT) - a.f(TOP_LEFT);
    let bottom = a.f(BOTTOM_RIGHT) - a.f(BOTTOM_LEFT);
    Channel::from_f([top, top, bottom, bottom])
}

fn ddy_fine(a: Channel) -> Channel {
    let left = a.f(BOTTOM_LEFT) - a.f(TOP_LEFT);
    let right = a.f(BOTTOM_RIGHT) - a.f(TOP_RIGHT);
    Channel::from_f([left, right, left, right])
}

/// Dot product over the first `n` components, broadcast
fn dot(mach: &mut Machine, inst: &Instruction, n: usize) {
    let mut acc = mach
        .fetch(inst, 0, CHAN_X, DataType::Float)
        .zip_f(mach.fetch(inst, 1, CHAN_X, DataType::Float), |x, y| x * y);
    for chan in 1..n {
        let a = mach.fetch(inst, 0, chan, DataType::Float);
        let b = mach.fetch(inst, 1, chan, DataType::Float);
        acc = zip3_f(a, b, acc, |x, y, z| x * y + z);
    }
    mach.store_dst_scalar(inst, &acc);
}

/// Distance vector - DST
fn dst(mach: &mut Machine, inst: &Instruction) {
    let mask = inst.write_mask();
    let mut out = [Channel::splat_f(1.0); NUM_CHANNELS];
    if mask.has(CHAN_Y) {
        let a = mach.fetch(inst, 0, CHAN_Y, DataType::Float);
        let b = mach.fetch(inst, 1, CHAN_Y, DataType::Float);
        out[CHAN_Y] = a.zip_f(b, |x, y| x * y);
    }
    if mask.has(CHAN_Z) {
        out[CHAN_Z] = mach.fetch(inst, 0, CHAN_Z, DataType::Float);
    }
    if mask.has(CHAN_W) {
        out[CHAN_W] = mach.fetch(inst, 1, CHAN_W, DataType::Float);
    }
    mach.store_dst(inst, &out);
}

/// Lighting coefficients - LIT
fn lit(mach: &mut Machine, inst: &Instruction) {
    let mask = inst.write_mask();
    let mut out = [Channel::splat_f(1.0); NUM_CHANNELS];
    if mask.has(CHAN_Y) || mask.has(CHAN_Z) {
        let x = mach.fetch(inst, 0, CHAN_X, DataType::Float);
        if mask.has(CHAN_Z) {
            let y = mach.fetch(inst, 0, CHAN_Y, DataType::Float);
            let w = mach.fetch(inst, 0, CHAN_W, DataType::Float);
            out[CHAN_Z] = zip3_f(x, y, w, |x, y, w| {
                if 0.0 < x {
                    y.max(0.0).powf(w.clamp(-128.0, 128.0))
                } else {
                    0.0
                }
            });
        }
        out[CHAN_Y] = x.map_f(|x| x.max(0.0));
    }
    mach.store_dst(inst, &out);
}

/// Partial-precision exponent - EXP
fn exp(mach: &mut Machine, inst: &Instruction) {
    let x = mach.fetch(inst, 0, CHAN_X, DataType::Float);
    let floor = x.map_f(f32::floor);
    let out = [
        floor.map_f(f32::exp2),
        x.zip_f(floor, |a, b| a - b),
        x.map_f(f32::exp2),
        Channel::splat_f(1.0),
    ];
    mach.store_dst(inst, &out);
}

/// Partial-precision logarithm - LOG
fn log(mach: &mut Machine, inst: &Instruction) {
    let abs = mach.fetch(inst, 0, CHAN_X, DataType::Float).map_f(f32::abs);
    let log = abs.map_f(lg2);
    let floor = log.map_f(f32::floor);
    let out = [
        floor,
        abs.zip_f(floor, |a, e| a / e.exp2()),
        log,
        Channel::splat_f(1.0),
    ];
    mach.store_dst(inst, &out);
}
