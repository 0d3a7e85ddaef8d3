//! Image, buffer and shared-memory instructions
//!
//! Only lanes that are executing, not helpers and not killed may have side
//! effects. Buffer addresses are byte offsets; out-of-bounds reads return
//! zero and out-of-bounds writes are dropped.

use sq_core::ExecError;
use tracing::trace;

use crate::contracts::{AtomicOp, ImageCoords, ImageParams, SharedBuffer};
use crate::machine::{DataType, Machine};
use crate::tokens::{Instruction, Opcode, RegisterFile};
use crate::vector::{lanes, Channel, CHAN_X, NUM_CHANNELS, QUAD_SIZE};

fn image_params(mach: &Machine, inst: &Instruction, unit: u32) -> ImageParams {
    let info = inst.memory.unwrap_or_default();
    ImageParams {
        unit,
        target: info.texture,
        format: info.format,
        execmask: mach.memory_mask(),
    }
}

fn image_coords(mach: &Machine, inst: &Instruction, src: usize) -> ImageCoords {
    let dim = inst.memory.unwrap_or_default().texture.image_coord_dim();
    let mut r = [[0i32; QUAD_SIZE]; 3];
    for (chan, coord) in r.iter_mut().enumerate().take(dim) {
        *coord = mach.fetch(inst, src, chan, DataType::Int).to_i();
    }
    ImageCoords {
        s: r[0],
        t: r[1],
        r: r[2],
        sample: [0; QUAD_SIZE],
    }
}

fn fetch_vec(mach: &Machine, inst: &Instruction, src: usize) -> [Channel; NUM_CHANNELS] {
    std::array::from_fn(|chan| mach.fetch(inst, src, chan, DataType::Float))
}

/// Storage backing a MEMORY or BUFFER operand
fn membuf(mach: &Machine, file: RegisterFile, unit: u32) -> Option<SharedBuffer> {
    match file {
        RegisterFile::Memory => mach.local_mem.clone(),
        RegisterFile::Buffer => mach.resources.buffer.as_ref()?.lookup(unit),
        _ => None,
    }
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    bytemuck::pod_read_unaligned(&bytes[offset..offset + 4])
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(&value));
}

/// Load - LOAD dst, resource, address
pub fn load(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    let Some(resource) = inst.src.first().copied() else {
        return Ok(());
    };
    let unit = mach.resource_unit(&resource);

    if resource.file == RegisterFile::Image {
        let params = image_params(mach, inst, unit);
        let coords = image_coords(mach, inst, 1);
        let rgba = match &mach.resources.image {
            Some(image) => image.load(&params, &coords),
            None => [Channel::ZERO; NUM_CHANNELS],
        };
        mach.store_dst(inst, &rgba);
        return Ok(());
    }

    let offset = mach.fetch(inst, 1, CHAN_X, DataType::Uint);
    let load_size = (8 - inst.write_mask().bits().leading_zeros() as usize) * 4;
    let mut rgba = [Channel::ZERO; NUM_CHANNELS];

    let mut gather = |bytes: &[u8]| {
        let size = bytes.len();
        for lane in 0..QUAD_SIZE {
            let off = offset.u(lane) as usize;
            if size >= load_size && off <= size - load_size {
                for (chan, value) in rgba.iter_mut().enumerate().take(load_size / 4) {
                    value.set_u(lane, read_u32(bytes, off + chan * 4));
                }
            }
        }
    };

    if resource.file == RegisterFile::Constant {
        if let Some(buf) = mach.consts.get(unit as usize) {
            gather(buf.bytes());
        }
    } else if let Some(buf) = membuf(mach, resource.file, unit) {
        gather(&buf.lock());
    }

    mach.store_dst(inst, &rgba);
    Ok(())
}

/// Store - STORE resource, address, value
pub fn store(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    let Some(dst) = inst.dst.first().copied() else {
        return Ok(());
    };
    let unit = mach.dst_unit(&dst);
    let value = fetch_vec(mach, inst, 1);

    if dst.file == RegisterFile::Image {
        let params = image_params(mach, inst, unit);
        let coords = image_coords(mach, inst, 0);
        if let Some(image) = &mach.resources.image {
            image.store(&params, &coords, &value);
        }
        return Ok(());
    }

    let Some(buf) = membuf(mach, dst.file, unit) else {
        trace!(unit, file = ?dst.file, "store to unbound buffer dropped");
        return Ok(());
    };
    let offset = mach.fetch(inst, 0, CHAN_X, DataType::Uint);
    let mut bytes = buf.lock();
    let size = bytes.len();

    for lane in lanes(mach.memory_mask()) {
        let off = offset.u(lane) as usize;
        if size < off {
            continue;
        }
        let avail = (size - off) / 4;
        for chan in dst.write_mask.channels().filter(|c| *c < avail.min(NUM_CHANNELS)) {
            write_u32(&mut bytes, off + chan * 4, value[chan].u(lane));
        }
    }
    Ok(())
}

fn atomic_op(opcode: Opcode) -> Option<AtomicOp> {
    Some(match opcode {
        Opcode::AtomUadd => AtomicOp::Uadd,
        Opcode::AtomXchg => AtomicOp::Xchg,
        Opcode::AtomCas => AtomicOp::Cas,
        Opcode::AtomAnd => AtomicOp::And,
        Opcode::AtomOr => AtomicOp::Or,
        Opcode::AtomXor => AtomicOp::Xor,
        Opcode::AtomUmin => AtomicOp::Umin,
        Opcode::AtomUmax => AtomicOp::Umax,
        Opcode::AtomImin => AtomicOp::Imin,
        Opcode::AtomImax => AtomicOp::Imax,
        Opcode::AtomFadd => AtomicOp::Fadd,
        _ => return None,
    })
}

/// Atomic read-modify-write - ATOM* dst, resource, address, value[, value2]
///
/// The destination receives the value held before the operation.
pub fn atomic(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    let Some(op) = atomic_op(inst.opcode) else {
        return Ok(());
    };
    let Some(resource) = inst.src.first().copied() else {
        return Ok(());
    };
    let unit = mach.resource_unit(&resource);

    if resource.file == RegisterFile::Image {
        let params = image_params(mach, inst, unit);
        let coords = image_coords(mach, inst, 1);
        let value = fetch_vec(mach, inst, 2);
        let value2 = if op == AtomicOp::Cas {
            fetch_vec(mach, inst, 3)
        } else {
            [Channel::ZERO; NUM_CHANNELS]
        };
        let rgba = match &mach.resources.image {
            Some(image) => image.op(&params, op, &coords, &value, &value2),
            None => [Channel::ZERO; NUM_CHANNELS],
        };
        mach.store_dst(inst, &rgba);
        return Ok(());
    }

    if !inst.write_mask().has(CHAN_X) {
        return Ok(());
    }

    let offset = mach.fetch(inst, 1, CHAN_X, DataType::Uint);
    let mut r0 = mach.fetch(inst, 2, CHAN_X, DataType::Float);
    let r1 = if op == AtomicOp::Cas {
        mach.fetch(inst, 3, CHAN_X, DataType::Float)
    } else {
        Channel::ZERO
    };

    let buf = membuf(mach, resource.file, unit);
    let mut guard = buf.as_ref().map(|b| b.lock());

    // Lanes run one after another so aliasing addresses see each other
    for lane in lanes(mach.memory_mask()) {
        let mut old = 0;
        if let Some(bytes) = guard.as_deref_mut() {
            let off = offset.u(lane) as usize;
            if bytes.len() >= 4 && off <= bytes.len() - 4 {
                old = read_u32(bytes, off);
                write_u32(bytes, off, op.apply(old, r0.u(lane), r1.u(lane)));
            }
        }
        r0.set_u(lane, old);
    }
    drop(guard);

    let Some(dst) = inst.dst.first().copied() else {
        return Ok(());
    };
    for chan in 0..NUM_CHANNELS {
        mach.store(&r0, &dst, inst.saturate, chan);
    }
    Ok(())
}

/// Resource size query - RESQ dst, resource
pub fn resq(mach: &mut Machine, inst: &Instruction) -> Result<(), ExecError> {
    let Some(resource) = inst.src.first().copied() else {
        return Ok(());
    };
    let unit = mach.resource_unit(&resource);

    if resource.file == RegisterFile::Image {
        let params = image_params(mach, inst, unit);
        let dims = match &mach.resources.image {
            Some(image) => image.get_dims(&params),
            None => [0; 4],
        };
        mach.store_dst(inst, &dims.map(Channel::splat_i));
        return Ok(());
    }

    let size = membuf(mach, resource.file, unit)
        .map(|b| b.lock().len())
        .unwrap_or(0);
    if inst.write_mask().has(CHAN_X) {
        if let Some(dst) = inst.dst.first().copied() {
            mach.store(&Channel::splat_u(size as u32), &dst, inst.saturate, CHAN_X);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{shared_buffer, Buffer, Resources};
    use crate::machine::ConstantBuffer;
    use crate::tokens::{DstRegister, ShaderTokens, ShaderType, SrcRegister, Token, WriteMask};
    use sq_core::ExecConfig;
    use std::sync::Arc;

    struct OneBuffer(SharedBuffer);

    impl Buffer for OneBuffer {
        fn lookup(&self, unit: u32) -> Option<SharedBuffer> {
            (unit == 0).then(|| self.0.clone())
        }
    }

    fn ssbo(dst: i32) -> SrcRegister {
        SrcRegister::new(RegisterFile::Buffer, dst)
    }

    fn machine(tokens: Vec<Token>, buf: &SharedBuffer) -> Machine {
        let program = ShaderTokens {
            shader_type: ShaderType::Compute,
            tokens,
        };
        let mut mach = Machine::new(ShaderType::Compute, ExecConfig::default());
        mach.bind_shader(
            Some(&program),
            Resources::new().with_buffer(Arc::new(OneBuffer(buf.clone()))),
        )
        .unwrap();
        mach
    }

    #[test]
    fn test_atomic_add_aliasing_lanes() {
        let buf = shared_buffer(16);
        let mut mach = machine(
            vec![
                Token::imm_i([4, 1, 0, 0]),
                Token::Instruction(
                    Instruction::new(Opcode::AtomUadd)
                        .dst(DstRegister::temp(0))
                        .src(ssbo(0))
                        .src(SrcRegister::imm(0).scalar(0))
                        .src(SrcRegister::imm(0).scalar(1)),
                ),
            ],
            &buf,
        );
        mach.run(0).unwrap();
        assert_eq!(read_u32(&buf.lock(), 4), 4);
        // Each lane sees the value left by the previous one
        assert_eq!(mach.temp(0).unwrap().xyzw[0].to_u(), [0, 1, 2, 3]);
        assert_eq!(mach.temp(0).unwrap().xyzw[3].to_u(), [0, 1, 2, 3]);
    }

    #[test]
    fn test_store_respects_bounds_and_mask() {
        let buf = shared_buffer(8);
        let mut mach = machine(
            vec![
                Token::imm_i([4, 7, 8, 9]),
                Token::Instruction(
                    Instruction::new(Opcode::Store)
                        .dst(DstRegister::new(RegisterFile::Buffer, 0).with_mask(WriteMask::XYZ))
                        .src(SrcRegister::imm(0).scalar(0))
                        .src(SrcRegister::imm(0).with_swizzle([1, 2, 3, 3])),
                ),
            ],
            &buf,
        );
        mach.run(0).unwrap();
        let bytes = buf.lock();
        assert_eq!(read_u32(&bytes, 0), 0);
        // Only one dword fits after offset 4
        assert_eq!(read_u32(&bytes, 4), 7);
    }

    #[test]
    fn test_load_constant_buffer_out_of_range_is_zero() {
        let buf = shared_buffer(0);
        let mut mach = machine(
            vec![
                Token::imm_i([4, 12, 0, 0]),
                Token::Instruction(
                    Instruction::new(Opcode::Load)
                        .dst(DstRegister::temp(0).with_mask(WriteMask::XY))
                        .src(SrcRegister::constant(0))
                        .src(SrcRegister::imm(0).scalar(0)),
                ),
                Token::Instruction(
                    Instruction::new(Opcode::Load)
                        .dst(DstRegister::temp(1).with_mask(WriteMask::XY))
                        .src(SrcRegister::constant(0))
                        .src(SrcRegister::imm(0).scalar(1)),
                ),
            ],
            &buf,
        );
        mach.set_constant_buffers(&[ConstantBuffer::from_words(vec![10, 11, 12, 13])]);
        mach.run(0).unwrap();
        assert_eq!(mach.temp(0).unwrap().xyzw[0].to_u(), [11; 4]);
        assert_eq!(mach.temp(0).unwrap().xyzw[1].to_u(), [12; 4]);
        assert_eq!(mach.temp(1).unwrap().xyzw[0].to_u(), [0; 4]);
    }

    #[test]
    fn test_resq_buffer_size() {
        let buf = shared_buffer(64);
        let mut mach = machine(
            vec![Token::Instruction(
                Instruction::new(Opcode::Resq)
                    .dst(DstRegister::temp(0))
                    .src(ssbo(0)),
            )],
            &buf,
        );
        mach.run(0).unwrap();
        assert_eq!(mach.temp(0).unwrap().xyzw[0].to_u(), [64; 4]);
    }
}
