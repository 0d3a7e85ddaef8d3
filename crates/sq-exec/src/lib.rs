//! Quad SIMD shader execution for softquad
//!
//! Executes tokenized shader programs four lanes at a time:
//! - 4096 temporaries, 32 inputs/outputs, 16 constant buffers
//! - mask-driven divergent control flow with bounded stacks
//! - texture, image and buffer access through resource traits
//! - cooperative compute barriers across quads of a workgroup

pub mod caps;
pub mod compute;
pub mod contracts;
pub mod instructions;
pub mod interpreter;
pub mod machine;
pub mod stacks;
pub mod tokens;
pub mod vector;

pub use caps::{shader_cap, ShaderCap};
pub use compute::{launch_grid, GridInfo, GridStats};
pub use contracts::{
    shared_buffer, AtomicOp, Buffer, Derivatives, Image, ImageCoords, ImageParams, QuadRgba,
    Resources, SampleCoords, Sampler, SamplerControl, SharedBuffer,
};
pub use machine::{ConstantBuffer, InterpCoef, Machine, MaskState, RunStatus, StackDepths};
pub use tokens::{
    Declaration, DstRegister, ImageFormat, Instruction, Interpolation, Opcode, RegisterFile,
    ReturnType, Semantic, ShaderTokens, ShaderType, SrcRegister, TextureTarget, Token, WriteMask,
};
pub use vector::{Channel, Vector, ALL_LANES, QUAD_SIZE};
