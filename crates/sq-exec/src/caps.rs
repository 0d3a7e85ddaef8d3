//! Shader capability limits
//!
//! Static answers to "what does this interpreter support". The values
//! mirror the register file sizes and stack depths of [`Machine`].
//!
//! [`Machine`]: crate::machine::Machine

use serde::{Deserialize, Serialize};

use crate::machine::{MAX_CONST_BUFFERS, MAX_INPUTS, MAX_OUTPUTS, MAX_SAMPLER_VIEWS, NUM_TEMPS};
use crate::stacks::MAX_NESTING;

/// Maximum number of sampler states per stage
pub const MAX_SAMPLERS: usize = 32;
/// Maximum shader storage buffers per stage
pub const MAX_SHADER_BUFFERS: usize = 32;
/// Maximum shader images per stage
pub const MAX_SHADER_IMAGES: usize = 64;
/// Size in bytes of one constant buffer
pub const MAX_CONST_BUFFER_SIZE: usize = 65536;

/// Capability queried by a front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderCap {
    MaxInstructions,
    MaxInputs,
    MaxOutputs,
    MaxConstBuffers,
    MaxConstBufferSize,
    MaxTemps,
    MaxControlFlowDepth,
    ContSupported,
    IndirectTempAddr,
    IndirectConstAddr,
    Subroutines,
    Integers,
    MaxTextureSamplers,
    MaxSamplerViews,
    MaxShaderBuffers,
    MaxShaderImages,
    SqrtSupported,
    Int64,
    Doubles,
}

impl ShaderCap {
    pub const ALL: [ShaderCap; 19] = [
        ShaderCap::MaxInstructions,
        ShaderCap::MaxInputs,
        ShaderCap::MaxOutputs,
        ShaderCap::MaxConstBuffers,
        ShaderCap::MaxConstBufferSize,
        ShaderCap::MaxTemps,
        ShaderCap::MaxControlFlowDepth,
        ShaderCap::ContSupported,
        ShaderCap::IndirectTempAddr,
        ShaderCap::IndirectConstAddr,
        ShaderCap::Subroutines,
        ShaderCap::Integers,
        ShaderCap::MaxTextureSamplers,
        ShaderCap::MaxSamplerViews,
        ShaderCap::MaxShaderBuffers,
        ShaderCap::MaxShaderImages,
        ShaderCap::SqrtSupported,
        ShaderCap::Int64,
        ShaderCap::Doubles,
    ];
}

/// Integer limit for `cap`
pub fn shader_cap(cap: ShaderCap) -> i32 {
    match cap {
        ShaderCap::MaxInstructions => i32::MAX,
        ShaderCap::MaxInputs => MAX_INPUTS as i32,
        ShaderCap::MaxOutputs => MAX_OUTPUTS as i32,
        ShaderCap::MaxConstBuffers => MAX_CONST_BUFFERS as i32,
        ShaderCap::MaxConstBufferSize => MAX_CONST_BUFFER_SIZE as i32,
        ShaderCap::MaxTemps => NUM_TEMPS as i32,
        ShaderCap::MaxControlFlowDepth => MAX_NESTING as i32,
        ShaderCap::ContSupported
        | ShaderCap::IndirectTempAddr
        | ShaderCap::IndirectConstAddr
        | ShaderCap::Subroutines
        | ShaderCap::Integers
        | ShaderCap::SqrtSupported => 1,
        ShaderCap::MaxTextureSamplers => MAX_SAMPLERS as i32,
        ShaderCap::MaxSamplerViews => MAX_SAMPLER_VIEWS as i32,
        ShaderCap::MaxShaderBuffers => MAX_SHADER_BUFFERS as i32,
        ShaderCap::MaxShaderImages => MAX_SHADER_IMAGES as i32,
        ShaderCap::Int64 | ShaderCap::Doubles => 0,
    }
}
