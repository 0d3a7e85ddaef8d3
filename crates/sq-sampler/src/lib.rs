//! Software texture sampling for softquad
//!
//! Implements the execution machine's resource contracts:
//! - [`SoftSampler`]: filtered sampling, texel fetch, size and LOD queries
//! - [`SoftImage`]: image load/store/atomics
//! - [`SoftBuffers`]: shader storage buffers
//!
//! Sampler states are compiled into enum-tagged wrap, filter and mip
//! strategies when bound, so the per-quad path only dispatches on tags.

pub mod buffer;
pub mod compare;
pub mod cube;
pub mod ewa;
pub mod filter;
pub mod image;
pub mod lod;
pub mod mip;
pub mod sampler;
pub mod state;
pub mod swizzle;
pub mod texture;
pub mod view;
pub mod wrap;

pub use buffer::{SoftBuffers, MAX_SHADER_BUFFERS};
pub use filter::ImageFilter;
pub use image::{ImageStorage, SharedImage, SoftImage, MAX_SHADER_IMAGES};
pub use mip::MipStrategy;
pub use sampler::{SoftSampler, MAX_SAMPLERS, MAX_SAMPLER_VIEWS};
pub use state::{CompareFunc, CompiledSampler, FilterMode, MipFilterMode, SamplerState};
pub use swizzle::Swizzle;
pub use texture::{ResourceTarget, SoftTexture, TexelFormat, TextureDesc};
pub use view::{PreparedView, SamplerView};
pub use wrap::WrapMode;
