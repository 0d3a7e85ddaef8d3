//! Shader jobs
//!
//! A job is a JSON document naming a program, its constants and resources,
//! and either one fragment quad or a compute grid to run it over.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sq_core::{Config, SoftquadError};
use sq_exec::vector::NUM_CHANNELS;
use sq_exec::{
    launch_grid, Buffer, Channel, ConstantBuffer, GridInfo, GridStats, ImageFormat, InterpCoef,
    Machine, Resources, RunStatus, ShaderTokens, ShaderType, Vector, QUAD_SIZE,
};
use sq_sampler::{
    ImageStorage, SamplerState, SamplerView, SoftBuffers, SoftImage, SoftSampler, SoftTexture,
    Swizzle, TextureDesc,
};
use tracing::{debug, info};

/// Per-channel, per-lane values: `[chan][lane]`
pub type QuadValue = [[f32; QUAD_SIZE]; NUM_CHANNELS];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShaderJob {
    pub shader: ShaderTokens,
    /// Constant buffers as float words, bound to slots in order
    #[serde(default)]
    pub constants: Vec<Vec<f32>>,
    #[serde(default)]
    pub textures: Vec<TextureJob>,
    #[serde(default)]
    pub images: Vec<ImageJob>,
    #[serde(default)]
    pub buffers: Vec<BufferJob>,
    #[serde(default)]
    pub quad: Option<QuadJob>,
    #[serde(default)]
    pub grid: Option<GridJob>,
}

/// A texture bound as sampler view and sampler state `unit`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextureJob {
    pub unit: u32,
    pub desc: TextureDesc,
    /// Decoded texels per level, layers (or slices) one after another in
    /// row order
    #[serde(default)]
    pub levels: Vec<Vec<[f32; 4]>>,
    #[serde(default)]
    pub sampler: SamplerState,
    #[serde(default)]
    pub swizzle: Option<[Swizzle; 4]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageJob {
    pub unit: u32,
    pub format: ImageFormat,
    pub width: u32,
    #[serde(default = "one")]
    pub height: u32,
    #[serde(default = "one")]
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferJob {
    pub unit: u32,
    /// Initial contents as little-endian words
    #[serde(default)]
    pub words: Vec<u32>,
    /// Size in bytes; defaults to the size of `words`
    #[serde(default)]
    pub size: Option<usize>,
}

/// One fragment quad. Inputs are either given per lane or interpolated
/// from plane coefficients at `position`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadJob {
    pub inputs: Vec<QuadValue>,
    pub interp: Vec<InterpJob>,
    pub position: [f32; 2],
    pub front_facing: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpJob {
    pub a0: [f32; 4],
    pub dadx: [f32; 4],
    pub dady: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridJob {
    pub block: [u32; 3],
    pub grid: [u32; 3],
    #[serde(default)]
    pub shared_memory: usize,
}

fn one() -> u32 {
    1
}

/// Everything a job produces
#[derive(Debug, Clone, Default, Serialize)]
pub struct JobOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<FragmentOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compute: Option<ComputeOutput>,
    /// Final buffer contents by unit
    pub buffers: Vec<(u32, Vec<u32>)>,
    /// Final image contents by unit
    pub images: Vec<(u32, Vec<[u32; 4]>)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FragmentOutput {
    pub alive_mask: u32,
    /// Raw output bits, `[output][chan][lane]`
    pub outputs: Vec<[[u32; QUAD_SIZE]; NUM_CHANNELS]>,
    /// Outputs reinterpreted as floats
    pub outputs_f32: Vec<QuadValue>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComputeOutput {
    pub blocks: u32,
    pub machines_per_block: u32,
    pub barrier_rounds: u32,
}

impl From<GridStats> for ComputeOutput {
    fn from(stats: GridStats) -> Self {
        Self {
            blocks: stats.blocks,
            machines_per_block: stats.machines_per_block,
            barrier_rounds: stats.barrier_rounds,
        }
    }
}

/// Resource tables built from a job
struct BoundResources {
    sampler: Arc<SoftSampler>,
    images: Arc<SoftImage>,
    buffers: Arc<SoftBuffers>,
}

impl BoundResources {
    fn resources(&self) -> Resources {
        Resources::new()
            .with_sampler(self.sampler.clone())
            .with_image(self.images.clone())
            .with_buffer(self.buffers.clone())
    }
}

impl ShaderJob {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("malformed shader job")
    }

    /// Run the job and collect its outputs
    pub fn run(&self, config: &Config) -> Result<JobOutput> {
        let stage = self.shader.shader_type;
        let bound = self.bind_resources(stage, config)?;
        let mut output = JobOutput::default();

        match stage {
            ShaderType::Compute => {
                let grid = self
                    .grid
                    .as_ref()
                    .ok_or_else(|| SoftquadError::Shader("compute job without a grid".into()))?;
                let info = GridInfo::new(grid.block, grid.grid)
                    .with_shared_memory(grid.shared_memory);
                let resources = bound.resources();
                let stats =
                    launch_grid(&self.shader, &info, &resources, &config.exec, &config.compute)?;
                info!(blocks = stats.blocks, rounds = stats.barrier_rounds, "grid finished");
                output.compute = Some(stats.into());
            }
            _ => output.fragment = Some(self.run_quad(stage, &bound, config)?),
        }

        for job in &self.buffers {
            if let Some(buffer) = bound.buffers.lookup(job.unit) {
                let bytes = buffer.lock();
                let words = bytes
                    .chunks_exact(4)
                    .map(bytemuck::pod_read_unaligned::<u32>)
                    .collect();
                output.buffers.push((job.unit, words));
            }
        }
        for job in &self.images {
            if let Some(image) = bound.images.storage(job.unit) {
                let image = image.read();
                let mut texels = Vec::new();
                for z in 0..image.depth as i32 {
                    for y in 0..image.height as i32 {
                        for x in 0..image.width as i32 {
                            texels.extend(image.load(x, y, z));
                        }
                    }
                }
                output.images.push((job.unit, texels));
            }
        }
        Ok(output)
    }

    fn bind_resources(&self, stage: ShaderType, config: &Config) -> Result<BoundResources> {
        let sampler = Arc::new(SoftSampler::new(stage, config.sampler.clone()));
        for job in &self.textures {
            let texture = job.build()?;
            let mut view = SamplerView::new(Arc::new(texture));
            if let Some(swizzle) = job.swizzle {
                view = view.with_swizzle(swizzle);
            }
            sampler.set_sampler_view(job.unit, Some(view))?;
            sampler.bind_sampler_state(job.unit, Some(job.sampler))?;
        }

        let images = Arc::new(SoftImage::new());
        for job in &self.images {
            let storage = ImageStorage::new(job.format, job.width, job.height, job.depth)?;
            images.bind(job.unit, Some(storage.shared()))?;
        }

        let buffers = Arc::new(SoftBuffers::new());
        for job in &self.buffers {
            let size = job.size.unwrap_or(job.words.len() * 4);
            let buffer = buffers.create(job.unit, size)?;
            let init: &[u8] = bytemuck::cast_slice(&job.words);
            let mut data = buffer.lock();
            let n = init.len().min(data.len());
            data[..n].copy_from_slice(&init[..n]);
        }

        debug!(
            textures = self.textures.len(),
            images = self.images.len(),
            buffers = self.buffers.len(),
            "job resources bound"
        );
        Ok(BoundResources {
            sampler,
            images,
            buffers,
        })
    }

    fn run_quad(
        &self,
        stage: ShaderType,
        bound: &BoundResources,
        config: &Config,
    ) -> Result<FragmentOutput> {
        let quad = self.quad.clone().unwrap_or_default();
        let mut mach = Machine::new(stage, config.exec.clone());
        mach.bind_shader(Some(&self.shader), bound.resources())?;

        let consts: Vec<_> = self
            .constants
            .iter()
            .map(|values| ConstantBuffer::from_f32(values))
            .collect();
        mach.set_constant_buffers(&consts);

        if !quad.interp.is_empty() {
            let coefs = quad
                .interp
                .iter()
                .map(|c| InterpCoef {
                    a0: c.a0,
                    dadx: c.dadx,
                    dady: c.dady,
                })
                .collect();
            mach.set_interp_coefs(coefs);
            let [x, y] = quad.position;
            mach.set_quad_pos(Vector {
                xyzw: [
                    Channel::from_f([x, x + 1.0, x, x + 1.0]),
                    Channel::from_f([y, y, y + 1.0, y + 1.0]),
                    Channel::ZERO,
                    Channel::splat_f(1.0),
                ],
            });
        }
        mach.set_face(if quad.front_facing { 1.0 } else { -1.0 });

        let inputs = mach.inputs_mut();
        if quad.inputs.len() > inputs.len() {
            bail!("job has {} inputs, the machine holds {}", quad.inputs.len(), inputs.len());
        }
        for (slot, value) in inputs.iter_mut().zip(&quad.inputs) {
            *slot = Vector {
                xyzw: (*value).map(Channel::from_f),
            };
        }

        let alive_mask = match mach.run(0)? {
            RunStatus::Finished { alive_mask } => alive_mask,
            RunStatus::Suspended { pc } => {
                return Err(
                    SoftquadError::Shader(format!("fragment program suspended at {pc}")).into()
                );
            }
        };

        let outputs = &mach.outputs()[..mach.num_outputs()];
        Ok(FragmentOutput {
            alive_mask,
            outputs: outputs.iter().map(|v| v.xyzw.map(|c| c.to_u())).collect(),
            outputs_f32: outputs.iter().map(|v| v.xyzw.map(|c| c.to_f())).collect(),
        })
    }
}

impl TextureJob {
    fn build(&self) -> Result<SoftTexture> {
        let mut texture = SoftTexture::new(self.desc)?;
        for (level, texels) in self.levels.iter().enumerate() {
            let level = level as u32;
            let layer_len = (texture.width(level) as usize)
                .checked_mul(texture.height(level) as usize)
                .with_context(|| format!("texture unit {} level {level} is too large", self.unit))?;
            if layer_len == 0 || texels.len() % layer_len != 0 {
                bail!(
                    "texture unit {} level {level}: {} texels is not a whole number of layers",
                    self.unit,
                    texels.len()
                );
            }
            for (z, layer) in texels.chunks_exact(layer_len).enumerate() {
                texture
                    .write_layer(level, z as u32, layer)
                    .with_context(|| format!("texture unit {} level {level}", self.unit))?;
            }
        }
        Ok(texture)
    }
}
