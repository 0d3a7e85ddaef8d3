//! Sampler state objects

use serde::{Deserialize, Serialize};
use sq_core::SamplerConfig;
use tracing::debug;

use crate::mip::MipStrategy;
use crate::wrap::{LinearWrap, NearestWrap, WrapMode};

/// Image (within one level) filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterMode {
    Nearest,
    Linear,
}

impl Default for FilterMode {
    fn default() -> Self {
        Self::Nearest
    }
}

/// Filter between mip levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MipFilterMode {
    None,
    Nearest,
    Linear,
}

impl Default for MipFilterMode {
    fn default() -> Self {
        Self::None
    }
}

/// Shadow compare function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LEqual,
    Greater,
    NotEqual,
    GEqual,
    Always,
}

impl Default for CompareFunc {
    fn default() -> Self {
        Self::Never
    }
}

impl CompareFunc {
    /// Compare the reference value `pc` against texel value `tex`
    #[inline]
    pub fn test(self, pc: f32, tex: f32) -> bool {
        match self {
            Self::Less => pc < tex,
            Self::LEqual => pc <= tex,
            Self::Greater => pc > tex,
            Self::GEqual => pc >= tex,
            Self::Equal => pc == tex,
            Self::NotEqual => pc != tex,
            Self::Always => true,
            Self::Never => false,
        }
    }
}

/// Sampler state as bound by the application
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerState {
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub wrap_r: WrapMode,
    pub min_img_filter: FilterMode,
    pub mag_img_filter: FilterMode,
    pub min_mip_filter: MipFilterMode,
    /// Texel-space coordinates instead of [0, 1]
    pub unnormalized_coords: bool,
    pub compare_mode: bool,
    pub compare_func: CompareFunc,
    pub seamless_cube_map: bool,
    pub lod_bias: f32,
    pub min_lod: f32,
    pub max_lod: f32,
    /// 1 disables anisotropic filtering
    pub max_anisotropy: f32,
    pub border_color: [f32; 4],
}

impl Default for SamplerState {
    fn default() -> Self {
        Self {
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::Repeat,
            wrap_r: WrapMode::Repeat,
            min_img_filter: FilterMode::Nearest,
            mag_img_filter: FilterMode::Nearest,
            min_mip_filter: MipFilterMode::None,
            unnormalized_coords: false,
            compare_mode: false,
            compare_func: CompareFunc::Never,
            seamless_cube_map: false,
            lod_bias: 0.0,
            min_lod: 0.0,
            max_lod: 1000.0,
            max_anisotropy: 1.0,
            border_color: [0.0; 4],
        }
    }
}

impl SamplerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, min: FilterMode, mag: FilterMode, mip: MipFilterMode) -> Self {
        self.min_img_filter = min;
        self.mag_img_filter = mag;
        self.min_mip_filter = mip;
        self
    }

    pub fn with_wrap(mut self, s: WrapMode, t: WrapMode, r: WrapMode) -> Self {
        self.wrap_s = s;
        self.wrap_t = t;
        self.wrap_r = r;
        self
    }

    /// Set anisotropy level (clamped to 1.0-16.0)
    pub fn with_anisotropy(mut self, level: f32) -> Self {
        self.max_anisotropy = level.clamp(1.0, 16.0);
        self
    }

    pub fn with_lod_bias(mut self, bias: f32) -> Self {
        self.lod_bias = bias;
        self
    }

    pub fn with_lod_range(mut self, min_lod: f32, max_lod: f32) -> Self {
        self.min_lod = min_lod;
        self.max_lod = max_lod;
        self
    }

    pub fn with_compare(mut self, func: CompareFunc) -> Self {
        self.compare_mode = true;
        self.compare_func = func;
        self
    }

    pub fn with_border_color(mut self, color: [f32; 4]) -> Self {
        self.border_color = color;
        self
    }

    pub fn with_seamless_cube_map(mut self, seamless: bool) -> Self {
        self.seamless_cube_map = seamless;
        self
    }

    pub fn with_unnormalized_coords(mut self) -> Self {
        self.unnormalized_coords = true;
        self
    }
}

/// Sampler state with its wrap functions and mip strategy resolved
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompiledSampler {
    pub base: SamplerState,
    /// Per axis (s, t, r)
    pub nearest_wrap: [NearestWrap; 3],
    pub linear_wrap: [LinearWrap; 3],
    /// Minification filter actually used; forced to nearest for EWA
    pub min_img_filter: FilterMode,
    pub mip: MipStrategy,
    pub min_mag_equal: bool,
    pub min_mag_equal_repeat_linear: bool,
}

impl CompiledSampler {
    pub fn compile(state: &SamplerState, config: &SamplerConfig) -> Self {
        let mut base = *state;
        base.max_anisotropy = base.max_anisotropy.min(config.max_anisotropy_cap);
        base.seamless_cube_map |= config.seamless_cube_default;

        let unnorm = base.unnormalized_coords;
        let wraps = [base.wrap_s, base.wrap_t, base.wrap_r];
        let nearest_wrap = wraps.map(|w| NearestWrap::select(w, unnorm));
        let linear_wrap = wraps.map(|w| LinearWrap::select(w, unnorm));

        let mut min_img_filter = base.min_img_filter;
        let mut min_mag_equal_repeat_linear = false;
        let mip = match base.min_mip_filter {
            MipFilterMode::None => {
                if base.min_img_filter == base.mag_img_filter {
                    MipStrategy::NoneNoFilterSelect
                } else {
                    MipStrategy::None
                }
            }
            MipFilterMode::Nearest => MipStrategy::Nearest,
            MipFilterMode::Linear => {
                min_mag_equal_repeat_linear = base.min_img_filter == base.mag_img_filter
                    && !unnorm
                    && base.wrap_s == WrapMode::Repeat
                    && base.wrap_t == WrapMode::Repeat
                    && base.min_img_filter == FilterMode::Linear
                    && base.max_anisotropy <= 1.0;
                if base.max_anisotropy > 1.0 {
                    // EWA weights individual texels
                    min_img_filter = FilterMode::Nearest;
                    MipStrategy::LinearAniso
                } else {
                    MipStrategy::Linear
                }
            }
        };
        let min_mag_equal = min_img_filter == base.mag_img_filter;

        debug!(?mip, ?min_img_filter, min_mag_equal, "compiled sampler state");
        Self {
            base,
            nearest_wrap,
            linear_wrap,
            min_img_filter,
            mip,
            min_mag_equal,
            min_mag_equal_repeat_linear,
        }
    }
}
