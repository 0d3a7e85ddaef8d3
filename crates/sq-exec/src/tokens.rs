//! Shader token model
//!
//! The execution machine consumes an already-compiled program: a flat
//! list of declarations, immediates and instructions. Tokens are plain
//! serde types so that programs can be stored as JSON.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Shader stage a program is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ShaderType {
    Vertex,
    #[default]
    Fragment,
    Compute,
}

/// Register file an operand lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum RegisterFile {
    #[default]
    Null,
    Constant,
    Input,
    Output,
    Temporary,
    Sampler,
    SamplerView,
    Address,
    Immediate,
    SystemValue,
    Image,
    Buffer,
    /// Workgroup-shared memory
    Memory,
}

/// Source channel selector, one entry per destination channel (0=x..3=w)
pub type Swizzle = [u8; 4];

pub const SWIZZLE_XYZW: Swizzle = [0, 1, 2, 3];

bitflags! {
    /// Destination channel write mask
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct WriteMask: u8 {
        const X = 0b0001;
        const Y = 0b0010;
        const Z = 0b0100;
        const W = 0b1000;

        const XY = Self::X.bits() | Self::Y.bits();
        const XYZ = Self::X.bits() | Self::Y.bits() | Self::Z.bits();
        const XYZW = Self::X.bits() | Self::Y.bits() | Self::Z.bits() | Self::W.bits();
    }
}

impl WriteMask {
    /// Whether channel `chan` (0..4) is written
    pub fn has(&self, chan: usize) -> bool {
        self.bits() & (1 << chan) != 0
    }

    /// Iterate over the written channel indices
    pub fn channels(self) -> impl Iterator<Item = usize> {
        (0..4).filter(move |c| self.has(*c))
    }
}

impl Default for WriteMask {
    fn default() -> Self {
        Self::XYZW
    }
}

/// Indirect addressing: `file[index].swizzle` is added to the register index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndirectRef {
    #[serde(default = "default_address_file")]
    pub file: RegisterFile,
    pub index: i32,
    #[serde(default)]
    pub swizzle: u8,
}

fn default_address_file() -> RegisterFile {
    RegisterFile::Address
}

/// Second register subscript (constant buffer slot, vertex index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub index: i32,
    #[serde(default)]
    pub indirect: Option<IndirectRef>,
}

/// Source operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SrcRegister {
    pub file: RegisterFile,
    pub index: i32,
    #[serde(default = "default_swizzle")]
    pub swizzle: Swizzle,
    #[serde(default)]
    pub negate: bool,
    #[serde(default)]
    pub absolute: bool,
    #[serde(default)]
    pub indirect: Option<IndirectRef>,
    #[serde(default)]
    pub dimension: Option<Dimension>,
}

fn default_swizzle() -> Swizzle {
    SWIZZLE_XYZW
}

impl SrcRegister {
    pub fn new(file: RegisterFile, index: i32) -> Self {
        Self {
            file,
            index,
            swizzle: SWIZZLE_XYZW,
            negate: false,
            absolute: false,
            indirect: None,
            dimension: None,
        }
    }

    pub fn temp(index: i32) -> Self {
        Self::new(RegisterFile::Temporary, index)
    }

    pub fn imm(index: i32) -> Self {
        Self::new(RegisterFile::Immediate, index)
    }

    pub fn input(index: i32) -> Self {
        Self::new(RegisterFile::Input, index)
    }

    pub fn constant(index: i32) -> Self {
        Self::new(RegisterFile::Constant, index)
    }

    pub fn sampler(unit: i32) -> Self {
        Self::new(RegisterFile::Sampler, unit)
    }

    /// Set the swizzle
    pub fn with_swizzle(mut self, swizzle: Swizzle) -> Self {
        self.swizzle = swizzle;
        self
    }

    /// Replicate a single source channel into all four
    pub fn scalar(self, chan: u8) -> Self {
        self.with_swizzle([chan; 4])
    }

    pub fn with_negate(mut self) -> Self {
        self.negate = true;
        self
    }

    pub fn with_absolute(mut self) -> Self {
        self.absolute = true;
        self
    }

    pub fn with_indirect(mut self, index: i32, swizzle: u8) -> Self {
        self.indirect = Some(IndirectRef {
            file: RegisterFile::Address,
            index,
            swizzle,
        });
        self
    }

    pub fn with_dimension(mut self, index: i32) -> Self {
        self.dimension = Some(Dimension {
            index,
            indirect: None,
        });
        self
    }

    /// Source channel feeding destination channel `chan`
    pub fn swizzle_for(&self, chan: usize) -> usize {
        self.swizzle[chan] as usize
    }
}

/// Destination operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DstRegister {
    pub file: RegisterFile,
    pub index: i32,
    #[serde(default)]
    pub write_mask: WriteMask,
    #[serde(default)]
    pub indirect: Option<IndirectRef>,
    #[serde(default)]
    pub dimension: Option<Dimension>,
}

impl DstRegister {
    pub fn new(file: RegisterFile, index: i32) -> Self {
        Self {
            file,
            index,
            write_mask: WriteMask::XYZW,
            indirect: None,
            dimension: None,
        }
    }

    pub fn temp(index: i32) -> Self {
        Self::new(RegisterFile::Temporary, index)
    }

    pub fn output(index: i32) -> Self {
        Self::new(RegisterFile::Output, index)
    }

    pub fn address(index: i32) -> Self {
        Self::new(RegisterFile::Address, index)
    }

    pub fn with_mask(mut self, write_mask: WriteMask) -> Self {
        self.write_mask = write_mask;
        self
    }

    pub fn with_indirect(mut self, index: i32, swizzle: u8) -> Self {
        self.indirect = Some(IndirectRef {
            file: RegisterFile::Address,
            index,
            swizzle,
        });
        self
    }
}

/// Texture shape an instruction operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TextureTarget {
    Buffer,
    Tex1D,
    #[default]
    Tex2D,
    Tex3D,
    Cube,
    Rect,
    Shadow1D,
    Shadow2D,
    ShadowRect,
    Tex1DArray,
    Tex2DArray,
    Shadow1DArray,
    Shadow2DArray,
    ShadowCube,
    CubeArray,
    ShadowCubeArray,
}

impl TextureTarget {
    /// Number of coordinate components, including the array layer
    pub fn coord_dim(&self) -> usize {
        match self {
            Self::Buffer | Self::Tex1D | Self::Shadow1D => 1,
            Self::Tex2D
            | Self::Rect
            | Self::Tex1DArray
            | Self::Shadow1DArray
            | Self::Shadow2D
            | Self::ShadowRect => 2,
            Self::Tex3D
            | Self::Cube
            | Self::Tex2DArray
            | Self::ShadowCube
            | Self::Shadow2DArray => 3,
            Self::CubeArray | Self::ShadowCubeArray => 4,
        }
    }

    /// Argument slot (s, t, p, c0, c1) holding the depth reference
    pub fn shadow_ref(&self) -> Option<usize> {
        match self {
            Self::Shadow1D | Self::Shadow2D | Self::ShadowRect | Self::Shadow1DArray => Some(2),
            Self::ShadowCube | Self::Shadow2DArray => Some(3),
            Self::ShadowCubeArray => Some(4),
            _ => None,
        }
    }

    /// Image coordinate count for LOAD/STORE/ATOM
    pub fn image_coord_dim(&self) -> usize {
        match self {
            Self::Buffer | Self::Tex1D | Self::Shadow1D => 1,
            Self::Tex2D
            | Self::Rect
            | Self::Tex1DArray
            | Self::Shadow1DArray
            | Self::Shadow2D
            | Self::ShadowRect => 2,
            _ => 3,
        }
    }
}

/// Constant texel offset operand (TexOffsets[0])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TexOffset {
    pub file: RegisterFile,
    pub index: i32,
    pub swizzle: [u8; 3],
}

/// Texture instruction extension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TextureInfo {
    pub target: TextureTarget,
    #[serde(default)]
    pub offsets: Vec<TexOffset>,
}

/// Storage format of an image view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ImageFormat {
    R32Float,
    #[default]
    R32Uint,
    R32Sint,
    Rgba32Float,
    Rgba32Uint,
    Rgba32Sint,
    Rgba8Unorm,
}

impl ImageFormat {
    pub fn channels(&self) -> usize {
        match self {
            Self::R32Float | Self::R32Uint | Self::R32Sint => 1,
            _ => 4,
        }
    }

    /// Bytes per texel
    pub fn block_size(&self) -> usize {
        match self {
            Self::R32Float | Self::R32Uint | Self::R32Sint | Self::Rgba8Unorm => 4,
            Self::Rgba32Float | Self::Rgba32Uint | Self::Rgba32Sint => 16,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::R32Uint | Self::R32Sint | Self::Rgba32Uint | Self::Rgba32Sint
        )
    }
}

/// Memory instruction extension (LOAD/STORE/ATOM*/RESQ on images)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MemoryInfo {
    pub texture: TextureTarget,
    #[serde(default)]
    pub format: ImageFormat,
}

/// Opcodes understood by the interpreter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    // Flow control
    Nop,
    End,
    If,
    Uif,
    Else,
    Endif,
    Bgnloop,
    Endloop,
    Brk,
    Cont,
    Switch,
    Case,
    Default,
    Endswitch,
    Cal,
    Ret,
    Bgnsub,
    Endsub,
    Kill,
    KillIf,
    Barrier,
    Membar,

    // Float arithmetic
    Mov,
    Arl,
    Arr,
    Uarl,
    Add,
    Sub,
    Mul,
    Div,
    Mad,
    Fma,
    Lrp,
    Dp2,
    Dp3,
    Dp4,
    Dst,
    Lit,
    Exp,
    Log,
    Min,
    Max,
    Slt,
    Sge,
    Sgt,
    Sle,
    Seq,
    Sne,
    Ssg,
    Cmp,
    Ucmp,
    Rcp,
    Rsq,
    Sqrt,
    Ex2,
    Lg2,
    Pow,
    Frc,
    Flr,
    Ceil,
    Rnd,
    Trunc,
    Sin,
    Cos,
    Ddx,
    Ddy,
    DdxFine,
    DdyFine,

    // Conversion and integer
    F2i,
    F2u,
    I2f,
    U2f,
    Uadd,
    Umul,
    Umad,
    Idiv,
    Udiv,
    Mod,
    Umod,
    Imax,
    Imin,
    Umax,
    Umin,
    Ineg,
    Iabs,
    Issg,
    Shl,
    Ishr,
    Ushr,
    And,
    Or,
    Xor,
    Not,
    Fseq,
    Fsne,
    Fslt,
    Fsge,
    Useq,
    Usne,
    Uslt,
    Usge,
    Islt,
    Isge,
    ImulHi,
    UmulHi,
    Ibfe,
    Ubfe,
    Bfi,
    Brev,
    Popc,
    Lsb,
    Imsb,
    Umsb,
    Ldexp,

    // Texture
    Tex,
    Txp,
    Txb,
    Txl,
    TexLz,
    Txd,
    Txf,
    Txq,
    Tg4,
    Lodq,
    Tex2,
    Txb2,
    Txl2,

    // Memory
    Load,
    Store,
    Resq,
    AtomUadd,
    AtomXchg,
    AtomCas,
    AtomAnd,
    AtomOr,
    AtomXor,
    AtomUmin,
    AtomUmax,
    AtomImin,
    AtomImax,
    AtomFadd,
}

impl Opcode {
    /// Minimum (destination, source) operand counts
    pub fn operand_counts(&self) -> (usize, usize) {
        use Opcode::*;
        match self {
            Nop | End | Else | Endif | Bgnloop | Endloop | Brk | Cont | Default | Endswitch
            | Cal | Ret | Bgnsub | Endsub | Kill | Barrier | Membar => (0, 0),
            If | Uif | Switch | Case | KillIf => (0, 1),

            Mov | Arl | Arr | Uarl | Rcp | Rsq | Sqrt | Ex2 | Lg2 | Frc | Flr | Ceil | Rnd
            | Trunc | Sin | Cos | Ddx | Ddy | DdxFine | DdyFine | F2i | F2u | I2f | U2f
            | Ineg | Iabs | Issg | Ssg | Not | Exp | Log | Lit | Brev | Popc | Lsb | Imsb
            | Umsb => (1, 1),

            Add | Sub | Mul | Div | Dp2 | Dp3 | Dp4 | Dst | Min | Max | Slt | Sge | Sgt | Sle | Seq
            | Sne | Pow | Uadd | Umul | Idiv | Udiv | Mod | Umod | Imax | Imin | Umax | Umin
            | Shl | Ishr | Ushr | And | Or | Xor | Fseq | Fsne | Fslt | Fsge | Useq | Usne
            | Uslt | Usge | Islt | Isge | ImulHi | UmulHi | Ldexp => (1, 2),

            Mad | Fma | Lrp | Cmp | Ucmp | Umad | Ibfe | Ubfe => (1, 3),
            Bfi => (1, 4),

            Tex | Txp | Txb | Txl | TexLz | Txf | Txq | Lodq => (1, 2),
            Tg4 | Tex2 | Txb2 | Txl2 => (1, 3),
            Txd => (1, 4),

            Load | Store => (1, 2),
            Resq => (1, 1),
            AtomCas => (1, 4),
            AtomUadd | AtomXchg | AtomAnd | AtomOr | AtomXor | AtomUmin | AtomUmax
            | AtomImin | AtomImax | AtomFadd => (1, 3),
        }
    }

    /// Instructions whose `label` is a jump target
    pub fn has_label(&self) -> bool {
        matches!(self, Opcode::If | Opcode::Uif | Opcode::Else | Opcode::Cal)
    }

    pub fn is_texture(&self) -> bool {
        use Opcode::*;
        matches!(
            self,
            Tex | Txp | Txb | Txl | TexLz | Txd | Txf | Txq | Tg4 | Lodq | Tex2 | Txb2 | Txl2
        )
    }

    pub fn is_atomic(&self) -> bool {
        use Opcode::*;
        matches!(
            self,
            AtomUadd
                | AtomXchg
                | AtomCas
                | AtomAnd
                | AtomOr
                | AtomXor
                | AtomUmin
                | AtomUmax
                | AtomImin
                | AtomImax
                | AtomFadd
        )
    }
}

/// A fully decoded instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: Opcode,
    #[serde(default)]
    pub saturate: bool,
    #[serde(default)]
    pub dst: Vec<DstRegister>,
    #[serde(default)]
    pub src: Vec<SrcRegister>,
    /// Jump target (instruction index) for IF/UIF/ELSE/CAL
    #[serde(default)]
    pub label: Option<u32>,
    #[serde(default)]
    pub texture: Option<TextureInfo>,
    #[serde(default)]
    pub memory: Option<MemoryInfo>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            saturate: false,
            dst: Vec::new(),
            src: Vec::new(),
            label: None,
            texture: None,
            memory: None,
        }
    }

    pub fn dst(mut self, dst: DstRegister) -> Self {
        self.dst.push(dst);
        self
    }

    pub fn src(mut self, src: SrcRegister) -> Self {
        self.src.push(src);
        self
    }

    pub fn label(mut self, label: u32) -> Self {
        self.label = Some(label);
        self
    }

    pub fn saturate(mut self) -> Self {
        self.saturate = true;
        self
    }

    pub fn texture(mut self, target: TextureTarget) -> Self {
        self.texture = Some(TextureInfo {
            target,
            offsets: Vec::new(),
        });
        self
    }

    pub fn tex_offset(mut self, offset: TexOffset) -> Self {
        self.texture.get_or_insert_with(TextureInfo::default).offsets.push(offset);
        self
    }

    pub fn memory(mut self, texture: TextureTarget, format: ImageFormat) -> Self {
        self.memory = Some(MemoryInfo { texture, format });
        self
    }

    /// Texture target, defaulting to 2D when the extension is missing
    pub fn texture_target(&self) -> TextureTarget {
        self.texture.as_ref().map(|t| t.target).unwrap_or_default()
    }

    pub fn write_mask(&self) -> WriteMask {
        self.dst.first().map(|d| d.write_mask).unwrap_or(WriteMask::empty())
    }
}

/// Semantic attached to inputs, outputs and system values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Semantic {
    Position,
    Color,
    Generic,
    Face,
    PrimId,
    InstanceId,
    VertexId,
    ThreadId,
    BlockId,
    BlockSize,
    GridSize,
    SampleId,
    SampleMask,
    HelperInvocation,
    Texcoord,
}

impl Semantic {
    pub const COUNT: usize = 15;
}

/// Declared semantic of a register range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticDecl {
    pub name: Semantic,
    #[serde(default)]
    pub index: u32,
}

/// Fragment input interpolation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Interpolation {
    Constant,
    Linear,
    #[default]
    Perspective,
    Color,
}

/// Kind of value a sampler view returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ReturnType {
    #[default]
    Float,
    Sint,
    Uint,
}

/// SAMPLER_VIEW declaration payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SamplerViewDecl {
    pub target: TextureTarget,
    #[serde(default)]
    pub return_type: ReturnType,
}

/// Register range declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub file: RegisterFile,
    pub first: u32,
    pub last: u32,
    #[serde(default = "default_usage_mask")]
    pub usage_mask: u8,
    #[serde(default)]
    pub semantic: Option<SemanticDecl>,
    #[serde(default)]
    pub interpolation: Interpolation,
    #[serde(default)]
    pub sampler_view: Option<SamplerViewDecl>,
}

fn default_usage_mask() -> u8 {
    0xF
}

impl Declaration {
    pub fn new(file: RegisterFile, first: u32, last: u32) -> Self {
        Self {
            file,
            first,
            last,
            usage_mask: 0xF,
            semantic: None,
            interpolation: Interpolation::default(),
            sampler_view: None,
        }
    }

    pub fn with_semantic(mut self, name: Semantic, index: u32) -> Self {
        self.semantic = Some(SemanticDecl { name, index });
        self
    }

    pub fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    pub fn with_sampler_view(mut self, target: TextureTarget, return_type: ReturnType) -> Self {
        self.sampler_view = Some(SamplerViewDecl {
            target,
            return_type,
        });
        self
    }
}

/// One token of a program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Token {
    Declaration(Declaration),
    /// Raw 32-bit immediate values (reinterpreted per use)
    Immediate([u32; 4]),
    Instruction(Instruction),
}

impl Token {
    /// Float immediate
    pub fn imm_f(v: [f32; 4]) -> Self {
        Token::Immediate(v.map(f32::to_bits))
    }

    /// Integer immediate
    pub fn imm_i(v: [i32; 4]) -> Self {
        Token::Immediate(v.map(|x| x as u32))
    }
}

/// A complete compiled program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ShaderTokens {
    pub shader_type: ShaderType,
    pub tokens: Vec<Token>,
}

impl ShaderTokens {
    pub fn new(shader_type: ShaderType) -> Self {
        Self {
            shader_type,
            tokens: Vec::new(),
        }
    }

    pub fn declare(&mut self, decl: Declaration) -> &mut Self {
        self.tokens.push(Token::Declaration(decl));
        self
    }

    pub fn immediate(&mut self, imm: Token) -> &mut Self {
        self.tokens.push(imm);
        self
    }

    pub fn push(&mut self, inst: Instruction) -> &mut Self {
        self.tokens.push(Token::Instruction(inst));
        self
    }

    /// Number of instruction tokens so far (index of the next one)
    pub fn next_pc(&self) -> u32 {
        self.tokens
            .iter()
            .filter(|t| matches!(t, Token::Instruction(_)))
            .count() as u32
    }
}
