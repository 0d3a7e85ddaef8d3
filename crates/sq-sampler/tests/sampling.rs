//! End-to-end sampling scenarios through the sampler contract

use std::sync::Arc;

use sq_core::{ExecConfig, SamplerConfig};
use sq_exec::{
    AtomicOp, Channel, DstRegister, Image, ImageCoords, ImageFormat, ImageParams, Instruction,
    Machine, Opcode, QuadRgba, Resources, SampleCoords, Sampler, SamplerControl, ShaderTokens,
    ShaderType, SrcRegister, TextureTarget, Token, Vector,
};
use sq_sampler::{
    CompareFunc, FilterMode, ImageStorage, MipFilterMode, ResourceTarget, SamplerState,
    SamplerView, SoftImage, SoftSampler, SoftTexture, Swizzle, TexelFormat, TextureDesc,
    WrapMode,
};

/// Texture whose every texel of level n holds `[n, n, n, 1]`
fn leveled(target: ResourceTarget, width: u32, height: u32, levels: u32) -> SoftTexture {
    let desc = TextureDesc::new(target, TexelFormat::Rgba32Float, width, height)
        .with_levels(levels);
    let mut tex = SoftTexture::new(desc).unwrap();
    for level in 0..levels {
        let n = level as f32;
        for y in 0..tex.height(level) as i32 {
            for x in 0..tex.width(level) as i32 {
                tex.set_texel(level, x, y, 0, [n, n, n, 1.0]);
            }
        }
    }
    tex
}

fn bind(sampler: &SoftSampler, view: SamplerView, state: SamplerState) {
    sampler.set_sampler_view(0, Some(view)).unwrap();
    sampler.bind_sampler_state(0, Some(state)).unwrap();
}

fn splat(s: f32, t: f32) -> SampleCoords {
    SampleCoords {
        s: [s; 4],
        t: [t; 4],
        ..SampleCoords::default()
    }
}

fn red(rgba: &QuadRgba) -> [f32; 4] {
    rgba[0]
}

#[test]
fn test_clamp_to_border_returns_border_color() {
    let sampler = SoftSampler::default();
    let tex = leveled(ResourceTarget::Tex2D, 4, 4, 1);
    let state = SamplerState::new()
        .with_wrap(WrapMode::ClampToBorder, WrapMode::ClampToBorder, WrapMode::ClampToBorder)
        .with_border_color([0.25, 0.5, 0.75, 1.0]);
    bind(&sampler, SamplerView::new(Arc::new(tex)), state);

    let coords = SampleCoords {
        s: [-0.1, 0.5, 1.2, 0.5],
        t: [0.5, 0.5, 0.5, 1.0],
        ..SampleCoords::default()
    };
    let rgba = sampler.get_samples(0, 0, &coords, None, [0; 3], SamplerControl::Zero);
    assert_eq!(red(&rgba), [0.25, 0.0, 0.25, 0.25]);
    assert_eq!(rgba[2], [0.75, 0.0, 0.75, 0.75]);
}

#[test]
fn test_border_color_clamped_for_unorm() {
    let sampler = SoftSampler::default();
    let desc = TextureDesc::new(ResourceTarget::Tex2D, TexelFormat::Rgba8Unorm, 2, 2);
    let tex = SoftTexture::new(desc).unwrap();
    let state = SamplerState::new()
        .with_wrap(WrapMode::ClampToBorder, WrapMode::ClampToBorder, WrapMode::ClampToBorder)
        .with_border_color([2.0, -1.0, 0.5, 1.0]);
    bind(&sampler, SamplerView::new(Arc::new(tex)), state);

    let rgba = sampler.get_samples(0, 0, &splat(-1.0, 0.5), None, [0; 3], SamplerControl::Zero);
    assert_eq!([rgba[0][0], rgba[1][0], rgba[2][0], rgba[3][0]], [1.0, 0.0, 0.5, 1.0]);
}

fn cube_scene(seamless: bool) -> QuadRgba {
    const FACE_POS_Z: i32 = 4;
    let desc = TextureDesc::new(ResourceTarget::Cube, TexelFormat::Rgba32Float, 4, 4);
    let mut tex = SoftTexture::new(desc).unwrap();
    for y in 0..4 {
        for x in 0..4 {
            tex.set_texel(0, x, y, FACE_POS_Z, [1.0; 4]);
        }
    }

    let sampler = SoftSampler::default();
    let state = SamplerState::new()
        .with_filter(FilterMode::Linear, FilterMode::Linear, MipFilterMode::None)
        .with_wrap(WrapMode::ClampToEdge, WrapMode::ClampToEdge, WrapMode::ClampToEdge)
        .with_border_color([0.5; 4])
        .with_seamless_cube_map(seamless);
    bind(&sampler, SamplerView::new(Arc::new(tex)), state);

    // +X face, s = 0.05 puts the left texel of the footprint at x = -1
    let coords = SampleCoords {
        s: [1.0; 4],
        t: [0.0; 4],
        p: [0.9; 4],
        ..SampleCoords::default()
    };
    sampler.get_samples(0, 0, &coords, None, [0; 3], SamplerControl::Zero)
}

#[test]
fn test_seamless_cube_reads_neighbor_face() {
    let rgba = cube_scene(true);
    // 30% of the footprint lies on the last column of +Z
    for v in red(&rgba) {
        assert!((v - 0.3).abs() < 1e-5, "{v}");
    }
}

#[test]
fn test_cube_without_seamless_clamps_to_face() {
    let rgba = cube_scene(false);
    assert_eq!(red(&rgba), [0.0; 4]);
}

#[test]
fn test_lod_clamped_to_max_lod() {
    let sampler = SoftSampler::default();
    let tex = leveled(ResourceTarget::Tex2D, 1024, 1, 11);
    let state = SamplerState::new()
        .with_filter(FilterMode::Nearest, FilterMode::Nearest, MipFilterMode::Nearest)
        .with_lod_range(0.0, 4.0);
    bind(&sampler, SamplerView::new(Arc::new(tex)), state);

    // One texture width per pixel in x gives lambda 10
    let coords = SampleCoords {
        s: [0.0, 1.0, 0.0, 1.0],
        ..SampleCoords::default()
    };
    let rgba = sampler.get_samples(0, 0, &coords, None, [0; 3], SamplerControl::None);
    assert_eq!(red(&rgba), [4.0; 4]);

    let (mipmap, lod) = sampler.query_lod(0, 0, &coords, SamplerControl::None);
    assert_eq!(lod, [10.0; 4]);
    assert_eq!(mipmap, [4.0; 4]);
}

#[test]
fn test_mip_none_always_samples_first_level() {
    let sampler = SoftSampler::default();
    let tex = Arc::new(leveled(ResourceTarget::Tex2D, 1024, 1, 11));
    let state = SamplerState::new().with_filter(
        FilterMode::Linear,
        FilterMode::Nearest,
        MipFilterMode::None,
    );
    bind(&sampler, SamplerView::new(tex).with_levels(2, 10), state);

    for control in [SamplerControl::None, SamplerControl::Explicit] {
        let coords = SampleCoords {
            s: [0.0, 1.0, 0.0, 1.0],
            lod: [-2.0, 0.0, 3.0, 9.0],
            ..SampleCoords::default()
        };
        let rgba = sampler.get_samples(0, 0, &coords, None, [0; 3], control);
        assert_eq!(red(&rgba), [2.0; 4], "{control:?}");
    }
}

#[test]
fn test_shadow_compare_and_swizzle() {
    let sampler = SoftSampler::default();
    let desc = TextureDesc::new(ResourceTarget::Tex2D, TexelFormat::Depth32Float, 2, 1);
    let mut tex = SoftTexture::new(desc).unwrap();
    tex.write_layer(0, 0, &[[0.25, 0.0, 0.0, 1.0], [0.75, 0.0, 0.0, 1.0]]).unwrap();
    let view = SamplerView::new(Arc::new(tex)).with_swizzle([
        Swizzle::R,
        Swizzle::R,
        Swizzle::Zero,
        Swizzle::A,
    ]);
    let state = SamplerState::new().with_compare(CompareFunc::LEqual);
    bind(&sampler, view, state);

    // Reference 0.5 against depths 0.25 (fails) and 0.75 (passes)
    let coords = SampleCoords {
        s: [0.25, 0.75, 0.25, 0.75],
        t: [0.5; 4],
        p: [0.5; 4],
        ..SampleCoords::default()
    };
    let rgba = sampler.get_samples(0, 0, &coords, None, [0; 3], SamplerControl::Zero);
    assert_eq!(rgba[0], [0.0, 1.0, 0.0, 1.0]);
    assert_eq!(rgba[1], [0.0, 1.0, 0.0, 1.0]);
    assert_eq!(rgba[2], [0.0; 4]);
    assert_eq!(rgba[3], [1.0; 4]);
}

#[test]
fn test_gather_returns_four_texels() {
    let sampler = SoftSampler::default();
    let desc = TextureDesc::new(ResourceTarget::Tex2D, TexelFormat::Rgba32Float, 2, 2);
    let mut tex = SoftTexture::new(desc).unwrap();
    tex.write_layer(
        0,
        0,
        &[[1.0, 10.0, 0.0, 0.0], [2.0, 20.0, 0.0, 0.0], [3.0, 30.0, 0.0, 0.0], [
            4.0, 40.0, 0.0, 0.0,
        ]],
    )
    .unwrap();
    bind(&sampler, SamplerView::new(Arc::new(tex)), SamplerState::new());

    // Component 1 (green) is packed into the bits of the first LOD slot
    let coords = SampleCoords {
        lod: [f32::from_bits(1), 0.0, 0.0, 0.0],
        ..splat(0.5, 0.5)
    };
    let rgba = sampler.get_samples(0, 0, &coords, None, [0; 3], SamplerControl::Gather);
    let lane0 = [rgba[0][0], rgba[1][0], rgba[2][0], rgba[3][0]];
    assert_eq!(lane0, [30.0, 40.0, 20.0, 10.0]);
}

#[test]
fn test_image_atomic_add() {
    let image = SoftImage::new();
    let storage = ImageStorage::new(ImageFormat::R32Uint, 4, 4, 1).unwrap();
    image.bind(0, Some(storage.shared())).unwrap();

    let params = ImageParams {
        unit: 0,
        target: TextureTarget::Tex2D,
        format: ImageFormat::R32Uint,
        execmask: 0b0001,
    };
    let coords = ImageCoords {
        s: [2; 4],
        t: [3; 4],
        ..ImageCoords::default()
    };
    let five = [Channel::splat_u(5), Channel::ZERO, Channel::ZERO, Channel::ZERO];
    image.store(&params, &coords, &five);

    let three = [Channel::splat_u(3); 4];
    let old = image.op(&params, AtomicOp::Uadd, &coords, &three, &[Channel::ZERO; 4]);
    assert_eq!(old[0].u(0), 5);
    assert_eq!(image.load(&params, &coords)[0].u(0), 8);
}

#[test]
fn test_machine_tex_through_soft_sampler() {
    let desc = TextureDesc::new(ResourceTarget::Tex2D, TexelFormat::Rgba32Float, 2, 2);
    let mut tex = SoftTexture::new(desc).unwrap();
    tex.write_layer(
        0,
        0,
        &[[0.0, 0.0, 0.0, 1.0], [1.0, 0.0, 0.0, 1.0], [0.0, 1.0, 0.0, 1.0], [
            1.0, 1.0, 0.0, 1.0,
        ]],
    )
    .unwrap();

    let sampler = Arc::new(SoftSampler::new(ShaderType::Fragment, SamplerConfig::default()));
    bind(&sampler, SamplerView::new(Arc::new(tex)), SamplerState::new());

    let mut program = ShaderTokens::new(ShaderType::Fragment);
    program
        .push(
            Instruction::new(Opcode::Tex)
                .dst(DstRegister::temp(0))
                .src(SrcRegister::input(0))
                .src(SrcRegister::sampler(0))
                .texture(TextureTarget::Tex2D),
        )
        .push(
            Instruction::new(Opcode::Txq)
                .dst(DstRegister::temp(1))
                .src(SrcRegister::imm(0))
                .src(SrcRegister::sampler(0)),
        )
        .immediate(Token::imm_i([0; 4]))
        .push(Instruction::new(Opcode::End));

    let mut mach = Machine::new(ShaderType::Fragment, ExecConfig::default());
    mach.bind_shader(Some(&program), Resources::new().with_sampler(sampler))
        .unwrap();
    // One texel per pixel: lanes hit texel centers directly
    mach.inputs_mut()[0] = Vector {
        xyzw: [
            Channel::from_f([0.25, 0.75, 0.25, 0.75]),
            Channel::from_f([0.25, 0.25, 0.75, 0.75]),
            Channel::ZERO,
            Channel::splat_f(1.0),
        ],
    };
    assert!(mach.run(0).unwrap().is_finished());

    let color = mach.temp(0).unwrap();
    assert_eq!(color.lane_f(0), [0.0, 0.0, 0.0, 1.0]);
    assert_eq!(color.lane_f(1), [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(color.lane_f(2), [0.0, 1.0, 0.0, 1.0]);
    assert_eq!(color.lane_f(3), [1.0, 1.0, 0.0, 1.0]);

    let dims = mach.temp(1).unwrap();
    assert_eq!(dims.xyzw[0].to_i(), [2; 4]);
    assert_eq!(dims.xyzw[3].to_i(), [1; 4]);
}
