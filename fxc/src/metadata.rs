//! Pipeline-state metadata emitted next to the SPIR-V module: techniques,
//! passes, textures, samplers and uniforms, with the fixed enumerations the
//! graphics runtimes consume at the boundary.
use fxc_core::{ConstantValue, Id, Location, Type};

/// An annotation value attached to a variable, technique or pass.
#[derive(PartialEq, Clone, Debug)]
pub enum Variant {
    Int(i32),
    Uint(u32),
    Float(f32),
    Str(String),
}

pub type AnnotationList = Vec<(String, Variant)>;

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum TextureFormat {
    Unknown = 0,
    R8,
    R16F,
    R32F,
    Rg8,
    Rg16,
    Rg16F,
    Rg32F,
    Rgba8,
    Rgba16,
    Rgba16F,
    Rgba32F,
    Dxt1,
    Dxt3,
    Dxt5,
    Latc1,
    Latc2,
}
impl TextureFormat {
    pub fn from_u32(x: u32) -> Option<TextureFormat> {
        use TextureFormat::*;
        let format = match x {
            0 => Unknown,
            1 => R8,
            2 => R16F,
            3 => R32F,
            4 => Rg8,
            5 => Rg16,
            6 => Rg16F,
            7 => Rg32F,
            8 => Rgba8,
            9 => Rgba16,
            10 => Rgba16F,
            11 => Rgba32F,
            12 => Dxt1,
            13 => Dxt3,
            14 => Dxt5,
            15 => Latc1,
            16 => Latc2,
            _ => return None,
        };
        Some(format)
    }
}

/// Texture addressing behavior outside [0, 1]. The numeric values match the
/// D3D convention; both `WRAP` and `REPEAT` spell `Wrap`.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum AddressMode {
    Wrap = 1,
    Mirror = 2,
    Clamp = 3,
    Border = 4,
}
impl AddressMode {
    pub fn from_u32(x: u32) -> Option<AddressMode> {
        match x {
            1 => Some(AddressMode::Wrap),
            2 => Some(AddressMode::Mirror),
            3 => Some(AddressMode::Clamp),
            4 => Some(AddressMode::Border),
            _ => None,
        }
    }
}

/// Combined min/mag/mip filter: three 2-bit fields, `min` highest.
/// `point = 0`, `linear = 1`, `anisotropic = 3`.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub struct Filter(pub u32);
impl Filter {
    pub const MIN_MAG_MIP_POINT: Filter = Filter(0x00);
    pub const MIN_MAG_MIP_LINEAR: Filter = Filter(0x15);
    pub const ANISOTROPIC: Filter = Filter(0x3F);

    pub fn with_min(self, x: u32) -> Filter {
        Filter((self.0 & 0x0F) | ((x << 4) & 0x30))
    }
    pub fn with_mag(self, x: u32) -> Filter {
        Filter((self.0 & 0x33) | ((x << 2) & 0x0C))
    }
    pub fn with_mip(self, x: u32) -> Filter {
        Filter((self.0 & 0x3C) | (x & 0x03))
    }
}
impl Default for Filter {
    fn default() -> Filter {
        Filter::MIN_MAG_MIP_LINEAR
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum BlendFactor {
    Zero = 0,
    One = 1,
    SrcColor = 2,
    InvSrcColor = 3,
    SrcAlpha = 4,
    InvSrcAlpha = 5,
    DestAlpha = 6,
    InvDestAlpha = 7,
    DestColor = 8,
    InvDestColor = 9,
}
impl BlendFactor {
    pub fn from_u32(x: u32) -> Option<BlendFactor> {
        use BlendFactor::*;
        let factor = match x {
            0 => Zero,
            1 => One,
            2 => SrcColor,
            3 => InvSrcColor,
            4 => SrcAlpha,
            5 => InvSrcAlpha,
            6 => DestAlpha,
            7 => InvDestAlpha,
            8 => DestColor,
            9 => InvDestColor,
            _ => return None,
        };
        Some(factor)
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum BlendOp {
    Add = 1,
    Subtract = 2,
    RevSubtract = 3,
    Min = 4,
    Max = 5,
}
impl BlendOp {
    pub fn from_u32(x: u32) -> Option<BlendOp> {
        use BlendOp::*;
        let op = match x {
            1 => Add,
            2 => Subtract,
            3 => RevSubtract,
            4 => Min,
            5 => Max,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum StencilOp {
    Zero = 0,
    Keep = 1,
    Replace = 3,
    IncrSat = 4,
    DecrSat = 5,
    Invert = 6,
    Incr = 7,
    Decr = 8,
}
impl StencilOp {
    pub fn from_u32(x: u32) -> Option<StencilOp> {
        use StencilOp::*;
        let op = match x {
            0 => Zero,
            1 => Keep,
            3 => Replace,
            4 => IncrSat,
            5 => DecrSat,
            6 => Invert,
            7 => Incr,
            8 => Decr,
            _ => return None,
        };
        Some(op)
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ComparisonFunc {
    Never = 1,
    Less = 2,
    Equal = 3,
    LessEqual = 4,
    Greater = 5,
    NotEqual = 6,
    GreaterEqual = 7,
    Always = 8,
}
impl ComparisonFunc {
    pub fn from_u32(x: u32) -> Option<ComparisonFunc> {
        use ComparisonFunc::*;
        let func = match x {
            1 => Never,
            2 => Less,
            3 => Equal,
            4 => LessEqual,
            5 => Greater,
            6 => NotEqual,
            7 => GreaterEqual,
            8 => Always,
            _ => return None,
        };
        Some(func)
    }
}

#[derive(Clone, Debug)]
pub struct Texture {
    pub name: String,
    pub unique_name: String,
    pub id: Id,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub levels: u32,
    pub format: TextureFormat,
    pub srgb: bool,
    pub annotations: AnnotationList,
}
impl Texture {
    pub fn new(name: &str, unique_name: String, id: Id) -> Texture {
        Texture {
            name: name.to_owned(),
            unique_name,
            id,
            width: 1,
            height: 1,
            depth: 1,
            levels: 1,
            format: TextureFormat::Rgba8,
            srgb: false,
            annotations: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Sampler {
    pub name: String,
    pub id: Id,
    pub texture: Id,
    pub filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub min_lod: f32,
    pub max_lod: f32,
    pub lod_bias: f32,
    pub srgb: bool,
    pub annotations: AnnotationList,
}
impl Sampler {
    pub fn new(name: &str, id: Id) -> Sampler {
        Sampler {
            name: name.to_owned(),
            id,
            texture: 0,
            filter: Filter::default(),
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            address_w: AddressMode::Clamp,
            min_lod: 0.0,
            max_lod: f32::MAX,
            lod_bias: 0.0,
            srgb: false,
            annotations: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Uniform {
    pub name: String,
    pub unique_name: String,
    pub id: Id,
    pub ty: Type,
    pub semantic: String,
    pub initializer: Option<ConstantValue>,
    pub annotations: AnnotationList,
}

#[derive(Clone, Debug)]
pub struct Pass {
    pub name: String,
    pub location: Location,
    pub annotations: AnnotationList,
    pub render_targets: [Id; 8],
    pub vertex_shader: Id,
    pub pixel_shader: Id,
    pub clear_render_targets: bool,
    pub srgb_write_enable: bool,
    pub blend_enable: bool,
    pub stencil_enable: bool,
    pub color_write_mask: u8,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub blend_op: BlendOp,
    pub blend_op_alpha: BlendOp,
    pub src_blend: BlendFactor,
    pub dest_blend: BlendFactor,
    pub src_blend_alpha: BlendFactor,
    pub dest_blend_alpha: BlendFactor,
    pub stencil_func: ComparisonFunc,
    pub stencil_ref: u32,
    pub stencil_pass: StencilOp,
    pub stencil_fail: StencilOp,
    pub stencil_depth_fail: StencilOp,
}
impl Pass {
    pub fn new(location: Location) -> Pass {
        Pass {
            name: String::new(),
            location,
            annotations: Vec::new(),
            render_targets: [0; 8],
            vertex_shader: 0,
            pixel_shader: 0,
            clear_render_targets: true,
            srgb_write_enable: false,
            blend_enable: false,
            stencil_enable: false,
            color_write_mask: 0xF,
            stencil_read_mask: 0xFF,
            stencil_write_mask: 0xFF,
            blend_op: BlendOp::Add,
            blend_op_alpha: BlendOp::Add,
            src_blend: BlendFactor::One,
            dest_blend: BlendFactor::Zero,
            src_blend_alpha: BlendFactor::One,
            dest_blend_alpha: BlendFactor::Zero,
            stencil_func: ComparisonFunc::Always,
            stencil_ref: 0,
            stencil_pass: StencilOp::Keep,
            stencil_fail: StencilOp::Keep,
            stencil_depth_fail: StencilOp::Keep,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Technique {
    pub name: String,
    pub unique_name: String,
    pub location: Location,
    pub annotations: AnnotationList,
    pub passes: Vec<Pass>,
}

/// Everything the compiler produces besides the SPIR-V words.
#[derive(Default)]
pub struct EffectMetadata {
    pub techniques: Vec<Technique>,
    pub textures: Vec<Texture>,
    pub samplers: Vec<Sampler>,
    pub uniforms: Vec<Uniform>,
    pub pragmas: Vec<String>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_filter_packing() {
        // MinFilter/MagFilter/MipFilter combine as in the property parser.
        let filter = Filter::default();
        assert_eq!(filter.0, 0x15);
        assert_eq!(filter.with_min(3).0, 0x35);
        assert_eq!(filter.with_mag(0).0, 0x11);
        assert_eq!(filter.with_mip(0).0, 0x14);
    }

    #[test]
    fn test_pass_defaults() {
        let pass = Pass::new(Location::default());
        assert!(pass.clear_render_targets);
        assert_eq!(pass.color_write_mask, 0xF);
        assert_eq!(pass.stencil_read_mask, 0xFF);
        assert_eq!(pass.src_blend, BlendFactor::One);
        assert_eq!(pass.dest_blend, BlendFactor::Zero);
        assert_eq!(pass.stencil_func, ComparisonFunc::Always);
    }

    #[test]
    fn test_enum_values() {
        assert_eq!(AddressMode::Wrap as u32, 1);
        assert_eq!(AddressMode::Clamp as u32, 3);
        assert_eq!(BlendFactor::SrcAlpha as u32, 4);
        assert_eq!(StencilOp::Keep as u32, 1);
        assert_eq!(ComparisonFunc::LessEqual as u32, 4);
    }
}
