//! Structured representation of FX language types.
use std::fmt;

pub type Id = u32;

/// Base kind of a type. The discriminant order of the numeric kinds matters:
/// it is the promotion order used when two operands of a binary expression
/// disagree on their base type.
#[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy, Debug)]
pub enum BaseType {
    Void,
    Bool,
    Int,
    Uint,
    Float,
    String,
    Texture,
    Sampler,
    Struct,
}

/// Type qualifier bits. Kept as plain bit constants so a qualifier set can be
/// built up with `|` while parsing.
pub mod qual {
    pub const EXTERN: u32 = 1 << 0;
    pub const STATIC: u32 = 1 << 1;
    pub const UNIFORM: u32 = 1 << 2;
    pub const VOLATILE: u32 = 1 << 3;
    pub const PRECISE: u32 = 1 << 4;
    pub const IN: u32 = 1 << 5;
    pub const OUT: u32 = 1 << 6;
    pub const INOUT: u32 = IN | OUT;
    pub const CONST: u32 = 1 << 8;
    pub const LINEAR: u32 = 1 << 10;
    pub const NOPERSPECTIVE: u32 = 1 << 11;
    pub const CENTROID: u32 = 1 << 12;
    pub const NOINTERPOLATION: u32 = 1 << 13;
}

/// An FX type: base kind, row/column counts, optional array length and a
/// qualifier set. `rows > 1, cols == 1` is a vector; `cols > 1` a matrix.
/// `array_length` of 0 means not an array, -1 an unsized array. For structs
/// `definition` holds the id of the defining `OpTypeStruct`; for textures and
/// samplers `rows` holds the image dimensionality (1-3).
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
pub struct Type {
    pub base: BaseType,
    pub qualifiers: u32,
    pub rows: u32,
    pub cols: u32,
    pub array_length: i32,
    pub definition: Id,
}

impl Type {
    pub const VOID: Type = Type {
        base: BaseType::Void,
        qualifiers: 0,
        rows: 0,
        cols: 0,
        array_length: 0,
        definition: 0,
    };

    pub const fn scalar(base: BaseType) -> Type {
        Type {
            base,
            qualifiers: 0,
            rows: 1,
            cols: 1,
            array_length: 0,
            definition: 0,
        }
    }
    pub const fn vector(base: BaseType, rows: u32) -> Type {
        Type {
            base,
            qualifiers: 0,
            rows,
            cols: 1,
            array_length: 0,
            definition: 0,
        }
    }
    pub const fn matrix(base: BaseType, rows: u32, cols: u32) -> Type {
        Type {
            base,
            qualifiers: 0,
            rows,
            cols,
            array_length: 0,
            definition: 0,
        }
    }
    pub const fn texture(dim: u32) -> Type {
        Type {
            base: BaseType::Texture,
            qualifiers: 0,
            rows: dim,
            cols: 1,
            array_length: 0,
            definition: 0,
        }
    }
    pub const fn sampler(dim: u32) -> Type {
        Type {
            base: BaseType::Sampler,
            qualifiers: 0,
            rows: dim,
            cols: 1,
            array_length: 0,
            definition: 0,
        }
    }

    pub fn is_void(&self) -> bool {
        self.base == BaseType::Void
    }
    pub fn is_boolean(&self) -> bool {
        self.base == BaseType::Bool
    }
    pub fn is_integral(&self) -> bool {
        self.base == BaseType::Int || self.base == BaseType::Uint
    }
    pub fn is_floating_point(&self) -> bool {
        self.base == BaseType::Float
    }
    pub fn is_numeric(&self) -> bool {
        self.is_boolean() || self.is_integral() || self.is_floating_point()
    }
    pub fn is_string(&self) -> bool {
        self.base == BaseType::String
    }
    pub fn is_texture(&self) -> bool {
        self.base == BaseType::Texture
    }
    pub fn is_sampler(&self) -> bool {
        self.base == BaseType::Sampler
    }
    pub fn is_struct(&self) -> bool {
        self.base == BaseType::Struct
    }
    pub fn is_array(&self) -> bool {
        self.array_length != 0
    }
    // Textures and samplers reuse `rows` for their dimensionality, so the
    // shape predicates only apply to numeric bases.
    pub fn is_matrix(&self) -> bool {
        self.is_numeric() && self.rows >= 1 && self.cols > 1
    }
    pub fn is_vector(&self) -> bool {
        self.is_numeric() && self.rows > 1 && !self.is_matrix()
    }
    pub fn is_scalar(&self) -> bool {
        !self.is_array() && !self.is_matrix() && !self.is_vector() && self.is_numeric()
    }
    pub fn has_qualifier(&self, qualifier: u32) -> bool {
        self.qualifiers & qualifier == qualifier
    }
    pub fn component_count(&self) -> u32 {
        self.rows * self.cols
    }

    /// The scalar type of a vector or matrix component; identity for scalars.
    pub fn component_type(&self) -> Type {
        let mut ty = Type::scalar(self.base);
        ty.qualifiers = self.qualifiers;
        ty
    }
    /// The row type of a matrix: a `cols`-component vector.
    pub fn row_type(&self) -> Type {
        let mut ty = Type::vector(self.base, self.cols);
        ty.qualifiers = self.qualifiers;
        ty
    }
    /// The same type without its array dimension.
    pub fn element_type(&self) -> Type {
        let mut ty = *self;
        ty.array_length = 0;
        ty
    }

    /// std140-like base alignment in bytes. Only meaningful for numeric types.
    pub fn std140_alignment(&self) -> u32 {
        if self.is_array() || self.is_matrix() {
            return 16;
        }
        match self.rows {
            1 => 4,
            2 => 8,
            _ => 16,
        }
    }
    /// std140-like size in bytes. Matrices are laid out as `cols` vectors with
    /// a 16-byte stride; array elements are padded to 16-byte strides.
    pub fn std140_size(&self) -> u32 {
        let element = if self.is_matrix() {
            self.cols * 16
        } else {
            self.rows * 4
        };
        if self.array_length > 0 {
            (element + 15) / 16 * 16 * self.array_length as u32
        } else {
            element
        }
    }

    /// Rank a conversion from `src` to `dst`. Zero means the conversion is
    /// impossible; otherwise lower is a closer match. See the table in the
    /// module tests for the exact base-type penalties.
    pub fn rank(src: &Type, dst: &Type) -> u32 {
        if src.is_array() != dst.is_array()
            || (src.array_length != dst.array_length
                && src.array_length > 0
                && dst.array_length > 0)
        {
            return 0;
        }
        if src.is_struct() || dst.is_struct() {
            return (src.definition == dst.definition) as u32;
        }
        if src.base == dst.base && src.rows == dst.rows && src.cols == dst.cols {
            return 1;
        }
        if !src.is_numeric() || !dst.is_numeric() {
            return 0;
        }

        const RANKS: [[u32; 4]; 4] = [
            [0, 5, 5, 5],
            [4, 0, 3, 5],
            [4, 2, 0, 5],
            [4, 4, 4, 0],
        ];

        let rank = RANKS[base_index(src.base)][base_index(dst.base)] << 2;

        if src.is_scalar() && (dst.is_vector() || dst.is_matrix()) {
            return rank | 2;
        }
        if (src.is_vector() && dst.is_scalar())
            || (src.is_vector() == dst.is_vector() && src.rows > dst.rows && src.cols >= dst.cols)
        {
            return rank | 32;
        }
        if src.is_vector() != dst.is_vector()
            || src.is_matrix() != dst.is_matrix()
            || src.rows * src.cols != dst.rows * dst.cols
        {
            return 0;
        }

        rank
    }
}

fn base_index(base: BaseType) -> usize {
    match base {
        BaseType::Bool => 0,
        BaseType::Int => 1,
        BaseType::Uint => 2,
        BaseType::Float => 3,
        _ => unreachable!("rank is only defined on numeric base types"),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self.base {
            BaseType::Void => "void",
            BaseType::Bool => "bool",
            BaseType::Int => "int",
            BaseType::Uint => "uint",
            BaseType::Float => "float",
            BaseType::String => "string",
            BaseType::Texture => "texture",
            BaseType::Sampler => "sampler",
            BaseType::Struct => "struct",
        };
        f.write_str(name)?;
        if self.is_matrix() {
            write!(f, "{}x{}", self.rows, self.cols)?;
        } else if self.is_vector() {
            write!(f, "{}", self.rows)?;
        }
        match self.array_length {
            0 => Ok(()),
            len if len < 0 => write!(f, "[]"),
            len => write!(f, "[{}]", len),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const FLOAT: Type = Type::scalar(BaseType::Float);
    const FLOAT3: Type = Type::vector(BaseType::Float, 3);
    const FLOAT4: Type = Type::vector(BaseType::Float, 4);
    const FLOAT4X4: Type = Type::matrix(BaseType::Float, 4, 4);
    const INT: Type = Type::scalar(BaseType::Int);
    const UINT: Type = Type::scalar(BaseType::Uint);
    const BOOL: Type = Type::scalar(BaseType::Bool);

    #[test]
    fn test_classification() {
        assert!(FLOAT.is_scalar());
        assert!(FLOAT3.is_vector());
        assert!(!FLOAT3.is_matrix());
        assert!(FLOAT4X4.is_matrix());
        assert!(!FLOAT4X4.is_vector());
        assert!(Type::VOID.is_void());
        let mut arr = FLOAT4;
        arr.array_length = 3;
        assert!(arr.is_array());
        assert!(!arr.is_scalar());
    }

    #[test]
    fn test_rank_identity() {
        assert_eq!(Type::rank(&FLOAT, &FLOAT), 1);
        assert_eq!(Type::rank(&FLOAT4X4, &FLOAT4X4), 1);
    }

    #[test]
    fn test_rank_base_table() {
        // int -> uint costs less than int -> float.
        assert!(Type::rank(&INT, &UINT) < Type::rank(&INT, &FLOAT));
        // uint -> int is the cheapest non-identity integer conversion.
        assert_eq!(Type::rank(&UINT, &INT), 2 << 2);
        assert_eq!(Type::rank(&BOOL, &FLOAT), 5 << 2);
    }

    #[test]
    fn test_rank_promotion_and_truncation() {
        // Scalar broadcast picks up the +2 modifier.
        assert_eq!(Type::rank(&FLOAT, &FLOAT4), 2);
        assert_eq!(Type::rank(&FLOAT, &FLOAT4X4), 2);
        // Truncation picks up the +32 modifier and always ranks worse.
        assert_eq!(Type::rank(&FLOAT4, &FLOAT), 32);
        assert_eq!(Type::rank(&FLOAT4, &FLOAT3), 32);
        assert!(Type::rank(&FLOAT4, &FLOAT3) > Type::rank(&FLOAT, &FLOAT4));
    }

    #[test]
    fn test_rank_impossible() {
        let mut arr = FLOAT4;
        arr.array_length = 2;
        assert_eq!(Type::rank(&arr, &FLOAT4), 0);
        assert_eq!(Type::rank(&FLOAT3, &FLOAT4X4), 0);
        let tex = Type::texture(2);
        assert_eq!(Type::rank(&tex, &FLOAT), 0);
    }

    #[test]
    fn test_std140() {
        assert_eq!(FLOAT.std140_alignment(), 4);
        assert_eq!(FLOAT3.std140_alignment(), 16);
        assert_eq!(FLOAT3.std140_size(), 12);
        assert_eq!(FLOAT4X4.std140_size(), 64);
        let mut arr = FLOAT;
        arr.array_length = 4;
        assert_eq!(arr.std140_size(), 64);
    }
}
