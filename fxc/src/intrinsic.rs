//! Catalog of built-in functions. Each row carries a name, the SPIR-V
//! lowering (a plain opcode, a GLSL.std.450 extended instruction, or one of
//! the rewrites without a direct encoding) and the signature used by
//! overload resolution.
use fxc_core::spirv::{GLOp, Op};
use fxc_core::{BaseType, Type};

#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum Lowering {
    /// A core opcode applied to the arguments in order.
    Op(Op),
    /// `OpExtInst` against the GLSL.std.450 set.
    Ext(GLOp),
    /// `1 / x`, emitted as `OpFDiv` with a constant one.
    Rcp,
    /// `clamp(x, 0, 1)`, emitted as `GLSL.std.450 FClamp`.
    Saturate,
}

pub struct Intrinsic {
    pub name: &'static str,
    pub lowering: Lowering,
    pub return_type: Type,
    pub params: &'static [Type],
}

const B: Type = Type::scalar(BaseType::Bool);
const B2: Type = Type::vector(BaseType::Bool, 2);
const B3: Type = Type::vector(BaseType::Bool, 3);
const B4: Type = Type::vector(BaseType::Bool, 4);
const I: Type = Type::scalar(BaseType::Int);
const I2: Type = Type::vector(BaseType::Int, 2);
const I3: Type = Type::vector(BaseType::Int, 3);
const I4: Type = Type::vector(BaseType::Int, 4);
const U: Type = Type::scalar(BaseType::Uint);
const U2: Type = Type::vector(BaseType::Uint, 2);
const U3: Type = Type::vector(BaseType::Uint, 3);
const U4: Type = Type::vector(BaseType::Uint, 4);
const F: Type = Type::scalar(BaseType::Float);
const F2: Type = Type::vector(BaseType::Float, 2);
const F3: Type = Type::vector(BaseType::Float, 3);
const F4: Type = Type::vector(BaseType::Float, 4);
const F2X2: Type = Type::matrix(BaseType::Float, 2, 2);
const F3X3: Type = Type::matrix(BaseType::Float, 3, 3);
const F4X4: Type = Type::matrix(BaseType::Float, 4, 4);
const SAMP: Type = Type::sampler(2);

macro_rules! op {
    ($name:literal, $op:ident, $ret:expr $(, $param:expr)*) => {
        Intrinsic {
            name: $name,
            lowering: Lowering::Op(Op::$op),
            return_type: $ret,
            params: &[$($param),*],
        }
    };
}
macro_rules! ext {
    ($name:literal, $glop:ident, $ret:expr $(, $param:expr)*) => {
        Intrinsic {
            name: $name,
            lowering: Lowering::Ext(GLOp::$glop),
            return_type: $ret,
            params: &[$($param),*],
        }
    };
}
macro_rules! special {
    ($name:literal, $lowering:ident, $ret:expr $(, $param:expr)*) => {
        Intrinsic {
            name: $name,
            lowering: Lowering::$lowering,
            return_type: $ret,
            params: &[$($param),*],
        }
    };
}

pub static INTRINSICS: &[Intrinsic] = &[
    ext!("abs", FAbs, F, F),
    ext!("abs", FAbs, F2, F2),
    ext!("abs", FAbs, F3, F3),
    ext!("abs", FAbs, F4, F4),
    ext!("abs", SAbs, I, I),
    ext!("abs", SAbs, I2, I2),
    ext!("abs", SAbs, I3, I3),
    ext!("abs", SAbs, I4, I4),
    ext!("acos", Acos, F, F),
    ext!("acos", Acos, F2, F2),
    ext!("acos", Acos, F3, F3),
    ext!("acos", Acos, F4, F4),
    op!("all", All, B, B),
    op!("all", All, B, B2),
    op!("all", All, B, B3),
    op!("all", All, B, B4),
    op!("any", Any, B, B),
    op!("any", Any, B, B2),
    op!("any", Any, B, B3),
    op!("any", Any, B, B4),
    op!("asfloat", Bitcast, F, I),
    op!("asfloat", Bitcast, F2, I2),
    op!("asfloat", Bitcast, F3, I3),
    op!("asfloat", Bitcast, F4, I4),
    op!("asfloat", Bitcast, F, U),
    op!("asfloat", Bitcast, F2, U2),
    op!("asfloat", Bitcast, F3, U3),
    op!("asfloat", Bitcast, F4, U4),
    ext!("asin", Asin, F, F),
    ext!("asin", Asin, F2, F2),
    ext!("asin", Asin, F3, F3),
    ext!("asin", Asin, F4, F4),
    op!("asint", Bitcast, I, F),
    op!("asint", Bitcast, I2, F2),
    op!("asint", Bitcast, I3, F3),
    op!("asint", Bitcast, I4, F4),
    op!("asuint", Bitcast, U, F),
    op!("asuint", Bitcast, U2, F2),
    op!("asuint", Bitcast, U3, F3),
    op!("asuint", Bitcast, U4, F4),
    ext!("atan", Atan, F, F),
    ext!("atan", Atan, F2, F2),
    ext!("atan", Atan, F3, F3),
    ext!("atan", Atan, F4, F4),
    ext!("atan2", Atan2, F, F, F),
    ext!("atan2", Atan2, F2, F2, F2),
    ext!("atan2", Atan2, F3, F3, F3),
    ext!("atan2", Atan2, F4, F4, F4),
    ext!("ceil", Ceil, F, F),
    ext!("ceil", Ceil, F2, F2),
    ext!("ceil", Ceil, F3, F3),
    ext!("ceil", Ceil, F4, F4),
    ext!("clamp", NClamp, F, F, F, F),
    ext!("clamp", NClamp, F2, F2, F2, F2),
    ext!("clamp", NClamp, F3, F3, F3, F3),
    ext!("clamp", NClamp, F4, F4, F4, F4),
    ext!("cos", Cos, F, F),
    ext!("cos", Cos, F2, F2),
    ext!("cos", Cos, F3, F3),
    ext!("cos", Cos, F4, F4),
    ext!("cosh", Cosh, F, F),
    ext!("cosh", Cosh, F2, F2),
    ext!("cosh", Cosh, F3, F3),
    ext!("cosh", Cosh, F4, F4),
    ext!("cross", Cross, F3, F3, F3),
    op!("ddx", DPdx, F, F),
    op!("ddx", DPdx, F2, F2),
    op!("ddx", DPdx, F3, F3),
    op!("ddx", DPdx, F4, F4),
    op!("ddy", DPdy, F, F),
    op!("ddy", DPdy, F2, F2),
    op!("ddy", DPdy, F3, F3),
    op!("ddy", DPdy, F4, F4),
    ext!("degrees", Degrees, F, F),
    ext!("degrees", Degrees, F2, F2),
    ext!("degrees", Degrees, F3, F3),
    ext!("degrees", Degrees, F4, F4),
    ext!("determinant", Determinant, F, F2X2),
    ext!("determinant", Determinant, F, F3X3),
    ext!("determinant", Determinant, F, F4X4),
    ext!("distance", Distance, F, F, F),
    ext!("distance", Distance, F, F2, F2),
    ext!("distance", Distance, F, F3, F3),
    ext!("distance", Distance, F, F4, F4),
    op!("dot", Dot, F, F, F),
    op!("dot", Dot, F, F2, F2),
    op!("dot", Dot, F, F3, F3),
    op!("dot", Dot, F, F4, F4),
    ext!("exp", Exp, F, F),
    ext!("exp", Exp, F2, F2),
    ext!("exp", Exp, F3, F3),
    ext!("exp", Exp, F4, F4),
    ext!("exp2", Exp2, F, F),
    ext!("exp2", Exp2, F2, F2),
    ext!("exp2", Exp2, F3, F3),
    ext!("exp2", Exp2, F4, F4),
    ext!("faceforward", FaceForward, F, F, F, F),
    ext!("faceforward", FaceForward, F2, F2, F2, F2),
    ext!("faceforward", FaceForward, F3, F3, F3, F3),
    ext!("faceforward", FaceForward, F4, F4, F4, F4),
    ext!("floor", Floor, F, F),
    ext!("floor", Floor, F2, F2),
    ext!("floor", Floor, F3, F3),
    ext!("floor", Floor, F4, F4),
    ext!("frac", Fract, F, F),
    ext!("frac", Fract, F2, F2),
    ext!("frac", Fract, F3, F3),
    ext!("frac", Fract, F4, F4),
    ext!("frexp", Frexp, F, F, F),
    ext!("frexp", Frexp, F2, F2, F2),
    ext!("frexp", Frexp, F3, F3, F3),
    ext!("frexp", Frexp, F4, F4, F4),
    op!("fwidth", Fwidth, F, F),
    op!("fwidth", Fwidth, F2, F2),
    op!("fwidth", Fwidth, F3, F3),
    op!("fwidth", Fwidth, F4, F4),
    op!("isinf", IsInf, B, F),
    op!("isinf", IsInf, B2, F2),
    op!("isinf", IsInf, B3, F3),
    op!("isinf", IsInf, B4, F4),
    op!("isnan", IsNan, B, F),
    op!("isnan", IsNan, B2, F2),
    op!("isnan", IsNan, B3, F3),
    op!("isnan", IsNan, B4, F4),
    ext!("ldexp", Ldexp, F, F, F),
    ext!("ldexp", Ldexp, F2, F2, F2),
    ext!("ldexp", Ldexp, F3, F3, F3),
    ext!("ldexp", Ldexp, F4, F4, F4),
    ext!("length", Length, F, F),
    ext!("length", Length, F, F2),
    ext!("length", Length, F, F3),
    ext!("length", Length, F, F4),
    ext!("lerp", FMix, F, F, F, F),
    ext!("lerp", FMix, F2, F2, F2, F2),
    ext!("lerp", FMix, F3, F3, F3, F3),
    ext!("lerp", FMix, F4, F4, F4, F4),
    ext!("log", Log, F, F),
    ext!("log", Log, F2, F2),
    ext!("log", Log, F3, F3),
    ext!("log", Log, F4, F4),
    ext!("log2", Log2, F, F),
    ext!("log2", Log2, F2, F2),
    ext!("log2", Log2, F3, F3),
    ext!("log2", Log2, F4, F4),
    ext!("mad", Fma, F, F, F, F),
    ext!("mad", Fma, F2, F2, F2, F2),
    ext!("mad", Fma, F3, F3, F3, F3),
    ext!("mad", Fma, F4, F4, F4, F4),
    ext!("max", NMax, F, F, F),
    ext!("max", NMax, F2, F2, F2),
    ext!("max", NMax, F3, F3, F3),
    ext!("max", NMax, F4, F4, F4),
    ext!("min", NMin, F, F, F),
    ext!("min", NMin, F2, F2, F2),
    ext!("min", NMin, F3, F3, F3),
    ext!("min", NMin, F4, F4, F4),
    ext!("modf", Modf, F, F, F),
    ext!("modf", Modf, F2, F2, F2),
    ext!("modf", Modf, F3, F3, F3),
    ext!("modf", Modf, F4, F4, F4),
    op!("mul", FMul, F, F, F),
    op!("mul", VectorTimesScalar, F2, F, F2),
    op!("mul", VectorTimesScalar, F3, F, F3),
    op!("mul", VectorTimesScalar, F4, F, F4),
    op!("mul", VectorTimesScalar, F2, F2, F),
    op!("mul", VectorTimesScalar, F3, F3, F),
    op!("mul", VectorTimesScalar, F4, F4, F),
    op!("mul", MatrixTimesScalar, F2X2, F, F2X2),
    op!("mul", MatrixTimesScalar, F3X3, F, F3X3),
    op!("mul", MatrixTimesScalar, F4X4, F, F4X4),
    op!("mul", MatrixTimesScalar, F2X2, F2X2, F),
    op!("mul", MatrixTimesScalar, F3X3, F3X3, F),
    op!("mul", MatrixTimesScalar, F4X4, F4X4, F),
    op!("mul", VectorTimesMatrix, F2, F2, F2X2),
    op!("mul", VectorTimesMatrix, F3, F3, F3X3),
    op!("mul", VectorTimesMatrix, F4, F4, F4X4),
    op!("mul", MatrixTimesVector, F2, F2X2, F2),
    op!("mul", MatrixTimesVector, F3, F3X3, F3),
    op!("mul", MatrixTimesVector, F4, F4X4, F4),
    op!("mul", MatrixTimesMatrix, F2X2, F2X2, F2X2),
    op!("mul", MatrixTimesMatrix, F3X3, F3X3, F3X3),
    op!("mul", MatrixTimesMatrix, F4X4, F4X4, F4X4),
    ext!("normalize", Normalize, F, F),
    ext!("normalize", Normalize, F2, F2),
    ext!("normalize", Normalize, F3, F3),
    ext!("normalize", Normalize, F4, F4),
    ext!("pow", Pow, F, F, F),
    ext!("pow", Pow, F2, F2, F2),
    ext!("pow", Pow, F3, F3, F3),
    ext!("pow", Pow, F4, F4, F4),
    ext!("radians", Radians, F, F),
    ext!("radians", Radians, F2, F2),
    ext!("radians", Radians, F3, F3),
    ext!("radians", Radians, F4, F4),
    special!("rcp", Rcp, F, F),
    special!("rcp", Rcp, F2, F2),
    special!("rcp", Rcp, F3, F3),
    special!("rcp", Rcp, F4, F4),
    ext!("reflect", Reflect, F, F, F),
    ext!("reflect", Reflect, F2, F2, F2),
    ext!("reflect", Reflect, F3, F3, F3),
    ext!("reflect", Reflect, F4, F4, F4),
    ext!("refract", Refract, F, F, F, F),
    ext!("refract", Refract, F2, F2, F2, F2),
    ext!("refract", Refract, F3, F3, F3, F3),
    ext!("refract", Refract, F4, F4, F4, F4),
    ext!("round", Round, F, F),
    ext!("round", Round, F2, F2),
    ext!("round", Round, F3, F3),
    ext!("round", Round, F4, F4),
    ext!("rsqrt", InverseSqrt, F, F),
    ext!("rsqrt", InverseSqrt, F2, F2),
    ext!("rsqrt", InverseSqrt, F3, F3),
    ext!("rsqrt", InverseSqrt, F4, F4),
    special!("saturate", Saturate, F, F),
    special!("saturate", Saturate, F2, F2),
    special!("saturate", Saturate, F3, F3),
    special!("saturate", Saturate, F4, F4),
    ext!("sign", FSign, I, F),
    ext!("sign", FSign, I2, F2),
    ext!("sign", FSign, I3, F3),
    ext!("sign", FSign, I4, F4),
    ext!("sign", SSign, I, I),
    ext!("sign", SSign, I2, I2),
    ext!("sign", SSign, I3, I3),
    ext!("sign", SSign, I4, I4),
    ext!("sin", Sin, F, F),
    ext!("sin", Sin, F2, F2),
    ext!("sin", Sin, F3, F3),
    ext!("sin", Sin, F4, F4),
    ext!("sinh", Sinh, F, F),
    ext!("sinh", Sinh, F2, F2),
    ext!("sinh", Sinh, F3, F3),
    ext!("sinh", Sinh, F4, F4),
    ext!("smoothstep", SmoothStep, F, F, F, F),
    ext!("smoothstep", SmoothStep, F2, F2, F2, F2),
    ext!("smoothstep", SmoothStep, F3, F3, F3, F3),
    ext!("smoothstep", SmoothStep, F4, F4, F4, F4),
    ext!("sqrt", Sqrt, F, F),
    ext!("sqrt", Sqrt, F2, F2),
    ext!("sqrt", Sqrt, F3, F3),
    ext!("sqrt", Sqrt, F4, F4),
    ext!("step", Step, F, F, F),
    ext!("step", Step, F2, F2, F2),
    ext!("step", Step, F3, F3, F3),
    ext!("step", Step, F4, F4, F4),
    ext!("tan", Tan, F, F),
    ext!("tan", Tan, F2, F2),
    ext!("tan", Tan, F3, F3),
    ext!("tan", Tan, F4, F4),
    ext!("tanh", Tanh, F, F),
    ext!("tanh", Tanh, F2, F2),
    ext!("tanh", Tanh, F3, F3),
    ext!("tanh", Tanh, F4, F4),
    op!("tex2D", ImageSampleImplicitLod, F4, SAMP, F2),
    op!("tex2Dfetch", ImageFetch, F4, SAMP, I4),
    op!("tex2Dgather", ImageGather, F4, SAMP, F2, I),
    op!("tex2Dlod", ImageSampleExplicitLod, F4, SAMP, F4),
    op!("tex2Dproj", ImageSampleProjImplicitLod, F4, SAMP, F4),
    op!("tex2Dsize", ImageQuerySizeLod, I2, SAMP, I),
    op!("transpose", Transpose, F2X2, F2X2),
    op!("transpose", Transpose, F3X3, F3X3),
    op!("transpose", Transpose, F4X4, F4X4),
    ext!("trunc", Trunc, F, F),
    ext!("trunc", Trunc, F2, F2),
    ext!("trunc", Trunc, F3, F3),
    ext!("trunc", Trunc, F4, F4),
];

// `log10` and `sincos` from the legacy language level have no GLSL.std.450
// encoding and are not provided; calls to them resolve like any other
// unknown overload.

pub fn candidates(name: &str) -> impl Iterator<Item = &'static Intrinsic> + use<'_> {
    INTRINSICS.iter().filter(move |x| x.name == name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_catalog_is_grouped_by_name() {
        // resolve_call scans candidates front to back; keeping rows of one
        // name adjacent keeps tie-breaking deterministic.
        let mut seen = std::collections::HashSet::new();
        let mut last = "";
        for intrinsic in INTRINSICS {
            if intrinsic.name != last {
                assert!(seen.insert(intrinsic.name), "split group {}", intrinsic.name);
                last = intrinsic.name;
            }
        }
    }

    #[test]
    fn test_mul_overloads() {
        let count = candidates("mul").count();
        assert_eq!(count, 22);
        assert!(candidates("mul").all(|x| x.params.len() == 2));
    }

    #[test]
    fn test_unsupported_rows_absent() {
        assert_eq!(candidates("log10").count(), 0);
        assert_eq!(candidates("sincos").count(), 0);
        assert!(candidates("saturate").count() > 0);
        assert!(candidates("rcp").count() > 0);
    }
}
