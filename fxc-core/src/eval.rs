//! Constant evaluation over typed constant values, keyed by the SPIR-V
//! opcode the expression would otherwise emit. Powers the parser's constant
//! folding; an `Err` simply means "emit the instruction instead".
use spirv::{GLOp, Op};

use crate::{
    constant::ConstantValue,
    error::{anyhow, Error, Result},
    ty::Type,
};

fn evaluation_failed(op: Op, operands: &[ConstantValue]) -> Error {
    anyhow!("cannot evaluate {:?} with {:?}", op, operands)
}

/// Apply a scalar operation component-wise. Composites are zipped; a scalar
/// operand against a composite is broadcast.
fn zip2<F>(a: &ConstantValue, b: &ConstantValue, f: &F) -> Result<ConstantValue>
where
    F: Fn(&ConstantValue, &ConstantValue) -> Result<ConstantValue>,
{
    match (a, b) {
        (ConstantValue::Composite(xs), ConstantValue::Composite(ys)) => {
            if xs.len() != ys.len() {
                return Err(anyhow!("composite arity mismatch"));
            }
            let elems = xs
                .iter()
                .zip(ys.iter())
                .map(|(x, y)| zip2(x, y, f))
                .collect::<Result<Vec<_>>>()?;
            Ok(ConstantValue::Composite(elems))
        }
        (ConstantValue::Composite(xs), y) => {
            let elems = xs.iter().map(|x| zip2(x, y, f)).collect::<Result<Vec<_>>>()?;
            Ok(ConstantValue::Composite(elems))
        }
        (x, ConstantValue::Composite(ys)) => {
            let elems = ys.iter().map(|y| zip2(x, y, f)).collect::<Result<Vec<_>>>()?;
            Ok(ConstantValue::Composite(elems))
        }
        (x, y) => f(x, y),
    }
}

fn map1<F>(a: &ConstantValue, f: &F) -> Result<ConstantValue>
where
    F: Fn(&ConstantValue) -> Result<ConstantValue>,
{
    match a {
        ConstantValue::Composite(xs) => {
            let elems = xs.iter().map(|x| map1(x, f)).collect::<Result<Vec<_>>>()?;
            Ok(ConstantValue::Composite(elems))
        }
        x => f(x),
    }
}

macro_rules! int_binop {
    ($op:ident, $a:expr, $b:expr, $f_s32:expr, $f_u32:expr) => {
        zip2($a, $b, &|x, y| match (x, y) {
            (ConstantValue::S32(x), ConstantValue::S32(y)) => {
                $f_s32(*x, *y).map(ConstantValue::from)
            }
            (ConstantValue::U32(x), ConstantValue::U32(y)) => {
                $f_u32(*x, *y).map(ConstantValue::from)
            }
            _ => Err(evaluation_failed($op, &[x.clone(), y.clone()])),
        })
    };
}

macro_rules! cmp_binop {
    ($op:ident, $a:expr, $b:expr, $f:expr) => {
        zip2($a, $b, &|x, y| match (x, y) {
            (ConstantValue::S32(x), ConstantValue::S32(y)) => Ok(ConstantValue::Bool($f(x, y))),
            (ConstantValue::U32(x), ConstantValue::U32(y)) => Ok(ConstantValue::Bool($f(x, y))),
            (ConstantValue::F32(x), ConstantValue::F32(y)) => {
                Ok(ConstantValue::Bool($f(&x.0, &y.0)))
            }
            _ => Err(evaluation_failed($op, &[x.clone(), y.clone()])),
        })
    };
}

/// Evaluate `op` over constant operands. `result_ty` disambiguates the
/// conversion opcodes.
pub fn evaluate(op: Op, result_ty: &Type, operands: &[ConstantValue]) -> Result<ConstantValue> {
    let fail = || evaluation_failed(op, operands);
    match (op, operands) {
        // Unary.
        (Op::SNegate, [x]) => map1(x, &|x| {
            x.to_s32()
                .map(|x| ConstantValue::from(x.wrapping_neg()))
                .ok_or_else(fail)
        }),
        (Op::FNegate, [x]) => map1(x, &|x| {
            x.to_f32().map(|x| ConstantValue::from(-x)).ok_or_else(fail)
        }),
        (Op::Not, [x]) => map1(x, &|x| match x {
            ConstantValue::S32(x) => Ok(ConstantValue::from(!*x)),
            ConstantValue::U32(x) => Ok(ConstantValue::from(!*x)),
            _ => Err(fail()),
        }),
        (Op::LogicalNot, [x]) => map1(x, &|x| {
            x.to_bool().map(|x| ConstantValue::from(!x)).ok_or_else(fail)
        }),

        // Arithmetic.
        (Op::IAdd, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| Ok(x.wrapping_add(y)),
            |x: u32, y: u32| Ok(x.wrapping_add(y))),
        (Op::ISub, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| Ok(x.wrapping_sub(y)),
            |x: u32, y: u32| Ok(x.wrapping_sub(y))),
        (Op::IMul, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| Ok(x.wrapping_mul(y)),
            |x: u32, y: u32| Ok(x.wrapping_mul(y))),
        (Op::SDiv, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| x.checked_div(y).ok_or_else(|| anyhow!("division by zero")),
            |x: u32, y: u32| x.checked_div(y).ok_or_else(|| anyhow!("division by zero"))),
        (Op::UDiv, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| (x as u32).checked_div(y as u32).map(|x| x as i32)
                .ok_or_else(|| anyhow!("division by zero")),
            |x: u32, y: u32| x.checked_div(y).ok_or_else(|| anyhow!("division by zero"))),
        (Op::SRem, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| x.checked_rem(y).ok_or_else(|| anyhow!("division by zero")),
            |x: u32, y: u32| x.checked_rem(y).ok_or_else(|| anyhow!("division by zero"))),
        (Op::UMod, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| (x as u32).checked_rem(y as u32).map(|x| x as i32)
                .ok_or_else(|| anyhow!("division by zero")),
            |x: u32, y: u32| x.checked_rem(y).ok_or_else(|| anyhow!("division by zero"))),
        (Op::FAdd, [a, b]) => zip2(a, b, &|x, y| match (x.to_f32(), y.to_f32()) {
            (Some(x), Some(y)) => Ok(ConstantValue::from(x + y)),
            _ => Err(fail()),
        }),
        (Op::FSub, [a, b]) => zip2(a, b, &|x, y| match (x.to_f32(), y.to_f32()) {
            (Some(x), Some(y)) => Ok(ConstantValue::from(x - y)),
            _ => Err(fail()),
        }),
        (Op::FMul, [a, b]) => zip2(a, b, &|x, y| match (x.to_f32(), y.to_f32()) {
            (Some(x), Some(y)) => Ok(ConstantValue::from(x * y)),
            _ => Err(fail()),
        }),
        (Op::FDiv, [a, b]) => zip2(a, b, &|x, y| match (x.to_f32(), y.to_f32()) {
            (Some(x), Some(y)) => Ok(ConstantValue::from(x / y)),
            _ => Err(fail()),
        }),
        (Op::FMod | Op::FRem, [a, b]) => zip2(a, b, &|x, y| match (x.to_f32(), y.to_f32()) {
            (Some(x), Some(y)) => Ok(ConstantValue::from(x % y)),
            _ => Err(fail()),
        }),

        // Bit manipulation.
        (Op::ShiftLeftLogical, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| Ok(x.wrapping_shl(y as u32)),
            |x: u32, y: u32| Ok(x.wrapping_shl(y))),
        (Op::ShiftRightArithmetic, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| Ok(x.wrapping_shr(y as u32)),
            |x: u32, y: u32| Ok((x as i32).wrapping_shr(y) as u32)),
        (Op::ShiftRightLogical, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| Ok(((x as u32).wrapping_shr(y as u32)) as i32),
            |x: u32, y: u32| Ok(x.wrapping_shr(y))),
        (Op::BitwiseAnd, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| Ok(x & y),
            |x: u32, y: u32| Ok(x & y)),
        (Op::BitwiseOr, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| Ok(x | y),
            |x: u32, y: u32| Ok(x | y)),
        (Op::BitwiseXor, [a, b]) => int_binop!(op, a, b,
            |x: i32, y: i32| Ok(x ^ y),
            |x: u32, y: u32| Ok(x ^ y)),

        // Logic and comparison.
        (Op::LogicalAnd, [a, b]) => zip2(a, b, &|x, y| match (x.to_bool(), y.to_bool()) {
            (Some(x), Some(y)) => Ok(ConstantValue::from(x && y)),
            _ => Err(fail()),
        }),
        (Op::LogicalOr, [a, b]) => zip2(a, b, &|x, y| match (x.to_bool(), y.to_bool()) {
            (Some(x), Some(y)) => Ok(ConstantValue::from(x || y)),
            _ => Err(fail()),
        }),
        (Op::LogicalEqual, [a, b]) => zip2(a, b, &|x, y| match (x.to_bool(), y.to_bool()) {
            (Some(x), Some(y)) => Ok(ConstantValue::from(x == y)),
            _ => Err(fail()),
        }),
        (Op::LogicalNotEqual, [a, b]) => zip2(a, b, &|x, y| match (x.to_bool(), y.to_bool()) {
            (Some(x), Some(y)) => Ok(ConstantValue::from(x != y)),
            _ => Err(fail()),
        }),
        (Op::IEqual | Op::FOrdEqual, [a, b]) => cmp_binop!(op, a, b, |x, y| x == y),
        (Op::INotEqual | Op::FOrdNotEqual, [a, b]) => cmp_binop!(op, a, b, |x, y| x != y),
        (Op::SLessThan | Op::ULessThan | Op::FOrdLessThan, [a, b]) => {
            cmp_binop!(op, a, b, |x, y| x < y)
        }
        (Op::SGreaterThan | Op::UGreaterThan | Op::FOrdGreaterThan, [a, b]) => {
            cmp_binop!(op, a, b, |x, y| x > y)
        }
        (Op::SLessThanEqual | Op::ULessThanEqual | Op::FOrdLessThanEqual, [a, b]) => {
            cmp_binop!(op, a, b, |x, y| x <= y)
        }
        (Op::SGreaterThanEqual | Op::UGreaterThanEqual | Op::FOrdGreaterThanEqual, [a, b]) => {
            cmp_binop!(op, a, b, |x, y| x >= y)
        }

        // Select is only folded for a scalar condition.
        (Op::Select, [cond, a, b]) => match cond.to_bool() {
            Some(true) => Ok(a.clone()),
            Some(false) => Ok(b.clone()),
            None => Err(fail()),
        },

        // Conversions.
        (Op::ConvertFToS | Op::ConvertFToU | Op::ConvertSToF | Op::ConvertUToF, [x]) => {
            map1(x, &|x| x.cast(result_ty.base).ok_or_else(fail))
        }
        (Op::Bitcast, [x]) => map1(x, &|x| {
            let bits = match x {
                ConstantValue::S32(x) => *x as u32,
                ConstantValue::U32(x) => *x,
                ConstantValue::F32(x) => x.0.to_bits(),
                _ => return Err(fail()),
            };
            match result_ty.base {
                crate::ty::BaseType::Int => Ok(ConstantValue::from(bits as i32)),
                crate::ty::BaseType::Uint => Ok(ConstantValue::from(bits)),
                crate::ty::BaseType::Float => Ok(ConstantValue::from(f32::from_bits(bits))),
                _ => Err(fail()),
            }
        }),

        _ => Err(fail()),
    }
}

/// Evaluate the foldable subset of the GLSL.std.450 extended instructions.
pub fn evaluate_ext(glop: GLOp, operands: &[ConstantValue]) -> Result<ConstantValue> {
    let fail = || anyhow!("cannot evaluate {:?} with {:?}", glop, operands);
    let f1 = |x: &ConstantValue, f: &dyn Fn(f32) -> f32| {
        map1(x, &|x| x.to_f32().map(|x| ConstantValue::from(f(x))).ok_or_else(fail))
    };
    match (glop, operands) {
        (GLOp::FAbs, [x]) => f1(x, &f32::abs),
        (GLOp::SAbs, [x]) => map1(x, &|x| {
            x.to_s32()
                .map(|x| ConstantValue::from(x.wrapping_abs()))
                .ok_or_else(fail)
        }),
        (GLOp::Floor, [x]) => f1(x, &f32::floor),
        (GLOp::Ceil, [x]) => f1(x, &f32::ceil),
        (GLOp::Trunc, [x]) => f1(x, &f32::trunc),
        (GLOp::Round, [x]) => f1(x, &f32::round),
        (GLOp::Fract, [x]) => f1(x, &|x| x - x.floor()),
        (GLOp::Sqrt, [x]) => f1(x, &f32::sqrt),
        (GLOp::InverseSqrt, [x]) => f1(x, &|x| 1.0 / x.sqrt()),
        (GLOp::Exp, [x]) => f1(x, &f32::exp),
        (GLOp::Exp2, [x]) => f1(x, &f32::exp2),
        (GLOp::Log, [x]) => f1(x, &f32::ln),
        (GLOp::Log2, [x]) => f1(x, &f32::log2),
        (GLOp::Sin, [x]) => f1(x, &f32::sin),
        (GLOp::Cos, [x]) => f1(x, &f32::cos),
        (GLOp::Radians, [x]) => f1(x, &f32::to_radians),
        (GLOp::Degrees, [x]) => f1(x, &f32::to_degrees),
        (GLOp::NMin, [a, b]) | (GLOp::FMin, [a, b]) => {
            zip2(a, b, &|x, y| match (x.to_f32(), y.to_f32()) {
                (Some(x), Some(y)) => Ok(ConstantValue::from(x.min(y))),
                _ => Err(fail()),
            })
        }
        (GLOp::NMax, [a, b]) | (GLOp::FMax, [a, b]) => {
            zip2(a, b, &|x, y| match (x.to_f32(), y.to_f32()) {
                (Some(x), Some(y)) => Ok(ConstantValue::from(x.max(y))),
                _ => Err(fail()),
            })
        }
        (GLOp::NClamp, [x, lo, hi]) | (GLOp::FClamp, [x, lo, hi]) => {
            let lo = zip2(x, lo, &|x, y| match (x.to_f32(), y.to_f32()) {
                (Some(x), Some(y)) => Ok(ConstantValue::from(x.max(y))),
                _ => Err(fail()),
            })?;
            zip2(&lo, hi, &|x, y| match (x.to_f32(), y.to_f32()) {
                (Some(x), Some(y)) => Ok(ConstantValue::from(x.min(y))),
                _ => Err(fail()),
            })
        }
        (GLOp::FMix, [a, b, t]) => {
            let diff = zip2(b, a, &|x, y| match (x.to_f32(), y.to_f32()) {
                (Some(x), Some(y)) => Ok(ConstantValue::from(x - y)),
                _ => Err(fail()),
            })?;
            let scaled = zip2(&diff, t, &|x, y| match (x.to_f32(), y.to_f32()) {
                (Some(x), Some(y)) => Ok(ConstantValue::from(x * y)),
                _ => Err(fail()),
            })?;
            zip2(a, &scaled, &|x, y| match (x.to_f32(), y.to_f32()) {
                (Some(x), Some(y)) => Ok(ConstantValue::from(x + y)),
                _ => Err(fail()),
            })
        }
        (GLOp::Pow, [a, b]) => zip2(a, b, &|x, y| match (x.to_f32(), y.to_f32()) {
            (Some(x), Some(y)) => Ok(ConstantValue::from(x.powf(y))),
            _ => Err(fail()),
        }),
        _ => Err(fail()),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ty::{BaseType, Type};

    const INT: Type = Type::scalar(BaseType::Int);
    const FLOAT: Type = Type::scalar(BaseType::Float);

    #[test]
    fn test_integer_arithmetic() {
        let v = evaluate(Op::IMul, &INT, &[3.into(), 4.into()]).unwrap();
        assert_eq!(v, ConstantValue::S32(12));
        let v = evaluate(Op::IAdd, &INT, &[2.into(), 12.into()]).unwrap();
        assert_eq!(v, ConstantValue::S32(14));
    }

    #[test]
    fn test_division_by_zero_fails() {
        assert!(evaluate(Op::SDiv, &INT, &[1.into(), 0.into()]).is_err());
        assert!(evaluate(Op::SRem, &INT, &[1.into(), 0.into()]).is_err());
    }

    #[test]
    fn test_componentwise() {
        let a = ConstantValue::Composite(vec![1.0f32.into(), 2.0f32.into()]);
        let b = ConstantValue::Composite(vec![3.0f32.into(), 4.0f32.into()]);
        let v = evaluate(Op::FAdd, &FLOAT, &[a, b]).unwrap();
        assert_eq!(
            v,
            ConstantValue::Composite(vec![4.0f32.into(), 6.0f32.into()])
        );
    }

    #[test]
    fn test_broadcast() {
        let a = ConstantValue::Composite(vec![1.0f32.into(), 2.0f32.into()]);
        let v = evaluate(Op::FMul, &FLOAT, &[a, 2.0f32.into()]).unwrap();
        assert_eq!(
            v,
            ConstantValue::Composite(vec![2.0f32.into(), 4.0f32.into()])
        );
    }

    #[test]
    fn test_comparison() {
        let v = evaluate(Op::SLessThan, &INT, &[1.into(), 2.into()]).unwrap();
        assert_eq!(v, ConstantValue::Bool(true));
    }

    #[test]
    fn test_conversion() {
        let v = evaluate(Op::ConvertSToF, &FLOAT, &[3.into()]).unwrap();
        assert_eq!(v, ConstantValue::from(3.0f32));
    }

    #[test]
    fn test_ext() {
        let v = evaluate_ext(GLOp::NClamp, &[2.5f32.into(), 0.0f32.into(), 1.0f32.into()]).unwrap();
        assert_eq!(v, ConstantValue::from(1.0f32));
        let v = evaluate_ext(GLOp::Sqrt, &[4.0f32.into()]).unwrap();
        assert_eq!(v, ConstantValue::from(2.0f32));
    }
}
