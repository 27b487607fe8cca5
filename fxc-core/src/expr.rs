//! Expression values: a result id plus type, with the deferred access chain
//! that addresses l-value storage until a load or store materializes it.
use spirv::StorageClass;

use crate::{
    constant::ConstantValue,
    location::Location,
    ty::{Id, Type},
};

/// One deferred addressing step. `Member`, `StaticIndex` and `DynamicIndex`
/// extend an `OpAccessChain`; the remaining steps apply to the loaded value.
#[derive(Clone, Debug)]
pub enum AccessOp {
    /// Implicit or explicit conversion to another numeric type.
    Cast { to: Type },
    /// Struct member selection.
    Member { index: u32, ty: Type },
    /// Constant subscript into an array, matrix or vector.
    StaticIndex { index: u32, ty: Type },
    /// Dynamic subscript; `index` is the id of a scalar integer.
    DynamicIndex { index: Id, ty: Type },
    /// Vector component swizzle, up to four entries; unused entries are -1.
    Swizzle { mask: [i8; 4], count: u32, ty: Type },
    /// Matrix element swizzle; each entry is `row * 4 + col`.
    MatrixSwizzle { mask: [i8; 4], count: u32, ty: Type },
}

impl AccessOp {
    pub fn result_type(&self) -> &Type {
        match self {
            AccessOp::Cast { to } => to,
            AccessOp::Member { ty, .. } => ty,
            AccessOp::StaticIndex { ty, .. } => ty,
            AccessOp::DynamicIndex { ty, .. } => ty,
            AccessOp::Swizzle { ty, .. } => ty,
            AccessOp::MatrixSwizzle { ty, .. } => ty,
        }
    }
}

/// The value of a parsed expression. Constants carry their folded value and
/// no base id; l-values carry the variable id their chain is rooted at.
#[derive(Clone, Debug)]
pub struct Expression {
    pub base: Id,
    /// Type of `base`, before any chain step applies.
    pub base_ty: Type,
    /// Type after every chain step has applied.
    pub ty: Type,
    pub location: Location,
    pub is_lvalue: bool,
    pub storage: StorageClass,
    pub constant: Option<ConstantValue>,
    pub chain: Vec<AccessOp>,
}

impl Expression {
    /// A materialized right-hand-side value.
    pub fn rvalue(id: Id, ty: Type, location: Location) -> Expression {
        Expression {
            base: id,
            base_ty: ty,
            ty,
            location,
            is_lvalue: false,
            storage: StorageClass::Function,
            constant: None,
            chain: Vec::new(),
        }
    }
    /// An addressable variable reference.
    pub fn lvalue(id: Id, ty: Type, storage: StorageClass, location: Location) -> Expression {
        Expression {
            base: id,
            base_ty: ty,
            ty,
            location,
            is_lvalue: true,
            storage,
            constant: None,
            chain: Vec::new(),
        }
    }
    /// A folded compile-time constant.
    pub fn constant(value: ConstantValue, ty: Type, location: Location) -> Expression {
        Expression {
            base: 0,
            base_ty: ty,
            ty,
            location,
            is_lvalue: false,
            storage: StorageClass::Function,
            constant: Some(value),
            chain: Vec::new(),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.constant.is_some()
    }

    /// Append a conversion step, folding it away on constants.
    pub fn add_cast(&mut self, to: Type) {
        if let Some(value) = &self.constant {
            if let Some(folded) = cast_constant(value, &self.ty, &to) {
                self.constant = Some(folded);
                self.ty = to;
                return;
            }
            self.constant = None;
        }
        self.chain.push(AccessOp::Cast { to });
        self.ty = to;
    }

    pub fn add_member_access(&mut self, index: u32, ty: Type) {
        if let Some(ConstantValue::Composite(elems)) = &self.constant {
            if let Some(elem) = elems.get(index as usize) {
                self.constant = Some(elem.clone());
                self.ty = ty;
                return;
            }
            self.constant = None;
        }
        self.chain.push(AccessOp::Member { index, ty });
        self.ty = ty;
    }

    pub fn add_static_index(&mut self, index: u32, ty: Type) {
        if let Some(ConstantValue::Composite(elems)) = &self.constant {
            if let Some(elem) = elems.get(index as usize) {
                self.constant = Some(elem.clone());
                self.ty = ty;
                return;
            }
            self.constant = None;
        }
        self.chain.push(AccessOp::StaticIndex { index, ty });
        self.ty = ty;
    }

    pub fn add_dynamic_index(&mut self, index: Id, ty: Type) {
        self.constant = None;
        self.chain.push(AccessOp::DynamicIndex { index, ty });
        self.ty = ty;
    }

    pub fn add_swizzle_access(&mut self, mask: [i8; 4], count: u32, ty: Type) {
        if let Some(value) = &self.constant {
            let comps = value.components();
            let picked = mask[..count as usize]
                .iter()
                .map(|i| comps.get(*i as usize).cloned())
                .collect::<Option<Vec<_>>>();
            if let Some(mut picked) = picked {
                self.constant = Some(if picked.len() == 1 {
                    picked.remove(0)
                } else {
                    ConstantValue::Composite(picked)
                });
                self.ty = ty;
                return;
            }
            self.constant = None;
        }
        self.chain.push(AccessOp::Swizzle { mask, count, ty });
        self.ty = ty;
    }

    pub fn add_matrix_swizzle_access(&mut self, mask: [i8; 4], count: u32, ty: Type) {
        if let Some(value) = &self.constant {
            // Matrix constants are stored as columns of row components.
            let picked = mask[..count as usize]
                .iter()
                .map(|i| {
                    let (row, col) = ((*i >> 2) as usize, (*i & 3) as usize);
                    match value {
                        ConstantValue::Composite(cols) => match cols.get(col) {
                            Some(ConstantValue::Composite(rows)) => rows.get(row).cloned(),
                            _ => None,
                        },
                        _ => None,
                    }
                })
                .collect::<Option<Vec<_>>>();
            if let Some(mut picked) = picked {
                self.constant = Some(if picked.len() == 1 {
                    picked.remove(0)
                } else {
                    ConstantValue::Composite(picked)
                });
                self.ty = ty;
                return;
            }
            self.constant = None;
        }
        self.chain.push(AccessOp::MatrixSwizzle { mask, count, ty });
        self.ty = ty;
    }
}

/// Constant-space conversion between two numeric shapes: base change,
/// scalar broadcast, and vector/matrix truncation.
pub fn cast_constant(value: &ConstantValue, from: &Type, to: &Type) -> Option<ConstantValue> {
    if from.is_array() || to.is_array() || !from.is_numeric() || !to.is_numeric() {
        return None;
    }
    let value = value.cast(to.base)?;
    if from.rows == to.rows && from.cols == to.cols {
        return Some(value);
    }
    let comps = value.components();
    let pick = |row: u32, col: u32| -> Option<ConstantValue> {
        if from.is_scalar() {
            comps.first().cloned()
        } else {
            // Stored column-major: column col holds component row.
            comps.get((col * from.rows + row) as usize).cloned()
        }
    };
    if to.is_matrix() {
        let cols = (0..to.cols)
            .map(|c| {
                let rows = (0..to.rows).map(|r| pick(r, c)).collect::<Option<Vec<_>>>()?;
                Some(ConstantValue::Composite(rows))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(ConstantValue::Composite(cols))
    } else if to.rows > 1 {
        let rows = (0..to.rows).map(|r| pick(r, 0)).collect::<Option<Vec<_>>>()?;
        Some(ConstantValue::Composite(rows))
    } else {
        pick(0, 0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ty::BaseType;

    const FLOAT: Type = Type::scalar(BaseType::Float);
    const FLOAT2: Type = Type::vector(BaseType::Float, 2);
    const FLOAT4: Type = Type::vector(BaseType::Float, 4);

    #[test]
    fn test_constant_swizzle() {
        let value = ConstantValue::Composite(vec![
            1.0f32.into(),
            2.0f32.into(),
            3.0f32.into(),
            4.0f32.into(),
        ]);
        let mut expr = Expression::constant(value, FLOAT4, Location::default());
        expr.add_swizzle_access([3, 0, -1, -1], 2, FLOAT2);
        assert_eq!(
            expr.constant,
            Some(ConstantValue::Composite(vec![4.0f32.into(), 1.0f32.into()]))
        );
        assert!(expr.chain.is_empty());
    }

    #[test]
    fn test_constant_cast_broadcast() {
        let mut expr = Expression::constant(2.0f32.into(), FLOAT, Location::default());
        expr.add_cast(FLOAT4);
        match expr.constant {
            Some(ConstantValue::Composite(ref elems)) => assert_eq!(elems.len(), 4),
            ref other => panic!("unexpected constant: {:?}", other),
        }
    }

    #[test]
    fn test_constant_truncation() {
        let value = ConstantValue::Composite(vec![
            1.0f32.into(),
            2.0f32.into(),
            3.0f32.into(),
            4.0f32.into(),
        ]);
        let mut expr = Expression::constant(value, FLOAT4, Location::default());
        expr.add_cast(FLOAT2);
        assert_eq!(
            expr.constant,
            Some(ConstantValue::Composite(vec![1.0f32.into(), 2.0f32.into()]))
        );
    }

    #[test]
    fn test_lvalue_chain_accumulates() {
        let mut expr = Expression::lvalue(42, FLOAT4, StorageClass::Private, Location::default());
        expr.add_static_index(1, FLOAT);
        assert_eq!(expr.chain.len(), 1);
        assert!(expr.is_lvalue);
        assert_eq!(expr.ty, FLOAT);
    }
}
