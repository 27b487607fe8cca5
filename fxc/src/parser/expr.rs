//! Expression parsing: Pratt-style precedence climbing, l-value chains,
//! swizzles, constructors, calls and constant folding.
use fxc_core::spirv::{Capability, Op, StorageClass};
use fxc_core::ty::qual;
use fxc_core::{eval, module};
use fxc_core::{BaseType, ConstantValue, Expression, Id, Instruction, Location, Type};

use super::Parser;
use crate::intrinsic::{Intrinsic, Lowering};
use crate::lexer::{TokenId, TokenValue};
use crate::symbol::{CallError, CallSymbol, Scope, SymbolKind};

impl<'a> Parser<'a> {
    // ------------------------------------------------------------------
    // Operator tables
    // ------------------------------------------------------------------

    fn accept_unary_op(&mut self) -> Option<Op> {
        let op = match self.lookahead().id {
            TokenId::Exclaim => Op::LogicalNot,
            TokenId::Plus => Op::Nop,
            TokenId::Minus => Op::FNegate,
            TokenId::Tilde => Op::Not,
            TokenId::PlusPlus => Op::FAdd,
            TokenId::MinusMinus => Op::FSub,
            _ => return None,
        };
        self.consume();
        Some(op)
    }

    fn accept_postfix_op(&mut self) -> Option<Op> {
        let op = match self.lookahead().id {
            TokenId::PlusPlus => Op::FAdd,
            TokenId::MinusMinus => Op::FSub,
            _ => return None,
        };
        self.consume();
        Some(op)
    }

    /// Binary and ternary operators with their precedence; higher binds
    /// tighter. The returned opcode is generic and is specialized to the
    /// operand base type at emission.
    fn peek_multary_op(&self) -> Option<(Op, u32)> {
        let entry = match self.lookahead().id {
            TokenId::Question => (Op::Select, 1),
            TokenId::PipePipe => (Op::LogicalOr, 2),
            TokenId::AmpAmp => (Op::LogicalAnd, 3),
            TokenId::Pipe => (Op::BitwiseOr, 4),
            TokenId::Caret => (Op::BitwiseXor, 5),
            TokenId::Ampersand => (Op::BitwiseAnd, 6),
            TokenId::EqualEqual => (Op::LogicalEqual, 7),
            TokenId::ExclaimEqual => (Op::LogicalNotEqual, 7),
            TokenId::Less => (Op::FOrdLessThan, 8),
            TokenId::Greater => (Op::FOrdGreaterThan, 8),
            TokenId::LessEqual => (Op::FOrdLessThanEqual, 8),
            TokenId::GreaterEqual => (Op::FOrdGreaterThanEqual, 8),
            TokenId::LessLess => (Op::ShiftLeftLogical, 9),
            TokenId::GreaterGreater => (Op::ShiftRightLogical, 9),
            TokenId::Plus => (Op::FAdd, 10),
            TokenId::Minus => (Op::FSub, 10),
            TokenId::Star => (Op::FMul, 11),
            TokenId::Slash => (Op::FDiv, 11),
            TokenId::Percent => (Op::FMod, 11),
            _ => return None,
        };
        Some(entry)
    }

    fn accept_assignment_op(&mut self) -> Option<Op> {
        let op = match self.lookahead().id {
            TokenId::Equal => Op::Nop,
            TokenId::PercentEqual => Op::FMod,
            TokenId::AmpEqual => Op::BitwiseAnd,
            TokenId::StarEqual => Op::FMul,
            TokenId::PlusEqual => Op::FAdd,
            TokenId::MinusEqual => Op::FSub,
            TokenId::SlashEqual => Op::FDiv,
            TokenId::LessLessEqual => Op::ShiftLeftLogical,
            TokenId::GreaterGreaterEqual => Op::ShiftRightLogical,
            TokenId::CaretEqual => Op::BitwiseXor,
            TokenId::PipeEqual => Op::BitwiseOr,
            _ => return None,
        };
        self.consume();
        Some(op)
    }

    // ------------------------------------------------------------------
    // Materialization helpers
    // ------------------------------------------------------------------

    /// Materialize the expression into a value id in the current block.
    pub(crate) fn load(&mut self, expression: &mut Expression) -> Id {
        self.module.access_chain_load(expression)
    }

    /// Append an implicit conversion towards `target`, folding on constants.
    pub(crate) fn apply_implicit_cast(&mut self, expression: &mut Expression, target: &Type) {
        if expression.ty.base == target.base
            && expression.ty.rows == target.rows
            && expression.ty.cols == target.cols
        {
            return;
        }
        let mut to = *target;
        to.qualifiers = expression.ty.qualifiers;
        to.array_length = expression.ty.array_length;
        expression.add_cast(to);
    }

    // ------------------------------------------------------------------
    // Expression grammar
    // ------------------------------------------------------------------

    /// Comma expression; the last element is the result.
    pub(crate) fn parse_expression(&mut self, out: &mut Expression) -> bool {
        if !self.parse_expression_assignment(out) {
            return false;
        }
        while self.accept(TokenId::Comma) {
            if !self.parse_expression_assignment(out) {
                return false;
            }
        }
        true
    }

    pub(crate) fn parse_expression_assignment(&mut self, out: &mut Expression) -> bool {
        if !self.parse_expression_multary(out, 0) {
            return false;
        }

        let op = match self.accept_assignment_op() {
            Some(op) => op,
            None => return true,
        };
        let location = self.tok.location.clone();

        let mut right = Expression::constant(
            ConstantValue::S32(0),
            Type::scalar(BaseType::Int),
            self.next.location.clone(),
        );
        if !self.parse_expression_multary(&mut right, 0) {
            return false;
        }

        if !out.is_lvalue
            || out.ty.has_qualifier(qual::CONST)
            || out.ty.has_qualifier(qual::UNIFORM)
        {
            self.error(&out.location.clone(), 3025, "l-value specifies const object");
            return false;
        }
        if out.ty.is_array() || right.ty.is_array() || Type::rank(&right.ty, &out.ty) == 0 {
            self.error(&right.location.clone(), 3020, "cannot convert these types");
            return false;
        }
        if right.ty.rows > out.ty.rows || right.ty.cols > out.ty.cols {
            self.warning(&right.location.clone(), 3206, "implicit truncation of vector type");
        }

        let mut target = out.ty;
        target.qualifiers = 0;
        self.apply_implicit_cast(&mut right, &target);

        let value = if op != Op::Nop {
            let mut left_value = out.clone();
            let lhs = self.load(&mut left_value);
            let rhs = self.load(&mut right);
            let specialized = specialize_op(op, &target);
            let result_type = self.module.convert_type(&target);
            let id = self.module.make_id();
            self.module.emit(
                Instruction::new(specialized)
                    .with_type(result_type)
                    .with_result(id)
                    .push(lhs)
                    .push(rhs)
                    .at(location.clone()),
            );
            id
        } else {
            self.load(&mut right)
        };

        self.module.access_chain_store(out, value, &target);
        *out = Expression::rvalue(value, target, location);
        true
    }

    pub(crate) fn parse_expression_multary(
        &mut self,
        out: &mut Expression,
        left_precedence: u32,
    ) -> bool {
        if !self.parse_expression_unary(out) {
            return false;
        }

        while let Some((op, precedence)) = self.peek_multary_op() {
            if precedence <= left_precedence {
                break;
            }
            self.consume();

            if op == Op::Select {
                if !self.parse_ternary(out) {
                    return false;
                }
                continue;
            }

            let mut right = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                self.next.location.clone(),
            );
            if !self.parse_expression_multary(&mut right, precedence) {
                return false;
            }
            if !self.emit_binary_op(op, out, right) {
                return false;
            }
        }
        true
    }

    fn parse_ternary(&mut self, out: &mut Expression) -> bool {
        let location = self.tok.location.clone();
        if !out.ty.is_scalar() && !out.ty.is_vector() {
            self.error(&out.location.clone(), 3022, "boolean or vector expression expected");
            return false;
        }

        let mut true_expr = Expression::constant(
            ConstantValue::S32(0),
            Type::scalar(BaseType::Int),
            self.next.location.clone(),
        );
        let mut false_expr = true_expr.clone();
        if !(self.parse_expression(&mut true_expr)
            && self.expect(TokenId::Colon)
            && self.parse_expression_assignment(&mut false_expr))
        {
            return false;
        }

        if true_expr.ty.is_array()
            || false_expr.ty.is_array()
            || true_expr.ty.definition != false_expr.ty.definition
        {
            self.error(&true_expr.location.clone(), 3020, "type mismatch between conditional values");
            return false;
        }

        let result_ty = merge_types(self, &true_expr, &false_expr, false);
        self.apply_implicit_cast(&mut true_expr, &result_ty);
        self.apply_implicit_cast(&mut false_expr, &result_ty);

        // The condition folds the whole expression when constant.
        if let Some(condition) = out.constant.as_ref().and_then(|x| x.to_bool()) {
            let chosen = if condition { true_expr } else { false_expr };
            *out = chosen;
            return true;
        }

        let mut condition_ty = result_ty;
        condition_ty.base = BaseType::Bool;
        condition_ty.qualifiers = 0;
        let mut condition = out.clone();
        self.apply_implicit_cast(&mut condition, &condition_ty);

        let condition = self.load(&mut condition);
        let true_value = self.load(&mut true_expr);
        let false_value = self.load(&mut false_expr);

        let result_type = self.module.convert_type(&result_ty);
        let id = self.module.make_id();
        self.module.emit(
            Instruction::new(Op::Select)
                .with_type(result_type)
                .with_result(id)
                .push(condition)
                .push(true_value)
                .push(false_value)
                .at(location.clone()),
        );
        *out = Expression::rvalue(id, result_ty, location);
        true
    }

    fn emit_binary_op(&mut self, op: Op, out: &mut Expression, mut right: Expression) -> bool {
        let location = out.location.clone();
        let boolean = matches!(
            op,
            Op::LogicalAnd
                | Op::LogicalOr
                | Op::LogicalEqual
                | Op::LogicalNotEqual
                | Op::FOrdLessThan
                | Op::FOrdGreaterThan
                | Op::FOrdLessThanEqual
                | Op::FOrdGreaterThanEqual
        );

        match op {
            Op::LogicalEqual | Op::LogicalNotEqual => {
                if out.ty.is_array()
                    || right.ty.is_array()
                    || out.ty.definition != right.ty.definition
                {
                    self.error(&right.location.clone(), 3020, "type mismatch");
                    return false;
                }
            }
            Op::BitwiseAnd | Op::BitwiseOr | Op::BitwiseXor
            | Op::ShiftLeftLogical | Op::ShiftRightLogical => {
                if !out.ty.is_integral() {
                    self.error(&out.location.clone(), 3082, "int or unsigned int type required");
                    return false;
                }
                if !right.ty.is_integral() {
                    self.error(&right.location.clone(), 3082, "int or unsigned int type required");
                    return false;
                }
            }
            _ => {
                if !out.ty.is_scalar() && !out.ty.is_vector() && !out.ty.is_matrix() {
                    self.error(&out.location.clone(), 3022, "scalar, vector, or matrix expected");
                    return false;
                }
                if !right.ty.is_scalar() && !right.ty.is_vector() && !right.ty.is_matrix() {
                    self.error(&right.location.clone(), 3022, "scalar, vector, or matrix expected");
                    return false;
                }
            }
        }

        // The common operand type; shifts keep the left base type.
        let mut operand_ty = merge_types(self, out, &right, boolean);
        if matches!(op, Op::ShiftLeftLogical | Op::ShiftRightLogical) {
            operand_ty.base = out.ty.base;
        }
        if matches!(op, Op::LogicalAnd | Op::LogicalOr) {
            operand_ty.base = BaseType::Bool;
        }
        self.apply_implicit_cast(out, &operand_ty);
        self.apply_implicit_cast(&mut right, &operand_ty);

        let mut result_ty = operand_ty;
        if boolean {
            result_ty.base = BaseType::Bool;
        }
        result_ty.qualifiers = qual::CONST;

        let specialized = specialize_op(op, &operand_ty);

        // Constant folding after every binary node.
        if let (Some(left_value), Some(right_value)) = (&out.constant, &right.constant) {
            if let Ok(folded) = eval::evaluate(
                specialized,
                &result_ty,
                &[left_value.clone(), right_value.clone()],
            ) {
                *out = Expression::constant(folded, result_ty, location);
                return true;
            }
        }

        let lhs = self.load(out);
        let rhs = self.load(&mut right);
        let result_type = self.module.convert_type(&result_ty);
        let id = self.module.make_id();
        self.module.emit(
            Instruction::new(specialized)
                .with_type(result_type)
                .with_result(id)
                .push(lhs)
                .push(rhs)
                .at(location.clone()),
        );
        *out = Expression::rvalue(id, result_ty, location);
        true
    }

    pub(crate) fn parse_expression_unary(&mut self, out: &mut Expression) -> bool {
        let location = self.next.location.clone();

        if let Some(op) = self.accept_unary_op() {
            if !self.parse_expression_unary(out) {
                return false;
            }
            if !out.ty.is_scalar() && !out.ty.is_vector() && !out.ty.is_matrix() {
                self.error(&out.location.clone(), 3022, "scalar, vector, or matrix expected");
                return false;
            }
            match op {
                Op::Nop => {}
                Op::Not => {
                    if !out.ty.is_integral() {
                        self.error(&out.location.clone(), 3082, "int or unsigned int type required");
                        return false;
                    }
                    self.fold_or_emit_unary(Op::Not, out, location);
                }
                Op::LogicalNot => {
                    let mut bool_ty = out.ty;
                    bool_ty.base = BaseType::Bool;
                    bool_ty.qualifiers = 0;
                    self.apply_implicit_cast(out, &bool_ty);
                    self.fold_or_emit_unary(Op::LogicalNot, out, location);
                }
                Op::FNegate => {
                    let negate = if out.ty.is_floating_point() {
                        Op::FNegate
                    } else {
                        Op::SNegate
                    };
                    self.fold_or_emit_unary(negate, out, location);
                }
                // Pre-increment and pre-decrement.
                Op::FAdd | Op::FSub => {
                    if !self.emit_step(out, op == Op::FAdd, true, location) {
                        return false;
                    }
                }
                _ => {}
            }
            return true;
        }

        if self.accept(TokenId::ParenOpen) {
            self.backup();

            let mut cast_ty = Type::VOID;
            if self.accept_type_class(&mut cast_ty) {
                if self.peek(TokenId::ParenOpen) {
                    // A constructor call in parentheses, not a cast.
                    self.restore();
                } else if self.expect(TokenId::ParenClose) {
                    if !self.parse_expression_unary(out) {
                        return false;
                    }
                    return self.apply_explicit_cast(out, cast_ty, location);
                } else {
                    return false;
                }
            }

            if !self.parse_expression(out) {
                return false;
            }
            return self.expect(TokenId::ParenClose);
        }

        if self.accept(TokenId::TrueLiteral) || self.accept(TokenId::FalseLiteral) {
            let value = self.tok.id == TokenId::TrueLiteral;
            let mut ty = Type::scalar(BaseType::Bool);
            ty.qualifiers = qual::CONST;
            *out = Expression::constant(ConstantValue::Bool(value), ty, location);
            return true;
        }
        if self.accept(TokenId::IntLiteral) {
            let mut ty = Type::scalar(BaseType::Int);
            ty.qualifiers = qual::CONST;
            *out = Expression::constant(
                ConstantValue::S32(self.tok.value.as_int()),
                ty,
                location,
            );
            return true;
        }
        if self.accept(TokenId::UintLiteral) {
            let mut ty = Type::scalar(BaseType::Uint);
            ty.qualifiers = qual::CONST;
            *out = Expression::constant(
                ConstantValue::U32(self.tok.value.as_uint()),
                ty,
                location,
            );
            return true;
        }
        if self.accept(TokenId::FloatLiteral) || self.accept(TokenId::DoubleLiteral) {
            let value = match self.tok.value {
                TokenValue::Float(x) => x,
                TokenValue::Double(x) => x as f32,
                _ => 0.0,
            };
            let mut ty = Type::scalar(BaseType::Float);
            ty.qualifiers = qual::CONST;
            *out = Expression::constant(ConstantValue::from(value), ty, location);
            return true;
        }
        if self.accept(TokenId::StringLiteral) {
            // Adjacent string literals concatenate.
            let mut value = self.tok.value.as_str().to_owned();
            while self.accept(TokenId::StringLiteral) {
                value.push_str(self.tok.value.as_str());
            }
            let mut ty = Type::VOID;
            ty.base = BaseType::String;
            ty.qualifiers = qual::CONST;
            *out = Expression::constant(ConstantValue::Str(value), ty, location);
            return true;
        }

        let mut constructed = Type::VOID;
        if self.accept_type_class(&mut constructed) {
            if !self.parse_constructor(out, constructed, location) {
                return false;
            }
        } else if !self.parse_identifier_expression(out, location) {
            return false;
        }

        // Postfix operators.
        while !self.peek(TokenId::EndOfFile) {
            let location = self.next.location.clone();

            if let Some(op) = self.accept_postfix_op() {
                if !out.ty.is_scalar() && !out.ty.is_vector() && !out.ty.is_matrix() {
                    self.error(&out.location.clone(), 3022, "scalar, vector, or matrix expected");
                    return false;
                }
                if !self.emit_step(out, op == Op::FAdd, false, location) {
                    return false;
                }
            } else if self.accept(TokenId::Dot) {
                if !self.expect(TokenId::Identifier) {
                    return false;
                }
                let location = self.tok.location.clone();
                let subscript = self.tok.value.as_str().to_owned();

                if self.accept(TokenId::ParenOpen) {
                    if !out.ty.is_struct() || out.ty.is_array() {
                        self.error(&location, 3087, "object does not have methods");
                    } else {
                        self.error(&location, 3088, "structures do not have methods");
                    }
                    return false;
                }
                if !self.parse_subscript(out, &subscript, location) {
                    return false;
                }
            } else if self.accept(TokenId::BracketOpen) {
                if !self.parse_index(out, location) {
                    return false;
                }
            } else {
                break;
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Postfix pieces
    // ------------------------------------------------------------------

    /// `.subscript` on a vector, matrix, struct or scalar.
    fn parse_subscript(&mut self, out: &mut Expression, subscript: &str, location: Location) -> bool {
        if out.ty.is_array() {
            self.error(&location, 3018, "invalid subscript on array");
            return false;
        }

        if out.ty.is_vector() {
            let length = subscript.len();
            if length > 4 {
                let message = format!("invalid subscript '{}', swizzle too long", subscript);
                self.error(&location, 3018, &message);
                return false;
            }
            let mut offsets = [-1i8; 4];
            let mut sets = [0u8; 4];
            let mut repeated = false;
            for (i, c) in subscript.bytes().enumerate() {
                let (offset, set) = match c {
                    b'x' => (0, 0),
                    b'y' => (1, 0),
                    b'z' => (2, 0),
                    b'w' => (3, 0),
                    b'r' => (0, 1),
                    b'g' => (1, 1),
                    b'b' => (2, 1),
                    b'a' => (3, 1),
                    b's' => (0, 2),
                    b't' => (1, 2),
                    b'p' => (2, 2),
                    b'q' => (3, 2),
                    _ => {
                        let message = format!("invalid subscript '{}'", subscript);
                        self.error(&location, 3018, &message);
                        return false;
                    }
                };
                offsets[i] = offset;
                sets[i] = set;
                if i > 0 && sets[i] != sets[i - 1] {
                    let message = format!("invalid subscript '{}', mixed swizzle sets", subscript);
                    self.error(&location, 3018, &message);
                    return false;
                }
                if offset as u32 >= out.ty.rows {
                    let message =
                        format!("invalid subscript '{}', swizzle out of range", subscript);
                    self.error(&location, 3018, &message);
                    return false;
                }
                if offsets[..i].contains(&offset) {
                    repeated = true;
                }
            }
            let mut ty = out.ty;
            ty.rows = length as u32;
            ty.cols = 1;
            if repeated || out.ty.has_qualifier(qual::UNIFORM) {
                ty.qualifiers |= qual::CONST;
                ty.qualifiers &= !qual::UNIFORM;
            }
            out.add_swizzle_access(offsets, length as u32, ty);
            return true;
        }

        if out.ty.is_matrix() {
            let bytes = subscript.as_bytes();
            if bytes.len() < 3 {
                let message = format!("invalid subscript '{}'", subscript);
                self.error(&location, 3018, &message);
                return false;
            }
            // `_11` is 1-based, `_m00` 0-based; the two forms do not mix.
            let zero_based = bytes[1] == b'm';
            let step = if zero_based { 4 } else { 3 };
            let base_digit = if zero_based { b'0' } else { b'1' };
            let mut offsets = [-1i8; 4];
            let mut count = 0usize;
            let mut repeated = false;
            let mut i = 0usize;
            while i < bytes.len() {
                if count >= 4
                    || bytes[i] != b'_'
                    || bytes.len() < i + step
                    || (zero_based && bytes[i + 1] != b'm')
                {
                    let message = format!("invalid subscript '{}'", subscript);
                    self.error(&location, 3018, &message);
                    return false;
                }
                let row_digit = bytes[i + step - 2];
                let col_digit = bytes[i + step - 1];
                if row_digit < base_digit
                    || row_digit > base_digit + 3
                    || col_digit < base_digit
                    || col_digit > base_digit + 3
                {
                    let message = format!("invalid subscript '{}'", subscript);
                    self.error(&location, 3018, &message);
                    return false;
                }
                let row = (row_digit - base_digit) as u32;
                let col = (col_digit - base_digit) as u32;
                if row >= out.ty.rows || col >= out.ty.cols {
                    let message =
                        format!("invalid subscript '{}', swizzle out of range", subscript);
                    self.error(&location, 3018, &message);
                    return false;
                }
                let offset = (row * 4 + col) as i8;
                if offsets[..count].contains(&offset) {
                    repeated = true;
                }
                offsets[count] = offset;
                count += 1;
                i += step;
            }
            let mut ty = out.ty;
            ty.rows = count as u32;
            ty.cols = 1;
            if repeated || out.ty.has_qualifier(qual::UNIFORM) {
                ty.qualifiers |= qual::CONST;
                ty.qualifiers &= !qual::UNIFORM;
            }
            out.add_matrix_swizzle_access(offsets, count as u32, ty);
            return true;
        }

        if out.ty.is_struct() {
            let member = self
                .struct_info(out.ty.definition)
                .and_then(|info| {
                    info.members
                        .iter()
                        .enumerate()
                        .find(|(_, member)| member.name == subscript)
                        .map(|(index, member)| (index as u32, member.ty))
                });
            let (index, mut ty) = match member {
                Some(found) => found,
                None => {
                    let message = format!("invalid subscript '{}'", subscript);
                    self.error(&location, 3018, &message);
                    return false;
                }
            };
            if out.ty.has_qualifier(qual::UNIFORM) {
                ty.qualifiers |= qual::CONST;
                ty.qualifiers &= !qual::UNIFORM;
            }
            out.add_member_access(index, ty);
            return true;
        }

        if out.ty.is_scalar() {
            let length = subscript.len();
            if length > 4 || !subscript.bytes().all(|c| matches!(c, b'x' | b'r' | b's')) {
                let message = format!("invalid subscript '{}'", subscript);
                self.error(&location, 3018, &message);
                return false;
            }
            let mut ty = out.ty;
            ty.rows = length as u32;
            ty.qualifiers |= qual::CONST;
            out.add_swizzle_access([0, 0, 0, 0], length as u32, ty);
            return true;
        }

        let message = format!("invalid subscript '{}'", subscript);
        self.error(&location, 3018, &message);
        false
    }

    /// `[index]` on an array, matrix or vector.
    fn parse_index(&mut self, out: &mut Expression, location: Location) -> bool {
        if !out.ty.is_array() && !out.ty.is_vector() && !out.ty.is_matrix() {
            self.error(
                &location,
                3121,
                "array, matrix, vector, or indexable object type expected in index expression",
            );
            return false;
        }

        let mut index = Expression::constant(
            ConstantValue::S32(0),
            Type::scalar(BaseType::Int),
            self.next.location.clone(),
        );
        if !self.parse_expression(&mut index) {
            return false;
        }
        if !index.ty.is_scalar() {
            self.error(&index.location.clone(), 3120, "invalid type for index - index must be a scalar");
            return false;
        }

        let mut ty = out.ty;
        if out.ty.is_array() {
            ty.array_length = 0;
        } else if out.ty.is_matrix() {
            ty.cols = 1;
        } else {
            ty.rows = 1;
        }

        match index.constant.as_ref().and_then(|x| x.to_u32()) {
            Some(constant) => out.add_static_index(constant, ty),
            None => {
                let index_id = self.load(&mut index);
                out.add_dynamic_index(index_id, ty);
            }
        }
        self.expect(TokenId::BracketClose)
    }

    /// Shared by `++x`/`--x` and `x++`/`x--`: load, add or subtract one,
    /// store back. Prefix yields the new value, postfix the old one.
    fn emit_step(&mut self, out: &mut Expression, add: bool, prefix: bool, location: Location) -> bool {
        if out.ty.has_qualifier(qual::CONST) || !out.is_lvalue {
            self.error(&out.location.clone(), 3025, "l-value specifies const object");
            return false;
        }

        let ty = out.ty;
        let old = self.load(&mut out.clone());
        let one = match ty.base {
            BaseType::Float => ConstantValue::from(1.0f32),
            BaseType::Uint => ConstantValue::U32(1),
            _ => ConstantValue::S32(1),
        };
        let one = if ty.is_vector() {
            ConstantValue::Composite(vec![one; ty.rows as usize])
        } else {
            one
        };
        let one = self.module.convert_constant(&ty, &one);

        let op = match (ty.base, add) {
            (BaseType::Float, true) => Op::FAdd,
            (BaseType::Float, false) => Op::FSub,
            (_, true) => Op::IAdd,
            (_, false) => Op::ISub,
        };
        let result_type = self.module.convert_type(&ty);
        let new = self.module.make_id();
        self.module.emit(
            Instruction::new(op)
                .with_type(result_type)
                .with_result(new)
                .push(old)
                .push(one)
                .at(location.clone()),
        );
        self.module.access_chain_store(out, new, &ty);

        let mut result_ty = ty;
        result_ty.qualifiers |= qual::CONST;
        *out = Expression::rvalue(if prefix { new } else { old }, result_ty, location);
        true
    }

    fn fold_or_emit_unary(&mut self, op: Op, out: &mut Expression, location: Location) {
        let mut result_ty = out.ty;
        result_ty.qualifiers |= qual::CONST;

        if let Some(value) = &out.constant {
            if let Ok(folded) = eval::evaluate(op, &result_ty, &[value.clone()]) {
                *out = Expression::constant(folded, result_ty, location);
                return;
            }
        }
        let value = self.load(out);
        let result_type = self.module.convert_type(&result_ty);
        let id = self.module.make_id();
        self.module.emit(
            Instruction::new(op)
                .with_type(result_type)
                .with_result(id)
                .push(value)
                .at(location.clone()),
        );
        *out = Expression::rvalue(id, result_ty, location);
    }

    // ------------------------------------------------------------------
    // Casts and constructors
    // ------------------------------------------------------------------

    fn apply_explicit_cast(&mut self, out: &mut Expression, ty: Type, location: Location) -> bool {
        if out.ty.base == ty.base
            && out.ty.rows == ty.rows
            && out.ty.cols == ty.cols
            && !(out.ty.is_array() || ty.is_array())
        {
            return true;
        }
        if out.ty.is_numeric() && ty.is_numeric() {
            if (out.ty.rows < ty.rows || out.ty.cols < ty.cols) && !out.ty.is_scalar() {
                self.error(&location, 3017, "cannot convert these vector types");
                return false;
            }
            if out.ty.rows > ty.rows || out.ty.cols > ty.cols {
                self.warning(&location, 3206, "implicit truncation of vector type");
            }
            let mut target = ty;
            target.qualifiers = out.ty.qualifiers | qual::CONST;
            out.add_cast(target);
            return true;
        }
        self.error(&location, 3017, "cannot convert non-numeric types");
        false
    }

    /// `T(a, b, …)` where `T` is a numeric type: component concatenation, or
    /// a cast when there is a single argument.
    fn parse_constructor(&mut self, out: &mut Expression, ty: Type, location: Location) -> bool {
        if !self.expect(TokenId::ParenOpen) {
            return false;
        }
        if !ty.is_numeric() {
            self.error(&location, 3037, "constructors only defined for numeric base types");
            return false;
        }
        if self.accept(TokenId::ParenClose) {
            self.error(&location, 3014, "incorrect number of arguments to numeric-type constructor");
            return false;
        }

        let mut arguments = Vec::new();
        while !self.peek(TokenId::ParenClose) {
            if !arguments.is_empty() && !self.expect(TokenId::Comma) {
                return false;
            }
            let mut argument = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                self.next.location.clone(),
            );
            if !self.parse_expression_assignment(&mut argument) {
                return false;
            }
            if !argument.ty.is_numeric() {
                self.error(&argument.location.clone(), 3017, "cannot convert non-numeric types");
                return false;
            }
            arguments.push(argument);
        }
        if !self.expect(TokenId::ParenClose) {
            return false;
        }

        if arguments.len() == 1 {
            let mut argument = arguments.remove(0);
            if !self.apply_explicit_cast(&mut argument, ty, location) {
                return false;
            }
            *out = argument;
            return true;
        }

        let components: u32 = arguments.iter().map(|x| x.ty.component_count()).sum();
        if components != ty.component_count() {
            self.error(&location, 3014, "incorrect number of arguments to numeric-type constructor");
            return false;
        }

        // Cast every argument's base type to the constructed base type.
        for argument in arguments.iter_mut() {
            let mut target = argument.ty;
            target.base = ty.base;
            self.apply_implicit_cast(argument, &target);
        }

        let mut result_ty = ty;
        result_ty.qualifiers = qual::CONST;

        if arguments.iter().all(|x| x.is_constant()) {
            let mut components = Vec::new();
            for argument in &arguments {
                components.extend(argument.constant.as_ref().unwrap().components());
            }
            let value = shape_components(components, &result_ty);
            *out = Expression::constant(value, result_ty, location);
            return true;
        }

        let result_type = self.module.convert_type(&result_ty);
        if ty.is_matrix() {
            // Flatten to scalars, regroup into column vectors.
            let scalar_ty = Type::scalar(ty.base);
            let scalar_type = self.module.convert_type(&scalar_ty);
            let mut scalars = Vec::new();
            for argument in arguments.iter_mut() {
                let count = argument.ty.component_count();
                let value = self.load(argument);
                if count == 1 {
                    scalars.push(value);
                } else {
                    for index in 0..count {
                        let id = self.module.make_id();
                        self.module.emit(
                            Instruction::new(Op::CompositeExtract)
                                .with_type(scalar_type)
                                .with_result(id)
                                .push(value)
                                .push(index)
                                .at(location.clone()),
                        );
                        scalars.push(id);
                    }
                }
            }
            let column_ty = Type::vector(ty.base, ty.rows);
            let column_type = self.module.convert_type(&column_ty);
            let mut columns = Vec::new();
            for col in 0..ty.cols {
                let id = self.module.make_id();
                let mut instr = Instruction::new(Op::CompositeConstruct)
                    .with_type(column_type)
                    .with_result(id)
                    .at(location.clone());
                // Arguments read row-major; columns gather the strided
                // components.
                for row in 0..ty.rows {
                    instr = instr.push(scalars[(row * ty.cols + col) as usize]);
                }
                columns.push(instr);
            }
            let mut column_ids = Vec::new();
            for instr in columns {
                column_ids.push(instr.result);
                self.module.emit(instr);
            }
            let id = self.module.make_id();
            self.module.emit(
                Instruction::new(Op::CompositeConstruct)
                    .with_type(result_type)
                    .with_result(id)
                    .push_list(&column_ids)
                    .at(location.clone()),
            );
            *out = Expression::rvalue(id, result_ty, location);
        } else {
            // Vectors accept scalar and vector arguments directly.
            let mut instr = Instruction::new(Op::CompositeConstruct)
                .with_type(result_type)
                .with_result(self.module.make_id())
                .at(location.clone());
            for argument in arguments.iter_mut() {
                let value = self.load(argument);
                instr = instr.push(value);
            }
            let id = instr.result;
            self.module.emit(instr);
            *out = Expression::rvalue(id, result_ty, location);
        }
        true
    }

    // ------------------------------------------------------------------
    // Identifiers and calls
    // ------------------------------------------------------------------

    fn parse_identifier_expression(&mut self, out: &mut Expression, location: Location) -> bool {
        let (scope, exclusive) = if self.accept(TokenId::ColonColon) {
            (
                Scope {
                    name: "::".to_owned(),
                    level: 0,
                    namespace_level: 0,
                },
                true,
            )
        } else {
            (self.symbols().current_scope().clone(), false)
        };

        let accepted = if exclusive {
            self.expect(TokenId::Identifier)
        } else {
            self.accept(TokenId::Identifier)
        };
        if !accepted {
            return false;
        }
        let mut identifier = self.tok.value.as_str().to_owned();
        while self.accept(TokenId::ColonColon) {
            if !self.expect(TokenId::Identifier) {
                return false;
            }
            identifier.push_str("::");
            identifier.push_str(self.tok.value.as_str());
        }

        let symbol = self.symbols().find_in(&identifier, &scope, exclusive);

        if self.accept(TokenId::ParenOpen) {
            if let Some(symbol) = &symbol {
                if symbol.kind == SymbolKind::Variable || symbol.kind == SymbolKind::StructType {
                    let message = format!(
                        "identifier '{}' represents a variable, not a function",
                        identifier
                    );
                    self.error(&location, 3005, &message);
                    return false;
                }
            }
            return self.parse_call(out, &identifier, symbol.is_some(), scope, location);
        }

        let symbol = match symbol {
            Some(symbol) => symbol,
            None => {
                let message = format!("undeclared identifier '{}'", identifier);
                self.error(&location, 3004, &message);
                return false;
            }
        };
        if symbol.kind != SymbolKind::Variable {
            let message = format!(
                "identifier '{}' represents a function, not a variable",
                identifier
            );
            self.error(&location, 3005, &message);
            return false;
        }
        *out = Expression::lvalue(symbol.id, symbol.ty, symbol.storage, location);
        true
    }

    fn parse_call(
        &mut self,
        out: &mut Expression,
        name: &str,
        declared: bool,
        scope: Scope,
        location: Location,
    ) -> bool {
        let mut arguments = Vec::new();
        while !self.peek(TokenId::ParenClose) {
            if !arguments.is_empty() && !self.expect(TokenId::Comma) {
                return false;
            }
            let mut argument = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                self.next.location.clone(),
            );
            if !self.parse_expression_assignment(&mut argument) {
                return false;
            }
            arguments.push(argument);
        }
        if !self.expect(TokenId::ParenClose) {
            return false;
        }

        let argument_types = arguments.iter().map(|x| x.ty).collect::<Vec<_>>();
        let resolved = self
            .symbols()
            .resolve_call(name, &argument_types, &scope);

        match resolved {
            Ok(CallSymbol::Function(info)) => {
                if self.symbols().current_parent() == Some(info.definition) {
                    self.error(&location, 3500, "recursive function calls are not allowed");
                    return false;
                }

                // Arguments are spilled into locals because user functions
                // take pointer parameters.
                let mut locals = Vec::new();
                for (argument, param) in arguments.iter_mut().zip(info.params.iter()) {
                    if param.ty.has_qualifier(qual::OUT) && !argument.is_lvalue {
                        self.error(&argument.location.clone(), 3025, "l-value specifies const object");
                        return false;
                    }
                    if argument.ty.rows > param.ty.rows || argument.ty.cols > param.ty.cols {
                        self.warning(
                            &argument.location.clone(),
                            3206,
                            "implicit truncation of vector type",
                        );
                    }
                    let local = self.module.define_variable(
                        None,
                        location.clone(),
                        &param.ty,
                        StorageClass::Function,
                        None,
                    );
                    if param.ty.has_qualifier(qual::IN) {
                        let mut value_expr = argument.clone();
                        let mut target = param.ty;
                        target.qualifiers = 0;
                        self.apply_implicit_cast(&mut value_expr, &target);
                        let value = self.load(&mut value_expr);
                        self.module.emit(
                            Instruction::new(Op::Store)
                                .push(local)
                                .push(value)
                                .at(location.clone()),
                        );
                    }
                    locals.push(local);
                }

                let return_type = self.module.convert_type(&info.return_type);
                let result = self.module.make_id();
                self.module.emit(
                    Instruction::new(Op::FunctionCall)
                        .with_type(return_type)
                        .with_result(result)
                        .push(info.definition)
                        .push_list(&locals)
                        .at(location.clone()),
                );

                // Copy out parameters back into their arguments.
                for ((argument, param), local) in
                    arguments.iter_mut().zip(info.params.iter()).zip(locals.iter())
                {
                    if !param.ty.has_qualifier(qual::OUT) {
                        continue;
                    }
                    let mut spilled = Expression::lvalue(
                        *local,
                        param.ty,
                        StorageClass::Function,
                        location.clone(),
                    );
                    let mut target = argument.ty;
                    target.qualifiers = 0;
                    self.apply_implicit_cast(&mut spilled, &target);
                    let value = self.load(&mut spilled);
                    self.module.access_chain_store(argument, value, &target);
                }

                *out = Expression::rvalue(result, info.return_type, location);
                true
            }
            Ok(CallSymbol::Intrinsic(intrinsic)) => {
                self.emit_intrinsic_call(out, intrinsic, arguments, location)
            }
            Err(CallError::Ambiguous) => {
                let message = format!("ambiguous function call to '{}'", name);
                self.error(&location, 3067, &message);
                false
            }
            Err(CallError::NoMatch) => {
                if !declared {
                    let message = format!("undeclared identifier '{}'", name);
                    self.error(&location, 3004, &message);
                } else {
                    let message = format!("no matching function overload for '{}'", name);
                    self.error(&location, 3013, &message);
                }
                false
            }
        }
    }

    fn emit_intrinsic_call(
        &mut self,
        out: &mut Expression,
        intrinsic: &'static Intrinsic,
        mut arguments: Vec<Expression>,
        location: Location,
    ) -> bool {
        // Convert arguments to the signature's parameter types.
        for (argument, param) in arguments.iter_mut().zip(intrinsic.params.iter()) {
            if param.is_sampler() {
                if !argument.ty.is_sampler() {
                    self.error(&argument.location.clone(), 3020, "type mismatch, expected sampler");
                    return false;
                }
                continue;
            }
            if argument.ty.rows > param.rows || argument.ty.cols > param.cols {
                self.warning(
                    &argument.location.clone(),
                    3206,
                    "implicit truncation of vector type",
                );
            }
            self.apply_implicit_cast(argument, param);
        }

        let mut result_ty = intrinsic.return_type;
        result_ty.qualifiers = qual::CONST;

        // Constant folding over foldable intrinsics.
        if arguments.iter().all(|x| x.is_constant()) {
            let values = arguments
                .iter()
                .map(|x| x.constant.clone().unwrap())
                .collect::<Vec<_>>();
            let folded = match intrinsic.lowering {
                Lowering::Ext(glop) => eval::evaluate_ext(glop, &values).ok(),
                Lowering::Saturate => eval::evaluate_ext(
                    fxc_core::spirv::GLOp::NClamp,
                    &[
                        values[0].clone(),
                        ConstantValue::from(0.0f32),
                        ConstantValue::from(1.0f32),
                    ],
                )
                .ok(),
                Lowering::Rcp => eval::evaluate(
                    Op::FDiv,
                    &result_ty,
                    &[ConstantValue::from(1.0f32), values[0].clone()],
                )
                .ok(),
                Lowering::Op(op) => eval::evaluate(op, &result_ty, &values).ok(),
            };
            if let Some(folded) = folded {
                *out = Expression::constant(folded, result_ty, location);
                return true;
            }
        }

        let mut ids = Vec::new();
        for argument in arguments.iter_mut() {
            ids.push(self.load(argument));
        }

        let result_type = self.module.convert_type(&intrinsic.return_type);
        let id = self.module.make_id();
        match intrinsic.lowering {
            Lowering::Ext(glop) => {
                self.module.emit(
                    Instruction::new(Op::ExtInst)
                        .with_type(result_type)
                        .with_result(id)
                        .push(module::GLSL_EXT)
                        .push(glop as u32)
                        .push_list(&ids)
                        .at(location.clone()),
                );
            }
            Lowering::Rcp => {
                let one = one_like(&intrinsic.return_type);
                let one = self.module.convert_constant(&intrinsic.return_type, &one);
                self.module.emit(
                    Instruction::new(Op::FDiv)
                        .with_type(result_type)
                        .with_result(id)
                        .push(one)
                        .push(ids[0])
                        .at(location.clone()),
                );
            }
            Lowering::Saturate => {
                let zero = self.module.convert_constant(
                    &intrinsic.return_type,
                    &ConstantValue::zero(&intrinsic.return_type),
                );
                let one = one_like(&intrinsic.return_type);
                let one = self.module.convert_constant(&intrinsic.return_type, &one);
                self.module.emit(
                    Instruction::new(Op::ExtInst)
                        .with_type(result_type)
                        .with_result(id)
                        .push(module::GLSL_EXT)
                        .push(fxc_core::spirv::GLOp::FClamp as u32)
                        .push(ids[0])
                        .push(zero)
                        .push(one)
                        .at(location.clone()),
                );
            }
            Lowering::Op(op) => {
                let mut ids = ids;
                match op {
                    // The scalar operand of these opcodes comes second.
                    Op::VectorTimesScalar | Op::MatrixTimesScalar => {
                        if intrinsic.params[0].is_scalar() {
                            ids.swap(0, 1);
                        }
                    }
                    // Fetch and size queries want the image, not the
                    // sampled image.
                    Op::ImageFetch | Op::ImageQuerySizeLod => {
                        let mut image_ty = Type::texture(intrinsic.params[0].rows);
                        image_ty.qualifiers = 0;
                        let image_type = self.module.convert_type(&image_ty);
                        let image = self.module.make_id();
                        self.module.emit(
                            Instruction::new(Op::Image)
                                .with_type(image_type)
                                .with_result(image)
                                .push(ids[0])
                                .at(location.clone()),
                        );
                        ids[0] = image;
                        if op == Op::ImageQuerySizeLod {
                            self.module.add_capability(Capability::ImageQuery);
                        }
                    }
                    _ => {}
                }
                self.module.emit(
                    Instruction::new(op)
                        .with_type(result_type)
                        .with_result(id)
                        .push_list(&ids)
                        .at(location.clone()),
                );
            }
        }

        *out = Expression::rvalue(id, result_ty, location);
        true
    }

}

/// Merge two operand types into the common type of a binary or ternary
/// expression: larger base type wins; one scalar operand broadcasts, two
/// composite operands truncate to the smaller shape with a warning.
fn merge_types(
    parser: &mut Parser,
    left: &Expression,
    right: &Expression,
    _boolean: bool,
) -> Type {
    let mut ty = left.ty;
    ty.qualifiers = 0;
    ty.definition = 0;
    ty.array_length = 0;
    ty.base = left.ty.base.max(right.ty.base);

    if left.ty.is_scalar() || right.ty.is_scalar() {
        ty.rows = left.ty.rows.max(right.ty.rows);
        ty.cols = left.ty.cols.max(right.ty.cols);
    } else {
        ty.rows = left.ty.rows.min(right.ty.rows);
        ty.cols = left.ty.cols.min(right.ty.cols);
        if left.ty.rows > right.ty.rows || left.ty.cols > right.ty.cols {
            parser.warning(&left.location.clone(), 3206, "implicit truncation of vector type");
        }
        if right.ty.rows > left.ty.rows || right.ty.cols > left.ty.cols {
            parser.warning(&right.location.clone(), 3206, "implicit truncation of vector type");
        }
    }
    ty
}

/// Pick the concrete opcode for a generic operator and operand type.
fn specialize_op(op: Op, ty: &Type) -> Op {
    let float = ty.is_floating_point();
    let signed = ty.base == BaseType::Int;
    let boolean = ty.is_boolean();
    match op {
        Op::FAdd if !float => Op::IAdd,
        Op::FSub if !float => Op::ISub,
        Op::FMul if !float => Op::IMul,
        Op::FDiv if !float => {
            if signed {
                Op::SDiv
            } else {
                Op::UDiv
            }
        }
        Op::FMod if !float => {
            if signed {
                Op::SRem
            } else {
                Op::UMod
            }
        }
        Op::FNegate if !float => Op::SNegate,
        Op::ShiftRightLogical if signed => Op::ShiftRightArithmetic,
        Op::LogicalEqual if !boolean => {
            if float {
                Op::FOrdEqual
            } else {
                Op::IEqual
            }
        }
        Op::LogicalNotEqual if !boolean => {
            if float {
                Op::FOrdNotEqual
            } else {
                Op::INotEqual
            }
        }
        Op::FOrdLessThan if !float => {
            if signed {
                Op::SLessThan
            } else {
                Op::ULessThan
            }
        }
        Op::FOrdGreaterThan if !float => {
            if signed {
                Op::SGreaterThan
            } else {
                Op::UGreaterThan
            }
        }
        Op::FOrdLessThanEqual if !float => {
            if signed {
                Op::SLessThanEqual
            } else {
                Op::ULessThanEqual
            }
        }
        Op::FOrdGreaterThanEqual if !float => {
            if signed {
                Op::SGreaterThanEqual
            } else {
                Op::UGreaterThanEqual
            }
        }
        other => other,
    }
}

/// Group a flat, row-major component list into the constant of `ty`.
fn shape_components(components: Vec<ConstantValue>, ty: &Type) -> ConstantValue {
    if ty.is_matrix() {
        let mut columns = Vec::new();
        for col in 0..ty.cols {
            let mut rows = Vec::new();
            for row in 0..ty.rows {
                rows.push(components[(row * ty.cols + col) as usize].clone());
            }
            columns.push(ConstantValue::Composite(rows));
        }
        ConstantValue::Composite(columns)
    } else if ty.is_vector() {
        ConstantValue::Composite(components)
    } else {
        components.into_iter().next().unwrap_or(ConstantValue::S32(0))
    }
}

fn one_like(ty: &Type) -> ConstantValue {
    let one = ConstantValue::from(1.0f32);
    if ty.is_vector() {
        ConstantValue::Composite(vec![one; ty.rows as usize])
    } else {
        one
    }
}
