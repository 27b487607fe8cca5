//! Statement parsing: control flow, declarations and blocks. Selections and
//! loops emit the structured `OpSelectionMerge`/`OpLoopMerge` shapes SPIR-V
//! requires.
use fxc_core::spirv::{LoopControl, Op, SelectionControl};
use fxc_core::{BaseType, ConstantValue, Expression, Instruction, Type};

use super::{token_name, Parser};
use crate::lexer::TokenId;

impl<'a> Parser<'a> {
    pub(crate) fn parse_statement(&mut self, scoped: bool) -> bool {
        let mut loop_control = LoopControl::NONE.bits();
        let mut selection_control = SelectionControl::NONE.bits();

        // Attributes.
        while self.accept(TokenId::BracketOpen) {
            if self.expect(TokenId::Identifier) {
                let attribute = self.tok.value.as_str().to_owned();
                if self.expect(TokenId::BracketClose) {
                    match attribute.as_str() {
                        "unroll" => loop_control |= LoopControl::UNROLL.bits(),
                        "loop" => loop_control |= LoopControl::DONT_UNROLL.bits(),
                        "flatten" => selection_control |= SelectionControl::FLATTEN.bits(),
                        "branch" => selection_control |= SelectionControl::DONT_FLATTEN.bits(),
                        _ => {
                            let location = self.tok.location.clone();
                            self.warning(&location, 0, "unknown attribute");
                        }
                    }
                }
            } else {
                self.accept(TokenId::BracketClose);
            }
        }

        if self.peek(TokenId::BraceOpen) {
            return self.parse_statement_block(scoped);
        }
        if self.accept(TokenId::Semicolon) {
            return true;
        }

        if self.accept(TokenId::If) {
            return self.parse_if(selection_control);
        }
        if self.accept(TokenId::Switch) {
            return self.parse_switch(selection_control);
        }
        if self.accept(TokenId::While) {
            return self.parse_while(loop_control);
        }
        if self.accept(TokenId::Do) {
            return self.parse_do_while(loop_control);
        }
        if self.accept(TokenId::For) {
            return self.parse_for(loop_control);
        }

        if self.accept(TokenId::Break) {
            let location = self.tok.location.clone();
            match self.break_target() {
                Some(target) => self.module.leave_block_and_branch(target),
                None => self.error(&location, 3518, "'break' must be inside a loop or switch"),
            }
            return self.expect(TokenId::Semicolon);
        }
        if self.accept(TokenId::Continue) {
            let location = self.tok.location.clone();
            match self.continue_target() {
                Some(target) => self.module.leave_block_and_branch(target),
                None => self.error(&location, 3519, "'continue' must be inside a loop"),
            }
            return self.expect(TokenId::Semicolon);
        }

        if self.accept(TokenId::Return) {
            return self.parse_return();
        }
        if self.accept(TokenId::Discard) {
            self.module.leave_block_and_kill();
            return self.expect(TokenId::Semicolon);
        }

        // Declaration statement.
        let location = self.next.location.clone();
        let mut ty = Type::VOID;
        if self.parse_type(&mut ty) {
            let mut count = 0;
            loop {
                if count > 0 && !self.expect(TokenId::Comma) {
                    return false;
                }
                count += 1;
                if !self.expect(TokenId::Identifier) {
                    return false;
                }
                let name = self.tok.value.as_str().to_owned();
                let mut variable = 0;
                if !self.parse_variable_declaration(ty, &name, false, &mut variable) {
                    return false;
                }
                if self.peek(TokenId::Semicolon) {
                    break;
                }
            }
            return self.expect(TokenId::Semicolon);
        }

        // Expression statement.
        let mut expression = Expression::constant(
            ConstantValue::S32(0),
            Type::scalar(BaseType::Int),
            location.clone(),
        );
        if self.parse_expression(&mut expression) {
            return self.expect(TokenId::Semicolon);
        }

        let message = format!(
            "syntax error: unexpected '{}'",
            token_name(self.next.id)
        );
        self.error(&location, 3000, &message);
        self.consume_until(TokenId::Semicolon);
        false
    }

    pub(crate) fn parse_statement_block(&mut self, scoped: bool) -> bool {
        if !self.expect(TokenId::BraceOpen) {
            return false;
        }
        if scoped {
            self.symbols_mut().enter_scope(0);
        }

        while !self.peek(TokenId::BraceClose) && !self.peek(TokenId::EndOfFile) {
            if !self.parse_statement(true) {
                if scoped {
                    self.symbols_mut().leave_scope();
                }
                // Synchronize to the matching closing brace.
                let mut level = 0u32;
                while !self.peek(TokenId::EndOfFile) {
                    if self.accept(TokenId::BraceOpen) {
                        level += 1;
                    } else if self.accept(TokenId::BraceClose) {
                        if level == 0 {
                            break;
                        }
                        level -= 1;
                    } else {
                        self.consume();
                    }
                }
                return false;
            }
        }

        if scoped {
            self.symbols_mut().leave_scope();
        }
        self.expect(TokenId::BraceClose)
    }

    // ------------------------------------------------------------------
    // Selections
    // ------------------------------------------------------------------

    fn parse_if(&mut self, selection_control: u32) -> bool {
        let location = self.tok.location.clone();

        let mut condition = Expression::constant(
            ConstantValue::S32(0),
            Type::scalar(BaseType::Int),
            location.clone(),
        );
        if !(self.expect(TokenId::ParenOpen)
            && self.parse_expression(&mut condition)
            && self.expect(TokenId::ParenClose))
        {
            return false;
        }
        if !condition.ty.is_scalar() {
            self.error(
                &condition.location.clone(),
                3019,
                "if statement conditional expressions must evaluate to a scalar",
            );
            return false;
        }
        let condition = self.load_condition(condition);

        let true_label = self.module.make_id();
        let false_label = self.module.make_id();
        let merge_label = self.module.make_id();

        self.module.emit(
            Instruction::new(Op::SelectionMerge)
                .push(merge_label)
                .push(selection_control)
                .at(location.clone()),
        );
        self.module
            .leave_block_and_branch_conditional(condition, true_label, false_label);

        self.module.enter_block(true_label);
        if !self.parse_statement(true) {
            return false;
        }
        self.module.leave_block_and_branch(merge_label);

        self.module.enter_block(false_label);
        if self.accept(TokenId::Else) {
            if !self.parse_statement(true) {
                return false;
            }
        }
        self.module.leave_block_and_branch(merge_label);

        self.module.enter_block(merge_label);
        true
    }

    fn parse_switch(&mut self, selection_control: u32) -> bool {
        let location = self.tok.location.clone();

        let mut selector = Expression::constant(
            ConstantValue::S32(0),
            Type::scalar(BaseType::Int),
            location.clone(),
        );
        if !(self.expect(TokenId::ParenOpen)
            && self.parse_expression(&mut selector)
            && self.expect(TokenId::ParenClose))
        {
            return false;
        }
        if !selector.ty.is_scalar() {
            self.error(
                &selector.location.clone(),
                3019,
                "switch statement expression must evaluate to a scalar",
            );
            return false;
        }
        let mut int_ty = Type::scalar(BaseType::Int);
        int_ty.qualifiers = 0;
        self.apply_implicit_cast(&mut selector, &int_ty);
        let selector = self.load(&mut selector);

        if !self.expect(TokenId::BraceOpen) {
            return false;
        }

        let merge_label = self.module.make_id();
        self.module.emit(
            Instruction::new(Op::SelectionMerge)
                .push(merge_label)
                .push(selection_control)
                .at(location.clone()),
        );
        let handle = self.module.leave_block_and_switch_open(selector);

        let mut default_label = None;
        let mut case_count = 0u32;
        let continue_target = self.continue_target().unwrap_or(0);

        while !self.peek(TokenId::BraceClose) && !self.peek(TokenId::EndOfFile) {
            let mut literals = Vec::new();
            let mut is_default = false;
            while self.peek(TokenId::Case) || self.peek(TokenId::Default) {
                if self.accept(TokenId::Case) {
                    let mut label = Expression::constant(
                        ConstantValue::S32(0),
                        Type::scalar(BaseType::Int),
                        self.next.location.clone(),
                    );
                    if !self.parse_expression(&mut label) {
                        return false;
                    }
                    let literal = label
                        .constant
                        .as_ref()
                        .filter(|_| label.ty.is_numeric())
                        .and_then(|x| x.to_s32());
                    match literal {
                        Some(literal) => literals.push(literal),
                        None => {
                            self.error(&label.location.clone(), 3020, "non-numeric case expression");
                            return false;
                        }
                    }
                } else {
                    self.accept(TokenId::Default);
                    is_default = true;
                }
                if !self.expect(TokenId::Colon) {
                    return false;
                }
            }
            if literals.is_empty() && !is_default {
                let location = self.next.location.clone();
                self.error(&location, 3000, "a case body can only be preceded by case labels");
                return false;
            }

            let case_label = self.module.make_id();
            for literal in &literals {
                self.module.append_switch_case(&handle, *literal, case_label);
                case_count += 1;
            }
            if is_default {
                default_label = Some(case_label);
                case_count += 1;
            }

            // A still-open previous case falls through.
            self.module.leave_block_and_branch(case_label);
            self.module.enter_block(case_label);

            self.push_loop_targets(merge_label, continue_target);
            let mut ok = true;
            while !self.peek(TokenId::Case)
                && !self.peek(TokenId::Default)
                && !self.peek(TokenId::BraceClose)
                && !self.peek(TokenId::EndOfFile)
            {
                if !self.parse_statement(true) {
                    ok = false;
                    break;
                }
            }
            self.pop_loop_targets();
            if !ok {
                return false;
            }
        }

        if case_count == 0 {
            self.warning(&location, 5002, "switch statement contains no 'case' or 'default' labels");
        }

        self.module.leave_block_and_branch(merge_label);
        self.module
            .set_switch_default(&handle, default_label.unwrap_or(merge_label));
        self.module.enter_block(merge_label);
        self.expect(TokenId::BraceClose)
    }

    // ------------------------------------------------------------------
    // Loops
    // ------------------------------------------------------------------

    fn parse_while(&mut self, loop_control: u32) -> bool {
        let location = self.tok.location.clone();
        self.symbols_mut().enter_scope(0);

        let header_label = self.module.make_id();
        let check_label = self.module.make_id();
        let body_label = self.module.make_id();
        let continue_label = self.module.make_id();
        let merge_label = self.module.make_id();

        self.module.leave_block_and_branch(header_label);
        self.module.enter_block(header_label);
        self.module.emit(
            Instruction::new(Op::LoopMerge)
                .push(merge_label)
                .push(continue_label)
                .push(loop_control)
                .at(location.clone()),
        );
        self.module.leave_block_and_branch(check_label);

        self.module.enter_block(check_label);
        let mut condition = Expression::constant(
            ConstantValue::S32(0),
            Type::scalar(BaseType::Int),
            location.clone(),
        );
        if !(self.expect(TokenId::ParenOpen)
            && self.parse_expression(&mut condition)
            && self.expect(TokenId::ParenClose))
        {
            self.symbols_mut().leave_scope();
            return false;
        }
        if !condition.ty.is_scalar() {
            self.error(&condition.location.clone(), 3019, "scalar value expected");
            self.symbols_mut().leave_scope();
            return false;
        }
        let condition = self.load_condition(condition);
        self.module
            .leave_block_and_branch_conditional(condition, body_label, merge_label);

        self.module.enter_block(body_label);
        self.push_loop_targets(merge_label, continue_label);
        let ok = self.parse_statement(false);
        self.pop_loop_targets();
        if !ok {
            self.symbols_mut().leave_scope();
            return false;
        }
        self.module.leave_block_and_branch(continue_label);

        self.module.enter_block(continue_label);
        self.module.leave_block_and_branch(header_label);

        self.module.enter_block(merge_label);
        self.symbols_mut().leave_scope();
        true
    }

    fn parse_do_while(&mut self, loop_control: u32) -> bool {
        let location = self.tok.location.clone();

        let header_label = self.module.make_id();
        let body_label = self.module.make_id();
        let continue_label = self.module.make_id();
        let merge_label = self.module.make_id();

        self.module.leave_block_and_branch(header_label);
        self.module.enter_block(header_label);
        self.module.emit(
            Instruction::new(Op::LoopMerge)
                .push(merge_label)
                .push(continue_label)
                .push(loop_control)
                .at(location.clone()),
        );
        self.module.leave_block_and_branch(body_label);

        self.module.enter_block(body_label);
        self.push_loop_targets(merge_label, continue_label);
        let ok = self.parse_statement(true);
        self.pop_loop_targets();
        if !ok {
            return false;
        }
        self.module.leave_block_and_branch(continue_label);

        self.module.enter_block(continue_label);
        let mut condition = Expression::constant(
            ConstantValue::S32(0),
            Type::scalar(BaseType::Int),
            location.clone(),
        );
        if !(self.expect(TokenId::While)
            && self.expect(TokenId::ParenOpen)
            && self.parse_expression(&mut condition)
            && self.expect(TokenId::ParenClose)
            && self.expect(TokenId::Semicolon))
        {
            return false;
        }
        if !condition.ty.is_scalar() {
            self.error(&condition.location.clone(), 3019, "scalar value expected");
            return false;
        }
        let condition = self.load_condition(condition);
        self.module
            .leave_block_and_branch_conditional(condition, header_label, merge_label);

        self.module.enter_block(merge_label);
        true
    }

    fn parse_for(&mut self, loop_control: u32) -> bool {
        let location = self.tok.location.clone();
        if !self.expect(TokenId::ParenOpen) {
            return false;
        }
        self.symbols_mut().enter_scope(0);

        // Initializer, in the enclosing block.
        let mut ty = Type::VOID;
        if self.parse_type(&mut ty) {
            let mut count = 0;
            loop {
                if count > 0 && !self.expect(TokenId::Comma) {
                    self.symbols_mut().leave_scope();
                    return false;
                }
                count += 1;
                if !self.expect(TokenId::Identifier) {
                    self.symbols_mut().leave_scope();
                    return false;
                }
                let name = self.tok.value.as_str().to_owned();
                let mut variable = 0;
                if !self.parse_variable_declaration(ty, &name, false, &mut variable) {
                    self.symbols_mut().leave_scope();
                    return false;
                }
                if self.peek(TokenId::Semicolon) {
                    break;
                }
            }
        } else if !self.peek(TokenId::Semicolon) {
            let mut init = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                location.clone(),
            );
            if !self.parse_expression(&mut init) {
                self.symbols_mut().leave_scope();
                return false;
            }
        }
        if !self.expect(TokenId::Semicolon) {
            self.symbols_mut().leave_scope();
            return false;
        }

        let header_label = self.module.make_id();
        let check_label = self.module.make_id();
        let body_label = self.module.make_id();
        let continue_label = self.module.make_id();
        let merge_label = self.module.make_id();

        self.module.leave_block_and_branch(header_label);
        self.module.enter_block(header_label);
        self.module.emit(
            Instruction::new(Op::LoopMerge)
                .push(merge_label)
                .push(continue_label)
                .push(loop_control)
                .at(location.clone()),
        );
        self.module.leave_block_and_branch(check_label);

        self.module.enter_block(check_label);
        if !self.peek(TokenId::Semicolon) {
            let mut condition = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                location.clone(),
            );
            if !self.parse_expression(&mut condition) {
                self.symbols_mut().leave_scope();
                return false;
            }
            if !condition.ty.is_scalar() {
                self.error(&condition.location.clone(), 3019, "scalar value expected");
                self.symbols_mut().leave_scope();
                return false;
            }
            let condition = self.load_condition(condition);
            self.module
                .leave_block_and_branch_conditional(condition, body_label, merge_label);
        } else {
            self.module.leave_block_and_branch(body_label);
        }
        if !self.expect(TokenId::Semicolon) {
            self.symbols_mut().leave_scope();
            return false;
        }

        // The increment is parsed next but runs in the continue block, which
        // is reordered past the body afterwards.
        self.module.enter_block(continue_label);
        if !self.peek(TokenId::ParenClose) {
            let mut increment = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                location.clone(),
            );
            if !self.parse_expression(&mut increment) {
                self.symbols_mut().leave_scope();
                return false;
            }
        }
        self.module.leave_block_and_branch(header_label);
        if !self.expect(TokenId::ParenClose) {
            self.symbols_mut().leave_scope();
            return false;
        }

        self.module.enter_block(body_label);
        self.push_loop_targets(merge_label, continue_label);
        let ok = self.parse_statement(false);
        self.pop_loop_targets();
        if !ok {
            self.symbols_mut().leave_scope();
            return false;
        }
        self.module.leave_block_and_branch(continue_label);
        self.module.move_block_to_end(continue_label);

        self.module.enter_block(merge_label);
        self.symbols_mut().leave_scope();
        true
    }

    // ------------------------------------------------------------------
    // Jumps
    // ------------------------------------------------------------------

    fn parse_return(&mut self) -> bool {
        let location = self.tok.location.clone();
        let parent = self.current_function_info();
        let return_type = parent.as_ref().map(|x| x.return_type).unwrap_or(Type::VOID);

        if !self.peek(TokenId::Semicolon) {
            let mut value = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                location.clone(),
            );
            if !self.parse_expression(&mut value) {
                return false;
            }
            if return_type.is_void() {
                self.error(&location, 3079, "void functions cannot return a value");
                self.accept(TokenId::Semicolon);
                return false;
            }
            if Type::rank(&value.ty, &return_type) == 0 {
                self.error(&location, 3017, "expression does not match function return type");
                return false;
            }
            if value.ty.rows > return_type.rows || value.ty.cols > return_type.cols {
                self.warning(&location, 3206, "implicit truncation of vector type");
            }
            let mut target = return_type;
            target.qualifiers = 0;
            self.apply_implicit_cast(&mut value, &target);
            let value = self.load(&mut value);
            self.module.leave_block_and_return(Some(value));
        } else {
            if !return_type.is_void() {
                self.error(&location, 3080, "function must return a value");
                self.accept(TokenId::Semicolon);
                return false;
            }
            self.module.leave_block_and_return(None);
        }
        self.expect(TokenId::Semicolon)
    }

    /// Cast a scalar condition expression to bool and materialize it.
    fn load_condition(&mut self, mut condition: Expression) -> fxc_core::Id {
        let mut bool_ty = Type::scalar(BaseType::Bool);
        bool_ty.qualifiers = 0;
        self.apply_implicit_cast(&mut condition, &bool_ty);
        self.load(&mut condition)
    }
}
