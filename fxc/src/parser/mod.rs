//! Recursive-descent parser and semantic analyzer for FX effect sources.
//!
//! The parser owns the lexer and emits directly into the module builder as
//! it goes; there is no syntax tree. Expression parsing lives in `expr`,
//! statement parsing in `stmt`.
mod expr;
mod stmt;

use fnv::FnvHashMap as HashMap;
use fxc_core::spirv::{BuiltIn, ExecutionModel, StorageClass};
use fxc_core::{BaseType, ConstantValue, Expression, Id, Instruction, Location, Module, Type};
use fxc_core::spirv::Op;
use fxc_core::ty::qual;
use std::rc::Rc;

use crate::diag::Diagnostics;
use crate::lexer::{Lexer, LexerSnapshot, Token, TokenId};
use crate::metadata::{
    AddressMode, AnnotationList, EffectMetadata, Filter, Pass, Sampler, Technique, Texture,
    TextureFormat, Uniform, Variant,
};
use crate::symbol::{FunctionInfo, FunctionParam, Scope, SymbolData, SymbolKind, SymbolTable};

pub struct StructMember {
    pub name: String,
    pub ty: Type,
    pub semantic: String,
}
pub struct StructInfo {
    pub name: String,
    pub members: Vec<StructMember>,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    backup: Option<(LexerSnapshot, Token)>,
    tok: Token,
    next: Token,

    pub diag: Diagnostics,
    pub module: Module,
    pub metadata: EffectMetadata,
    symbols: SymbolTable,
    structs: HashMap<Id, StructInfo>,
    functions: HashMap<Id, Rc<FunctionInfo>>,
    entry_points: HashMap<(Id, u32), Id>,

    loop_break_targets: Vec<Id>,
    loop_continue_targets: Vec<Id>,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, file_name: &str) -> Parser<'a> {
        let mut parser = Parser {
            lexer: Lexer::new(source, file_name),
            backup: None,
            tok: Token::default(),
            next: Token::default(),
            diag: Diagnostics::new(),
            module: Module::new(),
            metadata: EffectMetadata::default(),
            symbols: SymbolTable::new(),
            structs: HashMap::default(),
            functions: HashMap::default(),
            entry_points: HashMap::default(),
            loop_break_targets: Vec::new(),
            loop_continue_targets: Vec::new(),
        };
        parser.module.set_source(file_name);
        parser.consume();
        parser
    }

    /// Parse the whole input. Returns true iff no error diagnostic fired.
    pub fn run(&mut self) -> bool {
        while !self.peek(TokenId::EndOfFile) {
            if !self.parse_top_level() {
                return false;
            }
        }
        !self.diag.has_errors()
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub(crate) fn error(&mut self, location: &Location, code: u32, message: &str) {
        self.diag.error(location, code, message);
    }
    pub(crate) fn warning(&mut self, location: &Location, code: u32, message: &str) {
        self.diag.warning(location, code, message);
    }

    // ------------------------------------------------------------------
    // Input management
    // ------------------------------------------------------------------

    /// Capture the lexer state for one-token backtracking; see `restore`.
    pub(crate) fn backup(&mut self) {
        self.backup = Some((self.lexer.snapshot(), self.next.clone()));
    }
    pub(crate) fn restore(&mut self) {
        if let Some((snapshot, next)) = self.backup.take() {
            self.lexer.restore(&snapshot);
            self.next = next;
        }
    }

    pub(crate) fn peek(&self, id: TokenId) -> bool {
        self.next.id == id
    }
    pub(crate) fn consume(&mut self) {
        self.tok = std::mem::take(&mut self.next);
        self.next = self.lexer.lex();
    }
    pub(crate) fn consume_until(&mut self, id: TokenId) {
        while !self.accept(id) && !self.peek(TokenId::EndOfFile) {
            self.consume();
        }
    }
    pub(crate) fn accept(&mut self, id: TokenId) -> bool {
        if self.peek(id) {
            self.consume();
            true
        } else {
            false
        }
    }
    pub(crate) fn expect(&mut self, id: TokenId) -> bool {
        if !self.accept(id) {
            let message = format!(
                "syntax error: unexpected '{}', expected '{}'",
                token_name(self.next.id),
                token_name(id)
            );
            let location = self.next.location.clone();
            self.error(&location, 3000, &message);
            return false;
        }
        true
    }

    pub(crate) fn lookahead(&self) -> &Token {
        &self.next
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    pub(crate) fn accept_type_class(&mut self, ty: &mut Type) -> bool {
        ty.definition = 0;
        ty.array_length = 0;

        if self.peek(TokenId::Identifier) {
            let name = self.next.value.as_str().to_owned();
            let symbol = match self.symbols.find(&name) {
                Some(symbol) if symbol.kind == SymbolKind::StructType => symbol,
                _ => return false,
            };
            ty.base = BaseType::Struct;
            ty.rows = 0;
            ty.cols = 0;
            ty.definition = symbol.id;
            self.consume();
            return true;
        }

        if self.accept(TokenId::Vector) {
            ty.base = BaseType::Float;
            ty.rows = 4;
            ty.cols = 1;
            if self.accept(TokenId::Less) {
                if !self.accept_type_class(ty) {
                    let message = format!(
                        "syntax error: unexpected '{}', expected vector element type",
                        token_name(self.next.id)
                    );
                    let location = self.next.location.clone();
                    self.error(&location, 3000, &message);
                    return false;
                }
                if !ty.is_scalar() {
                    let location = self.tok.location.clone();
                    self.error(&location, 3122, "vector element type must be a scalar type");
                    return false;
                }
                if !(self.expect(TokenId::Comma) && self.expect(TokenId::IntLiteral)) {
                    return false;
                }
                let rows = self.tok.value.as_int();
                if rows < 1 || rows > 4 {
                    let location = self.tok.location.clone();
                    self.error(&location, 3052, "vector dimension must be between 1 and 4");
                    return false;
                }
                ty.rows = rows as u32;
                if !self.expect(TokenId::Greater) {
                    return false;
                }
            }
            return true;
        }

        if self.accept(TokenId::Matrix) {
            ty.base = BaseType::Float;
            ty.rows = 4;
            ty.cols = 4;
            if self.accept(TokenId::Less) {
                if !self.accept_type_class(ty) {
                    let message = format!(
                        "syntax error: unexpected '{}', expected matrix element type",
                        token_name(self.next.id)
                    );
                    let location = self.next.location.clone();
                    self.error(&location, 3000, &message);
                    return false;
                }
                if !ty.is_scalar() {
                    let location = self.tok.location.clone();
                    self.error(&location, 3123, "matrix element type must be a scalar type");
                    return false;
                }
                for dimension in 0..2 {
                    if !(self.expect(TokenId::Comma) && self.expect(TokenId::IntLiteral)) {
                        return false;
                    }
                    let count = self.tok.value.as_int();
                    if count < 1 || count > 4 {
                        let location = self.tok.location.clone();
                        self.error(&location, 3053, "matrix dimensions must be between 1 and 4");
                        return false;
                    }
                    if dimension == 0 {
                        ty.rows = count as u32;
                    } else {
                        ty.cols = count as u32;
                    }
                }
                if !self.expect(TokenId::Greater) {
                    return false;
                }
            }
            return true;
        }

        use TokenId::*;
        let (base, rows, cols) = match self.next.id {
            Void => (BaseType::Void, 0, 0),
            Bool => (BaseType::Bool, 1, 1),
            Bool2 => (BaseType::Bool, 2, 1),
            Bool2x2 => (BaseType::Bool, 2, 2),
            Bool3 => (BaseType::Bool, 3, 1),
            Bool3x3 => (BaseType::Bool, 3, 3),
            Bool4 => (BaseType::Bool, 4, 1),
            Bool4x4 => (BaseType::Bool, 4, 4),
            Int => (BaseType::Int, 1, 1),
            Int2 => (BaseType::Int, 2, 1),
            Int2x2 => (BaseType::Int, 2, 2),
            Int3 => (BaseType::Int, 3, 1),
            Int3x3 => (BaseType::Int, 3, 3),
            Int4 => (BaseType::Int, 4, 1),
            Int4x4 => (BaseType::Int, 4, 4),
            Uint => (BaseType::Uint, 1, 1),
            Uint2 => (BaseType::Uint, 2, 1),
            Uint2x2 => (BaseType::Uint, 2, 2),
            Uint3 => (BaseType::Uint, 3, 1),
            Uint3x3 => (BaseType::Uint, 3, 3),
            Uint4 => (BaseType::Uint, 4, 1),
            Uint4x4 => (BaseType::Uint, 4, 4),
            Float => (BaseType::Float, 1, 1),
            Float2 => (BaseType::Float, 2, 1),
            Float2x2 => (BaseType::Float, 2, 2),
            Float3 => (BaseType::Float, 3, 1),
            Float3x3 => (BaseType::Float, 3, 3),
            Float4 => (BaseType::Float, 4, 1),
            Float4x4 => (BaseType::Float, 4, 4),
            String => (BaseType::String, 0, 0),
            Texture1D => (BaseType::Texture, 1, 1),
            Texture2D => (BaseType::Texture, 2, 1),
            Texture3D => (BaseType::Texture, 3, 1),
            Sampler1D => (BaseType::Sampler, 1, 1),
            Sampler2D => (BaseType::Sampler, 2, 1),
            Sampler3D => (BaseType::Sampler, 3, 1),
            _ => return false,
        };
        ty.base = base;
        ty.rows = rows;
        ty.cols = cols;
        self.consume();
        true
    }

    pub(crate) fn accept_type_qualifiers(&mut self, ty: &mut Type) -> bool {
        let mut qualifiers = 0;
        if self.accept(TokenId::Extern) {
            qualifiers |= qual::EXTERN;
        }
        if self.accept(TokenId::Static) {
            qualifiers |= qual::STATIC;
        }
        if self.accept(TokenId::Uniform) {
            qualifiers |= qual::UNIFORM;
        }
        if self.accept(TokenId::Volatile) {
            qualifiers |= qual::VOLATILE;
        }
        if self.accept(TokenId::Precise) {
            qualifiers |= qual::PRECISE;
        }
        if self.accept(TokenId::In) {
            qualifiers |= qual::IN;
        }
        if self.accept(TokenId::Out) {
            qualifiers |= qual::OUT;
        }
        if self.accept(TokenId::InOut) {
            qualifiers |= qual::INOUT;
        }
        if self.accept(TokenId::Const) {
            qualifiers |= qual::CONST;
        }
        if self.accept(TokenId::Linear) {
            qualifiers |= qual::LINEAR;
        }
        if self.accept(TokenId::NoPerspective) {
            qualifiers |= qual::NOPERSPECTIVE;
        }
        if self.accept(TokenId::Centroid) {
            qualifiers |= qual::CENTROID;
        }
        if self.accept(TokenId::NoInterpolation) {
            qualifiers |= qual::NOINTERPOLATION;
        }

        if qualifiers == 0 {
            return false;
        }
        if ty.qualifiers & qualifiers == qualifiers {
            let location = self.tok.location.clone();
            self.warning(&location, 3048, "duplicate usages specified");
        }
        ty.qualifiers |= qualifiers;
        self.accept_type_qualifiers(ty);
        true
    }

    pub(crate) fn parse_type(&mut self, ty: &mut Type) -> bool {
        ty.qualifiers = 0;
        self.accept_type_qualifiers(ty);

        let location = self.next.location.clone();
        if !self.accept_type_class(ty) {
            return false;
        }

        if ty.is_integral()
            && (ty.has_qualifier(qual::CENTROID) || ty.has_qualifier(qual::NOPERSPECTIVE))
        {
            self.error(
                &location,
                4576,
                "signature specifies invalid interpolation mode for integer component type",
            );
            return false;
        }
        if ty.has_qualifier(qual::CENTROID) && !ty.has_qualifier(qual::NOPERSPECTIVE) {
            ty.qualifiers |= qual::LINEAR;
        }
        true
    }

    // ------------------------------------------------------------------
    // Top level
    // ------------------------------------------------------------------

    fn parse_top_level(&mut self) -> bool {
        let mut ty = Type::VOID;

        if self.peek(TokenId::Namespace) {
            return self.parse_namespace();
        } else if self.peek(TokenId::Struct) {
            let mut id = 0;
            if !self.parse_struct(&mut id) {
                return false;
            }
            if !self.expect(TokenId::Semicolon) {
                return false;
            }
        } else if self.peek(TokenId::Technique) {
            let mut technique = None;
            if !self.parse_technique(&mut technique) {
                return false;
            }
            if let Some(technique) = technique {
                self.metadata.techniques.push(technique);
            }
        } else if self.parse_type(&mut ty) {
            if !self.expect(TokenId::Identifier) {
                return false;
            }
            let name = self.tok.value.as_str().to_owned();

            if self.peek(TokenId::ParenOpen) {
                let mut function = 0;
                if !self.parse_function_declaration(ty, &name, &mut function) {
                    return false;
                }
            } else {
                let mut count = 0;
                loop {
                    if count > 0 && !(self.expect(TokenId::Comma) && self.expect(TokenId::Identifier))
                    {
                        return false;
                    }
                    let name = if count > 0 {
                        self.tok.value.as_str().to_owned()
                    } else {
                        name.clone()
                    };
                    count += 1;
                    let mut variable = 0;
                    if !self.parse_variable_declaration(ty, &name, true, &mut variable) {
                        self.consume_until(TokenId::Semicolon);
                        return false;
                    }
                    if self.peek(TokenId::Semicolon) {
                        break;
                    }
                }
                if !self.expect(TokenId::Semicolon) {
                    return false;
                }
            }
        } else if !self.accept(TokenId::Semicolon) {
            self.consume();
            let message = format!(
                "syntax error: unexpected '{}'",
                token_name(self.tok.id)
            );
            let location = self.tok.location.clone();
            self.error(&location, 3000, &message);
            return false;
        }
        true
    }

    fn parse_namespace(&mut self) -> bool {
        if !self.accept(TokenId::Namespace) {
            return false;
        }
        if !self.expect(TokenId::Identifier) {
            return false;
        }
        let name = self.tok.value.as_str().to_owned();
        if !self.expect(TokenId::BraceOpen) {
            return false;
        }

        self.symbols.enter_namespace(&name);
        let mut success = true;
        while !self.peek(TokenId::BraceClose) && !self.peek(TokenId::EndOfFile) {
            if !self.parse_top_level() {
                success = false;
                break;
            }
        }
        self.symbols.leave_namespace();

        success && self.expect(TokenId::BraceClose)
    }

    // ------------------------------------------------------------------
    // Shared declaration pieces
    // ------------------------------------------------------------------

    /// Parse an optional array suffix: none (0), `[]` (-1) or a literal
    /// dimension between 1 and 65536.
    pub(crate) fn parse_array(&mut self, size: &mut i32) -> bool {
        *size = 0;
        if self.accept(TokenId::BracketOpen) {
            if self.accept(TokenId::BracketClose) {
                *size = -1;
                return true;
            }
            let mut expression = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                self.next.location.clone(),
            );
            if self.parse_expression(&mut expression) && self.expect(TokenId::BracketClose) {
                let constant = expression
                    .constant
                    .as_ref()
                    .and_then(|x| x.to_s32())
                    .filter(|_| expression.ty.is_scalar() && expression.ty.is_integral());
                let value = match constant {
                    Some(value) => value,
                    None => {
                        let location = expression.location.clone();
                        self.error(
                            &location,
                            3058,
                            "array dimensions must be literal scalar expressions",
                        );
                        return false;
                    }
                };
                if value < 1 || value > 65536 {
                    let location = expression.location.clone();
                    self.error(
                        &location,
                        3059,
                        "array dimension must be between 1 and 65536",
                    );
                    return false;
                }
                *size = value;
            } else {
                return false;
            }
        }
        true
    }

    /// Parse an `< [type] name = literal; … >` annotation list.
    pub(crate) fn parse_annotations(&mut self, annotations: &mut AnnotationList) -> bool {
        if !self.accept(TokenId::Less) {
            return true;
        }
        while !self.peek(TokenId::Greater) && !self.peek(TokenId::EndOfFile) {
            let mut ty = Type::VOID;
            if self.accept_type_class(&mut ty) {
                let location = self.tok.location.clone();
                self.warning(&location, 4717, "type prefixes for annotations are deprecated");
            }
            if !self.expect(TokenId::Identifier) {
                return false;
            }
            let name = self.tok.value.as_str().to_owned();
            let mut expression = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                self.next.location.clone(),
            );
            if !(self.expect(TokenId::Equal)
                && self.parse_expression_unary(&mut expression)
                && self.expect(TokenId::Semicolon))
            {
                return false;
            }
            let value = match &expression.constant {
                Some(ConstantValue::S32(x)) => Variant::Int(*x),
                Some(ConstantValue::U32(x)) => Variant::Uint(*x),
                Some(ConstantValue::Bool(x)) => Variant::Uint(*x as u32),
                Some(ConstantValue::F32(x)) => Variant::Float(x.0),
                Some(ConstantValue::Str(x)) => Variant::Str(x.clone()),
                _ => {
                    let location = expression.location.clone();
                    self.error(&location, 3011, "value must be a literal expression");
                    continue;
                }
            };
            annotations.push((name, value));
        }
        self.expect(TokenId::Greater)
    }

    // ------------------------------------------------------------------
    // Structs
    // ------------------------------------------------------------------

    fn parse_struct(&mut self, type_id: &mut Id) -> bool {
        if !self.accept(TokenId::Struct) {
            return false;
        }
        let location = self.tok.location.clone();

        let name = if self.accept(TokenId::Identifier) {
            self.tok.value.as_str().to_owned()
        } else {
            format!("__anonymous_struct_{}_{}", location.line, location.column)
        };
        let unique_name = format!("S{}{}", self.symbols.current_scope().name, name).replace(':', "_");

        if !self.expect(TokenId::BraceOpen) {
            return false;
        }

        let mut members: Vec<StructMember> = Vec::new();
        while !self.peek(TokenId::BraceClose) && !self.peek(TokenId::EndOfFile) {
            let mut ty = Type::VOID;
            if !self.parse_type(&mut ty) {
                let message = format!(
                    "syntax error: unexpected '{}', expected struct member type",
                    token_name(self.next.id)
                );
                let location = self.next.location.clone();
                self.error(&location, 3000, &message);
                self.consume_until(TokenId::BraceClose);
                return false;
            }
            if ty.is_void() {
                let location = self.next.location.clone();
                self.error(&location, 3038, "struct members cannot be void");
                self.consume_until(TokenId::BraceClose);
                return false;
            }
            if ty.has_qualifier(qual::IN) || ty.has_qualifier(qual::OUT) {
                let location = self.next.location.clone();
                self.error(&location, 3055, "struct members cannot be declared 'in' or 'out'");
                self.consume_until(TokenId::BraceClose);
                return false;
            }

            let mut count = 0;
            loop {
                if count > 0 && !self.expect(TokenId::Comma) {
                    self.consume_until(TokenId::BraceClose);
                    return false;
                }
                count += 1;
                if !self.expect(TokenId::Identifier) {
                    self.consume_until(TokenId::BraceClose);
                    return false;
                }
                let member_name = self.tok.value.as_str().to_owned();
                let mut member_ty = ty;
                if !self.parse_array(&mut member_ty.array_length) {
                    return false;
                }
                let mut semantic = String::new();
                if self.accept(TokenId::Colon) {
                    if !self.expect(TokenId::Identifier) {
                        self.consume_until(TokenId::BraceClose);
                        return false;
                    }
                    semantic = self.tok.value.as_str().to_uppercase();
                }
                members.push(StructMember {
                    name: member_name,
                    ty: member_ty,
                    semantic,
                });
                if self.peek(TokenId::Semicolon) {
                    break;
                }
            }
            if !self.expect(TokenId::Semicolon) {
                self.consume_until(TokenId::BraceClose);
                return false;
            }
        }

        *type_id = if members.is_empty() {
            let location = location.clone();
            self.warning(&location, 5001, "struct has no members");
            self.module.define_opaque_struct(&unique_name, location)
        } else {
            let member_types = members
                .iter()
                .map(|member| (member.name.clone(), member.ty))
                .collect::<Vec<_>>();
            self.module
                .define_struct(&unique_name, location.clone(), &member_types, false)
        };

        self.structs.insert(
            *type_id,
            StructInfo {
                name: name.clone(),
                members,
            },
        );

        let mut ty = Type::VOID;
        ty.base = BaseType::Struct;
        ty.definition = *type_id;
        let data = SymbolData {
            scope: self.symbols.current_scope().clone(),
            id: *type_id,
            kind: SymbolKind::StructType,
            ty,
            storage: StorageClass::Private,
            function: None,
        };
        if !self.symbols.insert(&name, data, true) {
            let location = self.tok.location.clone();
            let message = format!("redefinition of '{}'", name);
            self.error(&location, 3003, &message);
            return false;
        }

        self.expect(TokenId::BraceClose)
    }

    pub(crate) fn struct_info(&self, definition: Id) -> Option<&StructInfo> {
        self.structs.get(&definition)
    }
    pub(crate) fn current_function_info(&self) -> Option<Rc<FunctionInfo>> {
        let parent = self.symbols.current_parent()?;
        self.functions.get(&parent).cloned()
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn parse_function_declaration(&mut self, ty: Type, name: &str, function_id: &mut Id) -> bool {
        let location = self.tok.location.clone();

        if !self.expect(TokenId::ParenOpen) {
            return false;
        }
        if ty.qualifiers != 0 {
            self.error(&location, 3047, "function return type cannot have any qualifiers");
            return false;
        }

        // Parse the parameter list syntactically first; ids are allocated
        // once the signature is complete.
        let mut params: Vec<(String, Type, String, Location)> = Vec::new();
        while !self.peek(TokenId::ParenClose) {
            if !params.is_empty() && !self.expect(TokenId::Comma) {
                return false;
            }
            let mut param_ty = Type::VOID;
            if !self.parse_type(&mut param_ty) {
                let message = format!(
                    "syntax error: unexpected '{}', expected parameter type",
                    token_name(self.next.id)
                );
                let location = self.next.location.clone();
                self.error(&location, 3000, &message);
                return false;
            }
            if !self.expect(TokenId::Identifier) {
                return false;
            }
            let param_name = self.tok.value.as_str().to_owned();
            let param_location = self.tok.location.clone();

            if param_ty.is_void() {
                self.error(&param_location, 3038, "function parameters cannot be void");
                return false;
            }
            if param_ty.has_qualifier(qual::EXTERN) {
                self.error(&param_location, 3006, "function parameters cannot be declared 'extern'");
                return false;
            }
            if param_ty.has_qualifier(qual::STATIC) {
                self.error(&param_location, 3007, "function parameters cannot be declared 'static'");
                return false;
            }
            if param_ty.has_qualifier(qual::UNIFORM) {
                self.error(
                    &param_location,
                    3047,
                    "function parameters cannot be declared 'uniform', consider placing in global scope instead",
                );
                return false;
            }
            if param_ty.has_qualifier(qual::OUT) {
                if param_ty.has_qualifier(qual::CONST) {
                    self.error(&param_location, 3046, "output parameters cannot be declared 'const'");
                    return false;
                }
            } else {
                param_ty.qualifiers |= qual::IN;
            }

            if !self.parse_array(&mut param_ty.array_length) {
                return false;
            }

            let mut semantic = String::new();
            if self.accept(TokenId::Colon) {
                if !self.expect(TokenId::Identifier) {
                    return false;
                }
                semantic = self.tok.value.as_str().to_uppercase();
            }
            params.push((param_name, param_ty, semantic, param_location));
        }
        if !self.expect(TokenId::ParenClose) {
            return false;
        }

        let mut return_semantic = String::new();
        if self.accept(TokenId::Colon) {
            if !self.expect(TokenId::Identifier) {
                return false;
            }
            return_semantic = self.tok.value.as_str().to_uppercase();
            if ty.is_void() {
                let location = self.tok.location.clone();
                self.error(&location, 3076, "void function cannot have a semantic");
                return false;
            }
        }

        let unique_name = format!("F{}{}", self.symbols.current_scope().name, name).replace(':', "_");
        let param_types = params.iter().map(|(_, ty, _, _)| *ty).collect::<Vec<_>>();
        *function_id = self
            .module
            .define_function(&unique_name, location, &ty, &param_types);

        let info = Rc::new(FunctionInfo {
            name: name.to_owned(),
            unique_name,
            definition: *function_id,
            return_type: ty,
            return_semantic,
            params: params
                .iter()
                .map(|(name, ty, semantic, _)| FunctionParam {
                    name: name.clone(),
                    ty: *ty,
                    semantic: semantic.clone(),
                })
                .collect(),
        });
        self.functions.insert(*function_id, info.clone());

        let data = SymbolData {
            scope: self.symbols.current_scope().clone(),
            id: *function_id,
            kind: SymbolKind::Function,
            ty,
            storage: StorageClass::Private,
            function: Some(info),
        };
        self.symbols.insert(name, data, true);

        self.symbols.enter_scope(*function_id);

        for (param_name, param_ty, _, param_location) in &params {
            let id = self
                .module
                .define_parameter(param_name, param_location.clone(), param_ty);
            let data = SymbolData {
                scope: self.symbols.current_scope().clone(),
                id,
                kind: SymbolKind::Variable,
                ty: *param_ty,
                storage: StorageClass::Function,
                function: None,
            };
            if !self.symbols.insert(param_name, data, false) {
                let location = param_location.clone();
                let message = format!("redefinition of '{}'", param_name);
                self.error(&location, 3003, &message);
                self.symbols.leave_scope();
                return false;
            }
        }

        let entry = self.module.make_id();
        self.module.enter_block(entry);

        if !self.parse_statement_block(false) {
            self.symbols.leave_scope();
            self.module.leave_function();
            return false;
        }

        // Close a fall-through path. Non-void functions that flow off the
        // end are left with an unreachable terminator.
        if self.module.is_in_block() {
            if ty.is_void() {
                self.module.leave_block_and_return(None);
            } else {
                self.module.leave_block_and_unreachable();
            }
        }
        self.module.leave_function();
        self.symbols.leave_scope();
        true
    }

    // ------------------------------------------------------------------
    // Variables
    // ------------------------------------------------------------------

    pub(crate) fn parse_variable_declaration(
        &mut self,
        mut ty: Type,
        name: &str,
        global: bool,
        variable_id: &mut Id,
    ) -> bool {
        let mut location = self.tok.location.clone();

        if ty.is_void() {
            self.error(&location, 3038, "variables cannot be void");
            return false;
        }
        if ty.has_qualifier(qual::IN) || ty.has_qualifier(qual::OUT) {
            self.error(&location, 3055, "variables cannot be declared 'in' or 'out'");
            return false;
        }

        let parent = self.symbols.current_parent();
        if parent.is_none() {
            if !ty.has_qualifier(qual::STATIC) {
                if !ty.has_qualifier(qual::UNIFORM) && !(ty.is_texture() || ty.is_sampler()) {
                    self.warning(
                        &location,
                        5000,
                        "global variables are considered 'uniform' by default",
                    );
                }
                if ty.has_qualifier(qual::CONST) {
                    self.error(
                        &location,
                        3035,
                        "variables which are 'uniform' cannot be declared 'const'",
                    );
                    return false;
                }
                ty.qualifiers |= qual::EXTERN | qual::UNIFORM;
            }
        } else {
            if ty.has_qualifier(qual::EXTERN) {
                self.error(&location, 3006, "local variables cannot be declared 'extern'");
                return false;
            }
            if ty.has_qualifier(qual::UNIFORM) {
                self.error(&location, 3047, "local variables cannot be declared 'uniform'");
                return false;
            }
            if ty.is_texture() || ty.is_sampler() {
                self.error(&location, 3038, "local variables cannot be textures or samplers");
                return false;
            }
        }

        if !self.parse_array(&mut ty.array_length) {
            return false;
        }

        let mut semantic = String::new();
        if self.accept(TokenId::Colon) {
            if !self.expect(TokenId::Identifier) {
                return false;
            }
            semantic = self.tok.value.as_str().to_uppercase();
        }

        let mut annotations = AnnotationList::new();
        if global && !self.parse_annotations(&mut annotations) {
            return false;
        }

        let mut properties = VariableProperties::default();
        let mut initializer_value: Option<ConstantValue> = None;
        let mut initializer_expr: Option<Expression> = None;

        if self.accept(TokenId::Equal) {
            location = self.tok.location.clone();
            let mut expression = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                location.clone(),
            );
            if !self.parse_variable_assignment(&mut expression) {
                return false;
            }

            if global && !expression.is_constant() {
                self.error(&location, 3011, "initial value must be a literal expression");
                return false;
            }

            if Type::rank(&expression.ty, &ty) == 0 {
                self.error(&location, 3017, "initial value does not match variable type");
                return false;
            }
            if (expression.ty.rows < ty.rows || expression.ty.cols < ty.cols)
                && !expression.ty.is_scalar()
            {
                self.error(&location, 3017, "cannot implicitly convert these vector types");
                return false;
            }
            if expression.ty.rows > ty.rows || expression.ty.cols > ty.cols {
                self.warning(&location, 3206, "implicit truncation of vector type");
            }

            let mut target = ty;
            target.qualifiers = expression.ty.qualifiers;
            if expression.ty != target && ty.is_numeric() {
                self.apply_implicit_cast(&mut expression, &target);
            }
            if let Some(value) = &expression.constant {
                initializer_value = Some(value.clone());
            }
            initializer_expr = Some(expression);
        }

        let mut zero_initialized = false;
        if initializer_expr.is_none() && ty.is_numeric() {
            if ty.has_qualifier(qual::CONST) {
                let message = format!("missing initial value for '{}'", name);
                self.error(&location, 3012, &message);
                return false;
            }
            if !ty.has_qualifier(qual::UNIFORM) && !ty.is_array() {
                zero_initialized = true;
            }
        } else if initializer_expr.is_none() && self.peek(TokenId::BraceOpen) {
            if !self.parse_variable_properties(&mut properties) {
                return false;
            }
        }

        if ty.is_sampler() && properties.texture == 0 {
            let message = format!("missing 'Texture' property for '{}'", name);
            self.error(&location, 3012, &message);
            return false;
        }

        let storage = if !global {
            StorageClass::Function
        } else if ty.is_texture() || ty.is_sampler() {
            StorageClass::UniformConstant
        } else if ty.has_qualifier(qual::UNIFORM) {
            StorageClass::Uniform
        } else {
            StorageClass::Private
        };

        let prefix = if ty.has_qualifier(qual::UNIFORM) { 'U' } else { 'V' };
        let unique_name = if global {
            format!("{}{}{}", prefix, self.symbols.current_scope().name, name).replace(':', "_")
        } else {
            name.to_owned()
        };

        let initializer_id = match (&initializer_value, zero_initialized) {
            (Some(value), _) => Some(self.module.convert_constant(&ty, value)),
            (None, true) => Some(self.module.convert_null_constant(&ty)),
            _ => None,
        };
        *variable_id = self.module.define_variable(
            Some(unique_name.as_str()),
            location.clone(),
            &ty,
            storage,
            initializer_id,
        );

        // A non-constant local initializer becomes a plain store.
        if initializer_id.is_none() {
            if let Some(mut expression) = initializer_expr {
                let value = self.load(&mut expression);
                let target = Expression::lvalue(*variable_id, ty, storage, location.clone());
                self.module.access_chain_store(&target, value, &ty);
            }
        }

        let data = SymbolData {
            scope: self.symbols.current_scope().clone(),
            id: *variable_id,
            kind: SymbolKind::Variable,
            ty,
            storage,
            function: None,
        };
        if !self.symbols.insert(name, data, global) {
            let message = format!("redefinition of '{}'", name);
            self.error(&location, 3003, &message);
            return false;
        }

        if global {
            if ty.is_texture() {
                let mut texture = Texture::new(name, unique_name, *variable_id);
                texture.width = properties.width;
                texture.height = properties.height;
                texture.depth = properties.depth;
                texture.levels = properties.levels;
                texture.format = properties.format;
                texture.srgb = properties.srgb;
                texture.annotations = annotations;
                self.metadata.textures.push(texture);
            } else if ty.is_sampler() {
                let mut sampler = Sampler::new(name, *variable_id);
                sampler.texture = properties.texture;
                sampler.filter = properties.filter;
                sampler.address_u = properties.address_u;
                sampler.address_v = properties.address_v;
                sampler.address_w = properties.address_w;
                sampler.min_lod = properties.min_lod;
                sampler.max_lod = properties.max_lod;
                sampler.lod_bias = properties.lod_bias;
                sampler.srgb = properties.srgb;
                sampler.annotations = annotations;
                self.metadata.samplers.push(sampler);
            } else if ty.has_qualifier(qual::UNIFORM) {
                self.metadata.uniforms.push(Uniform {
                    name: name.to_owned(),
                    unique_name,
                    id: *variable_id,
                    ty,
                    semantic,
                    initializer: initializer_value,
                    annotations,
                });
            }
        }
        true
    }

    /// Parse an initializer: either an `{ … }` initializer list (producing
    /// an array constant) or an assignment expression.
    pub(crate) fn parse_variable_assignment(&mut self, expression: &mut Expression) -> bool {
        if self.accept(TokenId::BraceOpen) {
            let location = self.tok.location.clone();
            let mut values = Vec::new();
            let mut element_ty = Type::VOID;
            while !self.peek(TokenId::BraceClose) {
                if !values.is_empty() && !self.expect(TokenId::Comma) {
                    return false;
                }
                if self.peek(TokenId::BraceClose) {
                    break;
                }
                let mut element = Expression::constant(
                    ConstantValue::S32(0),
                    Type::scalar(BaseType::Int),
                    self.next.location.clone(),
                );
                if !self.parse_variable_assignment(&mut element) {
                    self.consume_until(TokenId::BraceClose);
                    return false;
                }
                let value = match &element.constant {
                    Some(value) => value.clone(),
                    None => {
                        let location = element.location.clone();
                        self.error(&location, 3011, "value must be a literal expression");
                        return false;
                    }
                };
                element_ty = element.ty;
                values.push(value);
            }
            if !self.expect(TokenId::BraceClose) {
                return false;
            }
            let mut ty = element_ty;
            ty.array_length = values.len() as i32;
            *expression = Expression::constant(ConstantValue::Composite(values), ty, location);
            return true;
        }
        self.parse_expression_assignment(expression)
    }

    fn parse_variable_properties(&mut self, properties: &mut VariableProperties) -> bool {
        if !self.expect(TokenId::BraceOpen) {
            return false;
        }
        while !self.peek(TokenId::BraceClose) && !self.peek(TokenId::EndOfFile) {
            if !self.expect(TokenId::Identifier) {
                return false;
            }
            let name = self.tok.value.as_str().to_owned();
            let location = self.tok.location.clone();

            let mut expression = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                self.next.location.clone(),
            );
            if !(self.expect(TokenId::Equal)
                && self.parse_variable_properties_expression(&mut expression)
                && self.expect(TokenId::Semicolon))
            {
                return false;
            }

            if name == "Texture" {
                let texture = self
                    .metadata
                    .textures
                    .iter()
                    .find(|texture| texture.id == expression.base);
                if !expression.is_lvalue || texture.is_none() {
                    self.error(&location, 3020, "type mismatch, expected texture name");
                    return false;
                }
                properties.texture = expression.base;
                continue;
            }

            let value = match &expression.constant {
                Some(value) => value.clone(),
                None => {
                    let location = expression.location.clone();
                    self.error(&location, 3011, "value must be a literal expression");
                    return false;
                }
            };
            let as_uint = value.to_u32().unwrap_or(0);
            let as_float = value.to_f32().unwrap_or(0.0);

            match name.as_str() {
                "Width" => properties.width = as_uint.max(1),
                "Height" => properties.height = as_uint.max(1),
                "Depth" => properties.depth = as_uint.max(1),
                "MipLevels" => {
                    if as_uint == 0 {
                        self.warning(
                            &location,
                            0,
                            "a texture cannot have 0 mipmap levels, changed it to 1",
                        );
                    }
                    properties.levels = as_uint.max(1);
                }
                "Format" => {
                    properties.format =
                        TextureFormat::from_u32(as_uint).unwrap_or(TextureFormat::Rgba8)
                }
                "SRGBTexture" | "SRGBReadEnable" => properties.srgb = as_uint != 0,
                "AddressU" => {
                    properties.address_u = AddressMode::from_u32(as_uint).unwrap_or(AddressMode::Clamp)
                }
                "AddressV" => {
                    properties.address_v = AddressMode::from_u32(as_uint).unwrap_or(AddressMode::Clamp)
                }
                "AddressW" => {
                    properties.address_w = AddressMode::from_u32(as_uint).unwrap_or(AddressMode::Clamp)
                }
                "MinFilter" => properties.filter = properties.filter.with_min(as_uint),
                "MagFilter" => properties.filter = properties.filter.with_mag(as_uint),
                "MipFilter" => properties.filter = properties.filter.with_mip(as_uint),
                "MinLOD" | "MaxMipLevel" => properties.min_lod = as_float,
                "MaxLOD" => properties.max_lod = as_float,
                "MipLODBias" | "MipMapLodBias" => properties.lod_bias = as_float,
                _ => {
                    let message = format!("unrecognized property '{}'", name);
                    self.error(&location, 3004, &message);
                    return false;
                }
            }
        }
        self.expect(TokenId::BraceClose)
    }

    fn parse_variable_properties_expression(&mut self, expression: &mut Expression) -> bool {
        const VALUES: &[(&str, u32)] = &[
            ("NONE", 0),
            ("POINT", 0),
            ("LINEAR", 1),
            ("ANISOTROPIC", 3),
            ("CLAMP", AddressMode::Clamp as u32),
            ("WRAP", AddressMode::Wrap as u32),
            ("REPEAT", AddressMode::Wrap as u32),
            ("MIRROR", AddressMode::Mirror as u32),
            ("BORDER", AddressMode::Border as u32),
            ("R8", TextureFormat::R8 as u32),
            ("R16F", TextureFormat::R16F as u32),
            ("R32F", TextureFormat::R32F as u32),
            ("RG8", TextureFormat::Rg8 as u32),
            ("R8G8", TextureFormat::Rg8 as u32),
            ("RG16", TextureFormat::Rg16 as u32),
            ("R16G16", TextureFormat::Rg16 as u32),
            ("RG16F", TextureFormat::Rg16F as u32),
            ("R16G16F", TextureFormat::Rg16F as u32),
            ("RG32F", TextureFormat::Rg32F as u32),
            ("R32G32F", TextureFormat::Rg32F as u32),
            ("RGBA8", TextureFormat::Rgba8 as u32),
            ("R8G8B8A8", TextureFormat::Rgba8 as u32),
            ("RGBA16", TextureFormat::Rgba16 as u32),
            ("R16G16B16A16", TextureFormat::Rgba16 as u32),
            ("RGBA16F", TextureFormat::Rgba16F as u32),
            ("R16G16B16A16F", TextureFormat::Rgba16F as u32),
            ("RGBA32F", TextureFormat::Rgba32F as u32),
            ("R32G32B32A32F", TextureFormat::Rgba32F as u32),
            ("DXT1", TextureFormat::Dxt1 as u32),
            ("DXT3", TextureFormat::Dxt3 as u32),
            ("DXT5", TextureFormat::Dxt5 as u32),
            ("LATC1", TextureFormat::Latc1 as u32),
            ("LATC2", TextureFormat::Latc2 as u32),
        ];

        self.backup();
        if self.accept(TokenId::Identifier) {
            let location = self.tok.location.clone();
            let upper = self.tok.value.as_str().to_uppercase();
            if let Some((_, value)) = VALUES.iter().find(|(name, _)| *name == upper) {
                *expression = Expression::constant(
                    ConstantValue::U32(*value),
                    Type::scalar(BaseType::Uint),
                    location,
                );
                return true;
            }
            // Not an enumerant; it may name a texture.
            let name = self.tok.value.as_str().to_owned();
            if let Some(symbol) = self.symbols.find(&name) {
                if symbol.kind == SymbolKind::Variable && symbol.ty.is_texture() {
                    *expression =
                        Expression::lvalue(symbol.id, symbol.ty, symbol.storage, location);
                    return true;
                }
            }
            self.restore();
        }
        self.parse_expression_multary(expression, 0)
    }

    // ------------------------------------------------------------------
    // Techniques and passes
    // ------------------------------------------------------------------

    fn parse_technique(&mut self, out: &mut Option<Technique>) -> bool {
        if !self.accept(TokenId::Technique) {
            return false;
        }
        let location = self.tok.location.clone();
        if !self.expect(TokenId::Identifier) {
            return false;
        }
        let name = self.tok.value.as_str().to_owned();
        let unique_name = format!("T{}{}", self.symbols.current_scope().name, name).replace(':', "_");

        let mut annotations = AnnotationList::new();
        if !self.parse_annotations(&mut annotations) {
            return false;
        }
        if !self.expect(TokenId::BraceOpen) {
            return false;
        }

        let mut passes = Vec::new();
        while !self.peek(TokenId::BraceClose) && !self.peek(TokenId::EndOfFile) {
            let mut pass = None;
            if !self.parse_technique_pass(&mut pass) {
                return false;
            }
            if let Some(pass) = pass {
                passes.push(pass);
            }
        }

        *out = Some(Technique {
            name,
            unique_name,
            location,
            annotations,
            passes,
        });
        self.expect(TokenId::BraceClose)
    }

    fn parse_technique_pass(&mut self, out: &mut Option<Pass>) -> bool {
        if !self.expect(TokenId::Pass) {
            return false;
        }
        let mut pass = Pass::new(self.tok.location.clone());

        if self.accept(TokenId::Identifier) {
            pass.name = self.tok.value.as_str().to_owned();
        }
        if !self.parse_annotations(&mut pass.annotations) {
            return false;
        }
        if !self.expect(TokenId::BraceOpen) {
            return false;
        }

        while !self.peek(TokenId::BraceClose) && !self.peek(TokenId::EndOfFile) {
            if !self.expect(TokenId::Identifier) {
                return false;
            }
            let state = self.tok.value.as_str().to_owned();
            let location = self.tok.location.clone();

            let mut expression = Expression::constant(
                ConstantValue::S32(0),
                Type::scalar(BaseType::Int),
                self.next.location.clone(),
            );
            if !(self.expect(TokenId::Equal)
                && self.parse_technique_pass_expression(&mut expression)
                && self.expect(TokenId::Semicolon))
            {
                return false;
            }

            if state == "VertexShader" || state == "PixelShader" {
                let function = self
                    .functions
                    .get(&expression.base)
                    .cloned()
                    .filter(|_| expression.base != 0);
                let function = match function {
                    Some(function) => function,
                    None => {
                        self.error(&location, 3020, "type mismatch, expected function name");
                        return false;
                    }
                };
                if state.starts_with('V') {
                    pass.vertex_shader = expression.base;
                    self.ensure_entry_point(&function, ExecutionModel::Vertex);
                } else {
                    pass.pixel_shader = expression.base;
                    self.ensure_entry_point(&function, ExecutionModel::Fragment);
                }
                continue;
            }

            if state.starts_with("RenderTarget")
                && (state == "RenderTarget"
                    || (state.len() == 13 && state.as_bytes()[12].is_ascii_digit()))
            {
                let index = if state.len() == 13 {
                    (state.as_bytes()[12] - b'0') as usize
                } else {
                    0
                };
                if index >= 8 {
                    let message = format!("unrecognized pass state '{}'", state);
                    self.error(&location, 3004, &message);
                    return false;
                }
                let is_texture = expression.is_lvalue && expression.base_ty.is_texture();
                if !is_texture {
                    self.error(&location, 3020, "type mismatch, expected texture name");
                    return false;
                }
                pass.render_targets[index] = expression.base;
                continue;
            }

            let value = match &expression.constant {
                Some(value) => value.clone(),
                None => {
                    self.error(&location, 3011, "pass state value must be a literal expression");
                    return false;
                }
            };
            let literal = value.to_u32().unwrap_or(0);

            use crate::metadata::{BlendFactor, BlendOp, ComparisonFunc, StencilOp};
            match state.as_str() {
                "SRGBWriteEnable" => pass.srgb_write_enable = literal != 0,
                "BlendEnable" => pass.blend_enable = literal != 0,
                "StencilEnable" => pass.stencil_enable = literal != 0,
                "ClearRenderTargets" => pass.clear_render_targets = literal != 0,
                "RenderTargetWriteMask" | "ColorWriteMask" => {
                    pass.color_write_mask = (literal & 0xF) as u8
                }
                "StencilReadMask" | "StencilMask" => {
                    pass.stencil_read_mask = (literal & 0xFF) as u8
                }
                "StencilWriteMask" => pass.stencil_write_mask = (literal & 0xFF) as u8,
                "BlendOp" => {
                    pass.blend_op = BlendOp::from_u32(literal).unwrap_or(BlendOp::Add)
                }
                "BlendOpAlpha" => {
                    pass.blend_op_alpha = BlendOp::from_u32(literal).unwrap_or(BlendOp::Add)
                }
                "SrcBlend" => {
                    pass.src_blend = BlendFactor::from_u32(literal).unwrap_or(BlendFactor::One)
                }
                "SrcBlendAlpha" => {
                    pass.src_blend_alpha =
                        BlendFactor::from_u32(literal).unwrap_or(BlendFactor::One)
                }
                "DestBlend" => {
                    pass.dest_blend = BlendFactor::from_u32(literal).unwrap_or(BlendFactor::Zero)
                }
                "DestBlendAlpha" => {
                    pass.dest_blend_alpha =
                        BlendFactor::from_u32(literal).unwrap_or(BlendFactor::Zero)
                }
                "StencilFunc" => {
                    pass.stencil_func =
                        ComparisonFunc::from_u32(literal).unwrap_or(ComparisonFunc::Always)
                }
                "StencilRef" => pass.stencil_ref = literal,
                "StencilPass" | "StencilPassOp" => {
                    pass.stencil_pass = StencilOp::from_u32(literal).unwrap_or(StencilOp::Keep)
                }
                "StencilFail" | "StencilFailOp" => {
                    pass.stencil_fail = StencilOp::from_u32(literal).unwrap_or(StencilOp::Keep)
                }
                "StencilZFail" | "StencilDepthFail" | "StencilDepthFailOp" => {
                    pass.stencil_depth_fail =
                        StencilOp::from_u32(literal).unwrap_or(StencilOp::Keep)
                }
                _ => {
                    let message = format!("unrecognized pass state '{}'", state);
                    self.error(&location, 3004, &message);
                    return false;
                }
            }
        }

        *out = Some(pass);
        self.expect(TokenId::BraceClose)
    }

    fn parse_technique_pass_expression(&mut self, expression: &mut Expression) -> bool {
        const ENUMS: &[(&str, u32)] = &[
            ("NONE", 0),
            ("ZERO", 0),
            ("ONE", 1),
            ("SRCCOLOR", 2),
            ("SRCALPHA", 4),
            ("INVSRCCOLOR", 3),
            ("INVSRCALPHA", 5),
            ("DESTCOLOR", 8),
            ("DESTALPHA", 6),
            ("INVDESTCOLOR", 9),
            ("INVDESTALPHA", 7),
            ("ADD", 1),
            ("SUBTRACT", 2),
            ("REVSUBTRACT", 3),
            ("MIN", 4),
            ("MAX", 5),
            ("KEEP", 1),
            ("REPLACE", 3),
            ("INVERT", 6),
            ("INCR", 7),
            ("INCRSAT", 4),
            ("DECR", 8),
            ("DECRSAT", 5),
            ("NEVER", 1),
            ("ALWAYS", 8),
            ("LESS", 2),
            ("GREATER", 5),
            ("LEQUAL", 4),
            ("LESSEQUAL", 4),
            ("GEQUAL", 7),
            ("GREATEREQUAL", 7),
            ("EQUAL", 3),
            ("NEQUAL", 6),
            ("NOTEQUAL", 6),
        ];

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
            (self.symbols.current_scope().clone(), false)
        };

        let accepted = if exclusive {
            self.expect(TokenId::Identifier)
        } else {
            self.accept(TokenId::Identifier)
        };
        if accepted {
            let location = self.tok.location.clone();
            let mut identifier = self.tok.value.as_str().to_owned();
            let upper = identifier.to_uppercase();

            if let Some((_, value)) = ENUMS.iter().find(|(name, _)| *name == upper) {
                *expression = Expression::constant(
                    ConstantValue::U32(*value),
                    Type::scalar(BaseType::Uint),
                    location,
                );
                return true;
            }

            while self.accept(TokenId::ColonColon) {
                if !self.expect(TokenId::Identifier) {
                    return false;
                }
                identifier.push_str("::");
                identifier.push_str(self.tok.value.as_str());
            }

            let symbol = match self.symbols.find_in(&identifier, &scope, exclusive) {
                Some(symbol) => symbol,
                None => {
                    let message = format!("undeclared identifier '{}'", identifier);
                    self.error(&location, 3004, &message);
                    return false;
                }
            };
            *expression = Expression::lvalue(symbol.id, symbol.ty, symbol.storage, location);
            return true;
        }

        self.parse_expression_multary(expression, 0)
    }

    // ------------------------------------------------------------------
    // Entry points
    // ------------------------------------------------------------------

    /// Synthesize a real SPIR-V entry point for `function` in the given
    /// stage: inputs and outputs become `Input`/`Output` globals, a wrapper
    /// loads them, calls the user function and stores the results.
    fn ensure_entry_point(&mut self, function: &Rc<FunctionInfo>, model: ExecutionModel) {
        let key = (function.definition, model as u32);
        if self.entry_points.contains_key(&key) {
            return;
        }

        let location = Location::default();
        let mut io = Vec::new();
        let mut input_location = 0u32;
        let mut output_location = 0u32;

        // One Input global per parameter (struct parameters expand into one
        // global per member).
        struct InputGlobal {
            ids: Vec<Id>,
            tys: Vec<Type>,
        }
        let mut inputs = Vec::new();
        for param in &function.params {
            let mut global = InputGlobal {
                ids: Vec::new(),
                tys: Vec::new(),
            };
            if param.ty.is_struct() {
                let members = self
                    .struct_info(param.ty.definition)
                    .map(|info| {
                        info.members
                            .iter()
                            .map(|member| (member.ty, member.semantic.clone()))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                for (member_ty, semantic) in members {
                    let id = self.module.define_variable(
                        None,
                        location.clone(),
                        &member_ty,
                        StorageClass::Input,
                        None,
                    );
                    self.decorate_io(id, &semantic, model, false, &mut input_location);
                    io.push(id);
                    global.ids.push(id);
                    global.tys.push(member_ty);
                }
            } else {
                let id = self.module.define_variable(
                    None,
                    location.clone(),
                    &param.ty,
                    StorageClass::Input,
                    None,
                );
                self.decorate_io(id, &param.semantic, model, false, &mut input_location);
                io.push(id);
                global.ids.push(id);
                global.tys.push(param.ty);
            }
            inputs.push(global);
        }

        // Output globals for the return value.
        let mut outputs = Vec::new();
        if !function.return_type.is_void() {
            if function.return_type.is_struct() {
                let members = self
                    .struct_info(function.return_type.definition)
                    .map(|info| {
                        info.members
                            .iter()
                            .map(|member| (member.ty, member.semantic.clone()))
                            .collect::<Vec<_>>()
                    })
                    .unwrap_or_default();
                for (member_ty, semantic) in members {
                    let id = self.module.define_variable(
                        None,
                        location.clone(),
                        &member_ty,
                        StorageClass::Output,
                        None,
                    );
                    self.decorate_io(id, &semantic, model, true, &mut output_location);
                    io.push(id);
                    outputs.push((id, member_ty));
                }
            } else {
                let id = self.module.define_variable(
                    None,
                    location.clone(),
                    &function.return_type,
                    StorageClass::Output,
                    None,
                );
                self.decorate_io(
                    id,
                    &function.return_semantic,
                    model,
                    true,
                    &mut output_location,
                );
                io.push(id);
                outputs.push((id, function.return_type));
            }
        }

        let wrapper =
            self.module
                .define_function(&function.name, location.clone(), &Type::VOID, &[]);
        let entry = self.module.make_id();
        self.module.enter_block(entry);

        let mut arguments = Vec::new();
        for (param, global) in function.params.iter().zip(inputs.iter()) {
            let value = if param.ty.is_struct() {
                let mut members = Vec::new();
                for (id, ty) in global.ids.iter().zip(global.tys.iter()) {
                    let expr =
                        Expression::lvalue(*id, *ty, StorageClass::Input, location.clone());
                    members.push(self.module.access_chain_load(&expr));
                }
                let struct_id = self.module.convert_type(&param.ty);
                let value = self.module.make_id();
                self.module.emit(
                    Instruction::new(Op::CompositeConstruct)
                        .with_type(struct_id)
                        .with_result(value)
                        .push_list(&members)
                        .at(location.clone()),
                );
                value
            } else {
                let expr = Expression::lvalue(
                    global.ids[0],
                    global.tys[0],
                    StorageClass::Input,
                    location.clone(),
                );
                self.module.access_chain_load(&expr)
            };
            // User functions take pointer parameters; spill into a local.
            let local = self.module.define_variable(
                None,
                location.clone(),
                &param.ty,
                StorageClass::Function,
                None,
            );
            self.module.emit(
                Instruction::new(Op::Store)
                    .push(local)
                    .push(value)
                    .at(location.clone()),
            );
            arguments.push(local);
        }

        let return_type_id = self.module.convert_type(&function.return_type);
        let result = self.module.make_id();
        self.module.emit(
            Instruction::new(Op::FunctionCall)
                .with_type(return_type_id)
                .with_result(result)
                .push(function.definition)
                .push_list(&arguments)
                .at(location.clone()),
        );

        if !outputs.is_empty() {
            if function.return_type.is_struct() {
                for (index, (id, ty)) in outputs.iter().enumerate() {
                    let member_ty_id = self.module.convert_type(ty);
                    let member = self.module.make_id();
                    self.module.emit(
                        Instruction::new(Op::CompositeExtract)
                            .with_type(member_ty_id)
                            .with_result(member)
                            .push(result)
                            .push(index as u32)
                            .at(location.clone()),
                    );
                    self.module.emit(
                        Instruction::new(Op::Store)
                            .push(*id)
                            .push(member)
                            .at(location.clone()),
                    );
                }
            } else {
                self.module.emit(
                    Instruction::new(Op::Store)
                        .push(outputs[0].0)
                        .push(result)
                        .at(location.clone()),
                );
            }
        }

        self.module.leave_block_and_return(None);
        self.module.leave_function();
        self.module.add_entry_point(&function.name, wrapper, model, &io);
        self.entry_points.insert(key, wrapper);
    }

    fn decorate_io(
        &mut self,
        id: Id,
        semantic: &str,
        model: ExecutionModel,
        is_output: bool,
        location_counter: &mut u32,
    ) {
        let builtin = match (semantic, model, is_output) {
            ("SV_POSITION", ExecutionModel::Vertex, true)
            | ("POSITION", ExecutionModel::Vertex, true) => Some(BuiltIn::Position),
            ("SV_POSITION", ExecutionModel::Fragment, false)
            | ("POSITION", ExecutionModel::Fragment, false)
            | ("VPOS", ExecutionModel::Fragment, false) => Some(BuiltIn::FragCoord),
            ("SV_DEPTH", ExecutionModel::Fragment, true)
            | ("DEPTH", ExecutionModel::Fragment, true) => Some(BuiltIn::FragDepth),
            ("SV_VERTEXID", ExecutionModel::Vertex, false)
            | ("VERTEXID", ExecutionModel::Vertex, false) => Some(BuiltIn::VertexIndex),
            _ => None,
        };
        if let Some(builtin) = builtin {
            self.module.add_builtin(id, builtin);
            return;
        }
        let trailing = semantic
            .chars()
            .rev()
            .take_while(|x| x.is_ascii_digit())
            .collect::<String>();
        let slot = if trailing.is_empty() {
            *location_counter
        } else {
            trailing.chars().rev().collect::<String>().parse().unwrap_or(0)
        };
        self.module
            .add_decoration(id, fxc_core::spirv::Decoration::Location, &[slot]);
        *location_counter = slot + 1;
    }

    // Accessors shared with the expression and statement modules.
    pub(crate) fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }
    pub(crate) fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }
    pub(crate) fn push_loop_targets(&mut self, break_target: Id, continue_target: Id) {
        self.loop_break_targets.push(break_target);
        self.loop_continue_targets.push(continue_target);
    }
    pub(crate) fn pop_loop_targets(&mut self) {
        self.loop_break_targets.pop();
        self.loop_continue_targets.pop();
    }
    pub(crate) fn break_target(&self) -> Option<Id> {
        self.loop_break_targets.last().copied().filter(|x| *x != 0)
    }
    pub(crate) fn continue_target(&self) -> Option<Id> {
        // A switch nested in a loop pushes a zero placeholder; `continue`
        // still refers to the enclosing loop.
        self.loop_continue_targets
            .iter()
            .rev()
            .copied()
            .find(|x| *x != 0)
    }
}

/// Helper bag for texture/sampler `{ … }` property blocks.
struct VariableProperties {
    texture: Id,
    width: u32,
    height: u32,
    depth: u32,
    levels: u32,
    format: TextureFormat,
    srgb: bool,
    filter: Filter,
    address_u: AddressMode,
    address_v: AddressMode,
    address_w: AddressMode,
    min_lod: f32,
    max_lod: f32,
    lod_bias: f32,
}
impl Default for VariableProperties {
    fn default() -> VariableProperties {
        VariableProperties {
            texture: 0,
            width: 1,
            height: 1,
            depth: 1,
            levels: 1,
            format: TextureFormat::Rgba8,
            srgb: false,
            filter: Filter::default(),
            address_u: AddressMode::Clamp,
            address_v: AddressMode::Clamp,
            address_w: AddressMode::Clamp,
            min_lod: 0.0,
            max_lod: f32::MAX,
            lod_bias: 0.0,
        }
    }
}

pub(crate) fn token_name(id: TokenId) -> &'static str {
    use TokenId::*;
    match id {
        Unknown | Error => "unknown",
        EndOfFile => "end of file",
        EndOfLine => "end of line",
        Space => "space",
        Exclaim => "!",
        Hash => "#",
        Dollar => "$",
        Percent => "%",
        Ampersand => "&",
        ParenOpen => "(",
        ParenClose => ")",
        Star => "*",
        Plus => "+",
        Comma => ",",
        Minus => "-",
        Dot => ".",
        Slash => "/",
        Colon => ":",
        Semicolon => ";",
        Less => "<",
        Equal => "=",
        Greater => ">",
        Question => "?",
        At => "@",
        BracketOpen => "[",
        Backslash => "\\",
        BracketClose => "]",
        Caret => "^",
        BraceOpen => "{",
        Pipe => "|",
        BraceClose => "}",
        Tilde => "~",
        ExclaimEqual => "!=",
        PercentEqual => "%=",
        AmpAmp => "&&",
        AmpEqual => "&=",
        StarEqual => "*=",
        PlusPlus => "++",
        PlusEqual => "+=",
        MinusMinus => "--",
        MinusEqual => "-=",
        Arrow => "->",
        Ellipsis => "...",
        SlashEqual => "/=",
        ColonColon => "::",
        LessLessEqual => "<<=",
        LessLess => "<<",
        LessEqual => "<=",
        EqualEqual => "==",
        GreaterGreaterEqual => ">>=",
        GreaterGreater => ">>",
        GreaterEqual => ">=",
        CaretEqual => "^=",
        PipeEqual => "|=",
        PipePipe => "||",
        Reserved => "reserved word",
        Identifier => "identifier",
        TrueLiteral => "true",
        FalseLiteral => "false",
        IntLiteral | UintLiteral => "integral literal",
        FloatLiteral | DoubleLiteral => "floating point literal",
        StringLiteral => "string literal",
        Namespace => "namespace",
        Struct => "struct",
        Technique => "technique",
        Pass => "pass",
        For => "for",
        While => "while",
        Do => "do",
        If => "if",
        Else => "else",
        Switch => "switch",
        Case => "case",
        Default => "default",
        Break => "break",
        Continue => "continue",
        Return => "return",
        Discard => "discard",
        Extern => "extern",
        Static => "static",
        Uniform => "uniform",
        Volatile => "volatile",
        Precise => "precise",
        In => "in",
        Out => "out",
        InOut => "inout",
        Const => "const",
        Linear => "linear",
        NoPerspective => "noperspective",
        Centroid => "centroid",
        NoInterpolation => "nointerpolation",
        Void => "void",
        Bool | Bool2 | Bool3 | Bool4 | Bool2x2 | Bool3x3 | Bool4x4 => "bool type",
        Int | Int2 | Int3 | Int4 | Int2x2 | Int3x3 | Int4x4 => "int type",
        Uint | Uint2 | Uint3 | Uint4 | Uint2x2 | Uint3x3 | Uint4x4 => "uint type",
        Float | Float2 | Float3 | Float4 | Float2x2 | Float3x3 | Float4x4 => "float type",
        Vector => "vector",
        Matrix => "matrix",
        String => "string",
        Texture1D | Texture2D | Texture3D => "texture type",
        Sampler1D | Sampler2D | Sampler3D => "sampler type",
        HashDef | HashUndef | HashIf | HashIfDef | HashIfNDef | HashElse | HashElif | HashEndif
        | HashError | HashWarning | HashPragma | HashInclude | HashUnknown => {
            "preprocessor directive"
        }
    }
}
