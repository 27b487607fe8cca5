//! Incremental SPIR-V module builder: id allocation, type and constant
//! interning, function and block construction, access-chain materialization
//! and binary serialization.
use fnv::FnvHashMap as HashMap;
use spirv::{
    AddressingModel, BuiltIn, Capability, Decoration, Dim, ExecutionMode, ExecutionModel,
    FunctionControl, ImageFormat, MemoryModel, Op, StorageClass,
};

use crate::{
    constant::ConstantValue,
    expr::{AccessOp, Expression},
    instr::Instruction,
    location::Location,
    ty::{BaseType, Id, Type},
};

/// Fixed id of the imported GLSL.std.450 instruction set.
pub const GLSL_EXT: Id = 1;
/// Fixed id of the `OpString` holding the source file name.
pub const SOURCE_STRING: Id = 2;
/// Emitted SPIR-V version word (1.0).
pub const SPIRV_VERSION: u32 = 0x0001_0000;

const FIRST_ID: Id = 10;

/// Interning key for a type: the qualifier set is deliberately not part of
/// the key so that `const float` and `float` share one `OpTypeFloat`.
#[derive(PartialEq, Eq, Hash, Clone, Copy, Debug)]
struct TypeKey {
    base: BaseType,
    rows: u32,
    cols: u32,
    array_length: i32,
    definition: Id,
}
impl TypeKey {
    fn of(ty: &Type) -> TypeKey {
        TypeKey {
            base: ty.base,
            rows: ty.rows,
            cols: ty.cols,
            array_length: ty.array_length,
            definition: ty.definition,
        }
    }
}

/// Handle to a block terminated by an open `OpSwitch`; see
/// `leave_block_and_switch_open`.
pub struct SwitchHandle {
    function: usize,
    block: usize,
}

/// A basic block: an `OpLabel` followed by straight-line instructions ending
/// in a single terminator.
#[derive(Default)]
pub struct Block {
    pub instructions: Vec<Instruction>,
}
impl Block {
    pub fn label(&self) -> Id {
        self.instructions.first().map(|x| x.result).unwrap_or(0)
    }
}

/// A function under construction. Local `OpVariable`s are hoisted into
/// `variables` and serialized at the top of the first block, as SPIR-V
/// requires.
pub struct Function {
    pub declaration: Instruction,
    pub params: Vec<Instruction>,
    pub variables: Vec<Instruction>,
    pub blocks: Vec<Block>,
    pub return_type: Type,
}

pub struct Module {
    next_id: Id,
    capabilities: Vec<Capability>,
    entries: Vec<Instruction>,
    execution_modes: Vec<Instruction>,
    debug_strings: Vec<Instruction>,
    debug_names: Vec<Instruction>,
    annotations: Vec<Instruction>,
    types_and_constants: Vec<Instruction>,
    variables: Vec<Instruction>,
    functions: Vec<Function>,

    type_lookup: HashMap<TypeKey, Id>,
    pointer_lookup: HashMap<(Id, u32), Id>,
    function_type_lookup: HashMap<(Id, Vec<Id>), Id>,
    constant_lookup: HashMap<(Id, ConstantValue), Id>,
    null_lookup: HashMap<Id, Id>,

    current_function: Option<usize>,
    current_block: Option<usize>,
    // Instructions emitted while no block is current land here and are
    // discarded, so unreachable code after a terminator cannot corrupt the
    // module.
    discard: Block,
}

impl Module {
    pub fn new() -> Module {
        let mut module = Module {
            next_id: FIRST_ID,
            capabilities: Vec::new(),
            entries: Vec::new(),
            execution_modes: Vec::new(),
            debug_strings: Vec::new(),
            debug_names: Vec::new(),
            annotations: Vec::new(),
            types_and_constants: Vec::new(),
            variables: Vec::new(),
            functions: Vec::new(),
            type_lookup: HashMap::default(),
            pointer_lookup: HashMap::default(),
            function_type_lookup: HashMap::default(),
            constant_lookup: HashMap::default(),
            null_lookup: HashMap::default(),
            current_function: None,
            current_block: None,
            discard: Block::default(),
        };
        module.add_capability(Capability::Shader);
        module
    }

    pub fn make_id(&mut self) -> Id {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
    pub fn bound(&self) -> Id {
        self.next_id
    }

    pub fn add_capability(&mut self, capability: Capability) {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
    }

    /// Record the display file name as `OpString` + `OpSource`.
    pub fn set_source(&mut self, file_name: &str) {
        self.debug_strings.push(
            Instruction::new(Op::String)
                .with_result(SOURCE_STRING)
                .push_str(file_name),
        );
        self.debug_strings.push(
            Instruction::new(Op::Source)
                .push(spirv::SourceLanguage::Unknown as u32)
                .push(0)
                .push(SOURCE_STRING),
        );
    }
    pub fn add_source_extension(&mut self, extension: &str) {
        self.debug_strings
            .push(Instruction::new(Op::SourceExtension).push_str(extension));
    }

    pub fn add_name(&mut self, id: Id, name: &str) {
        self.debug_names
            .push(Instruction::new(Op::Name).push(id).push_str(name));
    }
    pub fn add_member_name(&mut self, id: Id, member: u32, name: &str) {
        self.debug_names.push(
            Instruction::new(Op::MemberName)
                .push(id)
                .push(member)
                .push_str(name),
        );
    }
    pub fn add_decoration(&mut self, id: Id, decoration: Decoration, values: &[u32]) {
        self.annotations.push(
            Instruction::new(Op::Decorate)
                .push(id)
                .push(decoration as u32)
                .push_list(values),
        );
    }
    pub fn add_member_decoration(
        &mut self,
        id: Id,
        member: u32,
        decoration: Decoration,
        values: &[u32],
    ) {
        self.annotations.push(
            Instruction::new(Op::MemberDecorate)
                .push(id)
                .push(member)
                .push(decoration as u32)
                .push_list(values),
        );
    }
    pub fn add_builtin(&mut self, id: Id, builtin: BuiltIn) {
        self.add_decoration(id, Decoration::BuiltIn, &[builtin as u32]);
    }

    pub fn add_entry_point(&mut self, name: &str, function: Id, model: ExecutionModel, io: &[Id]) {
        self.entries.push(
            Instruction::new(Op::EntryPoint)
                .push(model as u32)
                .push(function)
                .push_str(name)
                .push_list(io),
        );
        if model == ExecutionModel::Fragment {
            self.execution_modes.push(
                Instruction::new(Op::ExecutionMode)
                    .push(function)
                    .push(ExecutionMode::OriginUpperLeft as u32),
            );
        }
    }

    // ------------------------------------------------------------------
    // Types and constants
    // ------------------------------------------------------------------

    /// Intern `ty` and return the id of its `OpType*` instruction. Calling
    /// this twice with an equal type returns the same id.
    pub fn convert_type(&mut self, ty: &Type) -> Id {
        let key = TypeKey::of(ty);
        if let Some(id) = self.type_lookup.get(&key) {
            return *id;
        }

        let instr = if ty.array_length != 0 {
            let elem = self.convert_type(&ty.element_type());
            if ty.array_length > 0 {
                let len = self.convert_constant(
                    &Type::scalar(BaseType::Uint),
                    &ConstantValue::U32(ty.array_length as u32),
                );
                Instruction::new(Op::TypeArray).push(elem).push(len)
            } else {
                Instruction::new(Op::TypeRuntimeArray).push(elem)
            }
        } else {
            match ty.base {
                BaseType::Void => Instruction::new(Op::TypeVoid),
                BaseType::Bool if ty.is_scalar() => Instruction::new(Op::TypeBool),
                BaseType::Int if ty.is_scalar() => {
                    Instruction::new(Op::TypeInt).push(32).push(1)
                }
                BaseType::Uint if ty.is_scalar() => {
                    Instruction::new(Op::TypeInt).push(32).push(0)
                }
                BaseType::Float if ty.is_scalar() => Instruction::new(Op::TypeFloat).push(32),
                _ if ty.is_matrix() => {
                    // A matrix is `cols` column vectors of `rows` components.
                    let column = self.convert_type(&Type::vector(ty.base, ty.rows));
                    Instruction::new(Op::TypeMatrix).push(column).push(ty.cols)
                }
                _ if ty.is_vector() => {
                    let scalar = self.convert_type(&Type::scalar(ty.base));
                    Instruction::new(Op::TypeVector).push(scalar).push(ty.rows)
                }
                BaseType::Texture => {
                    let sampled = self.convert_type(&Type::scalar(BaseType::Float));
                    let dim = match ty.rows {
                        1 => Dim::Dim1D,
                        3 => Dim::Dim3D,
                        _ => Dim::Dim2D,
                    };
                    Instruction::new(Op::TypeImage)
                        .push(sampled)
                        .push(dim as u32)
                        .push(0)
                        .push(0)
                        .push(0)
                        .push(1)
                        .push(ImageFormat::Unknown as u32)
                }
                BaseType::Sampler => {
                    let mut image = Type::texture(ty.rows);
                    image.qualifiers = 0;
                    let image = self.convert_type(&image);
                    Instruction::new(Op::TypeSampledImage).push(image)
                }
                BaseType::Struct => {
                    // Struct types are defined up front by `define_struct`.
                    return ty.definition;
                }
                _ => Instruction::new(Op::TypeVoid),
            }
        };

        let id = self.make_id();
        self.types_and_constants.push(instr.with_result(id));
        self.type_lookup.insert(key, id);
        id
    }

    pub fn convert_pointer_type(&mut self, ty: &Type, storage: StorageClass) -> Id {
        let pointee = self.convert_type(ty);
        if let Some(id) = self.pointer_lookup.get(&(pointee, storage as u32)) {
            return *id;
        }
        let id = self.make_id();
        self.types_and_constants.push(
            Instruction::new(Op::TypePointer)
                .with_result(id)
                .push(storage as u32)
                .push(pointee),
        );
        self.pointer_lookup.insert((pointee, storage as u32), id);
        id
    }

    /// Function types take their parameters as `Function`-storage pointers.
    pub fn convert_function_type(&mut self, return_type: &Type, param_types: &[Type]) -> Id {
        let ret = self.convert_type(return_type);
        let params = param_types
            .iter()
            .map(|ty| self.convert_pointer_type(ty, StorageClass::Function))
            .collect::<Vec<_>>();
        if let Some(id) = self.function_type_lookup.get(&(ret, params.clone())) {
            return *id;
        }
        let id = self.make_id();
        self.types_and_constants.push(
            Instruction::new(Op::TypeFunction)
                .with_result(id)
                .push(ret)
                .push_list(&params),
        );
        self.function_type_lookup.insert((ret, params), id);
        id
    }

    /// Intern a constant of `ty`. Composites recurse over their elements.
    pub fn convert_constant(&mut self, ty: &Type, value: &ConstantValue) -> Id {
        let type_id = self.convert_type(ty);
        if let Some(id) = self.constant_lookup.get(&(type_id, value.clone())) {
            return *id;
        }

        let instr = match value {
            ConstantValue::Bool(true) => Instruction::new(Op::ConstantTrue).with_type(type_id),
            ConstantValue::Bool(false) => Instruction::new(Op::ConstantFalse).with_type(type_id),
            ConstantValue::Composite(elems) => {
                let elem_ty = if ty.array_length != 0 {
                    ty.element_type()
                } else if ty.is_matrix() {
                    Type::vector(ty.base, ty.rows)
                } else {
                    Type::scalar(ty.base)
                };
                let ids = elems
                    .iter()
                    .map(|elem| self.convert_constant(&elem_ty, elem))
                    .collect::<Vec<_>>();
                Instruction::new(Op::ConstantComposite)
                    .with_type(type_id)
                    .push_list(&ids)
            }
            other => {
                let words = other.to_words().unwrap_or_default();
                Instruction::new(Op::Constant)
                    .with_type(type_id)
                    .push_list(&words)
            }
        };

        let id = self.make_id();
        self.types_and_constants.push(instr.with_result(id));
        self.constant_lookup.insert((type_id, value.clone()), id);
        id
    }

    pub fn convert_null_constant(&mut self, ty: &Type) -> Id {
        let type_id = self.convert_type(ty);
        if let Some(id) = self.null_lookup.get(&type_id) {
            return *id;
        }
        let id = self.make_id();
        self.types_and_constants
            .push(Instruction::new(Op::ConstantNull).with_type(type_id).with_result(id));
        self.null_lookup.insert(type_id, id);
        id
    }

    /// Define a struct type. When `uniform_layout` is set the members receive
    /// std140-like `Offset` decorations, matrices additionally a 16-byte
    /// `MatrixStride` in column-major order.
    pub fn define_struct(
        &mut self,
        name: &str,
        location: Location,
        members: &[(String, Type)],
        uniform_layout: bool,
    ) -> Id {
        let member_ids = members
            .iter()
            .map(|(_, ty)| self.convert_type(ty))
            .collect::<Vec<_>>();
        let id = self.make_id();
        self.types_and_constants.push(
            Instruction::new(Op::TypeStruct)
                .with_result(id)
                .push_list(&member_ids)
                .at(location),
        );
        self.add_name(id, name);
        let mut offset = 0u32;
        for (index, (member_name, ty)) in members.iter().enumerate() {
            self.add_member_name(id, index as u32, member_name);
            if uniform_layout && ty.is_numeric() {
                let alignment = ty.std140_alignment();
                offset = (offset + alignment - 1) / alignment * alignment;
                self.add_member_decoration(id, index as u32, Decoration::Offset, &[offset]);
                if ty.is_matrix() {
                    self.add_member_decoration(id, index as u32, Decoration::ColMajor, &[]);
                    self.add_member_decoration(id, index as u32, Decoration::MatrixStride, &[16]);
                }
                offset += ty.std140_size();
            }
        }
        id
    }

    /// Define an empty struct as an opaque type.
    pub fn define_opaque_struct(&mut self, name: &str, location: Location) -> Id {
        let id = self.make_id();
        self.types_and_constants.push(
            Instruction::new(Op::TypeOpaque)
                .with_result(id)
                .push_str(name)
                .at(location),
        );
        self.add_name(id, name);
        id
    }

    // ------------------------------------------------------------------
    // Functions, variables, blocks
    // ------------------------------------------------------------------

    /// Begin a new function; subsequent parameters, variables and blocks are
    /// appended to it until `leave_function`.
    pub fn define_function(
        &mut self,
        name: &str,
        location: Location,
        return_type: &Type,
        param_types: &[Type],
    ) -> Id {
        let return_type_id = self.convert_type(return_type);
        let function_type = self.convert_function_type(return_type, param_types);
        let id = self.make_id();
        let declaration = Instruction::new(Op::Function)
            .with_type(return_type_id)
            .with_result(id)
            .push(FunctionControl::INLINE.bits())
            .push(function_type)
            .at(location);
        self.functions.push(Function {
            declaration,
            params: Vec::new(),
            variables: Vec::new(),
            blocks: Vec::new(),
            return_type: *return_type,
        });
        self.current_function = Some(self.functions.len() - 1);
        self.add_name(id, name);
        id
    }

    pub fn define_parameter(&mut self, name: &str, location: Location, ty: &Type) -> Id {
        let pointer = self.convert_pointer_type(ty, StorageClass::Function);
        let id = self.make_id();
        let instr = Instruction::new(Op::FunctionParameter)
            .with_type(pointer)
            .with_result(id)
            .at(location);
        if let Some(function) = self.current_function {
            self.functions[function].params.push(instr);
        }
        self.add_name(id, name);
        id
    }

    /// Define a variable. `Function`-storage variables are hoisted into the
    /// current function's entry block; everything else lands in the global
    /// section.
    pub fn define_variable(
        &mut self,
        name: Option<&str>,
        location: Location,
        ty: &Type,
        storage: StorageClass,
        initializer: Option<Id>,
    ) -> Id {
        let pointer = self.convert_pointer_type(ty, storage);
        let id = self.make_id();
        let mut instr = Instruction::new(Op::Variable)
            .with_type(pointer)
            .with_result(id)
            .push(storage as u32)
            .at(location);
        if let Some(initializer) = initializer {
            instr = instr.push(initializer);
        }
        match (storage, self.current_function) {
            (StorageClass::Function, Some(function)) => {
                self.functions[function].variables.push(instr)
            }
            _ => self.variables.push(instr),
        }
        if let Some(name) = name {
            self.add_name(id, name);
        }
        id
    }

    pub fn leave_function(&mut self) {
        self.current_function = None;
        self.current_block = None;
    }

    /// Start a new basic block labeled `id`. Any previous block must already
    /// have been terminated.
    pub fn enter_block(&mut self, id: Id) {
        let function = match self.current_function {
            Some(function) => function,
            None => return,
        };
        let mut block = Block::default();
        block
            .instructions
            .push(Instruction::new(Op::Label).with_result(id));
        self.functions[function].blocks.push(block);
        self.current_block = Some(self.functions[function].blocks.len() - 1);
    }

    pub fn is_in_block(&self) -> bool {
        self.current_block.is_some()
    }
    pub fn current_block_label(&self) -> Id {
        match (self.current_function, self.current_block) {
            (Some(function), Some(block)) => self.functions[function].blocks[block].label(),
            _ => 0,
        }
    }

    /// Append an instruction to the current block. Instructions emitted with
    /// no current block are discarded; the builder never emits into a
    /// terminated block.
    pub fn emit(&mut self, instr: Instruction) -> Id {
        let result = instr.result;
        match (self.current_function, self.current_block) {
            (Some(function), Some(block)) => {
                self.functions[function].blocks[block].instructions.push(instr)
            }
            _ => self.discard.instructions.push(instr),
        }
        result
    }

    fn terminate(&mut self, instr: Instruction) {
        if self.current_block.is_none() {
            return;
        }
        self.emit(instr);
        self.current_block = None;
    }

    pub fn leave_block_and_branch(&mut self, target: Id) {
        self.terminate(Instruction::new(Op::Branch).push(target));
    }
    pub fn leave_block_and_branch_conditional(&mut self, condition: Id, true_target: Id, false_target: Id) {
        self.terminate(
            Instruction::new(Op::BranchConditional)
                .push(condition)
                .push(true_target)
                .push(false_target),
        );
    }
    /// Terminate the current block with an `OpSwitch` whose case list is not
    /// known yet. The default target and `(literal, label)` pairs are
    /// appended through the returned handle while the case bodies parse;
    /// this is the one place an inserted instruction still grows.
    pub fn leave_block_and_switch_open(&mut self, selector: Id) -> SwitchHandle {
        let handle = SwitchHandle {
            function: self.current_function.unwrap_or(usize::MAX),
            block: self.current_block.unwrap_or(usize::MAX),
        };
        self.terminate(Instruction::new(Op::Switch).push(selector).push(0));
        handle
    }
    pub fn append_switch_case(&mut self, handle: &SwitchHandle, literal: i32, label: Id) {
        if let Some(instr) = self.switch_instruction(handle) {
            instr.operands.push(literal as u32);
            instr.operands.push(label);
        }
    }
    pub fn set_switch_default(&mut self, handle: &SwitchHandle, label: Id) {
        if let Some(instr) = self.switch_instruction(handle) {
            instr.operands[1] = label;
        }
    }
    fn switch_instruction(&mut self, handle: &SwitchHandle) -> Option<&mut Instruction> {
        self.functions
            .get_mut(handle.function)?
            .blocks
            .get_mut(handle.block)?
            .instructions
            .last_mut()
            .filter(|instr| instr.op == Op::Switch)
    }

    /// Move the block labeled `label` to the end of the current function's
    /// block list. Loop continue blocks are parsed before the loop body but
    /// must be serialized after it.
    pub fn move_block_to_end(&mut self, label: Id) {
        let function = match self.current_function {
            Some(function) => function,
            None => return,
        };
        let blocks = &mut self.functions[function].blocks;
        if let Some(index) = blocks.iter().position(|block| block.label() == label) {
            let block = blocks.remove(index);
            blocks.push(block);
            if let Some(current) = self.current_block {
                if current == index {
                    self.current_block = Some(blocks.len() - 1);
                } else if current > index {
                    self.current_block = Some(current - 1);
                }
            }
        }
    }
    pub fn leave_block_and_return(&mut self, value: Option<Id>) {
        match value {
            Some(value) => self.terminate(Instruction::new(Op::ReturnValue).push(value)),
            None => self.terminate(Instruction::new(Op::Return)),
        }
    }
    pub fn leave_block_and_kill(&mut self) {
        self.terminate(Instruction::new(Op::Kill));
    }
    pub fn leave_block_and_unreachable(&mut self) {
        self.terminate(Instruction::new(Op::Unreachable));
    }

    // ------------------------------------------------------------------
    // Access chains and casts
    // ------------------------------------------------------------------

    /// Materialize an expression into a value id: `OpAccessChain` for the
    /// leading addressing steps, one `OpLoad`, then swizzles, extractions and
    /// conversions on the loaded value. Constants intern directly.
    pub fn access_chain_load(&mut self, expr: &Expression) -> Id {
        if let Some(value) = &expr.constant {
            return self.convert_constant(&expr.ty, value);
        }

        let mut ops = expr.chain.as_slice();
        let mut current = expr.base;
        let mut current_ty = expr.base_ty;

        if expr.is_lvalue {
            // Leading pointer steps extend a single access chain.
            let mut indices = Vec::new();
            while let Some(op) = ops.first() {
                match op {
                    AccessOp::Member { index, ty } | AccessOp::StaticIndex { index, ty } => {
                        let index = self.convert_constant(
                            &Type::scalar(BaseType::Uint),
                            &ConstantValue::U32(*index),
                        );
                        indices.push(index);
                        current_ty = *ty;
                    }
                    AccessOp::DynamicIndex { index, ty } => {
                        indices.push(*index);
                        current_ty = *ty;
                    }
                    _ => break,
                }
                ops = &ops[1..];
            }
            if !indices.is_empty() {
                let pointer = self.convert_pointer_type(&current_ty, expr.storage);
                let id = self.make_id();
                self.emit(
                    Instruction::new(Op::AccessChain)
                        .with_type(pointer)
                        .with_result(id)
                        .push(current)
                        .push_list(&indices)
                        .at(expr.location.clone()),
                );
                current = id;
            }
            let loaded = self.convert_type(&current_ty);
            let id = self.make_id();
            self.emit(
                Instruction::new(Op::Load)
                    .with_type(loaded)
                    .with_result(id)
                    .push(current)
                    .at(expr.location.clone()),
            );
            current = id;
        }

        for op in ops {
            current = self.apply_value_op(current, &current_ty, op, &expr.location);
            current_ty = *op.result_type();
        }
        current
    }

    fn apply_value_op(
        &mut self,
        value: Id,
        value_ty: &Type,
        op: &AccessOp,
        location: &Location,
    ) -> Id {
        match op {
            AccessOp::Cast { to } => self.emit_cast(location.clone(), value, value_ty, to),
            AccessOp::Member { index, ty } | AccessOp::StaticIndex { index, ty } => {
                let type_id = self.convert_type(ty);
                let id = self.make_id();
                self.emit(
                    Instruction::new(Op::CompositeExtract)
                        .with_type(type_id)
                        .with_result(id)
                        .push(value)
                        .push(*index)
                        .at(location.clone()),
                );
                id
            }
            AccessOp::DynamicIndex { index, ty } => {
                let type_id = self.convert_type(ty);
                let id = self.make_id();
                self.emit(
                    Instruction::new(Op::VectorExtractDynamic)
                        .with_type(type_id)
                        .with_result(id)
                        .push(value)
                        .push(*index)
                        .at(location.clone()),
                );
                id
            }
            AccessOp::Swizzle { mask, count, ty } => {
                if value_ty.is_scalar() {
                    // Swizzling a scalar broadcasts it.
                    if *count == 1 {
                        return value;
                    }
                    let type_id = self.convert_type(ty);
                    let id = self.make_id();
                    let mut instr = Instruction::new(Op::CompositeConstruct)
                        .with_type(type_id)
                        .with_result(id)
                        .at(location.clone());
                    for _ in 0..*count {
                        instr = instr.push(value);
                    }
                    self.emit(instr);
                    return id;
                }
                let type_id = self.convert_type(ty);
                let id = self.make_id();
                if *count == 1 {
                    self.emit(
                        Instruction::new(Op::CompositeExtract)
                            .with_type(type_id)
                            .with_result(id)
                            .push(value)
                            .push(mask[0] as u32)
                            .at(location.clone()),
                    );
                } else {
                    let mut instr = Instruction::new(Op::VectorShuffle)
                        .with_type(type_id)
                        .with_result(id)
                        .push(value)
                        .push(value)
                        .at(location.clone());
                    for component in &mask[..*count as usize] {
                        instr = instr.push(*component as u32);
                    }
                    self.emit(instr);
                }
                id
            }
            AccessOp::MatrixSwizzle { mask, count, ty } => {
                let scalar = Type::scalar(ty.base);
                let scalar_id = self.convert_type(&scalar);
                let mut components = Vec::new();
                for entry in &mask[..*count as usize] {
                    let (row, col) = ((*entry >> 2) as u32, (*entry & 3) as u32);
                    let id = self.make_id();
                    self.emit(
                        Instruction::new(Op::CompositeExtract)
                            .with_type(scalar_id)
                            .with_result(id)
                            .push(value)
                            .push(col)
                            .push(row)
                            .at(location.clone()),
                    );
                    components.push(id);
                }
                if components.len() == 1 {
                    components[0]
                } else {
                    let type_id = self.convert_type(ty);
                    let id = self.make_id();
                    self.emit(
                        Instruction::new(Op::CompositeConstruct)
                            .with_type(type_id)
                            .with_result(id)
                            .push_list(&components)
                            .at(location.clone()),
                    );
                    id
                }
            }
        }
    }

    /// Store `value` through an l-value chain. Multi-component swizzle stores
    /// merge into the existing vector with an `OpVectorShuffle`.
    pub fn access_chain_store(&mut self, expr: &Expression, value: Id, _value_ty: &Type) {
        let mut ops = expr.chain.as_slice();
        let mut current = expr.base;
        let mut current_ty = expr.base_ty;

        let mut indices = Vec::new();
        while let Some(op) = ops.first() {
            match op {
                AccessOp::Member { index, ty } | AccessOp::StaticIndex { index, ty } => {
                    let index = self.convert_constant(
                        &Type::scalar(BaseType::Uint),
                        &ConstantValue::U32(*index),
                    );
                    indices.push(index);
                    current_ty = *ty;
                }
                AccessOp::DynamicIndex { index, ty } => {
                    indices.push(*index);
                    current_ty = *ty;
                }
                _ => break,
            }
            ops = &ops[1..];
        }

        // A single-component swizzle is just another chain index.
        if let Some(AccessOp::Swizzle { mask, count: 1, ty }) = ops.first() {
            let index = self.convert_constant(
                &Type::scalar(BaseType::Uint),
                &ConstantValue::U32(mask[0] as u32),
            );
            indices.push(index);
            current_ty = *ty;
            ops = &ops[1..];
        }

        if !indices.is_empty() {
            let pointer = self.convert_pointer_type(&current_ty, expr.storage);
            let id = self.make_id();
            self.emit(
                Instruction::new(Op::AccessChain)
                    .with_type(pointer)
                    .with_result(id)
                    .push(current)
                    .push_list(&indices)
                    .at(expr.location.clone()),
            );
            current = id;
        }

        match ops.first() {
            None => {
                self.emit(
                    Instruction::new(Op::Store)
                        .push(current)
                        .push(value)
                        .at(expr.location.clone()),
                );
            }
            Some(AccessOp::Swizzle { mask, count, .. }) => {
                // Load the whole vector, splice the written lanes in, store
                // it back.
                let vector_id = self.convert_type(&current_ty);
                let old = self.make_id();
                self.emit(
                    Instruction::new(Op::Load)
                        .with_type(vector_id)
                        .with_result(old)
                        .push(current)
                        .at(expr.location.clone()),
                );
                let merged = self.make_id();
                let mut instr = Instruction::new(Op::VectorShuffle)
                    .with_type(vector_id)
                    .with_result(merged)
                    .push(old)
                    .push(value)
                    .at(expr.location.clone());
                for lane in 0..current_ty.rows {
                    let written = mask[..*count as usize]
                        .iter()
                        .position(|x| *x as u32 == lane);
                    match written {
                        Some(position) => {
                            instr = instr.push(current_ty.rows + position as u32)
                        }
                        None => instr = instr.push(lane),
                    }
                }
                self.emit(instr);
                self.emit(
                    Instruction::new(Op::Store)
                        .push(current)
                        .push(merged)
                        .at(expr.location.clone()),
                );
            }
            Some(AccessOp::MatrixSwizzle { mask, count, ty }) => {
                let scalar = Type::scalar(ty.base);
                let scalar_id = self.convert_type(&scalar);
                let pointer = self.convert_pointer_type(&scalar, expr.storage);
                for (position, entry) in mask[..*count as usize].iter().enumerate() {
                    let (row, col) = ((*entry >> 2) as u32, (*entry & 3) as u32);
                    let element = if *count == 1 {
                        value
                    } else {
                        let id = self.make_id();
                        self.emit(
                            Instruction::new(Op::CompositeExtract)
                                .with_type(scalar_id)
                                .with_result(id)
                                .push(value)
                                .push(position as u32)
                                .at(expr.location.clone()),
                        );
                        id
                    };
                    let col_id = self.convert_constant(
                        &Type::scalar(BaseType::Uint),
                        &ConstantValue::U32(col),
                    );
                    let row_id = self.convert_constant(
                        &Type::scalar(BaseType::Uint),
                        &ConstantValue::U32(row),
                    );
                    let target = self.make_id();
                    self.emit(
                        Instruction::new(Op::AccessChain)
                            .with_type(pointer)
                            .with_result(target)
                            .push(current)
                            .push(col_id)
                            .push(row_id)
                            .at(expr.location.clone()),
                    );
                    self.emit(
                        Instruction::new(Op::Store)
                            .push(target)
                            .push(element)
                            .at(expr.location.clone()),
                    );
                }
            }
            // Casts never survive on the left-hand side of an assignment.
            Some(_) => {}
        }
    }

    /// Convert a loaded value between numeric types: base-type change first,
    /// then broadcast or truncation of the shape.
    pub fn emit_cast(&mut self, location: Location, value: Id, from: &Type, to: &Type) -> Id {
        let mut current = value;
        let mut current_ty = *from;

        if current_ty.base != to.base {
            current = self.emit_base_cast(&location, current, &current_ty, to.base);
            current_ty.base = to.base;
        }
        if current_ty.rows == to.rows && current_ty.cols == to.cols {
            return current;
        }

        let type_id = self.convert_type(&to.element_type());
        if current_ty.is_scalar() {
            if to.is_matrix() {
                let column_ty = Type::vector(to.base, to.rows);
                let column_id = self.convert_type(&column_ty);
                let column = self.make_id();
                let mut instr = Instruction::new(Op::CompositeConstruct)
                    .with_type(column_id)
                    .with_result(column)
                    .at(location.clone());
                for _ in 0..to.rows {
                    instr = instr.push(current);
                }
                self.emit(instr);
                let id = self.make_id();
                let mut instr = Instruction::new(Op::CompositeConstruct)
                    .with_type(type_id)
                    .with_result(id)
                    .at(location);
                for _ in 0..to.cols {
                    instr = instr.push(column);
                }
                self.emit(instr);
                id
            } else {
                // Scalar to vector broadcast.
                let id = self.make_id();
                let mut instr = Instruction::new(Op::CompositeConstruct)
                    .with_type(type_id)
                    .with_result(id)
                    .at(location);
                for _ in 0..to.rows {
                    instr = instr.push(current);
                }
                self.emit(instr);
                id
            }
        } else if current_ty.is_vector() {
            if to.is_scalar() {
                let id = self.make_id();
                self.emit(
                    Instruction::new(Op::CompositeExtract)
                        .with_type(type_id)
                        .with_result(id)
                        .push(current)
                        .push(0)
                        .at(location),
                );
                id
            } else {
                // Vector truncation.
                let id = self.make_id();
                let mut instr = Instruction::new(Op::VectorShuffle)
                    .with_type(type_id)
                    .with_result(id)
                    .push(current)
                    .push(current)
                    .at(location);
                for lane in 0..to.rows {
                    instr = instr.push(lane);
                }
                self.emit(instr);
                id
            }
        } else if to.is_scalar() {
            // Matrix to scalar: the top-left element.
            let id = self.make_id();
            self.emit(
                Instruction::new(Op::CompositeExtract)
                    .with_type(type_id)
                    .with_result(id)
                    .push(current)
                    .push(0)
                    .push(0)
                    .at(location),
            );
            id
        } else {
            // Matrix truncation, column by column.
            let src_column = Type::vector(current_ty.base, current_ty.rows);
            let src_column_id = self.convert_type(&src_column);
            let dst_column = Type::vector(to.base, to.rows);
            let dst_column_id = self.convert_type(&dst_column);
            let mut columns = Vec::new();
            for col in 0..to.cols {
                let extracted = self.make_id();
                self.emit(
                    Instruction::new(Op::CompositeExtract)
                        .with_type(src_column_id)
                        .with_result(extracted)
                        .push(current)
                        .push(col)
                        .at(location.clone()),
                );
                let truncated = if to.rows == current_ty.rows {
                    extracted
                } else {
                    let id = self.make_id();
                    let mut instr = Instruction::new(Op::VectorShuffle)
                        .with_type(dst_column_id)
                        .with_result(id)
                        .push(extracted)
                        .push(extracted)
                        .at(location.clone());
                    for lane in 0..to.rows {
                        instr = instr.push(lane);
                    }
                    self.emit(instr);
                    id
                };
                columns.push(truncated);
            }
            let id = self.make_id();
            self.emit(
                Instruction::new(Op::CompositeConstruct)
                    .with_type(type_id)
                    .with_result(id)
                    .push_list(&columns)
                    .at(location),
            );
            id
        }
    }

    fn emit_base_cast(&mut self, location: &Location, value: Id, from: &Type, to: BaseType) -> Id {
        if from.is_matrix() {
            // Convert column by column.
            let src_column = Type::vector(from.base, from.rows);
            let src_column_id = self.convert_type(&src_column);
            let dst = Type::matrix(to, from.rows, from.cols);
            let dst_id = self.convert_type(&dst);
            let mut columns = Vec::new();
            for col in 0..from.cols {
                let extracted = self.make_id();
                self.emit(
                    Instruction::new(Op::CompositeExtract)
                        .with_type(src_column_id)
                        .with_result(extracted)
                        .push(value)
                        .push(col)
                        .at(location.clone()),
                );
                columns.push(self.emit_base_cast(location, extracted, &src_column, to));
            }
            let id = self.make_id();
            self.emit(
                Instruction::new(Op::CompositeConstruct)
                    .with_type(dst_id)
                    .with_result(id)
                    .push_list(&columns)
                    .at(location.clone()),
            );
            return id;
        }

        let mut result_ty = *from;
        result_ty.base = to;
        let result_type_id = self.convert_type(&result_ty);

        let op = match (from.base, to) {
            (BaseType::Int, BaseType::Uint) | (BaseType::Uint, BaseType::Int) => Op::Bitcast,
            (BaseType::Int, BaseType::Float) => Op::ConvertSToF,
            (BaseType::Uint, BaseType::Float) => Op::ConvertUToF,
            (BaseType::Float, BaseType::Int) => Op::ConvertFToS,
            (BaseType::Float, BaseType::Uint) => Op::ConvertFToU,
            (BaseType::Bool, _) => {
                // bool -> number: select between one and zero.
                let mut numeric = *from;
                numeric.base = to;
                let one = self.convert_constant(&numeric, &one_value(&numeric));
                let zero = self.convert_constant(&numeric, &ConstantValue::zero(&numeric));
                let id = self.make_id();
                self.emit(
                    Instruction::new(Op::Select)
                        .with_type(result_type_id)
                        .with_result(id)
                        .push(value)
                        .push(one)
                        .push(zero)
                        .at(location.clone()),
                );
                return id;
            }
            (_, BaseType::Bool) => {
                // number -> bool: compare against zero.
                let zero = self.convert_constant(from, &ConstantValue::zero(from));
                let op = if from.base == BaseType::Float {
                    Op::FOrdNotEqual
                } else {
                    Op::INotEqual
                };
                let id = self.make_id();
                self.emit(
                    Instruction::new(op)
                        .with_type(result_type_id)
                        .with_result(id)
                        .push(value)
                        .push(zero)
                        .at(location.clone()),
                );
                return id;
            }
            _ => return value,
        };
        let id = self.make_id();
        self.emit(
            Instruction::new(op)
                .with_type(result_type_id)
                .with_result(id)
                .push(value)
                .at(location.clone()),
        );
        id
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Serialize to the standard little-endian word stream. The bound in the
    /// header is the next unissued id.
    pub fn assemble(&self) -> Vec<u32> {
        let mut out = vec![spirv::MAGIC_NUMBER, SPIRV_VERSION, 0, self.next_id, 0];

        for capability in &self.capabilities {
            Instruction::new(Op::Capability)
                .push(*capability as u32)
                .write_words(&mut out);
        }
        Instruction::new(Op::ExtInstImport)
            .with_result(GLSL_EXT)
            .push_str("GLSL.std.450")
            .write_words(&mut out);
        Instruction::new(Op::MemoryModel)
            .push(AddressingModel::Logical as u32)
            .push(MemoryModel::GLSL450 as u32)
            .write_words(&mut out);

        for section in [
            &self.entries,
            &self.execution_modes,
            &self.debug_strings,
            &self.debug_names,
            &self.annotations,
            &self.types_and_constants,
            &self.variables,
        ]
        .iter()
        {
            for instr in section.iter() {
                instr.write_words(&mut out);
            }
        }

        for function in &self.functions {
            function.declaration.write_words(&mut out);
            for param in &function.params {
                param.write_words(&mut out);
            }
            for (index, block) in function.blocks.iter().enumerate() {
                let mut instrs = block.instructions.iter();
                if let Some(label) = instrs.next() {
                    label.write_words(&mut out);
                }
                if index == 0 {
                    for variable in &function.variables {
                        variable.write_words(&mut out);
                    }
                }
                for instr in instrs {
                    instr.write_words(&mut out);
                }
            }
            Instruction::new(Op::FunctionEnd).write_words(&mut out);
        }

        out
    }
}

impl Default for Module {
    fn default() -> Self {
        Module::new()
    }
}

fn one_value(ty: &Type) -> ConstantValue {
    let scalar = match ty.base {
        BaseType::Int => ConstantValue::S32(1),
        BaseType::Uint => ConstantValue::U32(1),
        _ => ConstantValue::from(1.0f32),
    };
    if ty.is_vector() {
        ConstantValue::Composite(vec![scalar; ty.rows as usize])
    } else {
        scalar
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::instr::Instrs;

    #[test]
    fn test_type_interning() {
        let mut module = Module::new();
        let float4 = Type::vector(BaseType::Float, 4);
        let a = module.convert_type(&float4);
        let b = module.convert_type(&float4);
        assert_eq!(a, b);
        let mut qualified = float4;
        qualified.qualifiers = crate::ty::qual::CONST;
        assert_eq!(module.convert_type(&qualified), a);

        let count = module
            .types_and_constants
            .iter()
            .filter(|x| x.op == Op::TypeVector)
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_constant_interning() {
        let mut module = Module::new();
        let int = Type::scalar(BaseType::Int);
        let a = module.convert_constant(&int, &ConstantValue::S32(14));
        let b = module.convert_constant(&int, &ConstantValue::S32(14));
        let c = module.convert_constant(&int, &ConstantValue::S32(15));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_header_words() {
        let mut module = Module::new();
        module.set_source("test.fx");
        let words = module.assemble();
        assert_eq!(words[0], 0x0723_0203);
        assert_eq!(words[1], SPIRV_VERSION);
        assert_eq!(words[2], 0);
        assert_eq!(words[3], module.bound());
        assert_eq!(words[4], 0);
        // Every instruction's recorded word count covers the stream exactly.
        for instr in Instrs::new(&words[5..]) {
            instr.unwrap();
        }
    }

    #[test]
    fn test_block_discipline() {
        let mut module = Module::new();
        let void = Type::VOID;
        let function = module.define_function("f", Location::default(), &void, &[]);
        assert!(function >= FIRST_ID);
        let entry = module.make_id();
        module.enter_block(entry);
        assert!(module.is_in_block());
        module.leave_block_and_return(None);
        assert!(!module.is_in_block());
        // A second terminator attempt is refused silently.
        module.leave_block_and_return(None);
        module.leave_function();

        let words = module.assemble();
        let terminators = Instrs::new(&words[5..])
            .map(|x| x.unwrap().op())
            .filter(|op| *op == Op::Return)
            .count();
        assert_eq!(terminators, 1);
    }

    #[test]
    fn test_load_store_roundtrip_shape() {
        let mut module = Module::new();
        let void = Type::VOID;
        let float4 = Type::vector(BaseType::Float, 4);
        module.define_function("f", Location::default(), &void, &[]);
        let entry = module.make_id();
        module.enter_block(entry);
        let variable = module.define_variable(
            Some("v"),
            Location::default(),
            &float4,
            StorageClass::Function,
            None,
        );
        let expr = Expression::lvalue(variable, float4, StorageClass::Function, Location::default());
        let mut swizzled = expr.clone();
        swizzled.add_swizzle_access([1, 0, -1, -1], 2, Type::vector(BaseType::Float, 2));
        let loaded = module.access_chain_load(&swizzled);
        assert!(loaded != 0);
        module.leave_block_and_return(None);
        module.leave_function();

        let words = module.assemble();
        let ops = Instrs::new(&words[5..])
            .map(|x| x.unwrap().op())
            .collect::<Vec<_>>();
        assert!(ops.contains(&Op::Load));
        assert!(ops.contains(&Op::VectorShuffle));
    }
}
