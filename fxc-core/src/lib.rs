//! Core machinery of the FX effect compiler: the language type model, typed
//! constants and their evaluation, SPIR-V instruction records, and the
//! incremental module builder with binary serialization.
pub use spirv;

pub mod constant;
pub mod eval;
pub mod expr;
pub mod instr;
pub mod location;
pub mod module;
pub mod ty;

pub use constant::ConstantValue;
pub use expr::{AccessOp, Expression};
pub use instr::{Instruction, Instrs, SpirvBinary};
pub use location::Location;
pub use module::Module;
pub use ty::{BaseType, Id, Type};

/// Error infrastructure.
pub mod error {
    pub use anyhow::{anyhow, Error, Result};
}
