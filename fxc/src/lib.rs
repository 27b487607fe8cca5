//! Compiler front end for the FX shading effect language.
//!
//! `compile` turns effect source text into a SPIR-V binary plus a table of
//! pipeline-state metadata (techniques, passes, textures, samplers and
//! uniforms) and a formatted diagnostics buffer:
//!
//! ```
//! let result = fxc::compile(
//!     "float4 main() : COLOR { return float4(1, 0, 0, 1); }",
//!     "example.fx",
//! );
//! assert!(result.success);
//! ```
pub use fxc_core;
pub use fxc_core::SpirvBinary;

pub mod diag;
pub mod intrinsic;
pub mod lexer;
pub mod metadata;
pub mod symbol;

mod parser;
#[cfg(test)]
mod test;

pub use metadata::EffectMetadata;
pub use parser::Parser;

/// Everything a compilation produces. When `success` is false the binary is
/// undefined and must not be consumed.
pub struct CompileResult {
    pub success: bool,
    pub spirv: SpirvBinary,
    pub metadata: EffectMetadata,
    pub diagnostics: String,
}

/// Compile an effect. `file_name` is only used in diagnostics and the debug
/// section of the module.
pub fn compile(source: &str, file_name: &str) -> CompileResult {
    compile_with_pragmas(source, file_name, &[])
}

/// Like `compile`, with a set of pragma strings to record in the metadata.
pub fn compile_with_pragmas(source: &str, file_name: &str, pragmas: &[String]) -> CompileResult {
    let mut parser = Parser::new(source, file_name);
    let success = parser.run();

    let mut metadata = std::mem::take(&mut parser.metadata);
    metadata.pragmas.extend(pragmas.iter().cloned());
    for pragma in pragmas {
        parser.module.add_source_extension(pragma);
    }

    let spirv = if success {
        SpirvBinary::from(parser.module.assemble())
    } else {
        SpirvBinary::default()
    };

    CompileResult {
        success,
        spirv,
        metadata,
        diagnostics: parser.diag.into_string(),
    }
}
