//! End-to-end compilation scenarios, checked by decoding the emitted word
//! stream.
use fxc_core::spirv::Op;
use pretty_assertions::assert_eq;

use crate::compile;

fn ops_of(words: &[u32]) -> Vec<Op> {
    fxc_core::Instrs::new(&words[5..])
        .map(|x| x.unwrap().op())
        .collect()
}

#[test]
fn test_return_constant_composite() {
    let result = compile(
        "float4 main(): COLOR { return float4(1, 0, 0, 1); }",
        "test.fx",
    );
    assert_eq!(result.diagnostics, "");
    assert!(result.success);

    let words = result.spirv.into_words();
    let ops = ops_of(&words);
    // The constructor folds into a single interned composite constant.
    assert_eq!(ops.iter().filter(|x| **x == Op::ConstantComposite).count(), 1);
    assert_eq!(ops.iter().filter(|x| **x == Op::CompositeConstruct).count(), 0);
    assert_eq!(ops.iter().filter(|x| **x == Op::Function).count(), 1);
    assert!(ops.contains(&Op::ReturnValue));
}

#[test]
fn test_spirv_header() {
    let result = compile("float4 main(): COLOR { return float4(1, 0, 0, 1); }", "test.fx");
    assert!(result.success);
    let words = result.spirv.words().to_vec();
    assert_eq!(words[0], 0x0723_0203);
    assert_eq!(words[2], 0);
    assert_eq!(words[4], 0);

    // Every instruction's word count covers the stream exactly, and every
    // result id stays below the recorded bound.
    let bound = words[3];
    let mut total = 0usize;
    for instr in fxc_core::Instrs::new(&words[5..]) {
        let instr = instr.unwrap();
        total += instr.word_count();
        if instr.op() == Op::Function || instr.op() == Op::Constant {
            assert!(instr.operands()[1] < bound);
        }
    }
    assert_eq!(total, words.len() - 5);
}

#[test]
fn test_overload_selection() {
    let result = compile(
        "int f(int x) { return x; }\n\
         float f(float x) { return x; }\n\
         void caller() { f(1); f(1.0); }",
        "test.fx",
    );
    assert_eq!(result.diagnostics, "");
    assert!(result.success);

    let words = result.spirv.into_words();
    let mut function_ids = Vec::new();
    let mut calls = Vec::new();
    for instr in fxc_core::Instrs::new(&words[5..]) {
        let instr = instr.unwrap();
        match instr.op() {
            Op::Function => function_ids.push(instr.operands()[1]),
            Op::FunctionCall => calls.push(instr.operands()[2]),
            _ => {}
        }
    }
    assert_eq!(function_ids.len(), 3);
    // f(1) resolves to the int overload, f(1.0) to the float overload.
    assert_eq!(calls, vec![function_ids[0], function_ids[1]]);
}

#[test]
fn test_matrix_times_vector_and_uniform_metadata() {
    let result = compile(
        "uniform float4x4 M;\n\
         float4 vs(float4 p: POSITION): SV_Position { return mul(M, p); }",
        "test.fx",
    );
    assert_eq!(result.diagnostics, "");
    assert!(result.success);

    assert_eq!(result.metadata.uniforms.len(), 1);
    assert_eq!(result.metadata.uniforms[0].name, "M");

    let ops = ops_of(&result.spirv.into_words());
    assert!(ops.contains(&Op::MatrixTimesVector));
}

#[test]
fn test_implicit_uniform_increment() {
    let result = compile("float x; void f() { x++; }", "test.fx");
    assert!(result.success);
    assert!(result.diagnostics.contains("warning X5000"));

    // The increment materializes as load, add, store.
    let ops = ops_of(&result.spirv.into_words());
    assert!(ops.contains(&Op::Load));
    assert!(ops.contains(&Op::FAdd));
    assert!(ops.contains(&Op::Store));
}

#[test]
fn test_invalid_struct_subscript() {
    let result = compile(
        "struct S { float a; };\n\
         S s;\n\
         float g() { return s.b; }",
        "test.fx",
    );
    assert!(!result.success);
    assert!(result.diagnostics.contains("error X3018"));
    assert!(result.spirv.words().is_empty());
}

#[test]
fn test_technique_metadata() {
    let result = compile(
        "texture2D tex { Width = 64; Height = 64; };\n\
         float4 vs(): SV_Position { return float4(0, 0, 0, 1); }\n\
         float4 ps(): SV_Target { return float4(1, 1, 1, 1); }\n\
         technique T { pass P { VertexShader = vs; PixelShader = ps; RenderTarget0 = tex; } }",
        "test.fx",
    );
    assert_eq!(result.diagnostics, "");
    assert!(result.success);

    assert_eq!(result.metadata.techniques.len(), 1);
    let technique = &result.metadata.techniques[0];
    assert_eq!(technique.name, "T");
    assert_eq!(technique.unique_name, "T__T");
    assert_eq!(technique.passes.len(), 1);
    let pass = &technique.passes[0];
    assert_eq!(pass.name, "P");
    assert!(pass.vertex_shader != 0);
    assert!(pass.pixel_shader != 0);
    assert_eq!(pass.render_targets[0], result.metadata.textures[0].id);

    // Both stages got real entry points.
    let words = result.spirv.into_words();
    let mut entry_models = Vec::new();
    for instr in fxc_core::Instrs::new(&words[5..]) {
        let instr = instr.unwrap();
        if instr.op() == Op::EntryPoint {
            entry_models.push(instr.operands()[0]);
        }
    }
    entry_models.sort_unstable();
    assert_eq!(entry_models, vec![0, 4]); // Vertex, Fragment
}

#[test]
fn test_constant_folding_kills_arithmetic() {
    let result = compile("void f() { const int a = 2 + 3 * 4; }", "test.fx");
    assert_eq!(result.diagnostics, "");
    assert!(result.success);

    let words = result.spirv.into_words();
    let mut found_fourteen = false;
    for instr in fxc_core::Instrs::new(&words[5..]) {
        let instr = instr.unwrap();
        match instr.op() {
            Op::IAdd | Op::IMul => panic!("folding left arithmetic behind"),
            Op::Constant => {
                if instr.operands().get(2) == Some(&14) {
                    found_fourteen = true;
                }
            }
            _ => {}
        }
    }
    assert!(found_fourteen);
}

#[test]
fn test_type_interning_is_global() {
    let result = compile(
        "float4 a(): COLOR { return float4(1, 2, 3, 4); }\n\
         float4 b(): COLOR { return float4(4, 3, 2, 1); }",
        "test.fx",
    );
    assert!(result.success);
    let words = result.spirv.into_words();
    let vector_types = fxc_core::Instrs::new(&words[5..])
        .map(|x| x.unwrap())
        .filter(|x| x.op() == Op::TypeVector)
        .count();
    assert_eq!(vector_types, 1);
}

#[test]
fn test_swizzle_store_merges_lanes() {
    let result = compile("void f() { float4 v; v.xy = v.zw; }", "test.fx");
    assert_eq!(result.diagnostics, "");
    assert!(result.success);
    let ops = ops_of(&result.spirv.into_words());
    // One shuffle reads .zw, another splices .xy back in.
    assert_eq!(ops.iter().filter(|x| **x == Op::VectorShuffle).count(), 2);
}

#[test]
fn test_repeated_swizzle_is_readonly() {
    let result = compile("void f() { float4 v; v.xx = v.zw; }", "test.fx");
    assert!(!result.success);
    assert!(result.diagnostics.contains("error X3025"));
}

#[test]
fn test_intrinsic_lowering_and_folding() {
    // A constant argument folds away the extended instruction.
    let result = compile("float4 f(): COLOR { return float4(sin(0.0), 0, 0, 1); }", "test.fx");
    assert!(result.success);
    let ops = ops_of(&result.spirv.into_words());
    assert!(!ops.contains(&Op::ExtInst));

    // A uniform argument does not.
    let result = compile(
        "uniform float t;\n\
         float4 f(): COLOR { return float4(sin(t), 0, 0, 1); }",
        "test.fx",
    );
    assert!(result.success);
    let ops = ops_of(&result.spirv.into_words());
    assert!(ops.contains(&Op::ExtInst));
}

#[test]
fn test_control_flow_shapes() {
    let result = compile(
        "float4 f(): COLOR {\n\
             float s = 0;\n\
             for (int i = 0; i < 4; i++) { s += 1; }\n\
             [unroll] while (s < 8) { s += 2; }\n\
             if (s > 1) { s = 1; } else { s = 0; }\n\
             return float4(s, 0, 0, 1);\n\
         }",
        "test.fx",
    );
    assert_eq!(result.diagnostics, "");
    assert!(result.success);
    let ops = ops_of(&result.spirv.into_words());
    assert_eq!(ops.iter().filter(|x| **x == Op::LoopMerge).count(), 2);
    assert_eq!(ops.iter().filter(|x| **x == Op::SelectionMerge).count(), 1);
    assert!(ops.contains(&Op::BranchConditional));
}

#[test]
fn test_switch_statement() {
    let result = compile(
        "int f(int x) {\n\
             int r = 0;\n\
             switch (x) {\n\
                 case 0: r = 1; break;\n\
                 case 1:\n\
                 case 2: r = 2; break;\n\
                 default: r = 3; break;\n\
             }\n\
             return r;\n\
         }",
        "test.fx",
    );
    assert_eq!(result.diagnostics, "");
    assert!(result.success);

    let words = result.spirv.into_words();
    let switch = fxc_core::Instrs::new(&words[5..])
        .map(|x| x.unwrap())
        .find(|x| x.op() == Op::Switch)
        .expect("no OpSwitch emitted");
    // selector + default + three (literal, label) pairs.
    assert_eq!(switch.operands().len(), 2 + 6);
    assert!(switch.operands()[1] != 0);
}

#[test]
fn test_discard_and_kill() {
    let result = compile(
        "float4 f(float4 c: COLOR): SV_Target { if (c.a < 0.5) discard; return c; }",
        "test.fx",
    );
    assert_eq!(result.diagnostics, "");
    assert!(result.success);
    assert!(ops_of(&result.spirv.into_words()).contains(&Op::Kill));
}

#[test]
fn test_sampler_requires_texture() {
    let result = compile("sampler2D s { MinFilter = LINEAR; };", "test.fx");
    assert!(!result.success);
    assert!(result.diagnostics.contains("error X3012"));

    let result = compile(
        "texture2D t { Width = 16; Height = 16; Format = RGBA16F; };\n\
         sampler2D s { Texture = t; AddressU = WRAP; MinFilter = POINT; };",
        "test.fx",
    );
    assert_eq!(result.diagnostics, "");
    assert!(result.success);
    assert_eq!(result.metadata.samplers.len(), 1);
    let sampler = &result.metadata.samplers[0];
    assert_eq!(sampler.texture, result.metadata.textures[0].id);
    assert_eq!(sampler.address_u, crate::metadata::AddressMode::Wrap);
    assert_eq!(sampler.filter.0 & 0x30, 0x00);
    assert_eq!(
        result.metadata.textures[0].format,
        crate::metadata::TextureFormat::Rgba16F
    );
}

#[test]
fn test_tex2d_call() {
    let result = compile(
        "texture2D t { Width = 16; Height = 16; };\n\
         sampler2D s { Texture = t; };\n\
         float4 ps(float2 uv: TEXCOORD0): SV_Target { return tex2D(s, uv); }",
        "test.fx",
    );
    assert_eq!(result.diagnostics, "");
    assert!(result.success);
    let ops = ops_of(&result.spirv.into_words());
    assert!(ops.contains(&Op::ImageSampleImplicitLod));
    assert!(ops.contains(&Op::TypeSampledImage));
}

#[test]
fn test_namespace_scoping() {
    let result = compile(
        "namespace A { uniform float x; float get() { return x; } }\n\
         float4 f(): COLOR { return float4(A::get(), 0, 0, 1); }",
        "test.fx",
    );
    assert_eq!(result.diagnostics, "");
    assert!(result.success);
}

#[test]
fn test_undeclared_identifier() {
    let result = compile("float4 f(): COLOR { return float4(oops, 0, 0, 1); }", "test.fx");
    assert!(!result.success);
    assert!(result.diagnostics.contains("error X3004"));
}

#[test]
fn test_ambiguous_overload() {
    let result = compile(
        "int f(int x) { return x; }\n\
         int f(uint x) { return 1; }\n\
         void caller() { f(1.0); }",
        "test.fx",
    );
    assert!(!result.success);
    assert!(result.diagnostics.contains("error X3067"));
}

#[test]
fn test_recursion_is_rejected() {
    let result = compile("int f(int x) { return f(x); }", "test.fx");
    assert!(!result.success);
    assert!(result.diagnostics.contains("error X3500"));
}

#[test]
fn test_const_assignment_rejected() {
    let result = compile("void f() { const float c = 1; c = 2; }", "test.fx");
    assert!(!result.success);
    assert!(result.diagnostics.contains("error X3025"));
}

#[test]
fn test_out_parameter_roundtrip() {
    let result = compile(
        "void produce(out float value) { value = 3.0; }\n\
         float4 f(): COLOR { float v = 0; produce(v); return float4(v, 0, 0, 1); }",
        "test.fx",
    );
    assert_eq!(result.diagnostics, "");
    assert!(result.success);
}

#[test]
fn test_annotations_and_pragmas() {
    let result = crate::compile_with_pragmas(
        "uniform float t < string ui_label = \"Timer\"; float ui_min = 0.0; >;",
        "test.fx",
        &["pragma1".to_owned()],
    );
    assert!(result.success);
    assert!(result.diagnostics.contains("warning X4717"));
    assert_eq!(result.metadata.pragmas, vec!["pragma1".to_owned()]);
    let uniform = &result.metadata.uniforms[0];
    assert_eq!(uniform.annotations.len(), 2);
    assert_eq!(uniform.annotations[0].0, "ui_label");
}
