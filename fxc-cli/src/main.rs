use clap::Parser;
use std::{
    fs::File,
    io::{stderr, Read, Write},
    path::Path,
    process::exit,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(
        help = "Input effect file path. Or read from stdin if input file path \
        is not provided."
    )]
    in_path: Option<String>,

    #[arg(
        short,
        long,
        help = "Output SPIR-V file path. The output file is defaulted to \
        {in_path}.spv if this path is not given."
    )]
    out_path: Option<String>,

    #[arg(long, help = "Record a #pragma string in the effect metadata.")]
    pragma: Vec<String>,

    #[arg(long, help = "Print the technique, texture, sampler and uniform summary.")]
    metadata: bool,
}

fn main() {
    let args = Args::parse();

    let mut in_file: Box<dyn Read> = if let Some(in_path) = &args.in_path {
        let in_file = File::open(Path::new(in_path)).unwrap_or_else(|e| {
            writeln!(stderr(), "error: failed to open input file: {}", e).unwrap();
            exit(1);
        });
        Box::new(in_file)
    } else {
        Box::new(std::io::stdin())
    };
    let out_path = if let Some(out_path) = args.out_path {
        Path::new(&out_path).to_owned()
    } else {
        let in_path = args.in_path.as_deref().unwrap_or("out");
        Path::new(&format!("{}.spv", in_path)).to_owned()
    };

    let mut code = String::new();
    in_file.read_to_string(&mut code).unwrap_or_else(|e| {
        writeln!(stderr(), "error: failed to read input file: {}", e).unwrap();
        exit(1);
    });

    let file_name = args.in_path.as_deref().unwrap_or("<stdin>");
    let result = fxc::compile_with_pragmas(&code, file_name, &args.pragma);

    if !result.diagnostics.is_empty() {
        write!(stderr(), "{}", result.diagnostics).unwrap();
    }
    if !result.success {
        exit(1);
    }

    if args.metadata {
        for technique in &result.metadata.techniques {
            println!("technique {} ({} passes)", technique.name, technique.passes.len());
            for pass in &technique.passes {
                println!(
                    "  pass {}: vs={} ps={}",
                    pass.name, pass.vertex_shader, pass.pixel_shader
                );
            }
        }
        for texture in &result.metadata.textures {
            println!(
                "texture {}: {}x{} {:?}",
                texture.name, texture.width, texture.height, texture.format
            );
        }
        for sampler in &result.metadata.samplers {
            println!("sampler {}: texture id {}", sampler.name, sampler.texture);
        }
        for uniform in &result.metadata.uniforms {
            println!("uniform {}: {}", uniform.name, uniform.ty);
        }
    }

    let mut out_file = File::create(out_path).unwrap_or_else(|e| {
        writeln!(stderr(), "error: failed to open output file: {}", e).unwrap();
        exit(1);
    });
    out_file
        .write_all(&result.spirv.into_bytes())
        .unwrap_or_else(|e| {
            writeln!(stderr(), "error: failed to write output file: {}", e).unwrap();
            exit(1);
        });
}
