use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use node_forge_shadergen::{assets::PrimitiveFactory, dsl, generator};
use node_forge_shadergen::generator::Material;

#[derive(Debug, Default, Clone)]
struct Cli {
    descriptor: Option<PathBuf>,
    shadertoy: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    pretty: bool,
    validate: bool,
}

const USAGE: &str = "supported: --descriptor <material.json> | --shadertoy <snippet.glsl>, --output-dir <dir>, --pretty, --validate";

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--descriptor" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --descriptor"));
                };
                cli.descriptor = Some(PathBuf::from(v));
                i += 2;
            }
            "--shadertoy" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --shadertoy"));
                };
                cli.shadertoy = Some(PathBuf::from(v));
                i += 2;
            }
            "--outputdir" | "--output-dir" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --output-dir"));
                };
                cli.output_dir = Some(PathBuf::from(v));
                i += 2;
            }
            "--pretty" => {
                cli.pretty = true;
                i += 1;
            }
            "--validate" => {
                cli.validate = true;
                i += 1;
            }
            other => {
                return Err(anyhow!("unknown argument: {other} ({USAGE})"));
            }
        }
    }
    if cli.descriptor.is_some() == cli.shadertoy.is_some() {
        return Err(anyhow!("exactly one input is required ({USAGE})"));
    }
    Ok(cli)
}

fn load_material(cli: &Cli) -> Result<Material> {
    if let Some(path) = cli.descriptor.as_deref() {
        let construct = dsl::load_descriptor_from_path(path)?;
        return Material::from_descriptor(&construct, &PrimitiveFactory::new())
            .with_context(|| format!("failed to build material from {}", path.display()));
    }
    let path = cli
        .shadertoy
        .as_deref()
        .ok_or_else(|| anyhow!("no input given ({USAGE})"))?;
    let code = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read --shadertoy file {}: {e}", path.display()))?;
    Material::from_shadertoy(&code)
}

fn write_stages(material: &Material, output_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    for (stage, source) in material.stages() {
        let path = output_dir.join(format!("{}.glsl", stage.name()));
        std::fs::write(&path, source)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("[shadergen] saved: {}", path.display());
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&argv)?;

    let mut material = load_material(&cli)?;
    material.generate()?;
    for warning in material.warnings() {
        eprintln!("[shadergen] warning: {warning}");
    }

    if cli.validate {
        generator::validate_material(&material)?;
        println!("[shadergen] all stages validated");
    }

    match cli.output_dir.as_deref() {
        Some(dir) => write_stages(&material, dir)?,
        None => {
            for (stage, source) in material.stages() {
                println!("// ---- {} ----", stage.name());
                if cli.pretty {
                    println!("{}", material.pretty(stage));
                } else {
                    print!("{source}");
                }
            }
        }
    }
    Ok(())
}
