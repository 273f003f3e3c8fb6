//! GLSL validation using the naga library.

use anyhow::{Context, Result, anyhow, bail};

use super::error::GenerateError;
use super::material::Material;
use super::types::ShaderStage;

fn naga_stage(stage: ShaderStage) -> Result<naga::ShaderStage> {
    match stage {
        ShaderStage::Vertex => Ok(naga::ShaderStage::Vertex),
        ShaderStage::Pixel => Ok(naga::ShaderStage::Fragment),
        ShaderStage::Compute => Ok(naga::ShaderStage::Compute),
        other => bail!(GenerateError::Unsupported(format!(
            "validating {} shaders",
            other.name()
        ))),
    }
}

/// Parse and validate one stage's GLSL source.
///
/// Geometry and tessellation stages have no naga front-end and fail with
/// [`GenerateError::Unsupported`].
pub fn validate_glsl(source: &str, stage: ShaderStage) -> Result<naga::Module> {
    let options = naga::front::glsl::Options {
        stage: naga_stage(stage)?,
        defines: Default::default(),
    };
    let module = naga::front::glsl::Frontend::default()
        .parse(&options, source)
        .map_err(|e| {
            anyhow!(
                "GLSL parse failed: {e:?}\n{}",
                numbered_source(source)
            )
        })?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| anyhow!("GLSL validation failed: {e:?}\n{}", numbered_source(source)))?;
    Ok(module)
}

/// Validate every non-empty stage of a generated material.
pub fn validate_material(material: &Material) -> Result<()> {
    for (stage, source) in material.stages() {
        validate_glsl(&source, stage)
            .with_context(|| format!("{} stage generated invalid GLSL", stage.name()))?;
    }
    Ok(())
}

fn numbered_source(source: &str) -> String {
    let mut output = String::from("---\n");
    for (line_num, line) in source.lines().enumerate() {
        output.push_str(&format!("{:4} | {}\n", line_num + 1, line));
    }
    output.push_str("---\n");
    output
}
