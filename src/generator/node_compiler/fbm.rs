//! Fractal Brownian motion: a user expression unrolled over a fixed number
//! of octaves with geometrically decaying weights.

use anyhow::{Result, bail};

use crate::dsl::{self, Construct};
use crate::generator::defaults;
use crate::generator::error::GenerateError;
use crate::generator::glsl::Token;
use crate::generator::material::Material;
use crate::generator::node::{Fallback, NodeId};
use crate::generator::types::{DataType, Rate, ShaderStage, Symbol, Trait, TraitId};
use crate::generator::utils::fmt_float;

use super::noise;

/// Domain rotation applied between consecutive octaves.
pub const OCTAVE_ROTATION: &str = "point = mat2(1.6, 1.2, -1.2, 1.6) * point;";

const DEFAULT_CODE: &str = "$WEIGHT * SimplexNoise2D(point)";

#[derive(Debug, Clone, PartialEq)]
pub struct FbmNode {
    pub octaves: u32,
    /// Weight of octave `i` is `base^(i + 1)`.
    pub base: f64,
    /// Octave expression over `point`, with `$WEIGHT` and `$INDEX` placeholders.
    pub code: String,
    pub output: TraitId,
}

impl FbmNode {
    pub fn from_descriptor(construct: &Construct) -> Result<Self> {
        let octaves = dsl::trait_f64(construct, TraitId::Count).unwrap_or(4.0);
        if octaves < 1.0 || octaves.fract() != 0.0 || octaves > f64::from(u32::MAX) {
            bail!(GenerateError::Config(format!(
                "FBM needs a whole octave count of at least 1, got {octaves}"
            )));
        }
        let base = dsl::trait_f64(construct, TraitId::Mass).unwrap_or(0.5);
        if base == 0.0 || !base.is_finite() {
            bail!(GenerateError::Config(format!(
                "FBM base weight must be non-zero, got {base}"
            )));
        }
        let output = match dsl::trait_value(construct, TraitId::Output) {
            None => TraitId::Color,
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                GenerateError::config(format!("FBM Output must name a trait: {e}"))
            })?,
        };
        Ok(Self {
            octaves: octaves as u32,
            base,
            code: dsl::trait_str(construct, TraitId::Code)
                .unwrap_or(DEFAULT_CODE)
                .to_string(),
            output,
        })
    }

    pub fn weights(&self) -> Vec<f64> {
        (0..self.octaves)
            .map(|i| self.base.powi(i as i32 + 1))
            .collect()
    }

    /// Body of `float FBM<n>(in vec2 point)`: one accumulation per octave,
    /// separated by the domain rotation.
    pub fn function(&self, name: &str) -> String {
        let mut body = format!("float {name}(in vec2 point) {{\n    float total = 0.0;\n");
        for (i, weight) in self.weights().into_iter().enumerate() {
            if i > 0 {
                body.push_str(&format!("    {OCTAVE_ROTATION}\n"));
            }
            let octave = self
                .code
                .replace("$WEIGHT", &fmt_float(weight))
                .replace("$INDEX", &i.to_string());
            body.push_str(&format!("    total += {octave};\n"));
        }
        body.push_str("    return total;\n}");
        body
    }
}

pub fn generate(mat: &mut Material, id: NodeId, node: &FbmNode) -> Result<()> {
    mat.descend(id)?;
    let n = id.index();
    let stage = mat.node_stage(id)?;
    let rate = stage.rate();

    let sampler = Trait::new(TraitId::Sampler);
    let domain = if stage == ShaderStage::Pixel {
        // Without a uv producer the normalized fragment coordinate is the
        // regular domain, not a fallback worth a warning.
        let uv = match mat.find_value(id, &sampler, rate) {
            Some(_) => mat.get_value_as(id, &sampler, rate, DataType::Vec2, Fallback::Soft)?,
            None => None,
        };
        match uv {
            Some(uv) => uv,
            None => {
                log::debug!("FBM node {n} samples screen coordinates");
                let resolution = mat
                    .get_value(id, &Trait::new(TraitId::Resolution), Rate::Camera, Fallback::Input)?
                    .map(|s| s.expr)
                    .unwrap_or_default();
                format!("gl_FragCoord.xy / {resolution}")
            }
        }
    } else {
        mat.get_value_as(id, &sampler, rate, DataType::Vec2, Fallback::Input)?
            .unwrap_or_else(|| "vec2(0.0)".to_string())
    };

    if node.code.contains("SimplexNoise2D") {
        noise::ensure_simplex(mat, stage, 2)?;
    }
    if node.code.contains("SimplexNoise3D") {
        noise::ensure_simplex(mat, stage, 3)?;
    }
    let function = format!("FBM{n}");
    mat.ensure_function(stage, &function, &node.function(&function))?;

    let ty = defaults::default_for(node.output)
        .map(|d| d.ty)
        .unwrap_or(DataType::Float);
    // Vector outputs get the scalar splatted across their channels.
    let (value, ty) = match ty {
        DataType::Vec4 => (format!("vec4(vec3(fbm{n}), 1.0)"), ty),
        DataType::Vec3 | DataType::Vec2 => (format!("{}(fbm{n})", ty.glsl_name()?), ty),
        _ => (format!("fbm{n}"), DataType::Float),
    };
    mat.commit(
        stage,
        Token::main_body(stage),
        &format!("float fbm{n} = {function}({domain});"),
    )?;
    mat.expose(
        id,
        Trait::typed(node.output, ty),
        Symbol::new(value, ty, rate),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;
    use crate::dsl::ConstructKind;
    use serde_json::json;

    fn fbm(count: f64, mass: f64) -> Construct {
        Construct::new(ConstructKind::Fbm)
            .with_trait(TraitId::Count, json!(count))
            .with_trait(TraitId::Mass, json!(mass))
    }

    #[test]
    fn unrolls_octaves_with_decaying_weights() {
        let node = FbmNode::from_descriptor(
            &fbm(4.0, 0.5).with_trait(TraitId::Code, json!("$WEIGHT * sin(point.x * $INDEX.0)")),
        )
        .unwrap();
        let body = node.function("FBM1");
        assert_eq!(body.matches(OCTAVE_ROTATION).count(), 3);
        let octaves: Vec<&str> = body
            .lines()
            .filter(|l| l.trim_start().starts_with("total +="))
            .collect();
        assert_eq!(
            octaves,
            vec![
                "    total += 0.5 * sin(point.x * 0.0);",
                "    total += 0.25 * sin(point.x * 1.0);",
                "    total += 0.125 * sin(point.x * 2.0);",
                "    total += 0.0625 * sin(point.x * 3.0);",
            ]
        );
    }

    #[test]
    fn invalid_octaves_and_weights_are_rejected() {
        for construct in [fbm(0.0, 0.5), fbm(-2.0, 0.5), fbm(2.5, 0.5), fbm(4.0, 0.0)] {
            let err = FbmNode::from_descriptor(&construct).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<GenerateError>(),
                Some(GenerateError::Config(_))
            ));
        }
    }

    #[test]
    fn default_code_uses_noise_over_screen_coordinates() {
        let mat = generated(vec![fbm(2.0, 0.5)]).unwrap();
        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(pixel.contains("float SimplexNoise2D(in vec2 v) {"));
        assert!(pixel.contains("    total += 0.5 * SimplexNoise2D(point);"));
        assert!(pixel.contains("    float fbm1 = FBM1(gl_FragCoord.xy / Camera.Resolution);"));
        assert!(pixel.contains("outColor = vec4(vec3(fbm1), 1.0);"));
        assert!(mat.warnings().is_empty());
    }

    #[test]
    fn uv_producer_becomes_the_domain() {
        let mat = generated(vec![
            Construct::new(ConstructKind::Value)
                .with_trait(TraitId::Sampler, json!([0.25, 0.75])),
            fbm(1.0, 0.5),
        ])
        .unwrap();
        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(pixel.contains("float fbm2 = FBM2(value1);"));
        assert!(mat.warnings().is_empty());
    }

    #[test]
    fn output_trait_is_configurable() {
        let node = FbmNode::from_descriptor(&fbm(1.0, 2.0).with_trait(TraitId::Output, json!("Depth")))
            .unwrap();
        assert_eq!(node.output, TraitId::Depth);
        assert_eq!(node.weights(), vec![2.0]);
        assert!(
            FbmNode::from_descriptor(&fbm(1.0, 2.0).with_trait(TraitId::Output, json!("Nope")))
                .is_err()
        );
    }
}
