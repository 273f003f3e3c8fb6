//! Texture nodes: sample one of several file-backed channels, optionally
//! cross-fading between channels along keyframes.

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::assets::{AssetFactory, TextureAsset};
use crate::dsl::{self, Construct, ConstructKind};
use crate::generator::error::GenerateError;
use crate::generator::glsl::{GlslLiteral, Token};
use crate::generator::material::Material;
use crate::generator::node::{Fallback, NodeId};
use crate::generator::types::{DataType, Rate, Symbol, Trait, TraitId};

/// A point in time at which `channel` is shown unblended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelKey {
    pub time: f32,
    pub channel: usize,
}

#[derive(Debug, Clone)]
pub struct TextureNode {
    pub files: Vec<Arc<dyn TextureAsset>>,
    /// Sorted by time.
    pub keys: Vec<ChannelKey>,
}

impl TextureNode {
    pub fn from_descriptor(construct: &Construct, factory: &dyn AssetFactory) -> Result<Self> {
        let mut files = Vec::new();
        for child in construct
            .children
            .iter()
            .filter(|c| c.kind == ConstructKind::File)
        {
            files.push(factory.create_texture(child).with_context(|| {
                format!(
                    "loading texture '{}'",
                    child.display_name().unwrap_or("unnamed")
                )
            })?);
        }
        if files.is_empty() {
            bail!(GenerateError::Config(
                "texture node needs at least one File child".to_string()
            ));
        }

        let mut keys = Vec::new();
        for child in construct
            .children
            .iter()
            .filter(|c| c.kind == ConstructKind::Keyframe)
        {
            if let Some(interpolator) = dsl::trait_str(child, TraitId::Interpolator) {
                if interpolator != "Linear" {
                    bail!(GenerateError::Unsupported(format!(
                        "{interpolator} cross-fades between texture channels"
                    )));
                }
            }
            let channel = dsl::trait_f64(child, TraitId::Count).unwrap_or(0.0);
            if channel < 0.0 || channel.fract() != 0.0 || channel as usize >= files.len() {
                bail!(GenerateError::Config(format!(
                    "texture keyframe channel {channel} is not one of the {} files",
                    files.len()
                )));
            }
            keys.push(ChannelKey {
                time: dsl::trait_f64(child, TraitId::Time).unwrap_or(0.0) as f32,
                channel: channel as usize,
            });
        }
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Ok(Self { files, keys })
    }

    /// Channels referenced by keyframes, or just the first file without any.
    pub fn active_channels(&self) -> Vec<usize> {
        let mut channels: Vec<usize> = self.keys.iter().map(|k| k.channel).collect();
        if channels.is_empty() {
            channels.push(0);
        }
        channels.sort_unstable();
        channels.dedup();
        channels
    }
}

fn sample_function(name: &str, samplers: &[(usize, String)]) -> String {
    let mut body = format!("vec4 {name}(in int channel, in vec2 uv) {{\n");
    let Some(((_, fallback), branches)) = samplers.split_last() else {
        body.push_str("    return vec4(0.0);\n}");
        return body;
    };
    for (channel, sampler) in branches {
        body.push_str(&format!(
            "    if (channel == {channel}) return texture({sampler}, uv);\n"
        ));
    }
    body.push_str(&format!("    return texture({fallback}, uv);\n}}"));
    body
}

pub fn generate(mat: &mut Material, id: NodeId, node: &TextureNode) -> Result<()> {
    mat.descend(id)?;
    let n = id.index();
    let stage = mat.node_stage(id)?;
    let rate = stage.rate();

    let mut samplers = Vec::new();
    for channel in node.active_channels() {
        let sampler = mat.add_input(
            Rate::Renderable,
            &Trait::typed(TraitId::Texture, DataType::Sampler2D),
            true,
        )?;
        log::debug!(
            "texture node {n} channel {channel} ({}) bound to {sampler}",
            node.files[channel].name()
        );
        samplers.push((channel, sampler));
    }

    let uv = mat
        .get_value_as(id, &Trait::new(TraitId::Sampler), rate, DataType::Vec2, Fallback::Input)?
        .unwrap_or_else(|| "vec2(0.0)".to_string());

    let code = if node.keys.len() < 2 {
        let sampler = samplers.first().map(|(_, s)| s.as_str()).unwrap_or_default();
        format!("vec4 textureColor{n} = texture({sampler}, {uv});")
    } else {
        let sample = format!("SampleChannel{n}");
        mat.ensure_function(stage, &sample, &sample_function(&sample, &samplers))?;

        let times_name = format!("TextureKeyTimes{n}");
        let channels_name = format!("TextureKeyChannels{n}");
        let count = node.keys.len();
        let last = count - 1;
        let times: Vec<String> = node.keys.iter().map(|k| k.time.to_glsl()).collect();
        let channels: Vec<String> = node
            .keys
            .iter()
            .map(|k| (k.channel as i32).to_glsl())
            .collect();
        mat.ensure_function(
            stage,
            &times_name,
            &format!(
                "const float {times_name}[{count}] = float[{count}]({});",
                times.join(", ")
            ),
        )?;
        mat.ensure_function(
            stage,
            &channels_name,
            &format!(
                "const int {channels_name}[{count}] = int[{count}]({});",
                channels.join(", ")
            ),
        )?;

        let time = mat
            .get_value_as(id, &Trait::new(TraitId::Time), rate, DataType::Float, Fallback::Input)?
            .unwrap_or_else(|| "0.0".to_string());
        format!(
            "float textureTime{n} = {time};
int textureIndex{n} = 0;
for (int i = 0; i < {last}; i++) {{
    if (textureTime{n} >= {times_name}[i + 1]) textureIndex{n} = i + 1;
}}
int textureNext{n} = min(textureIndex{n} + 1, {last});
float textureBlend{n} = textureNext{n} == textureIndex{n} ? 0.0 : clamp((textureTime{n} - {times_name}[textureIndex{n}]) / ({times_name}[textureNext{n}] - {times_name}[textureIndex{n}]), 0.0, 1.0);
vec4 textureColor{n} = mix({sample}({channels_name}[textureIndex{n}], {uv}), {sample}({channels_name}[textureNext{n}], {uv}), textureBlend{n});"
        )
    };
    mat.commit(stage, Token::main_body(stage), &code)?;

    mat.expose(
        id,
        Trait::typed(TraitId::Color, DataType::Vec4),
        Symbol::new(format!("textureColor{n}"), DataType::Vec4, rate),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;
    use crate::generator::types::ShaderStage;
    use serde_json::json;

    fn file(path: &str) -> Construct {
        Construct::new(ConstructKind::File).with_trait(TraitId::File, json!(path))
    }

    #[test]
    fn bridged_uv_keeps_one_location_on_both_sides() {
        let mat = generated(vec![
            Construct::new(ConstructKind::Value).with_typed_trait(TraitId::Color, DataType::Vec4, None),
            Construct::new(ConstructKind::Texture).with_child(file("a.png")),
        ])
        .unwrap();
        let vertex = mat.stage_code(ShaderStage::Vertex);
        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(vertex.contains("layout(location = 0) in vec2 inSampler;"));
        assert!(vertex.contains("layout(location = 0) out vec2 outSampler;"));
        assert!(vertex.contains("outSampler = inSampler;"));
        assert!(pixel.contains("layout(location = 0) in vec2 inSampler;"));
        // The unbridged color input comes after the bridged slot.
        assert!(pixel.contains("layout(location = 1) in vec4 inColor;"));
        assert_eq!(mat.outputs(Rate::Vertex)[0].location, Some(0));
        assert_eq!(
            mat.inputs(Rate::Pixel).iter().find(|b| b.name == "inSampler").unwrap().location,
            Some(0)
        );
    }

    fn key(time: f64, channel: u32) -> Construct {
        Construct::new(ConstructKind::Keyframe)
            .with_trait(TraitId::Time, json!(time))
            .with_trait(TraitId::Count, json!(channel))
    }

    #[test]
    fn single_file_samples_directly_and_colors_the_output() {
        let mat = generated(vec![
            Construct::new(ConstructKind::Texture).with_child(file("albedo.png")),
        ])
        .unwrap();
        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(pixel.contains("layout(set = 2, binding = 0) uniform sampler2D Texture0;"));
        assert!(pixel.contains("    vec4 textureColor1 = texture(Texture0, inSampler);"));
        assert!(pixel.contains("outColor = textureColor1;"));
        assert!(mat.warnings().is_empty());
    }

    #[test]
    fn keyframes_cross_fade_between_channels() {
        let mat = generated(vec![
            Construct::new(ConstructKind::Texture)
                .with_child(file("a.png"))
                .with_child(file("b.png"))
                .with_child(key(1.0, 1))
                .with_child(key(0.0, 0)),
        ])
        .unwrap();
        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(pixel.contains("const float TextureKeyTimes1[2] = float[2](0.0, 1.0);"));
        assert!(pixel.contains("const int TextureKeyChannels1[2] = int[2](0, 1);"));
        assert!(pixel.contains("    if (channel == 0) return texture(Texture0, uv);"));
        assert!(pixel.contains("    return texture(Texture1, uv);"));
        assert!(pixel.contains("float textureTime1 = Tick.Time;"));
        assert!(pixel.contains("vec4 textureColor1 = mix(SampleChannel1("));
    }

    #[test]
    fn descriptor_errors() {
        let factory = crate::assets::PrimitiveFactory::new();
        let err = TextureNode::from_descriptor(&Construct::new(ConstructKind::Texture), &factory)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerateError>(),
            Some(GenerateError::Config(_))
        ));

        let out_of_range = Construct::new(ConstructKind::Texture)
            .with_child(file("a.png"))
            .with_child(key(0.0, 3));
        assert!(TextureNode::from_descriptor(&out_of_range, &factory).is_err());

        let cubic = Construct::new(ConstructKind::Texture)
            .with_child(file("a.png"))
            .with_child(key(0.0, 0).with_trait(TraitId::Interpolator, json!("Cubic")));
        let err = TextureNode::from_descriptor(&cubic, &factory).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerateError>(),
            Some(GenerateError::Unsupported(_))
        ));
    }
}
