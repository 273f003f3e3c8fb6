//! Camera nodes: per-pixel view rays or per-vertex clip-space positions.

use anyhow::{Result, bail};

use crate::dsl::{self, Construct};
use crate::generator::error::GenerateError;
use crate::generator::glsl::Token;
use crate::generator::material::Material;
use crate::generator::node::{Fallback, NodeId};
use crate::generator::types::{DataType, Rate, ShaderStage, Symbol, Trait, TraitId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Projection {
    Perspective,
    /// Equirectangular mapping of the whole `FieldOfView` onto the screen.
    Panoramic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraNode {
    pub projection: Projection,
    /// The construct declares a `View` trait; without one the camera is flat.
    pub has_view: bool,
}

impl CameraNode {
    pub fn from_descriptor(construct: &Construct) -> Result<Self> {
        let projection = match dsl::trait_str(construct, TraitId::Projection) {
            None | Some("Perspective") => Projection::Perspective,
            Some("Panoramic") => Projection::Panoramic,
            Some(other) => bail!(GenerateError::Config(format!(
                "unknown camera projection '{other}' (expected Perspective or Panoramic)"
            ))),
        };
        Ok(Self {
            projection,
            has_view: dsl::find_trait(construct, TraitId::View).is_some(),
        })
    }
}

fn uniform(mat: &mut Material, id: NodeId, trait_id: TraitId, rate: Rate) -> Result<String> {
    let symbol = mat.get_value(id, &Trait::new(trait_id), rate, Fallback::Input)?;
    // Input fallback always yields a symbol.
    Ok(symbol.map(|s| s.expr).unwrap_or_default())
}

pub fn generate(mat: &mut Material, id: NodeId, node: &CameraNode) -> Result<()> {
    mat.descend(id)?;
    let stage = mat.node_stage(id)?;
    match stage {
        ShaderStage::Pixel => generate_rays(mat, id, node),
        ShaderStage::Vertex => generate_vertex(mat, id, node),
        other => bail!(GenerateError::Config(format!(
            "camera nodes run at vertex or pixel rate, not in the {} stage",
            other.name()
        ))),
    }
}

fn generate_rays(mat: &mut Material, id: NodeId, node: &CameraNode) -> Result<()> {
    let n = id.index();
    let rate = Rate::Pixel;
    let resolution = uniform(mat, id, TraitId::Resolution, rate)?;

    let code = if !node.has_view {
        mat.warn(format!(
            "camera node {n} has no View trait; falling back to a flat 2D camera"
        ));
        format!(
            "vec2 cameraUv{n} = (2.0 * gl_FragCoord.xy - {resolution}) / {resolution}.y;
vec3 cameraRay{n} = vec3(0.0, 0.0, -1.0);
vec3 cameraOrigin{n} = vec3(cameraUv{n}, 1.0);"
        )
    } else {
        let view = uniform(mat, id, TraitId::View, rate)?;
        match node.projection {
            Projection::Perspective => {
                let projection = uniform(mat, id, TraitId::Projection, rate)?;
                format!(
                    "mat4 cameraInverseView{n} = inverse({view});
vec2 cameraUv{n} = (gl_FragCoord.xy / {resolution}) * 2.0 - 1.0;
vec4 cameraTarget{n} = inverse({projection}) * vec4(cameraUv{n}, 1.0, 1.0);
vec3 cameraRay{n} = normalize((cameraInverseView{n} * vec4(cameraTarget{n}.xyz / cameraTarget{n}.w, 0.0)).xyz);
vec3 cameraOrigin{n} = cameraInverseView{n}[3].xyz;"
                )
            }
            Projection::Panoramic => {
                let fov = uniform(mat, id, TraitId::FieldOfView, rate)?;
                format!(
                    "mat4 cameraInverseView{n} = inverse({view});
vec2 cameraUv{n} = gl_FragCoord.xy / {resolution} - 0.5;
float cameraYaw{n} = cameraUv{n}.x * radians({fov});
float cameraPitch{n} = cameraUv{n}.y * radians({fov}) * {resolution}.y / {resolution}.x;
vec3 cameraLocal{n} = vec3(cos(cameraPitch{n}) * sin(cameraYaw{n}), sin(cameraPitch{n}), -cos(cameraPitch{n}) * cos(cameraYaw{n}));
vec3 cameraRay{n} = normalize((cameraInverseView{n} * vec4(cameraLocal{n}, 0.0)).xyz);
vec3 cameraOrigin{n} = cameraInverseView{n}[3].xyz;"
                )
            }
        }
    };
    mat.commit(ShaderStage::Pixel, Token::Texturize, &code)?;

    mat.expose(
        id,
        Trait::typed(TraitId::Aim, DataType::Vec3),
        Symbol::new(format!("cameraRay{n}"), DataType::Vec3, rate),
    );
    mat.expose(
        id,
        Trait::typed(TraitId::Origin, DataType::Vec3),
        Symbol::new(format!("cameraOrigin{n}"), DataType::Vec3, rate),
    );
    Ok(())
}

fn generate_vertex(mat: &mut Material, id: NodeId, node: &CameraNode) -> Result<()> {
    let n = id.index();
    let rate = Rate::Vertex;
    let point = mat
        .get_value_as(id, &Trait::new(TraitId::Position), rate, DataType::Vec4, Fallback::Input)?
        .unwrap_or_else(|| "vec4(0.0, 0.0, 0.0, 1.0)".to_string());

    let transform = if node.has_view {
        let view = uniform(mat, id, TraitId::View, rate)?;
        let projection = uniform(mat, id, TraitId::Projection, rate)?;
        format!("{projection} * {view} * ")
    } else {
        mat.warn(format!(
            "camera node {n} has no View trait; vertices pass through in screen space"
        ));
        String::new()
    };
    mat.commit(
        ShaderStage::Vertex,
        Token::Transform,
        &format!("vec4 cameraPosition{n} = {transform}{point};"),
    )?;
    mat.expose(
        id,
        Trait::typed(TraitId::Position, DataType::Vec4),
        Symbol::new(format!("cameraPosition{n}"), DataType::Vec4, rate),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;
    use crate::dsl::ConstructKind;
    use serde_json::json;

    fn camera() -> Construct {
        Construct::new(ConstructKind::Camera).with_trait(TraitId::View, json!(null))
    }

    #[test]
    fn pixel_camera_exposes_rays_and_binds_camera_uniforms() {
        let mat = generated(vec![camera()]).unwrap();
        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(pixel.contains("mat4 cameraInverseView1 = inverse(Camera.View);"));
        assert!(pixel.contains("inverse(Camera.Projection)"));
        assert!(pixel.contains("uniform UniformBufferCamera {"));
        assert!(pixel.contains("    vec2 Resolution;"));
        assert!(pixel.contains("    mat4 View;"));
        assert!(!mat.warnings().iter().any(|w| w.contains("flat 2D")));
    }

    #[test]
    fn missing_view_falls_back_to_flat_camera() {
        let mat = generated(vec![Construct::new(ConstructKind::Camera)]).unwrap();
        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(pixel.contains("vec3 cameraRay1 = vec3(0.0, 0.0, -1.0);"));
        assert!(!pixel.contains("Camera.View"));
        assert!(mat.warnings().iter().any(|w| w.contains("flat 2D")));
    }

    #[test]
    fn panoramic_projection_uses_field_of_view() {
        let mat = generated(vec![camera().with_trait(TraitId::Projection, json!("Panoramic"))])
            .unwrap();
        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(pixel.contains("radians(Camera.FieldOfView)"));
        assert!(!pixel.contains("Camera.Projection"));
        assert!(
            CameraNode::from_descriptor(
                &Construct::new(ConstructKind::Camera).with_trait(TraitId::Projection, json!("Fisheye"))
            )
            .is_err()
        );
    }

    #[test]
    fn vertex_camera_projects_the_position_attribute() {
        let mat = generated(vec![camera().with_trait(TraitId::Rate, json!("Vertex"))]).unwrap();
        let vertex = mat.stage_code(ShaderStage::Vertex);
        assert!(vertex.contains("vec4 cameraPosition1 = Camera.Projection * Camera.View * inPosition;"));
        assert!(vertex.contains("layout(location = 0) in vec4 inPosition;"));
        // The camera never assigns gl_Position, so the default body is still added.
        assert!(vertex.contains("gl_Position = vec4(fullscreen"));
    }
}
