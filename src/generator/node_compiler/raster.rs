//! Raster nodes: per-pixel triangle/line rasterization of child scenes, or
//! the clip-space position hand-off when running at vertex rate.

use anyhow::{Result, bail};

use crate::dsl::{self, Construct};
use crate::generator::error::GenerateError;
use crate::generator::glsl::Token;
use crate::generator::material::Material;
use crate::generator::node::{Fallback, NodeId};
use crate::generator::types::{DataType, Rate, ShaderStage, Symbol, Trait, TraitId};

use super::scene::{self, PrimitiveArray};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    Triangle,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cull {
    TwoSided,
    /// Drop triangles wound clockwise on screen.
    Normal,
    /// Drop triangles wound counter-clockwise on screen.
    Flipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterNode {
    pub topology: Topology,
    pub cull: Cull,
}

impl RasterNode {
    pub fn from_descriptor(construct: &Construct) -> Result<Self> {
        let topology = match dsl::trait_str(construct, TraitId::Topology) {
            None | Some("Triangle") => Topology::Triangle,
            Some("Line") => Topology::Line,
            Some(other) => bail!(GenerateError::Config(format!(
                "unsupported raster topology '{other}' (expected Triangle or Line)"
            ))),
        };
        let cull = match (
            dsl::trait_str(construct, TraitId::Cull),
            dsl::trait_bool(construct, TraitId::Bilateral),
        ) {
            (Some("TwoSided"), _) => Cull::TwoSided,
            (Some("Normal"), _) => Cull::Normal,
            (Some("Flipped"), _) => Cull::Flipped,
            (Some(other), _) => bail!(GenerateError::Config(format!(
                "unknown cull mode '{other}' (expected TwoSided, Normal or Flipped)"
            ))),
            (None, Some(true)) => Cull::TwoSided,
            (None, _) => Cull::Normal,
        };
        Ok(Self { topology, cull })
    }
}

const RASTERIZE_RESULT: &str = "struct RasterizeResult {
    bool hit;
    float depth;
    vec2 uv;
    vec3 normal;
};";

const RASTER_EDGE: &str = "float RasterEdge(in vec2 a, in vec2 b, in vec2 p) {
    return (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
}";

fn rasterize_triangle(name: &str, cull: Cull) -> String {
    let cull_line = match cull {
        Cull::TwoSided => String::new(),
        Cull::Normal => "    if (area < 0.0) return result;\n".to_string(),
        Cull::Flipped => "    if (area > 0.0) return result;\n".to_string(),
    };
    format!(
        "RasterizeResult {name}(in Triangle triangle, in mat4 clip, in vec2 point) {{
    RasterizeResult result = RasterizeResult(false, 1.0, vec2(0.0), vec3(0.0));
    vec4 a = clip * vec4(triangle.a, 1.0);
    vec4 b = clip * vec4(triangle.b, 1.0);
    vec4 c = clip * vec4(triangle.c, 1.0);
    if (a.w <= 0.0 || b.w <= 0.0 || c.w <= 0.0) return result;
    vec2 sa = a.xy / a.w;
    vec2 sb = b.xy / b.w;
    vec2 sc = c.xy / c.w;
    float area = RasterEdge(sa, sb, sc);
    if (area == 0.0) return result;
{cull_line}    float wa = RasterEdge(sb, sc, point) / area;
    float wb = RasterEdge(sc, sa, point) / area;
    float wc = RasterEdge(sa, sb, point) / area;
    if (wa < 0.0 || wb < 0.0 || wc < 0.0) return result;
    vec3 perspective = vec3(wa / a.w, wb / b.w, wc / c.w);
    perspective /= perspective.x + perspective.y + perspective.z;
    result.hit = true;
    result.depth = wa * (a.z / a.w) + wb * (b.z / b.w) + wc * (c.z / c.w);
    result.uv = triangle.uvA * perspective.x + triangle.uvB * perspective.y + triangle.uvC * perspective.z;
    result.normal = normalize(cross(triangle.b - triangle.a, triangle.c - triangle.a));
    return result;
}}"
    )
}

fn rasterize_line(name: &str) -> String {
    format!(
        "RasterizeResult {name}(in Line line, in mat4 clip, in vec2 point, in float width) {{
    RasterizeResult result = RasterizeResult(false, 1.0, vec2(0.0), vec3(0.0));
    vec4 a = clip * vec4(line.a, 1.0);
    vec4 b = clip * vec4(line.b, 1.0);
    if (a.w <= 0.0 || b.w <= 0.0) return result;
    vec2 sa = a.xy / a.w;
    vec2 sb = b.xy / b.w;
    vec2 segment = sb - sa;
    float lengthSquared = dot(segment, segment);
    if (lengthSquared == 0.0) return result;
    float t = clamp(dot(point - sa, segment) / lengthSquared, 0.0, 1.0);
    if (length(point - (sa + segment * t)) > width) return result;
    float w = mix(1.0 / a.w, 1.0 / b.w, t);
    float corrected = (t / b.w) / w;
    result.hit = true;
    result.depth = mix(a.z / a.w, b.z / b.w, t);
    result.uv = mix(line.uvA, line.uvB, corrected);
    result.normal = normalize(vec3(-segment.y, segment.x, 0.0));
    return result;
}}"
    )
}

pub fn generate(mat: &mut Material, id: NodeId, node: &RasterNode) -> Result<()> {
    mat.descend(id)?;
    let scenes = mat.scene_children(id);

    match mat.node_stage(id)? {
        ShaderStage::Pixel => generate_pixel(mat, id, node, &scenes),
        ShaderStage::Vertex => generate_vertex(mat, id, node, &scenes),
        other => bail!(GenerateError::Config(format!(
            "raster node {} runs in the vertex or pixel stage, not {}",
            id.index(),
            other.name()
        ))),
    }
}

fn missing_geometry(id: NodeId, topology: Topology) -> anyhow::Error {
    GenerateError::MissingGeometry(format!(
        "raster node {} has no {} geometry under it",
        id.index(),
        match topology {
            Topology::Triangle => "triangle",
            Topology::Line => "line",
        }
    ))
    .into()
}

fn generate_vertex(
    mat: &mut Material,
    id: NodeId,
    node: &RasterNode,
    scenes: &[NodeId],
) -> Result<()> {
    let has_geometry = scenes.iter().any(|&s| match &mat.node(s).kind {
        super::NodeKind::Scene(scene) => match node.topology {
            Topology::Triangle => scene.triangle_count() > 0,
            Topology::Line => scene.line_count() > 0,
        },
        _ => false,
    });
    if !has_geometry {
        return Err(missing_geometry(id, node.topology));
    }
    let position = mat
        .get_value_as(
            id,
            &Trait::new(TraitId::Position),
            Rate::Vertex,
            DataType::Vec4,
            Fallback::Input,
        )?
        .unwrap_or_else(|| "vec4(0.0, 0.0, 0.0, 1.0)".to_string());
    mat.commit(
        ShaderStage::Vertex,
        Token::Position,
        &format!("gl_Position = {position};"),
    )
}

fn generate_pixel(
    mat: &mut Material,
    id: NodeId,
    node: &RasterNode,
    scenes: &[NodeId],
) -> Result<()> {
    let n = id.index();
    let stage = ShaderStage::Pixel;

    let mut arrays: Vec<PrimitiveArray> = Vec::new();
    for &s in scenes {
        let array = match node.topology {
            Topology::Triangle => scene::generate_triangles(mat, s, stage)?,
            Topology::Line => scene::generate_lines(mat, s, stage)?,
        };
        arrays.extend(array);
    }
    if arrays.is_empty() {
        return Err(missing_geometry(id, node.topology));
    }

    let input = |mat: &mut Material, trait_id| -> Result<String> {
        Ok(mat
            .get_value(id, &Trait::new(trait_id), Rate::Pixel, Fallback::Input)?
            .map(|s| s.expr)
            .unwrap_or_default())
    };
    let projection = input(mat, TraitId::Projection)?;
    let view = input(mat, TraitId::View)?;
    let resolution = input(mat, TraitId::Resolution)?;
    let model = mat
        .get_value_as(id, &Trait::new(TraitId::Model), Rate::Pixel, DataType::Mat4, Fallback::Soft)?
        .map(|m| format!(" * {m}"))
        .unwrap_or_default();

    mat.ensure_function(stage, "RasterizeResult", RASTERIZE_RESULT)?;
    let function = match node.topology {
        Topology::Triangle => {
            mat.ensure_function(stage, "RasterEdge", RASTER_EDGE)?;
            let name = format!("RasterizeTriangle{n}");
            mat.ensure_function(stage, &name, &rasterize_triangle(&name, node.cull))?;
            name
        }
        Topology::Line => {
            let name = format!("RasterizeLine{n}");
            mat.ensure_function(stage, &name, &rasterize_line(&name))?;
            name
        }
    };
    let extra = match node.topology {
        Topology::Triangle => String::new(),
        Topology::Line => format!(", 2.0 / {resolution}.y"),
    };

    let mut code = format!(
        "mat4 rasterClip{n} = {projection} * {view}{model};
vec2 rasterPoint{n} = (gl_FragCoord.xy / {resolution}) * 2.0 - 1.0;
RasterizeResult raster{n} = RasterizeResult(false, 1.0, vec2(0.0), vec3(0.0));
"
    );
    for array in &arrays {
        code.push_str(&format!(
            "for (int i = 0; i < {count}; i++) {{
    RasterizeResult candidate = {function}({name}[i], rasterClip{n}, rasterPoint{n}{extra});
    if (candidate.hit && candidate.depth < raster{n}.depth) raster{n} = candidate;
}}
",
            count = array.count,
            name = array.name,
        ));
    }
    code.push_str(&format!("if (!raster{n}.hit) discard;"));
    mat.commit(stage, Token::Texturize, &code)?;

    let rate = Rate::Pixel;
    mat.expose(
        id,
        Trait::typed(TraitId::Sampler, DataType::Vec2),
        Symbol::new(format!("raster{n}.uv"), DataType::Vec2, rate),
    );
    mat.expose(
        id,
        Trait::typed(TraitId::Aim, DataType::Vec3),
        Symbol::new(format!("raster{n}.normal"), DataType::Vec3, rate),
    );
    mat.expose(
        id,
        Trait::typed(TraitId::Depth, DataType::Float),
        Symbol::new(format!("raster{n}.depth"), DataType::Float, rate),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;
    use crate::dsl::ConstructKind;
    use serde_json::json;

    fn raster_over_box() -> Construct {
        Construct::new(ConstructKind::Raster)
            .with_child(Construct::new(ConstructKind::Scene).with_child(unit_box()))
    }

    #[test]
    fn pixel_raster_loops_over_scene_triangles() {
        let mat = generated(vec![raster_over_box()]).unwrap();
        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(pixel.contains("RasterizeResult RasterizeTriangle1(in Triangle triangle"));
        assert!(pixel.contains("    if (area < 0.0) return result;"));
        assert!(pixel.contains("    for (int i = 0; i < 12; i++) {"));
        assert!(pixel.contains("    if (!raster1.hit) discard;"));
        assert!(pixel.contains("mat4 rasterClip1 = Camera.Projection * Camera.View;"));
    }

    #[test]
    fn cull_mode_changes_a_single_comparison() {
        let two_sided = RasterNode::from_descriptor(
            &Construct::new(ConstructKind::Raster).with_trait(TraitId::Bilateral, json!(true)),
        )
        .unwrap();
        assert_eq!(two_sided.cull, Cull::TwoSided);
        let flipped = RasterNode::from_descriptor(
            &Construct::new(ConstructKind::Raster).with_trait(TraitId::Cull, json!("Flipped")),
        )
        .unwrap();
        assert_eq!(flipped.cull, Cull::Flipped);

        let a = rasterize_triangle("R", Cull::Normal);
        let b = rasterize_triangle("R", Cull::Flipped);
        let c = rasterize_triangle("R", Cull::TwoSided);
        assert_eq!(a.replace("area < 0.0", "area > 0.0"), b);
        assert_eq!(c.lines().count() + 1, a.lines().count());
    }

    #[test]
    fn line_topology_uses_scene_lines() {
        let mat = generated(vec![
            raster_over_box().with_trait(TraitId::Topology, json!("Line")),
        ])
        .unwrap();
        let pixel = mat.stage_code(ShaderStage::Pixel);
        assert!(pixel.contains("const Line SceneLines2[12]"));
        assert!(pixel.contains("RasterizeLine1(SceneLines2[i], rasterClip1, rasterPoint1, 2.0 / Camera.Resolution.y)"));
    }

    #[test]
    fn bad_topology_and_missing_geometry_fail() {
        let err = RasterNode::from_descriptor(
            &Construct::new(ConstructKind::Raster).with_trait(TraitId::Topology, json!("Patch")),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerateError>(),
            Some(GenerateError::Config(_))
        ));

        let err = generated(vec![Construct::new(ConstructKind::Raster)]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerateError>(),
            Some(GenerateError::MissingGeometry(_))
        ));
    }

    #[test]
    fn vertex_raster_writes_gl_position() {
        let mat = generated(vec![
            Construct::new(ConstructKind::Camera)
                .with_trait(TraitId::View, json!(null))
                .with_trait(TraitId::Rate, json!("Vertex")),
            raster_over_box().with_trait(TraitId::Rate, json!("Vertex")),
        ])
        .unwrap();
        let vertex = mat.stage_code(ShaderStage::Vertex);
        assert!(vertex.contains("    gl_Position = cameraPosition1;"));
        assert!(!vertex.contains("fullscreen"));
    }

    #[test]
    fn other_rates_are_rejected() {
        let err = generated(vec![raster_over_box().with_trait(TraitId::Rate, json!("Compute"))])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerateError>(),
            Some(GenerateError::Config(_))
        ));
    }
}
