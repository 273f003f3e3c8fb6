//! Scene nodes hold geometry and emit it only when a consumer asks for it,
//! as triangle arrays, line arrays or a signed distance function.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use glam::{Vec2, Vec3};

use crate::assets::{AssetFactory, GeometryAsset, Vertex};
use crate::dsl::{Construct, ConstructKind};
use crate::generator::error::GenerateError;
use crate::generator::glsl::GlslLiteral;
use crate::generator::material::Material;
use crate::generator::node::NodeId;
use crate::generator::types::ShaderStage;

use super::NodeKind;

const TRIANGLE_STRUCT: &str = "struct Triangle {
    vec3 a;
    vec3 b;
    vec3 c;
    vec2 uvA;
    vec2 uvB;
    vec2 uvC;
};";

const LINE_STRUCT: &str = "struct Line {
    vec3 a;
    vec3 b;
    vec2 uvA;
    vec2 uvB;
};";

const SDF_UNION: &str = "float SDFUnion(in float a, in float b) {
    return min(a, b);
}";

#[derive(Debug, Clone)]
pub struct SceneNode {
    pub geometry: Vec<Arc<dyn GeometryAsset>>,
}

impl SceneNode {
    pub fn from_descriptor(construct: &Construct, factory: &dyn AssetFactory) -> Result<Self> {
        let mut geometry = Vec::new();
        for child in construct
            .children
            .iter()
            .filter(|c| c.kind == ConstructKind::Geometry)
        {
            let asset = factory.create_geometry(child).with_context(|| {
                format!(
                    "creating geometry '{}'",
                    child.display_name().unwrap_or("unnamed")
                )
            })?;
            geometry.push(asset);
        }
        Ok(Self { geometry })
    }

    pub fn triangle_count(&self) -> usize {
        self.geometry.iter().map(|g| g.triangle_count()).sum()
    }

    pub fn line_count(&self) -> usize {
        self.geometry.iter().map(|g| g.line_count()).sum()
    }
}

/// A GLSL constant array emitted by a scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimitiveArray {
    pub name: String,
    pub count: usize,
}

/// Scenes generate lazily: this only marks the node as visited.
pub fn generate(mat: &mut Material, id: NodeId) -> Result<()> {
    mat.node_mut(id).generated = true;
    Ok(())
}

fn scene(mat: &Material, id: NodeId) -> Result<SceneNode> {
    match &mat.node(id).kind {
        NodeKind::Scene(scene) => Ok(scene.clone()),
        other => bail!(GenerateError::Config(format!(
            "node {} is a {} node, not a Scene",
            id.index(),
            other.name()
        ))),
    }
}

fn position(v: Vec3) -> String {
    v.to_glsl()
}

fn uv(v: Vec2) -> String {
    v.to_glsl()
}

fn triangle_literal([a, b, c]: [Vertex; 3]) -> String {
    format!(
        "Triangle({}, {}, {}, {}, {}, {})",
        position(a.position),
        position(b.position),
        position(c.position),
        uv(a.uv),
        uv(b.uv),
        uv(c.uv)
    )
}

fn line_literal([a, b]: [Vertex; 2]) -> String {
    format!(
        "Line({}, {}, {}, {})",
        position(a.position),
        position(b.position),
        uv(a.uv),
        uv(b.uv)
    )
}

fn array_declaration(ty: &str, name: &str, items: &[String]) -> String {
    let count = items.len();
    let body = items
        .iter()
        .map(|item| format!("    {item}"))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("const {ty} {name}[{count}] = {ty}[{count}](\n{body}\n);")
}

/// Emit every triangle of the scene as `const Triangle SceneTriangles<id>[]`.
/// Returns `None` when the scene has no triangles.
pub fn generate_triangles(
    mat: &mut Material,
    id: NodeId,
    stage: ShaderStage,
) -> Result<Option<PrimitiveArray>> {
    let node = scene(mat, id)?;
    let items: Vec<String> = node
        .geometry
        .iter()
        .flat_map(|g| (0..g.triangle_count()).filter_map(|i| g.triangle(i)))
        .map(triangle_literal)
        .collect();
    if items.is_empty() {
        return Ok(None);
    }
    let name = format!("SceneTriangles{}", id.index());
    mat.ensure_function(stage, "Triangle", TRIANGLE_STRUCT)?;
    mat.ensure_function(stage, &name, &array_declaration("Triangle", &name, &items))?;
    Ok(Some(PrimitiveArray {
        name,
        count: items.len(),
    }))
}

/// Emit every line of the scene as `const Line SceneLines<id>[]`.
pub fn generate_lines(
    mat: &mut Material,
    id: NodeId,
    stage: ShaderStage,
) -> Result<Option<PrimitiveArray>> {
    let node = scene(mat, id)?;
    let items: Vec<String> = node
        .geometry
        .iter()
        .flat_map(|g| (0..g.line_count()).filter_map(|i| g.line(i)))
        .map(line_literal)
        .collect();
    if items.is_empty() {
        return Ok(None);
    }
    let name = format!("SceneLines{}", id.index());
    mat.ensure_function(stage, "Line", LINE_STRUCT)?;
    mat.ensure_function(stage, &name, &array_declaration("Line", &name, &items))?;
    Ok(Some(PrimitiveArray {
        name,
        count: items.len(),
    }))
}

/// Emit `float SceneSDF<id>(in vec3 point)`, folding every primitive's
/// distance with left-associative `SDFUnion` calls. Returns the function
/// name, or `None` when no primitive has a distance function.
pub fn generate_sdf(mat: &mut Material, id: NodeId, stage: ShaderStage) -> Result<Option<String>> {
    let node = scene(mat, id)?;
    let terms: Vec<_> = node.geometry.iter().filter_map(|g| g.sdf("point")).collect();
    let Some((first, rest)) = terms.split_first() else {
        return Ok(None);
    };

    for term in &terms {
        mat.ensure_function(stage, term.helper_name, term.helper_body)?;
    }
    if !rest.is_empty() {
        mat.ensure_function(stage, "SDFUnion", SDF_UNION)?;
    }
    let expr = rest.iter().fold(first.expr.clone(), |acc, term| {
        format!("SDFUnion({acc}, {})", term.expr)
    });

    let name = format!("SceneSDF{}", id.index());
    let body = format!("float {name}(in vec3 point) {{\n    return {expr};\n}}");
    mat.ensure_function(stage, &name, &body)?;
    Ok(Some(name))
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;
    use crate::generator::types::TraitId;
    use serde_json::json;

    fn sphere(radius: f64, x: f64) -> Construct {
        Construct::new(ConstructKind::Geometry)
            .named("sphere")
            .with_trait(TraitId::Mass, json!(radius))
            .with_trait(TraitId::Position, json!([x, 0.0, 0.0]))
    }

    #[test]
    fn scenes_emit_nothing_until_asked() {
        let mat = generated(vec![
            Construct::new(ConstructKind::Scene).named("stage").with_child(unit_box()),
        ])
        .unwrap();
        assert!(!mat.stage_code(ShaderStage::Pixel).contains("SceneTriangles"));
        let stage = mat.find_node_by_name("stage").unwrap();
        assert!(mat.node(stage).generated);
    }

    #[test]
    fn triangle_arrays_hold_every_triangle_once() {
        let mut mat = material(vec![
            Construct::new(ConstructKind::Scene).named("stage").with_child(unit_box()),
        ])
        .unwrap();
        let stage = mat.find_node_by_name("stage").unwrap();

        let array = generate_triangles(&mut mat, stage, ShaderStage::Pixel)
            .unwrap()
            .unwrap();
        assert_eq!(array.count, 12);
        generate_triangles(&mut mat, stage, ShaderStage::Pixel).unwrap();

        let code = mat.buffer(ShaderStage::Pixel).as_str().to_string();
        assert_eq!(code.matches("struct Triangle {").count(), 1);
        assert_eq!(
            code.matches(&format!("const Triangle {}[12] = Triangle[12](", array.name)).count(),
            1
        );
        assert_eq!(code.matches("    Triangle(vec3(").count(), 12);

        let lines = generate_lines(&mut mat, stage, ShaderStage::Pixel).unwrap().unwrap();
        assert_eq!(lines.count, 12);
    }

    #[test]
    fn sdf_folds_left_associatively() {
        let mut mat = material(vec![
            Construct::new(ConstructKind::Scene)
                .named("stage")
                .with_child(sphere(1.0, 0.0))
                .with_child(sphere(0.5, 2.0))
                .with_child(unit_box()),
        ])
        .unwrap();
        let stage = mat.find_node_by_name("stage").unwrap();
        let name = generate_sdf(&mut mat, stage, ShaderStage::Pixel).unwrap().unwrap();
        let code = mat.buffer(ShaderStage::Pixel).as_str();
        assert!(code.contains(&format!(
            "float {name}(in vec3 point) {{\n    return SDFUnion(SDFUnion(SDFSphere(point, 1.0), \
             SDFSphere(point - vec3(2.0, 0.0, 0.0), 0.5)), SDFBox(point, vec3(1.0, 1.0, 1.0)));\n}}"
        )));
        assert_eq!(code.matches("float SDFUnion(").count(), 1);
    }

    #[test]
    fn flat_geometry_has_no_sdf() {
        let mut mat = material(vec![
            Construct::new(ConstructKind::Scene)
                .named("stage")
                .with_child(Construct::new(ConstructKind::Geometry).named("rect")),
        ])
        .unwrap();
        let stage = mat.find_node_by_name("stage").unwrap();
        assert!(generate_sdf(&mut mat, stage, ShaderStage::Pixel).unwrap().is_none());
        assert!(generate_lines(&mut mat, stage, ShaderStage::Pixel).unwrap().is_some());
    }
}
