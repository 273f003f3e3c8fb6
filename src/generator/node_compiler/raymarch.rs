//! Raymarch nodes: sphere tracing against the signed distance function of a
//! single child scene.

use anyhow::{Result, bail};

use crate::dsl::{self, Construct};
use crate::generator::error::GenerateError;
use crate::generator::glsl::Token;
use crate::generator::material::Material;
use crate::generator::node::{Fallback, NodeId};
use crate::generator::types::{DataType, ShaderStage, Symbol, Trait, TraitId};
use crate::generator::utils::fmt_float;

use super::scene;

#[derive(Debug, Clone, PartialEq)]
pub struct RaymarchNode {
    /// Distance below which a sample counts as a hit.
    pub precision: f64,
    pub max_distance: f64,
    pub stride: f64,
    /// Stride used once the ray is past half of `max_distance`.
    pub far_stride: f64,
    pub min_step: f64,
    pub iterations: u32,
}

impl Default for RaymarchNode {
    fn default() -> Self {
        Self {
            precision: 0.001,
            max_distance: 100.0,
            stride: 0.9,
            far_stride: 1.0,
            min_step: 0.0001,
            iterations: 128,
        }
    }
}

fn positive(construct: &Construct, id: TraitId, default: f64) -> Result<f64> {
    match dsl::trait_f64(construct, id) {
        None => Ok(default),
        Some(v) if v > 0.0 && v.is_finite() => Ok(v),
        Some(v) => bail!(GenerateError::Config(format!(
            "raymarch {} must be positive, got {v}",
            id.name()
        ))),
    }
}

impl RaymarchNode {
    pub fn from_descriptor(construct: &Construct) -> Result<Self> {
        let defaults = Self::default();
        let iterations = positive(construct, TraitId::Count, f64::from(defaults.iterations))?;
        if iterations.fract() != 0.0 || iterations > f64::from(u32::MAX) {
            bail!(GenerateError::Config(format!(
                "raymarch Count must be a whole number of iterations, got {iterations}"
            )));
        }
        Ok(Self {
            precision: positive(construct, TraitId::Precision, defaults.precision)?,
            max_distance: positive(construct, TraitId::Distance, defaults.max_distance)?,
            stride: positive(construct, TraitId::Stride, defaults.stride)?,
            far_stride: positive(construct, TraitId::FarStride, defaults.far_stride)?,
            min_step: positive(construct, TraitId::MinStep, defaults.min_step)?,
            iterations: iterations as u32,
        })
    }
}

fn march_function(name: &str, sdf: &str, node: &RaymarchNode) -> String {
    let precision = fmt_float(node.precision);
    let distance = fmt_float(node.max_distance);
    let stride = fmt_float(node.stride);
    let far_stride = fmt_float(node.far_stride);
    let min_step = fmt_float(node.min_step);
    let count = node.iterations;
    format!(
        "float {name}(in vec3 origin, in vec3 direction) {{
    float travelled = 0.0;
    for (int i = 0; i < {count}; i++) {{
        float nearest = {sdf}(origin + direction * travelled);
        if (nearest < {precision}) return travelled;
        float stride = travelled > {distance} * 0.5 ? {far_stride} : {stride};
        travelled += max(nearest * stride, {min_step});
        if (travelled > {distance}) break;
    }}
    return -1.0;
}}"
    )
}

fn normal_function(name: &str, sdf: &str, precision: f64) -> String {
    let e = fmt_float(precision);
    format!(
        "vec3 {name}(in vec3 point) {{
    vec2 e = vec2({e}, 0.0);
    return normalize(vec3(
        {sdf}(point + e.xyy) - {sdf}(point - e.xyy),
        {sdf}(point + e.yxy) - {sdf}(point - e.yxy),
        {sdf}(point + e.yyx) - {sdf}(point - e.yyx)));
}}"
    )
}

pub fn generate(mat: &mut Material, id: NodeId, node: &RaymarchNode) -> Result<()> {
    mat.descend(id)?;
    let n = id.index();
    let stage = mat.node_stage(id)?;
    let rate = stage.rate();

    let scenes = mat.scene_children(id);
    let scene_id = match scenes.as_slice() {
        [] => bail!(GenerateError::MissingGeometry(format!(
            "raymarch node {n} has no Scene child"
        ))),
        [one] => *one,
        _ => bail!(GenerateError::Unsupported(format!(
            "raymarch node {n} has {} scenes; marching a union of scenes",
            scenes.len()
        ))),
    };
    let Some(sdf) = scene::generate_sdf(mat, scene_id, stage)? else {
        bail!(GenerateError::MissingGeometry(format!(
            "scene {} under raymarch node {n} has no distance function",
            scene_id.index()
        )));
    };

    let origin = mat
        .get_value_as(id, &Trait::new(TraitId::Origin), rate, DataType::Vec3, Fallback::Soft)?
        .unwrap_or_else(|| "vec3(0.0, 0.0, 5.0)".to_string());
    let aim = mat
        .get_value_as(id, &Trait::new(TraitId::Aim), rate, DataType::Vec3, Fallback::Soft)?
        .unwrap_or_else(|| "vec3(0.0, 0.0, -1.0)".to_string());

    let march = format!("Raymarch{n}");
    let normal = format!("RaymarchNormal{n}");
    mat.ensure_function(stage, &march, &march_function(&march, &sdf, node))?;
    mat.ensure_function(stage, &normal, &normal_function(&normal, &sdf, node.precision))?;

    let mut code = format!(
        "vec3 raymarchOrigin{n} = {origin};
vec3 raymarchAim{n} = normalize({aim});
float raymarchDepth{n} = {march}(raymarchOrigin{n}, raymarchAim{n});
"
    );
    if stage == ShaderStage::Pixel {
        code.push_str(&format!("if (raymarchDepth{n} < 0.0) discard;\n"));
    }
    code.push_str(&format!(
        "vec3 raymarchPosition{n} = raymarchOrigin{n} + raymarchAim{n} * max(raymarchDepth{n}, 0.0);
vec3 raymarchNormal{n} = {normal}(raymarchPosition{n});"
    ));
    mat.commit(stage, Token::main_body(stage), &code)?;

    mat.expose(
        id,
        Trait::typed(TraitId::Position, DataType::Vec3),
        Symbol::new(format!("raymarchPosition{n}"), DataType::Vec3, rate),
    );
    mat.expose(
        id,
        Trait::typed(TraitId::Aim, DataType::Vec3),
        Symbol::new(format!("raymarchNormal{n}"), DataType::Vec3, rate),
    );
    mat.expose(
        id,
        Trait::typed(TraitId::Depth, DataType::Float),
        Symbol::new(format!("raymarchDepth{n}"), DataType::Float, rate),
    );
    Ok(())
}
