//! Transform nodes: keyframed move/scale/rotate animation.
//!
//! Keyframes are baked at generation time. Channels that never change across
//! keyframes are emitted as single constants; only changing channels get
//! per-keyframe arrays and a runtime lookup in `Animate<n>(time)`.

use anyhow::{Context, Result, bail};
use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::dsl::{self, Construct, ConstructKind};
use crate::generator::error::GenerateError;
use crate::generator::glsl::{GlslLiteral, Token};
use crate::generator::material::Material;
use crate::generator::node::{Fallback, NodeId};
use crate::generator::types::{DataType, Rate, Symbol, Trait, TraitId};
use crate::generator::utils::fmt_f32;

const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolator {
    Linear,
    /// Catmull-Rom through the neighbouring keyframes.
    Cubic,
}

impl Interpolator {
    fn parse(construct: &Construct) -> Result<Self> {
        match dsl::trait_str(construct, TraitId::Interpolator) {
            None | Some("Linear") => Ok(Interpolator::Linear),
            Some("Cubic") => Ok(Interpolator::Cubic),
            Some(other) => bail!(GenerateError::Config(format!(
                "unknown interpolator '{other}' (expected Linear or Cubic)"
            ))),
        }
    }

    fn index(self) -> i32 {
        match self {
            Interpolator::Linear => 0,
            Interpolator::Cubic => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub position: Vec3,
    pub scale: Vec3,
    pub rotation: Quat,
    pub interpolator: Interpolator,
}

impl Keyframe {
    fn from_construct(construct: &Construct) -> Result<Self> {
        let [x, y, z] = dsl::trait_vec::<3>(construct, TraitId::Rotation)?.unwrap_or([0.0; 3]);
        Ok(Self {
            time: dsl::trait_f64(construct, TraitId::Time).unwrap_or(0.0) as f32,
            position: dsl::trait_vec::<3>(construct, TraitId::Position)?
                .map(Vec3::from_array)
                .unwrap_or(Vec3::ZERO),
            scale: dsl::trait_vec::<3>(construct, TraitId::Scale)?
                .map(Vec3::from_array)
                .unwrap_or(Vec3::ONE),
            rotation: Quat::from_euler(
                EulerRot::XYZ,
                x.to_radians(),
                y.to_radians(),
                z.to_radians(),
            ),
            interpolator: Interpolator::parse(construct)?,
        })
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

/// Which channels change across keyframes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dynamic {
    pub position: bool,
    pub scale: bool,
    pub rotation: bool,
}

impl Dynamic {
    pub fn any(self) -> bool {
        self.position || self.scale || self.rotation
    }
}

/// What a transform compiles down to.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformPlan {
    Identity,
    Constant(Mat4),
    Animated(Dynamic),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformNode {
    /// Sorted by time.
    pub keyframes: Vec<Keyframe>,
}

impl TransformNode {
    pub fn from_descriptor(construct: &Construct) -> Result<Self> {
        let mut keyframes = Vec::new();
        // Move/scale/rotate traits on the node itself form one more keyframe.
        let implicit = [TraitId::Position, TraitId::Scale, TraitId::Rotation]
            .into_iter()
            .any(|id| dsl::find_trait(construct, id).is_some());
        if implicit {
            keyframes.push(Keyframe::from_construct(construct)?);
        }
        for (i, child) in construct
            .children
            .iter()
            .filter(|c| c.kind == ConstructKind::Keyframe)
            .enumerate()
        {
            keyframes.push(
                Keyframe::from_construct(child).with_context(|| format!("keyframe {i}"))?,
            );
        }
        keyframes.sort_by(|a, b| a.time.total_cmp(&b.time));

        if let Some(first) = keyframes.first() {
            if keyframes.iter().any(|k| k.interpolator != first.interpolator) {
                bail!(GenerateError::Unsupported(
                    "mixing Linear and Cubic interpolators in one transform".to_string()
                ));
            }
        }
        Ok(Self { keyframes })
    }

    pub fn dynamic(&self) -> Dynamic {
        let Some(reference) = self.keyframes.first() else {
            return Dynamic::default();
        };
        let mut dynamic = Dynamic::default();
        for k in &self.keyframes[1..] {
            dynamic.position |= !k.position.abs_diff_eq(reference.position, EPSILON);
            dynamic.scale |= !k.scale.abs_diff_eq(reference.scale, EPSILON);
            // q and -q are the same rotation.
            dynamic.rotation |= k.rotation.dot(reference.rotation).abs() < 1.0 - EPSILON;
        }
        dynamic
    }

    pub fn plan(&self) -> TransformPlan {
        match self.keyframes.first() {
            None => TransformPlan::Identity,
            Some(first) => {
                let dynamic = self.dynamic();
                if dynamic.any() {
                    TransformPlan::Animated(dynamic)
                } else {
                    TransformPlan::Constant(first.matrix())
                }
            }
        }
    }
}

const CATMULL_ROM: &str = "vec4 CatmullRom(in vec4 p0, in vec4 p1, in vec4 p2, in vec4 p3, in float t) {
    float t2 = t * t;
    float t3 = t2 * t;
    return 0.5 * ((2.0 * p1) + (-p0 + p2) * t + (2.0 * p0 - 5.0 * p1 + 4.0 * p2 - p3) * t2 + (-p0 + 3.0 * p1 - 3.0 * p2 + p3) * t3);
}";

const QUATERNION_BLEND: &str = "vec4 QuaternionBlend(in vec4 a, in vec4 b, in float t) {
    if (dot(a, b) < 0.0) b = -b;
    return normalize(mix(a, b, t));
}";

const COMPOSE_MODEL: &str = "mat4 ComposeModel(in vec3 position, in vec3 scale, in vec4 rotation) {
    vec4 q = normalize(rotation);
    float xx = q.x * q.x;
    float yy = q.y * q.y;
    float zz = q.z * q.z;
    float xy = q.x * q.y;
    float xz = q.x * q.z;
    float yz = q.y * q.z;
    float wx = q.w * q.x;
    float wy = q.w * q.y;
    float wz = q.w * q.z;
    return mat4(
        vec4((1.0 - 2.0 * (yy + zz)) * scale.x, 2.0 * (xy + wz) * scale.x, 2.0 * (xz - wy) * scale.x, 0.0),
        vec4(2.0 * (xy - wz) * scale.y, (1.0 - 2.0 * (xx + zz)) * scale.y, 2.0 * (yz + wx) * scale.y, 0.0),
        vec4(2.0 * (xz + wy) * scale.z, 2.0 * (yz - wx) * scale.z, (1.0 - 2.0 * (xx + yy)) * scale.z, 0.0),
        vec4(position, 1.0));
}";

fn array<T: GlslLiteral>(ty: &str, name: &str, items: &[T]) -> String {
    let count = items.len();
    let values = items
        .iter()
        .map(GlslLiteral::to_glsl)
        .collect::<Vec<_>>()
        .join(", ");
    format!("const {ty} {name}[{count}] = {ty}[{count}]({values});")
}

/// One animated channel: either a per-keyframe array or a constant.
struct Channel {
    decl: String,
    /// Blended value between keyframe `index` and `next`.
    blend: String,
}

fn channel(
    n: usize,
    label: &str,
    dynamic: bool,
    ty: &str,
    values: Vec<String>,
    linear: &str,
    cubic: Option<&str>,
) -> Channel {
    if !dynamic {
        let name = format!("Keyframe{label}{n}");
        let value = values.into_iter().next().unwrap_or_default();
        return Channel {
            decl: format!("const {ty} {name} = {value};"),
            blend: name,
        };
    }
    let name = format!("Keyframe{label}s{n}");
    let count = values.len();
    let decl = format!(
        "const {ty} {name}[{count}] = {ty}[{count}]({});",
        values.join(", ")
    );
    let at = |i: &str| format!("{name}[{i}]");
    let blend = match cubic {
        Some(swizzle) => format!(
            "cubic ? CatmullRom(vec4({}, 0.0), vec4({}, 0.0), vec4({}, 0.0), vec4({}, 0.0), t){swizzle} : {linear}({}, {}, t)",
            at("previous"),
            at("index"),
            at("next"),
            at("after"),
            at("index"),
            at("next")
        ),
        None => format!("{linear}({}, {}, t)", at("index"), at("next")),
    };
    Channel { decl, blend }
}

/// `(name, body)` pairs of every helper a transform commits to `#FUNCTIONS`,
/// in commit order.
pub fn transform_functions(n: usize, node: &TransformNode) -> Vec<(String, String)> {
    match node.plan() {
        TransformPlan::Identity => {
            let name = format!("Transform{n}");
            let body = format!("vec4 {name}(in vec4 point) {{\n    return point;\n}}");
            vec![(name, body)]
        }
        TransformPlan::Constant(matrix) => {
            let name = format!("Model{n}");
            let body = format!("const mat4 {name} = {};", matrix.to_glsl());
            vec![(name, body)]
        }
        TransformPlan::Animated(dynamic) => animated_functions(n, node, dynamic),
    }
}

fn animated_functions(n: usize, node: &TransformNode, dynamic: Dynamic) -> Vec<(String, String)> {
    let keys = &node.keyframes;
    let last = keys.len() - 1;
    let times: Vec<f32> = keys.iter().map(|k| k.time).collect();
    let interpolators: Vec<i32> = keys.iter().map(|k| k.interpolator.index()).collect();

    let position = channel(
        n,
        "Position",
        dynamic.position,
        "vec3",
        keys.iter().map(|k| k.position.to_glsl()).collect(),
        "mix",
        Some(".xyz"),
    );
    let scale = channel(
        n,
        "Scale",
        dynamic.scale,
        "vec3",
        keys.iter().map(|k| k.scale.to_glsl()).collect(),
        "mix",
        Some(".xyz"),
    );
    let rotation = channel(
        n,
        "Rotation",
        dynamic.rotation,
        "vec4",
        keys.iter().map(|k| k.rotation.to_glsl()).collect(),
        "QuaternionBlend",
        None,
    );

    let mut out = Vec::new();
    let times_name = format!("KeyframeTimes{n}");
    let interpolators_name = format!("KeyframeInterpolators{n}");
    out.push((times_name.clone(), array("float", &times_name, &times)));
    out.push((
        interpolators_name.clone(),
        array("int", &interpolators_name, &interpolators),
    ));
    for (label, ch) in [("Position", &position), ("Scale", &scale), ("Rotation", &rotation)] {
        out.push((format!("Keyframe{label}{n}"), ch.decl.clone()));
    }
    out.push(("CatmullRom".to_string(), CATMULL_ROM.to_string()));
    if dynamic.rotation {
        out.push(("QuaternionBlend".to_string(), QUATERNION_BLEND.to_string()));
    }
    out.push(("ComposeModel".to_string(), COMPOSE_MODEL.to_string()));

    let interpolate = format!("InterpolateKeyframes{n}");
    out.push((
        interpolate.clone(),
        format!(
            "mat4 {interpolate}(in int index, in float t) {{
    int previous = max(index - 1, 0);
    int next = min(index + 1, {last});
    int after = min(index + 2, {last});
    bool cubic = {interpolators_name}[index] == 1;
    vec3 position = {position};
    vec3 scale = {scale};
    vec4 rotation = {rotation};
    return ComposeModel(position, scale, rotation);
}}",
            position = position.blend,
            scale = scale.blend,
            rotation = rotation.blend,
        ),
    ));

    let animate = format!("Animate{n}");
    let first_time = fmt_f32(times[0]);
    let last_time = fmt_f32(times[last]);
    out.push((
        animate.clone(),
        format!(
            "mat4 {animate}(in float time) {{
    if (time <= {first_time}) return {interpolate}(0, 0.0);
    if (time >= {last_time}) return {interpolate}({last}, 0.0);
    for (int i = 0; i < {last}; i++) {{
        if (time < {times_name}[i + 1]) {{
            float t = (time - {times_name}[i]) / ({times_name}[i + 1] - {times_name}[i]);
            return {interpolate}(i, t);
        }}
    }}
    return {interpolate}({last}, 0.0);
}}"
        ),
    ));
    out
}

pub fn generate(mat: &mut Material, id: NodeId, node: &TransformNode) -> Result<()> {
    mat.descend(id)?;
    let n = id.index();
    let stage = mat.node_stage(id)?;
    let rate = stage.rate();

    for (name, body) in transform_functions(n, node) {
        mat.ensure_function(stage, &name, &body)?;
    }

    let point = mat
        .get_value_as(id, &Trait::new(TraitId::Position), rate, DataType::Vec4, Fallback::Input)?
        .unwrap_or_else(|| "vec4(0.0, 0.0, 0.0, 1.0)".to_string());

    let (model, code) = match node.plan() {
        TransformPlan::Identity => (
            "mat4(1.0)".to_string(),
            format!("vec4 transformPosition{n} = Transform{n}({point});"),
        ),
        // The baked matrix is exposed as a literal: `Model<n>` is only
        // declared in this node's stage.
        TransformPlan::Constant(matrix) => (
            matrix.to_glsl(),
            format!("vec4 transformPosition{n} = Model{n} * {point};"),
        ),
        TransformPlan::Animated(_) => {
            let time = mat
                .get_value_as(id, &Trait::new(TraitId::Time), rate, DataType::Float, Fallback::Input)?
                .unwrap_or_else(|| "0.0".to_string());
            (
                format!("transformModel{n}"),
                format!(
                    "mat4 transformModel{n} = Animate{n}({time});
vec4 transformPosition{n} = transformModel{n} * {point};"
                ),
            )
        }
    };
    mat.commit(stage, Token::main_body(stage), &code)?;

    // Constants live at the coarsest rate; runtime values at the stage rate.
    let model_rate = match node.plan() {
        TransformPlan::Animated(_) => rate,
        _ => Rate::Tick,
    };
    mat.expose(
        id,
        Trait::typed(TraitId::Model, DataType::Mat4),
        Symbol::new(model, DataType::Mat4, model_rate),
    );
    mat.expose(
        id,
        Trait::typed(TraitId::Position, DataType::Vec4),
        Symbol::new(format!("transformPosition{n}"), DataType::Vec4, rate),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::*;
    use super::*;
    use crate::generator::types::ShaderStage;
    use serde_json::json;

    fn keyframe(time: f64) -> Construct {
        Construct::new(ConstructKind::Keyframe).with_trait(TraitId::Time, json!(time))
    }

    fn transform(keyframes: Vec<Construct>) -> TransformNode {
        let mut construct = Construct::new(ConstructKind::Transform);
        construct.children = keyframes;
        TransformNode::from_descriptor(&construct).unwrap()
    }

    #[test]
    fn no_keyframes_is_an_identity_passthrough() {
        let node = transform(vec![]);
        assert_eq!(node.plan(), TransformPlan::Identity);
        let functions = transform_functions(4, &node);
        assert_eq!(functions.len(), 1);
        assert_eq!(
            functions[0].1,
            "vec4 Transform4(in vec4 point) {\n    return point;\n}"
        );
    }

    #[test]
    fn one_keyframe_bakes_a_constant_matrix() {
        let node = transform(vec![
            keyframe(0.0).with_trait(TraitId::Position, json!([1.0, 2.0, 3.0])),
        ]);
        let TransformPlan::Constant(m) = node.plan() else {
            panic!("expected a constant plan");
        };
        assert_eq!(m.w_axis.truncate(), Vec3::new(1.0, 2.0, 3.0));
        let functions = transform_functions(1, &node);
        assert_eq!(functions.len(), 1);
        assert!(functions[0].1.starts_with("const mat4 Model1 = mat4("));
        assert!(functions[0].1.ends_with("1.0, 2.0, 3.0, 1.0);"));
    }

    #[test]
    fn identical_keyframes_collapse_to_the_constant_path() {
        let same = |t| {
            keyframe(t)
                .with_trait(TraitId::Scale, json!(2.0))
                .with_trait(TraitId::Rotation, json!([0.0, 90.0, 0.0]))
        };
        let node = transform(vec![same(0.0), same(1.0), same(2.0)]);
        assert_eq!(node.dynamic(), Dynamic::default());
        assert!(matches!(node.plan(), TransformPlan::Constant(_)));
        assert_eq!(transform_functions(1, &node).len(), 1);
    }

    #[test]
    fn only_changing_channels_become_arrays() {
        let node = transform(vec![
            keyframe(1.0).with_trait(TraitId::Position, json!([0.0, 1.0, 0.0])),
            keyframe(0.0),
        ]);
        assert_eq!(node.keyframes[0].time, 0.0);
        assert_eq!(
            node.dynamic(),
            Dynamic {
                position: true,
                scale: false,
                rotation: false
            }
        );
        let code: String = transform_functions(2, &node)
            .into_iter()
            .map(|(_, body)| body + "\n")
            .collect();
        assert!(code.contains("const float KeyframeTimes2[2] = float[2](0.0, 1.0);"));
        assert!(code.contains("const int KeyframeInterpolators2[2] = int[2](0, 0);"));
        assert!(code.contains("const vec3 KeyframePositions2[2] = vec3[2](vec3(0.0, 0.0, 0.0), vec3(0.0, 1.0, 0.0));"));
        assert!(code.contains("const vec3 KeyframeScale2 = vec3(1.0, 1.0, 1.0);"));
        assert!(code.contains("vec3 scale = KeyframeScale2;"));
        assert!(!code.contains("QuaternionBlend"));
        assert!(code.contains("mat4 Animate2(in float time) {"));
        assert!(code.contains("    if (time >= 1.0) return InterpolateKeyframes2(1, 0.0);"));
    }

    #[test]
    fn mixed_interpolators_are_unsupported() {
        let mut construct = Construct::new(ConstructKind::Transform);
        construct.children = vec![
            keyframe(0.0),
            keyframe(1.0).with_trait(TraitId::Interpolator, json!("Cubic")),
        ];
        let err = TransformNode::from_descriptor(&construct).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerateError>(),
            Some(GenerateError::Unsupported(_))
        ));
    }

    #[test]
    fn animated_transform_drives_vertices_from_tick_time() {
        let mat = generated(vec![
            Construct::new(ConstructKind::Transform)
                .with_trait(TraitId::Rate, json!("Vertex"))
                .with_child(keyframe(0.0))
                .with_child(
                    keyframe(2.0)
                        .with_trait(TraitId::Rotation, json!([0.0, 0.0, 90.0]))
                        .with_trait(TraitId::Interpolator, json!("Cubic")),
                )
                .with_child(keyframe(1.0).with_trait(TraitId::Interpolator, json!("Cubic"))),
        ]);
        // keyframe(0.0) defaults to Linear while the others are Cubic.
        assert!(mat.is_err());

        let cubic = |t| keyframe(t).with_trait(TraitId::Interpolator, json!("Cubic"));
        let mat = generated(vec![
            Construct::new(ConstructKind::Transform)
                .with_trait(TraitId::Rate, json!("Vertex"))
                .with_child(cubic(0.0))
                .with_child(cubic(1.0).with_trait(TraitId::Rotation, json!([0.0, 0.0, 90.0]))),
        ])
        .unwrap();
        let vertex = mat.stage_code(ShaderStage::Vertex);
        assert!(vertex.contains("    mat4 transformModel1 = Animate1(Tick.Time);"));
        assert!(vertex.contains("    vec4 transformPosition1 = transformModel1 * inPosition;"));
        assert!(vertex.contains("vec4 rotation = QuaternionBlend(KeyframeRotations1[index], KeyframeRotations1[next], t);"));
        assert!(vertex.contains("uniform UniformBufferTick {"));
    }
}
