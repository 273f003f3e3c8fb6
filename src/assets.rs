//! Geometry and texture handles produced from descriptor constructs.
//!
//! The generator only needs read access to primitive data (triangles, lines,
//! an optional SDF term) and an opaque texture identity. `PrimitiveFactory`
//! builds analytic primitives so descriptors work without external files.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow, bail};
use glam::{Vec2, Vec3};

use crate::dsl::{self, Construct, ConstructKind};
use crate::generator::types::TraitId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

/// One signed-distance term plus the GLSL helper it calls.
#[derive(Debug, Clone, PartialEq)]
pub struct SdfTerm {
    pub expr: String,
    pub helper_name: &'static str,
    pub helper_body: &'static str,
}

pub trait GeometryAsset: Debug + Send + Sync {
    fn name(&self) -> &str;
    fn triangle_count(&self) -> usize;
    fn line_count(&self) -> usize;
    fn triangle(&self, index: usize) -> Option<[Vertex; 3]>;
    fn line(&self, index: usize) -> Option<[Vertex; 2]>;
    /// Distance expression in terms of the GLSL variable `point`, if the
    /// primitive has an analytic SDF.
    fn sdf(&self, point: &str) -> Option<SdfTerm>;
}

pub trait TextureAsset: Debug + Send + Sync {
    fn name(&self) -> &str;
}

/// Turns `Geometry` and `File` constructs into asset handles.
pub trait AssetFactory {
    fn create_geometry(&self, construct: &Construct) -> Result<Arc<dyn GeometryAsset>>;
    fn create_texture(&self, construct: &Construct) -> Result<Arc<dyn TextureAsset>>;
}

const SDF_BOX: &str = "float SDFBox(in vec3 point, in vec3 extents) {
    vec3 q = abs(point) - extents;
    return length(max(q, 0.0)) + min(max(q.x, max(q.y, q.z)), 0.0);
}";

const SDF_SPHERE: &str = "float SDFSphere(in vec3 point, in float radius) {
    return length(point) - radius;
}";

#[derive(Debug, Clone, Copy, PartialEq)]
enum Shape {
    Box,
    Sphere { radius: f32 },
    Rect,
    Triangle,
    Line,
}

#[derive(Debug, Clone)]
pub struct Primitive {
    name: String,
    shape: Shape,
    center: Vec3,
    scale: Vec3,
    triangles: Vec<[Vertex; 3]>,
    lines: Vec<[Vertex; 2]>,
}

impl Primitive {
    fn build(name: &str, shape: Shape, center: Vec3, scale: Vec3) -> Self {
        let mut primitive = Self {
            name: name.to_string(),
            shape,
            center,
            scale,
            triangles: Vec::new(),
            lines: Vec::new(),
        };
        match shape {
            Shape::Box => primitive.build_box(),
            Shape::Sphere { radius } => primitive.build_sphere(radius),
            Shape::Rect => primitive.build_rect(),
            Shape::Triangle => primitive.build_triangle(),
            Shape::Line => {
                let a = center + Vec3::new(-0.5, 0.0, 0.0) * scale;
                let b = center + Vec3::new(0.5, 0.0, 0.0) * scale;
                primitive.lines.push([
                    vertex(a, Vec3::Z, Vec2::ZERO),
                    vertex(b, Vec3::Z, Vec2::X),
                ]);
            }
        }
        primitive
    }

    fn build_box(&mut self) {
        let half = self.scale * 0.5;
        // (normal, u, v) with u x v == normal so corners wind counter-clockwise
        // when seen from outside.
        let faces = [
            (Vec3::X, Vec3::Y, Vec3::Z),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::Z, Vec3::X),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::Y, Vec3::X),
        ];
        let signs = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
        for (n, u, v) in faces {
            let corners: Vec<Vertex> = signs
                .iter()
                .map(|&(su, sv)| {
                    let p = self.center + (n + u * su + v * sv) * half;
                    vertex(p, n, Vec2::new((su + 1.0) * 0.5, (sv + 1.0) * 0.5))
                })
                .collect();
            self.triangles.push([corners[0], corners[1], corners[2]]);
            self.triangles.push([corners[0], corners[2], corners[3]]);
        }

        for i in 0..4 {
            let (su, sv) = signs[i];
            let (nu, nv) = signs[(i + 1) % 4];
            for z in [-1.0, 1.0] {
                let a = self.center + Vec3::new(su, sv, z) * half;
                let b = self.center + Vec3::new(nu, nv, z) * half;
                self.lines.push([vertex(a, Vec3::Z * z, Vec2::ZERO), vertex(b, Vec3::Z * z, Vec2::X)]);
            }
            let a = self.center + Vec3::new(su, sv, -1.0) * half;
            let b = self.center + Vec3::new(su, sv, 1.0) * half;
            self.lines.push([vertex(a, Vec3::X * su, Vec2::ZERO), vertex(b, Vec3::X * su, Vec2::X)]);
        }
    }

    fn build_sphere(&mut self, radius: f32) {
        const RINGS: usize = 6;
        const SEGMENTS: usize = 12;
        let point = |ring: usize, segment: usize| {
            let theta = std::f32::consts::PI * ring as f32 / RINGS as f32;
            let phi = std::f32::consts::TAU * segment as f32 / SEGMENTS as f32;
            let n = Vec3::new(theta.sin() * phi.cos(), theta.cos(), -theta.sin() * phi.sin());
            let uv = Vec2::new(segment as f32 / SEGMENTS as f32, ring as f32 / RINGS as f32);
            vertex(self.center + n * radius, n, uv)
        };
        let mut triangles = Vec::with_capacity(RINGS * SEGMENTS * 2);
        for ring in 0..RINGS {
            for segment in 0..SEGMENTS {
                let a = point(ring, segment);
                let b = point(ring + 1, segment);
                let c = point(ring + 1, segment + 1);
                let d = point(ring, segment + 1);
                if ring != 0 {
                    triangles.push([a, b, d]);
                }
                if ring + 1 != RINGS {
                    triangles.push([d, b, c]);
                }
            }
        }
        self.triangles = triangles;
    }

    fn build_rect(&mut self) {
        let half = self.scale * 0.5;
        let corner = |x: f32, y: f32| {
            vertex(
                self.center + Vec3::new(x * half.x, y * half.y, 0.0),
                Vec3::Z,
                Vec2::new((x + 1.0) * 0.5, (y + 1.0) * 0.5),
            )
        };
        let (a, b, c, d) = (corner(-1.0, -1.0), corner(1.0, -1.0), corner(1.0, 1.0), corner(-1.0, 1.0));
        self.triangles.push([a, b, c]);
        self.triangles.push([a, c, d]);
        self.lines.extend([[a, b], [b, c], [c, d], [d, a]]);
    }

    fn build_triangle(&mut self) {
        let a = vertex(self.center + Vec3::new(-0.5, -0.5, 0.0) * self.scale, Vec3::Z, Vec2::ZERO);
        let b = vertex(self.center + Vec3::new(0.5, -0.5, 0.0) * self.scale, Vec3::Z, Vec2::X);
        let c = vertex(self.center + Vec3::new(0.0, 0.5, 0.0) * self.scale, Vec3::Z, Vec2::new(0.5, 1.0));
        self.triangles.push([a, b, c]);
        self.lines.extend([[a, b], [b, c], [c, a]]);
    }
}

fn vertex(position: Vec3, normal: Vec3, uv: Vec2) -> Vertex {
    Vertex {
        position,
        normal,
        uv,
    }
}

fn vec3_literal(v: Vec3) -> String {
    use crate::generator::glsl::GlslLiteral;
    v.to_glsl()
}

impl GeometryAsset for Primitive {
    fn name(&self) -> &str {
        &self.name
    }

    fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    fn line_count(&self) -> usize {
        self.lines.len()
    }

    fn triangle(&self, index: usize) -> Option<[Vertex; 3]> {
        self.triangles.get(index).copied()
    }

    fn line(&self, index: usize) -> Option<[Vertex; 2]> {
        self.lines.get(index).copied()
    }

    fn sdf(&self, point: &str) -> Option<SdfTerm> {
        let local = if self.center == Vec3::ZERO {
            point.to_string()
        } else {
            format!("{point} - {}", vec3_literal(self.center))
        };
        match self.shape {
            Shape::Box => Some(SdfTerm {
                expr: format!("SDFBox({local}, {})", vec3_literal(self.scale * 0.5)),
                helper_name: "SDFBox",
                helper_body: SDF_BOX,
            }),
            Shape::Sphere { radius } => Some(SdfTerm {
                expr: format!(
                    "SDFSphere({local}, {})",
                    crate::generator::utils::fmt_f32(radius)
                ),
                helper_name: "SDFSphere",
                helper_body: SDF_SPHERE,
            }),
            Shape::Rect | Shape::Triangle | Shape::Line => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileTexture {
    path: String,
}

impl TextureAsset for FileTexture {
    fn name(&self) -> &str {
        &self.path
    }
}

/// Built-in factory for `box`, `sphere`, `rect`, `triangle` and `line`
/// geometry and path-only textures.
///
/// Identical primitives are built once and shared.
#[derive(Debug, Default)]
pub struct PrimitiveFactory {
    cache: Mutex<HashMap<String, Arc<Primitive>>>,
}

impl PrimitiveFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssetFactory for PrimitiveFactory {
    fn create_geometry(&self, construct: &Construct) -> Result<Arc<dyn GeometryAsset>> {
        if construct.kind != ConstructKind::Geometry {
            bail!("expected a Geometry construct, got {:?}", construct.kind);
        }
        let name = construct
            .name
            .as_deref()
            .ok_or_else(|| anyhow!("Geometry construct needs a primitive name"))?
            .to_ascii_lowercase();
        let scale = dsl::trait_vec::<3>(construct, TraitId::Scale)?.unwrap_or([1.0; 3]);
        let center = dsl::trait_vec::<3>(construct, TraitId::Position)?.unwrap_or([0.0; 3]);
        let (scale, center) = (Vec3::from(scale), Vec3::from(center));

        let shape = match name.as_str() {
            "box" | "cube" => Shape::Box,
            "sphere" => {
                let radius = dsl::trait_f64(construct, TraitId::Mass)
                    .map(|r| r as f32)
                    .unwrap_or(scale.x * 0.5);
                if radius <= 0.0 {
                    bail!("sphere radius must be positive, got {radius}");
                }
                Shape::Sphere { radius }
            }
            "rect" | "square" => Shape::Rect,
            "triangle" => Shape::Triangle,
            "line" => Shape::Line,
            other => bail!("unknown primitive '{other}' (supported: box, sphere, rect, triangle, line)"),
        };

        let key = format!("{name}:{shape:?}:{center}:{scale}");
        let Ok(mut cache) = self.cache.lock() else {
            return Ok(Arc::new(Primitive::build(&name, shape, center, scale)));
        };
        let primitive: Arc<dyn GeometryAsset> = cache
            .entry(key)
            .or_insert_with(|| Arc::new(Primitive::build(&name, shape, center, scale)))
            .clone();
        Ok(primitive)
    }

    fn create_texture(&self, construct: &Construct) -> Result<Arc<dyn TextureAsset>> {
        if construct.kind != ConstructKind::File {
            bail!("expected a File construct, got {:?}", construct.kind);
        }
        let path = dsl::trait_str(construct, TraitId::File)
            .or(construct.name.as_deref())
            .ok_or_else(|| anyhow!("File construct needs a File trait or a name"))?;
        Ok(Arc::new(FileTexture {
            path: path.to_string(),
        }))
    }
}
