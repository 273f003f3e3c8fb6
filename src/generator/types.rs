//! Core type definitions for the shader generator.
//!
//! - `ShaderStage`: the programmable pipeline phases a material emits code for
//! - `Rate`: refresh frequency of a value, ordered from coarsest (`Tick`) to finest (`Compute`)
//! - `DataType`: the GLSL-facing data types a trait may carry
//! - `TraitId` / `Trait`: what a piece of shading data represents
//! - `Symbol`: a generated GLSL expression bound to a trait

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use super::error::GenerateError;

/// One programmable shader phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    TessCtrl,
    TessEval,
    Pixel,
    Compute,
}

impl ShaderStage {
    pub const COUNT: usize = 6;

    pub const ALL: [ShaderStage; Self::COUNT] = [
        ShaderStage::Vertex,
        ShaderStage::Geometry,
        ShaderStage::TessCtrl,
        ShaderStage::TessEval,
        ShaderStage::Pixel,
        ShaderStage::Compute,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// File-friendly name, used by the CLI when writing stages to disk.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Geometry => "geometry",
            ShaderStage::TessCtrl => "tess_ctrl",
            ShaderStage::TessEval => "tess_eval",
            ShaderStage::Pixel => "pixel",
            ShaderStage::Compute => "compute",
        }
    }

    /// The rate whose values are produced once per invocation of this stage.
    pub fn rate(self) -> Rate {
        match self {
            ShaderStage::Vertex => Rate::Vertex,
            ShaderStage::Geometry => Rate::Primitive,
            ShaderStage::TessCtrl => Rate::TessCtrl,
            ShaderStage::TessEval => Rate::TessEval,
            ShaderStage::Pixel => Rate::Pixel,
            ShaderStage::Compute => Rate::Compute,
        }
    }
}

/// Refresh frequency of a value.
///
/// Variants are declared from the least frequently updated (`Tick`) to the
/// most frequently updated (`Compute`), so the derived ordering reads as
/// "coarser < finer". An input consumed at rate `r` must live at a rate `<= r`.
/// `Auto` means "inherit from context" and must be resolved before comparing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rate {
    Auto,
    Tick,
    Pass,
    Camera,
    Level,
    Renderable,
    Instance,
    Vertex,
    TessCtrl,
    TessEval,
    Primitive,
    Pixel,
    Compute,
}

impl Rate {
    pub const UNIFORM_COUNT: usize = 6;
    /// Number of concrete rates; also the size of every rate-indexed list.
    pub const COUNT: usize = Self::UNIFORM_COUNT + ShaderStage::COUNT;

    pub const UNIFORMS: [Rate; Self::UNIFORM_COUNT] = [
        Rate::Tick,
        Rate::Pass,
        Rate::Camera,
        Rate::Level,
        Rate::Renderable,
        Rate::Instance,
    ];

    pub const ALL: [Rate; Self::COUNT] = [
        Rate::Tick,
        Rate::Pass,
        Rate::Camera,
        Rate::Level,
        Rate::Renderable,
        Rate::Instance,
        Rate::Vertex,
        Rate::TessCtrl,
        Rate::TessEval,
        Rate::Primitive,
        Rate::Pixel,
        Rate::Compute,
    ];

    /// Position of this rate in rate-indexed lists; `None` for `Auto`.
    pub fn index(self) -> Option<usize> {
        match self {
            Rate::Auto => None,
            other => Some(other as usize - 1),
        }
    }

    pub fn is_uniform(self) -> bool {
        matches!(
            self,
            Rate::Tick | Rate::Pass | Rate::Camera | Rate::Level | Rate::Renderable | Rate::Instance
        )
    }

    /// Static uniform rates are owned by the engine and bound once per frame.
    pub fn is_static(self) -> bool {
        matches!(self, Rate::Tick | Rate::Pass | Rate::Camera | Rate::Level)
    }

    pub fn stage(self) -> Option<ShaderStage> {
        match self {
            Rate::Vertex => Some(ShaderStage::Vertex),
            Rate::TessCtrl => Some(ShaderStage::TessCtrl),
            Rate::TessEval => Some(ShaderStage::TessEval),
            Rate::Primitive => Some(ShaderStage::Geometry),
            Rate::Pixel => Some(ShaderStage::Pixel),
            Rate::Compute => Some(ShaderStage::Compute),
            _ => None,
        }
    }

    /// `(set, binding)` of the uniform block carrying values of this rate.
    /// Static rates go to set 0, dynamic (per draw) rates to set 1.
    pub fn uniform_binding(self) -> Option<(u32, u32)> {
        match self {
            Rate::Tick => Some((0, 0)),
            Rate::Pass => Some((0, 1)),
            Rate::Camera => Some((0, 2)),
            Rate::Level => Some((0, 3)),
            Rate::Renderable => Some((1, 0)),
            Rate::Instance => Some((1, 1)),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Rate::Auto => "Auto",
            Rate::Tick => "Tick",
            Rate::Pass => "Pass",
            Rate::Camera => "Camera",
            Rate::Level => "Level",
            Rate::Renderable => "Renderable",
            Rate::Instance => "Instance",
            Rate::Vertex => "Vertex",
            Rate::TessCtrl => "TessCtrl",
            Rate::TessEval => "TessEval",
            Rate::Primitive => "Primitive",
            Rate::Pixel => "Pixel",
            Rate::Compute => "Compute",
        }
    }
}

/// Component family of scalar, vector and matrix types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Family {
    Bool,
    Int,
    UInt,
    Float,
    Double,
}

/// Data type carried by a trait or a symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Vec2,
    Vec3,
    Vec4,
    DVec2,
    DVec3,
    DVec4,
    IVec2,
    IVec3,
    IVec4,
    UVec2,
    UVec3,
    UVec4,
    Mat2,
    Mat3,
    Mat4,
    DMat2,
    DMat3,
    DMat4,
    Quat,
    Rgb,
    Rgba,
    Sampler2D,
    Text,
}

impl DataType {
    /// GLSL spelling of the type, if it is a GLSL type at all.
    pub fn glsl(self) -> Option<&'static str> {
        Some(match self {
            DataType::Bool => "bool",
            DataType::Int => "int",
            DataType::UInt => "uint",
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Vec2 => "vec2",
            DataType::Vec3 => "vec3",
            DataType::Vec4 => "vec4",
            DataType::DVec2 => "dvec2",
            DataType::DVec3 => "dvec3",
            DataType::DVec4 => "dvec4",
            DataType::IVec2 => "ivec2",
            DataType::IVec3 => "ivec3",
            DataType::IVec4 => "ivec4",
            DataType::UVec2 => "uvec2",
            DataType::UVec3 => "uvec3",
            DataType::UVec4 => "uvec4",
            DataType::Mat2 => "mat2",
            DataType::Mat3 => "mat3",
            DataType::Mat4 => "mat4",
            DataType::DMat2 => "dmat2",
            DataType::DMat3 => "dmat3",
            DataType::DMat4 => "dmat4",
            DataType::Sampler2D => "sampler2D",
            DataType::Quat | DataType::Rgb | DataType::Rgba | DataType::Text => return None,
        })
    }

    /// GLSL spelling, failing with a configuration error for non-GLSL types.
    pub fn glsl_name(self) -> Result<&'static str> {
        match self.glsl() {
            Some(name) => Ok(name),
            None => bail!(GenerateError::Config(format!(
                "{self:?} has no GLSL spelling (decay it first)"
            ))),
        }
    }

    /// `(family, component count)` for scalars and vectors.
    pub fn vector_shape(self) -> Option<(Family, usize)> {
        Some(match self {
            DataType::Bool => (Family::Bool, 1),
            DataType::Int => (Family::Int, 1),
            DataType::UInt => (Family::UInt, 1),
            DataType::Float => (Family::Float, 1),
            DataType::Double => (Family::Double, 1),
            DataType::Vec2 => (Family::Float, 2),
            DataType::Vec3 => (Family::Float, 3),
            DataType::Vec4 => (Family::Float, 4),
            DataType::DVec2 => (Family::Double, 2),
            DataType::DVec3 => (Family::Double, 3),
            DataType::DVec4 => (Family::Double, 4),
            DataType::IVec2 => (Family::Int, 2),
            DataType::IVec3 => (Family::Int, 3),
            DataType::IVec4 => (Family::Int, 4),
            DataType::UVec2 => (Family::UInt, 2),
            DataType::UVec3 => (Family::UInt, 3),
            DataType::UVec4 => (Family::UInt, 4),
            _ => return None,
        })
    }

    /// `(family, dimension)` for square matrices.
    pub fn matrix_shape(self) -> Option<(Family, usize)> {
        Some(match self {
            DataType::Mat2 => (Family::Float, 2),
            DataType::Mat3 => (Family::Float, 3),
            DataType::Mat4 => (Family::Float, 4),
            DataType::DMat2 => (Family::Double, 2),
            DataType::DMat3 => (Family::Double, 3),
            DataType::DMat4 => (Family::Double, 4),
            _ => return None,
        })
    }

    pub fn vector(family: Family, count: usize) -> Option<DataType> {
        Some(match (family, count) {
            (Family::Bool, 1) => DataType::Bool,
            (Family::Int, 1) => DataType::Int,
            (Family::UInt, 1) => DataType::UInt,
            (Family::Float, 1) => DataType::Float,
            (Family::Double, 1) => DataType::Double,
            (Family::Float, 2) => DataType::Vec2,
            (Family::Float, 3) => DataType::Vec3,
            (Family::Float, 4) => DataType::Vec4,
            (Family::Double, 2) => DataType::DVec2,
            (Family::Double, 3) => DataType::DVec3,
            (Family::Double, 4) => DataType::DVec4,
            (Family::Int, 2) => DataType::IVec2,
            (Family::Int, 3) => DataType::IVec3,
            (Family::Int, 4) => DataType::IVec4,
            (Family::UInt, 2) => DataType::UVec2,
            (Family::UInt, 3) => DataType::UVec3,
            (Family::UInt, 4) => DataType::UVec4,
            _ => return None,
        })
    }

    pub fn matrix(family: Family, dim: usize) -> Option<DataType> {
        Some(match (family, dim) {
            (Family::Float, 2) => DataType::Mat2,
            (Family::Float, 3) => DataType::Mat3,
            (Family::Float, 4) => DataType::Mat4,
            (Family::Double, 2) => DataType::DMat2,
            (Family::Double, 3) => DataType::DMat3,
            (Family::Double, 4) => DataType::DMat4,
            _ => return None,
        })
    }

    pub fn is_matrix(self) -> bool {
        self.matrix_shape().is_some()
    }

    pub fn is_texture(self) -> bool {
        self == DataType::Sampler2D
    }

    /// Map this type down to the nearest GLSL base type usable for stage
    /// inputs/outputs and uniform members.
    ///
    /// Integer and boolean aggregates decay to the float family of the same
    /// width, doubles keep double precision, quaternions and colors become
    /// `vec4`/`vec3`. Text has no GLSL analog.
    pub fn decay(self) -> Result<DataType> {
        if let Some((family, count)) = self.vector_shape() {
            let family = match family {
                Family::Double => Family::Double,
                _ => Family::Float,
            };
            if let Some(decayed) = DataType::vector(family, count) {
                return Ok(decayed);
            }
        }
        match self {
            DataType::Quat | DataType::Rgba => Ok(DataType::Vec4),
            DataType::Rgb => Ok(DataType::Vec3),
            DataType::Sampler2D => Ok(DataType::Sampler2D),
            other if other.is_matrix() => Ok(other),
            other => bail!(GenerateError::Config(format!(
                "{other:?} cannot decay to a GLSL type"
            ))),
        }
    }
}

/// Identity of a piece of shading data (or of a descriptor setting).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TraitId {
    Time,
    MousePosition,
    MouseScroll,
    Resolution,
    Projection,
    FieldOfView,
    View,
    Texture,
    Model,
    Position,
    Sampler,
    Aim,
    Color,
    Origin,
    Depth,
    Scale,
    Rotation,
    Rate,
    Name,
    Parent,
    Count,
    Mass,
    Interpolator,
    Code,
    File,
    Topology,
    Cull,
    Bilateral,
    Precision,
    Distance,
    Stride,
    FarStride,
    MinStep,
    Output,
    Version,
}

impl TraitId {
    /// Token used when deriving GLSL names (`inColor`, `Tick.Time`, ...).
    pub fn name(self) -> &'static str {
        match self {
            TraitId::Time => "Time",
            TraitId::MousePosition => "MousePosition",
            TraitId::MouseScroll => "MouseScroll",
            TraitId::Resolution => "Resolution",
            TraitId::Projection => "Projection",
            TraitId::FieldOfView => "FieldOfView",
            TraitId::View => "View",
            TraitId::Texture => "Texture",
            TraitId::Model => "Model",
            TraitId::Position => "Position",
            TraitId::Sampler => "Sampler",
            TraitId::Aim => "Aim",
            TraitId::Color => "Color",
            TraitId::Origin => "Origin",
            TraitId::Depth => "Depth",
            TraitId::Scale => "Scale",
            TraitId::Rotation => "Rotation",
            TraitId::Rate => "Rate",
            TraitId::Name => "Name",
            TraitId::Parent => "Parent",
            TraitId::Count => "Count",
            TraitId::Mass => "Mass",
            TraitId::Interpolator => "Interpolator",
            TraitId::Code => "Code",
            TraitId::File => "File",
            TraitId::Topology => "Topology",
            TraitId::Cull => "Cull",
            TraitId::Bilateral => "Bilateral",
            TraitId::Precision => "Precision",
            TraitId::Distance => "Distance",
            TraitId::Stride => "Stride",
            TraitId::FarStride => "FarStride",
            TraitId::MinStep => "MinStep",
            TraitId::Output => "Output",
            TraitId::Version => "Version",
        }
    }
}

/// A `(trait id, data type, optional value)` triple.
///
/// Lookups compare traits by identity only (see [`Trait::same_as`]); the value
/// never participates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trait {
    pub id: TraitId,
    #[serde(default)]
    pub ty: Option<DataType>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl Trait {
    pub fn new(id: TraitId) -> Self {
        Self {
            id,
            ty: None,
            value: None,
        }
    }

    pub fn typed(id: TraitId, ty: DataType) -> Self {
        Self {
            id,
            ty: Some(ty),
            value: None,
        }
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Same trait id, and the same data type when both sides carry one.
    pub fn same_as(&self, other: &Trait) -> bool {
        if self.id != other.id {
            return false;
        }
        match (self.ty, other.ty) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }

    pub fn is_texture(&self) -> bool {
        self.ty.is_some_and(DataType::is_texture)
    }
}

/// A GLSL expression (or variable name) bound to a trait at some rate.
#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    pub expr: String,
    pub ty: DataType,
    pub rate: Rate,
}

impl Symbol {
    pub fn new(expr: impl Into<String>, ty: DataType, rate: Rate) -> Self {
        Self {
            expr: expr.into(),
            ty,
            rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_order_coarse_to_fine() {
        assert!(Rate::Tick < Rate::Camera);
        assert!(Rate::Instance < Rate::Vertex);
        assert!(Rate::Vertex < Rate::Pixel);
        assert_eq!(Rate::Tick.index(), Some(0));
        assert_eq!(Rate::Compute.index(), Some(Rate::COUNT - 1));
        assert_eq!(Rate::Auto.index(), None);
    }

    #[test]
    fn every_stage_maps_back_to_itself() {
        for stage in ShaderStage::ALL {
            assert_eq!(stage.rate().stage(), Some(stage));
        }
        for rate in Rate::UNIFORMS {
            assert_eq!(rate.stage(), None);
            assert!(rate.uniform_binding().is_some());
        }
    }

    #[test]
    fn decay_maps_aggregates_to_glsl_base_types() {
        assert_eq!(DataType::IVec3.decay().unwrap(), DataType::Vec3);
        assert_eq!(DataType::UInt.decay().unwrap(), DataType::Float);
        assert_eq!(DataType::DVec2.decay().unwrap(), DataType::DVec2);
        assert_eq!(DataType::Quat.decay().unwrap(), DataType::Vec4);
        assert_eq!(DataType::Rgb.decay().unwrap(), DataType::Vec3);
        assert_eq!(DataType::Mat3.decay().unwrap(), DataType::Mat3);

        let err = DataType::Text.decay().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerateError>(),
            Some(GenerateError::Config(_))
        ));
    }

    #[test]
    fn traits_compare_by_identity_not_value() {
        let a = Trait::typed(TraitId::Color, DataType::Vec4).with_value(serde_json::json!(1));
        let b = Trait::new(TraitId::Color);
        let c = Trait::typed(TraitId::Color, DataType::Vec3);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&c));
        assert!(!a.same_as(&Trait::new(TraitId::Time)));
    }
}
