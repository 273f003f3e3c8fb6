//! Per-kind node construction and GLSL generation.
//!
//! `build_kind` validates a construct into its kind-specific configuration
//! (so bad descriptor data fails before any buffer is touched); `generate`
//! dispatches the generation pass by kind.

pub mod camera;
pub mod fbm;
pub mod noise;
pub mod raster;
pub mod raymarch;
pub mod scene;
pub mod texture;
pub mod transform;
pub mod unsupported;
pub mod value;

use anyhow::{Result, bail};

use super::error::GenerateError;
use super::material::Material;
use super::node::NodeId;
use crate::assets::AssetFactory;
use crate::dsl::{Construct, ConstructKind};

#[derive(Debug, Clone)]
pub enum NodeKind {
    Root,
    Camera(camera::CameraNode),
    Scene(scene::SceneNode),
    Raster(raster::RasterNode),
    Raymarch(raymarch::RaymarchNode),
    Transform(transform::TransformNode),
    Texture(texture::TextureNode),
    Value(value::ValueNode),
    Fbm(fbm::FbmNode),
    Light,
    Raycast,
    Raytrace,
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Root => "Material",
            NodeKind::Camera(_) => "Camera",
            NodeKind::Scene(_) => "Scene",
            NodeKind::Raster(_) => "Raster",
            NodeKind::Raymarch(_) => "Raymarch",
            NodeKind::Transform(_) => "Transform",
            NodeKind::Texture(_) => "Texture",
            NodeKind::Value(_) => "Value",
            NodeKind::Fbm(_) => "FBM",
            NodeKind::Light => "Light",
            NodeKind::Raycast => "Raycast",
            NodeKind::Raytrace => "Raytrace",
        }
    }
}

/// Data constructs a node kind consumes directly.
fn accepts(kind: ConstructKind, data: ConstructKind) -> bool {
    matches!(
        (kind, data),
        (ConstructKind::Scene, ConstructKind::Geometry)
            | (ConstructKind::Texture, ConstructKind::File)
            | (ConstructKind::Texture, ConstructKind::Keyframe)
            | (ConstructKind::Transform, ConstructKind::Keyframe)
    )
}

/// Validate a node construct into its kind configuration.
pub fn build_kind(construct: &Construct, factory: &dyn AssetFactory) -> Result<NodeKind> {
    for child in construct.children.iter().filter(|c| !c.kind.is_node()) {
        if !accepts(construct.kind, child.kind) {
            bail!(GenerateError::Config(format!(
                "{:?} construct cannot appear under {:?}",
                child.kind, construct.kind
            )));
        }
    }

    Ok(match construct.kind {
        ConstructKind::Camera => NodeKind::Camera(camera::CameraNode::from_descriptor(construct)?),
        ConstructKind::Scene => {
            NodeKind::Scene(scene::SceneNode::from_descriptor(construct, factory)?)
        }
        ConstructKind::Raster => NodeKind::Raster(raster::RasterNode::from_descriptor(construct)?),
        ConstructKind::Raymarch => {
            NodeKind::Raymarch(raymarch::RaymarchNode::from_descriptor(construct)?)
        }
        ConstructKind::Transform => {
            NodeKind::Transform(transform::TransformNode::from_descriptor(construct)?)
        }
        ConstructKind::Texture => {
            NodeKind::Texture(texture::TextureNode::from_descriptor(construct, factory)?)
        }
        ConstructKind::Value => NodeKind::Value(value::ValueNode::from_descriptor(construct)?),
        ConstructKind::Fbm => NodeKind::Fbm(fbm::FbmNode::from_descriptor(construct)?),
        ConstructKind::Light => NodeKind::Light,
        ConstructKind::Raycast => NodeKind::Raycast,
        ConstructKind::Raytrace => NodeKind::Raytrace,
        other => bail!(GenerateError::Config(format!(
            "{other:?} is not a node construct"
        ))),
    })
}

/// Generate one node (and, through `descend`, its children). Nodes that
/// were already generated are skipped.
pub fn generate(mat: &mut Material, id: NodeId) -> Result<()> {
    if mat.node(id).generated {
        return Ok(());
    }
    let kind = mat.node(id).kind.clone();
    log::debug!("generating node {} ({})", id.index(), kind.name());

    match kind {
        NodeKind::Root => mat.descend(id),
        NodeKind::Camera(node) => camera::generate(mat, id, &node),
        NodeKind::Scene(_) => scene::generate(mat, id),
        NodeKind::Raster(node) => raster::generate(mat, id, &node),
        NodeKind::Raymarch(node) => raymarch::generate(mat, id, &node),
        NodeKind::Transform(node) => transform::generate(mat, id, &node),
        NodeKind::Texture(node) => texture::generate(mat, id, &node),
        NodeKind::Value(node) => value::generate(mat, id, &node),
        NodeKind::Fbm(node) => fbm::generate(mat, id, &node),
        NodeKind::Light | NodeKind::Raycast | NodeKind::Raytrace => {
            unsupported::generate(mat, id)
        }
    }
}
