//! Light, Raycast and Raytrace nodes: accepted in descriptors, but
//! generating them is not implemented.

use anyhow::{Result, bail};

use crate::generator::error::GenerateError;
use crate::generator::material::Material;
use crate::generator::node::NodeId;

pub fn generate(mat: &mut Material, id: NodeId) -> Result<()> {
    mat.descend(id)?;
    bail!(GenerateError::Unsupported(format!(
        "{} node generation",
        mat.node(id).kind.name()
    )))
}
