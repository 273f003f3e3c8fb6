//! Canonical data type and refresh rate for well-known traits.

use std::collections::HashMap;
use std::sync::LazyLock;

use anyhow::Result;

use super::error::GenerateError;
use super::types::{DataType, Rate, Trait, TraitId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraitDefault {
    pub ty: DataType,
    pub rate: Rate,
}

static DEFAULT_TRAITS: LazyLock<HashMap<TraitId, TraitDefault>> = LazyLock::new(|| {
    use DataType::*;
    let entries = [
        (TraitId::Time, Float, Rate::Tick),
        (TraitId::MousePosition, Vec2, Rate::Tick),
        (TraitId::MouseScroll, Vec2, Rate::Tick),
        (TraitId::Resolution, Vec2, Rate::Camera),
        (TraitId::Projection, Mat4, Rate::Camera),
        (TraitId::FieldOfView, Float, Rate::Camera),
        (TraitId::View, Mat4, Rate::Camera),
        (TraitId::Texture, Sampler2D, Rate::Renderable),
        (TraitId::Model, Mat4, Rate::Instance),
        (TraitId::Position, Vec4, Rate::Vertex),
        (TraitId::Sampler, Vec2, Rate::Vertex),
        (TraitId::Aim, Vec3, Rate::Vertex),
        (TraitId::Color, Vec4, Rate::Pixel),
    ];
    entries
        .into_iter()
        .map(|(id, ty, rate)| (id, TraitDefault { ty, rate }))
        .collect()
});

pub fn default_for(id: TraitId) -> Option<TraitDefault> {
    DEFAULT_TRAITS.get(&id).copied()
}

/// Fill in a missing data type from the default table.
pub fn typed(t: &Trait) -> Result<Trait> {
    if t.ty.is_some() {
        return Ok(t.clone());
    }
    match default_for(t.id) {
        Some(d) => Ok(Trait {
            id: t.id,
            ty: Some(d.ty),
            value: t.value.clone(),
        }),
        None => Err(GenerateError::config(format!(
            "trait {} has no data type and no default",
            t.id.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_traits_have_defaults() {
        let time = default_for(TraitId::Time).unwrap();
        assert_eq!(time.ty, DataType::Float);
        assert_eq!(time.rate, Rate::Tick);

        let model = default_for(TraitId::Model).unwrap();
        assert_eq!(model.ty, DataType::Mat4);
        assert_eq!(model.rate, Rate::Instance);

        assert!(default_for(TraitId::Depth).is_none());
    }

    #[test]
    fn typed_keeps_explicit_types() {
        let explicit = Trait::typed(TraitId::Color, DataType::Vec3);
        assert_eq!(typed(&explicit).unwrap().ty, Some(DataType::Vec3));
        assert_eq!(
            typed(&Trait::new(TraitId::Color)).unwrap().ty,
            Some(DataType::Vec4)
        );
        assert!(typed(&Trait::new(TraitId::Depth)).is_err());
    }
}
