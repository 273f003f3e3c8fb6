use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::generator::types::{DataType, Trait, TraitId};

/// Kind of a descriptor construct.
///
/// Node kinds become graph nodes; `Geometry`, `File` and `Keyframe` are data
/// constructs consumed by the node that directly contains them.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructKind {
    Material,
    Camera,
    Scene,
    Raster,
    Raymarch,
    Raytrace,
    Raycast,
    Transform,
    Texture,
    Light,
    Value,
    #[serde(alias = "FBM")]
    Fbm,
    Geometry,
    File,
    Keyframe,
}

impl ConstructKind {
    pub fn is_node(self) -> bool {
        !matches!(
            self,
            ConstructKind::Material
                | ConstructKind::Geometry
                | ConstructKind::File
                | ConstructKind::Keyframe
        )
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TraitEntry {
    #[serde(rename = "trait")]
    pub id: TraitId,
    #[serde(rename = "type", default)]
    pub ty: Option<DataType>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl TraitEntry {
    pub fn to_trait(&self) -> Trait {
        Trait {
            id: self.id,
            ty: self.ty,
            value: self.value.clone(),
        }
    }
}

/// Arithmetic operation applied by a Value node, in declaration order.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulate,
    Exponent,
    Randomize,
    Select,
    Project,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct VerbEntry {
    pub verb: Verb,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Operand looked up in the node hierarchy instead of a literal `value`.
    #[serde(rename = "trait", default)]
    pub operand: Option<TraitId>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Construct {
    #[serde(rename = "type")]
    pub kind: ConstructKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub traits: Vec<TraitEntry>,
    #[serde(default)]
    pub verbs: Vec<VerbEntry>,
    #[serde(default)]
    pub children: Vec<Construct>,
}

impl Construct {
    pub fn new(kind: ConstructKind) -> Self {
        Self {
            kind,
            name: None,
            traits: Vec::new(),
            verbs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_trait(mut self, id: TraitId, value: serde_json::Value) -> Self {
        self.traits.push(TraitEntry {
            id,
            ty: None,
            value: Some(value),
        });
        self
    }

    pub fn with_typed_trait(
        mut self,
        id: TraitId,
        ty: DataType,
        value: Option<serde_json::Value>,
    ) -> Self {
        self.traits.push(TraitEntry { id, ty: Some(ty), value });
        self
    }

    pub fn with_verb(mut self, verb: Verb, value: serde_json::Value) -> Self {
        self.verbs.push(VerbEntry {
            verb,
            value: Some(value),
            operand: None,
        });
        self
    }

    pub fn with_child(mut self, child: Construct) -> Self {
        self.children.push(child);
        self
    }

    /// `Name` trait wins over the `name` field.
    pub fn display_name(&self) -> Option<&str> {
        trait_str(self, TraitId::Name).or(self.name.as_deref())
    }
}

pub fn load_descriptor_from_path(path: impl AsRef<std::path::Path>) -> Result<Construct> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read descriptor json at {}", path.display()))?;
    parse_descriptor(&text).with_context(|| format!("invalid descriptor in {}", path.display()))
}

pub fn parse_descriptor(text: &str) -> Result<Construct> {
    let root: Construct = serde_json::from_str(text).context("failed to parse descriptor json")?;
    if root.kind != ConstructKind::Material {
        bail!("descriptor root must be a Material construct, got {:?}", root.kind);
    }
    Ok(root)
}

pub fn find_trait(construct: &Construct, id: TraitId) -> Option<&TraitEntry> {
    construct.traits.iter().find(|t| t.id == id)
}

pub fn trait_value(construct: &Construct, id: TraitId) -> Option<&serde_json::Value> {
    find_trait(construct, id).and_then(|t| t.value.as_ref())
}

pub fn trait_f64(construct: &Construct, id: TraitId) -> Option<f64> {
    trait_value(construct, id).and_then(|v| {
        v.as_f64()
            .or_else(|| v.as_u64().map(|x| x as f64))
            .or_else(|| v.as_i64().map(|x| x as f64))
    })
}

pub fn trait_str(construct: &Construct, id: TraitId) -> Option<&str> {
    trait_value(construct, id).and_then(|v| v.as_str())
}

pub fn trait_bool(construct: &Construct, id: TraitId) -> Option<bool> {
    trait_value(construct, id).and_then(|v| v.as_bool())
}

/// Read a numeric vector. A single number splats to every component.
pub fn trait_vec<const N: usize>(construct: &Construct, id: TraitId) -> Result<Option<[f32; N]>> {
    let Some(value) = trait_value(construct, id) else {
        return Ok(None);
    };
    json_vec(value)
        .map(Some)
        .with_context(|| format!("trait {} of {:?}", id.name(), construct.kind))
}

pub fn json_vec<const N: usize>(value: &serde_json::Value) -> Result<[f32; N]> {
    if let Some(x) = value.as_f64() {
        return Ok([x as f32; N]);
    }
    let items = value
        .as_array()
        .ok_or_else(|| anyhow!("expected a number or an array of {N} numbers, got {value}"))?;
    if items.len() != N {
        bail!("expected {N} components, got {}", items.len());
    }
    let mut out = [0.0f32; N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item
            .as_f64()
            .ok_or_else(|| anyhow!("non-numeric component {item}"))? as f32;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_nested_constructs() {
        let root = parse_descriptor(
            r#"{
                "type": "Material",
                "traits": [{ "trait": "Version", "value": 460 }],
                "children": [
                    {
                        "type": "Scene",
                        "name": "stage",
                        "children": [
                            { "type": "Geometry", "name": "box", "traits": [{ "trait": "Scale", "value": 2.0 }] }
                        ]
                    },
                    {
                        "type": "Value",
                        "traits": [{ "trait": "Color", "type": "vec4", "value": [1, 0, 0, 1] }],
                        "verbs": [{ "verb": "Multiply", "value": 0.5 }, { "verb": "Add", "trait": "Time" }]
                    }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(trait_f64(&root, TraitId::Version), Some(460.0));
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].display_name(), Some("stage"));
        assert_eq!(root.children[0].children[0].kind, ConstructKind::Geometry);

        let value = &root.children[1];
        assert_eq!(value.traits[0].ty, Some(DataType::Vec4));
        assert_eq!(value.verbs[0].verb, Verb::Multiply);
        assert_eq!(value.verbs[1].operand, Some(TraitId::Time));
    }

    #[test]
    fn rejects_non_material_roots() {
        let err = parse_descriptor(r#"{ "type": "Scene" }"#).unwrap_err();
        assert!(format!("{err:#}").contains("Material"));
    }

    #[test]
    fn vectors_accept_splats_and_arrays() {
        let c = Construct::new(ConstructKind::Geometry)
            .with_trait(TraitId::Scale, json!(2.0))
            .with_trait(TraitId::Position, json!([1.0, 2.0, 3.0]));
        assert_eq!(trait_vec::<3>(&c, TraitId::Scale).unwrap(), Some([2.0; 3]));
        assert_eq!(
            trait_vec::<3>(&c, TraitId::Position).unwrap(),
            Some([1.0, 2.0, 3.0])
        );
        assert_eq!(trait_vec::<3>(&c, TraitId::Rotation).unwrap(), None);
        assert!(trait_vec::<2>(&c, TraitId::Position).is_err());
    }
}
