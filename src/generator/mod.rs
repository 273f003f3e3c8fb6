//! GLSL material generator.
//!
//! A [`Material`] owns a tree of nodes built from a descriptor and one GLSL
//! buffer per shader stage. Generating the material walks the tree, lets each
//! node commit code at named insertion points, and finally declares every
//! input, output and uniform the committed code refers to.
//!
//! This module is organized into several submodules:
//! - `types`: stages, rates, data types, traits and symbols
//! - `glsl`: stage templates, insertion tokens and the `GlslBuffer`
//! - `material`: the tree root and the auto-complete pass
//! - `node`: tree storage, hierarchy search and cross-stage bridging
//! - `node_compiler`: per-kind node construction and generation
//! - `convert`: rank conversion between GLSL expressions
//! - `shadertoy`: wrapping a Shadertoy `mainImage` as a material
//! - `validation`: GLSL validation using naga

pub mod convert;
pub mod defaults;
pub mod error;
pub mod glsl;
pub mod material;
pub mod node;
pub mod node_compiler;
pub mod shadertoy;
pub mod types;
pub mod utils;
pub mod validation;

pub use error::GenerateError;
pub use glsl::{GlslBuffer, GlslLiteral, Token};
pub use material::{Binding, Material};
pub use node::{Fallback, NodeId};
pub use types::{DataType, Rate, ShaderStage, Symbol, Trait, TraitId};
pub use validation::{validate_glsl, validate_material};
