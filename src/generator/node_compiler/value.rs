//! Value nodes wrap one trait and rewrite its expression with arithmetic
//! verbs, exposing the result under the same trait.

use anyhow::{Context, Result, bail};

use crate::dsl::{Construct, Verb, VerbEntry};
use crate::generator::convert::{convert_symbol, json_literal};
use crate::generator::defaults;
use crate::generator::error::GenerateError;
use crate::generator::glsl::Token;
use crate::generator::material::Material;
use crate::generator::node::{Fallback, NodeId};
use crate::generator::types::{DataType, Family, Rate, ShaderStage, Symbol, Trait, TraitId};
use crate::generator::utils::paren;

use super::noise;

/// Descriptor-only traits that never name the wrapped value.
const SETTINGS: [TraitId; 3] = [TraitId::Rate, TraitId::Name, TraitId::Parent];

#[derive(Debug, Clone, PartialEq)]
pub struct ValueNode {
    /// The wrapped trait; a `value` makes it a literal, otherwise it is
    /// looked up in the hierarchy.
    pub key: Trait,
    pub verbs: Vec<VerbEntry>,
}

impl ValueNode {
    pub fn from_descriptor(construct: &Construct) -> Result<Self> {
        let Some(entry) = construct
            .traits
            .iter()
            .find(|t| !SETTINGS.contains(&t.id))
        else {
            bail!(GenerateError::Config(
                "value node needs a trait to wrap".to_string()
            ));
        };
        let key = entry.to_trait();
        for verb in &construct.verbs {
            if verb.value.is_none() && verb.operand.is_none() && verb.verb != Verb::Randomize {
                bail!(GenerateError::Config(format!(
                    "{:?} needs a value or a trait operand",
                    verb.verb
                )));
            }
        }
        Ok(Self {
            key,
            verbs: construct.verbs.clone(),
        })
    }
}

/// A GLSL expression with its type.
#[derive(Debug, Clone, PartialEq)]
struct Expr {
    code: String,
    ty: DataType,
    /// Top-level operator is `*` or `/`, so further factors need no parentheses.
    product: bool,
}

impl Expr {
    fn new(code: String, ty: DataType) -> Self {
        Self {
            code,
            ty,
            product: false,
        }
    }
}

fn width(ty: DataType) -> usize {
    ty.vector_shape().map(|(_, n)| n).unwrap_or(0)
}

fn operand(mat: &mut Material, id: NodeId, rate: Rate, verb: &VerbEntry) -> Result<Expr> {
    if let Some(trait_id) = verb.operand {
        let symbol = mat
            .get_value(id, &Trait::new(trait_id), rate, Fallback::Input)?
            .ok_or_else(|| {
                GenerateError::config(format!("no {} operand for {:?}", trait_id.name(), verb.verb))
            })?;
        return Ok(Expr::new(symbol.expr, symbol.ty.decay()?));
    }
    let value = verb.value.as_ref().ok_or_else(|| {
        GenerateError::config(format!("{:?} needs a value or a trait operand", verb.verb))
    })?;
    let (code, ty) = json_literal(value, None)?;
    Ok(Expr::new(code, ty))
}

/// Match an operand's rank to the running expression; scalars broadcast.
fn align(rhs: Expr, lhs: DataType) -> Result<String> {
    if width(rhs.ty) == 1 || rhs.ty == lhs {
        return Ok(paren(&rhs.code));
    }
    convert_symbol(&rhs.code, rhs.ty, lhs, "0.0").map(|c| paren(&c))
}

fn select(expr: &Expr, verb: &VerbEntry) -> Result<Expr> {
    let swizzle = match &verb.value {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(v) if v.is_u64() => {
            let index = v.as_u64().unwrap_or(0) as usize;
            ["x", "y", "z", "w"]
                .get(index)
                .map(|c| c.to_string())
                .unwrap_or_default()
        }
        _ => String::new(),
    };
    let valid = (1..=4).contains(&swizzle.len())
        && (swizzle.chars().all(|c| "xyzw".contains(c)) || swizzle.chars().all(|c| "rgba".contains(c)));
    let (family, n) = expr.ty.vector_shape().unwrap_or((Family::Float, 0));
    let in_range = swizzle
        .chars()
        .all(|c| "xyzw".find(c).or_else(|| "rgba".find(c)).is_some_and(|i| i < n));
    if !valid || !in_range || n < 2 {
        bail!(GenerateError::Config(format!(
            "cannot select '{swizzle}' from a {:?}",
            expr.ty
        )));
    }
    let ty = DataType::vector(family, swizzle.len()).ok_or_else(|| {
        GenerateError::config(format!("no {family:?} vector of {} components", swizzle.len()))
    })?;
    Ok(Expr::new(format!("{}.{swizzle}", paren(&expr.code)), ty))
}

fn project(expr: &Expr, matrix: Expr) -> Result<Expr> {
    let Some((_, dim)) = matrix.ty.matrix_shape() else {
        bail!(GenerateError::Config(format!(
            "Project needs a matrix operand, got {:?}",
            matrix.ty
        )));
    };
    let ty = DataType::vector(Family::Float, dim).unwrap_or(DataType::Vec4);
    let vector = convert_symbol(&expr.code, expr.ty, ty, "0.0")?;
    Ok(Expr::new(format!("({} * {vector})", paren(&matrix.code)), ty))
}

fn randomize(mat: &mut Material, stage: ShaderStage, expr: &Expr, seed: Option<Expr>) -> Result<Expr> {
    let n = width(expr.ty);
    let (dimensions, point) = match n {
        1 => (2, format!("vec2({}, 0.0)", expr.code)),
        2 => (2, expr.code.clone()),
        3 => (3, expr.code.clone()),
        4 => (3, format!("{}.xyz", paren(&expr.code))),
        _ => bail!(GenerateError::Config(format!(
            "cannot randomize a {:?}",
            expr.ty
        ))),
    };
    let point = match seed {
        Some(seed) => format!("{} + {}", point, paren(&seed.code)),
        None => point,
    };
    let function = noise::ensure_simplex(mat, stage, dimensions)?;
    Ok(Expr::new(format!("{function}({point})"), DataType::Float))
}

pub fn generate(mat: &mut Material, id: NodeId, node: &ValueNode) -> Result<()> {
    mat.descend(id)?;
    let n = id.index();
    let stage = mat.node_stage(id)?;
    let rate = stage.rate();

    let mut expr = match &node.key.value {
        Some(value) => {
            let ty = node
                .key
                .ty
                .or_else(|| defaults::default_for(node.key.id).map(|d| d.ty));
            let (code, ty) = json_literal(value, ty)
                .with_context(|| format!("value of {}", node.key.id.name()))?;
            Expr::new(code, ty)
        }
        None => {
            let symbol = mat
                .get_value(id, &node.key, rate, Fallback::Input)?
                .ok_or_else(|| GenerateError::config(format!("no {} to wrap", node.key.id.name())))?;
            Expr::new(symbol.expr, symbol.ty)
        }
    };
    expr.ty = expr.ty.decay()?;

    for verb in &node.verbs {
        expr = match verb.verb {
            Verb::Add | Verb::Subtract | Verb::Multiply | Verb::Divide => {
                let op = match verb.verb {
                    Verb::Add => "+",
                    Verb::Subtract => "-",
                    Verb::Multiply => "*",
                    _ => "/",
                };
                let rhs = align(operand(mat, id, rate, verb)?, expr.ty)?;
                let product = matches!(verb.verb, Verb::Multiply | Verb::Divide);
                // Products keep accumulating without nesting parentheses.
                let lhs = if product && expr.product {
                    expr.code.clone()
                } else {
                    paren(&expr.code)
                };
                Expr {
                    code: format!("{lhs} {op} {rhs}"),
                    ty: expr.ty,
                    product,
                }
            }
            Verb::Modulate => {
                let rhs = align(operand(mat, id, rate, verb)?, expr.ty)?;
                Expr::new(format!("mod({}, {rhs})", expr.code), expr.ty)
            }
            Verb::Exponent => {
                let rhs = operand(mat, id, rate, verb)?;
                // pow() takes matching ranks, so scalars splat.
                let rhs = if width(rhs.ty) == 1 && width(expr.ty) > 1 {
                    format!("{}({})", expr.ty.glsl_name()?, rhs.code)
                } else {
                    align(rhs, expr.ty)?
                };
                Expr::new(format!("pow({}, {rhs})", expr.code), expr.ty)
            }
            Verb::Randomize => {
                let seed = match (&verb.value, verb.operand) {
                    (None, None) => None,
                    _ => Some(operand(mat, id, rate, verb)?),
                };
                randomize(mat, stage, &expr, seed)?
            }
            Verb::Select => select(&expr, verb)?,
            Verb::Project => {
                let matrix = operand(mat, id, rate, verb)?;
                project(&expr, matrix)?
            }
        };
    }

    let ty_name = expr.ty.glsl_name()?;
    mat.commit(
        stage,
        Token::main_body(stage),
        &format!("{ty_name} value{n} = {};", expr.code),
    )?;
    mat.expose(
        id,
        Trait::typed(node.key.id, expr.ty),
        Symbol::new(format!("value{n}"), expr.ty, rate),
    );
    Ok(())
}
