//! Rank conversion between GLSL vector, scalar and matrix expressions, and
//! literal formatting for descriptor values.

use anyhow::{Result, bail};

use super::error::GenerateError;
use super::types::{DataType, Family};
use super::utils::{fmt_float, paren};

const SWIZZLE: [&str; 4] = ["x", "xy", "xyz", "xyzw"];

/// Rewrite `expr` (of type `from`) so that it has type `to`.
///
/// Vectors shrink with a leading swizzle and grow by padding with `filler`,
/// except that the fourth component of a `vec4` is always `1.0`. Matrices
/// shrink through the GLSL constructor and grow into an identity-like matrix
/// with `filler` on the new diagonal and `1.0` in the last slot. Vector and
/// matrix ranks never convert into each other.
pub fn convert_symbol(expr: &str, from: DataType, to: DataType, filler: &str) -> Result<String> {
    if from == to {
        return Ok(expr.to_string());
    }
    let from = from.decay()?;
    let to = to.decay()?;
    if from == to {
        return Ok(expr.to_string());
    }

    if let (Some((from_family, n)), Some((to_family, m))) = (from.vector_shape(), to.vector_shape())
    {
        return Ok(convert_vector(expr, from_family, n, to, to_family, m, filler));
    }

    if let (Some((_, a)), Some((_, b))) = (from.matrix_shape(), to.matrix_shape()) {
        let target = to.glsl_name()?;
        if b <= a {
            return Ok(format!("{target}({expr})"));
        }
        return Ok(grow_matrix(expr, target, a, b, filler));
    }

    bail!(GenerateError::Config(format!(
        "cannot convert {from:?} to {to:?}"
    )))
}

fn convert_vector(
    expr: &str,
    from_family: Family,
    n: usize,
    to: DataType,
    to_family: Family,
    m: usize,
    filler: &str,
) -> String {
    // `to` is always a GLSL type here since both sides are decayed vectors.
    let target = to.glsl().unwrap_or("vec4");
    if n > m {
        let swizzled = format!("{}.{}", paren(expr), SWIZZLE[m - 1]);
        if from_family == to_family {
            swizzled
        } else {
            format!("{target}({swizzled})")
        }
    } else if n < m {
        let mut parts = vec![expr.to_string()];
        for component in n..m {
            if m == 4 && component == 3 {
                parts.push("1.0".to_string());
            } else {
                parts.push(filler.to_string());
            }
        }
        format!("{target}({})", parts.join(", "))
    } else {
        format!("{target}({expr})")
    }
}

fn grow_matrix(expr: &str, target: &str, a: usize, b: usize, filler: &str) -> String {
    let base = paren(expr);
    let columns: Vec<String> = (0..b)
        .map(|c| {
            let mut parts = Vec::with_capacity(b);
            if c < a {
                parts.push(format!("{base}[{c}]"));
                parts.extend((a..b).map(|_| "0.0".to_string()));
            } else {
                for r in 0..b {
                    let v = if r != c {
                        "0.0"
                    } else if c == b - 1 {
                        "1.0"
                    } else {
                        filler
                    };
                    parts.push(v.to_string());
                }
            }
            format!("vec{b}({})", parts.join(", "))
        })
        .collect();
    format!("{target}({})", columns.join(", "))
}

/// Format a descriptor JSON value as a GLSL literal.
///
/// Numbers become scalars (or splats when `ty` is a vector), arrays of 2-4
/// numbers become vectors, arrays of 4/9/16 numbers become matrices when
/// `ty` asks for one. Without `ty` the type is inferred from the shape.
pub fn json_literal(value: &serde_json::Value, ty: Option<DataType>) -> Result<(String, DataType)> {
    use serde_json::Value;

    match value {
        Value::Bool(b) => Ok((b.to_string(), DataType::Bool)),
        Value::Number(n) => {
            let v = n.as_f64().unwrap_or(0.0);
            let ty = ty.unwrap_or(DataType::Float);
            let literal = match ty {
                DataType::Int => format!("{}", v as i64),
                DataType::UInt => format!("{}u", v.max(0.0) as u64),
                DataType::Bool => (v != 0.0).to_string(),
                DataType::Double => format!("{}lf", fmt_float(v)),
                DataType::Float => fmt_float(v),
                other => {
                    let name = other.decay()?.glsl_name()?;
                    format!("{name}({})", fmt_float(v))
                }
            };
            Ok((literal, ty))
        }
        Value::Array(items) => {
            let mut components = Vec::with_capacity(items.len());
            for item in items {
                let Some(v) = item.as_f64() else {
                    bail!(GenerateError::Config(format!(
                        "non-numeric component {item} in vector literal"
                    )));
                };
                components.push(v);
            }
            let ty = match ty {
                Some(ty) => ty.decay()?,
                None => match components.len() {
                    1 => DataType::Float,
                    2 => DataType::Vec2,
                    3 => DataType::Vec3,
                    4 => DataType::Vec4,
                    9 => DataType::Mat3,
                    16 => DataType::Mat4,
                    n => bail!(GenerateError::Config(format!(
                        "cannot infer a GLSL type for {n} components"
                    ))),
                },
            };
            let expected = match (ty.vector_shape(), ty.matrix_shape()) {
                (Some((_, n)), _) => n,
                (_, Some((_, n))) => n * n,
                _ => bail!(GenerateError::Config(format!(
                    "{ty:?} cannot be written as a literal"
                ))),
            };
            if components.len() != expected {
                bail!(GenerateError::Config(format!(
                    "{ty:?} literal needs {expected} components, got {}",
                    components.len()
                )));
            }
            let parts: Vec<String> = components.into_iter().map(fmt_float).collect();
            if expected == 1 {
                return Ok((parts.join(""), ty));
            }
            Ok((format!("{}({})", ty.glsl_name()?, parts.join(", ")), ty))
        }
        other => bail!(GenerateError::Config(format!(
            "value {other} is not a GLSL literal"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vectors_shrink_with_leading_swizzle() {
        assert_eq!(convert_symbol("p", DataType::Vec4, DataType::Vec3, "0.0").unwrap(), "p.xyz");
        assert_eq!(convert_symbol("p", DataType::Vec4, DataType::Vec2, "0.0").unwrap(), "p.xy");
        assert_eq!(convert_symbol("p", DataType::Vec4, DataType::Float, "0.0").unwrap(), "p.x");
        assert_eq!(
            convert_symbol("a + b", DataType::Vec3, DataType::Vec2, "0.0").unwrap(),
            "(a + b).xy"
        );
    }

    #[test]
    fn vectors_grow_with_filler_and_homogeneous_w() {
        assert_eq!(
            convert_symbol("p", DataType::Vec2, DataType::Vec4, "0.0").unwrap(),
            "vec4(p, 0.0, 1.0)"
        );
        assert_eq!(
            convert_symbol("p", DataType::Vec3, DataType::Vec4, "0.5").unwrap(),
            "vec4(p, 1.0)"
        );
        assert_eq!(
            convert_symbol("x", DataType::Float, DataType::Vec3, "0.0").unwrap(),
            "vec3(x, 0.0, 0.0)"
        );
    }

    #[test]
    fn matrices_shrink_and_grow() {
        assert_eq!(convert_symbol("m", DataType::Mat4, DataType::Mat3, "0.0").unwrap(), "mat3(m)");
        assert_eq!(
            convert_symbol("m", DataType::Mat2, DataType::Mat4, "0.0").unwrap(),
            "mat4(vec4(m[0], 0.0, 0.0), vec4(m[1], 0.0, 0.0), \
             vec4(0.0, 0.0, 0.0, 0.0), vec4(0.0, 0.0, 0.0, 1.0))"
        );
        assert_eq!(
            convert_symbol("m", DataType::Mat3, DataType::Mat4, "1.0").unwrap(),
            "mat4(vec4(m[0], 0.0), vec4(m[1], 0.0), vec4(m[2], 0.0), vec4(0.0, 0.0, 0.0, 1.0))"
        );
    }

    #[test]
    fn family_changes_wrap_in_target_constructor() {
        assert_eq!(convert_symbol("i", DataType::IVec3, DataType::Vec3, "0.0").unwrap(), "i");
        assert_eq!(
            convert_symbol("d", DataType::DVec4, DataType::Vec2, "0.0").unwrap(),
            "vec2(d.xy)"
        );
        assert_eq!(convert_symbol("q", DataType::Quat, DataType::Vec3, "0.0").unwrap(), "q.xyz");
    }

    #[test]
    fn rank_kinds_never_mix() {
        let err = convert_symbol("m", DataType::Mat4, DataType::Vec4, "0.0").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<GenerateError>(),
            Some(GenerateError::Config(_))
        ));
        assert!(convert_symbol("v", DataType::Vec3, DataType::Mat3, "0.0").is_err());
        assert!(convert_symbol("t", DataType::Sampler2D, DataType::Vec4, "0.0").is_err());
    }

    #[test]
    fn json_values_become_literals() {
        assert_eq!(json_literal(&json!(2), None).unwrap(), ("2.0".to_string(), DataType::Float));
        assert_eq!(
            json_literal(&json!([1, 0, 0, 1]), None).unwrap(),
            ("vec4(1.0, 0.0, 0.0, 1.0)".to_string(), DataType::Vec4)
        );
        assert_eq!(
            json_literal(&json!(0.5), Some(DataType::Vec3)).unwrap().0,
            "vec3(0.5)"
        );
        assert_eq!(json_literal(&json!(3), Some(DataType::Int)).unwrap().0, "3");
        assert!(json_literal(&json!([1, 2]), Some(DataType::Vec3)).is_err());
        assert!(json_literal(&json!("red"), None).is_err());
    }
}
