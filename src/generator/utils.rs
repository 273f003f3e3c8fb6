//! Small formatting and matching helpers shared by the generator.

/// Format a number as a GLSL float literal.
///
/// Always keeps a decimal point so the literal stays `float` (`1.0`, not `1`).
pub fn fmt_float(v: f64) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let s = format!("{v}");
    if s.contains('.') { s } else { format!("{s}.0") }
}

pub fn fmt_f32(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let s = format!("{v}");
    if s.contains('.') { s } else { format!("{s}.0") }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']')
}

/// True when `expr` can take a swizzle or index without extra parentheses:
/// a plain (possibly dotted or indexed) name, or a single call such as
/// `vec3(a, b, c)`.
pub fn is_simple_expr(expr: &str) -> bool {
    if expr.is_empty() {
        return false;
    }
    if expr.chars().all(is_name_char) {
        return true;
    }
    let Some(open) = expr.find('(') else {
        return false;
    };
    if open == 0 || !expr[..open].chars().all(is_name_char) || !expr.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    for (i, c) in expr[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return open + i == expr.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Wrap `expr` in parentheses unless it is already atomic.
pub fn paren(expr: &str) -> String {
    if is_simple_expr(expr) {
        expr.to_string()
    } else {
        format!("({expr})")
    }
}

/// Match `text` against `pattern`, where `*` matches any (possibly empty)
/// run of characters. Everything else must match literally.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while ti < t.len() {
        if pi < p.len() && p[pi] != '*' && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            resume = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            resume += 1;
            ti = resume;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floats_keep_a_decimal_point() {
        assert_eq!(fmt_float(1.0), "1.0");
        assert_eq!(fmt_float(0.0625), "0.0625");
        assert_eq!(fmt_float(-2.5), "-2.5");
        assert_eq!(fmt_float(f64::NAN), "0.0");
        assert_eq!(fmt_f32(3.0), "3.0");
        assert_eq!(fmt_f32(0.5), "0.5");
    }

    #[test]
    fn wildcard_matches_star_runs() {
        assert!(wildcard_match("*void*main*(*)*", "void main() {}"));
        assert!(wildcard_match("a*c", "abbbc"));
        assert!(wildcard_match("*", ""));
        assert!(!wildcard_match("a*c", "abd"));
        assert!(!wildcard_match("*mainImage*", "void main() {}"));
    }

    #[test]
    fn paren_leaves_plain_names_alone() {
        assert_eq!(paren("Camera.View"), "Camera.View");
        assert_eq!(paren("a + b"), "(a + b)");
        assert_eq!(paren("arr[2]"), "arr[2]");
        assert_eq!(paren("vec3(a, b)"), "vec3(a, b)");
        assert_eq!(paren("f(a) + g(b)"), "(f(a) + g(b))");
        assert_eq!(paren("-1.0"), "(-1.0)");
    }
}
