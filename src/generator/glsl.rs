//! GLSL text buffer with token-indexed insertion points.
//!
//! Every stage buffer starts from a per-stage template made of placeholder
//! tokens (`#VERSION`, `#DEFINES`, `#INPUT`, ...). Code inserted at a token
//! is placed right before the token's line, so the token always marks the
//! current end of its section and consecutive insertions keep their order.
//! Tokens are stripped when the final source is produced.

use std::ops::{Add, AddAssign, Shr};

use glam::{Mat2, Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

use super::types::ShaderStage;
use super::utils::{fmt_f32, fmt_float};

/// Named insertion point inside a stage template.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Token {
    Version,
    Defines,
    Input,
    Output,
    Uniform,
    Functions,
    Texturize,
    Colorize,
    Transform,
    Position,
}

impl Token {
    pub const ALL: [Token; 10] = [
        Token::Version,
        Token::Defines,
        Token::Input,
        Token::Output,
        Token::Uniform,
        Token::Functions,
        Token::Texturize,
        Token::Colorize,
        Token::Transform,
        Token::Position,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Token::Version => "#VERSION",
            Token::Defines => "#DEFINES",
            Token::Input => "#INPUT",
            Token::Output => "#OUTPUT",
            Token::Uniform => "#UNIFORM",
            Token::Functions => "#FUNCTIONS",
            Token::Texturize => "#TEXTURIZE",
            Token::Colorize => "#COLORIZE",
            Token::Transform => "#TRANSFORM",
            Token::Position => "#POSITION",
        }
    }

    /// Token that receives per-invocation code inside `main()` for a stage.
    pub fn main_body(stage: ShaderStage) -> Token {
        match stage {
            ShaderStage::Pixel => Token::Texturize,
            _ => Token::Transform,
        }
    }
}

const VERTEX_TEMPLATE: &str = "#VERSION
#DEFINES
#INPUT
#OUTPUT
#UNIFORM
#FUNCTIONS

void main () {
    #TRANSFORM
    #POSITION
    #COLORIZE
}
";

const PRIMITIVE_TEMPLATE: &str = "#VERSION
#DEFINES
#INPUT
#OUTPUT
#UNIFORM
#FUNCTIONS

void main () {
    #TRANSFORM
    #POSITION
    #COLORIZE
}
";

const PIXEL_TEMPLATE: &str = "#VERSION
#DEFINES
#INPUT
#OUTPUT
#UNIFORM
#FUNCTIONS

void main () {
    #TEXTURIZE
    #COLORIZE
}
";

const COMPUTE_TEMPLATE: &str = "#VERSION
#DEFINES
layout(local_size_x = 1, local_size_y = 1, local_size_z = 1) in;
#INPUT
#OUTPUT
#UNIFORM
#FUNCTIONS

void main () {
    #TRANSFORM
    #COLORIZE
}
";

/// Static GLSL type name and literal formatting for host values.
pub trait GlslLiteral {
    fn glsl_type() -> &'static str
    where
        Self: Sized;

    fn to_glsl(&self) -> String;
}

impl GlslLiteral for f32 {
    fn glsl_type() -> &'static str {
        "float"
    }
    fn to_glsl(&self) -> String {
        fmt_f32(*self)
    }
}

impl GlslLiteral for f64 {
    fn glsl_type() -> &'static str {
        "double"
    }
    fn to_glsl(&self) -> String {
        format!("{}lf", fmt_float(*self))
    }
}

impl GlslLiteral for i32 {
    fn glsl_type() -> &'static str {
        "int"
    }
    fn to_glsl(&self) -> String {
        self.to_string()
    }
}

impl GlslLiteral for u32 {
    fn glsl_type() -> &'static str {
        "uint"
    }
    fn to_glsl(&self) -> String {
        format!("{self}u")
    }
}

impl GlslLiteral for bool {
    fn glsl_type() -> &'static str {
        "bool"
    }
    fn to_glsl(&self) -> String {
        self.to_string()
    }
}

impl GlslLiteral for &str {
    fn glsl_type() -> &'static str {
        ""
    }
    fn to_glsl(&self) -> String {
        (*self).to_string()
    }
}

impl GlslLiteral for String {
    fn glsl_type() -> &'static str {
        ""
    }
    fn to_glsl(&self) -> String {
        self.clone()
    }
}

fn components(ty: &str, values: &[f32]) -> String {
    let parts: Vec<String> = values.iter().copied().map(fmt_f32).collect();
    format!("{ty}({})", parts.join(", "))
}

impl GlslLiteral for Vec2 {
    fn glsl_type() -> &'static str {
        "vec2"
    }
    fn to_glsl(&self) -> String {
        components("vec2", &self.to_array())
    }
}

impl GlslLiteral for Vec3 {
    fn glsl_type() -> &'static str {
        "vec3"
    }
    fn to_glsl(&self) -> String {
        components("vec3", &self.to_array())
    }
}

impl GlslLiteral for Vec4 {
    fn glsl_type() -> &'static str {
        "vec4"
    }
    fn to_glsl(&self) -> String {
        components("vec4", &self.to_array())
    }
}

/// Quaternions travel as `vec4(x, y, z, w)`.
impl GlslLiteral for Quat {
    fn glsl_type() -> &'static str {
        "vec4"
    }
    fn to_glsl(&self) -> String {
        components("vec4", &self.to_array())
    }
}

impl GlslLiteral for Mat2 {
    fn glsl_type() -> &'static str {
        "mat2"
    }
    fn to_glsl(&self) -> String {
        components("mat2", &self.to_cols_array())
    }
}

impl GlslLiteral for Mat3 {
    fn glsl_type() -> &'static str {
        "mat3"
    }
    fn to_glsl(&self) -> String {
        components("mat3", &self.to_cols_array())
    }
}

impl GlslLiteral for Mat4 {
    fn glsl_type() -> &'static str {
        "mat4"
    }
    fn to_glsl(&self) -> String {
        components("mat4", &self.to_cols_array())
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Byte index of the first keyword-delimited occurrence of `symbol` in `text`.
///
/// Unlike substring search, an occurrence only counts when the characters
/// around it cannot extend the identifier: `time` is found in `a time b`,
/// `(time)` and `time;`, but not in `timer` or `_time`. On the left side of a
/// symbol that starts with a letter a digit also counts as a boundary.
/// Boundaries are only checked where the symbol itself begins or ends with an
/// identifier character, so `#define X` style symbols work too.
pub fn find_keyword(text: &str, symbol: &str) -> Option<usize> {
    if symbol.is_empty() {
        return None;
    }
    let first = symbol.chars().next()?;
    let last = symbol.chars().next_back()?;

    for (pos, _) in text.match_indices(symbol) {
        if is_ident_char(first) {
            if let Some(left) = text[..pos].chars().next_back() {
                let digit_ok = first.is_ascii_alphabetic() && left.is_ascii_digit();
                if is_ident_char(left) && !digit_ok {
                    continue;
                }
            }
        }
        if is_ident_char(last) {
            if let Some(right) = text[pos + symbol.len()..].chars().next() {
                if is_ident_char(right) {
                    continue;
                }
            }
        }
        return Some(pos);
    }
    None
}

/// A stage's GLSL source under construction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlslBuffer {
    text: String,
}

impl GlslBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_template(stage: ShaderStage) -> Self {
        Self {
            text: Self::template(stage).to_string(),
        }
    }

    /// Canonical skeleton for a stage.
    pub fn template(stage: ShaderStage) -> &'static str {
        match stage {
            ShaderStage::Vertex => VERTEX_TEMPLATE,
            ShaderStage::Geometry | ShaderStage::TessCtrl | ShaderStage::TessEval => {
                PRIMITIVE_TEMPLATE
            }
            ShaderStage::Pixel => PIXEL_TEMPLATE,
            ShaderStage::Compute => COMPUTE_TEMPLATE,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn find_keyword(&self, symbol: &str) -> Option<usize> {
        find_keyword(&self.text, symbol)
    }

    pub fn has_token(&self, token: Token) -> bool {
        self.find_keyword(token.as_str()).is_some()
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.find_keyword(&format!("#define {name}")).is_some()
    }

    /// Insert `#define text` once; repeated calls leave the buffer unchanged.
    pub fn define(&mut self, text: &str) {
        let line = format!("#define {text}");
        if self.find_keyword(&line).is_some() {
            return;
        }
        self.insert(Token::Defines, &line);
    }

    /// Stamp `#version v` once. A buffer that already carries a version keeps it.
    pub fn set_version(&mut self, version: u32) {
        if self.find_keyword("#version").is_some() {
            return;
        }
        self.insert(Token::Version, &format!("#version {version}"));
    }

    pub fn select(&mut self, token: Token) -> Selection<'_> {
        Selection {
            buffer: self,
            token,
            pending: String::new(),
        }
    }

    /// Append `code` at `token`, after everything inserted there before.
    ///
    /// Each inserted line takes the token's indentation. Returns `false` (and
    /// leaves the buffer untouched) when the token is not part of this buffer.
    pub fn insert(&mut self, token: Token, code: &str) -> bool {
        let Some(pos) = self.find_keyword(token.as_str()) else {
            log::debug!("token {} absent, insertion dropped", token.as_str());
            return false;
        };
        let line_start = self.text[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0);
        let pad = self.text[line_start..pos].to_string();

        let mut block = String::new();
        for line in code.trim_end_matches('\n').split('\n') {
            if line.trim().is_empty() {
                block.push('\n');
            } else {
                block.push_str(&pad);
                block.push_str(line.trim_end());
                block.push('\n');
            }
        }
        self.text.insert_str(line_start, &block);
        true
    }

    /// Final source: the buffer with every placeholder token line removed.
    pub fn compiled(&self) -> String {
        if self.text.is_empty() {
            return String::new();
        }
        let mut out = String::with_capacity(self.text.len());
        for line in self.text.split_inclusive('\n') {
            let trimmed = line.trim();
            if Token::ALL.iter().any(|t| t.as_str() == trimmed) {
                continue;
            }
            out.push_str(line);
        }
        out
    }

    /// Line-numbered rendering for diagnostics. Keeps every line (including a
    /// trailing empty one) so the numbering matches the source exactly.
    pub fn pretty(&self) -> String {
        pretty(&self.text)
    }
}

pub fn pretty(source: &str) -> String {
    let lines: Vec<&str> = source.split('\n').collect();
    let width = lines.len().to_string().len();
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>width$} | {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Insertion cursor returned by [`GlslBuffer::select`].
///
/// Chained `>>` operands are concatenated and inserted at the token as one
/// piece when the selection is dropped.
pub struct Selection<'a> {
    buffer: &'a mut GlslBuffer,
    token: Token,
    pending: String,
}

impl<'a, T: GlslLiteral> Shr<T> for Selection<'a> {
    type Output = Selection<'a>;

    fn shr(mut self, rhs: T) -> Selection<'a> {
        self.pending.push_str(&rhs.to_glsl());
        self
    }
}

impl Drop for Selection<'_> {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            self.buffer.insert(self.token, &self.pending);
        }
    }
}

impl<T: GlslLiteral> Add<T> for GlslBuffer {
    type Output = GlslBuffer;

    fn add(mut self, rhs: T) -> GlslBuffer {
        self.text.push_str(&rhs.to_glsl());
        self
    }
}

impl<T: GlslLiteral> AddAssign<T> for GlslBuffer {
    fn add_assign(&mut self, rhs: T) {
        self.text.push_str(&rhs.to_glsl());
    }
}

impl std::fmt::Display for GlslBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keyword_search_respects_identifier_boundaries() {
        assert_eq!(find_keyword("a time b", "time"), Some(2));
        assert_eq!(find_keyword("(time)", "time"), Some(1));
        assert_eq!(find_keyword("time;", "time"), Some(0));
        assert_eq!(find_keyword("x = Tick.Time * 2.0", "Tick.Time"), Some(4));
        assert_eq!(find_keyword("timer", "time"), None);
        assert_eq!(find_keyword("time2", "time"), None);
        assert_eq!(find_keyword("_time", "time"), None);
        assert_eq!(find_keyword("mytime", "time"), None);
        assert_eq!(find_keyword("", "time"), None);
        assert_eq!(find_keyword("anything", ""), None);
    }

    #[test]
    fn keyword_search_skips_embedded_hits_and_finds_later_ones() {
        assert_eq!(find_keyword("timer + time", "time"), Some(8));
    }

    #[test]
    fn digit_on_the_left_of_a_letter_symbol_is_a_boundary() {
        assert_eq!(find_keyword("2time", "time"), Some(1));
    }

    #[test]
    fn insert_appends_in_order_with_token_indentation() {
        let mut buffer = GlslBuffer::from_template(ShaderStage::Pixel);
        assert!(buffer.insert(Token::Texturize, "float a = 1.0;"));
        assert!(buffer.insert(Token::Texturize, "float b = a;"));
        let text = buffer.as_str();
        let a = text.find("    float a = 1.0;").unwrap();
        let b = text.find("    float b = a;").unwrap();
        let token = text.find("#TEXTURIZE").unwrap();
        assert!(a < b && b < token);
    }

    #[test]
    fn insert_at_missing_token_is_a_no_op() {
        let mut buffer = GlslBuffer::from_template(ShaderStage::Pixel);
        let before = buffer.clone();
        assert!(!buffer.insert(Token::Position, "gl_Position = vec4(0.0);"));
        assert_eq!(buffer, before);
    }

    #[test]
    fn define_and_version_are_idempotent() {
        let mut once = GlslBuffer::from_template(ShaderStage::Vertex);
        once.define("PI 3.14159265");
        once.set_version(450);

        let mut twice = GlslBuffer::from_template(ShaderStage::Vertex);
        twice.define("PI 3.14159265");
        twice.define("PI 3.14159265");
        twice.set_version(450);
        twice.set_version(450);

        assert_eq!(once, twice);
        assert!(twice.is_defined("PI"));
        assert!(!twice.is_defined("TAU"));
    }

    #[test]
    fn compiled_strips_tokens() {
        let mut buffer = GlslBuffer::from_template(ShaderStage::Pixel);
        buffer.set_version(450);
        let out = buffer.compiled();
        assert!(out.starts_with("#version 450\n"));
        for token in Token::ALL {
            assert!(!out.contains(token.as_str()));
        }
        assert!(out.contains("void main () {"));
    }

    #[test]
    fn selection_operator_inserts_literals() {
        let mut buffer = GlslBuffer::from_template(ShaderStage::Pixel);
        let _ = buffer.select(Token::Functions) >> "const vec3 up = " >> Vec3::Y >> ";";
        let _ = buffer.select(Token::Functions) >> "const float scale = " >> 2.0f32 >> ";";
        let code = buffer.as_str();
        assert!(code.contains("const vec3 up = vec3(0.0, 1.0, 0.0);\nconst float scale = 2.0;\n#FUNCTIONS"));
    }

    #[test]
    fn add_formats_typed_values() {
        let buffer = GlslBuffer::new() + "x = " + 2.0f32 + "; m = " + Mat2::IDENTITY + ";";
        assert_eq!(buffer.as_str(), "x = 2.0; m = mat2(1.0, 0.0, 0.0, 1.0);");

        let mut q = GlslBuffer::new();
        q += Quat::IDENTITY;
        q += " ";
        q += 3u32;
        assert_eq!(q.as_str(), "vec4(0.0, 0.0, 0.0, 1.0) 3u");
        assert_eq!(<Quat as GlslLiteral>::glsl_type(), "vec4");
        assert_eq!(<Mat4 as GlslLiteral>::glsl_type(), "mat4");
    }

    #[test]
    fn pretty_preserves_line_count_and_content() {
        let source = "#version 450\n\nvoid main () {\n}\n";
        let pretty = pretty(source);
        let lines: Vec<&str> = pretty.split('\n').collect();
        assert_eq!(lines.len(), source.split('\n').count());
        assert_eq!(lines[0], "1 | #version 450");
        assert_eq!(lines[2], "3 | void main () {");
    }

    proptest! {
        #[test]
        fn embedded_symbols_are_never_found(
            prefix in "[a-z_]{1,6}",
            symbol in "[a-z][a-z_]{0,6}",
            suffix in "[a-z_]{1,6}",
        ) {
            let text = format!("{prefix}{symbol}{suffix}");
            prop_assert_eq!(find_keyword(&text, &symbol), None);
        }

        #[test]
        fn delimited_symbols_are_found(
            symbol in "[a-zA-Z_][a-zA-Z0-9_]{0,8}",
            left in prop::sample::select(vec![" ", "(", "\n", "+", ",", "*"]),
            right in prop::sample::select(vec![" ", ")", ";", ".", "\n", "-"]),
        ) {
            let text = format!("{left}{symbol}{right}y");
            prop_assert_eq!(find_keyword(&text, &symbol), Some(left.len()));
        }

        #[test]
        fn defines_are_idempotent(name in "[A-Z][A-Z0-9_]{0,10}", value in 0u32..1000) {
            let text = format!("{name} {value}");
            let mut once = GlslBuffer::from_template(ShaderStage::Pixel);
            once.define(&text);
            let mut twice = once.clone();
            twice.define(&text);
            prop_assert_eq!(once, twice);
        }
    }
}
