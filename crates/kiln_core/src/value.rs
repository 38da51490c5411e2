//! Typed literal values and their parsing rules.
//!
//! Parsing is strict: a token of the wrong kind is a type mismatch, never a
//! silent coercion. Numbers use Rust's locale-independent parsers, which
//! accept scientific notation.

use std::fmt;

use kiln_math::{Mat4, Vec3};
use serde::Serialize;

/// Kinds of literal payload a property element can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    Integer,
    Float,
    Boolean,
    String,
    Rgb,
    Point,
    Vector,
}

impl LiteralKind {
    /// Map a property element tag to its literal kind.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "integer" => LiteralKind::Integer,
            "float" => LiteralKind::Float,
            "boolean" => LiteralKind::Boolean,
            "string" => LiteralKind::String,
            "rgb" => LiteralKind::Rgb,
            "point" => LiteralKind::Point,
            "vector" => LiteralKind::Vector,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            LiteralKind::Integer => "integer",
            LiteralKind::Float => "float",
            LiteralKind::Boolean => "boolean",
            LiteralKind::String => "string",
            LiteralKind::Rgb => "rgb",
            LiteralKind::Point => "point",
            LiteralKind::Vector => "vector",
        }
    }
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed property value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Integer(i64),
    Float(f32),
    Boolean(bool),
    String(String),
    Rgb(Vec3),
    Point(Vec3),
    Vector(Vec3),
    Transform(Mat4),
}

impl Value {
    /// Human-readable kind name used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Rgb(_) => "rgb",
            Value::Point(_) => "point",
            Value::Vector(_) => "vector",
            Value::Transform(_) => "transform",
        }
    }
}

/// Why a literal failed to parse.
#[derive(Clone, Debug, PartialEq)]
pub enum ValueError {
    /// The token is not of the requested kind at all.
    TypeMismatch { expected: LiteralKind, found: String },

    /// The token is of the right kind but malformed.
    Malformed(String),
}

/// Parse a single float token.
pub fn parse_float(token: &str) -> Result<f32, ValueError> {
    let token = token.trim();
    match token.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(_) if looks_numeric(token) => Err(ValueError::Malformed(format!(
            "'{}' is out of range for a float",
            token
        ))),
        _ => Err(ValueError::TypeMismatch {
            expected: LiteralKind::Float,
            found: describe(token),
        }),
    }
}

/// Parse a whitespace-separated list of floats.
pub fn parse_floats(raw: &str) -> Result<Vec<f32>, ValueError> {
    raw.split_whitespace().map(parse_float).collect()
}

/// Parse exactly three whitespace-separated floats.
pub fn parse_vec3(raw: &str, kind: LiteralKind) -> Result<Vec3, ValueError> {
    let values = parse_floats(raw).map_err(|e| match e {
        ValueError::TypeMismatch { found, .. } => ValueError::TypeMismatch {
            expected: kind,
            found,
        },
        other => other,
    })?;
    if values.len() != 3 {
        return Err(ValueError::Malformed(format!(
            "{} needs exactly 3 components, found {}",
            kind,
            values.len()
        )));
    }
    Ok(Vec3::new(values[0], values[1], values[2]))
}

/// Parse `raw` as a literal of the given kind.
pub fn parse(kind: LiteralKind, raw: &str) -> Result<Value, ValueError> {
    match kind {
        LiteralKind::Integer => parse_integer(raw).map(Value::Integer),
        LiteralKind::Float => parse_float(raw).map(Value::Float),
        LiteralKind::Boolean => match raw.trim() {
            "true" => Ok(Value::Boolean(true)),
            "false" => Ok(Value::Boolean(false)),
            other => Err(ValueError::TypeMismatch {
                expected: LiteralKind::Boolean,
                found: describe(other),
            }),
        },
        LiteralKind::String => Ok(Value::String(raw.to_string())),
        LiteralKind::Rgb => parse_vec3(raw, kind).map(Value::Rgb),
        LiteralKind::Point => parse_vec3(raw, kind).map(Value::Point),
        LiteralKind::Vector => parse_vec3(raw, kind).map(Value::Vector),
    }
}

fn parse_integer(raw: &str) -> Result<i64, ValueError> {
    let token = raw.trim();
    if let Ok(v) = token.parse::<i64>() {
        return Ok(v);
    }
    let digits = token.strip_prefix(['-', '+']).unwrap_or(token);
    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValueError::Malformed(format!(
            "'{}' is out of range for an integer",
            token
        )));
    }
    let found = if token.parse::<f64>().is_ok() {
        format!("float {}", describe(token))
    } else {
        describe(token)
    };
    Err(ValueError::TypeMismatch {
        expected: LiteralKind::Integer,
        found,
    })
}

fn looks_numeric(token: &str) -> bool {
    token
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
}

fn describe(token: &str) -> String {
    if token.is_empty() {
        "an empty value".to_string()
    } else {
        format!("'{}'", token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scientific_notation() {
        let v = parse(LiteralKind::Float, "-5.2457066472439944e-08").unwrap();
        match v {
            Value::Float(f) => {
                assert!((f as f64 - (-5.2457066472439944e-08)).abs() < 1e-14);
            }
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_float_rejects_words() {
        assert!(matches!(
            parse(LiteralKind::Float, "abc"),
            Err(ValueError::TypeMismatch {
                expected: LiteralKind::Float,
                ..
            })
        ));
        assert!(matches!(
            parse(LiteralKind::Float, "nan"),
            Err(ValueError::TypeMismatch { .. })
        ));
        assert!(matches!(
            parse(LiteralKind::Float, "1e60"),
            Err(ValueError::Malformed(_))
        ));
    }

    #[test]
    fn test_integer_rules() {
        assert_eq!(parse(LiteralKind::Integer, " 128 ").unwrap(), Value::Integer(128));
        assert_eq!(parse(LiteralKind::Integer, "-1").unwrap(), Value::Integer(-1));
        match parse(LiteralKind::Integer, "1.5") {
            Err(ValueError::TypeMismatch { found, .. }) => assert!(found.starts_with("float")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse(LiteralKind::Integer, "99999999999999999999"),
            Err(ValueError::Malformed(_))
        ));
    }

    #[test]
    fn test_boolean_accepts_only_literals() {
        assert_eq!(parse(LiteralKind::Boolean, "true").unwrap(), Value::Boolean(true));
        assert_eq!(parse(LiteralKind::Boolean, "false").unwrap(), Value::Boolean(false));
        assert!(parse(LiteralKind::Boolean, "1").is_err());
        assert!(parse(LiteralKind::Boolean, "True").is_err());
    }

    #[test]
    fn test_rgb_needs_three_components() {
        assert_eq!(
            parse(LiteralKind::Rgb, "0.1 0.2  0.3").unwrap(),
            Value::Rgb(Vec3::new(0.1, 0.2, 0.3))
        );
        assert!(matches!(
            parse(LiteralKind::Rgb, "0.1 0.2"),
            Err(ValueError::Malformed(_))
        ));
        assert!(matches!(
            parse(LiteralKind::Rgb, "0.1 red 0.3"),
            Err(ValueError::TypeMismatch {
                expected: LiteralKind::Rgb,
                ..
            })
        ));
    }

    #[test]
    fn test_string_is_verbatim() {
        assert_eq!(
            parse(LiteralKind::String, " meshes/floor.ply ").unwrap(),
            Value::String(" meshes/floor.ply ".into())
        );
    }
}
