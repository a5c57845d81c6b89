use std::fmt;

use crate::testcase::ParamMap;

/// Value type a parameter must coerce to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
}

impl ParamType {
    /// Whether a raw string value coerces to this type.
    pub fn accepts(&self, raw: &str) -> bool {
        match self {
            ParamType::Str => true,
            ParamType::Int => raw.parse::<i64>().is_ok(),
            ParamType::Float => raw.parse::<f64>().is_ok(),
            ParamType::Bool => matches!(
                raw.to_ascii_lowercase().as_str(),
                "true" | "false" | "yes" | "no" | "on" | "off" | "1" | "0"
            ),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ParamType::Str => "str",
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::Bool => "bool",
        };
        write!(f, "{text}")
    }
}

/// One declared parameter.
#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
    pub default: Option<String>,
}

/// A testcase's declared parameter schema.
///
/// Validation fills defaults, checks required presence and type
/// coercibility, and passes unknown extra keys through untouched.
#[derive(Debug, Clone, Default)]
pub struct ParamSchema {
    specs: Vec<ParamSpec>,
}

impl ParamSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a required parameter. Chainable.
    pub fn required(mut self, name: &str, ty: ParamType) -> Self {
        self.specs.push(ParamSpec {
            name: name.to_string(),
            ty,
            required: true,
            default: None,
        });
        self
    }

    /// Declare an optional parameter with an optional default. Chainable.
    pub fn optional(mut self, name: &str, ty: ParamType, default: Option<&str>) -> Self {
        self.specs.push(ParamSpec {
            name: name.to_string(),
            ty,
            required: false,
            default: default.map(str::to_string),
        });
        self
    }

    pub fn specs(&self) -> &[ParamSpec] {
        &self.specs
    }

    /// Validate a parameter map against the schema.
    ///
    /// Returns the normalized map: declared defaults filled in, every
    /// declared value checked for type coercibility, extras preserved.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaViolation`] naming the first offending parameter.
    pub fn validate(&self, values: &ParamMap) -> Result<ParamMap, SchemaViolation> {
        let mut normalized = values.clone();
        for spec in &self.specs {
            match normalized.get(&spec.name) {
                Some(raw) => {
                    if !spec.ty.accepts(raw) {
                        return Err(SchemaViolation {
                            param: spec.name.clone(),
                            message: format!("expected {} value, got '{raw}'", spec.ty),
                        });
                    }
                }
                None => {
                    if let Some(default) = &spec.default {
                        normalized.insert(spec.name.clone(), default.clone());
                    } else if spec.required {
                        return Err(SchemaViolation {
                            param: spec.name.clone(),
                            message: "required parameter is missing".to_string(),
                        });
                    }
                }
            }
        }
        Ok(normalized)
    }
}

/// A parameter map that does not satisfy a schema.
#[derive(Debug, Clone)]
pub struct SchemaViolation {
    pub param: String,
    pub message: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "parameter '{}': {}", self.param, self.message)
    }
}

impl std::error::Error for SchemaViolation {}
