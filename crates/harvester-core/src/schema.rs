//! JSON Schema validation of harvested reports.
//!
//! The bundled schema is compiled into the binary; a caller may point at a
//! schema file instead. Validation is pure: the same document always yields
//! the same result.

use std::path::{Path, PathBuf};

use serde_json::Value;

/// Schema shipped with the crate.
pub const BUNDLED_SCHEMA: &str = include_str!("../schema/harvest.schema.json");

/// Where to take the schema from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SchemaSource {
    #[default]
    Bundled,
    Path(PathBuf),
}

impl std::fmt::Display for SchemaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaSource::Bundled => f.write_str("bundled schema"),
            SchemaSource::Path(path) => write!(f, "{}", path.display()),
        }
    }
}

/// The schema itself could not be loaded or compiled.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// Schema file unreadable.
    Read { path: PathBuf, message: String },
    /// Schema text is not JSON.
    Parse { origin: String, message: String },
    /// JSON is not a valid JSON Schema.
    Invalid { origin: String, message: String },
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaError::Read { path, message } => {
                write!(f, "cannot read schema {}: {}", path.display(), message)
            }
            SchemaError::Parse { origin, message } => {
                write!(f, "schema {} is not valid JSON: {}", origin, message)
            }
            SchemaError::Invalid { origin, message } => {
                write!(f, "schema {} is not a valid JSON Schema: {}", origin, message)
            }
        }
    }
}

impl std::error::Error for SchemaError {}

/// A document does not conform to the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaValidationError {
    violations: Vec<String>,
}

impl SchemaValidationError {
    /// Individual violations, each prefixed with the JSON pointer of the offending value.
    pub fn violations(&self) -> &[String] {
        &self.violations
    }
}

impl std::fmt::Display for SchemaValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "document does not match schema: {}",
            self.violations.join("; ")
        )
    }
}

impl std::error::Error for SchemaValidationError {}

/// Compiled schema.
pub struct Schema {
    origin: String,
    validator: jsonschema::Validator,
}

impl Schema {
    /// The schema shipped with the crate.
    pub fn bundled() -> Result<Self, SchemaError> {
        Self::from_str(BUNDLED_SCHEMA, "bundled")
    }

    /// Reads and compiles a schema file.
    pub fn from_path(path: &Path) -> Result<Self, SchemaError> {
        let text = std::fs::read_to_string(path).map_err(|e| SchemaError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_str(&text, &path.display().to_string())
    }

    pub fn load(source: &SchemaSource) -> Result<Self, SchemaError> {
        match source {
            SchemaSource::Bundled => Self::bundled(),
            SchemaSource::Path(path) => Self::from_path(path),
        }
    }

    fn from_str(text: &str, origin: &str) -> Result<Self, SchemaError> {
        let value: Value = serde_json::from_str(text).map_err(|e| SchemaError::Parse {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        Self::from_value(&value, origin)
    }

    pub fn from_value(schema: &Value, origin: &str) -> Result<Self, SchemaError> {
        let validator = jsonschema::validator_for(schema).map_err(|e| SchemaError::Invalid {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            origin: origin.to_string(),
            validator,
        })
    }

    /// Where this schema came from ("bundled" or a file path).
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Checks `document`, reporting every violation found.
    pub fn validate(&self, document: &Value) -> Result<(), SchemaValidationError> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(document)
            .map(|e| {
                let path = e.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("{}: {}", path, e)
            })
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaValidationError { violations })
        }
    }
}

impl std::fmt::Debug for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Schema")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}
