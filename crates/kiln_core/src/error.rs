//! Error taxonomy for scene loading.
//!
//! Every error carries enough context (element position, node kind/type/id)
//! to locate the offending declaration in the source document.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// 1-based position of an element's opening `<` in the source text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Identifies a plugin node in diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeContext {
    pub kind: String,
    pub plugin_type: String,
    pub id: Option<String>,
    pub location: Location,
}

impl fmt::Display for NodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(
                f,
                "{} '{}' (type \"{}\") at {}",
                self.kind, id, self.plugin_type, self.location
            ),
            None => write!(
                f,
                "{} (type \"{}\") at {}",
                self.kind, self.plugin_type, self.location
            ),
        }
    }
}

/// Errors that can occur while loading a scene description.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum LoadError {
    #[error("IO error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("Syntax error at {location}: {message}")]
    Syntax { location: Location, message: String },

    #[error("Unsupported scene version \"{version}\" at {location} (supported: 2.0.0 to 3.x)")]
    UnsupportedVersion { location: Location, version: String },

    #[error("Parse error at {location}: {message}")]
    Parse { location: Location, message: String },

    #[error("Type mismatch for property '{property}' at {location}: expected {expected}, found {found}")]
    TypeMismatch {
        location: Location,
        property: String,
        expected: String,
        found: String,
    },

    #[error("Duplicate id '{id}': first declared at {first}, declared again at {second}")]
    DuplicateId {
        id: String,
        first: Location,
        second: Location,
    },

    #[error("Duplicate default '{name}': first declared at {first}, declared again at {second}")]
    DuplicateDefault {
        name: String,
        first: Location,
        second: Location,
    },

    #[error("Unresolved reference to '{id}' at {location}: {reason}")]
    UnresolvedReference {
        id: String,
        location: Location,
        reason: String,
    },

    #[error("Undefined parameter '${name}' at {location}")]
    UndefinedParameter { name: String, location: Location },

    #[error("Override for unknown parameter '{name}' (no matching <default>)")]
    UnknownParameter { name: String },

    #[error("Parameter '{name}' overridden more than once")]
    DuplicateOverride { name: String },

    #[error("Value of parameter '{name}' contains the token '${token}'; parameter values are not substituted")]
    NestedParameter { name: String, token: String },

    #[error("Unknown plugin type \"{plugin_type}\" for {kind} at {location}")]
    UnknownPluginType {
        kind: String,
        plugin_type: String,
        location: Location,
    },

    #[error("Unexpected element <{tag}> at {location}")]
    UnknownElement { tag: String, location: Location },

    #[error("{node}: missing required property '{property}'")]
    MissingProperty { node: NodeContext, property: String },

    #[error("Validation error: {node}: {message}")]
    Validation { node: NodeContext, message: String },

    #[error("Validation error: {message}")]
    SceneValidation { message: String },

    #[error("Failed to load mesh '{path}' for shape at {location}: {message}")]
    MeshLoad {
        path: String,
        location: Location,
        message: String,
    },
}

impl LoadError {
    /// Source position of the error, if it refers to one.
    pub fn location(&self) -> Option<Location> {
        match self {
            LoadError::Syntax { location, .. }
            | LoadError::UnsupportedVersion { location, .. }
            | LoadError::Parse { location, .. }
            | LoadError::TypeMismatch { location, .. }
            | LoadError::UnresolvedReference { location, .. }
            | LoadError::UndefinedParameter { location, .. }
            | LoadError::UnknownPluginType { location, .. }
            | LoadError::UnknownElement { location, .. }
            | LoadError::MeshLoad { location, .. } => Some(*location),
            LoadError::DuplicateId { second, .. } | LoadError::DuplicateDefault { second, .. } => {
                Some(*second)
            }
            LoadError::MissingProperty { node, .. } | LoadError::Validation { node, .. } => {
                Some(node.location)
            }
            LoadError::Io { .. }
            | LoadError::UnknownParameter { .. }
            | LoadError::DuplicateOverride { .. }
            | LoadError::NestedParameter { .. }
            | LoadError::SceneValidation { .. } => None,
        }
    }
}

/// A non-empty, ordered list of load errors.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadErrors(Vec<LoadError>);

impl LoadErrors {
    /// Wrap a list of errors. Returns `None` if the list is empty.
    pub fn new(errors: Vec<LoadError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self(errors))
        }
    }

    pub fn single(error: LoadError) -> Self {
        Self(vec![error])
    }

    pub fn errors(&self) -> &[LoadError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LoadError> {
        self.0.iter()
    }

    pub fn into_vec(self) -> Vec<LoadError> {
        self.0
    }
}

impl fmt::Display for LoadErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene failed to load with {} error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for LoadErrors {}

impl<'a> IntoIterator for &'a LoadErrors {
    type Item = &'a LoadError;
    type IntoIter = std::slice::Iter<'a, LoadError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Result type for loading operations.
pub type LoadResult<T> = Result<T, LoadErrors>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_is_rejected() {
        assert!(LoadErrors::new(Vec::new()).is_none());
    }

    #[test]
    fn test_display_lists_every_error() {
        let errors = LoadErrors::new(vec![
            LoadError::UnknownParameter { name: "spp".into() },
            LoadError::DuplicateId {
                id: "mat".into(),
                first: Location::new(3, 5),
                second: Location::new(9, 5),
            },
        ])
        .unwrap();

        let text = errors.to_string();
        assert!(text.contains("2 error(s)"));
        assert!(text.contains("'spp'"));
        assert!(text.contains("line 3, column 5"));
        assert!(text.contains("line 9, column 5"));
    }

    #[test]
    fn test_location_of_duplicates_is_the_second_declaration() {
        let err = LoadError::DuplicateDefault {
            name: "spp".into(),
            first: Location::new(2, 5),
            second: Location::new(4, 5),
        };
        assert_eq!(err.location(), Some(Location::new(4, 5)));
        assert_eq!(
            LoadError::UnknownParameter { name: "spp".into() }.location(),
            None
        );
    }

    #[test]
    fn test_node_context_display() {
        let node = NodeContext {
            kind: "shape".into(),
            plugin_type: "ply".into(),
            id: Some("mesh-floor".into()),
            location: Location::new(12, 1),
        };
        assert_eq!(
            node.to_string(),
            "shape 'mesh-floor' (type \"ply\") at line 12, column 1"
        );
    }
}
