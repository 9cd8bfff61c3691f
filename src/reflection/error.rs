//! Error types for class and property lookups

use crate::reflection::value::ValueType;

#[derive(Debug, thiserror::Error)]
pub enum ReflectionError {
    #[error("Unknown class: {class}")]
    UnknownClass { class: String },

    #[error("Unknown property '{property}' on class {class}")]
    UnknownProperty { class: String, property: String },

    #[error("Type mismatch for '{property}': expected {expected}, got {actual:?}")]
    TypeMismatch {
        property: String,
        expected: String,
        actual: ValueType,
    },

    #[error("Failed to parse class database: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ReflectionError {
    pub fn unknown_class(class: impl Into<String>) -> Self {
        Self::UnknownClass {
            class: class.into(),
        }
    }

    pub fn unknown_property(class: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnknownProperty {
            class: class.into(),
            property: property.into(),
        }
    }
}
