//! Class hierarchy lookup table
//!
//! Classes reference their parent by name. Inheritance questions are
//! answered by walking that chain explicitly; nothing is resolved through
//! dynamic dispatch.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::reflection::error::ReflectionError;
use crate::reflection::value::{Value, ValueType};

/// Name of the class every other class descends from
pub const ROOT_CLASS: &str = "Instance";

// ============================================================================
// Descriptors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassTag {
    Service,
    NotCreatable,
    NotReplicated,
    Deprecated,
}

/// Declared type of a property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Value(ValueType),
    /// Enum-typed property, holding the enum's name
    Enum(String),
}

impl DataType {
    /// Whether `value` may be stored in a property of this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            DataType::Value(value_type) => value.value_type() == *value_type,
            DataType::Enum(_) => matches!(value, Value::Enum(_)),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Value(value_type) => write!(f, "{value_type}"),
            DataType::Enum(name) => write!(f, "Enum.{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub data_type: DataType,
    #[serde(default)]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    #[serde(default)]
    pub superclass: Option<String>,
    #[serde(default)]
    pub tags: HashSet<ClassTag>,
    #[serde(default)]
    pub properties: HashMap<String, PropertyDescriptor>,
}

/// Result of a property lookup
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyInfo<'a> {
    /// Class that declares the property
    pub owner: &'a str,
    pub data_type: &'a DataType,
    pub default: Option<&'a Value>,
}

impl PropertyInfo<'_> {
    pub fn enum_name(&self) -> Option<&str> {
        match self.data_type {
            DataType::Enum(name) => Some(name),
            DataType::Value(_) => None,
        }
    }

    pub fn value_type(&self) -> Option<ValueType> {
        match self.data_type {
            DataType::Value(value_type) => Some(*value_type),
            DataType::Enum(_) => None,
        }
    }
}

// ============================================================================
// Class Database
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct ClassDatabase {
    classes: HashMap<String, ClassDescriptor>,
}

impl ClassDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load descriptors from a JSON array
    pub fn from_json(json: &str) -> Result<Self, ReflectionError> {
        let descriptors: Vec<ClassDescriptor> = serde_json::from_str(json)?;
        let mut database = Self::new();
        for descriptor in descriptors {
            database.insert(descriptor);
        }
        Ok(database)
    }

    /// Add or replace a class
    pub fn insert(&mut self, descriptor: ClassDescriptor) {
        self.classes.insert(descriptor.name.clone(), descriptor);
    }

    pub fn get(&self, class_name: &str) -> Option<&ClassDescriptor> {
        self.classes.get(class_name)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class_exists(&self, class_name: &str) -> bool {
        self.classes.contains_key(class_name)
    }

    /// Walk from `class_name` up through its superclasses
    ///
    /// Stops at the first class missing from the database or at a cycle.
    pub fn ancestors(&self, class_name: &str) -> Ancestors<'_> {
        Ancestors {
            database: self,
            next: self.get(class_name),
            visited: HashSet::new(),
        }
    }

    /// Whether `class_name` is `ancestor` or descends from it
    ///
    /// Returns `None` when the walk reaches a class that is not known.
    pub fn class_is_a(&self, class_name: &str, ancestor: &str) -> Option<bool> {
        if ancestor == ROOT_CLASS || class_name == ancestor {
            return Some(true);
        }

        let mut visited = HashSet::new();
        let mut current = class_name;
        while current != ancestor {
            if !visited.insert(current) {
                return None;
            }
            let descriptor = self.get(current)?;
            match &descriptor.superclass {
                Some(superclass) => current = superclass.as_str(),
                None => return Some(false),
            }
        }

        Some(true)
    }

    /// Whether `class_name` or one of its ancestors is tagged as a service
    pub fn class_is_a_service(&self, class_name: &str) -> Option<bool> {
        let mut visited = HashSet::new();
        let mut current = class_name;
        loop {
            if !visited.insert(current) {
                return None;
            }
            let descriptor = self.get(current)?;
            if descriptor.tags.contains(&ClassTag::Service) {
                return Some(true);
            }
            match &descriptor.superclass {
                Some(superclass) => current = superclass.as_str(),
                None => return Some(false),
            }
        }
    }

    /// Find a property on the class or the nearest ancestor declaring it
    pub fn find_property_info(&self, class_name: &str, property: &str) -> Option<PropertyInfo<'_>> {
        self.ancestors(class_name).find_map(|descriptor| {
            descriptor
                .properties
                .get(property)
                .map(|definition| PropertyInfo {
                    owner: &descriptor.name,
                    data_type: &definition.data_type,
                    default: definition.default.as_ref(),
                })
        })
    }
}

/// Iterator over a class and its superclasses
pub struct Ancestors<'a> {
    database: &'a ClassDatabase,
    next: Option<&'a ClassDescriptor>,
    visited: HashSet<&'a str>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ClassDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        let descriptor = self.next.take()?;
        if !self.visited.insert(descriptor.name.as_str()) {
            return None;
        }
        self.next = descriptor
            .superclass
            .as_deref()
            .and_then(|superclass| self.database.get(superclass));
        Some(descriptor)
    }
}
