//! Instances with an explicit property table

use std::collections::HashMap;

use crate::reflection::database::{ClassDatabase, ROOT_CLASS};
use crate::reflection::error::ReflectionError;
use crate::reflection::value::Value;

const NAME_PROPERTY: &str = "Name";

/// An object of a known class
///
/// Only properties that were set explicitly are stored; everything else
/// reads through to the class default.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    class_name: String,
    name: String,
    properties: HashMap<String, Value>,
}

impl Instance {
    /// Create an instance of `class_name`, named after its class
    pub fn new(database: &ClassDatabase, class_name: &str) -> Result<Self, ReflectionError> {
        if !database.class_exists(class_name) {
            return Err(ReflectionError::unknown_class(class_name));
        }

        Ok(Self {
            class_name: class_name.to_string(),
            name: class_name.to_string(),
            properties: HashMap::new(),
        })
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn is_a(&self, database: &ClassDatabase, ancestor: &str) -> bool {
        database
            .class_is_a(&self.class_name, ancestor)
            .unwrap_or(ancestor == ROOT_CLASS)
    }

    /// Explicitly set value, else the class default
    ///
    /// A declared property without a default and without an explicit value
    /// reads as `None`.
    pub fn get(
        &self,
        database: &ClassDatabase,
        property: &str,
    ) -> Result<Option<Value>, ReflectionError> {
        if property == NAME_PROPERTY {
            return Ok(Some(Value::String(self.name.clone())));
        }

        let info = database
            .find_property_info(&self.class_name, property)
            .ok_or_else(|| ReflectionError::unknown_property(&self.class_name, property))?;

        Ok(self
            .properties
            .get(property)
            .or(info.default)
            .cloned())
    }

    /// Store a value after checking it against the declared type
    pub fn set(
        &mut self,
        database: &ClassDatabase,
        property: &str,
        value: impl Into<Value>,
    ) -> Result<(), ReflectionError> {
        let value = value.into();
        let info = database
            .find_property_info(&self.class_name, property)
            .ok_or_else(|| ReflectionError::unknown_property(&self.class_name, property))?;

        if !info.data_type.accepts(&value) {
            return Err(ReflectionError::TypeMismatch {
                property: property.to_string(),
                expected: info.data_type.to_string(),
                actual: value.value_type(),
            });
        }

        match (property, value) {
            (NAME_PROPERTY, Value::String(name)) => self.name = name,
            (_, value) => {
                self.properties.insert(property.to_string(), value);
            }
        }
        Ok(())
    }

    /// Drop an explicit value so the property reads the class default again
    pub fn reset(&mut self, property: &str) -> Option<Value> {
        self.properties.remove(property)
    }

    /// Properties that were set explicitly
    pub fn explicit_properties(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}
