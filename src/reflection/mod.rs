//! Reflection table for class hierarchies
//!
//! A [`ClassDatabase`] describes classes, their superclass chain and their
//! typed properties. [`Instance`] keeps explicitly set values and falls back
//! to class defaults.

pub mod database;
pub mod error;
pub mod instance;
pub mod value;

pub use database::{
    ClassDatabase, ClassDescriptor, ClassTag, DataType, PropertyDescriptor, PropertyInfo,
    ROOT_CLASS,
};
pub use error::ReflectionError;
pub use instance::Instance;
pub use value::{Value, ValueType};
