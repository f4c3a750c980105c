use std::collections::BTreeMap;

use log::debug;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("values of type {0} cannot be put into a persistable bundle")]
pub struct UnsupportedTypeError(pub &'static str);

/// A value in a heterogeneous argument bundle. This is an open set: it
/// includes types (null, f32, byte arrays, nested heterogeneous bundles)
/// which cannot cross the privilege boundary and get filtered out by
/// [`Bundle::to_persistable`].
///
/// Deserialization is untagged, so a TOML overrides file maps straight onto
/// it: integers become `Int` when they fit in an i32 and `Long` otherwise,
/// floats become `Double`, tables become `Nested`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BundleValue {
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    StringArray(Vec<String>),
    Nested(Bundle),
    #[serde(skip)]
    Float(f32),
    #[serde(skip)]
    Bytes(Vec<u8>),
    #[serde(skip)]
    Persistable(PersistableBundle),
}

impl BundleValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            BundleValue::Null => "Null",
            BundleValue::Bool(_) => "Bool",
            BundleValue::Int(_) => "Int",
            BundleValue::Long(_) => "Long",
            BundleValue::Double(_) => "Double",
            BundleValue::String(_) => "String",
            BundleValue::BoolArray(_) => "BoolArray",
            BundleValue::IntArray(_) => "IntArray",
            BundleValue::LongArray(_) => "LongArray",
            BundleValue::DoubleArray(_) => "DoubleArray",
            BundleValue::StringArray(_) => "StringArray",
            BundleValue::Nested(_) => "Bundle",
            BundleValue::Float(_) => "Float",
            BundleValue::Bytes(_) => "Bytes",
            BundleValue::Persistable(_) => "PersistableBundle",
        }
    }

    /// Narrow this value to the restricted persistable set. Values outside
    /// the set fail with an error naming the offending type.
    pub fn to_persistable(&self) -> Result<PersistableValue, UnsupportedTypeError> {
        match self {
            BundleValue::Bool(v) => Ok(PersistableValue::Bool(*v)),
            BundleValue::Int(v) => Ok(PersistableValue::Int(*v)),
            BundleValue::Long(v) => Ok(PersistableValue::Long(*v)),
            BundleValue::Double(v) => Ok(PersistableValue::Double(*v)),
            BundleValue::String(v) => Ok(PersistableValue::String(v.clone())),
            BundleValue::BoolArray(v) => Ok(PersistableValue::BoolArray(v.clone())),
            BundleValue::IntArray(v) => Ok(PersistableValue::IntArray(v.clone())),
            BundleValue::LongArray(v) => Ok(PersistableValue::LongArray(v.clone())),
            BundleValue::DoubleArray(v) => Ok(PersistableValue::DoubleArray(v.clone())),
            BundleValue::StringArray(v) => Ok(PersistableValue::StringArray(v.clone())),
            BundleValue::Persistable(b) => Ok(PersistableValue::Bundle(b.clone())),
            BundleValue::Null
            | BundleValue::Float(_)
            | BundleValue::Bytes(_)
            | BundleValue::Nested(_) => Err(UnsupportedTypeError(self.type_name())),
        }
    }
}

impl From<&PersistableValue> for BundleValue {
    fn from(value: &PersistableValue) -> Self {
        match value {
            PersistableValue::Bool(v) => BundleValue::Bool(*v),
            PersistableValue::Int(v) => BundleValue::Int(*v),
            PersistableValue::Long(v) => BundleValue::Long(*v),
            PersistableValue::Double(v) => BundleValue::Double(*v),
            PersistableValue::String(v) => BundleValue::String(v.clone()),
            PersistableValue::BoolArray(v) => BundleValue::BoolArray(v.clone()),
            PersistableValue::IntArray(v) => BundleValue::IntArray(v.clone()),
            PersistableValue::LongArray(v) => BundleValue::LongArray(v.clone()),
            PersistableValue::DoubleArray(v) => BundleValue::DoubleArray(v.clone()),
            PersistableValue::StringArray(v) => BundleValue::StringArray(v.clone()),
            PersistableValue::Bundle(b) => BundleValue::Persistable(b.clone()),
        }
    }
}

/// A heterogeneous key-value argument set, as handed to the broker by its
/// host. Lives for a single invocation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct Bundle {
    entries: BTreeMap<String, BundleValue>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: BundleValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&BundleValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BundleValue)> {
        self.entries.iter()
    }

    /// Narrow this bundle to a [`PersistableBundle`], dropping every entry
    /// whose value is outside the restricted type set. Keys are carried over
    /// unchanged; no entry is ever added.
    pub fn to_persistable(&self) -> PersistableBundle {
        let mut persistable = PersistableBundle::new();
        for (key, value) in &self.entries {
            match value.to_persistable() {
                Ok(value) => persistable.insert(key.clone(), value),
                Err(err) => debug!("dropping key {key}: {err}"),
            }
        }
        persistable
    }
}

impl FromIterator<(String, BundleValue)> for Bundle {
    fn from_iter<T: IntoIterator<Item = (String, BundleValue)>>(iter: T) -> Self {
        Bundle {
            entries: iter.into_iter().collect(),
        }
    }
}

impl From<&PersistableBundle> for Bundle {
    fn from(persistable: &PersistableBundle) -> Self {
        persistable
            .iter()
            .map(|(key, value)| (key.clone(), BundleValue::from(value)))
            .collect()
    }
}

/// A value restricted to the types that survive the privilege boundary.
/// Closed sum type, so an "unreachable default" dispatch arm cannot exist.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistableValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    BoolArray(Vec<bool>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    StringArray(Vec<String>),
    Bundle(PersistableBundle),
}

/// A key-value map whose values all satisfy the restricted type predicate,
/// safe to hand to the carrier configuration service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistableBundle {
    entries: BTreeMap<String, PersistableValue>,
}

impl PersistableBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: PersistableValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&PersistableValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PersistableValue)> {
        self.entries.iter()
    }
}

impl FromIterator<(String, PersistableValue)> for PersistableBundle {
    fn from_iter<T: IntoIterator<Item = (String, PersistableValue)>>(iter: T) -> Self {
        PersistableBundle {
            entries: iter.into_iter().collect(),
        }
    }
}
