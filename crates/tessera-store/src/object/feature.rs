use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tessera_types::{Crs, Envelope, ObjectId};

use crate::codec;
use crate::error::{StoreError, StoreResult};

/// An attribute value. Geometries are carried as opaque WKB together with
/// their precomputed bounds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
    Geometry { wkb: Vec<u8>, bounds: Option<Envelope> },
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Long(_) => ValueType::Long,
            Self::Double(_) => ValueType::Double,
            Self::String(_) => ValueType::String,
            Self::Bytes(_) => ValueType::Bytes,
            Self::Geometry { .. } => ValueType::Geometry,
        }
    }
}

/// The declared type of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueType {
    Bool,
    Int,
    Long,
    Double,
    String,
    Bytes,
    Geometry,
}

/// A record: an ordered list of optional values, positionally aligned with
/// the attributes of its [`RevFeatureType`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RevFeature {
    #[serde(skip)]
    pub(crate) id: ObjectId,
    values: Vec<Option<Value>>,
}

impl RevFeature {
    pub fn new(values: Vec<Option<Value>>) -> StoreResult<Self> {
        let mut feature = Self {
            id: ObjectId::NULL,
            values,
        };
        feature.id = codec::compute_id(&feature)?;
        Ok(feature)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn values(&self) -> &[Option<Value>] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// Union of the bounds of every geometry value, ignoring empty slots.
    pub fn bounds(&self) -> Option<Envelope> {
        let mut acc: Option<Envelope> = None;
        for value in self.values.iter().flatten() {
            if let Value::Geometry {
                bounds: Some(bounds),
                ..
            } = value
            {
                match acc.as_mut() {
                    Some(a) => a.expand_to_include(bounds),
                    None => acc = Some(*bounds),
                }
            }
        }
        acc
    }

    /// Check that the values line up with `schema`.
    pub fn conforms_to(&self, schema: &RevFeatureType) -> bool {
        self.values.len() == schema.attributes().len()
            && self
                .values
                .iter()
                .zip(schema.attributes())
                .all(|(value, attr)| match value {
                    Some(v) => v.value_type() == attr.binding,
                    None => attr.nullable,
                })
    }
}

/// One attribute of a schema.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDescriptor {
    pub name: String,
    pub binding: ValueType,
    pub nullable: bool,
}

impl AttributeDescriptor {
    pub fn new(name: impl Into<String>, binding: ValueType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            binding,
            nullable,
        }
    }
}

/// A schema descriptor: ordered attributes and the native reference frame
/// of its geometries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevFeatureType {
    #[serde(skip)]
    pub(crate) id: ObjectId,
    name: String,
    attributes: Vec<AttributeDescriptor>,
    crs: Option<Crs>,
}

impl RevFeatureType {
    pub fn new(
        name: impl Into<String>,
        attributes: Vec<AttributeDescriptor>,
        crs: Option<Crs>,
    ) -> StoreResult<Self> {
        let mut seen = HashSet::new();
        for attr in &attributes {
            if attr.name.is_empty() {
                return Err(StoreError::InvalidObject("empty attribute name".into()));
            }
            if !seen.insert(attr.name.as_str()) {
                return Err(StoreError::InvalidObject(format!(
                    "duplicate attribute {:?}",
                    attr.name
                )));
            }
        }
        let mut feature_type = Self {
            id: ObjectId::NULL,
            name: name.into(),
            attributes,
            crs,
        };
        feature_type.id = codec::compute_id(&feature_type)?;
        Ok(feature_type)
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    /// Attribute names in positional order.
    pub fn attribute_order(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name.as_str()).collect()
    }

    /// Native reference frame, if the schema declares one.
    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn index_of(&self, attribute: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.name == attribute)
    }
}
