//! Entity model.
//!
//! Entity types are declared once as static descriptors, which the query
//! builder consults to validate field and relation references:
//!
//! ```
//! use xtdb_client::entity_type;
//! use xtdb_client::orm::Field;
//!
//! entity_type!(static COUNTRY: "Country" = [Field::scalar("name")]);
//! entity_type!(static CITY: "City" = [Field::relation("country", &COUNTRY), Field::scalar("name")]);
//!
//! assert!(CITY.relation("country").is_some());
//! assert_eq!(CITY.qualify("name"), "City/name");
//! ```
//!
//! Documents stored in the database carry the `xt/id` key, a `type` key
//! holding the alias of their entity type, and one `<Alias>/<field>` key per
//! field. Relations are stored as the id of the referenced document.

use serde_json::{Map, Value};

// used to print out readable forms of an entity type
use std::fmt;

use crate::error::{Result, XtdbError};

pub const ID_FIELD: &str = "xt/id";
pub const TYPE_FIELD: &str = "type";
pub const FN_FIELD: &str = "xt/fn";

// ------------- Field -------------
#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Scalar,
    Relation(&'static EntityType),
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    name: &'static str,
    kind: FieldKind,
}
impl Field {
    pub const fn scalar(name: &'static str) -> Self {
        Self {
            name,
            kind: FieldKind::Scalar,
        }
    }
    pub const fn relation(name: &'static str, target: &'static EntityType) -> Self {
        Self {
            name,
            kind: FieldKind::Relation(target),
        }
    }
    pub fn name(&self) -> &'static str {
        self.name
    }
    pub fn kind(&self) -> FieldKind {
        self.kind
    }
    pub fn target(&self) -> Option<&'static EntityType> {
        match self.kind {
            FieldKind::Relation(target) => Some(target),
            FieldKind::Scalar => None,
        }
    }
}

// ------------- EntityType -------------
#[derive(Debug)]
pub struct EntityType {
    alias: &'static str,
    fields: &'static [Field],
    variants: &'static [&'static EntityType],
}

impl EntityType {
    pub const fn new(alias: &'static str, fields: &'static [Field]) -> Self {
        Self {
            alias,
            fields,
            variants: &[],
        }
    }
    /// Declares the concrete types stored in place of this (abstract) one.
    pub const fn with_variants(mut self, variants: &'static [&'static EntityType]) -> Self {
        self.variants = variants;
        self
    }
    pub fn alias(&self) -> &'static str {
        self.alias
    }
    pub fn fields(&self) -> &'static [Field] {
        self.fields
    }
    pub fn field(&self, name: &str) -> Option<&'static Field> {
        self.fields.iter().find(|field| field.name == name)
    }
    pub fn relation(&self, name: &str) -> Option<&'static EntityType> {
        self.field(name).and_then(Field::target)
    }
    pub fn relations(&self) -> impl Iterator<Item = &'static Field> {
        self.fields.iter().filter(|field| field.target().is_some())
    }
    pub fn variants(&self) -> &'static [&'static EntityType] {
        self.variants
    }
    /// The namespaced attribute name, `Alias/field`.
    pub fn qualify(&self, field: &str) -> String {
        format!("{}/{}", self.alias, field)
    }
}

// Entity types are singletons, identified by their alias.
impl PartialEq for EntityType {
    fn eq(&self, other: &Self) -> bool {
        self.alias == other.alias
    }
}
impl Eq for EntityType {}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.alias)
    }
}

/// Declares a static [`EntityType`], optionally with its concrete variants.
#[macro_export]
macro_rules! entity_type {
    ($vis:vis static $name:ident : $alias:literal = [$($field:expr),* $(,)?] $(, variants = [$($variant:expr),* $(,)?])? $(;)?) => {
        $vis static $name: $crate::orm::EntityType = {
            static FIELDS: &[$crate::orm::Field] = &[$($field),*];
            static VARIANTS: &[&$crate::orm::EntityType] = &[$($($variant),*)?];
            $crate::orm::EntityType::new($alias, FIELDS).with_variants(VARIANTS)
        };
    };
}

// ------------- Document -------------
/// A JSON document that always carries an `xt/id`.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    map: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(ID_FIELD.to_string(), Value::String(id.into()));
        Self { map }
    }
    /// Starts the document of an entity: its id and its type marker.
    pub fn entity(entity_type: &EntityType, id: impl Into<String>) -> Self {
        Self::new(id).with(TYPE_FIELD, entity_type.alias())
    }
    pub fn id(&self) -> &str {
        self.map.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default()
    }
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.map.insert(key.into(), value.into());
        self
    }
    /// Adds `Alias/field`, refusing fields the type does not declare.
    pub fn with_field(self, entity_type: &EntityType, field: &str, value: impl Into<Value>) -> Result<Self> {
        if entity_type.field(field).is_none() {
            return Err(XtdbError::InvalidField(format!(
                "\"{}\" is not a field of {}",
                field,
                entity_type.alias()
            )));
        }
        Ok(self.with(entity_type.qualify(field), value))
    }
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.map.get(key)
    }
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }
    pub fn entity_alias(&self) -> Option<&str> {
        self.map.get(TYPE_FIELD).and_then(Value::as_str)
    }
    pub fn field(&self, entity_type: &EntityType, field: &str) -> Result<&Value> {
        let key = entity_type.qualify(field);
        self.map
            .get(&key)
            .ok_or_else(|| XtdbError::InvalidDocument(format!("missing key {key} in document {}", self.id())))
    }
    pub fn str_field(&self, entity_type: &EntityType, field: &str) -> Result<&str> {
        let value = self.field(entity_type, field)?;
        value.as_str().ok_or_else(|| mismatch(entity_type, field, "a string", value))
    }
    pub fn i64_field(&self, entity_type: &EntityType, field: &str) -> Result<i64> {
        let value = self.field(entity_type, field)?;
        value.as_i64().ok_or_else(|| mismatch(entity_type, field, "an integer", value))
    }
    pub fn f64_field(&self, entity_type: &EntityType, field: &str) -> Result<f64> {
        let value = self.field(entity_type, field)?;
        value.as_f64().ok_or_else(|| mismatch(entity_type, field, "a number", value))
    }
    pub fn bool_field(&self, entity_type: &EntityType, field: &str) -> Result<bool> {
        let value = self.field(entity_type, field)?;
        value.as_bool().ok_or_else(|| mismatch(entity_type, field, "a boolean", value))
    }
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.map
    }
    pub fn into_value(self) -> Value {
        Value::Object(self.map)
    }
}

fn mismatch(entity_type: &EntityType, field: &str, expected: &str, found: &Value) -> XtdbError {
    XtdbError::InvalidDocument(format!(
        "{} should be {expected}, found {found}",
        entity_type.qualify(field)
    ))
}

impl TryFrom<Value> for Document {
    type Error = XtdbError;
    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) if map.get(ID_FIELD).is_some_and(Value::is_string) => Ok(Self { map }),
            Value::Object(_) => Err(XtdbError::InvalidDocument(format!("document without a string {ID_FIELD}"))),
            other => Err(XtdbError::InvalidDocument(format!("expected an object, found {other}"))),
        }
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        document.into_value()
    }
}

// ------------- Entity -------------
/// A typed value stored as one document of its entity type.
pub trait Entity: Sized {
    fn entity_type() -> &'static EntityType;
    fn id(&self) -> &str;
    fn to_document(&self) -> Document;
    fn from_document(document: &Document) -> Result<Self>;
}

// ------------- TxFunction -------------
/// A transaction function, installed with a put and invoked with an `fn` operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFunction {
    identifier: String,
    source: String,
}
impl TxFunction {
    pub fn new(identifier: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            source: source.into(),
        }
    }
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
    pub fn source(&self) -> &str {
        &self.source
    }
    pub fn to_document(&self) -> Document {
        Document::new(self.identifier.clone()).with(FN_FIELD, self.source.clone())
    }
}
