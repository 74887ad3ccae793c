//! Model definitions and their compiled form.

use crate::error::SchemaError;
use crate::keys;
use bicycle_codec::{
    encode_tuple, from_cbor, to_cbor, CodecError, CodecResult, Record, SortOrder, Value,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Name under which the primary key appears as an index.
pub const PRIMARY_INDEX: &str = "primary";

/// Declared type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit float. Integer inputs are widened.
    Float,
    /// UTF-8 text.
    Text,
    /// Boolean.
    Bool,
    /// Raw bytes.
    Bytes,
    /// Nested record. Cannot be keyed or indexed.
    Record,
}

impl FieldType {
    /// Lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "text",
            Self::Bool => "bool",
            Self::Bytes => "bytes",
            Self::Record => "record",
        }
    }

    /// Checks `value` against this type and normalizes it.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TypeMismatch`] naming `field`.
    pub fn coerce(self, field: &str, nullable: bool, value: Value) -> CodecResult<Value> {
        match (self, value) {
            (_, Value::Null) if nullable => Ok(Value::Null),
            (Self::Float, Value::Integer(n)) => Ok(Value::Float(n as f64)),
            (Self::Integer, v @ Value::Integer(_))
            | (Self::Float, v @ Value::Float(_))
            | (Self::Text, v @ Value::Text(_))
            | (Self::Bool, v @ Value::Bool(_))
            | (Self::Bytes, v @ Value::Bytes(_))
            | (Self::Record, v @ Value::Record(_)) => Ok(v),
            (ty, other) => Err(CodecError::type_mismatch(
                field,
                ty.as_str(),
                other.kind().as_str(),
            )),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Declared type.
    #[serde(rename = "type")]
    pub ty: FieldType,
    /// Whether the field may be absent or null.
    #[serde(default)]
    pub nullable: bool,
}

/// One field of an index, with its sort order.
///
/// Deserializes from a plain field name (ascending) or from
/// `{"field": .., "order": "asc" | "desc"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "IndexFieldRepr")]
pub struct IndexField {
    /// Field name.
    pub field: String,
    /// Sort order of this component.
    pub order: SortOrder,
}

impl IndexField {
    /// An ascending component.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Ascending,
        }
    }

    /// A descending component.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Descending,
        }
    }
}

impl From<&str> for IndexField {
    fn from(field: &str) -> Self {
        Self::asc(field)
    }
}

impl From<String> for IndexField {
    fn from(field: String) -> Self {
        Self::asc(field)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IndexFieldRepr {
    Name(String),
    Full {
        field: String,
        #[serde(default)]
        order: SortOrder,
    },
}

impl From<IndexFieldRepr> for IndexField {
    fn from(repr: IndexFieldRepr) -> Self {
        match repr {
            IndexFieldRepr::Name(field) => Self::asc(field),
            IndexFieldRepr::Full { field, order } => Self { field, order },
        }
    }
}

/// A declared secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name, unique within the model.
    pub name: String,
    /// Indexed fields in key order.
    pub fields: Vec<IndexField>,
    /// Whether two records may share a key.
    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    /// Creates a non-unique index.
    pub fn new<I, F>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<IndexField>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    /// Marks the index unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A model as submitted for registration.
///
/// ```rust
/// use bicycle_core::{FieldType, IndexDef, ModelDef};
///
/// let def = ModelDef::new("Example")
///     .field("id", FieldType::Integer)
///     .field("email", FieldType::Text)
///     .primary_key(["id"])
///     .index(IndexDef::new("by_email", ["email"]).unique());
/// assert_eq!(def.fields.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDef {
    /// Model name.
    pub name: String,
    /// Fields in declaration order.
    pub fields: Vec<FieldDef>,
    /// Primary-key fields in key order.
    pub primary_key: Vec<String>,
    /// Secondary indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

impl ModelDef {
    /// Starts an empty definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
        }
    }

    /// Adds a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            nullable: false,
        });
        self
    }

    /// Adds a nullable field.
    #[must_use]
    pub fn optional_field(mut self, name: impl Into<String>, ty: FieldType) -> Self {
        self.fields.push(FieldDef {
            name: name.into(),
            ty,
            nullable: true,
        });
        self
    }

    /// Sets the primary-key fields.
    #[must_use]
    pub fn primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a secondary index.
    #[must_use]
    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }
}

/// Key layout of one index, the primary key included.
#[derive(Debug, Clone)]
pub struct IndexLayout {
    name: String,
    fields: Vec<String>,
    orders: Vec<SortOrder>,
    unique: bool,
    primary: bool,
    prefix: Vec<u8>,
}

impl IndexLayout {
    /// Index name; [`PRIMARY_INDEX`] for the primary key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Indexed fields in key order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Sort order of each component.
    #[must_use]
    pub fn orders(&self) -> &[SortOrder] {
        &self.orders
    }

    /// Returns true if keys must be unique.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Returns true for the primary key.
    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub(crate) fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    pub(crate) fn position(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }

    /// Encodes this index's components of `record`. Absent fields encode
    /// as null.
    pub(crate) fn tuple(&self, record: &Record) -> CodecResult<Vec<u8>> {
        let values: Vec<&Value> = self
            .fields
            .iter()
            .map(|f| record.get(f).unwrap_or(&Value::Null))
            .collect();
        encode_tuple(values.into_iter().zip(self.orders.iter().copied()))
    }

    pub(crate) fn has_null(&self, record: &Record) -> bool {
        self.fields
            .iter()
            .any(|f| record.get(f).map_or(true, Value::is_null))
    }

    /// Full storage key of `record` in this index. Secondary entries end
    /// with the primary-key tuple `pk`.
    pub(crate) fn entry_key(&self, record: &Record, pk: &[u8]) -> CodecResult<Vec<u8>> {
        let mut key = self.prefix.clone();
        key.extend_from_slice(&self.tuple(record)?);
        if !self.primary {
            key.extend_from_slice(pk);
        }
        Ok(key)
    }
}

/// A registered, validated model.
#[derive(Debug)]
pub struct Model {
    def: ModelDef,
    fields: HashMap<String, usize>,
    primary: IndexLayout,
    indexes: Vec<IndexLayout>,
}

impl Model {
    /// Validates `def` and computes its key layouts.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidDefinition`] describing the first
    /// problem found.
    pub fn compile(def: ModelDef) -> Result<Self, SchemaError> {
        let model = def.name.clone();
        let invalid = |reason: String| SchemaError::invalid(&model, reason);

        if def.name.is_empty() {
            return Err(invalid("model name is empty".into()));
        }
        if def.fields.is_empty() {
            return Err(invalid("no fields declared".into()));
        }

        let mut fields = HashMap::with_capacity(def.fields.len());
        for (slot, field) in def.fields.iter().enumerate() {
            if field.name.is_empty() {
                return Err(invalid("field name is empty".into()));
            }
            if fields.insert(field.name.clone(), slot).is_some() {
                return Err(invalid(format!("field `{}` declared twice", field.name)));
            }
        }

        check_key_fields(&def, &fields, "primary key", &def.primary_key)?;
        for name in &def.primary_key {
            if fields.get(name).is_some_and(|&slot| def.fields[slot].nullable) {
                return Err(invalid(format!("primary key field `{name}` cannot be nullable")));
            }
        }

        let mut index_names = HashSet::new();
        for index in &def.indexes {
            if index.name.is_empty() || index.name == PRIMARY_INDEX {
                return Err(invalid(format!("`{}` is not a valid index name", index.name)));
            }
            if !index_names.insert(index.name.as_str()) {
                return Err(invalid(format!("index `{}` declared twice", index.name)));
            }
            let names: Vec<String> = index.fields.iter().map(|f| f.field.clone()).collect();
            check_key_fields(&def, &fields, &format!("index `{}`", index.name), &names)?;
        }

        let codec = |e: CodecError| invalid(e.to_string());
        let primary = IndexLayout {
            name: PRIMARY_INDEX.to_owned(),
            fields: def.primary_key.clone(),
            orders: vec![SortOrder::Ascending; def.primary_key.len()],
            unique: true,
            primary: true,
            prefix: keys::primary_prefix(&def.name).map_err(codec)?,
        };
        let indexes = def
            .indexes
            .iter()
            .map(|index| {
                Ok(IndexLayout {
                    name: index.name.clone(),
                    fields: index.fields.iter().map(|f| f.field.clone()).collect(),
                    orders: index.fields.iter().map(|f| f.order).collect(),
                    unique: index.unique,
                    primary: false,
                    prefix: keys::index_prefix(&def.name, &index.name).map_err(codec)?,
                })
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        Ok(Self {
            def,
            fields,
            primary,
            indexes,
        })
    }

    /// Model name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.def.name
    }

    /// The definition this model was compiled from.
    #[must_use]
    pub fn def(&self) -> &ModelDef {
        &self.def
    }

    /// Looks up a declared field.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.get(name).map(|&slot| &self.def.fields[slot])
    }

    /// The primary key as an index.
    #[must_use]
    pub fn primary_key(&self) -> &IndexLayout {
        &self.primary
    }

    /// Secondary indexes in declaration order.
    #[must_use]
    pub fn indexes(&self) -> &[IndexLayout] {
        &self.indexes
    }

    /// Looks up an index by name, the primary key included.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexLayout> {
        if name == PRIMARY_INDEX {
            return Some(&self.primary);
        }
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Checks `record` against the model and returns its normalized form:
    /// every declared field present, absent nullable fields as null, and
    /// integers widened for float fields.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownField`], [`CodecError::MissingPrimaryKey`],
    /// or [`CodecError::TypeMismatch`].
    pub fn validate(&self, mut record: Record) -> CodecResult<Record> {
        if let Some((name, _)) = record.iter().find(|(name, _)| !self.fields.contains_key(*name)) {
            return Err(CodecError::UnknownField {
                field: name.to_owned(),
            });
        }
        for field in &self.primary.fields {
            if record.get(field).map_or(true, Value::is_null) {
                return Err(CodecError::MissingPrimaryKey {
                    field: field.clone(),
                });
            }
        }

        let mut normalized = Record::new();
        for field in &self.def.fields {
            let value = record.remove(&field.name).unwrap_or(Value::Null);
            let value = field.ty.coerce(&field.name, field.nullable, value)?;
            normalized.insert(field.name.clone(), value);
        }
        Ok(normalized)
    }

    /// Primary-key tuple of a validated record.
    pub(crate) fn pk_tuple(&self, record: &Record) -> CodecResult<Vec<u8>> {
        self.primary.tuple(record)
    }

    /// Storage key of the record with primary-key tuple `pk`.
    pub(crate) fn record_key(&self, pk: &[u8]) -> Vec<u8> {
        let mut key = self.primary.prefix.clone();
        key.extend_from_slice(pk);
        key
    }

    pub(crate) fn encode_record(&self, record: &Record) -> CodecResult<Vec<u8>> {
        to_cbor(record)
    }

    pub(crate) fn decode_record(&self, bytes: &[u8]) -> CodecResult<Record> {
        from_cbor(bytes)
    }
}

fn check_key_fields(
    def: &ModelDef,
    slots: &HashMap<String, usize>,
    owner: &str,
    names: &[String],
) -> Result<(), SchemaError> {
    let invalid = |reason: String| Err(SchemaError::invalid(&def.name, reason));
    if names.is_empty() {
        return invalid(format!("{owner} has no fields"));
    }
    let mut seen = HashSet::new();
    for name in names {
        let Some(&slot) = slots.get(name) else {
            return invalid(format!("{owner} references unknown field `{name}`"));
        };
        if def.fields[slot].ty == FieldType::Record {
            return invalid(format!("{owner} cannot include nested field `{name}`"));
        }
        if !seen.insert(name) {
            return invalid(format!("{owner} repeats field `{name}`"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> ModelDef {
        ModelDef::new("User")
            .field("id", FieldType::Integer)
            .field("email", FieldType::Text)
            .optional_field("score", FieldType::Float)
            .optional_field("profile", FieldType::Record)
            .primary_key(["id"])
            .index(IndexDef::new("by_email", ["email"]).unique())
            .index(IndexDef::new(
                "by_score",
                [IndexField::desc("score"), IndexField::asc("email")],
            ))
    }

    fn reason(def: ModelDef) -> String {
        match Model::compile(def).unwrap_err() {
            SchemaError::InvalidDefinition { reason, .. } => reason,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn compiles_layouts() {
        let model = Model::compile(user()).unwrap();
        assert_eq!(model.name(), "User");
        assert_eq!(model.primary_key().fields(), ["id"]);
        assert!(model.primary_key().is_primary());
        assert_eq!(model.indexes().len(), 2);

        let by_score = model.index("by_score").unwrap();
        assert_eq!(
            by_score.orders(),
            [SortOrder::Descending, SortOrder::Ascending]
        );
        assert!(!by_score.is_unique());
        assert_eq!(model.index(PRIMARY_INDEX).unwrap().name(), PRIMARY_INDEX);
    }

    #[test]
    fn rejects_bad_definitions() {
        assert!(reason(user().primary_key(["nope"])).contains("unknown field `nope`"));
        assert!(reason(user().primary_key(Vec::<String>::new())).contains("no fields"));
        assert!(reason(user().primary_key(["profile"])).contains("nested"));
        assert!(reason(user().primary_key(["score"])).contains("nullable"));
        assert!(reason(user().index(IndexDef::new("by_email", ["id"]))).contains("twice"));
        assert!(reason(user().index(IndexDef::new("primary", ["id"]))).contains("not a valid"));
        assert!(reason(user().index(IndexDef::new("pair", ["id", "id"]))).contains("repeats"));
        assert!(reason(user().field("id", FieldType::Text)).contains("declared twice"));
    }

    #[test]
    fn validate_normalizes() {
        let model = Model::compile(user()).unwrap();
        let record = model
            .validate(Record::new().with("id", 1).with("email", "a@x.com").with("score", 3))
            .unwrap();
        assert_eq!(record.get("score"), Some(&Value::Float(3.0)));
        assert_eq!(record.get("profile"), Some(&Value::Null));
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn validate_rejects() {
        let model = Model::compile(user()).unwrap();

        let err = model
            .validate(Record::new().with("id", 1).with("email", "a").with("age", 3))
            .unwrap_err();
        assert_eq!(err, CodecError::UnknownField { field: "age".into() });

        let err = model.validate(Record::new().with("email", "a")).unwrap_err();
        assert_eq!(err, CodecError::MissingPrimaryKey { field: "id".into() });

        let err = model
            .validate(Record::new().with("id", Value::Null).with("email", "a"))
            .unwrap_err();
        assert!(matches!(err, CodecError::MissingPrimaryKey { .. }));

        let err = model
            .validate(Record::new().with("id", "one").with("email", "a"))
            .unwrap_err();
        assert_eq!(err, CodecError::type_mismatch("id", "integer", "text"));

        let err = model.validate(Record::new().with("id", 1)).unwrap_err();
        assert_eq!(err, CodecError::type_mismatch("email", "text", "null"));
    }

    #[test]
    fn entry_keys_end_with_primary_key() {
        let model = Model::compile(user()).unwrap();
        let record = model
            .validate(Record::new().with("id", 7).with("email", "a@x.com"))
            .unwrap();
        let pk = model.pk_tuple(&record).unwrap();

        let primary = model.primary_key().entry_key(&record, &pk).unwrap();
        assert_eq!(primary, model.record_key(&pk));

        let by_email = model.index("by_email").unwrap();
        let entry = by_email.entry_key(&record, &pk).unwrap();
        assert!(entry.starts_with(by_email.prefix()));
        assert!(entry.ends_with(&pk));
        assert!(model.index("by_score").unwrap().has_null(&record));
        assert!(!by_email.has_null(&record));
    }

    #[test]
    fn definition_json_accepts_plain_field_names() {
        let json = r#"{
            "name": "Example",
            "fields": [
                {"name": "id", "type": "integer"},
                {"name": "email", "type": "text"},
                {"name": "age", "type": "integer", "nullable": true}
            ],
            "primary_key": ["id"],
            "indexes": [
                {"name": "by_email", "fields": ["email"], "unique": true},
                {"name": "by_age", "fields": [{"field": "age", "order": "desc"}]}
            ]
        }"#;
        let def: ModelDef = serde_json::from_str(json).unwrap();
        assert_eq!(def.indexes[0].fields, vec![IndexField::asc("email")]);
        assert_eq!(def.indexes[1].fields, vec![IndexField::desc("age")]);
        assert!(def.indexes[0].unique);
        assert!(Model::compile(def).is_ok());
    }

    #[test]
    fn definition_survives_cbor() {
        let def = user();
        let bytes = to_cbor(&def).unwrap();
        let back: ModelDef = from_cbor(&bytes).unwrap();
        assert_eq!(back, def);
    }
}
