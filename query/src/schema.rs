//! Collection, field and relation metadata, as supplied by the external schema store.
//!
//! The catalog is immutable for the duration of a compilation and may be shared between any
//! number of concurrent compilations.

use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Text,
    Integer,
    BigInteger,
    Float,
    Decimal,
    Boolean,
    Uuid,
    Json,
    Date,
    DateTime,
    Timestamp,
    Time,
    /// Virtual field with no column of its own, e.g. the reverse side of a one-to-many relation.
    Alias,
    #[serde(other)]
    Unknown,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool { matches!(self, FieldType::Integer | FieldType::BigInteger | FieldType::Float | FieldType::Decimal) }

    pub fn is_textual(&self) -> bool { matches!(self, FieldType::String | FieldType::Text) }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Field {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Storage type reported by the database (`jsonb`, `json`, `text`, `nvarchar`, ...).
    #[serde(default)]
    pub data_type: Option<String>,
}

impl Field {
    pub fn new(field_type: FieldType) -> Self { Self { field_type, data_type: None } }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.data_type = Some(data_type.into());
        self
    }

    /// Is the column stored with a native binary JSON type (as opposed to JSON text)?
    pub fn is_native_jsonb(&self) -> bool { self.data_type.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("jsonb")) }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Collection {
    pub primary: String,
    #[serde(default)]
    pub fields: IndexMap<String, Field>,
}

impl Collection {
    pub fn new(primary: impl Into<String>) -> Self { Self { primary: primary.into(), fields: IndexMap::new() } }

    pub fn field(mut self, name: impl Into<String>, field: Field) -> Self {
        self.fields.insert(name.into(), field);
        self
    }
}

/// One many-to-one link, seen from its owning ("many") side.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Relation {
    pub owning_collection: String,
    pub owning_field: String,
    pub target_collection: String,
    pub target_field: String,
    /// Alias field on the target collection exposing the one-to-many direction.
    #[serde(default)]
    pub reverse_field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    ManyToOne,
    OneToMany,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub collections: IndexMap<String, Collection>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl Schema {
    pub fn new() -> Self { Self::default() }

    pub fn collection(mut self, name: impl Into<String>, collection: Collection) -> Self {
        self.collections.insert(name.into(), collection);
        self
    }

    pub fn relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn get(&self, collection: &str) -> Option<&Collection> { self.collections.get(collection) }

    pub fn field(&self, collection: &str, field: &str) -> Option<&Field> { self.collections.get(collection)?.fields.get(field) }

    pub fn primary_key(&self, collection: &str) -> Option<&str> { self.collections.get(collection).map(|c| c.primary.as_str()) }

    /// Find the relation leaving `collection` through `field`, in either direction.
    pub fn relation_for(&self, collection: &str, field: &str) -> Option<(&Relation, RelationKind)> {
        self.relations.iter().find_map(|relation| {
            if relation.owning_collection == collection && relation.owning_field == field {
                Some((relation, RelationKind::ManyToOne))
            } else if relation.target_collection == collection && relation.reverse_field.as_deref() == Some(field) {
                Some((relation, RelationKind::OneToMany))
            } else {
                None
            }
        })
    }
}

impl Relation {
    pub fn many_to_one(
        owning_collection: impl Into<String>,
        owning_field: impl Into<String>,
        target_collection: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            owning_collection: owning_collection.into(),
            owning_field: owning_field.into(),
            target_collection: target_collection.into(),
            target_field: target_field.into(),
            reverse_field: None,
        }
    }

    pub fn with_reverse(mut self, reverse_field: impl Into<String>) -> Self {
        self.reverse_field = Some(reverse_field.into());
        self
    }

    /// Collection reached by following this relation in direction `kind`.
    pub fn far_side(&self, kind: RelationKind) -> &str {
        match kind {
            RelationKind::ManyToOne => &self.target_collection,
            RelationKind::OneToMany => &self.owning_collection,
        }
    }
}
