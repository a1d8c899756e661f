//! Entity - a single record represented as a dirty-tracking property bag
//!
//! Entities are created by the [`crate::Marshaller`] from request data or by
//! [`crate::Finder`] hydration from query results. Fields keep their insertion
//! order. Setting a field marks it dirty; overwriting an existing value also
//! records the previous value. `reset` clears the tracking state but never
//! the values themselves.

use std::collections::{HashMap, HashSet};

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::collection::Collection;

/// A field value: a scalar, a nested to-one entity, or a nested to-many
/// collection.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityValue {
    Scalar(Value),
    One(Box<Entity>),
    Many(Collection),
}

impl EntityValue {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            EntityValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            EntityValue::One(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection> {
        match self {
            EntityValue::Many(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Value> for EntityValue {
    fn from(value: Value) -> Self {
        EntityValue::Scalar(value)
    }
}

impl From<Entity> for EntityValue {
    fn from(entity: Entity) -> Self {
        EntityValue::One(Box::new(entity))
    }
}

impl From<Collection> for EntityValue {
    fn from(collection: Collection) -> Self {
        EntityValue::Many(collection)
    }
}

/// A single hydrated or user-constructed record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    name: Option<String>,
    values: HashMap<String, EntityValue>,
    order: Vec<String>,
    dirty: HashSet<String>,
    changed: HashMap<String, Value>,
    errors: HashMap<String, Vec<String>>,
    exists: Option<bool>,
    created: bool,
    deleted: bool,
    virtual_fields: Vec<String>,
    hidden_fields: Vec<String>,
}

impl Entity {
    pub fn new() -> Self {
        Self::default()
    }

    /// An entity tagged with the model name it belongs to.
    pub fn named(name: impl Into<String>) -> Self {
        Entity {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set a field. Marks the field dirty; if the field already held a
    /// different value, the previous value is recorded.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<EntityValue>) {
        let field = field.into();
        let value = value.into();
        match self.values.get(&field) {
            Some(existing) if *existing == value => {
                // Same value: still an assignment, so the field counts dirty.
                self.dirty.insert(field);
                return;
            }
            Some(EntityValue::Scalar(previous)) => {
                self.changed
                    .entry(field.clone())
                    .or_insert_with(|| previous.clone());
            }
            Some(_) => {}
            None => {
                self.order.push(field.clone());
            }
        }
        self.values.insert(field.clone(), value);
        self.dirty.insert(field);
    }

    /// Scalar accessor; nested values return None.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field).and_then(EntityValue::as_scalar)
    }

    /// Any-kind accessor.
    pub fn value(&self, field: &str) -> Option<&EntityValue> {
        self.values.get(field)
    }

    pub fn entity(&self, field: &str) -> Option<&Entity> {
        self.values.get(field).and_then(EntityValue::as_entity)
    }

    pub fn entity_mut(&mut self, field: &str) -> Option<&mut Entity> {
        match self.values.get_mut(field) {
            Some(EntityValue::One(e)) => Some(e),
            _ => None,
        }
    }

    pub fn collection(&self, field: &str) -> Option<&Collection> {
        self.values.get(field).and_then(EntityValue::as_collection)
    }

    pub fn collection_mut(&mut self, field: &str) -> Option<&mut Collection> {
        match self.values.get_mut(field) {
            Some(EntityValue::Many(c)) => Some(c),
            _ => None,
        }
    }

    pub fn has(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn unset(&mut self, field: &str) {
        self.values.remove(field);
        self.order.retain(|f| f != field);
        self.dirty.remove(field);
        self.changed.remove(field);
    }

    /// Field names in insertion order.
    pub fn fields(&self) -> &[String] {
        &self.order
    }

    pub fn is_dirty(&self, field: &str) -> bool {
        self.dirty.contains(field)
    }

    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Dirty field names, in insertion order.
    pub fn dirty(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|f| self.dirty.contains(*f))
            .cloned()
            .collect()
    }

    /// Previous value of a field changed from an existing value.
    pub fn changed(&self, field: &str) -> Option<&Value> {
        self.changed.get(field)
    }

    pub fn was_changed(&self, field: &str) -> bool {
        self.changed.contains_key(field)
    }

    /// Clear dirty/changed/error state. Values are untouched.
    pub fn reset(&mut self) {
        self.dirty.clear();
        self.changed.clear();
        self.errors.clear();
    }

    pub fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn errors(&self) -> &HashMap<String, Vec<String>> {
        &self.errors
    }

    pub fn field_errors(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Tri-state persistence flag: None until determined, then whether the
    /// backing row exists.
    pub fn exists(&self) -> Option<bool> {
        self.exists
    }

    pub fn set_exists(&mut self, exists: bool) {
        self.exists = Some(exists);
    }

    pub fn created(&self) -> bool {
        self.created
    }

    pub fn set_created(&mut self, created: bool) {
        self.created = created;
    }

    pub fn deleted(&self) -> bool {
        self.deleted
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    pub fn hide(&mut self, field: impl Into<String>) {
        self.hidden_fields.push(field.into());
    }

    pub fn mark_virtual(&mut self, field: impl Into<String>) {
        self.virtual_fields.push(field.into());
    }

    pub fn virtual_fields(&self) -> &[String] {
        &self.virtual_fields
    }

    /// Plain JSON rendering, hidden fields omitted, insertion order kept.
    pub fn to_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for field in &self.order {
            if self.hidden_fields.contains(field) {
                continue;
            }
            let rendered = match &self.values[field] {
                EntityValue::Scalar(v) => v.clone(),
                EntityValue::One(e) => e.to_json(),
                EntityValue::Many(c) => c.to_json(),
            };
            map.insert(field.clone(), rendered);
        }
        Value::Object(map)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let visible = self
            .order
            .iter()
            .filter(|f| !self.hidden_fields.contains(f));
        let mut map = serializer.serialize_map(None)?;
        for field in visible {
            match &self.values[field] {
                EntityValue::Scalar(v) => map.serialize_entry(field, v)?,
                EntityValue::One(e) => map.serialize_entry(field, e)?,
                EntityValue::Many(c) => map.serialize_entry(field, c)?,
            }
        }
        map.end()
    }
}
