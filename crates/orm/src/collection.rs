//! Collection - an ordered sequence of entities returned from a multi-row
//! query. Index order reflects the order the database returned the rows; no
//! sorting is ever applied here.

use std::ops::{Index, IndexMut};

use serde::ser::{Serialize, SerializeSeq, Serializer};
use serde_json::Value;

use crate::entity::Entity;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collection {
    items: Vec<Entity>,
}

impl Collection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entity: Entity) {
        self.items.push(entity);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn first(&self) -> Option<&Entity> {
        self.items.first()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Entity> {
        self.items.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Entity> {
        self.items.iter_mut()
    }

    /// Take the first entity out of the collection, if any.
    pub fn take_first(self) -> Option<Entity> {
        self.items.into_iter().next()
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.items.iter().map(Entity::to_json).collect())
    }
}

impl From<Vec<Entity>> for Collection {
    fn from(items: Vec<Entity>) -> Self {
        Collection { items }
    }
}

impl FromIterator<Entity> for Collection {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Collection {
            items: iter.into_iter().collect(),
        }
    }
}

impl Index<usize> for Collection {
    type Output = Entity;

    fn index(&self, index: usize) -> &Entity {
        &self.items[index]
    }
}

impl IndexMut<usize> for Collection {
    fn index_mut(&mut self, index: usize) -> &mut Entity {
        &mut self.items[index]
    }
}

impl IntoIterator for Collection {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Collection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl Serialize for Collection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.items.len()))?;
        for entity in &self.items {
            seq.serialize_element(entity)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(id: i64) -> Entity {
        let mut e = Entity::new();
        e.set("id", json!(id));
        e
    }

    #[test]
    fn preserves_insertion_order() {
        let collection: Collection = vec![entity(3), entity(1), entity(2)].into();
        let ids: Vec<i64> = collection
            .iter()
            .map(|e| e.get("id").unwrap().as_i64().unwrap())
            .collect();
        assert_eq!(ids, [3, 1, 2]);
    }

    #[test]
    fn index_access() {
        let collection: Collection = vec![entity(7)].into();
        assert_eq!(collection[0].get("id"), Some(&json!(7)));
        assert_eq!(collection.len(), 1);
        assert!(!collection.is_empty());
    }

    #[test]
    fn serializes_as_array() {
        let collection: Collection = vec![entity(1), entity(2)].into();
        assert_eq!(collection.to_json(), json!([{"id": 1}, {"id": 2}]));
    }
}
