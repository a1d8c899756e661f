//! Marshaller - request data to entity graphs
//!
//! `one` builds a fresh entity graph from a JSON object, recursing into
//! association properties with the related model's marshaller. Data of the
//! wrong shape for an association property is discarded (set to null)
//! rather than rejected - form layers routinely submit inconsistent
//! structures.
//!
//! `patch` is the update variant: nested sub-structures are matched against
//! the entity's existing nested entities by primary key (hasOne: by the
//! parent's foreign key) and patched in place, so resubmitting identical
//! data leaves no spurious dirty state behind.

use serde_json::Value;

use crate::association::AssociationKind;
use crate::collection::Collection;
use crate::entity::Entity;
use crate::error::OrmResult;
use crate::model::Model;
use crate::value;

/// Marshalling options. A non-empty `fields` list whitelists assignable
/// keys, association properties included.
#[derive(Debug, Clone, Default)]
pub struct MarshalOptions {
    pub fields: Vec<String>,
}

impl MarshalOptions {
    pub fn fields(names: &[&str]) -> Self {
        MarshalOptions {
            fields: names.iter().map(|f| f.to_string()).collect(),
        }
    }

    fn allows(&self, key: &str) -> bool {
        self.fields.is_empty() || self.fields.iter().any(|f| f == key)
    }
}

pub struct Marshaller<'a> {
    model: &'a Model,
}

impl<'a> Marshaller<'a> {
    pub fn new(model: &'a Model) -> Self {
        Marshaller { model }
    }

    /// Build one entity from a JSON object.
    pub fn one(&self, data: &Value, options: &MarshalOptions) -> OrmResult<Entity> {
        let mut entity = self.model.new_entity();
        let Some(map) = data.as_object() else {
            return Ok(entity);
        };

        for (key, item) in map {
            if !options.allows(key) {
                continue;
            }
            match self.model.association_for_property(key) {
                Some(association) => match association.kind {
                    AssociationKind::BelongsTo | AssociationKind::HasOne => {
                        if item.is_object() {
                            let related = self.model.relation(&association.alias)?;
                            let child =
                                related.marshaller().one(item, &MarshalOptions::default())?;
                            entity.set(key.clone(), child);
                        } else {
                            entity.set(key.clone(), Value::Null);
                        }
                    }
                    AssociationKind::HasMany | AssociationKind::HasAndBelongsToMany => {
                        if let Some(items) = item.as_array() {
                            let related = self.model.relation(&association.alias)?;
                            let mut children = Collection::new();
                            for child_data in items {
                                if child_data.is_object() {
                                    children.push(
                                        related
                                            .marshaller()
                                            .one(child_data, &MarshalOptions::default())?,
                                    );
                                }
                            }
                            entity.set(key.clone(), children);
                        } else {
                            entity.set(key.clone(), Value::Null);
                        }
                    }
                },
                None => entity.set(key.clone(), item.clone()),
            }
        }
        Ok(entity)
    }

    /// Patch an existing entity from a JSON object. Unchanged scalar values
    /// are skipped so they never show up dirty.
    pub fn patch(
        &self,
        entity: &mut Entity,
        data: &Value,
        options: &MarshalOptions,
    ) -> OrmResult<()> {
        let Some(map) = data.as_object() else {
            return Ok(());
        };

        for (key, item) in map {
            if !options.allows(key) {
                continue;
            }
            match self.model.association_for_property(key) {
                Some(association) => match association.kind {
                    AssociationKind::BelongsTo | AssociationKind::HasOne => {
                        self.patch_to_one(entity, key, association.kind, item, association)?;
                    }
                    AssociationKind::HasMany | AssociationKind::HasAndBelongsToMany => {
                        self.patch_to_many(entity, key, item, association)?;
                    }
                },
                None => {
                    let unchanged = entity
                        .get(key)
                        .map_or(false, |current| value::loosely_equal(current, item));
                    if !unchanged {
                        entity.set(key.clone(), item.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn patch_to_one(
        &self,
        entity: &mut Entity,
        key: &str,
        kind: AssociationKind,
        item: &Value,
        association: &crate::association::Association,
    ) -> OrmResult<()> {
        if !item.is_object() {
            entity.set(key.to_string(), Value::Null);
            return Ok(());
        }
        let related = self.model.relation(&association.alias)?;
        // hasOne children are identified by the foreign key pointing back at
        // the parent; belongsTo children by their own primary key
        let match_field = match kind {
            AssociationKind::HasOne => association.foreign_key.as_str(),
            _ => related.primary_key(),
        };
        let incoming_key = item.get(match_field);
        let existing_key = entity
            .entity(key)
            .and_then(|child| child.get(match_field))
            .cloned();

        let matches = match (existing_key, incoming_key) {
            (Some(a), Some(b)) => value::loosely_equal(&a, b),
            _ => false,
        };
        if matches {
            let child = entity.entity_mut(key).expect("matched nested entity");
            related
                .marshaller()
                .patch(child, item, &MarshalOptions::default())?;
        } else {
            let child = related.marshaller().one(item, &MarshalOptions::default())?;
            entity.set(key.to_string(), child);
        }
        Ok(())
    }

    fn patch_to_many(
        &self,
        entity: &mut Entity,
        key: &str,
        item: &Value,
        association: &crate::association::Association,
    ) -> OrmResult<()> {
        let Some(items) = item.as_array() else {
            entity.set(key.to_string(), Value::Null);
            return Ok(());
        };
        let related = self.model.relation(&association.alias)?;
        let existing = entity.collection(key).cloned().unwrap_or_default();

        let mut children = Collection::new();
        for child_data in items {
            if !child_data.is_object() {
                continue;
            }
            let incoming_pk = child_data.get(related.primary_key());
            let matched = incoming_pk.and_then(|pk| {
                existing.iter().find(|e| {
                    e.get(related.primary_key())
                        .map_or(false, |existing_pk| value::loosely_equal(existing_pk, pk))
                })
            });
            match matched {
                Some(found) => {
                    let mut child = found.clone();
                    related
                        .marshaller()
                        .patch(&mut child, child_data, &MarshalOptions::default())?;
                    children.push(child);
                }
                None => children.push(
                    related
                        .marshaller()
                        .one(child_data, &MarshalOptions::default())?,
                ),
            }
        }
        if entity.collection(key) != Some(&children) {
            entity.set(key.to_string(), children);
        }
        Ok(())
    }
}
