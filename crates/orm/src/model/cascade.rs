//! Association cascade protocol
//!
//! belongsTo children save before the parent row is written so their
//! generated keys can back-fill the parent's foreign key. hasOne/hasMany/
//! habtm run after, once the parent id is known. All nested saves and
//! deletes pass `transaction: false` - atomicity comes solely from the
//! surrounding model-level transaction, and a `false` from any nested save
//! aborts the outer operation.

use serde_json::{json, Value};

use crate::association::{Association, AssociationKind, HabtmMode};
use crate::entity::Entity;
use crate::error::OrmResult;
use crate::model::{BoxFuture, DeleteOptions, Model, QueryOptions, SaveOptions};
use crate::query::{QueryBuilder, QueryParams};
use crate::value;

fn nested_save() -> SaveOptions {
    SaveOptions {
        transaction: false,
        ..Default::default()
    }
}

impl Model {
    /// Save dirty belongsTo children and copy their primary keys into the
    /// parent's foreign key fields. Runs before the parent row is written.
    pub(crate) fn save_belongs_to<'a>(
        &'a self,
        entity: &'a mut Entity,
    ) -> BoxFuture<'a, OrmResult<bool>> {
        Box::pin(async move {
            for association in self.kind_associations(AssociationKind::BelongsTo) {
                let Some(child) = entity.entity(&association.property) else {
                    continue;
                };
                if !child.has_dirty() {
                    continue;
                }
                let related = self.relation(&association.alias)?;
                let mut child = child.clone();
                let saved = related.save_boxed(&mut child, nested_save()).await?;
                let generated = child.get(related.primary_key()).cloned();
                entity.set(association.property.clone(), child);
                if !saved {
                    return Ok(false);
                }
                if let Some(generated) = generated {
                    entity.set(association.foreign_key.clone(), generated);
                }
            }
            Ok(true)
        })
    }

    /// Save hasOne children, stamping the parent's id into their foreign
    /// key. Runs after the parent row is written.
    pub(crate) fn save_has_one<'a>(
        &'a self,
        entity: &'a mut Entity,
    ) -> BoxFuture<'a, OrmResult<bool>> {
        Box::pin(async move {
            for association in self.kind_associations(AssociationKind::HasOne) {
                let Some(child) = entity.entity(&association.property) else {
                    continue;
                };
                let Some(parent_id) = self.pk_value(entity) else {
                    continue;
                };
                let related = self.relation(&association.alias)?;
                let mut child = child.clone();
                child.set(association.foreign_key.clone(), parent_id);
                let saved = related.save_boxed(&mut child, nested_save()).await?;
                entity.set(association.property.clone(), child);
                if !saved {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    /// Save each hasMany child with the parent's id in its foreign key.
    pub(crate) fn save_has_many<'a>(
        &'a self,
        entity: &'a mut Entity,
    ) -> BoxFuture<'a, OrmResult<bool>> {
        Box::pin(async move {
            for association in self.kind_associations(AssociationKind::HasMany) {
                let Some(children) = entity.collection(&association.property) else {
                    continue;
                };
                let Some(parent_id) = self.pk_value(entity) else {
                    continue;
                };
                let related = self.relation(&association.alias)?;
                let mut children = children.clone();
                let mut saved = true;
                for index in 0..children.len() {
                    let child = &mut children[index];
                    child.set(association.foreign_key.clone(), parent_id.clone());
                    if !related.save_boxed(child, nested_save()).await? {
                        saved = false;
                        break;
                    }
                }
                entity.set(association.property.clone(), children);
                if !saved {
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    /// Resolve-or-create each habtm child, then reconcile the join table
    /// according to the association's [`HabtmMode`].
    pub(crate) fn save_habtm<'a>(
        &'a self,
        entity: &'a mut Entity,
    ) -> BoxFuture<'a, OrmResult<bool>> {
        Box::pin(async move {
            for association in self.kind_associations(AssociationKind::HasAndBelongsToMany) {
                let Some(children) = entity.collection(&association.property) else {
                    continue;
                };
                let Some(parent_id) = self.pk_value(entity) else {
                    continue;
                };
                let related = self.relation(&association.alias)?;

                let mut children = children.clone();
                let mut link_ids: Vec<Value> = Vec::new();
                let mut resolved = true;
                for index in 0..children.len() {
                    let child = &mut children[index];
                    let id = match related.pk_value(child) {
                        Some(id) => Some(id),
                        None => self.resolve_habtm_child(&related, child).await?,
                    };
                    let Some(id) = id else {
                        resolved = false;
                        break;
                    };
                    child.set(related.primary_key().to_string(), id.clone());
                    child.reset();
                    if !link_ids.iter().any(|seen| value::loosely_equal(seen, &id)) {
                        link_ids.push(id);
                    }
                }
                if !resolved {
                    entity.set(association.property.clone(), children);
                    return Ok(false);
                }

                self.reconcile_links(association, &parent_id, &link_ids)
                    .await?;
                entity.set(association.property.clone(), children);
            }
            Ok(true)
        })
    }

    /// Resolve a keyless habtm child by display field, creating the row
    /// when no match exists. `Ok(None)` when the nested save failed.
    async fn resolve_habtm_child(
        &self,
        related: &Model,
        child: &mut Entity,
    ) -> OrmResult<Option<Value>> {
        let display = child
            .get(related.display_field())
            .filter(|v| !value::is_empty(v))
            .cloned();
        if let Some(display) = display {
            let existing = related
                .first(QueryOptions {
                    conditions: Some(json!({ (related.display_field()): display })),
                    callbacks: false,
                    ..Default::default()
                })
                .await?;
            if let Some(found) = existing {
                return Ok(found.get(related.primary_key()).cloned());
            }
        }

        if !related.save_boxed(child, nested_save()).await? {
            return Ok(None);
        }
        Ok(child.get(related.primary_key()).cloned())
    }

    async fn reconcile_links(
        &self,
        association: &Association,
        parent_id: &Value,
        link_ids: &[Value],
    ) -> OrmResult<()> {
        let owner_key = json!({ (association.foreign_key.as_str()): parent_id.clone() });
        match association.mode {
            HabtmMode::Replace => {
                self.connection
                    .delete(&association.join_table, &owner_key)
                    .await?;
                for id in link_ids {
                    self.insert_link(association, parent_id, id).await?;
                }
            }
            HabtmMode::Append => {
                let existing = self.existing_links(association, parent_id).await?;
                for id in link_ids {
                    if !existing.iter().any(|seen| value::loosely_equal(seen, id)) {
                        self.insert_link(association, parent_id, id).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn insert_link(
        &self,
        association: &Association,
        parent_id: &Value,
        related_id: &Value,
    ) -> OrmResult<()> {
        self.connection
            .insert(
                &association.join_table,
                &[
                    (association.foreign_key.clone(), parent_id.clone()),
                    (
                        association.association_foreign_key.clone(),
                        related_id.clone(),
                    ),
                ],
            )
            .await?;
        Ok(())
    }

    async fn existing_links(
        &self,
        association: &Association,
        parent_id: &Value,
    ) -> OrmResult<Vec<Value>> {
        let mut builder = QueryBuilder::new(association.join_table.clone(), None);
        let params = QueryParams {
            conditions: Some(json!({ (association.foreign_key.as_str()): parent_id.clone() })),
            ..Default::default()
        };
        let fields = vec![format!(
            "{}.{}",
            association.join_table, association.association_foreign_key
        )];
        let sql = builder.select_statement(&fields, &params)?;
        let rows = self.connection.select(&sql, builder.values()).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.values.first().cloned())
            .collect())
    }

    /// Delete dependent hasOne/hasMany children through their own models so
    /// their callbacks and cascades fire.
    pub(crate) fn delete_dependent<'a>(&'a self, id: &'a Value) -> BoxFuture<'a, OrmResult<()>> {
        Box::pin(async move {
            for association in self
                .associations
                .iter()
                .filter(|a| {
                    matches!(a.kind, AssociationKind::HasOne | AssociationKind::HasMany)
                        && a.dependent
                })
            {
                let related = self.relation(&association.alias)?;
                let children = related
                    .find_all_boxed(QueryOptions {
                        conditions: Some(
                            json!({ (association.foreign_key.as_str()): id.clone() }),
                        ),
                        fields: vec![related.primary_key().to_string()],
                        callbacks: false,
                        ..Default::default()
                    })
                    .await?;
                for mut child in children {
                    related
                        .delete_boxed(
                            &mut child,
                            DeleteOptions {
                                transaction: false,
                                ..Default::default()
                            },
                        )
                        .await?;
                }
            }
            Ok(())
        })
    }

    /// Remove join-table links for every habtm association, `dependent` or
    /// not.
    pub(crate) async fn delete_habtm_links(&self, id: &Value) -> OrmResult<()> {
        for association in self.kind_associations(AssociationKind::HasAndBelongsToMany) {
            self.connection
                .delete(
                    &association.join_table,
                    &json!({ (association.foreign_key.as_str()): id.clone() }),
                )
                .await?;
        }
        Ok(())
    }

    fn kind_associations(&self, kind: AssociationKind) -> Vec<&Association> {
        self.associations.iter().filter(|a| a.kind == kind).collect()
    }
}
