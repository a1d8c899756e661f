//! Finder - query execution and entity hydration
//!
//! Executes the prepared SELECT, buckets each numeric row per table alias,
//! and builds one entity graph per row. First-level belongsTo/hasOne come
//! out of the primary select's joins; hasMany/habtm always run as secondary
//! queries per parent row (a join would duplicate the parent); nested to-one
//! associations under another association run as one query per row.
//!
//! The per-row strategy is deliberate and swappable: secondary loads go
//! through [`AssociationLoader`], so a batched `IN`-based loader can replace
//! the default without touching the hydration contract.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::association::AssociationKind;
use crate::collection::Collection;
use crate::connection::Connection;
use crate::entity::Entity;
use crate::error::OrmResult;
use crate::model::finders::PreparedQuery;
use crate::model::{Associated, Model, QueryOptions};
use crate::query::{Join, QueryBuilder};
use crate::value;

/// Strategy for loading associated data after the primary select.
#[async_trait]
pub trait AssociationLoader: Send + Sync {
    /// Load a hasMany/habtm association for every entity in the result set.
    async fn load_to_many(
        &self,
        model: &Model,
        results: &mut Collection,
        spec: &Associated,
    ) -> OrmResult<()>;

    /// Refresh joined to-one properties whose spec requests nested
    /// associations of their own.
    async fn load_nested_to_one(
        &self,
        model: &Model,
        results: &mut Collection,
        spec: &Associated,
    ) -> OrmResult<()>;
}

/// Default loader: one secondary query per parent row.
pub struct EagerQueryLoader;

static DEFAULT_LOADER: EagerQueryLoader = EagerQueryLoader;

pub struct Finder<'a> {
    model: &'a Model,
    loader: &'a dyn AssociationLoader,
}

impl<'a> Finder<'a> {
    pub fn new(model: &'a Model) -> Self {
        Finder {
            model,
            loader: &DEFAULT_LOADER,
        }
    }

    pub fn with_loader(model: &'a Model, loader: &'a dyn AssociationLoader) -> Self {
        Finder { model, loader }
    }

    pub(crate) async fn find(&self, prepared: &PreparedQuery) -> OrmResult<Collection> {
        let mut builder = QueryBuilder::new(self.model.table(), Some(self.model.name()));
        let sql = builder.select_statement(&prepared.fields, &prepared.params)?;
        let rows = self
            .model
            .connection()
            .select(&sql, builder.values())
            .await?;

        let bucketed = Connection::map_numeric_results(&rows, &prepared.fields, self.model.name());
        let mut results = Collection::new();
        for row in bucketed {
            results.push(self.prepare_result(row, &prepared.joined)?);
        }

        for spec in &prepared.joined {
            if !spec.associated.is_empty() {
                self.loader
                    .load_nested_to_one(self.model, &mut results, spec)
                    .await?;
            }
        }
        for spec in &prepared.secondary {
            self.loader
                .load_to_many(self.model, &mut results, spec)
                .await?;
        }
        Ok(results)
    }

    /// Build one entity graph from a bucketed row, pruning empty to-one
    /// associations: when the parent's foreign key or the child's primary
    /// key is empty, the property stays unset rather than holding a phantom
    /// entity from an unmatched LEFT JOIN.
    fn prepare_result(
        &self,
        row: Vec<(String, Map<String, Value>)>,
        joined: &[Associated],
    ) -> OrmResult<Entity> {
        let mut entity = self.model.new_entity();
        for (alias, bucket) in &row {
            if alias == self.model.name() {
                for (field, field_value) in bucket {
                    entity.set(field.clone(), field_value.clone());
                }
                entity.set_exists(true);
            }
        }

        for spec in joined {
            let association = self.model.association(&spec.name)?;
            let related = self.model.relation(&spec.name)?;
            let Some((_, bucket)) = row.iter().find(|(alias, _)| *alias == association.alias)
            else {
                continue;
            };

            let child_pk_empty = bucket
                .get(related.primary_key())
                .map_or(true, value::is_empty);
            let parent_key_empty = match association.kind {
                AssociationKind::BelongsTo => entity
                    .get(&association.foreign_key)
                    .map_or(true, value::is_empty),
                _ => self.model.pk_value(&entity).is_none(),
            };
            if child_pk_empty || parent_key_empty {
                continue;
            }

            let mut child = related.new_entity();
            for (field, field_value) in bucket {
                child.set(field.clone(), field_value.clone());
            }
            child.set_exists(true);
            child.reset();
            entity.set(association.property.clone(), child);
        }

        entity.reset();
        Ok(entity)
    }
}

#[async_trait]
impl AssociationLoader for EagerQueryLoader {
    async fn load_to_many(
        &self,
        model: &Model,
        results: &mut Collection,
        spec: &Associated,
    ) -> OrmResult<()> {
        let association = model.association(&spec.name)?;
        let related = model.relation(&spec.name)?;

        for entity in results.iter_mut() {
            let Some(parent_id) = model.pk_value(entity) else {
                continue;
            };

            let mut options = QueryOptions {
                fields: if !spec.fields.is_empty() {
                    spec.fields.clone()
                } else {
                    association.fields.clone()
                },
                order: association.order.clone(),
                limit: association.limit,
                offset: association.offset,
                associated: spec.associated.clone(),
                ..Default::default()
            };

            let mut conditions: Vec<Value> = Vec::new();
            match association.kind {
                AssociationKind::HasAndBelongsToMany => {
                    let link = format!(
                        "{}.{} = {}.{}",
                        association.join_table,
                        association.association_foreign_key,
                        association.alias,
                        related.primary_key()
                    );
                    options.joins.push(Join::new(
                        association.join_table.clone(),
                        json!([link]),
                    ));
                    let owner_column =
                        format!("{}.{}", association.join_table, association.foreign_key);
                    conditions.push(json!({ (owner_column.as_str()): parent_id.clone() }));
                }
                _ => {
                    conditions.push(json!({ (association.foreign_key.as_str()): parent_id.clone() }));
                }
            }
            if let Some(extra) = &association.conditions {
                conditions.push(extra.clone());
            }
            options.conditions = Some(Value::Array(conditions));

            let children = related.find_all_boxed(options).await?;
            entity.set(association.property.clone(), children);
            entity.reset();
        }
        Ok(())
    }

    async fn load_nested_to_one(
        &self,
        model: &Model,
        results: &mut Collection,
        spec: &Associated,
    ) -> OrmResult<()> {
        let association = model.association(&spec.name)?;
        let related = model.relation(&spec.name)?;

        for entity in results.iter_mut() {
            let Some(child_pk) = entity
                .entity(&association.property)
                .and_then(|child| child.get(related.primary_key()))
                .filter(|v| !value::is_empty(v))
                .cloned()
            else {
                continue;
            };

            let options = QueryOptions {
                conditions: Some(json!({ (related.primary_key()): child_pk })),
                associated: spec.associated.clone(),
                limit: Some(1),
                ..Default::default()
            };
            if let Some(refreshed) = related.find_all_boxed(options).await?.take_first() {
                entity.set(association.property.clone(), refreshed);
                entity.reset();
            }
        }
        Ok(())
    }
}
