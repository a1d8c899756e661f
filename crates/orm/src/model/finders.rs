//! Find operations and the fluent query surface

use std::sync::Arc;

use serde_json::{json, Value};

use crate::association::AssociationKind;
use crate::collection::Collection;
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::finder::Finder;
use crate::model::{Associated, BoxFuture, Model, QueryOptions};
use crate::query::{Join, QueryBuilder, QueryParams};

/// A find's prepared shape: the qualified field list (which doubles as the
/// row-provenance source), the statement parameters, and which association
/// specs were satisfied by joins vs. deferred to secondary queries.
#[derive(Debug, Clone)]
pub(crate) struct PreparedQuery {
    pub fields: Vec<String>,
    pub params: QueryParams,
    /// First-level belongsTo/hasOne, hydrated from the primary select's
    /// joins. May carry nested specs of their own.
    pub joined: Vec<Associated>,
    /// hasMany/habtm - always loaded by secondary queries.
    pub secondary: Vec<Associated>,
}

impl Model {
    /// All rows matching the options.
    pub async fn all(&self, options: QueryOptions) -> OrmResult<Collection> {
        self.find_all_boxed(options).await
    }

    /// First matching row.
    pub async fn first(&self, mut options: QueryOptions) -> OrmResult<Option<Entity>> {
        options.limit = Some(1);
        Ok(self.find_all_boxed(options).await?.take_first())
    }

    /// Matching row count. Association load specs are ignored; explicit
    /// joins are kept so conditions on joined tables still work.
    pub async fn count(&self, mut options: QueryOptions) -> OrmResult<u64> {
        options.associated.clear();
        options.order.clear();
        options.fields = vec!["COUNT(*) AS count".to_string()];
        let prepared = self.prepare_query(&options)?;

        let mut builder = QueryBuilder::new(self.table.clone(), Some(self.name.as_str()));
        let sql = builder.select_statement(&prepared.fields, &prepared.params)?;
        let rows = self.connection.select(&sql, builder.values()).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    /// Fetch one record by primary key or fail with `RecordNotFound`.
    pub async fn get(&self, id: Value) -> OrmResult<Entity> {
        self.get_with(id, QueryOptions::default()).await
    }

    /// `get` with association loads or other options.
    pub async fn get_with(&self, id: Value, mut options: QueryOptions) -> OrmResult<Entity> {
        options.conditions = Some(json!({ (self.primary_key.as_str()): id }));
        options.limit = Some(1);
        self.find_all_boxed(options)
            .await?
            .take_first()
            .ok_or_else(|| OrmError::RecordNotFound(self.name.clone()))
    }

    /// Whether a row with this primary key exists.
    pub async fn exists(&self, id: Value) -> OrmResult<bool> {
        let options = QueryOptions {
            conditions: Some(json!({ (self.primary_key.as_str()): id })),
            callbacks: false,
            ..Default::default()
        };
        Ok(self.count(options).await? > 0)
    }

    /// Boxed find pipeline; the indirection keeps recursive association
    /// loads (model -> finder -> related model -> ...) compilable.
    pub(crate) fn find_all_boxed<'a>(
        &'a self,
        mut options: QueryOptions,
    ) -> BoxFuture<'a, OrmResult<Collection>> {
        Box::pin(async move {
            let callbacks = options.callbacks;
            if callbacks
                && self.callbacks.run_before_find(&mut options)
                    == crate::callbacks::CallbackOutcome::Halt
            {
                return Ok(Collection::new());
            }
            let prepared = self.prepare_query(&options)?;
            let mut results = Finder::new(self).find(&prepared).await?;
            if callbacks {
                self.callbacks.run_after_find(&mut results);
            }
            Ok(results)
        })
    }

    /// Merge model defaults into the options and lay out the select: field
    /// qualification, first-level to-one joins, and the split between joined
    /// and secondary association loads. Runs once per find, at this
    /// boundary - nothing downstream re-merges defaults.
    pub(crate) fn prepare_query(&self, options: &QueryOptions) -> OrmResult<PreparedQuery> {
        let mut fields: Vec<String> = if options.fields.is_empty() {
            self.columns
                .iter()
                .map(|c| format!("{}.{}", self.name, c))
                .collect()
        } else {
            options
                .fields
                .iter()
                .map(|f| self.qualify(f))
                .collect()
        };

        let mut joins: Vec<Join> = options.joins.clone();
        let mut joined = Vec::new();
        let mut secondary = Vec::new();

        for spec in &options.associated {
            let association = self.association(&spec.name)?;
            match association.kind {
                AssociationKind::BelongsTo | AssociationKind::HasOne => {
                    let related = self.relation(&spec.name)?;
                    joins.push(association.join(
                        &self.name,
                        &self.primary_key,
                        related.table(),
                        related.primary_key(),
                    ));
                    let related_fields: Vec<String> = if !spec.fields.is_empty() {
                        spec.fields.clone()
                    } else if !association.fields.is_empty() {
                        association.fields.clone()
                    } else {
                        related.columns().to_vec()
                    };
                    fields.extend(
                        related_fields
                            .iter()
                            .map(|f| qualify_with(&association.alias, f)),
                    );
                    joined.push(spec.clone());
                }
                AssociationKind::HasMany | AssociationKind::HasAndBelongsToMany => {
                    secondary.push(spec.clone());
                }
            }
        }

        let params = QueryParams {
            conditions: options.conditions.clone(),
            joins,
            group: options.group.clone(),
            having: options.having.clone(),
            order: if options.order.is_empty() {
                self.order.clone()
            } else {
                options.order.clone()
            },
            limit: options.limit,
            offset: options.offset,
            page: options.page,
            lock: options.lock,
        };

        Ok(PreparedQuery {
            fields,
            params,
            joined,
            secondary,
        })
    }

    fn qualify(&self, field: &str) -> String {
        qualify_with(&self.name, field)
    }

    /// Fluent query scoped to this model.
    pub fn query(self: &Arc<Self>) -> ModelQuery {
        ModelQuery {
            model: self.clone(),
            conditions: Vec::new(),
            options: QueryOptions::default(),
        }
    }
}

fn qualify_with(alias: &str, field: &str) -> String {
    let bare = !field.contains('.') && !field.contains(' ') && !field.contains('(');
    if bare {
        format!("{}.{}", alias, field)
    } else {
        field.to_string()
    }
}

/// Chainable find builder: `where_`/`order`/`limit`/`join`/`with`, finished
/// by `all`, `first` or `count`.
#[derive(Debug, Clone)]
pub struct ModelQuery {
    model: Arc<Model>,
    conditions: Vec<Value>,
    options: QueryOptions,
}

impl ModelQuery {
    /// Add a conditions tree; multiple calls combine with AND.
    pub fn where_(mut self, conditions: Value) -> Self {
        self.conditions.push(conditions);
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.options.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn order(mut self, order: &[&str]) -> Self {
        self.options.order = order.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn group(mut self, group: &[&str]) -> Self {
        self.options.group = group.iter().map(|g| g.to_string()).collect();
        self
    }

    pub fn having(mut self, having: Value) -> Self {
        self.options.having = Some(having);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.options.offset = Some(offset);
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.options.page = Some(page);
        self
    }

    pub fn lock(mut self) -> Self {
        self.options.lock = true;
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.options.joins.push(join);
        self
    }

    /// Request association loads by alias.
    pub fn with(mut self, names: &[&str]) -> Self {
        self.options
            .associated
            .extend(names.iter().map(|n| Associated::name(*n)));
        self
    }

    /// Request a nested association load.
    pub fn with_spec(mut self, spec: Associated) -> Self {
        self.options.associated.push(spec);
        self
    }

    pub fn callbacks(mut self, callbacks: bool) -> Self {
        self.options.callbacks = callbacks;
        self
    }

    fn finalize(mut self) -> (Arc<Model>, QueryOptions) {
        self.options.conditions = match self.conditions.len() {
            0 => None,
            1 => Some(self.conditions.remove(0)),
            _ => Some(Value::Array(self.conditions)),
        };
        (self.model, self.options)
    }

    pub async fn all(self) -> OrmResult<Collection> {
        let (model, options) = self.finalize();
        model.all(options).await
    }

    pub async fn first(self) -> OrmResult<Option<Entity>> {
        let (model, options) = self.finalize();
        model.first(options).await
    }

    pub async fn count(self) -> OrmResult<u64> {
        let (model, options) = self.finalize();
        model.count(options).await
    }
}
