//! Save lifecycle
//!
//! begin transaction -> saveBelongsTo -> validate -> beforeSave /
//! beforeCreate|beforeUpdate -> diff dirty columns -> INSERT|UPDATE ->
//! afterCreate|afterUpdate / afterSave -> saveHasOne -> saveHasMany ->
//! saveHasAndBelongsToMany -> commit (+ afterCommit).
//!
//! A halted callback or validation failure returns `Ok(false)` and rolls
//! back the transaction this call opened. A datasource error runs the
//! onError hooks, rolls back, fires afterRollback and re-throws. Nested
//! cascade saves run with `transaction: false`, deferring commit/rollback
//! authority to the outermost caller.

use chrono::Utc;
use serde_json::{json, Value};

use crate::callbacks::{CallbackEvent, CallbackOutcome};
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::model::{BoxFuture, Model, SaveOptions};
use crate::validation::SaveMode;

impl Model {
    /// Save an entity, cascading through its associations. `Ok(false)`
    /// means a validation failure or callback halt - inspect the entity's
    /// error map.
    pub async fn save(&self, entity: &mut Entity, options: SaveOptions) -> OrmResult<bool> {
        self.save_boxed(entity, options).await
    }

    pub(crate) fn save_boxed<'a>(
        &'a self,
        entity: &'a mut Entity,
        options: SaveOptions,
    ) -> BoxFuture<'a, OrmResult<bool>> {
        Box::pin(async move {
            let began = options.transaction && self.connection.begin().await?;
            match self.process_save(entity, &options).await {
                Ok(true) => {
                    if began {
                        self.connection.commit().await?;
                        if options.callbacks {
                            self.run_callbacks(CallbackEvent::AfterCommit, entity);
                        }
                    }
                    Ok(true)
                }
                Ok(false) => {
                    if began {
                        self.connection.rollback().await?;
                        if options.callbacks {
                            self.run_callbacks(CallbackEvent::AfterRollback, entity);
                        }
                    }
                    Ok(false)
                }
                Err(err) => {
                    if options.callbacks {
                        self.run_callbacks(CallbackEvent::OnError, entity);
                    }
                    if began {
                        // the connection rolls back on statement failure;
                        // this covers failures raised before any statement
                        let _ = self.connection.rollback().await;
                        if options.callbacks {
                            self.run_callbacks(CallbackEvent::AfterRollback, entity);
                        }
                    }
                    Err(err)
                }
            }
        })
    }

    async fn process_save(&self, entity: &mut Entity, options: &SaveOptions) -> OrmResult<bool> {
        if options.associated && !self.save_belongs_to(entity).await? {
            return Ok(false);
        }

        let pk_value = self.pk_value(entity);
        let exists = match entity.exists() {
            Some(exists) => exists,
            None => match &pk_value {
                Some(id) => self.exists(id.clone()).await?,
                None => false,
            },
        };
        let mode = if exists {
            SaveMode::Update
        } else {
            SaveMode::Create
        };

        if options.validate {
            if options.callbacks
                && self.run_callbacks(CallbackEvent::BeforeValidate, entity)
                    == CallbackOutcome::Halt
            {
                return Ok(false);
            }
            if !self.validates(entity, mode) {
                return Ok(false);
            }
            if options.callbacks {
                self.run_callbacks(CallbackEvent::AfterValidate, entity);
            }
        }

        if options.callbacks {
            if self.run_callbacks(CallbackEvent::BeforeSave, entity) == CallbackOutcome::Halt {
                return Ok(false);
            }
            let event = match mode {
                SaveMode::Create => CallbackEvent::BeforeCreate,
                SaveMode::Update => CallbackEvent::BeforeUpdate,
            };
            if self.run_callbacks(event, entity) == CallbackOutcome::Halt {
                return Ok(false);
            }
        }

        self.touch_timestamps(entity, mode);

        let data: Vec<(String, Value)> = entity
            .dirty()
            .into_iter()
            .filter(|field| self.columns.contains(field))
            .filter_map(|field| entity.get(&field).map(|v| (field.clone(), v.clone())))
            .collect();

        // only the primary key dirty means a pure linking save - no row write
        let only_pk = !data.is_empty() && data.iter().all(|(c, _)| c == &self.primary_key);

        match mode {
            SaveMode::Create => {
                if !only_pk {
                    self.connection.insert(&self.table, &data).await?;
                    if pk_value.is_none() {
                        if let Some(id) = self.connection.last_insert_id().await? {
                            entity.set(self.primary_key.clone(), json!(id));
                        }
                    }
                }
                entity.set_created(true);
            }
            SaveMode::Update => {
                let changes: Vec<(String, Value)> = data
                    .into_iter()
                    .filter(|(c, _)| c != &self.primary_key)
                    .collect();
                if !changes.is_empty() {
                    let id = pk_value
                        .clone()
                        .ok_or_else(|| OrmError::MissingPrimaryKey(self.primary_key.clone()))?;
                    self.connection
                        .update(&self.table, &changes, &json!({ (self.primary_key.as_str()): id }))
                        .await?;
                }
            }
        }

        if options.callbacks {
            let event = match mode {
                SaveMode::Create => CallbackEvent::AfterCreate,
                SaveMode::Update => CallbackEvent::AfterUpdate,
            };
            self.run_callbacks(event, entity);
            self.run_callbacks(CallbackEvent::AfterSave, entity);
        }

        if options.associated {
            if !self.save_has_one(entity).await? {
                return Ok(false);
            }
            if !self.save_has_many(entity).await? {
                return Ok(false);
            }
            if !self.save_habtm(entity).await? {
                return Ok(false);
            }
        }

        entity.set_exists(true);
        entity.reset();
        Ok(true)
    }

    /// Stamp `created_at`/`updated_at` when the model declares them and the
    /// caller has not already set a value.
    fn touch_timestamps(&self, entity: &mut Entity, mode: SaveMode) {
        let now = Utc::now().naive_utc().format("%Y-%m-%d %H:%M:%S").to_string();
        if mode == SaveMode::Create
            && self.columns.iter().any(|c| c == "created_at")
            && !entity.is_dirty("created_at")
        {
            entity.set("created_at", json!(now.clone()));
        }
        if self.columns.iter().any(|c| c == "updated_at") && !entity.is_dirty("updated_at") {
            entity.set("updated_at", json!(now));
        }
    }
}
