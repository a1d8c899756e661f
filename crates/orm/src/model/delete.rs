//! Delete lifecycle
//!
//! begin -> beforeDelete -> delete habtm links -> (if cascade) delete
//! dependents -> DELETE row -> afterDelete -> commit. Join-table links go
//! regardless of `dependent`; dependent hasOne/hasMany children are deleted
//! through their own model so their callbacks and cascades fire.

use serde_json::{json, Value};

use crate::callbacks::{CallbackEvent, CallbackOutcome};
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::model::{BoxFuture, DeleteOptions, Model};

impl Model {
    /// Delete an entity's backing row. `Ok(false)` on a callback halt or
    /// when the row no longer exists.
    pub async fn delete(&self, entity: &mut Entity, options: DeleteOptions) -> OrmResult<bool> {
        self.delete_boxed(entity, options).await
    }

    pub(crate) fn delete_boxed<'a>(
        &'a self,
        entity: &'a mut Entity,
        options: DeleteOptions,
    ) -> BoxFuture<'a, OrmResult<bool>> {
        Box::pin(async move {
            let id = self
                .pk_value(entity)
                .ok_or_else(|| OrmError::MissingPrimaryKey(self.primary_key.clone()))?;

            let began = options.transaction && self.connection.begin().await?;
            match self.process_delete(entity, &options, &id).await {
                Ok(true) => {
                    if began {
                        self.connection.commit().await?;
                        if options.callbacks {
                            self.run_callbacks(CallbackEvent::AfterCommit, entity);
                        }
                    }
                    entity.set_deleted(true);
                    entity.set_exists(false);
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

    async fn process_delete(
        &self,
        entity: &mut Entity,
        options: &DeleteOptions,
        id: &Value,
    ) -> OrmResult<bool> {
        if options.callbacks
            && self.run_callbacks(CallbackEvent::BeforeDelete, entity) == CallbackOutcome::Halt
        {
            return Ok(false);
        }

        self.delete_habtm_links(id).await?;
        if options.cascade {
            self.delete_dependent(id).await?;
        }

        let affected = self
            .connection
            .delete(
                &self.table,
                &json!({ (self.primary_key.as_str()): id.clone() }),
            )
            .await?;

        if options.callbacks {
            self.run_callbacks(CallbackEvent::AfterDelete, entity);
        }
        Ok(affected > 0)
    }
}
