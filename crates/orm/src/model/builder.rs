//! Model declaration and registration

use std::sync::Arc;

use dashmap::DashMap;

use crate::association::Association;
use crate::callbacks::{CallbackEvent, CallbackOutcome, CallbackSet};
use crate::collection::Collection;
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::inflector;
use crate::model::{Model, QueryOptions};
use crate::registry::ModelRegistry;
use crate::validation::{ValidationRule, Validator};

/// Declares a model: table, columns, associations, validation rules and
/// callbacks. `register` completes association defaults, detects the display
/// field and publishes the model into the registry.
pub struct ModelBuilder {
    name: String,
    table: Option<String>,
    primary_key: String,
    display_field: Option<String>,
    order: Vec<String>,
    columns: Vec<String>,
    associations: Vec<Association>,
    validators: Vec<Validator>,
    callbacks: CallbackSet,
}

impl ModelBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        ModelBuilder {
            name: name.into(),
            table: None,
            primary_key: "id".to_string(),
            display_field: None,
            order: Vec::new(),
            columns: Vec::new(),
            associations: Vec::new(),
            validators: Vec::new(),
            callbacks: CallbackSet::default(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn display_field(mut self, display_field: impl Into<String>) -> Self {
        self.display_field = Some(display_field.into());
        self
    }

    /// Default sort order applied when a find specifies none.
    pub fn order(mut self, order: &[&str]) -> Self {
        self.order = order.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn association(mut self, association: Association) -> Self {
        self.associations.push(association);
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.validators.push(validator);
        self
    }

    /// Shorthand for a rule with default options.
    pub fn validate(self, field: &str, rule: ValidationRule) -> Self {
        self.validator(Validator::new(field, rule))
    }

    pub fn callback(
        mut self,
        event: CallbackEvent,
        hook: impl Fn(&mut Entity) -> CallbackOutcome + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.register(event, Arc::new(hook));
        self
    }

    pub fn before_save(
        self,
        hook: impl Fn(&mut Entity) -> CallbackOutcome + Send + Sync + 'static,
    ) -> Self {
        self.callback(CallbackEvent::BeforeSave, hook)
    }

    pub fn after_save(
        self,
        hook: impl Fn(&mut Entity) -> CallbackOutcome + Send + Sync + 'static,
    ) -> Self {
        self.callback(CallbackEvent::AfterSave, hook)
    }

    pub fn before_delete(
        self,
        hook: impl Fn(&mut Entity) -> CallbackOutcome + Send + Sync + 'static,
    ) -> Self {
        self.callback(CallbackEvent::BeforeDelete, hook)
    }

    pub fn before_find(
        mut self,
        hook: impl Fn(&mut QueryOptions) -> CallbackOutcome + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.register_before_find(Arc::new(hook));
        self
    }

    pub fn after_find(
        mut self,
        hook: impl Fn(&mut Collection) + Send + Sync + 'static,
    ) -> Self {
        self.callbacks.register_after_find(Arc::new(hook));
        self
    }

    /// Complete defaults and publish into the registry.
    pub fn register(self, registry: &Arc<ModelRegistry>) -> OrmResult<Arc<Model>> {
        if self.columns.is_empty() {
            return Err(OrmError::Configuration(format!(
                "model '{}' declares no columns",
                self.name
            )));
        }
        if !self.columns.contains(&self.primary_key) {
            return Err(OrmError::Configuration(format!(
                "model '{}' is missing its primary key column '{}'",
                self.name, self.primary_key
            )));
        }

        let table = self
            .table
            .unwrap_or_else(|| inflector::table_name(&self.name));
        let display_field = match self.display_field {
            Some(field) => field,
            None => detect_display_field(&self.name, &self.columns, &self.primary_key),
        };
        let associations = self
            .associations
            .into_iter()
            .map(|a| a.completed(&self.name))
            .collect();

        let model = Arc::new(Model {
            name: self.name,
            table,
            primary_key: self.primary_key,
            display_field,
            order: self.order,
            columns: self.columns,
            associations,
            validators: self.validators,
            callbacks: self.callbacks,
            registry: Arc::downgrade(registry),
            connection: registry.connection().clone(),
            relations: DashMap::new(),
        });
        registry.insert(model.clone());
        Ok(model)
    }
}

/// `<underscored name>_name`, `name`, `title`, then the primary key.
fn detect_display_field(name: &str, columns: &[String], primary_key: &str) -> String {
    let conventional = format!("{}_name", inflector::underscore(name));
    for candidate in [conventional.as_str(), "name", "title"] {
        if columns.iter().any(|c| c == candidate) {
            return candidate.to_string();
        }
    }
    primary_key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::datasource::SqliteDatasource;

    fn registry() -> Arc<ModelRegistry> {
        let datasource = SqliteDatasource::in_memory().unwrap();
        ModelRegistry::new(Arc::new(Connection::new(Box::new(datasource))))
    }

    #[test]
    fn defaults_are_derived_from_the_name() {
        let registry = registry();
        let model = ModelBuilder::new("ContactTask")
            .columns(&["id", "title"])
            .register(&registry)
            .unwrap();
        assert_eq!(model.table(), "contact_tasks");
        assert_eq!(model.primary_key(), "id");
        assert_eq!(model.display_field(), "title");
    }

    #[test]
    fn display_field_detection_order() {
        let registry = registry();
        let model = ModelBuilder::new("User")
            .columns(&["id", "user_name", "name", "title"])
            .register(&registry)
            .unwrap();
        assert_eq!(model.display_field(), "user_name");

        let model = ModelBuilder::new("Widget")
            .columns(&["id", "serial"])
            .register(&registry)
            .unwrap();
        assert_eq!(model.display_field(), "id");
    }

    #[test]
    fn registration_requires_declared_columns() {
        let registry = registry();
        assert!(matches!(
            ModelBuilder::new("Empty").register(&registry),
            Err(OrmError::Configuration(_))
        ));
        assert!(matches!(
            ModelBuilder::new("NoPk")
                .columns(&["title"])
                .register(&registry),
            Err(OrmError::Configuration(_))
        ));
    }

    #[test]
    fn relation_resolution_is_cached_and_eagerly_checked() {
        let registry = registry();
        let bookmark = ModelBuilder::new("Bookmark")
            .columns(&["id", "title", "user_id"])
            .association(Association::belongs_to("User"))
            .register(&registry)
            .unwrap();

        // User not registered yet - first use surfaces the error
        assert!(matches!(
            bookmark.relation("User"),
            Err(OrmError::MissingModel(_))
        ));

        ModelBuilder::new("User")
            .columns(&["id", "name"])
            .register(&registry)
            .unwrap();
        let user = bookmark.relation("User").unwrap();
        assert_eq!(user.name(), "User");

        // unknown alias is a declaration error
        assert!(matches!(
            bookmark.relation("Nope"),
            Err(OrmError::MissingAssociation { .. })
        ));
    }
}
