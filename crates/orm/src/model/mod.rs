//! Model - the façade over schema, associations, validation and lifecycle
//!
//! A `Model` is declared at runtime through [`ModelBuilder`] and registered
//! in a [`crate::ModelRegistry`]. It orchestrates find/save/delete
//! lifecycles, owns the association map and callback registrations, and
//! resolves related models through the registry exactly once per alias.

pub mod builder;
pub mod cascade;
pub mod delete;
pub mod finders;
pub mod save;

use std::pin::Pin;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::Value;

use crate::association::Association;
use crate::callbacks::{CallbackEvent, CallbackOutcome, CallbackSet};
use crate::connection::Connection;
use crate::entity::Entity;
use crate::error::{OrmError, OrmResult};
use crate::marshaller::Marshaller;
use crate::query::Join;
use crate::registry::ModelRegistry;
use crate::validation::{SaveMode, Validator};
use crate::value;

pub use builder::ModelBuilder;
pub use finders::ModelQuery;

pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Nested association-load request: which association, optionally which
/// fields, and its own nested requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Associated {
    pub name: String,
    pub fields: Vec<String>,
    pub associated: Vec<Associated>,
}

impl Associated {
    pub fn name(name: impl Into<String>) -> Self {
        Associated {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with(mut self, nested: Associated) -> Self {
        self.associated.push(nested);
        self
    }
}

impl From<&str> for Associated {
    fn from(name: &str) -> Self {
        Associated::name(name)
    }
}

/// Find descriptor. Defaults merge exactly once, at the public-method
/// boundary; downstream components only consume.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub conditions: Option<Value>,
    pub fields: Vec<String>,
    pub joins: Vec<Join>,
    pub order: Vec<String>,
    pub group: Vec<String>,
    pub having: Option<Value>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub page: Option<u64>,
    pub lock: bool,
    pub associated: Vec<Associated>,
    pub callbacks: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            conditions: None,
            fields: Vec::new(),
            joins: Vec::new(),
            order: Vec::new(),
            group: Vec::new(),
            having: None,
            limit: None,
            offset: None,
            page: None,
            lock: false,
            associated: Vec::new(),
            callbacks: true,
        }
    }
}

/// Save descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    pub validate: bool,
    pub callbacks: bool,
    /// Open a transaction around the whole save. Nested cascade saves pass
    /// `false` so commit/rollback authority stays with the outermost caller.
    pub transaction: bool,
    /// Cascade through declared associations.
    pub associated: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        SaveOptions {
            validate: true,
            callbacks: true,
            transaction: true,
            associated: true,
        }
    }
}

/// Delete descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOptions {
    pub cascade: bool,
    pub callbacks: bool,
    pub transaction: bool,
}

impl Default for DeleteOptions {
    fn default() -> Self {
        DeleteOptions {
            cascade: true,
            callbacks: true,
            transaction: true,
        }
    }
}

pub struct Model {
    pub(crate) name: String,
    pub(crate) table: String,
    pub(crate) primary_key: String,
    pub(crate) display_field: String,
    pub(crate) order: Vec<String>,
    pub(crate) columns: Vec<String>,
    pub(crate) associations: Vec<Association>,
    pub(crate) validators: Vec<Validator>,
    pub(crate) callbacks: CallbackSet,
    pub(crate) registry: Weak<ModelRegistry>,
    pub(crate) connection: Arc<Connection>,
    /// Related models, resolved once per alias for the process lifetime.
    pub(crate) relations: DashMap<String, Arc<Model>>,
}

impl Model {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn display_field(&self) -> &str {
        &self.display_field
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    /// Look up a declared association by alias.
    pub fn association(&self, alias: &str) -> OrmResult<&Association> {
        self.associations
            .iter()
            .find(|a| a.alias == alias)
            .ok_or_else(|| OrmError::MissingAssociation {
                model: self.name.clone(),
                association: alias.to_string(),
            })
    }

    /// Look up a declared association by the entity property it hydrates.
    pub fn association_for_property(&self, property: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.property == property)
    }

    /// Resolve the related model for an association alias through the
    /// registry. Resolution is cached; the handle never changes afterwards.
    pub fn relation(&self, alias: &str) -> OrmResult<Arc<Model>> {
        if let Some(found) = self.relations.get(alias) {
            return Ok(found.value().clone());
        }
        let association = self.association(alias)?;
        let registry = self
            .registry
            .upgrade()
            .ok_or_else(|| OrmError::Configuration("model registry was dropped".to_string()))?;
        let related = registry.get(&association.class_name)?;
        self.relations.insert(alias.to_string(), related.clone());
        Ok(related)
    }

    /// Fresh entity tagged with this model's name.
    pub fn new_entity(&self) -> Entity {
        Entity::named(&self.name)
    }

    pub fn marshaller(&self) -> Marshaller<'_> {
        Marshaller::new(self)
    }

    /// Run every applicable validation rule, recording messages on the
    /// entity. `true` when the entity came through clean.
    pub fn validates(&self, entity: &mut Entity, mode: SaveMode) -> bool {
        for validator in &self.validators {
            if validator.applies(mode) {
                validator.check(entity);
            }
        }
        !entity.has_errors()
    }

    pub(crate) fn run_callbacks(&self, event: CallbackEvent, entity: &mut Entity) -> CallbackOutcome {
        self.callbacks.run(event, entity)
    }

    /// Primary key value of an entity, when present and non-empty.
    pub(crate) fn pk_value(&self, entity: &Entity) -> Option<Value> {
        entity
            .get(&self.primary_key)
            .filter(|v| !value::is_empty(v))
            .cloned()
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("primary_key", &self.primary_key)
            .field("associations", &self.associations.len())
            .finish()
    }
}
