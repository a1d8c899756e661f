//! # relic-orm: runtime-configured ActiveRecord ORM
//!
//! Models are declared at runtime (table, columns, associations, validation
//! rules, lifecycle callbacks) and registered in an explicit [`ModelRegistry`].
//! The framework generates SQL through a conditions-tree [`QueryBuilder`],
//! executes it over a [`Connection`], and hydrates joined result sets into
//! nested [`Entity`] graphs wrapped in [`Collection`]s.
//!
//! Saves and deletes cascade through declared associations (belongs-to,
//! has-one, has-many, has-and-belongs-to-many) inside a connection-scoped
//! transaction with rollback on failure.

pub mod association;
pub mod callbacks;
pub mod collection;
pub mod connection;
pub mod datasource;
pub mod entity;
pub mod error;
pub mod finder;
pub mod inflector;
pub mod marshaller;
pub mod model;
pub mod query;
pub mod registry;
pub mod validation;
pub mod value;

pub use association::{Association, AssociationKind, HabtmMode};
pub use callbacks::{CallbackEvent, CallbackOutcome};
pub use collection::Collection;
pub use connection::{Connection, QueryLog, RowMode};
pub use datasource::{Datasource, DatasourceConfig, PostgresDatasource, Row, SqliteDatasource};
pub use entity::{Entity, EntityValue};
pub use error::{DatasourceError, OrmError, OrmResult, QueryBuilderError};
pub use finder::{AssociationLoader, EagerQueryLoader, Finder};
pub use marshaller::{MarshalOptions, Marshaller};
pub use model::{
    Associated, DeleteOptions, Model, ModelBuilder, ModelQuery, QueryOptions, SaveOptions,
};
pub use query::{Join, JoinKind, QueryBuilder, QueryParams};
pub use registry::ModelRegistry;
pub use validation::{SaveMode, ValidationRule, Validator};
