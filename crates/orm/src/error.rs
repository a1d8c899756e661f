//! Error types for the ORM
//!
//! Query-construction errors are raised before any I/O and are always fatal
//! to the current call. Datasource errors unwind any open transaction before
//! they propagate. Validation failures and callback halts are not errors at
//! all - they surface as `Ok(false)` from `save`/`delete` with messages on
//! the entity.

/// Result type alias for ORM operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Errors raised while constructing a SQL statement, before any I/O.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryBuilderError {
    #[error("invalid operator '{0}'")]
    InvalidOperator(String),

    #[error("BETWEEN conditions require exactly 2 values")]
    BetweenArity,

    #[error("fields are required for a select statement")]
    MissingFields,

    #[error("data is required for an {0} statement")]
    MissingData(&'static str),

    #[error("conditions are required for a delete statement")]
    MissingConditions,

    #[error("invalid conditions: {0}")]
    InvalidConditions(String),
}

/// Driver-level failures during connect or statement execution.
#[derive(Debug, thiserror::Error)]
pub enum DatasourceError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("statement failed: {message} (sql: {sql})")]
    Statement { sql: String, message: String },

    #[error("unsupported datasource url '{0}'")]
    UnsupportedScheme(String),
}

/// Top-level error type covering every component.
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    #[error(transparent)]
    QueryBuilder(#[from] QueryBuilderError),

    #[error(transparent)]
    Datasource(#[from] DatasourceError),

    /// Lookup of an unregistered model. Misconfiguration, raised eagerly.
    #[error("model '{0}' is not registered")]
    MissingModel(String),

    /// Lookup of an undeclared association on a model.
    #[error("model '{model}' has no association '{association}'")]
    MissingAssociation { model: String, association: String },

    #[error("record not found in '{0}'")]
    RecordNotFound(String),

    /// Save/delete called on an entity lacking its primary key value.
    #[error("primary key '{0}' has no value")]
    MissingPrimaryKey(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl From<anyhow::Error> for OrmError {
    fn from(err: anyhow::Error) -> Self {
        OrmError::Datasource(DatasourceError::Connection(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_builder_errors_display() {
        let err = QueryBuilderError::InvalidOperator("LIKE7".to_string());
        assert_eq!(err.to_string(), "invalid operator 'LIKE7'");

        let err = QueryBuilderError::BetweenArity;
        assert!(err.to_string().contains("exactly 2"));
    }

    #[test]
    fn datasource_error_carries_sql() {
        let err = DatasourceError::Statement {
            sql: "SELECT 1".to_string(),
            message: "boom".to_string(),
        };
        assert!(err.to_string().contains("SELECT 1"));
    }

    #[test]
    fn conversion_into_orm_error() {
        let err: OrmError = QueryBuilderError::MissingFields.into();
        assert!(matches!(err, OrmError::QueryBuilder(_)));
    }
}
