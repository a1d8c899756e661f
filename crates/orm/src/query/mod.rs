//! Query Builder - SQL statement construction from conditions trees
//!
//! A builder is scoped to one table/alias pair and produces exactly one
//! statement: build, read [`QueryBuilder::values`], execute, then `clear` (or
//! discard). Calling a second statement method without `clear` keeps the
//! previous bind values and counter - build once, discard.

pub mod builder;
pub mod conditions;
pub mod statements;
pub mod types;

pub use builder::QueryBuilder;
pub use types::{Join, JoinKind, Operator, QueryParams};
