//! Conditions-tree compilation
//!
//! The grammar, over `serde_json::Value`:
//!
//! - an **object** maps `"field"` / `"field OP"` keys to values, with the
//!   boolean keys `AND` / `OR` / `NOT` holding nested condition trees;
//! - an **array** is a sequence of fragments: a bare string is raw SQL, an
//!   object is a nested condition map;
//! - `field = null` compiles to `IS NULL`, `field != null` to `IS NOT NULL`;
//! - an array value under `=` / `!=` rewrites the operator to `IN` / `NOT IN`
//!   with one placeholder per element;
//! - `BETWEEN` / `NOT BETWEEN` require exactly two elements.

use serde_json::Value;

use crate::error::QueryBuilderError;

use super::builder::QueryBuilder;
use super::types::Operator;

impl QueryBuilder {
    /// Compile a conditions tree into a SQL expression string, binding
    /// values as named placeholders. Returns an empty string for an empty
    /// tree.
    pub fn conditions(&mut self, tree: &Value) -> Result<String, QueryBuilderError> {
        let parts = self.compile_list(tree)?;
        Ok(parts.join(" AND "))
    }

    fn compile_list(&mut self, tree: &Value) -> Result<Vec<String>, QueryBuilderError> {
        match tree {
            Value::Null => Ok(Vec::new()),
            Value::String(raw) => Ok(vec![raw.clone()]),
            Value::Array(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(raw) => parts.push(raw.clone()),
                        Value::Object(_) => {
                            let inner = self.compile_list(item)?;
                            parts.push(parenthesize_if_compound(inner));
                        }
                        other => {
                            return Err(QueryBuilderError::InvalidConditions(format!(
                                "unexpected condition fragment {}",
                                other
                            )))
                        }
                    }
                }
                Ok(parts)
            }
            Value::Object(map) => {
                let mut parts = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let upper = key.trim().to_uppercase();
                    match upper.as_str() {
                        "AND" | "OR" | "NOT" => parts.push(self.boolean_group(&upper, value)?),
                        _ => parts.push(self.expression(key, value)?),
                    }
                }
                Ok(parts)
            }
            other => Err(QueryBuilderError::InvalidConditions(format!(
                "unexpected conditions value {}",
                other
            ))),
        }
    }

    fn boolean_group(&mut self, keyword: &str, value: &Value) -> Result<String, QueryBuilderError> {
        let inner = self.compile_list(value)?;
        if inner.is_empty() {
            return Err(QueryBuilderError::InvalidConditions(format!(
                "empty {} group",
                keyword
            )));
        }
        match keyword {
            "NOT" => Ok(format!("NOT ({})", inner.join(" AND "))),
            "OR" => Ok(format!("({})", inner.join(" OR "))),
            _ => Ok(format!("({})", inner.join(" AND "))),
        }
    }

    /// One `field [OP] => value` expression.
    fn expression(&mut self, key: &str, value: &Value) -> Result<String, QueryBuilderError> {
        let (field, operator) = split_condition_key(key)?;
        let field = self.prefix_field(&field);

        match operator {
            Operator::Equal => match value {
                Value::Null => Ok(format!("{} IS NULL", field)),
                Value::Array(items) => self.in_list(&field, Operator::In, items),
                _ => Ok(format!("{} = {}", field, self.bind(value.clone()))),
            },
            Operator::NotEqual => match value {
                Value::Null => Ok(format!("{} IS NOT NULL", field)),
                Value::Array(items) => self.in_list(&field, Operator::NotIn, items),
                _ => Ok(format!("{} != {}", field, self.bind(value.clone()))),
            },
            Operator::In | Operator::NotIn => match value {
                Value::Array(items) => self.in_list(&field, operator, items),
                _ => Err(QueryBuilderError::InvalidConditions(format!(
                    "{} requires an array of values",
                    operator
                ))),
            },
            Operator::Between | Operator::NotBetween => match value {
                Value::Array(items) if items.len() == 2 => {
                    let low = self.bind(items[0].clone());
                    let high = self.bind(items[1].clone());
                    Ok(format!("({} {} {} AND {})", field, operator, low, high))
                }
                _ => Err(QueryBuilderError::BetweenArity),
            },
            _ => Ok(format!(
                "{} {} {}",
                field,
                operator,
                self.bind(value.clone())
            )),
        }
    }

    fn in_list(
        &mut self,
        field: &str,
        operator: Operator,
        items: &[Value],
    ) -> Result<String, QueryBuilderError> {
        let placeholders: Vec<String> = items.iter().map(|v| self.bind(v.clone())).collect();
        Ok(format!(
            "{} {} ({})",
            field,
            operator,
            placeholders.join(", ")
        ))
    }
}

fn parenthesize_if_compound(mut parts: Vec<String>) -> String {
    if parts.len() == 1 {
        parts.remove(0)
    } else {
        format!("({})", parts.join(" AND "))
    }
}

/// Split `"field"` / `"field OP"` into the field name and its operator.
fn split_condition_key(key: &str) -> Result<(String, Operator), QueryBuilderError> {
    let trimmed = key.trim();
    match trimmed.split_once(char::is_whitespace) {
        None => Ok((trimmed.to_string(), Operator::Equal)),
        Some((field, op)) => Ok((field.to_string(), Operator::parse(op)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn builder() -> QueryBuilder {
        QueryBuilder::new("articles", Some("Article"))
    }

    #[test]
    fn simple_equality_binds_a_placeholder() {
        let mut qb = builder();
        let sql = qb.conditions(&json!({"status": "draft"})).unwrap();
        assert_eq!(sql, "Article.status = :a0");
        assert_eq!(qb.values(), &[("a0".to_string(), json!("draft"))]);
    }

    #[test]
    fn operator_suffix_in_key() {
        let mut qb = builder();
        let sql = qb.conditions(&json!({"age >=": 18})).unwrap();
        assert_eq!(sql, "Article.age >= :a0");
    }

    #[test]
    fn null_semantics() {
        let mut qb = builder();
        assert_eq!(
            qb.conditions(&json!({"deleted_at": null})).unwrap(),
            "Article.deleted_at IS NULL"
        );
        assert_eq!(
            qb.conditions(&json!({"deleted_at !=": null})).unwrap(),
            "Article.deleted_at IS NOT NULL"
        );
    }

    #[test]
    fn array_value_rewrites_to_in() {
        let mut qb = builder();
        let sql = qb.conditions(&json!({"id": [1, 2, 3]})).unwrap();
        assert_eq!(sql, "Article.id IN (:a0, :a1, :a2)");
        assert_eq!(qb.values().len(), 3);
    }

    #[test]
    fn array_value_with_not_equal_rewrites_to_not_in() {
        let mut qb = builder();
        let sql = qb.conditions(&json!({"id !=": [1, 2]})).unwrap();
        assert_eq!(sql, "Article.id NOT IN (:a0, :a1)");
    }

    #[test]
    fn not_group() {
        let mut qb = builder();
        let sql = qb.conditions(&json!({"NOT": {"status": "draft"}})).unwrap();
        assert_eq!(sql, "NOT (Article.status = :a0)");
    }

    #[test]
    fn or_group_joins_with_or() {
        let mut qb = builder();
        let sql = qb
            .conditions(&json!({"OR": {"owner_id": 1, "public": true}}))
            .unwrap();
        assert_eq!(sql, "(Article.owner_id = :a0 OR Article.public = :a1)");
    }

    #[test]
    fn raw_fragments_pass_through() {
        let mut qb = builder();
        let sql = qb
            .conditions(&json!(["Article.created_at > NOW() - INTERVAL '1 day'"]))
            .unwrap();
        assert_eq!(sql, "Article.created_at > NOW() - INTERVAL '1 day'");
        assert!(qb.values().is_empty());
    }

    #[test]
    fn mixed_array_of_raw_and_map() {
        let mut qb = builder();
        let sql = qb
            .conditions(&json!(["Article.id = User.article_id", {"status": "ok"}]))
            .unwrap();
        assert_eq!(
            sql,
            "Article.id = User.article_id AND Article.status = :a0"
        );
    }

    #[test]
    fn between_requires_two_values() {
        let mut qb = builder();
        let sql = qb.conditions(&json!({"age BETWEEN": [18, 30]})).unwrap();
        assert_eq!(sql, "(Article.age BETWEEN :a0 AND :a1)");

        let err = qb.conditions(&json!({"age BETWEEN": [18]})).unwrap_err();
        assert!(matches!(err, QueryBuilderError::BetweenArity));
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let mut qb = builder();
        let err = qb.conditions(&json!({"age %%": 1})).unwrap_err();
        assert!(matches!(err, QueryBuilderError::InvalidOperator(_)));
    }

    #[test]
    fn qualified_fields_are_not_reprefixed() {
        let mut qb = builder();
        let sql = qb.conditions(&json!({"User.id": 5})).unwrap();
        assert_eq!(sql, "User.id = :a0");
    }

    #[test]
    fn in_operator_requires_array() {
        let mut qb = builder();
        let err = qb.conditions(&json!({"id IN": 3})).unwrap_err();
        assert!(matches!(err, QueryBuilderError::InvalidConditions(_)));
    }
}
