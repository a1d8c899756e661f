//! Statement rendering - SELECT / INSERT / UPDATE / DELETE

use serde_json::Value;

use crate::error::QueryBuilderError;

use super::builder::QueryBuilder;
use super::types::QueryParams;

impl QueryBuilder {
    /// Render a SELECT for the builder's table/alias.
    ///
    /// Bare field names are prefixed with the alias; `expr AS name` fields
    /// are tracked as special and excluded from prefixing in group and order
    /// clauses.
    pub fn select_statement(
        &mut self,
        fields: &[String],
        params: &QueryParams,
    ) -> Result<String, QueryBuilderError> {
        if fields.is_empty() {
            return Err(QueryBuilderError::MissingFields);
        }

        let mut rendered_fields = Vec::with_capacity(fields.len());
        for field in fields {
            if let Some(pos) = find_as(field) {
                let alias_name = field[pos + 4..].trim();
                self.mark_special(alias_name);
                rendered_fields.push(field.clone());
            } else {
                rendered_fields.push(self.prefix_field(field));
            }
        }

        let mut sql = format!(
            "SELECT {} FROM {} AS {}",
            rendered_fields.join(", "),
            self.table(),
            self.alias()
        );

        for join in &params.joins {
            let alias = join.alias.as_deref().unwrap_or(&join.table);
            let on = self.conditions(&join.conditions)?;
            sql.push_str(&format!(
                " {} {} AS {} ON ({})",
                join.kind, join.table, alias, on
            ));
        }

        if let Some(tree) = &params.conditions {
            let clause = self.conditions(tree)?;
            if !clause.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clause);
            }
        }

        if !params.group.is_empty() {
            let group: Vec<String> = params.group.iter().map(|g| self.prefix_field(g)).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&group.join(", "));
        }

        if let Some(tree) = &params.having {
            let clause = self.conditions(tree)?;
            if !clause.is_empty() {
                sql.push_str(" HAVING ");
                sql.push_str(&clause);
            }
        }

        if !params.order.is_empty() {
            let order: Vec<String> = params
                .order
                .iter()
                .map(|entry| self.prefix_order_entry(entry))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order.join(", "));
        }

        self.push_limit_offset(&mut sql, params);

        if params.lock {
            sql.push_str(" FOR UPDATE");
        }

        Ok(sql)
    }

    /// Render an INSERT. Column order follows the data slice.
    pub fn insert_statement(
        &mut self,
        data: &[(String, Value)],
    ) -> Result<String, QueryBuilderError> {
        if data.is_empty() {
            return Err(QueryBuilderError::MissingData("insert"));
        }
        let columns: Vec<&str> = data.iter().map(|(c, _)| c.as_str()).collect();
        let placeholders: Vec<String> = data
            .iter()
            .map(|(_, value)| self.bind(value.clone()))
            .collect();
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table(),
            columns.join(", "),
            placeholders.join(", ")
        ))
    }

    /// Render an UPDATE over the data slice, constrained by a conditions
    /// tree.
    pub fn update_statement(
        &mut self,
        data: &[(String, Value)],
        conditions: &Value,
    ) -> Result<String, QueryBuilderError> {
        if data.is_empty() {
            return Err(QueryBuilderError::MissingData("update"));
        }
        let assignments: Vec<String> = data
            .iter()
            .map(|(column, value)| format!("{} = {}", column, self.bind(value.clone())))
            .collect();
        let mut sql = format!("UPDATE {} SET {}", self.table(), assignments.join(", "));
        let clause = self.conditions(conditions)?;
        if !clause.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clause);
        }
        Ok(sql)
    }

    /// Render a DELETE. Unconstrained deletes are refused.
    pub fn delete_statement(&mut self, conditions: &Value) -> Result<String, QueryBuilderError> {
        let clause = self.conditions(conditions)?;
        if clause.is_empty() {
            return Err(QueryBuilderError::MissingConditions);
        }
        Ok(format!("DELETE FROM {} WHERE {}", self.table(), clause))
    }

    fn prefix_order_entry(&self, entry: &str) -> String {
        match entry.split_once(' ') {
            Some((field, direction)) => {
                format!("{} {}", self.prefix_field(field), direction)
            }
            None => self.prefix_field(entry),
        }
    }

    fn push_limit_offset(&self, sql: &mut String, params: &QueryParams) {
        if let Some(limit) = params.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
            // page wins over an explicit offset
            let offset = match params.page {
                Some(page) if page > 0 => Some(page * limit - limit),
                Some(_) => Some(0),
                None => params.offset,
            };
            if let Some(offset) = offset {
                if offset > 0 {
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
            }
        }
    }
}

fn find_as(field: &str) -> Option<usize> {
    field.find(" AS ").or_else(|| field.find(" as "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::types::{Join, JoinKind};
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn plain_select() {
        let mut qb = QueryBuilder::new("bookmarks", Some("Bookmark"));
        let sql = qb
            .select_statement(&fields(&["id", "title"]), &QueryParams::default())
            .unwrap();
        assert_eq!(
            sql,
            "SELECT Bookmark.id, Bookmark.title FROM bookmarks AS Bookmark"
        );
    }

    #[test]
    fn select_with_conditions_order_and_limit() {
        let mut qb = QueryBuilder::new("bookmarks", Some("Bookmark"));
        let params = QueryParams {
            conditions: Some(json!({"user_id": 7})),
            order: vec!["created_at DESC".to_string()],
            limit: Some(10),
            ..Default::default()
        };
        let sql = qb.select_statement(&fields(&["id"]), &params).unwrap();
        assert_eq!(
            sql,
            "SELECT Bookmark.id FROM bookmarks AS Bookmark WHERE Bookmark.user_id = :b0 \
             ORDER BY Bookmark.created_at DESC LIMIT 10"
        );
    }

    #[test]
    fn page_overrides_offset() {
        let mut qb = QueryBuilder::new("bookmarks", None);
        let params = QueryParams {
            limit: Some(20),
            offset: Some(3),
            page: Some(3),
            ..Default::default()
        };
        let sql = qb.select_statement(&fields(&["id"]), &params).unwrap();
        assert!(sql.ends_with("LIMIT 20 OFFSET 40"));
    }

    #[test]
    fn join_rendering_defaults_to_left() {
        let mut qb = QueryBuilder::new("bookmarks", Some("Bookmark"));
        let params = QueryParams {
            joins: vec![Join::new(
                "users",
                json!(["Bookmark.user_id = User.id"]),
            )
            .aliased("User")],
            ..Default::default()
        };
        let sql = qb.select_statement(&fields(&["id"]), &params).unwrap();
        assert_eq!(
            sql,
            "SELECT Bookmark.id FROM bookmarks AS Bookmark \
             LEFT JOIN users AS User ON (Bookmark.user_id = User.id)"
        );
    }

    #[test]
    fn inner_join_kind() {
        let mut qb = QueryBuilder::new("bookmarks", Some("Bookmark"));
        let params = QueryParams {
            joins: vec![Join::new("users", json!(["a = b"])).kind(JoinKind::Inner)],
            ..Default::default()
        };
        let sql = qb.select_statement(&fields(&["id"]), &params).unwrap();
        assert!(sql.contains("INNER JOIN users AS users ON (a = b)"));
    }

    #[test]
    fn special_fields_skip_prefixing_in_group_and_order() {
        let mut qb = QueryBuilder::new("bookmarks", Some("Bookmark"));
        let params = QueryParams {
            group: vec!["total".to_string(), "user_id".to_string()],
            order: vec!["total".to_string()],
            ..Default::default()
        };
        let sql = qb
            .select_statement(
                &fields(&["COUNT(*) AS total", "user_id"]),
                &params,
            )
            .unwrap();
        assert!(sql.contains("GROUP BY total, Bookmark.user_id"));
        assert!(sql.ends_with("ORDER BY total"));
    }

    #[test]
    fn lock_appends_for_update() {
        let mut qb = QueryBuilder::new("bookmarks", None);
        let params = QueryParams {
            lock: true,
            ..Default::default()
        };
        let sql = qb.select_statement(&fields(&["id"]), &params).unwrap();
        assert!(sql.ends_with(" FOR UPDATE"));
    }

    #[test]
    fn empty_field_list_is_refused() {
        let mut qb = QueryBuilder::new("bookmarks", None);
        let err = qb
            .select_statement(&[], &QueryParams::default())
            .unwrap_err();
        assert!(matches!(err, QueryBuilderError::MissingFields));
    }

    #[test]
    fn insert_statement_binds_each_column() {
        let mut qb = QueryBuilder::new("contact_tasks", None);
        let sql = qb
            .insert_statement(&[
                ("title".to_string(), json!("call")),
                ("done".to_string(), json!(false)),
            ])
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO contact_tasks (title, done) VALUES (:ct0, :ct1)"
        );
        assert_eq!(qb.values().len(), 2);
    }

    #[test]
    fn insert_requires_data() {
        let mut qb = QueryBuilder::new("bookmarks", None);
        assert!(matches!(
            qb.insert_statement(&[]).unwrap_err(),
            QueryBuilderError::MissingData("insert")
        ));
    }

    #[test]
    fn update_statement_sets_and_constrains() {
        let mut qb = QueryBuilder::new("bookmarks", None);
        let sql = qb
            .update_statement(
                &[("title".to_string(), json!("new"))],
                &json!({"id": 9}),
            )
            .unwrap();
        assert_eq!(
            sql,
            "UPDATE bookmarks SET title = :b0 WHERE bookmarks.id = :b1"
        );
    }

    #[test]
    fn delete_requires_conditions() {
        let mut qb = QueryBuilder::new("bookmarks", None);
        assert!(matches!(
            qb.delete_statement(&Value::Null).unwrap_err(),
            QueryBuilderError::MissingConditions
        ));
        qb.clear();
        let sql = qb.delete_statement(&json!({"id": 1})).unwrap();
        assert_eq!(sql, "DELETE FROM bookmarks WHERE bookmarks.id = :b0");
    }

    #[test]
    fn builder_is_build_once_until_cleared() {
        let mut qb = QueryBuilder::new("bookmarks", None);
        qb.delete_statement(&json!({"id": 1})).unwrap();
        // without clear the counter keeps running - stale values remain
        let sql = qb.delete_statement(&json!({"id": 2})).unwrap();
        assert_eq!(sql, "DELETE FROM bookmarks WHERE bookmarks.id = :b1");
        assert_eq!(qb.values().len(), 2);
    }
}
