//! Query builder core - table/alias scope, named placeholders, field
//! prefixing

use std::collections::HashSet;

use serde_json::Value;

/// Builds one SQL statement against a table/alias pair.
///
/// Placeholder names derive from the first letters of the
/// underscore-separated words of the table name (`contact_tasks` -> `ct`)
/// followed by an incrementing counter. The counter and bind map only reset
/// on [`QueryBuilder::clear`].
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    alias: String,
    placeholder_prefix: String,
    counter: usize,
    values: Vec<(String, Value)>,
    special_fields: HashSet<String>,
}

impl QueryBuilder {
    /// A builder for `table`, aliased as the model name for selects or the
    /// bare table name for writes.
    pub fn new(table: impl Into<String>, alias: Option<&str>) -> Self {
        let table = table.into();
        let alias = alias.map(str::to_string).unwrap_or_else(|| table.clone());
        let placeholder_prefix = table
            .split('_')
            .filter_map(|word| word.chars().next())
            .collect();
        QueryBuilder {
            table,
            alias,
            placeholder_prefix,
            counter: 0,
            values: Vec::new(),
            special_fields: HashSet::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Bind values accumulated by the last built statement, in bind order.
    /// Keys carry no placeholder sigil.
    pub fn values(&self) -> &[(String, Value)] {
        &self.values
    }

    /// Reset counter, bind map and special-field tracking for reuse.
    pub fn clear(&mut self) {
        self.counter = 0;
        self.values.clear();
        self.special_fields.clear();
    }

    /// Register a bind value and return its `:name` placeholder text.
    pub(crate) fn bind(&mut self, value: Value) -> String {
        let name = format!("{}{}", self.placeholder_prefix, self.counter);
        self.counter += 1;
        self.values.push((name.clone(), value));
        format!(":{}", name)
    }

    /// Track a field declared with `AS`; special fields are excluded from
    /// alias prefixing in group/order clauses.
    pub(crate) fn mark_special(&mut self, name: &str) {
        self.special_fields.insert(name.to_string());
    }

    pub(crate) fn is_special(&self, name: &str) -> bool {
        self.special_fields.contains(name)
    }

    /// Prefix a bare identifier with the current alias. Anything already
    /// qualified, aliased, or computed is left alone.
    pub(crate) fn prefix_field(&self, field: &str) -> String {
        if self.is_bare(field) && !self.is_special(field) {
            format!("{}.{}", self.alias, field)
        } else {
            field.to_string()
        }
    }

    pub(crate) fn is_bare(&self, field: &str) -> bool {
        !field.contains('.') && !field.contains(' ') && !field.contains('(')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn placeholder_prefix_from_table_words() {
        let mut builder = QueryBuilder::new("contact_tasks", None);
        assert_eq!(builder.bind(json!(1)), ":ct0");
        assert_eq!(builder.bind(json!(2)), ":ct1");
    }

    #[test]
    fn clear_resets_counter_and_values() {
        let mut builder = QueryBuilder::new("bookmarks", None);
        builder.bind(json!("x"));
        builder.clear();
        assert!(builder.values().is_empty());
        assert_eq!(builder.bind(json!("y")), ":b0");
    }

    #[test]
    fn alias_defaults_to_table() {
        let builder = QueryBuilder::new("tags", None);
        assert_eq!(builder.alias(), "tags");
        let builder = QueryBuilder::new("tags", Some("Tag"));
        assert_eq!(builder.alias(), "Tag");
    }

    #[test]
    fn prefixing_skips_qualified_and_computed_fields() {
        let builder = QueryBuilder::new("bookmarks", Some("Bookmark"));
        assert_eq!(builder.prefix_field("title"), "Bookmark.title");
        assert_eq!(builder.prefix_field("User.id"), "User.id");
        assert_eq!(builder.prefix_field("COUNT(*)"), "COUNT(*)");
    }
}
