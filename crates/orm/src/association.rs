//! Association metadata
//!
//! A declared relationship between two models. Declarations are partial;
//! [`Association::completed`] fills in conventional defaults at model
//! registration time, and the resulting configuration is immutable for the
//! life of the process.

use serde_json::Value;

use crate::inflector;
use crate::query::{Join, JoinKind};

/// The four relationship kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    BelongsTo,
    HasOne,
    HasMany,
    HasAndBelongsToMany,
}

impl AssociationKind {
    /// Whether the association hydrates into a collection property.
    pub fn is_collection(self) -> bool {
        matches!(self, Self::HasMany | Self::HasAndBelongsToMany)
    }
}

/// Join-table reconciliation strategy for has-and-belongs-to-many saves.
///
/// `Append` reads the existing link ids and inserts only the missing ones -
/// a read-then-write sequence with no locking, so concurrent writers can
/// still race; wrap the save in a transaction with `lock` reads where that
/// matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HabtmMode {
    #[default]
    Replace,
    Append,
}

/// A declared association, after default completion.
#[derive(Debug, Clone)]
pub struct Association {
    pub kind: AssociationKind,
    /// Related model name, e.g. `Tag`.
    pub alias: String,
    /// Model to resolve through the registry; defaults to `alias`.
    pub class_name: String,
    /// Entity property the related data hydrates into.
    pub property: String,
    /// belongsTo: column on the owner; hasOne/hasMany/habtm: column on the
    /// related (or join) table pointing back at the owner.
    pub foreign_key: String,
    /// habtm only: join-table column pointing at the related model.
    pub association_foreign_key: String,
    /// habtm only.
    pub join_table: String,
    pub conditions: Option<Value>,
    pub fields: Vec<String>,
    pub order: Vec<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    /// Delete related records when the owner is deleted (hasOne/hasMany).
    pub dependent: bool,
    pub mode: HabtmMode,
}

impl Association {
    pub fn belongs_to(alias: impl Into<String>) -> Self {
        Self::new(AssociationKind::BelongsTo, alias)
    }

    pub fn has_one(alias: impl Into<String>) -> Self {
        Self::new(AssociationKind::HasOne, alias)
    }

    pub fn has_many(alias: impl Into<String>) -> Self {
        Self::new(AssociationKind::HasMany, alias)
    }

    pub fn has_and_belongs_to_many(alias: impl Into<String>) -> Self {
        Self::new(AssociationKind::HasAndBelongsToMany, alias)
    }

    fn new(kind: AssociationKind, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        Association {
            kind,
            class_name: alias.clone(),
            alias,
            property: String::new(),
            foreign_key: String::new(),
            association_foreign_key: String::new(),
            join_table: String::new(),
            conditions: None,
            fields: Vec::new(),
            order: Vec::new(),
            limit: None,
            offset: None,
            dependent: false,
            mode: HabtmMode::default(),
        }
    }

    pub fn class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = class_name.into();
        self
    }

    pub fn foreign_key(mut self, foreign_key: impl Into<String>) -> Self {
        self.foreign_key = foreign_key.into();
        self
    }

    pub fn association_foreign_key(mut self, key: impl Into<String>) -> Self {
        self.association_foreign_key = key.into();
        self
    }

    pub fn join_table(mut self, join_table: impl Into<String>) -> Self {
        self.join_table = join_table.into();
        self
    }

    pub fn conditions(mut self, conditions: Value) -> Self {
        self.conditions = Some(conditions);
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn order(mut self, order: &[&str]) -> Self {
        self.order = order.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn dependent(mut self, dependent: bool) -> Self {
        self.dependent = dependent;
        self
    }

    pub fn mode(mut self, mode: HabtmMode) -> Self {
        self.mode = mode;
        self
    }

    /// Fill conventional defaults given the owning model's name. Called once
    /// at registration; resolved configuration never changes afterwards.
    pub fn completed(mut self, owner: &str) -> Self {
        let related_snake = inflector::underscore(&self.alias);
        if self.property.is_empty() {
            self.property = if self.kind.is_collection() {
                inflector::pluralize(&related_snake)
            } else {
                related_snake.clone()
            };
        }
        if self.foreign_key.is_empty() {
            self.foreign_key = match self.kind {
                AssociationKind::BelongsTo => inflector::foreign_key(&self.alias),
                _ => inflector::foreign_key(owner),
            };
        }
        if self.kind == AssociationKind::HasAndBelongsToMany {
            if self.association_foreign_key.is_empty() {
                self.association_foreign_key = inflector::foreign_key(&self.alias);
            }
            if self.join_table.is_empty() {
                let mut tables = [
                    inflector::table_name(owner),
                    inflector::table_name(&self.alias),
                ];
                tables.sort();
                self.join_table = format!("{}_{}", tables[0], tables[1]);
            }
        }
        self
    }

    /// LEFT JOIN clause hydrating a first-level belongsTo/hasOne in the
    /// owner's primary SELECT.
    pub fn join(
        &self,
        owner_alias: &str,
        owner_primary_key: &str,
        related_table: &str,
        related_primary_key: &str,
    ) -> Join {
        let identity = match self.kind {
            AssociationKind::BelongsTo => format!(
                "{}.{} = {}.{}",
                owner_alias, self.foreign_key, self.alias, related_primary_key
            ),
            _ => format!(
                "{}.{} = {}.{}",
                owner_alias, owner_primary_key, self.alias, self.foreign_key
            ),
        };
        let mut tree = vec![Value::String(identity)];
        if let Some(extra) = &self.conditions {
            tree.push(extra.clone());
        }
        Join::new(related_table, Value::Array(tree))
            .aliased(&self.alias)
            .kind(JoinKind::Left)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn belongs_to_defaults() {
        let assoc = Association::belongs_to("User").completed("Bookmark");
        assert_eq!(assoc.foreign_key, "user_id");
        assert_eq!(assoc.property, "user");
        assert_eq!(assoc.class_name, "User");
    }

    #[test]
    fn has_many_defaults_point_back_at_the_owner() {
        let assoc = Association::has_many("Bookmark").completed("User");
        assert_eq!(assoc.foreign_key, "user_id");
        assert_eq!(assoc.property, "bookmarks");
    }

    #[test]
    fn habtm_join_table_is_sorted_and_pluralized() {
        let assoc = Association::has_and_belongs_to_many("Tag").completed("Bookmark");
        assert_eq!(assoc.join_table, "bookmarks_tags");
        assert_eq!(assoc.foreign_key, "bookmark_id");
        assert_eq!(assoc.association_foreign_key, "tag_id");
        assert_eq!(assoc.property, "tags");

        // alphabetical regardless of declaration side
        let assoc = Association::has_and_belongs_to_many("Bookmark").completed("Tag");
        assert_eq!(assoc.join_table, "bookmarks_tags");
    }

    #[test]
    fn overrides_survive_completion() {
        let assoc = Association::has_many("Comment")
            .foreign_key("author_id")
            .dependent(true)
            .completed("User");
        assert_eq!(assoc.foreign_key, "author_id");
        assert!(assoc.dependent);
    }

    #[test]
    fn belongs_to_join_clause() {
        let assoc = Association::belongs_to("User").completed("Bookmark");
        let join = assoc.join("Bookmark", "id", "users", "id");
        assert_eq!(join.table, "users");
        assert_eq!(join.alias.as_deref(), Some("User"));
        assert_eq!(
            join.conditions,
            json!(["Bookmark.user_id = User.id"])
        );
    }

    #[test]
    fn has_one_join_clause_carries_extra_conditions() {
        let assoc = Association::has_one("Profile")
            .conditions(json!({"Profile.active": true}))
            .completed("User");
        let join = assoc.join("User", "id", "profiles", "id");
        assert_eq!(
            join.conditions,
            json!(["User.id = Profile.user_id", {"Profile.active": true}])
        );
    }
}
