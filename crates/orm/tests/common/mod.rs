//! Shared fixtures: an in-memory SQLite datasource, the blog schema, and a
//! registry of User / Bookmark / Tag / Profile models.
#![allow(dead_code)]

use std::sync::Arc;

use serde_json::json;

use relic_orm::{
    Association, CallbackOutcome, Collection, Connection, Entity, HabtmMode, ModelBuilder,
    ModelRegistry, SqliteDatasource, ValidationRule,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT,
        email TEXT
    )",
    "CREATE TABLE bookmarks (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        title TEXT,
        url TEXT,
        created_at TEXT,
        updated_at TEXT
    )",
    "CREATE TABLE tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT
    )",
    "CREATE TABLE bookmarks_tags (
        bookmark_id INTEGER,
        tag_id INTEGER
    )",
    "CREATE TABLE profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        bio TEXT
    )",
];

pub async fn blog_registry() -> Arc<ModelRegistry> {
    blog_registry_with(HabtmMode::Replace).await
}

/// Build the fixture registry with a chosen habtm reconciliation mode for
/// the Bookmark-Tag association.
pub async fn blog_registry_with(mode: HabtmMode) -> Arc<ModelRegistry> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let datasource = SqliteDatasource::in_memory().expect("open sqlite");
    let connection = Arc::new(Connection::new(Box::new(datasource)));
    for sql in SCHEMA {
        connection.execute(sql, &[]).await.expect("create schema");
    }

    let registry = ModelRegistry::new(connection);

    ModelBuilder::new("User")
        .columns(&["id", "name", "email"])
        .association(Association::has_many("Bookmark").dependent(true))
        .association(Association::has_one("Profile"))
        .validate("name", ValidationRule::NotBlank)
        .register(&registry)
        .expect("register User");

    ModelBuilder::new("Bookmark")
        .columns(&["id", "user_id", "title", "url", "created_at", "updated_at"])
        .association(Association::belongs_to("User"))
        .association(Association::has_and_belongs_to_many("Tag").mode(mode))
        .validate("title", ValidationRule::NotBlank)
        .before_save(split_tag_string)
        .register(&registry)
        .expect("register Bookmark");

    ModelBuilder::new("Tag")
        .columns(&["id", "title"])
        .register(&registry)
        .expect("register Tag");

    ModelBuilder::new("Profile")
        .columns(&["id", "user_id", "bio"])
        .register(&registry)
        .expect("register Profile");

    registry
}

/// The Bookmark beforeSave hook: a comma-separated `tag_string` becomes Tag
/// entities on the habtm property.
fn split_tag_string(entity: &mut Entity) -> CallbackOutcome {
    if let Some(tag_string) = entity.get("tag_string").and_then(|v| v.as_str()) {
        let mut tags = Collection::new();
        for title in tag_string.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let mut tag = Entity::named("Tag");
            tag.set("title", json!(title));
            tags.push(tag);
        }
        entity.set("tags", tags);
    }
    CallbackOutcome::Continue
}

/// Persist a user and return its id value.
pub async fn create_user(registry: &Arc<ModelRegistry>, name: &str) -> serde_json::Value {
    let users = registry.get("User").unwrap();
    let mut user = users.new_entity();
    user.set("name", json!(name));
    user.set("email", json!(format!("{}@example.com", name)));
    assert!(users.save(&mut user, Default::default()).await.unwrap());
    user.get("id").cloned().expect("user id assigned")
}

/// Count the join-table links for a bookmark.
pub async fn link_count(registry: &Arc<ModelRegistry>, bookmark_id: &serde_json::Value) -> usize {
    let rows = registry
        .connection()
        .select(
            "SELECT tag_id FROM bookmarks_tags WHERE bookmark_id = :bt0",
            &[("bt0".to_string(), bookmark_id.clone())],
        )
        .await
        .unwrap();
    rows.len()
}
