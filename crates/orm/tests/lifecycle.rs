//! Save/find/delete lifecycle against an in-memory SQLite datasource.

mod common;

use serde_json::json;

use relic_orm::{DeleteOptions, QueryOptions};

use common::{blog_registry, create_user};

#[tokio::test]
async fn save_then_get_round_trips_written_values() {
    let registry = blog_registry().await;
    let users = registry.get("User").unwrap();

    let mut user = users.new_entity();
    user.set("name", json!("jo"));
    user.set("email", json!("jo@example.com"));
    assert!(users.save(&mut user, Default::default()).await.unwrap());

    // save leaves the entity clean and persisted
    assert!(!user.has_dirty());
    assert_eq!(user.exists(), Some(true));
    assert!(user.created());

    let id = user.get("id").cloned().unwrap();
    let fetched = users.get(id).await.unwrap();
    assert_eq!(fetched.get("name"), Some(&json!("jo")));
    assert_eq!(fetched.get("email"), Some(&json!("jo@example.com")));
}

#[tokio::test]
async fn get_for_a_missing_row_is_record_not_found() {
    let registry = blog_registry().await;
    let users = registry.get("User").unwrap();
    let err = users.get(json!(999)).await.unwrap_err();
    assert!(matches!(err, relic_orm::OrmError::RecordNotFound(_)));
}

#[tokio::test]
async fn save_updates_only_dirty_columns() {
    let registry = blog_registry().await;
    let users = registry.get("User").unwrap();

    let mut user = users.new_entity();
    user.set("name", json!("sam"));
    user.set("email", json!("sam@example.com"));
    users.save(&mut user, Default::default()).await.unwrap();
    let id = user.get("id").cloned().unwrap();

    let mut fetched = users.get(id.clone()).await.unwrap();
    fetched.set("name", json!("sam renamed"));
    assert!(users.save(&mut fetched, Default::default()).await.unwrap());

    let reloaded = users.get(id).await.unwrap();
    assert_eq!(reloaded.get("name"), Some(&json!("sam renamed")));
    assert_eq!(reloaded.get("email"), Some(&json!("sam@example.com")));
}

#[tokio::test]
async fn create_stamps_timestamp_columns() {
    let registry = blog_registry().await;
    let bookmarks = registry.get("Bookmark").unwrap();

    let mut bookmark = bookmarks.new_entity();
    bookmark.set("title", json!("stamped"));
    assert!(bookmarks.save(&mut bookmark, Default::default()).await.unwrap());

    let reloaded = bookmarks
        .get(bookmark.get("id").cloned().unwrap())
        .await
        .unwrap();
    assert!(reloaded.get("created_at").and_then(|v| v.as_str()).is_some());
    assert!(reloaded.get("updated_at").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn validation_failure_returns_false_with_messages() {
    let registry = blog_registry().await;
    let users = registry.get("User").unwrap();

    let mut user = users.new_entity();
    user.set("name", json!(""));
    let saved = users.save(&mut user, Default::default()).await.unwrap();
    assert!(!saved);
    assert_eq!(user.field_errors("name"), ["cannot be blank"]);
    assert_eq!(users.count(QueryOptions::default()).await.unwrap(), 0);
}

#[tokio::test]
async fn belongs_to_join_prunes_unmatched_rows() {
    let registry = blog_registry().await;
    let bookmarks = registry.get("Bookmark").unwrap();

    // no user_id - the LEFT JOIN matches nothing
    let mut orphan = bookmarks.new_entity();
    orphan.set("title", json!("orphan"));
    assert!(bookmarks.save(&mut orphan, Default::default()).await.unwrap());
    let orphan_id = orphan.get("id").cloned().unwrap();

    let loaded = bookmarks
        .get_with(
            orphan_id,
            QueryOptions {
                associated: vec!["User".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    // the property stays unset - no phantom empty entity
    assert!(loaded.entity("user").is_none());
    assert!(!loaded.has("user"));
}

#[tokio::test]
async fn belongs_to_join_hydrates_matched_rows() {
    let registry = blog_registry().await;
    let bookmarks = registry.get("Bookmark").unwrap();
    let user_id = create_user(&registry, "owner").await;

    let mut bookmark = bookmarks.new_entity();
    bookmark.set("title", json!("rust blog"));
    bookmark.set("user_id", user_id.clone());
    assert!(bookmarks.save(&mut bookmark, Default::default()).await.unwrap());

    let loaded = bookmarks
        .get_with(
            bookmark.get("id").cloned().unwrap(),
            QueryOptions {
                associated: vec!["User".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let user = loaded.entity("user").expect("joined user entity");
    assert_eq!(user.get("id"), Some(&user_id));
    assert_eq!(user.get("name"), Some(&json!("owner")));
}

#[tokio::test]
async fn failed_has_many_cascade_rolls_back_the_parent_row() {
    let registry = blog_registry().await;
    let users = registry.get("User").unwrap();

    let mut user = users.new_entity();
    user.set("name", json!("casey"));

    // blank title fails Bookmark validation mid-cascade
    let mut invalid = relic_orm::Entity::named("Bookmark");
    invalid.set("title", json!(""));
    let mut bookmarks = relic_orm::Collection::new();
    bookmarks.push(invalid);
    user.set("bookmarks", bookmarks);

    let saved = users.save(&mut user, Default::default()).await.unwrap();
    assert!(!saved);

    // the user row was inserted before the cascade, then rolled back
    let found = users
        .first(QueryOptions {
            conditions: Some(json!({"name": "casey"})),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(found.is_none());
    assert!(!registry.connection().transaction_started());
}

#[tokio::test]
async fn delete_cascades_to_dependent_bookmarks_only() {
    let registry = blog_registry().await;
    let users = registry.get("User").unwrap();
    let bookmarks = registry.get("Bookmark").unwrap();

    let doomed_id = create_user(&registry, "doomed").await;
    let safe_id = create_user(&registry, "safe").await;

    for title in ["first", "second"] {
        let mut bookmark = bookmarks.new_entity();
        bookmark.set("title", json!(title));
        bookmark.set("user_id", doomed_id.clone());
        assert!(bookmarks.save(&mut bookmark, Default::default()).await.unwrap());
    }
    let mut keeper = bookmarks.new_entity();
    keeper.set("title", json!("keeper"));
    keeper.set("user_id", safe_id.clone());
    assert!(bookmarks.save(&mut keeper, Default::default()).await.unwrap());

    let mut doomed = users.get(doomed_id.clone()).await.unwrap();
    assert!(users
        .delete(&mut doomed, DeleteOptions::default())
        .await
        .unwrap());
    assert!(doomed.deleted());
    assert_eq!(doomed.exists(), Some(false));

    assert_eq!(bookmarks.count(QueryOptions::default()).await.unwrap(), 1);
    let remaining = bookmarks
        .first(QueryOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(remaining.get("title"), Some(&json!("keeper")));
    assert_eq!(remaining.get("user_id"), Some(&safe_id));
}

#[tokio::test]
async fn delete_without_cascade_keeps_children() {
    let registry = blog_registry().await;
    let users = registry.get("User").unwrap();
    let bookmarks = registry.get("Bookmark").unwrap();

    let user_id = create_user(&registry, "lingering").await;
    let mut bookmark = bookmarks.new_entity();
    bookmark.set("title", json!("stays"));
    bookmark.set("user_id", user_id.clone());
    assert!(bookmarks.save(&mut bookmark, Default::default()).await.unwrap());

    let mut user = users.get(user_id).await.unwrap();
    assert!(users
        .delete(
            &mut user,
            DeleteOptions {
                cascade: false,
                ..Default::default()
            },
        )
        .await
        .unwrap());
    assert_eq!(bookmarks.count(QueryOptions::default()).await.unwrap(), 1);
}

#[tokio::test]
async fn has_many_load_groups_children_per_parent() {
    let registry = blog_registry().await;
    let users = registry.get("User").unwrap();
    let bookmarks = registry.get("Bookmark").unwrap();

    let a = create_user(&registry, "alpha").await;
    let b = create_user(&registry, "beta").await;
    for (title, owner) in [("one", &a), ("two", &a), ("three", &b)] {
        let mut bookmark = bookmarks.new_entity();
        bookmark.set("title", json!(title));
        bookmark.set("user_id", (*owner).clone());
        assert!(bookmarks.save(&mut bookmark, Default::default()).await.unwrap());
    }

    let loaded = users
        .get_with(
            a,
            QueryOptions {
                associated: vec!["Bookmark".into()],
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let children = loaded.collection("bookmarks").expect("bookmarks loaded");
    assert_eq!(children.len(), 2);
    let titles: Vec<&str> = children
        .iter()
        .filter_map(|c| c.get("title").and_then(|t| t.as_str()))
        .collect();
    assert_eq!(titles, ["one", "two"]);
}

#[tokio::test]
async fn fluent_query_filters_orders_and_limits() {
    let registry = blog_registry().await;
    let bookmarks = registry.get("Bookmark").unwrap();
    let user_id = create_user(&registry, "reader").await;

    for title in ["c", "a", "b"] {
        let mut bookmark = bookmarks.new_entity();
        bookmark.set("title", json!(title));
        bookmark.set("user_id", user_id.clone());
        assert!(bookmarks.save(&mut bookmark, Default::default()).await.unwrap());
    }

    let results = bookmarks
        .query()
        .where_(json!({"user_id": user_id}))
        .order(&["title"])
        .limit(2)
        .all()
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].get("title"), Some(&json!("a")));
    assert_eq!(results[1].get("title"), Some(&json!("b")));

    let count = bookmarks
        .query()
        .where_(json!({"title !=": "a"}))
        .count()
        .await
        .unwrap();
    assert_eq!(count, 2);
}
