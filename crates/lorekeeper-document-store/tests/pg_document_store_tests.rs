//! Integration tests for `PgDocumentStore`.
//!
//! These need a live database: run with `DATABASE_URL` set and
//! `cargo test -- --ignored`.

use lorekeeper_core::ids::OwnerId;
use lorekeeper_core::store::DocumentStore;
use lorekeeper_document_store::PgDocumentStore;
use serde_json::json;
use sqlx::PgPool;

async fn store(pool: PgPool) -> PgDocumentStore {
    let store = PgDocumentStore::new(pool);
    store.ensure_schema().await.unwrap();
    store
}

#[sqlx::test(migrations = false)]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_put_and_get_round_trip(pool: PgPool) {
    let store = store(pool).await;
    let owner = OwnerId::new("player-1");

    store
        .put(&owner, "npc_tom", json!({"name": "Tom"}))
        .await
        .unwrap();

    assert_eq!(
        store.get(&owner, "npc_tom").await.unwrap(),
        Some(json!({"name": "Tom"}))
    );
}

#[sqlx::test(migrations = false)]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_merge_patch_unions_arrays_and_keeps_existing_on_null(pool: PgPool) {
    let store = store(pool).await;
    let owner = OwnerId::new("player-1");
    store
        .put(&owner, "npc_tom", json!({"tags": ["miller"], "home": "loc_mill"}))
        .await
        .unwrap();

    let merged = store
        .merge_patch(&owner, "npc_tom", &json!({"tags": ["grumpy"], "home": null}))
        .await
        .unwrap();

    assert_eq!(merged, json!({"tags": ["miller", "grumpy"], "home": "loc_mill"}));
}

#[sqlx::test(migrations = false)]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_concurrent_first_merges_both_land(pool: PgPool) {
    let store = store(pool).await;
    let owner = OwnerId::new("player-1");

    for round in 0..20 {
        let id = format!("npc_new_{round}");
        let first_patch = json!({"name": "Ann", "tags": ["smith"]});
        let second_patch = json!({"home": "loc_forge", "tags": ["widow"]});
        let (first, second) = tokio::join!(
            store.merge_patch(&owner, &id, &first_patch),
            store.merge_patch(&owner, &id, &second_patch),
        );
        first.unwrap();
        second.unwrap();

        let document = store.get(&owner, &id).await.unwrap().unwrap();
        assert_eq!(document["name"], "Ann");
        assert_eq!(document["home"], "loc_forge");
        assert_eq!(document["tags"].as_array().unwrap().len(), 2);
    }
}

#[sqlx::test(migrations = false)]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_list_treats_underscore_prefix_literally(pool: PgPool) {
    let store = store(pool).await;
    let owner = OwnerId::new("player-1");
    for id in ["npc_a", "npcXb", "loc_mill"] {
        store.put(&owner, id, json!({})).await.unwrap();
    }

    let ids: Vec<String> = store
        .list(&owner, "npc_")
        .await
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect();

    assert_eq!(ids, vec!["npc_a".to_owned()]);
}

#[sqlx::test(migrations = false)]
#[ignore = "requires a PostgreSQL DATABASE_URL"]
async fn test_delete_removes_document(pool: PgPool) {
    let store = store(pool).await;
    let owner = OwnerId::new("player-1");
    store.put(&owner, "combat:1", json!({})).await.unwrap();

    assert!(store.delete(&owner, "combat:1").await.unwrap());
    assert!(store.get(&owner, "combat:1").await.unwrap().is_none());
}
